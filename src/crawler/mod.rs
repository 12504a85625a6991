use async_trait::async_trait;

use crate::{declare::Quote, error::FetchError};

/// 雅虎財經
pub mod yahoo;

/// Anything that can price one symbol.
///
/// One call is one outbound request. Implementations never retry; the
/// refresher skips a symbol whose fetch failed.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, FetchError>;
}
