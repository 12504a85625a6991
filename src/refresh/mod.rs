//! One refresh pass: freshness check, paced fetch loop, batched write-back.

use std::{fmt, pin::pin, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{stream, Stream, StreamExt};

use crate::{
    crawler::QuoteSource,
    declare::RefreshResult,
    error::WriteError,
    freshness::{FreshnessGate, LocalCache},
    logging,
    sheet_writer::SheetWriter,
};

/// Decides how long to wait between two outbound quote requests.
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn pause(&self);
}

/// Sleeps a fixed amount on the tokio timer.
pub struct FixedDelay(pub Duration);

#[async_trait]
impl Pacer for FixedDelay {
    async fn pause(&self) {
        logging::debug_file_async(format!("Pacing {} ms", self.0.as_millis()));
        tokio::time::sleep(self.0).await;
    }
}

/// Never waits.
pub struct NoDelay;

#[async_trait]
impl Pacer for NoDelay {
    async fn pause(&self) {}
}

/// Yields the symbols in order, pausing before each one except the first.
///
/// The pause happens when the next symbol is pulled, so it is taken after a
/// failed fetch the same as after a successful one.
pub fn paced_symbols<'a>(
    symbols: &'a [String],
    pacer: &'a dyn Pacer,
) -> impl Stream<Item = &'a str> + Send + 'a {
    stream::iter(symbols.iter().enumerate()).then(move |(index, symbol)| async move {
        if index > 0 {
            pacer.pause().await;
        }
        symbol.as_str()
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// The sheet already holds data fetched on this calendar day.
    Skipped { last_fetch: DateTime<Utc> },
    /// The result was written; `failed` lists the symbols left out of it.
    Refreshed {
        result: RefreshResult,
        failed: Vec<String>,
    },
}

impl fmt::Display for RefreshOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshOutcome::Skipped { last_fetch } => write!(
                f,
                "Skipped, data fetched at {} is still current",
                last_fetch.to_rfc3339()
            ),
            RefreshOutcome::Refreshed { result, failed } if failed.is_empty() => write!(
                f,
                "Sheet updated with {} quotes",
                result.quotes.len()
            ),
            RefreshOutcome::Refreshed { result, failed } => write!(
                f,
                "Sheet updated with {} quotes, {} failed: {}",
                result.quotes.len(),
                failed.len(),
                failed.join(", ")
            ),
        }
    }
}

/// 每日更新流程
pub struct Refresher {
    gate: FreshnessGate,
    quotes: Arc<dyn QuoteSource>,
    writer: SheetWriter,
    symbols: Vec<String>,
    pacer: Box<dyn Pacer>,
    cache: Option<LocalCache>,
}

impl Refresher {
    pub fn new(
        gate: FreshnessGate,
        quotes: Arc<dyn QuoteSource>,
        writer: SheetWriter,
        symbols: Vec<String>,
        pacer: Box<dyn Pacer>,
    ) -> Self {
        Refresher {
            gate,
            quotes,
            writer,
            symbols,
            pacer,
            cache: None,
        }
    }

    /// Mirrors every written result into `cache`.
    pub fn with_cache(mut self, cache: LocalCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub async fn run(&self) -> Result<RefreshOutcome, WriteError> {
        self.run_at(Utc::now()).await
    }

    /// Runs one pass as if the clock read `now`. `now` becomes the fetch date.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<RefreshOutcome, WriteError> {
        if let Some(last_fetch) = self.gate.fresh_since(now).await {
            logging::info_file_async(format!(
                "Already fetched today (last fetch {}), skipping",
                last_fetch.to_rfc3339()
            ));
            return Ok(RefreshOutcome::Skipped { last_fetch });
        }

        logging::info_file_async(format!("Fetching {} symbols", self.symbols.len()));

        let mut quotes = Vec::with_capacity(self.symbols.len());
        let mut failed = Vec::new();
        let mut feed = pin!(paced_symbols(&self.symbols, self.pacer.as_ref()));

        while let Some(symbol) = feed.next().await {
            match self.quotes.fetch_quote(symbol).await {
                Ok(quote) => {
                    logging::info_file_async(format!("Fetched {}", symbol));
                    quotes.push(quote);
                }
                Err(why) => {
                    logging::error_file_async(format!("Failed to fetch {}: {}", symbol, why));
                    failed.push(symbol.to_string());
                }
            }
        }

        let result = RefreshResult::new(now, quotes);
        logging::info_file_async(format!(
            "Successfully fetched {} of {} symbols",
            result.quotes.len(),
            self.symbols.len()
        ));
        if result.quotes.is_empty() {
            logging::warn_file_async(
                "Every fetch failed, writing timestamps only".to_string(),
            );
        }

        self.writer.write(&result).await?;

        if let Some(cache) = &self.cache {
            match cache.store(&result).await {
                Ok(()) => logging::debug_file_async(format!(
                    "Results saved to {}",
                    cache.path().display()
                )),
                Err(why) => logging::warn_file_async(format!(
                    "Failed to save results to {}: {:?}",
                    cache.path().display(),
                    why
                )),
            }
        }

        Ok(RefreshOutcome::Refreshed { result, failed })
    }
}
