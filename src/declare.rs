use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 預設追蹤的股票代號，順序即為試算表中的列順序
pub const STOCK_SYMBOLS: &[&str] = &[
    "AAPL", "MSFT", "GOOGL", "AMZN", "NVDA", "META", "TSLA", "BRK-B", "JPM", "V", "UNH", "XOM",
    "JNJ", "PG", "MA", "HD", "COST", "ABBV", "KO", "PEP", "AVGO", "ORCL", "CRM", "NFLX", "AMD",
    "INTC", "DIS", "WMT", "BAC", "CVX", "VOO", "QQQ", "SPY", "VTI", "SCHD",
];

/// Returns the built-in symbol list as owned strings.
pub fn default_symbols() -> Vec<String> {
    STOCK_SYMBOLS.iter().map(|s| s.to_string()).collect()
}

/// 單一股票的報價
///
/// `None` means the upstream payload carried no usable number for that field.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub symbol: String,
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default)]
    pub fifty_two_week_high: Option<f64>,
}

impl Quote {
    pub fn new(
        symbol: impl Into<String>,
        current_price: Option<f64>,
        fifty_two_week_high: Option<f64>,
    ) -> Self {
        Quote {
            symbol: symbol.into(),
            current_price,
            fifty_two_week_high,
        }
    }
}

/// The outcome of one fetch pass.
///
/// `quotes` keeps the order of the symbol list; failed symbols are absent.
/// The same shape is persisted as the local cache file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResult {
    pub fetch_date: DateTime<Utc>,
    #[serde(default, alias = "stocks")]
    pub quotes: Vec<Quote>,
}

impl RefreshResult {
    pub fn new(fetch_date: DateTime<Utc>, quotes: Vec<Quote>) -> Self {
        RefreshResult { fetch_date, quotes }
    }

    /// Looks up the quote of a symbol.
    pub fn quote_of(&self, symbol: &str) -> Option<&Quote> {
        self.quotes.iter().find(|q| q.symbol == symbol)
    }
}
