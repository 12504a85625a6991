//! Error types for each stage of the refresh.
//!
//! Only [`WriteError`] and [`CredentialError`] end a run; the others are
//! logged by the refresher and the pass carries on.

use std::{fmt, io};

use thiserror::Error;

/// A single symbol could not be fetched. The batch continues without it.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request for {symbol} failed: {source}")]
    Request {
        symbol: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("quote source answered {status} for {symbol}")]
    Status { symbol: String, status: u16 },

    #[error("response for {symbol} is not valid JSON: {source}")]
    Json {
        symbol: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("no chart result for {symbol}: {reason}")]
    NoResult { symbol: String, reason: String },

    #[error("neither regularMarketPrice nor fiftyTwoWeekHigh present for {symbol}")]
    MissingPrice { symbol: String },
}

/// The last fetch time could not be determined. Treated as a cache miss.
#[derive(Error, Debug)]
pub enum FreshnessReadError {
    #[error("cache file unreadable: {0}")]
    Io(#[from] io::Error),

    #[error("cache file is not a valid refresh record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("marker cell could not be read: {0}")]
    Store(#[from] SheetApiError),

    #[error("marker cell is empty")]
    MissingMarker,

    #[error("marker '{0}' does not contain a recognizable timestamp")]
    UnparseableMarker(String),
}

/// A call to the spreadsheet API failed.
#[derive(Error, Debug)]
pub enum SheetApiError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("request to sheets api failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("sheets api rejected the call: {0}")]
    Api(ApiErrorDetail),

    #[error("unexpected sheets api response: {0}")]
    Decode(String),
}

/// What the remote API reported about a rejected request.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiErrorDetail {
    /// HTTP status code.
    pub status: u16,
    pub message: String,
    /// Google's canonical status name such as `INVALID_ARGUMENT`.
    pub api_status: Option<String>,
    /// The nested `error.details` payload, when present.
    pub details: Option<serde_json::Value>,
}

impl fmt::Display for ApiErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status, self.message)?;
        if let Some(api_status) = &self.api_status {
            write!(f, " ({})", api_status)?;
        }
        if let Some(details) = &self.details {
            write!(f, " details: {}", details)?;
        }
        Ok(())
    }
}

/// The batched write-back failed. Fatal to the run.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("write-back rejected: {0}")]
    Rejected(#[from] SheetApiError),

    #[error("{symbols} symbols do not fit into the {rows} rows of the value columns")]
    TooManySymbols { symbols: usize, rows: usize },
}

/// Service account credentials are missing or malformed.
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("environment variable {0} is not set")]
    MissingVar(&'static str),

    #[error("private key is malformed: {0}")]
    MalformedPrivateKey(String),

    #[error("credential file {path} is unusable: {reason}")]
    CredentialFile { path: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_detail_display() {
        let detail = ApiErrorDetail {
            status: 400,
            message: "Unable to parse range: Portfolio!Z".to_string(),
            api_status: Some("INVALID_ARGUMENT".to_string()),
            details: Some(serde_json::json!([{"reason": "badRequest"}])),
        };
        let text = WriteError::Rejected(SheetApiError::Api(detail)).to_string();

        assert!(text.contains("400 Unable to parse range: Portfolio!Z"));
        assert!(text.contains("(INVALID_ARGUMENT)"));
        assert!(text.contains("badRequest"));
    }

    #[test]
    fn test_too_many_symbols_message() {
        let err = WriteError::TooManySymbols {
            symbols: 130,
            rows: 126,
        };
        assert_eq!(
            err.to_string(),
            "130 symbols do not fit into the 126 rows of the value columns"
        );
    }
}
