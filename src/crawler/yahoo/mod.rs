//! # Yahoo Finance chart endpoint
//!
//! `GET {base_url}/{symbol}` answers with a chart document whose
//! `chart.result[0].meta` carries the latest price and 52-week high.
//! The endpoint is unofficial: it rate limits aggressively and rejects
//! requests without a browser-like user agent.

use anyhow::Result;

use crate::{config::QuoteEndpoint, util::http::Http};

/// 即時報價
pub mod price;

/// Yahoo Finance quote source.
pub struct Yahoo {
    http: Http,
    base_url: String,
}

impl Yahoo {
    pub fn new(endpoint: &QuoteEndpoint) -> Result<Self> {
        Ok(Yahoo {
            http: Http::new(&endpoint.user_agent, endpoint.timeout())?,
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn chart_url(&self, symbol: &str) -> String {
        format!(
            "{base}/{symbol}",
            base = self.base_url,
            symbol = urlencoding::encode(symbol)
        )
    }
}
