use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    crawler::{yahoo::Yahoo, QuoteSource},
    declare::Quote,
    error::FetchError,
};

#[derive(Deserialize, Debug)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Deserialize, Debug)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    meta: Meta,
}

/// Fields are kept as raw JSON so a string or null reads as "absent"
/// instead of failing the whole document.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Meta {
    #[serde(default)]
    regular_market_price: Option<Value>,
    #[serde(default)]
    fifty_two_week_high: Option<Value>,
}

#[derive(Deserialize, Debug)]
struct ChartError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[async_trait]
impl QuoteSource for Yahoo {
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, FetchError> {
        let response = self
            .http
            .get(&self.chart_url(symbol), None)
            .await
            .map_err(|source| FetchError::Request {
                symbol: symbol.to_string(),
                source,
            })?;
        let status = response.status();
        let text = response.text().await.map_err(|source| FetchError::Request {
            symbol: symbol.to_string(),
            source,
        })?;

        match serde_json::from_str::<ChartResponse>(&text) {
            Ok(chart) => parse_quote(symbol, chart),
            Err(_) if !status.is_success() => Err(FetchError::Status {
                symbol: symbol.to_string(),
                status: status.as_u16(),
            }),
            Err(source) => Err(FetchError::Json {
                symbol: symbol.to_string(),
                source,
            }),
        }
    }
}

fn parse_quote(symbol: &str, response: ChartResponse) -> Result<Quote, FetchError> {
    let Chart { result, error } = response.chart;
    let meta = match result.and_then(|r| r.into_iter().next()) {
        Some(r) => r.meta,
        None => {
            let reason = error
                .map(|e| match (e.code, e.description) {
                    (Some(code), Some(desc)) => format!("{}: {}", code, desc),
                    (code, desc) => desc.or(code).unwrap_or_default(),
                })
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| "empty result".to_string());
            return Err(FetchError::NoResult {
                symbol: symbol.to_string(),
                reason,
            });
        }
    };

    let current_price = meta.regular_market_price.as_ref().and_then(Value::as_f64);
    let fifty_two_week_high = meta.fifty_two_week_high.as_ref().and_then(Value::as_f64);

    if current_price.is_none() && fifty_two_week_high.is_none() {
        return Err(FetchError::MissingPrice {
            symbol: symbol.to_string(),
        });
    }

    Ok(Quote::new(symbol, current_price, fifty_two_week_high))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::{
        matchers::{header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;
    use crate::config::QuoteEndpoint;

    async fn yahoo_for(server: &MockServer) -> Yahoo {
        Yahoo::new(&QuoteEndpoint {
            base_url: format!("{}/v8/finance/chart/", server.uri()),
            user_agent: "Mozilla/5.0".to_string(),
            timeout_secs: 2,
        })
        .unwrap()
    }

    fn chart_body(meta: Value) -> Value {
        serde_json::json!({
            "chart": {
                "result": [{ "meta": meta, "timestamp": [], "indicators": {} }],
                "error": null
            }
        })
    }

    #[tokio::test]
    async fn test_fetch_quote() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/AAPL"))
            .and(header("user-agent", "Mozilla/5.0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chart_body(
                serde_json::json!({
                    "currency": "USD",
                    "symbol": "AAPL",
                    "regularMarketPrice": 189.25,
                    "fiftyTwoWeekHigh": 199.62
                }),
            )))
            .expect(1)
            .mount(&server)
            .await;

        let quote = yahoo_for(&server).await.fetch_quote("AAPL").await.unwrap();

        assert_eq!(quote, Quote::new("AAPL", Some(189.25), Some(199.62)));
    }

    #[tokio::test]
    async fn test_partial_meta_keeps_present_field() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chart_body(
                serde_json::json!({ "regularMarketPrice": 12, "fiftyTwoWeekHigh": "n/a" }),
            )))
            .mount(&server)
            .await;

        let quote = yahoo_for(&server).await.fetch_quote("XYZ").await.unwrap();

        assert_eq!(quote.current_price, Some(12.0));
        assert_eq!(quote.fifty_two_week_high, None);
    }

    #[tokio::test]
    async fn test_missing_prices() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(chart_body(serde_json::json!({ "currency": "USD" }))),
            )
            .mount(&server)
            .await;

        let err = yahoo_for(&server).await.fetch_quote("XYZ").await.unwrap_err();

        assert!(matches!(err, FetchError::MissingPrice { .. }));
    }

    #[tokio::test]
    async fn test_unknown_symbol_reports_upstream_reason() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "chart": {
                    "result": null,
                    "error": { "code": "Not Found", "description": "No data found, symbol may be delisted" }
                }
            })))
            .mount(&server)
            .await;

        let err = yahoo_for(&server).await.fetch_quote("NOPE").await.unwrap_err();

        match err {
            FetchError::NoResult { symbol, reason } => {
                assert_eq!(symbol, "NOPE");
                assert!(reason.contains("delisted"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_json_bodies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/LIMIT"))
            .respond_with(ResponseTemplate::new(429).set_body_string("Too Many Requests"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/HTML"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let yahoo = yahoo_for(&server).await;

        assert!(matches!(
            yahoo.fetch_quote("LIMIT").await.unwrap_err(),
            FetchError::Status { status: 429, .. }
        ));
        assert!(matches!(
            yahoo.fetch_quote("HTML").await.unwrap_err(),
            FetchError::Json { .. }
        ));
    }

    #[tokio::test]
    async fn test_timeout_is_request_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let err = yahoo_for(&server).await.fetch_quote("SLOW").await.unwrap_err();

        assert!(matches!(err, FetchError::Request { .. }));
    }
}
