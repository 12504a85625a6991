//! # Google Sheets v4 values API
//!
//! Only two calls are needed: reading one range and writing many ranges in
//! a single `values:batchUpdate`. A rejected call carries a structured body
//!
//! ```json
//! {"error": {"code": 400, "message": "...", "status": "INVALID_ARGUMENT", "details": [...]}}
//! ```
//!
//! which is kept whole in [`ApiErrorDetail`].

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    config::Sheet,
    error::{ApiErrorDetail, SheetApiError},
    google::auth::TokenProvider,
    util::http::{self, Http},
};

/// One (range, values) pair of a batched write.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValueRange {
    pub range: String,
    pub major_dimension: String,
    pub values: Vec<Vec<Value>>,
}

impl ValueRange {
    /// A single cell.
    pub fn cell(range: impl Into<String>, value: impl Into<Value>) -> Self {
        ValueRange {
            range: range.into(),
            major_dimension: "ROWS".to_string(),
            values: vec![vec![value.into()]],
        }
    }

    /// One column written top-down. `Value::Null` entries are skipped by
    /// the API and leave their cell as it was.
    pub fn column(range: impl Into<String>, values: Vec<Value>) -> Self {
        ValueRange {
            range: range.into(),
            major_dimension: "COLUMNS".to_string(),
            values: vec![values],
        }
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct BatchUpdateRequest<'a> {
    value_input_option: &'a str,
    data: &'a [ValueRange],
}

/// What the API reports after a batched write.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchUpdateSummary {
    pub spreadsheet_id: String,
    pub total_updated_rows: u64,
    pub total_updated_columns: u64,
    pub total_updated_cells: u64,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct ReadResponse {
    values: Vec<Vec<Value>>,
}

#[derive(Deserialize, Debug)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize, Debug)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    details: Option<Value>,
}

/// A remote key-range store.
#[async_trait]
pub trait SheetStore: Send + Sync {
    /// Cell values of `range`, row major. Empty trailing cells are omitted.
    async fn read_values(&self, range: &str) -> Result<Vec<Vec<Value>>, SheetApiError>;

    /// Writes every pair in one request.
    async fn batch_update(
        &self,
        value_input_option: &str,
        data: &[ValueRange],
    ) -> Result<BatchUpdateSummary, SheetApiError>;
}

/// REST client bound to one spreadsheet.
pub struct GoogleSheets {
    http: Http,
    token: Arc<dyn TokenProvider>,
    base_url: String,
    spreadsheet_id: String,
}

impl GoogleSheets {
    pub fn new(http: Http, token: Arc<dyn TokenProvider>, sheet: &Sheet) -> Self {
        GoogleSheets {
            http,
            token,
            base_url: sheet.api_base_url.trim_end_matches('/').to_string(),
            spreadsheet_id: sheet.spreadsheet_id.clone(),
        }
    }

    async fn auth_headers(&self) -> Result<reqwest::header::HeaderMap, SheetApiError> {
        let token = self.token.access_token().await?;
        http::bearer(&token).map_err(|why| SheetApiError::Auth(why.to_string()))
    }
}

#[async_trait]
impl SheetStore for GoogleSheets {
    async fn read_values(&self, range: &str) -> Result<Vec<Vec<Value>>, SheetApiError> {
        let url = format!(
            "{}/{}/values/{}",
            self.base_url,
            self.spreadsheet_id,
            urlencoding::encode(range)
        );
        let headers = self.auth_headers().await?;

        let response = self.http.get(&url, Some(headers)).await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(api_error(status.as_u16(), &body));
        }

        let read: ReadResponse =
            serde_json::from_str(&body).map_err(|why| SheetApiError::Decode(why.to_string()))?;
        Ok(read.values)
    }

    async fn batch_update(
        &self,
        value_input_option: &str,
        data: &[ValueRange],
    ) -> Result<BatchUpdateSummary, SheetApiError> {
        let url = format!(
            "{}/{}/values:batchUpdate",
            self.base_url, self.spreadsheet_id
        );
        let headers = self.auth_headers().await?;
        let req = BatchUpdateRequest {
            value_input_option,
            data,
        };

        let response = self.http.post_json(&url, Some(headers), &req).await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(api_error(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|why| SheetApiError::Decode(why.to_string()))
    }
}

fn api_error(status: u16, body: &str) -> SheetApiError {
    let detail = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => ApiErrorDetail {
            status,
            message: envelope.error.message,
            api_status: envelope.error.status,
            details: envelope.error.details,
        },
        Err(_) => ApiErrorDetail {
            status,
            message: body.trim().to_string(),
            api_status: None,
            details: None,
        },
    };

    SheetApiError::Api(detail)
}

static A1_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:.+!)?\$?([A-Za-z]+)\$?(\d+)(?::\$?([A-Za-z]+)\$?(\d+))?$")
        .expect("A1 range pattern")
});

/// Number of rows a single-column A1 range spans.
///
/// `Portfolio!C3:C128` spans 126 rows and `A1` spans one. Ranges covering
/// more than one column, open ranges and reversed ranges give `None`.
pub fn row_span(range: &str) -> Option<usize> {
    let caps = A1_RANGE.captures(range.trim())?;
    let start: usize = caps.get(2)?.as_str().parse().ok()?;

    match (caps.get(3), caps.get(4)) {
        (Some(end_col), Some(end_row)) => {
            if !caps.get(1)?.as_str().eq_ignore_ascii_case(end_col.as_str()) {
                return None;
            }
            let end: usize = end_row.as_str().parse().ok()?;
            if end < start || start == 0 {
                return None;
            }
            Some(end - start + 1)
        }
        _ if start == 0 => None,
        _ => Some(1),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::{
        matchers::{body_json, header, method, path, path_regex},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    struct StaticToken;

    #[async_trait]
    impl TokenProvider for StaticToken {
        async fn access_token(&self) -> Result<String, SheetApiError> {
            Ok("test-token".to_string())
        }
    }

    fn sheets_for(server: &MockServer) -> GoogleSheets {
        let mut sheet = Sheet::default();
        sheet.spreadsheet_id = "sheet-1".to_string();
        sheet.api_base_url = format!("{}/v4/spreadsheets", server.uri());

        GoogleSheets::new(
            Http::new("test", Duration::from_secs(2)).unwrap(),
            Arc::new(StaticToken),
            &sheet,
        )
    }

    #[test]
    fn test_row_span() {
        assert_eq!(row_span("Portfolio!C3:C128"), Some(126));
        assert_eq!(row_span("'My Sheet'!$D$3:$D$4"), Some(2));
        assert_eq!(row_span("A1"), Some(1));
        assert_eq!(row_span("Portfolio!C3:D128"), None);
        assert_eq!(row_span("Portfolio!C10:C3"), None);
        assert_eq!(row_span("Portfolio!C:C"), None);
        assert_eq!(row_span(""), None);
    }

    #[test]
    fn test_value_range_shape() {
        let column = ValueRange::column("P!C3:C5", vec![Value::from(10), Value::Null]);
        let json = serde_json::to_value(&column).unwrap();

        assert_eq!(json["majorDimension"], "COLUMNS");
        assert_eq!(json["values"], serde_json::json!([[10, null]]));

        let cell = ValueRange::cell("P!A1", "hello");
        assert_eq!(cell.values, vec![vec![Value::from("hello")]]);
    }

    #[tokio::test]
    async fn test_read_values() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/v4/spreadsheets/sheet-1/values/Portfolio"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "range": "Portfolio!C1",
                "majorDimension": "ROWS",
                "values": [["Data from: Jan 5 2024 10:00:00 MST"]]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let values = sheets_for(&server)
            .read_values("Portfolio!C1")
            .await
            .unwrap();

        assert_eq!(values[0][0], "Data from: Jan 5 2024 10:00:00 MST");
    }

    #[tokio::test]
    async fn test_read_empty_range() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "range": "Portfolio!C1",
                "majorDimension": "ROWS"
            })))
            .mount(&server)
            .await;

        let values = sheets_for(&server)
            .read_values("Portfolio!C1")
            .await
            .unwrap();

        assert!(values.is_empty());
    }

    #[tokio::test]
    async fn test_batch_update_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v4/spreadsheets/sheet-1/values:batchUpdate"))
            .and(body_json(serde_json::json!({
                "valueInputOption": "USER_ENTERED",
                "data": [
                    {"range": "P!A1", "majorDimension": "ROWS", "values": [["x"]]}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "spreadsheetId": "sheet-1",
                "totalUpdatedRows": 1,
                "totalUpdatedColumns": 1,
                "totalUpdatedCells": 1,
                "totalUpdatedSheets": 1
            })))
            .expect(1)
            .mount(&server)
            .await;

        let summary = sheets_for(&server)
            .batch_update("USER_ENTERED", &[ValueRange::cell("P!A1", "x")])
            .await
            .unwrap();

        assert_eq!(summary.total_updated_cells, 1);
        assert_eq!(summary.spreadsheet_id, "sheet-1");
    }

    #[tokio::test]
    async fn test_structured_error_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {
                    "code": 400,
                    "message": "Unable to parse range: Portfolio!ZZ",
                    "status": "INVALID_ARGUMENT",
                    "details": [{"@type": "type.googleapis.com/google.rpc.BadRequest"}]
                }
            })))
            .mount(&server)
            .await;

        let err = sheets_for(&server)
            .batch_update("USER_ENTERED", &[ValueRange::cell("Portfolio!ZZ", 1)])
            .await
            .unwrap_err();

        match err {
            SheetApiError::Api(detail) => {
                assert_eq!(detail.status, 400);
                assert_eq!(detail.message, "Unable to parse range: Portfolio!ZZ");
                assert_eq!(detail.api_status.as_deref(), Some("INVALID_ARGUMENT"));
                assert!(detail.details.unwrap()[0]["@type"]
                    .as_str()
                    .unwrap()
                    .ends_with("BadRequest"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_plain_text_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
            .mount(&server)
            .await;

        let err = sheets_for(&server).read_values("P!A1").await.unwrap_err();

        assert!(matches!(
            err,
            SheetApiError::Api(ApiErrorDetail { status: 503, ref message, .. }) if message == "Service Unavailable"
        ));
    }
}
