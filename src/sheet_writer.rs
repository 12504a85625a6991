use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde_json::Value;

use crate::{
    config::Sheet,
    declare::RefreshResult,
    error::WriteError,
    freshness::MARKER_PREFIX,
    google::sheets::{BatchUpdateSummary, SheetStore, ValueRange},
    logging,
    util::datetime,
};

const LAST_UPDATED_PREFIX: &str = "Last Updated: ";

/// Puts one [`RefreshResult`] into the sheet with a single batched call.
///
/// Row `i` of both value columns belongs to `symbols[i]`. A symbol without
/// a quote, or a quote missing a field, is sent as `null` so the cell keeps
/// whatever it held before instead of shifting later rows up.
pub struct SheetWriter {
    store: Arc<dyn SheetStore>,
    sheet: Sheet,
    symbols: Vec<String>,
    tz: Tz,
}

impl SheetWriter {
    pub fn new(store: Arc<dyn SheetStore>, sheet: Sheet, symbols: Vec<String>, tz: Tz) -> Self {
        SheetWriter {
            store,
            sheet,
            symbols,
            tz,
        }
    }

    pub async fn write(&self, result: &RefreshResult) -> Result<BatchUpdateSummary, WriteError> {
        self.write_at(result, Utc::now()).await
    }

    /// Same as [`write`](Self::write) with `now` as the "last updated" time.
    pub async fn write_at(
        &self,
        result: &RefreshResult,
        now: DateTime<Utc>,
    ) -> Result<BatchUpdateSummary, WriteError> {
        if let Some(rows) = self.sheet.value_rows() {
            if self.symbols.len() > rows {
                return Err(WriteError::TooManySymbols {
                    symbols: self.symbols.len(),
                    rows,
                });
            }
        }

        let data = self.build_batch(result, now);
        let summary = self
            .store
            .batch_update(&self.sheet.value_input_option, &data)
            .await?;

        logging::info_file_async(format!(
            "Sheet {} updated: {} quotes, {} cells in {} ranges",
            self.sheet.spreadsheet_id,
            result.quotes.len(),
            summary.total_updated_cells,
            data.len()
        ));

        Ok(summary)
    }

    /// The five ranges in write order: last updated, data source marker,
    /// anchor, prices, 52-week highs.
    pub fn build_batch(&self, result: &RefreshResult, now: DateTime<Utc>) -> Vec<ValueRange> {
        for quote in &result.quotes {
            if !self.symbols.contains(&quote.symbol) {
                logging::warn_file_async(format!(
                    "{} is not in the symbol list and has no row, ignored",
                    quote.symbol
                ));
            }
        }

        let (prices, highs): (Vec<Value>, Vec<Value>) = self
            .symbols
            .iter()
            .map(|symbol| match result.quote_of(symbol) {
                Some(q) => (number(q.current_price), number(q.fifty_two_week_high)),
                None => (Value::Null, Value::Null),
            })
            .unzip();

        vec![
            ValueRange::cell(
                &self.sheet.last_updated_range,
                format!("{}{}", LAST_UPDATED_PREFIX, datetime::render(now, &self.tz)),
            ),
            ValueRange::cell(
                &self.sheet.data_from_range,
                format!(
                    "{}{}",
                    MARKER_PREFIX,
                    datetime::render(result.fetch_date, &self.tz)
                ),
            ),
            ValueRange::cell(
                &self.sheet.anchor_range,
                datetime::render_plain(now, &self.tz),
            ),
            ValueRange::column(&self.sheet.price_range, prices),
            ValueRange::column(&self.sheet.high_range, highs),
        ]
    }
}

fn number(v: Option<f64>) -> Value {
    v.map(Value::from).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::TimeZone;
    use chrono_tz::America::Denver;

    use super::*;
    use crate::{
        declare::Quote,
        error::{ApiErrorDetail, SheetApiError},
    };

    #[derive(Default)]
    struct RecordingStore {
        batches: Mutex<Vec<(String, Vec<ValueRange>)>>,
        reject: bool,
    }

    #[async_trait]
    impl SheetStore for RecordingStore {
        async fn read_values(&self, _range: &str) -> Result<Vec<Vec<Value>>, SheetApiError> {
            Ok(Vec::new())
        }

        async fn batch_update(
            &self,
            value_input_option: &str,
            data: &[ValueRange],
        ) -> Result<BatchUpdateSummary, SheetApiError> {
            self.batches
                .lock()
                .unwrap()
                .push((value_input_option.to_string(), data.to_vec()));
            if self.reject {
                return Err(SheetApiError::Api(ApiErrorDetail {
                    status: 403,
                    message: "The caller does not have permission".to_string(),
                    api_status: Some("PERMISSION_DENIED".to_string()),
                    details: None,
                }));
            }
            Ok(BatchUpdateSummary::default())
        }
    }

    fn writer(store: Arc<RecordingStore>, symbols: &[&str]) -> SheetWriter {
        let mut sheet = Sheet::default();
        sheet.spreadsheet_id = "sheet-1".to_string();
        SheetWriter::new(
            store,
            sheet,
            symbols.iter().map(|s| s.to_string()).collect(),
            Denver,
        )
    }

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 5, h, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_two_symbols_make_one_batch_of_five() {
        let store = Arc::new(RecordingStore::default());
        let result = RefreshResult::new(
            at(17),
            vec![
                Quote::new("X", Some(10.0), Some(15.0)),
                Quote::new("Y", Some(20.0), Some(25.0)),
            ],
        );

        writer(store.clone(), &["X", "Y"])
            .write_at(&result, at(18))
            .await
            .unwrap();

        let batches = store.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        let (mode, data) = &batches[0];
        assert_eq!(mode, "USER_ENTERED");

        let ranges: Vec<&str> = data.iter().map(|v| v.range.as_str()).collect();
        assert_eq!(
            ranges,
            vec![
                "Portfolio!A1",
                "Portfolio!C1",
                "Portfolio!A3",
                "Portfolio!C3:C128",
                "Portfolio!D3:D128"
            ]
        );
        assert_eq!(data[0].values[0][0], "Last Updated: Jan 5 2024 11:00:00 MST");
        assert_eq!(data[1].values[0][0], "Data from: Jan 5 2024 10:00:00 MST");
        assert_eq!(data[2].values[0][0], "2024-01-05 11:00:00");
        assert_eq!(data[3].values, vec![vec![Value::from(10.0), Value::from(20.0)]]);
        assert_eq!(data[4].values, vec![vec![Value::from(15.0), Value::from(25.0)]]);
    }

    #[test]
    fn test_failed_symbol_keeps_its_row() {
        let store = Arc::new(RecordingStore::default());
        let result = RefreshResult::new(
            at(17),
            vec![
                Quote::new("AAA", Some(1.0), Some(2.0)),
                Quote::new("CCC", Some(5.0), None),
            ],
        );

        let data = writer(store, &["AAA", "BBB", "CCC"]).build_batch(&result, at(18));

        assert_eq!(
            data[3].values[0],
            vec![Value::from(1.0), Value::Null, Value::from(5.0)]
        );
        assert_eq!(
            data[4].values[0],
            vec![Value::from(2.0), Value::Null, Value::Null]
        );
    }

    #[tokio::test]
    async fn test_empty_result_still_writes_timestamps() {
        let store = Arc::new(RecordingStore::default());
        let result = RefreshResult::new(at(17), Vec::new());

        writer(store.clone(), &["AAA", "BBB"])
            .write_at(&result, at(18))
            .await
            .unwrap();

        let batches = store.batches.lock().unwrap();
        let data = &batches[0].1;
        assert_eq!(data.len(), 5);
        assert_eq!(data[1].values[0][0], "Data from: Jan 5 2024 10:00:00 MST");
        assert!(data[3].values[0].iter().all(Value::is_null));
    }

    #[tokio::test]
    async fn test_rejection_is_write_error() {
        let store = Arc::new(RecordingStore {
            reject: true,
            ..Default::default()
        });
        let result = RefreshResult::new(at(17), Vec::new());

        let err = writer(store, &["AAA"])
            .write_at(&result, at(18))
            .await
            .unwrap_err();

        match err {
            WriteError::Rejected(SheetApiError::Api(detail)) => {
                assert_eq!(detail.status, 403);
                assert_eq!(detail.api_status.as_deref(), Some("PERMISSION_DENIED"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_too_many_symbols_sends_nothing() {
        let store = Arc::new(RecordingStore::default());
        let mut sheet = Sheet::default();
        sheet.price_range = "Portfolio!C3:C4".to_string();
        sheet.high_range = "Portfolio!D3:D4".to_string();
        let writer = SheetWriter::new(
            store.clone(),
            sheet,
            vec!["A".to_string(), "B".to_string(), "C".to_string()],
            Denver,
        );

        let err = writer
            .write_at(&RefreshResult::new(at(17), Vec::new()), at(18))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            WriteError::TooManySymbols {
                symbols: 3,
                rows: 2
            }
        ));
        assert!(store.batches.lock().unwrap().is_empty());
    }
}
