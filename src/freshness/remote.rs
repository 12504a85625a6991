use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde_json::Value;

use crate::{
    error::FreshnessReadError, freshness::FreshnessSource, google::sheets::SheetStore,
    util::datetime,
};

/// Text in front of the fetch time in the marker cell.
pub const MARKER_PREFIX: &str = "Data from: ";

/// Reads the fetch time back from the marker cell the writer fills in.
pub struct RemoteMarker {
    store: Arc<dyn SheetStore>,
    range: String,
    tz: Tz,
}

impl RemoteMarker {
    pub fn new(store: Arc<dyn SheetStore>, range: impl Into<String>, tz: Tz) -> Self {
        RemoteMarker {
            store,
            range: range.into(),
            tz,
        }
    }
}

#[async_trait]
impl FreshnessSource for RemoteMarker {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn last_fetch(&self) -> Result<DateTime<Utc>, FreshnessReadError> {
        let values = self.store.read_values(&self.range).await?;
        let cell = values
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .ok_or(FreshnessReadError::MissingMarker)?;

        parse_marker(&cell, &self.tz)
    }
}

fn parse_marker(cell: &Value, tz: &Tz) -> Result<DateTime<Utc>, FreshnessReadError> {
    let text = match cell {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    if text.is_empty() {
        return Err(FreshnessReadError::MissingMarker);
    }

    let prefix = MARKER_PREFIX.trim_end();
    let stamp = text
        .strip_prefix(prefix)
        .map(str::trim_start)
        .unwrap_or(&text);

    datetime::parse_timestamp(stamp, tz)
        .ok_or_else(|| FreshnessReadError::UnparseableMarker(text.clone()))
}
