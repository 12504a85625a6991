//! "Already updated today" check.
//!
//! A [`FreshnessSource`] reports when the data currently in the sheet was
//! fetched; [`FreshnessGate`] compares that instant with `now` by calendar
//! date in the configured timezone. Any read failure counts as stale.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::{error::FreshnessReadError, logging, util::datetime};

/// 本機快取檔
pub mod local;
/// 試算表上的 "Data from:" 儲存格
pub mod remote;

pub use local::LocalCache;
pub use remote::{RemoteMarker, MARKER_PREFIX};

/// Where the last fetch time is recorded.
#[async_trait]
pub trait FreshnessSource: Send + Sync {
    /// Short label used in log lines.
    fn name(&self) -> &'static str;

    async fn last_fetch(&self) -> Result<DateTime<Utc>, FreshnessReadError>;
}

pub struct FreshnessGate {
    source: Box<dyn FreshnessSource>,
    tz: Tz,
}

impl FreshnessGate {
    pub fn new(source: Box<dyn FreshnessSource>, tz: Tz) -> Self {
        FreshnessGate { source, tz }
    }

    /// The recorded fetch time when it falls on the same calendar day as
    /// `now`, `None` when a refresh is due.
    pub async fn fresh_since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let last = match self.source.last_fetch().await {
            Ok(last) => last,
            Err(why) => {
                logging::warn_file_async(format!(
                    "No usable freshness marker from {} source, refreshing: {}",
                    self.source.name(),
                    why
                ));
                return None;
            }
        };

        if datetime::same_calendar_day(last, now, &self.tz) {
            Some(last)
        } else {
            logging::debug_file_async(format!(
                "Last fetch {} is not on {} ({})",
                datetime::render(last, &self.tz),
                datetime::render(now, &self.tz),
                self.tz
            ));
            None
        }
    }

    pub async fn should_skip(&self, now: DateTime<Utc>) -> bool {
        self.fresh_since(now).await.is_some()
    }
}
