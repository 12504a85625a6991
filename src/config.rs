use std::{env, fmt, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{anyhow, bail, Result};
use chrono_tz::Tz;
use config::{Config as config_config, File as config_file};
use serde::{Deserialize, Serialize};

use crate::{declare, google::sheets, logging};

const CONFIG_PATH: &str = "app.json";
const APP_CONFIG_PATH: &str = "APP_CONFIG_PATH";

/// Top level settings, read once at startup and handed to each component.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct App {
    pub sheet: Sheet,
    pub quote: QuoteEndpoint,
    pub refresh: Refresh,
    pub google: Google,
    /// 追蹤的股票，順序對應試算表的列
    pub symbols: Vec<String>,
}

impl Default for App {
    fn default() -> Self {
        App {
            sheet: Default::default(),
            quote: Default::default(),
            refresh: Default::default(),
            google: Default::default(),
            symbols: declare::default_symbols(),
        }
    }
}

const SPREADSHEET_ID: &str = "SPREADSHEET_ID";
const SHEET_NAME: &str = "SHEET_NAME";
const SHEETS_BASE_URL: &str = "SHEETS_BASE_URL";
const DEFAULT_SHEET_NAME: &str = "Portfolio";

/// Where in the spreadsheet each value lands.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Sheet {
    pub spreadsheet_id: String,
    pub api_base_url: String,
    /// "Last Updated: ..." header cell
    pub last_updated_range: String,
    /// "Data from: ..." header cell, doubles as the remote freshness marker
    pub data_from_range: String,
    /// plain timestamp above the value columns
    pub anchor_range: String,
    pub price_range: String,
    pub high_range: String,
    pub value_input_option: String,
}

impl Sheet {
    /// The default layout placed on the named tab.
    pub fn on_tab(sheet_name: &str) -> Self {
        Sheet {
            spreadsheet_id: String::new(),
            api_base_url: "https://sheets.googleapis.com/v4/spreadsheets".to_string(),
            last_updated_range: format!("{}!A1", sheet_name),
            data_from_range: format!("{}!C1", sheet_name),
            anchor_range: format!("{}!A3", sheet_name),
            price_range: format!("{}!C3:C128", sheet_name),
            high_range: format!("{}!D3:D128", sheet_name),
            value_input_option: "USER_ENTERED".to_string(),
        }
    }

    /// Number of rows both value columns can hold.
    pub fn value_rows(&self) -> Option<usize> {
        let prices = sheets::row_span(&self.price_range)?;
        let highs = sheets::row_span(&self.high_range)?;
        Some(prices.min(highs))
    }
}

impl Default for Sheet {
    fn default() -> Self {
        Sheet::on_tab(DEFAULT_SHEET_NAME)
    }
}

const QUOTE_BASE_URL: &str = "QUOTE_BASE_URL";
const QUOTE_USER_AGENT: &str = "QUOTE_USER_AGENT";
const HTTP_TIMEOUT_SECS: &str = "HTTP_TIMEOUT_SECS";

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct QuoteEndpoint {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl QuoteEndpoint {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for QuoteEndpoint {
    fn default() -> Self {
        QuoteEndpoint {
            base_url: "https://query1.finance.yahoo.com/v8/finance/chart".to_string(),
            user_agent: "Mozilla/5.0".to_string(),
            timeout_secs: 15,
        }
    }
}

/// Which record decides whether today's data is already in the sheet.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FreshnessMode {
    /// the local cache file written after each successful write-back
    #[default]
    Local,
    /// the "Data from: ..." cell of the sheet itself
    Remote,
}

impl FromStr for FreshnessMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "cache" => Ok(FreshnessMode::Local),
            "remote" | "sheet" => Ok(FreshnessMode::Remote),
            other => Err(anyhow!("unknown freshness source '{}'", other)),
        }
    }
}

impl fmt::Display for FreshnessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FreshnessMode::Local => write!(f, "local"),
            FreshnessMode::Remote => write!(f, "remote"),
        }
    }
}

const REFRESH_TIMEZONE: &str = "REFRESH_TIMEZONE";
const FRESHNESS_SOURCE: &str = "FRESHNESS_SOURCE";
const CACHE_PATH: &str = "CACHE_PATH";
const PACING_MILLIS: &str = "PACING_MILLIS";
const REFRESH_CRON: &str = "REFRESH_CRON";
const STOCK_SYMBOLS: &str = "STOCK_SYMBOLS";

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Refresh {
    /// IANA name; calendar days are counted in this zone
    pub timezone: String,
    pub freshness: FreshnessMode,
    /// empty disables the local cache mirror
    pub cache_path: String,
    pub pacing_millis: u64,
    pub cron: Option<String>,
}

impl Refresh {
    pub fn tz(&self) -> Result<Tz> {
        Tz::from_str(self.timezone.trim())
            .map_err(|why| anyhow!("unknown timezone '{}': {}", self.timezone, why))
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_millis)
    }

    pub fn cache_path(&self) -> Option<PathBuf> {
        if self.cache_path.trim().is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.cache_path))
        }
    }
}

impl Default for Refresh {
    fn default() -> Self {
        Refresh {
            timezone: "UTC".to_string(),
            freshness: FreshnessMode::Local,
            cache_path: "stockPrice.json".to_string(),
            pacing_millis: 1000,
            cron: None,
        }
    }
}

const GOOGLE_PROJECT_ID: &str = "GOOGLE_PROJECT_ID";
const GOOGLE_PRIVATE_KEY_ID: &str = "GOOGLE_PRIVATE_KEY_ID";
const GOOGLE_PRIVATE_KEY: &str = "GOOGLE_PRIVATE_KEY";
const GOOGLE_CLIENT_EMAIL: &str = "GOOGLE_CLIENT_EMAIL";
const GOOGLE_CLIENT_ID: &str = "GOOGLE_CLIENT_ID";
const GOOGLE_TOKEN_URI: &str = "GOOGLE_TOKEN_URI";

/// Service account fields as they arrive from the environment. The private
/// key is still escaped here; see `google::credentials`.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Google {
    pub project_id: String,
    pub private_key_id: String,
    pub private_key: String,
    pub client_email: String,
    pub client_id: String,
    pub token_uri: String,
}

impl Default for Google {
    fn default() -> Self {
        Google {
            project_id: String::new(),
            private_key_id: String::new(),
            private_key: String::new(),
            client_email: String::new(),
            client_id: String::new(),
            token_uri: "https://oauth2.googleapis.com/token".to_string(),
        }
    }
}

impl App {
    /// Reads `app.json` when present, then applies environment overrides.
    pub fn load() -> Result<Self> {
        let path = env::var(APP_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(CONFIG_PATH));

        let app = if path.exists() {
            Self::from_file(&path)?
        } else {
            logging::debug_file_async(format!(
                "{} not found, using defaults and environment",
                path.display()
            ));
            App::default()
        };

        let app = app.override_with_env();
        app.validate()?;

        Ok(app)
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let app: App = config_config::builder()
            .add_source(config_file::from(path))
            .build()?
            .try_deserialize()?;
        Ok(app)
    }

    /// 將來自於 env 的設定值覆蓋掉 json 上的設定值
    pub fn override_with_env(self) -> Self {
        self.override_with(|key| env::var(key).ok())
    }

    fn override_with<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = lookup(SHEET_NAME) {
            let id = std::mem::take(&mut self.sheet.spreadsheet_id);
            let base_url = std::mem::take(&mut self.sheet.api_base_url);
            self.sheet = Sheet {
                spreadsheet_id: id,
                api_base_url: base_url,
                ..Sheet::on_tab(&name)
            };
        }

        if let Some(id) = lookup(SPREADSHEET_ID) {
            self.sheet.spreadsheet_id = id;
        }

        if let Some(url) = lookup(SHEETS_BASE_URL) {
            self.sheet.api_base_url = url;
        }

        if let Some(url) = lookup(QUOTE_BASE_URL) {
            self.quote.base_url = url;
        }

        if let Some(ua) = lookup(QUOTE_USER_AGENT) {
            self.quote.user_agent = ua;
        }

        if let Some(secs) = lookup(HTTP_TIMEOUT_SECS) {
            if let Some(secs) = parse_number(HTTP_TIMEOUT_SECS, &secs) {
                self.quote.timeout_secs = secs;
            }
        }

        if let Some(tz) = lookup(REFRESH_TIMEZONE) {
            self.refresh.timezone = tz;
        }

        if let Some(source) = lookup(FRESHNESS_SOURCE) {
            match FreshnessMode::from_str(&source) {
                Ok(mode) => self.refresh.freshness = mode,
                Err(why) => logging::error_file_async(format!(
                    "Ignoring {}: {:?}",
                    FRESHNESS_SOURCE, why
                )),
            }
        }

        if let Some(path) = lookup(CACHE_PATH) {
            self.refresh.cache_path = path;
        }

        if let Some(millis) = lookup(PACING_MILLIS) {
            if let Some(millis) = parse_number(PACING_MILLIS, &millis) {
                self.refresh.pacing_millis = millis;
            }
        }

        if let Some(cron) = lookup(REFRESH_CRON) {
            self.refresh.cron = Some(cron).filter(|c| !c.trim().is_empty());
        }

        if let Some(symbols) = lookup(STOCK_SYMBOLS) {
            self.symbols = symbols
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Some(v) = lookup(GOOGLE_PROJECT_ID) {
            self.google.project_id = v;
        }

        if let Some(v) = lookup(GOOGLE_PRIVATE_KEY_ID) {
            self.google.private_key_id = v;
        }

        if let Some(v) = lookup(GOOGLE_PRIVATE_KEY) {
            self.google.private_key = v;
        }

        if let Some(v) = lookup(GOOGLE_CLIENT_EMAIL) {
            self.google.client_email = v;
        }

        if let Some(v) = lookup(GOOGLE_CLIENT_ID) {
            self.google.client_id = v;
        }

        if let Some(v) = lookup(GOOGLE_TOKEN_URI) {
            self.google.token_uri = v;
        }

        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.sheet.spreadsheet_id.trim().is_empty() {
            bail!("{} is not set", SPREADSHEET_ID);
        }

        self.refresh.tz()?;

        if self.quote.timeout_secs == 0 {
            bail!("{} must be greater than zero", HTTP_TIMEOUT_SECS);
        }

        if self.symbols.is_empty() {
            bail!("the symbol list is empty");
        }

        if self.refresh.freshness == FreshnessMode::Local && self.refresh.cache_path().is_none() {
            bail!("{} is empty but {} is local", CACHE_PATH, FRESHNESS_SOURCE);
        }

        let rows = self.sheet.value_rows().ok_or_else(|| {
            anyhow!(
                "value ranges '{}' / '{}' must be single-column row spans",
                self.sheet.price_range,
                self.sheet.high_range
            )
        })?;

        if self.symbols.len() > rows {
            bail!(
                "{} symbols do not fit into the {} rows of '{}'",
                self.symbols.len(),
                rows,
                self.sheet.price_range
            );
        }

        Ok(())
    }
}

fn parse_number(key: &str, raw: &str) -> Option<u64> {
    match u64::from_str(raw.trim()) {
        Ok(n) => Some(n),
        Err(why) => {
            logging::error_file_async(format!("Ignoring {}='{}': {}", key, raw, why));
            None
        }
    }
}
