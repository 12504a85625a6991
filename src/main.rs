use std::{process, sync::Arc};

use anyhow::{Context, Result};
use stock_sheet_sync::{
    config::{App, FreshnessMode},
    crawler::{yahoo::Yahoo, QuoteSource},
    freshness::{FreshnessGate, FreshnessSource, LocalCache, RemoteMarker},
    google::{
        auth::{ServiceAccount, TokenProvider},
        credentials::ServiceAccountKey,
        sheets::{GoogleSheets, SheetStore},
    },
    logging,
    refresh::{FixedDelay, Refresher},
    scheduler,
    sheet_writer::SheetWriter,
    util::http::Http,
};
use tokio_cron_scheduler::JobScheduler;

const GOOGLE_USER_AGENT: &str = concat!("stock_sheet_sync/", env!("CARGO_PKG_VERSION"));

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let code = match run().await {
        Ok(()) => 0,
        Err(why) => {
            logging::error_file_async(format!("{:?}", why));
            1
        }
    };

    logging::flush();
    process::exit(code);
}

async fn run() -> Result<()> {
    let app = App::load()?;
    let refresher = Arc::new(build_refresher(&app)?);

    logging::info_file_async(format!(
        "Refreshing {} symbols into spreadsheet {} (freshness: {}, timezone: {})",
        app.symbols.len(),
        app.sheet.spreadsheet_id,
        app.refresh.freshness,
        app.refresh.timezone
    ));

    match &app.refresh.cron {
        Some(cron_expr) => daemon(cron_expr, refresher).await,
        None => {
            let outcome = refresher
                .run()
                .await
                .context("Error updating Google Sheet")?;
            logging::info_file_async(outcome.to_string());
            Ok(())
        }
    }
}

fn build_refresher(app: &App) -> Result<Refresher> {
    let tz = app.refresh.tz()?;

    // 金鑰有問題時在抓任何報價之前就結束
    let key = ServiceAccountKey::from_config(&app.google)?;
    logging::info_file_async(format!("Authenticating as {}", key.summary()));
    let google_http = Http::new(GOOGLE_USER_AGENT, app.quote.timeout())?;
    let token: Arc<dyn TokenProvider> = Arc::new(ServiceAccount::new(key, google_http.clone())?);
    let store: Arc<dyn SheetStore> = Arc::new(GoogleSheets::new(google_http, token, &app.sheet));

    let cache = app.refresh.cache_path().map(LocalCache::new);
    let source: Box<dyn FreshnessSource> = match app.refresh.freshness {
        FreshnessMode::Remote => Box::new(RemoteMarker::new(
            store.clone(),
            app.sheet.data_from_range.clone(),
            tz,
        )),
        FreshnessMode::Local => Box::new(
            cache
                .clone()
                .context("a cache path is required for local freshness")?,
        ),
    };

    let quotes: Arc<dyn QuoteSource> = Arc::new(Yahoo::new(&app.quote)?);
    let writer = SheetWriter::new(store, app.sheet.clone(), app.symbols.clone(), tz);

    let refresher = Refresher::new(
        FreshnessGate::new(source, tz),
        quotes,
        writer,
        app.symbols.clone(),
        Box::new(FixedDelay(app.refresh.pacing())),
    );

    Ok(match cache {
        Some(cache) => refresher.with_cache(cache),
        None => refresher,
    })
}

async fn daemon(cron_expr: &str, refresher: Arc<Refresher>) -> Result<()> {
    let mut sched = JobScheduler::new().await?;

    match refresher.run().await {
        Ok(outcome) => logging::info_file_async(outcome.to_string()),
        Err(why) => logging::error_file_async(format!("Error updating Google Sheet: {}", why)),
    }

    scheduler::start(&sched, cron_expr, refresher).await?;
    tokio::signal::ctrl_c().await?;

    logging::info_file_async("Shutting down".to_string());
    sched.shutdown().await?;
    Ok(())
}
