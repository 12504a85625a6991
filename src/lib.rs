pub mod config;
pub mod crawler;
pub mod declare;
pub mod error;
pub mod freshness;
pub mod google;
pub mod logging;
pub mod refresh;
pub mod scheduler;
pub mod sheet_writer;
pub mod util;
