pub mod datetime;
pub mod http;
