//! Google service account auth and the Sheets values API.

pub mod auth;
pub mod credentials;
pub mod sheets;
