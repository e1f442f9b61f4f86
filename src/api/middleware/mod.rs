pub mod auth;
pub mod error_reporting;
pub mod metrics;
pub mod request_id;
pub mod security;
