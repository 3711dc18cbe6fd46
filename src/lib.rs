pub mod checker;
pub mod config;
pub mod discovery;
pub mod judge;
pub mod logging;
pub mod report;
pub mod retry;
pub mod sandbox;
pub mod scratch;
pub mod verdict;

pub fn create_timestamp() -> String {
    use chrono::{SecondsFormat, Utc};
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
