use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub mod controller;
pub mod health;
pub mod public;
pub mod sse;
pub mod validation;

fn format_epoch_ms(epoch_ms: i64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(epoch_ms) * 1_000_000)
        .ok()
        .and_then(|time| time.format(&Rfc3339).ok())
        .unwrap_or_else(|| "invalid-timestamp".into())
}
