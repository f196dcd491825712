use chrono::{DateTime, Local, SecondsFormat, Utc};

/// Current UTC timestamp (milliseconds)
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// ISO-8601 UTC timestamp with millisecond precision, e.g. `2024-05-01T09:30:00.000Z`
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Human-readable server-local time, e.g. `5/1/2024, 9:30:00 AM`
pub fn locale_timestamp(at: DateTime<Local>) -> String {
    at.format("%-m/%-d/%Y, %-I:%M:%S %p").to_string()
}
