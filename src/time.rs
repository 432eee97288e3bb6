use chrono::{DateTime, Utc};

/// Builds an event timestamp from the unix_secs and unix_nsecs fields of a
/// Netflow header.
pub(crate) fn header_timestamp(secs: u32, nsecs: u32) -> DateTime<Utc> {
    DateTime::from_timestamp(i64::from(secs), nsecs).unwrap_or(DateTime::UNIX_EPOCH)
}

/// Renders seconds + microseconds since the epoch as an ISO-8601 string with
/// microsecond precision. `micros` may fall outside 0..1_000_000 (the v9
/// switched-time formula produces exactly 1_000_000 on millisecond
/// boundaries); the excess carries into the seconds, the way `Time.at`-style
/// APIs normalize it.
pub(crate) fn unix_micros_to_iso(seconds: i64, micros: i64) -> String {
    let total = seconds * 1_000_000 + micros;
    let secs = total.div_euclid(1_000_000);
    let frac = total.rem_euclid(1_000_000) as u32;
    DateTime::<Utc>::from_timestamp(secs, frac * 1_000)
        .unwrap_or(DateTime::UNIX_EPOCH)
        .format("%Y-%m-%dT%H:%M:%S%.6fZ")
        .to_string()
}

/// ISO-8601 of whole seconds since the epoch.
pub(crate) fn unix_secs_to_iso(seconds: u64) -> String {
    unix_micros_to_iso(seconds as i64, 0)
}
