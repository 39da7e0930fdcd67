use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as seconds since the Unix epoch, the unit every
/// timestamp in this crate is expressed in before it's converted to
/// microseconds for the wire schema.
pub fn unix_time_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the unix epoch")
        .as_secs_f64()
}

/// Convert a capture timestamp (seconds, as a float) to integer
/// microseconds for the emitted feature vector.
pub fn micros(timestamp: f64) -> u64 {
    (timestamp * 1_000_000.0).floor() as u64
}
