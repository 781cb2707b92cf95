//! ID generation utilities for Leadflow
//!
//! Provides timestamps and identifiers for leads and daemon requests.

use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Generate the ID of the lead at pool position `sequence`
///
/// Format: `lead-{timestamp_ms}-{sequence_hex}`
/// Example: `lead-1738300800123-2a`
///
/// Sequence numbers are unique within a pool, so IDs never collide even when
/// many leads are appended in the same millisecond.
pub fn generate_lead_id(sequence: i64) -> String {
    format!("lead-{}-{:x}", now_ms(), sequence)
}

/// Generate a consumer ID for consumers created without one
///
/// Format: `cons-{timestamp_ms}-{random_hex}`
pub fn generate_consumer_id() -> String {
    let timestamp = now_ms();
    let random: u32 = rand::rng().random();
    format!("cons-{}-{:08x}", timestamp, random)
}
