//! Identifiers and human-readable time helpers

use sha2::{Digest, Sha256};
use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Number of hex characters kept from the digest.
const FINGERPRINT_LEN: usize = 32;

/// Hash arbitrary material into a short hex fingerprint.
///
/// Used for display and lookup only. Inputs are low entropy and partly
/// predictable, so the result must never be treated as a secret.
pub fn fingerprint(material: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(material.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..FINGERPRINT_LEN].to_string()
}

/// Fingerprint of a listening endpoint, stamped with its creation time
pub fn registry_fingerprint(host: &str, port: u16, created_at: SystemTime) -> String {
    fingerprint(&format!("{}:{}:{}", host, port, unix_nanos(created_at)))
}

/// Fingerprint of an accepted connection
pub fn session_fingerprint(peer: SocketAddr, local: SocketAddr, connected_at: SystemTime) -> String {
    fingerprint(&format!("{}->{}:{}", peer, local, unix_nanos(connected_at)))
}

fn unix_nanos(time: SystemTime) -> u128 {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}

/// Render the time elapsed since `since`, e.g. `3m 12s ago`.
pub fn time_ago(since: SystemTime) -> String {
    let elapsed = SystemTime::now()
        .duration_since(since)
        .unwrap_or_default();

    if elapsed.as_secs() == 0 {
        return "just now".to_string();
    }

    let rounded = Duration::from_secs(elapsed.as_secs());
    format!("{} ago", humantime::format_duration(rounded))
}
