//! Shared primitives used across the safety and governance crates.

#![deny(unsafe_code)]

/// Version of the core library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod ids {
    //! ID utilities: monotonic ids, timestamps, and trace ids.

    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};
    use uuid::Uuid;

    static NEXT_ID: AtomicU64 = AtomicU64::new(1);

    /// Generate a new monotonic identifier (starts at 1).
    pub fn next_monotonic_id() -> u64 {
        NEXT_ID.fetch_add(1, Ordering::Relaxed)
    }

    /// Milliseconds since UNIX epoch, used for audit record and telemetry timestamps.
    pub fn now_ms() -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as u64
    }

    /// Opaque trace identifier (UUID v4 string).
    pub fn new_trace_id() -> String {
        Uuid::new_v4().to_string()
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn monotonic_increments() {
            let a = next_monotonic_id();
            let b = next_monotonic_id();
            assert!(b > a);
        }

        #[test]
        fn trace_id_format() {
            let t = new_trace_id();
            assert_eq!(t.len(), 36);
            assert!(t.chars().all(|c| c.is_ascii_hexdigit() || c == '-'));
        }
    }
}
