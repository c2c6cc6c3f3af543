//! Sortable object identifiers
//!
//! 12 bytes rendered as 24 hex chars: 4 bytes unix seconds, 5 bytes of
//! process-lifetime randomness, 3 bytes of a wrapping counter. Ids sort by
//! creation time and never collide within a process.

use rand::Rng;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

struct ObjectIdGen {
    nonce: [u8; 5],
    counter: AtomicU32,
}

fn generator() -> &'static ObjectIdGen {
    static GEN: OnceLock<ObjectIdGen> = OnceLock::new();
    GEN.get_or_init(|| {
        let mut rng = rand::thread_rng();
        ObjectIdGen {
            nonce: rng.gen(),
            counter: AtomicU32::new(rng.gen::<u32>() & 0xFF_FFFF),
        }
    })
}

/// Generate a new 24-hex object id.
pub fn new_object_id() -> String {
    let gen = generator();
    let secs = chrono::Utc::now().timestamp() as u32;
    // 24-bit wrapping counter
    let count = gen.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1) & 0xFF_FFFF;

    let mut b = [0u8; 12];
    b[0..4].copy_from_slice(&secs.to_be_bytes());
    b[4..9].copy_from_slice(&gen.nonce);
    b[9] = (count >> 16) as u8;
    b[10] = (count >> 8) as u8;
    b[11] = count as u8;

    let mut out = String::with_capacity(24);
    for byte in b {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_object_id_format() {
        let id = new_object_id();
        assert_eq!(id.len(), 24);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_object_id_unique() {
        let ids: HashSet<String> = (0..10_000).map(|_| new_object_id()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn test_object_id_timestamp_prefix() {
        let before = chrono::Utc::now().timestamp() as u32;
        let id = new_object_id();
        let after = chrono::Utc::now().timestamp() as u32;
        let secs = u32::from_str_radix(&id[..8], 16).unwrap();
        assert!(secs >= before && secs <= after);
    }
}
