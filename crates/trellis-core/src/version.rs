//! Version and nonce tokens stamped on every discovery response.
//!
//! The server does not version its configuration: every response carries a
//! fresh version and nonce, whether or not the resources changed. Proxies
//! echo the nonce back in their acknowledgement, which is all the
//! correlation the protocol needs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

static NONCE_COUNTER: AtomicU64 = AtomicU64::new(0);
static PROCESS_SALT: OnceLock<u32> = OnceLock::new();

/// Current wall-clock time as `<secs>.<nanos>`.
pub fn version_info() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}.{:09}", now.as_secs(), now.subsec_nanos())
}

/// A nonce unique within this process.
///
/// The random salt makes collisions with nonces issued before a restart unlikely.
pub fn nonce() -> String {
    let salt = *PROCESS_SALT.get_or_init(|| rand::thread_rng().gen());
    let n = NONCE_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{salt:08x}-{n}")
}
