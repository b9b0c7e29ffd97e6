//! Fixed-size lock striping over filesystem paths.
//!
//! A mutex-per-key map grows without bound under key churn; a fixed array
//! of 256 stripes bounds memory, and collisions only serialize the tiny
//! mkdir+rename critical section. Stripe choice must be stable for the
//! lifetime of the process, so the hash is a plain FNV-1a over the path
//! bytes rather than the randomized std hasher.

use parking_lot::{Mutex, MutexGuard};
use std::path::Path;
use std::sync::Arc;

const STRIPE_COUNT: usize = 256;

/// Shared stripe array. Cloning is cheap and shares the same mutexes.
#[derive(Clone)]
pub struct PathLocks {
    stripes: Arc<Vec<Mutex<()>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self {
            stripes: Arc::new((0..STRIPE_COUNT).map(|_| Mutex::new(())).collect()),
        }
    }

    /// Lock the stripe for `path`. Hold only across directory creation,
    /// renames, and parent fsync, never across body I/O.
    pub fn lock(&self, path: &Path) -> MutexGuard<'_, ()> {
        self.stripes[stripe_index(path)].lock()
    }
}

impl Default for PathLocks {
    fn default() -> Self {
        Self::new()
    }
}

fn stripe_index(path: &Path) -> usize {
    fnv1a32(path.as_os_str().as_encoded_bytes()) as usize % STRIPE_COUNT
}

/// 32-bit FNV-1a.
fn fnv1a32(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for &b in bytes {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}
