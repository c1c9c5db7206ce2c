//! Process-wide platform state
//!
//! The underlying script runtime is initialized once per process and torn
//! down when the last engine goes away. This is modeled as an explicit
//! reference-counted acquire/release pair rather than a bare flag: every
//! [`Engine`](crate::Engine) holds a [`PlatformGuard`] for its lifetime,
//! and acquisition is idempotent and reentrant.

use once_cell::sync::Lazy;
use parking_lot::Mutex;

static PLATFORM: Lazy<Mutex<usize>> = Lazy::new(|| Mutex::new(0));

/// Keeps the process-wide platform alive. Dropping the guard releases one
/// reference; the platform is considered shut down when the count reaches
/// zero.
#[derive(Debug)]
pub struct PlatformGuard(());

/// Acquire a platform reference
pub fn acquire() -> PlatformGuard {
    *PLATFORM.lock() += 1;
    PlatformGuard(())
}

/// Current reference count
pub fn ref_count() -> usize {
    *PLATFORM.lock()
}

/// Whether any engine currently holds the platform
pub fn is_initialized() -> bool {
    ref_count() > 0
}

impl Drop for PlatformGuard {
    fn drop(&mut self) {
        let mut count = PLATFORM.lock();
        *count = count.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_release_refcounts() {
        let before = ref_count();
        let a = acquire();
        let b = acquire();
        assert!(ref_count() >= before + 2);
        assert!(is_initialized());
        drop(a);
        drop(b);
        assert_eq!(ref_count(), before);
    }
}
