//! Pool of decoder scratch storage
//!
//! A [`Decoder`](super::Decoder) checks its scratch out when it is created
//! and hands it back when dropped, so the buffers are reused across
//! documents and threads without per-document allocation.

use once_cell::sync::Lazy;
use parking_lot::Mutex;

/// Upper bound on idle scratch buffers kept around
const MAX_IDLE: usize = 64;

static POOL: Lazy<Mutex<Vec<Scratch>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// Reusable storage backing one decoder
#[derive(Debug, Default)]
pub(crate) struct Scratch {
    /// Open brackets of the containers being skipped
    pub(crate) stack: Vec<u8>,
}

// Checkouts not yet released on this thread
#[cfg(test)]
thread_local! {
    static OUTSTANDING: std::cell::Cell<isize> = const { std::cell::Cell::new(0) };
}

pub(crate) fn acquire() -> Scratch {
    #[cfg(test)]
    OUTSTANDING.with(|n| n.set(n.get() + 1));
    POOL.lock().pop().unwrap_or_default()
}

pub(crate) fn release(mut scratch: Scratch) {
    #[cfg(test)]
    OUTSTANDING.with(|n| n.set(n.get() - 1));
    scratch.stack.clear();

    let mut pool = POOL.lock();
    if pool.len() < MAX_IDLE {
        pool.push(scratch);
    }
}

/// Number of idle scratch buffers currently pooled
pub fn idle() -> usize {
    POOL.lock().len()
}

#[cfg(test)]
pub(crate) fn outstanding() -> isize {
    OUTSTANDING.with(|n| n.get())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_released_scratch_is_cleared() {
        let mut scratch = acquire();
        scratch.stack.extend_from_slice(b"{[{");
        release(scratch);

        let scratch = acquire();
        assert!(scratch.stack.is_empty());
        release(scratch);
    }

    #[test]
    fn test_idle_is_bounded() {
        let held: Vec<Scratch> = (0..MAX_IDLE + 8).map(|_| Scratch::default()).collect();
        for scratch in held {
            release(scratch);
        }
        assert!(idle() <= MAX_IDLE);
    }
}
