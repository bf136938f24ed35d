//! Process-wide capture slot.
//!
//! At most one capture session may be recording or finalizing at a time.
//! Controllers acquire the slot before opening a session and hold the
//! returned guard until the session is released.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

static GLOBAL_SLOT: OnceLock<CaptureSlot> = OnceLock::new();

/// Shared "one session at a time" flag.
#[derive(Debug, Clone, Default)]
pub struct CaptureSlot {
    busy: Arc<AtomicBool>,
}

impl CaptureSlot {
    /// A private slot, independent of every other slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// The slot shared by every controller in the process.
    pub fn global() -> Self {
        GLOBAL_SLOT.get_or_init(CaptureSlot::new).clone()
    }

    /// Claim the slot, or `None` if a session already holds it.
    pub fn try_acquire(&self) -> Option<SlotGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SlotGuard {
                busy: Arc::clone(&self.busy),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Holds the capture slot; releases it on drop.
#[derive(Debug)]
pub struct SlotGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
        tracing::trace!("Capture slot released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_holder() {
        let slot = CaptureSlot::new();
        let guard = slot.try_acquire().unwrap();
        assert!(slot.is_busy());
        assert!(slot.try_acquire().is_none());
        assert!(slot.clone().try_acquire().is_none());

        drop(guard);
        assert!(!slot.is_busy());
        assert!(slot.try_acquire().is_some());
    }

    #[test]
    fn test_private_slots_are_independent() {
        let a = CaptureSlot::new();
        let b = CaptureSlot::new();
        let _guard = a.try_acquire().unwrap();
        assert!(b.try_acquire().is_some());
    }
}
