// ================================
// src/state.rs - state shared between the frame and command tasks
// ================================
use std::sync::{Arc, Mutex, MutexGuard};

/// Latest line offset, written by the frame task and read by the command task.
#[derive(Debug, Clone)]
pub struct SharedOffset {
    inner: Arc<Mutex<i32>>,
}

impl SharedOffset {
    pub fn new(initial: i32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(initial)),
        }
    }

    pub fn get(&self) -> i32 {
        *self.lock()
    }

    pub fn set(&self, offset: i32) {
        *self.lock() = offset;
    }

    // An i32 cannot be left half-written, so a poisoned lock still holds a valid value.
    fn lock(&self) -> MutexGuard<'_, i32> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn starts_at_initial_value() {
        assert_eq!(SharedOffset::new(0).get(), 0);
        assert_eq!(SharedOffset::new(-7).get(), -7);
    }

    #[test]
    fn clones_share_one_cell() {
        let offset = SharedOffset::new(0);
        let writer = offset.clone();

        thread::spawn(move || writer.set(42)).join().unwrap();

        assert_eq!(offset.get(), 42);
    }
}
