use std::sync::{Mutex, MutexGuard};

use tokio::sync::oneshot;

use crate::color::Rgb;

enum PickState {
    Idle,
    AwaitingColor(oneshot::Sender<Rgb>),
}

/// "Pick a color from the device": the next recognized sample fills one
/// pending request. At most one request is pending at a time.
pub struct ColorPicker {
    state: Mutex<PickState>,
}

impl Default for ColorPicker {
    fn default() -> Self {
        Self {
            state: Mutex::new(PickState::Idle),
        }
    }
}

impl ColorPicker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start waiting for a color. A request that was already pending is
    /// dropped, so its receiver resolves with an error.
    pub fn request(&self) -> oneshot::Receiver<Rgb> {
        let (tx, rx) = oneshot::channel();
        let previous = std::mem::replace(&mut *self.lock(), PickState::AwaitingColor(tx));
        if matches!(previous, PickState::AwaitingColor(_)) {
            log::info!("Replacing pending color pick");
        }
        rx
    }

    pub fn cancel(&self) -> bool {
        let previous = std::mem::replace(&mut *self.lock(), PickState::Idle);
        matches!(previous, PickState::AwaitingColor(_))
    }

    pub fn is_awaiting(&self) -> bool {
        matches!(*self.lock(), PickState::AwaitingColor(_))
    }

    /// Resolve the pending request with `rgb`, returning to idle. Returns
    /// false when nothing was waiting or the requester already gave up.
    pub fn offer(&self, rgb: Rgb) -> bool {
        let previous = std::mem::replace(&mut *self.lock(), PickState::Idle);
        match previous {
            PickState::AwaitingColor(tx) => tx.send(rgb).is_ok(),
            PickState::Idle => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, PickState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
