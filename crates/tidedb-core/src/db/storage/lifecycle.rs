use crate::error::InternalError;
use parking_lot::Mutex;

///
/// LifecycleState
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LifecycleState {
    Open,
    Closing,
    Closed,
}

///
/// Lifecycle
///
/// `Open -> Closing -> Closed`. Only the caller that moves the instance out
/// of `Open` performs the shutdown; every later call observes the settled
/// state.
///

#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: Mutex<LifecycleState>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(LifecycleState::Open),
        }
    }

    pub(crate) fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    pub(crate) fn ensure_open(&self, operation: &str) -> Result<(), InternalError> {
        match self.state() {
            LifecycleState::Open => Ok(()),
            LifecycleState::Closing | LifecycleState::Closed => {
                Err(InternalError::closed(operation))
            }
        }
    }

    /// Move `Open -> Closing`; `false` when another caller already did.
    pub(crate) fn begin_close(&self) -> bool {
        let mut state = self.state.lock();
        if *state != LifecycleState::Open {
            return false;
        }
        *state = LifecycleState::Closing;

        true
    }

    pub(crate) fn finish_close(&self) {
        *self.state.lock() = LifecycleState::Closed;
    }
}

///
/// TESTS
///
