use super::lock;
use std::sync::{Condvar, Mutex, PoisonError};

/// One-shot broadcast: once set, every current and future `wait` returns.
#[derive(Debug, Default)]
pub(crate) struct Event {
    fired: Mutex<bool>,
    cond: Condvar,
}

impl Event {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set(&self) {
        let mut fired = lock(&self.fired);
        if !*fired {
            *fired = true;
            self.cond.notify_all();
        }
    }

    pub(crate) fn wait(&self) {
        let mut fired = lock(&self.fired);
        while !*fired {
            fired = self
                .cond
                .wait(fired)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    #[cfg(test)]
    pub(crate) fn is_set(&self) -> bool {
        *lock(&self.fired)
    }
}
