use std::sync::Mutex;

use crate::sdk::{Listener, OnceListener};

enum Registration {
    On(Listener),
    Once(OnceListener),
}

/// Minimal `on`/`once`/`emit` event registry for [`crate::sdk::SplitClient`]
/// implementations.
///
/// Listeners run on the emitting thread, after the internal lock is released,
/// so a listener may register further listeners.
#[derive(Default)]
pub struct EventEmitter {
    listeners: Mutex<Vec<(String, Registration)>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, event: &str, listener: Listener) {
        self.listeners
            .lock()
            .expect("should always be able to acquire lock")
            .push((event.to_string(), Registration::On(listener)));
    }

    pub fn once(&self, event: &str, listener: OnceListener) {
        self.listeners
            .lock()
            .expect("should always be able to acquire lock")
            .push((event.to_string(), Registration::Once(listener)));
    }

    /// Calls every listener registered for `event`, dropping `once` listeners.
    /// Returns how many listeners ran.
    pub fn emit(&self, event: &str) -> usize {
        let mut repeating = vec![];
        let mut one_time = vec![];
        {
            let mut listeners = self
                .listeners
                .lock()
                .expect("should always be able to acquire lock");
            let registered = std::mem::take(&mut *listeners);
            for (name, registration) in registered {
                if name != event {
                    listeners.push((name, registration));
                    continue;
                }
                match registration {
                    Registration::On(l) => {
                        repeating.push(l.clone());
                        listeners.push((name, Registration::On(l)));
                    }
                    Registration::Once(l) => one_time.push(l),
                }
            }
        }

        let count = repeating.len() + one_time.len();
        for listener in repeating {
            listener();
        }
        for listener in one_time {
            listener();
        }
        count
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners
            .lock()
            .expect("should always be able to acquire lock")
            .iter()
            .filter(|(name, _)| name == event)
            .count()
    }

    pub fn clear(&self) {
        self.listeners
            .lock()
            .expect("should always be able to acquire lock")
            .clear();
    }
}
