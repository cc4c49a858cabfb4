//! Main client status exposed as watchable values.

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{event, Level};

use crate::sdk::{SdkEvent, SplitClient};

/// A value that can be read at any time and awaited for changes.
#[derive(Clone)]
pub struct Signal<T> {
    rx: watch::Receiver<T>,
}

impl<T: Clone + Send + Sync + 'static> Signal<T> {
    pub fn get(&self) -> T {
        self.rx.borrow().clone()
    }

    /// The next value, or `None` once the service was destroyed.
    pub async fn changed(&mut self) -> Option<T> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Current value first, then every change.
    pub fn into_stream(self) -> WatchStream<T> {
        WatchStream::new(self.rx)
    }
}

struct StatusState {
    generation: u64,
    senders: Option<[watch::Sender<bool>; 4]>,
    receivers: [watch::Receiver<bool>; 4],
}

type Channels = ([watch::Sender<bool>; 4], [watch::Receiver<bool>; 4]);

fn channels() -> Channels {
    let [(s0, r0), (s1, r1), (s2, r2), (s3, r3)]: [(watch::Sender<bool>, watch::Receiver<bool>); 4] =
        std::array::from_fn(|_| watch::channel(false));
    ([s0, s1, s2, s3], [r0, r1, r2, r3])
}

/// Tracks ready, ready-from-cache, timed-out and update for the main client.
#[derive(Clone)]
pub(crate) struct SdkStatus {
    state: Arc<Mutex<StatusState>>,
}

impl SdkStatus {
    pub fn new() -> Self {
        let (senders, receivers) = channels();
        Self {
            state: Arc::new(Mutex::new(StatusState {
                generation: 0,
                senders: Some(senders),
                receivers,
            })),
        }
    }

    /// Follows the events of a freshly created main client. Lifecycle debug
    /// logs are emitted only when `debug` is set.
    pub fn attach(&self, client: &Arc<dyn SplitClient>, debug: bool) {
        let generation = {
            let mut state = self
                .state
                .lock()
                .expect("should always be able to acquire lock");
            if state.senders.is_none() {
                let (senders, receivers) = channels();
                state.senders = Some(senders);
                state.receivers = receivers;
            }
            state.generation
        };

        let names = *client.events();
        for ev in SdkEvent::ALL {
            let status = self.clone();
            if ev.is_one_shot() {
                client.once(
                    names.name(ev),
                    Box::new(move || status.mark(generation, ev, debug)),
                );
            } else {
                client.on(
                    names.name(ev),
                    Arc::new(move || status.mark(generation, ev, debug)),
                );
            }
        }
    }

    fn mark(&self, generation: u64, ev: SdkEvent, debug: bool) {
        {
            let state = self
                .state
                .lock()
                .expect("should always be able to acquire lock");
            if state.generation != generation {
                return;
            }
            if let Some(senders) = &state.senders {
                // `send_replace` notifies even without receivers and on equal values.
                senders[ev.index()].send_replace(true);
            }
        }

        match ev {
            SdkEvent::ReadyTimedOut => event!(Level::WARN, "SDK timed out"),
            SdkEvent::Ready if debug => event!(Level::DEBUG, "SDK ready"),
            SdkEvent::ReadyFromCache if debug => event!(Level::DEBUG, "SDK ready from cache"),
            SdkEvent::Update if debug => event!(Level::DEBUG, "SDK update received"),
            _ => {}
        }
    }

    pub fn get(&self, ev: SdkEvent) -> bool {
        *self
            .state
            .lock()
            .expect("should always be able to acquire lock")
            .receivers[ev.index()]
            .borrow()
    }

    pub fn signal(&self, ev: SdkEvent) -> Signal<bool> {
        let state = self
            .state
            .lock()
            .expect("should always be able to acquire lock");
        let rx = match &state.senders {
            Some(senders) => senders[ev.index()].subscribe(),
            None => state.receivers[ev.index()].clone(),
        };
        Signal { rx }
    }

    /// Closes every signal. Last values stay readable.
    pub fn complete(&self) {
        let mut state = self
            .state
            .lock()
            .expect("should always be able to acquire lock");
        state.generation += 1;
        state.senders = None;
    }
}
