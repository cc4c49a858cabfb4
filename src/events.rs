//! Bridges SDK event callbacks to async streams.
//!
//! Every registered client gets one forwarding listener per lifecycle event.
//! The listener records one-shot events as fired and broadcasts each
//! occurrence to the current subscribers. A subscriber that attaches after a
//! one-shot event already fired is answered from the record instead.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use futures::Stream;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{event, Level};

use crate::{
    error::SplitError,
    sdk::{SdkEvent, SplitClient},
};

const EVENT_CHANNEL_CAPACITY: usize = 16;

struct EventChannel {
    fired: bool,
    tx: broadcast::Sender<()>,
}

#[derive(Default)]
struct BridgeState {
    generation: u64,
    /// Keyed by (instance key, SDK event name).
    channels: HashMap<(String, String), EventChannel>,
}

#[derive(Clone, Default)]
pub(crate) struct EventBridge {
    state: Arc<Mutex<BridgeState>>,
}

impl EventBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the forwarding listeners on `client`.
    pub fn attach(&self, instance_key: &str, client: &Arc<dyn SplitClient>) {
        let names = *client.events();
        let generation = {
            let mut state = self
                .state
                .lock()
                .expect("should always be able to acquire lock");
            for ev in SdkEvent::ALL {
                let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
                state.channels.insert(
                    (instance_key.to_string(), names.name(ev).to_string()),
                    EventChannel { fired: false, tx },
                );
            }
            state.generation
        };

        for ev in SdkEvent::ALL {
            let channel_key = (instance_key.to_string(), names.name(ev).to_string());
            let state = self.state.clone();
            let forward = move || fire(&state, generation, &channel_key, ev);
            if ev.is_one_shot() {
                client.once(names.name(ev), Box::new(forward));
            } else {
                client.on(names.name(ev), Arc::new(forward));
            }
        }
    }

    /// Stream of `ev` for the client registered under `instance_key`.
    pub fn subscribe(&self, instance_key: &str, event_name: &str, ev: SdkEvent) -> EventStream {
        let state = self
            .state
            .lock()
            .expect("should always be able to acquire lock");
        let channel = match state
            .channels
            .get(&(instance_key.to_string(), event_name.to_string()))
        {
            Some(channel) => channel,
            None => {
                return EventStream::failed(
                    ev,
                    SplitError::ClientNotInitialized(instance_key.to_string()),
                )
            }
        };

        let stream_state = if ev.is_one_shot() && channel.fired {
            StreamState::Replay
        } else if ev.is_one_shot() {
            StreamState::OneShot(channel.tx.subscribe())
        } else {
            StreamState::Repeat {
                rx: channel.tx.subscribe(),
                missed: 0,
            }
        };
        EventStream {
            event: ev,
            state: stream_state,
        }
    }

    /// Whether the one-shot `event_name` already fired for `instance_key`.
    #[cfg(test)]
    pub fn has_fired(&self, instance_key: &str, event_name: &str) -> bool {
        self.state
            .lock()
            .expect("should always be able to acquire lock")
            .channels
            .get(&(instance_key.to_string(), event_name.to_string()))
            .map(|c| c.fired)
            .unwrap_or(false)
    }

    /// Drops every channel, completing all open streams, and ignores any
    /// callback registered before this call.
    pub fn clear(&self) {
        let mut state = self
            .state
            .lock()
            .expect("should always be able to acquire lock");
        state.generation += 1;
        state.channels.clear();
    }
}

fn fire(
    state: &Mutex<BridgeState>,
    generation: u64,
    channel_key: &(String, String),
    ev: SdkEvent,
) {
    let mut state = state
        .lock()
        .expect("should always be able to acquire lock");
    if state.generation != generation {
        return;
    }
    if let Some(channel) = state.channels.get_mut(channel_key) {
        if ev.is_one_shot() {
            if channel.fired {
                return;
            }
            channel.fired = true;
        }
        // No receivers is fine, the record above covers late subscribers.
        let _ = channel.tx.send(());
        event!(
            Level::TRACE,
            key = %channel_key.0,
            event = %channel_key.1,
            "SDK event forwarded"
        );
    }
}

enum StreamState {
    Replay,
    OneShot(broadcast::Receiver<()>),
    /// `missed` counts occurrences dropped by the channel and not yet yielded.
    Repeat {
        rx: broadcast::Receiver<()>,
        missed: u64,
    },
    Failed(SplitError),
    Done,
}

/// Notifications of one SDK event for one client.
///
/// One-shot streams yield a single item and end. Update streams yield an item
/// per occurrence until the service is destroyed. A stream that could not be
/// set up yields its error once. Dropping the stream unsubscribes.
pub struct EventStream {
    event: SdkEvent,
    state: StreamState,
}

impl EventStream {
    pub(crate) fn failed(event: SdkEvent, err: SplitError) -> Self {
        Self {
            event,
            state: StreamState::Failed(err),
        }
    }

    pub fn event(&self) -> SdkEvent {
        self.event
    }

    /// Waits for the next notification. `None` once the stream is finished.
    ///
    /// Cancel safe: dropping the future before it completes loses nothing.
    pub async fn next(&mut self) -> Option<Result<SdkEvent, SplitError>> {
        let ev = self.event;
        match &mut self.state {
            StreamState::Done => None,
            StreamState::Failed(_) => match std::mem::replace(&mut self.state, StreamState::Done) {
                StreamState::Failed(err) => Some(Err(err)),
                _ => None,
            },
            StreamState::Replay => {
                // Delivered on a later tick, never inside the subscribe call.
                tokio::task::yield_now().await;
                self.state = StreamState::Done;
                Some(Ok(ev))
            }
            StreamState::OneShot(rx) => {
                let res = rx.recv().await;
                self.state = StreamState::Done;
                match res {
                    Ok(()) | Err(RecvError::Lagged(_)) => Some(Ok(ev)),
                    Err(RecvError::Closed) => None,
                }
            }
            StreamState::Repeat { missed, .. } if *missed > 0 => {
                *missed -= 1;
                Some(Ok(ev))
            }
            StreamState::Repeat { rx, missed } => match rx.recv().await {
                Ok(()) => Some(Ok(ev)),
                // A slow subscriber still sees one item per occurrence.
                Err(RecvError::Lagged(n)) => {
                    *missed = n - 1;
                    Some(Ok(ev))
                }
                Err(RecvError::Closed) => {
                    self.state = StreamState::Done;
                    None
                }
            },
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<SdkEvent, SplitError>> {
        futures::stream::unfold(self, |mut s| async move {
            let item = s.next().await?;
            Some((item, s))
        })
    }
}
