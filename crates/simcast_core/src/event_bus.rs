//! Broadcast of combat events and state snapshots.
//!
//! Every subscriber gets its own unbounded channel, so a slow or absent
//! reader never blocks the simulation or other readers. Subscribers only see
//! messages published after they subscribed.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::events::{CombatEvent, CombatEventKind};
use crate::scheduler::EventId;
use crate::state::{GameState, StateService};

/// A message delivered to subscribers.
#[derive(Debug, Clone)]
pub enum BusMessage {
    /// A combat event.
    Event(CombatEvent),
    /// The state after an executed event changed it.
    Snapshot(Arc<GameState>),
}

/// Publish/subscribe hub.
///
/// Cloning the bus clones the handle; every clone publishes to the same
/// subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    state: StateService,
    subscribers: Rc<RefCell<Vec<mpsc::UnboundedSender<BusMessage>>>>,
    source: Rc<Cell<Option<EventId>>>,
}

impl EventBus {
    /// Create a bus that stamps events with the clock of `state`.
    #[must_use]
    pub fn new(state: StateService) -> Self {
        Self {
            state,
            subscribers: Rc::new(RefCell::new(Vec::new())),
            source: Rc::new(Cell::new(None)),
        }
    }

    /// Open a new subscription.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.borrow_mut().push(tx);
        tracing::debug!(subscribers = self.subscriber_count(), "New bus subscriber");
        Subscription { rx }
    }

    /// Number of open subscriptions (as of the last publish).
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }

    /// Publish a fully-formed event.
    pub fn publish_event(&self, event: CombatEvent) {
        self.broadcast(&BusMessage::Event(event));
    }

    /// Publish an event that happens now, attributed to the scheduled event
    /// currently executing.
    pub fn emit(&self, kind: CombatEventKind) {
        self.publish_event(CombatEvent {
            time: self.state.current_time(),
            source: self.source.get(),
            kind,
        });
    }

    /// Publish a state snapshot.
    pub fn publish_snapshot(&self, state: Arc<GameState>) {
        self.broadcast(&BusMessage::Snapshot(state));
    }

    /// Set the scheduled event that [`EventBus::emit`] attributes events to.
    pub(crate) fn set_source(&self, source: Option<EventId>) {
        self.source.set(source);
    }

    fn broadcast(&self, message: &BusMessage) {
        let mut subscribers = self.subscribers.borrow_mut();
        let before = subscribers.len();

        subscribers.retain(|tx| tx.send(message.clone()).is_ok());

        let closed = before - subscribers.len();
        if closed > 0 {
            tracing::debug!(closed, remaining = subscribers.len(), "Pruned closed subscribers");
        }
    }
}

/// The receiving end of a bus subscription.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<BusMessage>,
}

impl Subscription {
    /// Wait for the next message. Returns `None` once the bus is dropped and
    /// everything has been read.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        self.rx.recv().await
    }

    /// Take the next message if one is waiting.
    pub fn try_recv(&mut self) -> Option<BusMessage> {
        self.rx.try_recv().ok()
    }

    /// Take every waiting message.
    pub fn drain(&mut self) -> Vec<BusMessage> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Take every waiting message, keeping only combat events.
    pub fn drain_events(&mut self) -> Vec<CombatEvent> {
        self.drain()
            .into_iter()
            .filter_map(|message| match message {
                BusMessage::Event(event) => Some(event),
                BusMessage::Snapshot(_) => None,
            })
            .collect()
    }

    /// Take every waiting message, keeping only snapshots.
    pub fn drain_snapshots(&mut self) -> Vec<Arc<GameState>> {
        self.drain()
            .into_iter()
            .filter_map(|message| match message {
                BusMessage::Snapshot(state) => Some(state),
                BusMessage::Event(_) => None,
            })
            .collect()
    }
}
