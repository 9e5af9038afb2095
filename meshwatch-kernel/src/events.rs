//! Live event hub for dashboard streams.
//!
//! Two independent channels (chart updates, log lines). Every subscriber gets
//! its own bounded queue and `publish` fans out to all of them, so each
//! connected dashboard sees every event. Publishing never blocks: a full
//! subscriber queue drops the event for that subscriber only.

use crate::models::{BroadcastEvent, LogLevel, LogLine};
use crate::state::{new_map, SharedMap};
use futures::Stream;
use serde::Serialize;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Charts,
    Logs,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Charts => "charts",
            Channel::Logs => "logs",
        }
    }
}

struct ChannelSlot {
    subscribers: SharedMap<u64, mpsc::Sender<BroadcastEvent>>,
}

struct HubInner {
    charts: ChannelSlot,
    logs: ChannelSlot,
    capacity: usize,
    next_id: AtomicU64,
    dropped: AtomicU64,
}

/// Cheap to clone; all clones share the same channels.
#[derive(Clone)]
pub struct EventHub {
    inner: Arc<HubInner>,
}

impl EventHub {
    /// `capacity` bounds each subscriber queue.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                charts: ChannelSlot { subscribers: new_map() },
                logs: ChannelSlot { subscribers: new_map() },
                capacity: capacity.max(1),
                next_id: AtomicU64::new(1),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    fn slot(&self, channel: Channel) -> &ChannelSlot {
        match channel {
            Channel::Charts => &self.inner.charts,
            Channel::Logs => &self.inner.logs,
        }
    }

    /// Returns how many subscribers accepted the event.
    pub fn publish(&self, channel: Channel, event: BroadcastEvent) -> usize {
        let mut delivered = 0;
        let mut gone = Vec::new();
        let mut subscribers = self.slot(channel).subscribers.lock();

        for (id, tx) in subscribers.iter() {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(channel = channel.as_str(), subscriber = id, "subscriber queue full, event dropped");
                }
                Err(TrySendError::Closed(_)) => gone.push(*id),
            }
        }
        for id in gone {
            subscribers.remove(&id);
            debug!(channel = channel.as_str(), subscriber = id, "removed closed subscriber");
        }
        delivered
    }

    pub fn publish_chart_update(&self) -> usize {
        self.publish(Channel::Charts, BroadcastEvent::ChartUpdate)
    }

    pub fn publish_log(&self, line: LogLine) -> usize {
        self.publish(Channel::Logs, BroadcastEvent::LogLine(line))
    }

    pub fn log(&self, level: LogLevel, source: &str, message: impl Into<String>) -> usize {
        self.publish_log(LogLine::new(level, source, message))
    }

    /// Registers a new subscriber. Only events published after this call are
    /// seen; dropping the subscription unregisters it.
    pub fn subscribe(&self, channel: Channel) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        self.slot(channel).subscribers.lock().insert(id, tx);
        debug!(channel = channel.as_str(), subscriber = id, "subscriber registered");

        Subscription { id, channel, rx, hub: self.clone() }
    }

    pub fn subscriber_count(&self, channel: Channel) -> usize {
        self.slot(channel).subscribers.lock().len()
    }

    pub fn dropped_events(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    fn unsubscribe(&self, channel: Channel, id: u64) {
        if self.slot(channel).subscribers.lock().remove(&id).is_some() {
            debug!(channel = channel.as_str(), subscriber = id, "subscriber unregistered");
        }
    }
}

/// Endless stream of events for one subscriber.
pub struct Subscription {
    id: u64,
    channel: Channel,
    rx: mpsc::Receiver<BroadcastEvent>,
    hub: EventHub,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Waits for the next event. The subscription keeps its own queue
    /// registered, so this never yields `None` while it is alive.
    pub async fn recv(&mut self) -> Option<BroadcastEvent> {
        self.rx.recv().await
    }
}

impl Stream for Subscription {
    type Item = BroadcastEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.channel, self.id);
    }
}
