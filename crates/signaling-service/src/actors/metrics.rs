//! Actor metrics and mailbox monitoring.
//!
//! | Actor      | Elevated above | Critical above |
//! |------------|----------------|----------------|
//! | Hub        | 500            | 2000           |
//! | Connection | 64             | 192            |
//!
//! The hub serializes every mutation for the whole process, so its
//! thresholds sit well above a single connection's. A monitor logs once per
//! level change rather than once per message.

use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Depth bounds for one actor type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxThresholds {
    pub elevated: usize,
    pub critical: usize,
}

pub const HUB_THRESHOLDS: MailboxThresholds = MailboxThresholds {
    elevated: 500,
    critical: 2000,
};

pub const CONNECTION_THRESHOLDS: MailboxThresholds = MailboxThresholds {
    elevated: 64,
    critical: 192,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorType {
    /// `SignalingHubActor` (singleton).
    Hub,
    /// `ConnectionActor` (one per WebSocket).
    Connection,
}

impl ActorType {
    /// Metric label value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ActorType::Hub => "hub",
            ActorType::Connection => "connection",
        }
    }

    #[must_use]
    pub const fn thresholds(&self) -> MailboxThresholds {
        match self {
            ActorType::Hub => HUB_THRESHOLDS,
            ActorType::Connection => CONNECTION_THRESHOLDS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum MailboxLevel {
    Normal = 0,
    Elevated = 1,
    Critical = 2,
}

impl MailboxLevel {
    fn for_depth(depth: usize, thresholds: MailboxThresholds) -> Self {
        if depth > thresholds.critical {
            MailboxLevel::Critical
        } else if depth > thresholds.elevated {
            MailboxLevel::Elevated
        } else {
            MailboxLevel::Normal
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            2 => MailboxLevel::Critical,
            1 => MailboxLevel::Elevated,
            _ => MailboxLevel::Normal,
        }
    }
}

/// Queue depth, throughput and drops for one actor's mailbox.
#[derive(Debug)]
pub struct MailboxMonitor {
    actor_type: ActorType,
    actor_id: String,
    depth: AtomicUsize,
    peak_depth: AtomicUsize,
    level: AtomicU8,
    processed: AtomicU64,
    dropped: AtomicU64,
}

impl MailboxMonitor {
    #[must_use]
    pub fn new(actor_type: ActorType, actor_id: impl Into<String>) -> Self {
        Self {
            actor_type,
            actor_id: actor_id.into(),
            depth: AtomicUsize::new(0),
            peak_depth: AtomicUsize::new(0),
            level: AtomicU8::new(MailboxLevel::Normal as u8),
            processed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn record_enqueue(&self) {
        let depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_depth.fetch_max(depth, Ordering::Relaxed);
        self.observe(depth);
    }

    pub fn record_dequeue(&self) {
        let depth = self.depth.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.observe(depth);
    }

    /// A message that never entered the mailbox because it was full.
    pub fn record_drop(&self) {
        let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(
            target: "signaling.actor.mailbox",
            actor_type = self.actor_type.as_str(),
            actor_id = %self.actor_id,
            dropped = dropped,
            "Mailbox full, message dropped"
        );
    }

    #[must_use]
    pub fn current_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn peak_depth(&self) -> usize {
        self.peak_depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn messages_dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn current_level(&self) -> MailboxLevel {
        MailboxLevel::from_u8(self.level.load(Ordering::Relaxed))
    }

    /// Store the level for `depth` and log if it changed.
    fn observe(&self, depth: usize) {
        let next = MailboxLevel::for_depth(depth, self.actor_type.thresholds());
        let prev = MailboxLevel::from_u8(self.level.swap(next as u8, Ordering::Relaxed));
        if prev == next {
            return;
        }

        match next {
            MailboxLevel::Critical => warn!(
                target: "signaling.actor.mailbox",
                actor_type = self.actor_type.as_str(),
                actor_id = %self.actor_id,
                depth = depth,
                "Mailbox depth critical"
            ),
            MailboxLevel::Elevated | MailboxLevel::Normal => debug!(
                target: "signaling.actor.mailbox",
                actor_type = self.actor_type.as_str(),
                actor_id = %self.actor_id,
                depth = depth,
                from = ?prev,
                to = ?next,
                "Mailbox level changed"
            ),
        }
    }
}

/// Process-wide actor counters, shared by the hub and every connection
/// actor.
#[derive(Debug, Default)]
pub struct ActorMetrics {
    live_connection_actors: AtomicUsize,
    events_dropped: AtomicU64,
    panics: AtomicU64,
    messages_processed: AtomicU64,
}

impl ActorMetrics {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn connection_created(&self) {
        self.live_connection_actors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.live_connection_actors.fetch_sub(1, Ordering::Relaxed);
    }

    /// An outbound event that never reached its connection.
    pub fn record_event_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_panic(&self, actor_type: ActorType) {
        let total = self.panics.fetch_add(1, Ordering::Relaxed) + 1;
        error!(
            target: "signaling.actor.panic",
            actor_type = actor_type.as_str(),
            total_panics = total,
            "Actor task panicked"
        );
    }

    pub fn record_message_processed(&self) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Connection actors currently running.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.live_connection_actors.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.events_dropped.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn panic_count(&self) -> u64 {
        self.panics.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn processed_count(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }
}
