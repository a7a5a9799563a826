//! Broadcast router: per-connection outbound queues and event fan-out.
//!
//! Each connection gets one bounded FIFO queue, drained by that
//! connection's writer task. Delivery never waits: a full queue (slow
//! socket) or a closed one (writer gone) drops the frame for that
//! connection only.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tabletop_protocol::{DomainEvent, ServerFrame};
use tabletop_transport::ConnectionId;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::{RoomError, RoomRegistry};

/// Outbound queue depth used when none is configured.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// The receiving end of a connection's outbound queue.
pub type OutboundReceiver = mpsc::Receiver<Arc<ServerFrame>>;

/// What one [`BroadcastRouter::publish`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Connections the event was queued for.
    pub delivered: usize,
    /// Connections whose queue was full or closed.
    pub dropped: usize,
}

/// Fans domain events out to the members of their scoped rooms.
#[derive(Debug)]
pub struct BroadcastRouter {
    sinks: HashMap<ConnectionId, mpsc::Sender<Arc<ServerFrame>>>,
    capacity: usize,
}

impl Default for BroadcastRouter {
    fn default() -> Self {
        Self::new(DEFAULT_OUTBOUND_CAPACITY)
    }
}

impl BroadcastRouter {
    pub fn new(capacity: usize) -> Self {
        Self {
            sinks: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Opens the outbound queue of a new connection.
    ///
    /// Registering the same connection again replaces its queue; the old
    /// receiver sees the channel close.
    pub fn register(&mut self, conn: ConnectionId) -> OutboundReceiver {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.sinks.insert(conn, tx);
        rx
    }

    /// Closes a connection's queue. Frames already queued still drain.
    pub fn unregister(&mut self, conn: ConnectionId) -> bool {
        self.sinks.remove(&conn).is_some()
    }

    pub fn is_registered(&self, conn: ConnectionId) -> bool {
        self.sinks.contains_key(&conn)
    }

    /// Queues a frame for one connection without waiting.
    pub fn send_to(&self, conn: ConnectionId, frame: Arc<ServerFrame>) -> Result<(), RoomError> {
        let sink = self
            .sinks
            .get(&conn)
            .ok_or(RoomError::UnknownConnection(conn))?;
        sink.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => RoomError::QueueFull(conn),
            TrySendError::Closed(_) => RoomError::QueueClosed(conn),
        })
    }

    /// Delivers `event` to every current member of its scoped rooms.
    ///
    /// A connection that sits in several of those rooms gets the event
    /// once. Failed deliveries are dropped and counted, never retried.
    pub fn publish<R: RoomRegistry>(&self, registry: &R, event: DomainEvent) -> PublishReport {
        let targets: BTreeSet<ConnectionId> = event
            .rooms()
            .iter()
            .flat_map(|room| registry.members(room))
            .collect();

        let event_type = event.event_type;
        let frame = Arc::new(ServerFrame::Event(event));
        let mut report = PublishReport::default();

        for conn in targets {
            match self.send_to(conn, Arc::clone(&frame)) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.dropped += 1;
                    tracing::debug!(conn_id = %conn, %event_type, error = %e, "event dropped");
                }
            }
        }

        tracing::debug!(
            %event_type,
            delivered = report.delivered,
            dropped = report.dropped,
            "event published"
        );
        report
    }
}
