//! Push connection management.
//!
//! Each accepted connection gets its own bus subscription and one delivery
//! task. The task drains the subscription into the connection's transport
//! until the transport fails or the connection is closed, then cleans up
//! after itself. One connection's fault never reaches the publisher or any
//! other connection.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::{watch, Notify};
use uuid::Uuid;

use super::{EventBus, EventFrame, EventTransport, Subscription, TransportError};
use crate::errors::Error;

pub type ConnectionId = Uuid;

/// `Connecting -> Open -> Closed`. Closed is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

struct Connection {
    id: ConnectionId,
    filter: Option<String>,
    state: watch::Sender<ConnectionState>,
    close_requested: Notify,
}

impl Connection {
    fn transition(&self, next: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == ConnectionState::Closed || *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}

/// Caller-side view of one push connection.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<Connection>,
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.inner.id)
            .field("filter", &self.inner.filter)
            .field("state", &self.state())
            .finish()
    }
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    pub fn filter(&self) -> Option<&str> {
        self.inner.filter.as_deref()
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Asks the delivery loop to stop. Safe to call repeatedly.
    pub fn close(&self) {
        if self.state() != ConnectionState::Closed {
            self.inner.close_requested.notify_one();
        }
    }

    /// Resolves once the connection has reached `Closed`.
    pub async fn closed(&self) {
        let mut rx = self.inner.state.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|state| *state == ConnectionState::Closed).await;
    }
}

enum CloseReason {
    Requested,
    Unsubscribed,
    Transport(TransportError),
}

pub struct SubscriptionDispatcher {
    bus: EventBus,
    connections: Arc<DashMap<ConnectionId, ConnectionHandle>>,
}

impl SubscriptionDispatcher {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            connections: Arc::new(DashMap::new()),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Registers a connection and starts delivering matching events to it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn accept<T: EventTransport>(&self, transport: T, filter: Option<String>) -> ConnectionHandle {
        let (state, _) = watch::channel(ConnectionState::Connecting);
        let connection = Arc::new(Connection {
            id: Uuid::new_v4(),
            filter: filter.clone(),
            state,
            close_requested: Notify::new(),
        });
        let handle = ConnectionHandle {
            inner: Arc::clone(&connection),
        };

        let subscription = self.bus.subscribe(filter);
        connection.transition(ConnectionState::Open);
        self.connections.insert(connection.id, handle.clone());
        info!(
            "Push connection {} open (filter: {:?}, subscriber {})",
            connection.id,
            connection.filter,
            subscription.id()
        );

        tokio::spawn(deliver(
            connection,
            subscription,
            transport,
            Arc::clone(&self.connections),
        ));
        handle
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Requests every open connection to close. Returns how many were asked.
    pub fn close_all(&self) -> usize {
        let handles: Vec<ConnectionHandle> = self
            .connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for handle in &handles {
            handle.close();
        }
        if !handles.is_empty() {
            info!("Closing {} push connection(s)", handles.len());
        }
        handles.len()
    }
}

async fn deliver<T: EventTransport>(
    connection: Arc<Connection>,
    mut subscription: Subscription,
    mut transport: T,
    registry: Arc<DashMap<ConnectionId, ConnectionHandle>>,
) {
    let reason = loop {
        let event = tokio::select! {
            biased;
            _ = connection.close_requested.notified() => break CloseReason::Requested,
            next = subscription.recv() => match next {
                Some(event) => event,
                None => break CloseReason::Unsubscribed,
            },
        };

        // A slow client can park the write indefinitely; close must still win.
        let frame = EventFrame::from(event.as_ref());
        tokio::select! {
            biased;
            _ = connection.close_requested.notified() => break CloseReason::Requested,
            sent = transport.send(frame) => {
                if let Err(err) = sent {
                    break CloseReason::Transport(err);
                }
            }
        }
    };

    drop(subscription);
    transport.close().await;
    registry.remove(&connection.id);
    connection.transition(ConnectionState::Closed);

    match reason {
        CloseReason::Requested => debug!("Push connection {} closed on request", connection.id),
        CloseReason::Unsubscribed => {
            debug!("Push connection {} lost its subscription", connection.id)
        }
        CloseReason::Transport(err) => match Error::from(err) {
            err @ Error::RoutineDisconnect(_) => {
                debug!("Push connection {} closed: {}", connection.id, err)
            }
            err => warn!("Push connection {} closed after write fault: {}", connection.id, err),
        },
    }
}
