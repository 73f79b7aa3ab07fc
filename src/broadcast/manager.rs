//! Broadcast manager
//!
//! Owns the client registry and pushes status events to every connected
//! client. Critical events go out immediately; everything else is collected
//! into batches and subject to a per-client rate limit.
//!
//! All registry mutation goes through this type. The manager is a cheap
//! `Clone` handle; timers hold a `Weak` reference so dropping the last handle
//! stops them.

use super::client::{ClientEntry, ClientId, ClientInfo, ClientSocket, SocketError};
use super::wire::{ClientMessage, OptimizedStatusEvent, ServerMessage};
use crate::config::BroadcastConfig;
use crate::constants::close_codes;
use crate::events::{StatusEvent, StatusPublisher};
use crate::logging::log_broadcast_operation;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastStats {
    pub connected_clients: usize,
    pub pending_events: usize,
    pub batches_sent: u64,
    pub messages_sent: u64,
    pub messages_dropped: u64,
}

#[derive(Default)]
struct PendingBatch {
    events: Vec<StatusEvent>,
    flush_scheduled: bool,
}

struct Inner {
    config: BroadcastConfig,
    clients: DashMap<ClientId, ClientEntry>,
    /// Serializes the capacity check with the insert
    admission: Mutex<()>,
    pending: Mutex<PendingBatch>,
    next_batch_id: AtomicU64,
    heartbeat_task: Mutex<Option<JoinHandle<()>>>,
    flush_task: Mutex<Option<JoinHandle<()>>>,
    batches_sent: AtomicU64,
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
    shutting_down: AtomicBool,
}

/// Delivery result for one client
enum Delivery {
    Sent,
    RateLimited,
    Backpressure,
    Gone,
}

#[derive(Clone)]
pub struct BroadcastManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for BroadcastManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastManager")
            .field("config", &self.inner.config)
            .field("connected_clients", &self.inner.clients.len())
            .finish()
    }
}

impl BroadcastManager {
    pub fn new(config: BroadcastConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                clients: DashMap::new(),
                admission: Mutex::new(()),
                pending: Mutex::new(PendingBatch::default()),
                next_batch_id: AtomicU64::new(0),
                heartbeat_task: Mutex::new(None),
                flush_task: Mutex::new(None),
                batches_sent: AtomicU64::new(0),
                messages_sent: AtomicU64::new(0),
                messages_dropped: AtomicU64::new(0),
                shutting_down: AtomicBool::new(false),
            }),
        }
    }

    fn from_inner(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    pub fn config(&self) -> &BroadcastConfig {
        &self.inner.config
    }

    /// Spawn the heartbeat sweep; must be called inside a Tokio runtime
    pub fn start(&self) {
        let mut slot = self.inner.heartbeat_task.lock();
        if slot.is_some() {
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        let interval = self.inner.config.heartbeat_interval();
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                BroadcastManager::from_inner(inner).sweep_heartbeats();
            }
        }));

        info!(
            heartbeat_interval_ms = self.inner.config.heartbeat_interval_ms,
            max_clients = self.inner.config.max_clients,
            "Broadcast manager started"
        );
    }

    /// Admit a connection, or close it with 1013 when at capacity
    ///
    /// On admission the client receives a `connection_established` message
    /// carrying its identifier.
    pub fn register_client(&self, socket: Arc<dyn ClientSocket>) -> Option<ClientId> {
        if self.inner.shutting_down.load(Ordering::Acquire) {
            socket.close(close_codes::GOING_AWAY, close_codes::SHUTDOWN_REASON);
            return None;
        }

        let client_id = {
            let admission = self.inner.admission.lock();
            if self.inner.clients.len() >= self.inner.config.max_clients {
                drop(admission);
                warn!(
                    max_clients = self.inner.config.max_clients,
                    "Rejecting connection, client limit reached"
                );
                socket.close(
                    close_codes::TRY_AGAIN_LATER,
                    close_codes::TOO_MANY_CONNECTIONS_REASON,
                );
                return None;
            }

            let client_id = Uuid::new_v4().to_string();
            self.inner.clients.insert(
                client_id.clone(),
                ClientEntry {
                    socket: Arc::clone(&socket),
                    connected_at: Utc::now(),
                    last_message_time: None,
                    last_heartbeat: Instant::now(),
                },
            );
            client_id
        };

        log_broadcast_operation("connect", Some(&client_id), self.inner.clients.len());

        let welcome = ServerMessage::ConnectionEstablished {
            client_id: client_id.clone(),
            message: "Connected to import status updates".to_string(),
        };
        // the welcome does not count against the rate limit
        match welcome.to_json() {
            Ok(text) => match socket.send_text(text) {
                Ok(()) => {
                    self.inner.messages_sent.fetch_add(1, Ordering::Relaxed);
                }
                Err(SocketError::Closed) => {
                    self.drop_client(&client_id, close_codes::SEND_FAILED_REASON);
                    return None;
                }
                Err(SocketError::Backpressure) => {
                    warn!(client_id = %client_id, "Welcome message dropped, client buffer full");
                }
            },
            Err(e) => warn!(error = %e, "Failed to serialize welcome message"),
        }

        Some(client_id)
    }

    /// Remove a client and close its socket; returns whether it was registered
    pub fn remove_client(&self, client_id: &str) -> bool {
        self.close_and_remove(client_id, close_codes::NORMAL, close_codes::REMOVED_REASON)
    }

    fn drop_client(&self, client_id: &str, reason: &str) -> bool {
        self.close_and_remove(client_id, close_codes::GOING_AWAY, reason)
    }

    fn close_and_remove(&self, client_id: &str, code: u16, reason: &str) -> bool {
        let Some((_, entry)) = self.inner.clients.remove(client_id) else {
            return false;
        };
        entry.socket.close(code, reason);
        log_broadcast_operation("disconnect", Some(client_id), self.inner.clients.len());
        true
    }

    pub fn client_count(&self) -> usize {
        self.inner.clients.len()
    }

    pub fn clients(&self) -> Vec<ClientInfo> {
        self.inner
            .clients
            .iter()
            .map(|entry| ClientInfo {
                id: entry.key().clone(),
                connected_at: entry.connected_at,
                last_message_time: entry.last_message_time,
                last_heartbeat: entry.last_heartbeat,
                is_alive: entry.socket.is_open(),
            })
            .collect()
    }

    /// Route one event: critical events go out now, the rest are batched
    pub fn broadcast_status(&self, event: StatusEvent) {
        if self.inner.shutting_down.load(Ordering::Acquire) {
            return;
        }
        if self.inner.clients.is_empty() {
            debug!(
                import_id = %event.import_id,
                status = %event.status,
                "No connected clients, skipping broadcast"
            );
            return;
        }

        if event.is_critical() {
            let message = ServerMessage::status_update(&event);
            let delivered = self.deliver_to_all(&message, true);
            trace!(
                import_id = %event.import_id,
                status = %event.status,
                delivered = delivered,
                "Critical status broadcast"
            );
            return;
        }

        let schedule = {
            let mut pending = self.inner.pending.lock();
            pending.events.push(event);
            if pending.flush_scheduled {
                false
            } else {
                pending.flush_scheduled = true;
                true
            }
        };
        if schedule {
            self.schedule_flush();
        }
    }

    fn schedule_flush(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            self.flush_pending();
            return;
        };

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let delay = self.inner.config.batch_delay();
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                BroadcastManager::from_inner(inner).flush_pending();
            }
        });
        // a running flush rescheduling itself has no await left, so aborting it is a no-op
        if let Some(previous) = self.inner.flush_task.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Send up to `max_batch_size` pending events as one batch
    ///
    /// Any remainder is left for another scheduled flush. Returns the number
    /// of events sent.
    pub fn flush_pending(&self) -> usize {
        let (batch, remaining) = {
            let mut pending = self.inner.pending.lock();
            let take = pending.events.len().min(self.inner.config.max_batch_size.max(1));
            let batch: Vec<StatusEvent> = pending.events.drain(..take).collect();
            let remaining = !pending.events.is_empty();
            pending.flush_scheduled = remaining;
            (batch, remaining)
        };

        if batch.is_empty() {
            return 0;
        }

        let batch_id = self.inner.next_batch_id.fetch_add(1, Ordering::Relaxed) + 1;
        let count = batch.len();
        let message = ServerMessage::StatusUpdateBatch {
            events: batch.iter().map(OptimizedStatusEvent::from).collect(),
            batch_id,
            timestamp: Utc::now().timestamp_millis(),
        };
        let delivered = self.deliver_to_all(&message, false);
        self.inner.batches_sent.fetch_add(1, Ordering::Relaxed);
        debug!(
            batch_id = batch_id,
            events = count,
            delivered = delivered,
            "Status batch flushed"
        );

        if remaining {
            self.schedule_flush();
        }
        count
    }

    /// Send a message to one client; returns whether it was handed to the socket
    pub fn send_to_client(&self, client_id: &str, message: &ServerMessage, critical: bool) -> bool {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Failed to serialize broadcast message");
                return false;
            }
        };
        matches!(self.deliver(client_id, text, critical), Delivery::Sent)
    }

    fn deliver_to_all(&self, message: &ServerMessage, critical: bool) -> usize {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Failed to serialize broadcast message");
                return 0;
            }
        };

        let ids: Vec<ClientId> = self.inner.clients.iter().map(|e| e.key().clone()).collect();
        ids.iter()
            .filter(|id| matches!(self.deliver(id, text.clone(), critical), Delivery::Sent))
            .count()
    }

    fn deliver(&self, client_id: &str, text: String, critical: bool) -> Delivery {
        let now = Instant::now();
        let socket = {
            let Some(entry) = self.inner.clients.get(client_id) else {
                return Delivery::Gone;
            };
            if !critical {
                if let Some(last) = entry.last_message_time {
                    if now.saturating_duration_since(last) < self.inner.config.rate_limit() {
                        drop(entry);
                        self.inner.messages_dropped.fetch_add(1, Ordering::Relaxed);
                        trace!(client_id = %client_id, "Rate limited, dropping message");
                        return Delivery::RateLimited;
                    }
                }
            }
            Arc::clone(&entry.socket)
        };

        match socket.send_text(text) {
            Ok(()) => {
                if let Some(mut entry) = self.inner.clients.get_mut(client_id) {
                    entry.last_message_time = Some(now);
                }
                self.inner.messages_sent.fetch_add(1, Ordering::Relaxed);
                Delivery::Sent
            }
            Err(SocketError::Backpressure) => {
                self.inner.messages_dropped.fetch_add(1, Ordering::Relaxed);
                warn!(client_id = %client_id, "Client buffer full, dropping message");
                Delivery::Backpressure
            }
            Err(SocketError::Closed) => {
                warn!(client_id = %client_id, "Send failed, removing client");
                self.drop_client(client_id, close_codes::SEND_FAILED_REASON);
                Delivery::Gone
            }
        }
    }

    /// One heartbeat pass over all clients; returns how many were removed
    pub fn sweep_heartbeats(&self) -> usize {
        let now = Instant::now();
        let timeout = self.inner.config.heartbeat_timeout();

        let snapshot: Vec<(ClientId, Arc<dyn ClientSocket>, Instant)> = self
            .inner
            .clients
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(&e.socket), e.last_heartbeat))
            .collect();

        let mut removed = 0;
        for (client_id, socket, last_heartbeat) in snapshot {
            if now.saturating_duration_since(last_heartbeat) > timeout {
                debug!(client_id = %client_id, "Heartbeat timeout");
                if self.drop_client(&client_id, close_codes::HEARTBEAT_TIMEOUT_REASON) {
                    removed += 1;
                }
                continue;
            }

            if !socket.is_open() {
                if self.drop_client(&client_id, close_codes::REMOVED_REASON) {
                    removed += 1;
                }
                continue;
            }

            match socket.send_ping() {
                Ok(()) => {
                    if let Some(mut entry) = self.inner.clients.get_mut(&client_id) {
                        entry.last_heartbeat = now;
                    }
                }
                Err(e) => {
                    warn!(client_id = %client_id, error = %e, "Ping failed, removing client");
                    if self.drop_client(&client_id, close_codes::PING_FAILED_REASON) {
                        removed += 1;
                    }
                }
            }
        }

        if removed > 0 {
            debug!(
                removed = removed,
                connected_clients = self.inner.clients.len(),
                "Heartbeat sweep removed clients"
            );
        }
        removed
    }

    /// Any inbound frame counts as a sign of life
    pub fn record_heartbeat(&self, client_id: &str) {
        if let Some(mut entry) = self.inner.clients.get_mut(client_id) {
            entry.last_heartbeat = Instant::now();
        }
    }

    /// Handle a text frame from a client
    pub fn handle_client_message(&self, client_id: &str, text: &str) {
        self.record_heartbeat(client_id);

        match ClientMessage::parse(text) {
            Some(ClientMessage::Ping { .. }) => {
                let pong = ServerMessage::Pong {
                    timestamp: Utc::now().timestamp_millis(),
                };
                self.send_to_client(client_id, &pong, true);
            }
            Some(ClientMessage::Unknown) => {
                trace!(client_id = %client_id, "Ignoring unknown client message type");
            }
            None => {
                debug!(client_id = %client_id, "Ignoring malformed client message");
            }
        }
    }

    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            connected_clients: self.inner.clients.len(),
            pending_events: self.inner.pending.lock().events.len(),
            batches_sent: self.inner.batches_sent.load(Ordering::Relaxed),
            messages_sent: self.inner.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.inner.messages_dropped.load(Ordering::Relaxed),
        }
    }

    /// Stop timers, close every client and clear all state
    pub fn shutdown(&self) {
        if self.inner.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(handle) = self.inner.heartbeat_task.lock().take() {
            handle.abort();
        }
        if let Some(handle) = self.inner.flush_task.lock().take() {
            handle.abort();
        }

        let closed = self.inner.clients.len();
        for entry in self.inner.clients.iter() {
            entry
                .socket
                .close(close_codes::GOING_AWAY, close_codes::SHUTDOWN_REASON);
        }
        self.inner.clients.clear();

        {
            let mut pending = self.inner.pending.lock();
            pending.events.clear();
            pending.flush_scheduled = false;
        }

        info!(closed_clients = closed, "Broadcast manager shut down");
    }
}

#[async_trait]
impl StatusPublisher for BroadcastManager {
    async fn publish(&self, event: StatusEvent) {
        self.broadcast_status(event);
    }
}
