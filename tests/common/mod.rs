//! Shared mocks for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use importer_core::broadcast::{ClientSocket, SocketError};
use importer_core::cache::{CacheError, CacheResult, CacheService};
use importer_core::dispatcher::{
    FollowUpJob, HealthMonitor, JobQueue, QueueError, ServiceHealth,
};
use importer_core::events::{StatusEvent, StatusPublisher};
use importer_core::services::{NoteParser, NoteRepository, ParsedNote, StatusRepository};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("importer_core=debug")
        .with_test_writer()
        .try_init();
}

pub fn sample_note() -> ParsedNote {
    ParsedNote {
        title: "Tomato Soup".to_string(),
        ingredients: vec!["4 tomatoes".to_string(), "1 onion".to_string()],
        instructions: vec!["Chop".to_string(), "Simmer".to_string()],
        images: vec!["https://img.example/soup.jpg".to_string()],
        tags: vec!["soup".to_string()],
    }
}

/// Socket that records every frame it is handed
#[derive(Default)]
pub struct MockSocket {
    texts: Mutex<Vec<String>>,
    pings: AtomicUsize,
    closed: Mutex<Option<(u16, String)>>,
    broken: AtomicBool,
}

impl MockSocket {
    /// Subsequent sends fail as if the peer vanished
    pub fn break_connection(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<Value> {
        self.texts
            .lock()
            .iter()
            .map(|text| serde_json::from_str(text).expect("frames are JSON"))
            .collect()
    }

    pub fn messages_of_type(&self, message_type: &str) -> Vec<Value> {
        self.messages()
            .into_iter()
            .filter(|m| m["type"] == message_type)
            .collect()
    }

    pub fn ping_count(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub fn close_frame(&self) -> Option<(u16, String)> {
        self.closed.lock().clone()
    }
}

impl ClientSocket for MockSocket {
    fn send_text(&self, text: String) -> Result<(), SocketError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(SocketError::Closed);
        }
        self.texts.lock().push(text);
        Ok(())
    }

    fn send_ping(&self) -> Result<(), SocketError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(SocketError::Closed);
        }
        self.pings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self, code: u16, reason: &str) {
        *self.closed.lock() = Some((code, reason.to_string()));
    }

    fn is_open(&self) -> bool {
        !self.broken.load(Ordering::SeqCst) && self.closed.lock().is_none()
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<StatusEvent>>,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<StatusEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl StatusPublisher for RecordingPublisher {
    async fn publish(&self, event: StatusEvent) {
        self.events.lock().push(event);
    }
}

/// Parser returning a fixed note, optionally failing or coming back empty first
pub struct StubParser {
    note: ParsedNote,
    failures_remaining: AtomicUsize,
    empties_remaining: AtomicUsize,
    calls: AtomicUsize,
}

impl StubParser {
    pub fn new(note: ParsedNote) -> Self {
        Self {
            note,
            failures_remaining: AtomicUsize::new(0),
            empties_remaining: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn empty_first(note: ParsedNote, empties: usize) -> Self {
        Self {
            empties_remaining: AtomicUsize::new(empties),
            ..Self::new(note)
        }
    }

    pub fn failing_first(note: ParsedNote, failures: usize) -> Self {
        Self {
            failures_remaining: AtomicUsize::new(failures),
            ..Self::new(note)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NoteParser for StubParser {
    async fn parse(&self, _html: &str) -> anyhow::Result<ParsedNote> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            anyhow::bail!("parser service timed out");
        }
        let empties = self.empties_remaining.load(Ordering::SeqCst);
        if empties > 0 {
            self.empties_remaining.store(empties - 1, Ordering::SeqCst);
            return Ok(ParsedNote::default());
        }
        Ok(self.note.clone())
    }
}

#[derive(Default)]
pub struct InMemoryNotes {
    notes: Mutex<Vec<(String, ParsedNote)>>,
}

impl InMemoryNotes {
    pub fn saved(&self) -> Vec<(String, ParsedNote)> {
        self.notes.lock().clone()
    }
}

#[async_trait]
impl NoteRepository for InMemoryNotes {
    async fn save_note(&self, import_id: &str, note: &ParsedNote) -> anyhow::Result<String> {
        let mut notes = self.notes.lock();
        notes.push((import_id.to_string(), note.clone()));
        Ok(format!("note-{}", notes.len()))
    }
}

#[derive(Default)]
pub struct InMemoryStatusStore {
    events: Mutex<Vec<StatusEvent>>,
    fail: AtomicBool,
}

impl InMemoryStatusStore {
    pub fn failing() -> Self {
        Self {
            fail: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<StatusEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl StatusRepository for InMemoryStatusStore {
    async fn record_status(&self, event: &StatusEvent) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("database unavailable");
        }
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// Downstream queue that fails for selected queue names
#[derive(Default)]
pub struct RecordingQueue {
    jobs: Mutex<Vec<FollowUpJob>>,
    unavailable: HashSet<&'static str>,
}

impl RecordingQueue {
    pub fn failing_for(queues: &[&'static str]) -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            unavailable: queues.iter().copied().collect(),
        }
    }

    pub fn jobs(&self) -> Vec<FollowUpJob> {
        self.jobs.lock().clone()
    }
}

#[async_trait]
impl JobQueue for RecordingQueue {
    async fn enqueue(&self, job: FollowUpJob) -> Result<String, QueueError> {
        let queue = job.queue.queue_name();
        if self.unavailable.contains(queue) {
            return Err(QueueError::Unavailable {
                queue: queue.to_string(),
                message: "connection refused".to_string(),
            });
        }
        let mut jobs = self.jobs.lock();
        jobs.push(job);
        Ok(format!("{queue}-{}", jobs.len()))
    }
}

pub struct StaticHealth {
    pub healthy: bool,
}

#[async_trait]
impl HealthMonitor for StaticHealth {
    async fn check_health(&self) -> ServiceHealth {
        ServiceHealth {
            healthy: self.healthy,
            checks: BTreeMap::new(),
        }
    }
}

/// External tier kept in a map; TTLs are ignored
#[derive(Default)]
pub struct InMemoryCacheService {
    entries: Mutex<HashMap<String, String>>,
}

impl InMemoryCacheService {
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.entries.lock().insert(key.to_string(), value.to_string());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }
}

impl CacheService for InMemoryCacheService {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str, _ttl: Duration) -> CacheResult<()> {
        self.insert_raw(key, value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> CacheResult<u64> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|key, _| !key.contains(pattern));
        Ok((before - entries.len()) as u64)
    }

    async fn clear(&self) -> CacheResult<u64> {
        let mut entries = self.entries.lock();
        let count = entries.len() as u64;
        entries.clear();
        Ok(count)
    }

    async fn health_check(&self) -> CacheResult<bool> {
        Ok(true)
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }

    fn is_distributed(&self) -> bool {
        true
    }
}

/// External tier that fails every call
#[derive(Default)]
pub struct UnreachableCacheService;

impl CacheService for UnreachableCacheService {
    async fn get(&self, _key: &str) -> CacheResult<Option<String>> {
        Err(CacheError::ConnectionError("connection refused".into()))
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> CacheResult<()> {
        Err(CacheError::ConnectionError("connection refused".into()))
    }

    async fn delete(&self, _key: &str) -> CacheResult<()> {
        Err(CacheError::ConnectionError("connection refused".into()))
    }

    async fn delete_pattern(&self, _pattern: &str) -> CacheResult<u64> {
        Err(CacheError::Timeout("SCAN timed out".into()))
    }

    async fn clear(&self) -> CacheResult<u64> {
        Err(CacheError::ConnectionError("connection refused".into()))
    }

    async fn health_check(&self) -> CacheResult<bool> {
        Err(CacheError::ConnectionError("connection refused".into()))
    }

    fn provider_name(&self) -> &'static str {
        "unreachable"
    }
}
