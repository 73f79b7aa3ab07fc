//! Note job dispatcher end to end against in-memory collaborators

mod common;

use common::{
    init_test_logging, sample_note, InMemoryNotes, MockSocket, RecordingPublisher,
    RecordingQueue, StaticHealth, StubParser,
};
use importer_core::actions::{ActionDependencies, RetryPolicy};
use importer_core::broadcast::BroadcastManager;
use importer_core::config::{BroadcastConfig, DispatcherConfig};
use importer_core::constants::{queues, ImportStatus};
use importer_core::dispatcher::{
    DownstreamQueue, ErrorCategory, Job, JobHandler, NoteJobDispatcher,
};
use importer_core::error::ErrorKind;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

struct Harness {
    parser: Arc<StubParser>,
    notes: Arc<InMemoryNotes>,
    events: Arc<RecordingPublisher>,
    queue: Arc<RecordingQueue>,
}

impl Harness {
    fn new(parser: StubParser, queue: RecordingQueue) -> Self {
        init_test_logging();
        Self {
            parser: Arc::new(parser),
            notes: Arc::new(InMemoryNotes::default()),
            events: Arc::new(RecordingPublisher::default()),
            queue: Arc::new(queue),
        }
    }

    fn deps(&self) -> ActionDependencies {
        ActionDependencies::new()
            .with_parser(self.parser.clone())
            .with_notes(self.notes.clone())
            .with_status(self.events.clone())
    }

    fn dispatcher(&self, healthy: bool) -> NoteJobDispatcher {
        NoteJobDispatcher::builder()
            .config(DispatcherConfig::default())
            .retry_policy(RetryPolicy::new(1, 10, 2.0, 1_000))
            .dependencies(self.deps())
            .health_monitor(Arc::new(StaticHealth { healthy }))
            .downstream_queue(self.queue.clone())
            .build()
            .expect("default pipeline resolves")
    }

    fn statuses(&self) -> Vec<ImportStatus> {
        self.events.events().iter().map(|e| e.status).collect()
    }
}

fn note_job(content: &str) -> Job {
    Job::new(
        "job-42",
        queues::NOTE_PROCESSING,
        json!({"importId": "imp-42", "content": content, "sourceName": "evernote"}),
    )
}

#[tokio::test]
async fn test_successful_import_saves_note_and_fans_out() {
    let harness = Harness::new(StubParser::new(sample_note()), RecordingQueue::default());
    let dispatcher = harness.dispatcher(true);

    let outcome = dispatcher
        .handle(&note_job("<h1>Tomato Soup</h1>"))
        .await
        .unwrap();

    assert_eq!(dispatcher.queue_name(), queues::NOTE_PROCESSING);
    assert_eq!(outcome.import_id, "imp-42");
    assert_eq!(outcome.note_id.as_deref(), Some("note-1"));
    assert!(outcome.fan_out.is_complete());
    assert_eq!(harness.notes.saved().len(), 1);

    let jobs = harness.queue.jobs();
    let targets: Vec<_> = jobs.iter().map(|j| (j.queue, j.priority)).collect();
    assert_eq!(
        targets,
        vec![
            (DownstreamQueue::IngredientParsing, 1),
            (DownstreamQueue::InstructionParsing, 1),
            (DownstreamQueue::ImageProcessing, 5),
            (DownstreamQueue::Categorization, 10),
        ]
    );
    assert_eq!(jobs[0].payload["noteId"], "note-1");
    assert_eq!(jobs[0].payload["parentJobId"], "job-42");
    assert_eq!(harness.statuses().last(), Some(&ImportStatus::Completed));
}

#[tokio::test]
async fn test_empty_content_fails_without_touching_parser_or_queue() {
    let harness = Harness::new(StubParser::new(sample_note()), RecordingQueue::default());
    let dispatcher = harness.dispatcher(true);

    let failure = assert_err!(dispatcher.process(&note_job("  \n ")).await);

    assert_eq!(failure.error.kind(), ErrorKind::Validation);
    assert_eq!(failure.classification.category, ErrorCategory::Permanent);
    assert!(failure.is_terminal());
    assert_eq!(failure.retry_after, None);
    assert_eq!(harness.parser.calls(), 0);
    assert!(harness.queue.jobs().is_empty());

    let events = harness.events.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, ImportStatus::Failed);
    assert_eq!(events[0].import_id, "imp-42");
    assert!(events[0].error_message.is_some());
}

#[tokio::test]
async fn test_malformed_payload_has_no_import_to_report() {
    let harness = Harness::new(StubParser::new(sample_note()), RecordingQueue::default());
    let dispatcher = harness.dispatcher(true);
    let job = Job::new("job-7", queues::NOTE_PROCESSING, json!({"content": 12}));

    let failure = assert_err!(dispatcher.process(&job).await);

    assert_eq!(failure.error.kind(), ErrorKind::Validation);
    assert_eq!(failure.error.job_id(), Some("job-7"));
    assert!(harness.events.events().is_empty());
}

#[tokio::test]
async fn test_unhealthy_dependencies_defer_the_job() {
    let harness = Harness::new(StubParser::new(sample_note()), RecordingQueue::default());
    let dispatcher = harness.dispatcher(false);

    let failure = dispatcher.process(&note_job("<p>soup</p>")).await.unwrap_err();

    assert_eq!(failure.error.kind(), ErrorKind::ServiceUnhealthy);
    assert_eq!(
        failure.classification.category,
        ErrorCategory::DependencyFailure
    );
    assert_eq!(failure.retry_after, Some(Duration::from_millis(20)));
    assert!(!failure.is_terminal());
    assert_eq!(harness.parser.calls(), 0);
    assert!(harness.events.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_parser_outage_retried_by_queue_until_final_attempt() {
    let harness = Harness::new(
        StubParser::failing_first(sample_note(), usize::MAX),
        RecordingQueue::default(),
    );
    let dispatcher = harness.dispatcher(true);

    let first = dispatcher.process(&note_job("<p>soup</p>")).await.unwrap_err();
    assert_eq!(first.error.kind(), ErrorKind::Execution);
    assert_eq!(first.error.operation(), "note_import");
    assert_eq!(first.retry_after, Some(Duration::from_millis(20)));
    assert_eq!(harness.parser.calls(), 2);
    assert!(!harness.statuses().contains(&ImportStatus::Failed));

    let last = dispatcher
        .process(&note_job("<p>soup</p>").with_attempts_made(2))
        .await
        .unwrap_err();
    assert!(last.classification.is_final_attempt);
    assert!(last.is_terminal());
    assert_eq!(last.retry_after, None);
    assert_eq!(harness.statuses().last(), Some(&ImportStatus::Failed));

    let failed = harness.events.events().pop().unwrap();
    assert_eq!(failed.metadata.unwrap()["attempts"], 3);
}

#[tokio::test]
async fn test_one_downstream_queue_down_does_not_fail_the_job() {
    let harness = Harness::new(
        StubParser::new(sample_note()),
        RecordingQueue::failing_for(&[queues::IMAGE_PROCESSING]),
    );
    let dispatcher = harness.dispatcher(true);

    let outcome = assert_ok!(dispatcher.process(&note_job("<p>soup</p>")).await);

    assert!(!outcome.fan_out.is_complete());
    assert_eq!(outcome.fan_out.enqueued.len(), 3);
    assert_eq!(outcome.fan_out.failed.len(), 1);
    let failure = &outcome.fan_out.failed[0];
    assert_eq!(failure.queue, DownstreamQueue::ImageProcessing);
    assert_eq!(failure.error_code, "SERVICE_UNHEALTHY");
    assert_eq!(harness.statuses().last(), Some(&ImportStatus::Completed));
}

#[tokio::test]
async fn test_progress_reaches_websocket_clients_immediately() {
    init_test_logging();
    let manager = BroadcastManager::new(BroadcastConfig::default());
    let socket = Arc::new(MockSocket::default());
    manager.register_client(socket.clone()).unwrap();

    let dispatcher = NoteJobDispatcher::builder()
        .dependencies(
            ActionDependencies::new()
                .with_parser(Arc::new(StubParser::new(sample_note())))
                .with_notes(Arc::new(InMemoryNotes::default()))
                .with_status(Arc::new(manager.clone())),
        )
        .build()
        .unwrap();

    dispatcher.process(&note_job("<p>soup</p>")).await.unwrap();

    let statuses: Vec<String> = socket
        .messages_of_type("status_update")
        .iter()
        .map(|m| m["data"]["s"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        statuses,
        vec!["PROCESSING", "PROCESSING", "PROCESSING", "COMPLETED"]
    );
    assert_eq!(manager.stats().pending_events, 0);
}
