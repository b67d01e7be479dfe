//! Cycle scenarios with scripted generator and recording transport mocks.

use async_trait::async_trait;
use digest_agent::generator::{GeneratorError, ReportGenerator};
use digest_agent::orchestrator::{CycleError, CycleOutcome, NotifyPolicy, Orchestrator};
use digest_agent::prompts::NO_NEWS_MESSAGE;
use report_pipeline::{
    ChangeDetection, ChunkedDelivery, MarkerAnchor, MessageTransport, ReportDiffer, ReportStore,
    SimilarityComparer, StoreError, TransportError, NO_UPDATE_PLACEHOLDER,
};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

// =============================================================================
// Mocks
// =============================================================================

/// Replays scripted replies in order; repeats the last one when exhausted.
struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<u32>,
}

impl ScriptedGenerator {
    fn new(replies: Vec<Result<String, String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(0),
        }
    }

    fn always(report: &str) -> Self {
        Self::new(vec![Ok(report.to_string())])
    }

    fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ReportGenerator for ScriptedGenerator {
    async fn generate(&self, _system: &str, _query: &str) -> Result<String, GeneratorError> {
        *self.calls.lock().unwrap() += 1;
        let mut replies = self.replies.lock().unwrap();
        let reply = if replies.len() > 1 {
            replies.pop_front().unwrap()
        } else {
            replies.front().cloned().unwrap()
        };
        reply.map_err(|body| GeneratorError::Api { status: 502, body })
    }
}

/// Records every chunk; fails the chunks whose 1-based send number is listed.
struct RecordingTransport {
    sent: Mutex<Vec<String>>,
    fail_on: Vec<usize>,
}

impl RecordingTransport {
    fn new() -> Self {
        Self::failing(vec![])
    }

    fn failing(fail_on: Vec<usize>) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_on,
        }
    }

    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    fn joined(&self) -> String {
        self.sent().concat()
    }
}

#[async_trait]
impl MessageTransport for RecordingTransport {
    async fn send(&self, text: &str) -> Result<(), TransportError> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(text.to_string());
        if self.fail_on.contains(&sent.len()) {
            return Err(TransportError::Status {
                status: 500,
                body: "Internal Server Error".to_string(),
            });
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

// =============================================================================
// Fixtures
// =============================================================================

const BODIES: [&str; 7] = [
    "Indie studio ships a roguelike demo (Source: IGN)",
    "Mobile revenue grew 12 percent this quarter (Source: Newzoo)",
    "Ankara jam drew forty teams (Source: Global Game Jam)",
    "Streamers praise a new horror title (Source: Twitch)",
    "Cloud gaming trial launched in Istanbul (Source: VRFocus)",
    "Feed roundup of studio blog posts (Source: Kotaku)",
    "Top downloads led by a puzzle game (Source: SteamDB)",
];

fn report(bodies: &[&str; 7]) -> String {
    bodies
        .iter()
        .enumerate()
        .map(|(i, body)| format!("{}) Title {}\n{}", i + 1, i + 1, body))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn base_report() -> String {
    report(&BODIES)
}

/// Section 3 rewritten completely.
fn changed_report() -> String {
    let mut bodies = BODIES;
    bodies[2] = "Publisher signs two Izmir teams for console ports (Source: Polygon)";
    report(&bodies)
}

fn orchestrator(
    dir: &TempDir,
    generator: ScriptedGenerator,
    transport: RecordingTransport,
) -> Orchestrator<ScriptedGenerator, RecordingTransport> {
    Orchestrator::new(
        generator,
        ChunkedDelivery::new(transport, 3900).unwrap(),
        ReportStore::in_dir(dir.path()),
    )
}

fn seed(dir: &TempDir, text: &str) {
    let store = ReportStore::in_dir(dir.path());
    store.save(text).unwrap();
    store.append(text).unwrap();
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_first_run_sends_full_report_and_persists() {
    let dir = TempDir::new().unwrap();
    let orch = orchestrator(
        &dir,
        ScriptedGenerator::always(&base_report()),
        RecordingTransport::new(),
    );

    let outcome = orch.run_cycle().await.unwrap();
    assert!(matches!(outcome, CycleOutcome::FirstRun { ref delivery } if delivery.is_success()));
    assert_eq!(orch.transport().joined(), base_report());
    assert_eq!(orch.store().load().unwrap(), base_report());
    assert_eq!(orch.store().history().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unchanged_report_sends_no_news_and_keeps_state() {
    let dir = TempDir::new().unwrap();
    seed(&dir, &base_report());

    // Same report, different whitespace
    let reflowed = base_report().replace('\n', "\n\n  ");
    let orch = orchestrator(
        &dir,
        ScriptedGenerator::always(&reflowed),
        RecordingTransport::new(),
    );

    let outcome = orch.run_cycle().await.unwrap();
    match outcome {
        CycleOutcome::Unchanged {
            notified: Some(delivery),
        } => assert!(delivery.is_success()),
        other => panic!("expected Unchanged with notification, got {other:?}"),
    }
    assert_eq!(orch.transport().sent(), vec![NO_NEWS_MESSAGE.to_string()]);
    assert_eq!(orch.store().load().unwrap(), base_report());
    assert_eq!(orch.store().history().unwrap().len(), 1);
}

#[tokio::test]
async fn test_second_identical_cycle_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let orch = orchestrator(
        &dir,
        ScriptedGenerator::always(&base_report()),
        RecordingTransport::new(),
    )
    .with_policy(NotifyPolicy::NotifyOnChange);

    orch.run_cycle().await.unwrap();
    let sent_after_first = orch.transport().sent().len();

    let outcome = orch.run_cycle().await.unwrap();
    assert_eq!(outcome, CycleOutcome::Unchanged { notified: None });
    assert_eq!(orch.transport().sent().len(), sent_after_first);
    assert_eq!(orch.store().history().unwrap().len(), 1);
}

#[tokio::test]
async fn test_changed_section_delivered_with_placeholders() {
    let dir = TempDir::new().unwrap();
    seed(&dir, &base_report());
    let orch = orchestrator(
        &dir,
        ScriptedGenerator::always(&changed_report()),
        RecordingTransport::new(),
    );

    let outcome = orch.run_cycle().await.unwrap();
    assert!(matches!(outcome, CycleOutcome::Updated { .. }));

    let message = orch.transport().joined();
    assert!(message.contains("3) Title 3\nPublisher signs two Izmir teams"));
    assert_eq!(message.matches(NO_UPDATE_PLACEHOLDER).count(), 6);
    assert!(message.starts_with("1) Title 1\nThere is no new update"));

    // Snapshot holds the full new report, not the reduced message
    assert_eq!(orch.store().load().unwrap(), changed_report());
    let history = orch.store().history().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].text, changed_report());
}

#[tokio::test]
async fn test_partial_delivery_failure_still_persists() {
    let dir = TempDir::new().unwrap();
    seed(&dir, &base_report());
    let orch = Orchestrator::new(
        ScriptedGenerator::always(&changed_report()),
        ChunkedDelivery::new(RecordingTransport::failing(vec![2]), 80).unwrap(),
        ReportStore::in_dir(dir.path()),
    );

    let outcome = orch.run_cycle().await.unwrap();
    let CycleOutcome::Updated { delivery } = outcome else {
        panic!("expected Updated, got {outcome:?}");
    };
    assert!(!delivery.is_success());
    assert_eq!(delivery.failed_count(), 1);
    assert!(delivery.attempted() > 2, "remaining chunks are still sent");
    assert_eq!(orch.store().load().unwrap(), changed_report());
    assert_eq!(orch.store().history().unwrap().len(), 2);
}

#[tokio::test]
async fn test_incomplete_report_retried_until_complete() {
    let dir = TempDir::new().unwrap();
    let truncated = base_report()
        .split("\n\n6)")
        .next()
        .unwrap()
        .to_string();
    let orch = orchestrator(
        &dir,
        ScriptedGenerator::new(vec![
            Ok(truncated.clone()),
            Ok(truncated),
            Ok(base_report()),
        ]),
        RecordingTransport::new(),
    );

    let outcome = orch.run_cycle().await.unwrap();
    assert!(matches!(outcome, CycleOutcome::FirstRun { .. }));
    assert_eq!(orch.generator().calls(), 3);
    assert_eq!(orch.transport().joined(), base_report());
}

#[tokio::test]
async fn test_incomplete_report_exhausts_attempts() {
    let dir = TempDir::new().unwrap();
    let truncated = base_report()
        .split("\n\n6)")
        .next()
        .unwrap()
        .to_string();
    let orch = orchestrator(
        &dir,
        ScriptedGenerator::always(&truncated),
        RecordingTransport::new(),
    );

    let err = orch.run_cycle().await.unwrap_err();
    match err {
        CycleError::IncompleteReport { attempts, missing } => {
            assert_eq!(attempts, 3);
            assert_eq!(missing, vec![6, 7]);
        }
        other => panic!("expected IncompleteReport, got {other:?}"),
    }
    assert!(orch.transport().sent().is_empty());
    assert!(orch.store().is_first_run().unwrap());
}

#[tokio::test]
async fn test_empty_output_aborts_without_retry() {
    let dir = TempDir::new().unwrap();
    let orch = orchestrator(
        &dir,
        ScriptedGenerator::always("  \n\t "),
        RecordingTransport::new(),
    );

    let outcome = orch.run_cycle().await.unwrap();
    assert_eq!(outcome, CycleOutcome::EmptyOutput);
    assert_eq!(orch.generator().calls(), 1);
    assert!(orch.transport().sent().is_empty());
    assert!(!orch.store().snapshot_path().exists());
}

#[tokio::test]
async fn test_generator_errors_consume_attempts() {
    let dir = TempDir::new().unwrap();
    let orch = orchestrator(
        &dir,
        ScriptedGenerator::new(vec![Err("bad gateway".to_string())]),
        RecordingTransport::new(),
    )
    .with_retry(2, Duration::ZERO);

    let err = orch.run_cycle().await.unwrap_err();
    assert!(matches!(err, CycleError::Generation { attempts: 2, .. }));
    assert_eq!(orch.generator().calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_retry_waits_between_attempts() {
    let dir = TempDir::new().unwrap();
    let orch = orchestrator(
        &dir,
        ScriptedGenerator::new(vec![Err("timeout".to_string()), Ok(base_report())]),
        RecordingTransport::new(),
    )
    .with_retry(3, Duration::from_secs(5));

    let started = tokio::time::Instant::now();
    let outcome = orch.run_cycle().await.unwrap();
    assert!(matches!(outcome, CycleOutcome::FirstRun { .. }));
    assert!(started.elapsed() >= Duration::from_secs(5));
}

#[tokio::test]
async fn test_suppress_policy_sends_only_changed_sections() {
    let dir = TempDir::new().unwrap();
    seed(&dir, &base_report());
    let orch = orchestrator(
        &dir,
        ScriptedGenerator::always(&changed_report()),
        RecordingTransport::new(),
    )
    .with_policy(NotifyPolicy::SuppressEmptySections);

    let outcome = orch.run_cycle().await.unwrap();
    assert!(matches!(outcome, CycleOutcome::Updated { .. }));
    assert_eq!(
        orch.transport().joined(),
        "3) Title 3\nPublisher signs two Izmir teams for console ports (Source: Polygon)"
    );
}

#[tokio::test]
async fn test_suppress_policy_with_only_minor_edits_sends_nothing() {
    let dir = TempDir::new().unwrap();
    seed(&dir, &base_report());
    let mut bodies = BODIES;
    bodies[1] = "Mobile revenue grew 13 percent this quarter (Source: Newzoo)";
    let orch = orchestrator(
        &dir,
        ScriptedGenerator::always(&report(&bodies)),
        RecordingTransport::new(),
    )
    .with_policy(NotifyPolicy::SuppressEmptySections);

    let outcome = orch.run_cycle().await.unwrap();
    assert_eq!(outcome, CycleOutcome::NothingToSend);
    assert!(orch.transport().sent().is_empty());
    // The accepted report is still recorded
    assert_eq!(orch.store().load().unwrap(), report(&bodies));
    assert_eq!(orch.store().history().unwrap().len(), 2);
}

#[tokio::test]
async fn test_added_lines_mode_sends_only_new_lines() {
    let dir = TempDir::new().unwrap();
    seed(&dir, &base_report());
    let with_extra = base_report().replace(
        "(Source: Global Game Jam)",
        "(Source: Global Game Jam)\nEskisehir jam announced for spring (Source: Global Game Jam)",
    );
    let orch = orchestrator(
        &dir,
        ScriptedGenerator::always(&with_extra),
        RecordingTransport::new(),
    )
    .with_detection(ChangeDetection::AddedLines);

    let outcome = orch.run_cycle().await.unwrap();
    assert!(matches!(outcome, CycleOutcome::Updated { .. }));
    let message = orch.transport().joined();
    assert!(message.starts_with("New updates ("));
    assert!(message.ends_with("Eskisehir jam announced for spring (Source: Global Game Jam)"));
    assert!(!message.contains("Title 1"));
}

#[tokio::test]
async fn test_process_escapes_markup_in_report() {
    let dir = TempDir::new().unwrap();
    let orch = orchestrator(
        &dir,
        ScriptedGenerator::always(""),
        RecordingTransport::new(),
    );

    let text = "1) R&D <news>\nbody";
    let outcome = orch.process(text).await.unwrap();
    assert!(matches!(outcome, CycleOutcome::FirstRun { .. }));
    assert_eq!(orch.transport().joined(), "1) R&amp;D &lt;news&gt;\nbody");
    // The snapshot keeps the raw text
    assert_eq!(orch.store().load().unwrap(), text);
}

#[tokio::test]
async fn test_unreadable_snapshot_is_fatal() {
    let dir = TempDir::new().unwrap();
    // A directory where the snapshot file should be
    std::fs::create_dir(dir.path().join("snapshot.txt")).unwrap();
    let orch = orchestrator(
        &dir,
        ScriptedGenerator::always(&base_report()),
        RecordingTransport::new(),
    );

    let err = orch.run_cycle().await.unwrap_err();
    assert!(matches!(err, CycleError::Store(StoreError::Io { .. })));
    assert!(orch.transport().sent().is_empty());
    assert!(!orch.store().history_path().exists());
}

#[tokio::test]
async fn test_unusable_state_dir_is_fatal() {
    let dir = TempDir::new().unwrap();
    let state = dir.path().join("state");
    // State directory path is taken by a regular file
    std::fs::write(&state, "not a directory").unwrap();
    let orch = Orchestrator::new(
        ScriptedGenerator::always(&base_report()),
        ChunkedDelivery::new(RecordingTransport::new(), 3900).unwrap(),
        ReportStore::in_dir(&state),
    );

    let err = orch.process(&base_report()).await.unwrap_err();
    assert!(matches!(err, CycleError::Store(StoreError::Io { .. })));
    assert!(orch.transport().sent().is_empty());
    assert!(!orch.store().history_path().exists());
}

#[tokio::test]
async fn test_completeness_check_follows_marker_anchor() {
    let inline = "Digest: 1) A x 2) B y 3) C z 4) D w 5) E v 6) F u 7) G t";

    let dir = TempDir::new().unwrap();
    let line_start = orchestrator(
        &dir,
        ScriptedGenerator::always(inline),
        RecordingTransport::new(),
    )
    .with_retry(1, Duration::ZERO);
    assert!(matches!(
        line_start.run_cycle().await,
        Err(CycleError::IncompleteReport { .. })
    ));

    let anywhere = orchestrator(
        &dir,
        ScriptedGenerator::always(inline),
        RecordingTransport::new(),
    )
    .with_differ(ReportDiffer::new(
        SimilarityComparer::default(),
        MarkerAnchor::Anywhere,
    ));
    let outcome = anywhere.run_cycle().await.unwrap();
    assert!(matches!(outcome, CycleOutcome::FirstRun { .. }));
    assert_eq!(anywhere.generator().calls(), 1);
}

#[tokio::test]
async fn test_heading_with_bold_markers_accepted() {
    let dir = TempDir::new().unwrap();
    let decorated = (1..=7)
        .map(|n| format!("### **{n}) Title {n}**\nBody {n} (Source: IGN)"))
        .collect::<Vec<_>>()
        .join("\n\n");
    let orch = orchestrator(
        &dir,
        ScriptedGenerator::always(&decorated),
        RecordingTransport::new(),
    );

    let outcome = orch.run_cycle().await.unwrap();
    assert!(matches!(outcome, CycleOutcome::FirstRun { .. }));
    assert_eq!(orch.generator().calls(), 1);
}
