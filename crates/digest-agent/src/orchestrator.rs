//! One digest cycle: generate, validate, diff, deliver, persist.
//!
//! ```text
//! fetch_report ──(empty)──────────────> EmptyOutput
//!      │        ──(markers missing)──> retry, then IncompleteReport
//!      v
//! process: lock store, load snapshot
//!      ├─ first run ───> deliver full report, save, append
//!      ├─ unchanged ───> policy: NO_NEWS_MESSAGE or nothing; no persistence
//!      └─ changed ─────> deliver reduced report, save, append
//! ```
//!
//! An accepted report is persisted even when some chunks failed to deliver.

use chrono::Local;
use report_pipeline::{
    added_lines, added_lines_message, missing_markers_with, normalize_equal, ChangeDetection,
    ChunkedDelivery, DeliveryReport, MessageTransport, PipelineError, ReportDiffer, ReportStore,
    SimilarityComparer, StoreError, EXPECTED_SECTIONS,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use crate::config::DigestConfig;
use crate::generator::{GeneratorError, ReportGenerator};
use crate::prompts::{self, NO_NEWS_MESSAGE, PROMPT_VERSION};

/// What to send, and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyPolicy {
    /// Unchanged reports still produce a short "no news" message
    #[default]
    AlwaysNotify,
    /// Silent when unchanged
    NotifyOnChange,
    /// Silent when unchanged; changed reports carry only the changed sections
    SuppressEmptySections,
}

impl std::fmt::Display for NotifyPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlwaysNotify => write!(f, "always_notify"),
            Self::NotifyOnChange => write!(f, "notify_on_change"),
            Self::SuppressEmptySections => write!(f, "suppress_empty_sections"),
        }
    }
}

impl std::str::FromStr for NotifyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "always_notify" | "always" => Ok(Self::AlwaysNotify),
            "notify_on_change" | "on_change" => Ok(Self::NotifyOnChange),
            "suppress_empty_sections" | "suppress" => Ok(Self::SuppressEmptySections),
            other => Err(format!(
                "unknown notify policy '{}', expected 'always_notify', 'notify_on_change' or 'suppress_empty_sections'",
                other
            )),
        }
    }
}

/// How a cycle ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No snapshot existed; the full report was delivered and stored
    FirstRun { delivery: DeliveryReport },
    /// The report changed; the reduced report was delivered and stored
    Updated { delivery: DeliveryReport },
    /// Same as the snapshot modulo whitespace; nothing stored
    Unchanged { notified: Option<DeliveryReport> },
    /// The generator returned blank text; nothing sent or stored
    EmptyOutput,
    /// The report changed but the policy left nothing to send; still stored
    NothingToSend,
}

impl CycleOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::FirstRun { .. } => "first_run",
            Self::Updated { .. } => "updated",
            Self::Unchanged { .. } => "unchanged",
            Self::EmptyOutput => "empty_output",
            Self::NothingToSend => "nothing_to_send",
        }
    }

    /// Delivery of the cycle's message, if one was sent.
    pub fn delivery(&self) -> Option<&DeliveryReport> {
        match self {
            Self::FirstRun { delivery } | Self::Updated { delivery } => Some(delivery),
            Self::Unchanged { notified } => notified.as_ref(),
            Self::EmptyOutput | Self::NothingToSend => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("Report generation failed after {attempts} attempt(s): {source}")]
    Generation {
        attempts: u32,
        #[source]
        source: GeneratorError,
    },

    #[error("Report still missing sections {missing:?} after {attempts} attempt(s)")]
    IncompleteReport { attempts: u32, missing: Vec<u32> },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why one generation attempt was rejected.
enum AttemptFailure {
    Error(GeneratorError),
    Incomplete(Vec<u32>),
}

impl AttemptFailure {
    fn into_error(self, attempts: u32) -> CycleError {
        match self {
            Self::Error(source) => CycleError::Generation { attempts, source },
            Self::Incomplete(missing) => CycleError::IncompleteReport { attempts, missing },
        }
    }
}

/// Drives digest cycles against one store.
pub struct Orchestrator<G, T> {
    generator: G,
    delivery: ChunkedDelivery<T>,
    store: ReportStore,
    differ: ReportDiffer,
    policy: NotifyPolicy,
    detection: ChangeDetection,
    max_attempts: u32,
    retry_delay: Duration,
}

impl<G, T> Orchestrator<G, T>
where
    G: ReportGenerator,
    T: MessageTransport,
{
    /// Defaults: `AlwaysNotify`, section diffing, 3 attempts, no retry delay.
    pub fn new(generator: G, delivery: ChunkedDelivery<T>, store: ReportStore) -> Self {
        Self {
            generator,
            delivery,
            store,
            differ: ReportDiffer::default(),
            policy: NotifyPolicy::default(),
            detection: ChangeDetection::default(),
            max_attempts: 3,
            retry_delay: Duration::ZERO,
        }
    }

    /// Build every component from a validated config.
    pub fn from_config(
        config: &DigestConfig,
        generator: G,
        transport: T,
    ) -> Result<Self, PipelineError> {
        let comparer = SimilarityComparer::new(config.similarity_threshold)?;
        let delivery = ChunkedDelivery::new(transport, config.max_chunk_len)?;
        Ok(Self::new(generator, delivery, ReportStore::in_dir(&config.state_dir))
            .with_differ(ReportDiffer::new(comparer, config.marker_anchor))
            .with_policy(config.policy)
            .with_detection(config.detection)
            .with_retry(config.max_attempts, config.retry_delay()))
    }

    pub fn with_differ(mut self, differ: ReportDiffer) -> Self {
        self.differ = differ;
        self
    }

    pub fn with_policy(mut self, policy: NotifyPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_detection(mut self, detection: ChangeDetection) -> Self {
        self.detection = detection;
        self
    }

    /// `max_attempts` is clamped to at least one.
    pub fn with_retry(mut self, max_attempts: u32, retry_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    pub fn store(&self) -> &ReportStore {
        &self.store
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn transport(&self) -> &T {
        self.delivery.transport()
    }

    /// Generate a report with every section marker present.
    ///
    /// `Ok(None)` means the generator returned blank text, which is not retried.
    pub async fn fetch_report(&self) -> Result<Option<String>, CycleError> {
        let system_prompt = prompts::system_prompt();
        let user_query = prompts::user_query();
        let mut attempt = 0;

        loop {
            attempt += 1;
            info!(attempt, max_attempts = self.max_attempts, "Requesting report");

            let failure = match self.generator.generate(&system_prompt, &user_query).await {
                Ok(text) if text.trim().is_empty() => {
                    warn!(attempt, "Generator returned empty output, skipping cycle");
                    return Ok(None);
                }
                Ok(text) => {
                    let missing =
                        missing_markers_with(&text, EXPECTED_SECTIONS, self.differ.anchor());
                    if missing.is_empty() {
                        info!(attempt, chars = text.chars().count(), "Report complete");
                        return Ok(Some(text));
                    }
                    warn!(attempt, ?missing, "Report is missing sections");
                    AttemptFailure::Incomplete(missing)
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Report generation failed");
                    AttemptFailure::Error(e)
                }
            };

            if attempt >= self.max_attempts {
                return Err(failure.into_error(attempt));
            }
            if !self.retry_delay.is_zero() {
                tokio::time::sleep(self.retry_delay).await;
            }
        }
    }

    /// Compare `report` with the snapshot, notify, and persist.
    pub async fn process(&self, report: &str) -> Result<CycleOutcome, CycleError> {
        let _lock = self.store.lock()?;
        let previous = self.store.load()?;

        if previous.trim().is_empty() {
            info!("No snapshot yet, delivering the full report");
            let delivery = self.delivery.deliver(report).await;
            self.persist(report)?;
            return Ok(CycleOutcome::FirstRun { delivery });
        }

        if normalize_equal(report, &previous) {
            info!(policy = %self.policy, "Report unchanged since last snapshot");
            let notified = match self.policy {
                NotifyPolicy::AlwaysNotify => Some(self.delivery.deliver(NO_NEWS_MESSAGE).await),
                NotifyPolicy::NotifyOnChange | NotifyPolicy::SuppressEmptySections => None,
            };
            return Ok(CycleOutcome::Unchanged { notified });
        }

        let outcome = match self.build_message(report, &previous) {
            Some(message) => CycleOutcome::Updated {
                delivery: self.delivery.deliver(&message).await,
            },
            None => {
                info!(detection = %self.detection, "Report changed but nothing to send");
                CycleOutcome::NothingToSend
            }
        };
        self.persist(report)?;
        Ok(outcome)
    }

    /// Message for a changed report, `None` when there is nothing to send.
    pub fn build_message(&self, report: &str, previous: &str) -> Option<String> {
        changed_message(&self.differ, self.detection, self.policy, report, previous)
    }

    /// Fetch, then process. Each cycle runs in its own span with a fresh run id.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, CycleError> {
        let span = cycle_span(&Uuid::new_v4().to_string());
        let result = async {
            info!(prompt_version = PROMPT_VERSION, "Starting digest cycle");
            match self.fetch_report().await? {
                Some(report) => self.process(&report).await,
                None => Ok(CycleOutcome::EmptyOutput),
            }
        }
        .instrument(span.clone())
        .await;

        record_cycle_result(&span, &result);
        result
    }

    fn persist(&self, report: &str) -> Result<(), StoreError> {
        self.store.save(report)?;
        self.store.append(report)?;
        info!(snapshot = %self.store.snapshot_path().display(), "Snapshot and history updated");
        Ok(())
    }
}

/// Message announcing a changed report, `None` when there is nothing to send.
pub fn changed_message(
    differ: &ReportDiffer,
    detection: ChangeDetection,
    policy: NotifyPolicy,
    report: &str,
    previous: &str,
) -> Option<String> {
    let message = match detection {
        ChangeDetection::Sections => match policy {
            NotifyPolicy::SuppressEmptySections => differ.diff_changed_only(report, previous),
            NotifyPolicy::AlwaysNotify | NotifyPolicy::NotifyOnChange => {
                differ.diff(report, previous)
            }
        },
        ChangeDetection::AddedLines => {
            let lines = added_lines(report, previous);
            added_lines_message(&lines, Local::now().date_naive())?
        }
    };
    (!message.trim().is_empty()).then_some(message)
}

fn cycle_span(run_id: &str) -> Span {
    info_span!(
        "digest.cycle",
        "run.id" = %run_id,
        "cycle.outcome" = tracing::field::Empty,
        "delivery.failed" = tracing::field::Empty,
    )
}

fn record_cycle_result(span: &Span, result: &Result<CycleOutcome, CycleError>) {
    match result {
        Ok(outcome) => {
            span.record("cycle.outcome", outcome.label());
            if let Some(delivery) = outcome.delivery() {
                span.record("delivery.failed", delivery.failed_count());
            }
        }
        Err(_) => {
            span.record("cycle.outcome", "error");
        }
    }
}
