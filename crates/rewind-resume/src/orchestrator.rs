//! Resume orchestration: rebuild a session from its persisted run log.
//!
//! The flow is a fixed list of [`Step`]s run by [`run_steps`]:
//!
//! | # | step              | kind         |
//! |---|-------------------|--------------|
//! | 1 | fetch metadata    | read-only    |
//! | 2 | fetch log         | read-only    |
//! | 3 | locate snapshot   | read-only    |
//! | 4 | apply snapshot    | compensating |
//! | 5 | replay            | read-only    |
//! | 6 | extract device    | read-only    |
//! | 7 | assemble          | read-only    |
//!
//! Steps 1 and 2 end the flow early with the canonical empty result when
//! there is nothing to resume.

use std::sync::Arc;

use rewind_core::MessageKind;
use rewind_events::{ConversationTurn, ParsedLog, StoredLogEntry, parse_log, replay_conversation};
use rewind_settings::ResumeSettings;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::errors::ResumeError;
use crate::restore::{RestoreOutcome, TreeRestorer, apply_snapshot};
use crate::saga::{CompensateFuture, Step, StepFlow, StepFuture, run_steps};
use crate::snapshot::{TreeSnapshotEvent, locate_latest_snapshot};
use crate::sources::{LogSource, RunMetadataSource};

/// Everything recovered from a run log.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeResult {
    /// Rebuilt conversation.
    pub conversation: Vec<ConversationTurn>,
    /// Latest snapshot found, restorable or not.
    pub snapshot: Option<TreeSnapshotEvent>,
    /// Whether the run was interrupted, per the latest snapshot.
    pub interrupted: bool,
    /// Whether the working tree was restored.
    pub restored: bool,
    /// Tree now in the working directory after a successful restore.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_tree: Option<String>,
    /// Last reported device/environment info.
    pub device: Option<Value>,
    /// Number of valid log entries processed.
    pub log_entry_count: usize,
    /// Number of log lines that could not be decoded.
    #[serde(skip_serializing_if = "is_zero")]
    pub skipped_lines: usize,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl ResumeResult {
    /// The "nothing to resume" result.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether a snapshot was found but could not be applied.
    pub fn is_degraded(&self) -> bool {
        self.snapshot.is_some() && !self.restored
    }
}

/// Knobs for one resume.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResumeOptions {
    /// Apply the latest restorable snapshot.
    pub restore_tree: bool,
    /// Notification methods recognized as snapshot events.
    pub snapshot_methods: Vec<String>,
}

impl Default for ResumeOptions {
    fn default() -> Self {
        Self::from(&ResumeSettings::default())
    }
}

impl From<&ResumeSettings> for ResumeOptions {
    fn from(settings: &ResumeSettings) -> Self {
        Self {
            restore_tree: settings.restore_tree,
            snapshot_methods: settings.snapshot_methods.clone(),
        }
    }
}

/// Last device/environment info in `entries`.
///
/// Scans backward for a notification whose params carry a `device` field.
pub fn extract_device(entries: &[StoredLogEntry]) -> Option<Value> {
    entries.iter().rev().find_map(|entry| {
        if entry.kind() != MessageKind::Notification {
            return None;
        }
        entry.params()?.get("device").cloned()
    })
}

/// Sequences the resume steps over its collaborators.
pub struct ResumeOrchestrator {
    metadata: Arc<dyn RunMetadataSource>,
    logs: Arc<dyn LogSource>,
    restorer: Arc<dyn TreeRestorer>,
    options: ResumeOptions,
}

impl ResumeOrchestrator {
    /// Orchestrator with default options.
    pub fn new(
        metadata: Arc<dyn RunMetadataSource>,
        logs: Arc<dyn LogSource>,
        restorer: Arc<dyn TreeRestorer>,
    ) -> Self {
        Self {
            metadata,
            logs,
            restorer,
            options: ResumeOptions::default(),
        }
    }

    /// Replace the options.
    #[must_use]
    pub fn with_options(mut self, options: ResumeOptions) -> Self {
        self.options = options;
        self
    }

    /// Run the resume flow.
    ///
    /// Fails only when metadata or log content cannot be fetched.
    #[instrument(skip(self))]
    pub async fn resume(&self) -> Result<ResumeResult, ResumeError> {
        let mut ctx = ResumeContext {
            metadata: Arc::clone(&self.metadata),
            logs: Arc::clone(&self.logs),
            restorer: Arc::clone(&self.restorer),
            options: self.options.clone(),
            location: None,
            parsed: ParsedLog::default(),
            snapshot: None,
            outcome: None,
            conversation: Vec::new(),
            device: None,
            result: None,
        };
        run_steps(&mut ctx, &resume_steps())
            .await
            .map_err(|failure| {
                debug!(step = failure.step, error = %failure.error, "resume aborted");
                failure.error
            })?;
        Ok(ctx.result.unwrap_or_default())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Steps
// ─────────────────────────────────────────────────────────────────────────────

struct ResumeContext {
    metadata: Arc<dyn RunMetadataSource>,
    logs: Arc<dyn LogSource>,
    restorer: Arc<dyn TreeRestorer>,
    options: ResumeOptions,
    location: Option<String>,
    parsed: ParsedLog,
    snapshot: Option<TreeSnapshotEvent>,
    outcome: Option<RestoreOutcome>,
    conversation: Vec<ConversationTurn>,
    device: Option<Value>,
    result: Option<ResumeResult>,
}

fn resume_steps() -> [Step<ResumeContext, ResumeError>; 7] {
    [
        Step::read_only("fetch_metadata", fetch_metadata),
        Step::read_only("fetch_log", fetch_log),
        Step::read_only("locate_snapshot", locate_snapshot),
        Step::compensating("apply_snapshot", apply_snapshot_step, rollback_snapshot),
        Step::read_only("replay", replay),
        Step::read_only("extract_device", extract_device_step),
        Step::read_only("assemble", assemble),
    ]
}

fn fetch_metadata(ctx: &mut ResumeContext) -> StepFuture<'_, ResumeError> {
    Box::pin(async move {
        let metadata = ctx
            .metadata
            .fetch_metadata()
            .await
            .map_err(ResumeError::Metadata)?;
        let Some(location) = metadata.location() else {
            info!(run_id = %metadata.run_id, "no log location, nothing to resume");
            return Ok(StepFlow::Finish);
        };
        ctx.location = Some(location.to_owned());
        Ok(StepFlow::Continue)
    })
}

fn fetch_log(ctx: &mut ResumeContext) -> StepFuture<'_, ResumeError> {
    Box::pin(async move {
        let Some(location) = ctx.location.as_deref() else {
            return Ok(StepFlow::Finish);
        };
        let content = ctx
            .logs
            .fetch_log(location)
            .await
            .map_err(ResumeError::LogFetch)?;
        ctx.parsed = parse_log(&content);
        if ctx.parsed.entries.is_empty() {
            info!(location = %location, skipped = ctx.parsed.skipped, "run log is empty, nothing to resume");
            return Ok(StepFlow::Finish);
        }
        debug!(
            entries = ctx.parsed.entries.len(),
            skipped = ctx.parsed.skipped,
            "run log loaded"
        );
        Ok(StepFlow::Continue)
    })
}

fn locate_snapshot(ctx: &mut ResumeContext) -> StepFuture<'_, ResumeError> {
    Box::pin(async move {
        ctx.snapshot = locate_latest_snapshot(&ctx.parsed.entries, &ctx.options.snapshot_methods);
        Ok(StepFlow::Continue)
    })
}

fn apply_snapshot_step(ctx: &mut ResumeContext) -> StepFuture<'_, ResumeError> {
    Box::pin(async move {
        let Some(snapshot) = ctx.snapshot.as_ref().filter(|s| s.is_restorable()) else {
            return Ok(StepFlow::Continue);
        };
        if !ctx.options.restore_tree {
            debug!(tree_hash = %snapshot.tree_hash, "tree restore disabled");
            return Ok(StepFlow::Continue);
        }
        ctx.outcome = apply_snapshot(ctx.restorer.as_ref(), snapshot).await;
        Ok(StepFlow::Continue)
    })
}

fn rollback_snapshot(ctx: &mut ResumeContext) -> CompensateFuture<'_, ResumeError> {
    Box::pin(async move {
        let Some(outcome) = ctx.outcome.take() else {
            return Ok(());
        };
        if let Err(err) = ctx.restorer.rollback(&outcome).await {
            warn!(previous_tree = %outcome.previous_tree, error = %err, "failed to roll back restored tree");
        }
        Ok(())
    })
}

fn replay(ctx: &mut ResumeContext) -> StepFuture<'_, ResumeError> {
    Box::pin(async move {
        ctx.conversation = replay_conversation(&ctx.parsed.entries);
        Ok(StepFlow::Continue)
    })
}

fn extract_device_step(ctx: &mut ResumeContext) -> StepFuture<'_, ResumeError> {
    Box::pin(async move {
        ctx.device = extract_device(&ctx.parsed.entries);
        Ok(StepFlow::Continue)
    })
}

fn assemble(ctx: &mut ResumeContext) -> StepFuture<'_, ResumeError> {
    Box::pin(async move {
        ctx.result = Some(ResumeResult {
            conversation: std::mem::take(&mut ctx.conversation),
            interrupted: ctx.snapshot.as_ref().is_some_and(|s| s.interrupted),
            snapshot: ctx.snapshot.clone(),
            restored: ctx.outcome.is_some(),
            baseline_tree: ctx.outcome.as_ref().map(|o| o.new_tree.clone()),
            device: ctx.device.take(),
            log_entry_count: ctx.parsed.entries.len(),
            skipped_lines: ctx.parsed.skipped,
        });
        Ok(StepFlow::Continue)
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::errors::{RestoreError, SourceError};
    use crate::sources::{RunMetadata, StaticRunMetadata};
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use rewind_core::logging::capture_logs;
    use rewind_events::Role;
    use serde_json::json;

    // ── Fakes ──

    struct FakeLogs {
        content: Result<String, String>,
        calls: AtomicUsize,
    }

    impl FakeLogs {
        fn with(content: &str) -> Arc<Self> {
            Arc::new(Self {
                content: Ok(content.to_owned()),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                content: Err("disk gone".into()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LogSource for FakeLogs {
        async fn fetch_log(&self, _location: &str) -> Result<String, SourceError> {
            let _ = self.calls.fetch_add(1, Ordering::SeqCst);
            self.content.clone().map_err(SourceError::Unavailable)
        }
    }

    struct FailingMetadata;

    #[async_trait]
    impl RunMetadataSource for FailingMetadata {
        async fn fetch_metadata(&self) -> Result<RunMetadata, SourceError> {
            Err(SourceError::Unavailable("metadata service down".into()))
        }
    }

    #[derive(Default)]
    struct FakeRestorer {
        fail: bool,
        restored: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TreeRestorer for FakeRestorer {
        async fn restore(&self, snapshot: &TreeSnapshotEvent) -> Result<RestoreOutcome, RestoreError> {
            if self.fail {
                return Err(RestoreError::Fetch {
                    archive: snapshot.archive.clone().unwrap_or_default(),
                    message: "404".into(),
                });
            }
            self.restored
                .lock()
                .unwrap()
                .push(snapshot.tree_hash.clone());
            Ok(RestoreOutcome {
                previous_tree: "prev".into(),
                new_tree: snapshot.tree_hash.clone(),
                previous_index: None,
            })
        }

        async fn rollback(&self, _outcome: &RestoreOutcome) -> Result<(), RestoreError> {
            Ok(())
        }
    }

    fn metadata(location: Option<&str>) -> Arc<StaticRunMetadata> {
        Arc::new(StaticRunMetadata(RunMetadata {
            run_id: "run-1".into(),
            log_location: location.map(str::to_owned),
        }))
    }

    fn line(notification: Value) -> String {
        json!({"type": "notification", "notification": notification}).to_string()
    }

    fn update(update: Value) -> String {
        line(json!({"method": "session/update", "params": {"sessionId": "s", "update": update}}))
    }

    fn sample_log(snapshot_params: Value) -> String {
        [
            line(json!({"method": "session/environment", "params": {"device": {"name": "old"}}})),
            update(json!({"sessionUpdate": "user_message_chunk", "content": {"type": "text", "text": "fix it"}})),
            update(json!({"sessionUpdate": "agent_message_chunk", "content": {"type": "text", "text": "on "}})),
            "{not json".to_string(),
            update(json!({"sessionUpdate": "agent_message_chunk", "content": {"type": "text", "text": "it"}})),
            line(json!({"method": "tree_snapshot", "params": snapshot_params})),
            line(json!({"method": "session/environment", "params": {"device": {"name": "laptop"}}})),
        ]
        .join("\n")
    }

    fn restorable() -> Value {
        json!({"treeHash": "abc", "archive": "/runs/abc.bundle", "interrupted": true})
    }

    // ── Short circuits ──

    #[tokio::test]
    async fn no_location_returns_empty_without_fetching() {
        let logs = FakeLogs::with("ignored");
        let orchestrator = ResumeOrchestrator::new(
            metadata(None),
            logs.clone(),
            Arc::new(FakeRestorer::default()),
        );
        let result = orchestrator.resume().await.unwrap();
        assert_eq!(result, ResumeResult::empty());
        assert_eq!(result.log_entry_count, 0);
        assert_eq!(logs.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_location_string_is_no_location() {
        let logs = FakeLogs::with("ignored");
        let orchestrator =
            ResumeOrchestrator::new(metadata(Some("")), logs.clone(), Arc::new(FakeRestorer::default()));
        assert_eq!(orchestrator.resume().await.unwrap(), ResumeResult::empty());
        assert_eq!(logs.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_content_returns_empty() {
        let logs = FakeLogs::with("\n\n");
        let orchestrator = ResumeOrchestrator::new(
            metadata(Some("run-1.jsonl")),
            logs.clone(),
            Arc::new(FakeRestorer::default()),
        );
        assert_eq!(orchestrator.resume().await.unwrap(), ResumeResult::empty());
        assert_eq!(logs.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_result_serialization() {
        assert_eq!(
            serde_json::to_value(ResumeResult::empty()).unwrap(),
            json!({
                "conversation": [],
                "snapshot": null,
                "interrupted": false,
                "restored": false,
                "device": null,
                "logEntryCount": 0
            })
        );
    }

    // ── Full flow ──

    #[tokio::test]
    async fn full_resume_restores_and_replays() {
        let restorer = Arc::new(FakeRestorer::default());
        let orchestrator = ResumeOrchestrator::new(
            metadata(Some("run-1.jsonl")),
            FakeLogs::with(&sample_log(restorable())),
            restorer.clone(),
        );
        let result = orchestrator.resume().await.unwrap();

        assert_eq!(result.log_entry_count, 6);
        assert_eq!(result.skipped_lines, 1);
        assert!(result.restored);
        assert!(result.interrupted);
        assert!(!result.is_degraded());
        assert_eq!(result.baseline_tree.as_deref(), Some("abc"));
        assert_eq!(result.snapshot.as_ref().unwrap().tree_hash, "abc");
        assert_eq!(result.device, Some(json!({"name": "laptop"})));
        assert_eq!(*restorer.restored.lock().unwrap(), vec!["abc".to_string()]);

        let roles: Vec<_> = result.conversation.iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
        assert_eq!(result.conversation[1].text(), "on it");
    }

    #[tokio::test]
    async fn restore_failure_is_degraded_not_fatal() {
        let (logs, _guard) = capture_logs();
        let orchestrator = ResumeOrchestrator::new(
            metadata(Some("run-1.jsonl")),
            FakeLogs::with(&sample_log(restorable())),
            Arc::new(FakeRestorer {
                fail: true,
                ..FakeRestorer::default()
            }),
        );
        let result = orchestrator.resume().await.unwrap();
        assert!(!result.restored);
        assert!(result.is_degraded());
        assert_eq!(result.baseline_tree, None);
        assert_eq!(result.conversation.len(), 2);
        let event = logs
            .find(tracing::Level::WARN, "snapshot restore failed")
            .unwrap();
        assert_eq!(event.field("tree_hash"), Some("abc"));
    }

    #[tokio::test]
    async fn snapshot_without_archive_is_reported_not_applied() {
        let restorer = Arc::new(FakeRestorer::default());
        let orchestrator = ResumeOrchestrator::new(
            metadata(Some("run-1.jsonl")),
            FakeLogs::with(&sample_log(json!({"treeHash": "abc"}))),
            restorer.clone(),
        );
        let result = orchestrator.resume().await.unwrap();
        assert!(result.snapshot.is_some());
        assert!(!result.restored);
        assert!(!result.interrupted);
        assert!(restorer.restored.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn restore_disabled_by_options() {
        let restorer = Arc::new(FakeRestorer::default());
        let orchestrator = ResumeOrchestrator::new(
            metadata(Some("run-1.jsonl")),
            FakeLogs::with(&sample_log(restorable())),
            restorer.clone(),
        )
        .with_options(ResumeOptions {
            restore_tree: false,
            ..ResumeOptions::default()
        });
        let result = orchestrator.resume().await.unwrap();
        assert!(!result.restored);
        assert!(restorer.restored.lock().unwrap().is_empty());
    }

    // ── Read failures ──

    #[tokio::test]
    async fn metadata_failure_propagates() {
        let orchestrator = ResumeOrchestrator::new(
            Arc::new(FailingMetadata),
            FakeLogs::with(""),
            Arc::new(FakeRestorer::default()),
        );
        assert_matches!(orchestrator.resume().await, Err(ResumeError::Metadata(_)));
    }

    #[tokio::test]
    async fn log_fetch_failure_propagates() {
        let orchestrator = ResumeOrchestrator::new(
            metadata(Some("run-1.jsonl")),
            FakeLogs::failing(),
            Arc::new(FakeRestorer::default()),
        );
        assert_matches!(orchestrator.resume().await, Err(ResumeError::LogFetch(_)));
    }

    // ── extract_device ──

    #[test]
    fn device_is_last_notification_with_device() {
        let entry = |n: Value| StoredLogEntry {
            record_type: "n".into(),
            timestamp: None,
            notification: n,
        };
        let entries = vec![
            entry(json!({"method": "env", "params": {"device": "first"}})),
            entry(json!({"method": "env", "params": {"device": "second"}})),
            entry(json!({"id": 1, "method": "session/new", "params": {"device": "request"}})),
            entry(json!({"method": "other", "params": {}})),
        ];
        assert_eq!(extract_device(&entries), Some(json!("second")));
        assert_eq!(extract_device(&[]), None);
    }
}
