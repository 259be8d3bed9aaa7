//! Batch coalescer — per-channel accumulation of message bursts behind a
//! sliding inactivity window.
//!
//! Architecture:
//! - One map `channel key → Batch` behind a single async mutex; a timer
//!   task handle lives next to each batch.
//! - Every append cancels the previous timer and arms a fresh one for the
//!   full window, inside the same critical section as the state mutation.
//! - A firing timer first detaches its batch under the lock, then does all
//!   downstream work (composition, orchestrator call, record write) with no
//!   lock held. A fire that lost the race to a cancellation or a force
//!   flush observes the key empty and returns.
//!
//! The lock is never held across network I/O. A panicking analyzer only
//! takes down its own timer task; the batch was already detached.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use decidoc_core::sink::AnalysisLog;
use decidoc_core::types::{AnalysisRecord, Analyzer, EnrichedMessage};

// ─────────────────────────────────────────────
// Batch state
// ─────────────────────────────────────────────

/// One live batch for a channel key.
struct Batch {
    key: String,
    owner_user_id: i64,
    messages: Vec<EnrichedMessage>,
    created_at: DateTime<Utc>,
    started: Instant,
    /// Orchestrator handle from the append that created the batch.
    handle: Arc<dyn Analyzer>,
    /// The armed inactivity timer. Replaced on every append.
    timer: Option<JoinHandle<()>>,
}

impl Batch {
    fn new(key: &str, owner_user_id: i64, handle: Arc<dyn Analyzer>) -> Self {
        Batch {
            key: key.to_string(),
            owner_user_id,
            messages: Vec::new(),
            created_at: Utc::now(),
            started: Instant::now(),
            handle,
            timer: None,
        }
    }
}

/// Status snapshot of one channel key.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct BatchStatus {
    /// `"no_batch"` or `"active"`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    pub window_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds_since_creation: Option<u64>,
}

impl BatchStatus {
    fn no_batch(window: Duration) -> Self {
        BatchStatus {
            status: "no_batch".to_string(),
            message_count: None,
            created_at: None,
            window_seconds: window.as_secs(),
            seconds_since_creation: None,
        }
    }

    fn active(batch: &Batch, window: Duration) -> Self {
        BatchStatus {
            status: "active".to_string(),
            message_count: Some(batch.messages.len()),
            created_at: Some(batch.created_at.to_rfc3339()),
            window_seconds: window.as_secs(),
            seconds_since_creation: Some(batch.started.elapsed().as_secs()),
        }
    }
}

/// Result of a forced flush.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ForceFlushResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

// ─────────────────────────────────────────────
// Coalescer
// ─────────────────────────────────────────────

struct Inner {
    batches: Mutex<HashMap<String, Batch>>,
    window: Duration,
    sink: Arc<dyn AnalysisLog>,
}

/// The manager of all per-channel batches. Cheap to clone.
#[derive(Clone)]
pub struct Coalescer {
    inner: Arc<Inner>,
}

impl Coalescer {
    /// Create a coalescer with the given inactivity window.
    pub fn new(window: Duration, sink: Arc<dyn AnalysisLog>) -> Self {
        Coalescer {
            inner: Arc::new(Inner {
                batches: Mutex::new(HashMap::new()),
                window,
                sink,
            }),
        }
    }

    /// The configured inactivity window.
    pub fn window(&self) -> Duration {
        self.inner.window
    }

    /// Add a message to the channel's batch and re-arm its timer.
    ///
    /// The first append for a key creates the batch and binds `handle` to
    /// it; later appends reuse the original handle.
    pub async fn append(
        &self,
        key: &str,
        message: EnrichedMessage,
        handle: Arc<dyn Analyzer>,
        owner_user_id: i64,
    ) {
        let mut batches = self.inner.batches.lock().await;

        let batch = batches
            .entry(key.to_string())
            .or_insert_with(|| Batch::new(key, owner_user_id, handle));
        batch.messages.push(message);

        // Cancel-and-rearm inside the critical section. A cancelled timer
        // that already started running will find the key detached (or a
        // younger batch) and do nothing.
        if let Some(timer) = batch.timer.take() {
            timer.abort();
        }
        let inner = self.inner.clone();
        let timer_key = key.to_string();
        batch.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(inner.window).await;
            flush(inner, &timer_key).await;
        }));

        debug!(
            channel = %key,
            messages = batch.messages.len(),
            window_secs = self.inner.window.as_secs(),
            "message appended to batch, timer re-armed"
        );
    }

    /// Status of one channel key.
    pub async fn status(&self, key: &str) -> BatchStatus {
        let batches = self.inner.batches.lock().await;
        match batches.get(key) {
            Some(batch) => BatchStatus::active(batch, self.inner.window),
            None => BatchStatus::no_batch(self.inner.window),
        }
    }

    /// Statuses of all currently active keys.
    pub async fn statuses(&self) -> HashMap<String, BatchStatus> {
        let batches = self.inner.batches.lock().await;
        batches
            .iter()
            .map(|(key, batch)| (key.clone(), BatchStatus::active(batch, self.inner.window)))
            .collect()
    }

    /// Cancel the timer and process the channel's batch immediately.
    pub async fn force_flush(&self, key: &str) -> ForceFlushResult {
        let batch = {
            let mut batches = self.inner.batches.lock().await;
            match batches.remove(key) {
                Some(mut batch) => {
                    if let Some(timer) = batch.timer.take() {
                        timer.abort();
                    }
                    batch
                }
                None => {
                    return ForceFlushResult {
                        ok: false,
                        reason: Some("no active batch".to_string()),
                    }
                }
            }
        };

        info!(channel = %key, "forced batch flush");
        process(&self.inner, batch).await;
        ForceFlushResult {
            ok: true,
            reason: None,
        }
    }
}

/// Timer-fire path: detach under the lock, then process without it.
async fn flush(inner: Arc<Inner>, key: &str) {
    let batch = {
        let mut batches = inner.batches.lock().await;
        match batches.remove(key) {
            Some(batch) => batch,
            // Lost the race to a cancellation or force flush.
            None => return,
        }
    };

    process(&inner, batch).await;
}

/// Run the detached batch through its orchestrator handle and persist the
/// analysis record when the session used tools.
async fn process(inner: &Inner, batch: Batch) {
    let input = compose_input(&batch.messages);

    info!(
        channel = %batch.key,
        owner = batch.owner_user_id,
        messages = batch.messages.len(),
        "flushing batch to orchestrator"
    );

    let outcome = batch.handle.analyze(&input).await;

    if !outcome.success {
        warn!(
            channel = %batch.key,
            error = outcome.error.as_deref().unwrap_or("unknown"),
            "batch analysis failed"
        );
    }

    if outcome.has_tool_calls() {
        let record = AnalysisRecord::from_outcome(&input, &outcome);
        if inner.sink.put_analysis(&record).await {
            debug!(channel = %batch.key, "analysis record persisted");
        } else {
            warn!(channel = %batch.key, "analysis record write failed");
        }
    } else {
        debug!(channel = %batch.key, "no tool calls recorded, skipping analysis record");
    }
}

/// Compose the orchestrator input: one profile + text block per message,
/// in arrival order.
pub fn compose_input(messages: &[EnrichedMessage]) -> String {
    let mut input = String::new();
    for message in messages {
        let profile = serde_json::to_string(&message.profile).unwrap_or_default();
        input.push_str(&format!(
            "User: {}\nMessage: {}\n",
            profile, message.event.text
        ));
    }
    input
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use decidoc_core::types::{
        AnalysisOutcome, Classification, ClassificationRecord, IngestEvent, ToolCall, ToolStats,
        UserProfile,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn make_message(channel: &str, text: &str) -> EnrichedMessage {
        EnrichedMessage::new(
            IngestEvent {
                token: None,
                team_id: "T1".into(),
                event_id: format!("Ev-{text}"),
                event_time: 0,
                channel_id: channel.into(),
                user_id: "U1".into(),
                text: text.into(),
                ts: "1712345678.000200".into(),
                channel_type: "channel".into(),
                bot_id: None,
                subtype: None,
            },
            UserProfile {
                role: "Engineer".into(),
                name: "Ada".into(),
                message_link: "https://slack.example/p".into(),
            },
        )
    }

    /// Analyzer that records inputs and returns a canned outcome.
    struct MockAnalyzer {
        invocations: AtomicUsize,
        inputs: Mutex<Vec<String>>,
        with_tool_calls: bool,
        fail: bool,
    }

    impl MockAnalyzer {
        fn new(with_tool_calls: bool) -> Arc<Self> {
            Arc::new(MockAnalyzer {
                invocations: AtomicUsize::new(0),
                inputs: Mutex::new(Vec::new()),
                with_tool_calls,
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(MockAnalyzer {
                invocations: AtomicUsize::new(0),
                inputs: Mutex::new(Vec::new()),
                with_tool_calls: false,
                fail: true,
            })
        }

        fn count(&self) -> usize {
            self.invocations.load(Ordering::SeqCst)
        }

        async fn inputs(&self) -> Vec<String> {
            self.inputs.lock().await.clone()
        }
    }

    #[async_trait]
    impl Analyzer for MockAnalyzer {
        async fn analyze(&self, input: &str) -> AnalysisOutcome {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            self.inputs.lock().await.push(input.to_string());

            if self.fail {
                return AnalysisOutcome::failure("mock failure");
            }

            let tool_calls = if self.with_tool_calls {
                vec![ToolCall::ok("t1", "create_page", "Notion", "{}")]
            } else {
                Vec::new()
            };
            AnalysisOutcome {
                success: true,
                content: "done".into(),
                response: "done".into(),
                tool_stats: ToolStats::from_calls(&tool_calls),
                tool_calls,
                ..Default::default()
            }
        }
    }

    /// In-memory sink capturing analysis records.
    struct MemorySink {
        analyses: Mutex<Vec<AnalysisRecord>>,
    }

    impl MemorySink {
        fn new() -> Arc<Self> {
            Arc::new(MemorySink {
                analyses: Mutex::new(Vec::new()),
            })
        }

        async fn analyses(&self) -> Vec<AnalysisRecord> {
            self.analyses.lock().await.clone()
        }
    }

    #[async_trait]
    impl AnalysisLog for MemorySink {
        async fn put_classification(&self, _record: &ClassificationRecord) -> bool {
            true
        }

        async fn put_analysis(&self, record: &AnalysisRecord) -> bool {
            self.analyses.lock().await.push(record.clone());
            true
        }
    }

    fn make_coalescer(window_ms: u64, sink: Arc<MemorySink>) -> Coalescer {
        Coalescer::new(Duration::from_millis(window_ms), sink)
    }

    // ── Status ──

    #[tokio::test]
    async fn test_status_no_batch() {
        let coalescer = make_coalescer(30_000, MemorySink::new());
        let status = coalescer.status("C1").await;
        assert_eq!(status.status, "no_batch");
        assert!(status.message_count.is_none());
        assert_eq!(status.window_seconds, 30);
    }

    #[tokio::test]
    async fn test_status_active_after_append() {
        let coalescer = make_coalescer(30_000, MemorySink::new());
        let analyzer = MockAnalyzer::new(true);

        coalescer
            .append("C1", make_message("C1", "m1"), analyzer.clone(), 1)
            .await;
        coalescer
            .append("C1", make_message("C1", "m2"), analyzer, 1)
            .await;

        let status = coalescer.status("C1").await;
        assert_eq!(status.status, "active");
        assert_eq!(status.message_count, Some(2));
        assert!(status.created_at.is_some());
        assert!(status.seconds_since_creation.is_some());
    }

    #[tokio::test]
    async fn test_statuses_lists_only_active_keys() {
        let coalescer = make_coalescer(30_000, MemorySink::new());
        let analyzer = MockAnalyzer::new(true);

        coalescer
            .append("C1", make_message("C1", "a"), analyzer.clone(), 1)
            .await;
        coalescer
            .append("C2", make_message("C2", "b"), analyzer, 1)
            .await;

        let statuses = coalescer.statuses().await;
        assert_eq!(statuses.len(), 2);
        assert!(statuses.contains_key("C1"));
        assert!(statuses.contains_key("C2"));
    }

    // ── Single-message flush ──

    #[tokio::test]
    async fn test_single_message_flush() {
        let sink = MemorySink::new();
        let coalescer = make_coalescer(100, sink.clone());
        let analyzer = MockAnalyzer::new(true);

        coalescer
            .append("C1", make_message("C1", "the decision"), analyzer.clone(), 7)
            .await;

        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(coalescer.status("C1").await.status, "no_batch");
        assert_eq!(analyzer.count(), 1);

        let inputs = analyzer.inputs().await;
        assert!(inputs[0].contains("the decision"));
        assert!(inputs[0].contains("Ada"));

        let analyses = sink.analyses().await;
        assert_eq!(analyses.len(), 1);
        assert!(analyses[0].message_id.starts_with("analysis_"));
    }

    #[tokio::test]
    async fn test_no_record_without_tool_calls() {
        let sink = MemorySink::new();
        let coalescer = make_coalescer(80, sink.clone());
        let analyzer = MockAnalyzer::new(false);

        coalescer
            .append("C1", make_message("C1", "chit chat"), analyzer.clone(), 1)
            .await;
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(analyzer.count(), 1);
        assert!(sink.analyses().await.is_empty());
    }

    // ── Burst coalescing and order ──

    #[tokio::test]
    async fn test_burst_coalesces_into_one_flush_in_order() {
        let sink = MemorySink::new();
        let coalescer = make_coalescer(200, sink.clone());
        let analyzer = MockAnalyzer::new(true);

        for text in ["m1", "m2", "m3", "m4"] {
            coalescer
                .append("C1", make_message("C1", text), analyzer.clone(), 1)
                .await;
            tokio::time::sleep(Duration::from_millis(40)).await;
        }

        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(analyzer.count(), 1, "burst must flush exactly once");
        let input = analyzer.inputs().await.remove(0);
        let positions: Vec<usize> = ["m1", "m2", "m3", "m4"]
            .iter()
            .map(|m| input.find(*m).expect("message missing from input"))
            .collect();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted, "append order must be preserved");

        assert_eq!(sink.analyses().await.len(), 1);
    }

    // ── Window reset ──

    #[tokio::test]
    async fn test_append_resets_window() {
        let coalescer = make_coalescer(250, MemorySink::new());
        let analyzer = MockAnalyzer::new(false);

        coalescer
            .append("C1", make_message("C1", "m1"), analyzer.clone(), 1)
            .await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        coalescer
            .append("C1", make_message("C1", "m2"), analyzer.clone(), 1)
            .await;

        // 150ms after the second append the original deadline has passed,
        // but the reset timer must still be pending.
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(analyzer.count(), 0, "flush fired inside the reset window");
        assert_eq!(coalescer.status("C1").await.status, "active");

        // Eventually it flushes.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(analyzer.count(), 1);
        assert_eq!(coalescer.status("C1").await.status, "no_batch");
    }

    // ── Key isolation ──

    #[tokio::test]
    async fn test_interleaved_keys_flush_independently() {
        let sink = MemorySink::new();
        let coalescer = make_coalescer(200, sink.clone());
        let analyzer_a = MockAnalyzer::new(true);
        let analyzer_b = MockAnalyzer::new(true);

        let c1 = {
            let coalescer = coalescer.clone();
            let analyzer = analyzer_a.clone();
            tokio::spawn(async move {
                for i in 0..10 {
                    coalescer
                        .append("C1", make_message("C1", &format!("a{i}")), analyzer.clone(), 1)
                        .await;
                }
            })
        };
        let c2 = {
            let coalescer = coalescer.clone();
            let analyzer = analyzer_b.clone();
            tokio::spawn(async move {
                for i in 0..10 {
                    coalescer
                        .append("C2", make_message("C2", &format!("b{i}")), analyzer.clone(), 2)
                        .await;
                }
            })
        };
        c1.await.unwrap();
        c2.await.unwrap();

        // Both batches complete before any flush.
        assert_eq!(coalescer.status("C1").await.message_count, Some(10));
        assert_eq!(coalescer.status("C2").await.message_count, Some(10));

        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(analyzer_a.count(), 1);
        assert_eq!(analyzer_b.count(), 1);

        let input_a = analyzer_a.inputs().await.remove(0);
        let input_b = analyzer_b.inputs().await.remove(0);
        for i in 0..10 {
            assert!(input_a.contains(&format!("a{i}")));
            assert!(input_b.contains(&format!("b{i}")));
        }
        assert!(!input_a.contains("b0"), "cross-channel contamination");
        assert!(!input_b.contains("a0"), "cross-channel contamination");

        assert_eq!(sink.analyses().await.len(), 2);
    }

    // ── Force flush ──

    #[tokio::test]
    async fn test_force_flush() {
        let coalescer = make_coalescer(30_000, MemorySink::new());
        let analyzer = MockAnalyzer::new(true);

        coalescer
            .append("C1", make_message("C1", "m1"), analyzer.clone(), 1)
            .await;

        let result = coalescer.force_flush("C1").await;
        assert!(result.ok);
        assert!(result.reason.is_none());
        assert_eq!(analyzer.count(), 1);
        assert_eq!(coalescer.status("C1").await.status, "no_batch");
    }

    #[tokio::test]
    async fn test_force_flush_without_batch() {
        let coalescer = make_coalescer(30_000, MemorySink::new());
        let result = coalescer.force_flush("C1").await;
        assert!(!result.ok);
        assert_eq!(result.reason.as_deref(), Some("no active batch"));
    }

    #[tokio::test]
    async fn test_force_flush_cancels_timer() {
        let coalescer = make_coalescer(100, MemorySink::new());
        let analyzer = MockAnalyzer::new(false);

        coalescer
            .append("C1", make_message("C1", "m1"), analyzer.clone(), 1)
            .await;
        coalescer.force_flush("C1").await;

        // Past the original deadline: the aborted (or raced) timer must not
        // produce a second analysis.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(analyzer.count(), 1);
    }

    // ── Batch lifecycle ──

    #[tokio::test]
    async fn test_new_batch_after_flush() {
        let sink = MemorySink::new();
        let coalescer = make_coalescer(100, sink.clone());
        let analyzer = MockAnalyzer::new(true);

        coalescer
            .append("C1", make_message("C1", "first"), analyzer.clone(), 1)
            .await;
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(analyzer.count(), 1);

        coalescer
            .append("C1", make_message("C1", "second"), analyzer.clone(), 1)
            .await;
        assert_eq!(coalescer.status("C1").await.message_count, Some(1));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(analyzer.count(), 2);
        assert_eq!(sink.analyses().await.len(), 2);
    }

    #[tokio::test]
    async fn test_first_appenders_handle_wins() {
        let coalescer = make_coalescer(100, MemorySink::new());
        let first = MockAnalyzer::new(false);
        let second = MockAnalyzer::new(false);

        coalescer
            .append("C1", make_message("C1", "m1"), first.clone(), 1)
            .await;
        coalescer
            .append("C1", make_message("C1", "m2"), second.clone(), 1)
            .await;

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(first.count(), 1);
        assert_eq!(second.count(), 0);
    }

    // ── Failure containment ──

    #[tokio::test]
    async fn test_analyzer_failure_contained() {
        let sink = MemorySink::new();
        let coalescer = make_coalescer(80, sink.clone());
        let failing = MockAnalyzer::failing();

        coalescer
            .append("C1", make_message("C1", "m1"), failing.clone(), 1)
            .await;
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(failing.count(), 1);
        assert!(sink.analyses().await.is_empty());

        // The coalescer keeps working afterwards.
        let healthy = MockAnalyzer::new(true);
        coalescer
            .append("C1", make_message("C1", "m2"), healthy.clone(), 1)
            .await;
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(healthy.count(), 1);
        assert_eq!(sink.analyses().await.len(), 1);
    }

    // ── Input composition ──

    #[test]
    fn test_compose_input_contains_profile_and_text() {
        let messages = vec![
            make_message("C1", "first message"),
            make_message("C1", "second message"),
        ];
        let input = compose_input(&messages);

        assert!(input.contains("\"role\":\"Engineer\""));
        assert!(input.contains("\"name\":\"Ada\""));
        assert!(input.contains("\"message_link\":\"https://slack.example/p\""));
        assert!(input.contains("Message: first message"));
        assert!(input.contains("Message: second message"));
        assert!(input.find("first message").unwrap() < input.find("second message").unwrap());
    }

    #[test]
    fn test_compose_input_empty() {
        assert_eq!(compose_input(&[]), "");
    }
}
