//! Anchoring tests against scripted sinks.
//!
//! Sinks fail transiently, permanently, or stall, so that retry, timeout and
//! pending-queue behaviour can be observed without any network.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use provenance_core::ledger::{
    merkle_root, AnchorPolicy, AnchorRequest, AnchorSink, AnchorStatus, EventType, Ledger,
    LedgerConfig, LedgerSecret, MemoryStorage,
};
use provenance_core::AnchorError;

/// Short budgets so exhausted retries finish quickly.
fn fast_policy() -> AnchorPolicy {
    AnchorPolicy {
        attempt_timeout: Duration::from_millis(100),
        initial_interval: Duration::from_millis(5),
        max_interval: Duration::from_millis(20),
        max_elapsed: Duration::from_millis(250),
    }
}

fn ledger_with_sink(sink: Arc<dyn AnchorSink>, entries: u8) -> Ledger {
    let secret = LedgerSecret::new(b"anchoring-test-secret-anchoring-test".to_vec()).unwrap();
    let config = LedgerConfig::new(secret).with_anchor_policy(fast_policy());
    let ledger = Ledger::open(config, Box::new(MemoryStorage::new()))
        .unwrap()
        .with_anchor_sink(sink);
    for i in 0..entries {
        ledger.append(EventType::Ingest, [i; 32]).unwrap();
    }
    ledger
}

/// Fails transiently while `unavailable` is set or `failures_left` > 0.
#[derive(Default)]
struct ScriptedSink {
    failures_left: AtomicU32,
    unavailable: AtomicBool,
    permanent: AtomicBool,
    calls: AtomicU32,
}

impl ScriptedSink {
    fn flaky(failures: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(failures),
            ..Default::default()
        }
    }

    fn down() -> Self {
        Self {
            unavailable: AtomicBool::new(true),
            ..Default::default()
        }
    }

    fn rejecting() -> Self {
        Self {
            permanent: AtomicBool::new(true),
            ..Default::default()
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnchorSink for ScriptedSink {
    fn sink_id(&self) -> &str {
        "scripted"
    }

    async fn submit(&self, request: &AnchorRequest) -> Result<String, AnchorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.permanent.load(Ordering::SeqCst) {
            return Err(AnchorError::Permanent("root rejected".into()));
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AnchorError::Transient("sink unavailable".into()));
        }
        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
            return Err(AnchorError::Transient("busy".into()));
        }
        Ok(format!(
            "scripted:{}-{}:{}",
            request.batch_start,
            request.batch_end,
            hex::encode(&request.merkle_root[..4])
        ))
    }
}

/// Never answers within the attempt timeout.
struct StalledSink;

#[async_trait]
impl AnchorSink for StalledSink {
    fn sink_id(&self) -> &str {
        "stalled"
    }

    async fn submit(&self, _request: &AnchorRequest) -> Result<String, AnchorError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok("too late".into())
    }
}

/// Stalls like [`StalledSink`] and records that a submission is in flight.
#[derive(Default)]
struct GatedSink {
    entered: AtomicBool,
}

impl GatedSink {
    fn entered(&self) -> bool {
        self.entered.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnchorSink for GatedSink {
    fn sink_id(&self) -> &str {
        "gated"
    }

    async fn submit(&self, _request: &AnchorRequest) -> Result<String, AnchorError> {
        self.entered.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok("too late".into())
    }
}

#[tokio::test]
async fn test_anchor_with_default_sink() {
    let secret = LedgerSecret::new(b"anchoring-test-secret-anchoring-test".to_vec()).unwrap();
    let ledger = Ledger::open(LedgerConfig::new(secret), Box::new(MemoryStorage::new())).unwrap();
    for i in 0..4u8 {
        ledger.append(EventType::Fingerprint, [i; 32]).unwrap();
    }

    let record = ledger.anchor(0..=3).await.unwrap();
    let tags: Vec<_> = ledger.entries().unwrap().iter().map(|e| e.tag).collect();

    assert_eq!(record.status, AnchorStatus::Anchored);
    assert_eq!(record.sink, "noop");
    assert_eq!(Some(record.merkle_root), merkle_root(&tags));
    assert!(ledger.verify_anchor(&record).unwrap());
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let sink = Arc::new(ScriptedSink::flaky(2));
    let ledger = ledger_with_sink(sink.clone(), 6);

    let record = ledger.anchor(1..=4).await.unwrap();

    assert_eq!(record.status, AnchorStatus::Anchored);
    assert_eq!(sink.calls(), 3);
    assert!(record
        .anchor_reference
        .as_deref()
        .is_some_and(|r| r.starts_with("scripted:1-4:")));
    assert!(ledger.pending_anchors().unwrap().is_empty());
}

#[tokio::test]
async fn test_exhausted_retries_leave_batch_pending() {
    let sink = Arc::new(ScriptedSink::down());
    let ledger = ledger_with_sink(sink.clone(), 3);

    let record = ledger.anchor(0..=2).await.unwrap();

    assert!(record.is_pending());
    assert_eq!(record.anchor_reference, None);
    assert!(sink.calls() > 1, "expected retries, got {} calls", sink.calls());
    assert_eq!(ledger.pending_anchors().unwrap(), vec![record.clone()]);

    // Pending batches cannot be written into the chain.
    assert!(ledger.record_anchor(&record).is_err());

    // The sink comes back; the queued batch goes through.
    sink.unavailable.store(false, Ordering::SeqCst);
    let retried = ledger.retry_pending().await.unwrap();

    assert_eq!(retried.len(), 1);
    assert_eq!(retried[0].status, AnchorStatus::Anchored);
    assert_eq!(retried[0].merkle_root, record.merkle_root);
    assert!(ledger.pending_anchors().unwrap().is_empty());

    let entry = ledger.record_anchor(&retried[0]).unwrap();
    assert_eq!(entry.event_type, EventType::Anchor);
    assert_eq!(entry.anchor_ref, retried[0].anchor_reference);
    assert!(ledger.verify().unwrap().valid);
}

#[tokio::test]
async fn test_retry_pending_requeues_when_still_down() {
    let sink = Arc::new(ScriptedSink::down());
    let ledger = ledger_with_sink(sink, 2);

    ledger.anchor(0..=1).await.unwrap();
    let retried = ledger.retry_pending().await.unwrap();

    assert_eq!(retried.len(), 1);
    assert!(retried[0].is_pending());
    assert_eq!(ledger.pending_anchors().unwrap().len(), 1);
}

#[tokio::test]
async fn test_permanent_failure_is_surfaced() {
    let sink = Arc::new(ScriptedSink::rejecting());
    let ledger = ledger_with_sink(sink.clone(), 2);

    let err = ledger.anchor(0..=1).await.unwrap_err();

    assert!(matches!(err, AnchorError::Permanent(_)));
    assert_eq!(sink.calls(), 1);
    assert!(ledger.pending_anchors().unwrap().is_empty());
}

#[tokio::test]
async fn test_stalled_sink_times_out_to_pending() {
    let ledger = ledger_with_sink(Arc::new(StalledSink), 2);

    let record = ledger.anchor(0..=1).await.unwrap();

    match &record.status {
        AnchorStatus::Pending { reason } => assert!(reason.contains("timed out"), "{reason}"),
        other => panic!("expected pending, got {other:?}"),
    }
}

#[tokio::test]
#[allow(clippy::reversed_empty_ranges)]
async fn test_invalid_ranges_rejected() {
    let ledger = ledger_with_sink(Arc::new(ScriptedSink::default()), 3);

    assert!(matches!(
        ledger.anchor(0..=3).await,
        Err(AnchorError::InvalidRange { len: 3, .. })
    ));
    assert!(matches!(
        ledger.anchor(2..=1).await,
        Err(AnchorError::InvalidRange { .. })
    ));
}

#[tokio::test]
async fn test_anchor_verification_detects_rewritten_batch() {
    let secret = LedgerSecret::new(b"anchoring-test-secret-anchoring-test".to_vec()).unwrap();
    let storage = MemoryStorage::new();
    let ledger = Ledger::open(LedgerConfig::new(secret.clone()), Box::new(storage)).unwrap();
    for i in 0..4u8 {
        ledger.append(EventType::Ingest, [i; 32]).unwrap();
    }
    let record = ledger.anchor(0..=3).await.unwrap();

    // Rebuild the same indices with different payloads.
    let forged = Ledger::open(LedgerConfig::new(secret), Box::new(MemoryStorage::new())).unwrap();
    for i in 0..4u8 {
        forged.append(EventType::Ingest, [i + 100; 32]).unwrap();
    }

    assert!(ledger.verify_anchor(&record).unwrap());
    assert!(!forged.verify_anchor(&record).unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_appends_proceed_while_sink_is_waiting() {
    let sink = Arc::new(GatedSink::default());
    let ledger = Arc::new(ledger_with_sink(sink.clone(), 3));

    let anchoring = tokio::spawn({
        let ledger = Arc::clone(&ledger);
        async move { ledger.anchor(0..=2).await }
    });
    while !sink.entered() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    // The sink is still holding the first attempt.
    let entry = ledger.append(EventType::Verification, [9; 32]).unwrap();
    assert_eq!(entry.index, 3);
    assert!(!anchoring.is_finished());

    let result = ledger.verify().unwrap();
    assert!(result.valid);
    assert_eq!(result.entries_checked, 4);
    assert!(!anchoring.is_finished());

    let record = anchoring.await.unwrap().unwrap();
    assert!(record.is_pending());
    assert_eq!((record.batch_start, record.batch_end), (0, 2));
    assert!(ledger.verify_anchor(&record).unwrap());
    assert_eq!(ledger.len().unwrap(), 4);
}
