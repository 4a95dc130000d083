//! The three sequential ingestion stages and their shared retry machinery.
//!
//! Stages process items strictly in order, one at a time. The point is to
//! stay under upstream rate limits, not to maximize throughput; the only
//! suspension points are the backoff and pacing sleeps.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::{sleep, Instant};

use crate::complexity::is_complex_file;
use crate::controls::{IngestControls, RetryPolicy};
use crate::documents::{Document, EmbeddingRecord, SummaryRecord};
use crate::services::{EmbeddingService, ServiceError, SummaryService};
use crate::store::RecordSink;

/// Terminal outcome of driving one item through the retry loop.
#[derive(Debug)]
pub enum ItemOutcome<T> {
    /// The call succeeded within the attempt budget.
    Completed(T),
    /// The item exhausted its attempt budget and is excluded from output.
    Dropped(DropReason),
}

/// Why an item was dropped.
#[derive(Debug)]
pub enum DropReason {
    /// Every remaining attempt was consumed by upstream rate limiting.
    RateLimited,
    /// A non-rate-limit failure persisted through the attempt budget.
    Failed(ServiceError),
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited => write!(f, "rate limit budget exhausted"),
            Self::Failed(err) => write!(f, "retry budget exhausted: {err}"),
        }
    }
}

/// Drives one external call under the retry policy.
///
/// Rate-limited failures back off exponentially and never surface as errors:
/// once the budget is spent the item is dropped. Other failures back off a
/// fixed interval while attempts remain, then drop with the final error.
async fn retry_loop<T, F, Fut>(policy: &RetryPolicy, mut call: F) -> ItemOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let mut attempts = 0;
    while attempts < policy.max_attempts() {
        match call().await {
            Ok(value) => return ItemOutcome::Completed(value),
            Err(err) => {
                attempts += 1;
                if err.is_rate_limited() {
                    let backoff = policy.rate_limit_backoff(attempts);
                    crate::debug_log!("rate limited (attempt {attempts}), backing off {backoff:?}");
                    sleep(backoff).await;
                } else if attempts < policy.max_attempts() {
                    crate::debug_log!("transient failure (attempt {attempts}): {err}");
                    sleep(policy.transient_backoff()).await;
                } else {
                    return ItemOutcome::Dropped(DropReason::Failed(err));
                }
            }
        }
    }
    ItemOutcome::Dropped(DropReason::RateLimited)
}

/// Summarizes every document in order, one at a time.
///
/// Documents that exhaust their retry budget are dropped; the stage never
/// fails as a whole. The stage also holds the line for a minimum wall-clock
/// duration so tiny batches do not look like bursts to the upstream limiter.
pub async fn summarize_all<S: SummaryService>(
    service: &S,
    documents: &[Document],
    controls: &IngestControls,
) -> Vec<SummaryRecord> {
    let started = Instant::now();
    let total = documents.len();
    println!("Starting summarization of {total} files");

    let mut records = Vec::new();
    for (index, document) in documents.iter().enumerate() {
        println!("Summarizing file {}/{}: {}", index + 1, total, document.path);
        match retry_loop(controls.retry(), || service.summarize(document)).await {
            ItemOutcome::Completed(summary) => {
                records.push(SummaryRecord::from_document(document, summary));
                let pacing = if is_complex_file(&document.path, &document.content) {
                    controls.complex_pacing()
                } else {
                    controls.simple_pacing()
                };
                sleep(pacing).await;
            }
            ItemOutcome::Dropped(DropReason::RateLimited) => {
                crate::debug_log!("dropping {}: rate limit budget exhausted", document.path);
            }
            ItemOutcome::Dropped(DropReason::Failed(err)) => {
                eprintln!("Error processing {}: {err}", document.path);
            }
        }
    }

    let elapsed = started.elapsed();
    if let Some(remaining) = controls.min_stage_duration().checked_sub(elapsed) {
        if !remaining.is_zero() {
            sleep(remaining).await;
        }
    }

    records
}

/// Embeds every surviving summary in order, one at a time.
///
/// Same retry shape as summarization; pacing after each success is a uniform
/// random jitter instead of a complexity-based delay, and there is no
/// minimum-duration floor.
pub async fn embed_all<E: EmbeddingService>(
    service: &E,
    summaries: &[SummaryRecord],
    controls: &IngestControls,
) -> Vec<EmbeddingRecord> {
    let total = summaries.len();
    println!("Starting embedding generation for {total} summaries");

    let mut records = Vec::new();
    for (index, record) in summaries.iter().enumerate() {
        println!(
            "Generating embedding {}/{}: {}",
            index + 1,
            total,
            record.file_name
        );
        match retry_loop(controls.retry(), || service.embed(&record.summary)).await {
            ItemOutcome::Completed(embedding) => {
                records.push(EmbeddingRecord::from_summary(record.clone(), embedding));
                let jitter_ms = rand::thread_rng()
                    .gen_range(controls.jitter_floor_ms()..controls.jitter_ceiling_ms());
                sleep(Duration::from_millis(jitter_ms)).await;
            }
            ItemOutcome::Dropped(DropReason::RateLimited) => {
                crate::debug_log!("dropping {}: rate limit budget exhausted", record.file_name);
            }
            ItemOutcome::Dropped(DropReason::Failed(err)) => {
                eprintln!("Error generating embedding for {}: {err}", record.file_name);
            }
        }
    }

    records
}

/// Writes every embedding record through the sink, strictly sequentially.
///
/// A failure for one record is logged and never stops the rest; nothing is
/// retried. Returns how many records were stored.
pub async fn persist_all<K: RecordSink>(
    sink: &K,
    records: &[EmbeddingRecord],
    controls: &IngestControls,
) -> usize {
    let total = records.len();
    let mut stored = 0;
    for (index, record) in records.iter().enumerate() {
        println!("Saving data for {} ({}/{})", record.file_name, index + 1, total);
        match sink.persist(record).await {
            Ok(()) => stored += 1,
            Err(err) => eprintln!("Error saving data for {}: {err:#}", record.file_name),
        }
        sleep(controls.persist_delay()).await;
    }
    stored
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use pretty_assertions::assert_eq;
    use reqwest::StatusCode;
    use std::cell::RefCell;
    use std::collections::HashMap;

    const ALWAYS: usize = usize::MAX;

    #[derive(Clone, Copy)]
    enum Failure {
        RateLimited,
        Other,
    }

    impl Failure {
        fn error(self) -> ServiceError {
            match self {
                Self::RateLimited => ServiceError::Status {
                    status: StatusCode::TOO_MANY_REQUESTS,
                    body: "rate limited".to_string(),
                },
                Self::Other => ServiceError::Status {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    body: "boom".to_string(),
                },
            }
        }
    }

    struct Plan {
        failures_before_success: usize,
        kind: Failure,
        calls: usize,
    }

    struct Scripted {
        plans: RefCell<HashMap<String, Plan>>,
    }

    impl Scripted {
        fn new(plans: Vec<(&str, usize, Failure)>) -> Self {
            Self {
                plans: RefCell::new(
                    plans
                        .into_iter()
                        .map(|(key, failures_before_success, kind)| {
                            (
                                key.to_string(),
                                Plan {
                                    failures_before_success,
                                    kind,
                                    calls: 0,
                                },
                            )
                        })
                        .collect(),
                ),
            }
        }

        fn record_call(&self, key: &str) -> Result<(), ServiceError> {
            let mut plans = self.plans.borrow_mut();
            let plan = plans.get_mut(key).expect("scripted key");
            plan.calls += 1;
            if plan.calls <= plan.failures_before_success {
                Err(plan.kind.error())
            } else {
                Ok(())
            }
        }

        fn calls(&self, key: &str) -> usize {
            self.plans.borrow().get(key).expect("scripted key").calls
        }
    }

    impl SummaryService for Scripted {
        async fn summarize(&self, document: &Document) -> Result<String, ServiceError> {
            self.record_call(&document.path)?;
            Ok(format!("summary of {}", document.path))
        }
    }

    impl EmbeddingService for Scripted {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
            self.record_call(text)?;
            Ok(vec![0.1, 0.2, 0.3])
        }
    }

    struct MockSink {
        fail_for: Option<String>,
        attempts: RefCell<Vec<String>>,
        persisted: RefCell<Vec<String>>,
    }

    impl MockSink {
        fn new(fail_for: Option<&str>) -> Self {
            Self {
                fail_for: fail_for.map(str::to_string),
                attempts: RefCell::new(Vec::new()),
                persisted: RefCell::new(Vec::new()),
            }
        }
    }

    impl RecordSink for MockSink {
        async fn persist(&self, record: &EmbeddingRecord) -> anyhow::Result<()> {
            self.attempts.borrow_mut().push(record.file_name.clone());
            if self.fail_for.as_deref() == Some(record.file_name.as_str()) {
                bail!("insert failed");
            }
            self.persisted.borrow_mut().push(record.file_name.clone());
            Ok(())
        }
    }

    fn doc(path: &str, content_len: usize) -> Document {
        Document::new(path, "x".repeat(content_len))
    }

    fn summary(file_name: &str) -> SummaryRecord {
        SummaryRecord {
            file_name: file_name.to_string(),
            summary: format!("summary of {file_name}"),
            source_code: "code".to_string(),
        }
    }

    fn embedded(file_name: &str) -> EmbeddingRecord {
        EmbeddingRecord::from_summary(summary(file_name), vec![0.5; 3])
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn recovers_after_rate_limit_failures() {
        let service = Scripted::new(vec![("a.ts", 3, Failure::RateLimited)]);
        let documents = vec![doc("a.ts", 100)];
        let started = Instant::now();

        let records = summarize_all(&service, &documents, &IngestControls::default()).await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].file_name, "a.ts");
        assert_eq!(service.calls("a.ts"), 4);
        // Backoffs 60 + 120 + 240, then 2s pacing; above the 10s floor.
        assert_eq!(started.elapsed(), Duration::from_secs(422));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn transient_failures_use_fixed_backoff() {
        let service = Scripted::new(vec![("a.ts", 2, Failure::Other)]);
        let documents = vec![doc("a.ts", 100)];
        let started = Instant::now();

        let records = summarize_all(&service, &documents, &IngestControls::default()).await;

        assert_eq!(records.len(), 1);
        assert_eq!(service.calls("a.ts"), 3);
        // Two 10s backoffs plus 2s pacing; above the 10s floor.
        assert_eq!(started.elapsed(), Duration::from_secs(22));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn exhaustion_drops_document_after_five_attempts() {
        let service = Scripted::new(vec![
            ("a.ts", ALWAYS, Failure::Other),
            ("b.ts", 0, Failure::Other),
        ]);
        let documents = vec![doc("a.ts", 100), doc("b.ts", 100)];

        let records = summarize_all(&service, &documents, &IngestControls::default()).await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].file_name, "b.ts");
        assert_eq!(service.calls("a.ts"), 5);
        assert_eq!(service.calls("b.ts"), 1);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn rate_limit_exhaustion_drops_silently() {
        let service = Scripted::new(vec![("a.ts", ALWAYS, Failure::RateLimited)]);
        let documents = vec![doc("a.ts", 100)];

        let records = summarize_all(&service, &documents, &IngestControls::default()).await;

        assert!(records.is_empty());
        assert_eq!(service.calls("a.ts"), 5);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn failing_item_does_not_affect_successors() {
        let service = Scripted::new(vec![
            ("a.ts", 0, Failure::Other),
            ("b.ts", ALWAYS, Failure::Other),
            ("c.ts", 0, Failure::Other),
        ]);
        let documents = vec![doc("a.ts", 100), doc("b.ts", 100), doc("c.ts", 100)];

        let records = summarize_all(&service, &documents, &IngestControls::default()).await;

        let names: Vec<&str> = records.iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.ts", "c.ts"]);
        assert_eq!(service.calls("a.ts"), 1);
        assert_eq!(service.calls("b.ts"), 5);
        assert_eq!(service.calls("c.ts"), 1);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn enforces_minimum_stage_duration() {
        let service = Scripted::new(vec![("a.ts", 0, Failure::Other)]);
        let documents = vec![doc("a.ts", 100)];
        let started = Instant::now();

        let records = summarize_all(&service, &documents, &IngestControls::default()).await;

        assert_eq!(records.len(), 1);
        // 2s pacing, then the floor tops the stage up to 10s.
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn complex_files_pace_longer_than_simple_ones() {
        let simple = Scripted::new(vec![
            ("a.ts", 0, Failure::Other),
            ("b.ts", 0, Failure::Other),
            ("c.ts", 0, Failure::Other),
            ("d.ts", 0, Failure::Other),
            ("e.ts", 0, Failure::Other),
            ("f.ts", 0, Failure::Other),
        ]);
        let documents: Vec<Document> =
            ["a.ts", "b.ts", "c.ts", "d.ts", "e.ts", "f.ts"]
                .iter()
                .map(|path| doc(path, 100))
                .collect();
        let started = Instant::now();
        summarize_all(&simple, &documents, &IngestControls::default()).await;
        assert_eq!(started.elapsed(), Duration::from_secs(12));

        let mixed = Scripted::new(vec![
            ("a.ts", 0, Failure::Other),
            ("b.json", 0, Failure::Other),
            ("c.test.ts", 0, Failure::Other),
            ("d.ts", 0, Failure::Other),
            ("e.ts", 0, Failure::Other),
            ("f.ts", 0, Failure::Other),
        ]);
        let documents: Vec<Document> =
            ["a.ts", "b.json", "c.test.ts", "d.ts", "e.ts", "f.ts"]
                .iter()
                .map(|path| doc(path, 100))
                .collect();
        let started = Instant::now();
        summarize_all(&mixed, &documents, &IngestControls::default()).await;
        // Two complex files swap 2s pacing for 4s.
        assert_eq!(started.elapsed(), Duration::from_secs(16));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn embedding_retries_then_succeeds() {
        let service = Scripted::new(vec![("summary of a.ts", 2, Failure::RateLimited)]);
        let summaries = vec![summary("a.ts")];
        let started = Instant::now();

        let records = embed_all(&service, &summaries, &IngestControls::default()).await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].embedding, vec![0.1, 0.2, 0.3]);
        assert_eq!(service.calls("summary of a.ts"), 3);
        // Backoffs 60 + 120, then a jitter in [2s, 4s).
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(182));
        assert!(elapsed < Duration::from_secs(184));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn embedding_exhaustion_drops_item_and_continues() {
        let service = Scripted::new(vec![
            ("summary of a.ts", ALWAYS, Failure::Other),
            ("summary of b.ts", 0, Failure::Other),
        ]);
        let summaries = vec![summary("a.ts"), summary("b.ts")];

        let records = embed_all(&service, &summaries, &IngestControls::default()).await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].file_name, "b.ts");
        assert_eq!(service.calls("summary of a.ts"), 5);
        assert_eq!(service.calls("summary of b.ts"), 1);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn embedding_paces_with_bounded_jitter() {
        let service = Scripted::new(vec![("summary of a.ts", 0, Failure::Other)]);
        let summaries = vec![summary("a.ts")];
        let started = Instant::now();

        embed_all(&service, &summaries, &IngestControls::default()).await;

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(2000));
        assert!(elapsed < Duration::from_millis(4000));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn persistence_failure_does_not_stop_the_batch() {
        let sink = MockSink::new(Some("b.ts"));
        let records = vec![embedded("a.ts"), embedded("b.ts"), embedded("c.ts")];
        let started = Instant::now();

        let stored = persist_all(&sink, &records, &IngestControls::default()).await;

        assert_eq!(stored, 2);
        assert_eq!(
            *sink.attempts.borrow(),
            vec!["a.ts".to_string(), "b.ts".to_string(), "c.ts".to_string()]
        );
        assert_eq!(
            *sink.persisted.borrow(),
            vec!["a.ts".to_string(), "c.ts".to_string()]
        );
        // The 1s delay follows every attempt, including the failed one.
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }
}
