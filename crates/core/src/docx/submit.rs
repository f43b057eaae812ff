use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::{encode_children, parse, Block};
use crate::errors::SubmissionError;
use crate::platform::DocumentWriter;

/// The docx children endpoint accepts at most 50 blocks per call.
pub const DEFAULT_BATCH_LIMIT: usize = 50;
/// Keeps writes to one document under three per second.
pub const DEFAULT_PACING_DELAY: Duration = Duration::from_millis(400);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchPolicy {
    pub batch_limit: usize,
    pub pacing_delay: Duration,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self { batch_limit: DEFAULT_BATCH_LIMIT, pacing_delay: DEFAULT_PACING_DELAY }
    }
}

impl BatchPolicy {
    pub fn new(batch_limit: usize, pacing_delay: Duration) -> Self {
        Self { batch_limit, pacing_delay }
    }

    fn effective_limit(&self) -> usize {
        self.batch_limit.max(1)
    }

    pub fn batch_count(&self, block_count: usize) -> usize {
        block_count.div_ceil(self.effective_limit())
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubmissionResult {
    pub blocks_written: usize,
    pub batches: usize,
    /// Response of the final writer call; `Null` when nothing was written.
    pub last_response: Value,
}

impl SubmissionResult {
    pub fn is_empty(&self) -> bool {
        self.blocks_written == 0
    }
}

/// Writes `blocks` in order, one writer call per batch, pausing between
/// batches. The first failure stops the submission; earlier batches are left
/// in place and counted in the error.
pub async fn submit_blocks<W>(
    writer: &W,
    document_id: &str,
    blocks: &[Block],
    policy: &BatchPolicy,
) -> Result<SubmissionResult, SubmissionError>
where
    W: DocumentWriter + ?Sized,
{
    let mut result = SubmissionResult::default();
    if blocks.is_empty() {
        debug!(document_id, "no blocks to submit");
        return Ok(result);
    }

    let limit = policy.effective_limit();
    let total_batches = policy.batch_count(blocks.len());

    for (index, batch) in blocks.chunks(limit).enumerate() {
        if index > 0 && !policy.pacing_delay.is_zero() {
            tokio::time::sleep(policy.pacing_delay).await;
        }

        let offset = index * limit;
        let fingerprint = batch_fingerprint(batch);
        let response = match writer.append_children(document_id, batch).await {
            Ok(response) => response,
            Err(source) => {
                warn!(
                    event_name = "docx.submit.batch_failed",
                    document_id,
                    batch = index + 1,
                    total_batches,
                    blocks_written = result.blocks_written,
                    fingerprint = %fingerprint,
                    error = %source,
                    "document batch write failed; aborting remaining batches"
                );
                return Err(SubmissionError { blocks_written: result.blocks_written, source });
            }
        };

        result.blocks_written += batch.len();
        result.batches += 1;
        result.last_response = response;

        info!(
            event_name = "docx.submit.batch_written",
            document_id,
            batch = index + 1,
            total_batches,
            range_start = offset,
            range_end = offset + batch.len(),
            fingerprint = %fingerprint,
            "wrote document batch"
        );
    }

    info!(
        event_name = "docx.submit.completed",
        document_id,
        blocks_written = result.blocks_written,
        batches = result.batches,
        "document submission completed"
    );
    Ok(result)
}

pub async fn write_markdown<W>(
    writer: &W,
    document_id: &str,
    markdown: &str,
    policy: &BatchPolicy,
) -> Result<SubmissionResult, SubmissionError>
where
    W: DocumentWriter + ?Sized,
{
    let blocks = parse(markdown);
    if blocks.is_empty() {
        warn!(document_id, "markdown produced no blocks; skipping write");
    }
    submit_blocks(writer, document_id, &blocks, policy).await
}

/// Content hash of a batch's wire form, logged so a duplicated append after
/// a retry can be spotted in the document history.
pub fn batch_fingerprint(batch: &[Block]) -> String {
    let encoded = Value::Array(encode_children(batch)).to_string();
    let hex = blake3::hash(encoded.as_bytes()).to_hex();
    hex.as_str()[..16].to_owned()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio::sync::Mutex;
    use tokio::time::Instant;

    use super::{batch_fingerprint, submit_blocks, write_markdown, BatchPolicy};
    use crate::docx::{Block, Span};
    use crate::errors::PlatformError;
    use crate::platform::DocumentWriter;

    #[derive(Default)]
    struct RecordingWriter {
        calls: Mutex<Vec<(usize, Instant)>>,
        first_block_text: Mutex<Vec<String>>,
        fail_on_call: Option<usize>,
    }

    impl RecordingWriter {
        fn failing_on(call: usize) -> Self {
            Self { fail_on_call: Some(call), ..Self::default() }
        }

        async fn sizes(&self) -> Vec<usize> {
            self.calls.lock().await.iter().map(|(size, _)| *size).collect()
        }
    }

    #[async_trait]
    impl DocumentWriter for RecordingWriter {
        async fn append_children(
            &self,
            document_id: &str,
            children: &[Block],
        ) -> Result<Value, PlatformError> {
            let mut calls = self.calls.lock().await;
            calls.push((children.len(), Instant::now()));
            let call_number = calls.len();
            drop(calls);

            if let Some(span) = children.first().and_then(Block::span) {
                self.first_block_text.lock().await.push(span.text().to_owned());
            }

            if self.fail_on_call == Some(call_number) {
                return Err(PlatformError::Api {
                    path: format!("/open-apis/docx/v1/documents/{document_id}/blocks"),
                    code: 99991400,
                    msg: "request trigger frequency limit".to_owned(),
                });
            }

            Ok(json!({ "call": call_number }))
        }
    }

    fn paragraphs(count: usize) -> Vec<Block> {
        (0..count).map(|index| Block::Paragraph(Span::plain(format!("p{index}")))).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn splits_into_ordered_batches_with_pacing_between_them() {
        let writer = RecordingWriter::default();
        let started = Instant::now();

        let result = submit_blocks(&writer, "doc1", &paragraphs(120), &BatchPolicy::default())
            .await
            .expect("submission should succeed");

        assert_eq!(writer.sizes().await, vec![50, 50, 20]);
        assert_eq!(*writer.first_block_text.lock().await, vec!["p0", "p50", "p100"]);
        assert_eq!(result.blocks_written, 120);
        assert_eq!(result.batches, 3);
        assert_eq!(result.last_response, json!({ "call": 3 }));

        let calls = writer.calls.lock().await;
        assert_eq!(calls[0].1 - started, Duration::ZERO);
        assert_eq!(calls[1].1 - calls[0].1, Duration::from_millis(400));
        assert_eq!(calls[2].1 - calls[1].1, Duration::from_millis(400));
        drop(calls);

        // two suspensions in total, none after the final batch
        assert_eq!(started.elapsed(), Duration::from_millis(800));
    }

    #[tokio::test(start_paused = true)]
    async fn failure_on_second_batch_reports_first_batch_as_written() {
        let writer = RecordingWriter::failing_on(2);

        let error = submit_blocks(&writer, "doc1", &paragraphs(120), &BatchPolicy::default())
            .await
            .expect_err("second batch should fail");

        assert_eq!(error.blocks_written, 50);
        assert_eq!(error.resume_offset(), 50);
        assert_eq!(error.source.api_code(), Some(99991400));
        assert_eq!(writer.sizes().await, vec![50, 50]);
    }

    #[tokio::test]
    async fn empty_sequence_makes_no_calls() {
        let writer = RecordingWriter::default();

        let result = submit_blocks(&writer, "doc1", &[], &BatchPolicy::default())
            .await
            .expect("empty submission succeeds");

        assert!(result.is_empty());
        assert_eq!(result.batches, 0);
        assert_eq!(result.last_response, Value::Null);
        assert!(writer.sizes().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn exact_multiple_of_limit_has_no_trailing_batch() {
        let writer = RecordingWriter::default();
        let started = Instant::now();

        submit_blocks(&writer, "doc1", &paragraphs(100), &BatchPolicy::default())
            .await
            .expect("submission should succeed");

        assert_eq!(writer.sizes().await, vec![50, 50]);
        assert_eq!(started.elapsed(), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn zero_limit_is_treated_as_one() {
        let writer = RecordingWriter::default();
        let policy = BatchPolicy::new(0, Duration::ZERO);

        let result =
            submit_blocks(&writer, "doc1", &paragraphs(3), &policy).await.expect("submission");

        assert_eq!(writer.sizes().await, vec![1, 1, 1]);
        assert_eq!(result.blocks_written, 3);
    }

    #[tokio::test]
    async fn write_markdown_parses_then_submits() {
        let writer = RecordingWriter::default();

        let result = write_markdown(&writer, "doc1", "# Title\n\n- a\n- b\n", &BatchPolicy::default())
            .await
            .expect("markdown write succeeds");

        assert_eq!(result.blocks_written, 3);
        assert_eq!(writer.sizes().await, vec![3]);
    }

    #[test]
    fn fingerprint_is_stable_and_content_sensitive() {
        let first = batch_fingerprint(&paragraphs(2));
        assert_eq!(first, batch_fingerprint(&paragraphs(2)));
        assert_ne!(first, batch_fingerprint(&paragraphs(3)));
        assert_eq!(first.len(), 16);
    }
}
