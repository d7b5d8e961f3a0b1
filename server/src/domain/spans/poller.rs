//! Span ingestion poller
//!
//! The orchestrator task: every poll interval it reads a batch of frames
//! from the ingestion service, decodes them, writes spans and state patches
//! in one DuckDB transaction, and only then persists the new resume cursor.
//!
//! At-least-once contract: on any failure the in-memory cursor stays put and
//! the batch is re-read next cycle; the store's upsert-ignore inserts absorb
//! the redelivery. Cursor values are monotonically non-decreasing and there
//! is exactly one in-flight poll at a time.

use std::sync::Arc;
use std::time::Duration;

use prost::Message;
use opentelemetry_proto::tonic::common::v1::{AnyValue, any_value};
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1::Span;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::decode::decode_span;
use super::persist::persist_batch;
use super::reader::{IngestionClient, ReaderError, SpanFrame};
use crate::core::config::PollerConfig;
use crate::core::constants::SERVICE_NAME_FALLBACK;
use crate::data::duckdb::{DuckdbError, SpanRow, StatePatchRow};
use crate::data::sqlite::SqliteError;
use crate::data::sqlite::repositories::poller_state;
use crate::data::{DuckdbService, SqliteService};

#[derive(Error, Debug)]
pub enum PollerError {
    #[error("Upstream read failed: {0}")]
    Upstream(#[from] ReaderError),

    #[error("Strict mode: {failed} of {total} frames failed to decode")]
    CorruptBatch { failed: usize, total: usize },

    #[error("Columnar store write failed: {0}")]
    Storage(#[from] DuckdbError),

    #[error("Resume cursor save failed: {0}")]
    CursorPersist(#[from] SqliteError),
}

/// A decoded batch ready for persistence
struct PreparedBatch {
    /// Cursor to persist after a successful commit
    next_key: Vec<u8>,
    spans: Vec<SpanRow>,
    patches: Vec<StatePatchRow>,
}

/// Background task that pumps spans from the ingestion WAL into DuckDB
pub struct SpanPoller {
    analytics: Arc<DuckdbService>,
    database: Arc<SqliteService>,
    client: IngestionClient,
    config: PollerConfig,
}

impl SpanPoller {
    pub fn new(
        analytics: Arc<DuckdbService>,
        database: Arc<SqliteService>,
        client: IngestionClient,
        config: PollerConfig,
    ) -> Self {
        Self {
            analytics,
            database,
            client,
            config,
        }
    }

    /// Start the poll loop. Cancellation is honored at every await point;
    /// an in-flight cycle finishes before the task drains.
    pub fn start(mut self, mut shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            // Resume from the persisted cursor; empty means read from the
            // beginning of the WAL.
            let mut cursor = match poller_state::load(self.database.pool()).await {
                Ok(Some(key)) => {
                    tracing::info!(last_key = %hex::encode(&key), "Resuming span poller");
                    key
                }
                Ok(None) => {
                    tracing::info!("Starting span poller from beginning (no saved state)");
                    Vec::new()
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to load poller state, starting from beginning");
                    Vec::new()
                }
            };

            let mut interval =
                tokio::time::interval(Duration::from_secs(self.config.poll_interval_secs));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // Consume the immediate first tick so every cycle sleeps first
            interval.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::debug!("Span poller received shutdown, draining");
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        match self.poll_once(&cursor).await {
                            Ok(Some(next_key)) => cursor = next_key,
                            Ok(None) => {}
                            Err(PollerError::CursorPersist(e)) => {
                                // Batch is committed; redelivery next cycle is
                                // absorbed by upsert-ignore.
                                tracing::warn!(error = %e, "Failed to save resume cursor, batch will be re-read");
                            }
                            Err(e) => {
                                tracing::error!(error = %e, "Poll cycle failed, retrying next cycle");
                            }
                        }
                    }
                }
            }

            tracing::debug!("Span poller stopped");
        })
    }

    /// Run one poll cycle. Returns the new cursor only when the batch was
    /// committed and the cursor persisted; every error path leaves the
    /// caller's cursor unchanged.
    async fn poll_once(&mut self, cursor: &[u8]) -> Result<Option<Vec<u8>>, PollerError> {
        let frames = self
            .client
            .read_spans(cursor, self.config.batch_size)
            .await?;

        let Some(batch) = prepare_batch(&frames, self.config.strict_mode)? else {
            return Ok(None);
        };

        let span_count = batch.spans.len();
        let inserted = persist_batch(&self.analytics, batch.spans, batch.patches).await?;

        poller_state::save(self.database.pool(), &batch.next_key).await?;

        tracing::info!(
            received = frames.len(),
            decoded = span_count,
            inserted,
            last_key = %hex::encode(&batch.next_key),
            "Processed span batch"
        );

        Ok(Some(batch.next_key))
    }
}

/// Decode a batch of frames into rows.
///
/// Corrupt frames are skipped with a warning (strict mode instead fails the
/// batch). Returns None when there is nothing to persist: no frames, or
/// every frame corrupt (the batch is abandoned so the cursor cannot jump
/// over data that never landed).
fn prepare_batch(
    frames: &[SpanFrame],
    strict_mode: bool,
) -> Result<Option<PreparedBatch>, PollerError> {
    if frames.is_empty() {
        return Ok(None);
    }

    let mut parsed: Vec<(&SpanFrame, Span)> = Vec::with_capacity(frames.len());
    let mut failed = 0usize;
    for frame in frames {
        match Span::decode(frame.span_bytes.as_slice()) {
            Ok(span) => parsed.push((frame, span)),
            Err(e) => {
                failed += 1;
                tracing::warn!(
                    error = %e,
                    key = %hex::encode(&frame.key),
                    "Skipping span frame that failed to decode"
                );
            }
        }
    }

    if strict_mode && failed > 0 {
        return Err(PollerError::CorruptBatch {
            failed,
            total: frames.len(),
        });
    }

    if parsed.is_empty() {
        tracing::warn!(received = frames.len(), "All frames failed to decode, abandoning batch");
        return Ok(None);
    }

    // Service name comes from the first successfully decoded frame's resource
    let service_name = extract_service_name(&parsed[0].0.resource_bytes);

    let mut spans = Vec::with_capacity(parsed.len());
    let mut patches = Vec::new();
    for (_, span) in &parsed {
        let (row, span_patches) = decode_span(&service_name, span);
        spans.push(row);
        patches.extend(span_patches);
    }

    Ok(Some(PreparedBatch {
        next_key: frames
            .last()
            .map(|frame| frame.key.clone())
            .unwrap_or_default(),
        spans,
        patches,
    }))
}

/// Pull `service.name` out of a serialized OTLP Resource
fn extract_service_name(resource_bytes: &[u8]) -> String {
    let resource = match Resource::decode(resource_bytes) {
        Ok(resource) => resource,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to decode resource, using default service name");
            return SERVICE_NAME_FALLBACK.to_string();
        }
    };

    for attr in &resource.attributes {
        if attr.key == "service.name"
            && let Some(AnyValue {
                value: Some(any_value::Value::StringValue(name)),
            }) = &attr.value
        {
            return name.clone();
        }
    }

    tracing::warn!("No service.name attribute found in resource, using default");
    SERVICE_NAME_FALLBACK.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry_proto::tonic::common::v1::KeyValue;

    fn encode_span(trace_id: [u8; 16], span_id: [u8; 8]) -> Vec<u8> {
        let span = Span {
            trace_id: trace_id.to_vec(),
            span_id: span_id.to_vec(),
            name: "frame-span".to_string(),
            start_time_unix_nano: 1_700_000_000_000_000_000,
            end_time_unix_nano: 1_700_000_001_000_000_000,
            ..Default::default()
        };
        span.encode_to_vec()
    }

    fn encode_resource(service_name: Option<&str>) -> Vec<u8> {
        let attributes = service_name
            .map(|name| {
                vec![KeyValue {
                    key: "service.name".to_string(),
                    value: Some(AnyValue {
                        value: Some(any_value::Value::StringValue(name.to_string())),
                    }),
                }]
            })
            .unwrap_or_default();
        Resource {
            attributes,
            ..Default::default()
        }
        .encode_to_vec()
    }

    fn make_frame(key: &[u8], span_bytes: Vec<u8>, service_name: Option<&str>) -> SpanFrame {
        SpanFrame {
            key: key.to_vec(),
            span_bytes,
            resource_bytes: encode_resource(service_name),
        }
    }

    #[test]
    fn test_prepare_empty_batch() {
        let batch = prepare_batch(&[], false).unwrap();
        assert!(batch.is_none());
    }

    #[test]
    fn test_prepare_batch_decodes_frames() {
        let frames = vec![
            make_frame(b"k1", encode_span([1; 16], [1; 8]), Some("svc-a")),
            make_frame(b"k2", encode_span([1; 16], [2; 8]), Some("svc-a")),
        ];

        let batch = prepare_batch(&frames, false).unwrap().unwrap();
        assert_eq!(batch.spans.len(), 2);
        assert_eq!(batch.next_key, b"k2");
        assert_eq!(batch.spans[0].service_name, "svc-a");
        assert_eq!(batch.spans[0].trace_id, "01".repeat(16));
    }

    #[test]
    fn test_prepare_batch_skips_corrupt_frame() {
        let frames = vec![
            make_frame(b"k1", encode_span([1; 16], [1; 8]), Some("svc")),
            make_frame(b"k2", b"\xff\xff\xff\x01garbage".to_vec(), Some("svc")),
            make_frame(b"k3", encode_span([1; 16], [3; 8]), Some("svc")),
        ];

        let batch = prepare_batch(&frames, false).unwrap().unwrap();
        // Corrupt frame dropped, cursor still advances past it
        assert_eq!(batch.spans.len(), 2);
        assert_eq!(batch.next_key, b"k3");
    }

    #[test]
    fn test_prepare_batch_all_corrupt_abandoned() {
        let frames = vec![
            make_frame(b"k1", b"\xff\xff".to_vec(), Some("svc")),
            make_frame(b"k2", b"\xff\xff".to_vec(), Some("svc")),
        ];

        let batch = prepare_batch(&frames, false).unwrap();
        assert!(batch.is_none());
    }

    #[test]
    fn test_prepare_batch_strict_mode_fails_on_corrupt_frame() {
        let frames = vec![
            make_frame(b"k1", encode_span([1; 16], [1; 8]), Some("svc")),
            make_frame(b"k2", b"\xff\xff".to_vec(), Some("svc")),
        ];

        let result = prepare_batch(&frames, true);
        assert!(matches!(
            result,
            Err(PollerError::CorruptBatch { failed: 1, total: 2 })
        ));
    }

    #[test]
    fn test_prepare_batch_service_name_from_first_decoded_frame() {
        let frames = vec![
            // First frame is corrupt; its resource must not win
            make_frame(b"k1", b"\xff\xff".to_vec(), Some("corrupt-svc")),
            make_frame(b"k2", encode_span([1; 16], [2; 8]), Some("live-svc")),
        ];

        let batch = prepare_batch(&frames, false).unwrap().unwrap();
        assert_eq!(batch.spans[0].service_name, "live-svc");
    }

    #[test]
    fn test_extract_service_name_fallbacks() {
        assert_eq!(
            extract_service_name(&encode_resource(None)),
            SERVICE_NAME_FALLBACK
        );
        assert_eq!(
            extract_service_name(b"\xff\xff not a resource"),
            SERVICE_NAME_FALLBACK
        );
        assert_eq!(extract_service_name(&encode_resource(Some("svc"))), "svc");
    }

    #[test]
    fn test_prepare_batch_collects_patches() {
        use opentelemetry_proto::tonic::trace::v1::span;

        let span = Span {
            trace_id: vec![2; 16],
            span_id: vec![3; 8],
            name: "wf".to_string(),
            attributes: vec![
                KeyValue {
                    key: "junjo.span_type".to_string(),
                    value: Some(AnyValue {
                        value: Some(any_value::Value::StringValue("workflow".to_string())),
                    }),
                },
                KeyValue {
                    key: "junjo.id".to_string(),
                    value: Some(AnyValue {
                        value: Some(any_value::Value::StringValue("wf-1".to_string())),
                    }),
                },
            ],
            events: vec![span::Event {
                name: "set_state".to_string(),
                time_unix_nano: 1,
                ..Default::default()
            }],
            ..Default::default()
        };

        let frames = vec![make_frame(b"k1", span.encode_to_vec(), Some("svc"))];
        let batch = prepare_batch(&frames, false).unwrap().unwrap();
        assert_eq!(batch.patches.len(), 1);
        assert_eq!(batch.patches[0].workflow_id, "wf-1");
    }
}
