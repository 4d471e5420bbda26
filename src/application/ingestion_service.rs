// Ingestion service - Sequential, resumable batch writes into the store
use crate::application::telemetry_store::TelemetryStore;
use crate::domain::error::{IngestError, StoreError};
use crate::domain::telemetry::{DeviceId, DeviceStatus, RoomId, TelemetryRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct IngestSettings {
    /// Requested batch size; capped by the store's own limit.
    pub batch_size: usize,
    pub inter_batch_delay: Duration,
    pub write_timeout: Duration,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            batch_size: 25,
            inter_batch_delay: Duration::from_millis(100),
            write_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestState {
    Pending { offset: usize },
    Writing { offset: usize, batch_size: usize },
    Committed { offset: usize },
    Failed { offset: usize, artifact: PathBuf },
}

impl IngestState {
    pub fn offset(&self) -> usize {
        match self {
            IngestState::Pending { offset }
            | IngestState::Writing { offset, .. }
            | IngestState::Committed { offset }
            | IngestState::Failed { offset, .. } => *offset,
        }
    }
}

/// One committed batch. Offsets are absolute positions in the full input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchProgress {
    pub index: usize,
    pub start: usize,
    pub end: usize,
}

impl BatchProgress {
    pub fn size(&self) -> usize {
        self.end - self.start
    }
}

#[derive(Debug, Clone)]
pub struct IngestReport {
    pub table: String,
    pub total: usize,
    pub batches: Vec<BatchProgress>,
    pub state: IngestState,
}

impl IngestReport {
    pub fn is_complete(&self) -> bool {
        self.state == IngestState::Committed { offset: self.total }
    }
}

/// Everything a later run needs to continue a halted one.
///
/// `records` holds the input from `offset` to the end; its first
/// `failed_batch_size` entries are the batch that failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeArtifact {
    pub table: String,
    pub offset: usize,
    pub total: usize,
    pub batch_index: usize,
    pub failed_batch_size: usize,
    pub reason: String,
    pub records: Vec<TelemetryRecord>,
}

impl ResumeArtifact {
    pub fn failed_batch(&self) -> &[TelemetryRecord] {
        &self.records[..self.failed_batch_size.min(self.records.len())]
    }
}

#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Persist the artifact and return where it was written.
    async fn persist(&self, artifact: &ResumeArtifact) -> std::io::Result<PathBuf>;
}

/// Shape of an input set, logged before the first write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSummary {
    pub total: usize,
    pub devices: usize,
    pub rooms: usize,
    pub sensor_errors: usize,
    /// Devices seen in more than one room.
    pub roaming_devices: Vec<DeviceId>,
}

impl DatasetSummary {
    pub fn of(records: &[TelemetryRecord]) -> Self {
        let mut rooms_by_device: BTreeMap<&DeviceId, BTreeSet<&RoomId>> = BTreeMap::new();
        let mut rooms = BTreeSet::new();
        let mut sensor_errors = 0;

        for record in records {
            rooms_by_device
                .entry(record.device_id())
                .or_default()
                .insert(record.room_id());
            rooms.insert(record.room_id());
            if record.device_status() == DeviceStatus::SensorError {
                sensor_errors += 1;
            }
        }

        let roaming_devices = rooms_by_device
            .iter()
            .filter(|(_, rooms)| rooms.len() > 1)
            .map(|(device, _)| (*device).clone())
            .collect();

        Self {
            total: records.len(),
            devices: rooms_by_device.len(),
            rooms: rooms.len(),
            sensor_errors,
            roaming_devices,
        }
    }
}

/// Writes an ordered record set in bounded, atomic batches.
///
/// Batches go out one at a time so the committed prefix only ever grows. The
/// first failed or timed-out batch halts the run and is saved, together with
/// everything after it, as a [`ResumeArtifact`].
#[derive(Clone)]
pub struct IngestionService {
    store: Arc<dyn TelemetryStore>,
    artifacts: Arc<dyn ArtifactSink>,
    settings: IngestSettings,
}

impl IngestionService {
    pub fn new(
        store: Arc<dyn TelemetryStore>,
        artifacts: Arc<dyn ArtifactSink>,
        settings: IngestSettings,
    ) -> Self {
        Self {
            store,
            artifacts,
            settings,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.settings.batch_size.min(self.store.max_batch_size())
    }

    /// Ingest `records[start_offset..]`.
    ///
    /// A halted run is reported through `IngestReport::state`; `Err` is only
    /// returned when the run could not start or its artifact could not be saved.
    pub async fn run(
        &self,
        table: &str,
        records: &[TelemetryRecord],
        start_offset: usize,
        cancel: &CancellationToken,
    ) -> Result<IngestReport, IngestError> {
        let total = records.len();
        if start_offset > total {
            return Err(IngestError::OffsetOutOfRange {
                offset: start_offset,
                total,
            });
        }
        let batch_size = self.batch_size();
        if batch_size == 0 {
            return Err(IngestError::ZeroBatchSize);
        }

        let origin = Origin {
            offset: start_offset,
            batch_index: start_offset / batch_size,
        };
        self.write_from(table, &records[start_offset..], origin, cancel)
            .await
    }

    /// Continue a halted run from its artifact.
    ///
    /// Offsets and batch indexes in the report, and in any artifact a second
    /// failure produces, stay positions in the original input.
    pub async fn resume(
        &self,
        artifact: &ResumeArtifact,
        cancel: &CancellationToken,
    ) -> Result<IngestReport, IngestError> {
        if artifact.offset + artifact.records.len() != artifact.total {
            return Err(IngestError::ArtifactMismatch {
                offset: artifact.offset,
                remaining: artifact.records.len(),
                total: artifact.total,
            });
        }
        if self.batch_size() == 0 {
            return Err(IngestError::ZeroBatchSize);
        }

        tracing::info!(
            table = %artifact.table,
            offset = artifact.offset,
            remaining = artifact.records.len(),
            "resuming ingestion"
        );
        let origin = Origin {
            offset: artifact.offset,
            batch_index: artifact.batch_index,
        };
        self.write_from(&artifact.table, &artifact.records, origin, cancel)
            .await
    }

    /// Write `pending`, the tail of an input that starts at `origin.offset`.
    async fn write_from(
        &self,
        table: &str,
        pending: &[TelemetryRecord],
        origin: Origin,
        cancel: &CancellationToken,
    ) -> Result<IngestReport, IngestError> {
        let batch_size = self.batch_size();
        let total = origin.offset + pending.len();

        let summary = DatasetSummary::of(pending);
        tracing::info!(
            table,
            total,
            start_offset = origin.offset,
            batch_size,
            devices = summary.devices,
            rooms = summary.rooms,
            sensor_errors = summary.sensor_errors,
            "starting ingestion"
        );
        if !summary.roaming_devices.is_empty() {
            tracing::warn!(
                devices = ?summary.roaming_devices,
                "devices report from more than one room"
            );
        }

        let mut report = IngestReport {
            table: table.to_string(),
            total,
            batches: Vec::new(),
            state: IngestState::Pending {
                offset: origin.offset,
            },
        };
        let mut offset = origin.offset;
        let mut index = origin.batch_index;

        while offset < total {
            let rest = &pending[offset - origin.offset..];
            if cancel.is_cancelled() {
                let failed = rest.len().min(batch_size);
                return self
                    .halt(report, rest, index, failed, "cancelled".to_string())
                    .await;
            }

            let batch = &rest[..rest.len().min(batch_size)];
            let end = offset + batch.len();
            report.state = IngestState::Writing {
                offset,
                batch_size: batch.len(),
            };
            tracing::debug!(batch = index, start = offset, end, "writing batch");

            let outcome =
                tokio::time::timeout(self.settings.write_timeout, self.store.write_batch(batch))
                    .await
                    .unwrap_or(Err(StoreError::Timeout(self.settings.write_timeout)));

            if let Err(err) = outcome {
                return self
                    .halt(report, rest, index, batch.len(), err.to_string())
                    .await;
            }

            let progress = BatchProgress {
                index,
                start: offset,
                end,
            };
            tracing::info!(
                batch = progress.index,
                start = progress.start,
                end = progress.end,
                size = progress.size(),
                "committed batch"
            );
            report.batches.push(progress);
            offset = end;
            index += 1;
            report.state = IngestState::Committed { offset };

            if offset < total {
                tokio::select! {
                    _ = tokio::time::sleep(self.settings.inter_batch_delay) => {}
                    _ = cancel.cancelled() => {}
                }
            }
        }

        tracing::info!(table, committed = offset, "ingestion complete");
        Ok(report)
    }

    /// Save `rest` (the failed batch and everything after it) and mark the run failed.
    async fn halt(
        &self,
        mut report: IngestReport,
        rest: &[TelemetryRecord],
        batch_index: usize,
        failed_batch_size: usize,
        reason: String,
    ) -> Result<IngestReport, IngestError> {
        let offset = report.state.offset();
        let artifact = ResumeArtifact {
            table: report.table.clone(),
            offset,
            total: report.total,
            batch_index,
            failed_batch_size,
            reason,
            records: rest.to_vec(),
        };

        let path = self
            .artifacts
            .persist(&artifact)
            .await
            .map_err(|source| IngestError::Artifact { offset, source })?;

        tracing::warn!(
            table = %report.table,
            batch = batch_index,
            offset,
            failed = artifact.failed_batch().len(),
            remaining = artifact.records.len(),
            reason = %artifact.reason,
            artifact = %path.display(),
            "ingestion halted"
        );

        report.state = IngestState::Failed {
            offset,
            artifact: path,
        };
        Ok(report)
    }
}

/// Where the first pending record sits in the full input.
#[derive(Debug, Clone, Copy)]
struct Origin {
    offset: usize,
    batch_index: usize,
}
