//! Dataset ingestion and the load-or-build index lifecycle.
//!
//! The dataset is a JSON Lines file of doctor/patient exchanges:
//!
//! ```text
//! {"Patient": "I have a rash on my arm...", "Doctor": "Hi, thanks for the query..."}
//! ```
//!
//! Each valid row becomes one passage: the doctor's reply is the passage
//! text and the patient's message is kept as `patient_query` metadata.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::embedder::Embedder;
use crate::index::{IndexError, IndexedPassage, VectorIndex, passage_id};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Failed to read dataset {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Dataset contained no usable rows ({skipped} skipped)")]
    EmptyCorpus { skipped: usize },

    #[error("No index at {index_path} and no dataset configured to build one")]
    NoDataset { index_path: PathBuf },

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Limits applied while reading and embedding a dataset.
#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    /// Only the first `max_records` lines are considered
    pub max_records: usize,
    /// Texts per embedding call
    pub batch_size: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            max_records: 1000,
            batch_size: 32,
        }
    }
}

/// Outcome of an ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub added: usize,
    pub skipped: usize,
}

/// A dataset row that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetRecord {
    pub patient: String,
    pub doctor: String,
}

/// Validate one JSON Lines row. Both fields must be non-blank strings.
pub fn parse_record(line: &str) -> Option<DatasetRecord> {
    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    let field = |name: &str| {
        value
            .get(name)
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    };

    Some(DatasetRecord {
        patient: field("Patient")?,
        doctor: field("Doctor")?,
    })
}

/// Read up to `max_records` rows, returning the valid ones and the number skipped.
pub fn read_dataset(
    path: &Path,
    max_records: usize,
) -> Result<(Vec<DatasetRecord>, usize), IngestError> {
    let read_err = |e: std::io::Error| IngestError::Read {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let file = std::fs::File::open(path).map_err(read_err)?;
    let mut records = Vec::new();
    let mut skipped = 0;

    for line in BufReader::new(file).lines().take(max_records) {
        let line = line.map_err(read_err)?;
        match parse_record(&line) {
            Some(record) => records.push(record),
            None => skipped += 1,
        }
    }

    Ok((records, skipped))
}

/// Embed `records` in batches and insert them into `index`.
///
/// Rows whose doctor reply duplicates one already indexed count as skipped.
pub async fn ingest_records(
    index: &mut VectorIndex,
    records: Vec<DatasetRecord>,
    embedder: &Embedder,
    batch_size: usize,
) -> Result<IngestReport, IngestError> {
    let mut report = IngestReport::default();

    for batch in records.chunks(batch_size.max(1)) {
        let inputs: Vec<String> = batch.iter().map(|r| r.doctor.clone()).collect();
        let embeddings = embedder
            .embed(inputs)
            .await
            .map_err(|e| IngestError::Embedding(e.to_string()))?;

        for (record, embedding) in batch.iter().zip(embeddings) {
            let mut metadata = serde_json::Map::new();
            metadata.insert(
                "patient_query".into(),
                serde_json::Value::String(record.patient.clone()),
            );

            let inserted = index.insert(IndexedPassage {
                id: passage_id(&record.doctor),
                text: record.doctor.clone(),
                metadata,
                embedding,
            })?;

            if inserted {
                report.added += 1;
            } else {
                report.skipped += 1;
            }
        }

        debug!(indexed = report.added, "Embedded batch");
    }

    Ok(report)
}

/// Build a fresh index from a dataset file.
pub async fn build_index(
    dataset: &Path,
    embedder: &Embedder,
    options: IngestOptions,
) -> Result<(VectorIndex, IngestReport), IngestError> {
    let (records, invalid) = read_dataset(dataset, options.max_records)?;
    if records.is_empty() {
        return Err(IngestError::EmptyCorpus { skipped: invalid });
    }

    info!(
        dataset = %dataset.display(),
        records = records.len(),
        skipped = invalid,
        "Building vector index"
    );

    let mut index = VectorIndex::new(embedder.model());
    let mut report = ingest_records(&mut index, records, embedder, options.batch_size).await?;
    report.skipped += invalid;

    Ok((index, report))
}

/// Load the index at `index_path`, or build and persist it from `dataset`
/// when no index exists yet.
pub async fn open_or_build(
    index_path: &Path,
    dataset: Option<&Path>,
    embedder: &Embedder,
    options: IngestOptions,
) -> Result<VectorIndex, IngestError> {
    if index_path.exists() {
        let index = VectorIndex::load(index_path)?;
        if index.manifest().embedding_model != embedder.model() {
            warn!(
                index_model = %index.manifest().embedding_model,
                configured_model = %embedder.model(),
                "Vector index was built with a different embedding model; \
                 rebuild with `medchat index --force`"
            );
        }
        info!(path = %index_path.display(), passages = index.len(), "Vector index loaded");
        return Ok(index);
    }

    let Some(dataset) = dataset else {
        return Err(IngestError::NoDataset {
            index_path: index_path.to_path_buf(),
        });
    };

    let (index, report) = build_index(dataset, embedder, options).await?;
    index.save(index_path)?;
    info!(
        path = %index_path.display(),
        added = report.added,
        skipped = report.skipped,
        "Vector index built and saved"
    );
    Ok(index)
}
