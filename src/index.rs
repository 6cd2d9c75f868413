//! Append-only vector index with a positionally aligned metadata list.
//!
//! Vectors are L2-normalized on insert and at query time, so the inner
//! product used for ranking equals cosine similarity. Search is exact over
//! all stored rows.
//!
//! # On-disk layout
//!
//! Two files, paired by configuration:
//!
//! ```text
//! index.bin   "RAGV" | version u8 | dims u32 LE | count u64 LE | count × dims f32 LE
//! meta.jsonl  one IndexedRecord per line, line i ↔ row i
//! ```
//!
//! [`VectorIndex::persist`] writes both files to temporaries first and only
//! renames them into place once both writes have succeeded.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::IndexError;
use crate::models::{IndexedRecord, ScoredRecord};

pub const INDEX_MAGIC: [u8; 4] = *b"RAGV";
pub const INDEX_VERSION: u8 = 1;
const HEADER_LEN: usize = 4 + 1 + 4 + 8;

#[derive(Debug, Clone)]
pub struct VectorIndex {
    index_path: PathBuf,
    metadata_path: PathBuf,
    dims: Option<usize>,
    /// Row-major, normalized.
    vectors: Vec<f32>,
    records: Vec<IndexedRecord>,
}

/// Encode floats as little-endian bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode little-endian bytes back into floats.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Scale `v` to unit length in place. Zero vectors are left as is.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

fn persistence_error(path: &Path) -> impl FnOnce(std::io::Error) -> IndexError + '_ {
    move |source| IndexError::Persistence {
        path: path.display().to_string(),
        source,
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

impl VectorIndex {
    /// An empty index bound to the given files. Nothing is read or written.
    pub fn new(index_path: impl Into<PathBuf>, metadata_path: impl Into<PathBuf>) -> Self {
        Self {
            index_path: index_path.into(),
            metadata_path: metadata_path.into(),
            dims: None,
            vectors: Vec::new(),
            records: Vec::new(),
        }
    }

    /// Load from disk when both files exist, otherwise start empty.
    pub fn open(
        index_path: impl Into<PathBuf>,
        metadata_path: impl Into<PathBuf>,
    ) -> Result<Self, IndexError> {
        let mut index = Self::new(index_path, metadata_path);
        if index.index_path.exists() && index.metadata_path.exists() {
            index.load()?;
        }
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Width fixed by the first non-empty batch.
    pub fn dims(&self) -> Option<usize> {
        self.dims
    }

    pub fn records(&self) -> &[IndexedRecord] {
        &self.records
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn metadata_path(&self) -> &Path {
        &self.metadata_path
    }

    pub fn contains_hash(&self, hash: &str) -> bool {
        self.records.iter().any(|r| r.hash == hash)
    }

    /// Append a batch. The whole batch is validated before anything is
    /// stored, so a rejected batch leaves the index unchanged.
    pub fn add(
        &mut self,
        vectors: Vec<Vec<f32>>,
        records: Vec<IndexedRecord>,
    ) -> Result<(), IndexError> {
        if vectors.len() != records.len() {
            return Err(IndexError::LengthMismatch {
                vectors: vectors.len(),
                records: records.len(),
            });
        }
        let Some(first) = vectors.first() else {
            return Ok(());
        };
        let width = first.len();
        if width == 0 {
            return Err(IndexError::EmptyVector);
        }
        if let Some(other) = vectors.iter().map(Vec::len).find(|&len| len != width) {
            return Err(IndexError::Ragged {
                first: width,
                other,
            });
        }
        if let Some(expected) = self.dims {
            if expected != width {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    found: width,
                });
            }
        }

        self.dims = Some(width);
        self.vectors.reserve(vectors.len() * width);
        for mut v in vectors {
            l2_normalize(&mut v);
            self.vectors.extend_from_slice(&v);
        }
        self.records.extend(records);
        Ok(())
    }

    /// Top `k` records by cosine similarity to `query`, best first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredRecord>, IndexError> {
        let Some(dims) = self.dims else {
            return Ok(Vec::new());
        };
        if k == 0 || self.records.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != dims {
            return Err(IndexError::DimensionMismatch {
                expected: dims,
                found: query.len(),
            });
        }

        let mut q = query.to_vec();
        l2_normalize(&mut q);

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .chunks_exact(dims)
            .enumerate()
            .map(|(i, row)| (i, row.iter().zip(&q).map(|(a, b)| a * b).sum()))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| ScoredRecord {
                score,
                record: self.records[i].clone(),
            })
            .collect())
    }

    /// Write both files. Each is written to a temporary sibling first; the
    /// renames happen only after both temporaries are complete.
    pub fn persist(&self) -> Result<(), IndexError> {
        for path in [&self.index_path, &self.metadata_path] {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(persistence_error(parent))?;
            }
        }

        let index_tmp = temp_path(&self.index_path);
        let meta_tmp = temp_path(&self.metadata_path);

        let written = self
            .write_blob(&index_tmp)
            .and_then(|_| self.write_metadata(&meta_tmp));
        if let Err(e) = written {
            let _ = std::fs::remove_file(&index_tmp);
            let _ = std::fs::remove_file(&meta_tmp);
            return Err(e);
        }

        std::fs::rename(&index_tmp, &self.index_path)
            .map_err(persistence_error(&self.index_path))?;
        std::fs::rename(&meta_tmp, &self.metadata_path)
            .map_err(persistence_error(&self.metadata_path))?;
        Ok(())
    }

    fn write_blob(&self, path: &Path) -> Result<(), IndexError> {
        let mut data = Vec::with_capacity(HEADER_LEN + self.vectors.len() * 4);
        data.extend_from_slice(&INDEX_MAGIC);
        data.push(INDEX_VERSION);
        data.extend_from_slice(&(self.dims.unwrap_or(0) as u32).to_le_bytes());
        data.extend_from_slice(&(self.records.len() as u64).to_le_bytes());
        data.extend_from_slice(&vec_to_blob(&self.vectors));
        std::fs::write(path, &data).map_err(persistence_error(path))
    }

    fn write_metadata(&self, path: &Path) -> Result<(), IndexError> {
        let file = std::fs::File::create(path).map_err(persistence_error(path))?;
        let mut out = std::io::BufWriter::new(file);
        for record in &self.records {
            let line = serde_json::to_string(record)
                .map_err(|e| IndexError::Corrupt(format!("unserializable record: {}", e)))?;
            writeln!(out, "{}", line).map_err(persistence_error(path))?;
        }
        out.flush().map_err(persistence_error(path))
    }

    fn load(&mut self) -> Result<(), IndexError> {
        let data = std::fs::read(&self.index_path).map_err(persistence_error(&self.index_path))?;
        if data.len() < HEADER_LEN || data[..4] != INDEX_MAGIC {
            return Err(IndexError::Corrupt(format!(
                "{} is not an index file",
                self.index_path.display()
            )));
        }
        if data[4] != INDEX_VERSION {
            return Err(IndexError::Corrupt(format!(
                "unsupported index version {}",
                data[4]
            )));
        }
        let dims = u32::from_le_bytes([data[5], data[6], data[7], data[8]]) as usize;
        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(&data[9..HEADER_LEN]);
        let count = u64::from_le_bytes(count_bytes) as usize;

        let payload = &data[HEADER_LEN..];
        let expected_bytes = count
            .checked_mul(dims)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| IndexError::Corrupt("index header overflows".to_string()))?;
        if payload.len() != expected_bytes {
            return Err(IndexError::Corrupt(format!(
                "expected {} vector bytes, found {}",
                expected_bytes,
                payload.len()
            )));
        }

        let text = std::fs::read_to_string(&self.metadata_path)
            .map_err(persistence_error(&self.metadata_path))?;
        let mut records = Vec::with_capacity(count);
        for (lineno, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: IndexedRecord = serde_json::from_str(line).map_err(|e| {
                IndexError::Corrupt(format!(
                    "{}:{}: {}",
                    self.metadata_path.display(),
                    lineno + 1,
                    e
                ))
            })?;
            records.push(record);
        }

        if records.len() != count {
            return Err(IndexError::LengthMismatch {
                vectors: count,
                records: records.len(),
            });
        }

        let stored_width = records
            .first()
            .and_then(|r| r.vector.as_ref())
            .map(Vec::len);
        if let Some(width) = stored_width {
            if width != dims {
                return Err(IndexError::DimensionMismatch {
                    expected: dims,
                    found: width,
                });
            }
        }

        self.dims = if count > 0 { Some(dims) } else { stored_width };
        self.vectors = blob_to_vec(payload);
        self.records = records;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(hash: &str, vector: &[f32]) -> IndexedRecord {
        IndexedRecord {
            hash: hash.to_string(),
            source: format!("{}.docx", hash),
            content: format!("content of {}", hash),
            truncated_to: None,
            vector: Some(vector.to_vec()),
            extra: Default::default(),
        }
    }

    fn index_in(tmp: &TempDir) -> VectorIndex {
        VectorIndex::new(
            tmp.path().join("store/index.bin"),
            tmp.path().join("store/meta.jsonl"),
        )
    }

    fn add_rows(index: &mut VectorIndex, rows: &[(&str, Vec<f32>)]) {
        let vectors = rows.iter().map(|(_, v)| v.clone()).collect();
        let records = rows.iter().map(|(h, v)| record(h, v)).collect();
        index.add(vectors, records).unwrap();
    }

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn test_search_empty_index_returns_nothing() {
        let tmp = TempDir::new().unwrap();
        let index = index_in(&tmp);
        assert!(index.search(&[1.0, 0.0], 5).unwrap().is_empty());
        assert_eq!(index.dims(), None);
    }

    #[test]
    fn test_search_ranks_by_cosine() {
        let tmp = TempDir::new().unwrap();
        let mut index = index_in(&tmp);
        add_rows(
            &mut index,
            &[
                ("a", vec![10.0, 0.0]),
                ("b", vec![1.0, 1.0]),
                ("c", vec![0.0, 3.0]),
            ],
        );

        let hits = index.search(&[2.0, 0.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].record.hash, "a");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert_eq!(hits[1].record.hash, "b");
        assert!((hits[1].score - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn test_dimension_mismatch_leaves_index_unchanged() {
        let tmp = TempDir::new().unwrap();
        let mut index = index_in(&tmp);
        add_rows(&mut index, &[("a", vec![0.5; 128])]);

        let err = index
            .add(vec![vec![0.5; 256]], vec![record("b", &[0.5; 256])])
            .unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch {
                expected: 128,
                found: 256
            }
        ));
        assert_eq!(index.len(), 1);
        assert_eq!(index.dims(), Some(128));
        assert!(!index.contains_hash("b"));
    }

    #[test]
    fn test_ragged_and_mismatched_batches_rejected() {
        let tmp = TempDir::new().unwrap();
        let mut index = index_in(&tmp);
        let err = index
            .add(
                vec![vec![1.0, 0.0], vec![1.0]],
                vec![record("a", &[1.0, 0.0]), record("b", &[1.0])],
            )
            .unwrap_err();
        assert!(matches!(err, IndexError::Ragged { first: 2, other: 1 }));

        let err = index.add(vec![vec![1.0]], vec![]).unwrap_err();
        assert!(matches!(err, IndexError::LengthMismatch { .. }));
        assert!(index.is_empty());
        assert_eq!(index.dims(), None);
    }

    #[test]
    fn test_persist_and_reopen() {
        let tmp = TempDir::new().unwrap();
        let mut index = index_in(&tmp);
        add_rows(&mut index, &[("a", vec![3.0, 4.0]), ("b", vec![0.0, 1.0])]);
        index.persist().unwrap();

        let meta = std::fs::read_to_string(tmp.path().join("store/meta.jsonl")).unwrap();
        assert_eq!(meta.lines().count(), 2);
        assert!(!tmp.path().join("store/index.bin.tmp").exists());

        let reopened = VectorIndex::open(
            tmp.path().join("store/index.bin"),
            tmp.path().join("store/meta.jsonl"),
        )
        .unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.dims(), Some(2));
        assert_eq!(reopened.records()[0].hash, "a");
        let hits = reopened.search(&[0.6, 0.8], 1).unwrap();
        assert_eq!(hits[0].record.hash, "a");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_load_rejects_diverging_lengths() {
        let tmp = TempDir::new().unwrap();
        let mut index = index_in(&tmp);
        add_rows(&mut index, &[("a", vec![1.0, 0.0]), ("b", vec![0.0, 1.0])]);
        index.persist().unwrap();

        let meta_path = tmp.path().join("store/meta.jsonl");
        let meta = std::fs::read_to_string(&meta_path).unwrap();
        let first_line = meta.lines().next().unwrap().to_string();
        std::fs::write(&meta_path, first_line + "\n").unwrap();

        let err = VectorIndex::open(tmp.path().join("store/index.bin"), &meta_path).unwrap_err();
        assert!(matches!(
            err,
            IndexError::LengthMismatch {
                vectors: 2,
                records: 1
            }
        ));
    }

    #[test]
    fn test_load_rejects_foreign_blob() {
        let tmp = TempDir::new().unwrap();
        let index_path = tmp.path().join("index.bin");
        let meta_path = tmp.path().join("meta.jsonl");
        std::fs::write(&index_path, b"FAISS-ish bytes").unwrap();
        std::fs::write(&meta_path, "").unwrap();
        assert!(matches!(
            VectorIndex::open(&index_path, &meta_path),
            Err(IndexError::Corrupt(_))
        ));
    }

    #[test]
    fn test_open_missing_files_starts_empty() {
        let tmp = TempDir::new().unwrap();
        let index = VectorIndex::open(tmp.path().join("i.bin"), tmp.path().join("m.jsonl")).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_query_width_must_match() {
        let tmp = TempDir::new().unwrap();
        let mut index = index_in(&tmp);
        add_rows(&mut index, &[("a", vec![1.0, 0.0, 0.0])]);
        assert!(matches!(
            index.search(&[1.0, 0.0], 3),
            Err(IndexError::DimensionMismatch { .. })
        ));
    }
}
