//! Enrolled-face persistence.
//!
//! The store is a flat JSON file mapping identity name to a 512-dimensional
//! L2-normalized embedding. It is loaded once at startup, mutated only by
//! enrollment, and rewritten in full after every mutation. Older deployments
//! wrapped each vector in an object with an `embedding` field; load accepts
//! both shapes and rewrites the file in the bare shape immediately, so the
//! file self-heals on first start.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::embed::EMBEDDING_DIM;
use crate::matcher::l2_normalize;

/// On-disk record shapes: bare vector (current) or legacy wrapper.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredRecord {
    Bare(Vec<f32>),
    Wrapped { embedding: Vec<f32> },
}

impl StoredRecord {
    fn into_vector(self) -> Vec<f32> {
        match self {
            StoredRecord::Bare(v) => v,
            StoredRecord::Wrapped { embedding } => embedding,
        }
    }
}

pub struct FaceStore {
    path: PathBuf,
    faces: HashMap<String, Vec<f32>>,
}

impl FaceStore {
    /// Load the store from `path`; an absent file yields an empty store.
    ///
    /// Legacy wrapped records are flattened and the file rewritten right
    /// away so later loads see only the bare shape.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Ok(Self {
                path,
                faces: HashMap::new(),
            });
        }

        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read face store {}", path.display()))?;
        let records: HashMap<String, StoredRecord> = serde_json::from_str(&raw)
            .with_context(|| format!("invalid face store {}", path.display()))?;

        let mut had_legacy = false;
        let faces = records
            .into_iter()
            .map(|(name, record)| {
                if matches!(record, StoredRecord::Wrapped { .. }) {
                    had_legacy = true;
                }
                (name, record.into_vector())
            })
            .collect();

        let store = Self { path, faces };
        if had_legacy {
            log::info!("face store contained legacy records, rewriting");
        }
        store.save()?;
        Ok(store)
    }

    /// Rewrite the whole file from memory. Replacement is whole-file: the
    /// contents are written to a sibling temp file and renamed over the
    /// target.
    pub fn save(&self) -> Result<()> {
        let payload = serde_json::to_vec(&self.faces).context("serialize face store")?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, &payload)
            .with_context(|| format!("failed to write face store {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace face store {}", self.path.display()))?;
        Ok(())
    }

    /// Enroll `name` with a fresh embedding and persist.
    ///
    /// Re-enrolling an existing name averages the stored vector with the
    /// new one and re-normalizes, drifting toward a centroid rather than
    /// keeping either sample alone.
    pub fn enroll(&mut self, name: &str, embedding: Vec<f32>) -> Result<()> {
        if embedding.len() != EMBEDDING_DIM {
            return Err(anyhow!(
                "embedding for '{}' has {} dimensions, expected {}",
                name,
                embedding.len(),
                EMBEDDING_DIM
            ));
        }

        let mut merged = match self.faces.get(name) {
            Some(existing) => existing
                .iter()
                .zip(&embedding)
                .map(|(old, new)| (old + new) / 2.0)
                .collect(),
            None => embedding,
        };
        l2_normalize(&mut merged);

        self.faces.insert(name.to_string(), merged);
        self.save()
    }

    pub fn faces(&self) -> &HashMap<String, Vec<f32>> {
        &self.faces
    }

    /// Enrolled names, sorted for stable logging.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.faces.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}
