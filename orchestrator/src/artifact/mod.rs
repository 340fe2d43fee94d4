//! Content-addressed artifact bundles.
//!
//! Bundle hash construction: sort paths ascending, SHA-256 each file's
//! content independently, concatenate the per-file hex digests in sorted
//! order, SHA-256 the concatenation. Deterministic regardless of insertion
//! order, `job_id`, or `attempt_id` — grounded on
//! `shared/modules/artifacts.py`'s `ArtifactBundleBuilder`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub fn hash_content(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// SHA-256 over the sorted, concatenated per-file hex digests.
pub fn bundle_hash(files: &BTreeMap<String, Vec<u8>>) -> String {
    let mut hasher = Sha256::new();
    for (_path, content) in files.iter() {
        hasher.update(hash_content(content).as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileArtifact {
    pub path: String,
    pub size: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactIndex {
    pub job_id: String,
    pub attempt_id: String,
    pub bundle_sha256: String,
    pub files: Vec<FileArtifact>,
    pub created_at: DateTime<Utc>,
    pub module_id: String,
    pub stage: String,
}

/// Builds an `ArtifactIndex` from an in-memory `{path → content}` map.
pub struct ArtifactBundleBuilder;

impl ArtifactBundleBuilder {
    /// Build an index from an arbitrary-order map. Paths are sorted
    /// internally (`BTreeMap`), so the resulting hash never depends on
    /// iteration or insertion order.
    pub fn build_from_dict(
        files: &BTreeMap<String, Vec<u8>>,
        job_id: &str,
        attempt_id: &str,
        module_id: &str,
        stage: &str,
        created_at: DateTime<Utc>,
    ) -> ArtifactIndex {
        let file_artifacts = files
            .iter()
            .map(|(path, content)| FileArtifact {
                path: path.clone(),
                size: content.len() as u64,
                sha256: hash_content(content),
            })
            .collect();

        ArtifactIndex {
            job_id: job_id.to_string(),
            attempt_id: attempt_id.to_string(),
            bundle_sha256: bundle_hash(files),
            files: file_artifacts,
            created_at,
            module_id: module_id.to_string(),
            stage: stage.to_string(),
        }
    }

    /// Self-check: recompute the bundle hash from `index.files` alone and
    /// compare against `index.bundle_sha256`.
    pub fn self_check(index: &ArtifactIndex) -> bool {
        let mut hasher = Sha256::new();
        let mut sorted: Vec<&FileArtifact> = index.files.iter().collect();
        sorted.sort_by(|a, b| a.path.cmp(&b.path));
        for file in sorted {
            hasher.update(file.sha256.as_bytes());
        }
        hex::encode(hasher.finalize()) == index.bundle_sha256
    }
}

/// Recompute the bundle hash from a fresh `{path → content}` map and check
/// it against a previously recorded `ArtifactIndex`.
pub fn verify_bundle_hash(index: &ArtifactIndex, files: &BTreeMap<String, Vec<u8>>) -> bool {
    bundle_hash(files) == index.bundle_sha256
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    Added,
    Deleted,
    Changed,
    Unchanged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathDiff {
    pub path: String,
    pub kind: DiffKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleDiff {
    pub identical: bool,
    pub entries: Vec<PathDiff>,
}

/// Classify every path across two bundle indices as added, deleted, changed,
/// or unchanged.
pub fn diff_bundles(a: &ArtifactIndex, b: &ArtifactIndex) -> BundleDiff {
    let a_files: BTreeMap<&str, &str> = a
        .files
        .iter()
        .map(|f| (f.path.as_str(), f.sha256.as_str()))
        .collect();
    let b_files: BTreeMap<&str, &str> = b
        .files
        .iter()
        .map(|f| (f.path.as_str(), f.sha256.as_str()))
        .collect();

    let mut all_paths: Vec<&str> = a_files.keys().chain(b_files.keys()).copied().collect();
    all_paths.sort_unstable();
    all_paths.dedup();

    let mut entries = Vec::with_capacity(all_paths.len());
    for path in all_paths {
        let kind = match (a_files.get(path), b_files.get(path)) {
            (Some(_), None) => DiffKind::Deleted,
            (None, Some(_)) => DiffKind::Added,
            (Some(ha), Some(hb)) if ha != hb => DiffKind::Changed,
            (Some(_), Some(_)) => DiffKind::Unchanged,
            (None, None) => unreachable!("path present in neither side"),
        };
        entries.push(PathDiff {
            path: path.to_string(),
            kind,
        });
    }

    let identical = entries.iter().all(|e| e.kind == DiffKind::Unchanged);
    BundleDiff { identical, entries }
}
