// ============================================================
// Layer 4 — Annotation Manifest Dataset
// ============================================================
// Implements AnnotationSource over a JSON manifest:
//
//   [
//     { "key": "r1", "image": "images/cat.jpg",
//       "bbox": [x0, x1, y0, y1],
//       "texts": ["the cat on the sofa", "grey cat"] },
//     ...
//   ]
//
// Image paths are resolved relative to the manifest file. Image
// bytes are read lazily, one annotation at a time.

use anyhow::{Context, Result};
use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use crate::domain::annotation::{Annotation, BoundingBox};
use crate::domain::error::{CaptionError, CaptionResult};
use crate::domain::traits::AnnotationSource;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub key: String,
    pub image: PathBuf,
    pub bbox: [f32; 4],
    pub texts: Vec<String>,
}

pub struct ManifestDataset {
    root: PathBuf,
    entries: Vec<ManifestEntry>,
    index: HashMap<String, usize>,
}

impl ManifestDataset {
    pub fn open(manifest: impl AsRef<Path>) -> Result<Self> {
        let manifest = manifest.as_ref();
        let json = fs::read_to_string(manifest)
            .with_context(|| format!("Cannot read manifest '{}'", manifest.display()))?;
        let entries: Vec<ManifestEntry> = serde_json::from_str(&json)
            .with_context(|| format!("Malformed manifest '{}'", manifest.display()))?;
        let root = manifest
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        tracing::info!(
            "Loaded {} annotations from '{}'",
            entries.len(),
            manifest.display()
        );
        Ok(Self::from_entries(root, entries))
    }

    pub fn from_entries(root: PathBuf, entries: Vec<ManifestEntry>) -> Self {
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.key.clone(), i))
            .collect();
        Self {
            root,
            entries,
            index,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every reference text, for building the vocabulary.
    pub fn all_texts(&self) -> Vec<String> {
        self.entries
            .iter()
            .flat_map(|e| e.texts.iter().cloned())
            .collect()
    }

    fn load(&self, entry: &ManifestEntry) -> CaptionResult<Annotation> {
        let path = self.root.join(&entry.image);
        let bytes = fs::read(&path)?;
        Ok(Annotation::new(
            entry.key.clone(),
            bytes,
            BoundingBox::from(entry.bbox),
            entry.texts.clone(),
        ))
    }
}

impl AnnotationSource for ManifestDataset {
    fn all_keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key.clone()).collect()
    }

    fn annotation(&self, key: &str) -> CaptionResult<Annotation> {
        let idx = self
            .index
            .get(key)
            .ok_or_else(|| CaptionError::UnknownKey(key.to_string()))?;
        self.load(&self.entries[*idx])
    }

    fn random_annotation<R: Rng + ?Sized>(&self, rng: &mut R) -> CaptionResult<Annotation> {
        let entry = self
            .entries
            .choose(rng)
            .ok_or_else(|| CaptionError::UnknownKey("<empty manifest>".to_string()))?;
        self.load(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::example::test_support::solid_png;
    use rand::{rngs::StdRng, SeedableRng};

    fn write_manifest(dir: &Path) -> PathBuf {
        fs::create_dir_all(dir.join("img")).unwrap();
        fs::write(dir.join("img/one.png"), solid_png(20, 10)).unwrap();
        let manifest = dir.join("refs.json");
        let json = serde_json::json!([
            { "key": "r1", "image": "img/one.png", "bbox": [1.0, 9.0, 2.0, 8.0],
              "texts": ["a small box", "brown patch"] },
            { "key": "r2", "image": "img/one.png", "bbox": [0.0, 20.0, 0.0, 10.0],
              "texts": ["everything"] }
        ]);
        fs::write(&manifest, serde_json::to_string(&json).unwrap()).unwrap();
        manifest
    }

    #[test]
    fn test_keys_in_manifest_order() {
        let dir = tempfile::tempdir().unwrap();
        let ds = ManifestDataset::open(write_manifest(dir.path())).unwrap();
        assert_eq!(ds.all_keys(), vec!["r1", "r2"]);
        assert_eq!(ds.all_texts().len(), 3);
    }

    #[test]
    fn test_annotation_reads_image_relative_to_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let ds = ManifestDataset::open(write_manifest(dir.path())).unwrap();
        let ann = ds.annotation("r1").unwrap();
        assert_eq!(ann.bbox, BoundingBox::new(1.0, 9.0, 2.0, 8.0));
        assert!(!ann.image_bytes.is_empty());
    }

    #[test]
    fn test_unknown_key() {
        let dir = tempfile::tempdir().unwrap();
        let ds = ManifestDataset::open(write_manifest(dir.path())).unwrap();
        assert!(matches!(ds.annotation("nope"), Err(CaptionError::UnknownKey(_))));
    }

    #[test]
    fn test_random_annotation_comes_from_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let ds = ManifestDataset::open(write_manifest(dir.path())).unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..10 {
            let ann = ds.random_annotation(&mut rng).unwrap();
            assert!(ann.key == "r1" || ann.key == "r2");
        }
    }

    #[test]
    fn test_missing_manifest_is_an_error() {
        assert!(ManifestDataset::open("/definitely/not/here.json").is_err());
    }
}
