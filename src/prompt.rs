//! Cached prompt store — one pre-computed conditioning bundle per voice.
//!
//! A cached prompt is everything the model needs to speak as one voice
//! without re-encoding reference audio: speaker conditioning tensors plus
//! the bookkeeping the prompt exporter recorded (prefilled lengths, token
//! counts).  Bundles are NPZ files named `{voice-id}.npz`; the pipeline
//! never interprets the arrays — it hands them to the model by name.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::npz::{load_npz, NpyArray};

/// File extension of persisted prompt bundles.
pub const PROMPT_EXTENSION: &str = "npz";

/// Pre-computed speaker conditioning state for one voice.
///
/// Generation consumes a prompt by value — the model is free to treat the
/// buffers as scratch space.  A caller that wants to keep the original
/// around clones first: [`Clone`] duplicates every tensor buffer, so the
/// copy handed to the model is fully independent.
#[derive(Debug, Clone)]
pub struct CachedPrompt {
    voice: String,
    arrays: HashMap<String, NpyArray>,
}

impl CachedPrompt {
    /// Read a prompt bundle from disk.  The voice identifier is the file
    /// stem.  Fails when the file is missing, unreadable, or not a valid
    /// bundle; the error carries the path so a batch run can attribute it.
    pub fn load(path: &Path) -> Result<Self> {
        let voice = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string)
            .with_context(|| format!("Prompt path has no usable file stem: {}", path.display()))?;

        let arrays = load_npz(path)
            .with_context(|| format!("Cannot load cached prompt: {}", path.display()))?;

        if arrays.is_empty() {
            bail!("Cached prompt {} contains no arrays", path.display());
        }

        Ok(Self { voice, arrays })
    }

    /// Voice identifier this prompt belongs to.
    pub fn voice(&self) -> &str {
        &self.voice
    }

    /// Look up one array by name.
    pub fn get(&self, name: &str) -> Option<&NpyArray> {
        self.arrays.get(name)
    }

    /// Names of all arrays in the bundle.
    pub fn array_names(&self) -> impl Iterator<Item = &str> {
        self.arrays.keys().map(String::as_str)
    }

    #[cfg(test)]
    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut NpyArray> {
        self.arrays.get_mut(name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Discovery
// ─────────────────────────────────────────────────────────────────────────────

/// Recursively collect every `*.npz` prompt bundle under `root`, sorted by
/// path so batch order is deterministic across runs.
pub fn discover_prompts(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        bail!("Voices directory does not exist: {}", root.display());
    }
    let mut found = Vec::new();
    collect_prompts(root, &mut found)
        .with_context(|| format!("Cannot scan voices directory: {}", root.display()))?;
    found.sort();
    Ok(found)
}

fn collect_prompts(dir: &Path, found: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_prompts(&path, found)?;
        } else if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(PROMPT_EXTENSION))
        {
            found.push(path);
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::npz::tests::{make_npy_f32, make_npy_i64};
    use crate::npz::NpyData;
    use std::io::Write;

    /// Write a two-array NPZ prompt bundle (stored, no compression needed).
    pub(crate) fn write_prompt_file(path: &Path) {
        let file = std::fs::File::create(path).unwrap();
        let mut archive = zip::ZipWriter::new(file);
        let opts = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        archive.start_file("speaker_embedding.npy", opts).unwrap();
        archive
            .write_all(&make_npy_f32(&[1, 4], &[0.1, 0.2, 0.3, 0.4]))
            .unwrap();

        archive.start_file("prefilled_length.npy", opts).unwrap();
        archive.write_all(&make_npy_i64(&[1], &[96])).unwrap();

        archive.finish().unwrap();
    }

    #[test]
    fn test_load_prompt_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("en-narrator.npz");
        write_prompt_file(&path);

        let prompt = CachedPrompt::load(&path).unwrap();
        assert_eq!(prompt.voice(), "en-narrator");
        assert_eq!(prompt.get("speaker_embedding").unwrap().shape, vec![1, 4]);
        assert_eq!(
            prompt.get("prefilled_length").unwrap().as_i64().unwrap(),
            &[96]
        );
        assert!(prompt.get("missing").is_none());
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CachedPrompt::load(&dir.path().join("nope.npz")).is_err());
    }

    #[test]
    fn test_load_corrupt_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.npz");
        std::fs::write(&path, b"this is not a zip archive").unwrap();
        assert!(CachedPrompt::load(&path).is_err());
    }

    #[test]
    fn test_clone_is_independent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("en-a.npz");
        write_prompt_file(&path);

        let original = CachedPrompt::load(&path).unwrap();
        let mut copy = original.clone();

        // Scribble over the copy's tensors the way generation scratch use would.
        if let NpyData::F32(values) = &mut copy.get_mut("speaker_embedding").unwrap().data {
            for v in values.iter_mut() {
                *v = -1.0;
            }
        }

        assert_eq!(
            original.get("speaker_embedding").unwrap().as_f32().unwrap(),
            &[0.1, 0.2, 0.3, 0.4]
        );
        assert_eq!(
            copy.get("speaker_embedding").unwrap().as_f32().unwrap(),
            &[-1.0, -1.0, -1.0, -1.0]
        );
    }

    #[test]
    fn test_discover_prompts_recursive_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("streaming")).unwrap();
        write_prompt_file(&dir.path().join("streaming/fr-b.npz"));
        write_prompt_file(&dir.path().join("en-a.npz"));
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let found = discover_prompts(dir.path()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["en-a.npz", "fr-b.npz"]);
    }

    #[test]
    fn test_discover_missing_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_prompts(&dir.path().join("absent")).is_err());
    }
}
