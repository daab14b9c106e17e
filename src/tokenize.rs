//! Text tokeniser — wraps the HuggingFace `tokenizers` runtime.
//!
//! The model conditions on BPE token ids from the `tokenizer.json` shipped
//! in the model directory, not on characters or phonemes.  This module owns
//! the text half of input building: normalise, encode, and produce the
//! id/mask rows the graph expects (`int64`, batch of one).

use anyhow::{bail, Result};
use std::path::Path;
use tokenizers::Tokenizer;

use crate::preprocess::prepare_text;

/// Tokenised text ready to become model inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedText {
    /// Token ids, one row (`[1, len]` once shaped).
    pub input_ids: Vec<i64>,
    /// Attention mask, all ones for an unpadded single row.
    pub attention_mask: Vec<i64>,
}

impl EncodedText {
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }
}

/// BPE text encoder loaded from a `tokenizer.json`.
pub struct TextEncoder {
    tokenizer: Tokenizer,
}

impl TextEncoder {
    /// Load from a `tokenizer.json` file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(path)
            .map_err(|e| anyhow::anyhow!("Cannot load tokenizer {}: {}", path.display(), e))?;
        Ok(Self { tokenizer })
    }

    /// Load from raw `tokenizer.json` bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let tokenizer = Tokenizer::from_bytes(bytes)
            .map_err(|e| anyhow::anyhow!("Cannot parse tokenizer: {}", e))?;
        Ok(Self { tokenizer })
    }

    /// Normalise and encode one demo sentence.  Empty input (or input that
    /// normalises to nothing) is rejected — the model would emit silence.
    pub fn encode(&self, text: &str) -> Result<EncodedText> {
        let prepared = prepare_text(text);
        if prepared.is_empty() {
            bail!("Text is empty after normalisation");
        }

        let encoding = self
            .tokenizer
            .encode(prepared.as_str(), true)
            .map_err(|e| anyhow::anyhow!("Tokenisation failed: {}", e))?;

        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        if input_ids.is_empty() {
            bail!("Tokeniser produced no tokens for {:?}", prepared);
        }
        let attention_mask = vec![1i64; input_ids.len()];

        Ok(EncodedText {
            input_ids,
            attention_mask,
        })
    }
}

impl std::fmt::Debug for TextEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextEncoder").finish_non_exhaustive()
    }
}

/// Locate the tokenizer file inside a model directory.
pub fn tokenizer_path(model_dir: &Path, file_name: &str) -> Result<std::path::PathBuf> {
    let path = model_dir.join(file_name);
    if !path.exists() {
        bail!(
            "No tokenizer found at {} — the model directory is incomplete",
            path.display()
        );
    }
    Ok(path)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// A tiny word-level tokenizer definition, enough to exercise encoding
    /// without shipping a real BPE vocabulary.
    const TOY_TOKENIZER_JSON: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": {"type": "Lowercase"},
        "pre_tokenizer": {"type": "Whitespace"},
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": {"[UNK]": 0, "this": 1, "is": 2, "a": 3, "demo": 4, ".": 5},
            "unk_token": "[UNK]"
        }
    }"#;

    #[test]
    fn test_encode_counts_and_mask() {
        let encoder = TextEncoder::from_bytes(TOY_TOKENIZER_JSON.as_bytes()).unwrap();
        let encoded = encoder.encode("This is a demo.").unwrap();
        assert_eq!(encoded.input_ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(encoded.attention_mask, vec![1, 1, 1, 1, 1]);
        assert_eq!(encoded.len(), 5);
    }

    #[test]
    fn test_encode_normalises_first() {
        let encoder = TextEncoder::from_bytes(TOY_TOKENIZER_JSON.as_bytes()).unwrap();
        // Unterminated text picks up a final period before encoding.
        let encoded = encoder.encode("  this   is a demo").unwrap();
        assert_eq!(encoded.input_ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_unknown_words_map_to_unk() {
        let encoder = TextEncoder::from_bytes(TOY_TOKENIZER_JSON.as_bytes()).unwrap();
        let encoded = encoder.encode("strange demo.").unwrap();
        assert_eq!(encoded.input_ids, vec![0, 4, 5]);
    }

    #[test]
    fn test_empty_text_rejected() {
        let encoder = TextEncoder::from_bytes(TOY_TOKENIZER_JSON.as_bytes()).unwrap();
        assert!(encoder.encode("   ").is_err());
    }

    #[test]
    fn test_missing_tokenizer_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(tokenizer_path(dir.path(), "tokenizer.json").is_err());
    }
}
