//! HuggingFace Hub model fetcher.
//!
//! Downloads `config.json`, the ONNX graph(s), and `tokenizer.json` from a
//! HuggingFace repository into the hub cache and returns the local snapshot
//! directory, ready for [`VibeVoiceOnnx::load`](crate::model::VibeVoiceOnnx::load).

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use hf_hub::api::sync::Api;

use crate::model::ModelConfig;

/// Repository owner assumed for bare model names.
pub const DEFAULT_OWNER: &str = "microsoft";

/// Default demo model repository.
pub const DEFAULT_REPO: &str = "microsoft/VibeVoice-Realtime-0.5B";

/// Expand a bare model name to `owner/name`.
fn expand_repo_id(repo_id: &str) -> String {
    if repo_id.contains('/') {
        repo_id.to_string()
    } else {
        format!("{}/{}", DEFAULT_OWNER, repo_id)
    }
}

/// Download a single file from a HuggingFace repository.
fn hf_download(api: &Api, repo_id: &str, filename: &str) -> Result<PathBuf> {
    let repo = api.model(repo_id.to_string());
    repo.get(filename)
        .with_context(|| format!("Failed to download '{}' from '{}'", filename, repo_id))
}

/// Fetch the model from HuggingFace and return the local model directory.
///
/// Files are cached in the HuggingFace Hub cache directory
/// (`~/.cache/huggingface/hub` by default), so repeated runs are free.
/// Bare names are expanded (`VibeVoice-Realtime-0.5B` →
/// `microsoft/VibeVoice-Realtime-0.5B`).
pub fn fetch_model(repo_id: &str) -> Result<PathBuf> {
    let repo_id = expand_repo_id(repo_id);

    println!("Downloading config from {}…", repo_id);
    let api = Api::new().context("Failed to initialise HuggingFace Hub client")?;

    // ── config.json ──────────────────────────────────────────────────────────
    let config_path = hf_download(&api, &repo_id, "config.json")?;
    let config_bytes = std::fs::read(&config_path)
        .with_context(|| format!("Cannot read config: {}", config_path.display()))?;
    let config: ModelConfig =
        serde_json::from_slice(&config_bytes).context("Failed to parse config.json")?;
    if !config.model_type.starts_with("ONNX") {
        bail!(
            "Unsupported model type '{}' — expected an ONNX export",
            config.model_type
        );
    }

    // ── ONNX graph(s) ────────────────────────────────────────────────────────
    println!("Downloading model file ({})…", config.model_file);
    let model_path = hf_download(&api, &repo_id, &config.model_file)?;
    if let Some(ref fp16) = config.model_file_fp16 {
        // Best-effort: some exports only publish full precision.
        match hf_download(&api, &repo_id, fp16) {
            Ok(_) => println!("Downloaded fp16 variant ({})…", fp16),
            Err(e) => tracing::warn!(file = %fp16, error = %e, "No fp16 variant available"),
        }
    }

    // ── Tokenizer ────────────────────────────────────────────────────────────
    println!("Downloading tokenizer ({})…", config.tokenizer_file);
    hf_download(&api, &repo_id, &config.tokenizer_file)?;

    model_path
        .parent()
        .map(PathBuf::from)
        .context("Downloaded model file has no parent directory")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
