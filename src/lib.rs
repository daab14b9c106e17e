//! # vibevoice-demos
//!
//! Batch demo-audio generator for the
//! [VibeVoice](https://github.com/microsoft/VibeVoice) realtime streaming
//! text-to-speech model, running the ONNX export through
//! [`ort`](https://docs.rs/ort) (ONNX Runtime).
//!
//! Each voice ships as a *cached prompt*: a pre-computed speaker
//! conditioning bundle (`{voice-id}.npz`) that replaces reference-audio
//! encoding at generation time.  The pipeline turns a directory of those
//! bundles into one demo clip per voice:
//!
//! 1. **Locale** — the voice id's language prefix picks the demo sentence
//!    (`fr-marie` speaks French; unknown prefixes fall back to English).
//! 2. **Prompt load** — the NPZ bundle is read into named tensors.
//! 3. **Synthesis** — demo text is normalised, BPE-tokenised, and fed to
//!    the ONNX graph together with the conditioning tensors and the
//!    generation knobs (guidance scale, diffusion steps, sampling switch).
//! 4. **Export** — the waveform lands as `{voice-id}.wav` (written
//!    atomically), then an external `ffmpeg` pass adds `{voice-id}.mp3`
//!    best-effort.
//!
//! A failure in any one voice is logged and skipped; the batch always runs
//! to the end of the prompt list.
//!
//! ## Quick start
//!
//! ```no_run
//! use vibevoice_demos::batch::{run_batch, BatchConfig};
//! use vibevoice_demos::export::Mp3Encoder;
//! use vibevoice_demos::model::{Device, GenerationOptions, VibeVoiceOnnx};
//!
//! # fn main() -> anyhow::Result<()> {
//! let model_dir = vibevoice_demos::download::fetch_model("VibeVoice-Realtime-0.5B")?;
//! let model = VibeVoiceOnnx::load(&model_dir, Device::detect())?;
//!
//! let report = run_batch(
//!     &model,
//!     &BatchConfig {
//!         voices_dir: "voices/streaming_model".into(),
//!         output_dir: "docs/demos".into(),
//!         options: GenerationOptions::default(),
//!         encoder: Mp3Encoder::default(),
//!     },
//! )?;
//! println!("generated {} demos", report.generated.len());
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod download;
pub mod export;
pub mod locale;
pub mod model;
pub mod npz;
pub mod preprocess;
pub mod prompt;
pub mod serve;
pub mod tokenize;

// ─── Re-exports for convenience ─────────────────────────────────────────────

pub use batch::{run_batch, BatchConfig, BatchReport};
pub use model::{Device, GenerationOptions, Synthesizer, VibeVoiceOnnx, SAMPLE_RATE};
pub use prompt::CachedPrompt;
