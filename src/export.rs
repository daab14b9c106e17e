//! Audio artifact export: primary WAV, best-effort MP3.
//!
//! The WAV write either fully succeeds or leaves nothing at the target
//! path: samples go to a temporary sibling file that is renamed into place
//! only after `finalize` — an interrupted run never leaves a half-written
//! file that looks like a finished demo.
//!
//! The MP3 is produced by an external encoder process and is strictly
//! best-effort: a failed transcode is reported as an [`EncodeError`] value
//! for the caller to log, never as a batch-stopping error.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Primary artifact — WAV
// ─────────────────────────────────────────────────────────────────────────────

/// Write `samples` to a 16-bit PCM mono WAV file at `sample_rate` Hz.
///
/// Float samples are clamped to `[-1.0, 1.0]`.  Empty input is rejected —
/// an empty demo file would read as a successful export.
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    if samples.is_empty() {
        bail!(
            "No audio was generated for {} — the model produced 0 samples",
            path.display()
        );
    }

    let tmp_path = temp_sibling(path);
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let write_result = (|| -> Result<()> {
        let mut writer = hound::WavWriter::create(&tmp_path, spec)
            .with_context(|| format!("Cannot create WAV: {}", tmp_path.display()))?;
        for &s in samples {
            // Convert f32 [-1.0, 1.0] → i16 [-32768, 32767].
            let s16 = (s * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            writer.write_sample(s16).context("WAV write error")?;
        }
        writer.finalize().context("WAV finalise error")?;
        Ok(())
    })();

    if let Err(e) = write_result {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e);
    }

    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("Cannot move finished WAV into place: {}", path.display()))?;
    Ok(())
}

/// Temporary path next to the target, so the final rename stays on one
/// filesystem.
fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

// ─────────────────────────────────────────────────────────────────────────────
// Secondary artifact — MP3 via external encoder
// ─────────────────────────────────────────────────────────────────────────────

/// Why a transcode produced no MP3.  Carries the encoder's diagnostics so a
/// batch log can say more than "it failed".
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("could not run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{program}` exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// External MP3 encoder invocation with a fixed quality setting.
///
/// Defaults to `ffmpeg` with LAME VBR quality 2; the program is
/// configurable so tests (or exotic deployments) can substitute their own
/// encoder binary with the same argument convention.
#[derive(Debug, Clone)]
pub struct Mp3Encoder {
    program: String,
}

impl Default for Mp3Encoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl Mp3Encoder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Transcode `wav` to `mp3`.  Success is exit code 0; anything else —
    /// including a missing encoder binary — comes back as an
    /// [`EncodeError`] value with the captured stderr.
    pub fn encode(&self, wav: &Path, mp3: &Path) -> std::result::Result<(), EncodeError> {
        let output = Command::new(&self.program)
            .arg("-y")
            .arg("-i")
            .arg(wav)
            .args(["-codec:a", "libmp3lame", "-qscale:a", "2"])
            .arg(mp3)
            .output()
            .map_err(|source| EncodeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(EncodeError::Failed {
                program: self.program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
