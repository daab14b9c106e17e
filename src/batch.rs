//! Batch demo generation: every cached prompt under a directory becomes a
//! `{voice}.wav` (and, best-effort, `{voice}.mp3`) in the output directory.
//!
//! Voices are processed strictly one at a time, in discovery order.  Each
//! voice runs load → synthesize → export in isolation: a failure at any
//! stage is recorded against that voice and the batch moves on.  Only a
//! broken environment (unreadable voices directory, uncreatable output
//! directory) aborts the whole run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

use crate::export::{write_wav, Mp3Encoder};
use crate::locale;
use crate::model::{GenerationOptions, Synthesizer};
use crate::prompt::{discover_prompts, CachedPrompt};

/// Which stage of one voice's pipeline failed.  The batch never stops for
/// any of these; they end up in the [`BatchReport`].
#[derive(Debug, Error)]
pub enum StageError {
    #[error("cached prompt could not be read: {0:#}")]
    PromptRead(anyhow::Error),
    #[error("generation failed: {0:#}")]
    Synthesis(anyhow::Error),
    #[error("primary artifact could not be written: {0:#}")]
    Export(anyhow::Error),
}

/// One voice that produced no primary artifact, and why.
#[derive(Debug)]
pub struct VoiceFailure {
    pub voice: String,
    pub error: StageError,
}

/// Outcome of a whole batch run.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Voices whose primary WAV was fully written, in processing order.
    pub generated: Vec<String>,
    /// Voices that were skipped, with the stage that failed.
    pub failures: Vec<VoiceFailure>,
}

impl BatchReport {
    /// True when at least one prompt was found and none succeeded — the one
    /// batch outcome that should surface as a process failure.
    pub fn nothing_succeeded(&self) -> bool {
        self.generated.is_empty() && !self.failures.is_empty()
    }
}

/// Batch run parameters.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Root searched recursively for `*.npz` prompt bundles.
    pub voices_dir: PathBuf,
    /// Where `{voice}.wav` / `{voice}.mp3` land.
    pub output_dir: PathBuf,
    pub options: GenerationOptions,
    pub encoder: Mp3Encoder,
}

/// Run the batch: one generation request at a time, one voice after the
/// other.  The model/synthesizer is initialised by the caller, once, and
/// only borrowed here.
pub fn run_batch<S: Synthesizer>(synth: &S, config: &BatchConfig) -> Result<BatchReport> {
    config.options.validate()?;

    let prompts = discover_prompts(&config.voices_dir)?;
    std::fs::create_dir_all(&config.output_dir).with_context(|| {
        format!(
            "Cannot create output directory: {}",
            config.output_dir.display()
        )
    })?;

    tracing::info!(
        voices = prompts.len(),
        voices_dir = %config.voices_dir.display(),
        output_dir = %config.output_dir.display(),
        cfg_scale = config.options.cfg_scale,
        ddpm_steps = config.options.ddpm_steps,
        do_sample = config.options.do_sample,
        "Starting batch"
    );

    let mut report = BatchReport::default();

    for (index, prompt_path) in prompts.iter().enumerate() {
        let voice = voice_name(prompt_path);
        tracing::info!(
            progress = format!("[{}/{}]", index + 1, prompts.len()),
            voice = %voice,
            language = %locale::language_code(&voice),
            "Generating demo"
        );

        match run_voice(synth, config, prompt_path, &voice) {
            Ok(()) => report.generated.push(voice),
            Err(error) => {
                tracing::error!(voice = %voice, %error, "Voice skipped");
                report.failures.push(VoiceFailure { voice, error });
            }
        }
    }

    tracing::info!(
        generated = report.generated.len(),
        failed = report.failures.len(),
        "Batch finished"
    );
    Ok(report)
}

/// Load → synthesize → export for a single voice.
fn run_voice<S: Synthesizer>(
    synth: &S,
    config: &BatchConfig,
    prompt_path: &Path,
    voice: &str,
) -> std::result::Result<(), StageError> {
    let text = locale::demo_text(voice);

    let prompt = CachedPrompt::load(prompt_path).map_err(StageError::PromptRead)?;

    // The prompt is handed over by value: generation owns the copy and may
    // scribble on it.  Nothing here reuses it afterwards, so no clone.
    let result = synth
        .synthesize(text, prompt, &config.options)
        .map_err(StageError::Synthesis)?;

    let waveform = result
        .waveforms
        .first()
        .ok_or_else(|| StageError::Synthesis(anyhow::anyhow!("model returned no waveform")))?;

    let wav_path = config.output_dir.join(format!("{voice}.wav"));
    write_wav(&wav_path, waveform, result.sample_rate).map_err(StageError::Export)?;
    tracing::info!(voice = %voice, path = %wav_path.display(), "Saved WAV");

    // Best-effort MP3 — a failed transcode is logged, never fatal.
    let mp3_path = wav_path.with_extension("mp3");
    match config.encoder.encode(&wav_path, &mp3_path) {
        Ok(()) => tracing::info!(voice = %voice, path = %mp3_path.display(), "Saved MP3"),
        Err(error) => {
            tracing::warn!(voice = %voice, %error, "MP3 transcode failed, keeping WAV only");
        }
    }

    Ok(())
}

/// Voice identifier of a prompt file: the file stem.
fn voice_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown-voice")
        .to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GenerationResult;
    use crate::prompt::tests::write_prompt_file;

    /// Deterministic stand-in model: the waveform is a function of the demo
    /// text and the prompt's speaker embedding, nothing else.
    struct StubSynth;

    impl Synthesizer for StubSynth {
        fn synthesize(
            &self,
            text: &str,
            prompt: CachedPrompt,
            options: &GenerationOptions,
        ) -> Result<GenerationResult> {
            let seed = prompt
                .get("speaker_embedding")
                .and_then(|a| a.as_f32().ok().map(|v| v.iter().sum::<f32>()))
                .unwrap_or(0.0);
            let n = 200 + text.len() + options.ddpm_steps;
            let waveform = (0..n)
                .map(|i| ((i as f32 * 0.01) + seed).sin() * 0.4)
                .collect();
            Ok(GenerationResult {
                waveforms: vec![waveform],
                sample_rate: self.sample_rate(),
            })
        }

        fn sample_rate(&self) -> u32 {
            24_000
        }
    }

    /// Stand-in model that refuses one specific voice.
    struct GrudgeSynth {
        refused: &'static str,
    }

    impl Synthesizer for GrudgeSynth {
        fn synthesize(
            &self,
            text: &str,
            prompt: CachedPrompt,
            options: &GenerationOptions,
        ) -> Result<GenerationResult> {
            if prompt.voice() == self.refused {
                anyhow::bail!("device ran out of memory");
            }
            StubSynth.synthesize(text, prompt, options)
        }

        fn sample_rate(&self) -> u32 {
            24_000
        }
    }

    fn config_for(dir: &Path, encoder: Mp3Encoder) -> BatchConfig {
        BatchConfig {
            voices_dir: dir.join("voices"),
            output_dir: dir.join("out"),
            options: GenerationOptions::default(),
            encoder,
        }
    }

    fn seed_voices(dir: &Path, names: &[&str]) {
        let voices = dir.join("voices");
        std::fs::create_dir_all(&voices).unwrap();
        for name in names {
            write_prompt_file(&voices.join(format!("{name}.npz")));
        }
    }

    #[test]
    fn test_all_voices_generate() {
        let dir = tempfile::tempdir().unwrap();
        seed_voices(dir.path(), &["en-narrator", "fr-marie", "xx-mystery"]);
        let config = config_for(dir.path(), Mp3Encoder::new("true"));

        let report = run_batch(&StubSynth, &config).unwrap();

        assert_eq!(report.generated, vec!["en-narrator", "fr-marie", "xx-mystery"]);
        assert!(report.failures.is_empty());
        assert!(!report.nothing_succeeded());
        for voice in &report.generated {
            assert!(config.output_dir.join(format!("{voice}.wav")).exists());
        }
    }

    #[test]
    fn test_corrupt_prompt_is_isolated_and_attributed() {
        let dir = tempfile::tempdir().unwrap();
        seed_voices(dir.path(), &["en-a", "fr-b"]);
        std::fs::write(dir.path().join("voices/de-corrupt.npz"), b"not a zip").unwrap();
        let config = config_for(dir.path(), Mp3Encoder::new("true"));

        let report = run_batch(&StubSynth, &config).unwrap();

        assert_eq!(report.generated, vec!["en-a", "fr-b"]);
        assert_eq!(report.failures.len(), 1);
        let failure = &report.failures[0];
        assert_eq!(failure.voice, "de-corrupt");
        assert!(matches!(failure.error, StageError::PromptRead(_)));
        assert!(!config.output_dir.join("de-corrupt.wav").exists());
    }

    #[test]
    fn test_generation_failure_skips_only_that_voice() {
        let dir = tempfile::tempdir().unwrap();
        seed_voices(dir.path(), &["en-a", "en-b", "en-c"]);
        let config = config_for(dir.path(), Mp3Encoder::new("true"));
        let synth = GrudgeSynth { refused: "en-b" };

        let report = run_batch(&synth, &config).unwrap();

        assert_eq!(report.generated, vec!["en-a", "en-c"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].voice, "en-b");
        assert!(matches!(report.failures[0].error, StageError::Synthesis(_)));
        assert!(config.output_dir.join("en-c.wav").exists());
    }

    #[test]
    fn test_failing_encoder_never_fails_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        seed_voices(dir.path(), &["en-a"]);
        let config = config_for(dir.path(), Mp3Encoder::new("false"));

        let report = run_batch(&StubSynth, &config).unwrap();

        assert_eq!(report.generated, vec!["en-a"]);
        assert!(report.failures.is_empty());
        assert!(config.output_dir.join("en-a.wav").exists());
        assert!(!config.output_dir.join("en-a.mp3").exists());
    }

    #[test]
    #[cfg(unix)]
    fn test_mp3_written_when_encoder_succeeds() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        seed_voices(dir.path(), &["en-narrator"]);

        // Stand-in encoder honouring the ffmpeg argument convention:
        // $3 is the input WAV, the last argument the output MP3.
        let script = dir.path().join("fake-ffmpeg.sh");
        std::fs::write(&script, "#!/bin/sh\nfor last; do :; done\ncp \"$3\" \"$last\"\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = config_for(dir.path(), Mp3Encoder::new(script.to_str().unwrap()));
        let report = run_batch(&StubSynth, &config).unwrap();

        assert_eq!(report.generated, vec!["en-narrator"]);
        assert!(config.output_dir.join("en-narrator.wav").exists());
        assert!(config.output_dir.join("en-narrator.mp3").exists());
    }

    #[test]
    fn test_reruns_are_bit_identical() {
        let dir = tempfile::tempdir().unwrap();
        seed_voices(dir.path(), &["en-a", "jp-b"]);

        let mut first = config_for(dir.path(), Mp3Encoder::new("true"));
        first.output_dir = dir.path().join("out1");
        let mut second = first.clone();
        second.output_dir = dir.path().join("out2");

        run_batch(&StubSynth, &first).unwrap();
        run_batch(&StubSynth, &second).unwrap();

        for voice in ["en-a", "jp-b"] {
            let a = std::fs::read(first.output_dir.join(format!("{voice}.wav"))).unwrap();
            let b = std::fs::read(second.output_dir.join(format!("{voice}.wav"))).unwrap();
            assert_eq!(a, b, "artifacts for {voice} differ between runs");
        }
    }

    #[test]
    fn test_empty_voices_dir_is_a_clean_noop() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("voices")).unwrap();
        let config = config_for(dir.path(), Mp3Encoder::new("true"));

        let report = run_batch(&StubSynth, &config).unwrap();
        assert!(report.generated.is_empty());
        assert!(report.failures.is_empty());
        assert!(!report.nothing_succeeded());
    }

    #[test]
    fn test_missing_voices_dir_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(dir.path(), Mp3Encoder::new("true"));
        assert!(run_batch(&StubSynth, &config).is_err());
    }
}
