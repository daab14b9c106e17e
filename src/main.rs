//! Command-line interface for the VibeVoice demo pipeline.
//!
//! ```bash
//! # Generate one demo clip per cached prompt under voices/
//! vibevoice-demos generate --voices-dir voices/streaming_model --output-dir docs/demos
//!
//! # Trade quality for speed, or make output non-deterministic
//! vibevoice-demos generate --ddpm-steps 30 --cfg-scale 2.0 --sample
//!
//! # Download the model into the HuggingFace cache
//! vibevoice-demos fetch
//!
//! # Launch the interactive demo server (external program)
//! vibevoice-demos serve --model-path models/VibeVoice-Realtime-0.5B --port 8000
//! ```

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use vibevoice_demos::batch::{run_batch, BatchConfig};
use vibevoice_demos::download::{fetch_model, DEFAULT_REPO};
use vibevoice_demos::export::Mp3Encoder;
use vibevoice_demos::model::{Device, GenerationOptions, VibeVoiceOnnx};
use vibevoice_demos::serve::ServerLaunch;

#[derive(Parser)]
#[command(name = "vibevoice-demos")]
#[command(about = "Batch demo generator for the VibeVoice realtime streaming TTS model")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate demo audio for every cached voice prompt.
    Generate {
        /// Local model directory; downloaded from HuggingFace when absent.
        #[arg(long)]
        model_path: Option<PathBuf>,

        /// HuggingFace repository used when --model-path is not given.
        #[arg(long, default_value = DEFAULT_REPO)]
        model: String,

        /// Directory searched recursively for {voice-id}.npz prompts.
        #[arg(long, default_value = "voices/streaming_model")]
        voices_dir: PathBuf,

        /// Where {voice-id}.wav / .mp3 are written.
        #[arg(long, default_value = "docs/demos")]
        output_dir: PathBuf,

        /// Compute device: auto, cpu, or cuda.
        #[arg(long, default_value = "auto")]
        device: String,

        /// Number of diffusion inference steps (more = better, slower).
        #[arg(long, default_value_t = 15)]
        ddpm_steps: usize,

        /// Classifier-free guidance scale.
        #[arg(long, default_value_t = 1.5)]
        cfg_scale: f32,

        /// Enable stochastic sampling (demos are deterministic by default).
        #[arg(long)]
        sample: bool,

        /// MP3 encoder program (must accept ffmpeg-style arguments).
        #[arg(long, default_value = "ffmpeg")]
        encoder: String,
    },

    /// Download the model files into the HuggingFace cache.
    Fetch {
        /// HuggingFace repository ID or bare model name.
        #[arg(default_value = DEFAULT_REPO)]
        model: String,
    },

    /// Launch the interactive demo server (an external program).
    Serve {
        /// Port to run the server on.
        #[arg(long, default_value_t = 8000)]
        port: u16,

        /// Path to the model directory.
        #[arg(long, default_value = "models/VibeVoice-Realtime-0.5B")]
        model_path: PathBuf,

        /// Compute device: auto, cpu, or cuda.
        #[arg(long, default_value = "auto")]
        device: String,

        /// Number of diffusion inference steps the server should use.
        #[arg(long, default_value_t = 15)]
        inference_steps: usize,

        /// Enable auto-reload (for development).
        #[arg(long)]
        reload: bool,

        /// Server program to execute.
        #[arg(long, default_value = "vibevoice-server")]
        server_bin: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Commands::Generate {
            model_path,
            model,
            voices_dir,
            output_dir,
            device,
            ddpm_steps,
            cfg_scale,
            sample,
            encoder,
        } => {
            let device = Device::from_arg(&device)?;
            let model_dir = match model_path {
                Some(dir) => {
                    if !dir.is_dir() {
                        bail!("Model path does not exist: {}", dir.display());
                    }
                    dir
                }
                None => fetch_model(&model)?,
            };

            println!("Loading model from {}", model_dir.display());
            let tts = VibeVoiceOnnx::load(&model_dir, device)?;

            let config = BatchConfig {
                voices_dir,
                output_dir,
                options: GenerationOptions {
                    cfg_scale,
                    ddpm_steps,
                    do_sample: sample,
                },
                encoder: Mp3Encoder::new(encoder),
            };

            let report = run_batch(&tts, &config)?;

            println!(
                "Done: {} generated, {} failed",
                report.generated.len(),
                report.failures.len()
            );
            for failure in &report.failures {
                eprintln!("  {}: {}", failure.voice, failure.error);
            }
            // Individual voice failures are tolerated; only a batch where
            // nothing came out at all is a process failure.
            if report.nothing_succeeded() {
                bail!("No demo could be generated");
            }
            Ok(())
        }

        Commands::Fetch { model } => {
            let dir = fetch_model(&model)?;
            println!("Model ready at {}", dir.display());
            Ok(())
        }

        Commands::Serve {
            port,
            model_path,
            device,
            inference_steps,
            reload,
            server_bin,
        } => {
            let launch = ServerLaunch {
                program: server_bin,
                port,
                model_dir: model_path,
                device: Device::from_arg(&device)?,
                inference_steps,
                reload,
            };
            let status = launch.run()?;
            if !status.success() {
                std::process::exit(status.code().unwrap_or(1));
            }
            Ok(())
        }
    }
}
