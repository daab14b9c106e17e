//! ONNX model runner — the VibeVoice realtime streaming graph.
//!
//! Uses [`ort`] (ONNX Runtime Rust bindings) for inference.  The graph is
//! opaque: this module only assembles its declared inputs and extracts the
//! waveform output.  Fixed inputs are built from the demo text and the
//! generation knobs; every remaining graph input is looked up by name in the
//! voice's cached prompt bundle:
//!
//! | Name             | Shape      | dtype | Source                       |
//! |------------------|------------|-------|------------------------------|
//! | `input_ids`      | `[1, len]` | int64 | tokenised demo text          |
//! | `attention_mask` | `[1, len]` | int64 | tokenised demo text          |
//! | `cfg_scale`      | `[1]`      | f32   | [`GenerationOptions`]        |
//! | `ddpm_steps`     | `[1]`      | int64 | [`GenerationOptions`]        |
//! | `do_sample`      | `[1]`      | int64 | [`GenerationOptions`] (0/1)  |
//! | anything else    | per bundle | —     | [`CachedPrompt`] array       |
//!
//! Output 0 is the waveform, `[batch, samples]` or `[samples]`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use ort::session::Session;
use ort::value::{DynValue, Tensor};
use serde::Deserialize;

use crate::npz::{NpyArray, NpyData};
use crate::prompt::CachedPrompt;
use crate::tokenize::{tokenizer_path, EncodedText, TextEncoder};

const INPUT_IDS: &str = "input_ids";
const ATTENTION_MASK: &str = "attention_mask";
const CFG_SCALE: &str = "cfg_scale";
const DDPM_STEPS: &str = "ddpm_steps";
const DO_SAMPLE: &str = "do_sample";

/// Default audio sample rate of the realtime model.
pub const SAMPLE_RATE: u32 = 24_000;

// ─────────────────────────────────────────────────────────────────────────────
// Device selection
// ─────────────────────────────────────────────────────────────────────────────

/// Compute device the session runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    #[default]
    Cpu,
    Cuda,
}

impl Device {
    /// Auto-detect the best device: CUDA when the provider is compiled in
    /// and usable on this machine, CPU otherwise.
    pub fn detect() -> Self {
        #[cfg(feature = "cuda")]
        {
            use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};
            if CUDAExecutionProvider::default()
                .is_available()
                .unwrap_or(false)
            {
                return Device::Cuda;
            }
        }
        Device::Cpu
    }

    /// Parse a CLI/server device argument; `auto` resolves via [`detect`].
    ///
    /// [`detect`]: Device::detect
    pub fn from_arg(arg: &str) -> Result<Self> {
        match arg {
            "auto" => Ok(Self::detect()),
            "cpu" => Ok(Device::Cpu),
            "cuda" => Ok(Device::Cuda),
            other => bail!("Unknown device: {}. Use auto, cpu, or cuda", other),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
            Device::Cuda => "cuda",
        }
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Generation parameters
// ─────────────────────────────────────────────────────────────────────────────

/// Knobs of one generation request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    /// Classifier-free guidance scale: adherence to the speaker conditioning
    /// vs. diversity.  Must be positive.
    pub cfg_scale: f32,
    /// Number of diffusion refinement steps; quality/latency trade-off.
    pub ddpm_steps: usize,
    /// Stochastic sampling.  Off by default so demo output is reproducible.
    pub do_sample: bool,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            cfg_scale: 1.5,
            ddpm_steps: 15,
            do_sample: false,
        }
    }
}

impl GenerationOptions {
    pub fn validate(&self) -> Result<()> {
        if !(self.cfg_scale.is_finite() && self.cfg_scale > 0.0) {
            bail!("cfg_scale must be a positive number, got {}", self.cfg_scale);
        }
        if self.ddpm_steps == 0 {
            bail!("ddpm_steps must be at least 1");
        }
        Ok(())
    }
}

/// Audio produced by one generation call: one waveform per batch row.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub waveforms: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Model configuration (config.json)
// ─────────────────────────────────────────────────────────────────────────────

fn default_tokenizer_file() -> String {
    "tokenizer.json".to_string()
}

fn default_sample_rate() -> u32 {
    SAMPLE_RATE
}

/// Deserialised `config.json` from a model directory.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Must start with `"ONNX"`.
    #[serde(rename = "type")]
    pub model_type: String,

    /// Filename of the full-precision ONNX graph (e.g. `"model.onnx"`).
    pub model_file: String,

    /// Optional half-precision variant, preferred on CUDA.
    #[serde(default)]
    pub model_file_fp16: Option<String>,

    /// Tokenizer filename inside the model directory.
    #[serde(default = "default_tokenizer_file")]
    pub tokenizer_file: String,

    /// Output sample rate in Hz.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

impl ModelConfig {
    pub fn from_dir(model_dir: &Path) -> Result<Self> {
        let config_path = model_dir.join("config.json");
        let bytes = std::fs::read(&config_path)
            .with_context(|| format!("Cannot read config: {}", config_path.display()))?;
        let config: ModelConfig =
            serde_json::from_slice(&bytes).context("Failed to parse config.json")?;
        if !config.model_type.starts_with("ONNX") {
            bail!(
                "Unsupported model type '{}' — expected an ONNX export",
                config.model_type
            );
        }
        Ok(config)
    }

    /// Graph file to load for a device.  Reduced precision on the
    /// accelerator when the config ships an fp16 variant, full precision on
    /// CPU.
    pub fn model_file_for(&self, model_dir: &Path, device: Device) -> PathBuf {
        if device == Device::Cuda {
            if let Some(ref fp16) = self.model_file_fp16 {
                let path = model_dir.join(fp16);
                if path.exists() {
                    return path;
                }
                tracing::warn!(
                    file = %fp16,
                    "fp16 model listed in config but missing on disk, using full precision"
                );
            }
        }
        model_dir.join(&self.model_file)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Synthesizer boundary
// ─────────────────────────────────────────────────────────────────────────────

/// The one operation the batch pipeline needs from a model: text + consumed
/// prompt copy + knobs → waveforms.  Lets the batch run against a stand-in
/// in tests; [`VibeVoiceOnnx`] is the real implementation.
pub trait Synthesizer {
    fn synthesize(
        &self,
        text: &str,
        prompt: CachedPrompt,
        options: &GenerationOptions,
    ) -> Result<GenerationResult>;

    fn sample_rate(&self) -> u32;
}

// ─────────────────────────────────────────────────────────────────────────────
// VibeVoiceOnnx
// ─────────────────────────────────────────────────────────────────────────────

/// The loaded model: ONNX session + text encoder + config, initialised once
/// and shared read-only across all batch iterations.
pub struct VibeVoiceOnnx {
    session: Mutex<Session>,
    encoder: TextEncoder,
    config: ModelConfig,
    input_names: HashSet<String>,
    device: Device,
}

impl VibeVoiceOnnx {
    /// Load the model from a directory holding `config.json`, the ONNX
    /// graph, and `tokenizer.json`.
    pub fn load(model_dir: &Path, device: Device) -> Result<Self> {
        let config = ModelConfig::from_dir(model_dir)?;
        let model_path = config.model_file_for(model_dir, device);

        let builder = Session::builder()
            .context("Failed to create ORT session builder")?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)
            .context("Failed to set graph optimization level")?;
        let builder = configure_providers(builder, device)?;

        let session = builder
            .commit_from_file(&model_path)
            .with_context(|| format!("Cannot load ONNX model: {}", model_path.display()))?;

        let input_names: HashSet<String> =
            session.inputs().iter().map(|i| i.name().to_string()).collect();
        for required in [INPUT_IDS, ATTENTION_MASK] {
            if !input_names.contains(required) {
                bail!(
                    "Model graph declares no '{}' input — not a streaming TTS export",
                    required
                );
            }
        }

        let encoder = TextEncoder::from_file(&tokenizer_path(model_dir, &config.tokenizer_file)?)?;

        tracing::info!(
            model = %model_path.display(),
            device = %device,
            inputs = input_names.len(),
            "Model loaded"
        );

        Ok(Self {
            session: Mutex::new(session),
            encoder,
            config,
            input_names,
            device,
        })
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Combine demo text with a cached prompt into model-ready inputs.
    ///
    /// The prompt is only borrowed here: this validates that the bundle
    /// covers every conditioning input the graph declares, then tokenises
    /// the text.  Missing arrays surface now, before any session work.
    pub fn build_inputs(&self, text: &str, prompt: &CachedPrompt) -> Result<EncodedText> {
        for name in &self.input_names {
            let fixed = matches!(
                name.as_str(),
                INPUT_IDS | ATTENTION_MASK | CFG_SCALE | DDPM_STEPS | DO_SAMPLE
            );
            if !fixed && prompt.get(name).is_none() {
                bail!(
                    "Cached prompt for voice '{}' is missing conditioning array '{}'",
                    prompt.voice(),
                    name
                );
            }
        }
        self.encoder.encode(text)
    }

    /// Run generation.  Takes the prompt by value: the copy is disposable
    /// and the caller keeps ownership of any original it cloned from.
    pub fn generate(
        &self,
        inputs: EncodedText,
        prompt: CachedPrompt,
        options: &GenerationOptions,
    ) -> Result<GenerationResult> {
        options.validate()?;

        let seq_len = inputs.len();
        let mut feed: Vec<(&str, DynValue)> = Vec::with_capacity(self.input_names.len());

        feed.push((
            INPUT_IDS,
            Tensor::<i64>::from_array((vec![1usize, seq_len], inputs.input_ids))
                .context("Failed to build input_ids tensor")?
                .into_dyn(),
        ));
        feed.push((
            ATTENTION_MASK,
            Tensor::<i64>::from_array((vec![1usize, seq_len], inputs.attention_mask))
                .context("Failed to build attention_mask tensor")?
                .into_dyn(),
        ));

        // Generation knobs — only fed when the export declares them (older
        // graphs bake the step count in).
        if self.input_names.contains(CFG_SCALE) {
            feed.push((
                CFG_SCALE,
                Tensor::<f32>::from_array((vec![1usize], vec![options.cfg_scale]))
                    .context("Failed to build cfg_scale tensor")?
                    .into_dyn(),
            ));
        }
        if self.input_names.contains(DDPM_STEPS) {
            feed.push((
                DDPM_STEPS,
                Tensor::<i64>::from_array((vec![1usize], vec![options.ddpm_steps as i64]))
                    .context("Failed to build ddpm_steps tensor")?
                    .into_dyn(),
            ));
        }
        if self.input_names.contains(DO_SAMPLE) {
            feed.push((
                DO_SAMPLE,
                Tensor::<i64>::from_array((vec![1usize], vec![i64::from(options.do_sample)]))
                    .context("Failed to build do_sample tensor")?
                    .into_dyn(),
            ));
        }

        // Everything else comes from the prompt bundle, matched by name.
        for name in &self.input_names {
            if matches!(
                name.as_str(),
                INPUT_IDS | ATTENTION_MASK | CFG_SCALE | DDPM_STEPS | DO_SAMPLE
            ) {
                continue;
            }
            let array = prompt.get(name).with_context(|| {
                format!(
                    "Cached prompt for voice '{}' is missing conditioning array '{}'",
                    prompt.voice(),
                    name
                )
            })?;
            feed.push((name.as_str(), prompt_tensor(array, name)?));
        }

        let mut session = self.session.lock().expect("ORT session mutex poisoned");
        let outputs = session.run(feed).context("ONNX inference failed")?;

        // Output 0 is the raw waveform (shape [batch, samples] or [samples]).
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("Failed to extract waveform tensor")?;

        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
        let waveforms = split_waveforms(&dims, data)?;

        Ok(GenerationResult {
            waveforms,
            sample_rate: self.config.sample_rate,
        })
    }
}

impl Synthesizer for VibeVoiceOnnx {
    fn synthesize(
        &self,
        text: &str,
        prompt: CachedPrompt,
        options: &GenerationOptions,
    ) -> Result<GenerationResult> {
        let inputs = self.build_inputs(text, &prompt)?;
        self.generate(inputs, prompt, options)
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }
}

/// Turn a prompt array into an ORT tensor, preserving shape and dtype.
fn prompt_tensor(array: &NpyArray, name: &str) -> Result<DynValue> {
    let shape = array.shape.clone();
    let value = match &array.data {
        NpyData::F32(values) => Tensor::<f32>::from_array((shape, values.clone()))
            .with_context(|| format!("Failed to build tensor for prompt array '{}'", name))?
            .into_dyn(),
        NpyData::I64(values) => Tensor::<i64>::from_array((shape, values.clone()))
            .with_context(|| format!("Failed to build tensor for prompt array '{}'", name))?
            .into_dyn(),
    };
    Ok(value)
}

/// Split a flat `[batch, samples]` (or 1-D `[samples]`) buffer into one
/// waveform per batch row.
fn split_waveforms(dims: &[usize], data: &[f32]) -> Result<Vec<Vec<f32>>> {
    match dims {
        [] => bail!("Model produced a scalar where a waveform was expected"),
        [_] => Ok(vec![data.to_vec()]),
        [batch, rest @ ..] => {
            let per_row: usize = rest.iter().product();
            if per_row == 0 || *batch == 0 {
                bail!("Model produced an empty waveform (shape {:?})", dims);
            }
            if data.len() < batch * per_row {
                bail!(
                    "Waveform buffer too short: expected {} samples, got {}",
                    batch * per_row,
                    data.len()
                );
            }
            Ok(data
                .chunks_exact(per_row)
                .take(*batch)
                .map(|row| row.to_vec())
                .collect())
        }
    }
}

/// Configure execution providers for the requested device.  CUDA gets a CPU
/// fallback so a GPU-less box still runs a `--features cuda` build.
fn configure_providers(
    builder: ort::session::builder::SessionBuilder,
    device: Device,
) -> Result<ort::session::builder::SessionBuilder> {
    match device {
        Device::Cpu => Ok(builder),
        Device::Cuda => {
            #[cfg(feature = "cuda")]
            {
                use ort::execution_providers::{
                    CPUExecutionProvider, CUDAExecutionProvider, ExecutionProvider,
                };

                let cuda = CUDAExecutionProvider::default();
                if !cuda.is_available().unwrap_or(false) {
                    tracing::warn!("CUDA execution provider unavailable, falling back to CPU");
                    return Ok(builder);
                }
                let cpu_fallback = builder.clone();
                match builder.with_execution_providers([
                    cuda.build(),
                    CPUExecutionProvider::default().build(),
                ]) {
                    Ok(b) => Ok(b),
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            "Enabling CUDA execution provider failed, falling back to CPU"
                        );
                        Ok(cpu_fallback)
                    }
                }
            }
            #[cfg(not(feature = "cuda"))]
            {
                bail!("CUDA requested but this build has no `cuda` feature")
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
