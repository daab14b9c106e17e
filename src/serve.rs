//! Demo-server launcher.
//!
//! The interactive demo server is its own program; this module only
//! validates the environment, fills in the configuration contract
//! (`MODEL_PATH` / `MODEL_DEVICE` environment variables plus CLI flags) and
//! hands off to it, propagating the exit status.  Launch validation errors
//! are process errors — unlike per-voice batch failures they must exit
//! nonzero.

use std::path::PathBuf;
use std::process::{Command, ExitStatus};

use anyhow::{bail, Context, Result};

use crate::model::Device;

/// Environment variable carrying the model directory into the server.
pub const MODEL_PATH_ENV: &str = "MODEL_PATH";
/// Environment variable carrying the device name into the server.
pub const MODEL_DEVICE_ENV: &str = "MODEL_DEVICE";

/// Everything the demo server needs to start.
#[derive(Debug, Clone)]
pub struct ServerLaunch {
    /// Server program to execute.
    pub program: String,
    pub port: u16,
    pub model_dir: PathBuf,
    pub device: Device,
    pub inference_steps: usize,
    /// Enable the server's auto-reload (development) mode.
    pub reload: bool,
}

impl ServerLaunch {
    /// Check the model directory before spending time on anything else.
    pub fn validate(&self) -> Result<()> {
        if !self.model_dir.is_dir() {
            bail!(
                "Model path does not exist: {} — download it first with the `fetch` command",
                self.model_dir.display()
            );
        }
        let config = self.model_dir.join("config.json");
        if !config.exists() {
            bail!(
                "Model directory has no config.json: {}",
                self.model_dir.display()
            );
        }
        Ok(())
    }

    /// Build the server invocation: flags plus the environment contract.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--port")
            .arg(self.port.to_string())
            .arg("--model-path")
            .arg(&self.model_dir)
            .arg("--device")
            .arg(self.device.as_str())
            .arg("--inference-steps")
            .arg(self.inference_steps.to_string());
        if self.reload {
            cmd.arg("--reload");
        }
        cmd.env(MODEL_PATH_ENV, &self.model_dir)
            .env(MODEL_DEVICE_ENV, self.device.as_str());
        cmd
    }

    /// Validate, start the server, and wait for it to exit.
    pub fn run(&self) -> Result<ExitStatus> {
        self.validate()?;

        println!("Starting demo server…");
        println!("   Model:  {}", self.model_dir.display());
        println!("   Device: {}", self.device);
        println!("   Port:   {}", self.port);
        println!();
        println!("Open your browser at http://127.0.0.1:{}", self.port);

        let status = self
            .command()
            .status()
            .with_context(|| format!("Failed to run demo server `{}`", self.program))?;
        Ok(status)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
