//! External-process enhancer.
//!
//! Runs an inference script as `{program} {args..} <input> <output>`. The
//! resolved device is exported as `RELUME_DEVICE`. The child is killed if
//! the returned future is dropped, which is how the worker's wall-clock
//! budget cancels a wedged model.
//!
//! The output argument always names a temporary file in the output
//! directory; the worker renames it into place once the program exits.
//! With [`ArgStyle::Names`] only the file names are passed, for scripts
//! that resolve them against their own input and output directories.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use relume_core::device::Device;
use relume_core::error::CoreError;
use tokio::process::Command;

use super::{EnhanceJob, Enhancer, EnhancerKind, InferenceError};

/// Longest stderr tail kept in an [`InferenceError::ExitStatus`].
const MAX_STDERR_CHARS: usize = 4096;

/// How the job's input and output are passed to the program.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ArgStyle {
    /// Full paths.
    #[default]
    Paths,
    /// File names only.
    Names,
}

impl ArgStyle {
    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "paths" => Ok(Self::Paths),
            "names" => Ok(Self::Names),
            other => Err(CoreError::Validation(format!(
                "Unknown enhancer argument style '{other}'. Must be 'paths' or 'names'"
            ))),
        }
    }

    fn render(self, path: &Path) -> OsString {
        match (self, path.file_name()) {
            (Self::Names, Some(name)) => name.to_owned(),
            _ => path.as_os_str().to_owned(),
        }
    }
}

/// Enhancer backed by an external program.
#[derive(Debug, Clone)]
pub struct CommandEnhancer {
    kind: EnhancerKind,
    program: String,
    args: Vec<String>,
    device: Device,
    arg_style: ArgStyle,
}

impl CommandEnhancer {
    pub fn new(kind: EnhancerKind, program: impl Into<String>, args: Vec<String>, device: Device) -> Self {
        Self {
            kind,
            program: program.into(),
            args,
            device,
            arg_style: ArgStyle::default(),
        }
    }

    pub fn with_arg_style(mut self, arg_style: ArgStyle) -> Self {
        self.arg_style = arg_style;
        self
    }

    /// Build from a whitespace-separated command line such as
    /// `python /app/process_realesrgan_only.py`.
    pub fn from_command_line(kind: EnhancerKind, line: &str, device: Device) -> Result<Self, CoreError> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| CoreError::Validation(format!("Empty command for {kind} enhancer")))?;
        Ok(Self::new(kind, program, parts.collect(), device))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn arg_style(&self) -> ArgStyle {
        self.arg_style
    }
}

#[async_trait]
impl Enhancer for CommandEnhancer {
    fn kind(&self) -> EnhancerKind {
        self.kind
    }

    async fn enhance(&self, job: &EnhanceJob) -> Result<(), InferenceError> {
        let start = Instant::now();

        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(self.arg_style.render(&job.input))
            .arg(self.arg_style.render(&job.output))
            .env("RELUME_DEVICE", self.device.name())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| InferenceError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let output = child.wait_with_output().await?;
        let duration_ms = start.elapsed().as_millis() as u64;

        if !output.stdout.is_empty() {
            tracing::debug!(
                kind = %self.kind,
                stdout = %String::from_utf8_lossy(&output.stdout).trim_end(),
                "Enhancer output",
            );
        }

        if output.status.success() {
            tracing::info!(kind = %self.kind, duration_ms, "Enhancer finished");
            Ok(())
        } else {
            Err(InferenceError::ExitStatus {
                code: output.status.code(),
                stderr: stderr_tail(&output.stderr),
            })
        }
    }
}

/// Last [`MAX_STDERR_CHARS`] characters of a stderr capture.
fn stderr_tail(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim_end();
    let count = text.chars().count();
    if count <= MAX_STDERR_CHARS {
        text.to_string()
    } else {
        text.chars().skip(count - MAX_STDERR_CHARS).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
