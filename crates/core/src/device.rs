//! Inference device selection.
//!
//! Resolved once when a worker starts and handed to each enhancer through
//! its constructor.

use std::fmt;
use std::path::Path;

use crate::error::CoreError;

/// Compute device the models should run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cuda,
    Mps,
    Cpu,
}

/// Requested device, before probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevicePreference {
    Auto,
    Fixed(Device),
}

/// Facts about the host that `Auto` selection depends on.
#[derive(Debug, Clone, Default)]
pub struct HostFacts {
    /// Value of `CUDA_VISIBLE_DEVICES`, if set.
    pub cuda_visible_devices: Option<String>,
    /// Whether an NVIDIA device node is present.
    pub nvidia_device_node: bool,
    /// Whether this is an Apple Silicon host.
    pub apple_silicon: bool,
}

impl HostFacts {
    /// Inspect the running host.
    pub fn detect() -> Self {
        Self {
            cuda_visible_devices: std::env::var("CUDA_VISIBLE_DEVICES").ok(),
            nvidia_device_node: Path::new("/dev/nvidia0").exists(),
            apple_silicon: cfg!(all(target_os = "macos", target_arch = "aarch64")),
        }
    }
}

impl Device {
    /// Value exported to enhancer subprocesses as `RELUME_DEVICE`.
    pub fn name(self) -> &'static str {
        match self {
            Self::Cuda => "cuda",
            Self::Mps => "mps",
            Self::Cpu => "cpu",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl DevicePreference {
    /// Parse `auto`, `cuda`, `mps` or `cpu` (case-insensitive).
    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(Self::Auto),
            "cuda" | "gpu" => Ok(Self::Fixed(Device::Cuda)),
            "mps" => Ok(Self::Fixed(Device::Mps)),
            "cpu" => Ok(Self::Fixed(Device::Cpu)),
            other => Err(CoreError::Validation(format!(
                "Unknown device '{other}'. Must be one of: auto, cuda, mps, cpu"
            ))),
        }
    }

    /// Pick a concrete device. CUDA wins over MPS, which wins over CPU.
    pub fn resolve(self, host: &HostFacts) -> Device {
        match self {
            Self::Fixed(device) => device,
            Self::Auto => {
                let cuda_env = host
                    .cuda_visible_devices
                    .as_deref()
                    .map(str::trim)
                    .is_some_and(|v| !v.is_empty() && v != "-1");
                if cuda_env || host.nvidia_device_node {
                    Device::Cuda
                } else if host.apple_silicon {
                    Device::Mps
                } else {
                    Device::Cpu
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_preferences() {
        assert_eq!(DevicePreference::from_name("AUTO").unwrap(), DevicePreference::Auto);
        assert_eq!(DevicePreference::from_name("").unwrap(), DevicePreference::Auto);
        assert_eq!(
            DevicePreference::from_name("cpu").unwrap(),
            DevicePreference::Fixed(Device::Cpu)
        );
        assert!(DevicePreference::from_name("tpu").is_err());
    }

    #[test]
    fn fixed_preference_ignores_host() {
        let host = HostFacts {
            nvidia_device_node: true,
            ..Default::default()
        };
        assert_eq!(DevicePreference::Fixed(Device::Cpu).resolve(&host), Device::Cpu);
    }

    #[test]
    fn auto_prefers_cuda() {
        let host = HostFacts {
            cuda_visible_devices: Some("0".into()),
            apple_silicon: true,
            ..Default::default()
        };
        assert_eq!(DevicePreference::Auto.resolve(&host), Device::Cuda);
    }

    #[test]
    fn auto_ignores_disabled_cuda() {
        let host = HostFacts {
            cuda_visible_devices: Some("-1".into()),
            ..Default::default()
        };
        assert_eq!(DevicePreference::Auto.resolve(&host), Device::Cpu);
    }

    #[test]
    fn auto_falls_back_to_mps_then_cpu() {
        let mac = HostFacts {
            apple_silicon: true,
            ..Default::default()
        };
        assert_eq!(DevicePreference::Auto.resolve(&mac), Device::Mps);
        assert_eq!(DevicePreference::Auto.resolve(&HostFacts::default()), Device::Cpu);
    }
}
