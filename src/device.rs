//! Compute-device selection for the cloned-voice engine.
//!
//! The device is resolved once when an engine is built, in priority order
//! CUDA → Apple silicon (CoreML) → CPU, through a [`DeviceProbe`] so tests
//! and alternative runtimes can answer "is this available?" themselves.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeDevice {
    Cuda,
    #[serde(alias = "mps")]
    CoreMl,
    Cpu,
}

impl ComputeDevice {
    /// Probe order, most preferred first.
    pub const PRIORITY: [ComputeDevice; 3] =
        [ComputeDevice::Cuda, ComputeDevice::CoreMl, ComputeDevice::Cpu];

    /// First device in [`PRIORITY`](Self::PRIORITY) the probe accepts.
    /// CPU is always accepted.
    pub fn resolve(probe: &dyn DeviceProbe) -> ComputeDevice {
        Self::PRIORITY
            .into_iter()
            .find(|&d| d == ComputeDevice::Cpu || probe.is_available(d))
            .unwrap_or(ComputeDevice::Cpu)
    }

    pub fn is_accelerated(self) -> bool {
        self != ComputeDevice::Cpu
    }
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ComputeDevice::Cuda => "cuda",
            ComputeDevice::CoreMl => "coreml",
            ComputeDevice::Cpu => "cpu",
        })
    }
}

impl FromStr for ComputeDevice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cuda" | "gpu" => Ok(ComputeDevice::Cuda),
            "coreml" | "mps" => Ok(ComputeDevice::CoreMl),
            "cpu" => Ok(ComputeDevice::Cpu),
            other => Err(format!("unknown device '{other}' (expected cuda, coreml or cpu)")),
        }
    }
}

/// Answers whether an accelerated device can be used on this machine.
pub trait DeviceProbe {
    fn is_available(&self, device: ComputeDevice) -> bool;
}

/// Probe that only ever offers the CPU.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuOnly;

impl DeviceProbe for CpuOnly {
    fn is_available(&self, device: ComputeDevice) -> bool {
        device == ComputeDevice::Cpu
    }
}

/// Asks ONNX Runtime which execution providers the loaded library supports.
#[cfg(feature = "onnx")]
#[derive(Debug, Default, Clone, Copy)]
pub struct OrtProbe;

#[cfg(feature = "onnx")]
impl DeviceProbe for OrtProbe {
    fn is_available(&self, device: ComputeDevice) -> bool {
        use ort::execution_providers::{
            CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider,
        };
        let available = match device {
            ComputeDevice::Cuda => CUDAExecutionProvider::default().is_available(),
            ComputeDevice::CoreMl => CoreMLExecutionProvider::default().is_available(),
            ComputeDevice::Cpu => return true,
        };
        available.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Offers(&'static [ComputeDevice]);

    impl DeviceProbe for Offers {
        fn is_available(&self, device: ComputeDevice) -> bool {
            self.0.contains(&device)
        }
    }

    #[test]
    fn test_priority_order() {
        let all = Offers(&[ComputeDevice::CoreMl, ComputeDevice::Cuda]);
        assert_eq!(ComputeDevice::resolve(&all), ComputeDevice::Cuda);

        let apple = Offers(&[ComputeDevice::CoreMl]);
        assert_eq!(ComputeDevice::resolve(&apple), ComputeDevice::CoreMl);

        assert_eq!(ComputeDevice::resolve(&Offers(&[])), ComputeDevice::Cpu);
        assert_eq!(ComputeDevice::resolve(&CpuOnly), ComputeDevice::Cpu);
    }

    #[test]
    fn test_parse() {
        assert_eq!("MPS".parse::<ComputeDevice>().unwrap(), ComputeDevice::CoreMl);
        assert_eq!("cuda".parse::<ComputeDevice>().unwrap(), ComputeDevice::Cuda);
        assert!("tpu".parse::<ComputeDevice>().is_err());
        let d: ComputeDevice = serde_json::from_str("\"mps\"").unwrap();
        assert_eq!(d, ComputeDevice::CoreMl);
    }
}
