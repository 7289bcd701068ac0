use serde::{Deserialize, Serialize};

use crate::{AssetHandle, Result};

/// Configuration options for the recording subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingSettings {
    pub output_path: String,
    pub sample_rate: u32,
    pub bitrate: Option<u32>,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            output_path: "recorded_audio.aac".to_string(),
            sample_rate: 44_100,
            bitrate: Some(128_000),
        }
    }
}

impl RecordingSettings {
    /// Handle of the recording these settings produce.
    pub fn asset(&self) -> AssetHandle {
        AssetHandle::new(&self.output_path)
    }
}

/// Microphone capture provided by the host. Capture itself lives outside this
/// crate; the effect engine only consumes the resulting asset.
pub trait Recorder {
    fn start_recording(&mut self, settings: &RecordingSettings) -> Result<()>;

    /// Finishes the take and returns the recorded asset.
    fn stop_recording(&mut self) -> Result<AssetHandle>;
}
