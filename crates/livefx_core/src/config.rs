//! Engine and Stream Configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::sink::DEFAULT_SINK_CAPACITY;

/// Audio stream configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Sample rate in Hz (e.g., 44100, 48000, 96000)
    pub sample_rate: u32,

    /// Number of audio channels (1 = mono, 2 = stereo)
    pub channels: u16,

    /// Block size in frames (lower = less latency, higher = more stability)
    pub buffer_size: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            buffer_size: 512,
        }
    }
}

impl StreamConfig {
    /// Duration of one block in milliseconds; also the processing budget per callback
    pub fn block_duration_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.sample_rate as f32) * 1000.0
    }

    /// Nominal input-to-output latency: one block in, one block out
    pub fn round_trip_latency_ms(&self) -> f32 {
        2.0 * self.block_duration_ms()
    }

    /// Interleaved samples in one block
    pub fn samples_per_block(&self) -> usize {
        self.buffer_size as usize * self.channels as usize
    }

    /// Validate configuration
    pub fn validate(&self) -> EngineResult<()> {
        if self.sample_rate < 8000 || self.sample_rate > 192000 {
            return Err(EngineError::ConfigError(format!(
                "Invalid sample rate: {}",
                self.sample_rate
            )));
        }
        // Effects handle mono or stereo only
        if self.channels == 0 || self.channels > 2 {
            return Err(EngineError::ConfigError(format!(
                "Invalid channel count: {}",
                self.channels
            )));
        }
        if self.buffer_size < 32 || self.buffer_size > 8192 {
            return Err(EngineError::ConfigError(format!(
                "Invalid buffer size: {}",
                self.buffer_size
            )));
        }
        Ok(())
    }
}

/// Overall engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Stream configuration
    pub stream: StreamConfig,

    /// Input device name (None = system default)
    pub input_device: Option<String>,

    /// Output device name (None = system default)
    pub output_device: Option<String>,

    /// Capture-to-playback ring buffer capacity, in blocks
    pub ring_buffer_blocks: usize,

    /// Default queue depth for visualization sinks
    pub sink_capacity: usize,

    /// Capacity of the engine event channel
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            input_device: None,
            output_device: None,
            // 4 blocks worth of ring buffer capacity
            ring_buffer_blocks: 4,
            sink_capacity: DEFAULT_SINK_CAPACITY,
            event_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// Create config optimized for low latency
    pub fn low_latency() -> Self {
        Self {
            stream: StreamConfig {
                sample_rate: 48000,
                channels: 2,
                buffer_size: 128, // ~2.7ms per block
            },
            ring_buffer_blocks: 8,
            ..Default::default()
        }
    }

    /// Create config optimized for stability
    pub fn stable() -> Self {
        Self {
            stream: StreamConfig {
                sample_rate: 48000,
                channels: 2,
                buffer_size: 1024, // ~21ms per block
            },
            ring_buffer_blocks: 4,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        self.stream.validate()?;
        if self.ring_buffer_blocks < 2 {
            return Err(EngineError::ConfigError(format!(
                "Ring buffer must hold at least 2 blocks, got {}",
                self.ring_buffer_blocks
            )));
        }
        if self.sink_capacity == 0 {
            return Err(EngineError::ConfigError("Sink capacity must be at least 1".into()));
        }
        if self.event_capacity == 0 {
            return Err(EngineError::ConfigError("Event capacity must be at least 1".into()));
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> EngineResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json_str(&contents)?;
        tracing::debug!(path = %path.as_ref().display(), "Loaded engine config");
        Ok(config)
    }

    pub fn to_json(&self) -> EngineResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
