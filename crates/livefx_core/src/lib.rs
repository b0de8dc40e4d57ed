//! livefx Core - Audio Engine
//!
//! This crate provides the engine around the `livefx_dsp` effects:
//! - Effect chain lifecycle (start/stop, add/remove/toggle while running)
//! - Audio bindings: CPAL devices, or an offline driver for tests and rendering
//! - Non-blocking visualization sinks with bounded, recycled block pools
//! - Lock-free metrics and an event channel for observers
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Control Thread(s)                       │
//! │  AudioEngine: start/stop, effects, parameters, metrics      │
//! └─────────────────────────────────────────────────────────────┘
//!            │ EffectChain mutex + atomics     ▲ events (bounded)
//!            ▼                                 │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Audio Thread                           │
//! │   Capture ──rtrb──▶ BlockProcessor ──▶ Output               │
//! │                          │                                  │
//! │                          └──try_send──▶ VisualizationSink   │
//! │              (Zero allocation in this path)                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod backend;
mod callback;
mod config;
mod engine;
mod error;
mod message;
mod metrics;
mod sink;
mod stream;

pub use backend::{ActiveStream, AudioBackend, OfflineBackend, OfflineDriver, StreamRequest};
pub use callback::{BlockProcessor, StreamStatus};
pub use config::{EngineConfig, StreamConfig};
pub use engine::AudioEngine;
pub use error::{EngineError, EngineResult};
pub use message::Event;
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use sink::{OverflowPolicy, SinkBlock, VisualizationSink, DEFAULT_SINK_CAPACITY};
pub use stream::CpalBackend;

// Re-export DSP types for convenience
pub use livefx_dsp::{
    AudioBlock, AudioProcessor, Chorus, ChorusConfig, Delay, DelayConfig, Distortion,
    DistortionConfig, Effect, EffectError, EffectHandle, EffectId, EffectStatus, Reverb,
    ReverbConfig, SpectrumAnalyzer,
};
