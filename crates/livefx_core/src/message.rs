//! Engine Events
//!
//! Events flow from the engine (control plane and audio thread) to observers
//! over a bounded channel. The audio thread only ever uses `try_send`, so a
//! slow observer loses events rather than stalling audio.

use std::fmt::Display;
use std::sync::Arc;

use serde::{Serialize, Serializer};

use livefx_dsp::EffectError;

/// Events sent from the audio engine to observers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    /// Engine started successfully
    Started { latency_ms: f32 },

    /// Engine stopped
    Stopped,

    EffectAdded {
        id: u64,
        #[serde(serialize_with = "as_display")]
        name: Arc<str>,
    },

    EffectRemoved {
        id: u64,
        #[serde(serialize_with = "as_display")]
        name: Arc<str>,
    },

    /// An effect failed and is passing audio through.
    ///
    /// Sent once per run of consecutive failures, not once per block.
    EffectFault {
        id: u64,
        #[serde(serialize_with = "as_display")]
        name: Arc<str>,
        #[serde(serialize_with = "as_display")]
        error: EffectError,
    },

    /// Buffer underrun or overflow reported by the audio binding (audio glitch)
    BufferUnderrun,

    /// The audio binding reported an error; the stream may have stopped
    StreamError { message: String },
}

impl Event {
    /// Create a stream error event from any error type
    pub fn stream_error<E: Display>(err: E) -> Self {
        Event::StreamError {
            message: err.to_string(),
        }
    }
}

/// Serialize through `Display`; used for fields whose types carry no serde impl
fn as_display<T: Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}
