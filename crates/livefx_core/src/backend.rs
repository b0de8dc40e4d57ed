//! Audio Binding Abstraction
//!
//! The engine never talks to an audio API directly. It hands a
//! [`BlockProcessor`] to an [`AudioBackend`], which calls it once per block
//! from whatever thread the binding uses, until the returned
//! [`ActiveStream`] is closed.
//!
//! Two bindings ship with the crate:
//! - [`CpalBackend`](crate::stream::CpalBackend): real input and output devices
//! - [`OfflineBackend`]: blocks are pushed explicitly through an [`OfflineDriver`]

use std::sync::Arc;

use parking_lot::Mutex;

use crate::callback::{BlockProcessor, StreamStatus};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};

/// What the engine asks of a binding. Samples are always interleaved `f32`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub sample_rate: u32,
    /// Frames per block
    pub block_size: u32,
    pub channels: u16,
    /// Input device name (None = system default)
    pub input_device: Option<String>,
    /// Output device name (None = system default)
    pub output_device: Option<String>,
    /// Capture-to-playback buffering, in blocks
    pub ring_buffer_blocks: usize,
}

impl StreamRequest {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            sample_rate: config.stream.sample_rate,
            block_size: config.stream.buffer_size,
            channels: config.stream.channels,
            input_device: config.input_device.clone(),
            output_device: config.output_device.clone(),
            ring_buffer_blocks: config.ring_buffer_blocks,
        }
    }

    /// Interleaved samples in one block
    pub fn samples_per_block(&self) -> usize {
        self.block_size as usize * self.channels as usize
    }

    /// Capture-to-playback ring capacity in samples, never under two blocks
    pub fn ring_buffer_samples(&self) -> usize {
        self.samples_per_block() * self.ring_buffer_blocks.max(2)
    }
}

/// An audio API binding
pub trait AudioBackend: Send {
    fn name(&self) -> &str;

    /// Start calling `processor` once per block.
    ///
    /// On error nothing is running and the processor has been dropped.
    fn open(
        &mut self,
        request: &StreamRequest,
        processor: BlockProcessor,
    ) -> EngineResult<Box<dyn ActiveStream>>;
}

/// A running binding
pub trait ActiveStream: Send {
    /// Stop the stream. No callback runs after this returns.
    fn close(self: Box<Self>);
}

type Slot = Arc<Mutex<Option<BlockProcessor>>>;

/// Binding that processes blocks on demand instead of on a device clock.
///
/// Created together with its [`OfflineDriver`]; the backend goes to the
/// engine, the driver stays with whoever produces the audio.
pub struct OfflineBackend {
    slot: Slot,
}

impl OfflineBackend {
    pub fn new() -> (Self, OfflineDriver) {
        let slot: Slot = Arc::new(Mutex::new(None));
        (
            Self {
                slot: Arc::clone(&slot),
            },
            OfflineDriver { slot },
        )
    }
}

impl AudioBackend for OfflineBackend {
    fn name(&self) -> &str {
        "offline"
    }

    fn open(
        &mut self,
        request: &StreamRequest,
        processor: BlockProcessor,
    ) -> EngineResult<Box<dyn ActiveStream>> {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return Err(EngineError::AlreadyRunning);
        }
        *slot = Some(processor);

        tracing::debug!(
            sample_rate = request.sample_rate,
            block_size = request.block_size,
            channels = request.channels,
            "Offline stream opened"
        );

        Ok(Box::new(OfflineStream {
            slot: Arc::clone(&self.slot),
        }))
    }
}

struct OfflineStream {
    slot: Slot,
}

impl ActiveStream for OfflineStream {
    fn close(self: Box<Self>) {
        // Taking the processor under the lock waits out any render in progress
        self.slot.lock().take();
        tracing::debug!("Offline stream closed");
    }
}

/// Pushes blocks through an [`OfflineBackend`]
#[derive(Clone)]
pub struct OfflineDriver {
    slot: Slot,
}

impl OfflineDriver {
    /// Process one block. Returns `false`, leaving `output` untouched, if no
    /// stream is open.
    pub fn render(&self, input: &[f32], output: &mut [f32], status: StreamStatus) -> bool {
        match self.slot.lock().as_mut() {
            Some(processor) => {
                processor.process(input, output, status);
                true
            }
            None => false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.slot.lock().is_some()
    }
}
