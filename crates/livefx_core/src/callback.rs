//! Block Callback
//!
//! [`BlockProcessor`] is everything the audio thread touches. The engine
//! builds one on `start()` and hands it to the audio binding, which calls
//! [`BlockProcessor::process`] once per block.
//!
//! Per block:
//! 1. Count binding-reported overflow/underflow
//! 2. Copy input into the preallocated work block
//! 3. Run the effect chain (one lock, one pass)
//! 4. Write the result to the output buffer, zero-filling any excess
//! 5. Push a copy to every visualization sink
//! 6. Record timing and frame metrics

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;

use livefx_dsp::{AudioBlock, EffectChain};

use crate::config::StreamConfig;
use crate::message::Event;
use crate::metrics::EngineMetrics;
use crate::sink::VisualizationSink;

/// Binding-reported stream health for one callback
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStatus {
    /// Capture produced more than could be buffered; samples were lost
    pub input_overflow: bool,
    /// Playback needed more than was available; silence was substituted
    pub output_underflow: bool,
}

impl StreamStatus {
    pub fn is_glitch(&self) -> bool {
        self.input_overflow || self.output_underflow
    }
}

/// The engine's audio-thread state
pub struct BlockProcessor {
    chain: Arc<EffectChain>,
    sinks: Vec<VisualizationSink>,
    metrics: Arc<EngineMetrics>,
    events: Sender<Event>,
    work: AudioBlock,
    channels: usize,
    /// Playback duration of one nominal block
    budget: Duration,
}

impl BlockProcessor {
    pub fn new(
        stream: &StreamConfig,
        chain: Arc<EffectChain>,
        sinks: Vec<VisualizationSink>,
        metrics: Arc<EngineMetrics>,
        events: Sender<Event>,
    ) -> Self {
        let frames = stream.buffer_size as usize;
        let channels = stream.channels.max(1) as usize;

        Self {
            chain,
            sinks,
            metrics,
            events,
            work: AudioBlock::new(frames, channels),
            channels,
            budget: Duration::from_secs_f64(frames as f64 / stream.sample_rate.max(1) as f64),
        }
    }

    /// Event channel, for bindings that report their own errors
    pub fn event_sender(&self) -> Sender<Event> {
        self.events.clone()
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Process one block of interleaved input into `output`.
    ///
    /// Never fails and never blocks: effect faults become pass-through plus a
    /// metric, glitches become a metric plus a best-effort event.
    pub fn process(&mut self, input: &[f32], output: &mut [f32], status: StreamStatus) {
        if status.is_glitch() {
            self.metrics.record_underrun();
            let _ = self.events.try_send(Event::BufferUnderrun);
        }

        let started = Instant::now();

        self.work.load_interleaved(input, self.channels);

        let metrics = &self.metrics;
        let events = &self.events;
        self.chain.process(&mut self.work, |handle, error| {
            metrics.record_fault();
            // Report the start of a failure run; later blocks only count
            if handle.fault_streak() == 1 {
                let _ = events.try_send(Event::EffectFault {
                    id: handle.id().get(),
                    name: handle.name_shared(),
                    error,
                });
            }
        });

        let processed = self.work.as_slice();
        let written = processed.len().min(output.len());
        output[..written].copy_from_slice(&processed[..written]);
        output[written..].fill(0.0);

        for sink in &self.sinks {
            sink.push(&self.work);
        }

        self.metrics
            .record_block(self.work.frames(), started.elapsed(), self.budget);
    }
}
