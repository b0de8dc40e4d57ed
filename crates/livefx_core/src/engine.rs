//! Audio Engine - Main Entry Point
//!
//! The AudioEngine owns the effect chain, the visualization sinks and the
//! metrics, and manages the lifecycle of one audio binding.
//!
//! # Threads
//!
//! ```text
//! Control thread(s)                        Audio thread (binding-owned)
//!   add/remove/toggle effects ──┐
//!                               ├─ EffectChain (one mutex) ◀── BlockProcessor
//!   parameter setters ──atomics─┘                                 │
//!   metrics() ◀──────────────── EngineMetrics (atomics) ◀─────────┤
//!   poll_event() ◀───────────── bounded channel ◀──── try_send ───┤
//!   visualizer threads ◀──────── VisualizationSink ◀─── push ─────┘
//! ```
//!
//! `start()` and `stop()` may be called from any thread. Effect state is
//! owned by the chain, not the stream, so it survives a stop/start cycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info};

use livefx_dsp::{Effect, EffectChain, EffectHandle, EffectId, EffectStatus};

use crate::backend::{ActiveStream, AudioBackend, StreamRequest};
use crate::callback::BlockProcessor;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::message::Event;
use crate::metrics::{EngineMetrics, MetricsSnapshot};
use crate::sink::VisualizationSink;
use crate::stream::CpalBackend;

/// State that only changes on start/stop
struct Lifecycle {
    backend: Box<dyn AudioBackend>,
    stream: Option<Box<dyn ActiveStream>>,
    sinks: Vec<VisualizationSink>,
}

/// The main audio engine controller
pub struct AudioEngine {
    config: EngineConfig,
    chain: Arc<EffectChain>,
    metrics: Arc<EngineMetrics>,
    lifecycle: Mutex<Lifecycle>,

    /// Mirrors `lifecycle.stream.is_some()` for lock-free reads
    running: AtomicBool,

    event_sender: Sender<Event>,
    event_receiver: Receiver<Event>,
}

impl AudioEngine {
    /// Create an engine bound to the system's audio devices through CPAL.
    ///
    /// No device is opened until [`start`](Self::start).
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        Self::with_backend(config, Box::new(CpalBackend::new()))
    }

    /// Create an engine on a specific audio binding
    pub fn with_backend(config: EngineConfig, backend: Box<dyn AudioBackend>) -> EngineResult<Self> {
        config.validate()?;

        let (event_sender, event_receiver) = bounded::<Event>(config.event_capacity);

        debug!(backend = backend.name(), "Created audio engine");

        Ok(Self {
            config,
            chain: Arc::new(EffectChain::new()),
            metrics: Arc::new(EngineMetrics::new()),
            lifecycle: Mutex::new(Lifecycle {
                backend,
                stream: None,
                sinks: Vec::new(),
            }),
            running: AtomicBool::new(false),
            event_sender,
            event_receiver,
        })
    }

    /// Start audio processing.
    ///
    /// Fails with [`EngineError::AlreadyRunning`], changing nothing, if a
    /// stream is already open.
    pub fn start(&self) -> EngineResult<()> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.stream.is_some() {
            return Err(EngineError::AlreadyRunning);
        }

        let stream_config = &self.config.stream;
        let latency_ms = stream_config.round_trip_latency_ms();
        self.chain
            .reserve_block(stream_config.buffer_size as usize, stream_config.channels as usize);

        let processor = BlockProcessor::new(
            stream_config,
            Arc::clone(&self.chain),
            lifecycle.sinks.clone(),
            Arc::clone(&self.metrics),
            self.event_sender.clone(),
        );

        let request = StreamRequest::from_config(&self.config);
        let stream = lifecycle.backend.open(&request, processor)?;
        lifecycle.stream = Some(stream);
        self.running.store(true, Ordering::SeqCst);

        info!(
            backend = lifecycle.backend.name(),
            sample_rate = stream_config.sample_rate,
            block_size = stream_config.buffer_size,
            channels = stream_config.channels,
            effects = self.chain.len(),
            latency_ms,
            "Audio engine started"
        );
        let _ = self.event_sender.try_send(Event::Started { latency_ms });

        Ok(())
    }

    /// Stop audio processing. Does nothing if not running.
    ///
    /// No block is processed after this returns. Effect state is left as is.
    pub fn stop(&self) {
        {
            let mut lifecycle = self.lifecycle.lock();
            let Some(stream) = lifecycle.stream.take() else {
                return;
            };
            stream.close();
            self.running.store(false, Ordering::SeqCst);
        }

        let session = self.metrics();
        info!(
            frames = session.frames_processed,
            blocks = session.blocks_processed,
            underruns = session.underruns,
            effect_faults = session.effect_faults,
            peak_block_us = session.peak_block_us,
            "Audio engine stopped"
        );
        let _ = self.event_sender.try_send(Event::Stopped);
    }

    // ---- Effects ----

    /// Append an effect to the end of the chain. Allowed while running.
    pub fn add_effect(&self, effect: Effect) -> EffectHandle {
        let handle = self.chain.add(effect);
        let _ = self.event_sender.try_send(Event::EffectAdded {
            id: handle.id().get(),
            name: handle.name_shared(),
        });
        handle
    }

    /// Remove an effect by id. An unknown id is not an error.
    pub fn remove_effect(&self, id: EffectId) -> Option<Effect> {
        let effect = self.chain.remove(id)?;
        let _ = self.event_sender.try_send(Event::EffectRemoved {
            id: id.get(),
            name: effect.handle().name_shared(),
        });
        Some(effect)
    }

    /// First effect in chain order with this name
    pub fn get_effect(&self, name: &str) -> Option<EffectHandle> {
        self.chain.get(name)
    }

    pub fn effect(&self, id: EffectId) -> Option<EffectHandle> {
        self.chain.find(id)
    }

    /// Name and ON/OFF state of every effect, in chain order
    pub fn list_effects(&self) -> Vec<EffectStatus> {
        self.chain.list()
    }

    /// Clear every effect's internal state (delay lines, filters, LFO phase)
    pub fn reset_effects(&self) {
        self.chain.reset();
        debug!("Reset effect state");
    }

    pub fn chain(&self) -> &Arc<EffectChain> {
        &self.chain
    }

    // ---- Visualization ----

    /// Attach a visualization sink. Sinks are fixed while a stream is open.
    pub fn add_visualizer(&self, sink: VisualizationSink) -> EngineResult<()> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.stream.is_some() {
            return Err(EngineError::AlreadyRunning);
        }

        sink.reserve(
            self.config.stream.buffer_size as usize,
            self.config.stream.channels as usize,
        );
        debug!(sink = sink.name(), capacity = sink.capacity(), "Attached visualizer");
        lifecycle.sinks.push(sink);
        Ok(())
    }

    /// Create and attach a sink with the configured capacity, returning the
    /// consumer side
    pub fn create_visualizer(&self, name: impl Into<String>) -> EngineResult<VisualizationSink> {
        let sink = VisualizationSink::new(name, self.config.sink_capacity);
        self.add_visualizer(sink.clone())?;
        Ok(sink)
    }

    // ---- Status ----

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot(self.latency_ms())
    }

    /// Nominal round-trip latency: two blocks
    pub fn latency_ms(&self) -> f32 {
        self.config.stream.round_trip_latency_ms()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Poll for events (non-blocking)
    pub fn poll_event(&self) -> Option<Event> {
        self.event_receiver.try_recv().ok()
    }

    /// Wait up to `timeout` for the next event
    pub fn wait_event(&self, timeout: Duration) -> Option<Event> {
        self.event_receiver.recv_timeout(timeout).ok()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{OfflineBackend, OfflineDriver};
    use crate::callback::StreamStatus;
    use crate::config::StreamConfig;
    use crate::sink::OverflowPolicy;
    use livefx_dsp::{AudioBlock, AudioProcessor, Delay, DelayConfig, EffectError, EffectResult};

    const FRAMES: usize = 64;
    const CHANNELS: usize = 2;
    const SAMPLES: usize = FRAMES * CHANNELS;

    struct Scale(f32);

    impl AudioProcessor for Scale {
        fn process(&mut self, block: &mut AudioBlock) -> EffectResult {
            for sample in block.as_mut_slice() {
                *sample *= self.0;
            }
            Ok(())
        }

        fn reset(&mut self) {}

        fn name(&self) -> &'static str {
            "Scale"
        }
    }

    struct Offset(f32);

    impl AudioProcessor for Offset {
        fn process(&mut self, block: &mut AudioBlock) -> EffectResult {
            for sample in block.as_mut_slice() {
                *sample += self.0;
            }
            Ok(())
        }

        fn reset(&mut self) {}

        fn name(&self) -> &'static str {
            "Offset"
        }
    }

    struct Broken;

    impl AudioProcessor for Broken {
        fn process(&mut self, block: &mut AudioBlock) -> EffectResult {
            block.fill(0.9);
            Err(EffectError::Failed("broken"))
        }

        fn reset(&mut self) {}

        fn name(&self) -> &'static str {
            "Broken"
        }
    }

    fn test_config() -> EngineConfig {
        EngineConfig {
            stream: StreamConfig {
                sample_rate: 48000,
                channels: CHANNELS as u16,
                buffer_size: FRAMES as u32,
            },
            ..Default::default()
        }
    }

    fn offline_engine() -> (AudioEngine, OfflineDriver) {
        let (backend, driver) = OfflineBackend::new();
        let engine = AudioEngine::with_backend(test_config(), Box::new(backend)).unwrap();
        (engine, driver)
    }

    fn render(driver: &OfflineDriver, value: f32) -> Vec<f32> {
        let input = vec![value; SAMPLES];
        let mut output = vec![0.0; SAMPLES];
        assert!(driver.render(&input, &mut output, StreamStatus::default()));
        output
    }

    fn drain(engine: &AudioEngine) -> Vec<Event> {
        std::iter::from_fn(|| engine.poll_event()).collect()
    }

    #[test]
    fn test_engine_not_running_initially() {
        let (engine, driver) = offline_engine();
        assert!(!engine.is_running());
        assert!(!driver.is_open());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig {
            stream: StreamConfig {
                channels: 6,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            AudioEngine::new(config),
            Err(EngineError::ConfigError(_))
        ));
    }

    #[test]
    fn test_start_stop() {
        let (engine, driver) = offline_engine();

        engine.start().unwrap();
        assert!(engine.is_running());
        assert!(driver.is_open());
        assert!(matches!(engine.start(), Err(EngineError::AlreadyRunning)));
        assert!(engine.is_running());

        engine.stop();
        assert!(!engine.is_running());
        engine.stop();
        assert!(!engine.is_running());

        let events = drain(&engine);
        assert_eq!(
            events,
            vec![
                Event::Started {
                    latency_ms: engine.latency_ms()
                },
                Event::Stopped
            ]
        );
    }

    #[test]
    fn test_no_processing_outside_session() {
        let (engine, driver) = offline_engine();
        let input = vec![0.5; SAMPLES];
        let mut output = vec![0.0; SAMPLES];

        assert!(!driver.render(&input, &mut output, StreamStatus::default()));

        engine.start().unwrap();
        engine.stop();

        assert!(!driver.render(&input, &mut output, StreamStatus::default()));
        assert!(output.iter().all(|&s| s == 0.0));
        assert_eq!(engine.metrics().frames_processed, 0);
    }

    #[test]
    fn test_empty_chain_passthrough() {
        let (engine, driver) = offline_engine();
        engine.start().unwrap();
        assert_eq!(render(&driver, 0.25), vec![0.25; SAMPLES]);
    }

    #[test]
    fn test_chain_order() {
        let (engine, driver) = offline_engine();
        engine.add_effect(Effect::external(Scale(0.5)));
        engine.add_effect(Effect::external(Offset(0.25)));
        engine.start().unwrap();

        // 0.5 * 0.5 + 0.25; the reverse order would give 0.375
        assert_eq!(render(&driver, 0.5), vec![0.5; SAMPLES]);
    }

    #[test]
    fn test_disabled_effect_passes_through() {
        let (engine, driver) = offline_engine();
        let scale = engine.add_effect(Effect::external(Scale(0.5)));
        engine.start().unwrap();

        scale.disable();
        assert_eq!(render(&driver, 0.5), vec![0.5; SAMPLES]);

        assert!(scale.toggle());
        assert_eq!(render(&driver, 0.5), vec![0.25; SAMPLES]);
    }

    #[test]
    fn test_effect_registry() {
        let (engine, _driver) = offline_engine();
        let scale = engine.add_effect(Effect::external(Scale(0.5)));
        let offset = engine.add_effect(Effect::external(Offset(0.1)).disabled());
        let second_scale = engine.add_effect(Effect::external(Scale(2.0)));

        let listed: Vec<String> = engine.list_effects().iter().map(ToString::to_string).collect();
        assert_eq!(listed, vec!["Scale (ON)", "Offset (OFF)", "Scale (ON)"]);

        assert_eq!(engine.get_effect("Scale").map(|h| h.id()), Some(scale.id()));
        assert!(engine.get_effect("Missing").is_none());
        assert_eq!(
            engine.effect(second_scale.id()).map(|h| h.id()),
            Some(second_scale.id())
        );

        let removed = engine.remove_effect(offset.id()).unwrap();
        assert_eq!(removed.name(), "Offset");
        assert!(engine.remove_effect(offset.id()).is_none());
        assert_eq!(engine.list_effects().len(), 2);

        let events = drain(&engine);
        assert_eq!(events.len(), 4);
        assert_eq!(
            events[3],
            Event::EffectRemoved {
                id: offset.id().get(),
                name: Arc::from("Offset"),
            }
        );
    }

    #[test]
    fn test_remove_while_running() {
        let (engine, driver) = offline_engine();
        let scale = engine.add_effect(Effect::external(Scale(0.5)));
        engine.start().unwrap();

        assert_eq!(render(&driver, 0.5), vec![0.25; SAMPLES]);
        engine.remove_effect(scale.id());
        assert_eq!(render(&driver, 0.5), vec![0.5; SAMPLES]);
    }

    #[test]
    fn test_fault_isolation() {
        let (engine, driver) = offline_engine();
        engine.add_effect(Effect::external(Scale(0.5)));
        let broken = engine.add_effect(Effect::external(Broken));
        engine.add_effect(Effect::external(Offset(0.125)));
        engine.start().unwrap();
        drain(&engine);

        for _ in 0..3 {
            // Broken's scribbles are rolled back
            assert_eq!(render(&driver, 0.5), vec![0.375; SAMPLES]);
        }

        let faults: Vec<Event> = drain(&engine)
            .into_iter()
            .filter(|e| matches!(e, Event::EffectFault { .. }))
            .collect();
        assert_eq!(
            faults,
            vec![Event::EffectFault {
                id: broken.id().get(),
                name: Arc::from("Broken"),
                error: EffectError::Failed("broken"),
            }]
        );
        assert_eq!(engine.metrics().effect_faults, 3);
        assert_eq!(broken.fault_count(), 3);
        assert!(engine.is_running());
    }

    #[test]
    fn test_underrun_reported() {
        let (engine, driver) = offline_engine();
        engine.start().unwrap();
        drain(&engine);

        let input = vec![0.0; SAMPLES];
        let mut output = vec![0.0; SAMPLES];
        let status = StreamStatus {
            input_overflow: true,
            ..Default::default()
        };
        assert!(driver.render(&input, &mut output, status));

        assert_eq!(engine.metrics().underruns, 1);
        assert_eq!(engine.poll_event(), Some(Event::BufferUnderrun));
    }

    #[test]
    fn test_output_zero_filled() {
        let (engine, driver) = offline_engine();
        engine.start().unwrap();

        let input = vec![0.5; SAMPLES / 2];
        let mut output = vec![1.0; SAMPLES];
        assert!(driver.render(&input, &mut output, StreamStatus::default()));

        assert!(output[..SAMPLES / 2].iter().all(|&s| s == 0.5));
        assert!(output[SAMPLES / 2..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_visualizer_policies() {
        let (engine, driver) = offline_engine();
        let newest = VisualizationSink::new("newest", 2);
        let oldest = VisualizationSink::with_policy("oldest", 2, OverflowPolicy::DropOldest);
        engine.add_visualizer(newest.clone()).unwrap();
        engine.add_visualizer(oldest.clone()).unwrap();
        engine.start().unwrap();

        for value in [0.1, 0.2, 0.3] {
            render(&driver, value);
        }

        assert_eq!(newest.len(), 2);
        assert_eq!(newest.dropped_count(), 1);
        assert_eq!(newest.try_pop().unwrap().sample(0, 0), 0.1);

        assert_eq!(oldest.len(), 2);
        assert_eq!(oldest.dropped_count(), 1);
        assert_eq!(oldest.try_pop().unwrap().sample(0, 0), 0.2);
    }

    #[test]
    fn test_visualizer_sees_processed_audio() {
        let (engine, driver) = offline_engine();
        engine.add_effect(Effect::external(Scale(0.5)));
        let sink = engine.create_visualizer("scope").unwrap();
        assert_eq!(sink.capacity(), engine.config().sink_capacity);
        engine.start().unwrap();

        render(&driver, 0.5);
        let block = sink.pop_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(block.frames(), FRAMES);
        assert_eq!(block.channels(), CHANNELS);
        assert!(block.as_slice().iter().all(|&s| s == 0.25));
    }

    #[test]
    fn test_visualizer_rejected_while_running() {
        let (engine, _driver) = offline_engine();
        engine.start().unwrap();
        assert!(matches!(
            engine.add_visualizer(VisualizationSink::new("late", 2)),
            Err(EngineError::AlreadyRunning)
        ));
        engine.stop();
        assert!(engine.create_visualizer("after").is_ok());
    }

    #[test]
    fn test_metrics() {
        let (engine, driver) = offline_engine();
        engine.start().unwrap();
        render(&driver, 0.0);
        render(&driver, 0.0);

        let metrics = engine.metrics();
        assert_eq!(metrics.frames_processed, 2 * FRAMES as u64);
        assert_eq!(metrics.blocks_processed, 2);
        assert_eq!(metrics.underruns, 0);
        assert!((metrics.latency_ms - 2.0 * 64.0 / 48.0).abs() < 1e-4);
    }

    #[test]
    fn test_state_survives_restart() {
        let (engine, driver) = offline_engine();
        let delay = Delay::new(
            DelayConfig {
                delay_ms: 1.0,
                feedback: 0.0,
                wet: 1.0,
            },
            48000.0,
        )
        .unwrap();
        let handle = engine.add_effect(Effect::new(delay));
        let scale = engine.add_effect(Effect::external(Scale(0.5)));
        scale.disable();

        engine.start().unwrap();
        let first = render(&driver, 0.5);
        assert_eq!(first[0], 0.0);
        engine.stop();

        engine.start().unwrap();
        // 48 frames of delay line were filled in the previous session
        let second = render(&driver, 0.5);
        assert_eq!(second[0], 0.5);
        assert!(!scale.is_enabled());
        assert!(handle.is_enabled());

        engine.reset_effects();
        let third = render(&driver, 0.5);
        assert_eq!(third[0], 0.0);
    }

    #[test]
    fn test_drop_closes_stream() {
        let (engine, driver) = offline_engine();
        engine.start().unwrap();
        drop(engine);
        assert!(!driver.is_open());
    }

    #[test]
    fn test_engine_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AudioEngine>();
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_cpal_engine_start_stop() {
        let engine = AudioEngine::new(EngineConfig::default()).unwrap();
        engine.start().unwrap();
        std::thread::sleep(Duration::from_millis(200));
        engine.stop();
        assert!(engine.metrics().frames_processed > 0);
    }
}
