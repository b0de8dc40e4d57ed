//! CPAL Audio Binding
//!
//! Handles the low-level CPAL stream setup and real-time audio callbacks.
//!
//! # Audio Flow
//!
//! ```text
//!   Input device ──cpal input cb──▶ rtrb ring ──cpal output cb──▶ Output device
//!                                               │
//!                                        BlockProcessor
//!                                  (effect chain, sinks, metrics)
//! ```
//!
//! The ring buffer is primed with one block of silence so the output callback
//! has something to read while capture warms up. That block is the second
//! half of the nominal two-block latency.
//!
//! cpal streams are not `Send` on every platform, so both streams are built,
//! played and dropped on a dedicated `livefx-audio` thread. The engine only
//! holds a shutdown channel and the thread handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, Host, SampleRate, Stream, StreamConfig as CpalStreamConfig};
use crossbeam_channel::{bounded, Sender};
use rtrb::{Consumer, Producer, RingBuffer};
use tracing::{debug, info, warn};

use crate::backend::{ActiveStream, AudioBackend, StreamRequest};
use crate::callback::{BlockProcessor, StreamStatus};
use crate::error::{EngineError, EngineResult};
use crate::message::Event;

const AUDIO_THREAD_NAME: &str = "livefx-audio";

/// Binding to the platform's default audio host through CPAL
#[derive(Debug, Default)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &str {
        "cpal"
    }

    fn open(
        &mut self,
        request: &StreamRequest,
        processor: BlockProcessor,
    ) -> EngineResult<Box<dyn ActiveStream>> {
        let (ready_tx, ready_rx) = bounded::<EngineResult<()>>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let request = request.clone();

        let thread = std::thread::Builder::new()
            .name(AUDIO_THREAD_NAME.into())
            .spawn(move || {
                let streams = match DuplexStreams::start(&request, processor) {
                    Ok(streams) => {
                        let _ = ready_tx.send(Ok(()));
                        streams
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Park until closed; a dropped sender also wakes us
                let _ = shutdown_rx.recv();
                drop(streams);
                debug!("Audio thread exiting");
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(CpalStream {
                shutdown: Some(shutdown_tx),
                thread: Some(thread),
            })),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(EngineError::StreamBuildError(
                    "Audio thread exited during setup".into(),
                ))
            }
        }
    }
}

/// Handle to the running audio thread
struct CpalStream {
    shutdown: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CpalStream {
    fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Audio thread panicked");
            }
        }
    }
}

impl ActiveStream for CpalStream {
    fn close(mut self: Box<Self>) {
        self.shutdown();
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The capture and playback streams, kept alive together
struct DuplexStreams {
    // Field order is drop order: stop capture first
    _input: Stream,
    _output: Stream,
}

impl DuplexStreams {
    fn start(request: &StreamRequest, processor: BlockProcessor) -> EngineResult<Self> {
        let host = cpal::default_host();
        let input_device = find_device(&host, request.input_device.as_deref(), DeviceRole::Input)?;
        let output_device =
            find_device(&host, request.output_device.as_deref(), DeviceRole::Output)?;

        let cpal_config = CpalStreamConfig {
            channels: request.channels,
            sample_rate: SampleRate(request.sample_rate),
            buffer_size: BufferSize::Fixed(request.block_size),
        };

        let block = request.samples_per_block();
        let (mut producer, consumer) = RingBuffer::<f32>::new(request.ring_buffer_samples());
        for _ in 0..block {
            let _ = producer.push(0.0);
        }

        let overflow = Arc::new(AtomicBool::new(false));
        let events = processor.event_sender();

        let input = build_input_stream(
            &input_device,
            &cpal_config,
            producer,
            Arc::clone(&overflow),
            events.clone(),
        )?;
        let output = build_output_stream(
            &output_device,
            &cpal_config,
            consumer,
            processor,
            overflow,
            block,
            events,
        )?;

        output
            .play()
            .map_err(|e| EngineError::StreamPlayError(e.to_string()))?;
        input
            .play()
            .map_err(|e| EngineError::StreamPlayError(e.to_string()))?;

        info!(
            input = %device_name(&input_device),
            output = %device_name(&output_device),
            sample_rate = request.sample_rate,
            block_size = request.block_size,
            channels = request.channels,
            "CPAL streams playing"
        );

        Ok(Self {
            _input: input,
            _output: output,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum DeviceRole {
    Input,
    Output,
}

/// Resolve a device by exact name, or the host default when `name` is None
fn find_device(host: &Host, name: Option<&str>, role: DeviceRole) -> EngineResult<Device> {
    match (name, role) {
        (None, DeviceRole::Input) => host
            .default_input_device()
            .ok_or(EngineError::NoDevicesFound),
        (None, DeviceRole::Output) => host
            .default_output_device()
            .ok_or(EngineError::NoDevicesFound),
        (Some(wanted), role) => {
            let devices: Vec<Device> = match role {
                DeviceRole::Input => host.input_devices().map(|d| d.collect::<Vec<_>>()),
                DeviceRole::Output => host.output_devices().map(|d| d.collect::<Vec<_>>()),
            }
            .map_err(|e| EngineError::StreamBuildError(e.to_string()))?;

            devices
                .into_iter()
                .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
                .ok_or_else(|| EngineError::DeviceNotFound(wanted.to_string()))
        }
    }
}

fn device_name(device: &Device) -> String {
    device.name().unwrap_or_else(|_| "<unknown>".into())
}

fn build_input_stream(
    device: &Device,
    config: &CpalStreamConfig,
    mut producer: Producer<f32>,
    overflow: Arc<AtomicBool>,
    events: Sender<Event>,
) -> EngineResult<Stream> {
    device
        .build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // Real-time audio callback - NO allocations allowed here
                let free = producer.slots().min(data.len());
                if let Ok(chunk) = producer.write_chunk_uninit(free) {
                    chunk.fill_from_iter(data.iter().copied());
                }
                if free < data.len() {
                    // Playback is not keeping up; the tail of this buffer is lost
                    overflow.store(true, Ordering::Relaxed);
                }
            },
            move |err| {
                let _ = events.try_send(Event::stream_error(err));
            },
            None,
        )
        .map_err(|e| EngineError::StreamBuildError(e.to_string()))
}

fn build_output_stream(
    device: &Device,
    config: &CpalStreamConfig,
    mut consumer: Consumer<f32>,
    mut processor: BlockProcessor,
    overflow: Arc<AtomicBool>,
    block_samples: usize,
    events: Sender<Event>,
) -> EngineResult<Stream> {
    let mut scratch = vec![0.0_f32; block_samples.max(1)];

    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                // Real-time audio callback - NO allocations allowed here
                let input_overflow = overflow.swap(false, Ordering::Relaxed);
                render_output(&mut consumer, &mut scratch, &mut processor, input_overflow, data);
            },
            move |err| {
                let _ = events.try_send(Event::stream_error(err));
            },
            None,
        )
        .map_err(|e| EngineError::StreamBuildError(e.to_string()))
}

/// Drain captured audio through `processor` into `data`.
///
/// Callbacks larger than `scratch` are split into block-sized pieces so the
/// processor's buffers never grow on the audio thread.
fn render_output(
    consumer: &mut Consumer<f32>,
    scratch: &mut [f32],
    processor: &mut BlockProcessor,
    mut input_overflow: bool,
    data: &mut [f32],
) {
    for out in data.chunks_mut(scratch.len()) {
        let wanted = out.len();
        let available = consumer.slots().min(wanted);

        if let Ok(chunk) = consumer.read_chunk(available) {
            let (first, second) = chunk.as_slices();
            scratch[..first.len()].copy_from_slice(first);
            scratch[first.len()..first.len() + second.len()].copy_from_slice(second);
            chunk.commit_all();
        }
        // Underrun - fill with silence
        scratch[available..wanted].fill(0.0);

        let status = StreamStatus {
            input_overflow,
            output_underflow: available < wanted,
        };
        // The flag belongs to the callback, not to every piece of it
        input_overflow = false;
        processor.process(&scratch[..wanted], out, status);
    }
}
