//! Visualization Sinks
//!
//! A sink is the hand-off point between the audio thread and a visualizer
//! running at its own pace. The audio thread pushes a copy of every processed
//! block; the consumer pops whenever it is ready to draw.
//!
//! ```text
//!   audio thread                               consumer thread
//!   ────────────                               ───────────────
//!   push(&block) ──copy──▶ [ queue (N) ] ──pop──▶ SinkBlock guard
//!        ▲                                              │
//!        └──────────── [ free pool ] ◀──── drop ────────┘
//! ```
//!
//! Blocks circulate between a bounded queue and a free pool, both
//! `crossbeam-channel`s, so once the pool is sized a push is a `try_recv`,
//! a `memcpy` and a `try_send`: it never blocks and never allocates.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};

use livefx_dsp::AudioBlock;

/// Default queue depth for a visualization sink
pub const DEFAULT_SINK_CAPACITY: usize = 5;

/// Blocks beyond the queue capacity: one held by the consumer, one in flight
const SPARE_BLOCKS: usize = 2;

/// What to do with an arriving block when the queue is full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverflowPolicy {
    /// Discard the arriving block; the queue keeps the oldest N
    #[default]
    DropNewest,
    /// Evict the oldest queued block; the queue keeps the most recent N
    DropOldest,
}

struct SinkInner {
    name: String,
    capacity: usize,
    policy: OverflowPolicy,
    queue_tx: Sender<AudioBlock>,
    queue_rx: Receiver<AudioBlock>,
    pool_tx: Sender<AudioBlock>,
    pool_rx: Receiver<AudioBlock>,
    /// Blocks in circulation (queue + pool + held by consumers)
    allocated: AtomicUsize,
    pushed: AtomicU64,
    dropped: AtomicU64,
}

/// Bounded, non-blocking audio tap for a visualizer.
///
/// Cloning shares the same queue: the engine keeps one clone as producer,
/// the visualizer thread another as consumer.
#[derive(Clone)]
pub struct VisualizationSink {
    inner: Arc<SinkInner>,
}

impl VisualizationSink {
    /// Create a sink that drops arriving blocks when full
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self::with_policy(name, capacity, OverflowPolicy::default())
    }

    pub fn with_policy(name: impl Into<String>, capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        let (queue_tx, queue_rx) = bounded(capacity);
        let (pool_tx, pool_rx) = bounded(capacity + SPARE_BLOCKS);

        Self {
            inner: Arc::new(SinkInner {
                name: name.into(),
                capacity,
                policy,
                queue_tx,
                queue_rx,
                pool_tx,
                pool_rx,
                allocated: AtomicUsize::new(0),
                pushed: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.inner.policy
    }

    /// Number of blocks waiting for the consumer
    pub fn len(&self) -> usize {
        self.inner.queue_rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.queue_rx.is_empty()
    }

    /// Blocks accepted into the queue
    pub fn pushed_count(&self) -> u64 {
        self.inner.pushed.load(Ordering::Relaxed)
    }

    /// Blocks discarded on overflow (arriving or evicted, depending on policy)
    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Fill the pool with blocks of the given shape.
    ///
    /// Call before the audio thread starts pushing; afterwards `push` does
    /// not allocate for blocks up to this size.
    pub fn reserve(&self, frames: usize, channels: usize) {
        let inner = &self.inner;

        // Grow pooled blocks that are too small
        let pooled: Vec<AudioBlock> = inner.pool_rx.try_iter().collect();
        for mut block in pooled {
            if block.len() < frames * channels.max(1) {
                block.resize(frames, channels);
            }
            let _ = inner.pool_tx.try_send(block);
        }

        let target = inner.capacity + SPARE_BLOCKS;
        while inner.allocated.load(Ordering::Relaxed) < target {
            if inner.pool_tx.try_send(AudioBlock::new(frames, channels)).is_err() {
                break;
            }
            inner.allocated.fetch_add(1, Ordering::Relaxed);
        }

        tracing::debug!(sink = %inner.name, frames, channels, blocks = target, "Sized sink pool");
    }

    /// Push a copy of `block`. Never blocks.
    ///
    /// Returns `false` if the block was discarded.
    pub fn push(&self, block: &AudioBlock) -> bool {
        let inner = &self.inner;

        let mut evicted = None;
        if inner.queue_tx.is_full() {
            match inner.policy {
                OverflowPolicy::DropNewest => {
                    inner.dropped.fetch_add(1, Ordering::Relaxed);
                    return false;
                }
                OverflowPolicy::DropOldest => {
                    // The consumer may have emptied a slot in the meantime
                    evicted = inner.queue_rx.try_recv().ok();
                    if evicted.is_some() {
                        inner.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }

        let Some(mut slot) = evicted.or_else(|| self.take_free_block()) else {
            // Every block is queued or held by the consumer
            inner.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        slot.copy_from(block);
        match inner.queue_tx.try_send(slot) {
            Ok(()) => {
                inner.pushed.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(slot)) | Err(TrySendError::Disconnected(slot)) => {
                let _ = inner.pool_tx.try_send(slot);
                inner.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// A recycled block, or a new one while the pool is below its size
    fn take_free_block(&self) -> Option<AudioBlock> {
        let inner = &self.inner;
        if let Ok(block) = inner.pool_rx.try_recv() {
            return Some(block);
        }

        let target = inner.capacity + SPARE_BLOCKS;
        inner
            .allocated
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| (n < target).then_some(n + 1))
            .ok()
            .map(|_| AudioBlock::default())
    }

    /// Take the oldest queued block without waiting
    pub fn try_pop(&self) -> Option<SinkBlock> {
        self.inner.queue_rx.try_recv().ok().map(|block| self.guard(block))
    }

    /// Wait up to `timeout` for a block
    pub fn pop_timeout(&self, timeout: Duration) -> Option<SinkBlock> {
        self.inner
            .queue_rx
            .recv_timeout(timeout)
            .ok()
            .map(|block| self.guard(block))
    }

    /// Take the newest queued block, recycling everything older
    pub fn pop_latest(&self) -> Option<SinkBlock> {
        let mut latest = None;
        while let Ok(block) = self.inner.queue_rx.try_recv() {
            // Dropping the previous guard returns it to the pool
            latest = Some(self.guard(block));
        }
        latest
    }

    fn guard(&self, block: AudioBlock) -> SinkBlock {
        SinkBlock {
            block,
            sink: Arc::clone(&self.inner),
        }
    }
}

impl fmt::Debug for VisualizationSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisualizationSink")
            .field("name", &self.inner.name)
            .field("capacity", &self.inner.capacity)
            .field("policy", &self.inner.policy)
            .field("queued", &self.len())
            .finish()
    }
}

/// A block popped from a sink.
///
/// The storage goes back to the sink's pool when the guard is dropped, so
/// copy out anything that must outlive it.
pub struct SinkBlock {
    block: AudioBlock,
    sink: Arc<SinkInner>,
}

impl SinkBlock {
    /// Copy the block out
    pub fn to_block(&self) -> AudioBlock {
        self.block.clone()
    }
}

impl Deref for SinkBlock {
    type Target = AudioBlock;

    fn deref(&self) -> &AudioBlock {
        &self.block
    }
}

impl Drop for SinkBlock {
    fn drop(&mut self) {
        let block = std::mem::take(&mut self.block);
        if self.sink.pool_tx.try_send(block).is_err() {
            self.sink.allocated.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

impl fmt::Debug for SinkBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkBlock")
            .field("frames", &self.frames())
            .field("channels", &self.channels())
            .finish()
    }
}
