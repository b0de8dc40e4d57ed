//! Effect Chain
//!
//! An ordered list of effects behind a single `parking_lot::Mutex`. The audio
//! callback holds the lock for exactly one pass over the list; the control
//! plane holds it for a push, a remove or a copy of the handle list. Logging
//! happens after the lock is released, so the callback never waits behind I/O.
//!
//! Signal flows through index 0, then 1, and so on.

use parking_lot::Mutex;

use crate::block::AudioBlock;
use crate::effect::{Effect, EffectHandle, EffectId, EffectStatus, ProcessOutcome};
use crate::error::EffectError;

/// Preallocated slots so that adding the first few effects never reallocates
/// the list while the audio thread is waiting on the lock
const INITIAL_CAPACITY: usize = 16;

/// What happened to one block on its way through the chain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChainReport {
    pub processed: usize,
    pub bypassed: usize,
    pub faulted: usize,
}

struct ChainInner {
    effects: Vec<Effect>,
    /// Scratch block for fault rollback, reused every call
    backup: AudioBlock,
}

pub struct EffectChain {
    inner: Mutex<ChainInner>,
}

impl EffectChain {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ChainInner {
                effects: Vec::with_capacity(INITIAL_CAPACITY),
                backup: AudioBlock::default(),
            }),
        }
    }

    /// Size the rollback scratch block ahead of time, so the first block
    /// through the chain does not allocate.
    pub fn reserve_block(&self, frames: usize, channels: usize) {
        let scratch = AudioBlock::new(frames, channels);
        let mut inner = self.inner.lock();
        if inner.backup.len() < scratch.len() {
            inner.backup = scratch;
        }
    }

    /// Append an effect to the end of the chain
    pub fn add(&self, effect: Effect) -> EffectHandle {
        let handle = effect.handle();
        {
            let mut inner = self.inner.lock();
            inner.effects.push(effect);
        }
        tracing::debug!(effect = %handle.name(), id = %handle.id(), "Added effect to chain");
        handle
    }

    /// Remove an effect by identity, handing ownership back to the caller.
    ///
    /// Returns `None` if no effect with this id is in the chain.
    pub fn remove(&self, id: EffectId) -> Option<Effect> {
        let removed = {
            let mut inner = self.inner.lock();
            let index = inner.effects.iter().position(|fx| fx.id() == id)?;
            inner.effects.remove(index)
        };
        tracing::debug!(effect = %removed.name(), %id, "Removed effect from chain");
        Some(removed)
    }

    /// First effect with this name, in chain order
    pub fn get(&self, name: &str) -> Option<EffectHandle> {
        let inner = self.inner.lock();
        inner
            .effects
            .iter()
            .find(|fx| fx.name() == name)
            .map(Effect::handle)
    }

    pub fn find(&self, id: EffectId) -> Option<EffectHandle> {
        let inner = self.inner.lock();
        inner
            .effects
            .iter()
            .find(|fx| fx.id() == id)
            .map(Effect::handle)
    }

    /// Name and enabled state of every effect, in chain order
    pub fn list(&self) -> Vec<EffectStatus> {
        let handles: Vec<EffectHandle> = {
            let inner = self.inner.lock();
            inner.effects.iter().map(Effect::handle).collect()
        };
        handles.iter().map(EffectHandle::status).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().effects.is_empty()
    }

    /// Reset every effect's internal state
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        for effect in inner.effects.iter_mut() {
            effect.reset();
        }
    }

    /// Remove every effect, returning them in chain order
    pub fn clear(&self) -> Vec<Effect> {
        let mut inner = self.inner.lock();
        std::mem::take(&mut inner.effects)
    }

    /// Run a block through every effect in order.
    ///
    /// `on_fault` is called (with the lock held) for each effect that fails on
    /// this block; it must not block or allocate.
    pub fn process<F>(&self, block: &mut AudioBlock, mut on_fault: F) -> ChainReport
    where
        F: FnMut(&EffectHandle, EffectError),
    {
        let mut report = ChainReport::default();
        let mut guard = self.inner.lock();
        let ChainInner { effects, backup } = &mut *guard;

        for effect in effects.iter_mut() {
            match effect.apply_with_backup(block, backup) {
                ProcessOutcome::Processed => report.processed += 1,
                ProcessOutcome::Bypassed => report.bypassed += 1,
                ProcessOutcome::Faulted(error) => {
                    report.faulted += 1;
                    on_fault(effect.handle_ref(), error);
                }
            }
        }

        report
    }
}

impl Default for EffectChain {
    fn default() -> Self {
        Self::new()
    }
}
