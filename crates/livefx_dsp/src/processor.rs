//! Audio Processor Trait
//!
//! Defines the per-block interface every effect implements. The four built-in
//! effects are dispatched statically through [`EffectKind`](crate::EffectKind);
//! anything else plugs in as a boxed `AudioProcessor`.

use crate::block::AudioBlock;
use crate::error::EffectResult;

/// Trait for block processors in the effect chain
///
/// # Real-time Safety Contract
///
/// Implementors MUST follow these rules in `process()`:
/// - NO heap allocations (no Vec::push, no Box::new, no String)
/// - NO syscalls (no file I/O, no network, no mutex locks)
/// - NO unbounded loops
/// - Constant or O(n) time complexity where n = block length
///
/// Violating these rules causes audio dropouts ("glitches").
///
/// # Faults
///
/// Returning `Err` does not stop the stream. The chain restores the block to
/// what it was before the call and moves on to the next effect.
pub trait AudioProcessor: Send {
    /// Process an interleaved block in-place, preserving its shape
    fn process(&mut self, block: &mut AudioBlock) -> EffectResult;

    /// Reset internal state (delay lines, filter memories, LFO phase)
    fn reset(&mut self);

    /// Human-readable name for debugging/UI
    fn name(&self) -> &'static str;
}
