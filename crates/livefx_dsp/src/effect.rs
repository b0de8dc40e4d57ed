//! Effect wrapper: identity, enable/bypass and fault isolation
//!
//! An [`Effect`] owns the DSP state and lives inside the chain. Its
//! [`EffectHandle`] is a cheap clone of the shared control surface (enabled
//! flag, fault counter, live parameters) that the control plane keeps after
//! handing the effect over, so toggling or tweaking never needs the chain lock.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::block::AudioBlock;
use crate::chorus::{Chorus, ChorusParams};
use crate::delay::{Delay, DelayParams};
use crate::distortion::{Distortion, DistortionParams};
use crate::error::{EffectError, EffectResult};
use crate::processor::AudioProcessor;
use crate::reverb::{Reverb, ReverbParams};

static NEXT_EFFECT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique effect identity. Removal goes by id, never by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectId(u64);

impl EffectId {
    fn next() -> Self {
        Self(NEXT_EFFECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Live parameters of a built-in effect
#[derive(Debug, Clone)]
pub enum EffectControls {
    Delay(Arc<DelayParams>),
    Reverb(Arc<ReverbParams>),
    Distortion(Arc<DistortionParams>),
    Chorus(Arc<ChorusParams>),
    /// User-supplied processor; parameters are its own business
    External,
}

/// Outcome of running one effect on one block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Processed,
    /// Disabled: the block went through untouched
    Bypassed,
    /// The effect failed; the block was restored to its input
    Faulted(EffectError),
}

#[derive(Debug)]
struct Shared {
    id: EffectId,
    name: Arc<str>,
    enabled: AtomicBool,
    faults: AtomicU64,
    /// Consecutive faulted blocks; zero while healthy
    streak: AtomicU64,
    controls: EffectControls,
}

/// Control-plane view of an effect, valid whether or not it is in a chain
#[derive(Debug, Clone)]
pub struct EffectHandle {
    shared: Arc<Shared>,
}

impl EffectHandle {
    pub fn id(&self) -> EffectId {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The name as a shared string; cloning it does not allocate
    pub fn name_shared(&self) -> Arc<str> {
        Arc::clone(&self.shared.name)
    }

    pub fn enable(&self) {
        self.set_enabled(true);
    }

    pub fn disable(&self) {
        self.set_enabled(false);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.shared.enabled.store(enabled, Ordering::Release);
    }

    /// Flip the enabled flag. Returns the new state.
    pub fn toggle(&self) -> bool {
        !self.shared.enabled.fetch_xor(true, Ordering::AcqRel)
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Acquire)
    }

    /// Number of blocks this effect has failed on since it was created
    pub fn fault_count(&self) -> u64 {
        self.shared.faults.load(Ordering::Relaxed)
    }

    /// Number of consecutive blocks the effect has failed on; 1 means the
    /// most recent block was the first failure after a healthy run.
    pub fn fault_streak(&self) -> u64 {
        self.shared.streak.load(Ordering::Relaxed)
    }

    pub fn is_faulted(&self) -> bool {
        self.fault_streak() > 0
    }

    pub fn controls(&self) -> &EffectControls {
        &self.shared.controls
    }

    pub fn delay(&self) -> Option<&DelayParams> {
        match &self.shared.controls {
            EffectControls::Delay(params) => Some(params),
            _ => None,
        }
    }

    pub fn reverb(&self) -> Option<&ReverbParams> {
        match &self.shared.controls {
            EffectControls::Reverb(params) => Some(params),
            _ => None,
        }
    }

    pub fn distortion(&self) -> Option<&DistortionParams> {
        match &self.shared.controls {
            EffectControls::Distortion(params) => Some(params),
            _ => None,
        }
    }

    pub fn chorus(&self) -> Option<&ChorusParams> {
        match &self.shared.controls {
            EffectControls::Chorus(params) => Some(params),
            _ => None,
        }
    }

    /// Set the wet mix on effects that have one.
    ///
    /// Returns the clamped value stored, or `None` for effects without a dry
    /// path (distortion, external processors).
    pub fn set_wet(&self, wet: f32) -> Option<f32> {
        match &self.shared.controls {
            EffectControls::Delay(params) => Some(params.set_wet(wet)),
            EffectControls::Reverb(params) => Some(params.set_wet(wet)),
            EffectControls::Chorus(params) => Some(params.set_wet(wet)),
            EffectControls::Distortion(_) | EffectControls::External => None,
        }
    }

    /// Live parameters [`set_param`](Self::set_param) accepts for this effect
    pub fn param_names(&self) -> &'static [&'static str] {
        match &self.shared.controls {
            EffectControls::Delay(_) => &["feedback", "wet"],
            EffectControls::Reverb(_) => &["damping", "wet"],
            EffectControls::Distortion(_) => &["drive", "tone", "level"],
            EffectControls::Chorus(_) => &["rate", "depth", "wet"],
            EffectControls::External => &[],
        }
    }

    /// Set a live parameter by name.
    ///
    /// Returns the clamped value stored, or `None` if this effect has no
    /// parameter called `param`.
    pub fn set_param(&self, param: &str, value: f32) -> Option<f32> {
        match (&self.shared.controls, param) {
            (EffectControls::Delay(p), "feedback") => Some(p.set_feedback(value)),
            (EffectControls::Reverb(p), "damping") => Some(p.set_damping(value)),
            (EffectControls::Distortion(p), "drive") => Some(p.set_drive(value)),
            (EffectControls::Distortion(p), "tone") => Some(p.set_tone(value)),
            (EffectControls::Distortion(p), "level") => Some(p.set_level(value)),
            (EffectControls::Chorus(p), "rate") => Some(p.set_rate_hz(value)),
            (EffectControls::Chorus(p), "depth") => Some(p.set_depth(value)),
            (_, "wet") => self.set_wet(value),
            _ => None,
        }
    }

    pub fn status(&self) -> EffectStatus {
        EffectStatus {
            id: self.id(),
            name: self.name().to_string(),
            enabled: self.is_enabled(),
        }
    }
}

/// The DSP half of an effect.
///
/// Built-in effects are matched statically; anything else is a boxed
/// [`AudioProcessor`].
pub enum EffectKind {
    Delay(Delay),
    Reverb(Reverb),
    Distortion(Distortion),
    Chorus(Chorus),
    External(Box<dyn AudioProcessor>),
}

impl EffectKind {
    #[inline]
    fn process(&mut self, block: &mut AudioBlock) -> EffectResult {
        match self {
            EffectKind::Delay(fx) => fx.process(block),
            EffectKind::Reverb(fx) => fx.process(block),
            EffectKind::Distortion(fx) => fx.process(block),
            EffectKind::Chorus(fx) => fx.process(block),
            EffectKind::External(fx) => fx.process(block),
        }
    }

    fn reset(&mut self) {
        match self {
            EffectKind::Delay(fx) => fx.reset(),
            EffectKind::Reverb(fx) => fx.reset(),
            EffectKind::Distortion(fx) => fx.reset(),
            EffectKind::Chorus(fx) => fx.reset(),
            EffectKind::External(fx) => fx.reset(),
        }
    }

    fn default_name(&self) -> &'static str {
        match self {
            EffectKind::Delay(fx) => fx.name(),
            EffectKind::Reverb(fx) => fx.name(),
            EffectKind::Distortion(fx) => fx.name(),
            EffectKind::Chorus(fx) => fx.name(),
            EffectKind::External(fx) => fx.name(),
        }
    }

    fn controls(&self) -> EffectControls {
        match self {
            EffectKind::Delay(fx) => EffectControls::Delay(Arc::clone(fx.params())),
            EffectKind::Reverb(fx) => EffectControls::Reverb(Arc::clone(fx.params())),
            EffectKind::Distortion(fx) => EffectControls::Distortion(Arc::clone(fx.params())),
            EffectKind::Chorus(fx) => EffectControls::Chorus(Arc::clone(fx.params())),
            EffectKind::External(_) => EffectControls::External,
        }
    }
}

impl From<Delay> for EffectKind {
    fn from(fx: Delay) -> Self {
        EffectKind::Delay(fx)
    }
}

impl From<Reverb> for EffectKind {
    fn from(fx: Reverb) -> Self {
        EffectKind::Reverb(fx)
    }
}

impl From<Distortion> for EffectKind {
    fn from(fx: Distortion) -> Self {
        EffectKind::Distortion(fx)
    }
}

impl From<Chorus> for EffectKind {
    fn from(fx: Chorus) -> Self {
        EffectKind::Chorus(fx)
    }
}

impl From<Box<dyn AudioProcessor>> for EffectKind {
    fn from(fx: Box<dyn AudioProcessor>) -> Self {
        EffectKind::External(fx)
    }
}

/// A named, toggleable, fault-isolated effect
pub struct Effect {
    handle: EffectHandle,
    kind: EffectKind,
}

impl Effect {
    /// Wrap an effect under its default name, enabled
    pub fn new(kind: impl Into<EffectKind>) -> Self {
        let kind = kind.into();
        let name = kind.default_name();
        Self::build(kind, Arc::from(name))
    }

    /// Wrap a user-supplied processor
    pub fn external(processor: impl AudioProcessor + 'static) -> Self {
        Self::new(EffectKind::External(Box::new(processor)))
    }

    /// Same effect under a different display name
    pub fn with_name(self, name: impl Into<String>) -> Self {
        let enabled = self.is_enabled();
        let effect = Self::build(self.kind, Arc::from(name.into()));
        effect.handle.set_enabled(enabled);
        effect
    }

    /// Start out bypassed
    pub fn disabled(self) -> Self {
        self.disable();
        self
    }

    fn build(kind: EffectKind, name: Arc<str>) -> Self {
        let shared = Shared {
            id: EffectId::next(),
            name,
            enabled: AtomicBool::new(true),
            faults: AtomicU64::new(0),
            streak: AtomicU64::new(0),
            controls: kind.controls(),
        };
        Self {
            handle: EffectHandle {
                shared: Arc::new(shared),
            },
            kind,
        }
    }

    pub fn id(&self) -> EffectId {
        self.handle.id()
    }

    pub fn name(&self) -> &str {
        self.handle.name()
    }

    /// A new control handle sharing this effect's state
    pub fn handle(&self) -> EffectHandle {
        self.handle.clone()
    }

    pub(crate) fn handle_ref(&self) -> &EffectHandle {
        &self.handle
    }

    pub fn enable(&self) {
        self.handle.enable();
    }

    pub fn disable(&self) {
        self.handle.disable();
    }

    pub fn toggle(&self) -> bool {
        self.handle.toggle()
    }

    pub fn is_enabled(&self) -> bool {
        self.handle.is_enabled()
    }

    pub fn kind(&self) -> &EffectKind {
        &self.kind
    }

    /// Clear filter memories, delay lines and LFO phase
    pub fn reset(&mut self) {
        self.kind.reset();
        self.handle.shared.streak.store(0, Ordering::Relaxed);
    }

    /// Run on one block with a freshly allocated backup.
    ///
    /// Use [`apply_with_backup`](Self::apply_with_backup) on the audio thread.
    pub fn apply(&mut self, block: &mut AudioBlock) -> ProcessOutcome {
        let mut backup = AudioBlock::default();
        self.apply_with_backup(block, &mut backup)
    }

    /// Run on one block, restoring it from `backup` if the effect fails.
    ///
    /// `backup` is scratch space; it is overwritten on every enabled call and
    /// does not allocate once it has held a block of this size.
    pub fn apply_with_backup(
        &mut self,
        block: &mut AudioBlock,
        backup: &mut AudioBlock,
    ) -> ProcessOutcome {
        if !self.is_enabled() {
            return ProcessOutcome::Bypassed;
        }

        backup.copy_from(block);

        let shared = &self.handle.shared;
        let result = self.kind.process(block).and_then(|()| {
            // An external processor may have resized the block
            if block.len() == backup.len() && block.channels() == backup.channels() {
                Ok(())
            } else {
                Err(EffectError::ShapeMismatch {
                    expected: backup.len(),
                    got: block.len(),
                })
            }
        });
        match result {
            Ok(()) => {
                let streak = shared.streak.swap(0, Ordering::Relaxed);
                if streak > 0 {
                    tracing::debug!(
                        effect = %self.name(),
                        id = %self.id(),
                        failed_blocks = streak,
                        "Effect recovered"
                    );
                }
                ProcessOutcome::Processed
            }
            Err(error) => {
                block.copy_from(backup);
                shared.faults.fetch_add(1, Ordering::Relaxed);
                // Log the transition only, not every failed block
                if shared.streak.fetch_add(1, Ordering::Relaxed) == 0 {
                    tracing::warn!(
                        effect = %self.name(),
                        id = %self.id(),
                        %error,
                        "Effect faulted, passing audio through"
                    );
                }
                ProcessOutcome::Faulted(error)
            }
        }
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Snapshot of one chain entry for listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectStatus {
    pub id: EffectId,
    pub name: String,
    pub enabled: bool,
}

impl fmt::Display for EffectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.enabled { "ON" } else { "OFF" };
        write!(f, "{} ({})", self.name, state)
    }
}
