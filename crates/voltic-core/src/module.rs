//! The module contract: the [`Module`] trait and the state the registry owns
//! for every registered module.
//!
//! A module implementation supplies DSP behavior; the engine owns its
//! [`ModuleCore`] (params, ports, expander slots, bypass flag, CPU estimate)
//! and hands it to the implementation by exclusive reference during
//! `process` and the lifecycle hooks. Implementations therefore never hold
//! references into the registry and cannot re-enter the engine.

use std::any::Any;

use crate::ids::ModuleId;
use crate::param::Param;
use crate::port::Port;

/// Per-block processing context.
#[derive(Debug, Clone, Copy)]
pub struct ProcessArgs {
    /// Current sample rate in Hz.
    pub sample_rate: f32,
    /// Duration of one block in seconds (`1 / sample_rate`).
    pub sample_time: f32,
}

/// Fixed collection sizes a module declares at registration time.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModuleConfig {
    /// Number of parameters.
    pub params: usize,
    /// Number of input ports.
    pub inputs: usize,
    /// Number of output ports.
    pub outputs: usize,
}

/// An opaque message exchanged between adjacent modules.
pub type ExpanderMessage = Box<dyn Any + Send>;

/// Which side of a module an expander slot faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpanderSide {
    /// The slot facing the module's left neighbor.
    Left,
    /// The slot facing the module's right neighbor.
    Right,
}

impl ExpanderSide {
    /// The side an adjacent module uses to face back at this one.
    pub fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

/// One expander slot: an out-of-band message channel to an adjacent module.
///
/// The owning module writes `producer_message` and raises `flip_requested`
/// during `process`; it reads `consumer_message` for traffic arriving from
/// the neighbor on the matching side. The engine performs the flip after all
/// dispatch for the block, so a message written during block K is first
/// visible to the neighbor in block K+1, never within the same block.
#[derive(Default)]
pub struct Expander {
    /// Id of the adjacent module, or [`ModuleId::NONE`] when unattached.
    /// The engine resolves this id against the registry on demand.
    pub module_id: ModuleId,
    /// Outgoing double-buffer half, written by the owning module.
    pub producer_message: Option<ExpanderMessage>,
    /// Incoming double-buffer half, read by the owning module.
    pub consumer_message: Option<ExpanderMessage>,
    /// Set by the owning module once the producer message is complete.
    /// Cleared by the engine when it performs the flip.
    pub flip_requested: bool,
}

impl Expander {
    /// Typed access to the producer message, if present and of type `T`.
    pub fn producer_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.producer_message.as_mut()?.downcast_mut::<T>()
    }

    /// Typed access to the consumer message, if present and of type `T`.
    pub fn consumer<T: 'static>(&self) -> Option<&T> {
        self.consumer_message.as_ref()?.downcast_ref::<T>()
    }

    /// Marks the producer message ready for delivery at the end of the block.
    pub fn request_flip(&mut self) {
        self.flip_requested = true;
    }
}

/// Registry-owned state of one module.
pub struct ModuleCore {
    /// Parameters, sized by [`ModuleConfig::params`].
    pub params: Vec<Param>,
    /// Input ports, sized by [`ModuleConfig::inputs`].
    pub inputs: Vec<Port>,
    /// Output ports, sized by [`ModuleConfig::outputs`].
    pub outputs: Vec<Port>,
    /// Expander slot facing the left neighbor.
    pub left_expander: Expander,
    /// Expander slot facing the right neighbor.
    pub right_expander: Expander,
    /// True while the module is excluded from dispatch.
    pub bypassed: bool,
    /// Smoothed CPU-time estimate in seconds, maintained by the engine while
    /// CPU metering is enabled. Zeroed when the module is bypassed.
    pub cpu_time: f32,
}

impl ModuleCore {
    /// Allocates the fixed collections for a module.
    pub fn new(config: ModuleConfig) -> Self {
        Self {
            params: (0..config.params).map(|_| Param::default()).collect(),
            inputs: (0..config.inputs).map(|_| Port::new()).collect(),
            outputs: (0..config.outputs).map(|_| Port::new()).collect(),
            left_expander: Expander::default(),
            right_expander: Expander::default(),
            bypassed: false,
            cpu_time: 0.0,
        }
    }

    /// The expander slot facing `side`.
    pub fn expander_mut(&mut self, side: ExpanderSide) -> &mut Expander {
        match side {
            ExpanderSide::Left => &mut self.left_expander,
            ExpanderSide::Right => &mut self.right_expander,
        }
    }
}

/// A processing unit.
///
/// Implementations are externally supplied; the engine invokes `process`
/// once per block unless the module is bypassed, and each lifecycle hook
/// exactly once at the corresponding registry transition.
pub trait Module: Send {
    /// Declares the fixed param/input/output counts for this module.
    fn config(&self) -> ModuleConfig;

    /// Advances the module by one block.
    fn process(&mut self, args: &ProcessArgs, core: &mut ModuleCore);

    /// Invoked when the module is added to the engine.
    fn on_add(&mut self, _core: &mut ModuleCore) {}

    /// Invoked when the module is removed from the engine.
    fn on_remove(&mut self, _core: &mut ModuleCore) {}

    /// Invoked by `resetModule`. Defaults to snapping every parameter back
    /// to its default value.
    fn on_reset(&mut self, core: &mut ModuleCore) {
        for param in &mut core.params {
            param.reset();
        }
    }

    /// Invoked by `randomizeModule`.
    fn on_randomize(&mut self, _core: &mut ModuleCore) {}

    /// Invoked when the engine adopts a new sample rate.
    fn on_sample_rate_change(&mut self, _sample_rate: f32) {}
}
