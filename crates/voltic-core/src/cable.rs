//! Cables: directed connections between module ports.

use crate::ids::{CableId, ModuleId};
use crate::port::Port;

/// A directed connection from one module's output port to another module's
/// input port.
///
/// A cable is constructed with both endpoints set and no id; the engine
/// assigns the id at registration. Invariant (enforced by the engine): a
/// given input port is the target of at most one cable at any time.
#[derive(Debug, Clone)]
pub struct Cable {
    /// Assigned by the engine at registration; [`CableId::NONE`] before.
    pub id: CableId,
    /// Module owning the source output port.
    pub output_module: ModuleId,
    /// Index of the source output port.
    pub output_port: usize,
    /// Module owning the target input port.
    pub input_module: ModuleId,
    /// Index of the target input port.
    pub input_port: usize,
}

impl Cable {
    /// Creates an unregistered cable between two ports.
    pub fn new(
        output_module: ModuleId,
        output_port: usize,
        input_module: ModuleId,
        input_port: usize,
    ) -> Self {
        Self {
            id: CableId::NONE,
            output_module,
            output_port,
            input_module,
            input_port,
        }
    }

    /// Per-block propagation: copies the source port's channel count and
    /// voltages to the target port. Runs strictly after all module dispatch
    /// for the block.
    pub fn step(output: &Port, input: &mut Port) {
        let channels = output.channels();
        input.set_channels(channels);
        for c in 0..channels {
            input.set_voltage(c, output.voltage(c));
        }
    }
}
