//! Demo modules for the command-line rack: a sine oscillator and an
//! envelope follower, enough to exercise dispatch, cables, and smoothing.

use voltic_core::{Module, ModuleConfig, ModuleCore, ProcessArgs};

/// Oscillator frequency range, Hz. Param 0 sweeps it linearly.
const FREQ_MIN: f32 = 20.0;
const FREQ_SPAN: f32 = 2000.0;

/// Sine oscillator. Param 0 selects the frequency, output 0 carries a
/// 10 Vpp sine.
pub struct Vco {
    phase: f32,
}

impl Vco {
    pub fn new() -> Self {
        Self { phase: 0.0 }
    }
}

impl Default for Vco {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for Vco {
    fn config(&self) -> ModuleConfig {
        ModuleConfig {
            params: 1,
            inputs: 0,
            outputs: 1,
        }
    }

    fn process(&mut self, args: &ProcessArgs, core: &mut ModuleCore) {
        let freq = FREQ_MIN + core.params[0].clamped() * FREQ_SPAN;
        self.phase += freq * args.sample_time;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        let v = 5.0 * (self.phase * std::f32::consts::TAU).sin();
        core.outputs[0].set_voltage(0, v);
    }

    fn on_reset(&mut self, core: &mut ModuleCore) {
        self.phase = 0.0;
        for param in &mut core.params {
            param.reset();
        }
    }
}

/// Envelope follower: output 0 tracks the rectified input with a fixed
/// exponential lag.
pub struct Follower {
    envelope: f32,
}

impl Follower {
    pub fn new() -> Self {
        Self { envelope: 0.0 }
    }

    /// Follower rate, per second.
    const LAMBDA: f32 = 50.0;
}

impl Default for Follower {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for Follower {
    fn config(&self) -> ModuleConfig {
        ModuleConfig {
            params: 0,
            inputs: 1,
            outputs: 1,
        }
    }

    fn process(&mut self, args: &ProcessArgs, core: &mut ModuleCore) {
        let input = core.inputs[0].voltage(0).abs();
        self.envelope += (input - self.envelope) * Self::LAMBDA * args.sample_time;
        core.outputs[0].set_voltage(0, self.envelope);
    }
}
