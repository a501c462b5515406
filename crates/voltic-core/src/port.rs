//! Input/output ports.
//!
//! A [`Port`] carries up to [`MAX_CHANNELS`] polyphonic voltages plus a plug
//! [`Light`] whose brightness trails the carried signal. The light is aged
//! every block by [`Port::process`], whether or not the owning module was
//! dispatched; a bypassed module's ports still fade out.

/// Maximum polyphony of a single port.
pub const MAX_CHANNELS: usize = 16;

/// Exponential rate of the plug-light follower, per second.
const LIGHT_LAMBDA: f32 = 30.0;

/// A plug light: a brightness value that follows a target exponentially.
#[derive(Debug, Clone, Default)]
pub struct Light {
    brightness: f32,
}

impl Light {
    /// Current brightness in `[0, 1]`.
    #[inline]
    pub fn brightness(&self) -> f32 {
        self.brightness
    }

    /// Advances brightness toward `target` over one block of `sample_time`.
    #[inline]
    pub fn process(&mut self, sample_time: f32, target: f32) {
        self.brightness += (target - self.brightness) * LIGHT_LAMBDA * sample_time;
    }

    /// Sets brightness immediately.
    pub fn set_brightness(&mut self, brightness: f32) {
        self.brightness = brightness;
    }
}

/// A polyphonic input or output port.
#[derive(Debug, Clone)]
pub struct Port {
    voltages: [f32; MAX_CHANNELS],
    channels: u8,
    /// True while at least one cable is attached to this port. Maintained by
    /// the engine whenever a cable is added or removed.
    pub active: bool,
    light: Light,
}

impl Port {
    /// Creates a monophonic, inactive port.
    pub fn new() -> Self {
        Self {
            voltages: [0.0; MAX_CHANNELS],
            channels: 1,
            active: false,
            light: Light::default(),
        }
    }

    /// Number of active channels. Zero means the port carries no signal.
    #[inline]
    pub fn channels(&self) -> usize {
        usize::from(self.channels)
    }

    /// Sets the channel count, zeroing the voltage of every channel at or
    /// above the new count. `set_channels(0)` silences the port entirely.
    pub fn set_channels(&mut self, channels: usize) {
        assert!(channels <= MAX_CHANNELS, "port channel count out of range");
        for v in &mut self.voltages[channels..] {
            *v = 0.0;
        }
        self.channels = channels as u8;
    }

    /// Voltage of one channel.
    #[inline]
    pub fn voltage(&self, channel: usize) -> f32 {
        self.voltages[channel]
    }

    /// Sets the voltage of one channel.
    #[inline]
    pub fn set_voltage(&mut self, channel: usize, voltage: f32) {
        self.voltages[channel] = voltage;
    }

    /// The plug light for this port.
    pub fn light(&self) -> &Light {
        &self.light
    }

    /// Per-block aging step: the plug light follows the first channel's
    /// magnitude. Runs for every port of every module, bypassed or not.
    pub fn process(&mut self, sample_time: f32) {
        let target = (self.voltages[0].abs() / 10.0).clamp(0.0, 1.0);
        self.light.process(sample_time, target);
    }
}

impl Default for Port {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_port_is_mono_and_silent() {
        let port = Port::new();
        assert_eq!(port.channels(), 1);
        assert_eq!(port.voltage(0), 0.0);
        assert!(!port.active);
    }

    #[test]
    fn set_channels_zero_silences_all() {
        let mut port = Port::new();
        port.set_channels(4);
        for c in 0..4 {
            port.set_voltage(c, 5.0);
        }
        port.set_channels(0);
        assert_eq!(port.channels(), 0);
        for c in 0..MAX_CHANNELS {
            assert_eq!(port.voltage(c), 0.0);
        }
    }

    #[test]
    fn shrinking_channels_zeroes_tail_only() {
        let mut port = Port::new();
        port.set_channels(3);
        port.set_voltage(0, 1.0);
        port.set_voltage(2, 3.0);
        port.set_channels(1);
        assert_eq!(port.voltage(0), 1.0);
        assert_eq!(port.voltage(2), 0.0);
    }

    #[test]
    fn light_follows_voltage() {
        let mut port = Port::new();
        port.set_voltage(0, 10.0);
        let sample_time = 1.0 / 44100.0;
        for _ in 0..44100 {
            port.process(sample_time);
        }
        assert!(port.light().brightness() > 0.9);

        port.set_voltage(0, 0.0);
        for _ in 0..44100 {
            port.process(sample_time);
        }
        assert!(port.light().brightness() < 0.1);
    }

    #[test]
    #[should_panic]
    fn channel_count_over_max_panics() {
        let mut port = Port::new();
        port.set_channels(MAX_CHANNELS + 1);
    }
}
