//! The pull-only settings collaborator.
//!
//! A [`Settings`] instance is shared between the control thread (which
//! writes) and the engine (which polls once per run-loop cycle, never more).
//! Nothing is pushed at the engine; configuration drift is detected and
//! reconciled at the next cycle boundary.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

/// Externally controlled engine configuration.
///
/// All fields are atomic so the control thread can write them at any time
/// without a lock; the f32 sample rate is stored bit-cast in an `AtomicU32`.
pub struct Settings {
    sample_rate: AtomicU32,
    thread_count: AtomicUsize,
    real_time: AtomicBool,
    cpu_meter: AtomicBool,
}

impl Settings {
    /// Creates settings with the defaults: 44100 Hz, one thread, real-time
    /// scheduling off, CPU metering off.
    pub fn new() -> Self {
        Self {
            sample_rate: AtomicU32::new(44100.0f32.to_bits()),
            thread_count: AtomicUsize::new(1),
            real_time: AtomicBool::new(false),
            cpu_meter: AtomicBool::new(false),
        }
    }

    /// Requested sample rate in Hz.
    pub fn sample_rate(&self) -> f32 {
        f32::from_bits(self.sample_rate.load(Ordering::Relaxed))
    }

    /// Sets the requested sample rate in Hz. Must be positive.
    pub fn set_sample_rate(&self, sample_rate: f32) {
        assert!(sample_rate > 0.0, "sample rate must be positive");
        self.sample_rate.store(sample_rate.to_bits(), Ordering::Relaxed);
    }

    /// Requested number of barrier participants (engine thread included).
    pub fn thread_count(&self) -> usize {
        self.thread_count.load(Ordering::Relaxed)
    }

    /// Sets the requested thread count; values below 1 are treated as 1.
    pub fn set_thread_count(&self, thread_count: usize) {
        self.thread_count.store(thread_count.max(1), Ordering::Relaxed);
    }

    /// Whether real-time scheduling is requested for engine threads.
    pub fn real_time(&self) -> bool {
        self.real_time.load(Ordering::Relaxed)
    }

    /// Requests or clears real-time scheduling. Takes effect at the next
    /// worker-pool relaunch.
    pub fn set_real_time(&self, real_time: bool) {
        self.real_time.store(real_time, Ordering::Relaxed);
    }

    /// Whether per-module CPU metering is enabled.
    pub fn cpu_meter(&self) -> bool {
        self.cpu_meter.load(Ordering::Relaxed)
    }

    /// Enables or disables per-module CPU metering.
    pub fn set_cpu_meter(&self, cpu_meter: bool) {
        self.cpu_meter.store(cpu_meter, Ordering::Relaxed);
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = Settings::new();
        assert_eq!(settings.sample_rate(), 44100.0);
        assert_eq!(settings.thread_count(), 1);
        assert!(!settings.real_time());
        assert!(!settings.cpu_meter());
    }

    #[test]
    fn sample_rate_round_trips_through_bits() {
        let settings = Settings::new();
        settings.set_sample_rate(48000.0);
        assert_eq!(settings.sample_rate(), 48000.0);
        settings.set_sample_rate(96000.0);
        assert_eq!(settings.sample_rate(), 96000.0);
    }

    #[test]
    fn thread_count_is_clamped_to_one() {
        let settings = Settings::new();
        settings.set_thread_count(0);
        assert_eq!(settings.thread_count(), 1);
        settings.set_thread_count(8);
        assert_eq!(settings.thread_count(), 8);
    }

    #[test]
    #[should_panic]
    fn zero_sample_rate_panics() {
        Settings::new().set_sample_rate(0.0);
    }
}
