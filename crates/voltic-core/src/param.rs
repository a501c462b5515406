//! Module parameters.
//!
//! A [`Param`] is a plain value with a range; smoothing toward a target is
//! the engine's job (single-slot, one pair at a time), not the parameter's.

/// A single module parameter: a value plus its valid range and default.
#[derive(Debug, Clone)]
pub struct Param {
    /// Current value. Written directly by `setParam`, advanced per block
    /// while the engine smooths this parameter.
    pub value: f32,
    /// Lower bound of the valid range.
    pub min: f32,
    /// Upper bound of the valid range.
    pub max: f32,
    /// Value restored by the reset hook.
    pub default: f32,
}

impl Param {
    /// Creates a parameter with the unit range `[0, 1]`.
    pub fn new(default: f32) -> Self {
        Self::with_range(default, 0.0, 1.0)
    }

    /// Creates a parameter with an explicit range.
    pub fn with_range(default: f32, min: f32, max: f32) -> Self {
        debug_assert!(min <= max);
        Self {
            value: default,
            min,
            max,
            default,
        }
    }

    /// Snaps the value back to the default.
    pub fn reset(&mut self) {
        self.value = self.default;
    }

    /// Returns the value clamped into the valid range.
    #[inline]
    pub fn clamped(&self) -> f32 {
        self.value.clamp(self.min, self.max)
    }
}

impl Default for Param {
    fn default() -> Self {
        Self::new(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_restores_default() {
        let mut p = Param::with_range(0.5, 0.0, 2.0);
        p.value = 1.7;
        p.reset();
        assert_eq!(p.value, 0.5);
    }

    #[test]
    fn clamped_respects_range() {
        let mut p = Param::with_range(0.0, -1.0, 1.0);
        p.value = 3.0;
        assert_eq!(p.clamped(), 1.0);
        p.value = -2.0;
        assert_eq!(p.clamped(), -1.0);
    }
}
