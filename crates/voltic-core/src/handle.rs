//! Parameter handles: weak, UI-owned references to a (module, param) pair.

use crate::ids::ModuleId;

/// A weak reference to one parameter of one module, identified by ids rather
/// than by address. The engine re-derives the target module from its
/// registry when the handle is updated; at most one authoritative handle may
/// target a given (module, param) pair at a time.
#[derive(Debug, Clone, Default)]
pub struct ParamHandle {
    /// Target module, or [`ModuleId::NONE`] while blank.
    pub module_id: ModuleId,
    /// Target parameter index within the module.
    pub param_id: usize,
    /// Display label owned by the UI.
    pub text: String,
}

impl ParamHandle {
    /// Creates a blank handle. Handles must be blank at registration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the target, returning the handle to the blank state.
    pub fn blank(&mut self) {
        self.module_id = ModuleId::NONE;
        self.param_id = 0;
    }

    /// True while the handle has no target.
    pub fn is_blank(&self) -> bool {
        self.module_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_handle_is_blank() {
        let handle = ParamHandle::new();
        assert!(handle.is_blank());
        assert!(handle.module_id.is_none());
    }

    #[test]
    fn blank_clears_target() {
        let mut handle = ParamHandle {
            module_id: ModuleId(3),
            param_id: 5,
            text: String::from("cutoff"),
        };
        assert!(!handle.is_blank());
        handle.blank();
        assert!(handle.is_blank());
        assert_eq!(handle.param_id, 0);
        // The display label survives blanking.
        assert_eq!(handle.text, "cutoff");
    }
}
