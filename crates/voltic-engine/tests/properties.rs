//! Property tests for the registry's id discipline and the parameter
//! surface. Case counts are kept low because every case builds an engine.

use std::sync::Arc;

use proptest::prelude::*;
use voltic_core::{Module, ModuleConfig, ModuleCore, ModuleId, ProcessArgs};
use voltic_engine::{Engine, Settings};

struct Null;

impl Module for Null {
    fn config(&self) -> ModuleConfig {
        ModuleConfig {
            params: 2,
            inputs: 0,
            outputs: 0,
        }
    }

    fn process(&mut self, _args: &ProcessArgs, _core: &mut ModuleCore) {}
}

fn engine() -> Engine {
    Engine::new(Arc::new(Settings::new()))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn auto_ids_are_unique_and_increasing(n in 1usize..40) {
        let engine = engine();
        let mut last = -1i64;
        for _ in 0..n {
            let id = engine.add_module(Box::new(Null));
            prop_assert!(id.0 > last);
            last = id.0;
        }
    }

    #[test]
    fn auto_ids_never_collide_with_manual_ids(
        manual in proptest::collection::btree_set(0i64..1_000, 1..20),
    ) {
        let engine = engine();
        for &id in &manual {
            engine.add_module_with_id(Box::new(Null), ModuleId(id));
        }
        for _ in 0..10 {
            let id = engine.add_module(Box::new(Null));
            prop_assert!(!manual.contains(&id.0));
        }
    }

    #[test]
    fn params_round_trip(value in -1.0e6f32..1.0e6) {
        let engine = engine();
        let id = engine.add_module(Box::new(Null));
        engine.set_param(id, 1, value);
        prop_assert_eq!(engine.get_param(id, 1), value);
    }

    #[test]
    fn smooth_target_is_visible_until_reached(target in -10.0f32..10.0) {
        let engine = engine();
        let id = engine.add_module(Box::new(Null));
        engine.set_smooth_param(id, 0, target);
        // The target reads back while the value has not moved yet.
        prop_assert_eq!(engine.get_smooth_param(id, 0), target);
        prop_assert_eq!(engine.get_param(id, 0), 0.0);
    }
}
