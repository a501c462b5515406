//! Criterion benchmarks for the engine mutation API (`voltic-engine`).
//!
//! The engine thread is not started: these measure registry-lock cost in
//! isolation, which is what a stopped-engine patch load pays. Two axes:
//!
//! - **Patch build** — registering modules and cables at varying rack sizes
//! - **Parameter traffic** — `set_param` churn against a populated registry
//!
//! Run with: `cargo bench -p voltic-engine`
#![allow(missing_docs)]

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use voltic_core::{Cable, Module, ModuleConfig, ModuleCore, ProcessArgs};
use voltic_engine::{Engine, Settings};

const RACK_SIZES: &[usize] = &[8, 32, 128];

/// Trivial pass-through module, so timings reflect registry overhead rather
/// than DSP cost.
struct Wire;

impl Module for Wire {
    fn config(&self) -> ModuleConfig {
        ModuleConfig {
            params: 4,
            inputs: 1,
            outputs: 1,
        }
    }

    fn process(&mut self, _args: &ProcessArgs, core: &mut ModuleCore) {
        let v = core.inputs[0].voltage(0);
        core.outputs[0].set_voltage(0, v);
    }
}

fn make_engine() -> Engine {
    Engine::new(Arc::new(Settings::new()))
}

/// A chain of `n` modules with a cable between each adjacent pair.
fn make_chain(engine: &Engine, n: usize) {
    let ids: Vec<_> = (0..n).map(|_| engine.add_module(Box::new(Wire))).collect();
    for pair in ids.windows(2) {
        engine.add_cable(Cable::new(pair[0], 0, pair[1], 0));
    }
}

fn bench_patch_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine/patch_build");

    for &n in RACK_SIZES {
        group.bench_with_input(BenchmarkId::new("chain", n), &n, |b, &n| {
            b.iter(|| {
                let engine = make_engine();
                make_chain(&engine, n);
                black_box(engine);
            });
        });
    }

    group.finish();
}

fn bench_module_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine/module_churn");

    // Add/remove against an already-populated registry.
    for &n in RACK_SIZES {
        let engine = make_engine();
        make_chain(&engine, n);
        group.bench_with_input(BenchmarkId::new("add_remove", n), &n, |b, _| {
            b.iter(|| {
                let id = engine.add_module(Box::new(Wire));
                engine.remove_module(black_box(id));
            });
        });
    }

    group.finish();
}

fn bench_param_traffic(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine/param_traffic");

    for &n in RACK_SIZES {
        let engine = make_engine();
        make_chain(&engine, n);
        let target = engine.add_module(Box::new(Wire));

        group.bench_with_input(BenchmarkId::new("set_param", n), &n, |b, _| {
            let mut value = 0.0f32;
            b.iter(|| {
                value = (value + 0.01) % 1.0;
                engine.set_param(target, 0, black_box(value));
            });
        });

        group.bench_with_input(BenchmarkId::new("get_param", n), &n, |b, _| {
            b.iter(|| black_box(engine.get_param(target, 0)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_patch_build,
    bench_module_churn,
    bench_param_traffic
);
criterion_main!(benches);
