//! Live run-loop behavior: these tests exercise the engine thread and the
//! worker pool for real, so they poll with generous timeouts instead of
//! asserting exact timing.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use voltic_core::{Module, ModuleConfig, ModuleCore, ProcessArgs};
use voltic_engine::{BLOCK_BATCH, Engine, Settings};

/// Polls `cond` until it holds or `timeout` elapses.
fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

struct Counter {
    count: Arc<AtomicUsize>,
}

impl Counter {
    fn new() -> (Self, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        (
            Self {
                count: Arc::clone(&count),
            },
            count,
        )
    }
}

impl Module for Counter {
    fn config(&self) -> ModuleConfig {
        ModuleConfig {
            params: 1,
            inputs: 1,
            outputs: 1,
        }
    }

    fn process(&mut self, _args: &ProcessArgs, _core: &mut ModuleCore) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn run_loop_steps_modules_until_stopped() {
    let engine = Engine::new(Arc::new(Settings::new()));
    let (counter, count) = Counter::new();
    engine.add_module(Box::new(counter));

    engine.start();
    assert!(wait_until(Duration::from_secs(5), || {
        count.load(Ordering::SeqCst) >= BLOCK_BATCH
    }));
    engine.stop();

    let frozen = count.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(count.load(Ordering::SeqCst), frozen);
}

#[test]
fn worker_pool_follows_the_thread_count_setting() {
    let settings = Arc::new(Settings::new());
    settings.set_thread_count(4);
    let engine = Engine::new(Arc::clone(&settings));
    let (counter, count) = Counter::new();
    engine.add_module(Box::new(counter));

    engine.start();
    assert!(wait_until(Duration::from_secs(5), || engine.thread_count() == 4));

    for k in [1usize, 2, 8, 1] {
        settings.set_thread_count(k);
        assert!(wait_until(Duration::from_secs(5), || engine.thread_count() == k));

        // The pool keeps stepping across every relaunch.
        let before = count.load(Ordering::SeqCst);
        assert!(wait_until(Duration::from_secs(5), || {
            count.load(Ordering::SeqCst) > before
        }));
    }

    engine.stop();
    assert_eq!(engine.thread_count(), 1);
}

#[test]
fn pausing_halts_block_stepping() {
    let engine = Engine::new(Arc::new(Settings::new()));
    let (counter, count) = Counter::new();
    engine.add_module(Box::new(counter));

    engine.start();
    assert!(wait_until(Duration::from_secs(5), || {
        count.load(Ordering::SeqCst) > 0
    }));

    engine.set_paused(true);
    assert!(engine.is_paused());
    // An already-admitted batch may still finish; settle first.
    thread::sleep(Duration::from_millis(50));
    let paused_at = count.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(100));
    assert_eq!(count.load(Ordering::SeqCst), paused_at);

    engine.set_paused(false);
    assert!(wait_until(Duration::from_secs(5), || {
        count.load(Ordering::SeqCst) > paused_at
    }));
    engine.stop();
}

#[test]
fn all_modules_advance_in_lockstep() {
    let settings = Arc::new(Settings::new());
    settings.set_thread_count(4);
    let engine = Engine::new(settings);

    let counts: Vec<_> = (0..8)
        .map(|_| {
            let (counter, count) = Counter::new();
            engine.add_module(Box::new(counter));
            count
        })
        .collect();

    engine.start();
    assert!(wait_until(Duration::from_secs(5), || {
        counts[0].load(Ordering::SeqCst) > 10 * BLOCK_BATCH
    }));
    engine.stop();

    // Stopping lands on a batch boundary, so every module saw every block.
    let reference = counts[0].load(Ordering::SeqCst);
    assert!(reference > 0);
    for count in &counts {
        assert_eq!(count.load(Ordering::SeqCst), reference);
    }
}

#[test]
fn a_slow_module_stalls_the_whole_block() {
    // There is no per-module deadline: a module that overruns holds every
    // other module at the barrier, so counts stay in lockstep.
    struct SlowCounter {
        count: Arc<AtomicUsize>,
    }
    impl Module for SlowCounter {
        fn config(&self) -> ModuleConfig {
            ModuleConfig::default()
        }
        fn process(&mut self, _args: &ProcessArgs, _core: &mut ModuleCore) {
            self.count.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(1));
        }
    }

    let settings = Arc::new(Settings::new());
    settings.set_thread_count(2);
    let engine = Engine::new(settings);
    let (fast, fast_count) = Counter::new();
    engine.add_module(Box::new(fast));
    let slow_count = Arc::new(AtomicUsize::new(0));
    engine.add_module(Box::new(SlowCounter {
        count: Arc::clone(&slow_count),
    }));

    engine.start();
    assert!(wait_until(Duration::from_secs(10), || {
        slow_count.load(Ordering::SeqCst) >= BLOCK_BATCH
    }));
    engine.stop();

    assert_eq!(
        fast_count.load(Ordering::SeqCst),
        slow_count.load(Ordering::SeqCst)
    );
}

#[test]
fn smoothing_converges_while_running() {
    let engine = Engine::new(Arc::new(Settings::new()));
    let (counter, _) = Counter::new();
    let id = engine.add_module(Box::new(counter));

    engine.start();
    engine.set_smooth_param(id, 0, 1.0);
    assert_eq!(engine.get_smooth_param(id, 0), 1.0);
    assert!(wait_until(Duration::from_secs(10), || {
        engine.get_param(id, 0) == 1.0
    }));
    engine.stop();
}

#[test]
fn yielding_workers_does_not_stall_the_pool() {
    let settings = Arc::new(Settings::new());
    settings.set_thread_count(2);
    let engine = Engine::new(settings);
    let (counter, count) = Counter::new();
    engine.add_module(Box::new(counter));

    engine.start();
    assert!(wait_until(Duration::from_secs(5), || {
        count.load(Ordering::SeqCst) > 0
    }));
    engine.yield_workers();
    let before = count.load(Ordering::SeqCst);
    assert!(wait_until(Duration::from_secs(5), || {
        count.load(Ordering::SeqCst) > before
    }));
    engine.stop();
}
