//! The engine: registries, run loop, worker pool, and the mutation API.
//!
//! One persistent engine thread steps the patch in batches of
//! [`BLOCK_BATCH`] blocks, holding the registry lock for the whole batch.
//! Worker threads join it through two [`HybridBarrier`] crossings per block
//! and claim modules by work-stealing. Control-thread mutations take a
//! [`VipMutex`] guard (pausing the run loop at the next batch boundary) and
//! then the registry lock; they never interrupt an in-flight batch.
//!
//! Registry-consistency violations (duplicate ids, dangling references,
//! operating on unregistered entities) are caller-contract breaches and
//! abort; there is deliberately no recoverable path for them.

use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use voltic_core::{
    Cable, CableId, ExpanderSide, Module, ModuleCore, ModuleId, ParamHandle, ParamHandleId,
    ProcessArgs,
};

use crate::settings::Settings;
use crate::sync::{HybridBarrier, VipMutex};

/// Blocks stepped per registry-lock acquisition.
pub const BLOCK_BATCH: usize = 128;

/// Parameter-smoothing decay rate, per second (one 60 Hz control frame).
const SMOOTH_LAMBDA: f32 = 60.0;

/// Time constant of the per-module CPU-time moving average, in seconds.
const CPU_TAU: f32 = 2.0;

/// The engine may run this many times faster than the wall clock before the
/// pacing logic considers throttling.
const AHEAD_FACTOR: f64 = 2.0;

/// Accumulated ahead-of-clock budget, in seconds, beyond which the run loop
/// sleeps for one batch duration.
const AHEAD_MAX: f64 = 1.0;

/// Registry entry for one module: its id plus the state a dispatch
/// participant takes exclusive ownership of while processing it.
struct ModuleSlot {
    id: ModuleId,
    state: Mutex<ModuleState>,
}

struct ModuleState {
    core: ModuleCore,
    dsp: Box<dyn Module>,
}

/// Registry entry for one cable, with both endpoints resolved at
/// registration so propagation needs no lookups.
struct CableSlot {
    cable: Cable,
    output: Arc<ModuleSlot>,
    input: Arc<ModuleSlot>,
}

/// Registry entry for one parameter handle. The resolved module reference
/// is derived by the engine and cleared when the module goes away.
struct HandleSlot {
    id: ParamHandleId,
    handle: ParamHandle,
    module: Option<Arc<ModuleSlot>>,
}

/// The single active parameter-smoothing target.
struct SmoothTarget {
    slot: Arc<ModuleSlot>,
    param_id: usize,
    value: f32,
}

/// Everything guarded by the process-wide registry lock.
struct Registry {
    modules: Vec<Arc<ModuleSlot>>,
    cables: Vec<CableSlot>,
    handles: Vec<HandleSlot>,
    next_module_id: i64,
    next_cable_id: i64,
    next_handle_id: i64,
    smooth: Option<SmoothTarget>,
}

impl Registry {
    fn new() -> Self {
        Self {
            modules: Vec::new(),
            cables: Vec::new(),
            handles: Vec::new(),
            next_module_id: 0,
            next_cable_id: 0,
            next_handle_id: 0,
            smooth: None,
        }
    }

    fn find_module(&self, id: ModuleId) -> Option<&Arc<ModuleSlot>> {
        self.modules.iter().find(|slot| slot.id == id)
    }
}

/// State shared between the control thread, the run loop, and workers.
struct Shared {
    settings: Arc<Settings>,
    running: AtomicBool,
    paused: AtomicBool,
    /// Cached sample rate/time, bit-cast f32s readable without the lock.
    sample_rate: AtomicU32,
    sample_time: AtomicU32,
    /// CPU-meter setting cached once per run-loop cycle.
    cpu_meter: AtomicBool,
    vip: VipMutex,
    registry: Mutex<Registry>,
    /// Releases all participants into module dispatch.
    engine_barrier: HybridBarrier,
    /// Rejoins after dispatch, before cable propagation.
    worker_barrier: HybridBarrier,
    /// Next unclaimed module index for the current block.
    work_index: AtomicUsize,
    /// Snapshot of the module list, rebuilt on every add/remove and read
    /// once per block by each participant without touching the registry.
    dispatch: Mutex<Arc<Vec<Arc<ModuleSlot>>>>,
    /// Participant count of the currently launched pool.
    pool_threads: AtomicUsize,
}

impl Shared {
    fn sample_rate(&self) -> f32 {
        f32::from_bits(self.sample_rate.load(Ordering::Relaxed))
    }

    fn sample_time(&self) -> f32 {
        f32::from_bits(self.sample_time.load(Ordering::Relaxed))
    }

    fn set_sample_rate(&self, sample_rate: f32) {
        self.sample_rate
            .store(sample_rate.to_bits(), Ordering::Relaxed);
        self.sample_time
            .store((1.0 / sample_rate).to_bits(), Ordering::Relaxed);
    }
}

/// The real-time rack engine.
///
/// All mutation methods may be called from any thread; each one funnels
/// through the VIP + registry-lock exclusivity protocol, so a call may block
/// for up to one batch of wall-clock time while a batch finishes.
pub struct Engine {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Creates a stopped engine polling the given settings.
    pub fn new(settings: Arc<Settings>) -> Self {
        let shared = Arc::new(Shared {
            settings,
            running: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            sample_rate: AtomicU32::new(44100.0f32.to_bits()),
            sample_time: AtomicU32::new((1.0f32 / 44100.0).to_bits()),
            cpu_meter: AtomicBool::new(false),
            vip: VipMutex::new(),
            registry: Mutex::new(Registry::new()),
            engine_barrier: HybridBarrier::new(),
            worker_barrier: HybridBarrier::new(),
            work_index: AtomicUsize::new(0),
            dispatch: Mutex::new(Arc::new(Vec::new())),
            pool_threads: AtomicUsize::new(1),
        });
        Self {
            shared,
            thread: Mutex::new(None),
        }
    }

    /// The settings collaborator this engine polls.
    pub fn settings(&self) -> &Arc<Settings> {
        &self.shared.settings
    }

    /// Launches the run loop. Idempotent.
    pub fn start(&self) {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("voltic-engine".into())
            .spawn(move || run(&shared))
            .expect("failed to spawn engine thread");
        *self.thread.lock().unwrap() = Some(handle);
        tracing::info!("engine started");
    }

    /// Stops the run loop and joins the engine thread and all workers.
    pub fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.thread.lock().unwrap().take() {
            handle.join().expect("engine thread panicked");
        }
        tracing::info!("engine stopped");
    }

    /// Pauses or resumes block stepping. The run loop keeps cycling (and
    /// keeps reconciling configuration) while paused.
    pub fn set_paused(&self, paused: bool) {
        let _vip = self.shared.vip.lock();
        let _reg = self.lock_registry();
        self.shared.paused.store(paused, Ordering::SeqCst);
    }

    /// Whether block stepping is paused.
    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::SeqCst)
    }

    /// Current sample rate in Hz (cached; adopted from settings at cycle
    /// boundaries).
    pub fn sample_rate(&self) -> f32 {
        self.shared.sample_rate()
    }

    /// Duration of one block in seconds.
    pub fn sample_time(&self) -> f32 {
        self.shared.sample_time()
    }

    /// Participant count of the currently launched worker pool.
    pub fn thread_count(&self) -> usize {
        self.shared.pool_threads.load(Ordering::SeqCst)
    }

    /// Asks workers of the current block to release their CPUs instead of
    /// spinning. Used before intentionally idling the engine.
    pub fn yield_workers(&self) {
        self.shared.worker_barrier.request_yield();
    }

    fn lock_registry(&self) -> MutexGuard<'_, Registry> {
        self.shared.registry.lock().unwrap()
    }

    // --- Modules ---

    /// Registers a module with an auto-assigned id and returns the id.
    pub fn add_module(&self, module: Box<dyn Module>) -> ModuleId {
        self.add_module_inner(module, ModuleId::NONE)
    }

    /// Registers a module under a caller-chosen id, which must be
    /// non-negative and currently unused.
    pub fn add_module_with_id(&self, module: Box<dyn Module>, id: ModuleId) -> ModuleId {
        assert!(id.is_some(), "manual module id must be non-negative");
        self.add_module_inner(module, id)
    }

    fn add_module_inner(&self, module: Box<dyn Module>, requested: ModuleId) -> ModuleId {
        let _vip = self.shared.vip.lock();
        let mut reg = self.lock_registry();

        let id = if requested.is_none() {
            let id = ModuleId(reg.next_module_id);
            reg.next_module_id += 1;
            id
        } else {
            assert!(
                reg.find_module(requested).is_none(),
                "module id {requested} is already in use"
            );
            if requested.0 >= reg.next_module_id {
                reg.next_module_id = requested.0 + 1;
            }
            requested
        };

        let core = ModuleCore::new(module.config());
        let slot = Arc::new(ModuleSlot {
            id,
            state: Mutex::new(ModuleState { core, dsp: module }),
        });
        reg.modules.push(Arc::clone(&slot));

        {
            let mut state = slot.state.lock().unwrap();
            let ModuleState { core, dsp } = &mut *state;
            dsp.on_add(core);
        }

        // Backfill handles already targeting this id.
        for entry in &mut reg.handles {
            if entry.handle.module_id == id {
                entry.module = Some(Arc::clone(&slot));
            }
        }

        publish_dispatch(&self.shared, &reg);
        tracing::debug!("engine_add: module {id}");
        id
    }

    /// Removes a registered module. Every cable touching it must have been
    /// removed first; expander slots and parameter handles referencing it
    /// are cleared here.
    pub fn remove_module(&self, id: ModuleId) {
        let _vip = self.shared.vip.lock();
        let mut reg = self.lock_registry();

        let index = reg
            .modules
            .iter()
            .position(|slot| slot.id == id)
            .unwrap_or_else(|| panic!("module {id} is not registered"));
        let slot = Arc::clone(&reg.modules[index]);

        // Stop smoothing this module immediately.
        if reg
            .smooth
            .as_ref()
            .is_some_and(|smooth| Arc::ptr_eq(&smooth.slot, &slot))
        {
            reg.smooth = None;
        }

        for entry in &reg.cables {
            assert!(
                entry.cable.output_module != id && entry.cable.input_module != id,
                "module {id} still has cables attached"
            );
        }

        // Clear resolved handle references.
        for entry in &mut reg.handles {
            if entry.handle.module_id == id {
                entry.module = None;
            }
        }

        // Clear expander slots pointing at the removed module.
        for other in &reg.modules {
            if Arc::ptr_eq(other, &slot) {
                continue;
            }
            let mut state = other.state.lock().unwrap();
            for side in [ExpanderSide::Left, ExpanderSide::Right] {
                let expander = state.core.expander_mut(side);
                if expander.module_id == id {
                    expander.module_id = ModuleId::NONE;
                }
            }
        }

        {
            let mut state = slot.state.lock().unwrap();
            let ModuleState { core, dsp } = &mut *state;
            dsp.on_remove(core);
        }

        reg.modules.remove(index);
        publish_dispatch(&self.shared, &reg);
        tracing::debug!("engine_remove: module {id}");
    }

    /// Runs `f` with exclusive access to a registered module's
    /// implementation and core state. Returns `None` for unknown ids.
    pub fn with_module<R>(
        &self,
        id: ModuleId,
        f: impl FnOnce(&mut dyn Module, &mut ModuleCore) -> R,
    ) -> Option<R> {
        let _vip = self.shared.vip.lock();
        let reg = self.lock_registry();
        let slot = reg.find_module(id)?;
        let mut state = slot.state.lock().unwrap();
        let ModuleState { core, dsp } = &mut *state;
        Some(f(dsp.as_mut(), core))
    }

    /// Invokes a registered module's reset hook.
    pub fn reset_module(&self, id: ModuleId) {
        let found = self.with_module(id, |dsp, core| dsp.on_reset(core));
        assert!(found.is_some(), "module {id} is not registered");
    }

    /// Invokes a registered module's randomize hook.
    pub fn randomize_module(&self, id: ModuleId) {
        let found = self.with_module(id, |dsp, core| dsp.on_randomize(core));
        assert!(found.is_some(), "module {id} is not registered");
    }

    /// Bypasses or un-bypasses a module. Bypassing silences every output
    /// (zero channels) and zeroes the CPU estimate; un-bypassing restores
    /// one channel per output.
    pub fn bypass_module(&self, id: ModuleId, bypass: bool) {
        let found = self.with_module(id, |_, core| {
            if bypass {
                for output in &mut core.outputs {
                    output.set_channels(0);
                }
                core.cpu_time = 0.0;
            } else {
                for output in &mut core.outputs {
                    output.set_channels(1);
                }
            }
            core.bypassed = bypass;
        });
        assert!(found.is_some(), "module {id} is not registered");
    }

    /// Whether a registered module is bypassed.
    pub fn is_bypassed(&self, id: ModuleId) -> bool {
        self.with_module(id, |_, core| core.bypassed)
            .unwrap_or_else(|| panic!("module {id} is not registered"))
    }

    /// A registered module's smoothed CPU-time estimate in seconds.
    pub fn module_cpu_time(&self, id: ModuleId) -> f32 {
        self.with_module(id, |_, core| core.cpu_time)
            .unwrap_or_else(|| panic!("module {id} is not registered"))
    }

    // --- Cables ---

    /// Registers a cable. Both endpoint modules must be registered, the
    /// port indices valid, and the input port not yet claimed by another
    /// cable. Returns the assigned id.
    pub fn add_cable(&self, cable: Cable) -> CableId {
        let _vip = self.shared.vip.lock();
        let mut reg = self.lock_registry();

        assert!(
            cable.output_module.is_some() && cable.input_module.is_some(),
            "cable endpoints must be set"
        );
        let output = Arc::clone(
            reg.find_module(cable.output_module)
                .unwrap_or_else(|| panic!("cable output module {} is not registered", cable.output_module)),
        );
        let input = Arc::clone(
            reg.find_module(cable.input_module)
                .unwrap_or_else(|| panic!("cable input module {} is not registered", cable.input_module)),
        );
        assert!(
            cable.output_port < output.state.lock().unwrap().core.outputs.len(),
            "cable output port index out of range"
        );
        assert!(
            cable.input_port < input.state.lock().unwrap().core.inputs.len(),
            "cable input port index out of range"
        );
        for entry in &reg.cables {
            assert!(
                !(entry.cable.input_module == cable.input_module
                    && entry.cable.input_port == cable.input_port),
                "input port {}:{} already has a cable",
                cable.input_module,
                cable.input_port
            );
        }

        let mut cable = cable;
        if cable.id.is_none() {
            cable.id = CableId(reg.next_cable_id);
            reg.next_cable_id += 1;
        } else {
            assert!(
                reg.cables.iter().all(|entry| entry.cable.id != cable.id),
                "cable id {} is already in use",
                cable.id
            );
            if cable.id.0 >= reg.next_cable_id {
                reg.next_cable_id = cable.id.0 + 1;
            }
        }
        let id = cable.id;

        reg.cables.push(CableSlot {
            cable,
            output,
            input,
        });
        update_connected(&reg);
        tracing::debug!("engine_add: cable {id}");
        id
    }

    /// Registers a cable under a caller-chosen id, which must be
    /// non-negative and currently unused.
    pub fn add_cable_with_id(&self, mut cable: Cable, id: CableId) -> CableId {
        assert!(id.is_some(), "manual cable id must be non-negative");
        cable.id = id;
        self.add_cable(cable)
    }

    /// Removes a registered cable, silencing its input port first.
    pub fn remove_cable(&self, id: CableId) {
        let _vip = self.shared.vip.lock();
        let mut reg = self.lock_registry();

        let index = reg
            .cables
            .iter()
            .position(|entry| entry.cable.id == id)
            .unwrap_or_else(|| panic!("cable {id} is not registered"));
        {
            let entry = &reg.cables[index];
            let mut state = entry.input.state.lock().unwrap();
            state.core.inputs[entry.cable.input_port].set_channels(0);
        }
        reg.cables.remove(index);
        update_connected(&reg);
        tracing::debug!("engine_remove: cable {id}");
    }

    // --- Parameters ---

    /// Writes a parameter value directly, cancelling any in-flight
    /// smoothing of the same (module, param) pair.
    pub fn set_param(&self, id: ModuleId, param_id: usize, value: f32) {
        let _vip = self.shared.vip.lock();
        let mut reg = self.lock_registry();
        let slot = Arc::clone(
            reg.find_module(id)
                .unwrap_or_else(|| panic!("module {id} is not registered")),
        );
        if reg.smooth.as_ref().is_some_and(|smooth| {
            Arc::ptr_eq(&smooth.slot, &slot) && smooth.param_id == param_id
        }) {
            reg.smooth = None;
        }
        slot.state.lock().unwrap().core.params[param_id].value = value;
    }

    /// Reads a parameter value.
    pub fn get_param(&self, id: ModuleId, param_id: usize) -> f32 {
        let _vip = self.shared.vip.lock();
        let reg = self.lock_registry();
        let slot = reg
            .find_module(id)
            .unwrap_or_else(|| panic!("module {id} is not registered"));
        slot.state.lock().unwrap().core.params[param_id].value
    }

    /// Starts smoothing a parameter toward `value`. If a different pair was
    /// mid-smoothing, its value is snapped to that pair's in-flight target
    /// first; partial progress is finalized, never discarded.
    pub fn set_smooth_param(&self, id: ModuleId, param_id: usize, value: f32) {
        let _vip = self.shared.vip.lock();
        let mut reg = self.lock_registry();
        let slot = Arc::clone(
            reg.find_module(id)
                .unwrap_or_else(|| panic!("module {id} is not registered")),
        );
        assert!(
            param_id < slot.state.lock().unwrap().core.params.len(),
            "param index out of range"
        );
        if let Some(previous) = &reg.smooth
            && !(Arc::ptr_eq(&previous.slot, &slot) && previous.param_id == param_id)
        {
            let mut state = previous.slot.state.lock().unwrap();
            state.core.params[previous.param_id].value = previous.value;
        }
        reg.smooth = Some(SmoothTarget {
            slot,
            param_id,
            value,
        });
    }

    /// Reads the smoothing target if the pair is mid-smoothing, otherwise
    /// the parameter's current value.
    pub fn get_smooth_param(&self, id: ModuleId, param_id: usize) -> f32 {
        let _vip = self.shared.vip.lock();
        let reg = self.lock_registry();
        let slot = reg
            .find_module(id)
            .unwrap_or_else(|| panic!("module {id} is not registered"));
        if let Some(smooth) = &reg.smooth
            && Arc::ptr_eq(&smooth.slot, slot)
            && smooth.param_id == param_id
        {
            return smooth.value;
        }
        slot.state.lock().unwrap().core.params[param_id].value
    }

    // --- Parameter handles ---

    /// Registers a blank parameter handle and returns its id.
    pub fn add_param_handle(&self, handle: ParamHandle) -> ParamHandleId {
        let _vip = self.shared.vip.lock();
        let mut reg = self.lock_registry();
        assert!(handle.is_blank(), "new param handles must be blank");
        let id = ParamHandleId(reg.next_handle_id);
        reg.next_handle_id += 1;
        reg.handles.push(HandleSlot {
            id,
            handle,
            module: None,
        });
        tracing::debug!("engine_add: param handle {id}");
        id
    }

    /// Unregisters a parameter handle.
    pub fn remove_param_handle(&self, id: ParamHandleId) {
        let _vip = self.shared.vip.lock();
        let mut reg = self.lock_registry();
        let index = reg
            .handles
            .iter()
            .position(|entry| entry.id == id)
            .unwrap_or_else(|| panic!("param handle {id} is not registered"));
        reg.handles.remove(index);
        tracing::debug!("engine_remove: param handle {id}");
    }

    /// The handle currently resolved to a (module, param) pair, if any.
    pub fn get_param_handle(&self, id: ModuleId, param_id: usize) -> Option<ParamHandleId> {
        let _vip = self.shared.vip.lock();
        let reg = self.lock_registry();
        reg.handles
            .iter()
            .find(|entry| {
                entry.handle.param_id == param_id
                    && entry.module.as_ref().is_some_and(|slot| slot.id == id)
            })
            .map(|entry| entry.id)
    }

    /// Retargets a handle at (module, param) and re-derives its module
    /// reference from the registry. If another handle already targets the
    /// same pair, `overwrite` selects which of the two is blanked.
    pub fn update_param_handle(
        &self,
        id: ParamHandleId,
        module_id: ModuleId,
        param_id: usize,
        overwrite: bool,
    ) {
        let _vip = self.shared.vip.lock();
        let mut reg = self.lock_registry();
        let index = reg
            .handles
            .iter()
            .position(|entry| entry.id == id)
            .unwrap_or_else(|| panic!("param handle {id} is not registered"));

        reg.handles[index].handle.module_id = module_id;
        reg.handles[index].handle.param_id = param_id;
        reg.handles[index].module = None;

        if module_id.is_some() {
            // Resolve the conflict with any handle already on this pair.
            for other in 0..reg.handles.len() {
                if other == index {
                    continue;
                }
                if reg.handles[other].handle.module_id == module_id
                    && reg.handles[other].handle.param_id == param_id
                {
                    let loser = if overwrite { other } else { index };
                    reg.handles[loser].handle.blank();
                    reg.handles[loser].module = None;
                }
            }
            // Re-derive the module reference (a no-op if this handle lost).
            let target = reg.handles[index].handle.module_id;
            if target.is_some() {
                reg.handles[index].module = reg.find_module(target).map(Arc::clone);
            }
        }
    }

    /// Clones out a handle's current contents for the UI.
    pub fn param_handle(&self, id: ParamHandleId) -> ParamHandle {
        let _vip = self.shared.vip.lock();
        let reg = self.lock_registry();
        reg.handles
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.handle.clone())
            .unwrap_or_else(|| panic!("param handle {id} is not registered"))
    }

    /// Steps a batch's worth of blocks synchronously, without the run loop.
    /// Test-only: the real engine always steps from its own thread.
    #[cfg(test)]
    pub(crate) fn step_blocks(&self, blocks: usize) {
        self.shared
            .cpu_meter
            .store(self.shared.settings.cpu_meter(), Ordering::Relaxed);
        let mut reg = self.lock_registry();
        for _ in 0..blocks {
            step_block(&self.shared, &mut reg);
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Rebuilds the dispatch snapshot after a module add/remove.
fn publish_dispatch(shared: &Shared, reg: &Registry) {
    *shared.dispatch.lock().unwrap() = Arc::new(reg.modules.clone());
}

/// Recomputes every port's `active` flag from the cable registry.
fn update_connected(reg: &Registry) {
    for slot in &reg.modules {
        let mut state = slot.state.lock().unwrap();
        for port in &mut state.core.inputs {
            port.active = false;
        }
        for port in &mut state.core.outputs {
            port.active = false;
        }
    }
    for entry in &reg.cables {
        entry.output.state.lock().unwrap().core.outputs[entry.cable.output_port].active = true;
        entry.input.state.lock().unwrap().core.inputs[entry.cable.input_port].active = true;
    }
}

/// Work-stealing module dispatch: claims unclaimed module indices until the
/// block is exhausted. Run by the engine thread and every worker between the
/// two barrier crossings.
fn step_modules(shared: &Shared) {
    let dispatch = Arc::clone(&shared.dispatch.lock().unwrap());
    let args = ProcessArgs {
        sample_rate: shared.sample_rate(),
        sample_time: shared.sample_time(),
    };
    let cpu_meter = shared.cpu_meter.load(Ordering::Relaxed);

    loop {
        let index = shared.work_index.fetch_add(1, Ordering::SeqCst);
        if index >= dispatch.len() {
            break;
        }
        let mut state = dispatch[index].state.lock().unwrap();
        let ModuleState { core, dsp } = &mut *state;

        if !core.bypassed {
            if cpu_meter {
                let started = Instant::now();
                dsp.process(&args, core);
                let cpu_time = started.elapsed().as_secs_f32();
                core.cpu_time += (cpu_time - core.cpu_time) * args.sample_time / CPU_TAU;
            } else {
                dsp.process(&args, core);
            }
        }

        // Ports age every block, bypassed or not.
        for input in &mut core.inputs {
            input.process(args.sample_time);
        }
        for output in &mut core.outputs {
            output.process(args.sample_time);
        }
    }
}

/// One per-block step: smoothing, dispatch, cable propagation, expander
/// flips. Caller holds the registry lock.
fn step_block(shared: &Shared, reg: &mut Registry) {
    let sample_time = shared.sample_time();

    // 1. Parameter smoothing (single slot).
    let mut finished = false;
    if let Some(smooth) = &reg.smooth {
        let mut state = smooth.slot.state.lock().unwrap();
        let param = &mut state.core.params[smooth.param_id];
        let value = param.value;
        let new_value = value + (smooth.value - value) * SMOOTH_LAMBDA * sample_time;
        if new_value == value {
            // Float granularity exhausted; snap to the target.
            param.value = smooth.value;
            finished = true;
        } else {
            param.value = new_value;
        }
    }
    if finished {
        reg.smooth = None;
    }

    // 2. Module dispatch, shared with the worker pool.
    shared.work_index.store(0, Ordering::SeqCst);
    shared.engine_barrier.wait();
    step_modules(shared);
    shared.worker_barrier.wait();

    // 3. Cable propagation, strictly sequential.
    for entry in &reg.cables {
        step_cable(entry);
    }

    // 4. Expander message flips.
    flip_expanders(reg);
}

fn step_cable(entry: &CableSlot) {
    if Arc::ptr_eq(&entry.output, &entry.input) {
        let mut state = entry.output.state.lock().unwrap();
        let core = &mut state.core;
        let (inputs, outputs) = (&mut core.inputs, &core.outputs);
        Cable::step(
            &outputs[entry.cable.output_port],
            &mut inputs[entry.cable.input_port],
        );
    } else {
        let output_state = entry.output.state.lock().unwrap();
        let mut input_state = entry.input.state.lock().unwrap();
        Cable::step(
            &output_state.core.outputs[entry.cable.output_port],
            &mut input_state.core.inputs[entry.cable.input_port],
        );
    }
}

/// Delivers expander messages: a requested flip exchanges the requester's
/// producer box with the facing consumer box of the resolved neighbor, so
/// the message becomes visible one block later.
fn flip_expanders(reg: &Registry) {
    for slot in &reg.modules {
        let mut state = slot.state.lock().unwrap();
        for side in [ExpanderSide::Left, ExpanderSide::Right] {
            let expander = state.core.expander_mut(side);
            if !expander.flip_requested {
                continue;
            }
            expander.flip_requested = false;
            let target = expander.module_id;
            if target.is_none() {
                continue;
            }
            let Some(neighbor) = reg.find_module(target) else {
                continue;
            };
            if Arc::ptr_eq(neighbor, slot) {
                continue;
            }
            let mut neighbor_state = neighbor.state.lock().unwrap();
            let facing = neighbor_state.core.expander_mut(side.opposite());
            mem::swap(&mut expander.producer_message, &mut facing.consumer_message);
        }
    }
}

struct Worker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

fn worker_run(shared: &Shared, stop: &AtomicBool) {
    loop {
        shared.engine_barrier.wait();
        if stop.load(Ordering::SeqCst) {
            return;
        }
        step_modules(shared);
        shared.worker_barrier.wait();
    }
}

/// Tears down and relaunches the worker pool for a new participant count.
/// Runs only between batches, never mid-batch.
fn relaunch_workers(
    shared: &Arc<Shared>,
    workers: &mut Vec<Worker>,
    thread_count: usize,
    real_time: bool,
) {
    // Stop all workers: they observe the flag at their next engine-barrier
    // crossing, which this wait completes.
    for worker in workers.iter() {
        worker.stop.store(true, Ordering::SeqCst);
    }
    shared.engine_barrier.wait();
    for worker in workers.drain(..) {
        worker.handle.join().expect("engine worker panicked");
    }

    shared.engine_barrier.set_total(thread_count);
    shared.worker_barrier.set_total(thread_count);
    shared.pool_threads.store(thread_count, Ordering::SeqCst);

    if real_time {
        // Raising OS scheduling priority is platform-specific and outside
        // this crate; the request is surfaced for the embedder.
        tracing::info!("real-time scheduling requested for engine threads");
    }

    for id in 1..thread_count {
        let stop = Arc::new(AtomicBool::new(false));
        let worker_shared = Arc::clone(shared);
        let worker_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name(format!("voltic-worker-{id}"))
            .spawn(move || worker_run(&worker_shared, &worker_stop))
            .expect("failed to spawn engine worker");
        workers.push(Worker { stop, handle });
    }
    tracing::info!(threads = thread_count, "worker pool relaunched");
}

/// The run loop: reconcile configuration, step a batch, pace against the
/// wall clock.
fn run(shared: &Arc<Shared>) {
    let mut workers: Vec<Worker> = Vec::new();
    let mut thread_count = 1usize;
    let mut real_time = false;
    let mut ahead_time = 0.0f64;
    let mut last_time = Instant::now();

    while shared.running.load(Ordering::SeqCst) {
        // Let outstanding VIP operations finish first.
        shared.vip.wait();

        // Adopt a changed sample rate.
        let wanted_rate = shared.settings.sample_rate();
        if wanted_rate != shared.sample_rate() {
            shared.set_sample_rate(wanted_rate);
            let reg = shared.registry.lock().unwrap();
            for slot in &reg.modules {
                slot.state
                    .lock()
                    .unwrap()
                    .dsp
                    .on_sample_rate_change(wanted_rate);
            }
            drop(reg);
            ahead_time = 0.0;
            tracing::info!(sample_rate = wanted_rate, "sample rate adopted");
        }

        shared
            .cpu_meter
            .store(shared.settings.cpu_meter(), Ordering::Relaxed);

        // Relaunch the pool on thread-count or priority drift.
        let wanted_threads = shared.settings.thread_count().max(1);
        let wanted_real_time = shared.settings.real_time();
        if wanted_threads != thread_count || wanted_real_time != real_time {
            thread_count = wanted_threads;
            real_time = wanted_real_time;
            relaunch_workers(shared, &mut workers, thread_count, real_time);
        }

        if !shared.paused.load(Ordering::SeqCst) {
            let mut reg = shared.registry.lock().unwrap();
            for _ in 0..BLOCK_BATCH {
                step_block(shared, &mut reg);
            }
        }

        // Pacing: the engine may run up to AHEAD_FACTOR times real time
        // ahead of the clock; past AHEAD_MAX of banked time it sleeps one
        // batch to avoid pegging a core.
        let step_time = BLOCK_BATCH as f64 * f64::from(shared.sample_time());
        ahead_time += step_time;
        let now = Instant::now();
        ahead_time -= AHEAD_FACTOR * (now - last_time).as_secs_f64();
        last_time = now;
        ahead_time = ahead_time.max(0.0);
        if ahead_time > AHEAD_MAX {
            thread::sleep(Duration::from_secs_f64(step_time));
        }
    }

    // Orderly shutdown: collapse the pool to the engine thread alone.
    relaunch_workers(shared, &mut workers, 1, false);
}
