//! Real-time engine for a Voltic rack.
//!
//! The engine owns the registries of modules, cables, and parameter
//! handles, and steps the whole patch from a persistent thread at the
//! configured sample rate, spreading module dispatch across a relaunchable
//! pool of worker threads.
//!
//! # Core Abstractions
//!
//! - [`Engine`] is the public surface: lifecycle control plus the mutation
//!   API, callable from any thread.
//! - [`Settings`] is the lock-free configuration the run loop reconciles
//!   against once per cycle (sample rate, thread count, real-time request,
//!   CPU metering).
//! - [`sync`] holds the two primitives the threading model is built from:
//!   a priority mutex that lets control threads pre-empt the run loop at
//!   batch boundaries, and a hybrid spin/block barrier for the per-block
//!   worker rendezvous.
//!
//! # Threading Model
//!
//! Every block is two barrier crossings: the engine thread releases all
//! workers into work-stealing module dispatch, then everyone rejoins before
//! the engine performs cable propagation and expander delivery alone.
//! Mutations acquire a VIP guard first, which parks the run loop at the
//! next batch boundary, then the registry lock.

pub mod engine;
pub mod settings;
pub mod sync;

pub use engine::{BLOCK_BATCH, Engine};
pub use settings::Settings;
pub use sync::{HybridBarrier, VipGuard, VipMutex};
