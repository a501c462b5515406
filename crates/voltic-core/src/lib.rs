//! Voltic Core - data model and module contract for the Voltic rack engine
//!
//! This crate defines everything a processing unit ("module") and the engine
//! agree on: the [`Module`] trait with its lifecycle hooks, the owned state a
//! registered module carries ([`ModuleCore`]), ports, parameters, cables, and
//! UI-owned parameter handles.
//!
//! # Core Abstractions
//!
//! ## Module contract
//!
//! - [`Module`] - Object-safe trait for processing units
//! - [`ModuleConfig`] - Fixed param/input/output counts declared by a module
//! - [`ModuleCore`] - Params, ports, and expander slots owned by the registry
//! - [`ProcessArgs`] - Per-block sample rate / sample time context
//!
//! ## Graph entities
//!
//! - [`Cable`] - Directed connection from an output port to an input port
//! - [`ParamHandle`] - Weak, UI-owned (module, param) reference
//! - [`Expander`] - Adjacent-module message slot with one-block latency
//!
//! ## Identity
//!
//! Entities are keyed by integer ids ([`ModuleId`], [`CableId`],
//! [`ParamHandleId`]); negative ids are the "none" sentinel. Resolved
//! references are derived from the registry on demand rather than stored as
//! raw pointers, so a stale id can never dangle.
//!
//! # Design Principles
//!
//! - **Real-time safe**: no allocation in the per-block path
//! - **Object-safe traits**: concrete DSP units are externally supplied
//! - **Id-keyed arena**: the engine owns every registered entity

pub mod cable;
pub mod handle;
pub mod ids;
pub mod module;
pub mod param;
pub mod port;

pub use cable::Cable;
pub use handle::ParamHandle;
pub use ids::{CableId, ModuleId, ParamHandleId};
pub use module::{
    Expander, ExpanderMessage, ExpanderSide, Module, ModuleConfig, ModuleCore, ProcessArgs,
};
pub use param::Param;
pub use port::{Light, MAX_CHANNELS, Port};
