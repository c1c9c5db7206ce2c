//! Wisp script-object runtime substrate
//!
//! This crate provides the passive object model the bridge drives: values,
//! an object heap with prototype chains, keyed property slots, internal
//! slots, and trampoline descriptors. It holds no host knowledge — property
//! access, trampoline dispatch, and callback invocation are performed by
//! `wisp-bridge`, which interprets the descriptors stored here.

#![warn(missing_docs)]

pub mod context;
pub mod error;
pub mod object;
pub mod value;

pub use context::ScriptContext;
pub use error::{Thrown, ThrownKind};
pub use object::{
    Callable, HostFn, ObjectData, ObjectKind, PropertySlot, Trampoline, TrampolineOp,
};
pub use value::{JsValue, NativeRef, ObjectRef};
