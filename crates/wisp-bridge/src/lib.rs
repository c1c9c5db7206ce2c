//! Wisp interop bridge
//!
//! Exposes a host-language object model inside an embedded script runtime
//! and reflects script values back out as opaque, identity-preserving
//! handles. The host registers classes, properties, methods, fields,
//! indexed accessors and enumerations before a session starts; at run time
//! every property read/write, method call and indexed access on an exposed
//! object is forwarded to a single host callback through a short-lived
//! argument adapter.
//!
//! # Example
//!
//! ```ignore
//! use wisp_bridge::{Engine, CallbackKind, NativeRef};
//!
//! let mut engine = Engine::new(NativeRef::NULL);
//! let point = engine.add_object("Point", NativeRef::from_addr(0x1000));
//! engine.set_property(point, "X", NativeRef::from_addr(0x1001), true, true);
//! engine.set_callback(|inv| {
//!     if inv.kind() == CallbackKind::PropGet {
//!         let zero = inv.new_int32(0).unwrap();
//!         inv.set_return(zero);
//!     }
//! });
//! engine.add_global_variable_object("origin", NativeRef::from_addr(0x2000), NativeRef::from_addr(0x1000));
//! engine.start(&[]).unwrap();
//! let result = engine.run_string("origin.X").unwrap();
//! assert_eq!(engine.as_int32(result), Some(0));
//! ```

#![warn(missing_docs)]

mod dispatch;
mod engine;
mod error;
mod eval;
mod materialize;
mod session;
mod template;

pub mod platform;

pub use dispatch::{CallbackKind, HostCallback, IndexKey, Invocation};
pub use engine::Engine;
pub use error::{EngineError, EngineResult, ScriptError};
pub use session::{IndexedKey, NativeKey, ValueHandle, WrapperKind};
pub use template::{
    ClassField, ClassMethod, ClassProperty, ClassRegistry, ClassTemplate, EnumId, EnumTemplate,
    TemplateId,
};

// Re-export the substrate types host callbacks interact with
pub use wisp_script::{JsValue, NativeRef, ScriptContext, Thrown, ThrownKind};
