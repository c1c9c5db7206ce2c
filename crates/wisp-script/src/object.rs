//! Object model
//!
//! Objects carry ordered keyed property slots, a prototype link, internal
//! slots for host identity, optional array element storage, and an optional
//! callable. Accessor slots hold trampoline descriptors — inert data that
//! the bridge resolves into callback dispatches; nothing in this crate ever
//! invokes a host callback.

use std::rc::Rc;

use crate::error::Thrown;
use crate::value::{JsValue, NativeRef, ObjectRef};
use crate::ScriptContext;

/// Which bridge operation a trampoline stands for.
///
/// `IndexedObject` is the accessor installed for a named indexed property:
/// it resolves the cached intermediate object rather than dispatching a
/// host callback directly.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TrampolineOp {
    /// Method call
    Method,
    /// Property getter
    PropGet,
    /// Property setter
    PropSet,
    /// Field getter
    FieldGet,
    /// Field setter
    FieldSet,
    /// Named-indexed-property object resolution
    IndexedObject,
}

/// A bound callback descriptor: operation kind plus the opaque host handle
/// captured at materialization time.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Trampoline {
    /// Operation this trampoline forwards to
    pub op: TrampolineOp,
    /// Host descriptor (method handle, property descriptor, field handle)
    pub data: NativeRef,
}

/// A host-provided script function body.
///
/// Used for script-callable globals installed by the embedder (the stand-in
/// for script-defined functions in a driver without declarations). The body
/// may allocate through the context but cannot reenter the bridge.
pub type HostFn = Rc<dyn Fn(&mut ScriptContext, &[JsValue]) -> Result<JsValue, Thrown>>;

/// What calling an object does
#[derive(Clone)]
pub enum Callable {
    /// A trampoline carrying a host method handle; the bridge dispatches it
    Bound(Trampoline),
    /// A host-provided function body, invoked directly against the context
    Host(HostFn),
}

impl std::fmt::Debug for Callable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Callable::Bound(t) => f.debug_tuple("Bound").field(t).finish(),
            Callable::Host(_) => f.write_str("Host(..)"),
        }
    }
}

/// One named property slot
#[derive(Clone, Debug)]
pub enum PropertySlot {
    /// A plain data property
    Data(JsValue),
    /// An accessor pair. A missing side suppresses that direction of
    /// access entirely: reads yield undefined, writes are ignored, and no
    /// callback runs.
    Accessor {
        /// Getter trampoline, if the property is readable
        getter: Option<Trampoline>,
        /// Setter trampoline, if the property is writable
        setter: Option<Trampoline>,
    },
}

/// Coarse object classification
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ObjectKind {
    /// An ordinary object
    Plain,
    /// An array with element storage
    Array,
}

/// Heap object payload
#[derive(Clone, Debug, Default)]
pub struct ObjectData {
    /// Classification
    pub kind: ObjectKind,
    /// Class name, set on materialized constructors, prototypes and
    /// instances
    pub class_name: Option<Rc<str>>,
    /// Prototype link
    pub proto: Option<ObjectRef>,
    /// Ordered keyed property slots
    props: Vec<(Rc<str>, PropertySlot)>,
    /// Reserved internal slots (host identity); the slot count is the
    /// discriminator between foreign objects, exposed instances (2) and
    /// indexed property objects (3)
    pub internal: Vec<JsValue>,
    /// Array element storage (`kind == Array` only)
    pub elements: Vec<JsValue>,
    /// Callable behavior, if any
    pub call: Option<Callable>,
    /// Default-indexed-property descriptor; set on materialized prototypes
    /// whose template declares one
    pub indexed_interceptor: Option<NativeRef>,
}

impl Default for ObjectKind {
    fn default() -> Self {
        ObjectKind::Plain
    }
}

impl ObjectData {
    /// Create an empty object of the given kind
    pub fn new(kind: ObjectKind) -> Self {
        ObjectData {
            kind,
            ..ObjectData::default()
        }
    }

    /// Define or replace a named property slot. Redefinition keeps the
    /// slot's original position; the last definition wins.
    pub fn define(&mut self, name: impl AsRef<str>, slot: PropertySlot) {
        let name = name.as_ref();
        if let Some(entry) = self.props.iter_mut().find(|(n, _)| &**n == name) {
            entry.1 = slot;
        } else {
            self.props.push((Rc::from(name), slot));
        }
    }

    /// Look up an own property slot
    pub fn get_own(&self, name: &str) -> Option<&PropertySlot> {
        self.props
            .iter()
            .find(|(n, _)| &**n == name)
            .map(|(_, s)| s)
    }

    /// Iterate own property names in definition order
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.props.iter().map(|(n, _)| &**n)
    }

    /// Number of own properties
    pub fn property_count(&self) -> usize {
        self.props.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_last_wins_keeps_position() {
        let mut obj = ObjectData::new(ObjectKind::Plain);
        obj.define("a", PropertySlot::Data(JsValue::Int32(1)));
        obj.define("b", PropertySlot::Data(JsValue::Int32(2)));
        obj.define("a", PropertySlot::Data(JsValue::Int32(3)));

        assert_eq!(obj.property_count(), 2);
        let names: Vec<_> = obj.property_names().collect();
        assert_eq!(names, vec!["a", "b"]);
        match obj.get_own("a") {
            Some(PropertySlot::Data(JsValue::Int32(3))) => {}
            other => panic!("unexpected slot: {:?}", other),
        }
    }

    #[test]
    fn test_get_own_missing() {
        let obj = ObjectData::new(ObjectKind::Plain);
        assert!(obj.get_own("nope").is_none());
    }
}
