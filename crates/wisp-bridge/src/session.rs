//! Session state: wrapper registry and identity caches
//!
//! A session owns everything created between `start` and `stop`: the
//! script context, every wrapper handed to the host, the object identity
//! cache, the indexed-property-object cache, and the script-error list.
//! Dropping the session releases all of it atomically.

use rustc_hash::FxHashMap;
use wisp_script::{JsValue, NativeRef, ObjectData, ObjectKind, ObjectRef, ScriptContext};

use crate::error::ScriptError;

/// Internal slot count on exposed instances (and the global object)
pub(crate) const OBJECT_SLOT_COUNT: usize = 2;
/// Internal slot holding the class handle
pub(crate) const SLOT_CLASS: usize = 0;
/// Internal slot holding the object pointer
pub(crate) const SLOT_POINTER: usize = 1;
/// Internal slot count on indexed property objects
pub(crate) const INDEXED_SLOT_COUNT: usize = 3;
/// Internal slot holding the indexed-property descriptor
pub(crate) const SLOT_DESCRIPTOR: usize = 2;

/// Non-owning handle to a session-owned value wrapper.
///
/// Handles carry the session generation they were minted in; handles from
/// a stopped session never resolve again, even after a restart.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ValueHandle {
    pub(crate) generation: u32,
    pub(crate) index: u32,
}

/// Wrapper classification, fixed at wrap time.
///
/// Classification priority is function, then array, then scalar, then
/// object — and an object carrying exactly the reserved slot count
/// classifies as a native object.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum WrapperKind {
    /// undefined / null / bool / int32 / number / string
    Scalar,
    /// A generic object
    Object,
    /// An exposed native object (carries the two reserved slots)
    NativeObject,
    /// An array
    Array,
    /// A callable
    Function,
}

/// Identity-cache key: one native object as (pointer, class). A struct key
/// on purpose — packing two pointers into one integer truncates.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NativeKey {
    /// Native object pointer
    pub ptr: NativeRef,
    /// Native class handle
    pub class: NativeRef,
}

/// Indexed-property-object cache key: (owner pointer, descriptor)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct IndexedKey {
    /// Owning native object pointer
    pub owner: NativeRef,
    /// Indexed-property descriptor handle
    pub prop: NativeRef,
}

pub(crate) struct Wrapped {
    pub value: JsValue,
    pub kind: WrapperKind,
}

pub(crate) struct Session {
    pub generation: u32,
    pub ctx: ScriptContext,
    /// Append-only wrapper registry; keeps every value handed to the host
    /// alive until the session stops
    values: Vec<Wrapped>,
    /// (pointer, class) -> wrapper, guaranteeing script-side `===` for one
    /// native object
    pub native_objects: FxHashMap<NativeKey, ValueHandle>,
    /// (owner, descriptor) -> intermediate indexed property object
    pub indexed_objects: FxHashMap<IndexedKey, ObjectRef>,
    /// Materialized prototype per class index
    pub prototypes: Vec<Option<ObjectRef>>,
    pub errors: Vec<ScriptError>,
    pub argv: Vec<String>,
}

impl Session {
    pub fn new(generation: u32, class_count: usize, argv: Vec<String>) -> Self {
        Session {
            generation,
            ctx: ScriptContext::new(),
            values: Vec::new(),
            native_objects: FxHashMap::default(),
            indexed_objects: FxHashMap::default(),
            prototypes: vec![None; class_count],
            errors: Vec::new(),
            argv,
        }
    }

    /// Classify a value the way the wrap path does
    pub fn classify(&self, value: &JsValue) -> WrapperKind {
        match value {
            JsValue::Object(r) => {
                let Some(obj) = self.ctx.object(*r) else {
                    return WrapperKind::Object;
                };
                if obj.call.is_some() {
                    WrapperKind::Function
                } else if obj.kind == ObjectKind::Array {
                    WrapperKind::Array
                } else if obj.internal.len() == OBJECT_SLOT_COUNT {
                    WrapperKind::NativeObject
                } else {
                    WrapperKind::Object
                }
            }
            _ => WrapperKind::Scalar,
        }
    }

    /// Register a value in the wrapper table and hand out its handle.
    ///
    /// Wrapper identity is not guaranteed here: wrapping the same value
    /// twice yields two handles. Identity-preserving paths go through the
    /// caches instead.
    pub fn make_value(&mut self, value: JsValue) -> ValueHandle {
        let kind = self.classify(&value);
        let index = self.values.len() as u32;
        self.values.push(Wrapped { value, kind });
        ValueHandle {
            generation: self.generation,
            index,
        }
    }

    /// Resolve a handle minted by this session
    pub fn get(&self, handle: ValueHandle) -> Option<&Wrapped> {
        if handle.generation != self.generation {
            return None;
        }
        self.values.get(handle.index as usize)
    }

    /// Resolve a handle to its underlying value
    pub fn value_of(&self, handle: ValueHandle) -> Option<JsValue> {
        self.get(handle).map(|w| w.value.clone())
    }

    /// Resolve or create the indexed property object for one
    /// (owner, descriptor) pair.
    ///
    /// The returned object carries three internal slots — owner class,
    /// owner pointer, descriptor — and is identity-cached so repeated
    /// access to the same named indexed property yields the same script
    /// object.
    pub fn indexed_prop_object(
        &mut self,
        owner: NativeRef,
        class: NativeRef,
        descriptor: NativeRef,
    ) -> ObjectRef {
        let key = IndexedKey {
            owner,
            prop: descriptor,
        };
        if let Some(existing) = self.indexed_objects.get(&key) {
            return *existing;
        }
        let mut data = ObjectData::new(ObjectKind::Plain);
        data.internal = vec![
            JsValue::External(class),
            JsValue::External(owner),
            JsValue::External(descriptor),
        ];
        let obj = self.ctx.alloc(data);
        self.indexed_objects.insert(key, obj);
        obj
    }

    /// Number of wrappers created so far
    pub fn value_count(&self) -> usize {
        self.values.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_generation_gating() {
        let mut session = Session::new(1, 0, Vec::new());
        let h = session.make_value(JsValue::Int32(1));
        assert!(session.get(h).is_some());

        let stale = ValueHandle {
            generation: 0,
            index: h.index,
        };
        assert!(session.get(stale).is_none());
    }

    #[test]
    fn test_classification_priority() {
        let mut session = Session::new(1, 0, Vec::new());

        let scalar = session.make_value(JsValue::Int32(3));
        assert_eq!(session.get(scalar).unwrap().kind, WrapperKind::Scalar);

        let arr = session.ctx.new_array(2);
        let arr = session.make_value(JsValue::Object(arr));
        assert_eq!(session.get(arr).unwrap().kind, WrapperKind::Array);

        let plain = session.ctx.new_plain(None);
        let plain = session.make_value(JsValue::Object(plain));
        assert_eq!(session.get(plain).unwrap().kind, WrapperKind::Object);

        let mut data = ObjectData::new(ObjectKind::Plain);
        data.internal = vec![JsValue::Undefined; OBJECT_SLOT_COUNT];
        let native = session.ctx.alloc(data);
        let native = session.make_value(JsValue::Object(native));
        assert_eq!(session.get(native).unwrap().kind, WrapperKind::NativeObject);
    }

    #[test]
    fn test_indexed_prop_object_identity() {
        let mut session = Session::new(1, 0, Vec::new());
        let owner = NativeRef::from_addr(0x100);
        let class = NativeRef::from_addr(0x200);
        let prop = NativeRef::from_addr(0x300);

        let a = session.indexed_prop_object(owner, class, prop);
        let b = session.indexed_prop_object(owner, class, prop);
        assert_eq!(a, b);

        let other = session.indexed_prop_object(owner, class, NativeRef::from_addr(0x301));
        assert_ne!(a, other);

        assert_eq!(session.ctx.internal_count(a), INDEXED_SLOT_COUNT);
        assert_eq!(
            session
                .ctx
                .internal(a, SLOT_DESCRIPTOR)
                .and_then(|v| v.as_external()),
            Some(prop)
        );
        assert_eq!(
            session
                .ctx
                .internal(a, SLOT_POINTER)
                .and_then(|v| v.as_external()),
            Some(owner)
        );
        assert_eq!(
            session
                .ctx
                .internal(a, SLOT_CLASS)
                .and_then(|v| v.as_external()),
            Some(class)
        );
    }
}
