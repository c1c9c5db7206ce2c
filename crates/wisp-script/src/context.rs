//! Execution context: the object arena and its designated global object
//!
//! The context owns every object created during one session. Dropping the
//! context releases all of them at once, which is how the bridge implements
//! atomic session teardown.

use crate::object::{ObjectData, ObjectKind, PropertySlot};
use crate::value::{JsValue, ObjectRef};

/// One script execution context.
///
/// Created per session, bound to a single thread, and dropped wholesale on
/// session stop. Objects are arena-allocated and never freed individually;
/// the lifetime of every `ObjectRef` is the lifetime of the context.
pub struct ScriptContext {
    objects: Vec<ObjectData>,
    global: ObjectRef,
}

impl ScriptContext {
    /// Create a fresh context with an empty global object
    pub fn new() -> Self {
        let mut ctx = ScriptContext {
            objects: Vec::new(),
            global: ObjectRef(0),
        };
        ctx.global = ctx.alloc(ObjectData::new(ObjectKind::Plain));
        ctx
    }

    /// The designated global object
    pub fn global(&self) -> ObjectRef {
        self.global
    }

    /// Allocate an object, returning its reference
    pub fn alloc(&mut self, data: ObjectData) -> ObjectRef {
        let index = self.objects.len() as u32;
        self.objects.push(data);
        ObjectRef(index)
    }

    /// Allocate a plain object with the given prototype link
    pub fn new_plain(&mut self, proto: Option<ObjectRef>) -> ObjectRef {
        let mut data = ObjectData::new(ObjectKind::Plain);
        data.proto = proto;
        self.alloc(data)
    }

    /// Allocate an array of the given length, filled with undefined
    pub fn new_array(&mut self, length: usize) -> ObjectRef {
        let mut data = ObjectData::new(ObjectKind::Array);
        data.elements = vec![JsValue::Undefined; length];
        self.alloc(data)
    }

    /// Borrow an object
    pub fn object(&self, r: ObjectRef) -> Option<&ObjectData> {
        self.objects.get(r.index())
    }

    /// Mutably borrow an object
    pub fn object_mut(&mut self, r: ObjectRef) -> Option<&mut ObjectData> {
        self.objects.get_mut(r.index())
    }

    /// Define (or redefine, last wins) a property on an object
    pub fn define_property(&mut self, r: ObjectRef, name: &str, slot: PropertySlot) {
        if let Some(obj) = self.object_mut(r) {
            obj.define(name, slot);
        }
    }

    /// Resolve a property along the prototype chain.
    ///
    /// Returns the holder that defines it and a clone of the slot. Slots
    /// are cheap to clone (values are refcounted or `Copy`).
    pub fn resolve_property(&self, r: ObjectRef, name: &str) -> Option<(ObjectRef, PropertySlot)> {
        let mut current = Some(r);
        while let Some(cur) = current {
            let obj = self.object(cur)?;
            if let Some(slot) = obj.get_own(name) {
                return Some((cur, slot.clone()));
            }
            current = obj.proto;
        }
        None
    }

    /// Number of reserved internal slots on an object
    pub fn internal_count(&self, r: ObjectRef) -> usize {
        self.object(r).map(|o| o.internal.len()).unwrap_or(0)
    }

    /// Read an internal slot
    pub fn internal(&self, r: ObjectRef, index: usize) -> Option<&JsValue> {
        self.object(r)?.internal.get(index)
    }

    /// Write an internal slot (ignored when out of range)
    pub fn set_internal(&mut self, r: ObjectRef, index: usize, value: JsValue) {
        if let Some(obj) = self.object_mut(r) {
            if let Some(slot) = obj.internal.get_mut(index) {
                *slot = value;
            }
        }
    }

    /// Walk the prototype chain looking for a default-indexed interceptor
    pub fn find_indexed_interceptor(&self, r: ObjectRef) -> Option<crate::value::NativeRef> {
        let mut current = Some(r);
        while let Some(cur) = current {
            let obj = self.object(cur)?;
            if let Some(desc) = obj.indexed_interceptor {
                return Some(desc);
            }
            current = obj.proto;
        }
        None
    }

    /// Array length (0 for non-arrays)
    pub fn array_len(&self, r: ObjectRef) -> usize {
        self.object(r).map(|o| o.elements.len()).unwrap_or(0)
    }

    /// Array element (undefined when out of range or not an array)
    pub fn array_get(&self, r: ObjectRef, index: usize) -> JsValue {
        self.object(r)
            .and_then(|o| o.elements.get(index).cloned())
            .unwrap_or(JsValue::Undefined)
    }

    /// Set an array element, growing the array as needed
    pub fn array_set(&mut self, r: ObjectRef, index: usize, value: JsValue) {
        if let Some(obj) = self.object_mut(r) {
            if obj.kind == ObjectKind::Array {
                if index >= obj.elements.len() {
                    obj.elements.resize(index + 1, JsValue::Undefined);
                }
                obj.elements[index] = value;
            }
        }
    }

    /// `value instanceof ctor`: true when the constructor's `prototype`
    /// property appears on the value's prototype chain.
    pub fn instance_of(&self, value: &JsValue, ctor: ObjectRef) -> bool {
        let Some(target) = self
            .object(ctor)
            .and_then(|c| c.get_own("prototype"))
            .and_then(|slot| match slot {
                PropertySlot::Data(JsValue::Object(p)) => Some(*p),
                _ => None,
            })
        else {
            return false;
        };
        let Some(start) = value.as_object() else {
            return false;
        };
        let mut current = self.object(start).and_then(|o| o.proto);
        while let Some(cur) = current {
            if cur == target {
                return true;
            }
            current = self.object(cur).and_then(|o| o.proto);
        }
        false
    }
}

impl Default for ScriptContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::NativeRef;

    #[test]
    fn test_global_exists() {
        let ctx = ScriptContext::new();
        assert!(ctx.object(ctx.global()).is_some());
    }

    #[test]
    fn test_resolve_through_prototype_chain() {
        let mut ctx = ScriptContext::new();
        let base = ctx.new_plain(None);
        ctx.define_property(base, "x", PropertySlot::Data(JsValue::Int32(7)));
        let derived = ctx.new_plain(Some(base));

        let (holder, slot) = ctx.resolve_property(derived, "x").unwrap();
        assert_eq!(holder, base);
        match slot {
            PropertySlot::Data(JsValue::Int32(7)) => {}
            other => panic!("unexpected slot: {:?}", other),
        }
        assert!(ctx.resolve_property(derived, "y").is_none());
    }

    #[test]
    fn test_internal_slots() {
        let mut ctx = ScriptContext::new();
        let mut data = ObjectData::new(ObjectKind::Plain);
        data.internal = vec![JsValue::Undefined; 2];
        let obj = ctx.alloc(data);

        assert_eq!(ctx.internal_count(obj), 2);
        ctx.set_internal(obj, 0, JsValue::External(NativeRef::from_addr(0x10)));
        assert_eq!(
            ctx.internal(obj, 0).and_then(|v| v.as_external()),
            Some(NativeRef::from_addr(0x10))
        );
        // out-of-range writes are ignored
        ctx.set_internal(obj, 5, JsValue::Int32(1));
        assert_eq!(ctx.internal_count(obj), 2);
    }

    #[test]
    fn test_array_grows_on_set() {
        let mut ctx = ScriptContext::new();
        let arr = ctx.new_array(1);
        ctx.array_set(arr, 3, JsValue::Int32(9));
        assert_eq!(ctx.array_len(arr), 4);
        assert_eq!(ctx.array_get(arr, 3), JsValue::Int32(9));
        assert_eq!(ctx.array_get(arr, 1), JsValue::Undefined);
    }

    #[test]
    fn test_instance_of() {
        let mut ctx = ScriptContext::new();
        let parent_proto = ctx.new_plain(None);
        let child_proto = ctx.new_plain(Some(parent_proto));
        let parent_ctor = ctx.new_plain(None);
        let child_ctor = ctx.new_plain(None);
        ctx.define_property(
            parent_ctor,
            "prototype",
            PropertySlot::Data(JsValue::Object(parent_proto)),
        );
        ctx.define_property(
            child_ctor,
            "prototype",
            PropertySlot::Data(JsValue::Object(child_proto)),
        );

        let instance = ctx.new_plain(Some(child_proto));
        let value = JsValue::Object(instance);
        assert!(ctx.instance_of(&value, child_ctor));
        assert!(ctx.instance_of(&value, parent_ctor));

        let other_ctor = ctx.new_plain(None);
        let other_proto = ctx.new_plain(None);
        ctx.define_property(
            other_ctor,
            "prototype",
            PropertySlot::Data(JsValue::Object(other_proto)),
        );
        assert!(!ctx.instance_of(&value, other_ctor));
    }
}
