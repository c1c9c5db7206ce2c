//! Callback dispatch and argument adapters
//!
//! Every script-triggered access to an exposed object lands here: the
//! access operations resolve the trampoline installed at materialization
//! time, package the call context into an [`Invocation`], and forward it to
//! the single host callback. The callback reads its inputs and writes a
//! result (or raises a script error) through the adapter; the dispatcher
//! then installs the return value or propagates the thrown error.

use std::rc::Rc;

use wisp_script::{
    Callable, JsValue, NativeRef, ObjectRef, PropertySlot, Thrown, TrampolineOp,
};

use crate::engine::Engine;
use crate::session::{
    ValueHandle, INDEXED_SLOT_COUNT, SLOT_CLASS, SLOT_DESCRIPTOR, SLOT_POINTER,
};

/// Which host operation an invocation carries
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CallbackKind {
    /// Method call
    Method,
    /// Property read
    PropGet,
    /// Property write
    PropSet,
    /// Field read
    FieldGet,
    /// Field write
    FieldSet,
    /// Indexed read (integer or string key)
    IndexedGet,
    /// Indexed write (integer or string key)
    IndexedSet,
}

/// Index key for indexed access
#[derive(Clone, Debug, PartialEq)]
pub enum IndexKey {
    /// Integer index
    Index(u32),
    /// String key
    Name(String),
}

/// The unified host callback. One slot serves every operation kind; the
/// adapter's [`Invocation::kind`] discriminates.
pub type HostCallback = Rc<dyn Fn(&mut Invocation<'_>)>;

/// Argument adapter passed to the host callback.
///
/// Stack-scoped: it exists only for the duration of one dispatch and must
/// not be retained past the callback. It exposes the resolved native
/// identity of the invoking object, the operation's inputs, a last-write-
/// wins return sink, and the session value-construction API so callbacks
/// can build return values.
pub struct Invocation<'e> {
    engine: &'e mut Engine,
    kind: CallbackKind,
    holder_ptr: Option<NativeRef>,
    holder_class: Option<NativeRef>,
    descriptor: Option<NativeRef>,
    name: Option<String>,
    index: Option<IndexKey>,
    args: Option<ValueHandle>,
    new_value: Option<ValueHandle>,
    ret: Option<JsValue>,
    thrown: Option<Thrown>,
}

impl<'e> Invocation<'e> {
    /// Operation kind
    pub fn kind(&self) -> CallbackKind {
        self.kind
    }

    /// Native pointer of the invoking object (absent on foreign objects
    /// and the global object)
    pub fn holder_ptr(&self) -> Option<NativeRef> {
        self.holder_ptr
    }

    /// Native class handle of the invoking object
    pub fn holder_class(&self) -> Option<NativeRef> {
        self.holder_class
    }

    /// The opaque descriptor captured at registration time: method handle,
    /// property descriptor, field handle, or indexed-property descriptor
    pub fn descriptor(&self) -> Option<NativeRef> {
        self.descriptor
    }

    /// Property or field name (property/field operations only)
    pub fn prop_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Index key (indexed operations only)
    pub fn index(&self) -> Option<&IndexKey> {
        self.index.as_ref()
    }

    /// The arguments array wrapper (method calls only). The array is
    /// session-owned, so it stays usable after the call returns.
    pub fn arguments(&self) -> Option<ValueHandle> {
        self.args
    }

    /// Number of call arguments
    pub fn arg_count(&self) -> usize {
        self.args.map(|a| self.engine.array_len(a)).unwrap_or(0)
    }

    /// One call argument, wrapped
    pub fn arg(&mut self, index: usize) -> Option<ValueHandle> {
        let args = self.args?;
        self.engine.array_get(args, index)
    }

    /// The incoming value (setter operations only), already wrapped and
    /// session-owned
    pub fn value(&self) -> Option<ValueHandle> {
        self.new_value
    }

    /// The opaque host-engine handle the engine was created with
    pub fn engine_data(&self) -> NativeRef {
        self.engine.host_data()
    }

    /// Full engine access, for callbacks that reenter script execution
    pub fn engine(&mut self) -> &mut Engine {
        self.engine
    }

    /// Set the operation's return value. May be called repeatedly; the
    /// last call wins. Ignored if the operation later throws.
    pub fn set_return(&mut self, handle: ValueHandle) {
        self.ret = Some(
            self.engine
                .resolve_handle(handle)
                .unwrap_or(JsValue::Undefined),
        );
    }

    /// Raise a plain script error. Discards any return value.
    pub fn throw_error(&mut self, message: impl Into<String>) {
        self.thrown = Some(Thrown::error(message));
    }

    /// Raise a script type error. Discards any return value.
    pub fn throw_type_error(&mut self, message: impl Into<String>) {
        self.thrown = Some(Thrown::type_error(message));
    }

    /// Construct a wrapped int32
    pub fn new_int32(&mut self, value: i32) -> Option<ValueHandle> {
        self.engine.new_int32(value)
    }

    /// Construct a wrapped number
    pub fn new_number(&mut self, value: f64) -> Option<ValueHandle> {
        self.engine.new_number(value)
    }

    /// Construct a wrapped boolean
    pub fn new_boolean(&mut self, value: bool) -> Option<ValueHandle> {
        self.engine.new_boolean(value)
    }

    /// Construct a wrapped string
    pub fn new_string(&mut self, value: &str) -> Option<ValueHandle> {
        self.engine.new_string(value)
    }

    /// Construct a wrapped array
    pub fn new_array(&mut self, length: usize) -> Option<ValueHandle> {
        self.engine.new_array(length)
    }

    /// Construct a wrapped plain object
    pub fn new_object(&mut self) -> Option<ValueHandle> {
        self.engine.new_object()
    }

    /// Wrap a native object through the identity cache
    pub fn new_native_object(&mut self, ptr: NativeRef, class: NativeRef) -> Option<ValueHandle> {
        self.engine.new_native_object(ptr, class)
    }
}

impl Engine {
    /// Resolve the two reserved slots of an object into (class, pointer).
    /// Foreign objects and missing slots resolve to absent, never an error.
    pub(crate) fn holder_identity(&self, r: ObjectRef) -> (Option<NativeRef>, Option<NativeRef>) {
        let Some(session) = self.session_ref() else {
            return (None, None);
        };
        let class = session
            .ctx
            .internal(r, SLOT_CLASS)
            .and_then(|v| v.as_external());
        let ptr = session
            .ctx
            .internal(r, SLOT_POINTER)
            .and_then(|v| v.as_external());
        (class, ptr)
    }

    /// Indexed-property descriptor from an indexed property object's third
    /// reserved slot
    fn indexed_descriptor(&self, r: ObjectRef) -> Option<NativeRef> {
        self.session_ref()?
            .ctx
            .internal(r, SLOT_DESCRIPTOR)
            .and_then(|v| v.as_external())
    }

    /// Build the adapter and invoke the host callback.
    ///
    /// With no callback registered every trampoline is a no-op yielding
    /// undefined. A thrown error discards any return value set before it.
    pub(crate) fn dispatch(
        &mut self,
        kind: CallbackKind,
        holder: Option<ObjectRef>,
        descriptor: Option<NativeRef>,
        name: Option<String>,
        index: Option<IndexKey>,
        args: Vec<JsValue>,
        incoming: Option<JsValue>,
    ) -> Result<JsValue, Thrown> {
        let Some(callback) = self.callback_slot() else {
            return Ok(JsValue::Undefined);
        };
        let (holder_class, holder_ptr) = match holder {
            Some(h) => self.holder_identity(h),
            None => (None, None),
        };
        let (args_handle, new_value) = {
            let Some(session) = self.session_mut() else {
                return Ok(JsValue::Undefined);
            };
            let args_handle = if kind == CallbackKind::Method {
                let arr = session.ctx.new_array(args.len());
                for (i, a) in args.into_iter().enumerate() {
                    session.ctx.array_set(arr, i, a);
                }
                Some(session.make_value(JsValue::Object(arr)))
            } else {
                None
            };
            let new_value = incoming.map(|v| session.make_value(v));
            (args_handle, new_value)
        };
        let mut invocation = Invocation {
            engine: self,
            kind,
            holder_ptr,
            holder_class,
            descriptor,
            name,
            index,
            args: args_handle,
            new_value,
            ret: None,
            thrown: None,
        };
        callback(&mut invocation);
        let thrown = invocation.thrown.take();
        let ret = invocation.ret.take();
        match thrown {
            Some(t) => Err(t),
            None => Ok(ret.unwrap_or(JsValue::Undefined)),
        }
    }

    /// Property read, dispatching through the installed trampolines
    pub(crate) fn get_member(&mut self, recv: &JsValue, name: &str) -> Result<JsValue, Thrown> {
        let Some(r) = recv.as_object() else {
            return Ok(JsValue::Undefined);
        };
        let (slot_count, resolved) = {
            let Some(session) = self.session_ref() else {
                return Ok(JsValue::Undefined);
            };
            (
                session.ctx.internal_count(r),
                session.ctx.resolve_property(r, name),
            )
        };
        // indexed property objects intercept every named access
        if slot_count >= INDEXED_SLOT_COUNT {
            let descriptor = self.indexed_descriptor(r);
            return self.dispatch(
                CallbackKind::IndexedGet,
                Some(r),
                descriptor,
                None,
                Some(IndexKey::Name(name.to_string())),
                Vec::new(),
                None,
            );
        }
        match resolved {
            Some((_, PropertySlot::Data(value))) => Ok(value),
            Some((_, PropertySlot::Accessor { getter, .. })) => match getter {
                Some(tr) => match tr.op {
                    TrampolineOp::PropGet => self.dispatch(
                        CallbackKind::PropGet,
                        Some(r),
                        Some(tr.data),
                        Some(name.to_string()),
                        None,
                        Vec::new(),
                        None,
                    ),
                    TrampolineOp::FieldGet => self.dispatch(
                        CallbackKind::FieldGet,
                        Some(r),
                        Some(tr.data),
                        Some(name.to_string()),
                        None,
                        Vec::new(),
                        None,
                    ),
                    TrampolineOp::IndexedObject => Ok(self.indexed_object_value(r, tr.data)),
                    _ => Ok(JsValue::Undefined),
                },
                // write-only: reads yield undefined without a callback
                None => Ok(JsValue::Undefined),
            },
            None => Ok(JsValue::Undefined),
        }
    }

    /// Property write, dispatching through the installed trampolines
    pub(crate) fn set_member(
        &mut self,
        recv: &JsValue,
        name: &str,
        value: JsValue,
    ) -> Result<(), Thrown> {
        let Some(r) = recv.as_object() else {
            return Ok(());
        };
        let (slot_count, resolved) = {
            let Some(session) = self.session_ref() else {
                return Ok(());
            };
            (
                session.ctx.internal_count(r),
                session.ctx.resolve_property(r, name),
            )
        };
        if slot_count >= INDEXED_SLOT_COUNT {
            let descriptor = self.indexed_descriptor(r);
            self.dispatch(
                CallbackKind::IndexedSet,
                Some(r),
                descriptor,
                None,
                Some(IndexKey::Name(name.to_string())),
                Vec::new(),
                Some(value),
            )?;
            return Ok(());
        }
        match resolved {
            Some((_, PropertySlot::Accessor { setter, .. })) => match setter {
                Some(tr) => {
                    let kind = match tr.op {
                        TrampolineOp::PropSet => CallbackKind::PropSet,
                        TrampolineOp::FieldSet => CallbackKind::FieldSet,
                        _ => return Ok(()),
                    };
                    self.dispatch(
                        kind,
                        Some(r),
                        Some(tr.data),
                        Some(name.to_string()),
                        None,
                        Vec::new(),
                        Some(value),
                    )?;
                    Ok(())
                }
                // read-only: writes are ignored without a callback
                None => Ok(()),
            },
            _ => {
                // plain data property (or a fresh one): script-writable
                if let Some(session) = self.session_mut() {
                    session.ctx.define_property(r, name, PropertySlot::Data(value));
                }
                Ok(())
            }
        }
    }

    /// Indexed read: the second layer of the two-step protocol, the direct
    /// default-indexed path, array elements, or plain member access for
    /// string keys.
    pub(crate) fn get_index_value(
        &mut self,
        recv: &JsValue,
        key: &IndexKey,
    ) -> Result<JsValue, Thrown> {
        let Some(r) = recv.as_object() else {
            return Ok(JsValue::Undefined);
        };
        let (slot_count, is_array, named_member) = self.index_probe(r, key);
        if slot_count >= INDEXED_SLOT_COUNT {
            let descriptor = self.indexed_descriptor(r);
            return self.dispatch(
                CallbackKind::IndexedGet,
                Some(r),
                descriptor,
                None,
                Some(key.clone()),
                Vec::new(),
                None,
            );
        }
        if is_array {
            if let IndexKey::Index(i) = key {
                let value = self
                    .session_ref()
                    .map(|s| s.ctx.array_get(r, *i as usize))
                    .unwrap_or(JsValue::Undefined);
                return Ok(value);
            }
        }
        // a string key naming a real member resolves as member access,
        // so indexed interception never shadows the class surface
        if named_member {
            if let IndexKey::Name(n) = key {
                let n = n.clone();
                return self.get_member(recv, &n);
            }
        }
        if let Some(descriptor) = self
            .session_ref()
            .and_then(|s| s.ctx.find_indexed_interceptor(r))
        {
            return self.dispatch(
                CallbackKind::IndexedGet,
                Some(r),
                Some(descriptor),
                None,
                Some(key.clone()),
                Vec::new(),
                None,
            );
        }
        if let IndexKey::Name(n) = key {
            let n = n.clone();
            return self.get_member(recv, &n);
        }
        Ok(JsValue::Undefined)
    }

    /// Indexed write, mirroring [`Engine::get_index_value`]
    pub(crate) fn set_index_value(
        &mut self,
        recv: &JsValue,
        key: &IndexKey,
        value: JsValue,
    ) -> Result<(), Thrown> {
        let Some(r) = recv.as_object() else {
            return Ok(());
        };
        let (slot_count, is_array, named_member) = self.index_probe(r, key);
        if slot_count >= INDEXED_SLOT_COUNT {
            let descriptor = self.indexed_descriptor(r);
            self.dispatch(
                CallbackKind::IndexedSet,
                Some(r),
                descriptor,
                None,
                Some(key.clone()),
                Vec::new(),
                Some(value),
            )?;
            return Ok(());
        }
        if is_array {
            if let IndexKey::Index(i) = key {
                if let Some(session) = self.session_mut() {
                    session.ctx.array_set(r, *i as usize, value);
                }
                return Ok(());
            }
        }
        if named_member {
            if let IndexKey::Name(n) = key {
                let n = n.clone();
                return self.set_member(recv, &n, value);
            }
        }
        if let Some(descriptor) = self
            .session_ref()
            .and_then(|s| s.ctx.find_indexed_interceptor(r))
        {
            self.dispatch(
                CallbackKind::IndexedSet,
                Some(r),
                Some(descriptor),
                None,
                Some(key.clone()),
                Vec::new(),
                Some(value),
            )?;
            return Ok(());
        }
        if let IndexKey::Name(n) = key {
            let n = n.clone();
            return self.set_member(recv, &n, value);
        }
        Ok(())
    }

    /// Call a callable value. Bound method trampolines dispatch to the
    /// host callback with the receiver's identity; host functions run
    /// directly against the context.
    pub(crate) fn call_value(
        &mut self,
        callee: &JsValue,
        this: &JsValue,
        args: Vec<JsValue>,
    ) -> Result<JsValue, Thrown> {
        let Some(r) = callee.as_object() else {
            return Err(Thrown::type_error(format!(
                "{} is not a function",
                callee.type_name()
            )));
        };
        let callable = self
            .session_ref()
            .and_then(|s| s.ctx.object(r))
            .and_then(|o| o.call.clone());
        match callable {
            Some(Callable::Bound(tr)) if tr.op == TrampolineOp::Method => self.dispatch(
                CallbackKind::Method,
                this.as_object(),
                Some(tr.data),
                None,
                None,
                args,
                None,
            ),
            Some(Callable::Host(f)) => {
                let Some(session) = self.session_mut() else {
                    return Ok(JsValue::Undefined);
                };
                f(&mut session.ctx, &args)
            }
            _ => Err(Thrown::type_error("object is not a function")),
        }
    }

    /// Resolve (or create) the cached indexed property object for a named
    /// indexed property. No host callback runs on this first layer.
    fn indexed_object_value(&mut self, holder: ObjectRef, descriptor: NativeRef) -> JsValue {
        let (class, ptr) = self.holder_identity(holder);
        let Some(session) = self.session_mut() else {
            return JsValue::Undefined;
        };
        let obj = session.indexed_prop_object(
            ptr.unwrap_or(NativeRef::NULL),
            class.unwrap_or(NativeRef::NULL),
            descriptor,
        );
        JsValue::Object(obj)
    }

    /// (slot count, is-array, string key resolves as member)
    fn index_probe(&self, r: ObjectRef, key: &IndexKey) -> (usize, bool, bool) {
        let Some(session) = self.session_ref() else {
            return (0, false, false);
        };
        let slot_count = session.ctx.internal_count(r);
        let is_array = session
            .ctx
            .object(r)
            .map(|o| o.kind == wisp_script::ObjectKind::Array)
            .unwrap_or(false);
        let named_member = match key {
            IndexKey::Name(n) => session.ctx.resolve_property(r, n).is_some(),
            IndexKey::Index(_) => false,
        };
        (slot_count, is_array, named_member)
    }
}
