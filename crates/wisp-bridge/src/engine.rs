//! The bridge engine
//!
//! One `Engine` owns the class/enum registry, the unified host callback
//! slot, and at most one running session. Registration happens before (or
//! between) sessions; the value API is live only while a session runs.
//! The engine is deliberately single-threaded: it is bound to the thread
//! that drives script execution and is not `Send`.

use std::path::Path;
use std::rc::Rc;

use wisp_script::{
    HostFn, JsValue, NativeRef, ObjectData, ObjectKind, PropertySlot, ScriptContext, Thrown,
};

use crate::dispatch::{HostCallback, Invocation};
use crate::error::{EngineError, EngineResult, ScriptError};
use crate::eval;
use crate::platform::{self, PlatformGuard};
use crate::session::{
    NativeKey, Session, ValueHandle, WrapperKind, SLOT_CLASS, SLOT_POINTER,
};
use crate::template::{ClassRegistry, EnumId, TemplateId};

/// A named global binding of a native object, installed at session start
#[derive(Clone, Debug)]
struct GlobalLink {
    name: String,
    ptr: NativeRef,
    class: NativeRef,
}

/// The interop engine: registry, callback slot, and session lifecycle
pub struct Engine {
    host_data: NativeRef,
    registry: ClassRegistry,
    callback: Option<HostCallback>,
    pre_code: String,
    links: Vec<GlobalLink>,
    host_functions: Vec<(String, HostFn)>,
    session: Option<Session>,
    next_generation: u32,
    _platform: PlatformGuard,
}

impl Engine {
    /// Create an engine carrying an opaque host handle, returned to every
    /// callback through the adapter
    pub fn new(host_data: NativeRef) -> Self {
        Engine {
            host_data,
            registry: ClassRegistry::new(),
            callback: None,
            pre_code: String::new(),
            links: Vec::new(),
            host_functions: Vec::new(),
            session: None,
            next_generation: 0,
            _platform: platform::acquire(),
        }
    }

    /// The opaque host handle this engine was created with
    pub fn host_data(&self) -> NativeRef {
        self.host_data
    }

    // ========================================================================
    // Registration (engine-wide, outlives sessions)
    // ========================================================================

    /// Register (or replace) the global-object template
    pub fn add_global(&mut self, class: NativeRef) -> TemplateId {
        self.registry.add_global(class)
    }

    /// Register a class template under a global name
    pub fn add_object(&mut self, name: &str, class: NativeRef) -> TemplateId {
        self.registry.add_object(name, class)
    }

    /// Register an enum template
    pub fn add_enum(&mut self, name: &str) -> EnumId {
        self.registry.add_enum(name)
    }

    /// Add one (name, ordinal) pair to an enum
    pub fn enum_add_value(&mut self, id: EnumId, name: &str, ordinal: i32) {
        self.registry.enum_add_value(id, name, ordinal);
    }

    /// Register a method on a template
    pub fn set_method(&mut self, id: TemplateId, name: &str, handle: NativeRef) {
        if let Some(t) = self.registry.template_mut(id) {
            t.methods.push(crate::template::ClassMethod {
                name: name.to_string(),
                handle,
            });
        }
    }

    /// Register a property on a template
    pub fn set_property(
        &mut self,
        id: TemplateId,
        name: &str,
        handle: NativeRef,
        read: bool,
        write: bool,
    ) {
        if let Some(t) = self.registry.template_mut(id) {
            t.properties.push(crate::template::ClassProperty {
                name: name.to_string(),
                handle,
                read,
                write,
            });
        }
    }

    /// Register a named indexed property on a template
    pub fn set_indexed_property(
        &mut self,
        id: TemplateId,
        name: &str,
        handle: NativeRef,
        read: bool,
        write: bool,
    ) {
        if let Some(t) = self.registry.template_mut(id) {
            t.indexed.push(crate::template::ClassProperty {
                name: name.to_string(),
                handle,
                read,
                write,
            });
        }
    }

    /// Register the default indexed property on a template
    pub fn set_default_indexed_property(&mut self, id: TemplateId, handle: NativeRef) {
        if let Some(t) = self.registry.template_mut(id) {
            t.default_indexed = Some(handle);
        }
    }

    /// Register a field on a template
    pub fn set_field(&mut self, id: TemplateId, name: &str, handle: NativeRef) {
        if let Some(t) = self.registry.template_mut(id) {
            t.fields.push(crate::template::ClassField {
                name: name.to_string(),
                handle,
            });
        }
    }

    /// Link a template to its single parent
    pub fn set_parent(&mut self, id: TemplateId, parent: TemplateId) {
        if let Some(t) = self.registry.template_mut(id) {
            t.parent = Some(parent);
        }
    }

    /// Find the unique template for a class handle
    pub fn template_by_class(&self, class: NativeRef) -> Option<TemplateId> {
        self.registry.by_class(class)
    }

    /// Install the unified host callback
    pub fn set_callback(&mut self, callback: impl Fn(&mut Invocation<'_>) + 'static) {
        self.callback = Some(Rc::new(callback));
    }

    /// Append bootstrap script text, run once before the main script
    pub fn add_pre_code(&mut self, code: &str) {
        self.pre_code.push_str(code);
        self.pre_code.push('\n');
    }

    /// Bind a native (pointer, class) pair under a global name at session
    /// start. The binding is a plain data property: no accessor callbacks,
    /// freely overwritable by script.
    pub fn add_global_variable_object(&mut self, name: &str, ptr: NativeRef, class: NativeRef) {
        self.links.push(GlobalLink {
            name: name.to_string(),
            ptr,
            class,
        });
    }

    /// Install a script-callable global function backed by a host closure.
    /// Takes effect immediately when a session is running, and again at
    /// every subsequent start.
    pub fn set_global_function(
        &mut self,
        name: &str,
        f: impl Fn(&mut ScriptContext, &[JsValue]) -> Result<JsValue, Thrown> + 'static,
    ) {
        let f: HostFn = Rc::new(f);
        self.host_functions.push((name.to_string(), f.clone()));
        if self.session.is_some() {
            self.install_function(name, f);
        }
    }

    /// Change the process working directory
    pub fn change_working_dir(&mut self, path: impl AsRef<Path>) -> EngineResult<()> {
        std::env::set_current_dir(path)?;
        Ok(())
    }

    // ========================================================================
    // Session lifecycle
    // ========================================================================

    /// Start a session: create a fresh context, materialize all templates,
    /// bind global variables, and run accumulated pre-code.
    pub fn start(&mut self, argv: &[&str]) -> EngineResult<()> {
        if self.session.is_some() {
            return Err(EngineError::AlreadyRunning);
        }
        self.next_generation += 1;
        self.session = Some(Session::new(
            self.next_generation,
            self.registry.class_count(),
            argv.iter().map(|s| s.to_string()).collect(),
        ));
        self.materialize_context();
        for (name, f) in self.host_functions.clone() {
            self.install_function(&name, f);
        }
        self.install_global_links();
        if !self.pre_code.is_empty() {
            let code = self.pre_code.clone();
            eval::run_program(self, &code, "pre-code");
        }
        Ok(())
    }

    /// Stop the session, invalidating every wrapper and cache entry
    /// atomically. Safe to call when no session is active.
    pub fn stop(&mut self) {
        self.session = None;
    }

    /// Whether a session is active
    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    /// Launch arguments of the running session
    pub fn argv(&self) -> &[String] {
        self.session.as_ref().map(|s| s.argv.as_slice()).unwrap_or(&[])
    }

    /// Run script text under the default script name
    pub fn run_string(&mut self, code: &str) -> Option<ValueHandle> {
        self.run_string_named(code, "inline")
    }

    /// Run script text under an explicit script name; returns the wrapped
    /// value of the last statement, or nothing on error (see [`Engine::errors`])
    pub fn run_string_named(&mut self, code: &str, script: &str) -> Option<ValueHandle> {
        self.session.as_ref()?;
        let value = eval::run_program(self, code, script)?;
        self.session.as_mut().map(|s| s.make_value(value))
    }

    /// Run a script file, using its path as the script name
    pub fn run_file(&mut self, path: impl AsRef<Path>) -> EngineResult<Option<ValueHandle>> {
        if self.session.is_none() {
            return Err(EngineError::NotRunning);
        }
        let path = path.as_ref();
        let code = std::fs::read_to_string(path)?;
        Ok(self.run_string_named(&code, &path.display().to_string()))
    }

    /// Invoke a named global function. Returns nothing when the global is
    /// missing or not callable, or when the call throws (the error lands
    /// in the error list).
    pub fn call_function(&mut self, name: &str, args: &[ValueHandle]) -> Option<ValueHandle> {
        let global = self.global_value()?;
        let callee = match self.get_member(&global, name) {
            Ok(v) => v,
            Err(t) => {
                self.record_thrown(t, name);
                return None;
            }
        };
        if self.session_ref()?.classify(&callee) != WrapperKind::Function {
            return None;
        }
        let arg_values: Vec<JsValue> = args
            .iter()
            .map(|h| self.resolve_handle(*h).unwrap_or(JsValue::Undefined))
            .collect();
        match self.call_value(&callee, &global, arg_values) {
            Ok(v) => self.session.as_mut().map(|s| s.make_value(v)),
            Err(t) => {
                self.record_thrown(t, name);
                None
            }
        }
    }

    /// Script errors collected so far this session
    pub fn errors(&self) -> &[ScriptError] {
        self.session
            .as_ref()
            .map(|s| s.errors.as_slice())
            .unwrap_or(&[])
    }

    /// Clear the script-error list
    pub fn clear_errors(&mut self) {
        if let Some(s) = self.session.as_mut() {
            s.errors.clear();
        }
    }

    // ========================================================================
    // Value construction (session-active only)
    // ========================================================================

    /// Wrap an int32
    pub fn new_int32(&mut self, value: i32) -> Option<ValueHandle> {
        let s = self.session.as_mut()?;
        Some(s.make_value(JsValue::Int32(value)))
    }

    /// Wrap a number
    pub fn new_number(&mut self, value: f64) -> Option<ValueHandle> {
        let s = self.session.as_mut()?;
        Some(s.make_value(JsValue::Number(value)))
    }

    /// Wrap a boolean
    pub fn new_boolean(&mut self, value: bool) -> Option<ValueHandle> {
        let s = self.session.as_mut()?;
        Some(s.make_value(JsValue::Bool(value)))
    }

    /// Wrap a string
    pub fn new_string(&mut self, value: &str) -> Option<ValueHandle> {
        let s = self.session.as_mut()?;
        Some(s.make_value(JsValue::string(value)))
    }

    /// Create a new array of the given length
    pub fn new_array(&mut self, length: usize) -> Option<ValueHandle> {
        let s = self.session.as_mut()?;
        let arr = s.ctx.new_array(length);
        Some(s.make_value(JsValue::Object(arr)))
    }

    /// Create a new plain object
    pub fn new_object(&mut self) -> Option<ValueHandle> {
        let s = self.session.as_mut()?;
        let obj = s.ctx.new_plain(None);
        Some(s.make_value(JsValue::Object(obj)))
    }

    /// Wrap a native object through the identity cache.
    ///
    /// The single path by which native data becomes script-visible: one
    /// (pointer, class) pair maps to one script object for the session's
    /// lifetime. Unregistered classes yield nothing and create nothing.
    pub fn new_native_object(&mut self, ptr: NativeRef, class: NativeRef) -> Option<ValueHandle> {
        let key = NativeKey { ptr, class };
        if let Some(cached) = self.session.as_ref()?.native_objects.get(&key) {
            return Some(*cached);
        }
        let instance = self.instantiate_by_class(class)?;
        let session = self.session.as_mut()?;
        session
            .ctx
            .set_internal(instance, SLOT_CLASS, JsValue::External(class));
        session
            .ctx
            .set_internal(instance, SLOT_POINTER, JsValue::External(ptr));
        let handle = session.make_value(JsValue::Object(instance));
        session.native_objects.insert(key, handle);
        Some(handle)
    }

    // ========================================================================
    // Value inspection
    // ========================================================================

    /// Wrapper classification of a handle
    pub fn kind_of(&self, handle: ValueHandle) -> Option<WrapperKind> {
        self.session.as_ref()?.get(handle).map(|w| w.kind)
    }

    /// Check for undefined
    pub fn is_undefined(&self, handle: ValueHandle) -> bool {
        self.resolve_handle(handle)
            .map(|v| v.is_undefined())
            .unwrap_or(false)
    }

    /// Check for null
    pub fn is_null(&self, handle: ValueHandle) -> bool {
        self.resolve_handle(handle).map(|v| v.is_null()).unwrap_or(false)
    }

    /// Check for int32
    pub fn is_int32(&self, handle: ValueHandle) -> bool {
        self.resolve_handle(handle).map(|v| v.is_int32()).unwrap_or(false)
    }

    /// Check for any number
    pub fn is_number(&self, handle: ValueHandle) -> bool {
        self.resolve_handle(handle).map(|v| v.is_number()).unwrap_or(false)
    }

    /// Check for string
    pub fn is_string(&self, handle: ValueHandle) -> bool {
        self.resolve_handle(handle).map(|v| v.is_string()).unwrap_or(false)
    }

    /// Script-style boolean coercion
    pub fn as_bool(&self, handle: ValueHandle) -> Option<bool> {
        self.resolve_handle(handle).map(|v| v.to_boolean())
    }

    /// Script-style int32 coercion
    pub fn as_int32(&self, handle: ValueHandle) -> Option<i32> {
        self.resolve_handle(handle).map(|v| v.to_int32())
    }

    /// Script-style numeric coercion
    pub fn as_number(&self, handle: ValueHandle) -> Option<f64> {
        self.resolve_handle(handle).map(|v| v.to_number())
    }

    /// Script-style string coercion
    pub fn as_string(&self, handle: ValueHandle) -> Option<String> {
        let value = self.resolve_handle(handle)?;
        let session = self.session.as_ref()?;
        Some(match &value {
            JsValue::Undefined => "undefined".to_string(),
            JsValue::Null => "null".to_string(),
            JsValue::Bool(b) => b.to_string(),
            JsValue::Int32(i) => i.to_string(),
            JsValue::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            JsValue::String(s) => s.to_string(),
            JsValue::External(_) => "[external]".to_string(),
            JsValue::Object(r) => {
                let name = session
                    .ctx
                    .object(*r)
                    .and_then(|o| o.class_name.clone())
                    .unwrap_or_else(|| "Object".into());
                format!("[object {}]", name)
            }
        })
    }

    /// Script-side strict equality (`===`) of two wrapped values
    pub fn strict_equals(&self, a: ValueHandle, b: ValueHandle) -> bool {
        match (self.resolve_handle(a), self.resolve_handle(b)) {
            (Some(a), Some(b)) => a.strict_equals(&b),
            _ => false,
        }
    }

    /// Native pointer of a wrapped native object
    pub fn native_ptr(&self, handle: ValueHandle) -> Option<NativeRef> {
        let r = self.resolve_handle(handle)?.as_object()?;
        self.session
            .as_ref()?
            .ctx
            .internal(r, SLOT_POINTER)
            .and_then(|v| v.as_external())
    }

    /// Native class handle of a wrapped native object
    pub fn native_class(&self, handle: ValueHandle) -> Option<NativeRef> {
        let r = self.resolve_handle(handle)?.as_object()?;
        self.session
            .as_ref()?
            .ctx
            .internal(r, SLOT_CLASS)
            .and_then(|v| v.as_external())
    }

    /// `value instanceof <class name>` against a materialized constructor
    pub fn instance_of(&self, handle: ValueHandle, class_name: &str) -> bool {
        let Some(value) = self.resolve_handle(handle) else {
            return false;
        };
        let Some(session) = self.session.as_ref() else {
            return false;
        };
        let global = session.ctx.global();
        let Some((_, PropertySlot::Data(JsValue::Object(ctor)))) =
            session.ctx.resolve_property(global, class_name)
        else {
            return false;
        };
        session.ctx.instance_of(&value, ctor)
    }

    /// Read a property of a wrapped object (full trampoline semantics)
    pub fn object_get(&mut self, handle: ValueHandle, name: &str) -> Option<ValueHandle> {
        let value = self.resolve_handle(handle)?;
        match self.get_member(&value, name) {
            Ok(v) => self.session.as_mut().map(|s| s.make_value(v)),
            Err(t) => {
                self.record_thrown(t, "host-call");
                None
            }
        }
    }

    /// Write a property of a wrapped object (full trampoline semantics)
    pub fn object_set(&mut self, handle: ValueHandle, name: &str, value: ValueHandle) {
        let Some(obj) = self.resolve_handle(handle) else {
            return;
        };
        let value = self.resolve_handle(value).unwrap_or(JsValue::Undefined);
        if let Err(t) = self.set_member(&obj, name, value) {
            self.record_thrown(t, "host-call");
        }
    }

    /// Length of a wrapped array
    pub fn array_len(&self, handle: ValueHandle) -> usize {
        let Some(r) = self.resolve_handle(handle).and_then(|v| v.as_object()) else {
            return 0;
        };
        self.session
            .as_ref()
            .map(|s| s.ctx.array_len(r))
            .unwrap_or(0)
    }

    /// Element of a wrapped array, wrapped
    pub fn array_get(&mut self, handle: ValueHandle, index: usize) -> Option<ValueHandle> {
        let r = self.resolve_handle(handle)?.as_object()?;
        let session = self.session.as_mut()?;
        let value = session.ctx.array_get(r, index);
        Some(session.make_value(value))
    }

    /// Set an element of a wrapped array
    pub fn array_set(&mut self, handle: ValueHandle, index: usize, value: ValueHandle) {
        let Some(r) = self.resolve_handle(handle).and_then(|v| v.as_object()) else {
            return;
        };
        let value = self.resolve_handle(value).unwrap_or(JsValue::Undefined);
        if let Some(session) = self.session.as_mut() {
            session.ctx.array_set(r, index, value);
        }
    }

    /// Call a wrapped function with the global object as receiver
    pub fn call(&mut self, callee: ValueHandle, args: &[ValueHandle]) -> Option<ValueHandle> {
        let callee = self.resolve_handle(callee)?;
        let this = self.global_value()?;
        let arg_values: Vec<JsValue> = args
            .iter()
            .map(|h| self.resolve_handle(*h).unwrap_or(JsValue::Undefined))
            .collect();
        match self.call_value(&callee, &this, arg_values) {
            Ok(v) => self.session.as_mut().map(|s| s.make_value(v)),
            Err(t) => {
                self.record_thrown(t, "host-call");
                None
            }
        }
    }

    // ========================================================================
    // Crate-internal plumbing
    // ========================================================================

    pub(crate) fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    pub(crate) fn callback_slot(&self) -> Option<HostCallback> {
        self.callback.clone()
    }

    pub(crate) fn session_ref(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub(crate) fn session_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }

    pub(crate) fn resolve_handle(&self, handle: ValueHandle) -> Option<JsValue> {
        self.session.as_ref()?.value_of(handle)
    }

    pub(crate) fn global_value(&self) -> Option<JsValue> {
        self.session.as_ref().map(|s| JsValue::Object(s.ctx.global()))
    }

    pub(crate) fn record_error(&mut self, error: ScriptError) {
        if let Some(session) = self.session.as_mut() {
            session.errors.push(error);
        }
    }

    fn record_thrown(&mut self, thrown: Thrown, script: &str) {
        self.record_error(ScriptError {
            message: thrown.to_string(),
            script: script.to_string(),
            line: 1,
            column: 1,
        });
    }

    fn install_function(&mut self, name: &str, f: HostFn) {
        if let Some(session) = self.session.as_mut() {
            let mut data = ObjectData::new(ObjectKind::Plain);
            data.class_name = Some(Rc::from(name));
            data.call = Some(wisp_script::Callable::Host(f));
            let r = session.ctx.alloc(data);
            let global = session.ctx.global();
            session
                .ctx
                .define_property(global, name, PropertySlot::Data(JsValue::Object(r)));
        }
    }

    fn install_global_links(&mut self) {
        let links = self.links.clone();
        for link in links {
            let Some(handle) = self.new_native_object(link.ptr, link.class) else {
                continue;
            };
            let Some(value) = self.resolve_handle(handle) else {
                continue;
            };
            if let Some(session) = self.session.as_mut() {
                let global = session.ctx.global();
                session
                    .ctx
                    .define_property(global, &link.name, PropertySlot::Data(value));
            }
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new(NativeRef::NULL)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("host_data", &self.host_data)
            .field("classes", &self.registry.class_count())
            .field("running", &self.session.is_some())
            .finish()
    }
}
