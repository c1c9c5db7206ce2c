//! C FFI bindings for the Wisp bridge
//!
//! Hands an engine instance to a host process through a C-compatible
//! surface: opaque pointers, null-checked arguments, and manual memory
//! management. Registration and session control are exposed flatly; the
//! host callback itself is a Rust-side concern (see `wisp-bridge`), since
//! the adapter API is not ABI-stable.
//!
//! The engine is single-threaded by construction: every function here must
//! be called from the thread that created the engine.

use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::ptr;

use wisp_bridge::{Engine, TemplateId};
use wisp_script::NativeRef;

/// Opaque handle to a bridge engine
#[repr(C)]
pub struct WispEngine {
    _private: [u8; 0],
}

// Internal representation (not exposed to C)
struct EngineHandle {
    engine: Engine,
    templates: Vec<TemplateId>,
}

unsafe fn handle_mut<'a>(engine: *mut WispEngine) -> Option<&'a mut EngineHandle> {
    (engine as *mut EngineHandle).as_mut()
}

unsafe fn c_str<'a>(s: *const c_char) -> Option<&'a str> {
    if s.is_null() {
        return None;
    }
    CStr::from_ptr(s).to_str().ok()
}

/// Create a new engine carrying an opaque host pointer.
///
/// # Safety
/// The returned engine must be freed with `wisp_engine_free()` on the
/// creating thread.
#[no_mangle]
pub unsafe extern "C" fn wisp_engine_new(host_data: *mut c_void) -> *mut WispEngine {
    let handle = Box::new(EngineHandle {
        engine: Engine::new(NativeRef::from_ptr(host_data)),
        templates: Vec::new(),
    });
    Box::into_raw(handle) as *mut WispEngine
}

/// Destroy an engine and release every session resource.
///
/// # Safety
/// The pointer must come from `wisp_engine_new()` and must not be used
/// afterwards. NULL is ignored.
#[no_mangle]
pub unsafe extern "C" fn wisp_engine_free(engine: *mut WispEngine) {
    if engine.is_null() {
        return;
    }
    drop(Box::from_raw(engine as *mut EngineHandle));
}

/// Register a class template. Returns a template id for the `wisp_engine_set_*`
/// calls, or -1 on invalid arguments.
///
/// # Safety
/// `engine` must be valid; `name` must be a null-terminated UTF-8 string.
#[no_mangle]
pub unsafe extern "C" fn wisp_engine_add_object(
    engine: *mut WispEngine,
    name: *const c_char,
    class: *mut c_void,
) -> c_int {
    let (Some(handle), Some(name)) = (handle_mut(engine), c_str(name)) else {
        return -1;
    };
    let id = handle.engine.add_object(name, NativeRef::from_ptr(class));
    handle.templates.push(id);
    (handle.templates.len() - 1) as c_int
}

/// Register (or replace) the global-object template. Returns a template id.
///
/// # Safety
/// `engine` must be valid.
#[no_mangle]
pub unsafe extern "C" fn wisp_engine_add_global(
    engine: *mut WispEngine,
    class: *mut c_void,
) -> c_int {
    let Some(handle) = handle_mut(engine) else {
        return -1;
    };
    let id = handle.engine.add_global(NativeRef::from_ptr(class));
    handle.templates.push(id);
    (handle.templates.len() - 1) as c_int
}

/// Register a method on a template.
///
/// # Safety
/// `engine` must be valid; `name` must be a null-terminated UTF-8 string.
#[no_mangle]
pub unsafe extern "C" fn wisp_engine_set_method(
    engine: *mut WispEngine,
    template: c_int,
    name: *const c_char,
    method: *mut c_void,
) {
    let (Some(handle), Some(name)) = (handle_mut(engine), c_str(name)) else {
        return;
    };
    if let Some(id) = handle.templates.get(template as usize).copied() {
        handle.engine.set_method(id, name, NativeRef::from_ptr(method));
    }
}

/// Register a property on a template.
///
/// # Safety
/// `engine` must be valid; `name` must be a null-terminated UTF-8 string.
#[no_mangle]
pub unsafe extern "C" fn wisp_engine_set_property(
    engine: *mut WispEngine,
    template: c_int,
    name: *const c_char,
    prop: *mut c_void,
    read: c_int,
    write: c_int,
) {
    let (Some(handle), Some(name)) = (handle_mut(engine), c_str(name)) else {
        return;
    };
    if let Some(id) = handle.templates.get(template as usize).copied() {
        handle
            .engine
            .set_property(id, name, NativeRef::from_ptr(prop), read != 0, write != 0);
    }
}

/// Bind a native object under a global name at session start.
///
/// # Safety
/// `engine` must be valid; `name` must be a null-terminated UTF-8 string.
#[no_mangle]
pub unsafe extern "C" fn wisp_engine_add_global_variable(
    engine: *mut WispEngine,
    name: *const c_char,
    object: *mut c_void,
    class: *mut c_void,
) {
    let (Some(handle), Some(name)) = (handle_mut(engine), c_str(name)) else {
        return;
    };
    handle.engine.add_global_variable_object(
        name,
        NativeRef::from_ptr(object),
        NativeRef::from_ptr(class),
    );
}

/// Append bootstrap script text run before the main script.
///
/// # Safety
/// `engine` must be valid; `code` must be a null-terminated UTF-8 string.
#[no_mangle]
pub unsafe extern "C" fn wisp_engine_add_pre_code(engine: *mut WispEngine, code: *const c_char) {
    let (Some(handle), Some(code)) = (handle_mut(engine), c_str(code)) else {
        return;
    };
    handle.engine.add_pre_code(code);
}

/// Start a session. Returns 0 on success, -1 if already running.
///
/// # Safety
/// `engine` must be valid.
#[no_mangle]
pub unsafe extern "C" fn wisp_engine_start(engine: *mut WispEngine) -> c_int {
    let Some(handle) = handle_mut(engine) else {
        return -1;
    };
    match handle.engine.start(&[]) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

/// Stop the session. Idempotent; NULL is ignored.
///
/// # Safety
/// `engine` must be valid or NULL.
#[no_mangle]
pub unsafe extern "C" fn wisp_engine_stop(engine: *mut WispEngine) {
    if let Some(handle) = handle_mut(engine) {
        handle.engine.stop();
    }
}

/// Whether a session is active (1) or not (0).
///
/// # Safety
/// `engine` must be valid or NULL.
#[no_mangle]
pub unsafe extern "C" fn wisp_engine_is_running(engine: *mut WispEngine) -> c_int {
    match handle_mut(engine) {
        Some(handle) if handle.engine.is_running() => 1,
        _ => 0,
    }
}

/// Run script text. Returns 0 when evaluation completed, -1 on script
/// error (inspect the error list) or invalid arguments.
///
/// # Safety
/// `engine` must be valid; `code` must be a null-terminated UTF-8 string.
#[no_mangle]
pub unsafe extern "C" fn wisp_engine_run_string(
    engine: *mut WispEngine,
    code: *const c_char,
) -> c_int {
    let (Some(handle), Some(code)) = (handle_mut(engine), c_str(code)) else {
        return -1;
    };
    match handle.engine.run_string(code) {
        Some(_) => 0,
        None => -1,
    }
}

/// Number of collected script errors.
///
/// # Safety
/// `engine` must be valid or NULL.
#[no_mangle]
pub unsafe extern "C" fn wisp_engine_error_count(engine: *mut WispEngine) -> usize {
    handle_mut(engine)
        .map(|h| h.engine.errors().len())
        .unwrap_or(0)
}

/// Message of one collected script error, or NULL when out of range.
///
/// # Safety
/// `engine` must be valid. The returned string must be freed with
/// `wisp_string_free()`.
#[no_mangle]
pub unsafe extern "C" fn wisp_engine_error_message(
    engine: *mut WispEngine,
    index: usize,
) -> *mut c_char {
    let Some(handle) = handle_mut(engine) else {
        return ptr::null_mut();
    };
    let Some(error) = handle.engine.errors().get(index) else {
        return ptr::null_mut();
    };
    match CString::new(error.to_string()) {
        Ok(s) => s.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Clear the script-error list.
///
/// # Safety
/// `engine` must be valid or NULL.
#[no_mangle]
pub unsafe extern "C" fn wisp_engine_clear_errors(engine: *mut WispEngine) {
    if let Some(handle) = handle_mut(engine) {
        handle.engine.clear_errors();
    }
}

/// Free a string returned by this API.
///
/// # Safety
/// The pointer must come from this API and must not be used afterwards.
/// NULL is ignored.
#[no_mangle]
pub unsafe extern "C" fn wisp_string_free(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

/// Bridge version string (static, do not free).
///
/// # Safety
/// Always safe to call.
#[no_mangle]
pub unsafe extern "C" fn wisp_version() -> *const c_char {
    static VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_lifecycle() {
        unsafe {
            let engine = wisp_engine_new(ptr::null_mut());
            assert!(!engine.is_null());
            assert_eq!(wisp_engine_is_running(engine), 0);

            assert_eq!(wisp_engine_start(engine), 0);
            assert_eq!(wisp_engine_is_running(engine), 1);
            // double start fails, session keeps running
            assert_eq!(wisp_engine_start(engine), -1);

            wisp_engine_stop(engine);
            assert_eq!(wisp_engine_is_running(engine), 0);
            wisp_engine_free(engine);
        }
    }

    #[test]
    fn test_run_string_and_errors() {
        unsafe {
            let engine = wisp_engine_new(ptr::null_mut());
            assert_eq!(wisp_engine_start(engine), 0);

            let ok = wisp_engine_run_string(engine, b"x = 1; x\0".as_ptr() as *const c_char);
            assert_eq!(ok, 0);
            assert_eq!(wisp_engine_error_count(engine), 0);

            let bad = wisp_engine_run_string(engine, b"@\0".as_ptr() as *const c_char);
            assert_eq!(bad, -1);
            assert_eq!(wisp_engine_error_count(engine), 1);

            let message = wisp_engine_error_message(engine, 0);
            assert!(!message.is_null());
            wisp_string_free(message);

            wisp_engine_clear_errors(engine);
            assert_eq!(wisp_engine_error_count(engine), 0);
            wisp_engine_free(engine);
        }
    }

    #[test]
    fn test_registration_surface() {
        unsafe {
            let engine = wisp_engine_new(ptr::null_mut());
            let template = wisp_engine_add_object(
                engine,
                b"Point\0".as_ptr() as *const c_char,
                0x1000 as *mut c_void,
            );
            assert!(template >= 0);
            wisp_engine_set_property(
                engine,
                template,
                b"X\0".as_ptr() as *const c_char,
                0x1001 as *mut c_void,
                1,
                1,
            );
            wisp_engine_add_global_variable(
                engine,
                b"p\0".as_ptr() as *const c_char,
                0xA000 as *mut c_void,
                0x1000 as *mut c_void,
            );
            assert_eq!(wisp_engine_start(engine), 0);

            // no callback registered: property reads are undefined, not errors
            let ok = wisp_engine_run_string(engine, b"p.X\0".as_ptr() as *const c_char);
            assert_eq!(ok, 0);
            assert_eq!(wisp_engine_error_count(engine), 0);
            wisp_engine_free(engine);
        }
    }

    #[test]
    fn test_null_arguments_are_rejected() {
        unsafe {
            assert_eq!(wisp_engine_start(ptr::null_mut()), -1);
            assert_eq!(wisp_engine_error_count(ptr::null_mut()), 0);
            assert_eq!(
                wisp_engine_run_string(ptr::null_mut(), b"x\0".as_ptr() as *const c_char),
                -1
            );
            wisp_engine_stop(ptr::null_mut());
            wisp_engine_free(ptr::null_mut());
            wisp_string_free(ptr::null_mut());
        }
    }

    #[test]
    fn test_version() {
        unsafe {
            let version = wisp_version();
            assert!(!version.is_null());
            assert!(!CStr::from_ptr(version).to_str().unwrap().is_empty());
        }
    }
}
