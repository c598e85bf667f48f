//! FFI bindings for Emotion Flux
//!
//! This module provides C-compatible functions for driving an engine from other
//! languages. All functions use C strings (null-terminated) and return allocated
//! memory that must be freed by the caller using `eflux_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::config::EngineSettings;
use crate::error::InferenceError;
use crate::pipeline::EmotionEngine;
use crate::schema::LandmarkFrameAdapter;
use crate::types::ScoreEvent;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Score every face of one frame record, returning the emitted events
fn process_frame_json(engine: &mut EmotionEngine, json: &str) -> Result<String, InferenceError> {
    let frame = LandmarkFrameAdapter::parse_line(json, 1)?;
    frame
        .validate()
        .map_err(|e| InferenceError::Schema(e.to_string()))?;

    let mut events: Vec<ScoreEvent> = Vec::new();
    engine.process_faces(&frame.faces, &mut events)?;
    Ok(serde_json::to_string(&events)?)
}

// ============================================================================
// Engine API
// ============================================================================

/// Opaque handle to an EmotionEngine
pub struct EmotionEngineHandle {
    engine: EmotionEngine,
}

/// Create a new engine.
///
/// # Safety
/// - `settings_json` must be NULL (defaults) or a valid null-terminated C string
///   holding an `EngineSettings` JSON object.
/// - Returns a pointer to a newly allocated engine, to be freed with
///   `eflux_engine_free`.
/// - Returns NULL on error; call `eflux_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn eflux_engine_new(settings_json: *const c_char) -> *mut EmotionEngineHandle {
    clear_last_error();

    let engine = if settings_json.is_null() {
        Ok(EmotionEngine::new())
    } else {
        match cstr_to_string(settings_json) {
            Some(json) => EngineSettings::from_json(&json).and_then(EmotionEngine::with_settings),
            None => {
                set_last_error("Invalid settings string pointer");
                return ptr::null_mut();
            }
        }
    };

    match engine {
        Ok(engine) => Box::into_raw(Box::new(EmotionEngineHandle { engine })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free an engine.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `eflux_engine_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn eflux_engine_free(engine: *mut EmotionEngineHandle) {
    if !engine.is_null() {
        drop(Box::from_raw(engine));
    }
}

/// Parse rule text and install it, replacing the previous rules.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `eflux_engine_new`.
/// - `rules` must be a valid null-terminated C string.
/// - Returns the number of installed rules, or -1 on error. The previous rules
///   stay installed on error; call `eflux_last_error` for the message.
#[no_mangle]
pub unsafe extern "C" fn eflux_engine_load_rules(
    engine: *mut EmotionEngineHandle,
    rules: *const c_char,
) -> i32 {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }

    let handle = &mut *engine;

    let Some(text) = cstr_to_string(rules) else {
        set_last_error("Invalid rules string pointer");
        return -1;
    };

    match handle.engine.load_rules(&text) {
        Ok(set) => i32::try_from(set.len()).unwrap_or(i32::MAX),
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Process one face.landmark_frame.v1 record and return the score events as a
/// JSON array.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `eflux_engine_new`.
/// - `frame_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `eflux_free_string`.
/// - Returns NULL on error; call `eflux_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn eflux_engine_process_json(
    engine: *mut EmotionEngineHandle,
    frame_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }

    let handle = &mut *engine;

    let Some(json) = cstr_to_string(frame_json) else {
        set_last_error("Invalid JSON string pointer");
        return ptr::null_mut();
    };

    match process_frame_json(&mut handle.engine, &json) {
        Ok(result) => string_to_cstr(&result),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Save face histories to JSON.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `eflux_engine_new`.
/// - Returns a newly allocated string that must be freed with `eflux_free_string`.
/// - Returns NULL on error; call `eflux_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn eflux_engine_save_history(
    engine: *mut EmotionEngineHandle,
) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }

    let handle = &*engine;

    match handle.engine.save_history() {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Load face histories from JSON.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `eflux_engine_new`.
/// - `json` must be a valid null-terminated C string.
/// - Returns 0 on success, non-zero on error.
/// - On error, call `eflux_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn eflux_engine_load_history(
    engine: *mut EmotionEngineHandle,
    json: *const c_char,
) -> i32 {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }

    let handle = &mut *engine;

    let Some(json_str) = cstr_to_string(json) else {
        set_last_error("Invalid JSON string pointer");
        return -1;
    };

    match handle.engine.load_history(&json_str) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Emotion Flux functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by an `eflux_*` function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn eflux_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next `eflux_*` call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn eflux_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn eflux_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rules() -> CString {
        CString::new(include_str!("../data/sample_rules.txt")).unwrap()
    }

    fn sample_frame() -> CString {
        let landmarks: Vec<String> = (0..68)
            .map(|i| format!(r#"{{"x":{},"y":{}}}"#, 100 + (i * 37) % 90, 120 + (i * 53) % 110))
            .collect();
        CString::new(format!(
            r#"{{"schema_version":"face.landmark_frame.v1","frame":0,"faces":[{{"id":2,"landmarks":[{}]}}]}}"#,
            landmarks.join(",")
        ))
        .unwrap()
    }

    unsafe fn last_error() -> String {
        CStr::from_ptr(eflux_last_error()).to_str().unwrap().to_string()
    }

    #[test]
    fn test_ffi_engine_lifecycle() {
        unsafe {
            let engine = eflux_engine_new(ptr::null());
            assert!(!engine.is_null());

            assert_eq!(eflux_engine_load_rules(engine, sample_rules().as_ptr()), 8);

            let result = eflux_engine_process_json(engine, sample_frame().as_ptr());
            assert!(!result.is_null());
            let events: Vec<ScoreEvent> =
                serde_json::from_str(CStr::from_ptr(result).to_str().unwrap()).unwrap();
            assert_eq!(events.len(), 4);
            assert!(events.iter().all(|e| e.face == 2));
            eflux_free_string(result);

            // Save history and load it into a second engine
            let history = eflux_engine_save_history(engine);
            assert!(!history.is_null());

            let engine2 = eflux_engine_new(ptr::null());
            assert_eq!(eflux_engine_load_history(engine2, history), 0);

            eflux_free_string(history);
            eflux_engine_free(engine);
            eflux_engine_free(engine2);
        }
    }

    #[test]
    fn test_ffi_engine_with_settings() {
        unsafe {
            let settings = CString::new(r#"{"average": 3, "suppress_spikes": true}"#).unwrap();
            let engine = eflux_engine_new(settings.as_ptr());
            assert!(!engine.is_null());
            eflux_engine_free(engine);

            let invalid = CString::new(r#"{"average": 0}"#).unwrap();
            assert!(eflux_engine_new(invalid.as_ptr()).is_null());
            assert!(last_error().contains("averaging window"));
        }
    }

    #[test]
    fn test_ffi_error_handling() {
        unsafe {
            let engine = eflux_engine_new(ptr::null());

            let broken = CString::new("(V1 in [1, 2]) => Emotions=Happy (CF = 0.5)").unwrap();
            assert_eq!(eflux_engine_load_rules(engine, broken.as_ptr()), -1);
            assert!(last_error().contains("line 1"));

            let not_json = CString::new("not json").unwrap();
            assert!(eflux_engine_process_json(engine, not_json.as_ptr()).is_null());
            assert!(!last_error().is_empty());

            assert!(eflux_engine_process_json(ptr::null_mut(), not_json.as_ptr()).is_null());
            assert_eq!(last_error(), "Null engine pointer");

            eflux_engine_free(engine);
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = eflux_version();
            assert!(!version.is_null());

            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert!(!version_str.is_empty());
        }
    }
}
