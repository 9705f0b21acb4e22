//! FFI bindings for Habit Flux
//!
//! This module provides C-compatible functions for calling Flux from other languages.
//! All functions use C strings (null-terminated) and return allocated memory that
//! must be freed by the caller using `habit_flux_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use chrono::Utc;

use crate::config::EngineConfig;
use crate::encoder::ReportKind;
use crate::error::EngineError;
use crate::pipeline::{
    analytics_report_json, badge_report_json, level_report_json, streak_report_json, CheckIn,
    HabitTracker,
};
use crate::progression::ProgressionEngine;
use crate::store::MemoryStore;
use crate::types::Habit;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
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

/// Read a required string argument, recording an error when it is missing
unsafe fn required_arg(ptr: *const c_char, name: &str) -> Option<String> {
    let value = cstr_to_string(ptr);
    if value.is_none() {
        set_last_error(&format!("Invalid {name} string pointer"));
    }
    value
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Hand a result to the caller: a new string, or NULL plus last error
fn respond(result: Result<String, EngineError>) -> *mut c_char {
    match result {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Compute streaks for every habit in a JSON event array.
///
/// # Safety
/// - `events_json` and `as_of` must be valid null-terminated C strings.
/// - `habits_json` may be NULL; otherwise a JSON array of habits.
/// - Returns a newly allocated string that must be freed with `habit_flux_free_string`.
/// - Returns NULL on error; call `habit_flux_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn habit_flux_compute_streak(
    events_json: *const c_char,
    habits_json: *const c_char,
    as_of: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let Some(events) = required_arg(events_json, "events JSON") else {
        return ptr::null_mut();
    };
    let Some(as_of) = required_arg(as_of, "as_of") else {
        return ptr::null_mut();
    };
    let habits = cstr_to_string(habits_json);

    respond(streak_report_json(&events, habits.as_deref(), &as_of))
}

/// Aggregate analytics over an inclusive date window.
///
/// # Safety
/// - All arguments must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `habit_flux_free_string`.
/// - Returns NULL on error; call `habit_flux_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn habit_flux_aggregate(
    habits_json: *const c_char,
    events_json: *const c_char,
    start: *const c_char,
    end: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let Some(habits) = required_arg(habits_json, "habits JSON") else {
        return ptr::null_mut();
    };
    let Some(events) = required_arg(events_json, "events JSON") else {
        return ptr::null_mut();
    };
    let Some(start) = required_arg(start, "start") else {
        return ptr::null_mut();
    };
    let Some(end) = required_arg(end, "end") else {
        return ptr::null_mut();
    };

    respond(analytics_report_json(&habits, &events, &start, &end))
}

/// Level reached with `xp` cumulative XP on the default curve.
#[no_mangle]
pub extern "C" fn habit_flux_level_for_xp(xp: u64) -> u32 {
    ProgressionEngine::default().level_for_xp(xp)
}

/// Level progress report for `xp` cumulative XP.
///
/// # Safety
/// - Returns a newly allocated string that must be freed with `habit_flux_free_string`.
/// - Returns NULL on error; call `habit_flux_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn habit_flux_level_progress(xp: u64) -> *mut c_char {
    clear_last_error();
    respond(level_report_json(xp))
}

/// Evaluate badges for a JSON badge request.
///
/// # Safety
/// - `request_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `habit_flux_free_string`.
/// - Returns NULL on error; call `habit_flux_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn habit_flux_evaluate_badges(request_json: *const c_char) -> *mut c_char {
    clear_last_error();

    let Some(request) = required_arg(request_json, "request JSON") else {
        return ptr::null_mut();
    };

    respond(badge_report_json(&request))
}

// ============================================================================
// Stateful Tracker API
// ============================================================================

/// Opaque handle to an in-memory HabitTracker
pub struct HabitFluxTracker {
    tracker: HabitTracker<MemoryStore>,
}

/// Create a new tracker with an empty in-memory store.
///
/// # Safety
/// - `config_toml` may be NULL for defaults; otherwise a TOML document.
/// - Returns a pointer to a newly allocated tracker.
/// - Must be freed with `habit_flux_tracker_free`.
/// - Returns NULL on error.
#[no_mangle]
pub unsafe extern "C" fn habit_flux_tracker_new(config_toml: *const c_char) -> *mut HabitFluxTracker {
    clear_last_error();

    let config = match cstr_to_string(config_toml) {
        Some(toml) => match EngineConfig::from_toml_str(&toml) {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        },
        None => EngineConfig::default(),
    };

    let tracker = HabitTracker::with_config(MemoryStore::new(), config);
    Box::into_raw(Box::new(HabitFluxTracker { tracker }))
}

/// Free a tracker.
///
/// # Safety
/// - `tracker` must be a valid pointer returned by `habit_flux_tracker_new`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn habit_flux_tracker_free(tracker: *mut HabitFluxTracker) {
    if !tracker.is_null() {
        drop(Box::from_raw(tracker));
    }
}

/// Register a user, returning their progress record.
///
/// # Safety
/// - `tracker` must be a valid pointer returned by `habit_flux_tracker_new`.
/// - `user_id` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `habit_flux_free_string`.
/// - Returns NULL on error; call `habit_flux_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn habit_flux_tracker_register_user(
    tracker: *mut HabitFluxTracker,
    user_id: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if tracker.is_null() {
        set_last_error("Null tracker pointer");
        return ptr::null_mut();
    }
    let handle = &*tracker;

    let Some(user_id) = required_arg(user_id, "user_id") else {
        return ptr::null_mut();
    };

    respond(
        handle
            .tracker
            .register_user(&user_id)
            .and_then(|progress| serde_json::to_string(&progress).map_err(EngineError::from)),
    )
}

/// Register a habit given as JSON.
///
/// # Safety
/// - `tracker` must be a valid pointer returned by `habit_flux_tracker_new`.
/// - `habit_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `habit_flux_free_string`.
/// - Returns NULL on error; call `habit_flux_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn habit_flux_tracker_register_habit(
    tracker: *mut HabitFluxTracker,
    habit_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if tracker.is_null() {
        set_last_error("Null tracker pointer");
        return ptr::null_mut();
    }
    let handle = &*tracker;

    let Some(habit_json) = required_arg(habit_json, "habit JSON") else {
        return ptr::null_mut();
    };

    let result = serde_json::from_str::<Habit>(&habit_json)
        .map_err(EngineError::from)
        .and_then(|habit| handle.tracker.register_habit(habit))
        .and_then(|registration| {
            handle
                .tracker
                .encoder()
                .encode_to_json(ReportKind::Habit, &registration)
        });
    respond(result)
}

/// Apply a check-in given as JSON, stamped with the current time.
///
/// # Safety
/// - `tracker` must be a valid pointer returned by `habit_flux_tracker_new`.
/// - `user_id`, `habit_id` and `check_in_json` must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `habit_flux_free_string`.
/// - Returns NULL on error; call `habit_flux_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn habit_flux_tracker_check_in(
    tracker: *mut HabitFluxTracker,
    user_id: *const c_char,
    habit_id: *const c_char,
    check_in_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if tracker.is_null() {
        set_last_error("Null tracker pointer");
        return ptr::null_mut();
    }
    let handle = &*tracker;

    let Some(user_id) = required_arg(user_id, "user_id") else {
        return ptr::null_mut();
    };
    let Some(habit_id) = required_arg(habit_id, "habit_id") else {
        return ptr::null_mut();
    };
    let Some(check_in_json) = required_arg(check_in_json, "check-in JSON") else {
        return ptr::null_mut();
    };

    let result = serde_json::from_str::<CheckIn>(&check_in_json)
        .map_err(EngineError::from)
        .and_then(|check_in| {
            handle
                .tracker
                .check_in(&user_id, &habit_id, check_in, Utc::now())
        })
        .and_then(|outcome| {
            handle
                .tracker
                .encoder()
                .encode_to_json(ReportKind::CheckIn, &outcome)
        });
    respond(result)
}

/// Save the tracker's store to JSON.
///
/// # Safety
/// - `tracker` must be a valid pointer returned by `habit_flux_tracker_new`.
/// - Returns a newly allocated string that must be freed with `habit_flux_free_string`.
/// - Returns NULL on error; call `habit_flux_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn habit_flux_tracker_save(tracker: *mut HabitFluxTracker) -> *mut c_char {
    clear_last_error();

    if tracker.is_null() {
        set_last_error("Null tracker pointer");
        return ptr::null_mut();
    }
    let handle = &*tracker;

    respond(handle.tracker.save_snapshot())
}

/// Replace the tracker's store with a JSON snapshot.
///
/// # Safety
/// - `tracker` must be a valid pointer returned by `habit_flux_tracker_new`.
/// - `json` must be a valid null-terminated C string.
/// - Returns 0 on success, non-zero on error.
/// - On error, call `habit_flux_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn habit_flux_tracker_load(
    tracker: *mut HabitFluxTracker,
    json: *const c_char,
) -> i32 {
    clear_last_error();

    if tracker.is_null() {
        set_last_error("Null tracker pointer");
        return -1;
    }
    let handle = &mut *tracker;

    let Some(json) = required_arg(json, "JSON") else {
        return -1;
    };

    match handle.tracker.load_snapshot(&json) {
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

/// Free a string returned by Flux functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Flux function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn habit_flux_free_string(ptr: *mut c_char) {
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
/// - The returned pointer is valid until the next Flux function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn habit_flux_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the Flux library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn habit_flux_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    fn take_string(ptr: *mut c_char) -> String {
        assert!(!ptr.is_null());
        unsafe {
            let s = CStr::from_ptr(ptr).to_str().unwrap().to_string();
            habit_flux_free_string(ptr);
            s
        }
    }

    #[test]
    fn test_ffi_compute_streak() {
        let events = CString::new(
            r#"[{"habit_id": "h1", "date": "2024-01-01", "status": "completed"},
                {"habit_id": "h1", "date": "2024-01-02", "status": "completed"}]"#,
        )
        .unwrap();
        let as_of = CString::new("2024-01-02").unwrap();

        let result = unsafe {
            habit_flux_compute_streak(events.as_ptr(), ptr::null(), as_of.as_ptr())
        };
        let value: serde_json::Value = serde_json::from_str(&take_string(result)).unwrap();
        assert_eq!(value["body"][0]["current"], 2);
    }

    #[test]
    fn test_ffi_level_for_xp() {
        assert_eq!(habit_flux_level_for_xp(0), 1);
        assert_eq!(habit_flux_level_for_xp(100), 2);
        assert_eq!(habit_flux_level_for_xp(300), 3);

        let report = take_string(unsafe { habit_flux_level_progress(150) });
        assert!(report.contains("\"next_level_xp\": 300"));

        assert!(habit_flux_level_for_xp(u64::MAX) > 1);
        let report = take_string(unsafe { habit_flux_level_progress(u64::MAX) });
        assert!(report.contains("\"kind\": \"level\""));
    }

    #[test]
    fn test_ffi_tracker_lifecycle() {
        unsafe {
            let tracker = habit_flux_tracker_new(ptr::null());
            assert!(!tracker.is_null());

            let user = CString::new("u1").unwrap();
            take_string(habit_flux_tracker_register_user(tracker, user.as_ptr()));

            let habit = CString::new(r#"{"id": "h1", "owner": "u1", "name": "Read"}"#).unwrap();
            take_string(habit_flux_tracker_register_habit(tracker, habit.as_ptr()));

            let habit_id = CString::new("h1").unwrap();
            let check_in = CString::new(r#"{"date": "2024-01-01"}"#).unwrap();
            let outcome = take_string(habit_flux_tracker_check_in(
                tracker,
                user.as_ptr(),
                habit_id.as_ptr(),
                check_in.as_ptr(),
            ));
            let value: serde_json::Value = serde_json::from_str(&outcome).unwrap();
            assert_eq!(value["kind"], "check_in");
            assert_eq!(value["body"]["xp_awarded"], 10);

            // Save and load into a new tracker
            let snapshot = habit_flux_tracker_save(tracker);
            assert!(!snapshot.is_null());

            let tracker2 = habit_flux_tracker_new(ptr::null());
            assert_eq!(habit_flux_tracker_load(tracker2, snapshot), 0);

            habit_flux_free_string(snapshot);
            habit_flux_tracker_free(tracker);
            habit_flux_tracker_free(tracker2);
        }
    }

    #[test]
    fn test_ffi_error_handling() {
        unsafe {
            let invalid_json = CString::new("not json").unwrap();
            let result = habit_flux_evaluate_badges(invalid_json.as_ptr());
            assert!(result.is_null());

            let error = habit_flux_last_error();
            assert!(!error.is_null());
            let error_str = CStr::from_ptr(error).to_str().unwrap();
            assert!(!error_str.is_empty());

            let bad_config = CString::new("[progression\n").unwrap();
            assert!(habit_flux_tracker_new(bad_config.as_ptr()).is_null());

            assert!(habit_flux_tracker_save(ptr::null_mut()).is_null());
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = habit_flux_version();
            assert!(!version.is_null());

            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert!(!version_str.is_empty());
        }
    }
}
