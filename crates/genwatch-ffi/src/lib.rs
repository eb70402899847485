use std::collections::HashMap;
use std::ffi::CString;
use std::os::raw::c_char;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use genwatch_core::logging::init_tracing;
use genwatch_core::models::TaskStatus;
use genwatch_core::progress::ThreadRandom;
use genwatch_core::{
    GenerationSignals, GenwatchConfig, ProgressEstimator, ProgressPhase, polling_interval,
};
use lazy_static::lazy_static;

/// Returned by `genwatch_polling_interval_ms` when polling should stop.
pub const GENWATCH_STOP_POLLING: i64 = -1;
/// Returned by `genwatch_polling_interval_ms` for invalid input or before init.
pub const GENWATCH_INVALID: i64 = -2;

struct GenwatchState {
    config: GenwatchConfig,
    next_estimator_id: u64,
    estimators: HashMap<u64, ProgressEstimator>,
    tokio_rt: tokio::runtime::Runtime,
}

lazy_static! {
    static ref STATE: Mutex<Option<GenwatchState>> = Mutex::new(None);
}

fn lock_state() -> MutexGuard<'static, Option<GenwatchState>> {
    STATE.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Initialize the Genwatch core. Reads `GENWATCH_CONFIG` when set.
#[unsafe(no_mangle)]
pub extern "C" fn genwatch_init() -> bool {
    let mut guard = lock_state();
    if guard.is_some() {
        return true;
    }

    init_tracing();

    let config = match GenwatchConfig::load_default() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(
                kind = ?e.kind,
                message = %e.message,
                "failed to load genwatch config"
            );
            return false;
        }
    };

    let tokio_rt = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "failed to create tokio runtime");
            return false;
        }
    };

    *guard = Some(GenwatchState {
        config,
        next_estimator_id: 1,
        estimators: HashMap::new(),
        tokio_rt,
    });

    true
}

/// Polling interval in milliseconds for `generating_count` in-flight tasks,
/// `GENWATCH_STOP_POLLING` when nothing is in flight, `GENWATCH_INVALID` for
/// a negative count or an uninitialized core.
#[unsafe(no_mangle)]
pub extern "C" fn genwatch_polling_interval_ms(generating_count: i64) -> i64 {
    let guard = lock_state();
    let Some(state) = guard.as_ref() else {
        return GENWATCH_INVALID;
    };

    match polling_interval(&state.config.polling, generating_count) {
        Ok(Some(interval)) => i64::try_from(interval.as_millis()).unwrap_or(i64::MAX),
        Ok(None) => GENWATCH_STOP_POLLING,
        Err(e) => {
            tracing::warn!(
                generating_count,
                message = %e.message,
                "rejected polling interval request"
            );
            GENWATCH_INVALID
        }
    }
}

/// 1 for terminal, 0 for non-terminal, -1 for an unknown status code.
#[unsafe(no_mangle)]
pub extern "C" fn genwatch_status_is_terminal(code: i32) -> i32 {
    match TaskStatus::from_code(code) {
        Ok(status) => i32::from(status.is_terminal()),
        Err(_) => -1,
    }
}

/// Create a progress estimator. Returns its handle, or 0 on failure.
#[unsafe(no_mangle)]
pub extern "C" fn genwatch_progress_create() -> u64 {
    let mut guard = lock_state();
    let Some(state) = guard.as_mut() else {
        return 0;
    };

    let estimator = ProgressEstimator::new(
        state.config.progress,
        Arc::new(ThreadRandom),
        state.tokio_rt.handle().clone(),
    );
    let id = state.next_estimator_id;
    state.next_estimator_id = state.next_estimator_id.saturating_add(1);
    state.estimators.insert(id, estimator);
    id
}

#[unsafe(no_mangle)]
pub extern "C" fn genwatch_progress_update(
    id: u64,
    is_generating: bool,
    is_completed: bool,
) -> bool {
    let guard = lock_state();
    let Some(estimator) = guard.as_ref().and_then(|state| state.estimators.get(&id)) else {
        return false;
    };

    estimator.set_signals(GenerationSignals {
        is_generating,
        is_completed,
    });
    true
}

/// Current progress in [0, 100], or -1 for an unknown handle.
#[unsafe(no_mangle)]
pub extern "C" fn genwatch_progress_value(id: u64) -> f64 {
    let guard = lock_state();
    guard
        .as_ref()
        .and_then(|state| state.estimators.get(&id))
        .map(ProgressEstimator::progress)
        .unwrap_or(-1.0)
}

/// 0 idle, 1 running, 2 completed, -1 for an unknown handle.
#[unsafe(no_mangle)]
pub extern "C" fn genwatch_progress_phase(id: u64) -> i32 {
    let guard = lock_state();
    match guard
        .as_ref()
        .and_then(|state| state.estimators.get(&id))
        .map(ProgressEstimator::phase)
    {
        Some(ProgressPhase::Idle) => 0,
        Some(ProgressPhase::Running) => 1,
        Some(ProgressPhase::Completed) => 2,
        None => -1,
    }
}

/// Destroy an estimator, cancelling any pending progress updates.
#[unsafe(no_mangle)]
pub extern "C" fn genwatch_progress_destroy(id: u64) -> bool {
    let mut guard = lock_state();
    guard
        .as_mut()
        .and_then(|state| state.estimators.remove(&id))
        .is_some()
}

/// The active configuration as JSON. Free with `genwatch_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn genwatch_config_json() -> *mut c_char {
    let guard = lock_state();
    let config = guard
        .as_ref()
        .map(|state| state.config)
        .unwrap_or_default();

    let json = match serde_json::to_string(&config) {
        Ok(j) => j,
        Err(_) => return std::ptr::null_mut(),
    };

    match CString::new(json) {
        Ok(c) => c.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Free a string previously returned by a `genwatch_*` function.
///
/// # Safety
///
/// `s` must be a pointer previously returned by a `genwatch_*` function, or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn genwatch_free_string(s: *mut c_char) {
    if s.is_null() {
        return;
    }
    unsafe {
        let _ = CString::from_raw(s);
    }
}
