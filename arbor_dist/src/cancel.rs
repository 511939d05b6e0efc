// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Process-wide cancellation flag, polled between collectives.
//!
//! The flag is the only global state in the workspace. A signal handler (or
//! any other thread) calls [`request_cancel`], which is a single atomic
//! store and therefore async-signal-safe; the loader polls
//! [`check_signals`] at its checkpoints and unwinds with
//! [`LoadError::Cancelled`]. Collectives themselves cannot be interrupted,
//! so cancellation is only honored between them.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::LoadError;

static CANCEL_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Ask the loader to stop at its next checkpoint.
pub fn request_cancel() {
    CANCEL_REQUESTED.store(true, Ordering::Relaxed);
}

/// Clear a previously requested cancellation.
pub fn reset_cancel() {
    CANCEL_REQUESTED.store(false, Ordering::Relaxed);
}

/// Whether a cancellation has been requested.
pub fn cancel_requested() -> bool {
    CANCEL_REQUESTED.load(Ordering::Relaxed)
}

/// Checkpoint: fail with [`LoadError::Cancelled`] once a cancellation has
/// been requested.
pub fn check_signals() -> Result<(), LoadError> {
    if cancel_requested() {
        Err(LoadError::Cancelled)
    } else {
        Ok(())
    }
}

/// Tests touching the global flag (or running loaders that poll it)
/// serialize on this lock so they cannot observe each other's state.
#[cfg(test)]
pub(crate) fn signal_test_guard() -> parking_lot::MutexGuard<'static, ()> {
    static LOCK: parking_lot::Mutex<()> = parking_lot::Mutex::new(());
    LOCK.lock()
}
