//! Cooperative termination. Long running loops poll [`is_termination_requested`]
//! between iterations and return their best-effort result once it is set.

use std::sync::atomic::{AtomicBool, Ordering};

static TERMINATION_REQUESTED: AtomicBool = AtomicBool::new(false);

pub fn request_termination() {
    TERMINATION_REQUESTED.store(true, Ordering::SeqCst);
}

pub fn reset_termination() {
    TERMINATION_REQUESTED.store(false, Ordering::SeqCst);
}

#[inline]
pub fn is_termination_requested() -> bool {
    TERMINATION_REQUESTED.load(Ordering::Relaxed)
}
