//! Containment of per-actor and per-task faults.
//!
//! The tick loop never lets one actor or one task take the whole tick down.
//! Every unit of per-actor or per-task work runs through [`contain`], which
//! turns both `Err` returns and panics into a value the caller can log and
//! act on.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Run `work`, converting a panic into `Err(on_panic(message))`.
///
/// The closure is asserted unwind-safe: a panicking actor is forced out of
/// the world and a panicking task is reported to its failure hook, so no
/// half-updated state is observed by anyone else afterwards.
pub fn contain<T, E>(
    work: impl FnOnce() -> Result<T, E>,
    on_panic: impl FnOnce(String) -> E,
) -> Result<T, E> {
    match panic::catch_unwind(AssertUnwindSafe(work)) {
        Ok(result) => result,
        Err(payload) => Err(on_panic(panic_message(payload.as_ref()))),
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("non-string panic payload")
    }
}
