//! The worker thread loop.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError};

use tracing::{error, trace};

use super::{Phase, QueuedTask, Shared};

/// Runs tasks from the cursor until the queue stops.
///
/// The backlog lock is held only to read the in-flight task and to advance
/// the cursor, never while a task runs.
pub(super) fn run<T: QueuedTask>(shared: &Shared<T>) {
    trace!("background worker running");
    loop {
        let (id, task) = {
            let mut state = shared.lock();
            loop {
                if let Some(id) = state.current {
                    break (id, Arc::clone(&state.tasks[id]));
                }
                if state.phase != Phase::Active {
                    trace!("background worker drained, exiting");
                    state.worker_exited = true;
                    return;
                }
                state = shared
                    .wake
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| task.process())) {
            let message = panic_message(payload.as_ref());
            error!(task = %id, %message, "task panicked, background worker stopping");
            let mut state = shared.lock();
            state.fault = Some(message);
            state.worker_exited = true;
            return;
        }

        let mut state = shared.lock();
        state.current = state.tasks.next(id);
    }
}

/// Extracts the text of a panic payload.
pub(super) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("unknown panic payload")
    }
}

#[cfg(test)]
mod tests {
    use std::panic::UnwindSafe;

    use super::*;

    fn payload_of(f: impl FnOnce() + UnwindSafe) -> Box<dyn Any + Send> {
        match panic::catch_unwind(f) {
            Ok(()) => panic!("closure did not panic"),
            Err(payload) => payload,
        }
    }

    #[test]
    fn panic_message_from_str_and_string() {
        let payload = payload_of(|| panic!("static text"));
        assert_eq!(panic_message(payload.as_ref()), "static text");

        let payload = payload_of(|| panic!("formatted {}", 42));
        assert_eq!(panic_message(payload.as_ref()), "formatted 42");
    }

    #[test]
    fn panic_message_from_other_payload() {
        let payload = payload_of(|| panic::panic_any(7_u8));
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }
}
