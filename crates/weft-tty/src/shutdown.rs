#![forbid(unsafe_code)]

//! Runs a cancellable body under a process shutdown hook.
//!
//! The lifecycle is a straight line: install the termination-signal
//! watcher, run the body, run the hook exactly once, clear the watcher,
//! then finish any recorded signal. A signal does not preempt the body;
//! the handler records the signal number and flips the body's
//! [`ShutdownToken`], and the body is expected to notice and return.
//! Cancellation is cooperative at that level, but immediate at the OS
//! level once the hook has run: the recorded signal is re-delivered with
//! its default disposition so the process exits the way an unhandled
//! program would have (termination-by-signal status, core dump
//! eligibility), with a forced non-zero exit as the fallback if delivery
//! does not land within a short grace period.

use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::debug;
#[cfg(unix)]
use tracing::warn;

use crate::signals;

/// How long re-delivery gets to terminate the process before the forced
/// exit takes over.
const REDELIVERY_GRACE: Duration = Duration::from_millis(100);

/// Cooperative cancellation flag handed to the body of
/// [`run_with_shutdown_hook`]. Clones share the flag.
#[derive(Debug, Clone)]
pub struct ShutdownToken {
    cancelled: Arc<AtomicBool>,
}

impl ShutdownToken {
    fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// True once a termination signal has been received. Long-running
    /// bodies should poll this and return promptly when it flips.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Exactly-once wrapper for the shutdown hook.
struct HookSlot<F: FnOnce()> {
    hook: Option<F>,
}

impl<F: FnOnce()> HookSlot<F> {
    fn new(hook: F) -> Self {
        Self { hook: Some(hook) }
    }

    fn run(&mut self) {
        if let Some(hook) = self.hook.take() {
            hook();
        }
    }
}

/// Run `body` with termination signals intercepted, guaranteeing `hook`
/// runs exactly once afterwards on every path out of the body, normal
/// return or panic.
///
/// Fails fast with [`io::ErrorKind::ResourceBusy`] if another caller's
/// registration is still active; `hook` does not run in that case. After
/// the hook, the watcher is cleared (a later registration may succeed) and
/// a recorded signal, if any, is re-delivered with default disposition.
/// On that path this function does not return.
///
/// The hook runs on the calling thread, never in signal context, and
/// never concurrently with another hook.
pub fn run_with_shutdown_hook<H, B, T>(hook: H, body: B) -> io::Result<T>
where
    H: FnOnce(),
    B: FnOnce(&ShutdownToken) -> T,
{
    let token = ShutdownToken::new();
    let handler_token = token.clone();
    let watcher = signals::install(move |signo| {
        debug!(signo, "termination signal received; requesting cancellation");
        handler_token.cancel();
    })?;
    let mut hook = HookSlot::new(hook);

    let result = catch_unwind(AssertUnwindSafe(|| body(&token)));

    // Hook first, while the watcher still records late signals; a signal
    // landing during the hook still wins the re-delivery below.
    hook.run();
    watcher.close();

    match result {
        Ok(value) => {
            finish_pending_redelivery();
            Ok(value)
        }
        Err(panic) => {
            finish_pending_redelivery();
            resume_unwind(panic)
        }
    }
}

/// If a termination signal was recorded, hand the process over to it.
fn finish_pending_redelivery() {
    if let Some(signo) = signals::take_pending_signal() {
        redeliver(signo);
    }
}

#[cfg(unix)]
fn redeliver(signo: i32) -> ! {
    debug!(signo, "re-delivering termination signal");
    if let Err(e) = signal_hook::low_level::emulate_default_handler(signo) {
        warn!(signo, error = %e, "failed to re-deliver termination signal");
    }
    // Delivery can land asynchronously; give it a moment before forcing
    // the exit.
    std::thread::sleep(REDELIVERY_GRACE);
    process::exit(1)
}

#[cfg(not(unix))]
fn redeliver(signo: i32) -> ! {
    debug!(signo, "terminating after signal");
    std::thread::sleep(REDELIVERY_GRACE);
    process::exit(1)
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn token_reports_shared_cancellation() {
        let token = ShutdownToken::new();
        assert!(!token.is_cancelled());
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn hook_runs_after_a_normal_return() {
        let _slot = signals::exclusive_slot();
        let ran = Arc::new(AtomicBool::new(false));
        let hook_ran = Arc::clone(&ran);
        let value = run_with_shutdown_hook(
            move || hook_ran.store(true, Ordering::SeqCst),
            |token| {
                assert!(!token.is_cancelled());
                7
            },
        )
        .unwrap();
        assert_eq!(value, 7);
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn nested_registration_fails_without_disturbing_the_outer() {
        let _slot = signals::exclusive_slot();
        let inner = run_with_shutdown_hook(|| {}, |_| run_with_shutdown_hook(|| {}, |_| 0)).unwrap();
        assert_eq!(inner.unwrap_err().kind(), io::ErrorKind::ResourceBusy);
        // The outer registration cleared normally, so a fresh one works.
        let again = run_with_shutdown_hook(|| {}, |_| 1).unwrap();
        assert_eq!(again, 1);
    }

    #[test]
    fn hook_runs_when_the_body_panics() {
        let _slot = signals::exclusive_slot();
        let ran = Arc::new(AtomicBool::new(false));
        let hook_ran = Arc::clone(&ran);
        let result = catch_unwind(AssertUnwindSafe(|| {
            run_with_shutdown_hook(
                move || hook_ran.store(true, Ordering::SeqCst),
                |_| -> i32 { panic!("body failed") },
            )
        }));
        assert!(result.is_err());
        assert!(ran.load(Ordering::SeqCst));
        // The slot was still cleared.
        run_with_shutdown_hook(|| {}, |_| ()).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn a_signal_cancels_the_running_body() {
        let _slot = signals::exclusive_slot();
        let value = run_with_shutdown_hook(
            || {},
            |token| {
                signal_hook::low_level::raise(signal_hook::consts::signal::SIGHUP).unwrap();
                let deadline = Instant::now() + Duration::from_secs(5);
                while !token.is_cancelled() {
                    assert!(Instant::now() < deadline, "cancellation never arrived");
                    thread::sleep(Duration::from_millis(1));
                }
                // Disarm re-delivery so the test binary survives this run.
                signals::take_pending_signal();
                42
            },
        )
        .unwrap();
        assert_eq!(value, 42);
    }
}
