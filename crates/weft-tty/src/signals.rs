//! Process-wide interception of termination signals.
//!
//! Signal delivery is inherently process-global, so this module models it
//! that way: a single watcher slot guarded by an atomic compare-and-swap.
//! A second [`install`] while one watcher is active fails fast with
//! [`io::ErrorKind::ResourceBusy`]; contention here is a programming error,
//! not something to serialize.
//!
//! The signal-context work is deliberately tiny. The registered action
//! records the signal number into a last-writer-wins atomic and writes one
//! byte to a self-pipe; a dedicated watcher thread wakes on that pipe and
//! runs the caller's callback outside signal context. Nothing in the
//! action allocates, locks, or calls non-reentrant APIs.
//!
//! Clearing a watcher removes the registered actions and stops the thread.
//! The process-level trampolines `signal-hook`'s registry installs remain
//! (a documented property of that registry) and are inert while no watcher
//! is active; restoring a true default disposition happens only on the
//! re-delivery path in [`shutdown`](crate::shutdown), immediately before
//! process exit.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

#[cfg(unix)]
use std::fs::File;
#[cfg(unix)]
use std::io::Read;
#[cfg(unix)]
use std::os::fd::OwnedFd;
#[cfg(unix)]
use std::sync::Arc;
#[cfg(unix)]
use std::thread::JoinHandle;

#[cfg(unix)]
use signal_hook::consts::signal::{
    SIGABRT, SIGALRM, SIGBUS, SIGFPE, SIGHUP, SIGINT, SIGQUIT, SIGTERM,
};
#[cfg(unix)]
use signal_hook_registry::SigId;
#[cfg(unix)]
use tracing::{debug, warn};

/// Signal numbers are positive, so zero marks "none recorded".
const NO_SIGNAL: i32 = 0;

static SLOT_ACTIVE: AtomicBool = AtomicBool::new(false);
static PENDING_SIGNAL: AtomicI32 = AtomicI32::new(NO_SIGNAL);

/// The most recently recorded termination signal, if any. Multiple signals
/// racing in overwrite each other; only the last survives.
#[must_use]
pub fn pending_signal() -> Option<i32> {
    match PENDING_SIGNAL.load(Ordering::SeqCst) {
        NO_SIGNAL => None,
        signo => Some(signo),
    }
}

/// Consume the recorded signal, resetting the slot to "none".
pub(crate) fn take_pending_signal() -> Option<i32> {
    match PENDING_SIGNAL.swap(NO_SIGNAL, Ordering::SeqCst) {
        NO_SIGNAL => None,
        signo => Some(signo),
    }
}

fn slot_busy() -> io::Error {
    io::Error::new(
        io::ErrorKind::ResourceBusy,
        "a termination-signal watcher is already installed",
    )
}

// ── POSIX implementation ─────────────────────────────────────────────────

/// The termination set, installed and cleared as a unit.
#[cfg(unix)]
pub const TERMINATION_SIGNALS: [i32; 8] = [
    SIGABRT, SIGALRM, SIGBUS, SIGFPE, SIGHUP, SIGINT, SIGQUIT, SIGTERM,
];

/// Active registration for the termination set. Clearing it (explicitly via
/// [`close`](Self::close) or on drop) unregisters every action, stops the
/// watcher thread, and frees the slot for a future [`install`].
#[cfg(unix)]
#[derive(Debug)]
pub struct SignalWatcher {
    registrations: Vec<SigId>,
    wake_tx: Arc<OwnedFd>,
    closing: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

/// Install handlers for the whole termination set.
///
/// `on_signal` runs on a dedicated watcher thread, promptly after each
/// delivery, with the recorded signal number. Fails with
/// [`io::ErrorKind::ResourceBusy`] if a watcher is already active.
#[cfg(unix)]
pub fn install<F>(on_signal: F) -> io::Result<SignalWatcher>
where
    F: Fn(i32) + Send + Sync + 'static,
{
    if SLOT_ACTIVE
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Err(slot_busy());
    }
    match install_all(on_signal) {
        Ok(watcher) => Ok(watcher),
        Err(e) => {
            SLOT_ACTIVE.store(false, Ordering::SeqCst);
            Err(e)
        }
    }
}

#[cfg(unix)]
fn install_all<F>(on_signal: F) -> io::Result<SignalWatcher>
where
    F: Fn(i32) + Send + Sync + 'static,
{
    // Fresh slate: a signal recorded under a previous watcher is stale.
    PENDING_SIGNAL.store(NO_SIGNAL, Ordering::SeqCst);
    let (wake_rx, wake_tx) = nix::unistd::pipe().map_err(io::Error::other)?;
    let wake_rx = File::from(wake_rx);
    let wake_tx = Arc::new(wake_tx);

    let mut registrations = Vec::with_capacity(TERMINATION_SIGNALS.len());
    for &signo in &TERMINATION_SIGNALS {
        match register_recorder(signo, Arc::clone(&wake_tx)) {
            Ok(id) => registrations.push(id),
            Err(e) => {
                for id in registrations {
                    signal_hook_registry::unregister(id);
                }
                return Err(e);
            }
        }
    }

    let closing = Arc::new(AtomicBool::new(false));
    let thread_closing = Arc::clone(&closing);
    let spawned = std::thread::Builder::new()
        .name("weft-signals".into())
        .spawn(move || {
            let mut wake = [0u8; 8];
            loop {
                match (&wake_rx).read(&mut wake) {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(_) => break,
                }
                if thread_closing.load(Ordering::SeqCst) {
                    break;
                }
                if let Some(signo) = pending_signal() {
                    on_signal(signo);
                }
            }
        });
    let thread = match spawned {
        Ok(thread) => thread,
        Err(e) => {
            for id in registrations {
                signal_hook_registry::unregister(id);
            }
            return Err(e);
        }
    };

    debug!("termination signal handlers installed");
    Ok(SignalWatcher {
        registrations,
        wake_tx,
        closing,
        thread: Some(thread),
    })
}

/// Register the recorder action for one signal.
///
/// `signal-hook`'s checked registration refuses SIGFPE, which the
/// termination set includes, so every member goes through the registry's
/// unchecked entry point instead.
#[cfg(unix)]
#[allow(unsafe_code)]
fn register_recorder(signo: i32, wake: Arc<OwnedFd>) -> io::Result<SigId> {
    // SAFETY: the action body is one atomic store and one write(2) on a
    // pipe held open by the Arc, both async-signal-safe; it does not
    // allocate, lock, or panic.
    unsafe {
        signal_hook_registry::register_unchecked(signo, move |_: &_| {
            PENDING_SIGNAL.store(signo, Ordering::SeqCst);
            let _ = nix::unistd::write(&*wake, b"!");
        })
    }
}

#[cfg(unix)]
impl SignalWatcher {
    /// Unregister every handler, stop the watcher thread, and free the
    /// slot. Failures here are logged and otherwise ignored.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.registrations.is_empty() && self.thread.is_none() {
            return;
        }
        for id in self.registrations.drain(..) {
            signal_hook_registry::unregister(id);
        }
        self.closing.store(true, Ordering::SeqCst);
        let _ = nix::unistd::write(&*self.wake_tx, b"!");
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("signal watcher thread panicked");
            }
        }
        SLOT_ACTIVE.store(false, Ordering::SeqCst);
        debug!("termination signal handlers cleared");
    }
}

#[cfg(unix)]
impl Drop for SignalWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ── Portable implementation ──────────────────────────────────────────────
//
// Targets without POSIX signals get slot semantics only: install and clear
// behave contractually (single tenant, reusable after close) but no OS
// handler is attached, so the callback is never invoked. Windows
// console-control integration would slot in here.

#[cfg(not(unix))]
#[derive(Debug)]
pub struct SignalWatcher {
    _private: (),
}

#[cfg(not(unix))]
pub fn install<F>(_on_signal: F) -> io::Result<SignalWatcher>
where
    F: Fn(i32) + Send + Sync + 'static,
{
    if SLOT_ACTIVE
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Err(slot_busy());
    }
    PENDING_SIGNAL.store(NO_SIGNAL, Ordering::SeqCst);
    Ok(SignalWatcher { _private: () })
}

#[cfg(not(unix))]
impl SignalWatcher {
    pub fn close(self) {}
}

#[cfg(not(unix))]
impl Drop for SignalWatcher {
    fn drop(&mut self) {
        SLOT_ACTIVE.store(false, Ordering::SeqCst);
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

/// Serializes tests that exercise the process-wide slot; the handler slot
/// and `PENDING_SIGNAL` are shared across every test in this binary.
#[cfg(test)]
pub(crate) fn exclusive_slot() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, PoisonError};
    static GUARD: Mutex<()> = Mutex::new(());
    GUARD.lock().unwrap_or_else(PoisonError::into_inner)
}
