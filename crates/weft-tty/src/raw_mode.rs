#![forbid(unsafe_code)]

//! Raw mode control for the controlling terminal.
//!
//! Two surfaces over the same state:
//!
//! - [`enable_raw_mode`] returns a [`RawModeHandle`] that owns the termios
//!   snapshot. `close` restores it exactly once; dropping an unclosed handle
//!   restores best-effort. The handle is `Send`, so a shutdown hook running
//!   on another thread can close it.
//! - The free functions [`save`] / [`set_raw_mode`] / [`restore`] operate on
//!   a single process-wide snapshot slot. Two independent sessions through
//!   this surface are unsupported by design: the second `save` overwrites
//!   the first snapshot.
//!
//! Raw mode disables echo, canonical (line) input, keyboard signal
//! generation, and output post-processing, with reads delivering single
//! bytes (`VMIN=1`, `VTIME=0`). Re-entering raw mode while already raw is
//! allowed and simply re-applies the settings.

use std::io;

#[cfg(unix)]
use std::fs::File;
#[cfg(unix)]
use std::sync::{Mutex, MutexGuard, PoisonError};

#[cfg(unix)]
use nix::sys::termios::{self, SetArg, Termios};
#[cfg(unix)]
use tracing::debug;

// ── POSIX implementation ─────────────────────────────────────────────────

/// Terminal attributes saved by [`enable_raw_mode`].
///
/// Restores them on [`close`](RawModeHandle::close) or, best-effort, on
/// drop. Closing consumes the handle, so restoring twice through it is
/// unrepresentable.
#[cfg(unix)]
#[derive(Debug)]
pub struct RawModeHandle {
    state: Option<SavedTermios>,
}

#[cfg(unix)]
#[derive(Debug)]
struct SavedTermios {
    original: Termios,
    tty: File,
}

#[cfg(unix)]
impl SavedTermios {
    fn restore(&self) -> nix::Result<()> {
        termios::tcsetattr(&self.tty, SetArg::TCSAFLUSH, &self.original)
    }
}

/// Put the controlling terminal into raw mode.
///
/// Snapshots the current attributes first; the returned handle restores
/// them. Failure to take the snapshot or apply raw mode is fatal to the
/// caller (resource exhaustion or a terminal that cannot be configured);
/// a failed apply restores the snapshot best-effort before returning.
#[cfg(unix)]
pub fn enable_raw_mode() -> io::Result<RawModeHandle> {
    let tty = File::open("/dev/tty")?;
    let original = termios::tcgetattr(&tty).map_err(io::Error::other)?;

    let mut raw = original.clone();
    termios::cfmakeraw(&mut raw);
    if let Err(e) = termios::tcsetattr(&tty, SetArg::TCSAFLUSH, &raw) {
        let _ = termios::tcsetattr(&tty, SetArg::TCSAFLUSH, &original);
        return Err(io::Error::other(e));
    }
    debug!("entered raw mode");

    Ok(RawModeHandle {
        state: Some(SavedTermios { original, tty }),
    })
}

#[cfg(unix)]
impl RawModeHandle {
    /// Restore the snapshotted attributes.
    ///
    /// A restore failure leaves the terminal in an unknown state; callers
    /// must treat it as fatal to terminal usability rather than retry.
    pub fn close(mut self) -> io::Result<()> {
        match self.state.take() {
            Some(state) => {
                state.restore().map_err(io::Error::other)?;
                debug!("restored terminal attributes");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[cfg(unix)]
impl Drop for RawModeHandle {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            // Best-effort restore; ignore errors during cleanup.
            let _ = state.restore();
        }
    }
}

#[cfg(unix)]
static SAVED_STATE: Mutex<Option<Termios>> = Mutex::new(None);

#[cfg(unix)]
fn saved_state() -> MutexGuard<'static, Option<Termios>> {
    // The slot is single-tenant; the mutex is storage, not serialization.
    SAVED_STATE.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Snapshot stdin's terminal attributes into the process-wide slot.
#[cfg(unix)]
pub fn save() -> io::Result<()> {
    let snapshot = termios::tcgetattr(io::stdin()).map_err(io::Error::other)?;
    *saved_state() = Some(snapshot);
    Ok(())
}

/// Apply raw mode to stdin's terminal.
#[cfg(unix)]
pub fn set_raw_mode() -> io::Result<()> {
    let mut raw = termios::tcgetattr(io::stdin()).map_err(io::Error::other)?;
    termios::cfmakeraw(&mut raw);
    termios::tcsetattr(io::stdin(), SetArg::TCSAFLUSH, &raw).map_err(io::Error::other)?;
    debug!("entered raw mode (process-wide slot)");
    Ok(())
}

/// Restore the attributes snapshotted by [`save`], emptying the slot.
#[cfg(unix)]
pub fn restore() -> io::Result<()> {
    let Some(snapshot) = saved_state().take() else {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            "no saved terminal state to restore",
        ));
    };
    termios::tcsetattr(io::stdin(), SetArg::TCSAFLUSH, &snapshot).map_err(io::Error::other)?;
    debug!("restored terminal attributes (process-wide slot)");
    Ok(())
}

// ── Windows implementation ───────────────────────────────────────────────
//
// Console mode switching delegates to crossterm, which snapshots and
// restores the console modes internally.

#[cfg(windows)]
#[derive(Debug)]
pub struct RawModeHandle {
    state: Option<()>,
}

#[cfg(windows)]
pub fn enable_raw_mode() -> io::Result<RawModeHandle> {
    crossterm::terminal::enable_raw_mode()?;
    Ok(RawModeHandle { state: Some(()) })
}

#[cfg(windows)]
impl RawModeHandle {
    pub fn close(mut self) -> io::Result<()> {
        match self.state.take() {
            Some(()) => crossterm::terminal::disable_raw_mode(),
            None => Ok(()),
        }
    }
}

#[cfg(windows)]
impl Drop for RawModeHandle {
    fn drop(&mut self) {
        if self.state.take().is_some() {
            // Best-effort restore; ignore errors during cleanup.
            let _ = crossterm::terminal::disable_raw_mode();
        }
    }
}

#[cfg(windows)]
pub fn save() -> io::Result<()> {
    // crossterm keeps the original console modes; the slot only tracks
    // that a session is open.
    portable_slot::mark_saved();
    Ok(())
}

#[cfg(windows)]
pub fn set_raw_mode() -> io::Result<()> {
    crossterm::terminal::enable_raw_mode()
}

#[cfg(windows)]
pub fn restore() -> io::Result<()> {
    portable_slot::take_saved()?;
    crossterm::terminal::disable_raw_mode()
}

// ── Portable fallback ────────────────────────────────────────────────────
//
// Targets with no terminal to configure keep the lifecycle state machine
// (and its invariants) without touching any device.

#[cfg(not(any(unix, windows)))]
#[derive(Debug)]
pub struct RawModeHandle {
    state: Option<()>,
}

#[cfg(not(any(unix, windows)))]
pub fn enable_raw_mode() -> io::Result<RawModeHandle> {
    Ok(RawModeHandle { state: Some(()) })
}

#[cfg(not(any(unix, windows)))]
impl RawModeHandle {
    pub fn close(mut self) -> io::Result<()> {
        self.state.take();
        Ok(())
    }
}

#[cfg(not(any(unix, windows)))]
pub fn save() -> io::Result<()> {
    portable_slot::mark_saved();
    Ok(())
}

#[cfg(not(any(unix, windows)))]
pub fn set_raw_mode() -> io::Result<()> {
    Ok(())
}

#[cfg(not(any(unix, windows)))]
pub fn restore() -> io::Result<()> {
    portable_slot::take_saved()
}

#[cfg(not(unix))]
mod portable_slot {
    use std::io;
    use std::sync::atomic::{AtomicBool, Ordering};

    static SAVED: AtomicBool = AtomicBool::new(false);

    pub(super) fn mark_saved() {
        SAVED.store(true, Ordering::SeqCst);
    }

    pub(super) fn take_saved() -> io::Result<()> {
        if SAVED.swap(false, Ordering::SeqCst) {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::NotFound,
                "no saved terminal state to restore",
            ))
        }
    }
}
