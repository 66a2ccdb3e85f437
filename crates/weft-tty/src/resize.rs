#![forbid(unsafe_code)]

//! Terminal resize notification and size queries.
//!
//! On POSIX a background thread watches `SIGWINCH` and posts into a
//! depth-one channel; bursts coalesce, since the consumer only needs to
//! know "the size changed since you last looked", not how many times.
//! Pair [`ResizeWatcher::resized`] with [`terminal_size`] to fetch the
//! current dimensions. Targets without `SIGWINCH` get an inert watcher;
//! callers there can poll [`terminal_size`] directly.

use std::io;

#[cfg(unix)]
use std::fs::File;
#[cfg(unix)]
use std::sync::mpsc;
#[cfg(unix)]
use std::thread::JoinHandle;

#[cfg(unix)]
use signal_hook::consts::signal::SIGWINCH;
#[cfg(unix)]
use signal_hook::iterator::{Handle, Signals};

// ── POSIX implementation ─────────────────────────────────────────────────

/// Background watcher for terminal resize signals.
#[cfg(unix)]
#[derive(Debug)]
pub struct ResizeWatcher {
    notifications: mpsc::Receiver<()>,
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

#[cfg(unix)]
impl ResizeWatcher {
    /// Start watching `SIGWINCH`. Independent of the termination-signal
    /// slot; any number of watchers may coexist.
    pub fn install() -> io::Result<Self> {
        let (tx, notifications) = mpsc::sync_channel(1);
        let mut signals = Signals::new([SIGWINCH])?;
        let handle = signals.handle();
        let thread = std::thread::spawn(move || {
            for _ in signals.forever() {
                // A full slot already means "size changed"; drop the rest.
                let _ = tx.try_send(());
            }
        });
        Ok(Self {
            notifications,
            handle,
            thread: Some(thread),
        })
    }

    /// True if the terminal was resized since the last call. Drains the
    /// channel, so a burst of signals reports once.
    pub fn resized(&self) -> bool {
        let mut seen = false;
        while self.notifications.try_recv().is_ok() {
            seen = true;
        }
        seen
    }

    /// Stop the watcher and join its thread.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(unix)]
impl Drop for ResizeWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Current terminal dimensions as `(columns, rows)`.
#[cfg(unix)]
pub fn terminal_size() -> io::Result<(u16, u16)> {
    let tty = File::open("/dev/tty")?;
    let size = rustix::termios::tcgetwinsize(&tty)?;
    if size.ws_col == 0 || size.ws_row == 0 {
        return Err(io::Error::other("terminal reported a zero dimension"));
    }
    Ok((size.ws_col, size.ws_row))
}

// ── Windows implementation ───────────────────────────────────────────────

#[cfg(windows)]
pub fn terminal_size() -> io::Result<(u16, u16)> {
    crossterm::terminal::size()
}

// ── Portable implementation ──────────────────────────────────────────────

#[cfg(not(unix))]
#[derive(Debug)]
pub struct ResizeWatcher {
    _private: (),
}

#[cfg(not(unix))]
impl ResizeWatcher {
    pub fn install() -> io::Result<Self> {
        Ok(Self { _private: () })
    }

    pub fn resized(&self) -> bool {
        false
    }

    pub fn close(self) {}
}

#[cfg(all(not(unix), not(windows)))]
pub fn terminal_size() -> io::Result<(u16, u16)> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "terminal size is unavailable on this target",
    ))
}

// ── Tests ────────────────────────────────────────────────────────────────
