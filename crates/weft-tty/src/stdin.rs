#![forbid(unsafe_code)]

//! Interruptible, timeout-capable stdin reading, plus a loopback writer for
//! tests.
//!
//! | Operation            | Blocks until                                | Returns 0 when                     |
//! |----------------------|---------------------------------------------|------------------------------------|
//! | `read`               | data, end-of-stream, interrupt, or close    | end-of-stream, interrupt, close    |
//! | `read_with_timeout`  | the above or the deadline                   | the above or deadline elapsed      |
//!
//! Fatal native errors surface as `Err`; timeout and interruption are
//! ordinary `Ok(0)` outcomes, distinguishable only by context.
//!
//! # Design
//!
//! Blocking-with-timeout plus explicit [`interrupt`](StdinReader::interrupt)
//! keeps the consumer to one blocking call per input event while still
//! allowing prompt shutdown. On POSIX the reader waits in `poll(2)` over the
//! byte source and a self-pipe; `interrupt` writes one byte to the pipe.
//! Timeouts measure against `std::time::Instant`, so a read re-arms
//! correctly across `EINTR` and stray wakeups and never returns
//! meaningfully before its deadline.
//!
//! All methods take `&self`: reads, `interrupt`, and `close` may race from
//! different threads. `close` flags the reader and wakes any blocked read
//! (which then returns `Ok(0)`); descriptors are released when the reader
//! is dropped.

use std::io;
use std::time::{Duration, Instant};

#[cfg(unix)]
use std::fs::File;
#[cfg(unix)]
use std::io::{Read, Write};
#[cfg(unix)]
use std::os::fd::{AsFd, OwnedFd};
#[cfg(unix)]
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(unix)]
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
#[cfg(unix)]
use tracing::debug;

// ── POSIX implementation ─────────────────────────────────────────────────

/// Reader over the process's stdin or a loopback pipe.
#[cfg(unix)]
#[derive(Debug)]
pub struct StdinReader {
    source: File,
    wake_rx: File,
    wake_tx: File,
    closed: AtomicBool,
}

#[cfg(unix)]
impl StdinReader {
    /// Bind a reader to the process's stdin (the descriptor is duplicated,
    /// so the reader's lifecycle never closes fd 0 itself).
    pub fn stdin() -> io::Result<Self> {
        let source = io::stdin().as_fd().try_clone_to_owned()?;
        Self::from_owned(source)
    }

    fn from_owned(source: OwnedFd) -> io::Result<Self> {
        let (wake_rx, wake_tx) = nix::unistd::pipe().map_err(io::Error::other)?;
        Ok(Self {
            source: File::from(source),
            wake_rx: File::from(wake_rx),
            wake_tx: File::from(wake_tx),
            closed: AtomicBool::new(false),
        })
    }

    /// Block until at least one byte is available, end-of-stream, an
    /// [`interrupt`](Self::interrupt), or [`close`](Self::close).
    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_until(buf, None)
    }

    /// As [`read`](Self::read), additionally returning `Ok(0)` once
    /// `timeout` has elapsed with no data.
    pub fn read_with_timeout(&self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        // A deadline past Instant's range means "longer than the process
        // lives": block indefinitely.
        self.read_until(buf, Instant::now().checked_add(timeout))
    }

    fn read_until(&self, buf: &mut [u8], deadline: Option<Instant>) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Ok(0);
            }
            let timeout = match deadline {
                None => PollTimeout::NONE,
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Ok(0);
                    }
                    poll_timeout(remaining)
                }
            };
            let mut fds = [
                PollFd::new(self.source.as_fd(), PollFlags::POLLIN),
                PollFd::new(self.wake_rx.as_fd(), PollFlags::POLLIN),
            ];
            match poll(&mut fds, timeout) {
                // Poll granularity is capped; the deadline check above
                // decides whether this was the real timeout.
                Ok(0) => continue,
                Ok(_) => {}
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => return Err(io::Error::other(e)),
            }
            let source_ready = fds[0].revents().is_some_and(|r| !r.is_empty());
            let wake_ready = fds[1].revents().is_some_and(|r| !r.is_empty());
            if source_ready {
                match (&self.source).read(buf) {
                    Ok(n) => return Ok(n),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                }
            }
            if wake_ready {
                self.drain_wake();
                return Ok(0);
            }
        }
    }

    /// Wake any in-progress blocking read on this reader; it returns
    /// promptly with `Ok(0)` (or whatever data arrived first). Safe to call
    /// concurrently with reads and with `close`. With no read in flight,
    /// the next read observes one `Ok(0)` and subsequent reads behave
    /// normally.
    pub fn interrupt(&self) {
        // One byte per wake; every wake drains, so the pipe never fills.
        let _ = (&self.wake_tx).write(b"!");
    }

    /// Flag the reader closed and wake any blocked read. Idempotent.
    /// Descriptors are released when the reader is dropped.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("stdin reader closed");
            self.interrupt();
        }
    }

    fn drain_wake(&self) {
        // Called only after poll reported the pipe readable; leftover bytes
        // simply re-wake the next read.
        let mut sink = [0u8; 64];
        let _ = (&self.wake_rx).read(&mut sink);
    }
}

#[cfg(unix)]
impl Read for &StdinReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        StdinReader::read(*self, buf)
    }
}

#[cfg(unix)]
impl Read for StdinReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        StdinReader::read(self, buf)
    }
}

/// Ceiling conversion to poll milliseconds, so poll never wakes before the
/// deadline it serves. Longer remainders re-arm through the read loop.
#[cfg(unix)]
fn poll_timeout(remaining: Duration) -> PollTimeout {
    let ms = remaining
        .as_micros()
        .div_ceil(1000)
        .min(u128::from(u16::MAX)) as u16;
    PollTimeout::from(ms)
}

/// Writable end of a loopback pair, for feeding a reader deterministically
/// in tests without a real terminal.
///
/// The pair is a real pipe, so reads through it exercise the same poll path
/// as live stdin. Dropping the writer releases both ends;
/// [`into_reader`](Self::into_reader) releases just the write end, after
/// which the reader observes end-of-stream.
#[cfg(unix)]
#[derive(Debug)]
pub struct StdinWriter {
    sink: File,
    reader: StdinReader,
}

#[cfg(unix)]
impl StdinWriter {
    /// Create a loopback pair.
    pub fn new() -> io::Result<Self> {
        let (source, sink) = nix::unistd::pipe().map_err(io::Error::other)?;
        Ok(Self {
            sink: File::from(sink),
            reader: StdinReader::from_owned(source)?,
        })
    }

    /// The paired reader.
    #[must_use]
    pub fn reader(&self) -> &StdinReader {
        &self.reader
    }

    /// Append `bytes` to the paired reader's source, in order.
    pub fn write(&self, bytes: &[u8]) -> io::Result<()> {
        (&self.sink).write_all(bytes)
    }

    /// Release the write end and hand out the reader, which then sees
    /// end-of-stream after draining.
    #[must_use]
    pub fn into_reader(self) -> StdinReader {
        self.reader
    }

    /// Release both ends.
    pub fn close(self) {}
}

// ── Portable implementation ──────────────────────────────────────────────
//
// Targets without poll(2) get a feeder-thread backend: a thread blocks on
// the native stdin read and hands chunks over a channel; timeouts map to
// `recv_timeout` (also monotonic). A feeder parked inside a native read
// stays parked until process exit after `close` (flagged, not crashed).

#[cfg(not(unix))]
use std::collections::VecDeque;
#[cfg(not(unix))]
use std::io::Read;
#[cfg(not(unix))]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(not(unix))]
use std::sync::mpsc;
#[cfg(not(unix))]
use std::sync::{Mutex, PoisonError};

#[cfg(not(unix))]
#[derive(Debug)]
enum Packet {
    Data(Vec<u8>),
    Eof,
    Wake,
}

#[cfg(not(unix))]
#[derive(Debug)]
pub struct StdinReader {
    packets: Mutex<mpsc::Receiver<Packet>>,
    pending: Mutex<VecDeque<u8>>,
    wake_tx: mpsc::Sender<Packet>,
    closed: AtomicBool,
    eof: AtomicBool,
}

#[cfg(not(unix))]
impl StdinReader {
    /// Bind a reader to the process's stdin via a feeder thread.
    pub fn stdin() -> io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let feeder = tx.clone();
        std::thread::spawn(move || {
            let mut stdin = io::stdin().lock();
            let mut buf = [0u8; 1024];
            loop {
                match stdin.read(&mut buf) {
                    Ok(0) => {
                        let _ = feeder.send(Packet::Eof);
                        break;
                    }
                    Ok(n) => {
                        if feeder.send(Packet::Data(buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(_) => {
                        let _ = feeder.send(Packet::Eof);
                        break;
                    }
                }
            }
        });
        Ok(Self::from_channel(rx, tx))
    }

    fn from_channel(rx: mpsc::Receiver<Packet>, wake_tx: mpsc::Sender<Packet>) -> Self {
        Self {
            packets: Mutex::new(rx),
            pending: Mutex::new(VecDeque::new()),
            wake_tx,
            closed: AtomicBool::new(false),
            eof: AtomicBool::new(false),
        }
    }

    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_until(buf, None)
    }

    pub fn read_with_timeout(&self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        self.read_until(buf, Instant::now().checked_add(timeout))
    }

    fn read_until(&self, buf: &mut [u8], deadline: Option<Instant>) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Ok(0);
            }
            let copied = self.take_pending(buf);
            if copied > 0 {
                return Ok(copied);
            }
            if self.eof.load(Ordering::SeqCst) {
                return Ok(0);
            }
            let packets = self.packets.lock().unwrap_or_else(PoisonError::into_inner);
            let packet = match deadline {
                None => match packets.recv() {
                    Ok(packet) => packet,
                    Err(mpsc::RecvError) => Packet::Eof,
                },
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Ok(0);
                    }
                    match packets.recv_timeout(remaining) {
                        Ok(packet) => packet,
                        Err(mpsc::RecvTimeoutError::Timeout) => continue,
                        Err(mpsc::RecvTimeoutError::Disconnected) => Packet::Eof,
                    }
                }
            };
            drop(packets);
            match packet {
                Packet::Data(bytes) => {
                    self.pending
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .extend(bytes);
                }
                Packet::Eof => {
                    self.eof.store(true, Ordering::SeqCst);
                    return Ok(0);
                }
                Packet::Wake => return Ok(0),
            }
        }
    }

    pub fn interrupt(&self) {
        let _ = self.wake_tx.send(Packet::Wake);
    }

    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.interrupt();
        }
    }

    fn take_pending(&self, buf: &mut [u8]) -> usize {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let n = pending.len().min(buf.len());
        for (dst, byte) in buf.iter_mut().zip(pending.drain(..n)) {
            *dst = byte;
        }
        n
    }
}

#[cfg(not(unix))]
impl Read for &StdinReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        StdinReader::read(*self, buf)
    }
}

#[cfg(not(unix))]
impl Read for StdinReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        StdinReader::read(self, buf)
    }
}

#[cfg(not(unix))]
#[derive(Debug)]
pub struct StdinWriter {
    sink: mpsc::Sender<Packet>,
    reader: StdinReader,
}

#[cfg(not(unix))]
impl StdinWriter {
    pub fn new() -> io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let reader = StdinReader::from_channel(rx, tx.clone());
        Ok(Self { sink: tx, reader })
    }

    #[must_use]
    pub fn reader(&self) -> &StdinReader {
        &self.reader
    }

    pub fn write(&self, bytes: &[u8]) -> io::Result<()> {
        self.sink
            .send(Packet::Data(bytes.to_vec()))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "paired reader is gone"))
    }

    #[must_use]
    pub fn into_reader(self) -> StdinReader {
        self.reader
    }

    pub fn close(self) {}
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_through_loopback() {
        let writer = StdinWriter::new().unwrap();
        writer.write(b"hello").unwrap();
        let mut buf = [0u8; 16];
        let n = writer.reader().read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello");
    }

    #[test]
    fn short_buffer_reads_in_order() {
        let writer = StdinWriter::new().unwrap();
        writer.write(b"hello").unwrap();
        let mut collected = Vec::new();
        let mut buf = [0u8; 2];
        while collected.len() < 5 {
            let n = writer.reader().read(&mut buf).unwrap();
            assert!(n > 0);
            collected.extend_from_slice(&buf[..n]);
        }
        assert_eq!(collected, b"hello");
    }

    #[test]
    fn timeout_floor_is_respected() {
        let writer = StdinWriter::new().unwrap();
        let mut buf = [0u8; 8];
        let start = Instant::now();
        let n = writer
            .reader()
            .read_with_timeout(&mut buf, Duration::from_millis(100))
            .unwrap();
        assert_eq!(n, 0);
        assert!(
            start.elapsed() >= Duration::from_millis(100),
            "returned {:?} before the deadline",
            start.elapsed()
        );
    }

    #[test]
    fn zero_timeout_returns_immediately() {
        let writer = StdinWriter::new().unwrap();
        let mut buf = [0u8; 8];
        let n = writer
            .reader()
            .read_with_timeout(&mut buf, Duration::ZERO)
            .unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn data_beats_the_deadline() {
        let writer = StdinWriter::new().unwrap();
        writer.write(b"now").unwrap();
        let mut buf = [0u8; 8];
        let start = Instant::now();
        let n = writer
            .reader()
            .read_with_timeout(&mut buf, Duration::from_secs(10))
            .unwrap();
        assert_eq!(&buf[..n], b"now");
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn interrupt_wakes_a_blocked_read() {
        let writer = StdinWriter::new().unwrap();
        let reader = writer.reader();
        let start = Instant::now();
        std::thread::scope(|s| {
            let blocked = s.spawn(|| {
                let mut buf = [0u8; 8];
                reader.read(&mut buf).unwrap()
            });
            std::thread::sleep(Duration::from_millis(50));
            reader.interrupt();
            assert_eq!(blocked.join().unwrap(), 0);
        });
        assert!(
            start.elapsed() < Duration::from_secs(5),
            "interrupt did not wake the read promptly"
        );
    }

    #[test]
    fn reads_recover_after_an_interrupt() {
        let writer = StdinWriter::new().unwrap();
        let mut buf = [0u8; 8];
        // Interrupt with no read in flight: the next read observes it once.
        writer.reader().interrupt();
        assert_eq!(writer.reader().read(&mut buf).unwrap(), 0);
        writer.write(b"x").unwrap();
        assert_eq!(writer.reader().read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], b'x');
    }

    #[test]
    fn writer_teardown_is_end_of_stream() {
        let writer = StdinWriter::new().unwrap();
        writer.write(b"hi").unwrap();
        let reader = writer.into_reader();
        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).unwrap(), 2);
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn close_unblocks_an_outstanding_read() {
        let writer = StdinWriter::new().unwrap();
        let reader = writer.reader();
        std::thread::scope(|s| {
            let blocked = s.spawn(|| {
                let mut buf = [0u8; 8];
                reader.read(&mut buf).unwrap()
            });
            std::thread::sleep(Duration::from_millis(50));
            reader.close();
            assert_eq!(blocked.join().unwrap(), 0);
        });
        // Closed readers keep returning 0, including after another close.
        reader.close();
        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn empty_buffer_never_blocks() {
        let writer = StdinWriter::new().unwrap();
        let mut buf = [0u8; 0];
        assert_eq!(writer.reader().read(&mut buf).unwrap(), 0);
    }
}
