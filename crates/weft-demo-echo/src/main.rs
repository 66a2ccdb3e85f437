#![forbid(unsafe_code)]

//! Echo demo: raw mode, cancellable reads, and event decoding end to end.
//!
//! Puts the terminal into raw mode and prints each decoded key event until
//! `q` (or Ctrl-C, which raw mode delivers as the byte `0x03`) is pressed.
//! Termination signals sent from outside, e.g. `kill -TERM`, exercise the
//! full shutdown path: cancellation, terminal restore, then re-delivery.

use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use weft_core::{EventReader, InputEvent};
use weft_tty::{
    ResizeWatcher, ShutdownToken, StdinReader, enable_raw_mode, run_with_shutdown_hook,
    terminal_size,
};

/// Granularity of cancellation and resize checks while idle.
const READ_SLICE: Duration = Duration::from_millis(10);

fn main() {
    if let Err(e) = run() {
        eprintln!("weft-demo-echo: {e}");
        std::process::exit(1);
    }
}

fn run() -> io::Result<()> {
    let handle = enable_raw_mode()?;
    let reader = StdinReader::stdin()?;
    let resize = ResizeWatcher::install()?;

    let outcome = run_with_shutdown_hook(
        move || {
            if let Err(e) = handle.close() {
                eprintln!("failed to restore terminal: {e}");
            }
        },
        |token| echo_loop(&reader, &resize, token),
    )?;

    resize.close();
    reader.close();
    outcome
}

fn echo_loop(reader: &StdinReader, resize: &ResizeWatcher, token: &ShutdownToken) -> io::Result<()> {
    if let Ok((cols, rows)) = terminal_size() {
        report(&format!("terminal {cols}x{rows}"))?;
    }
    report("press q or ctrl-c to quit")?;
    let mut events = EventReader::new(IdleAwareSource {
        reader,
        resize,
        token,
    });
    while let Some(event) = events.next_event()? {
        match event {
            InputEvent::Char('q') | InputEvent::Unknown(0x03) => break,
            event => report(&format!("{event:?}"))?,
        }
    }
    Ok(())
}

/// Raw mode leaves output in `\r\n` discipline.
fn report(line: &str) -> io::Result<()> {
    let mut out = io::stdout().lock();
    write!(out, "{line}\r\n")?;
    out.flush()
}

/// Byte source that slices blocking reads so the idle path can notice
/// cancellation and resizes between keystrokes.
struct IdleAwareSource<'a> {
    reader: &'a StdinReader,
    resize: &'a ResizeWatcher,
    token: &'a ShutdownToken,
}

impl Read for IdleAwareSource<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.token.is_cancelled() {
                return Ok(0);
            }
            if self.resize.resized() {
                if let Ok((cols, rows)) = terminal_size() {
                    report(&format!("resize {cols}x{rows}"))?;
                }
            }
            let slice_started = Instant::now();
            let n = self.reader.read_with_timeout(buf, READ_SLICE)?;
            if n > 0 {
                return Ok(n);
            }
            // A zero-byte return before the slice elapsed is end-of-stream
            // or an interrupt, not a timeout; stop decoding.
            if slice_started.elapsed() < READ_SLICE {
                return Ok(0);
            }
        }
    }
}
