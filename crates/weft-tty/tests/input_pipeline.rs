//! Bytes fed through the loopback reader decode into key events, including
//! escape sequences whose tail arrives after decoding has already blocked.

use std::time::Duration;

use weft_core::{EventReader, InputEvent};
use weft_tty::StdinWriter;

#[test]
fn loopback_bytes_decode_in_order() {
    let writer = StdinWriter::new().unwrap();
    writer.write(b"h\xc3\xa9\x1b[A\x1b[15~\x0d").unwrap();
    let mut events = EventReader::new(writer.reader());
    assert_eq!(events.next_event().unwrap(), Some(InputEvent::Char('h')));
    assert_eq!(events.next_event().unwrap(), Some(InputEvent::Char('é')));
    assert_eq!(events.next_event().unwrap(), Some(InputEvent::Up));
    assert_eq!(events.next_event().unwrap(), Some(InputEvent::F(5)));
    assert_eq!(events.next_event().unwrap(), Some(InputEvent::Enter));
}

#[test]
fn a_partial_sequence_completes_when_the_tail_arrives() {
    let writer = StdinWriter::new().unwrap();
    writer.write(b"\x1b[1").unwrap();
    std::thread::scope(|s| {
        let decoding = s.spawn(|| {
            let mut events = EventReader::new(writer.reader());
            events.next_event().unwrap()
        });
        // Give the decoder time to block on the missing tail.
        std::thread::sleep(Duration::from_millis(50));
        writer.write(b"5~").unwrap();
        assert_eq!(decoding.join().unwrap(), Some(InputEvent::F(5)));
    });
}

#[test]
fn end_of_stream_mid_sequence_yields_no_event() {
    let writer = StdinWriter::new().unwrap();
    writer.write(b"a\x1b[").unwrap();
    let reader = writer.into_reader();
    let mut events = EventReader::new(&reader);
    assert_eq!(events.next_event().unwrap(), Some(InputEvent::Char('a')));
    assert_eq!(events.next_event().unwrap(), None);
}
