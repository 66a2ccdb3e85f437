#![forbid(unsafe_code)]

//! Core: platform-independent terminal input decoding.
//!
//! Everything here operates on already-read bytes; blocking, file
//! descriptors, and signals live in `weft-tty`.

pub mod event;
pub mod input_parser;
pub mod utf8;

pub use event::InputEvent;
pub use input_parser::EventReader;
pub use utf8::Utf8Codepoint;
