//! Byte-level formats read from kernel devices.
//!
//! - **`input_event`** – the fixed-size `struct input_event` record that evdev
//!   character devices deliver on every `read(2)`.

pub mod input_event;

pub use input_event::{InputEventRecord, RecordError, INPUT_EVENT_SIZE};
