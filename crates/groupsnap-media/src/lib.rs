//! Image work for group photo sessions: laying contributions out on a
//! template canvas and encoding the composed result.

pub mod compositor;

pub use compositor::{compose, encode_jpeg, resize_nearest, ComposeError};
