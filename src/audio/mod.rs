//! Audio handling: streamed frame buffering, decoded windows, WAV payloads.

pub mod frame_buffer;
pub mod wav;
pub mod window;

pub use frame_buffer::{FrameBuffer, OverlapPolicy};
pub use window::AudioWindow;
