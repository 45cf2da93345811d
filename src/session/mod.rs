//! Streaming sessions: wire protocol, lifecycle and the per-connection driver.

pub mod handler;
pub mod protocol;
pub mod state;

pub use handler::{Handshake, SessionContext, SessionOutcome, StreamSettings, Transport, run_session};
pub use protocol::{ClientMessage, Frame, Mode, ServerMessage};
pub use state::SessionState;
