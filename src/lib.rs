//! toolbus: interactive tool-call RPC over a single ordered transport.
//!
//! One [`session::Session`] multiplexes many concurrent tool calls over one
//! [`transport::Transport`]. While a call runs, the serving side may stream
//! progress and log events, or suspend mid-call to ask the caller for
//! structured data (elicitation) or generated text (sampling), then resume
//! with the answer. See `tests/e2e` for a client+server walkthrough over an
//! in-memory transport pair.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod id;
pub mod logging;
pub mod prompt;
pub mod protocol;
pub mod resource;
pub mod retry;
pub mod server;
pub mod session;
pub mod state;
pub mod tool;
pub mod transport;

pub use error::CallError;
pub use protocol::{CallId, Message};
pub use server::Server;
pub use session::Session;
pub use transport::Transport;
