//! Client-server communication protocol.
//!
//! This module defines the application-layer protocol spoken between calcq clients and the
//! calculation server, together with the server-side machinery that serves it: the
//! per-connection session state machine and the work queue that serializes every
//! calculation through a single worker thread.
//!
//! # Overview
//!
//! A client connects over TCP and opens the conversation with a connection-establish
//! request carrying a username. It then sends any number of calculation requests, each
//! answered with the numeric result, and closes with a connection-terminate request.
//!
//! Each accepted connection is served by its own [`Session`] thread. Sessions do not
//! evaluate anything themselves; they hand every expression to the shared [`WorkQueue`]
//! together with a completion that writes the result back to the originating connection.
//! A single [`Worker`] drains the queue in strict arrival order.
//!
//! # Binary Format
//!
//! Every [`Message`] travels in its own frame:
//!
//! - A 4-byte big-endian payload length.
//! - The bincode encoding of the message, using big-endian fixed-width integers.
//!
//! Framing keeps the stream in sync even when a payload cannot be decoded, so a garbled
//! message is answered with a `BadRequest` instead of dropping the connection.
//!
//! # Response codes
//!
//! Every response carries a [`ResponseCode`]. A calculation that fails to evaluate is not
//! a protocol error: it is answered with `Ok`, a NaN result and a diagnostic.
//!
//! # Key Components
//!
//! - [`Request`] / [`Response`]: The wire vocabulary.
//! - [`ProtocolTransport`]: Frame codec over any bidirectional byte stream.
//! - [`Session`]: Server side of one connection.
//! - [`WorkQueue`]: FIFO of pending calculations.
//! - [`CalculationServer`]: Accept loop tying the above together.
//! - [`Client`]: Blocking client used by `calcq_cli`.
mod client;
mod queue;
mod request;
mod response;
mod server;
mod session;
mod thread;
mod transport;

pub use client::{Client, ClientError};
pub use queue::{Completion, Job, WorkQueue};
pub use request::{CalculationRequest, Request};
pub use response::{CalculationResponse, Response, ResponseCode};
pub use server::CalculationServer;
pub use session::{Session, SessionState};
pub use thread::Worker;
pub use transport::{Connection, MAX_FRAME_LEN, Message, ProtocolTransport, TransportError};
