//! Line-oriented multi-client chat server library
//!
//! A TCP chat server where clients register a unique name and exchange
//! broadcasts, private messages, and kick requests through a central
//! registry.
//!
//! # Features
//! - Name negotiation with uniqueness enforcement
//! - Public broadcasts and private `/tell` messages
//! - `/kick` with strict priority over queued messages
//! - Connect/disconnect notices to all other clients
//! - Leak-free teardown on quit, kick, hangup, or failure
//!
//! # Architecture
//! Two tasks per client, bound by a first-exit-wins supervisor:
//! - The receive loop forwards raw lines onto the client's own queue
//! - The send loop drains the queue, interprets commands, and checks the
//!   kick cell before every dequeue
//! - The [`Registry`] is the only shared state; every operation on it is
//!   one short critical section, never held across an await
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use linechat::{handle_connection, Registry};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     let registry = Registry::new();
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         let registry = registry.clone();
//!         tokio::spawn(async move {
//!             let (reader, writer) = stream.into_split();
//!             let _ = handle_connection(reader, writer, registry).await;
//!         });
//!     }
//! }
//! ```

pub mod client;
pub mod error;
pub mod handler;
pub mod message;
pub mod registry;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use client::{Client, SessionGuard};
pub use error::{AlreadyExists, AppError, NoSuchClient};
pub use handler::{handle_connection, SessionEnd};
pub use message::Message;
pub use registry::Registry;
pub use session::concurrently;
pub use types::ConnId;
