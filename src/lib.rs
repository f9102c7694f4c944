//! Line-oriented chat client for a stateful agent server.
//!
//! Wires environment configuration, transport selection and a plain-text
//! presentation sink around [`conversation::Conversation`].

pub mod commands;
pub mod config;
pub mod logging;
pub mod sink;
pub mod transport;

pub use commands::{parse_command, Command, HELP_TEXT};
pub use config::{ConfigError, EnvConfig, TransportKind};
pub use logging::init_tracing;
pub use sink::PlainTextSink;
pub use transport::{transport_for_config, ChatTransport, TransportError};
