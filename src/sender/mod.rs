pub mod client;

pub use client::{HttpTransport, Transport, TransportConfig, TransportError, TransportStats};
