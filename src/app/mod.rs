pub mod config;
pub mod logging;

pub use config::{Config, ConfigError, DEFAULT_DESTINATION, LogLevel};
pub use logging::setup_logging;

use crate::dispatch::{Dispatcher, EventReport};
use crate::event;
use crate::sender::{HttpTransport, TransportConfig};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, error, info};

/// Outer shell: wires configuration into a dispatcher and feeds it one
/// JSON event per stdin line (the handler-pipe contract).
pub struct App {
    dispatcher: Dispatcher<HttpTransport>,
}

impl App {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let table = config.build_route_table()?;
        for idx in 0..table.len() {
            let destination = &table.route(idx).destination;
            info!(
                destination = %destination.name,
                endpoint = %destination.endpoint,
                buffer_size = destination.buffer_size,
                buffer_max_age = ?destination.buffer_max_age,
                proxy_mode = destination.proxy_mode,
                "initialized destination"
            );
        }

        let transport = HttpTransport::new(TransportConfig {
            timeout: config.write_timeout(),
            ..TransportConfig::default()
        })?;

        Ok(Self {
            dispatcher: Dispatcher::new(table, transport),
        })
    }

    /// Parses and dispatches one raw event envelope. A malformed envelope
    /// yields the `error` report; it never aborts the run loop.
    pub async fn handle_raw_event(&mut self, raw: &[u8]) -> EventReport {
        match event::parse_event(raw) {
            Ok(event) => self.dispatcher.handle_event(&event).await,
            Err(e) => {
                error!(error = %e, "unable to handle event");
                EventReport::error()
            }
        }
    }

    /// Processes newline-delimited JSON events until EOF, then drains
    /// whatever is still buffered.
    pub async fn process_stream<R>(&mut self, reader: R) -> anyhow::Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let report = self.handle_raw_event(line.as_bytes()).await;
            debug!(
                status = report.status.token(),
                code = report.status.code(),
                flushes = report.flushes.len(),
                "event processed"
            );
        }

        let reports = self.dispatcher.drain().await;
        info!(payloads = reports.len(), "drained buffers at shutdown");
        Ok(())
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        self.process_stream(tokio::io::stdin()).await
    }
}

// Main entry point for the binary.
pub async fn main() -> anyhow::Result<()> {
    let config = Config::from_args(std::env::args());
    setup_logging(config.log_level);

    info!("starting influx-relay v{}", env!("CARGO_PKG_VERSION"));
    let app = App::from_config(&config)?;
    app.run().await
}
