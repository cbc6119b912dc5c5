use crate::event::Event;
use crate::protocol::{ComposeOutcome, TagSet, compose, encode_tags, merge_tags};
use crate::route::RouteTable;
use crate::sender::{Transport, TransportError};
use tracing::{debug, error, info};
use uuid::Uuid;

/// Two-valued outcome token reported back to the caller for every
/// processed event. A transport-level send failure does not flip this;
/// it rides in the flush reports instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    Ok,
    Error,
}

impl EventStatus {
    pub fn token(self) -> &'static str {
        match self {
            EventStatus::Ok => "ok",
            EventStatus::Error => "error",
        }
    }

    pub fn code(self) -> i32 {
        match self {
            EventStatus::Ok => 0,
            EventStatus::Error => 2,
        }
    }
}

/// Outcome of one flush attempt. The buffer behind it is always already
/// cleared by the time this exists, whatever `result` says.
#[derive(Debug)]
pub struct FlushReport {
    pub destination: String,
    pub payload_id: String,
    pub points: usize,
    pub result: Result<u16, TransportError>,
}

#[derive(Debug)]
pub struct EventReport {
    pub status: EventStatus,
    pub flushes: Vec<FlushReport>,
}

impl EventReport {
    pub fn ok(flushes: Vec<FlushReport>) -> Self {
        Self {
            status: EventStatus::Ok,
            flushes,
        }
    }

    pub fn error() -> Self {
        Self {
            status: EventStatus::Error,
            flushes: Vec::new(),
        }
    }
}

/// Top-level entry point: routes an event to one destination, renders its
/// output lines into line protocol, and drives the buffer flush cycle.
///
/// Takes `&mut self` per event: all buffers have exactly one logical
/// owner, so no read-modify-write sequence can interleave. The payload is
/// copied out of the buffer before the send is awaited.
pub struct Dispatcher<T: Transport> {
    table: RouteTable,
    transport: T,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(table: RouteTable, transport: T) -> Self {
        Self { table, transport }
    }

    pub fn route_table(&self) -> &RouteTable {
        &self.table
    }

    /// Processes one event. Never panics and never propagates an error;
    /// the report carries the status and any flush outcomes.
    pub async fn handle_event(&mut self, event: &Event) -> EventReport {
        let idx = self.table.resolve(&event.handlers);
        let mut flushes = Vec::new();

        // Drain a stale or full buffer ahead of new writes.
        if self.route_should_flush(idx)
            && let Some(report) = self.flush_route(idx).await
        {
            flushes.push(report);
        }

        let destination = &self.table.route(idx).destination;
        let proxy_mode = destination.proxy_mode;
        let size_limit = destination.buffer_size;
        let destination_name = destination.name.clone();

        // Encoded once per event; per-line event tags re-encode on top.
        let (tags, encoded) = if proxy_mode {
            (TagSet::new(), String::new())
        } else {
            let merged = merge_tags(&event.client_tags, &event.check_tags);
            let encoded = encode_tags(&merged);
            (merged, encoded)
        };

        for line in event.output.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                continue;
            }
            let point = if proxy_mode {
                // Upstream already produced line protocol; forward as is.
                line.to_string()
            } else {
                match compose(line, &tags, &encoded) {
                    ComposeOutcome::Point(point) => point,
                    ComposeOutcome::Skip => continue,
                }
            };

            let buffer = &mut self.table.route_mut(idx).buffer;
            buffer.append(point);
            debug!(
                destination = %destination_name,
                buffered = buffer.len(),
                limit = size_limit,
                "stored point in buffer"
            );
        }

        if self.route_should_flush(idx)
            && let Some(report) = self.flush_route(idx).await
        {
            flushes.push(report);
        }

        EventReport::ok(flushes)
    }

    /// Flushes every destination unconditionally. Used at shutdown.
    pub async fn drain(&mut self) -> Vec<FlushReport> {
        let mut reports = Vec::new();
        for idx in 0..self.table.len() {
            if let Some(report) = self.flush_route(idx).await {
                reports.push(report);
            }
        }
        reports
    }

    fn route_should_flush(&self, idx: usize) -> bool {
        let route = self.table.route(idx);
        route
            .buffer
            .should_flush(route.destination.buffer_size, route.destination.buffer_max_age)
    }

    /// Sends the buffer's contents as one payload. The buffer is cleared
    /// before the send is awaited and stays cleared on failure: dropping
    /// unsent points is the price of bounded memory under a persistent
    /// downstream outage.
    async fn flush_route(&mut self, idx: usize) -> Option<FlushReport> {
        let route = self.table.route_mut(idx);
        let points = route.buffer.len();
        let payload = route.buffer.take_payload()?;
        let destination = route.destination.name.clone();
        let endpoint = route.destination.endpoint.clone();
        let payload_id = Uuid::new_v4().to_string();

        debug!(
            destination = %destination,
            payload_id = %payload_id,
            points,
            "flushing buffer"
        );

        let result = self.transport.send(endpoint, payload).await;
        match &result {
            Ok(status) => {
                info!(
                    destination = %destination,
                    payload_id = %payload_id,
                    points,
                    status,
                    "payload written"
                );
            }
            Err(e) => {
                error!(
                    destination = %destination,
                    payload_id = %payload_id,
                    points,
                    error = %e,
                    "write failed, buffered points dropped"
                );
            }
        }

        Some(FlushReport {
            destination,
            payload_id,
            points,
            result,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::{Destination, DestinationSettings};
    use std::sync::Mutex;
    use std::time::Duration;
    use url::Url;

    struct RecordingTransport {
        calls: Mutex<Vec<(Url, String)>>,
        fail: bool,
    }

    impl RecordingTransport {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: true,
            }
        }
    }

    impl Transport for RecordingTransport {
        async fn send(&self, endpoint: Url, payload: String) -> Result<u16, TransportError> {
            self.calls.lock().unwrap().push((endpoint, payload));
            if self.fail {
                Err(TransportError::HttpError {
                    status: 500,
                    message: "boom".to_string(),
                })
            } else {
                Ok(204)
            }
        }
    }

    fn destination(name: &str, buffer_size: usize, proxy_mode: bool) -> Destination {
        let settings = DestinationSettings {
            hostname: Some("localhost".to_string()),
            database: Some(name.to_string()),
            buffer_size: Some(buffer_size),
            buffer_max_age: Some(30),
            proxy_mode: Some(proxy_mode),
            ..DestinationSettings::default()
        };
        Destination::from_settings(name, &settings).unwrap()
    }

    fn dispatcher(
        default: Destination,
        additional: Vec<Destination>,
        transport: RecordingTransport,
    ) -> Dispatcher<RecordingTransport> {
        let table = RouteTable::new(default, additional).unwrap();
        Dispatcher::new(table, transport)
    }

    fn event(output: &str) -> Event {
        Event {
            output: output.to_string(),
            ..Event::default()
        }
    }

    #[tokio::test]
    async fn test_points_buffered_without_flush_below_limit() {
        let mut d = dispatcher(destination("metrics", 10, false), vec![], RecordingTransport::new());

        let report = d.handle_event(&event("rspec 69 1480697845\n")).await;
        assert_eq!(report.status, EventStatus::Ok);
        assert!(report.flushes.is_empty());
        assert_eq!(d.table.route(0).buffer.len(), 1);
        assert!(d.transport.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_size_limit_triggers_flush_after_append() {
        let mut d = dispatcher(destination("metrics", 2, false), vec![], RecordingTransport::new());

        let report = d
            .handle_event(&event("a 1 1480697845\nb 2 1480697845\n"))
            .await;
        assert_eq!(report.flushes.len(), 1);
        assert_eq!(report.flushes[0].points, 2);
        assert!(report.flushes[0].result.is_ok());
        assert!(d.table.route(0).buffer.is_empty());

        let calls = d.transport.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, "a value=1 1480697845\nb value=2 1480697845");
    }

    #[tokio::test]
    async fn test_stale_buffer_flushed_before_new_points() {
        let mut d = dispatcher(destination("metrics", 100, false), vec![], RecordingTransport::new());

        d.handle_event(&event("old 1 1480697845\n")).await;
        d.table
            .route_mut(0)
            .buffer
            .backdate(Duration::from_secs(60));

        let report = d.handle_event(&event("new 2 1480697845\n")).await;
        assert_eq!(report.flushes.len(), 1);
        assert_eq!(report.flushes[0].points, 1);

        let calls = d.transport.calls.lock().unwrap();
        assert_eq!(calls[0].1, "old value=1 1480697845");
        drop(calls);
        assert_eq!(d.table.route(0).buffer.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_buffer_flush_never_reaches_transport() {
        let mut d = dispatcher(destination("metrics", 100, false), vec![], RecordingTransport::new());
        d.table
            .route_mut(0)
            .buffer
            .backdate(Duration::from_secs(60));

        let report = d.handle_event(&event("")).await;
        assert_eq!(report.status, EventStatus::Ok);
        assert!(report.flushes.is_empty());
        assert!(d.transport.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_flush_still_clears_buffer() {
        let mut d = dispatcher(destination("metrics", 2, false), vec![], RecordingTransport::failing());

        let report = d
            .handle_event(&event("a 1 1480697845\nb 2 1480697845\n"))
            .await;
        // Event status stays ok; the failure is in the flush report.
        assert_eq!(report.status, EventStatus::Ok);
        assert_eq!(report.flushes.len(), 1);
        assert!(report.flushes[0].result.is_err());
        assert!(d.table.route(0).buffer.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_timestamp_line_skipped() {
        let mut d = dispatcher(destination("metrics", 100, false), vec![], RecordingTransport::new());

        d.handle_event(&event("rspec 69 invalid\n")).await;
        assert!(d.table.route(0).buffer.is_empty());
    }

    #[tokio::test]
    async fn test_proxy_mode_forwards_lines_unmodified() {
        let mut d = dispatcher(destination("metrics", 100, true), vec![], RecordingTransport::new());

        let mut e = event("rspec 69 1480697845\n");
        e.client_tags
            .insert("host".to_string(), "node1".to_string());
        d.handle_event(&e).await;

        let reports = d.drain().await;
        assert_eq!(reports.len(), 1);
        let calls = d.transport.calls.lock().unwrap();
        assert_eq!(calls[0].1, "rspec 69 1480697845");
    }

    #[tokio::test]
    async fn test_handler_routes_to_additional_destination() {
        let mut d = dispatcher(
            destination("influxdb", 100, false),
            vec![destination("events", 100, false)],
            RecordingTransport::new(),
        );

        let mut e = event("deploys 1 1480697845\n");
        e.handlers = vec!["events".to_string()];
        d.handle_event(&e).await;

        assert!(d.table.route(0).buffer.is_empty());
        assert_eq!(d.table.route(1).buffer.len(), 1);
    }

    #[tokio::test]
    async fn test_crlf_line_splitting() {
        let mut d = dispatcher(destination("metrics", 100, false), vec![], RecordingTransport::new());

        d.handle_event(&event("a 1 1480697845\r\nb 2 1480697845\n")).await;
        assert_eq!(d.table.route(0).buffer.len(), 2);
    }

    #[tokio::test]
    async fn test_check_tags_override_client_tags() {
        let mut d = dispatcher(destination("metrics", 100, false), vec![], RecordingTransport::new());

        let mut e = event("rspec 69 1480697845\n");
        e.client_tags.insert("env".to_string(), "dev".to_string());
        e.check_tags.insert("env".to_string(), "prod".to_string());
        d.handle_event(&e).await;
        d.drain().await;

        let calls = d.transport.calls.lock().unwrap();
        assert_eq!(calls[0].1, "rspec,env=prod value=69 1480697845");
    }

    #[tokio::test]
    async fn test_drain_flushes_every_destination() {
        let mut d = dispatcher(
            destination("influxdb", 100, false),
            vec![destination("events", 100, false)],
            RecordingTransport::new(),
        );

        d.handle_event(&event("a 1 1480697845\n")).await;
        let mut e = event("b 2 1480697845\n");
        e.handlers = vec!["events".to_string()];
        d.handle_event(&e).await;

        let reports = d.drain().await;
        assert_eq!(reports.len(), 2);
        assert!(d.table.route(0).buffer.is_empty());
        assert!(d.table.route(1).buffer.is_empty());
    }
}
