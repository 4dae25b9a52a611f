//! Supabase (PostgREST) table writer.

use super::Publisher;
use crate::config::Config;
use crate::error::PublishError;
use crate::logging::log_publish_error;
use crate::models::{MeasurementPayload, PublishResult};
use crate::network::LinkStatus;
use crate::time_utils::{Clock, elapsed_ms};
use embedded_hal::delay::DelayNs;
use log::info;

const NAME: &str = "Supabase";

/// Minimal blocking HTTP client.
pub trait HttpTransport {
    /// Prepare a client session; called once the network is up.
    fn open(&mut self) -> anyhow::Result<()>;

    /// POST `body` and return the response status.
    fn post(&mut self, url: &str, headers: &[(&str, &str)], body: &[u8]) -> anyhow::Result<u16>;
}

pub fn is_success_response(code: u16) -> bool {
    (200..300).contains(&code)
}

pub struct SupabasePublisher<H, L, C, D> {
    url: String,
    api_key: String,
    table_name: String,
    endpoint: String,
    transport: H,
    link: L,
    clock: C,
    delay: D,
    pacing_ms: u64,
    last_write_ms: Option<u64>,
    initialized: bool,
    last_error: String,
}

impl<H, L, C, D> SupabasePublisher<H, L, C, D>
where
    H: HttpTransport,
    L: LinkStatus,
    C: Clock,
    D: DelayNs,
{
    pub fn new(transport: H, link: L, clock: C, delay: D, config: &Config) -> Self {
        Self {
            url: config.supabase_url.clone(),
            api_key: config.supabase_key.clone(),
            table_name: config.table_name.clone(),
            endpoint: String::new(),
            transport,
            link,
            clock,
            delay,
            pacing_ms: u64::from(config.publish_pacing_ms),
            last_write_ms: None,
            initialized: false,
            last_error: String::new(),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Takes effect on the next `initialize`.
    pub fn set_table_name(&mut self, table_name: impl Into<String>) {
        self.table_name = table_name.into();
    }

    /// REST endpoint rows are inserted into, empty until initialized.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn fail(&mut self, error: PublishError) -> PublishError {
        log_publish_error(NAME, &error);
        self.last_error = error.to_string();
        error
    }

    /// Keep successive writes at least `pacing_ms` apart.
    fn pace(&mut self) {
        if let Some(last) = self.last_write_ms {
            let since = elapsed_ms(&self.clock, last);
            if since < self.pacing_ms {
                let wait = u32::try_from(self.pacing_ms - since).unwrap_or(u32::MAX);
                self.delay.delay_ms(wait);
            }
        }
    }

    fn write(&mut self, body: &[u8]) -> Result<u16, PublishError> {
        self.pace();

        let bearer = format!("Bearer {}", self.api_key);
        let headers = [
            ("apikey", self.api_key.as_str()),
            ("Authorization", bearer.as_str()),
            ("Content-Type", "application/json"),
            ("Prefer", "return=minimal"),
        ];
        let response = self.transport.post(&self.endpoint, &headers, body);
        self.last_write_ms = Some(self.clock.now_ms());

        response.map_err(|e| PublishError::Transport(format!("{:#}", e)))
    }
}

impl<H, L, C, D> Publisher for SupabasePublisher<H, L, C, D>
where
    H: HttpTransport,
    L: LinkStatus,
    C: Clock,
    D: DelayNs,
{
    fn name(&self) -> &'static str {
        NAME
    }

    fn initialize(&mut self) -> Result<(), PublishError> {
        info!("Initializing Supabase publisher...");
        self.initialized = false;

        if self.url.trim().is_empty() || self.api_key.trim().is_empty() {
            return Err(self.fail(PublishError::MissingCredentials));
        }
        if !self.link.is_connected() {
            return Err(self.fail(PublishError::LinkDown));
        }
        if let Err(e) = self.transport.open() {
            return Err(self.fail(PublishError::Session(format!("{:#}", e))));
        }

        self.endpoint = format!(
            "{}/rest/v1/{}",
            self.url.trim_end_matches('/'),
            self.table_name
        );
        self.initialized = true;
        self.last_error.clear();

        info!("✅ Supabase publisher initialized");
        info!("  URL: {}", self.url);
        info!("  Table: {}", self.table_name);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.initialized && self.link.is_connected()
    }

    fn publish(&mut self, location: &str, data_type: &str, value: f32) -> PublishResult {
        if !self.is_ready() {
            let error = self.fail(PublishError::NotReady);
            return PublishResult::failed(None, error.to_string(), self.clock.now_ms());
        }

        let payload = match MeasurementPayload::new(location, data_type, value).to_json() {
            Ok(payload) => payload,
            Err(e) => {
                let error = self.fail(PublishError::Encode(e.to_string()));
                return PublishResult::failed(None, error.to_string(), self.clock.now_ms());
            }
        };
        info!("📡 Publishing to Supabase: {}", payload);

        match self.write(payload.as_bytes()) {
            Ok(code) if is_success_response(code) => {
                info!("✅ Data published successfully! (Status {})", code);
                PublishResult::ok(code, self.clock.now_ms())
            }
            Ok(code) => {
                let error = self.fail(PublishError::Http(code));
                PublishResult::failed(Some(code), error.to_string(), self.clock.now_ms())
            }
            Err(e) => {
                let error = self.fail(e);
                PublishResult::failed(None, error.to_string(), self.clock.now_ms())
            }
        }
    }

    fn last_error(&self) -> &str {
        &self.last_error
    }

    fn fail_batch(&mut self, error: PublishError) {
        self.fail(error);
    }
}

#[cfg(target_os = "espidf")]
pub use esp::EspHttpTransport;

#[cfg(target_os = "espidf")]
mod esp {
    use super::HttpTransport;
    use anyhow::{Context, Result};
    use embedded_svc::http::client::Client;
    use embedded_svc::io::Write;
    use esp_idf_svc::http::client::{Configuration as HttpConfig, EspHttpConnection};
    use std::time::Duration;

    /// HTTPS client over the ESP-IDF stack, verifying servers against the
    /// bundled CA certificates.
    #[derive(Default)]
    pub struct EspHttpTransport {
        client: Option<Client<EspHttpConnection>>,
    }

    impl HttpTransport for EspHttpTransport {
        fn open(&mut self) -> Result<()> {
            let connection = EspHttpConnection::new(&HttpConfig {
                timeout: Some(Duration::from_secs(10)),
                crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
                ..Default::default()
            })
            .context("‼️ Failed to create HTTP connection")?;
            self.client = Some(Client::wrap(connection));
            Ok(())
        }

        fn post(&mut self, url: &str, headers: &[(&str, &str)], body: &[u8]) -> Result<u16> {
            let client = self
                .client
                .as_mut()
                .context("HTTP session not opened")?;

            let content_length = body.len().to_string();
            let mut all_headers = headers.to_vec();
            all_headers.push(("Content-Length", content_length.as_str()));

            let mut request = client.post(url, &all_headers)?;
            request.write_all(body)?;
            request.flush()?;
            let response = request.submit()?;
            Ok(response.status())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MeasurementRecord, Reading};
    use crate::testing::MockClock;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[derive(Clone, Debug)]
    struct Sent {
        url: String,
        headers: Vec<(String, String)>,
        body: String,
        at_ms: u64,
    }

    #[derive(Clone)]
    struct FakeTransport {
        clock: MockClock,
        sent: Rc<RefCell<Vec<Sent>>>,
        responses: Rc<RefCell<VecDeque<anyhow::Result<u16>>>>,
        fail_open: bool,
    }

    impl FakeTransport {
        fn new(clock: &MockClock) -> Self {
            Self {
                clock: clock.clone(),
                sent: Rc::default(),
                responses: Rc::default(),
                fail_open: false,
            }
        }

        fn respond(&self, response: anyhow::Result<u16>) {
            self.responses.borrow_mut().push_back(response);
        }

        fn sent(&self) -> Vec<Sent> {
            self.sent.borrow().clone()
        }
    }

    impl HttpTransport for FakeTransport {
        fn open(&mut self) -> anyhow::Result<()> {
            if self.fail_open {
                anyhow::bail!("no sockets left");
            }
            Ok(())
        }

        fn post(&mut self, url: &str, headers: &[(&str, &str)], body: &[u8]) -> anyhow::Result<u16> {
            self.sent.borrow_mut().push(Sent {
                url: url.to_string(),
                headers: headers
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                body: String::from_utf8_lossy(body).into_owned(),
                at_ms: self.clock.now_ms(),
            });
            self.responses.borrow_mut().pop_front().unwrap_or(Ok(201))
        }
    }

    #[derive(Clone, Default)]
    struct FakeLink(Rc<Cell<bool>>);

    impl FakeLink {
        fn up() -> Self {
            Self(Rc::new(Cell::new(true)))
        }
    }

    impl LinkStatus for FakeLink {
        fn is_connected(&self) -> bool {
            self.0.get()
        }
    }

    type TestPublisher = SupabasePublisher<FakeTransport, FakeLink, MockClock, MockClock>;

    fn config() -> Config {
        Config {
            supabase_url: "https://project.supabase.co/".into(),
            supabase_key: "anon-key".into(),
            ..Config::default()
        }
    }

    fn publisher(config: &Config) -> (TestPublisher, FakeTransport, FakeLink, MockClock) {
        let clock = MockClock::at_ms(10_000);
        let transport = FakeTransport::new(&clock);
        let link = FakeLink::up();
        let publisher = SupabasePublisher::new(
            transport.clone(),
            link.clone(),
            clock.clone(),
            clock.clone(),
            config,
        );
        (publisher, transport, link, clock)
    }

    fn ready_publisher() -> (TestPublisher, FakeTransport, FakeLink, MockClock) {
        let (mut publisher, transport, link, clock) = publisher(&config());
        publisher.initialize().unwrap();
        (publisher, transport, link, clock)
    }

    #[test]
    fn empty_credentials_fail_initialize() {
        let (mut publisher, _, _, _) = publisher(&Config::default());

        assert_eq!(publisher.initialize(), Err(PublishError::MissingCredentials));
        assert!(!publisher.is_ready());
        assert!(!publisher.last_error().is_empty());
    }

    #[test]
    fn link_down_fails_initialize() {
        let (mut publisher, _, link, _) = publisher(&config());
        link.0.set(false);

        assert_eq!(publisher.initialize(), Err(PublishError::LinkDown));
        assert!(!publisher.is_ready());
    }

    #[test]
    fn session_failure_fails_initialize() {
        let config = config();
        let clock = MockClock::new();
        let mut transport = FakeTransport::new(&clock);
        transport.fail_open = true;
        let mut publisher =
            SupabasePublisher::new(transport, FakeLink::up(), clock.clone(), clock, &config);

        assert!(matches!(publisher.initialize(), Err(PublishError::Session(_))));
    }

    #[test]
    fn builds_table_endpoint() {
        let (publisher, _, _, _) = ready_publisher();
        assert_eq!(
            publisher.endpoint(),
            "https://project.supabase.co/rest/v1/environment_measurements"
        );
        assert_eq!(publisher.name(), "Supabase");
    }

    #[test]
    fn readiness_tracks_the_live_link() {
        let (publisher, _, link, _) = ready_publisher();
        assert!(publisher.is_ready());
        link.0.set(false);
        assert!(!publisher.is_ready());
        link.0.set(true);
        assert!(publisher.is_ready());
    }

    #[test]
    fn publish_sends_authenticated_json() {
        let (mut publisher, transport, _, _) = ready_publisher();

        let result = publisher.publish("room", "temperature", 21.5);

        assert!(result.success);
        assert_eq!(result.response_code, Some(201));
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].body, r#"{"location":"room","type":"temperature","value":21.50}"#);
        assert!(sent[0].headers.contains(&("apikey".into(), "anon-key".into())));
        assert!(sent[0]
            .headers
            .contains(&("Authorization".into(), "Bearer anon-key".into())));

        let record: MeasurementRecord = serde_json::from_str(&sent[0].body).unwrap();
        assert_eq!(record.data_type, "temperature");
        assert!((record.value - 21.5).abs() < 0.005);
    }

    #[test]
    fn non_2xx_is_a_failure() {
        let (mut publisher, transport, _, _) = ready_publisher();
        transport.respond(Ok(401));

        let result = publisher.publish("room", "co2", 600.0);

        assert!(!result.success);
        assert_eq!(result.response_code, Some(401));
        assert_eq!(result.error_message.as_deref(), Some("HTTP error: 401"));
        assert_eq!(publisher.last_error(), "HTTP error: 401");
    }

    #[test]
    fn transport_error_is_a_failure_without_code() {
        let (mut publisher, transport, _, _) = ready_publisher();
        transport.respond(Err(anyhow::anyhow!("connection reset")));

        let result = publisher.publish("room", "co2", 600.0);

        assert!(!result.success);
        assert_eq!(result.response_code, None);
        assert!(publisher.last_error().contains("connection reset"));
    }

    #[test]
    fn publish_when_not_ready_sends_nothing() {
        let (mut publisher, transport, _, _) = publisher(&config());

        let result = publisher.publish("room", "temperature", 20.0);

        assert!(!result.success);
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn mismatched_batch_publishes_nothing() {
        let (mut publisher, transport, _, _) = ready_publisher();
        let readings = vec![Reading::success(21.0, 0), Reading::success(40.0, 0)];

        assert_eq!(publisher.publish_batch("DHT11", "room", &readings, &["temperature"]), 0);
        assert!(transport.sent().is_empty());
        assert!(publisher.last_error().contains("mismatch"));
    }

    #[test]
    fn batch_skips_invalid_entries() {
        let (mut publisher, transport, _, _) = ready_publisher();
        let readings = vec![
            Reading::success(21.0, 0),
            Reading::invalid("Invalid humidity reading", 0),
        ];

        let published =
            publisher.publish_batch("DHT11", "room", &readings, &["temperature", "humidity"]);

        assert_eq!(published, 1);
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].body.contains(r#""type":"temperature""#));
    }

    #[test]
    fn batch_counts_only_confirmed_writes() {
        let (mut publisher, transport, _, _) = ready_publisher();
        transport.respond(Ok(500));
        transport.respond(Ok(200));
        let readings = vec![Reading::success(21.0, 0), Reading::success(40.0, 0)];

        let published =
            publisher.publish_batch("DHT11", "room", &readings, &["temperature", "humidity"]);

        assert_eq!(published, 1);
        assert_eq!(transport.sent().len(), 2);
    }

    #[test]
    fn successive_writes_are_paced() {
        let (mut publisher, transport, _, clock) = ready_publisher();
        let readings = vec![Reading::success(21.0, 0), Reading::success(40.0, 0)];

        publisher.publish_batch("DHT11", "room", &readings, &["temperature", "humidity"]);
        clock.advance_ms(300);
        publisher.publish("room", "co2", 700.0);

        let at: Vec<u64> = transport.sent().iter().map(|s| s.at_ms).collect();
        assert_eq!(at, vec![10_000, 11_000, 12_000]);
        assert!(transport
            .sent()
            .iter()
            .all(|s| s.url.ends_with("/rest/v1/environment_measurements")));
    }

    #[test]
    fn success_range_is_2xx() {
        assert!(is_success_response(200));
        assert!(is_success_response(201));
        assert!(is_success_response(299));
        assert!(!is_success_response(199));
        assert!(!is_success_response(300));
        assert!(!is_success_response(404));
    }
}
