//! Phase orchestration: drives both devices through the protocol phases and
//! reconciles their event streams into a [`SessionReport`].

use crate::device::{CommandHandle, Device};
use crate::retry::RetryPolicy;
use gattcheck_model::{
    fixtures, gatt, verify, Event, HarnessError, PhaseResult, PhaseStatus, Result,
    SessionFixtures, SessionReport,
};
use serde_json::{json, Value};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::time::Duration;
use tracing::{debug, info, warn};

/// Timing and sizing knobs for one session, all overridable per invocation.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Per-attempt window for the receiver to confirm advertising started.
    pub advertise_start_window: Duration,
    /// Window for the initiator to observe a matching scan result.
    pub scan_window: Duration,
    /// Window for either side to observe its connection state change.
    pub connection_timeout: Duration,
    /// Window for ordinary per-operation callbacks.
    pub operation_timeout: Duration,
    /// Attempts for flakiness-prone start commands.
    pub max_start_attempts: u32,
    /// Capacity of each per-command event queue.
    pub queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            advertise_start_window: fixtures::ADVERTISE_START_WINDOW,
            scan_window: fixtures::SCAN_WINDOW,
            connection_timeout: fixtures::CONNECTION_TIMEOUT,
            operation_timeout: fixtures::OPERATION_TIMEOUT,
            max_start_attempts: fixtures::MAX_START_ATTEMPTS,
            queue_capacity: crate::device::DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn with_advertise_start_window(mut self, window: Duration) -> Self {
        self.advertise_start_window = window;
        self
    }

    #[must_use]
    pub fn with_scan_window(mut self, window: Duration) -> Self {
        self.scan_window = window;
        self
    }

    #[must_use]
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_start_attempts(mut self, attempts: u32) -> Self {
        self.max_start_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }
}

/// Orchestrator state machine. `Closed` is the success terminal; `Failed`
/// is entered on the first assertion or timeout and no further phases run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Discovering,
    Discovered,
    Connecting,
    Connected,
    DiscoveringServices,
    ServicesDiscovered,
    Reading,
    Writing,
    Disconnecting,
    Closed,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Discover,
    Connect,
    DiscoverServices,
    Read,
    Write,
    Disconnect,
}

impl Phase {
    fn name(self) -> &'static str {
        match self {
            Self::Discover => "Discover",
            Self::Connect => "Connect",
            Self::DiscoverServices => "DiscoverServices",
            Self::Read => "Read",
            Self::Write => "Write",
            Self::Disconnect => "Disconnect",
        }
    }
}

/// One conformance session over a fixed initiator/receiver pair.
///
/// Phases run strictly in sequence; a failing phase records its diagnostic
/// (including the recent events of the relevant queues) and halts the
/// machine at [`SessionState::Failed`] with no partial rollback.
pub struct Session {
    initiator: Device,
    receiver: Device,
    fixtures: SessionFixtures,
    config: SessionConfig,
    state: SessionState,
    report: SessionReport,
    connect_address: Option<String>,
    advertise: Option<CommandHandle>,
    scan: Option<CommandHandle>,
    server: Option<CommandHandle>,
    client: Option<CommandHandle>,
}

impl Session {
    #[must_use]
    pub fn new(
        initiator: Device,
        receiver: Device,
        fixtures: SessionFixtures,
        config: SessionConfig,
    ) -> Self {
        let initiator = initiator.with_queue_capacity(config.queue_capacity);
        let receiver = receiver.with_queue_capacity(config.queue_capacity);
        Self {
            initiator,
            receiver,
            fixtures,
            config,
            state: SessionState::Idle,
            report: SessionReport::default(),
            connect_address: None,
            advertise: None,
            scan: None,
            server: None,
            client: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Runs all phases and returns the accumulated report.
    pub async fn run(mut self) -> SessionReport {
        info!(service = %self.fixtures.service.uuid, "starting conformance session");
        if self.drive().await.is_ok() {
            info!("conformance session passed");
        }
        self.report
    }

    async fn drive(&mut self) -> Result<()> {
        self.run_phase(Phase::Discover).await?;
        self.run_phase(Phase::Connect).await?;
        self.run_phase(Phase::DiscoverServices).await?;
        self.run_phase(Phase::Read).await?;
        self.run_phase(Phase::Write).await?;
        self.run_phase(Phase::Disconnect).await?;
        Ok(())
    }

    async fn run_phase(&mut self, phase: Phase) -> Result<()> {
        let started = Instant::now();
        let outcome = match phase {
            Phase::Discover => self.discover().await,
            Phase::Connect => self.connect().await,
            Phase::DiscoverServices => self.discover_services().await,
            Phase::Read => self.read_characteristics().await,
            Phase::Write => self.write_characteristics().await,
            Phase::Disconnect => self.disconnect().await,
        };
        let latency = started.elapsed();
        match outcome {
            Ok(()) => {
                info!(phase = phase.name(), ?latency, "phase passed");
                self.report.record(PhaseResult::pass(phase.name(), latency));
                Ok(())
            }
            Err(err) => {
                let status = if err.is_timeout() {
                    PhaseStatus::Timeout
                } else {
                    PhaseStatus::Fail
                };
                let diagnostic = self.diagnose(&err);
                warn!(phase = phase.name(), %err, "phase failed, halting session");
                self.set_state(SessionState::Failed);
                self.report
                    .record(PhaseResult::failed(phase.name(), status, latency, diagnostic));
                Err(err)
            }
        }
    }

    /// Receiver advertises (under the retry policy, since the first start
    /// command may be silently dropped); once advertising is confirmed, the
    /// initiator scans and must observe the fixture service data plus a
    /// distinct scan-response entry.
    async fn discover(&mut self) -> Result<()> {
        self.set_state(SessionState::Discovering);

        let advertise_args = json!({
            "Settings": self.fixtures.advertise_settings,
            "Data": self.fixtures.advertise_data,
            "ScanResponse": self.fixtures.scan_response,
        });
        let policy = RetryPolicy::new(
            self.config.max_start_attempts,
            self.config.advertise_start_window,
        );
        let receiver = self.receiver.clone();
        let window = self.config.advertise_start_window;
        // Each attempt keeps its handle so the last queue stays available
        // for teardown and diagnostics even when the wait times out.
        let last_handle: Arc<Mutex<Option<CommandHandle>>> = Arc::new(Mutex::new(None));
        let result = policy
            .run(gatt::ON_ADVERTISE_START_SUCCESS, |attempt| {
                let receiver = receiver.clone();
                let args = advertise_args.clone();
                let last_handle = Arc::clone(&last_handle);
                async move {
                    let handle = receiver.invoke(gatt::START_ADVERTISING, args)?;
                    let queue = handle.events().clone();
                    *last_handle.lock().expect("advertise handle slot poisoned") = Some(handle);
                    let failures = queue.drain_all(gatt::ON_ADVERTISE_START_FAILURE);
                    if !failures.is_empty() {
                        warn!(attempt, "start failure event detected after advertise command");
                    }
                    queue
                        .wait_for_match(gatt::ON_ADVERTISE_START_SUCCESS, window, |e| {
                            e.is(gatt::ON_ADVERTISE_START_SUCCESS)
                        })
                        .await
                }
            })
            .await;
        self.advertise = last_handle
            .lock()
            .expect("advertise handle slot poisoned")
            .take();
        result?;
        info!("BLE advertising started");

        let scan_args = json!({
            "Filters": [self.fixtures.scan_filter],
            "Settings": self.fixtures.scan_settings,
        });
        let scan = self.initiator.invoke(gatt::START_SCAN, scan_args)?;
        let scan_queue = scan.events().clone();
        self.scan = Some(scan);

        let (service_uuid, advertised_data) = self
            .fixtures
            .advertised_service_data()
            .map(|(u, d)| (u.to_string(), d.to_string()))
            .ok_or_else(|| HarnessError::assertion("fixtures carry no advertise service data"))?;
        let scan_result = scan_queue
            .wait_for_match(gatt::ON_SCAN_RESULT, self.config.scan_window, |e| {
                is_required_scan_result(e, &service_uuid, &advertised_data)
            })
            .await?;

        // Advertise data and scan response are two separate payloads; the
        // matching predicate only proves the former.
        let entries = scan_record_services(&scan_result);
        let (response_uuid, response_data) = self
            .fixtures
            .scan_response_service_data()
            .map(|(u, d)| (u.to_string(), d.to_string()))
            .ok_or_else(|| HarnessError::assertion("fixtures carry no scan response data"))?;
        verify::expect_service_entry(&entries, &response_uuid, &response_data, "scan response")?;

        let address = scan_result
            .str_at(&[gatt::RESULT, gatt::DEVICE, gatt::ADDRESS])
            .ok_or_else(|| HarnessError::assertion("scan result carries no device address"))?;
        self.connect_address = Some(address.to_string());

        if let Some(ms) = scan_result
            .at(&[gatt::RESULT, gatt::SCAN_LATENCY_MS])
            .and_then(Value::as_u64)
        {
            info!(scan_latency_ms = ms, "discovery metrics");
        }
        self.set_state(SessionState::Discovered);
        Ok(())
    }

    /// Receiver starts its GATT server (service membership verified), then
    /// the initiator connects and must see exactly one CONNECTED state
    /// change; the receiver independently observes its own connected event.
    async fn connect(&mut self) -> Result<()> {
        self.set_state(SessionState::Connecting);

        let server_args = json!({ "Services": [self.fixtures.service] });
        let server = self.receiver.invoke(gatt::START_SERVER, server_args)?;
        let server_queue = server.events().clone();
        self.server = Some(server);

        let added = server_queue
            .wait_for_match(gatt::ON_SERVICE_ADDED, self.config.operation_timeout, |e| {
                e.is(gatt::ON_SERVICE_ADDED)
            })
            .await?;
        verify::expect_status_success(&added)?;
        let observed = added
            .at(&[gatt::SERVICE])
            .map(characteristic_uuids_of)
            .unwrap_or_default();
        verify::expect_uuid_superset(&observed, &self.fixtures.service.characteristic_uuids())?;
        info!("BLE server started");

        let address = self
            .connect_address
            .clone()
            .ok_or_else(|| HarnessError::assertion("no device address captured during discovery"))?;
        let client = self
            .initiator
            .invoke(gatt::CONNECT_GATT, json!({ "Address": address }))?;
        let client_queue = client.events().clone();
        self.client = Some(client);

        let connected = client_queue
            .wait_for_match(
                gatt::ON_CONNECTION_STATE_CHANGE,
                self.config.connection_timeout,
                |e| e.is(gatt::ON_CONNECTION_STATE_CHANGE),
            )
            .await?;
        // Exactly-once: a concurrent duplicate is a protocol defect even if
        // the final state is correct.
        let extras = client_queue.drain_all(gatt::ON_CONNECTION_STATE_CHANGE);
        verify::expect_no_extras(&extras, gatt::ON_CONNECTION_STATE_CHANGE, 0)?;
        verify::expect_status_success(&connected)?;
        verify::expect_state(&connected, gatt::STATE_CONNECTED)?;
        info!("BLE client connected");

        let server_event = server_queue
            .wait_for_match(
                gatt::ON_CONNECTION_STATE_CHANGE,
                self.config.connection_timeout,
                |e| e.is(gatt::ON_CONNECTION_STATE_CHANGE),
            )
            .await?;
        verify::expect_status_success(&server_event)?;
        verify::expect_state(&server_event, gatt::STATE_CONNECTED)?;

        if let Some(ms) = connected
            .field(gatt::CONNECTION_TIME_MS)
            .and_then(Value::as_u64)
        {
            info!(connection_time_ms = ms, "connection metrics");
        }
        self.set_state(SessionState::Connected);
        Ok(())
    }

    /// Exactly one services-discovered event whose payload lists the fixture
    /// service and at least its characteristic set.
    async fn discover_services(&mut self) -> Result<()> {
        self.set_state(SessionState::DiscoveringServices);

        let handle = self.initiator.invoke(gatt::DISCOVER_SERVICES, json!({}))?;
        let discovered = handle
            .events()
            .wait_for_match(
                gatt::ON_SERVICES_DISCOVERED,
                self.config.operation_timeout,
                |e| e.is(gatt::ON_SERVICES_DISCOVERED),
            )
            .await?;
        let extras = handle.events().drain_all(gatt::ON_SERVICES_DISCOVERED);
        verify::expect_no_extras(&extras, gatt::ON_SERVICES_DISCOVERED, 0)?;
        verify::expect_status_success(&discovered)?;

        let services = discovered
            .field(gatt::SERVICES)
            .and_then(Value::as_array)
            .ok_or_else(|| HarnessError::assertion("services-discovered event lists no services"))?;
        let target = services
            .iter()
            .find(|s| {
                s.get(gatt::UUID).and_then(Value::as_str) == Some(self.fixtures.service.uuid.as_str())
            })
            .ok_or_else(|| {
                HarnessError::assertion(format!(
                    "service {} not present in discovery result",
                    self.fixtures.service.uuid
                ))
            })?;
        let observed = characteristic_uuids_of(target);
        verify::expect_uuid_superset(&observed, &self.fixtures.service.characteristic_uuids())?;

        info!("BLE discover services finished");
        self.set_state(SessionState::ServicesDiscovered);
        Ok(())
    }

    /// Reads every fixture read characteristic and verifies the exact
    /// payload round-trips.
    async fn read_characteristics(&mut self) -> Result<()> {
        self.set_state(SessionState::Reading);

        let reads: Vec<(String, Option<String>)> = self
            .fixtures
            .read_characteristics()
            .iter()
            .map(|c| (c.uuid.clone(), c.payload.clone()))
            .collect();
        for (uuid, payload) in reads {
            let expected = payload.ok_or_else(|| {
                HarnessError::assertion(format!("read characteristic {uuid} has no fixture payload"))
            })?;
            let handle = self.initiator.invoke(
                gatt::READ_OPERATION,
                json!({
                    "ServiceUuid": self.fixtures.service.uuid,
                    "CharacteristicUuid": uuid,
                }),
            )?;
            let event = handle
                .events()
                .wait_for_match(
                    gatt::ON_CHARACTERISTIC_READ,
                    self.config.operation_timeout,
                    |e| e.is(gatt::ON_CHARACTERISTIC_READ),
                )
                .await?;
            verify::expect_status_success(&event)?;
            verify::expect_payload_equals(&event, gatt::DATA, &expected)?;
            debug!(characteristic = %uuid, "read operation finished");
        }
        Ok(())
    }

    /// Writes every fixture write characteristic. Both sides must observe
    /// completion, and the receiver's write request (with equal payload) is
    /// awaited first — it must precede, never substitute for, the
    /// initiator's completion callback.
    async fn write_characteristics(&mut self) -> Result<()> {
        self.set_state(SessionState::Writing);

        let server_queue = self
            .server
            .as_ref()
            .map(|h| h.events().clone())
            .ok_or_else(|| HarnessError::assertion("write phase reached without a server"))?;
        let writes: Vec<(String, Option<String>)> = self
            .fixtures
            .write_characteristics()
            .iter()
            .map(|c| (c.uuid.clone(), c.payload.clone()))
            .collect();
        for (uuid, payload) in writes {
            let value = payload.ok_or_else(|| {
                HarnessError::assertion(format!(
                    "write characteristic {uuid} has no fixture payload"
                ))
            })?;
            let handle = self.initiator.invoke(
                gatt::WRITE_OPERATION,
                json!({
                    "ServiceUuid": self.fixtures.service.uuid,
                    "CharacteristicUuid": uuid,
                    "Value": value,
                }),
            )?;
            let request = server_queue
                .wait_for_match(
                    gatt::ON_CHARACTERISTIC_WRITE_REQUEST,
                    self.config.operation_timeout,
                    |e| e.is(gatt::ON_CHARACTERISTIC_WRITE_REQUEST),
                )
                .await?;
            verify::expect_payload_equals(&request, gatt::DATA, &value)?;
            handle
                .events()
                .wait_for_match(
                    gatt::ON_CHARACTERISTIC_WRITE,
                    self.config.operation_timeout,
                    |e| e.is(gatt::ON_CHARACTERISTIC_WRITE),
                )
                .await?;
            debug!(characteristic = %uuid, "write operation finished");
        }
        Ok(())
    }

    /// Initiator disconnects (state change verified), then the receiver's
    /// server, the scan, and the advertisement are torn down — commands
    /// only, not event-gated.
    async fn disconnect(&mut self) -> Result<()> {
        self.set_state(SessionState::Disconnecting);

        let handle = self.initiator.invoke(gatt::DISCONNECT, json!({}))?;
        let event = handle
            .events()
            .wait_for_match(
                gatt::ON_CONNECTION_STATE_CHANGE,
                self.config.operation_timeout,
                |e| e.is(gatt::ON_CONNECTION_STATE_CHANGE),
            )
            .await?;
        verify::expect_status_success(&event)?;
        verify::expect_state(&event, gatt::STATE_DISCONNECTED)?;
        info!("BLE client disconnected");

        self.receiver.invoke(gatt::STOP_SERVER, json!({}))?;
        self.server = None;
        if let Some(scan) = self.scan.take() {
            self.initiator.invoke(
                gatt::STOP_SCAN,
                json!({ "CallbackId": scan.id().to_string() }),
            )?;
        }
        if let Some(advertise) = self.advertise.take() {
            self.receiver.invoke(
                gatt::STOP_ADVERTISING,
                json!({ "CallbackId": advertise.id().to_string() }),
            )?;
        }
        self.set_state(SessionState::Closed);
        Ok(())
    }

    fn set_state(&mut self, next: SessionState) {
        debug!(from = %self.state, to = %next, "session state transition");
        self.state = next;
    }

    /// Failure diagnostic: the unmet expectation plus the recent events of
    /// every queue the session holds.
    fn diagnose(&self, err: &HarnessError) -> String {
        let mut out = err.to_string();
        let queues = [
            ("advertise", &self.advertise),
            ("scan", &self.scan),
            ("server", &self.server),
            ("client", &self.client),
        ];
        for (tag, handle) in queues {
            if let Some(handle) = handle {
                let recent = handle.events().recent();
                if !recent.is_empty() {
                    out.push_str(&format!("; recent {tag} events: {}", format_events(&recent)));
                }
            }
        }
        out
    }
}

/// Whether a scan-result event carries the advertised `(uuid, data)` service
/// entry the session is looking for.
fn is_required_scan_result(event: &Event, service_uuid: &str, data: &str) -> bool {
    scan_record_services(event)
        .iter()
        .any(|(u, d)| u == service_uuid && d == data)
}

/// All `(uuid, data)` service entries of a scan-result event's scan record.
fn scan_record_services(event: &Event) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    if let Some(services) = event
        .at(&[gatt::RESULT, gatt::SCAN_RECORD, gatt::SERVICES])
        .and_then(Value::as_array)
    {
        for service in services {
            if let (Some(uuid), Some(data)) = (
                service.get(gatt::UUID).and_then(Value::as_str),
                service.get(gatt::DATA).and_then(Value::as_str),
            ) {
                entries.push((uuid.to_string(), data.to_string()));
            }
        }
    }
    entries
}

/// Characteristic UUIDs listed by a service payload.
fn characteristic_uuids_of(service: &Value) -> Vec<String> {
    service
        .get(gatt::CHARACTERISTICS)
        .and_then(Value::as_array)
        .map(|chars| {
            chars
                .iter()
                .filter_map(|c| c.get(gatt::UUID).and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn format_events(events: &[Event]) -> String {
    let rendered: Vec<String> = events
        .iter()
        .map(|e| format!("{}{}", e.name, e.data))
        .collect();
    format!("[{}]", rendered.join(", "))
}

/// Runs one conformance session to completion.
pub async fn run_session(
    initiator: Device,
    receiver: Device,
    fixtures: SessionFixtures,
    config: SessionConfig,
) -> SessionReport {
    Session::new(initiator, receiver, fixtures, config).run().await
}

/// Session-level retry: reruns an entire failed session from scratch.
///
/// Deliberately a separate layer from [`RetryPolicy`], which reissues a
/// single start command inside a phase; the two compose but never merge.
#[derive(Debug, Clone, Copy)]
pub struct SessionRetry {
    pub max_attempts: u32,
}

/// Runs up to `retry.max_attempts` sessions, returning the first passing
/// report or the last failing one.
pub async fn run_session_with_retries(
    initiator: &Device,
    receiver: &Device,
    fixtures: &SessionFixtures,
    config: SessionConfig,
    retry: SessionRetry,
) -> SessionReport {
    let attempts = retry.max_attempts.max(1);
    let mut last = SessionReport::default();
    for attempt in 1..=attempts {
        let report = Session::new(
            initiator.clone(),
            receiver.clone(),
            fixtures.clone(),
            config,
        )
        .run()
        .await;
        if report.passed() || attempt == attempts {
            return report;
        }
        warn!(attempt, "session failed, retrying from scratch");
        last = report;
    }
    last
}
