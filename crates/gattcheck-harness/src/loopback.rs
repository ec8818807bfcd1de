//! In-process scripted device pair for exercising the harness without real
//! radios.
//!
//! [`LoopbackStack`] wires an initiator and a receiver through shared state:
//! advertising becomes visible to the scanner, the registered server answers
//! reads from its fixture payloads, and writes surface on the server's
//! callback queue. A [`FaultPlan`] injects the flakiness classes the harness
//! must tolerate or flag — dropped start commands, duplicated connected
//! notifications, corrupted payloads, synchronous rejections.

use crate::device::{Device, DeviceControl, Role};
use crate::queue::EventQueue;
use gattcheck_model::fixtures::ServiceDef;
use gattcheck_model::{gatt, Event, HarnessError, Result};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

/// Address the loopback receiver advertises under.
pub const LOOPBACK_ADDRESS: &str = "10:20:30:40:50:60";

/// Scripted misbehaviour of the loopback pair.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    /// Silently swallow this many advertise start commands before the first
    /// one takes effect (the documented platform flakiness).
    pub drop_advertise_starts: u32,
    /// Emit this many extra CONNECTED state changes after the real one.
    pub duplicate_connected: u32,
    /// Serve reversed payloads for characteristic reads.
    pub corrupt_read_payload: bool,
    /// Advertise without the scan-response entries.
    pub omit_scan_response: bool,
    /// Synchronously reject this action.
    pub reject_action: Option<String>,
}

impl FaultPlan {
    #[must_use]
    pub fn drop_advertise_starts(mut self, count: u32) -> Self {
        self.drop_advertise_starts = count;
        self
    }

    #[must_use]
    pub fn duplicate_connected(mut self, count: u32) -> Self {
        self.duplicate_connected = count;
        self
    }

    #[must_use]
    pub fn corrupt_read_payload(mut self) -> Self {
        self.corrupt_read_payload = true;
        self
    }

    #[must_use]
    pub fn omit_scan_response(mut self) -> Self {
        self.omit_scan_response = true;
        self
    }

    #[must_use]
    pub fn reject_action(mut self, action: impl Into<String>) -> Self {
        self.reject_action = Some(action.into());
        self
    }
}

#[derive(Default)]
struct StackState {
    fault: FaultPlan,
    advertise_drops_left: u32,
    /// `(uuid, data)` entries visible to scanners: advertise data plus scan
    /// response merged, as a scan record carries both.
    advertising: Option<Vec<(String, String)>>,
    services: Vec<ServiceDef>,
    server_events: Option<EventQueue>,
    connected: bool,
}

/// Shared in-process stack behind a loopback initiator/receiver pair.
pub struct LoopbackStack {
    shared: Arc<Mutex<StackState>>,
}

impl LoopbackStack {
    #[must_use]
    pub fn new() -> Self {
        Self::with_faults(FaultPlan::default())
    }

    #[must_use]
    pub fn with_faults(fault: FaultPlan) -> Self {
        let advertise_drops_left = fault.drop_advertise_starts;
        Self {
            shared: Arc::new(Mutex::new(StackState {
                fault,
                advertise_drops_left,
                ..StackState::default()
            })),
        }
    }

    #[must_use]
    pub fn initiator(&self) -> Device {
        Device::new(
            Role::Initiator,
            Arc::new(LoopbackControl {
                shared: Arc::clone(&self.shared),
                role: Role::Initiator,
            }),
        )
    }

    #[must_use]
    pub fn receiver(&self) -> Device {
        Device::new(
            Role::Receiver,
            Arc::new(LoopbackControl {
                shared: Arc::clone(&self.shared),
                role: Role::Receiver,
            }),
        )
    }
}

impl Default for LoopbackStack {
    fn default() -> Self {
        Self::new()
    }
}

struct LoopbackControl {
    shared: Arc<Mutex<StackState>>,
    role: Role,
}

impl DeviceControl for LoopbackControl {
    fn invoke(&self, action: &str, args: &Value, events: &EventQueue) -> Result<()> {
        let mut state = self.shared.lock().expect("loopback state poisoned");
        if state.fault.reject_action.as_deref() == Some(action) {
            return Err(HarnessError::rejected(action, "refused by fault plan"));
        }

        match (self.role, action) {
            (Role::Receiver, gatt::START_ADVERTISING) => {
                if state.advertise_drops_left > 0 {
                    // Command silently lost; no event will ever arrive.
                    state.advertise_drops_left -= 1;
                    return Ok(());
                }
                let keys: &[&str] = if state.fault.omit_scan_response {
                    &["Data"]
                } else {
                    &["Data", "ScanResponse"]
                };
                state.advertising = Some(service_data_entries(args, keys));
                events.push(Event::new(
                    gatt::ON_ADVERTISE_START_SUCCESS,
                    json!({ "SettingsInEffect": args.get("Settings").cloned().unwrap_or(Value::Null) }),
                ));
            }
            (Role::Receiver, gatt::STOP_ADVERTISING) => {
                state.advertising = None;
            }
            (Role::Receiver, gatt::START_SERVER) => {
                let services: Vec<ServiceDef> = args
                    .get(gatt::SERVICES)
                    .cloned()
                    .and_then(|v| serde_json::from_value(v).ok())
                    .ok_or_else(|| HarnessError::rejected(action, "malformed service list"))?;
                let service_json = args
                    .get(gatt::SERVICES)
                    .and_then(|v| v.get(0))
                    .cloned()
                    .unwrap_or(Value::Null);
                state.services = services;
                state.server_events = Some(events.clone());
                events.push(Event::new(
                    gatt::ON_SERVICE_ADDED,
                    json!({ gatt::STATUS: gatt::GATT_SUCCESS, gatt::SERVICE: service_json }),
                ));
            }
            (Role::Receiver, gatt::STOP_SERVER) => {
                state.services.clear();
                state.server_events = None;
                state.connected = false;
            }
            (Role::Initiator, gatt::START_SCAN) => {
                if let Some(entries) = &state.advertising {
                    let services: Vec<Value> = entries
                        .iter()
                        .map(|(uuid, data)| json!({ gatt::UUID: uuid, gatt::DATA: data }))
                        .collect();
                    events.push(Event::new(
                        gatt::ON_SCAN_RESULT,
                        json!({
                            gatt::RESULT: {
                                gatt::DEVICE: { gatt::ADDRESS: LOOPBACK_ADDRESS },
                                gatt::SCAN_RECORD: { gatt::SERVICES: services },
                                gatt::SCAN_LATENCY_MS: 7,
                            }
                        }),
                    ));
                }
            }
            (Role::Initiator, gatt::STOP_SCAN) => {}
            (Role::Initiator, gatt::CONNECT_GATT) => {
                let address = args.get(gatt::ADDRESS).and_then(Value::as_str);
                if address != Some(LOOPBACK_ADDRESS) {
                    return Err(HarnessError::rejected(action, "unknown device address"));
                }
                state.connected = true;
                let payload = json!({
                    gatt::STATUS: gatt::GATT_SUCCESS,
                    gatt::NEW_STATE: gatt::STATE_CONNECTED,
                    gatt::CONNECTION_TIME_MS: 11,
                });
                events.push(Event::new(gatt::ON_CONNECTION_STATE_CHANGE, payload.clone()));
                for _ in 0..state.fault.duplicate_connected {
                    events.push(Event::new(gatt::ON_CONNECTION_STATE_CHANGE, payload.clone()));
                }
                if let Some(server) = &state.server_events {
                    server.push(Event::new(
                        gatt::ON_CONNECTION_STATE_CHANGE,
                        json!({
                            gatt::STATUS: gatt::GATT_SUCCESS,
                            gatt::NEW_STATE: gatt::STATE_CONNECTED,
                        }),
                    ));
                }
            }
            (Role::Initiator, gatt::DISCOVER_SERVICES) => {
                if !state.connected {
                    return Err(HarnessError::rejected(action, "not connected"));
                }
                let services: Vec<Value> = state
                    .services
                    .iter()
                    .filter_map(|s| serde_json::to_value(s).ok())
                    .collect();
                events.push(Event::new(
                    gatt::ON_SERVICES_DISCOVERED,
                    json!({ gatt::STATUS: gatt::GATT_SUCCESS, gatt::SERVICES: services }),
                ));
            }
            (Role::Initiator, gatt::READ_OPERATION) => {
                if !state.connected {
                    return Err(HarnessError::rejected(action, "not connected"));
                }
                let uuid = args
                    .get("CharacteristicUuid")
                    .and_then(Value::as_str)
                    .ok_or_else(|| HarnessError::rejected(action, "missing characteristic uuid"))?;
                let payload = state
                    .services
                    .iter()
                    .find_map(|s| s.characteristic(uuid))
                    .and_then(|c| c.payload.clone())
                    .ok_or_else(|| HarnessError::rejected(action, "unknown characteristic"))?;
                let data = if state.fault.corrupt_read_payload {
                    payload.chars().rev().collect()
                } else {
                    payload
                };
                events.push(Event::new(
                    gatt::ON_CHARACTERISTIC_READ,
                    json!({ gatt::STATUS: gatt::GATT_SUCCESS, gatt::DATA: data }),
                ));
            }
            (Role::Initiator, gatt::WRITE_OPERATION) => {
                if !state.connected {
                    return Err(HarnessError::rejected(action, "not connected"));
                }
                let uuid = args
                    .get("CharacteristicUuid")
                    .and_then(Value::as_str)
                    .ok_or_else(|| HarnessError::rejected(action, "missing characteristic uuid"))?;
                let value = args
                    .get("Value")
                    .and_then(Value::as_str)
                    .ok_or_else(|| HarnessError::rejected(action, "missing write value"))?;
                let server = state
                    .server_events
                    .as_ref()
                    .ok_or_else(|| HarnessError::rejected(action, "server not started"))?;
                server.push(Event::new(
                    gatt::ON_CHARACTERISTIC_WRITE_REQUEST,
                    json!({ "CharacteristicUuid": uuid, gatt::DATA: value }),
                ));
                events.push(Event::new(
                    gatt::ON_CHARACTERISTIC_WRITE,
                    json!({ gatt::STATUS: gatt::GATT_SUCCESS }),
                ));
            }
            (Role::Initiator, gatt::DISCONNECT) => {
                state.connected = false;
                let payload = json!({
                    gatt::STATUS: gatt::GATT_SUCCESS,
                    gatt::NEW_STATE: gatt::STATE_DISCONNECTED,
                });
                events.push(Event::new(gatt::ON_CONNECTION_STATE_CHANGE, payload.clone()));
                if let Some(server) = &state.server_events {
                    server.push(Event::new(gatt::ON_CONNECTION_STATE_CHANGE, payload));
                }
            }
            _ => {
                return Err(HarnessError::rejected(
                    action,
                    format!("unsupported action for {}", self.role),
                ));
            }
        }
        Ok(())
    }
}

/// Merges the `ServiceData` entries of the given argument keys, the way a
/// scan record carries advertise data and scan response together.
fn service_data_entries(args: &Value, keys: &[&str]) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    for key in keys {
        if let Some(list) = args
            .get(key)
            .and_then(|v| v.get("ServiceData"))
            .and_then(Value::as_array)
        {
            for entry in list {
                if let (Some(uuid), Some(data)) = (
                    entry.get(gatt::UUID).and_then(Value::as_str),
                    entry.get(gatt::DATA).and_then(Value::as_str),
                ) {
                    entries.push((uuid.to_string(), data.to_string()));
                }
            }
        }
    }
    entries
}
