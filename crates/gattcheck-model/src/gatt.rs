//! Callback, command, and payload-key vocabulary of the device control
//! protocol.
//!
//! These are the literal strings carried on the wire between the harness and
//! the controlled devices; both the orchestrator and the loopback device pair
//! speak this vocabulary.

// Callback event names.
pub const ON_ADVERTISE_START_SUCCESS: &str = "onStartSuccess";
pub const ON_ADVERTISE_START_FAILURE: &str = "onStartFailure";
pub const ON_SCAN_RESULT: &str = "onScanResult";
pub const ON_SCAN_FAILED: &str = "onScanFailed";
pub const ON_SERVICE_ADDED: &str = "onServiceAdded";
pub const ON_CONNECTION_STATE_CHANGE: &str = "onConnectionStateChange";
pub const ON_SERVICES_DISCOVERED: &str = "onServiceDiscovered";
pub const ON_CHARACTERISTIC_READ: &str = "onCharacteristicRead";
pub const ON_CHARACTERISTIC_WRITE: &str = "onCharacteristicWrite";
pub const ON_CHARACTERISTIC_WRITE_REQUEST: &str = "onCharacteristicWriteRequest";

// Command actions.
pub const START_ADVERTISING: &str = "bleStartAdvertising";
pub const STOP_ADVERTISING: &str = "bleStopAdvertising";
pub const START_SCAN: &str = "bleStartScan";
pub const STOP_SCAN: &str = "bleStopScan";
pub const START_SERVER: &str = "bleStartServer";
pub const STOP_SERVER: &str = "bleStopServer";
pub const CONNECT_GATT: &str = "bleConnectGatt";
pub const DISCONNECT: &str = "bleDisconnect";
pub const DISCOVER_SERVICES: &str = "bleDiscoverServices";
pub const READ_OPERATION: &str = "bleReadOperation";
pub const WRITE_OPERATION: &str = "bleWriteOperation";

// Payload keys.
pub const STATUS: &str = "status";
pub const NEW_STATE: &str = "newState";
pub const UUID: &str = "UUID";
pub const DATA: &str = "Data";
pub const SERVICE: &str = "Service";
pub const SERVICES: &str = "Services";
pub const CHARACTERISTICS: &str = "Characteristics";
pub const RESULT: &str = "result";
pub const SCAN_RECORD: &str = "ScanRecord";
pub const DEVICE: &str = "Device";
pub const ADDRESS: &str = "Address";
pub const SCAN_LATENCY_MS: &str = "StartToResultTimeDeltaMs";
pub const CONNECTION_TIME_MS: &str = "gattConnectionTimeMs";

// Payload values.
pub const GATT_SUCCESS: &str = "GATT_SUCCESS";
pub const STATE_CONNECTED: &str = "STATE_CONNECTED";
pub const STATE_DISCONNECTED: &str = "STATE_DISCONNECTED";
