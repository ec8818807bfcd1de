//! Static per-run configuration shared by both session participants.
//!
//! Serde renames keep the protocol's wire keys (`UUID`, `Data`, …) so fixture
//! descriptors serialize directly into command arguments.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// UUID of the primary test service.
pub const TEST_SERVICE_UUID: &str = "0000fe23-0000-1000-8000-00805f9b34fb";
/// UUID carried by the scan-response payload, distinct from the service UUID.
pub const TEST_SCAN_RESPONSE_UUID: &str = "0000e639-0000-1000-8000-00805f9b34fb";
pub const TEST_READ_UUID: &str = "0000e631-0000-1000-8000-00805f9b34fb";
pub const TEST_SECOND_READ_UUID: &str = "0000e634-0000-1000-8000-00805f9b34fb";
pub const TEST_THIRD_READ_UUID: &str = "0000e635-0000-1000-8000-00805f9b34fb";
pub const TEST_WRITE_UUID: &str = "0000e632-0000-1000-8000-00805f9b34fb";
pub const TEST_SECOND_WRITE_UUID: &str = "0000e633-0000-1000-8000-00805f9b34fb";

/// Window for the receiver to confirm advertising started (per attempt).
pub const ADVERTISE_START_WINDOW: Duration = Duration::from_secs(30);
/// Window for the initiator to observe a matching scan result.
pub const SCAN_WINDOW: Duration = Duration::from_secs(20);
/// Window for either side to observe its connection state change.
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(60);
/// Window for ordinary per-operation callbacks (read, write, disconnect).
pub const OPERATION_TIMEOUT: Duration = Duration::from_secs(30);
/// The platform is known to silently drop the first start command after some
/// state transitions, so start commands get one reissue by default.
pub const MAX_START_ATTEMPTS: u32 = 2;
/// How long the receiver keeps advertising, in milliseconds.
pub const ADVERTISING_TIME_MS: u64 = 120_000;

const ADVERTISE_PAYLOAD_LEN: usize = 16;
const CHARACTERISTIC_PAYLOAD_LEN: usize = 8;

/// Random printable-ASCII payload of the given length.
#[must_use]
pub fn random_ascii(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Property {
    #[serde(rename = "PROPERTY_READ")]
    Read,
    #[serde(rename = "PROPERTY_WRITE")]
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Permission {
    #[serde(rename = "PERMISSION_READ")]
    Read,
    #[serde(rename = "PERMISSION_WRITE")]
    Write,
}

/// One characteristic of the fixture service.
///
/// For read characteristics `payload` is the value the server must return;
/// for write characteristics it is the value the initiator sends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacteristicDef {
    #[serde(rename = "UUID")]
    pub uuid: String,
    #[serde(rename = "Property")]
    pub property: Property,
    #[serde(rename = "Permission")]
    pub permission: Permission,
    #[serde(rename = "Data", skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

impl CharacteristicDef {
    #[must_use]
    pub fn read(uuid: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            property: Property::Read,
            permission: Permission::Read,
            payload: Some(payload.into()),
        }
    }

    #[must_use]
    pub fn write(uuid: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            property: Property::Write,
            permission: Permission::Write,
            payload: Some(payload.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDef {
    #[serde(rename = "UUID")]
    pub uuid: String,
    #[serde(rename = "Type")]
    pub service_type: String,
    #[serde(rename = "Characteristics")]
    pub characteristics: Vec<CharacteristicDef>,
}

impl ServiceDef {
    #[must_use]
    pub fn primary(uuid: impl Into<String>, characteristics: Vec<CharacteristicDef>) -> Self {
        Self {
            uuid: uuid.into(),
            service_type: "SERVICE_TYPE_PRIMARY".to_string(),
            characteristics,
        }
    }

    #[must_use]
    pub fn characteristic_uuids(&self) -> Vec<String> {
        self.characteristics.iter().map(|c| c.uuid.clone()).collect()
    }

    #[must_use]
    pub fn characteristic(&self, uuid: &str) -> Option<&CharacteristicDef> {
        self.characteristics.iter().find(|c| c.uuid == uuid)
    }
}

/// A `{UUID, Data}` service-data entry of an advertisement or scan response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceData {
    #[serde(rename = "UUID")]
    pub uuid: String,
    #[serde(rename = "Data")]
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvertisePayload {
    #[serde(rename = "IncludeDeviceName")]
    pub include_device_name: bool,
    #[serde(rename = "ServiceData")]
    pub service_data: Vec<ServiceData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvertiseSettings {
    #[serde(rename = "AdvertiseMode")]
    pub mode: String,
    #[serde(rename = "Timeout")]
    pub timeout_ms: u64,
    #[serde(rename = "Connectable")]
    pub connectable: bool,
    #[serde(rename = "TxPowerLevel")]
    pub tx_power: String,
}

impl Default for AdvertiseSettings {
    fn default() -> Self {
        Self {
            mode: "ADVERTISE_MODE_LOW_LATENCY".to_string(),
            timeout_ms: ADVERTISING_TIME_MS,
            connectable: true,
            tx_power: "ADVERTISE_TX_POWER_ULTRA_LOW".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanFilter {
    #[serde(rename = "ServiceUuid")]
    pub service_uuid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSettings {
    #[serde(rename = "ScanMode")]
    pub scan_mode: String,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            scan_mode: "SCAN_MODE_LOW_LATENCY".to_string(),
        }
    }
}

/// The complete fixture set for one conformance run.
///
/// Defaults to one primary service with three read and two write
/// characteristics, a 16-char advertise payload and a distinct scan-response
/// payload, all payloads random ASCII.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionFixtures {
    pub service: ServiceDef,
    pub advertise_settings: AdvertiseSettings,
    pub advertise_data: AdvertisePayload,
    pub scan_response: AdvertisePayload,
    pub scan_filter: ScanFilter,
    pub scan_settings: ScanSettings,
}

impl Default for SessionFixtures {
    fn default() -> Self {
        let service = ServiceDef::primary(
            TEST_SERVICE_UUID,
            vec![
                CharacteristicDef::write(TEST_WRITE_UUID, random_ascii(CHARACTERISTIC_PAYLOAD_LEN)),
                CharacteristicDef::write(
                    TEST_SECOND_WRITE_UUID,
                    random_ascii(CHARACTERISTIC_PAYLOAD_LEN),
                ),
                CharacteristicDef::read(TEST_READ_UUID, random_ascii(CHARACTERISTIC_PAYLOAD_LEN)),
                CharacteristicDef::read(
                    TEST_SECOND_READ_UUID,
                    random_ascii(CHARACTERISTIC_PAYLOAD_LEN),
                ),
                CharacteristicDef::read(
                    TEST_THIRD_READ_UUID,
                    random_ascii(CHARACTERISTIC_PAYLOAD_LEN),
                ),
            ],
        );

        Self {
            service,
            advertise_settings: AdvertiseSettings::default(),
            advertise_data: AdvertisePayload {
                include_device_name: false,
                service_data: vec![ServiceData {
                    uuid: TEST_SERVICE_UUID.to_string(),
                    data: random_ascii(ADVERTISE_PAYLOAD_LEN),
                }],
            },
            scan_response: AdvertisePayload {
                include_device_name: false,
                service_data: vec![ServiceData {
                    uuid: TEST_SCAN_RESPONSE_UUID.to_string(),
                    data: random_ascii(ADVERTISE_PAYLOAD_LEN),
                }],
            },
            scan_filter: ScanFilter {
                service_uuid: TEST_SERVICE_UUID.to_string(),
            },
            scan_settings: ScanSettings::default(),
        }
    }
}

impl SessionFixtures {
    /// Replaces the advertised service-data payload.
    #[must_use]
    pub fn with_advertise_data(mut self, data: impl Into<String>) -> Self {
        if let Some(entry) = self.advertise_data.service_data.first_mut() {
            entry.data = data.into();
        }
        self
    }

    /// Replaces the scan-response service-data payload.
    #[must_use]
    pub fn with_scan_response_data(mut self, data: impl Into<String>) -> Self {
        if let Some(entry) = self.scan_response.service_data.first_mut() {
            entry.data = data.into();
        }
        self
    }

    #[must_use]
    pub fn with_service(mut self, service: ServiceDef) -> Self {
        self.service = service;
        self
    }

    /// The `(uuid, data)` pair a matching scan result must carry.
    #[must_use]
    pub fn advertised_service_data(&self) -> Option<(&str, &str)> {
        self.advertise_data
            .service_data
            .first()
            .map(|e| (e.uuid.as_str(), e.data.as_str()))
    }

    /// The `(uuid, data)` pair of the scan response, verified separately from
    /// the advertisement.
    #[must_use]
    pub fn scan_response_service_data(&self) -> Option<(&str, &str)> {
        self.scan_response
            .service_data
            .first()
            .map(|e| (e.uuid.as_str(), e.data.as_str()))
    }

    #[must_use]
    pub fn read_characteristics(&self) -> Vec<&CharacteristicDef> {
        self.service
            .characteristics
            .iter()
            .filter(|c| c.property == Property::Read)
            .collect()
    }

    #[must_use]
    pub fn write_characteristics(&self) -> Vec<&CharacteristicDef> {
        self.service
            .characteristics
            .iter()
            .filter(|c| c.property == Property::Write)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_fixture_set_has_expected_shape() {
        let fixtures = SessionFixtures::default();
        assert_eq!(fixtures.service.uuid, TEST_SERVICE_UUID);
        assert_eq!(fixtures.service.characteristics.len(), 5);
        assert_eq!(fixtures.read_characteristics().len(), 3);
        assert_eq!(fixtures.write_characteristics().len(), 2);
        for c in fixtures.read_characteristics() {
            assert!(c.payload.is_some(), "read characteristic without payload");
        }
    }

    #[test]
    fn scan_response_is_distinct_from_advertisement() {
        let fixtures = SessionFixtures::default();
        let (adv_uuid, adv_data) = fixtures.advertised_service_data().unwrap();
        let (sr_uuid, sr_data) = fixtures.scan_response_service_data().unwrap();
        assert_ne!(adv_uuid, sr_uuid);
        assert_ne!(adv_data, sr_data);
    }

    #[test]
    fn characteristic_serializes_with_wire_keys() {
        let c = CharacteristicDef::read(TEST_READ_UUID, "AbCd1234");
        let value = serde_json::to_value(&c).unwrap();
        assert_eq!(value["UUID"], TEST_READ_UUID);
        assert_eq!(value["Property"], "PROPERTY_READ");
        assert_eq!(value["Permission"], "PERMISSION_READ");
        assert_eq!(value["Data"], "AbCd1234");
    }

    #[test]
    fn write_characteristic_omits_absent_payload() {
        let c = CharacteristicDef {
            uuid: TEST_WRITE_UUID.to_string(),
            property: Property::Write,
            permission: Permission::Write,
            payload: None,
        };
        let value = serde_json::to_value(&c).unwrap();
        assert!(value.get("Data").is_none());
    }

    #[test]
    fn random_ascii_has_requested_length() {
        assert_eq!(random_ascii(16).len(), 16);
        assert_ne!(random_ascii(16), random_ascii(16));
    }
}
