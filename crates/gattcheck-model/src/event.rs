use serde_json::Value;
use std::time::Instant;

/// A single push notification observed from a device.
///
/// Events are immutable once created. The payload keeps the device control
/// protocol's JSON shape verbatim, so phase predicates can be written against
/// event name + data alone and never against queue internals.
#[derive(Debug, Clone)]
pub struct Event {
    pub name: String,
    pub data: Value,
    pub observed_at: Instant,
}

impl Event {
    #[must_use]
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
            observed_at: Instant::now(),
        }
    }

    #[must_use]
    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }

    /// Top-level payload field.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    #[must_use]
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.field(key).and_then(Value::as_str)
    }

    /// Walks a nested object path, e.g. `["result", "Device", "Address"]`.
    #[must_use]
    pub fn at(&self, path: &[&str]) -> Option<&Value> {
        let mut current = &self.data;
        for key in path {
            current = current.get(key)?;
        }
        Some(current)
    }

    #[must_use]
    pub fn str_at(&self, path: &[&str]) -> Option<&str> {
        self.at(path).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_path_navigation() {
        let event = Event::new(
            "onScanResult",
            json!({"result": {"Device": {"Address": "AA:BB"}}}),
        );
        assert_eq!(event.str_at(&["result", "Device", "Address"]), Some("AA:BB"));
        assert_eq!(event.at(&["result", "ScanRecord"]), None);
    }

    #[test]
    fn top_level_fields() {
        let event = Event::new("onConnectionStateChange", json!({"status": "GATT_SUCCESS"}));
        assert!(event.is("onConnectionStateChange"));
        assert_eq!(event.str_field("status"), Some("GATT_SUCCESS"));
        assert_eq!(event.str_field("newState"), None);
    }
}
