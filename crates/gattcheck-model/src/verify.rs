//! Assertion engine: pure verification of observed event sequences.
//!
//! Deliberately separated from the orchestrator so cardinality and payload
//! contracts can be tested against synthetic events without a device pair.
//! Every function returns [`HarnessError::Assertion`] on violation — a real
//! protocol defect, never retried.

use crate::error::{HarnessError, Result};
use crate::event::Event;
use crate::gatt;

/// Exactly one event named `name` must be present.
///
/// # Errors
/// Fails when the event is absent or occurs more than once — a duplicate is
/// a protocol violation even if the payloads agree.
pub fn expect_exactly_one<'a>(events: &'a [Event], name: &str) -> Result<&'a Event> {
    let mut matches = events.iter().filter(|e| e.is(name));
    let first = matches
        .next()
        .ok_or_else(|| HarnessError::assertion(format!("no '{name}' event observed")))?;
    let extras = matches.count();
    if extras > 0 {
        return Err(HarnessError::assertion(format!(
            "expected exactly one '{name}' event, found {}",
            extras + 1
        )));
    }
    Ok(first)
}

/// The number of events named `name` must equal `expected_count`.
///
/// Used after consuming the awaited occurrence: draining the queue and
/// passing `expected_count = 0` proves no concurrent extras existed.
///
/// # Errors
/// Fails on any count mismatch, listing the offending events.
pub fn expect_no_extras(events: &[Event], name: &str, expected_count: usize) -> Result<()> {
    let observed: Vec<&Event> = events.iter().filter(|e| e.is(name)).collect();
    if observed.len() == expected_count {
        return Ok(());
    }
    let seen: Vec<String> = observed.iter().map(|e| e.data.to_string()).collect();
    Err(HarnessError::assertion(format!(
        "expected {expected_count} '{name}' event(s), found {}: {seen:?}",
        observed.len()
    )))
}

/// The event's payload `field` must equal `expected` byte-for-byte.
///
/// # Errors
/// Fails when the field is missing, non-string, or mismatched.
pub fn expect_payload_equals(event: &Event, field: &str, expected: &str) -> Result<()> {
    match event.str_field(field) {
        Some(actual) if actual == expected => Ok(()),
        Some(actual) => Err(HarnessError::assertion(format!(
            "'{}' payload mismatch in field '{field}': expected {expected:?}, got {actual:?}",
            event.name
        ))),
        None => Err(HarnessError::assertion(format!(
            "'{}' event has no string field '{field}'",
            event.name
        ))),
    }
}

/// The event must carry `status == GATT_SUCCESS`.
///
/// # Errors
/// Fails on a missing or non-success status.
pub fn expect_status_success(event: &Event) -> Result<()> {
    expect_payload_equals(event, gatt::STATUS, gatt::GATT_SUCCESS)
}

/// The event must carry `newState == state`.
///
/// # Errors
/// Fails on a missing or mismatched state.
pub fn expect_state(event: &Event, state: &str) -> Result<()> {
    expect_payload_equals(event, gatt::NEW_STATE, state)
}

/// Every expected UUID must be a member of the observed set (superset check,
/// not a count comparison).
///
/// # Errors
/// Fails naming the first missing UUID.
pub fn expect_uuid_superset(observed: &[String], expected: &[String]) -> Result<()> {
    for uuid in expected {
        if !observed.iter().any(|o| o == uuid) {
            return Err(HarnessError::assertion(format!(
                "failed to find uuid {uuid} in {observed:?}"
            )));
        }
    }
    Ok(())
}

/// A `(uuid, data)` service entry must be present, e.g. the scan-response
/// entry of a scan record.
///
/// # Errors
/// Fails when no entry matches both uuid and data.
pub fn expect_service_entry(
    entries: &[(String, String)],
    uuid: &str,
    data: &str,
    what: &str,
) -> Result<()> {
    if entries.iter().any(|(u, d)| u == uuid && d == data) {
        return Ok(());
    }
    Err(HarnessError::assertion(format!(
        "{what} not found: no service entry with uuid {uuid} and data {data:?} in {entries:?}"
    )))
}
