//! Session report: ordered phase results plus text and JSON rendering.

use serde::Serialize;
use std::fmt;
use std::fmt::Write;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PhaseStatus {
    Pass,
    Fail,
    Timeout,
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Fail => write!(f, "FAIL"),
            Self::Timeout => write!(f, "TIMEOUT"),
        }
    }
}

/// Outcome of one protocol phase. Never mutated after creation.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseResult {
    pub phase: String,
    pub status: PhaseStatus,
    pub latency: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl PhaseResult {
    #[must_use]
    pub fn pass(phase: impl Into<String>, latency: Duration) -> Self {
        Self {
            phase: phase.into(),
            status: PhaseStatus::Pass,
            latency,
            diagnostic: None,
        }
    }

    #[must_use]
    pub fn failed(
        phase: impl Into<String>,
        status: PhaseStatus,
        latency: Duration,
        diagnostic: impl Into<String>,
    ) -> Self {
        Self {
            phase: phase.into(),
            status,
            latency,
            diagnostic: Some(diagnostic.into()),
        }
    }
}

/// Ordered sequence of phase results with an overall verdict.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionReport {
    pub phases: Vec<PhaseResult>,
}

impl SessionReport {
    pub fn record(&mut self, result: PhaseResult) {
        self.phases.push(result);
    }

    /// Overall verdict: every recorded phase passed and at least one ran.
    #[must_use]
    pub fn passed(&self) -> bool {
        !self.phases.is_empty() && self.phases.iter().all(|p| p.status == PhaseStatus::Pass)
    }

    #[must_use]
    pub fn failing_phase(&self) -> Option<&PhaseResult> {
        self.phases.iter().find(|p| p.status != PhaseStatus::Pass)
    }

    /// Human-readable report: one line per phase plus diagnostics for
    /// failures.
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut out = String::new();
        out.push_str("GATT Conformance Session Report\n");
        out.push_str(&"=".repeat(60));
        out.push('\n');
        let verdict = if self.passed() { "PASS" } else { "FAIL" };
        let _ = writeln!(out, "Overall: {verdict} ({} phase(s))\n", self.phases.len());

        for result in &self.phases {
            let _ = writeln!(
                out,
                "[{:<7}] {:<18} {} ms",
                result.status.to_string(),
                result.phase,
                result.latency.as_millis()
            );
            if let Some(diagnostic) = &result.diagnostic {
                let _ = writeln!(out, "          {diagnostic}");
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_report_is_not_a_pass() {
        assert!(!SessionReport::default().passed());
    }

    #[test]
    fn any_non_pass_phase_fails_the_session() {
        let mut report = SessionReport::default();
        report.record(PhaseResult::pass("Discover", Duration::from_millis(12)));
        report.record(PhaseResult::failed(
            "Connect",
            PhaseStatus::Timeout,
            Duration::from_millis(100),
            "no 'onConnectionStateChange' event",
        ));
        assert!(!report.passed());
        assert_eq!(report.failing_phase().unwrap().phase, "Connect");
    }

    #[test]
    fn text_report_lists_phases_and_diagnostics() {
        let mut report = SessionReport::default();
        report.record(PhaseResult::pass("Discover", Duration::from_millis(3)));
        report.record(PhaseResult::failed(
            "Connect",
            PhaseStatus::Fail,
            Duration::from_millis(7),
            "duplicate onConnectionStateChange",
        ));
        let text = report.generate_text();
        assert!(text.contains("Overall: FAIL"));
        assert!(text.contains("Discover"));
        assert!(text.contains("duplicate onConnectionStateChange"));
    }

    #[test]
    fn all_pass_is_a_pass() {
        let mut report = SessionReport::default();
        report.record(PhaseResult::pass("Discover", Duration::from_millis(1)));
        report.record(PhaseResult::pass("Connect", Duration::from_millis(2)));
        assert!(report.passed());
        assert!(report.failing_phase().is_none());
        assert!(report.generate_text().contains("Overall: PASS"));
    }
}
