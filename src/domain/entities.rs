//! Domain Entities - Core business objects
//!
//! These entities represent the core concepts of the ip-widget domain.
//! They have no external dependencies and contain only business logic.

use crate::domain::value_objects::{CountryCode, NEUTRAL_ICON};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Upper bound for `consecutive_failures`, keeps backoff growth bounded.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 10;

/// Names of the JSON fields a provider uses for the two values we need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMap {
    /// Field holding the public IP address
    pub ip: String,
    /// Field holding the ISO 3166-1 alpha-2 country code
    pub country_code: String,
}

impl FieldMap {
    pub fn new(ip: impl Into<String>, country_code: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            country_code: country_code.into(),
        }
    }
}

/// A geolocation service that can answer "what is my country".
///
/// Immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    /// Unique provider name (e.g. "FreeIPAPI")
    pub name: String,
    /// URL queried with a plain GET
    pub endpoint: String,
    /// Where the interesting values live in the response body
    pub field_map: FieldMap,
}

impl ProviderDescriptor {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>, field_map: FieldMap) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            field_map,
        }
    }

    /// <https://docs.freeipapi.com/>
    pub fn free_ip_api() -> Self {
        Self::new(
            "FreeIPAPI",
            "https://freeipapi.com/api/json/",
            FieldMap::new("ipAddress", "countryCode"),
        )
    }

    /// <https://www.ip2location.io/ip2location-documentation/>
    pub fn ip2location() -> Self {
        Self::new(
            "IP2Location",
            "https://api.ip2location.io/",
            FieldMap::new("ip", "country_code"),
        )
    }
}

/// Outcome of one resolution attempt.
///
/// Failures are data, not errors: `success == false` with whatever
/// fields are known (usually none).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub ip_address: Option<String>,
    pub country_code: Option<CountryCode>,
    pub resolved_at: SystemTime,
    pub success: bool,
}

impl ResolutionResult {
    /// A successful resolution stamped with the current time.
    pub fn success(ip_address: impl Into<String>, country_code: CountryCode) -> Self {
        Self {
            ip_address: Some(ip_address.into()),
            country_code: Some(country_code),
            resolved_at: SystemTime::now(),
            success: true,
        }
    }

    /// A failed resolution stamped with the current time.
    pub fn failure() -> Self {
        Self {
            ip_address: None,
            country_code: None,
            resolved_at: SystemTime::now(),
            success: false,
        }
    }

    /// True if `other` differs in ip, country or success flag.
    pub fn differs_materially(&self, other: &ResolutionResult) -> bool {
        self.ip_address != other.ip_address
            || self.country_code != other.country_code
            || self.success != other.success
    }
}

/// The single authoritative view of "where are we".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionState {
    pub current: ResolutionResult,
    pub consecutive_failures: u32,
    pub active_provider_name: String,
}

impl ResolutionState {
    /// Initial state at process start: nothing resolved yet.
    pub fn new(active_provider_name: impl Into<String>) -> Self {
        Self {
            current: ResolutionResult::failure(),
            consecutive_failures: 0,
            active_provider_name: active_provider_name.into(),
        }
    }

    /// Fold a fresh result into the state.
    ///
    /// Returns true when the change is material and must be published.
    /// A failed result keeps the previous ip/country (flagged unsuccessful)
    /// until `failure_threshold` consecutive failures, then clears them.
    /// The threshold is clamped to `1..=MAX_CONSECUTIVE_FAILURES` so a
    /// capped streak always reaches it.
    pub fn record(
        &mut self,
        result: ResolutionResult,
        provider_name: &str,
        failure_threshold: u32,
    ) -> bool {
        let failure_threshold = failure_threshold.clamp(1, MAX_CONSECUTIVE_FAILURES);
        // resolved_at never goes backwards, even if the wall clock does.
        let resolved_at = result.resolved_at.max(self.current.resolved_at);

        let next = if result.success {
            self.consecutive_failures = 0;
            ResolutionResult {
                resolved_at,
                ..result
            }
        } else {
            self.consecutive_failures =
                (self.consecutive_failures + 1).min(MAX_CONSECUTIVE_FAILURES);

            if self.consecutive_failures >= failure_threshold {
                ResolutionResult {
                    ip_address: None,
                    country_code: None,
                    resolved_at,
                    success: false,
                }
            } else {
                ResolutionResult {
                    ip_address: self.current.ip_address.clone(),
                    country_code: self.current.country_code.clone(),
                    resolved_at,
                    success: false,
                }
            }
        };

        let changed = next.differs_materially(&self.current);
        self.current = next;
        self.active_provider_name = provider_name.to_string();
        changed
    }

    /// Flag image key for the presentation layer ("us", "de", or the neutral "aq").
    ///
    /// Any failed state shows the neutral flag, even while stale data is kept.
    pub fn icon_key(&self) -> String {
        if !self.current.success {
            return NEUTRAL_ICON.to_string();
        }
        self.current
            .country_code
            .as_ref()
            .map(CountryCode::icon_key)
            .unwrap_or_else(|| NEUTRAL_ICON.to_string())
    }
}

/// Reason a resolution is worth attempting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Startup,
    Manual,
    ProviderSwitch(String),
    NetworkChanged,
    Timer,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::Startup => write!(f, "startup"),
            Trigger::Manual => write!(f, "manual"),
            Trigger::ProviderSwitch(name) => write!(f, "provider-switch({})", name),
            Trigger::NetworkChanged => write!(f, "network-changed"),
            Trigger::Timer => write!(f, "timer"),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::time::Duration;

    fn us() -> CountryCode {
        CountryCode::parse("US").unwrap()
    }

    #[test]
    fn test_initial_state() {
        let state = ResolutionState::new("FreeIPAPI");
        assert!(!state.current.success);
        assert!(state.current.country_code.is_none());
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.active_provider_name, "FreeIPAPI");
        assert_eq!(state.icon_key(), "aq");
    }

    #[test]
    fn test_record_success_is_material() {
        let mut state = ResolutionState::new("FreeIPAPI");
        let changed = state.record(ResolutionResult::success("203.0.113.5", us()), "FreeIPAPI", 3);
        assert!(changed);
        assert!(state.current.success);
        assert_eq!(state.current.ip_address.as_deref(), Some("203.0.113.5"));
        assert_eq!(state.icon_key(), "us");
    }

    #[test]
    fn test_record_identical_success_not_material() {
        let mut state = ResolutionState::new("FreeIPAPI");
        state.record(ResolutionResult::success("203.0.113.5", us()), "FreeIPAPI", 3);
        let changed = state.record(ResolutionResult::success("203.0.113.5", us()), "FreeIPAPI", 3);
        assert!(!changed);
    }

    #[test]
    fn test_record_ip_change_is_material() {
        let mut state = ResolutionState::new("FreeIPAPI");
        state.record(ResolutionResult::success("203.0.113.5", us()), "FreeIPAPI", 3);
        let changed = state.record(ResolutionResult::success("203.0.113.6", us()), "FreeIPAPI", 3);
        assert!(changed);
    }

    #[test]
    fn test_failure_keeps_stale_data_below_threshold() {
        let mut state = ResolutionState::new("FreeIPAPI");
        state.record(ResolutionResult::success("203.0.113.5", us()), "FreeIPAPI", 3);

        // success -> failure always publishes
        assert!(state.record(ResolutionResult::failure(), "FreeIPAPI", 3));
        assert!(!state.current.success);
        assert_eq!(state.current.country_code, Some(us()));
        assert_eq!(state.consecutive_failures, 1);
        assert_eq!(state.icon_key(), "aq");

        assert!(!state.record(ResolutionResult::failure(), "FreeIPAPI", 3));
        assert_eq!(state.consecutive_failures, 2);

        // third failure clears
        assert!(state.record(ResolutionResult::failure(), "FreeIPAPI", 3));
        assert!(state.current.country_code.is_none());
        assert!(state.current.ip_address.is_none());
        assert_eq!(state.icon_key(), "aq");
    }

    #[test]
    fn test_failure_threshold_one_clears_immediately() {
        let mut state = ResolutionState::new("FreeIPAPI");
        state.record(ResolutionResult::success("203.0.113.5", us()), "FreeIPAPI", 1);
        state.record(ResolutionResult::failure(), "FreeIPAPI", 1);
        assert!(state.current.country_code.is_none());
    }

    #[test]
    fn test_failures_are_capped() {
        let mut state = ResolutionState::new("FreeIPAPI");
        for _ in 0..25 {
            state.record(ResolutionResult::failure(), "FreeIPAPI", 3);
        }
        assert_eq!(state.consecutive_failures, MAX_CONSECUTIVE_FAILURES);
    }

    #[test]
    fn test_threshold_above_cap_still_clears() {
        let mut state = ResolutionState::new("FreeIPAPI");
        state.record(ResolutionResult::success("203.0.113.5", us()), "FreeIPAPI", 11);
        for _ in 0..50 {
            state.record(ResolutionResult::failure(), "FreeIPAPI", 11);
        }
        assert_eq!(state.consecutive_failures, MAX_CONSECUTIVE_FAILURES);
        assert!(state.current.country_code.is_none());
        assert!(state.current.ip_address.is_none());
    }

    #[test]
    fn test_threshold_zero_treated_as_one() {
        let mut state = ResolutionState::new("FreeIPAPI");
        state.record(ResolutionResult::success("203.0.113.5", us()), "FreeIPAPI", 0);
        assert!(state.current.success);
        state.record(ResolutionResult::failure(), "FreeIPAPI", 0);
        assert!(state.current.country_code.is_none());
    }

    #[test]
    fn test_success_resets_failures() {
        let mut state = ResolutionState::new("FreeIPAPI");
        state.record(ResolutionResult::failure(), "FreeIPAPI", 3);
        state.record(ResolutionResult::failure(), "FreeIPAPI", 3);
        state.record(ResolutionResult::success("198.51.100.9", us()), "FreeIPAPI", 3);
        assert_eq!(state.consecutive_failures, 0);
    }

    #[test]
    fn test_resolved_at_never_decreases() {
        let mut state = ResolutionState::new("FreeIPAPI");
        let later = SystemTime::now() + Duration::from_secs(3600);
        let mut first = ResolutionResult::success("203.0.113.5", us());
        first.resolved_at = later;
        state.record(first, "FreeIPAPI", 3);

        // clock went backwards
        state.record(ResolutionResult::success("203.0.113.5", us()), "FreeIPAPI", 3);
        assert_eq!(state.current.resolved_at, later);
    }

    #[test]
    fn test_record_tracks_provider_name() {
        let mut state = ResolutionState::new("FreeIPAPI");
        state.record(ResolutionResult::failure(), "IP2Location", 3);
        assert_eq!(state.active_provider_name, "IP2Location");
    }

    #[test]
    fn test_builtin_descriptors() {
        let free = ProviderDescriptor::free_ip_api();
        assert_eq!(free.name, "FreeIPAPI");
        assert_eq!(free.field_map.country_code, "countryCode");

        let ip2 = ProviderDescriptor::ip2location();
        assert_eq!(ip2.name, "IP2Location");
        assert_eq!(ip2.field_map.ip, "ip");
        assert_eq!(ip2.field_map.country_code, "country_code");
    }

    #[test]
    fn test_trigger_display() {
        assert_eq!(Trigger::Startup.to_string(), "startup");
        assert_eq!(
            Trigger::ProviderSwitch("IP2Location".into()).to_string(),
            "provider-switch(IP2Location)"
        );
    }
}
