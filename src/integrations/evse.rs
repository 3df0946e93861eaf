//! V2C Trydan EVSE integration.
//!
//! Polls the charger's local HTTP API (GET /RealTimeData) once per minute
//! and publishes the telemetry as sensor entities. A failed poll is an
//! "update failed": the last snapshot stays visible to consumers and the
//! next tick retries — stale data beats no data for a charger dashboard.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::AppState;
use crate::downloader::REQUEST_TIMEOUT;
use crate::error::AdapterError;
use crate::state::StateMachine;

/// Configuration for the EVSE integration.
pub struct EvseConfig {
    /// Hostname or IP of the charger on the LAN.
    pub host: String,
    /// Polling interval in seconds (default: 60).
    pub poll_interval_secs: u64,
}

impl EvseConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            poll_interval_secs: 60,
        }
    }
}

// ── Vendor JSON structure ──────────────────────────────────────

/// One /RealTimeData reading. Vendor schema; opaque to the rest of the
/// service beyond the fields surfaced as entities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySnapshot {
    #[serde(rename = "ChargeState")]
    pub charge_state: i64,
    #[serde(rename = "ChargePower")]
    pub charge_power: f64,
    #[serde(rename = "ChargeEnergy")]
    pub charge_energy: f64,
    #[serde(rename = "ChargeTime")]
    pub charge_time: i64,
    #[serde(rename = "HousePower")]
    pub house_power: f64,
    #[serde(rename = "FVPower")]
    pub pv_power: f64,
    #[serde(rename = "Intensity")]
    pub intensity: i64,
    #[serde(rename = "MinIntensity")]
    pub min_intensity: i64,
    #[serde(rename = "MaxIntensity")]
    pub max_intensity: i64,
    #[serde(rename = "Paused")]
    pub paused: u8,
    #[serde(rename = "Locked")]
    pub locked: u8,
    #[serde(rename = "FirmwareVersion")]
    pub firmware_version: String,
}

fn charge_state_label(state: i64) -> &'static str {
    match state {
        0 => "disconnected",
        1 => "connected",
        2 => "charging",
        _ => "unknown",
    }
}

// ── Vendor client ───────────────────────────────────────────────

pub struct TrydanClient {
    client: reqwest::Client,
    base_url: String,
}

impl TrydanClient {
    pub fn new(host: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: format!("http://{}", host),
        }
    }

    /// Fetch one telemetry snapshot. Any failure — transport, status, or
    /// body shape — is reported as a vendor error.
    pub async fn get_data(&self) -> Result<TelemetrySnapshot, AdapterError> {
        let url = format!("{}/RealTimeData", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AdapterError::Vendor(e.to_string()))?;

        resp.json::<TelemetrySnapshot>()
            .await
            .map_err(|e| AdapterError::Vendor(format!("invalid RealTimeData response: {}", e)))
    }
}

// ── Coordinator ─────────────────────────────────────────────────

/// Holds the latest snapshot and the freshness flag between ticks.
pub struct EvseCoordinator {
    snapshot: Mutex<Option<TelemetrySnapshot>>,
    last_update_success: AtomicBool,
}

impl EvseCoordinator {
    pub fn new() -> Self {
        Self {
            snapshot: Mutex::new(None),
            last_update_success: AtomicBool::new(false),
        }
    }

    /// Last known snapshot, possibly stale.
    pub fn data(&self) -> Option<TelemetrySnapshot> {
        self.snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn last_update_success(&self) -> bool {
        self.last_update_success.load(Ordering::Relaxed)
    }

    /// Apply one poll result. Never fails out of the poll cycle.
    ///
    /// Success stores and publishes the snapshot; failure logs the vendor
    /// error, flips the online flag, and leaves the stored snapshot and its
    /// sensor entities untouched.
    pub fn apply(
        &self,
        state_machine: &StateMachine,
        result: Result<TelemetrySnapshot, AdapterError>,
    ) {
        match result {
            Ok(snapshot) => {
                tracing::debug!(
                    state = charge_state_label(snapshot.charge_state),
                    power = snapshot.charge_power,
                    "EVSE snapshot received"
                );
                publish_snapshot(state_machine, &snapshot);
                *self
                    .snapshot
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(snapshot);
                self.last_update_success.store(true, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::warn!("EVSE update failed: {} — keeping last snapshot", e);
                self.last_update_success.store(false, Ordering::Relaxed);
                publish_online(state_machine, false);
            }
        }
    }
}

impl Default for EvseCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

fn publish_online(state_machine: &StateMachine, online: bool) {
    let mut attrs = serde_json::Map::new();
    attrs.insert("friendly_name".into(), Value::String("EVSE Online".into()));
    state_machine.set(
        "binary_sensor.evse_online".to_string(),
        if online { "on" } else { "off" }.to_string(),
        attrs,
    );
}

fn publish_snapshot(state_machine: &StateMachine, snapshot: &TelemetrySnapshot) {
    publish_online(state_machine, true);

    // sensor.evse_charge_state — charger status plus the settings bag
    {
        let mut attrs = serde_json::Map::new();
        attrs.insert("friendly_name".into(), Value::String("EVSE Charge State".into()));
        attrs.insert("intensity".into(), serde_json::json!(snapshot.intensity));
        attrs.insert("min_intensity".into(), serde_json::json!(snapshot.min_intensity));
        attrs.insert("max_intensity".into(), serde_json::json!(snapshot.max_intensity));
        attrs.insert("paused".into(), serde_json::json!(snapshot.paused == 1));
        attrs.insert("locked".into(), serde_json::json!(snapshot.locked == 1));
        if !snapshot.firmware_version.is_empty() {
            attrs.insert(
                "firmware_version".into(),
                Value::String(snapshot.firmware_version.clone()),
            );
        }
        state_machine.set(
            "sensor.evse_charge_state".to_string(),
            charge_state_label(snapshot.charge_state).to_string(),
            attrs,
        );
    }

    let power_sensors = [
        ("sensor.evse_charge_power", "EVSE Charge Power", "W", snapshot.charge_power),
        ("sensor.evse_charge_energy", "EVSE Charge Energy", "kWh", snapshot.charge_energy),
        ("sensor.evse_house_power", "House Power", "W", snapshot.house_power),
        ("sensor.evse_pv_power", "PV Power", "W", snapshot.pv_power),
    ];

    for (entity_id, friendly, unit, value) in power_sensors {
        let mut attrs = serde_json::Map::new();
        attrs.insert("friendly_name".into(), Value::String(friendly.to_string()));
        attrs.insert("unit_of_measurement".into(), Value::String(unit.to_string()));
        state_machine.set(entity_id.to_string(), format!("{}", value), attrs);
    }
}

// ── Poller ──────────────────────────────────────────────────────

/// Spawn the fixed-interval EVSE poll loop. Results land on `app.evse`, so
/// the rest of the service reads the last snapshot from there.
pub fn start_evse_poller(app: Arc<AppState>, config: EvseConfig) {
    tokio::spawn(async move {
        let client = TrydanClient::new(&config.host);
        tracing::info!(host = %config.host, "EVSE integration active");

        loop {
            let result = client.get_data().await;
            app.evse.apply(&app.state_machine, result);
            tokio::time::sleep(Duration::from_secs(config.poll_interval_secs)).await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> TelemetrySnapshot {
        TelemetrySnapshot {
            charge_state: 2,
            charge_power: 7200.0,
            charge_energy: 12.5,
            charge_time: 3600,
            house_power: 450.0,
            pv_power: 3100.0,
            intensity: 32,
            min_intensity: 6,
            max_intensity: 32,
            paused: 0,
            locked: 0,
            firmware_version: "2.1.7".to_string(),
        }
    }

    #[test]
    fn test_snapshot_deserializes_vendor_payload() {
        let parsed: TelemetrySnapshot = serde_json::from_str(
            r#"{
                "ID": "abc123",
                "ChargeState": 2,
                "ChargePower": 7200.0,
                "ChargeEnergy": 12.5,
                "ChargeTime": 3600,
                "HousePower": 450.0,
                "FVPower": 3100.0,
                "Intensity": 32,
                "MinIntensity": 6,
                "MaxIntensity": 32,
                "Paused": 0,
                "Locked": 0,
                "FirmwareVersion": "2.1.7",
                "SignalStatus": 3
            }"#,
        )
        .unwrap();
        assert_eq!(parsed, snapshot());
    }

    #[test]
    fn test_successful_poll_publishes_sensors() {
        let sm = StateMachine::new(16);
        let coordinator = EvseCoordinator::new();
        coordinator.apply(&sm, Ok(snapshot()));

        assert!(coordinator.last_update_success());
        assert_eq!(coordinator.data(), Some(snapshot()));
        assert_eq!(sm.get("sensor.evse_charge_state").unwrap().state, "charging");
        assert_eq!(sm.get("sensor.evse_charge_power").unwrap().state, "7200");
        assert_eq!(sm.get("binary_sensor.evse_online").unwrap().state, "on");
    }

    #[test]
    fn test_failed_poll_keeps_stale_snapshot() {
        let sm = StateMachine::new(16);
        let coordinator = EvseCoordinator::new();
        coordinator.apply(&sm, Ok(snapshot()));
        coordinator.apply(&sm, Err(AdapterError::Vendor("connection refused".into())));

        // Update-failed: flag flips, data and sensors stay.
        assert!(!coordinator.last_update_success());
        assert_eq!(coordinator.data(), Some(snapshot()));
        assert_eq!(sm.get("sensor.evse_charge_state").unwrap().state, "charging");
        assert_eq!(sm.get("binary_sensor.evse_online").unwrap().state, "off");
    }

    #[test]
    fn test_failure_before_any_success_is_quiet() {
        let sm = StateMachine::new(16);
        let coordinator = EvseCoordinator::new();
        coordinator.apply(&sm, Err(AdapterError::Vendor("timeout".into())));

        assert!(!coordinator.last_update_success());
        assert_eq!(coordinator.data(), None);
        assert!(sm.get("sensor.evse_charge_state").is_none());
    }

    #[test]
    fn test_coordinator_readable_through_app_state() {
        let app = AppState {
            state_machine: StateMachine::new(16),
            evse: EvseCoordinator::new(),
        };
        app.evse.apply(&app.state_machine, Ok(snapshot()));

        assert_eq!(app.evse.data(), Some(snapshot()));
        assert!(app.evse.last_update_success());
    }

    #[test]
    fn test_charge_state_labels() {
        assert_eq!(charge_state_label(0), "disconnected");
        assert_eq!(charge_state_label(1), "connected");
        assert_eq!(charge_state_label(2), "charging");
        assert_eq!(charge_state_label(9), "unknown");
    }
}
