//! Point entities produced by the SMHI integrations.

use serde_json::Value;

use crate::state::StateMachine;

/// A point-like entity: a named coordinate with an icon and a source tag.
///
/// Identity is derived from the coordinate pair, so a poll cycle that emits
/// the same points overwrites in place. Instances are immutable; each cycle
/// builds a fresh replacement set.
#[derive(Debug, Clone, PartialEq)]
pub struct GeolocationEvent {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Map icon URL shown on the map card (may be empty).
    pub entity_picture: String,
    /// Frontend card icon, e.g. `mdi:alert`.
    pub icon: String,
    /// Coarse state label; these points don't move, so always `stationary`.
    pub state: String,
    /// Which integration produced this point: `warnings` or `weather`.
    pub source: String,
}

impl GeolocationEvent {
    pub fn new(
        name: impl Into<String>,
        latitude: f64,
        longitude: f64,
        entity_picture: impl Into<String>,
        icon: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
            entity_picture: entity_picture.into(),
            icon: icon.into(),
            state: "stationary".to_string(),
            source: source.into(),
        }
    }

    /// Coordinate-derived identity key.
    pub fn unique_id(&self) -> String {
        format!("{}_{}", self.latitude, self.longitude)
    }

    /// Registry entity id, e.g. `geo_location.warnings_59_3293_18_0686`.
    pub fn entity_id(&self) -> String {
        let key: String = self
            .unique_id()
            .chars()
            .map(|c| match c {
                '.' => '_',
                '-' => 'n',
                c => c,
            })
            .collect();
        format!("geo_location.{}_{}", self.source, key)
    }

    /// Write this point into the registry; returns the entity id used.
    pub fn publish(&self, state_machine: &StateMachine) -> String {
        let entity_id = self.entity_id();

        let mut attrs = serde_json::Map::new();
        attrs.insert("friendly_name".into(), Value::String(self.name.clone()));
        attrs.insert("latitude".into(), serde_json::json!(self.latitude));
        attrs.insert("longitude".into(), serde_json::json!(self.longitude));
        attrs.insert("source".into(), Value::String(self.source.clone()));
        attrs.insert("icon".into(), Value::String(self.icon.clone()));
        if !self.entity_picture.is_empty() {
            attrs.insert(
                "entity_picture".into(),
                Value::String(self.entity_picture.clone()),
            );
        }

        state_machine.set(entity_id.clone(), self.state.clone(), attrs);
        entity_id
    }
}

/// Replace one source's previously published points with a new set.
///
/// Pollers call this once per cycle with the ids they published last time;
/// the output is a complete replacement, never an incremental diff.
pub fn replace_published(
    state_machine: &StateMachine,
    previous_ids: &[String],
    events: &[GeolocationEvent],
) -> Vec<String> {
    for id in previous_ids {
        state_machine.remove(id);
    }
    events.iter().map(|e| e.publish(state_machine)).collect()
}
