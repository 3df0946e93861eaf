use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// A single entity's state plus its attribute bag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
    pub last_changed: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub last_reported: DateTime<Utc>,
    pub context: Context,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            parent_id: None,
        }
    }
}

/// Fired on the event bus whenever an entity is written.
#[derive(Debug, Clone, Serialize)]
pub struct StateChangedEvent {
    pub entity_id: String,
    pub old_state: Option<EntityState>,
    pub new_state: EntityState,
}

/// In-process entity registry. Integrations write into it; the REST API
/// reads from it. Entities have no persistence — a restart starts empty and
/// the pollers repopulate on their first cycle.
pub struct StateMachine {
    states: DashMap<String, EntityState>,
    event_tx: broadcast::Sender<StateChangedEvent>,
}

impl StateMachine {
    pub fn new(channel_capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(channel_capacity);
        Self {
            states: DashMap::new(),
            event_tx,
        }
    }

    pub fn get(&self, entity_id: &str) -> Option<EntityState> {
        self.states.get(entity_id).map(|e| e.value().clone())
    }

    pub fn get_all(&self) -> Vec<EntityState> {
        self.states.iter().map(|e| e.value().clone()).collect()
    }

    /// Write an entity state, firing a state_changed event.
    ///
    /// `last_changed` only moves when the state string differs from the
    /// previous write; `last_updated` moves when state or attributes differ;
    /// `last_reported` moves on every write.
    pub fn set(
        &self,
        entity_id: String,
        state: String,
        attributes: serde_json::Map<String, serde_json::Value>,
    ) -> EntityState {
        let now = Utc::now();
        let old_state = self.get(&entity_id);

        let (last_changed, last_updated) = match &old_state {
            Some(prev) if prev.state == state && prev.attributes == attributes => {
                (prev.last_changed, prev.last_updated)
            }
            Some(prev) if prev.state == state => (prev.last_changed, now),
            _ => (now, now),
        };

        let new_state = EntityState {
            entity_id: entity_id.clone(),
            state,
            attributes,
            last_changed,
            last_updated,
            last_reported: now,
            context: Context::new(),
        };

        self.states.insert(entity_id.clone(), new_state.clone());

        // No subscribers is fine; pollers run regardless.
        let _ = self.event_tx.send(StateChangedEvent {
            entity_id,
            old_state,
            new_state: new_state.clone(),
        });

        new_state
    }

    /// Remove an entity. Returns true if it existed.
    pub fn remove(&self, entity_id: &str) -> bool {
        self.states.remove(entity_id).is_some()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChangedEvent> {
        self.event_tx.subscribe()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, serde_json::Value)]) -> serde_json::Map<String, serde_json::Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_set_get_remove() {
        let sm = StateMachine::new(16);
        sm.set("sensor.t".into(), "5".into(), attrs(&[]));
        assert_eq!(sm.get("sensor.t").unwrap().state, "5");
        assert_eq!(sm.len(), 1);
        assert!(sm.remove("sensor.t"));
        assert!(sm.get("sensor.t").is_none());
        assert!(!sm.remove("sensor.t"));
    }

    #[test]
    fn test_last_changed_stays_put_on_same_state() {
        let sm = StateMachine::new(16);
        let first = sm.set("sensor.t".into(), "5".into(), attrs(&[]));
        let second = sm.set("sensor.t".into(), "5".into(), attrs(&[]));
        assert_eq!(first.last_changed, second.last_changed);
        assert!(second.last_reported >= first.last_reported);

        let third = sm.set("sensor.t".into(), "6".into(), attrs(&[]));
        assert!(third.last_changed >= first.last_changed);
        assert_eq!(third.last_changed, third.last_updated);
    }

    #[test]
    fn test_attribute_change_moves_last_updated_only() {
        let sm = StateMachine::new(16);
        let first = sm.set("sensor.t".into(), "5".into(), attrs(&[]));
        let second = sm.set(
            "sensor.t".into(),
            "5".into(),
            attrs(&[("unit", serde_json::json!("°C"))]),
        );
        assert_eq!(first.last_changed, second.last_changed);
        assert!(second.last_updated >= first.last_updated);
        assert_eq!(second.last_updated, second.last_reported);
    }

    #[tokio::test]
    async fn test_set_fires_event() {
        let sm = StateMachine::new(16);
        let mut rx = sm.subscribe();
        sm.set("light.k".into(), "on".into(), attrs(&[]));
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.entity_id, "light.k");
        assert!(ev.old_state.is_none());
        assert_eq!(ev.new_state.state, "on");
    }
}
