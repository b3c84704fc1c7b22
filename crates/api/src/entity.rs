// Entity state payloads and the filters the client builds on them.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keywords marking an entity as energy-related, matched case-insensitively
/// against the entity id and friendly name.
pub const ENERGY_KEYWORDS: &[&str] = &["energy", "power", "watt", "kwh", "consumption"];

/// One entity state record as returned by `/api/states`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_changed: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl EntityState {
    /// The domain part of the entity id (`light` in `light.kitchen`).
    pub fn domain(&self) -> &str {
        self.entity_id.split('.').next().unwrap_or("")
    }

    pub fn friendly_name(&self) -> Option<&str> {
        self.attributes.get("friendly_name").and_then(Value::as_str)
    }

    fn matches_energy_keyword(&self) -> bool {
        let entity_id = self.entity_id.to_lowercase();
        let friendly = self
            .friendly_name()
            .map(str::to_lowercase)
            .unwrap_or_default();
        ENERGY_KEYWORDS
            .iter()
            .any(|kw| entity_id.contains(kw) || friendly.contains(kw))
    }
}

/// Keep only the states whose entity id is prefixed `domain + "."`.
/// Order is preserved.
pub fn entities_in_domain(states: Vec<EntityState>, domain: &str) -> Vec<EntityState> {
    let prefix = format!("{domain}.");
    states
        .into_iter()
        .filter(|s| s.entity_id.starts_with(&prefix))
        .collect()
}

/// Keep only energy-related states (entity id or friendly name contains one
/// of `ENERGY_KEYWORDS`). Order is preserved.
pub fn energy_entities(states: Vec<EntityState>) -> Vec<EntityState> {
    states
        .into_iter()
        .filter(EntityState::matches_energy_keyword)
        .collect()
}

/// Distinct domains present in a state list, sorted.
pub fn domains(states: &[EntityState]) -> Vec<String> {
    states
        .iter()
        .map(|s| s.domain().to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state(entity_id: &str, friendly_name: Option<&str>) -> EntityState {
        let mut attributes = Map::new();
        if let Some(name) = friendly_name {
            attributes.insert("friendly_name".to_string(), json!(name));
        }
        EntityState {
            entity_id: entity_id.to_string(),
            state: "on".to_string(),
            attributes,
            last_changed: None,
            last_updated: None,
        }
    }

    #[test]
    fn domain_filter_keeps_only_prefixed_ids_in_order() {
        let states = vec![
            state("light.kitchen", None),
            state("sensor.temp", None),
            state("light.hall", None),
        ];
        let lights = entities_in_domain(states, "light");
        let ids: Vec<_> = lights.iter().map(|s| s.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["light.kitchen", "light.hall"]);
    }

    #[test]
    fn domain_filter_requires_full_domain_match() {
        let states = vec![state("lights_misc.thing", None), state("light.hall", None)];
        let lights = entities_in_domain(states, "light");
        assert_eq!(lights.len(), 1);
        assert_eq!(lights[0].entity_id, "light.hall");
    }

    #[test]
    fn energy_filter_matches_id_and_friendly_name() {
        let states = vec![
            state("sensor.power_usage", None),
            state("switch.fan", None),
            state("sensor.meter_3", Some("Kitchen kWh Meter")),
        ];
        let energy = energy_entities(states);
        let ids: Vec<_> = energy.iter().map(|s| s.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["sensor.power_usage", "sensor.meter_3"]);
    }

    #[test]
    fn energy_filter_is_case_insensitive() {
        let states = vec![state("sensor.house", Some("Total ENERGY Today"))];
        assert_eq!(energy_entities(states).len(), 1);
    }

    #[test]
    fn parses_state_payload() {
        let value = json!({
            "entity_id": "light.kitchen",
            "state": "on",
            "attributes": {"friendly_name": "Kitchen Light", "brightness": 200},
            "last_changed": "2025-05-01T10:00:00+00:00",
            "last_updated": "2025-05-01T10:00:00+00:00"
        });
        let parsed: EntityState = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.domain(), "light");
        assert_eq!(parsed.friendly_name(), Some("Kitchen Light"));
        assert!(parsed.last_changed.is_some());
    }

    #[test]
    fn distinct_domains() {
        let states = vec![
            state("light.kitchen", None),
            state("sensor.temp", None),
            state("light.hall", None),
        ];
        assert_eq!(domains(&states), vec!["light", "sensor"]);
    }
}
