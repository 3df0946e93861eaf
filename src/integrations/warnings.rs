#![allow(dead_code)]
//! SMHI impact-based weather warnings integration.
//!
//! Polls the open warnings feed (no API key required) and turns each warning
//! area's boundary polygon into a handful of map points. Warning polygons can
//! carry thousands of vertices; publishing one entity per vertex would flood
//! the registry, so the ring is subsampled at a fixed stride instead — a
//! lossy but deterministic approximation of the boundary.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::api::AppState;
use crate::downloader::Downloader;
use crate::geolocation::{replace_published, GeolocationEvent};

/// SMHI impact-based warnings feed.
pub const WARNINGS_URL: &str =
    "https://opendata-download-warnings.smhi.se/ibww/api/version/1/warning.json";

/// Keep every Nth polygon vertex. Tunable via [`WarningsConfig`].
pub const DEFAULT_SAMPLE_STRIDE: usize = 60;

/// Configuration for the warnings integration.
pub struct WarningsConfig {
    pub url: String,
    /// Polygon subsampling stride (vertices kept at indices 0, N, 2N, …).
    pub sample_stride: usize,
    /// Polling interval in seconds.
    pub poll_interval_secs: u64,
}

impl Default for WarningsConfig {
    fn default() -> Self {
        Self {
            url: WARNINGS_URL.to_string(),
            sample_stride: DEFAULT_SAMPLE_STRIDE,
            poll_interval_secs: 600,
        }
    }
}

// ── Warnings feed JSON structures ──────────────────────────────
//
// Every field defaults: the feed omits fields freely and a half-filled
// warning must degrade to fewer points, not a parse failure.

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Warning {
    pub id: Option<i64>,
    pub normal_probability: Option<bool>,
    pub event: Value,
    pub descriptions: Vec<WarningDescription>,
    pub warning_areas: Vec<WarningArea>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WarningArea {
    pub id: Option<i64>,
    pub approximate_start: Option<String>,
    pub published: Option<String>,
    pub normal_probability: Option<bool>,
    pub area_name: Value,
    pub warning_level: WarningLevel,
    pub event_description: Value,
    pub affected_areas: Vec<Value>,
    pub descriptions: Vec<WarningDescription>,
    pub area: AreaFeature,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AreaFeature {
    pub geometry: Geometry,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WarningLevel {
    pub code: String,
    pub sv: String,
    pub en: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WarningDescription {
    pub title: LocalizedText,
    pub text: LocalizedText,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LocalizedText {
    pub sv: String,
    pub en: String,
}

/// Map icon per warning level code; unknown codes get no map icon.
fn warning_level_icon(code: &str) -> &'static str {
    match code {
        "YELLOW" => "https://opendata.smhi.se/warning-icons/warning-yellow.png",
        "ORANGE" => "https://opendata.smhi.se/warning-icons/warning-orange.png",
        "RED" => "https://opendata.smhi.se/warning-icons/warning-red.png",
        "MESSAGE" => "https://opendata.smhi.se/warning-icons/message.png",
        _ => "",
    }
}

// ── Transform ───────────────────────────────────────────────────

/// Parse a downloaded warnings feed into geolocation points.
///
/// A top-level value that is not an array (object, null, …) yields an empty
/// list; individual records that fail to parse are skipped.
pub fn entities_from_feed(feed: &Value, stride: usize) -> Vec<GeolocationEvent> {
    let Some(items) = feed.as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match Warning::deserialize(item) {
            Ok(warning) => Some(warning),
            Err(e) => {
                tracing::warn!("Skipping unparseable warning record: {}", e);
                None
            }
        })
        .flat_map(|warning| entities_from_warning(&warning, stride))
        .collect()
}

fn entities_from_warning(warning: &Warning, stride: usize) -> Vec<GeolocationEvent> {
    warning
        .warning_areas
        .iter()
        .flat_map(|area| entities_from_area(area, stride))
        .collect()
}

/// Subsample one area's boundary ring into points.
///
/// Missing descriptions or an unknown level code degrade to empty name/icon;
/// an empty or malformed geometry yields no points.
fn entities_from_area(area: &WarningArea, stride: usize) -> Vec<GeolocationEvent> {
    let name = area
        .descriptions
        .first()
        .map(|d| d.text.en.clone())
        .unwrap_or_default();
    let map_icon = warning_level_icon(&area.warning_level.code);

    let ring = ring_points(&area.area.geometry.coordinates);

    ring.iter()
        .step_by(stride.max(1))
        // Source coordinates are (lon, lat); entities carry (lat, lon).
        .map(|&(lon, lat)| {
            GeolocationEvent::new(name.clone(), lat, lon, map_icon, "mdi:alert", "warnings")
        })
        .collect()
}

/// Extract an ordered coordinate ring from a geometry `coordinates` value.
///
/// A single-ring polygon may arrive doubly nested (`[[[lon, lat], …]]`); one
/// wrapping level is unwrapped. Vertices that are not finite number pairs
/// are dropped.
fn ring_points(coordinates: &Value) -> Vec<(f64, f64)> {
    let Some(mut ring) = coordinates.as_array() else {
        return Vec::new();
    };

    // A wrapped ring's sole element is itself a list of pairs; a bare
    // single-vertex ring's sole element is a pair of numbers. Only the
    // former gets unwrapped.
    if ring.len() == 1 {
        if let Some(inner) = ring[0].as_array() {
            if inner.first().is_some_and(Value::is_array) {
                ring = inner;
            }
        }
    }

    ring.iter()
        .filter_map(|vertex| {
            let pair = vertex.as_array()?;
            let lon = pair.first()?.as_f64()?;
            let lat = pair.get(1)?.as_f64()?;
            (lon.is_finite() && lat.is_finite()).then_some((lon, lat))
        })
        .collect()
}

// ── Poller ──────────────────────────────────────────────────────

/// Spawn a background task that periodically fetches the warnings feed and
/// replaces the previously published warning points wholesale.
pub fn start_warnings_poller(app: Arc<AppState>, config: WarningsConfig) {
    tokio::spawn(async move {
        let downloader = Downloader::new();
        let mut published: Vec<String> = Vec::new();

        loop {
            match downloader.download_json(&config.url).await {
                Ok(feed) => {
                    let entities = entities_from_feed(&feed, config.sample_stride);
                    tracing::debug!(points = entities.len(), "Publishing warning points");
                    published = replace_published(&app.state_machine, &published, &entities);
                }
                Err(e) => {
                    // Keep last cycle's points; a transient feed failure
                    // should not blank the map.
                    tracing::warn!(
                        "Warning feed fetch failed: {} — retrying in {}s",
                        e,
                        config.poll_interval_secs
                    );
                }
            }

            tokio::time::sleep(Duration::from_secs(config.poll_interval_secs)).await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Ring of n vertices at (lon, lat) = (i, -i).
    fn ring(n: usize) -> Value {
        Value::Array(
            (0..n)
                .map(|i| json!([i as f64, -(i as f64)]))
                .collect(),
        )
    }

    fn feed_with_ring(coordinates: Value) -> Value {
        json!([{
            "id": 1,
            "normalProbability": true,
            "event": {"en": "Wind", "code": "WIND"},
            "descriptions": [],
            "warningAreas": [{
                "id": 11,
                "warningLevel": {"code": "YELLOW", "en": "Yellow"},
                "descriptions": [{"text": {"en": "Strong wind in Skagerrak", "sv": "Hård vind"}}],
                "area": {"geometry": {"type": "Polygon", "coordinates": coordinates}}
            }]
        }])
    }

    #[test]
    fn test_sampling_emits_ceil_n_over_stride_points() {
        for (n, expected) in [(1, 1), (59, 1), (60, 1), (61, 2), (130, 3), (180, 3)] {
            let feed = feed_with_ring(ring(n));
            let entities = entities_from_feed(&feed, 60);
            assert_eq!(entities.len(), expected, "ring of {} vertices", n);
        }
    }

    #[test]
    fn test_sampled_points_have_axes_swapped() {
        let feed = feed_with_ring(ring(130));
        let entities = entities_from_feed(&feed, 60);
        // Vertex i is (lon=i, lat=-i); samples land at 0, 60, 120.
        for (entity, i) in entities.iter().zip([0.0_f64, 60.0, 120.0]) {
            assert_eq!(entity.latitude, -i);
            assert_eq!(entity.longitude, i);
        }
    }

    #[test]
    fn test_doubly_nested_ring_matches_singly_nested() {
        let single = entities_from_feed(&feed_with_ring(ring(130)), 60);
        let double = entities_from_feed(&feed_with_ring(json!([ring(130)])), 60);
        assert_eq!(single, double);
        assert_eq!(double.len(), 3);
    }

    #[test]
    fn test_single_vertex_ring_is_not_mistaken_for_wrapping() {
        // A one-vertex ring `[[lon, lat]]` must emit its one point, not be
        // unwrapped into the bare pair and dropped.
        let entities = entities_from_feed(&feed_with_ring(json!([[18.0, 59.0]])), 60);
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].latitude, 59.0);
        assert_eq!(entities[0].longitude, 18.0);

        // A genuinely wrapped one-vertex ring still unwraps to the same point.
        let wrapped = entities_from_feed(&feed_with_ring(json!([[[18.0, 59.0]]])), 60);
        assert_eq!(wrapped.len(), 1);
        assert_eq!(wrapped[0].latitude, 59.0);
        assert_eq!(wrapped[0].longitude, 18.0);
    }

    #[test]
    fn test_entity_fields_from_area() {
        let entities = entities_from_feed(&feed_with_ring(ring(5)), 60);
        assert_eq!(entities.len(), 1);
        let e = &entities[0];
        assert_eq!(e.name, "Strong wind in Skagerrak");
        assert!(e.entity_picture.contains("warning-yellow"));
        assert_eq!(e.icon, "mdi:alert");
        assert_eq!(e.state, "stationary");
        assert_eq!(e.source, "warnings");
    }

    #[test]
    fn test_non_list_feed_yields_empty() {
        assert!(entities_from_feed(&json!({"error": "down"}), 60).is_empty());
        assert!(entities_from_feed(&Value::Null, 60).is_empty());
        assert!(entities_from_feed(&json!("nope"), 60).is_empty());
    }

    #[test]
    fn test_missing_descriptions_and_level_degrade() {
        let feed = json!([{
            "warningAreas": [{
                "area": {"geometry": {"coordinates": ring(3)}}
            }]
        }]);
        let entities = entities_from_feed(&feed, 60);
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].name, "");
        assert_eq!(entities[0].entity_picture, "");
    }

    #[test]
    fn test_empty_or_malformed_geometry_yields_no_points() {
        for coordinates in [json!([]), json!(null), json!("POLYGON(...)")] {
            let entities = entities_from_feed(&feed_with_ring(coordinates), 60);
            assert!(entities.is_empty());
        }
    }

    #[test]
    fn test_unknown_level_code_gets_empty_icon() {
        assert_eq!(warning_level_icon("PURPLE"), "");
        assert!(!warning_level_icon("RED").is_empty());
    }

    #[test]
    fn test_non_finite_vertices_are_dropped() {
        // NaN can't be written in JSON, but a vertex may be malformed.
        let coordinates = json!([[18.0, 59.0], ["x", 59.0], [18.5], [19.0, 60.0]]);
        let points = ring_points(&coordinates);
        assert_eq!(points, vec![(18.0, 59.0), (19.0, 60.0)]);
    }

    #[test]
    fn test_custom_stride() {
        let feed = feed_with_ring(ring(10));
        assert_eq!(entities_from_feed(&feed, 3).len(), 4);
        // Degenerate stride of 0 is clamped rather than looping forever.
        assert_eq!(entities_from_feed(&feed, 0).len(), 10);
    }
}
