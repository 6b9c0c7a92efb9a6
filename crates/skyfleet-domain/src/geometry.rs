//! GeoJSON route geometry to waypoint extraction.
//!
//! Supported shapes:
//!
//! - `FeatureCollection`: the first feature is used
//! - `Feature`: its geometry is used
//! - `LineString`
//! - `MultiLineString`: sub-lines are concatenated in order
//!
//! Positions are GeoJSON `[longitude, latitude, ...]`; waypoints are
//! `(latitude, longitude)`. Output order is the flight path and is never
//! reordered or deduplicated.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::Waypoint;

/// Geometry tags understood by the extractor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    FeatureCollection,
    Feature,
    LineString,
    MultiLineString,
}

impl GeometryKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FeatureCollection => "FeatureCollection",
            Self::Feature => "Feature",
            Self::LineString => "LineString",
            Self::MultiLineString => "MultiLineString",
        }
    }

    const fn is_line(self) -> bool {
        matches!(self, Self::LineString | Self::MultiLineString)
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GeometryKind {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::FeatureCollection,
            Self::Feature,
            Self::LineString,
            Self::MultiLineString,
        ]
        .into_iter()
        .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
        .ok_or_else(|| GeometryError::UnsupportedType(s.to_string()))
    }
}

/// Route geometry parse failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeometryError {
    #[error("Geometry payload is not valid JSON: {0}")]
    Malformed(String),

    #[error("Unsupported geometry type: {0:?}")]
    UnsupportedType(String),

    #[error("Geometry payload has no type tag and none was declared")]
    MissingType,

    #[error("{kind} is missing field {field:?}")]
    MissingField {
        kind: GeometryKind,
        field: &'static str,
    },

    #[error("FeatureCollection contains no features")]
    EmptyFeatureCollection,

    #[error("Geometry yielded no valid waypoints ({skipped} coordinates skipped)")]
    NoValidWaypoints { skipped: usize },
}

/// GeoJSON waypoint extractor
#[derive(Debug, Clone, Copy, Default)]
pub struct WaypointExtractor;

impl WaypointExtractor {
    /// Parse a raw geometry payload.
    ///
    /// The payload's own `type` tag wins; `declared_type` is used when the
    /// payload carries none.
    ///
    /// # Errors
    ///
    /// Returns a [`GeometryError`] for unparseable JSON, unsupported or missing
    /// type tags, missing structural fields, or when every coordinate was
    /// skipped.
    pub fn extract(payload: &str, declared_type: Option<&str>) -> Result<Vec<Waypoint>, GeometryError> {
        let document: Value =
            serde_json::from_str(payload).map_err(|e| GeometryError::Malformed(e.to_string()))?;
        Self::extract_value(&document, declared_type)
    }

    /// Parse an already-decoded geometry document.
    ///
    /// # Errors
    ///
    /// See [`WaypointExtractor::extract`].
    pub fn extract_value(document: &Value, declared_type: Option<&str>) -> Result<Vec<Waypoint>, GeometryError> {
        let kind = resolve_kind(document, declared_type)?;
        let mut cursor = Cursor::default();
        cursor.visit(document, kind)?;

        if cursor.waypoints.is_empty() {
            return Err(GeometryError::NoValidWaypoints {
                skipped: cursor.skipped,
            });
        }
        if cursor.skipped > 0 {
            tracing::warn!(
                kept = cursor.waypoints.len(),
                skipped = cursor.skipped,
                "Route geometry contained malformed coordinates"
            );
        }
        Ok(cursor.waypoints)
    }
}

fn resolve_kind(document: &Value, declared_type: Option<&str>) -> Result<GeometryKind, GeometryError> {
    match document.get("type").and_then(Value::as_str) {
        Some(tag) => {
            let kind = tag.parse::<GeometryKind>()?;
            if let Some(declared) = declared_type {
                if declared.parse::<GeometryKind>().ok() != Some(kind) {
                    tracing::warn!(
                        declared,
                        actual = tag,
                        "Declared geometry type differs from payload, using payload type"
                    );
                }
            }
            Ok(kind)
        }
        None => declared_type.ok_or(GeometryError::MissingType)?.parse(),
    }
}

#[derive(Default)]
struct Cursor {
    waypoints: Vec<Waypoint>,
    skipped: usize,
}

impl Cursor {
    fn visit(&mut self, node: &Value, kind: GeometryKind) -> Result<(), GeometryError> {
        match kind {
            GeometryKind::FeatureCollection => {
                let features = array_field(node, kind, "features")?;
                let first = features.first().ok_or(GeometryError::EmptyFeatureCollection)?;
                // Features in the wild sometimes omit their own tag.
                let inner = match first.get("type").and_then(Value::as_str) {
                    Some(tag) => tag.parse()?,
                    None => GeometryKind::Feature,
                };
                if inner != GeometryKind::Feature {
                    return Err(GeometryError::UnsupportedType(format!(
                        "{inner} inside FeatureCollection"
                    )));
                }
                self.visit(first, GeometryKind::Feature)
            }
            GeometryKind::Feature => {
                let geometry = node
                    .get("geometry")
                    .filter(|g| !g.is_null())
                    .ok_or(GeometryError::MissingField {
                        kind,
                        field: "geometry",
                    })?;
                let tag = geometry
                    .get("type")
                    .and_then(Value::as_str)
                    .ok_or(GeometryError::MissingType)?;
                let inner = tag.parse::<GeometryKind>()?;
                if !inner.is_line() {
                    return Err(GeometryError::UnsupportedType(format!(
                        "{inner} as Feature geometry"
                    )));
                }
                self.visit(geometry, inner)
            }
            GeometryKind::LineString => {
                let positions = array_field(node, kind, "coordinates")?;
                self.push_line(0, positions);
                Ok(())
            }
            GeometryKind::MultiLineString => {
                let lines = array_field(node, kind, "coordinates")?;
                for (line_index, line) in lines.iter().enumerate() {
                    match line.as_array() {
                        Some(positions) => self.push_line(line_index, positions),
                        None => {
                            tracing::warn!(line_index, "Skipping MultiLineString member that is not an array");
                            self.skipped += 1;
                        }
                    }
                }
                Ok(())
            }
        }
    }

    fn push_line(&mut self, line_index: usize, positions: &[Value]) {
        for (index, position) in positions.iter().enumerate() {
            match parse_position(position) {
                Ok(waypoint) => self.waypoints.push(waypoint),
                Err(reason) => {
                    tracing::warn!(line_index, index, reason, "Skipping malformed coordinate");
                    self.skipped += 1;
                }
            }
        }
    }
}

fn array_field<'a>(
    node: &'a Value,
    kind: GeometryKind,
    field: &'static str,
) -> Result<&'a Vec<Value>, GeometryError> {
    node.get(field)
        .and_then(Value::as_array)
        .ok_or(GeometryError::MissingField { kind, field })
}

fn parse_position(position: &Value) -> Result<Waypoint, &'static str> {
    let components = position.as_array().ok_or("position is not an array")?;
    if components.len() < 2 {
        return Err("position has fewer than two values");
    }
    let longitude = components[0].as_f64().ok_or("longitude is not numeric")?;
    let latitude = components[1].as_f64().ok_or("latitude is not numeric")?;
    Waypoint::new(latitude, longitude).map_err(|_| "coordinates out of range")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn latlon(waypoints: &[Waypoint]) -> Vec<(f64, f64)> {
        waypoints.iter().map(|w| (w.latitude, w.longitude)).collect()
    }

    #[test]
    fn test_line_string_inverts_axis_order() {
        let payload = r#"{"type":"LineString","coordinates":[[-122.4,37.7],[-122.5,37.8,120.0]]}"#;
        let waypoints = WaypointExtractor::extract(payload, None).unwrap();
        assert_eq!(latlon(&waypoints), vec![(37.7, -122.4), (37.8, -122.5)]);
    }

    #[test]
    fn test_multi_line_string_concatenates_in_order() {
        let payload = json!({
            "type": "MultiLineString",
            "coordinates": [[[0, 0], [1, 1]], [[2, 2], [3, 3]]]
        });
        let waypoints = WaypointExtractor::extract_value(&payload, None).unwrap();
        assert_eq!(
            latlon(&waypoints),
            vec![(0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (3.0, 3.0)]
        );
    }

    #[test]
    fn test_multi_line_string_preserves_duplicates() {
        let payload = json!({
            "type": "MultiLineString",
            "coordinates": [[[10, 50], [11, 51]], [[11, 51], [10, 50]]]
        });
        let waypoints = WaypointExtractor::extract_value(&payload, None).unwrap();
        assert_eq!(
            latlon(&waypoints),
            vec![(50.0, 10.0), (51.0, 11.0), (51.0, 11.0), (50.0, 10.0)]
        );
    }

    #[test]
    fn test_feature_collection_uses_first_feature() {
        let payload = json!({
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {}, "geometry": {"type": "LineString", "coordinates": [[5, 6], [7, 8]]}},
                {"type": "Feature", "properties": {}, "geometry": {"type": "LineString", "coordinates": [[50, 60]]}}
            ]
        });
        let waypoints = WaypointExtractor::extract_value(&payload, None).unwrap();
        assert_eq!(latlon(&waypoints), vec![(6.0, 5.0), (8.0, 7.0)]);
    }

    #[test]
    fn test_feature_with_multi_line_geometry() {
        let payload = json!({
            "type": "Feature",
            "geometry": {"type": "MultiLineString", "coordinates": [[[1, 2]], [[3, 4]]]}
        });
        let waypoints = WaypointExtractor::extract_value(&payload, None).unwrap();
        assert_eq!(latlon(&waypoints), vec![(2.0, 1.0), (4.0, 3.0)]);
    }

    #[test]
    fn test_malformed_coordinates_are_skipped() {
        let payload = json!({
            "type": "LineString",
            "coordinates": [[1, 2], [3], "oops", [4, "x"], [200, 10], [5, 6]]
        });
        let waypoints = WaypointExtractor::extract_value(&payload, None).unwrap();
        assert_eq!(latlon(&waypoints), vec![(2.0, 1.0), (6.0, 5.0)]);
    }

    #[test]
    fn test_all_coordinates_skipped_fails() {
        let payload = json!({"type": "LineString", "coordinates": [[1], [null, 2]]});
        assert_eq!(
            WaypointExtractor::extract_value(&payload, None),
            Err(GeometryError::NoValidWaypoints { skipped: 2 })
        );

        let empty = json!({"type": "LineString", "coordinates": []});
        assert_eq!(
            WaypointExtractor::extract_value(&empty, None),
            Err(GeometryError::NoValidWaypoints { skipped: 0 })
        );
    }

    #[test]
    fn test_unsupported_types() {
        let point = json!({"type": "Point", "coordinates": [1, 2]});
        assert!(matches!(
            WaypointExtractor::extract_value(&point, None),
            Err(GeometryError::UnsupportedType(_))
        ));

        let polygon_feature = json!({
            "type": "Feature",
            "geometry": {"type": "Polygon", "coordinates": [[[0, 0], [1, 1], [0, 0]]]}
        });
        assert!(matches!(
            WaypointExtractor::extract_value(&polygon_feature, None),
            Err(GeometryError::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_declared_type_used_when_tag_missing() {
        let payload = r#"{"coordinates":[[1,2],[3,4]]}"#;
        let waypoints = WaypointExtractor::extract(payload, Some("LineString")).unwrap();
        assert_eq!(waypoints.len(), 2);

        assert_eq!(
            WaypointExtractor::extract(payload, None),
            Err(GeometryError::MissingType)
        );
        assert!(matches!(
            WaypointExtractor::extract(payload, Some("GeometryCollection")),
            Err(GeometryError::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_payload_tag_wins_over_declared_type() {
        let payload = r#"{"type":"MultiLineString","coordinates":[[[1,2]],[[3,4]]]}"#;
        let waypoints = WaypointExtractor::extract(payload, Some("LineString")).unwrap();
        assert_eq!(waypoints.len(), 2);
    }

    #[test]
    fn test_structural_errors() {
        assert!(matches!(
            WaypointExtractor::extract("{not json", None),
            Err(GeometryError::Malformed(_))
        ));
        assert_eq!(
            WaypointExtractor::extract(r#"{"type":"FeatureCollection","features":[]}"#, None),
            Err(GeometryError::EmptyFeatureCollection)
        );
        assert_eq!(
            WaypointExtractor::extract(r#"{"type":"Feature","geometry":null}"#, None),
            Err(GeometryError::MissingField {
                kind: GeometryKind::Feature,
                field: "geometry"
            })
        );
        assert_eq!(
            WaypointExtractor::extract(r#"{"type":"LineString"}"#, None),
            Err(GeometryError::MissingField {
                kind: GeometryKind::LineString,
                field: "coordinates"
            })
        );
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let payload = r#"{"type":"FeatureCollection","features":[{"type":"Feature","geometry":
            {"type":"MultiLineString","coordinates":[[[13.4,52.5],[13.5,52.6]],[[13.6,52.7]]]}}]}"#;
        let first = WaypointExtractor::extract(payload, Some("FeatureCollection")).unwrap();
        let second = WaypointExtractor::extract(payload, Some("FeatureCollection")).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn test_kind_parsing_is_case_insensitive() {
        assert_eq!("linestring".parse::<GeometryKind>().unwrap(), GeometryKind::LineString);
        assert_eq!(
            " FeatureCollection ".parse::<GeometryKind>().unwrap(),
            GeometryKind::FeatureCollection
        );
    }
}
