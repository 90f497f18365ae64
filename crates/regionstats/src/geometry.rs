// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! GeoJSON-shaped features and their areas

use crate::error::ConfigError;
use geo::ChamberlainDuquetteArea;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A GeoJSON position: `[longitude, latitude, (altitude)]`
pub type Position = Vec<f64>;

/// GeoJSON geometry, tagged by `type` with its `coordinates`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Position),
    MultiPoint(Vec<Position>),
    LineString(Vec<Position>),
    MultiLineString(Vec<Vec<Position>>),
    Polygon(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

impl Geometry {
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::MultiPoint(_) => "MultiPoint",
            Geometry::LineString(_) => "LineString",
            Geometry::MultiLineString(_) => "MultiLineString",
            Geometry::Polygon(_) => "Polygon",
            Geometry::MultiPolygon(_) => "MultiPolygon",
        }
    }

    /// Polygon and MultiPolygon
    #[must_use]
    pub fn is_polygonal(&self) -> bool {
        matches!(self, Geometry::Polygon(_) | Geometry::MultiPolygon(_))
    }

    /// Geodesic area in square meters, `None` for non-polygon types.
    ///
    /// Uses the spherical ring-area formula on a sphere of the WGS84
    /// equatorial radius. Returns `None` for malformed rings too; callers
    /// that need to tell the two apart use [`Feature::polygon_area`].
    #[must_use]
    pub fn area(&self) -> Option<f64> {
        match self {
            Geometry::Polygon(rings) => {
                to_polygon(rings).map(|p| p.chamberlain_duquette_unsigned_area())
            }
            Geometry::MultiPolygon(polygons) => polygons
                .iter()
                .map(|rings| to_polygon(rings))
                .collect::<Option<Vec<_>>>()
                .map(|ps| geo::MultiPolygon::new(ps).chamberlain_duquette_unsigned_area()),
            _ => None,
        }
    }
}

fn to_coord(position: &Position) -> Option<geo::Coord<f64>> {
    match position.as_slice() {
        [x, y, ..] => Some(geo::Coord { x: *x, y: *y }),
        _ => None,
    }
}

fn to_ring(ring: &[Position]) -> Option<geo::LineString<f64>> {
    ring.iter()
        .map(to_coord)
        .collect::<Option<Vec<_>>>()
        .map(geo::LineString::new)
}

fn to_polygon(rings: &[Vec<Position>]) -> Option<geo::Polygon<f64>> {
    let (exterior, interiors) = rings.split_first()?;
    let interiors = interiors
        .iter()
        .map(|ring| to_ring(ring))
        .collect::<Option<Vec<_>>>()?;
    Some(geo::Polygon::new(to_ring(exterior)?, interiors))
}

/// A geographic feature (an org unit) to aggregate over
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub id: String,
    pub geometry: Geometry,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Feature {
    pub fn new(id: impl Into<String>, geometry: Geometry) -> Self {
        Self {
            id: id.into(),
            geometry,
            properties: Map::new(),
        }
    }

    /// Area for polygon features, `None` for points and lines.
    pub fn polygon_area(&self) -> Result<Option<f64>, ConfigError> {
        if !self.geometry.is_polygonal() {
            return Ok(None);
        }
        self.geometry
            .area()
            .map(Some)
            .ok_or_else(|| ConfigError::InvalidGeometry(self.id.clone()))
    }
}

/// A GeoJSON FeatureCollection, as the org unit API returns it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(lon: f64, lat: f64, side: f64) -> Geometry {
        Geometry::Polygon(vec![vec![
            vec![lon, lat],
            vec![lon + side, lat],
            vec![lon + side, lat + side],
            vec![lon, lat + side],
            vec![lon, lat],
        ]])
    }

    #[test]
    fn test_one_degree_cell_area() {
        let area = square(0.0, 0.0, 1.0).area().unwrap_or_default();
        let expected = 1.2391e10;
        assert!((area - expected).abs() / expected < 1e-3, "area {area}");
    }

    #[test]
    fn test_multipolygon_area_sums_parts() {
        let Geometry::Polygon(a) = square(10.0, 5.0, 0.01) else {
            unreachable!()
        };
        let Geometry::Polygon(b) = square(11.0, 5.0, 0.01) else {
            unreachable!()
        };
        let single = Geometry::Polygon(a.clone()).area().unwrap_or_default();
        let multi = Geometry::MultiPolygon(vec![a, b]).area().unwrap_or_default();
        assert!((multi - 2.0 * single).abs() / multi < 1e-6);
    }

    #[test]
    fn test_points_and_lines_have_no_area() {
        let point = Feature::new("pt", Geometry::Point(vec![36.8, -1.3]));
        assert_eq!(point.polygon_area(), Ok(None));
        let line = Feature::new(
            "ln",
            Geometry::LineString(vec![vec![0.0, 0.0], vec![1.0, 1.0]]),
        );
        assert_eq!(line.polygon_area(), Ok(None));
    }

    #[test]
    fn test_malformed_polygon_is_config_error() {
        let bad = Feature::new("bad", Geometry::Polygon(vec![vec![vec![1.0]]]));
        assert_eq!(
            bad.polygon_area(),
            Err(ConfigError::InvalidGeometry("bad".to_string()))
        );
    }

    #[test]
    fn test_geojson_round_trip_shape() -> Result<(), serde_json::Error> {
        let json = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "id": "O6uvpzGd5pu",
                "geometry": {"type": "Point", "coordinates": [-11.6, 8.4]},
                "properties": {"name": "Bo"}
            }]
        }"#;
        let fc: FeatureCollection = serde_json::from_str(json)?;
        assert_eq!(fc.features.len(), 1);
        assert_eq!(fc.features[0].id, "O6uvpzGd5pu");
        assert_eq!(fc.features[0].geometry.type_name(), "Point");
        assert_eq!(fc.features[0].properties["name"], "Bo");
        Ok(())
    }
}
