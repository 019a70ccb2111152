//! Project area extraction from parcel geometry files
//!
//! Accepts WKT (`POINT`, `LINESTRING`, `POLYGON`, `MULTI*`) or GeoJSON
//! (bare geometry, `Feature` or `FeatureCollection`). Both are read into
//! `geo::Geometry` and flattened to `{lat, lng}` points in file order, ring
//! closing points included.

use std::fs;
use std::path::Path;

use geo::{CoordsIter, Geometry};
use geojson::GeoJson;
use wkt::TryFromWkt;

use crate::error::GeometryError;
use crate::models::{LatLng, ProjectArea};

/// Read a geometry file into a project area
pub fn load_project_area(path: &Path) -> Result<ProjectArea, GeometryError> {
    let content = fs::read_to_string(path)?;
    parse_project_area(&content)
}

/// Parse WKT or GeoJSON text into a project area
pub fn parse_project_area(text: &str) -> Result<ProjectArea, GeometryError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(GeometryError::Empty);
    }

    // GeoJSON is always an object, anything else has to be WKT
    let geometries = if text.starts_with('{') {
        parse_geojson(text)?
    } else {
        vec![parse_wkt(text)?]
    };

    let points = geometries
        .iter()
        .flat_map(|geometry| geometry.coords_iter())
        .map(|coord| LatLng {
            lat: coord.y,
            lng: coord.x,
        })
        .collect();
    ProjectArea::new(points).ok_or(GeometryError::Empty)
}

fn parse_wkt(text: &str) -> Result<Geometry<f64>, GeometryError> {
    <Geometry<f64> as TryFromWkt<f64>>::try_from_wkt_str(text)
        .map_err(|e| GeometryError::Wkt(e.to_string()))
}

fn parse_geojson(text: &str) -> Result<Vec<Geometry<f64>>, GeometryError> {
    let shapes = match text.parse::<GeoJson>()? {
        GeoJson::Geometry(geometry) => vec![geometry],
        GeoJson::Feature(feature) => feature.geometry.into_iter().collect(),
        // null geometries carry no points
        GeoJson::FeatureCollection(collection) => collection
            .features
            .into_iter()
            .filter_map(|feature| feature.geometry)
            .collect(),
    };

    let mut geometries = Vec::with_capacity(shapes.len());
    for shape in shapes {
        check_positions(&shape.value)?;
        geometries.push(Geometry::try_from(shape)?);
    }
    Ok(geometries)
}

/// Every position needs at least a longitude and a latitude
fn check_positions(value: &geojson::Value) -> Result<(), GeometryError> {
    use geojson::Value as Shape;

    fn short(position: &[f64]) -> bool {
        position.len() < 2
    }

    let malformed = match value {
        Shape::Point(position) => short(position),
        Shape::MultiPoint(positions) | Shape::LineString(positions) => {
            positions.iter().any(|p| short(p))
        }
        Shape::MultiLineString(lines) | Shape::Polygon(lines) => {
            lines.iter().flatten().any(|p| short(p))
        }
        Shape::MultiPolygon(polygons) => polygons.iter().flatten().flatten().any(|p| short(p)),
        Shape::GeometryCollection(members) => {
            for member in members {
                check_positions(&member.value)?;
            }
            false
        }
    };

    if malformed {
        Err(GeometryError::Position)
    } else {
        Ok(())
    }
}
