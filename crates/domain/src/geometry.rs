use crate::DomainResult;
use crate::error::DomainError;
use serde::{Deserialize, Serialize};

const MIN_POLYLINE_POINTS: usize = 2;

/// Stored vertex order is (longitude, latitude).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lng: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }
}

pub fn validate_polyline(points: &[GeoPoint]) -> DomainResult<()> {
    if points.len() < MIN_POLYLINE_POINTS {
        return Err(DomainError::InvalidGeometry(format!(
            "polyline requires at least {MIN_POLYLINE_POINTS} points"
        )));
    }

    for point in points {
        if !(-180.0..=180.0).contains(&point.lng) {
            return Err(DomainError::InvalidGeometry(format!(
                "longitude {} is out of range",
                point.lng
            )));
        }
        if !(-90.0..=90.0).contains(&point.lat) {
            return Err(DomainError::InvalidGeometry(format!(
                "latitude {} is out of range",
                point.lat
            )));
        }
    }

    if points.iter().all(|point| *point == points[0]) {
        return Err(DomainError::InvalidGeometry(
            "polyline points are all identical".into(),
        ));
    }

    Ok(())
}

/// Projects a stored polyline into the (latitude, longitude) order map
/// layers consume. Vertex order is preserved.
pub fn project_for_display(points: &[GeoPoint]) -> DomainResult<Vec<(f64, f64)>> {
    validate_polyline(points)?;
    Ok(points.iter().map(|point| (point.lat, point.lng)).collect())
}
