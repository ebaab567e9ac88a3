//! Bounding boxes and web-mercator ground resolution.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Equatorial circumference of the earth in meters.
pub const WORLD_CIRCUMFERENCE_M: f64 = 40_075_017.0;

/// Edge length of a map tile in pixels.
pub const TILE_SIZE: f64 = 256.0;

#[derive(Debug, Error, PartialEq)]
pub enum BoundingBoxError {
    #[error("expected 4 comma-separated values (south,west,north,east), got {0}")]
    Arity(usize),
    #[error("invalid coordinate '{0}'")]
    Number(String),
    #[error("latitude out of range: {0}")]
    Latitude(f64),
    #[error("longitude out of range: {0}")]
    Longitude(f64),
    #[error("south ({south}) is north of north ({north})")]
    Inverted { south: f64, north: f64 },
}

/// Geographic bounding box in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl BoundingBox {
    /// Create a validated bounding box.
    pub fn new(south: f64, west: f64, north: f64, east: f64) -> Result<Self, BoundingBoxError> {
        for lat in [south, north] {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(BoundingBoxError::Latitude(lat));
            }
        }
        for lon in [west, east] {
            if !(-180.0..=180.0).contains(&lon) {
                return Err(BoundingBoxError::Longitude(lon));
            }
        }
        if south > north {
            return Err(BoundingBoxError::Inverted { south, north });
        }
        Ok(Self {
            south,
            west,
            north,
            east,
        })
    }

    /// Render as the `(south,west,north,east)` filter Overpass QL expects.
    pub fn to_overpass(&self) -> String {
        format!("{},{},{},{}", self.south, self.west, self.north, self.east)
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}_{}", self.south, self.west, self.north, self.east)
    }
}

impl FromStr for BoundingBox {
    type Err = BoundingBoxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(BoundingBoxError::Arity(parts.len()));
        }
        let mut values = [0.0f64; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| BoundingBoxError::Number(part.to_string()))?;
        }
        Self::new(values[0], values[1], values[2], values[3])
    }
}

/// Meters per pixel at the given latitude and zoom level.
pub fn ground_resolution(latitude: f64, zoom: u8) -> f64 {
    (WORLD_CIRCUMFERENCE_M * latitude.to_radians().cos()) / (TILE_SIZE * 2f64.powi(zoom as i32))
}

/// Square pixel dimensions covering `size_meters` at `resolution` meters per pixel.
pub fn pixel_dimensions(size_meters: f64, resolution: f64) -> (u32, u32) {
    let pixels = (size_meters / resolution) as u32;
    (pixels, pixels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_at_equator_zoom_zero() {
        let res = ground_resolution(0.0, 0);
        assert!((res - WORLD_CIRCUMFERENCE_M / 256.0).abs() < 1e-9);
    }

    #[test]
    fn test_resolution_decreases_with_zoom() {
        for lat in [0.0, 40.7, -33.9, 64.1] {
            let mut previous = ground_resolution(lat, 0);
            for zoom in 1..=22 {
                let current = ground_resolution(lat, zoom);
                assert!(current < previous, "lat {lat} zoom {zoom}");
                previous = current;
            }
        }
    }

    #[test]
    fn test_resolution_shrinks_toward_poles() {
        assert!(ground_resolution(60.0, 17) < ground_resolution(0.0, 17));
    }

    #[test]
    fn test_pixel_dimensions_truncate() {
        // ~0.149 m/px at the equator, zoom 20
        let res = ground_resolution(0.0, 20);
        let (w, h) = pixel_dimensions(100.0, res);
        assert_eq!(w, h);
        assert_eq!(w, (100.0 / res) as u32);
        assert_eq!(w, 669);
    }

    #[test]
    fn test_parse_bbox() {
        let bbox: BoundingBox = "40.4459,-112.3853,40.8917,-111.3073".parse().unwrap();
        assert_eq!(bbox.south, 40.4459);
        assert_eq!(bbox.east, -111.3073);
        assert_eq!(bbox.to_overpass(), "40.4459,-112.3853,40.8917,-111.3073");
    }

    #[test]
    fn test_parse_bbox_errors() {
        assert_eq!(
            "1,2,3".parse::<BoundingBox>(),
            Err(BoundingBoxError::Arity(3))
        );
        assert!(matches!(
            "a,2,3,4".parse::<BoundingBox>(),
            Err(BoundingBoxError::Number(_))
        ));
        assert!(matches!(
            "50,0,40,1".parse::<BoundingBox>(),
            Err(BoundingBoxError::Inverted { .. })
        ));
        assert!(matches!(
            "0,200,1,1".parse::<BoundingBox>(),
            Err(BoundingBoxError::Longitude(_))
        ));
    }

    #[test]
    fn test_display_is_filename_friendly() {
        let bbox = BoundingBox::new(1.5, 2.0, 3.0, 4.25).unwrap();
        assert_eq!(bbox.to_string(), "1.5_2_3_4.25");
    }
}
