//! Geographic [`Position`] and the reference ellipsoid ("globe") it is measured
//! against, plus conversion to/from the Cartesian points the geometry layer
//! (`zpatial::mazth`) operates on.

use zpatial::mazth::point::Point3;
use serde::{Deserialize, Serialize};

/// WGS84-like reference ellipsoid, reduced to the two parameters the engine
/// actually needs: the mean radius used for great-circle distance and for
/// projecting geodetic coordinates to a local Cartesian frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Globe {
    pub radius_m: f64,
}

impl Default for Globe {
    fn default() -> Self {
        Globe {
            radius_m: 6_371_000.0,
        }
    }
}

/// Geodetic position: latitude/longitude in degrees, elevation in metres
/// above the ellipsoid.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: f64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64, elevation: f64) -> Self {
        Position {
            latitude,
            longitude,
            elevation,
        }
    }

    /// Equality under a fixed epsilon: two positions within `eps` metres
    /// (in the projected
    /// Cartesian frame) along every axis are the same graph node.
    pub fn almost_equal(&self, other: &Position, globe: &Globe, eps: f64) -> bool {
        let a = self.to_cartesian(globe);
        let b = other.to_cartesian(globe);
        (a[0] - b[0]).abs() < eps && (a[1] - b[1]).abs() < eps && (a[2] - b[2]).abs() < eps
    }

    /// Local tangent-plane Cartesian projection centred on the globe's
    /// origin, adequate for short-range geometric math (collision checks,
    /// grid subdivision, segment intersection). Not a true ECEF transform.
    pub fn to_cartesian(&self, globe: &Globe) -> [f64; 3] {
        let lat = self.latitude.to_radians();
        let lon = self.longitude.to_radians();
        let r = globe.radius_m + self.elevation;
        [
            r * lat.cos() * lon.cos(),
            r * lat.cos() * lon.sin(),
            r * lat.sin(),
        ]
    }

    pub fn to_point3(&self, globe: &Globe) -> Point3<f64> {
        let c = self.to_cartesian(globe);
        Point3::init(&c)
    }

    pub fn from_cartesian(c: [f64; 3], globe: &Globe) -> Self {
        let r = (c[0] * c[0] + c[1] * c[1] + c[2] * c[2]).sqrt();
        let lat = (c[2] / r).asin();
        let lon = c[1].atan2(c[0]);
        Position {
            latitude: lat.to_degrees(),
            longitude: lon.to_degrees(),
            elevation: r - globe.radius_m,
        }
    }

    /// Great-circle-ish straight-line distance in the projected Cartesian
    /// frame (terrain is not followed).
    pub fn distance(&self, other: &Position, globe: &Globe) -> f64 {
        let a = self.to_cartesian(globe);
        let b = other.to_cartesian(globe);
        let dx = a[0] - b[0];
        let dy = a[1] - b[1];
        let dz = a[2] - b[2];
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    pub fn lerp(&self, other: &Position, t: f64) -> Position {
        Position {
            latitude: self.latitude + (other.latitude - self.latitude) * t,
            longitude: self.longitude + (other.longitude - self.longitude) * t,
            elevation: self.elevation + (other.elevation - self.elevation) * t,
        }
    }
}
