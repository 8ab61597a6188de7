//! Geographic locations and NEU vector conversion
//!
//! Waypoints arrive from the mission layer as geographic locations. The
//! guidance core works in a local NEU frame (centimetres from the EKF
//! origin), so locations are converted with a flat-earth approximation
//! about the origin. Altitudes carry their own frame: above the EKF
//! origin or above terrain.

use libm::{cosf, roundf};
use nalgebra::Vector3;

/// Centimetres per 1e-7 degree of latitude
const LATLON_TO_CM: f32 = 1.113_188_5;

/// Altitude frame of a [`Location`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AltFrame {
    /// Altitude is relative to the EKF origin
    #[default]
    AboveOrigin,
    /// Altitude is relative to the terrain below the vehicle
    AboveTerrain,
}

/// Geographic position with an explicit altitude frame
///
/// Latitude and longitude are integers in 1e-7 degrees, altitude in
/// centimetres. The altitude value is interpreted according to `frame`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Location {
    /// Latitude in 1e-7 degrees
    pub lat: i32,
    /// Longitude in 1e-7 degrees
    pub lng: i32,
    /// Altitude in centimetres, in the frame given by `frame`
    pub alt_cm: i32,
    /// Altitude frame
    pub frame: AltFrame,
}

impl Location {
    /// Create a new location
    pub fn new(lat: i32, lng: i32, alt_cm: i32, frame: AltFrame) -> Self {
        Self {
            lat,
            lng,
            alt_cm,
            frame,
        }
    }
}

/// Longitude scaling factor at the given latitude (1e-7 degrees)
///
/// Longitude lines converge towards the poles; east-west distances shrink
/// by the cosine of the latitude. Floored at 0.01 to stay invertible.
fn longitude_scale(lat: i32) -> f32 {
    const DEG_TO_RAD: f32 = core::f32::consts::PI / 180.0;
    let scale = cosf(lat as f32 * 1.0e-7 * DEG_TO_RAD);
    scale.max(0.01)
}

/// Convert a location to a NEU vector in cm relative to the EKF origin
///
/// Returns the vector and whether its z component is an altitude above
/// terrain (taken from the location's altitude frame).
pub fn vector_neu_from_location(loc: &Location, origin: &Location) -> (Vector3<f32>, bool) {
    let x = (loc.lat - origin.lat) as f32 * LATLON_TO_CM;
    let y = (loc.lng - origin.lng) as f32 * LATLON_TO_CM * longitude_scale(origin.lat);
    let z = loc.alt_cm as f32;
    (Vector3::new(x, y, z), loc.frame == AltFrame::AboveTerrain)
}

/// Convert a NEU vector in cm relative to the EKF origin back to a location
pub fn location_from_vector_neu(
    vec: &Vector3<f32>,
    origin: &Location,
    terrain_alt: bool,
) -> Location {
    let lat = origin.lat + roundf(vec.x / LATLON_TO_CM) as i32;
    let lng = origin.lng + roundf(vec.y / (LATLON_TO_CM * longitude_scale(origin.lat))) as i32;
    Location {
        lat,
        lng,
        alt_cm: roundf(vec.z) as i32,
        frame: if terrain_alt {
            AltFrame::AboveTerrain
        } else {
            AltFrame::AboveOrigin
        },
    }
}
