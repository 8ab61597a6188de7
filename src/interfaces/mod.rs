//! Environment adapter traits
//!
//! The guidance core never talks to hardware or to estimator internals.
//! Everything it needs from the platform is expressed as a trait here and
//! injected per tick through [`GuidanceContext`]:
//!
//! - [`InertialNav`]: read-only position/velocity estimates and the EKF
//!   origin
//! - [`AttitudeControl`]: read-only lean-angle limit and yaw target
//! - [`TerrainModel`]: terrain height lookups from a terrain database
//! - [`PositionControl`]: the writable position controller facade that
//!   receives the moving position target
//!
//! Mock implementations for host testing live in [`mock`].

pub mod mock;

use nalgebra::Vector3;

use crate::math::geo::Location;

/// Read-only view of the inertial navigation estimator
///
/// Positions are NEU centimetres relative to the EKF origin, velocities
/// NEU cm/s.
pub trait InertialNav {
    /// Current position estimate in cm from the EKF origin
    fn position(&self) -> Vector3<f32>;

    /// Current velocity estimate in cm/s
    fn velocity(&self) -> Vector3<f32>;

    /// Current altitude in cm above the EKF origin
    fn altitude(&self) -> f32;

    /// Geographic location of the EKF origin, if one has been set
    fn ekf_origin(&self) -> Option<Location>;
}

/// Read-only view of the attitude controller
pub trait AttitudeControl {
    /// Maximum lean angle in radians
    fn max_lean_angle_rad(&self) -> f32;

    /// Current target yaw in centi-degrees
    fn target_yaw_cd(&self) -> f32;
}

/// Read-only view of the terrain database
pub trait TerrainModel {
    /// Height of the vehicle above terrain in metres, if known
    ///
    /// `extrapolate` allows the provider to fall back to the last known
    /// gradient when the tile under the vehicle has not loaded yet.
    fn height_above_terrain(&self, extrapolate: bool) -> Option<f32>;
}

/// Writable facade over the position controller
///
/// The guidance core publishes its intermediate target through this trait
/// and reads back leash lengths and stopping points. The facade is opaque:
/// the core never inspects controller internals.
///
/// Vertical speed conventions follow the controller: `speed_down_cms` is
/// negative, `speed_up_cms` positive.
pub trait PositionControl {
    /// Set the maximum horizontal speed in cm/s
    fn set_max_speed_xy(&mut self, speed_cms: f32);

    /// Get the maximum horizontal speed in cm/s
    fn max_speed_xy(&self) -> f32;

    /// Set the maximum horizontal acceleration in cm/s/s
    fn set_max_accel_xy(&mut self, accel_cmss: f32);

    /// Set the maximum climb and descent speeds (down negative, up positive)
    fn set_max_speed_z(&mut self, speed_down_cms: f32, speed_up_cms: f32);

    /// Get the maximum climb speed in cm/s (positive)
    fn max_speed_up(&self) -> f32;

    /// Get the maximum descent speed in cm/s (negative)
    fn max_speed_down(&self) -> f32;

    /// Set the maximum vertical acceleration in cm/s/s
    fn set_max_accel_z(&mut self, accel_cmss: f32);

    /// Horizontal leash length in cm
    fn leash_xy(&self) -> f32;

    /// Vertical leash length for climbing in cm
    fn leash_up_z(&self) -> f32;

    /// Vertical leash length for descending in cm
    fn leash_down_z(&self) -> f32;

    /// Recalculate the horizontal leash from current speed/accel limits
    fn calc_leash_length_xy(&mut self);

    /// Recalculate the vertical leashes from current speed/accel limits
    fn calc_leash_length_z(&mut self);

    /// Set the position target in cm from the EKF origin
    fn set_pos_target(&mut self, pos: Vector3<f32>);

    /// Current position target in cm from the EKF origin
    fn pos_target(&self) -> Vector3<f32>;

    /// Current velocity target in cm/s
    fn vel_target(&self) -> Vector3<f32>;

    /// Set the horizontal feed-forward velocity in cm/s
    fn set_desired_velocity_xy(&mut self, vel_x_cms: f32, vel_y_cms: f32);

    /// Set the horizontal feed-forward acceleration in cm/s/s
    fn set_desired_accel_xy(&mut self, accel_x_cmss: f32, accel_y_cmss: f32);

    /// Clear the vertical feed-forward velocity
    fn clear_desired_velocity_ff_z(&mut self);

    /// Suppress vertical feed-forward for one controller cycle
    fn freeze_ff_z(&mut self);

    /// Initialise the horizontal position controller
    fn init_xy_controller(&mut self);

    /// Run one cycle of the horizontal position controller
    fn update_xy_controller(&mut self);

    /// Proportional gain of the horizontal position loop
    fn pos_xy_p_kp(&self) -> f32;

    /// Controller time step in seconds
    fn dt(&self) -> f32;

    /// Fill the horizontal components of `stopping_point` with the point
    /// at which the vehicle could come to rest, in cm from the EKF origin
    fn stopping_point_xy(&self, stopping_point: &mut Vector3<f32>);

    /// Fill the vertical component of `stopping_point` with the altitude
    /// at which the vehicle could come to rest, in cm above the EKF origin
    fn stopping_point_z(&self, stopping_point: &mut Vector3<f32>);
}

/// Per-tick bundle of environment borrows and the wall clock
///
/// Built by the owning task each tick (or before a destination change) so
/// the guidance core samples every external source exactly once and never
/// holds references across ticks.
pub struct GuidanceContext<'a> {
    /// Inertial navigation estimator
    pub inav: &'a dyn InertialNav,
    /// Attitude controller
    pub attitude: &'a dyn AttitudeControl,
    /// Terrain database, if the platform provides one
    pub terrain: Option<&'a dyn TerrainModel>,
    /// Position controller facade
    pub pos_control: &'a mut dyn PositionControl,
    /// Wall clock in milliseconds since boot
    pub now_ms: u64,
}
