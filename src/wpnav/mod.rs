//! Waypoint guidance controller
//!
//! Moves an intermediate position target along a track (straight line or
//! cubic Hermite spline) from an origin to a destination waypoint and
//! publishes it to the position controller each tick. The target's motion
//! is bounded three ways:
//!
//! - speed caps, projected onto the track direction
//! - acceleration caps, also projected onto the track direction
//! - a leash: the maximum distance between the vehicle and the moving
//!   target, so the downstream position controller stays in its linear
//!   region
//!
//! The controller is a platform-agnostic state machine. It owns no
//! references; the environment (inertial estimator, attitude controller,
//! terrain sources, position controller) is borrowed per call through
//! [`GuidanceContext`], which also carries the wall clock.
//!
//! Straight-segment handling lives here; the Hermite spline builder and
//! advancer are in the `spline` submodule.

mod spline;

use bitflags::bitflags;
use libm::{atan2f, fabsf, tanf};
use nalgebra::Vector3;

use crate::interfaces::GuidanceContext;
use crate::math::geo::{location_from_vector_neu, vector_neu_from_location, Location};
use crate::math::{
    bearing_cd, is_equal, is_positive, is_zero, length_xy, norm_xy, radians_to_centidegrees,
    safe_sqrt, sq, GRAVITY_MSS,
};
use crate::parameters::WpNavParams;

use self::spline::SplineState;

pub use self::spline::SegmentEndType;

/// Default horizontal acceleration in cm/s/s, restored when the stored
/// parameter is degenerate
pub const WPNAV_ACCELERATION: f32 = 100.0;

/// Minimum acceptance radius in cm
pub const WPNAV_WP_RADIUS_MIN: f32 = 5.0;

/// Minimum commandable horizontal speed in cm/s
pub const WPNAV_WP_SPEED_MIN: f32 = 20.0;

/// Floor for the along-track target speed while braking, in cm/s
pub const WPNAV_WP_TRACK_SPEED_MIN: f32 = 50.0;

/// Maximum distance the target may overshoot a fast waypoint, in cm
pub const WPNAV_WP_FAST_OVERSHOOT_MAX: f32 = 200.0;

/// Minimum track leash length in cm
pub const WPNAV_LEASH_LENGTH_MIN: f32 = 100.0;

/// Minimum horizontal track length before yaw follows the track, in cm
pub const WPNAV_YAW_DIST_MIN: f32 = 200.0;

/// Fraction of the horizontal leash the target must lead the vehicle by
/// before yaw follows the vehicle-to-target vector
pub const WPNAV_YAW_LEASH_PCT_MIN: f32 = 0.134;

/// Window within which the controller counts as recently active, in ms
const WPNAV_ACTIVE_TIMEOUT_MS: u64 = 1000;

bitflags! {
    /// Guidance status flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WpNavFlags: u8 {
        /// The current segment is complete
        const REACHED_DESTINATION = 1 << 0;
        /// Completion is defined by the target reaching the end of the
        /// track, not by the vehicle entering the acceptance radius
        const FAST_WAYPOINT = 1 << 1;
        /// The target has begun braking towards the destination
        const SLOWING_DOWN = 1 << 2;
        /// Track leash lengths must be recalculated after this cycle
        const RECALC_WP_LEASH = 1 << 3;
        /// A destination was just set; feed-forward is frozen for one
        /// cycle to smooth the transition
        const NEW_WP_DESTINATION = 1 << 4;
        /// A yaw target has been cached for the current segment
        const WP_YAW_SET = 1 << 5;
    }
}

/// Geometry of the active segment
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SegmentType {
    /// Straight line from origin to destination
    Straight,
    /// Cubic Hermite spline from origin to destination
    Spline,
}

/// Guidance failures
///
/// Setters fail without touching the active segment; `update_*` failures
/// apply to the failed tick only and the next tick may retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GuidanceError {
    /// The EKF origin is not set, so locations cannot be converted
    NoEkfOrigin,
    /// Terrain data is required but unavailable
    NoTerrainData,
    /// `update_spline` was called while a straight segment is active
    NotSplineSegment,
}

impl core::fmt::Display for GuidanceError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            GuidanceError::NoEkfOrigin => write!(f, "EKF origin not set"),
            GuidanceError::NoTerrainData => write!(f, "terrain data unavailable"),
            GuidanceError::NotSplineSegment => write!(f, "active segment is not a spline"),
        }
    }
}

/// Waypoint guidance controller
///
/// Owns the active segment's geometry, the flag set and the speed-ramp
/// state. Created once, reconfigured per segment through the destination
/// setters, advanced by `update_wpnav`/`update_spline` at 100 Hz or
/// faster.
pub struct WpNav {
    params: WpNavParams,

    // rangefinder state pushed in by the platform
    rangefinder_available: bool,
    rangefinder_healthy: bool,
    rangefinder_alt_cm: f32,

    // active segment
    origin: Vector3<f32>,
    destination: Vector3<f32>,
    terrain_alt: bool,
    pos_delta_unit: Vector3<f32>,
    track_length: f32,
    track_length_xy: f32,
    track_desired: f32,
    track_accel: f32,
    track_speed: f32,
    track_leash_length: f32,
    limited_speed_xy_cms: f32,
    track_error_xy: f32,
    slow_down_dist: f32,

    // spline segment state
    spline: SplineState,

    // speed-ramp target
    wp_desired_speed_xy_cms: f32,

    yaw_cd: f32,
    flags: WpNavFlags,
    segment_type: SegmentType,
    wp_last_update_ms: Option<u64>,
}

impl WpNav {
    /// Create a new guidance controller from a parameter snapshot
    pub fn new(params: WpNavParams) -> Self {
        let mut params = params;
        params.wp_radius_cm = params.wp_radius_cm.max(WPNAV_WP_RADIUS_MIN);
        let wp_desired_speed_xy_cms = params.wp_speed_cms;

        Self {
            params,
            rangefinder_available: false,
            rangefinder_healthy: false,
            rangefinder_alt_cm: 0.0,
            origin: Vector3::zeros(),
            destination: Vector3::zeros(),
            terrain_alt: false,
            pos_delta_unit: Vector3::zeros(),
            track_length: 0.0,
            track_length_xy: 0.0,
            track_desired: 0.0,
            track_accel: 0.0,
            track_speed: 0.0,
            track_leash_length: WPNAV_LEASH_LENGTH_MIN,
            limited_speed_xy_cms: 0.0,
            track_error_xy: 0.0,
            slow_down_dist: 0.0,
            spline: SplineState::default(),
            wp_desired_speed_xy_cms,
            yaw_cd: 0.0,
            flags: WpNavFlags::empty(),
            segment_type: SegmentType::Straight,
            wp_last_update_ms: None,
        }
    }

    /// Current parameter snapshot
    pub fn params(&self) -> &WpNavParams {
        &self.params
    }

    /// Push the latest rangefinder reading into the controller
    pub fn set_rangefinder_alt(&mut self, available: bool, healthy: bool, alt_cm: f32) {
        self.rangefinder_available = available;
        self.rangefinder_healthy = healthy;
        self.rangefinder_alt_cm = alt_cm;
    }

    /// Initialise the straight and spline waypoint controllers
    ///
    /// Must be called once before the controller is used; does not need to
    /// be called again before subsequent destination changes.
    pub fn wp_and_spline_init(&mut self, ctx: &mut GuidanceContext<'_>) {
        // restore a sane acceleration if the stored parameter is
        // degenerate, then cap it by what the lean-angle limit can deliver
        if self.params.wp_accel_cmss <= 0.0 {
            self.params.wp_accel_cmss = WPNAV_ACCELERATION;
        }
        let lean_accel_limit = GRAVITY_MSS * 100.0 * tanf(ctx.attitude.max_lean_angle_rad());
        self.params.wp_accel_cmss = self.params.wp_accel_cmss.min(lean_accel_limit);

        ctx.pos_control.set_desired_accel_xy(0.0, 0.0);
        ctx.pos_control.init_xy_controller();
        ctx.pos_control.clear_desired_velocity_ff_z();
        ctx.pos_control.set_desired_velocity_xy(0.0, 0.0);

        self.wp_desired_speed_xy_cms = self.params.wp_speed_cms;

        ctx.pos_control.set_max_speed_xy(self.params.wp_speed_cms);
        ctx.pos_control.set_max_accel_xy(self.params.wp_accel_cmss);
        ctx.pos_control
            .set_max_speed_z(-self.params.wp_speed_down_cms, self.params.wp_speed_up_cms);
        ctx.pos_control.set_max_accel_z(self.params.wp_accel_z_cmss);
        ctx.pos_control.calc_leash_length_xy();
        ctx.pos_control.calc_leash_length_z();

        self.flags.remove(WpNavFlags::WP_YAW_SET);
    }

    /// Request a new horizontal cruise speed in cm/s
    ///
    /// Requests below `WPNAV_WP_SPEED_MIN` are ignored. The active speed
    /// cap ramps towards the request at the horizontal acceleration limit.
    pub fn set_speed_xy(&mut self, speed_cms: f32) {
        if speed_cms >= WPNAV_WP_SPEED_MIN {
            self.wp_desired_speed_xy_cms = speed_cms;
        }
    }

    /// Set the climb speed cap in cm/s, effective immediately
    pub fn set_speed_up(&mut self, ctx: &mut GuidanceContext<'_>, speed_up_cms: f32) {
        let speed_down = ctx.pos_control.max_speed_down();
        ctx.pos_control.set_max_speed_z(speed_down, speed_up_cms);
        self.flags.insert(WpNavFlags::RECALC_WP_LEASH);
    }

    /// Set the descent speed cap in cm/s (positive magnitude), effective
    /// immediately
    pub fn set_speed_down(&mut self, ctx: &mut GuidanceContext<'_>, speed_down_cms: f32) {
        let speed_up = ctx.pos_control.max_speed_up();
        ctx.pos_control
            .set_max_speed_z(-fabsf(speed_down_cms), speed_up);
        self.flags.insert(WpNavFlags::RECALC_WP_LEASH);
    }

    /// Set a straight-segment destination from a geographic location
    pub fn set_wp_destination_location(
        &mut self,
        ctx: &mut GuidanceContext<'_>,
        destination: &Location,
    ) -> Result<(), GuidanceError> {
        let ekf_origin = ctx.inav.ekf_origin().ok_or(GuidanceError::NoEkfOrigin)?;
        let (dest_neu, terrain_alt) = vector_neu_from_location(destination, &ekf_origin);
        self.set_wp_destination(ctx, dest_neu, terrain_alt)
    }

    /// Report the active destination as a geographic location
    pub fn wp_destination_location(
        &self,
        ctx: &GuidanceContext<'_>,
    ) -> Result<Location, GuidanceError> {
        let ekf_origin = ctx.inav.ekf_origin().ok_or(GuidanceError::NoEkfOrigin)?;
        Ok(location_from_vector_neu(
            &self.destination,
            &ekf_origin,
            self.terrain_alt,
        ))
    }

    /// Set a straight-segment destination in cm from the EKF origin
    ///
    /// `terrain_alt` marks `destination.z` as an altitude above terrain.
    /// The origin is the current position target when the controller ran
    /// recently, otherwise a stopping point projected from the current
    /// position and velocity.
    pub fn set_wp_destination(
        &mut self,
        ctx: &mut GuidanceContext<'_>,
        destination: Vector3<f32>,
        terrain_alt: bool,
    ) -> Result<(), GuidanceError> {
        let mut origin = if self.is_active(ctx.now_ms) {
            ctx.pos_control.pos_target()
        } else {
            let mut stopping_point = Vector3::zeros();
            ctx.pos_control.stopping_point_xy(&mut stopping_point);
            ctx.pos_control.stopping_point_z(&mut stopping_point);
            stopping_point
        };

        // re-base the origin's altitude onto the terrain frame
        if terrain_alt {
            origin.z -= self.terrain_offset(ctx)?;
        }

        self.set_wp_origin_and_destination(ctx, origin, destination, terrain_alt)
    }

    /// Set a straight-segment destination from a NED vector in metres
    pub fn set_wp_destination_ned(
        &mut self,
        ctx: &mut GuidanceContext<'_>,
        destination_ned_m: Vector3<f32>,
    ) -> Result<(), GuidanceError> {
        self.set_wp_destination(
            ctx,
            Vector3::new(
                destination_ned_m.x * 100.0,
                destination_ned_m.y * 100.0,
                -destination_ned_m.z * 100.0,
            ),
            false,
        )
    }

    /// Set a straight segment's origin and destination in cm from the EKF
    /// origin
    ///
    /// Fails without touching the active segment when terrain data is
    /// required and unavailable.
    pub fn set_wp_origin_and_destination(
        &mut self,
        ctx: &mut GuidanceContext<'_>,
        origin: Vector3<f32>,
        destination: Vector3<f32>,
        terrain_alt: bool,
    ) -> Result<(), GuidanceError> {
        let origin_terr_offset = if terrain_alt {
            self.terrain_offset(ctx)?
        } else {
            0.0
        };

        self.origin = origin;
        self.destination = destination;
        self.terrain_alt = terrain_alt;
        let pos_delta = destination - origin;

        self.track_length = pos_delta.norm();
        self.track_length_xy = safe_sqrt(sq(pos_delta.x) + sq(pos_delta.y));

        if is_zero(self.track_length) {
            // zero-length segment, leave the direction degenerate
            self.pos_delta_unit = Vector3::zeros();
        } else {
            self.pos_delta_unit = pos_delta / self.track_length;
        }

        self.calculate_wp_leash_length(ctx);

        // start the intermediate target at the origin
        ctx.pos_control
            .set_pos_target(origin + Vector3::new(0.0, 0.0, origin_terr_offset));
        self.track_desired = 0.0;
        self.flags.remove(
            WpNavFlags::REACHED_DESTINATION
                | WpNavFlags::FAST_WAYPOINT
                | WpNavFlags::SLOWING_DOWN
                | WpNavFlags::WP_YAW_SET,
        );
        self.segment_type = SegmentType::Straight;
        self.flags.insert(WpNavFlags::NEW_WP_DESTINATION);

        // seed the target speed from the vehicle's speed along the track
        let curr_vel = ctx.inav.velocity();
        let speed_along_track = curr_vel.dot(&self.pos_delta_unit);
        self.limited_speed_xy_cms =
            speed_along_track.clamp(0.0, ctx.pos_control.max_speed_xy());

        Ok(())
    }

    /// Shift the segment so its origin is the current position
    ///
    /// Used just before takeoff; a no-op once the target has advanced.
    pub fn shift_wp_origin_to_current_pos(&mut self, ctx: &mut GuidanceContext<'_>) {
        if self.track_desired > 0.0 {
            return;
        }

        let curr_pos = ctx.inav.position();
        let pos_target = ctx.pos_control.pos_target();
        let pos_diff = curr_pos - pos_target;

        self.origin += pos_diff;
        self.destination += pos_diff;

        ctx.pos_control.set_pos_target(curr_pos);
        ctx.pos_control.freeze_ff_z();
    }

    /// Horizontal stopping point in cm from the EKF origin
    pub fn wp_stopping_point_xy(&self, ctx: &GuidanceContext<'_>) -> Vector3<f32> {
        let mut stopping_point = Vector3::zeros();
        ctx.pos_control.stopping_point_xy(&mut stopping_point);
        stopping_point
    }

    /// 3D stopping point in cm from the EKF origin
    pub fn wp_stopping_point(&self, ctx: &GuidanceContext<'_>) -> Vector3<f32> {
        let mut stopping_point = Vector3::zeros();
        ctx.pos_control.stopping_point_xy(&mut stopping_point);
        ctx.pos_control.stopping_point_z(&mut stopping_point);
        stopping_point
    }

    /// Horizontal distance from the vehicle to the destination in cm
    pub fn wp_distance_to_destination(&self, ctx: &GuidanceContext<'_>) -> f32 {
        let curr = ctx.inav.position();
        norm_xy(self.destination.x - curr.x, self.destination.y - curr.y)
    }

    /// Bearing from the vehicle to the destination in centi-degrees
    pub fn wp_bearing_to_destination(&self, ctx: &GuidanceContext<'_>) -> f32 {
        bearing_cd(&ctx.inav.position(), &self.destination)
    }

    /// Run the straight-segment controller; call at 100 Hz or faster
    ///
    /// Returns `NoTerrainData` for the tick when the terrain offset could
    /// not be resolved; the segment is untouched and the next tick may
    /// retry.
    pub fn update_wpnav(&mut self, ctx: &mut GuidanceContext<'_>) -> Result<(), GuidanceError> {
        let dt = ctx.pos_control.dt();

        // re-apply acceleration caps every cycle so they can be tuned live
        ctx.pos_control.set_max_accel_xy(self.params.wp_accel_cmss);
        ctx.pos_control.set_max_accel_z(self.params.wp_accel_z_cmss);

        self.wp_speed_update(ctx, dt);

        let advanced = self.advance_wp_target_along_track(ctx, dt);

        // freeze feed-forward across the discontinuity of a new segment
        if self.flags.contains(WpNavFlags::NEW_WP_DESTINATION) {
            self.flags.remove(WpNavFlags::NEW_WP_DESTINATION);
            ctx.pos_control.freeze_ff_z();
        }

        ctx.pos_control.update_xy_controller();
        self.check_wp_leash_length(ctx);

        self.wp_last_update_ms = Some(ctx.now_ms);

        advanced
    }

    /// Cached yaw target in centi-degrees, falling back to the attitude
    /// controller's current target until the segment sets one
    pub fn yaw_cd(&self, ctx: &GuidanceContext<'_>) -> f32 {
        if self.flags.contains(WpNavFlags::WP_YAW_SET) {
            self.yaw_cd
        } else {
            ctx.attitude.target_yaw_cd()
        }
    }

    /// Whether the active segment is complete
    pub fn reached_destination(&self) -> bool {
        self.flags.contains(WpNavFlags::REACHED_DESTINATION)
    }

    /// Whether the active segment completes at the track end rather than
    /// the acceptance radius
    pub fn fast_waypoint(&self) -> bool {
        self.flags.contains(WpNavFlags::FAST_WAYPOINT)
    }

    /// Mark the active segment as a fast waypoint
    pub fn set_fast_waypoint(&mut self, fast: bool) {
        self.flags.set(WpNavFlags::FAST_WAYPOINT, fast);
    }

    /// Geometry of the active segment
    pub fn segment_type(&self) -> SegmentType {
        self.segment_type
    }

    /// Active segment origin in cm from the EKF origin
    pub fn origin(&self) -> Vector3<f32> {
        self.origin
    }

    /// Active segment destination in cm from the EKF origin
    pub fn destination(&self) -> Vector3<f32> {
        self.destination
    }

    /// Whether segment altitudes are above-terrain
    pub fn terrain_alt(&self) -> bool {
        self.terrain_alt
    }

    // ========================================================================
    // Internal methods
    // ========================================================================

    /// Whether the controller ran within the activity window
    fn is_active(&self, now_ms: u64) -> bool {
        self.wp_last_update_ms
            .map_or(false, |last| now_ms.saturating_sub(last) < WPNAV_ACTIVE_TIMEOUT_MS)
    }

    /// Cache a yaw target for the current segment
    fn set_yaw_cd(&mut self, heading_cd: f32) {
        self.yaw_cd = crate::math::wrap_360_cd(heading_cd);
        self.flags.insert(WpNavFlags::WP_YAW_SET);
    }

    /// Move the straight-segment target along the track
    fn advance_wp_target_along_track(
        &mut self,
        ctx: &mut GuidanceContext<'_>,
        dt: f32,
    ) -> Result<(), GuidanceError> {
        let curr_pos = ctx.inav.position();

        let terr_offset = if self.terrain_alt {
            self.terrain_offset(ctx)?
        } else {
            0.0
        };

        // vehicle offset from the segment origin, altitude re-based onto
        // the segment's frame
        let curr_delta = (curr_pos - Vector3::new(0.0, 0.0, terr_offset)) - self.origin;

        // distance along the track at the foot of the perpendicular from
        // the vehicle
        let track_covered = curr_delta.dot(&self.pos_delta_unit);

        // error from the closest point on the track to the vehicle
        let track_error = curr_delta - self.pos_delta_unit * track_covered;
        self.track_error_xy = length_xy(&track_error);
        let track_error_z = fabsf(track_error.z);

        // up leash when the vehicle sits above the track, down leash below
        let leash_z = if track_error.z >= 0.0 {
            ctx.pos_control.leash_up_z()
        } else {
            ctx.pos_control.leash_down_z()
        };

        // Pythagoras on the leash sphere: the perpendicular error is the
        // opposite side, the remaining along-track slack the adjacent,
        // and the leash length bounds the hypotenuse
        let track_leash_length_abs = fabsf(self.track_leash_length);
        let track_error_max_abs = (self.track_leash_length * track_error_z / leash_z)
            .max(self.track_leash_length * self.track_error_xy / ctx.pos_control.leash_xy());
        let track_leash_slack = if track_leash_length_abs > track_error_max_abs {
            safe_sqrt(sq(self.track_leash_length) - sq(track_error_max_abs))
        } else {
            0.0
        };
        let track_desired_max = track_covered + track_leash_slack;

        // target already beyond what the leash allows
        let reached_leash_limit = self.track_desired > track_desired_max;

        let curr_vel = ctx.inav.velocity();
        let speed_along_track = curr_vel.dot(&self.pos_delta_unit);

        // speed below which the position controller responds linearly
        let kp = ctx.pos_control.pos_xy_p_kp();
        let linear_velocity = if is_positive(kp) {
            self.track_accel / kp
        } else {
            ctx.pos_control.max_speed_xy()
        };

        if speed_along_track < -linear_velocity {
            // moving fast away from the destination, hold the target still
            self.limited_speed_xy_cms = 0.0;
        } else {
            if dt > 0.0 && !reached_leash_limit {
                self.limited_speed_xy_cms += 2.0 * self.track_accel * dt;
            }
            self.limited_speed_xy_cms = self.limited_speed_xy_cms.clamp(0.0, self.track_speed);

            if !self.flags.contains(WpNavFlags::FAST_WAYPOINT) {
                let dist_to_dest = self.track_length - self.track_desired;
                if !self.flags.contains(WpNavFlags::SLOWING_DOWN)
                    && dist_to_dest <= self.slow_down_dist
                {
                    self.flags.insert(WpNavFlags::SLOWING_DOWN);
                }
                if self.flags.contains(WpNavFlags::SLOWING_DOWN) {
                    self.limited_speed_xy_cms = self
                        .limited_speed_xy_cms
                        .min(Self::slow_down_speed(dist_to_dest, self.track_accel));
                }
            }

            // inside the linear region, keep the target speed within
            // linear_velocity of the vehicle's along-track speed
            if fabsf(speed_along_track) < linear_velocity {
                self.limited_speed_xy_cms = self.limited_speed_xy_cms.clamp(
                    speed_along_track - linear_velocity,
                    speed_along_track + linear_velocity,
                );
            }
        }

        if !reached_leash_limit {
            self.track_desired += self.limited_speed_xy_cms * dt;

            // bleed speed off when the step ran into the leash limit
            if self.track_desired > track_desired_max {
                self.track_desired = track_desired_max;
                self.limited_speed_xy_cms -= 2.0 * self.track_accel * dt;
                if self.limited_speed_xy_cms < 0.0 {
                    self.limited_speed_xy_cms = 0.0;
                }
            }
        }

        // the target may run past the end only for fast waypoints
        if !self.flags.contains(WpNavFlags::FAST_WAYPOINT) {
            self.track_desired = self.track_desired.clamp(0.0, self.track_length);
        } else {
            self.track_desired = self
                .track_desired
                .clamp(0.0, self.track_length + WPNAV_WP_FAST_OVERSHOOT_MAX);
        }

        let mut final_target = self.origin + self.pos_delta_unit * self.track_desired;
        final_target.z += terr_offset;
        ctx.pos_control.set_pos_target(final_target);

        if !self.flags.contains(WpNavFlags::REACHED_DESTINATION)
            && self.track_desired >= self.track_length
        {
            if self.flags.contains(WpNavFlags::FAST_WAYPOINT) {
                self.flags.insert(WpNavFlags::REACHED_DESTINATION);
            } else {
                // regular waypoints also require the vehicle inside the
                // acceptance radius
                let dist_to_dest =
                    (curr_pos - Vector3::new(0.0, 0.0, terr_offset)) - self.destination;
                if dist_to_dest.norm() <= self.params.wp_radius_cm {
                    self.flags.insert(WpNavFlags::REACHED_DESTINATION);
                }
            }
        }

        // yaw follows the track when the segment is long enough
        // horizontally
        if self.track_length_xy >= WPNAV_YAW_DIST_MIN {
            let leash_xy = ctx.pos_control.leash_xy();
            if leash_xy < WPNAV_YAW_DIST_MIN {
                // short leash means low speed; point along the segment
                let bearing = bearing_cd(&self.origin, &self.destination);
                self.set_yaw_cd(bearing);
            } else {
                let horiz_x = final_target.x - curr_pos.x;
                let horiz_y = final_target.y - curr_pos.y;
                if norm_xy(horiz_x, horiz_y)
                    > WPNAV_YAW_DIST_MIN.min(leash_xy * WPNAV_YAW_LEASH_PCT_MIN)
                {
                    self.set_yaw_cd(radians_to_centidegrees(atan2f(horiz_y, horiz_x)));
                }
            }
        }

        Ok(())
    }

    /// Recalculate leash lengths when flagged
    ///
    /// Runs after the position controller update, which may itself have
    /// changed the controller leash lengths.
    fn check_wp_leash_length(&mut self, ctx: &GuidanceContext<'_>) {
        if self.flags.contains(WpNavFlags::RECALC_WP_LEASH) {
            self.calculate_wp_leash_length(ctx);
        }
    }

    /// Project the speed, acceleration and leash caps onto the track
    /// direction
    ///
    /// Takes the component-wise minimum of the horizontal and vertical
    /// projections so the projected caps are achievable on both axes at
    /// once.
    fn calculate_wp_leash_length(&mut self, ctx: &GuidanceContext<'_>) {
        let pos_delta_unit_xy = norm_xy(self.pos_delta_unit.x, self.pos_delta_unit.y);
        let pos_delta_unit_z = fabsf(self.pos_delta_unit.z);

        let (speed_z, leash_z) = if self.pos_delta_unit.z >= 0.0 {
            (
                ctx.pos_control.max_speed_up(),
                ctx.pos_control.leash_up_z(),
            )
        } else {
            (
                fabsf(ctx.pos_control.max_speed_down()),
                ctx.pos_control.leash_down_z(),
            )
        };

        if is_zero(pos_delta_unit_z) && is_zero(pos_delta_unit_xy) {
            self.track_accel = 0.0;
            self.track_speed = 0.0;
            self.track_leash_length = WPNAV_LEASH_LENGTH_MIN;
        } else if is_zero(self.pos_delta_unit.z) {
            self.track_accel = self.params.wp_accel_cmss / pos_delta_unit_xy;
            self.track_speed = ctx.pos_control.max_speed_xy() / pos_delta_unit_xy;
            self.track_leash_length = ctx.pos_control.leash_xy() / pos_delta_unit_xy;
        } else if is_zero(pos_delta_unit_xy) {
            self.track_accel = self.params.wp_accel_z_cmss / pos_delta_unit_z;
            self.track_speed = speed_z / pos_delta_unit_z;
            self.track_leash_length = leash_z / pos_delta_unit_z;
        } else {
            self.track_accel = (self.params.wp_accel_z_cmss / pos_delta_unit_z)
                .min(self.params.wp_accel_cmss / pos_delta_unit_xy);
            self.track_speed = (speed_z / pos_delta_unit_z)
                .min(ctx.pos_control.max_speed_xy() / pos_delta_unit_xy);
            self.track_leash_length = (leash_z / pos_delta_unit_z)
                .min(ctx.pos_control.leash_xy() / pos_delta_unit_xy);
        }

        self.calc_slow_down_distance(self.track_speed, self.track_accel);

        self.flags.remove(WpNavFlags::RECALC_WP_LEASH);
    }

    /// Distance from the destination at which the target begins braking
    fn calc_slow_down_distance(&mut self, speed_cms: f32, accel_cmss: f32) {
        if accel_cmss <= 0.0 {
            self.slow_down_dist = 0.0;
            return;
        }
        self.slow_down_dist = speed_cms * speed_cms / (4.0 * accel_cmss);
    }

    /// Braking speed for the given distance from the destination
    fn slow_down_speed(dist_from_dest_cm: f32, accel_cmss: f32) -> f32 {
        if dist_from_dest_cm <= 0.0 {
            return WPNAV_WP_TRACK_SPEED_MIN;
        }

        let target_speed = safe_sqrt(dist_from_dest_cm * 4.0 * accel_cmss);
        target_speed.max(WPNAV_WP_TRACK_SPEED_MIN)
    }

    /// Ramp the position controller's horizontal speed cap towards the
    /// requested cruise speed, bounded by the acceleration cap
    fn wp_speed_update(&mut self, ctx: &mut GuidanceContext<'_>, dt: f32) {
        let mut curr_max_speed_xy_cms = ctx.pos_control.max_speed_xy();
        if is_equal(self.wp_desired_speed_xy_cms, curr_max_speed_xy_cms) {
            return;
        }

        if self.wp_desired_speed_xy_cms > curr_max_speed_xy_cms {
            curr_max_speed_xy_cms += self.params.wp_accel_cmss * dt;
            if curr_max_speed_xy_cms > self.wp_desired_speed_xy_cms {
                curr_max_speed_xy_cms = self.wp_desired_speed_xy_cms;
            }
        } else {
            curr_max_speed_xy_cms -= self.params.wp_accel_cmss * dt;
            if curr_max_speed_xy_cms < self.wp_desired_speed_xy_cms {
                curr_max_speed_xy_cms = self.wp_desired_speed_xy_cms;
            }
        }

        ctx.pos_control.set_max_speed_xy(curr_max_speed_xy_cms);
        self.flags.insert(WpNavFlags::RECALC_WP_LEASH);
    }

    /// Terrain altitude offset at the current position, in cm above the
    /// EKF origin
    ///
    /// A fitted and enabled rangefinder takes priority over the terrain
    /// database; an unhealthy preferred rangefinder is a hard failure
    /// rather than a silent fallback.
    fn terrain_offset(&self, ctx: &GuidanceContext<'_>) -> Result<f32, GuidanceError> {
        if self.rangefinder_available && self.params.rangefinder_use {
            if self.rangefinder_healthy {
                return Ok(ctx.inav.altitude() - self.rangefinder_alt_cm);
            }
            return Err(GuidanceError::NoTerrainData);
        }

        if let Some(terrain) = ctx.terrain {
            if let Some(terr_alt_m) = terrain.height_above_terrain(true) {
                return Ok(ctx.inav.altitude() - terr_alt_m * 100.0);
            }
        }

        Err(GuidanceError::NoTerrainData)
    }
}

// ============================================================================
// Test utilities
// ============================================================================

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;
    use crate::interfaces::mock::{
        MockAttitudeControl, MockInertialNav, MockPosControl, MockTerrainModel,
    };

    /// Scriptable environment for guidance tests
    pub(crate) struct TestEnv {
        pub inav: MockInertialNav,
        pub attitude: MockAttitudeControl,
        pub terrain: MockTerrainModel,
        pub pos: MockPosControl,
        /// expose the terrain database through the context
        pub use_terrain: bool,
    }

    impl TestEnv {
        pub fn new() -> Self {
            Self {
                inav: MockInertialNav::default(),
                attitude: MockAttitudeControl::default(),
                terrain: MockTerrainModel::default(),
                pos: MockPosControl::default(),
                use_terrain: false,
            }
        }

        pub fn ctx(&mut self, now_ms: u64) -> GuidanceContext<'_> {
            GuidanceContext {
                inav: &self.inav,
                attitude: &self.attitude,
                terrain: if self.use_terrain {
                    Some(&self.terrain)
                } else {
                    None
                },
                pos_control: &mut self.pos,
                now_ms,
            }
        }

        /// Place the vehicle for both the estimator and the stopping-point math
        pub fn set_vehicle(&mut self, position: Vector3<f32>, velocity: Vector3<f32>) {
            self.inav.position = position;
            self.inav.velocity = velocity;
            self.pos.set_vehicle_state(position, velocity);
        }

        /// Snap the vehicle onto the current position target, deriving velocity
        /// from the target's motion since `prev_target`
        pub fn track_target_perfectly(&mut self, prev_target: Vector3<f32>) {
            let dt = self.pos.dt;
            let target = self.pos.pos_target;
            let velocity = if dt > 0.0 {
                (target - prev_target) / dt
            } else {
                Vector3::zeros()
            };
            self.set_vehicle(target, velocity);
        }
    }

    /// Initialise the controller and set a straight segment from a
    /// stationary vehicle at the EKF origin
    pub fn setup_straight(nav: &mut WpNav, env: &mut TestEnv, destination: Vector3<f32>) {
        let mut ctx = env.ctx(0);
        nav.wp_and_spline_init(&mut ctx);
        nav.set_wp_destination(&mut ctx, destination, false).unwrap();
    }
}
