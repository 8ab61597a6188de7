//! Cubic Hermite spline segments
//!
//! A spline segment interpolates `P(s) = h0 + h1·s + h2·s² + h3·s³` over
//! `s ∈ [0, 1]` with boundary velocities chosen from the surrounding
//! segments, so the vehicle flows through waypoints without stopping. The
//! advancer rescales the parameter rate every tick so the target moves at
//! the commanded ground speed regardless of where it sits on the curve.
//!
//! The coefficient solve and curve evaluation run in f64; the boundary
//! subtraction `−2p0 + 2p1` loses several digits in f32 when waypoints
//! sit far from the EKF origin.

use libm::atan2f;
use nalgebra::Vector3;

use crate::interfaces::GuidanceContext;
use crate::math::geo::{vector_neu_from_location, AltFrame, Location};
use crate::math::{is_zero, length_xy, radians_to_centidegrees, safe_sqrt, sq};

use super::{
    GuidanceError, SegmentType, WpNav, WpNavFlags, WPNAV_ACCELERATION, WPNAV_YAW_DIST_MIN,
    WPNAV_YAW_LEASH_PCT_MIN,
};

/// What follows the destination of a spline segment
///
/// Chooses the boundary velocity at the destination and whether the
/// segment completes as a fast waypoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SegmentEndType {
    /// The vehicle stops at the destination
    Stop,
    /// A straight segment follows; exit velocity faces along it
    Straight,
    /// Another spline follows; exit velocity faces the next destination
    Spline,
}

/// Spline segment state
pub(crate) struct SplineState {
    /// Hermite coefficients h0..h3
    hermite: [Vector3<f64>; 4],
    /// Boundary velocity at the origin
    pub(crate) origin_vel: Vector3<f32>,
    /// Boundary velocity at the destination
    pub(crate) destination_vel: Vector3<f32>,
    /// Curve parameter in [0, 1]
    pub(crate) time: f32,
    /// Commanded target speed along the curve in cm/s
    pub(crate) vel_scaler: f32,
    /// Parameter rate per second of wall clock
    pub(crate) time_scale: f32,
}

impl Default for SplineState {
    fn default() -> Self {
        Self {
            hermite: [Vector3::zeros(); 4],
            origin_vel: Vector3::zeros(),
            destination_vel: Vector3::zeros(),
            time: 0.0,
            vel_scaler: 0.0,
            time_scale: 0.0,
        }
    }
}

impl SplineState {
    /// Solve the Hermite coefficients for the given endpoints and
    /// boundary velocities
    pub(crate) fn solve(
        &mut self,
        origin: Vector3<f32>,
        destination: Vector3<f32>,
        origin_vel: Vector3<f32>,
        destination_vel: Vector3<f32>,
    ) {
        let p0 = origin.map(f64::from);
        let p1 = destination.map(f64::from);
        let v0 = origin_vel.map(f64::from);
        let v1 = destination_vel.map(f64::from);

        self.hermite[0] = p0;
        self.hermite[1] = v0;
        self.hermite[2] = p0 * -3.0 - v0 * 2.0 + p1 * 3.0 - v1;
        self.hermite[3] = p0 * 2.0 + v0 - p1 * 2.0 + v1;
    }

    /// Evaluate position and velocity at the given curve parameter
    pub(crate) fn pos_vel(&self, spline_time: f32) -> (Vector3<f32>, Vector3<f32>) {
        let t = f64::from(spline_time);
        let t_sqrd = t * t;
        let t_cubed = t_sqrd * t;

        let position = self.hermite[0]
            + self.hermite[1] * t
            + self.hermite[2] * t_sqrd
            + self.hermite[3] * t_cubed;

        let velocity =
            self.hermite[1] + self.hermite[2] * (2.0 * t) + self.hermite[3] * (3.0 * t_sqrd);

        (position.map(|v| v as f32), velocity.map(|v| v as f32))
    }
}

impl WpNav {
    /// Set a spline destination from a geographic location
    ///
    /// `stopped_at_start` marks the vehicle as stationary at the origin.
    /// `next_destination` is required (and has its altitude frame forced
    /// to match the destination's) when the end type is `Straight` or
    /// `Spline`.
    pub fn set_spline_destination_location(
        &mut self,
        ctx: &mut GuidanceContext<'_>,
        destination: &Location,
        stopped_at_start: bool,
        seg_end_type: SegmentEndType,
        next_destination: &Location,
    ) -> Result<(), GuidanceError> {
        let ekf_origin = ctx.inav.ekf_origin().ok_or(GuidanceError::NoEkfOrigin)?;
        let (dest_neu, dest_terr_alt) = vector_neu_from_location(destination, &ekf_origin);

        let mut next_dest_neu = Vector3::zeros();
        if matches!(
            seg_end_type,
            SegmentEndType::Straight | SegmentEndType::Spline
        ) {
            let next = self.location_with_alt_frame(ctx, next_destination, destination.frame)?;
            let (next_vec, _) = vector_neu_from_location(&next, &ekf_origin);
            next_dest_neu = next_vec;
        }

        self.set_spline_destination(
            ctx,
            dest_neu,
            dest_terr_alt,
            stopped_at_start,
            seg_end_type,
            next_dest_neu,
        )
    }

    /// Set a spline destination in cm from the EKF origin
    ///
    /// Picks the origin the same way the straight-segment setter does:
    /// the current position target when recently active, otherwise a
    /// stopping point.
    pub fn set_spline_destination(
        &mut self,
        ctx: &mut GuidanceContext<'_>,
        destination: Vector3<f32>,
        terrain_alt: bool,
        stopped_at_start: bool,
        seg_end_type: SegmentEndType,
        next_destination: Vector3<f32>,
    ) -> Result<(), GuidanceError> {
        let mut origin = if self.is_active(ctx.now_ms) {
            ctx.pos_control.pos_target()
        } else {
            let mut stopping_point = Vector3::zeros();
            ctx.pos_control.stopping_point_xy(&mut stopping_point);
            ctx.pos_control.stopping_point_z(&mut stopping_point);
            stopping_point
        };

        if terrain_alt {
            origin.z -= self.terrain_offset(ctx)?;
        }

        self.set_spline_origin_and_destination(
            ctx,
            origin,
            destination,
            terrain_alt,
            stopped_at_start,
            seg_end_type,
            next_destination,
        )
    }

    /// Set a spline segment's origin and destination in cm from the EKF
    /// origin
    ///
    /// The boundary velocity at the origin comes from the previous
    /// segment when one completed within the activity window; at the
    /// destination it is chosen by `seg_end_type`. Fails without touching
    /// the active segment when terrain data is required and unavailable.
    #[allow(clippy::too_many_arguments)]
    pub fn set_spline_origin_and_destination(
        &mut self,
        ctx: &mut GuidanceContext<'_>,
        origin: Vector3<f32>,
        destination: Vector3<f32>,
        terrain_alt: bool,
        stopped_at_start: bool,
        seg_end_type: SegmentEndType,
        next_destination: Vector3<f32>,
    ) -> Result<(), GuidanceError> {
        let terr_offset = if terrain_alt {
            self.terrain_offset(ctx)?
        } else {
            0.0
        };

        // the previous segment still counts if it completed and the
        // controller ran within the activity window
        let prev_segment_exists =
            self.flags.contains(WpNavFlags::REACHED_DESTINATION) && self.is_active(ctx.now_ms);

        let dt = ctx.pos_control.dt();

        if self.params.wp_accel_cmss <= 0.0 {
            self.params.wp_accel_cmss = WPNAV_ACCELERATION;
        }

        // boundary velocity at the origin
        if stopped_at_start || !prev_segment_exists {
            // stationary start: a dt-scaled chord keeps the curve nearly
            // straight out of the origin
            self.spline.origin_vel = (destination - origin) * dt;
            self.spline.time = 0.0;
            self.spline.vel_scaler = 0.0;
        } else if self.segment_type == SegmentType::Straight {
            // roll off the previous straight leg without turning; note
            // these are still the previous segment's endpoints
            self.spline.origin_vel = self.destination - self.origin;
            self.spline.time = 0.0;
            self.spline.vel_scaler = ctx.pos_control.vel_target().norm();
        } else {
            // roll off the previous spline; its destination velocity is
            // this segment's origin velocity
            self.spline.origin_vel = self.spline.destination_vel;
            if self.spline.time > 1.0 && self.spline.time < 1.1 {
                // keep a small parameter overrun from the previous curve
                self.spline.time -= 1.0;
            } else {
                self.spline.time = 0.0;
            }
            // vel_scaler carries over from the end of the previous segment
        }

        // boundary velocity at the destination
        match seg_end_type {
            SegmentEndType::Stop => {
                self.spline.destination_vel = (destination - origin) * dt;
                self.flags.remove(WpNavFlags::FAST_WAYPOINT);
            }
            SegmentEndType::Straight => {
                self.spline.destination_vel = next_destination - destination;
                self.flags.insert(WpNavFlags::FAST_WAYPOINT);
            }
            SegmentEndType::Spline => {
                self.spline.destination_vel = next_destination - origin;
                self.flags.insert(WpNavFlags::FAST_WAYPOINT);
            }
        }

        // scale the boundary velocities down when they would overshoot a
        // short segment
        let origin_vel = self.spline.origin_vel;
        let destination_vel = self.spline.destination_vel;
        let vel_len = origin_vel.norm() + destination_vel.norm();
        let pos_len = (destination - origin).norm() * 4.0;
        if vel_len > pos_len {
            let vel_scaling = pos_len / vel_len;
            self.spline.solve(
                origin,
                destination,
                origin_vel * vel_scaling,
                destination_vel * vel_scaling,
            );
        } else {
            self.spline.solve(origin, destination, origin_vel, destination_vel);
        }

        self.origin = origin;
        self.destination = destination;
        self.terrain_alt = terrain_alt;

        self.calc_slow_down_distance(ctx.pos_control.max_speed_xy(), self.params.wp_accel_cmss);

        // start the intermediate target at the origin
        ctx.pos_control
            .set_pos_target(origin + Vector3::new(0.0, 0.0, terr_offset));
        self.flags
            .remove(WpNavFlags::REACHED_DESTINATION | WpNavFlags::WP_YAW_SET);
        self.segment_type = SegmentType::Spline;
        self.flags.insert(WpNavFlags::NEW_WP_DESTINATION);

        self.track_length_xy =
            safe_sqrt(sq(destination.x - origin.x) + sq(destination.y - origin.y));

        Ok(())
    }

    /// Run the spline controller; call at 100 Hz or faster
    ///
    /// Fails with `NotSplineSegment` when the active segment is straight,
    /// and with `NoTerrainData` for a tick whose terrain offset could not
    /// be resolved.
    pub fn update_spline(&mut self, ctx: &mut GuidanceContext<'_>) -> Result<(), GuidanceError> {
        if self.segment_type != SegmentType::Spline {
            return Err(GuidanceError::NotSplineSegment);
        }

        let dt = ctx.pos_control.dt();

        self.wp_speed_update(ctx, dt);

        let advanced = self.advance_spline_target_along_track(ctx, dt);

        // freeze feed-forward across the discontinuity of a new segment
        if self.flags.contains(WpNavFlags::NEW_WP_DESTINATION) {
            self.flags.remove(WpNavFlags::NEW_WP_DESTINATION);
            ctx.pos_control.freeze_ff_z();
        }

        ctx.pos_control.update_xy_controller();

        self.wp_last_update_ms = Some(ctx.now_ms);

        advanced
    }

    /// Move the spline target along the curve
    fn advance_spline_target_along_track(
        &mut self,
        ctx: &mut GuidanceContext<'_>,
        dt: f32,
    ) -> Result<(), GuidanceError> {
        if self.flags.contains(WpNavFlags::REACHED_DESTINATION) {
            return Ok(());
        }

        let (mut target_pos, target_vel) = self.spline.pos_vel(self.spline.time);

        // zero spline velocity means the origin and destination coincide
        let target_vel_length = target_vel.norm();
        if is_zero(target_vel_length) {
            self.flags.insert(WpNavFlags::REACHED_DESTINATION);
            return Ok(());
        }

        // the track direction follows the spline tangent, so the leash
        // projection must be refreshed every tick
        self.pos_delta_unit = target_vel / target_vel_length;
        self.calculate_wp_leash_length(ctx);

        let curr_pos = ctx.inav.position();

        let terr_offset = if self.terrain_alt {
            self.terrain_offset(ctx)?
        } else {
            0.0
        };

        let mut track_error = curr_pos - target_pos;
        track_error.z -= terr_offset;

        self.track_error_xy = length_xy(&track_error);
        let track_error_z = libm::fabsf(track_error.z);

        let leash_xy = ctx.pos_control.leash_xy();
        let leash_z = if track_error.z >= 0.0 {
            ctx.pos_control.leash_up_z()
        } else {
            ctx.pos_control.leash_down_z()
        };

        // along-track room left inside the leash given the current error
        let track_leash_slack = (self.track_leash_length * (leash_z - track_error_z) / leash_z)
            .min(self.track_leash_length * (leash_xy - self.track_error_xy) / leash_xy)
            .max(0.0);

        let spline_dist_to_wp = (self.destination - target_pos).norm();
        let mut vel_limit = ctx.pos_control.max_speed_xy();
        if !is_zero(dt) {
            vel_limit = vel_limit.min(track_leash_slack / dt);
        }

        if !self.flags.contains(WpNavFlags::FAST_WAYPOINT)
            && spline_dist_to_wp < self.slow_down_dist
        {
            // braking: speed follows the sqrt curve into the destination
            self.spline.vel_scaler =
                safe_sqrt(spline_dist_to_wp * 2.0 * self.params.wp_accel_cmss);
        } else if self.spline.vel_scaler < vel_limit {
            self.spline.vel_scaler += self.params.wp_accel_cmss * dt;
        }

        self.spline.vel_scaler = self.spline.vel_scaler.clamp(0.0, vel_limit);

        // convert the commanded ground speed into a parameter rate
        self.spline.time_scale = self.spline.vel_scaler / target_vel_length;

        target_pos.z += terr_offset;
        ctx.pos_control.set_pos_target(target_pos);

        // yaw follows the curve when the segment is long enough
        // horizontally
        if self.track_length_xy >= WPNAV_YAW_DIST_MIN {
            if leash_xy < WPNAV_YAW_DIST_MIN {
                // short leash means low speed; point along the tangent
                if !is_zero(target_vel.x) && !is_zero(target_vel.y) {
                    self.set_yaw_cd(radians_to_centidegrees(atan2f(target_vel.y, target_vel.x)));
                }
            } else {
                let track_error_xy_length = safe_sqrt(sq(track_error.x) + sq(track_error.y));
                if track_error_xy_length
                    > WPNAV_YAW_DIST_MIN.min(leash_xy * WPNAV_YAW_LEASH_PCT_MIN)
                {
                    // track_error points from target to vehicle; yaw wants
                    // the reverse
                    self.set_yaw_cd(radians_to_centidegrees(atan2f(
                        -track_error.y,
                        -track_error.x,
                    )));
                }
            }
        }

        self.spline.time += self.spline.time_scale * dt;

        // the target lands on the endpoint during the next step
        if self.spline.time >= 1.0 {
            self.flags.insert(WpNavFlags::REACHED_DESTINATION);
        }

        Ok(())
    }

    /// Copy of `loc` with its altitude expressed in `frame`
    ///
    /// Converting between above-origin and above-terrain needs the current
    /// terrain offset.
    fn location_with_alt_frame(
        &self,
        ctx: &GuidanceContext<'_>,
        loc: &Location,
        frame: AltFrame,
    ) -> Result<Location, GuidanceError> {
        if loc.frame == frame {
            return Ok(*loc);
        }

        let offset_cm = libm::roundf(self.terrain_offset(ctx)?) as i32;
        let alt_cm = match frame {
            AltFrame::AboveTerrain => loc.alt_cm - offset_cm,
            AltFrame::AboveOrigin => loc.alt_cm + offset_cm,
        };

        Ok(Location { alt_cm, frame, ..*loc })
    }
}
