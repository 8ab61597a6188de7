//! Mock environment implementations for testing
//!
//! Hardware-free implementations of the adapter traits with public fields
//! so tests can script the environment tick by tick. The position
//! controller mock keeps the real leash-length and stopping-point
//! arithmetic so leash-driven guidance behavior is exercised realistically.

use nalgebra::Vector3;

use super::{AttitudeControl, InertialNav, PositionControl, TerrainModel};
use crate::math::geo::Location;
use crate::math::{is_zero, norm_xy};

/// Minimum leash length in cm enforced by the position controller
pub const POSCONTROL_LEASH_LENGTH_MIN: f32 = 100.0;

/// Mock inertial navigation estimator
#[derive(Clone, Debug)]
pub struct MockInertialNav {
    /// Position in cm from the EKF origin
    pub position: Vector3<f32>,
    /// Velocity in cm/s
    pub velocity: Vector3<f32>,
    /// EKF origin location (None simulates "origin not yet set")
    pub origin: Option<Location>,
}

impl Default for MockInertialNav {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            velocity: Vector3::zeros(),
            origin: Some(Location::default()),
        }
    }
}

impl InertialNav for MockInertialNav {
    fn position(&self) -> Vector3<f32> {
        self.position
    }

    fn velocity(&self) -> Vector3<f32> {
        self.velocity
    }

    fn altitude(&self) -> f32 {
        self.position.z
    }

    fn ekf_origin(&self) -> Option<Location> {
        self.origin
    }
}

/// Mock attitude controller
#[derive(Clone, Debug)]
pub struct MockAttitudeControl {
    /// Maximum lean angle in radians (default 30 degrees)
    pub max_lean_angle_rad: f32,
    /// Current yaw target in centi-degrees
    pub target_yaw_cd: f32,
}

impl Default for MockAttitudeControl {
    fn default() -> Self {
        Self {
            max_lean_angle_rad: 30.0_f32.to_radians(),
            target_yaw_cd: 0.0,
        }
    }
}

impl AttitudeControl for MockAttitudeControl {
    fn max_lean_angle_rad(&self) -> f32 {
        self.max_lean_angle_rad
    }

    fn target_yaw_cd(&self) -> f32 {
        self.target_yaw_cd
    }
}

/// Mock terrain database
#[derive(Clone, Debug, Default)]
pub struct MockTerrainModel {
    /// Height above terrain in metres (None simulates missing tiles)
    pub height_above_terrain_m: Option<f32>,
}

impl TerrainModel for MockTerrainModel {
    fn height_above_terrain(&self, _extrapolate: bool) -> Option<f32> {
        self.height_above_terrain_m
    }
}

/// Mock position controller facade
///
/// Stores targets and limits, recomputes leash lengths with the standard
/// P-controller leash formula and derives stopping points from the mock
/// inertial state supplied through `set_vehicle_state`.
#[derive(Clone, Debug)]
pub struct MockPosControl {
    /// Maximum horizontal speed in cm/s
    pub max_speed_xy: f32,
    /// Maximum horizontal acceleration in cm/s/s
    pub max_accel_xy: f32,
    /// Maximum climb speed in cm/s (positive)
    pub max_speed_up: f32,
    /// Maximum descent speed in cm/s (negative)
    pub max_speed_down: f32,
    /// Maximum vertical acceleration in cm/s/s
    pub max_accel_z: f32,
    /// Horizontal position-loop P gain
    pub kp: f32,
    /// Controller time step in seconds
    pub dt: f32,
    /// Current position target
    pub pos_target: Vector3<f32>,
    /// Current velocity target
    pub vel_target: Vector3<f32>,
    /// Horizontal feed-forward velocity
    pub desired_velocity_xy: (f32, f32),
    /// Horizontal feed-forward acceleration
    pub desired_accel_xy: (f32, f32),
    /// Vehicle position used for stopping-point calculations
    pub vehicle_position: Vector3<f32>,
    /// Vehicle velocity used for stopping-point calculations
    pub vehicle_velocity: Vector3<f32>,
    /// Number of freeze_ff_z calls observed
    pub freeze_ff_z_count: u32,
    /// Number of clear_desired_velocity_ff_z calls observed
    pub clear_ff_z_count: u32,
    /// Number of init_xy_controller calls observed
    pub init_xy_count: u32,
    /// Number of update_xy_controller calls observed
    pub update_xy_count: u32,
    leash_xy: f32,
    leash_up_z: f32,
    leash_down_z: f32,
}

impl Default for MockPosControl {
    fn default() -> Self {
        Self {
            max_speed_xy: 500.0,
            max_accel_xy: 100.0,
            max_speed_up: 250.0,
            max_speed_down: -150.0,
            max_accel_z: 100.0,
            kp: 1.0,
            dt: 0.01,
            pos_target: Vector3::zeros(),
            vel_target: Vector3::zeros(),
            desired_velocity_xy: (0.0, 0.0),
            desired_accel_xy: (0.0, 0.0),
            vehicle_position: Vector3::zeros(),
            vehicle_velocity: Vector3::zeros(),
            freeze_ff_z_count: 0,
            clear_ff_z_count: 0,
            init_xy_count: 0,
            update_xy_count: 0,
            leash_xy: POSCONTROL_LEASH_LENGTH_MIN,
            leash_up_z: POSCONTROL_LEASH_LENGTH_MIN,
            leash_down_z: POSCONTROL_LEASH_LENGTH_MIN,
        }
    }
}

impl MockPosControl {
    /// Update the vehicle state the stopping-point math reads from
    pub fn set_vehicle_state(&mut self, position: Vector3<f32>, velocity: Vector3<f32>) {
        self.vehicle_position = position;
        self.vehicle_velocity = velocity;
    }

    /// Leash length for the given speed/accel limits and P gain
    ///
    /// Linear close in (`speed/kP`), quadratic further out where the
    /// controller output follows the square-root curve. Floored at
    /// `POSCONTROL_LEASH_LENGTH_MIN`.
    fn calc_leash_length(&self, speed_cms: f32, accel_cmss: f32) -> f32 {
        if self.kp <= 0.0 || accel_cmss <= 0.0 {
            return POSCONTROL_LEASH_LENGTH_MIN;
        }

        let leash_length = if speed_cms <= accel_cmss / self.kp {
            speed_cms / self.kp
        } else {
            accel_cmss / (2.0 * self.kp * self.kp)
                + (speed_cms * speed_cms) / (2.0 * accel_cmss)
        };

        leash_length.max(POSCONTROL_LEASH_LENGTH_MIN)
    }
}

impl PositionControl for MockPosControl {
    fn set_max_speed_xy(&mut self, speed_cms: f32) {
        self.max_speed_xy = speed_cms;
    }

    fn max_speed_xy(&self) -> f32 {
        self.max_speed_xy
    }

    fn set_max_accel_xy(&mut self, accel_cmss: f32) {
        self.max_accel_xy = accel_cmss;
    }

    fn set_max_speed_z(&mut self, speed_down_cms: f32, speed_up_cms: f32) {
        self.max_speed_down = speed_down_cms;
        self.max_speed_up = speed_up_cms;
    }

    fn max_speed_up(&self) -> f32 {
        self.max_speed_up
    }

    fn max_speed_down(&self) -> f32 {
        self.max_speed_down
    }

    fn set_max_accel_z(&mut self, accel_cmss: f32) {
        self.max_accel_z = accel_cmss;
    }

    fn leash_xy(&self) -> f32 {
        self.leash_xy
    }

    fn leash_up_z(&self) -> f32 {
        self.leash_up_z
    }

    fn leash_down_z(&self) -> f32 {
        self.leash_down_z
    }

    fn calc_leash_length_xy(&mut self) {
        self.leash_xy = self.calc_leash_length(self.max_speed_xy, self.max_accel_xy);
    }

    fn calc_leash_length_z(&mut self) {
        self.leash_up_z = self.calc_leash_length(self.max_speed_up, self.max_accel_z);
        self.leash_down_z = self.calc_leash_length(self.max_speed_down.abs(), self.max_accel_z);
    }

    fn set_pos_target(&mut self, pos: Vector3<f32>) {
        self.pos_target = pos;
    }

    fn pos_target(&self) -> Vector3<f32> {
        self.pos_target
    }

    fn vel_target(&self) -> Vector3<f32> {
        self.vel_target
    }

    fn set_desired_velocity_xy(&mut self, vel_x_cms: f32, vel_y_cms: f32) {
        self.desired_velocity_xy = (vel_x_cms, vel_y_cms);
    }

    fn set_desired_accel_xy(&mut self, accel_x_cmss: f32, accel_y_cmss: f32) {
        self.desired_accel_xy = (accel_x_cmss, accel_y_cmss);
    }

    fn clear_desired_velocity_ff_z(&mut self) {
        self.clear_ff_z_count += 1;
    }

    fn freeze_ff_z(&mut self) {
        self.freeze_ff_z_count += 1;
    }

    fn init_xy_controller(&mut self) {
        self.init_xy_count += 1;
        self.pos_target = self.vehicle_position;
        self.vel_target = Vector3::zeros();
    }

    fn update_xy_controller(&mut self) {
        self.update_xy_count += 1;
    }

    fn pos_xy_p_kp(&self) -> f32 {
        self.kp
    }

    fn dt(&self) -> f32 {
        self.dt
    }

    fn stopping_point_xy(&self, stopping_point: &mut Vector3<f32>) {
        let vel_total = norm_xy(self.vehicle_velocity.x, self.vehicle_velocity.y);

        if self.kp <= 0.0 || self.max_accel_xy <= 0.0 || is_zero(vel_total) {
            stopping_point.x = self.vehicle_position.x;
            stopping_point.y = self.vehicle_position.y;
            return;
        }

        let linear_velocity = self.max_accel_xy / self.kp;
        let stopping_dist = if vel_total < linear_velocity {
            vel_total / self.kp
        } else {
            let linear_distance = self.max_accel_xy / (2.0 * self.kp * self.kp);
            linear_distance + (vel_total * vel_total) / (2.0 * self.max_accel_xy)
        };

        stopping_point.x = self.vehicle_position.x + stopping_dist * self.vehicle_velocity.x / vel_total;
        stopping_point.y = self.vehicle_position.y + stopping_dist * self.vehicle_velocity.y / vel_total;
    }

    fn stopping_point_z(&self, stopping_point: &mut Vector3<f32>) {
        let vel_z = self.vehicle_velocity.z;

        if self.kp <= 0.0 || self.max_accel_z <= 0.0 || is_zero(vel_z) {
            stopping_point.z = self.vehicle_position.z;
            return;
        }

        let linear_velocity = self.max_accel_z / self.kp;
        let stopping_dist = if vel_z.abs() < linear_velocity {
            vel_z.abs() / self.kp
        } else {
            let linear_distance = self.max_accel_z / (2.0 * self.kp * self.kp);
            linear_distance + (vel_z * vel_z) / (2.0 * self.max_accel_z)
        };

        stopping_point.z = self.vehicle_position.z + stopping_dist * vel_z.signum();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leash_length_defaults() {
        let mut pos = MockPosControl::default();
        pos.calc_leash_length_xy();
        pos.calc_leash_length_z();

        // speed 500, accel 100, kp 1: 100/2 + 500^2/200 = 1300
        assert!((pos.leash_xy() - 1300.0).abs() < 0.1, "leash_xy {}", pos.leash_xy());
        // speed 250, accel 100, kp 1: 50 + 62500/200 = 362.5
        assert!((pos.leash_up_z() - 362.5).abs() < 0.1, "leash_up {}", pos.leash_up_z());
        // speed 150, accel 100, kp 1: 50 + 22500/200 = 162.5
        assert!((pos.leash_down_z() - 162.5).abs() < 0.1, "leash_down {}", pos.leash_down_z());
    }

    #[test]
    fn test_leash_length_linear_region() {
        let mut pos = MockPosControl {
            max_speed_xy: 50.0,
            ..Default::default()
        };
        // speed 50 <= accel/kp = 100: linear leash 50/1 = 50, floored at 100
        pos.calc_leash_length_xy();
        assert!((pos.leash_xy() - POSCONTROL_LEASH_LENGTH_MIN).abs() < 0.1);
    }

    #[test]
    fn test_leash_length_degenerate_gains() {
        let mut pos = MockPosControl {
            kp: 0.0,
            ..Default::default()
        };
        pos.calc_leash_length_xy();
        assert!((pos.leash_xy() - POSCONTROL_LEASH_LENGTH_MIN).abs() < 0.1);
    }

    #[test]
    fn test_stopping_point_stationary() {
        let pos = MockPosControl {
            vehicle_position: Vector3::new(100.0, 200.0, 300.0),
            ..Default::default()
        };
        let mut stop = Vector3::zeros();
        pos.stopping_point_xy(&mut stop);
        pos.stopping_point_z(&mut stop);

        assert!((stop.x - 100.0).abs() < 0.01);
        assert!((stop.y - 200.0).abs() < 0.01);
        assert!((stop.z - 300.0).abs() < 0.01);
    }

    #[test]
    fn test_stopping_point_ahead_of_moving_vehicle() {
        let pos = MockPosControl {
            vehicle_position: Vector3::zeros(),
            vehicle_velocity: Vector3::new(300.0, 0.0, 0.0),
            ..Default::default()
        };
        let mut stop = Vector3::zeros();
        pos.stopping_point_xy(&mut stop);

        // 300 > linear_velocity 100: 50 + 90000/200 = 500
        assert!((stop.x - 500.0).abs() < 0.1, "stopping x {}", stop.x);
        assert!(stop.y.abs() < 0.01);
    }

    #[test]
    fn test_stopping_point_descending() {
        let pos = MockPosControl {
            vehicle_position: Vector3::new(0.0, 0.0, 1000.0),
            vehicle_velocity: Vector3::new(0.0, 0.0, -200.0),
            ..Default::default()
        };
        let mut stop = Vector3::zeros();
        pos.stopping_point_z(&mut stop);

        // |v|=200 > linear 100: 50 + 40000/200 = 250, below current altitude
        assert!((stop.z - 750.0).abs() < 0.1, "stopping z {}", stop.z);
    }
}
