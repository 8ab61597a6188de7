//! Waypoint Navigation Parameter Definitions
//!
//! Maps the guidance core's configuration to parameter store entries for
//! runtime tuning from a ground station.
//!
//! # Parameters
//!
//! - `WPNAV_SPEED` - Horizontal cruise speed in cm/s
//! - `WPNAV_RADIUS` - Waypoint acceptance radius in cm
//! - `WPNAV_SPEED_UP` - Climb speed cap in cm/s
//! - `WPNAV_SPEED_DN` - Descent speed cap in cm/s (positive magnitude)
//! - `WPNAV_ACCEL` - Horizontal acceleration cap in cm/s/s
//! - `WPNAV_ACCEL_Z` - Vertical acceleration cap in cm/s/s
//! - `WPNAV_RFND_USE` - Prefer rangefinder over terrain database

use super::error::ParameterError;
use super::storage::{ParamFlags, ParamValue, ParameterStore};

// --- Defaults ---

const DEFAULT_WP_SPEED_CMS: f32 = 500.0;
const DEFAULT_WP_RADIUS_CM: f32 = 200.0;
const DEFAULT_WP_SPEED_UP_CMS: f32 = 250.0;
const DEFAULT_WP_SPEED_DOWN_CMS: f32 = 150.0;
const DEFAULT_WP_ACCEL_CMSS: f32 = 100.0;
const DEFAULT_WP_ACCEL_Z_CMSS: f32 = 100.0;
const DEFAULT_RANGEFINDER_USE: bool = true;

// --- Ranges ---

const MIN_WP_SPEED: f32 = 20.0;
const MAX_WP_SPEED: f32 = 2000.0;

const MIN_WP_RADIUS: f32 = 5.0;
const MAX_WP_RADIUS: f32 = 1000.0;

const MIN_WP_SPEED_UP: f32 = 10.0;
const MAX_WP_SPEED_UP: f32 = 1000.0;

const MIN_WP_SPEED_DOWN: f32 = 10.0;
const MAX_WP_SPEED_DOWN: f32 = 500.0;

const MIN_WP_ACCEL: f32 = 50.0;
const MAX_WP_ACCEL: f32 = 500.0;

/// Waypoint guidance parameters loaded from the parameter store
#[derive(Debug, Clone)]
pub struct WpNavParams {
    /// Horizontal cruise speed in cm/s (WPNAV_SPEED)
    pub wp_speed_cms: f32,
    /// Waypoint acceptance radius in cm (WPNAV_RADIUS)
    pub wp_radius_cm: f32,
    /// Climb speed cap in cm/s (WPNAV_SPEED_UP)
    pub wp_speed_up_cms: f32,
    /// Descent speed cap in cm/s, positive magnitude (WPNAV_SPEED_DN)
    pub wp_speed_down_cms: f32,
    /// Horizontal acceleration cap in cm/s/s (WPNAV_ACCEL)
    pub wp_accel_cmss: f32,
    /// Vertical acceleration cap in cm/s/s (WPNAV_ACCEL_Z)
    pub wp_accel_z_cmss: f32,
    /// Prefer rangefinder over terrain database (WPNAV_RFND_USE)
    pub rangefinder_use: bool,
}

impl Default for WpNavParams {
    fn default() -> Self {
        Self {
            wp_speed_cms: DEFAULT_WP_SPEED_CMS,
            wp_radius_cm: DEFAULT_WP_RADIUS_CM,
            wp_speed_up_cms: DEFAULT_WP_SPEED_UP_CMS,
            wp_speed_down_cms: DEFAULT_WP_SPEED_DOWN_CMS,
            wp_accel_cmss: DEFAULT_WP_ACCEL_CMSS,
            wp_accel_z_cmss: DEFAULT_WP_ACCEL_Z_CMSS,
            rangefinder_use: DEFAULT_RANGEFINDER_USE,
        }
    }
}

impl WpNavParams {
    /// Register waypoint guidance parameters with default values
    pub fn register_defaults(store: &mut ParameterStore) -> Result<(), ParameterError> {
        store.register(
            "WPNAV_SPEED",
            ParamValue::Float(DEFAULT_WP_SPEED_CMS),
            ParamFlags::empty(),
        )?;
        store.register(
            "WPNAV_RADIUS",
            ParamValue::Float(DEFAULT_WP_RADIUS_CM),
            ParamFlags::empty(),
        )?;
        store.register(
            "WPNAV_SPEED_UP",
            ParamValue::Float(DEFAULT_WP_SPEED_UP_CMS),
            ParamFlags::empty(),
        )?;
        store.register(
            "WPNAV_SPEED_DN",
            ParamValue::Float(DEFAULT_WP_SPEED_DOWN_CMS),
            ParamFlags::empty(),
        )?;
        store.register(
            "WPNAV_ACCEL",
            ParamValue::Float(DEFAULT_WP_ACCEL_CMSS),
            ParamFlags::empty(),
        )?;
        store.register(
            "WPNAV_ACCEL_Z",
            ParamValue::Float(DEFAULT_WP_ACCEL_Z_CMSS),
            ParamFlags::empty(),
        )?;
        store.register(
            "WPNAV_RFND_USE",
            ParamValue::Bool(DEFAULT_RANGEFINDER_USE),
            ParamFlags::empty(),
        )?;

        Ok(())
    }

    /// Load waypoint guidance parameters from the parameter store
    pub fn from_store(store: &ParameterStore) -> Self {
        Self {
            wp_speed_cms: load_float(
                store,
                "WPNAV_SPEED",
                DEFAULT_WP_SPEED_CMS,
                MIN_WP_SPEED,
                MAX_WP_SPEED,
            ),
            wp_radius_cm: load_float(
                store,
                "WPNAV_RADIUS",
                DEFAULT_WP_RADIUS_CM,
                MIN_WP_RADIUS,
                MAX_WP_RADIUS,
            ),
            wp_speed_up_cms: load_float(
                store,
                "WPNAV_SPEED_UP",
                DEFAULT_WP_SPEED_UP_CMS,
                MIN_WP_SPEED_UP,
                MAX_WP_SPEED_UP,
            ),
            wp_speed_down_cms: load_float(
                store,
                "WPNAV_SPEED_DN",
                DEFAULT_WP_SPEED_DOWN_CMS,
                MIN_WP_SPEED_DOWN,
                MAX_WP_SPEED_DOWN,
            ),
            wp_accel_cmss: load_float(
                store,
                "WPNAV_ACCEL",
                DEFAULT_WP_ACCEL_CMSS,
                MIN_WP_ACCEL,
                MAX_WP_ACCEL,
            ),
            wp_accel_z_cmss: load_float(
                store,
                "WPNAV_ACCEL_Z",
                DEFAULT_WP_ACCEL_Z_CMSS,
                MIN_WP_ACCEL,
                MAX_WP_ACCEL,
            ),
            rangefinder_use: load_bool(store, "WPNAV_RFND_USE", DEFAULT_RANGEFINDER_USE),
        }
    }

    /// Validate waypoint guidance parameters
    pub fn is_valid(&self) -> bool {
        if self.wp_speed_cms < MIN_WP_SPEED || self.wp_speed_cms > MAX_WP_SPEED {
            return false;
        }
        if self.wp_radius_cm < MIN_WP_RADIUS || self.wp_radius_cm > MAX_WP_RADIUS {
            return false;
        }
        if self.wp_speed_up_cms < MIN_WP_SPEED_UP || self.wp_speed_up_cms > MAX_WP_SPEED_UP {
            return false;
        }
        if self.wp_speed_down_cms < MIN_WP_SPEED_DOWN || self.wp_speed_down_cms > MAX_WP_SPEED_DOWN
        {
            return false;
        }
        if self.wp_accel_cmss < MIN_WP_ACCEL || self.wp_accel_cmss > MAX_WP_ACCEL {
            return false;
        }
        if self.wp_accel_z_cmss < MIN_WP_ACCEL || self.wp_accel_z_cmss > MAX_WP_ACCEL {
            return false;
        }

        true
    }
}

/// Load a float parameter from store with clamping
fn load_float(store: &ParameterStore, name: &str, default: f32, min: f32, max: f32) -> f32 {
    match store.get(name) {
        Some(ParamValue::Float(v)) => v.clamp(min, max),
        Some(ParamValue::Int(v)) => (*v as f32).clamp(min, max),
        _ => default,
    }
}

/// Load a bool parameter from store
fn load_bool(store: &ParameterStore, name: &str, default: bool) -> bool {
    match store.get(name) {
        Some(ParamValue::Bool(v)) => *v,
        Some(ParamValue::Int(v)) => *v != 0,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wpnav_params_defaults() {
        let params = WpNavParams::default();

        assert!((params.wp_speed_cms - 500.0).abs() < 0.001);
        assert!((params.wp_radius_cm - 200.0).abs() < 0.001);
        assert!((params.wp_speed_up_cms - 250.0).abs() < 0.001);
        assert!((params.wp_speed_down_cms - 150.0).abs() < 0.001);
        assert!((params.wp_accel_cmss - 100.0).abs() < 0.001);
        assert!((params.wp_accel_z_cmss - 100.0).abs() < 0.001);
        assert!(params.rangefinder_use);
        assert!(params.is_valid());
    }

    #[test]
    fn test_register_defaults_populates_all_7() {
        let mut store = ParameterStore::new();
        WpNavParams::register_defaults(&mut store).unwrap();

        assert!(store.get("WPNAV_SPEED").is_some());
        assert!(store.get("WPNAV_RADIUS").is_some());
        assert!(store.get("WPNAV_SPEED_UP").is_some());
        assert!(store.get("WPNAV_SPEED_DN").is_some());
        assert!(store.get("WPNAV_ACCEL").is_some());
        assert!(store.get("WPNAV_ACCEL_Z").is_some());
        assert!(store.get("WPNAV_RFND_USE").is_some());
    }

    #[test]
    fn test_from_store_reads_defaults() {
        let mut store = ParameterStore::new();
        WpNavParams::register_defaults(&mut store).unwrap();

        let params = WpNavParams::from_store(&store);
        assert!((params.wp_speed_cms - 500.0).abs() < 0.001);
        assert!((params.wp_radius_cm - 200.0).abs() < 0.001);
        assert!(params.rangefinder_use);
    }

    #[test]
    fn test_from_store_reads_custom_values() {
        let mut store = ParameterStore::new();
        WpNavParams::register_defaults(&mut store).unwrap();

        store.set("WPNAV_SPEED", ParamValue::Float(800.0)).unwrap();
        store.set("WPNAV_RADIUS", ParamValue::Float(50.0)).unwrap();
        store.set("WPNAV_RFND_USE", ParamValue::Bool(false)).unwrap();

        let params = WpNavParams::from_store(&store);
        assert!((params.wp_speed_cms - 800.0).abs() < 0.001);
        assert!((params.wp_radius_cm - 50.0).abs() < 0.001);
        assert!(!params.rangefinder_use);
    }

    #[test]
    fn test_out_of_range_values_clamped() {
        let mut store = ParameterStore::new();
        WpNavParams::register_defaults(&mut store).unwrap();

        // WPNAV_SPEED below min
        store.set("WPNAV_SPEED", ParamValue::Float(1.0)).unwrap();
        let params = WpNavParams::from_store(&store);
        assert!((params.wp_speed_cms - MIN_WP_SPEED).abs() < 0.001);

        // WPNAV_SPEED above max
        store.set("WPNAV_SPEED", ParamValue::Float(5000.0)).unwrap();
        let params = WpNavParams::from_store(&store);
        assert!((params.wp_speed_cms - MAX_WP_SPEED).abs() < 0.001);

        // WPNAV_ACCEL below min
        store.set("WPNAV_ACCEL", ParamValue::Float(10.0)).unwrap();
        let params = WpNavParams::from_store(&store);
        assert!((params.wp_accel_cmss - MIN_WP_ACCEL).abs() < 0.001);
    }

    #[test]
    fn test_int_values_accepted_for_floats() {
        let mut store = ParameterStore::new();
        WpNavParams::register_defaults(&mut store).unwrap();

        store.set("WPNAV_SPEED", ParamValue::Int(600)).unwrap();
        let params = WpNavParams::from_store(&store);
        assert!((params.wp_speed_cms - 600.0).abs() < 0.001);
    }

    #[test]
    fn test_is_valid_rejects_out_of_range() {
        let params = WpNavParams {
            wp_speed_cms: 1.0,
            ..WpNavParams::default()
        };
        assert!(!params.is_valid());

        let params = WpNavParams {
            wp_accel_cmss: 1000.0,
            ..WpNavParams::default()
        };
        assert!(!params.is_valid());
    }
}
