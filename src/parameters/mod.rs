//! Parameter management types and utilities
//!
//! This module provides the key/value parameter store the platform
//! persists and the `WPNAV_*` parameter block consumed by the guidance
//! core. Persistence itself (flash, MAVLink) is a platform concern.

pub mod error;
pub mod storage;
pub mod wpnav;

pub use error::ParameterError;
pub use storage::{ParamFlags, ParamValue, ParameterStore, MAX_PARAMS, PARAM_NAME_LEN};
pub use wpnav::WpNavParams;
