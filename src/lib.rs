//! wpnav - Waypoint guidance core for multirotor autopilots
//!
//! This crate contains the platform-agnostic track-advancement engine that
//! moves an intermediate position target along a straight line or cubic
//! Hermite spline between waypoints. The moving target is bounded by
//! horizontal/vertical speed and acceleration caps and by a "leash" that
//! keeps the downstream position controller inside its linear region.
//!
//! # Design Principles
//!
//! - **Pure no_std**: No std library dependencies, no allocation on the
//!   fast path
//! - **Trait abstractions**: The inertial estimator, attitude controller,
//!   terrain sources and position controller are injected via traits
//! - **Host testable**: Mock implementations of every trait allow the
//!   guidance logic to be tested without hardware
//!
//! # Modules
//!
//! - [`math`]: Scalar helpers and geographic location conversion
//! - [`interfaces`]: Environment adapter traits and mock implementations
//! - [`parameters`]: Parameter store and the `WPNAV_*` parameter block
//! - [`wpnav`]: The waypoint guidance controller itself

#![no_std]

pub mod interfaces;
pub mod math;
pub mod parameters;
pub mod wpnav;
