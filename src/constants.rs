//! # Constants and type definitions for ephem_forces
//!
//! This module centralizes the **unit conversions**, **catalog dimensions** and **common type
//! aliases** used throughout the crate.
//!
//! ## Overview
//!
//! - Unit conversions (degrees ↔ radians, days ↔ seconds, AU ↔ km)
//! - Speed of light in the AU/day system used by the force model
//! - Fixed sizes of the perturber catalog (major bodies, massive asteroids)
//! - Bounds of the diagnostic message log
//!
//! All dynamical quantities in this crate are expressed in **AU**, **days** and
//! **AU³/day²** for gravitational parameters. Times are Julian dates in the TDB scale.

// -------------------------------------------------------------------------------------------------
// Physical constants and unit conversions
// -------------------------------------------------------------------------------------------------

/// 2π, useful for trigonometric conversions
pub const DPI: f64 = 2. * std::f64::consts::PI;

/// Number of seconds in a Julian day
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Astronomical Unit in kilometers (IAU 2012)
pub const AU: f64 = 149_597_870.7;

/// Degrees → radians
pub const RADEG: f64 = std::f64::consts::PI / 180.0;

/// Speed of light in km/s
pub const VLIGHT: f64 = 2.99792458e5;

/// Speed of light in astronomical units per day
pub const VLIGHT_AU: f64 = VLIGHT / AU * SECONDS_PER_DAY;

// -------------------------------------------------------------------------------------------------
// Catalog dimensions
// -------------------------------------------------------------------------------------------------

/// Number of major bodies (sun, eight planets, moon, pluto) in the perturber catalog
pub const N_MAJOR_BODIES: usize = 11;

/// Number of massive asteroids in the perturber catalog
pub const N_ASTEROIDS: usize = 16;

/// Total size of the perturber catalog
pub const N_PERTURBERS: usize = N_MAJOR_BODIES + N_ASTEROIDS;

// -------------------------------------------------------------------------------------------------
// Diagnostics and iteration limits
// -------------------------------------------------------------------------------------------------

/// Maximum number of messages retained by a [`MessageLog`](crate::diagnostics::MessageLog)
pub const MAX_MESSAGES: usize = 10;

/// Maximum length in bytes of a single retained message
pub const MAX_MESSAGE_LEN: usize = 1024;

/// Iteration cap of the simplified post-Newtonian velocity fixed point
pub const SIMPLIFIED_GR_MAX_ITER: usize = 10;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Angle in degrees
pub type Degree = f64;
/// Angle in radians
pub type Radian = f64;
/// Distance in kilometers
pub type Kilometer = f64;
/// Julian date in the TDB time scale (days)
pub type JulianDate = f64;
/// Gravitational parameter GM in AU³/day²
pub type GravParam = f64;
