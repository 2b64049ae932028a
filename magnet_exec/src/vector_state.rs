//! # Vector State
//!
//! Conversions between axis fields and the field vector. Angles are in degrees.
//!
//! Spherical geometry uses the physics convention:
//!
//! ```text
//! x = r sin(theta) cos(phi)
//! y = r sin(theta) sin(phi)
//! z = r cos(theta)
//! ```
//!
//! Planar geometry has a single angle `phi` measured from axis `a` towards axis `b`.
//!
//! When a single coordinate is changed the others are held at their *constant* values, the last
//! commanded ones, rather than at whatever the field currently reads. These constants also stand in
//! for angles which are undefined at the origin.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Serialize;

use magnet_if::quantity::AxisId;
use util::maths::{acos_deg, magnitude};

use crate::params::Geometry;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Components smaller than this are written as exactly zero.
const ZERO_SNAP: f64 = 1e-12;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The geometry of the magnet plus the hold-fixed coordinates.
#[derive(Debug, Clone, Serialize)]
pub struct VectorState {
    geometry: Geometry,

    /// Units: Tesla
    pub constant_radius: f64,

    /// Units: degrees
    pub constant_phi: f64,

    /// Units: degrees
    pub constant_theta: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl VectorState {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            constant_radius: 0.0,
            constant_phi: 0.0,
            constant_theta: 0.0,
        }
    }

    pub fn has_theta(&self) -> bool {
        self.geometry == Geometry::Spherical
    }

    /// Magnitude of the field vector.
    pub fn radius(&self, fields: &[f64]) -> f64 {
        magnitude(fields)
    }

    /// Azimuthal angle of the field vector, `constant_phi` when undefined.
    pub fn phi(&self, fields: &[f64]) -> f64 {
        match fields {
            [x, y, _] | [x, y] => phi_deg(*x, *y).unwrap_or(self.constant_phi),
            _ => self.constant_phi,
        }
    }

    /// Polar angle of the field vector, `constant_theta` when undefined. `None` for planar magnets.
    pub fn theta(&self, fields: &[f64]) -> Option<f64> {
        if !self.has_theta() {
            return None;
        }
        match fields {
            [_, _, z] => Some(theta_deg(magnitude(fields), *z).unwrap_or(self.constant_theta)),
            _ => None,
        }
    }

    /// Axis targets for a new radius, angles held constant.
    pub fn target_for_radius(&self, radius: f64) -> Vec<f64> {
        self.to_cartesian(radius, self.constant_phi, self.constant_theta)
    }

    /// Axis targets for a new azimuthal angle, radius and polar angle held constant.
    pub fn target_for_phi(&self, phi: f64) -> Vec<f64> {
        self.to_cartesian(self.constant_radius, phi, self.constant_theta)
    }

    /// Axis targets for a new polar angle, `None` for planar magnets.
    pub fn target_for_theta(&self, theta: f64) -> Option<Vec<f64>> {
        if self.has_theta() {
            Some(self.to_cartesian(self.constant_radius, self.constant_phi, theta))
        } else {
            None
        }
    }

    /// Take the constant coordinates from a field reading. Angles are left alone at the origin.
    pub fn seed(&mut self, fields: &[f64]) {
        self.constant_radius = self.radius(fields);
        self.constant_phi = self.phi(fields);
        if let Some(t) = self.theta(fields) {
            self.constant_theta = t;
        }
    }

    fn to_cartesian(&self, radius: f64, phi: f64, theta: f64) -> Vec<f64> {
        let v = match self.geometry {
            Geometry::Spherical => spherical_to_cartesian(radius, phi, theta).to_vec(),
            Geometry::Planar { .. } => polar_to_cartesian(radius, phi).to_vec(),
        };
        v.into_iter()
            .map(|c| if c.abs() < ZERO_SNAP { 0.0 } else { c })
            .collect()
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// `(radius, angle)` of a planar vector, the angle is `None` at the origin.
pub fn cartesian_to_polar(a: f64, b: f64) -> (f64, Option<f64>) {
    (magnitude(&[a, b]), phi_deg(a, b))
}

pub fn polar_to_cartesian(radius: f64, phi: f64) -> [f64; 2] {
    let phi = phi.to_radians();
    [radius * phi.cos(), radius * phi.sin()]
}

/// `(radius, phi, theta)` of a vector. Phi is `None` on the z axis, theta at the origin.
pub fn cartesian_to_spherical(x: f64, y: f64, z: f64) -> (f64, Option<f64>, Option<f64>) {
    let r = magnitude(&[x, y, z]);
    (r, phi_deg(x, y), theta_deg(r, z))
}

pub fn spherical_to_cartesian(radius: f64, phi: f64, theta: f64) -> [f64; 3] {
    let (phi, theta) = (phi.to_radians(), theta.to_radians());
    [
        radius * theta.sin() * phi.cos(),
        radius * theta.sin() * phi.sin(),
        radius * theta.cos(),
    ]
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn phi_deg(a: f64, b: f64) -> Option<f64> {
    if a == 0.0 && b == 0.0 {
        None
    } else {
        Some(b.atan2(a).to_degrees())
    }
}

fn theta_deg(radius: f64, z: f64) -> Option<f64> {
    if radius == 0.0 {
        None
    } else {
        Some(acos_deg(z / radius))
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
