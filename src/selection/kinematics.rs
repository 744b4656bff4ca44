//! Four-vector kinematics for the selected muon pair.
//!
//! Stored momenta are single precision; every conversion and sum here runs in
//! `f64` so nearly collinear, high momentum pairs keep their small masses.

use super::dimuon::require_pair;
use super::{EventField, Stage, StageOutcome};
use crate::error::Result;
use crate::models::{DimuonObservables, EventRecord};
use std::ops::Add;

/// Collider coordinates: transverse momentum, pseudorapidity, azimuth, mass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolarVector {
    pub pt: f64,
    pub eta: f64,
    pub phi: f64,
    pub mass: f64,
}

impl PolarVector {
    pub fn new(pt: f64, eta: f64, phi: f64, mass: f64) -> Self {
        Self { pt, eta, phi, mass }
    }

    /// Cartesian 4-momentum of this object
    pub fn to_cartesian(&self) -> FourVector {
        let px = self.pt * self.phi.cos();
        let py = self.pt * self.phi.sin();
        let pz = self.pt * self.eta.sinh();
        let p = self.pt * self.eta.cosh();
        let e = (p * p + self.mass * self.mass).sqrt();
        FourVector { px, py, pz, e }
    }
}

/// Cartesian 4-momentum (px, py, pz, E)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FourVector {
    pub px: f64,
    pub py: f64,
    pub pz: f64,
    pub e: f64,
}

impl FourVector {
    pub fn p2(&self) -> f64 {
        self.px * self.px + self.py * self.py + self.pz * self.pz
    }

    pub fn pt(&self) -> f64 {
        self.px.hypot(self.py)
    }

    pub fn mass_squared(&self) -> f64 {
        self.e * self.e - self.p2()
    }

    /// Invariant mass; spacelike vectors give `-sqrt(-m2)`
    pub fn mass(&self) -> f64 {
        let m2 = self.mass_squared();
        if m2 >= 0.0 { m2.sqrt() } else { -(-m2).sqrt() }
    }
}

impl Add for FourVector {
    type Output = FourVector;

    fn add(self, other: FourVector) -> FourVector {
        FourVector {
            px: self.px + other.px,
            py: self.py + other.py,
            pz: self.pz + other.pz,
            e: self.e + other.e,
        }
    }
}

/// Invariant mass of two objects given in collider coordinates
pub fn pair_mass(first: &PolarVector, second: &PolarVector) -> f64 {
    (first.to_cartesian() + second.to_cartesian()).mass()
}

/// Defines `dimuon_mass`, `muon1_pt` and `muon2_pt`
#[derive(Debug, Clone, Copy, Default)]
pub struct KinematicCalculator;

impl KinematicCalculator {
    pub fn compute(&self, event: &EventRecord) -> Result<DimuonObservables> {
        let good = require_pair(self.name(), event)?;

        let muon = |i: usize| {
            PolarVector::new(
                f64::from(good.pt[i]),
                f64::from(good.eta[i]),
                f64::from(good.phi[i]),
                f64::from(good.mass[i]),
            )
        };

        Ok(DimuonObservables {
            mass: pair_mass(&muon(0), &muon(1)),
            muon1_pt: f64::from(good.pt[0]),
            muon2_pt: f64::from(good.pt[1]),
        })
    }
}

impl Stage for KinematicCalculator {
    fn name(&self) -> &str {
        "kinematics"
    }

    fn requires(&self) -> &'static [EventField] {
        &[EventField::TwoGoodMuons]
    }

    fn provides(&self) -> &'static [EventField] {
        &[EventField::Dimuon]
    }

    fn apply(&self, mut event: EventRecord) -> Result<StageOutcome> {
        event.dimuon = Some(self.compute(&event)?);
        Ok(StageOutcome::Keep(event))
    }
}
