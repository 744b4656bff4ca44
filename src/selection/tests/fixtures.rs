//! Synthetic events for tests

use crate::models::{EventRecord, MuonCollection};

pub const MUON_MASS: f32 = 0.1057;

/// One muon; defaults pass every quality cut
#[derive(Debug, Clone, Copy)]
pub struct TestMuon {
    pub pt: f32,
    pub eta: f32,
    pub phi: f32,
    pub charge: i32,
    pub tight_id: bool,
    pub isolation: f32,
}

/// Good muon with the given kinematics
pub fn muon(pt: f32, eta: f32, phi: f32, charge: i32) -> TestMuon {
    TestMuon {
        pt,
        eta,
        phi,
        charge,
        tight_id: true,
        isolation: 0.05,
    }
}

/// Muon failing the quality selection on pT
pub fn soft_muon(charge: i32) -> TestMuon {
    muon(5.0, 0.3, 1.0, charge)
}

pub fn collection(muons: &[TestMuon]) -> MuonCollection {
    MuonCollection {
        pt: muons.iter().map(|m| m.pt).collect(),
        eta: muons.iter().map(|m| m.eta).collect(),
        phi: muons.iter().map(|m| m.phi).collect(),
        mass: vec![MUON_MASS; muons.len()],
        charge: muons.iter().map(|m| m.charge).collect(),
        tight_id: muons.iter().map(|m| m.tight_id).collect(),
        isolation: muons.iter().map(|m| m.isolation).collect(),
    }
}

pub fn event(entry: u64, triggers: [bool; 2], n_jet: i64, muons: &[TestMuon]) -> EventRecord {
    EventRecord::new(entry, triggers, n_jet, collection(muons))
}

/// Back-to-back opposite-sign pair with a mass close to 90 GeV
pub fn z_candidate(entry: u64) -> EventRecord {
    event(
        entry,
        [true, false],
        2,
        &[
            muon(45.0, 0.0, 0.0, 1),
            muon(45.0, 0.0, std::f32::consts::PI, -1),
        ],
    )
}

/// Mixed sample covering every cutflow outcome, deterministic in `count`
pub fn mixed_events(count: u64) -> Vec<EventRecord> {
    (0..count)
        .map(|i| {
            let pt = 20.5 + (i % 37) as f32 * 2.5;
            let eta = ((i % 11) as f32 - 5.0) * 0.2;
            let phi = (i % 13) as f32 * 0.45 - 2.7;
            let triggers = [i % 3 != 0, i % 5 == 0];
            let n_jet = (i % 7) as i64;

            let muons = match i % 6 {
                0 => vec![muon(pt, eta, phi, 1), muon(pt * 0.7 + 10.0, -eta, phi + 2.5, -1)],
                1 => vec![muon(pt, eta, phi, -1), muon(30.0, 0.4, -phi, -1)],
                2 => vec![muon(pt, eta, phi, 1), soft_muon(-1), muon(25.0, 1.1, 0.3, -1)],
                3 => vec![muon(pt, eta, phi, 1), muon(40.0, 0.2, 1.5, -1), muon(22.0, -0.8, -1.0, 1)],
                4 => vec![soft_muon(1)],
                _ => Vec::new(),
            };
            event(i, triggers, n_jet, &muons)
        })
        .collect()
}
