//! Parquet datasets shared by the integration tests

use polars::prelude::*;
use std::fs::File;
use std::path::Path;

/// Opposite-sign Z-like pair when `i % 3 == 0`, a same-sign pair after it, no muons otherwise
fn muons_for(i: usize) -> (Vec<f32>, Vec<f32>, Vec<f32>, Vec<i32>) {
    match i % 3 {
        0 => (
            vec![44.0 + (i % 5) as f32, 41.0],
            vec![0.2, -0.3],
            vec![0.1, 0.1 + std::f32::consts::PI],
            vec![1, -1],
        ),
        1 => (vec![30.0, 28.0], vec![1.0, 0.5], vec![0.0, 2.0], vec![-1, -1]),
        _ => (Vec::new(), Vec::new(), Vec::new(), Vec::new()),
    }
}

pub fn write_dataset(path: &Path, events: usize) {
    let list = |rows: Vec<Series>, name: &str| Series::new(name.into(), rows).into_column();

    let (mut pt, mut eta, mut phi, mut mass, mut charge, mut tight, mut iso) =
        (vec![], vec![], vec![], vec![], vec![], vec![], vec![]);
    for i in 0..events {
        let (p, e, f, q) = muons_for(i);
        let n = p.len();
        pt.push(Series::new("".into(), p));
        eta.push(Series::new("".into(), e));
        phi.push(Series::new("".into(), f));
        mass.push(Series::new("".into(), vec![0.1057f32; n]));
        charge.push(Series::new("".into(), q));
        tight.push(Series::new("".into(), vec![true; n]));
        iso.push(Series::new("".into(), vec![0.01f32; n]));
    }

    let mut df = DataFrame::new(vec![
        Series::new("HLT_IsoMu24".into(), (0..events).map(|i| i % 4 != 3).collect::<Vec<_>>()).into_column(),
        Series::new("HLT_IsoMu18".into(), vec![false; events]).into_column(),
        Series::new("nJet".into(), (0..events).map(|i| (i % 4) as i32).collect::<Vec<_>>()).into_column(),
        list(pt, "Muon_pt"),
        list(eta, "Muon_eta"),
        list(phi, "Muon_phi"),
        list(mass, "Muon_mass"),
        list(charge, "Muon_charge"),
        list(tight, "Muon_tightId"),
        list(iso, "Muon_pfRelIso04_all"),
    ])
    .unwrap();

    ParquetWriter::new(File::create(path).unwrap())
        .finish(&mut df)
        .unwrap();
}

pub fn expected_selected(events: usize) -> u64 {
    (0..events).filter(|i| i % 3 == 0 && i % 4 != 3).count() as u64
}
