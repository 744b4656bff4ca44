//! Writes synthetic events in the NanoAOD-like Parquet layout

use crate::config::ColumnNames;
use crate::models::EventRecord;
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

fn float_lists(name: &str, rows: impl Iterator<Item = Vec<f32>>) -> Column {
    let rows: Vec<Series> = rows.map(|row| Series::new("".into(), row)).collect();
    Series::new(name.into(), rows).into_column()
}

/// Frame holding `events` under the given column names
pub fn events_frame(events: &[EventRecord], columns: &ColumnNames) -> DataFrame {
    let muons = || events.iter().map(|e| &e.muons);

    let charge: Vec<Series> = muons()
        .map(|m| Series::new("".into(), m.charge.clone()))
        .collect();
    let tight_id: Vec<Series> = muons()
        .map(|m| Series::new("".into(), m.tight_id.clone()))
        .collect();

    DataFrame::new(vec![
        Series::new(
            columns.triggers[0].as_str().into(),
            events.iter().map(|e| e.triggers[0]).collect::<Vec<_>>(),
        )
        .into_column(),
        Series::new(
            columns.triggers[1].as_str().into(),
            events.iter().map(|e| e.triggers[1]).collect::<Vec<_>>(),
        )
        .into_column(),
        Series::new(
            columns.jet_count.as_str().into(),
            events.iter().map(|e| e.n_jet as i32).collect::<Vec<_>>(),
        )
        .into_column(),
        float_lists(&columns.muon_pt, muons().map(|m| m.pt.clone())),
        float_lists(&columns.muon_eta, muons().map(|m| m.eta.clone())),
        float_lists(&columns.muon_phi, muons().map(|m| m.phi.clone())),
        float_lists(&columns.muon_mass, muons().map(|m| m.mass.clone())),
        Series::new(columns.muon_charge.as_str().into(), charge).into_column(),
        Series::new(columns.muon_tight_id.as_str().into(), tight_id).into_column(),
        float_lists(&columns.muon_isolation, muons().map(|m| m.isolation.clone())),
    ])
    .unwrap()
}

pub fn write_frame(df: &mut DataFrame, path: &Path) {
    let file = File::create(path).unwrap();
    ParquetWriter::new(file).finish(df).unwrap();
}

/// Write `events` with the default column names
pub fn write_events(events: &[EventRecord], path: &Path) {
    let mut df = events_frame(events, &ColumnNames::default());
    write_frame(&mut df, path);
}
