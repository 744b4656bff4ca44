//! Stage ordering, preconditions and cutflow bookkeeping

use super::fixtures::{event, muon, soft_muon, z_candidate};
use crate::aggregation::Cutflow;
use crate::config::{AnalysisConfig, MuonSelectionCuts};
use crate::constants::cutflow_labels;
use crate::error::DimuonError;
use crate::selection::{
    ExactMultiplicityFilter, KinematicCalculator, MuonQualitySelector, OppositeChargeFilter,
    Pipeline, Stage, StageOutcome, TriggerFilter,
};

fn dimuon_pipeline() -> Pipeline {
    Pipeline::dimuon(&AnalysisConfig::default()).unwrap()
}

fn run(pipeline: &Pipeline, events: Vec<crate::models::EventRecord>) -> (Cutflow, usize) {
    let mut cutflow = pipeline.new_cutflow();
    let mut selected = 0;
    for record in events {
        if pipeline.process(record, &mut cutflow).unwrap().is_some() {
            selected += 1;
        }
    }
    (cutflow, selected)
}

#[test]
fn test_dimuon_pipeline_layout() {
    let pipeline = dimuon_pipeline();
    assert_eq!(
        pipeline.stage_names(),
        vec!["trigger", "muon_quality", "exact_multiplicity", "opposite_charge", "kinematics"]
    );
    assert_eq!(
        pipeline.cutflow_labels(),
        vec![
            "Trigger selection (HLT_IsoMu24 || HLT_IsoMu18)".to_string(),
            cutflow_labels::EXACTLY_TWO_MUONS.to_string(),
            cutflow_labels::OPPOSITE_SIGN.to_string(),
        ]
    );
}

#[test]
fn test_charge_filter_before_multiplicity_rejected() {
    let result = Pipeline::new(vec![
        Box::new(TriggerFilter::new("a", "b")),
        Box::new(MuonQualitySelector::new(MuonSelectionCuts::default())),
        Box::new(OppositeChargeFilter),
        Box::new(ExactMultiplicityFilter::new(2)),
    ]);

    match result {
        Err(DimuonError::PipelineOrder { stage, .. }) => assert_eq!(stage, "opposite_charge"),
        other => panic!("Expected PipelineOrder, got {:?}", other),
    }
}

#[test]
fn test_kinematics_needs_pair_guarantee() {
    // A multiplicity filter for three muons does not make positional pair access safe
    let result = Pipeline::new(vec![
        Box::new(MuonQualitySelector::new(MuonSelectionCuts::default())),
        Box::new(ExactMultiplicityFilter::new(3)),
        Box::new(KinematicCalculator),
    ]);
    assert!(matches!(result, Err(DimuonError::PipelineOrder { .. })));
}

#[test]
fn test_multiplicity_before_quality_rejected() {
    let result = Pipeline::new(vec![
        Box::new(ExactMultiplicityFilter::new(2)),
        Box::new(MuonQualitySelector::new(MuonSelectionCuts::default())),
    ]);
    assert!(matches!(result, Err(DimuonError::PipelineOrder { .. })));
}

#[test]
fn test_charge_filter_checks_count_at_runtime() {
    let quality = MuonQualitySelector::new(MuonSelectionCuts::default());
    let record = event(
        9,
        [true, true],
        0,
        &[muon(30.0, 0.0, 0.0, 1), muon(30.0, 0.0, 1.0, -1), muon(30.0, 0.0, 2.0, 1)],
    );
    let StageOutcome::Keep(record) = quality.apply(record).unwrap() else {
        panic!("Quality selection must keep the event");
    };

    match OppositeChargeFilter.apply(record.clone()) {
        Err(DimuonError::StagePrecondition { stage, entry, .. }) => {
            assert_eq!(stage, "opposite_charge");
            assert_eq!(entry, 9);
        }
        other => panic!("Expected StagePrecondition, got {:?}", other),
    }
    assert!(matches!(
        KinematicCalculator.compute(&record),
        Err(DimuonError::StagePrecondition { .. })
    ));
}

#[test]
fn test_precondition_without_quality_stage() {
    let record = z_candidate(0);
    assert!(matches!(
        ExactMultiplicityFilter::new(2).apply(record),
        Err(DimuonError::StagePrecondition { .. })
    ));
}

#[test]
fn test_opposite_sign_logic() {
    assert!(OppositeChargeFilter::is_opposite_sign(&[1, -1]));
    assert!(OppositeChargeFilter::is_opposite_sign(&[-1, 1]));
    assert!(!OppositeChargeFilter::is_opposite_sign(&[1, 1]));
    assert!(!OppositeChargeFilter::is_opposite_sign(&[-1, -1]));
    assert!(!OppositeChargeFilter::is_opposite_sign(&[0, -1]));
    assert!(OppositeChargeFilter::is_opposite_sign(&[i32::MAX, i32::MIN]));
}

#[test]
fn test_trigger_or() {
    for (triggers, expected) in [
        ([false, false], false),
        ([true, false], true),
        ([false, true], true),
        ([true, true], true),
    ] {
        assert_eq!(TriggerFilter::passes(&event(0, triggers, 0, &[])), expected);
    }
}

#[test]
fn test_three_event_cutflow() {
    let pipeline = dimuon_pipeline();
    let events = vec![
        // Fails trigger
        event(0, [false, false], 1, &[muon(45.0, 0.0, 0.0, 1), muon(45.0, 0.0, 3.0, -1)]),
        // Three good muons
        event(
            1,
            [true, false],
            0,
            &[muon(30.0, 0.1, 0.0, 1), muon(40.0, 0.2, 1.0, -1), muon(50.0, 0.3, 2.0, 1)],
        ),
        z_candidate(2),
    ];

    let (cutflow, selected) = run(&pipeline, events);
    assert_eq!(cutflow.pass_counts(), vec![2, 1, 1]);
    assert_eq!(cutflow.entries()[0].all, 3);
    assert_eq!(cutflow.entries()[1].all, 2);
    assert_eq!(cutflow.entries()[2].all, 1);
    assert_eq!(selected, 1);
    assert!(cutflow.is_consistent());
}

#[test]
fn test_same_sign_pair_dropped() {
    let pipeline = dimuon_pipeline();
    let record = event(0, [false, true], 0, &[muon(45.0, 0.0, 0.0, -1), muon(45.0, 0.0, 3.0, -1)]);

    let mut cutflow = pipeline.new_cutflow();
    assert!(pipeline.process(record, &mut cutflow).unwrap().is_none());
    assert_eq!(cutflow.pass_counts(), vec![1, 1, 0]);
}

#[test]
fn test_soft_muons_do_not_count() {
    let pipeline = dimuon_pipeline();
    let record = event(
        0,
        [true, false],
        0,
        &[muon(45.0, 0.0, 0.0, 1), soft_muon(1), muon(45.0, 0.0, 3.0, -1)],
    );

    let mut cutflow = pipeline.new_cutflow();
    let selected = pipeline.process(record, &mut cutflow).unwrap().unwrap();
    assert_eq!(selected.n_good_muons(), Some(2));
    assert!(selected.dimuon.is_some());
}

#[test]
fn test_cutflow_non_increasing_on_mixed_sample() {
    let pipeline = dimuon_pipeline();
    let (cutflow, selected) = run(&pipeline, super::fixtures::mixed_events(600));

    let counts = cutflow.pass_counts();
    assert!(counts[0] >= counts[1] && counts[1] >= counts[2]);
    assert_eq!(counts[2] as usize, selected);
    assert!(selected > 0);
    assert!(cutflow.is_consistent());
}
