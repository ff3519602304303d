//! Streaming admission properties: ceiling bounds, ordering, idempotence,
//! saturation handling, and abort-on-fetch-failure.

mod common;

use common::MapRecordSource;
use gaia_universe_model::{
    load_records, CelestialBodyFlags, ModelError, SourceRange,
};

fn range(start: u32, end: u32) -> SourceRange {
    SourceRange::new(start, end).unwrap()
}

#[test]
fn truncates_at_budget_with_400_byte_halves() {
    // ceiling 1000, ids [0, 2), 400 bytes per half: id0 admits 800, then
    // id1 half 0 hits 800 + 400 >= 1000 and is discarded along with the
    // remaining half; the loop ends with the range exhausted.
    let source = MapRecordSource::uniform(2, &[0xAB; 400]);
    let model = load_records(&source, range(0, 2), CelestialBodyFlags::ALL, 1000).unwrap();
    assert_eq!(model.used_gpu_heap, 800);
}

#[test]
fn admitted_bytes_follow_id_half_order() {
    let source = MapRecordSource::new()
        .with_half(5, 0, vec![1, 1])
        .with_half(5, 1, vec![2, 2, 2])
        .with_half(6, 0, vec![3])
        .with_half(6, 1, vec![4, 4]);

    let model = load_records(&source, range(5, 7), CelestialBodyFlags::ALL, 1024).unwrap();
    assert_eq!(model.admitted(), &[1, 1, 2, 2, 2, 3, 4, 4]);
}

#[test]
fn oversized_half_skips_to_next_identifier() {
    // id0 half 0 cannot fit: its half 1 must be skipped without aborting,
    // and id1 must still be attempted and admitted.
    let source = MapRecordSource::new()
        .with_half(0, 0, vec![9; 500])
        .with_half(0, 1, vec![8; 4])
        .with_half(1, 0, vec![5; 16])
        .with_half(1, 1, vec![6; 16]);

    let model = load_records(&source, range(0, 2), CelestialBodyFlags::ALL, 100).unwrap();
    assert_eq!(model.used_gpu_heap, 32);
    assert_eq!(&model.admitted()[..16], &[5; 16]);
    assert_eq!(&model.admitted()[16..], &[6; 16]);
}

#[test]
fn rerun_with_same_source_is_identical() {
    let source = MapRecordSource::new()
        .with_half(0, 0, vec![10; 300])
        .with_half(0, 1, vec![11; 300])
        .with_half(1, 0, vec![12; 300])
        .with_half(1, 1, vec![13; 300]);

    let first = load_records(&source, range(0, 2), CelestialBodyFlags::ALL, 700).unwrap();
    let second = load_records(&source, range(0, 2), CelestialBodyFlags::ALL, 700).unwrap();
    assert_eq!(first.used_gpu_heap, second.used_gpu_heap);
    assert_eq!(first.admitted(), second.admitted());
}

#[test]
fn used_bytes_bounded_for_every_ceiling() {
    let source = MapRecordSource::uniform(4, &[7; 64]);
    for ceiling in 0..600 {
        let model =
            load_records(&source, range(0, 4), CelestialBodyFlags::ALL, ceiling).unwrap();
        assert!(
            model.used_gpu_heap <= ceiling,
            "used {} exceeds ceiling {}",
            model.used_gpu_heap,
            ceiling
        );
    }
}

#[test]
fn fetch_failure_mid_loop_fails_the_whole_load() {
    let source = MapRecordSource::uniform(3, &[1; 8]).failing_at(1, 0);
    let err = load_records(&source, range(0, 3), CelestialBodyFlags::ALL, 4096).unwrap_err();
    assert!(matches!(
        err,
        ModelError::RecordFetch { id: 1, half: 0, .. }
    ));
}

#[test]
fn missing_half_fails_rather_than_skips() {
    let source = MapRecordSource::new().with_half(0, 0, vec![1; 8]);
    let err = load_records(&source, range(0, 1), CelestialBodyFlags::ALL, 4096).unwrap_err();
    assert!(matches!(
        err,
        ModelError::RecordFetch { id: 0, half: 1, .. }
    ));
}
