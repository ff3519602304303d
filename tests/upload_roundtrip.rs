//! Upload pipeline properties: destination round-trip, staging release on
//! every exit path, and the fence timeout policy.

mod common;

use common::{MapRecordSource, TestDevice};
use gaia_universe_model::{
    load_records, upload_model, BufferKind, CelestialBodyFlags, GpuDevice, MemoryDomain,
    ModelError, SourceRange,
};

fn loaded_model(payload_len: usize, ceiling: u64) -> gaia_universe_model::UniverseModelMemory {
    let source = MapRecordSource::uniform(2, &vec![0x5A; payload_len]);
    load_records(
        &source,
        SourceRange::new(0, 2).unwrap(),
        CelestialBodyFlags::ALL,
        ceiling,
    )
    .unwrap()
}

#[test]
fn destination_matches_admitted_bytes() {
    let device = TestDevice::new(1 << 20, 1 << 20);
    let model = loaded_model(100, 4096);
    let expected = model.admitted().to_vec();
    let used = model.used_gpu_heap;

    let destination = device
        .create_buffer(used, BufferKind::Storage, MemoryDomain::DeviceLocal)
        .unwrap();
    let uploaded = upload_model(&device, model, &destination).unwrap();

    assert_eq!(uploaded, used);
    assert_eq!(device.buffer_contents(&destination), expected);
}

#[test]
fn staging_buffer_released_after_success() {
    let device = TestDevice::new(1 << 20, 1 << 20);
    let model = loaded_model(64, 1024);
    let destination = device
        .create_buffer(model.used_gpu_heap, BufferKind::Storage, MemoryDomain::DeviceLocal)
        .unwrap();

    upload_model(&device, model, &destination).unwrap();

    // Only the destination survives the upload.
    assert_eq!(device.live_buffers(), vec![destination.id()]);
}

#[test]
fn staging_buffer_released_on_submit_failure() {
    let device = TestDevice::new(1 << 20, 1 << 20);
    let model = loaded_model(64, 1024);
    let destination = device
        .create_buffer(model.used_gpu_heap, BufferKind::Storage, MemoryDomain::DeviceLocal)
        .unwrap();

    device.fail_submit.set(true);
    let err = upload_model(&device, model, &destination).unwrap_err();
    assert!(matches!(err, ModelError::Device { .. }));

    assert_eq!(device.live_buffers(), vec![destination.id()]);
}

#[test]
fn hung_fence_reports_timeout_and_releases_staging() {
    let device = TestDevice::new(1 << 20, 1 << 20);
    let model = loaded_model(64, 1024);
    let destination = device
        .create_buffer(model.used_gpu_heap, BufferKind::Storage, MemoryDomain::DeviceLocal)
        .unwrap();

    device.hang_fence.set(true);
    let err = upload_model(&device, model, &destination).unwrap_err();
    assert!(matches!(err, ModelError::FenceTimeout { .. }));

    assert_eq!(device.live_buffers(), vec![destination.id()]);
}

#[test]
fn undersized_destination_is_rejected_before_staging() {
    let device = TestDevice::new(1 << 20, 1 << 20);
    let model = loaded_model(100, 4096);
    let destination = device
        .create_buffer(model.used_gpu_heap - 1, BufferKind::Storage, MemoryDomain::DeviceLocal)
        .unwrap();

    let err = upload_model(&device, model, &destination).unwrap_err();
    assert!(matches!(err, ModelError::Device { .. }));

    // Nothing was staged.
    assert_eq!(device.live_buffers(), vec![destination.id()]);
}

#[test]
fn empty_admission_set_uploads_zero_bytes() {
    let device = TestDevice::new(1 << 20, 1 << 20);
    let model = loaded_model(100, 0);
    assert_eq!(model.used_gpu_heap, 0);

    let destination = device
        .create_buffer(0, BufferKind::Storage, MemoryDomain::DeviceLocal)
        .unwrap();
    let uploaded = upload_model(&device, model, &destination).unwrap();
    assert_eq!(uploaded, 0);
}
