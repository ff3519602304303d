//! Host to device upload pipeline
//!
//! Stages the admitted bytes in a transient host-visible buffer, submits a
//! one-shot copy into the device-local destination, and blocks on the
//! completion fence before any staging memory is reclaimed. The blocking
//! wait is the sole synchronization mechanism: the destination buffer and
//! the shared command-buffer/fence slot must not be touched by anyone else
//! until it returns.

use std::time::Duration;

use crate::error::{ModelError, ModelResult};
use crate::gpu::{BufferHandle, BufferKind, GpuDevice, MemoryDomain};
use crate::loader::UniverseModelMemory;

/// Upper bound on the completion-fence wait.
///
/// Generous enough for a first-load transfer on slow hardware; finite so a
/// hung device surfaces as [`ModelError::FenceTimeout`] instead of blocking
/// the load forever.
pub const UPLOAD_FENCE_TIMEOUT: Duration = Duration::from_secs(30);

/// Scoped owner of the transient staging buffer.
///
/// Holding the buffer in a guard ties its lifetime to this stack frame, so
/// the staging memory is released on every exit path, error or success.
struct StagingGuard<'a> {
    device: &'a dyn GpuDevice,
    buffer: Option<BufferHandle>,
}

impl<'a> StagingGuard<'a> {
    fn create(device: &'a dyn GpuDevice, size: u64) -> ModelResult<Self> {
        let buffer = device.create_buffer(size, BufferKind::Staging, MemoryDomain::HostVisible)?;
        Ok(Self {
            device,
            buffer: Some(buffer),
        })
    }

    fn buffer(&self) -> &BufferHandle {
        self.buffer
            .as_ref()
            .unwrap_or_else(|| unreachable!("staging buffer taken before drop"))
    }
}

impl Drop for StagingGuard<'_> {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.device.destroy_buffer(buffer);
        }
    }
}

/// Copy the admitted bytes of `model` into `destination` and wait for the
/// device to finish.
///
/// Consumes the model: its host buffer is released once the copy is
/// fence-confirmed. Returns the number of bytes uploaded. Any device failure
/// aborts the load; the staging buffer is still released.
pub fn upload_model(
    device: &dyn GpuDevice,
    model: UniverseModelMemory,
    destination: &BufferHandle,
) -> ModelResult<u64> {
    let used = model.used_gpu_heap;
    if used > destination.size() {
        return Err(ModelError::Device {
            operation: "upload".to_string(),
            reason: format!(
                "destination holds {} bytes, {} admitted",
                destination.size(),
                used
            ),
        });
    }

    log::info!("[Upload] staging {} bytes", used);

    let staging = StagingGuard::create(device, used)?;
    device.write_buffer(staging.buffer(), model.admitted())?;

    device.reset_fence()?;
    device.submit_copy(staging.buffer(), destination, used)?;
    device.wait_fence(UPLOAD_FENCE_TIMEOUT)?;

    log::info!("[Upload] device copy complete, releasing staging memory");

    // Guard drop releases the staging buffer; dropping `model` here frees
    // the host buffer only after the fence confirmed the copy.
    drop(staging);
    drop(model);

    Ok(used)
}
