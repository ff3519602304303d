//! Graphics device capability interface
//!
//! The loader never touches engine-owned globals; every component takes a
//! device capability reference and consumes only the primitives below:
//! memory-type lookup, heap-budget query, buffer create/write/read, mapped
//! writes, one-shot copy submission, and fence reset/wait. The production
//! backend is Vulkan ([`vulkan::VulkanDevice`]); tests drive the same trait
//! with an in-memory device.

pub mod vulkan;

use std::time::Duration;

use crate::error::{ModelError, ModelResult};

/// Memory pools relevant to this workload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryDomain {
    /// Host-visible and host-coherent; staging and uniform data
    HostVisible,
    /// Device-local; the durable model storage
    DeviceLocal,
}

/// Buffer roles understood by the device backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// Transfer source bridging host data into device-local storage
    Staging,
    /// Transfer destination consumed as a shader storage buffer
    Storage,
    /// Small uniform data for the fragment stage
    Uniform,
}

/// Opaque handle to a device buffer.
///
/// Not `Clone`: each handle is owned by exactly one component at a time and
/// is surrendered to [`GpuDevice::destroy_buffer`] when released.
#[derive(Debug, PartialEq, Eq)]
pub struct BufferHandle {
    id: u64,
    size: u64,
}

impl BufferHandle {
    pub fn new(id: u64, size: u64) -> Self {
        Self { id, size }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

/// Graphics device primitives consumed by the budget estimator and the
/// upload pipeline.
pub trait GpuDevice {
    /// Index of a memory type carrying the properties of `domain`.
    ///
    /// A device with no matching type is an explicit error, never a silent
    /// fallback to index 0.
    fn memory_type_index(&self, domain: MemoryDomain) -> ModelResult<u32>;

    /// Currently available budget, in bytes, of the heap backing
    /// `memory_type_index`. Reflects memory already consumed by other
    /// subsystems, not the static heap capacity.
    fn heap_budget(&self, memory_type_index: u32) -> ModelResult<u64>;

    /// Create a buffer of `size` bytes bound to memory in `domain`.
    fn create_buffer(
        &self,
        size: u64,
        kind: BufferKind,
        domain: MemoryDomain,
    ) -> ModelResult<BufferHandle>;

    /// Write `data` into a host-visible buffer via a mapped-memory copy.
    fn write_buffer(&self, buffer: &BufferHandle, data: &[u8]) -> ModelResult<()>;

    /// Read a host-visible buffer back out. Used by readback paths and
    /// round-trip verification.
    fn read_buffer(&self, buffer: &BufferHandle) -> ModelResult<Vec<u8>>;

    /// Reset the shared completion fence to the unsignaled state.
    fn reset_fence(&self) -> ModelResult<()>;

    /// Record and submit a one-shot copy of `size` bytes from `src`
    /// (offset 0) to `dst` (offset 0), signaling the completion fence.
    fn submit_copy(&self, src: &BufferHandle, dst: &BufferHandle, size: u64) -> ModelResult<()>;

    /// Block until the completion fence signals or `timeout` elapses.
    fn wait_fence(&self, timeout: Duration) -> ModelResult<()>;

    /// Release a buffer and its backing memory.
    fn destroy_buffer(&self, buffer: BufferHandle);
}

/// Error context for device operations
pub trait DeviceErrorContext<T> {
    fn device_context(self, operation: &str) -> ModelResult<T>;
}

impl<T, E> DeviceErrorContext<T> for Result<T, E>
where
    E: std::fmt::Display,
{
    fn device_context(self, operation: &str) -> ModelResult<T> {
        self.map_err(|e| ModelError::Device {
            operation: operation.to_string(),
            reason: e.to_string(),
        })
    }
}
