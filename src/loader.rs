//! Streaming admission loader
//!
//! Walks the descriptor's identifier range in ascending `(id, half)` order,
//! fetching each binary half from the record source and admitting it into a
//! pre-allocated host buffer bounded by the budget ceiling. Payloads are
//! admitted whole or not at all; the admitted byte order is exactly the
//! fetch order, which is the layout the rendering pipeline indexes into.

use crate::descriptor::SourceRange;
use crate::error::{ModelError, ModelResult};
use crate::records::{celestial_body_size, CelestialBodyFlags, RecordSource};

/// Fixed number of binary halves per celestial body, fetched in order
pub const HALVES_PER_BODY: u8 = 2;

/// Central mutable aggregate for one load operation.
///
/// Owned exclusively by the load operation from allocation through upload;
/// `used_gpu_heap` grows monotonically and never exceeds the buffer
/// capacity. The upload stage consumes it destructively.
#[derive(Debug)]
pub struct UniverseModelMemory {
    /// Per-record base size for the flag selection; layout metadata for the
    /// downstream pipeline, not used for admission accounting
    pub celestial_body_size: u64,

    /// Total admitted bytes
    pub used_gpu_heap: u64,

    host_buffer: Vec<u8>,
}

impl UniverseModelMemory {
    /// Allocate a zero-initialized host buffer of exactly `ceiling` bytes.
    ///
    /// Allocation failure is reported, not retried, and aborts the load
    /// before any record is fetched.
    pub fn allocate(ceiling: u64, flags: CelestialBodyFlags) -> ModelResult<Self> {
        let capacity = usize::try_from(ceiling).map_err(|_| ModelError::AllocationFailed {
            size: ceiling,
            reason: "ceiling exceeds addressable host memory".to_string(),
        })?;

        let mut host_buffer = Vec::new();
        host_buffer
            .try_reserve_exact(capacity)
            .map_err(|e| ModelError::AllocationFailed {
                size: ceiling,
                reason: e.to_string(),
            })?;
        host_buffer.resize(capacity, 0);

        Ok(Self {
            celestial_body_size: celestial_body_size(flags),
            used_gpu_heap: 0,
            host_buffer,
        })
    }

    /// Byte capacity of the host buffer (the admission ceiling)
    pub fn capacity(&self) -> u64 {
        self.host_buffer.len() as u64
    }

    /// The admitted bytes, in ascending `(id, half)` order
    pub fn admitted(&self) -> &[u8] {
        &self.host_buffer[..self.used_gpu_heap as usize]
    }

    /// Copy one whole payload at the current admission offset.
    ///
    /// Caller has already checked the budget; a payload that does not fit
    /// whole is never passed here.
    fn admit(&mut self, payload: &[u8]) {
        let offset = self.used_gpu_heap as usize;
        self.host_buffer[offset..offset + payload.len()].copy_from_slice(payload);
        self.used_gpu_heap += payload.len() as u64;
    }
}

/// Stream record halves from `source` into a ceiling-bounded host buffer.
///
/// Fetch failure aborts the entire load and releases all partial state. A
/// payload that would meet or exceed the remaining budget is discarded and
/// the *current identifier's* remaining half is skipped; subsequent
/// identifiers are still attempted, so a smaller later record could in
/// principle still fit. Returns the model memory with
/// `used_gpu_heap <= ceiling`.
pub fn load_records(
    source: &dyn RecordSource,
    range: SourceRange,
    flags: CelestialBodyFlags,
    ceiling: u64,
) -> ModelResult<UniverseModelMemory> {
    let mut model = UniverseModelMemory::allocate(ceiling, flags)?;

    log::info!(
        "[Loader] streaming bodies [{}, {}) into {} byte budget",
        range.start,
        range.end,
        ceiling
    );

    let mut saturated = false;
    for id in range.iter() {
        for half in 0..HALVES_PER_BODY {
            let payload = source.fetch(id, half, flags)?;

            if model.used_gpu_heap + payload.len() as u64 >= ceiling {
                if !saturated {
                    log::warn!(
                        "[Loader] budget saturated at body {} half {} ({} of {} bytes used)",
                        id,
                        half,
                        model.used_gpu_heap,
                        ceiling
                    );
                    saturated = true;
                }
                // Payload dropped here; skip this body's remaining half.
                break;
            }

            model.admit(&payload);
        }
    }

    log::info!(
        "[Loader] admitted {} of {} budget bytes",
        model.used_gpu_heap,
        ceiling
    );

    Ok(model)
}
