//! Celestial body records and the record source interface
//!
//! A record is one renderable celestial body, stored on disk as two binary
//! halves per identifier. The capability flags select which sub-fields of a
//! stored record are fetched; the loader itself only ever sees raw payload
//! bytes and accounts for them as such.

use std::path::PathBuf;

use bytemuck::{Pod, Zeroable};

use crate::error::{ModelError, ModelResult};

/// Capability/selector bitset for celestial body sub-fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CelestialBodyFlags(pub u32);

impl CelestialBodyFlags {
    pub const POSITION: Self = Self(1 << 0);
    pub const VELOCITY: Self = Self(1 << 1);
    pub const MAGNITUDE: Self = Self(1 << 2);
    pub const TEMPERATURE: Self = Self(1 << 3);

    pub const ALL: Self = Self(0b1111);

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl core::ops::BitOr for CelestialBodyFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Full on-disk record layout; the sub-field spans below must match it.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CelestialBodyRecord {
    pub position: [f32; 3],
    pub velocity: [f32; 3],
    pub magnitude: f32,
    pub temperature: f32,
}

/// Size of one full stored record in bytes
pub const FULL_RECORD_SIZE: usize = std::mem::size_of::<CelestialBodyRecord>();

/// `(selector, byte offset, byte length)` spans within a full record,
/// in stored field order
const FIELD_SPANS: [(CelestialBodyFlags, usize, usize); 4] = [
    (CelestialBodyFlags::POSITION, 0, 12),
    (CelestialBodyFlags::VELOCITY, 12, 12),
    (CelestialBodyFlags::MAGNITUDE, 24, 4),
    (CelestialBodyFlags::TEMPERATURE, 28, 4),
];

/// Per-record base size for the given flag selection.
///
/// Used downstream for buffer layout and shader indexing; admission in the
/// loader accounts raw bytes and never consults this.
pub fn celestial_body_size(flags: CelestialBodyFlags) -> u64 {
    FIELD_SPANS
        .iter()
        .filter(|(field, _, _)| flags.contains(*field))
        .map(|(_, _, len)| *len as u64)
        .sum()
}

/// Source of binary record payloads, addressed by `(id, half, flags)`.
///
/// `fetch` returns an owned transient buffer; fetch failure is fatal to the
/// whole load operation, never a per-record skip.
pub trait RecordSource {
    fn fetch(&self, id: u32, half: u8, flags: CelestialBodyFlags) -> ModelResult<Vec<u8>>;
}

/// File-backed record source: one binary file per `(id, half)` under a base
/// directory, each holding packed full records.
pub struct FileRecordSource {
    base_path: PathBuf,
}

impl FileRecordSource {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn half_path(&self, id: u32, half: u8) -> PathBuf {
        self.base_path
            .join(format!("GaiaUniverseModel_{id:04}_{half}.bin"))
    }
}

impl RecordSource for FileRecordSource {
    fn fetch(&self, id: u32, half: u8, flags: CelestialBodyFlags) -> ModelResult<Vec<u8>> {
        let path = self.half_path(id, half);
        let raw = std::fs::read(&path).map_err(|e| ModelError::RecordFetch {
            id,
            half,
            reason: format!("{}: {}", path.display(), e),
        })?;

        if raw.len() % FULL_RECORD_SIZE != 0 {
            return Err(ModelError::RecordFetch {
                id,
                half,
                reason: format!(
                    "{}: {} bytes is not a whole number of {} byte records",
                    path.display(),
                    raw.len(),
                    FULL_RECORD_SIZE
                ),
            });
        }

        Ok(filter_fields(&raw, flags))
    }
}

/// Narrow packed full records down to the flagged sub-fields, preserving
/// record order.
fn filter_fields(raw: &[u8], flags: CelestialBodyFlags) -> Vec<u8> {
    if flags.contains(CelestialBodyFlags::ALL) {
        return raw.to_vec();
    }

    let selected = celestial_body_size(flags) as usize;
    let mut out = Vec::with_capacity(raw.len() / FULL_RECORD_SIZE * selected);
    for record in raw.chunks_exact(FULL_RECORD_SIZE) {
        for (field, offset, len) in FIELD_SPANS {
            if flags.contains(field) {
                out.extend_from_slice(&record[offset..offset + len]);
            }
        }
    }
    out
}
