//! Universe model descriptor input
//!
//! The descriptor is a small JSON document naming the half-open range of
//! celestial body identifiers to load. It is read once per load operation
//! and rejected before any GPU work if the range is malformed.

use std::path::Path;

use serde::Deserialize;

use crate::error::{ModelError, ModelResult};

/// Half-open identifier range `[start, end)`, one integer per celestial body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceRange {
    pub start: u32,
    pub end: u32,
}

impl SourceRange {
    /// Build a validated range; requires at least one identifier.
    pub fn new(start: u32, end: u32) -> ModelResult<Self> {
        if end <= start {
            return Err(ModelError::InvalidSourceRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Number of identifiers covered by the range
    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ascending identifier walk
    pub fn iter(&self) -> std::ops::Range<u32> {
        self.start..self.end
    }
}

/// Parsed model descriptor; immutable for the lifetime of a load
#[derive(Debug, Clone, Copy)]
pub struct ModelDescriptor {
    pub source_range: SourceRange,
}

#[derive(Deserialize)]
struct RawDescriptor {
    source_range: Vec<u32>,
}

/// Read and validate the model descriptor at `path`.
///
/// The `source_range` array may carry trailing elements; only the first two
/// are meaningful. Fewer than two elements is a configuration error.
pub fn read_model_descriptor(path: &Path) -> ModelResult<ModelDescriptor> {
    let raw = std::fs::read_to_string(path).map_err(|e| ModelError::InvalidDescriptor {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let parsed: RawDescriptor =
        serde_json::from_str(&raw).map_err(|e| ModelError::InvalidDescriptor {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

    if parsed.source_range.len() < 2 {
        return Err(ModelError::InvalidDescriptor {
            path: path.display().to_string(),
            reason: format!(
                "source_range needs 2 elements, found {}",
                parsed.source_range.len()
            ),
        });
    }

    let source_range = SourceRange::new(parsed.source_range[0], parsed.source_range[1])?;

    log::debug!(
        "[Descriptor] {} -> bodies [{}, {})",
        path.display(),
        source_range.start,
        source_range.end
    );

    Ok(ModelDescriptor { source_range })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_descriptor(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn parses_two_element_range() {
        let file = write_descriptor(r#"{ "source_range": [3, 12] }"#);
        let descriptor = read_model_descriptor(file.path()).unwrap();
        assert_eq!(descriptor.source_range, SourceRange { start: 3, end: 12 });
        assert_eq!(descriptor.source_range.len(), 9);
    }

    #[test]
    fn ignores_trailing_range_elements() {
        let file = write_descriptor(r#"{ "source_range": [0, 4, 99] }"#);
        let descriptor = read_model_descriptor(file.path()).unwrap();
        assert_eq!(descriptor.source_range, SourceRange { start: 0, end: 4 });
    }

    #[test]
    fn rejects_single_element_range() {
        let file = write_descriptor(r#"{ "source_range": [7] }"#);
        let err = read_model_descriptor(file.path()).unwrap_err();
        assert!(matches!(err, ModelError::InvalidDescriptor { .. }));
    }

    #[test]
    fn rejects_empty_range() {
        let file = write_descriptor(r#"{ "source_range": [5, 5] }"#);
        let err = read_model_descriptor(file.path()).unwrap_err();
        assert!(matches!(
            err,
            ModelError::InvalidSourceRange { start: 5, end: 5 }
        ));
    }

    #[test]
    fn rejects_inverted_range() {
        let err = SourceRange::new(10, 2).unwrap_err();
        assert!(matches!(
            err,
            ModelError::InvalidSourceRange { start: 10, end: 2 }
        ));
    }

    #[test]
    fn rejects_missing_file() {
        let err = read_model_descriptor(Path::new("/nonexistent/model.json")).unwrap_err();
        assert!(matches!(err, ModelError::InvalidDescriptor { .. }));
    }

    #[test]
    fn rejects_malformed_json() {
        let file = write_descriptor(r#"{ "source_range": "#);
        let err = read_model_descriptor(file.path()).unwrap_err();
        assert!(matches!(err, ModelError::InvalidDescriptor { .. }));
    }
}
