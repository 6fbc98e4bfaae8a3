//! Reads JSON-encoded compilation units emitted by the GCC front end

use super::program::{CompilationUnit, UnitId};
use crate::{Error, Result};
use std::path::Path;

/// Parses compilation units and numbers them in the order they are read.
///
/// Every parsed unit has its functions and globals attached (back-references
/// set, globals flagged) before it is returned.
#[derive(Debug, Default)]
pub struct GimpleParser {
    next_unit: usize,
}

impl GimpleParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a unit from a JSON document
    pub fn parse_str(&mut self, json: &str) -> Result<CompilationUnit> {
        let mut unit: CompilationUnit = serde_json::from_str(json)?;
        unit.attach(UnitId(self.next_unit));
        self.next_unit += 1;
        tracing::debug!(
            "Parsed unit {} ({} functions, {} globals, {} records)",
            unit.name,
            unit.functions.len(),
            unit.global_variables.len(),
            unit.record_types.len()
        );
        Ok(unit)
    }

    /// Parses a unit from a JSON file. The unit is named after the file when
    /// the document does not name it.
    pub fn parse_file(&mut self, path: &Path) -> Result<CompilationUnit> {
        let json = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let mut unit = self.parse_str(&json)?;
        if unit.name.is_empty() {
            unit.name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
        }
        Ok(unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNIT: &str = r#"{
        "name": "counter.c",
        "global_variables": [
            {"id": 1, "name": "count", "type": {"kind": "integer", "bits": 32}}
        ],
        "functions": [
            {"id": 2, "name": "next", "return_type": {"kind": "integer", "bits": 32},
             "basic_blocks": [{"index": 2, "statements": [
                {"stmt": "return", "value": {"expr": "variable_ref", "id": 1,
                                             "type": {"kind": "integer", "bits": 32}}}
             ]}]}
        ]
    }"#;

    #[test]
    fn test_parse_sets_back_references() {
        let mut parser = GimpleParser::new();
        let first = parser.parse_str(UNIT).unwrap();
        let second = parser.parse_str(UNIT).unwrap();
        assert_eq!(first.functions[0].unit, Some(UnitId(0)));
        assert_eq!(second.global_variables[0].unit, Some(UnitId(1)));
        assert!(first.global_variables[0].global);
        assert!(first.functions[0].is_public);
    }

    #[test]
    fn test_malformed_json_is_json_error() {
        let mut parser = GimpleParser::new();
        assert!(matches!(parser.parse_str("{"), Err(Error::Json(_))));
    }
}
