//! # IR Rewrite Passes
//!
//! Whole-batch passes run before code generation:
//! - Record layout check
//! - Member-function-pointer canonicalization
//! - Variable reference check

use super::ir::CompilationUnit;
use super::pmf::{self, PmfStats};
use crate::Result;

/// Runs the rewrite passes over a batch of units
pub struct PassRunner {
    rewrite_pmf: bool,
}

impl PassRunner {
    pub fn new(rewrite_pmf: bool) -> Self {
        Self { rewrite_pmf }
    }

    /// Run all passes. Stops at the first unit that fails a check.
    pub fn run(&mut self, units: &mut [CompilationUnit]) -> Result<PmfStats> {
        self.check_layouts(units)?;

        let stats = if self.rewrite_pmf {
            pmf::rewrite_units(units)?
        } else {
            PmfStats::default()
        };

        // The rewrites add and retarget references, so check afterwards
        self.verify_references(units)?;

        tracing::info!(
            "Rewrite passes done: {} units, {} PMF records, {} statements changed",
            units.len(),
            stats.records,
            stats.total()
        );
        Ok(stats)
    }

    fn check_layouts(&self, units: &[CompilationUnit]) -> Result<()> {
        for unit in units {
            for record in &unit.record_types {
                record.check_layout(&unit.record_types)?;
            }
        }
        Ok(())
    }

    fn verify_references(&self, units: &[CompilationUnit]) -> Result<()> {
        for unit in units {
            for function in &unit.functions {
                function.verify_references(&unit.global_variables)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ir::{
        GimpleBasicBlock, GimpleExpr, GimpleFunction, GimpleStatement, GimpleType, RecordField,
        RecordTypeDef,
    };
    use crate::Error;

    fn pmf_unit() -> CompilationUnit {
        let mut unit = CompilationUnit::new("pmf.cc");
        unit.record_types.push(RecordTypeDef::new(
            "pmf",
            vec![
                RecordField::new(
                    pmf::PFN_FIELD,
                    GimpleType::pointer_to(GimpleType::function(GimpleType::Void, vec![])),
                    0,
                ),
                RecordField::new(pmf::DELTA_FIELD, GimpleType::int(32), 4),
            ],
            8,
        ));
        unit
    }

    #[test]
    fn test_pmf_pass_can_be_disabled() {
        let mut units = vec![pmf_unit()];
        let stats = PassRunner::new(false).run(&mut units).unwrap();
        assert_eq!(stats, PmfStats::default());
        assert_eq!(units[0].record_types[0].fields.len(), 2);

        let stats = PassRunner::new(true).run(&mut units).unwrap();
        assert_eq!(stats.records, 1);
        assert_eq!(units[0].record_types[0].fields.len(), 3);
    }

    #[test]
    fn test_dangling_reference_is_rejected() {
        let mut unit = CompilationUnit::new("bad.c");
        let mut f = GimpleFunction::new(1, "f", GimpleType::int(32));
        f.basic_blocks.push(GimpleBasicBlock::new(
            2,
            vec![GimpleStatement::Return {
                value: Some(GimpleExpr::var(42, GimpleType::int(32))),
            }],
        ));
        unit.functions.push(f);
        let err = PassRunner::new(true).run(&mut [unit]).unwrap_err();
        assert!(matches!(err, Error::UnknownVariable { id: 42, .. }));
    }

    #[test]
    fn test_overlapping_layout_is_rejected() {
        let mut unit = CompilationUnit::new("bad.c");
        unit.record_types.push(RecordTypeDef::new(
            "s",
            vec![RecordField::new("x", GimpleType::int(64), 4)],
            8,
        ));
        assert!(PassRunner::new(true).run(&mut [unit]).is_err());
    }
}
