//! Pointer-to-member-function canonicalization.
//!
//! g++ lowers a pointer to member function into a record `{ __pfn, __delta }`
//! and overloads `__pfn`: either it holds a function pointer, or, for virtual
//! members, an integer with the low bit set that encodes a vtable slot. A
//! managed function reference has no bits to tag, so this pass moves the
//! discriminant into a synthetic integer field, `__pfn$flag`.
//!
//! The front end emits the PMF boilerplate in a fixed shape. Only exact
//! matches of that shape are rewritten; anything else is left alone.

use super::ir::{
    int32, CompilationUnit, GimpleAssignment, GimpleExpr, GimpleFunction, GimpleOp,
    GimpleStatement, GimpleType, RecordTypeDef,
};
use crate::Result;
use std::collections::HashSet;

/// Function pointer slot of a PMF record
pub const PFN_FIELD: &str = "__pfn";
/// `this` adjustment of a PMF record
pub const DELTA_FIELD: &str = "__delta";
/// Synthetic discriminant appended to PMF records
pub const FLAG_FIELD: &str = "__pfn$flag";

/// Counts of what the pass changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PmfStats {
    /// Record definitions that received the flag field
    pub records: usize,
    /// `__pfn = &fn` assignments followed by a flag reset
    pub flag_resets: usize,
    /// `__pfn = const` assignments redirected to the flag
    pub redirected: usize,
    /// Read-and-narrow sequences collapsed to a flag read
    pub collapsed_uses: usize,
}

impl PmfStats {
    pub fn total(&self) -> usize {
        self.flag_resets + self.redirected + self.collapsed_uses
    }

    fn add(&mut self, other: PmfStats) {
        self.records += other.records;
        self.flag_resets += other.flag_resets;
        self.redirected += other.redirected;
        self.collapsed_uses += other.collapsed_uses;
    }
}

/// True iff the record is exactly `{ __pfn: fn*, __delta: int32 }`
pub fn is_pmf_record(record: &RecordTypeDef) -> bool {
    match record.fields.as_slice() {
        [pfn, delta] => {
            pfn.name == PFN_FIELD
                && pfn.ty.is_function_pointer()
                && delta.name == DELTA_FIELD
                && delta.ty == int32()
        }
        _ => false,
    }
}

/// Rewrites every unit in the batch
pub fn rewrite_units(units: &mut [CompilationUnit]) -> Result<PmfStats> {
    let mut stats = PmfStats::default();
    for unit in units.iter_mut() {
        stats.add(rewrite_unit(unit)?);
    }
    Ok(stats)
}

/// Rewrites one unit.
///
/// PMF records are identified against the unmodified record list first and
/// only then extended. Function bodies are not visited at all when the unit
/// has no PMF record.
pub fn rewrite_unit(unit: &mut CompilationUnit) -> Result<PmfStats> {
    let pmf_records: HashSet<String> = unit
        .record_types
        .iter()
        .filter(|r| is_pmf_record(r))
        .map(|r| r.name.clone())
        .collect();

    let mut stats = PmfStats::default();
    if pmf_records.is_empty() {
        return Ok(stats);
    }

    for record in unit.record_types.iter_mut() {
        if pmf_records.contains(&record.name) {
            record.append_field(FLAG_FIELD, int32())?;
            stats.records += 1;
            tracing::debug!("Added {} to PMF record {}", FLAG_FIELD, record.name);
        }
    }

    for function in unit.functions.iter_mut() {
        stats.add(rewrite_function(function, &pmf_records));
    }
    Ok(stats)
}

fn rewrite_function(function: &mut GimpleFunction, pmf_records: &HashSet<String>) -> PmfStats {
    let mut stats = PmfStats::default();
    for block in function.basic_blocks.iter_mut() {
        let statements = &mut block.statements;
        let mut i = 0;
        while i < statements.len() {
            let mut flag_reset = None;
            if let GimpleStatement::Assign(assignment) = &mut statements[i] {
                if is_pfn_ref(&assignment.lhs, pmf_records) {
                    flag_reset = rewrite_assignment(assignment, &mut stats);
                }
            }
            if let Some(reset) = flag_reset {
                statements.insert(i + 1, reset);
                i += 2;
                continue;
            }
            if let Some(temp2) = match_invocation(statements, i, pmf_records) {
                collapse_invocation(statements, i, temp2);
                stats.collapsed_uses += 1;
                tracing::debug!("Collapsed PMF flag test in {}", function.name);
            }
            i += 1;
        }
    }
    stats
}

/// Handles `value.__pfn = ...`. Returns the statement to insert after it,
/// if any.
fn rewrite_assignment(
    assignment: &mut GimpleAssignment,
    stats: &mut PmfStats,
) -> Option<GimpleStatement> {
    if is_function_address(assignment) {
        // non-virtual target: keep the pointer, clear any stale flag
        let GimpleExpr::Component { value, .. } = &assignment.lhs else {
            return None;
        };
        stats.flag_resets += 1;
        return Some(GimpleStatement::Assign(GimpleAssignment::new(
            GimpleOp::IntegerCst,
            GimpleExpr::component((**value).clone(), FLAG_FIELD, int32()),
            vec![GimpleExpr::int(0, int32())],
        )));
    }

    if assignment.op == GimpleOp::IntegerCst {
        // virtual target: the tagged slot index moves into the flag
        if let GimpleExpr::Component { member, ty, .. } = &mut assignment.lhs {
            *member = FLAG_FIELD.to_string();
            *ty = int32();
        }
        if let Some(constant) = assignment.operands.first_mut() {
            constant.set_type(int32());
        }
        stats.redirected += 1;
    }
    None
}

/// Matches
///
/// ```text
/// s0: t1 = value.__pfn
/// s1: t2 = (int32) t1
/// ```
///
/// and returns `t2`.
fn match_invocation(
    statements: &[GimpleStatement],
    i: usize,
    pmf_records: &HashSet<String>,
) -> Option<GimpleExpr> {
    let s0 = statements.get(i)?.as_assignment()?;
    if s0.op != GimpleOp::ComponentRef || !is_pfn_ref(s0.operands.first()?, pmf_records) {
        return None;
    }
    let temp1 = &s0.lhs;
    if !matches!(temp1, GimpleExpr::VariableRef { .. }) {
        return None;
    }
    let s1 = statements.get(i + 1)?.as_assignment()?;
    if s1.op != GimpleOp::NopExpr || s1.operands.first()? != temp1 {
        return None;
    }
    match &s1.lhs {
        GimpleExpr::VariableRef { ty, .. } if *ty == int32() => Some(s1.lhs.clone()),
        _ => None,
    }
}

fn collapse_invocation(statements: &mut Vec<GimpleStatement>, i: usize, temp2: GimpleExpr) {
    if let GimpleStatement::Assign(s0) = &mut statements[i] {
        if let Some(GimpleExpr::Component { member, ty, .. }) = s0.operands.first_mut() {
            *member = FLAG_FIELD.to_string();
            *ty = int32();
        }
        s0.lhs = temp2;
    }
    statements.remove(i + 1);
}

fn is_function_address(assignment: &GimpleAssignment) -> bool {
    assignment.op == GimpleOp::AddrExpr
        && matches!(
            assignment.operands.first(),
            Some(GimpleExpr::AddressOf { value, .. })
                if matches!(**value, GimpleExpr::FunctionRef { .. })
        )
}

/// `value.__pfn` where `value` is one of the PMF records.
///
/// Matching on the member name and type alone is not enough: the rewrite
/// retargets the access to `__pfn$flag`, which only PMF-shaped records get.
/// A `__pfn` member of any other record has nothing to redirect to.
fn is_pfn_ref(expr: &GimpleExpr, pmf_records: &HashSet<String>) -> bool {
    match expr {
        GimpleExpr::Component { value, member, ty } => {
            member == PFN_FIELD
                && ty.is_function_pointer()
                && matches!(value.ty(), GimpleType::Record { name } if pmf_records.contains(name))
        }
        _ => false,
    }
}
