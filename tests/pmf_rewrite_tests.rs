//! Member-function-pointer rewrite, end to end over whole units

use gcc_bridge::compiler::ir::{
    int32, CompilationUnit, GimpleAssignment, GimpleBasicBlock, GimpleExpr, GimpleFunction,
    GimpleOp, GimpleStatement, GimpleType, GimpleVarDecl, RecordField, RecordTypeDef,
};
use gcc_bridge::compiler::pmf::{self, DELTA_FIELD, FLAG_FIELD, PFN_FIELD};
use gcc_bridge::compiler::{PassRunner, PmfStats};

const PMF: i64 = 1;
const FN_PTR_TEMP: i64 = 10;
const INT_TEMP: i64 = 11;

fn pfn_type() -> GimpleType {
    GimpleType::pointer_to(GimpleType::function(GimpleType::Void, vec![]))
}

fn pmf_type() -> GimpleType {
    GimpleType::record("pmf_t")
}

fn pfn_of_pmf() -> GimpleExpr {
    GimpleExpr::component(GimpleExpr::var(PMF, pmf_type()), PFN_FIELD, pfn_type())
}

fn assign(op: GimpleOp, lhs: GimpleExpr, operands: Vec<GimpleExpr>) -> GimpleStatement {
    GimpleStatement::Assign(GimpleAssignment::new(op, lhs, operands))
}

fn store_function_address() -> GimpleStatement {
    assign(
        GimpleOp::AddrExpr,
        pfn_of_pmf(),
        vec![GimpleExpr::address_of(GimpleExpr::function_ref(
            "_ZN1A3runEv",
            GimpleType::function(GimpleType::Void, vec![]),
        ))],
    )
}

fn store_slot_index(index: i64) -> GimpleStatement {
    assign(
        GimpleOp::IntegerCst,
        pfn_of_pmf(),
        vec![GimpleExpr::int(index, pfn_type())],
    )
}

fn read_and_narrow(narrow_to: GimpleType) -> Vec<GimpleStatement> {
    vec![
        assign(
            GimpleOp::ComponentRef,
            GimpleExpr::var(FN_PTR_TEMP, pfn_type()),
            vec![pfn_of_pmf()],
        ),
        assign(
            GimpleOp::NopExpr,
            GimpleExpr::var(INT_TEMP, narrow_to),
            vec![GimpleExpr::var(FN_PTR_TEMP, pfn_type())],
        ),
    ]
}

fn pmf_unit(statements: Vec<GimpleStatement>) -> CompilationUnit {
    let mut unit = CompilationUnit::new("member.cc");
    unit.record_types.push(RecordTypeDef::new(
        "pmf_t",
        vec![
            RecordField::new(PFN_FIELD, pfn_type(), 0),
            RecordField::new(DELTA_FIELD, int32(), 4),
        ],
        8,
    ));

    let mut f = GimpleFunction::new(100, "dispatch", GimpleType::Void);
    f.variable_declarations.push(GimpleVarDecl::new(PMF, pmf_type()));
    f.variable_declarations.push(GimpleVarDecl::new(FN_PTR_TEMP, pfn_type()));
    f.variable_declarations.push(GimpleVarDecl::new(INT_TEMP, int32()));
    f.basic_blocks.push(GimpleBasicBlock::new(2, statements));
    unit.functions.push(f);
    unit
}

fn body(unit: &CompilationUnit) -> &[GimpleStatement] {
    &unit.functions[0].basic_blocks[0].statements
}

#[test]
fn test_record_gains_flag_field() {
    let mut unit = pmf_unit(vec![]);
    let stats = pmf::rewrite_unit(&mut unit).unwrap();
    assert_eq!(stats.records, 1);

    let record = unit.record("pmf_t").unwrap();
    let names: Vec<&str> = record.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec![PFN_FIELD, DELTA_FIELD, FLAG_FIELD]);
    assert_eq!(record.field(FLAG_FIELD).unwrap().offset, 8);
    assert_eq!(record.field(FLAG_FIELD).unwrap().ty, int32());
    assert_eq!(record.size, 12);
}

#[test]
fn test_function_address_is_followed_by_flag_reset() {
    let mut unit = pmf_unit(vec![store_function_address(), GimpleStatement::Return { value: None }]);
    let stats = pmf::rewrite_unit(&mut unit).unwrap();
    assert_eq!(stats.flag_resets, 1);

    let stmts = body(&unit);
    assert_eq!(stmts.len(), 3);
    assert_eq!(stmts[0], store_function_address());
    let reset = stmts[1].as_assignment().unwrap();
    assert_eq!(reset.op, GimpleOp::IntegerCst);
    assert_eq!(
        reset.lhs,
        GimpleExpr::component(GimpleExpr::var(PMF, pmf_type()), FLAG_FIELD, int32())
    );
    assert_eq!(reset.operands, vec![GimpleExpr::int(0, int32())]);
    assert!(matches!(stmts[2], GimpleStatement::Return { value: None }));
}

#[test]
fn test_slot_index_moves_into_flag() {
    let mut unit = pmf_unit(vec![store_slot_index(9)]);
    let stats = pmf::rewrite_unit(&mut unit).unwrap();
    assert_eq!(stats.redirected, 1);
    assert_eq!(stats.flag_resets, 0);

    let stmts = body(&unit);
    assert_eq!(stmts.len(), 1);
    let store = stmts[0].as_assignment().unwrap();
    assert_eq!(
        store.lhs,
        GimpleExpr::component(GimpleExpr::var(PMF, pmf_type()), FLAG_FIELD, int32())
    );
    assert_eq!(store.operands, vec![GimpleExpr::int(9, int32())]);
}

#[test]
fn test_read_and_narrow_collapses_to_flag_read() {
    let mut unit = pmf_unit(read_and_narrow(int32()));
    let stats = pmf::rewrite_unit(&mut unit).unwrap();
    assert_eq!(stats.collapsed_uses, 1);

    let stmts = body(&unit);
    assert_eq!(stmts.len(), 1);
    let read = stmts[0].as_assignment().unwrap();
    assert_eq!(read.op, GimpleOp::ComponentRef);
    assert_eq!(read.lhs, GimpleExpr::var(INT_TEMP, int32()));
    assert_eq!(
        read.operands,
        vec![GimpleExpr::component(
            GimpleExpr::var(PMF, pmf_type()),
            FLAG_FIELD,
            int32()
        )]
    );
}

#[test]
fn test_near_miss_is_left_alone() {
    // narrowing to a 64-bit integer is not the front end's flag test
    let original = read_and_narrow(GimpleType::int(64));
    let mut unit = pmf_unit(original.clone());
    let stats = pmf::rewrite_unit(&mut unit).unwrap();
    assert_eq!(stats.collapsed_uses, 0);
    assert_eq!(body(&unit), original.as_slice());
}

#[test]
fn test_records_are_recognized_by_shape_not_name() {
    let mut unit = pmf_unit(vec![store_slot_index(9)]);
    // the shaped record is renamed, so `pmf_t` is now a lone function slot
    unit.record_types[0].name = "callback_pair".to_string();
    unit.record_types.push(RecordTypeDef::new(
        "pmf_t",
        vec![RecordField::new(PFN_FIELD, pfn_type(), 0)],
        4,
    ));
    let stmts_before = body(&unit).to_vec();

    let stats = pmf::rewrite_unit(&mut unit).unwrap();
    assert_eq!(stats.records, 1);
    assert_eq!(stats.total(), 0);
    assert_eq!(unit.record("callback_pair").unwrap().fields.len(), 3);
    assert_eq!(unit.record("pmf_t").unwrap().fields.len(), 1);
    assert_eq!(body(&unit), stmts_before.as_slice());
}

#[test]
fn test_pass_runner_rewrites_whole_batch() {
    let mut stmts = vec![store_function_address(), store_slot_index(5)];
    stmts.extend(read_and_narrow(int32()));
    let mut units = vec![pmf_unit(stmts), pmf_unit(vec![store_slot_index(3)])];

    let stats = PassRunner::new(true).run(&mut units).unwrap();
    assert_eq!(
        stats,
        PmfStats {
            records: 2,
            flag_resets: 1,
            redirected: 2,
            collapsed_uses: 1,
        }
    );
    assert_eq!(stats.total(), 4);
    // reset inserted, read pair collapsed
    assert_eq!(body(&units[0]).len(), 4);
}
