//! End-to-end compilation of GIMPLE JSON units, including linking between
//! separately compiled units through an output directory.

use gcc_bridge::compiler::codegen::jvm::InvokeKind;
use gcc_bridge::compiler::codegen::{Insn, JType};
use gcc_bridge::compiler::{CompilationUnit, CompileOptions, Compiler, GimpleParser};
use gcc_bridge::link::{ClassPath, LinkSymbol, SymbolKind, CLASS_MODEL_SUFFIX, SYMBOL_NAMESPACE};
use gcc_bridge::Error;
use serde_json::{json, Value};
use std::path::PathBuf;
use uuid::Uuid;

const PACKAGE: &str = "org/gccbridge/generated";

// =============================================================================
// UNIT BUILDERS
// =============================================================================

fn int() -> Value {
    json!({"kind": "integer", "bits": 32})
}

fn double() -> Value {
    json!({"kind": "real", "bits": 64})
}

fn var(id: i64, ty: Value) -> Value {
    json!({"expr": "variable_ref", "id": id, "type": ty})
}

fn function_ref(name: &str, ret: Value, params: Vec<Value>) -> Value {
    json!({
        "expr": "function_ref",
        "name": name,
        "type": {"kind": "function", "return_type": ret, "params": params}
    })
}

fn parse(unit: Value) -> CompilationUnit {
    GimpleParser::new().parse_str(&unit.to_string()).unwrap()
}

/// `int scale = 3; int add(int a, int b) { return a + b; }`
fn vecops_unit() -> Value {
    json!({
        "name": "vecops.c",
        "global_variables": [
            {"id": 1, "name": "scale", "type": int(), "public": true,
             "value": {"expr": "integer_const", "value": 3, "type": int()}}
        ],
        "functions": [{
            "id": 10,
            "name": "add",
            "return_type": int(),
            "parameters": [
                {"id": 11, "name": "a", "type": int()},
                {"id": 12, "name": "b", "type": int()}
            ],
            "variable_declarations": [{"id": 13, "type": int()}],
            "basic_blocks": [{"index": 2, "statements": [
                {"stmt": "assign", "op": "PLUS_EXPR", "lhs": var(13, int()),
                 "operands": [var(11, int()), var(12, int())]},
                {"stmt": "return", "value": var(13, int())}
            ]}]
        }]
    })
}

/// `extern int scale; int twice(int x) { int t = add(x, x); return t * scale; }`
fn main_unit() -> Value {
    json!({
        "name": "main.c",
        "global_variables": [
            {"id": 50, "name": "scale", "type": int(), "extern": true}
        ],
        "functions": [{
            "id": 20,
            "name": "twice",
            "return_type": int(),
            "parameters": [{"id": 21, "name": "x", "type": int()}],
            "variable_declarations": [
                {"id": 22, "name": "t", "type": int()},
                {"id": 23, "type": int()}
            ],
            "basic_blocks": [{"index": 2, "statements": [
                {"stmt": "call", "lhs": var(22, int()),
                 "function": function_ref("add", int(), vec![int(), int()]),
                 "arguments": [var(21, int()), var(21, int())]},
                {"stmt": "assign", "op": "MULT_EXPR", "lhs": var(23, int()),
                 "operands": [var(22, int()), var(50, int())]},
                {"stmt": "return", "value": var(23, int())}
            ]}]
        }]
    })
}

fn scratch_dir() -> PathBuf {
    std::env::temp_dir().join(format!("gcc-bridge-codegen-{}", Uuid::new_v4()))
}

fn invokes(insns: &[Insn], owner: &str, name: &str, descriptor: &str) -> bool {
    insns.iter().any(|insn| {
        matches!(insn, Insn::Invoke { kind: InvokeKind::Static, owner: o, name: n, descriptor: d }
            if o == owner && n == name && d == descriptor)
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[test]
fn test_batch_units_link_to_each_other() {
    let compiler = Compiler::new(CompileOptions::default());
    let result = compiler
        .compile(vec![parse(vecops_unit()), parse(main_unit())])
        .unwrap();

    assert_eq!(result.stats.units, 2);
    assert_eq!(result.stats.functions, 2);
    assert!(result.warnings.is_empty());

    let vecops = result.class("Vecops").unwrap();
    assert_eq!(vecops.name, format!("{}/Vecops", PACKAGE));
    assert_eq!(vecops.method("add").unwrap().descriptor, "(II)I");
    assert_eq!(vecops.field("scale").unwrap().descriptor, "I");

    let twice = result.class("Main").unwrap().method("twice").unwrap();
    assert_eq!(twice.descriptor, "(I)I");
    let owner = format!("{}/Vecops", PACKAGE);
    assert!(invokes(&twice.insns, &owner, "add", "(II)I"));
    assert!(twice.insns.contains(&Insn::GetStatic {
        owner,
        name: "scale".to_string(),
        ty: JType::Int,
    }));

    let exported: Vec<(&str, SymbolKind)> = result
        .symbols
        .iter()
        .map(|s| (s.name.as_str(), s.kind))
        .collect();
    assert!(exported.contains(&("add", SymbolKind::Method)));
    assert!(exported.contains(&("scale", SymbolKind::Field)));
    assert!(exported.contains(&("twice", SymbolKind::Method)));
}

#[test]
fn test_separate_compilation_through_output_directory() {
    let dir = scratch_dir();
    let first = Compiler::new(CompileOptions {
        output_dir: Some(dir.clone()),
        ..Default::default()
    });
    first.compile(vec![parse(vecops_unit())]).unwrap();

    let class_path = dir.join(format!("{}/Vecops{}", PACKAGE, CLASS_MODEL_SUFFIX));
    assert!(class_path.is_file());
    assert!(dir.join(SYMBOL_NAMESPACE).join("add").is_file());
    assert!(dir.join(SYMBOL_NAMESPACE).join("scale").is_file());

    let mut classpath = ClassPath::new().with_math_library();
    classpath.add_root(&dir);
    let symbol = LinkSymbol::lookup(&classpath, "add").unwrap().unwrap();
    assert_eq!(symbol.load_method(&classpath).unwrap().descriptor, "(II)I");

    let second = Compiler::new(CompileOptions::default()).with_classpath(classpath);
    let result = second.compile(vec![parse(main_unit())]).unwrap();
    let twice = result.class("Main").unwrap().method("twice").unwrap();
    assert!(invokes(
        &twice.insns,
        &format!("{}/Vecops", PACKAGE),
        "add",
        "(II)I"
    ));

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_unresolved_call_fails_unless_errors_are_ignored() {
    let unit = main_unit();

    let strict = Compiler::new(CompileOptions::default());
    let err = strict.compile(vec![parse(unit.clone())]).unwrap_err();
    assert!(matches!(err, Error::UnresolvedSymbol(ref name) if name == "add"));

    let lenient = Compiler::new(CompileOptions {
        ignore_errors: true,
        ..Default::default()
    });
    let result = lenient.compile(vec![parse(unit)]).unwrap();
    assert_eq!(result.stats.stubs, 1);
    assert_eq!(result.warnings.len(), 1);
    let stub = result.class("Main").unwrap().method("twice").unwrap();
    assert_eq!(stub.descriptor, "(I)I");
    assert_eq!(stub.insns.last(), Some(&Insn::Throw));
}

#[test]
fn test_math_library_is_linked_by_default() {
    let unit = json!({
        "name": "hyp.c",
        "functions": [{
            "id": 1,
            "name": "root",
            "return_type": double(),
            "parameters": [{"id": 2, "name": "x", "type": double()}],
            "variable_declarations": [{"id": 3, "type": double()}],
            "basic_blocks": [{"index": 2, "statements": [
                {"stmt": "call", "lhs": var(3, double()),
                 "function": function_ref("sqrt", double(), vec![double()]),
                 "arguments": [var(2, double())]},
                {"stmt": "return", "value": var(3, double())}
            ]}]
        }]
    });
    let result = Compiler::new(CompileOptions::default())
        .compile(vec![parse(unit)])
        .unwrap();
    let root = result.class("Hyp").unwrap().method("root").unwrap();
    assert_eq!(root.descriptor, "(D)D");
    assert!(invokes(&root.insns, "java/lang/Math", "sqrt", "(D)D"));
}

#[test]
fn test_compile_files_reads_json_from_disk() {
    let dir = scratch_dir();
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("vecops.c.gimple.json");
    std::fs::write(&path, vecops_unit().to_string()).unwrap();

    let compiler = Compiler::new(CompileOptions {
        package_name: "com/acme".to_string(),
        ..Default::default()
    });
    let result = compiler.compile_files(&[&path]).unwrap();
    assert_eq!(result.classes[0].name, "com/acme/Vecops");

    let missing = compiler.compile_files(&[dir.join("absent.json")]);
    assert!(matches!(missing, Err(Error::Io { .. })));

    std::fs::remove_dir_all(&dir).unwrap();
}

/// `struct flags { char c; int b : 3; };` alongside `add`, plus a function
/// reading `f->b`
fn bit_field_unit() -> Value {
    let flags = json!({"kind": "record", "name": "flags"});
    let flags_ptr = json!({"kind": "pointer", "base": flags});
    let mut unit = vecops_unit();
    unit["name"] = json!("flags.c");
    unit["record_types"] = json!([{
        "name": "flags",
        "fields": [
            {"name": "c", "type": {"kind": "integer", "bits": 8}, "offset": 0},
            {"name": "b", "type": int(), "offset": 1, "bit_size": 3}
        ],
        "size": 4
    }]);
    unit["functions"].as_array_mut().unwrap().push(json!({
        "id": 30,
        "name": "get_b",
        "return_type": int(),
        "parameters": [{"id": 31, "name": "f", "type": flags_ptr}],
        "variable_declarations": [{"id": 32, "type": int()}],
        "basic_blocks": [{"index": 2, "statements": [
            {"stmt": "assign", "op": "COMPONENT_REF", "lhs": var(32, int()),
             "operands": [{
                "expr": "component",
                "member": "b",
                "type": int(),
                "value": {"expr": "mem_ref", "pointer": var(31, flags_ptr), "type": flags}
             }]},
            {"stmt": "return", "value": var(32, int())}
        ]}]
    }));
    unit
}

#[test]
fn test_bit_field_record_only_fails_the_function_using_it() {
    let strict = Compiler::new(CompileOptions::default());
    let err = strict.compile(vec![parse(bit_field_unit())]).unwrap_err();
    assert!(matches!(err, Error::NotSupported(_)));

    let lenient = Compiler::new(CompileOptions {
        ignore_errors: true,
        ..Default::default()
    });
    let result = lenient.compile(vec![parse(bit_field_unit())]).unwrap();
    assert_eq!(result.stats.stubs, 1);
    let class = result.class("Flags").unwrap();
    assert_eq!(class.method("add").unwrap().descriptor, "(II)I");
    assert_eq!(class.method("get_b").unwrap().insns.last(), Some(&Insn::Throw));
}
