use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gcc_bridge::compiler::{CompileOptions, Compiler, GimpleParser};
use gcc_bridge::runtime::{BytePtr, DoublePtr, IntPtr, MixedPtr, Pointer, Ptr};

const BYTES: i32 = 4096;

fn aligned_access_benchmark(c: &mut Criterion) {
    let ints = Pointer::new(IntPtr::malloc(BYTES));

    c.bench_function("int store/load aligned", |b| {
        b.iter(|| {
            let mut sum = 0i32;
            for offset in (0..BYTES).step_by(4) {
                ints.set_int(offset, black_box(offset));
                sum = sum.wrapping_add(ints.get_int(offset));
            }
            sum
        })
    });

    let doubles = Pointer::new(DoublePtr::malloc(BYTES));
    c.bench_function("double store/load aligned", |b| {
        b.iter(|| {
            let mut sum = 0.0;
            for offset in (0..BYTES).step_by(8) {
                doubles.set_double(offset, black_box(offset as f64));
                sum += doubles.get_double(offset);
            }
            sum
        })
    });
}

fn misaligned_access_benchmark(c: &mut Criterion) {
    let ints = Pointer::new(IntPtr::malloc(BYTES + 4)).pointer_plus(1);

    c.bench_function("int store/load misaligned", |b| {
        b.iter(|| {
            let mut sum = 0i32;
            for offset in (0..BYTES).step_by(4) {
                ints.set_int(offset, black_box(offset));
                sum = sum.wrapping_add(ints.get_int(offset));
            }
            sum
        })
    });

    let bytes = Pointer::new(BytePtr::malloc(BYTES));
    c.bench_function("int store/load through byte region", |b| {
        b.iter(|| {
            let mut sum = 0i32;
            for offset in (0..BYTES).step_by(4) {
                bytes.set_int(offset, black_box(offset));
                sum = sum.wrapping_add(bytes.get_int(offset));
            }
            sum
        })
    });
}

fn bulk_benchmark(c: &mut Criterion) {
    let source = Pointer::new(MixedPtr::malloc(BYTES));
    let target = Pointer::new(DoublePtr::malloc(BYTES));

    c.bench_function("memcpy mixed to double", |b| {
        b.iter(|| target.memcpy(black_box(&*source), BYTES))
    });

    let region = Pointer::new(IntPtr::malloc(BYTES));
    c.bench_function("memmove overlapping", |b| {
        b.iter(|| region.pointer_plus(4).memmove(black_box(&*region), BYTES - 4))
    });
}

fn compile_benchmark(c: &mut Criterion) {
    let json = r#"{
        "name": "add.c",
        "functions": [{
            "id": 1,
            "name": "add",
            "return_type": {"kind": "integer", "bits": 32},
            "parameters": [
                {"id": 2, "name": "a", "type": {"kind": "integer", "bits": 32}},
                {"id": 3, "name": "b", "type": {"kind": "integer", "bits": 32}}
            ],
            "variable_declarations": [{"id": 4, "type": {"kind": "integer", "bits": 32}}],
            "basic_blocks": [{"index": 2, "statements": [
                {"stmt": "assign", "op": "PLUS_EXPR",
                 "lhs": {"expr": "variable_ref", "id": 4, "type": {"kind": "integer", "bits": 32}},
                 "operands": [
                    {"expr": "variable_ref", "id": 2, "type": {"kind": "integer", "bits": 32}},
                    {"expr": "variable_ref", "id": 3, "type": {"kind": "integer", "bits": 32}}
                 ]},
                {"stmt": "return",
                 "value": {"expr": "variable_ref", "id": 4, "type": {"kind": "integer", "bits": 32}}}
            ]}]
        }]
    }"#;
    let compiler = Compiler::new(CompileOptions::default());

    c.bench_function("parse and compile small unit", |b| {
        b.iter(|| {
            let unit = GimpleParser::new().parse_str(black_box(json)).unwrap();
            compiler.compile(vec![unit]).unwrap()
        })
    });
}

criterion_group!(
    benches,
    aligned_access_benchmark,
    misaligned_access_benchmark,
    bulk_benchmark,
    compile_benchmark
);
criterion_main!(benches);
