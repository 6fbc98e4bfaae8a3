//! Symbol records on disk and the checks made when binding to them

use gcc_bridge::link::{
    ClassInfo, ClassPath, LinkSymbol, SymbolKind, ACC_PUBLIC, ACC_STATIC, CLASS_MODEL_SUFFIX,
    SYMBOL_NAMESPACE,
};
use gcc_bridge::{Error, LinkError};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const OWNER: &str = "org/example/Vec";

fn scratch_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("gcc-bridge-link-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_class(root: &Path, class: &ClassInfo) {
    let path = root.join(format!("{}{}", class.name, CLASS_MODEL_SUFFIX));
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, serde_json::to_string(class).unwrap()).unwrap();
}

fn owner_class() -> ClassInfo {
    ClassInfo::new(OWNER)
        .with_method("vec_norm", "(Lorg/gccbridge/runtime/DoublePtr;I)D", ACC_PUBLIC | ACC_STATIC)
        .with_method("helper", "()V", ACC_STATIC)
        .with_method("instance_only", "()V", ACC_PUBLIC)
        .with_field("vec_count", "I", ACC_PUBLIC | ACC_STATIC)
}

fn classpath_with_owner() -> ClassPath {
    let mut classpath = ClassPath::new();
    classpath.add_class(owner_class());
    classpath
}

fn link_error(result: gcc_bridge::Result<impl std::fmt::Debug>) -> LinkError {
    match result {
        Err(Error::Link(e)) => e,
        other => panic!("expected a link error, got {:?}", other),
    }
}

#[test]
fn test_records_survive_properties_round_trip() {
    let symbols = vec![
        LinkSymbol::for_function("vec_norm", OWNER, "vec_norm", "(Lorg/gccbridge/runtime/DoublePtr;I)D"),
        LinkSymbol::for_global_variable("vec_count", OWNER),
        LinkSymbol::for_getter("errno", "org/example/Errno", "get_errno", "()I"),
        LinkSymbol::for_call_generator("__builtin_memcpy", "MemcpyGenerator"),
    ];
    for symbol in symbols {
        let text = symbol.to_properties();
        assert_eq!(LinkSymbol::from_properties(&symbol.name, &text).unwrap(), symbol);
    }
}

#[test]
fn test_properties_tolerate_comments_and_unknown_keys() {
    let text = "# written by hand\n!legacy\ntype=FIELD\nclass=a/B\nmember=x\nextra=ignored\n";
    let symbol = LinkSymbol::from_properties("x", text).unwrap();
    assert_eq!(symbol.kind, SymbolKind::Field);
    assert_eq!(symbol.member_name.as_deref(), Some("x"));
    assert!(symbol.descriptor.is_none());
}

#[test]
fn test_written_symbol_resolves_from_output_root() {
    let root = scratch_dir();
    let symbol = LinkSymbol::for_function(
        "vec_norm",
        OWNER,
        "vec_norm",
        "(Lorg/gccbridge/runtime/DoublePtr;I)D",
    );
    symbol.write(&root).unwrap();
    // writing again into the existing namespace is fine
    symbol.write(&root).unwrap();
    write_class(&root, &owner_class());
    assert!(root.join(SYMBOL_NAMESPACE).join("vec_norm").is_file());

    let mut classpath = ClassPath::new();
    classpath.add_root(&root);
    let found = LinkSymbol::lookup(&classpath, "vec_norm").unwrap().unwrap();
    assert_eq!(found, symbol);
    let method = found.load_method(&classpath).unwrap();
    assert_eq!(method.name, "vec_norm");
    assert!(method.is_public() && method.is_static());

    assert!(LinkSymbol::lookup(&classpath, "vec_dot").unwrap().is_none());
    std::fs::remove_dir_all(&root).unwrap();
}

#[test]
fn test_in_memory_entries_shadow_roots() {
    let root = scratch_dir();
    LinkSymbol::for_global_variable("vec_count", "org/example/Stale").write(&root).unwrap();

    let mut classpath = classpath_with_owner();
    classpath.add_root(&root);
    classpath.add_symbol(&LinkSymbol::for_global_variable("vec_count", OWNER));

    let found = LinkSymbol::lookup(&classpath, "vec_count").unwrap().unwrap();
    assert_eq!(found.class_name, OWNER);
    assert_eq!(found.load_field(&classpath).unwrap().descriptor, "I");
    std::fs::remove_dir_all(&root).unwrap();
}

#[test]
fn test_malformed_record_on_disk_is_an_error() {
    let root = scratch_dir();
    let path = root.join(SYMBOL_NAMESPACE).join("broken");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "type=TYPEDEF\nclass=a/B\n").unwrap();

    let mut classpath = ClassPath::new();
    classpath.add_root(&root);
    assert!(matches!(
        LinkSymbol::lookup(&classpath, "broken"),
        Err(Error::MalformedSymbol { .. })
    ));
    std::fs::remove_dir_all(&root).unwrap();
}

#[test]
fn test_missing_container() {
    let symbol = LinkSymbol::for_function("gone", "org/example/Gone", "gone", "()V");
    let err = link_error(symbol.load_method(&ClassPath::new()));
    assert!(matches!(err, LinkError::MissingContainer { ref class, .. } if class == "org/example/Gone"));
}

#[test]
fn test_missing_member_checks_descriptor() {
    let symbol = LinkSymbol::for_function("vec_norm", OWNER, "vec_norm", "()D");
    let err = link_error(symbol.load_method(&classpath_with_owner()));
    assert!(matches!(err, LinkError::MissingMember { ref descriptor, .. } if descriptor == "()D"));

    let field = LinkSymbol::for_global_variable("vec_total", OWNER);
    let err = link_error(field.load_field(&classpath_with_owner()));
    assert!(matches!(err, LinkError::MissingMember { ref member, .. } if member == "vec_total"));
}

#[test]
fn test_member_must_be_public_and_static() {
    let classpath = classpath_with_owner();

    let hidden = LinkSymbol::for_function("helper", OWNER, "helper", "()V");
    assert!(matches!(
        link_error(hidden.load_method(&classpath)),
        LinkError::NotPublic { .. }
    ));

    let instance = LinkSymbol::for_function("instance_only", OWNER, "instance_only", "()V");
    assert!(matches!(
        link_error(instance.load_method(&classpath)),
        LinkError::NotStatic { .. }
    ));
}

#[test]
fn test_wrong_kind() {
    let classpath = classpath_with_owner();
    let field = LinkSymbol::for_global_variable("vec_count", OWNER);
    let err = link_error(field.load_method(&classpath));
    assert!(matches!(err, LinkError::WrongKind { ref expected, ref found, .. }
        if expected == "method" && found == "FIELD"));

    let generator = LinkSymbol::for_call_generator("memcpy", "MemcpyGenerator");
    assert!(matches!(
        link_error(generator.load_field(&classpath)),
        LinkError::WrongKind { .. }
    ));
}

#[test]
fn test_symbol_names_stay_inside_namespace() {
    let root = scratch_dir();
    for name in ["../escape", "a/b", "..", ""] {
        let symbol = LinkSymbol::for_global_variable(name, OWNER);
        assert!(matches!(
            symbol.write(&root),
            Err(Error::MalformedSymbol { .. })
        ));
        let mut classpath = ClassPath::new();
        classpath.add_root(&root);
        assert!(matches!(
            LinkSymbol::lookup(&classpath, name),
            Err(Error::MalformedSymbol { .. })
        ));
    }
    assert!(!root.join("META-INF/gcc-bridge/escape").exists());

    // dots inside a name are fine
    let clone = LinkSymbol::for_function("vec_norm.constprop.0", OWNER, "vec_norm", "()D");
    clone.write(&root).unwrap();
    assert!(root.join(SYMBOL_NAMESPACE).join("vec_norm.constprop.0").is_file());
    std::fs::remove_dir_all(&root).unwrap();
}
