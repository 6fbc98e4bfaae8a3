//! Class and resource resolution used at link time

use super::symbol::LinkSymbol;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// `public` access flag
pub const ACC_PUBLIC: u16 = 0x0001;
/// `static` access flag
pub const ACC_STATIC: u16 = 0x0008;
/// `final` access flag
pub const ACC_FINAL: u16 = 0x0010;

/// Suffix of class models written by the compiler
pub const CLASS_MODEL_SUFFIX: &str = ".class.json";

/// A field or method of a resolved class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub name: String,
    pub descriptor: String,
    pub access: u16,
}

impl MemberInfo {
    pub fn new(name: impl Into<String>, descriptor: impl Into<String>, access: u16) -> Self {
        Self {
            name: name.into(),
            descriptor: descriptor.into(),
            access,
        }
    }

    pub fn is_public(&self) -> bool {
        self.access & ACC_PUBLIC != 0
    }

    pub fn is_static(&self) -> bool {
        self.access & ACC_STATIC != 0
    }
}

/// The members of a class, as far as linking is concerned.
///
/// Deserializes from a class model written by the compiler; instructions and
/// other details are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClassInfo {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<MemberInfo>,
    #[serde(default)]
    pub methods: Vec<MemberInfo>,
}

impl ClassInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_method(mut self, name: &str, descriptor: &str, access: u16) -> Self {
        self.methods.push(MemberInfo::new(name, descriptor, access));
        self
    }

    pub fn with_field(mut self, name: &str, descriptor: &str, access: u16) -> Self {
        self.fields.push(MemberInfo::new(name, descriptor, access));
        self
    }
}

/// Class-loading capability consumed by [`LinkSymbol`] lookups
pub trait ClassResolver {
    /// Reads a text resource such as a symbol record. `Ok(None)` if absent.
    fn read_resource(&self, path: &str) -> Result<Option<String>>;

    /// Resolves a class by internal name. `Ok(None)` if absent.
    fn resolve_class(&self, internal_name: &str) -> Result<Option<ClassInfo>>;
}

/// Search path of output directories plus in-memory registrations.
///
/// In-memory entries take precedence over directories; directories are
/// searched in the order they were added.
#[derive(Debug, Clone, Default)]
pub struct ClassPath {
    roots: Vec<PathBuf>,
    classes: HashMap<String, ClassInfo>,
    resources: HashMap<String, String>,
}

impl ClassPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an output directory previously written by the compiler
    pub fn add_root(&mut self, root: impl Into<PathBuf>) {
        self.roots.push(root.into());
    }

    pub fn add_class(&mut self, class: ClassInfo) {
        self.classes.insert(class.name.clone(), class);
    }

    /// Registers a symbol record as if it had been written to disk
    pub fn add_symbol(&mut self, symbol: &LinkSymbol) {
        self.resources
            .insert(symbol.metadata_name(), symbol.to_properties());
    }

    /// Registers the C math library, implemented by `java/lang/Math`
    pub fn add_math_library(&mut self) {
        const MATH: &str = "java/lang/Math";
        const UNARY: &[(&str, &str)] = &[
            ("sin", "sin"),
            ("cos", "cos"),
            ("tan", "tan"),
            ("sqrt", "sqrt"),
            ("exp", "exp"),
            ("log", "log"),
            ("fabs", "abs"),
            ("floor", "floor"),
            ("ceil", "ceil"),
        ];
        let access = ACC_PUBLIC | ACC_STATIC;
        let mut class = self
            .classes
            .remove(MATH)
            .unwrap_or_else(|| ClassInfo::new(MATH));
        for (symbol, method) in UNARY {
            class.methods.push(MemberInfo::new(*method, "(D)D", access));
            self.add_symbol(&LinkSymbol::for_function(*symbol, MATH, *method, "(D)D"));
        }
        class.methods.push(MemberInfo::new("pow", "(DD)D", access));
        self.add_symbol(&LinkSymbol::for_function("pow", MATH, "pow", "(DD)D"));
        self.add_class(class);
    }

    pub fn with_math_library(mut self) -> Self {
        self.add_math_library();
        self
    }

    fn read_file(path: &Path) -> Result<Option<String>> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(path, e)),
        }
    }
}

impl ClassResolver for ClassPath {
    fn read_resource(&self, path: &str) -> Result<Option<String>> {
        if let Some(text) = self.resources.get(path) {
            return Ok(Some(text.clone()));
        }
        for root in &self.roots {
            if let Some(text) = Self::read_file(&root.join(path))? {
                return Ok(Some(text));
            }
        }
        Ok(None)
    }

    fn resolve_class(&self, internal_name: &str) -> Result<Option<ClassInfo>> {
        if let Some(class) = self.classes.get(internal_name) {
            return Ok(Some(class.clone()));
        }
        let relative = format!("{}{}", internal_name, CLASS_MODEL_SUFFIX);
        match self.read_resource(&relative)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_math_library_links() {
        let classpath = ClassPath::new().with_math_library();
        let symbol = LinkSymbol::lookup(&classpath, "fabs").unwrap().unwrap();
        assert_eq!(symbol.member_name.as_deref(), Some("abs"));
        let method = symbol.load_method(&classpath).unwrap();
        assert_eq!(method.descriptor, "(D)D");
        assert!(LinkSymbol::lookup(&classpath, "printf").unwrap().is_none());
    }

    #[test]
    fn test_class_info_ignores_instructions() {
        let json = r#"{"name":"a/B","super_name":"java/lang/Object",
            "methods":[{"name":"f","descriptor":"()V","access":9,"insns":[]}]}"#;
        let info: ClassInfo = serde_json::from_str(json).unwrap();
        assert!(info.methods[0].is_static());
        assert!(info.fields.is_empty());
    }
}
