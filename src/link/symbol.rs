//! Named cross-unit bindings and their metadata records.

use super::classpath::{ClassResolver, MemberInfo};
use crate::error::LinkError;
use crate::{Error, Result};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Directory, relative to an output root, holding one record per exported symbol
pub const SYMBOL_NAMESPACE: &str = "META-INF/gcc-bridge/symbols/";

/// Symbol names become file names under [`SYMBOL_NAMESPACE`], so they must
/// stay a single path component
fn check_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() || name == "." || name == ".." {
        "not a usable file name"
    } else if name.contains(['/', '\\', '\0']) {
        "contains a path separator or NUL"
    } else {
        return Ok(());
    };
    Err(Error::MalformedSymbol {
        name: name.to_string(),
        reason: reason.to_string(),
    })
}

/// What a symbol refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    /// A static field
    Field,
    /// A static method
    Method,
    /// A static method giving read-only access to a global
    Getter,
    /// A built-in call generator, named by the record's class
    CallGenerator,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Field => "FIELD",
            SymbolKind::Method => "METHOD",
            SymbolKind::Getter => "GETTER",
            SymbolKind::CallGenerator => "CALL_GENERATOR",
        }
    }

    fn has_member(&self) -> bool {
        !matches!(self, SymbolKind::CallGenerator)
    }

    fn has_descriptor(&self) -> bool {
        matches!(self, SymbolKind::Method | SymbolKind::Getter)
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SymbolKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "FIELD" => Ok(SymbolKind::Field),
            "METHOD" => Ok(SymbolKind::Method),
            "GETTER" => Ok(SymbolKind::Getter),
            "CALL_GENERATOR" => Ok(SymbolKind::CallGenerator),
            other => Err(format!("unknown symbol type '{}'", other)),
        }
    }
}

/// A named function or global variable exported by a compiled unit.
///
/// Compiling a unit writes one flat `key=value` record per exported symbol
/// under [`SYMBOL_NAMESPACE`]. A later compilation, possibly in another
/// process, looks the record up by name and binds to the member it names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSymbol {
    pub name: String,
    pub kind: SymbolKind,
    /// Internal name of the declaring class
    pub class_name: String,
    pub member_name: Option<String>,
    /// Method descriptor, for methods and getters
    pub descriptor: Option<String>,
}

impl LinkSymbol {
    /// A function implemented by a static method
    pub fn for_function(
        name: impl Into<String>,
        class_name: impl Into<String>,
        member_name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: SymbolKind::Method,
            class_name: class_name.into(),
            member_name: Some(member_name.into()),
            descriptor: Some(descriptor.into()),
        }
    }

    /// A global variable held in a static field of the same name
    pub fn for_global_variable(name: impl Into<String>, class_name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            member_name: Some(name.clone()),
            name,
            kind: SymbolKind::Field,
            class_name: class_name.into(),
            descriptor: None,
        }
    }

    /// A read-only global exposed through a static accessor method
    pub fn for_getter(
        name: impl Into<String>,
        class_name: impl Into<String>,
        method_name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: SymbolKind::Getter,
            class_name: class_name.into(),
            member_name: Some(method_name.into()),
            descriptor: Some(descriptor.into()),
        }
    }

    /// A function whose calls are expanded by the named built-in generator
    pub fn for_call_generator(name: impl Into<String>, generator: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SymbolKind::CallGenerator,
            class_name: generator.into(),
            member_name: None,
            descriptor: None,
        }
    }

    /// Path of a symbol's record relative to an output root
    pub fn metadata_path(name: &str) -> String {
        format!("{}{}", SYMBOL_NAMESPACE, name)
    }

    pub fn metadata_name(&self) -> String {
        Self::metadata_path(&self.name)
    }

    /// Renders the flat record. `member` is present for fields, methods and
    /// getters; `descriptor` only for methods and getters.
    pub fn to_properties(&self) -> String {
        let mut properties = format!("type={}\nclass={}\n", self.kind, self.class_name);
        if self.kind.has_member() {
            properties.push_str(&format!(
                "member={}\n",
                self.member_name.as_deref().unwrap_or_default()
            ));
        }
        if self.kind.has_descriptor() {
            properties.push_str(&format!(
                "descriptor={}\n",
                self.descriptor.as_deref().unwrap_or_default()
            ));
        }
        properties
    }

    /// Parses a record written by [`LinkSymbol::to_properties`]
    pub fn from_properties(name: &str, text: &str) -> Result<Self> {
        let malformed = |reason: String| Error::MalformedSymbol {
            name: name.to_string(),
            reason,
        };

        let mut kind = None;
        let mut class_name = None;
        let mut member_name = None;
        let mut descriptor = None;
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| malformed(format!("expected key=value, found '{}'", line)))?;
            let value = value.trim().to_string();
            match key.trim() {
                "type" => kind = Some(value.parse::<SymbolKind>().map_err(malformed)?),
                "class" => class_name = Some(value),
                "member" => member_name = Some(value),
                "descriptor" => descriptor = Some(value),
                _ => {}
            }
        }

        let kind = kind.ok_or_else(|| malformed("missing 'type'".to_string()))?;
        let class_name = class_name.ok_or_else(|| malformed("missing 'class'".to_string()))?;
        if kind.has_member() && member_name.is_none() {
            return Err(malformed("missing 'member'".to_string()));
        }
        if kind.has_descriptor() && descriptor.is_none() {
            return Err(malformed("missing 'descriptor'".to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            kind,
            class_name,
            member_name: member_name.filter(|_| kind.has_member()),
            descriptor: descriptor.filter(|_| kind.has_descriptor()),
        })
    }

    /// Writes the record under `output_dir`, creating directories as needed.
    /// Existing directories are not an error.
    pub fn write(&self, output_dir: &Path) -> Result<()> {
        check_name(&self.name)?;
        let path = output_dir.join(self.metadata_name());
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        std::fs::write(&path, self.to_properties()).map_err(|e| Error::io(&path, e))?;
        tracing::debug!("Wrote symbol {} to {}", self.name, path.display());
        Ok(())
    }

    /// Finds the record for `name`. A missing record is `Ok(None)`; a record
    /// that exists but cannot be parsed is an error.
    pub fn lookup(resolver: &dyn ClassResolver, name: &str) -> Result<Option<LinkSymbol>> {
        check_name(name)?;
        match resolver.read_resource(&Self::metadata_path(name))? {
            Some(text) => Self::from_properties(name, &text).map(Some),
            None => Ok(None),
        }
    }

    /// Binds a method or getter symbol to its public static method
    pub fn load_method(&self, resolver: &dyn ClassResolver) -> Result<MemberInfo> {
        if !matches!(self.kind, SymbolKind::Method | SymbolKind::Getter) {
            return Err(self.wrong_kind("method"));
        }
        let member = self.member_name.clone().unwrap_or_default();
        let descriptor = self.descriptor.clone().unwrap_or_default();
        let owner = self.load_class(resolver)?;
        let method = owner
            .methods
            .iter()
            .find(|m| m.name == member && m.descriptor == descriptor)
            .ok_or_else(|| LinkError::MissingMember {
                symbol: self.name.clone(),
                class: self.class_name.clone(),
                member: member.clone(),
                descriptor: descriptor.clone(),
            })?;
        self.check_public_static(method, "method")?;
        Ok(method.clone())
    }

    /// Binds a field symbol to its public static field
    pub fn load_field(&self, resolver: &dyn ClassResolver) -> Result<MemberInfo> {
        if self.kind != SymbolKind::Field {
            return Err(self.wrong_kind("field"));
        }
        let member = self.member_name.clone().unwrap_or_default();
        let owner = self.load_class(resolver)?;
        let field = owner
            .fields
            .iter()
            .find(|f| f.name == member)
            .ok_or_else(|| LinkError::MissingMember {
                symbol: self.name.clone(),
                class: self.class_name.clone(),
                member: member.clone(),
                descriptor: String::new(),
            })?;
        self.check_public_static(field, "field")?;
        Ok(field.clone())
    }

    fn load_class(&self, resolver: &dyn ClassResolver) -> Result<super::classpath::ClassInfo> {
        resolver.resolve_class(&self.class_name)?.ok_or_else(|| {
            LinkError::MissingContainer {
                symbol: self.name.clone(),
                class: self.class_name.clone(),
            }
            .into()
        })
    }

    fn check_public_static(&self, member: &MemberInfo, what: &str) -> Result<()> {
        let description = format!("{} {}.{}", what, self.class_name, member.name);
        if !member.is_public() {
            return Err(LinkError::NotPublic {
                symbol: self.name.clone(),
                member: description,
            }
            .into());
        }
        if !member.is_static() {
            return Err(LinkError::NotStatic {
                symbol: self.name.clone(),
                member: description,
            }
            .into());
        }
        Ok(())
    }

    fn wrong_kind(&self, expected: &str) -> Error {
        LinkError::WrongKind {
            symbol: self.name.clone(),
            expected: expected.to_string(),
            found: self.kind.to_string(),
        }
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_properties() {
        let symbol = LinkSymbol::for_function("sum", "org/x/Sums", "sum", "(II)I");
        assert_eq!(
            symbol.to_properties(),
            "type=METHOD\nclass=org/x/Sums\nmember=sum\ndescriptor=(II)I\n"
        );
        assert_eq!(symbol.metadata_name(), "META-INF/gcc-bridge/symbols/sum");
    }

    #[test]
    fn test_field_has_no_descriptor() {
        let symbol = LinkSymbol::for_global_variable("errno", "org/x/Libc");
        let text = symbol.to_properties();
        assert!(!text.contains("descriptor"));
        assert_eq!(LinkSymbol::from_properties("errno", &text).unwrap(), symbol);
    }

    #[test]
    fn test_call_generator_has_no_member() {
        let symbol = LinkSymbol::for_call_generator("xmalloc", "malloc");
        assert_eq!(symbol.to_properties(), "type=CALL_GENERATOR\nclass=malloc\n");
    }

    #[test]
    fn test_malformed_records() {
        assert!(matches!(
            LinkSymbol::from_properties("f", "class=a/B\n"),
            Err(Error::MalformedSymbol { .. })
        ));
        assert!(LinkSymbol::from_properties("f", "type=BOGUS\nclass=a/B\n").is_err());
        assert!(LinkSymbol::from_properties("f", "type=METHOD\nclass=a/B\nmember=f\n").is_err());
    }
}
