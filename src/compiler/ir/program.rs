//! Compilation units, functions, and variable declarations

use super::expr::GimpleExpr;
use super::statement::GimpleStatement;
use super::types::{GimpleType, RecordTypeDef};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// First id handed out to variables synthesized by passes
pub const SYNTHETIC_VAR_BASE_ID: i64 = 1000;

/// Non-owning back-reference from a function or global to its unit: the
/// unit's index within the batch being compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitId(pub usize);

/// Basic block in the control flow graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GimpleBasicBlock {
    /// Block number, used as the target of gotos and conditionals
    pub index: i32,
    /// Statements in execution order
    #[serde(default)]
    pub statements: Vec<GimpleStatement>,
}

impl GimpleBasicBlock {
    pub fn new(index: i32, statements: Vec<GimpleStatement>) -> Self {
        Self { index, statements }
    }
}

/// Declaration of a local or global variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GimpleVarDecl {
    /// Unique within the owning function (locals) or unit (globals)
    pub id: i64,
    /// Source name; temporaries may have none
    #[serde(default)]
    pub name: Option<String>,
    /// Linkage name of a global
    #[serde(default)]
    pub mangled_name: Option<String>,
    /// Declared type
    #[serde(rename = "type")]
    pub ty: GimpleType,
    /// Initializer
    #[serde(default)]
    pub value: Option<GimpleExpr>,
    /// The address of this variable is taken somewhere
    #[serde(default)]
    pub addressable: bool,
    /// Declared at unit level
    #[serde(default)]
    pub global: bool,
    #[serde(default, rename = "static")]
    pub is_static: bool,
    #[serde(default, rename = "extern")]
    pub is_extern: bool,
    #[serde(default)]
    pub weak: bool,
    #[serde(default, rename = "const")]
    pub is_const: bool,
    /// Visible outside the unit
    #[serde(default, rename = "public")]
    pub is_public: bool,
    /// Owning unit, set by the parser
    #[serde(skip)]
    pub unit: Option<UnitId>,
}

impl GimpleVarDecl {
    pub fn new(id: i64, ty: GimpleType) -> Self {
        Self {
            id,
            name: None,
            mangled_name: None,
            ty,
            value: None,
            addressable: false,
            global: false,
            is_static: false,
            is_extern: false,
            weak: false,
            is_const: false,
            is_public: false,
            unit: None,
        }
    }

    /// A name usable as a generated identifier
    pub fn safe_name(&self) -> String {
        match &self.name {
            Some(name) => name.replace('.', "$"),
            None => format!("T{}", self.id),
        }
    }

    /// Linkage name, falling back to the source name
    pub fn linkage_name(&self) -> String {
        self.mangled_name
            .clone()
            .unwrap_or_else(|| self.safe_name())
    }

    pub fn variable_ref(&self) -> GimpleExpr {
        GimpleExpr::var(self.id, self.ty.clone())
    }
}

/// Function parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GimpleParameter {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub ty: GimpleType,
    /// The address of this parameter is taken in the body
    #[serde(default)]
    pub addressable: bool,
}

impl GimpleParameter {
    pub fn new(id: i64, name: impl Into<String>, ty: GimpleType) -> Self {
        Self {
            id,
            name: name.into(),
            ty,
            addressable: false,
        }
    }
}

/// Function definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GimpleFunction {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub mangled_name: Option<String>,
    pub return_type: GimpleType,
    #[serde(default)]
    pub parameters: Vec<GimpleParameter>,
    #[serde(default)]
    pub variable_declarations: Vec<GimpleVarDecl>,
    #[serde(default)]
    pub basic_blocks: Vec<GimpleBasicBlock>,
    /// External linkage
    #[serde(default = "default_true", rename = "public")]
    pub is_public: bool,
    #[serde(default)]
    pub weak: bool,
    /// Owning unit, set by the parser
    #[serde(skip)]
    pub unit: Option<UnitId>,
}

fn default_true() -> bool {
    true
}

impl GimpleFunction {
    pub fn new(id: i64, name: impl Into<String>, return_type: GimpleType) -> Self {
        Self {
            id,
            name: name.into(),
            mangled_name: None,
            return_type,
            parameters: Vec::new(),
            variable_declarations: Vec::new(),
            basic_blocks: Vec::new(),
            is_public: true,
            weak: false,
            unit: None,
        }
    }

    /// Linkage name with `.` replaced so it is a valid member name
    pub fn safe_mangled_name(&self) -> String {
        self.mangled_name
            .as_deref()
            .unwrap_or(&self.name)
            .replace('.', "$")
    }

    /// True if the body calls `__builtin_va_start`
    pub fn is_variadic(&self) -> bool {
        self.statements().any(|s| match s {
            GimpleStatement::Call(call) => call.callee_name() == Some("__builtin_va_start"),
            _ => false,
        })
    }

    /// All statements of the body in block order
    pub fn statements(&self) -> impl Iterator<Item = &GimpleStatement> {
        self.basic_blocks.iter().flat_map(|bb| bb.statements.iter())
    }

    pub fn local(&self, id: i64) -> Option<&GimpleVarDecl> {
        self.variable_declarations.iter().find(|v| v.id == id)
    }

    pub fn parameter(&self, id: i64) -> Option<&GimpleParameter> {
        self.parameters.iter().find(|p| p.id == id)
    }

    fn used_ids(&self) -> HashSet<i64> {
        self.variable_declarations
            .iter()
            .map(|v| v.id)
            .chain(self.parameters.iter().map(|p| p.id))
            .collect()
    }

    /// Declares a new local temporary of type `ty` and returns its id.
    ///
    /// Ids start at [`SYNTHETIC_VAR_BASE_ID`] and never collide with an
    /// existing local or parameter.
    pub fn add_var_decl(&mut self, ty: GimpleType) -> i64 {
        let used = self.used_ids();
        let mut id = SYNTHETIC_VAR_BASE_ID;
        while used.contains(&id) {
            id += 1;
        }
        self.variable_declarations.push(GimpleVarDecl::new(id, ty));
        id
    }

    /// Removes local `id`, which must no longer be referenced
    pub fn remove_variable(&mut self, id: i64) -> Result<()> {
        let pos = self
            .variable_declarations
            .iter()
            .position(|v| v.id == id)
            .ok_or_else(|| Error::UnknownVariable {
                function: self.name.clone(),
                id,
            })?;
        if self.statements().any(|s| s.references_variable(id)) {
            return Err(Error::internal(format!(
                "Cannot remove variable T{} from {}: still referenced",
                id, self.name
            )));
        }
        self.variable_declarations.remove(pos);
        Ok(())
    }

    /// Checks that every variable reference in the body resolves to a local,
    /// a parameter, or one of `globals`.
    pub fn verify_references(&self, globals: &[GimpleVarDecl]) -> Result<()> {
        let mut known = self.used_ids();
        known.extend(globals.iter().map(|g| g.id));
        for stmt in self.statements() {
            for expr in stmt.expressions() {
                let mut missing = None;
                expr.walk(&mut |e| {
                    if let GimpleExpr::VariableRef { id, .. } = e {
                        if !known.contains(id) {
                            missing.get_or_insert(*id);
                        }
                    }
                });
                if let Some(id) = missing {
                    return Err(Error::UnknownVariable {
                        function: self.name.clone(),
                        id,
                    });
                }
            }
        }
        Ok(())
    }
}

/// One translated source file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilationUnit {
    /// Source file name
    pub name: String,
    #[serde(default)]
    pub functions: Vec<GimpleFunction>,
    #[serde(default)]
    pub global_variables: Vec<GimpleVarDecl>,
    #[serde(default)]
    pub record_types: Vec<RecordTypeDef>,
}

impl CompilationUnit {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: Vec::new(),
            global_variables: Vec::new(),
            record_types: Vec::new(),
        }
    }

    /// Sets back-references on every function and global, and marks globals
    pub fn attach(&mut self, id: UnitId) {
        for function in &mut self.functions {
            function.unit = Some(id);
        }
        for var in &mut self.global_variables {
            var.unit = Some(id);
            var.global = true;
        }
    }

    pub fn record(&self, name: &str) -> Option<&RecordTypeDef> {
        self.record_types.iter().find(|r| r.name == name)
    }

    pub fn function(&self, name: &str) -> Option<&GimpleFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn global(&self, id: i64) -> Option<&GimpleVarDecl> {
        self.global_variables.iter().find(|g| g.id == id)
    }

    /// Class name derived from the source file name: `foo.c` becomes `Foo`
    pub fn class_name(&self) -> String {
        let stem = self
            .name
            .rsplit('/')
            .next()
            .unwrap_or(&self.name)
            .split('.')
            .next()
            .unwrap_or_default();
        let mut chars = stem.chars().filter(|c| c.is_alphanumeric() || *c == '_');
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => "Unit".to_string(),
        }
    }
}
