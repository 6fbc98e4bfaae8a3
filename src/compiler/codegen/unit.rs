//! Generation of the class for one compilation unit

use super::calls::MethodRef;
use super::expr::JExpr;
use super::function::{FunctionGenerator, UnitScope};
use super::gexpr::GExpr;
use super::jvm::{ClassFile, InvokeKind, Insn, JType, MethodDecl, PUBLIC_STATIC};
use super::oracle::TypeOracle;
use super::params::FatPtrParamLayout;
use super::strategy::TypeStrategy;
use super::vars::{GlobalVarAllocator, MethodContext};
use crate::compiler::ir::{CompilationUnit, GimpleFunction, GimpleVarDecl};
use crate::error::{ErrorSeverity, LinkError};
use crate::link::{ClassInfo, ClassResolver, LinkSymbol, MemberInfo, SymbolKind, ACC_STATIC};
use crate::{Error, Result};

/// The class generated for a unit and the symbols it exports
#[derive(Debug, Clone)]
pub struct UnitOutput {
    pub class: ClassFile,
    pub symbols: Vec<LinkSymbol>,
    /// One entry per function replaced by a stub
    pub warnings: Vec<String>,
}

pub struct UnitGenerator<'u> {
    unit: &'u CompilationUnit,
    class_name: String,
    oracle: TypeOracle,
}

impl<'u> UnitGenerator<'u> {
    pub fn new(unit: &'u CompilationUnit, class_name: impl Into<String>, layout: FatPtrParamLayout) -> Self {
        Self {
            unit,
            class_name: class_name.into(),
            oracle: TypeOracle::new(&unit.record_types, layout),
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// The link-time view of the class and the symbols it will export.
    ///
    /// Needs only signatures, so every unit of a batch can publish its
    /// exports before any body is generated.
    pub fn exports(&self) -> Result<(ClassInfo, Vec<LinkSymbol>)> {
        let mut info = ClassInfo::new(&self.class_name);
        let mut symbols = Vec::new();
        for function in self.unit.functions.iter().filter(|f| f.is_public) {
            let method = MethodRef::for_function(&self.class_name, function, &self.oracle)?;
            info.methods
                .push(MemberInfo::new(&method.name, &method.descriptor, PUBLIC_STATIC));
            symbols.push(LinkSymbol::for_function(
                linkage_name(function),
                &self.class_name,
                &method.name,
                &method.descriptor,
            ));
        }
        for global in self.unit.global_variables.iter().filter(|g| is_exported(g)) {
            let field_type = self
                .oracle
                .strategy(&global.ty)?
                .global_field_type(global.addressable);
            info.fields.push(MemberInfo::new(
                global.linkage_name(),
                field_type.descriptor(),
                PUBLIC_STATIC,
            ));
            symbols.push(LinkSymbol::for_global_variable(
                global.linkage_name(),
                &self.class_name,
            ));
        }
        Ok((info, symbols))
    }

    pub fn generate(&self, resolver: &dyn ClassResolver, ignore_errors: bool) -> Result<UnitOutput> {
        let mut scope = UnitScope::new(&self.class_name, self.oracle.clone());
        let mut globals = GlobalVarAllocator::new(&self.class_name);

        // Phase 1: globals defined here. Exported fields are reserved first
        // so they keep their linkage names.
        let (exported, private): (Vec<&GimpleVarDecl>, Vec<&GimpleVarDecl>) = self
            .unit
            .global_variables
            .iter()
            .filter(|g| !g.is_extern)
            .partition(|g| is_exported(g));
        for global in &exported {
            let var = self.oracle.strategy(&global.ty)?.global_variable(
                &mut globals,
                &global.linkage_name(),
                global.addressable,
                true,
            )?;
            scope.globals.insert(global.id, var);
        }
        for global in &private {
            let var = self.oracle.strategy(&global.ty)?.global_variable(
                &mut globals,
                &global.safe_name(),
                global.addressable,
                false,
            )?;
            scope.globals.insert(global.id, var);
        }
        for function in &self.unit.functions {
            for decl in function.variable_declarations.iter().filter(|d| d.is_static) {
                let name = format!("{}${}", function.safe_mangled_name(), decl.safe_name());
                let var = self.oracle.strategy(&decl.ty)?.global_variable(
                    &mut globals,
                    &name,
                    decl.addressable,
                    false,
                )?;
                scope.static_locals.insert((function.id, decl.id), var);
            }
        }

        // Phase 2: extern globals
        for global in self.unit.global_variables.iter().filter(|g| g.is_extern) {
            let name = global.linkage_name();
            let local_definition = exported
                .iter()
                .find(|d| d.linkage_name() == name)
                .and_then(|d| scope.globals.get(&d.id))
                .cloned();
            let var = match local_definition {
                Some(var) => Some(var),
                None => self.link_global(global, resolver)?,
            };
            match var {
                Some(var) => {
                    scope.globals.insert(global.id, var);
                }
                None => {
                    tracing::debug!("Extern global {} is not defined anywhere", name);
                    scope.externs.insert(global.id, name);
                }
            }
        }

        // Phase 3: signatures of every function, so calls may go forward
        for function in &self.unit.functions {
            scope
                .functions
                .register(function, &self.class_name, &self.oracle)?;
        }

        // Phase 4: static initializer
        let mut init =
            FunctionGenerator::for_initializer(&scope, resolver, std::mem::take(&mut globals.clinit));
        let static_locals = &scope.static_locals;
        let statics = self
            .unit
            .functions
            .iter()
            .flat_map(|f| {
                f.variable_declarations
                    .iter()
                    .filter(|d| d.is_static)
                    .map(move |d| (static_locals.get(&(f.id, d.id)), d))
            });
        let defined = exported
            .iter()
            .chain(&private)
            .map(|g| (scope.globals.get(&g.id), *g));
        for (target, decl) in defined.chain(statics) {
            if let (Some(target), Some(value)) = (target, &decl.value) {
                init.initialize(target, &decl.ty, value)?;
            }
        }
        globals.clinit = init.into_context();

        // Phase 5: bodies
        let mut class = ClassFile::new(&self.class_name);
        let mut warnings = Vec::new();
        for function in &self.unit.functions {
            match FunctionGenerator::generate(&scope, resolver, function) {
                Ok(method) => class.methods.push(method),
                Err(e) if ignore_errors && e.severity() == ErrorSeverity::Recoverable => {
                    tracing::warn!("Replacing {} with a stub: {}", function.name, e);
                    warnings.push(format!("{}: {}", function.name, e));
                    class.methods.push(self.stub(function, &e)?);
                }
                Err(e) => return Err(e),
            }
        }

        globals.write_fields(&mut class);
        if globals.has_initializer() {
            let mut clinit = globals.clinit;
            clinit.mv.emit(Insn::Return { ty: JType::Void });
            class.methods.push(MethodDecl {
                name: "<clinit>".to_string(),
                descriptor: "()V".to_string(),
                access: ACC_STATIC,
                max_locals: clinit.locals.max_locals(),
                insns: clinit.mv.into_insns(),
            });
        }

        let (_, symbols) = self.exports()?;
        tracing::info!(
            "Generated {} ({} methods, {} fields, {} stubs)",
            self.class_name,
            class.methods.len(),
            class.fields.len(),
            warnings.len()
        );
        Ok(UnitOutput {
            class,
            symbols,
            warnings,
        })
    }

    /// Binds an extern global to a field or getter exported by another unit
    fn link_global(&self, global: &GimpleVarDecl, resolver: &dyn ClassResolver) -> Result<Option<GExpr>> {
        let symbol = match LinkSymbol::lookup(resolver, &global.linkage_name())? {
            Some(symbol) => symbol,
            None => return Ok(None),
        };
        let strategy = self.oracle.strategy(&global.ty)?;
        match symbol.kind {
            SymbolKind::Field => {
                let member = symbol.load_field(resolver)?;
                strategy.linked_global(&symbol.class_name, &member).map(Some)
            }
            SymbolKind::Getter => {
                let member = symbol.load_method(resolver)?;
                let ty = JType::parse_method_descriptor(&member.descriptor)
                    .map(|(_, ret)| ret)
                    .ok_or_else(|| Error::MalformedSymbol {
                        name: symbol.name.clone(),
                        reason: format!("invalid getter descriptor '{}'", member.descriptor),
                    })?;
                let value = JExpr::Call {
                    kind: InvokeKind::Static,
                    owner: symbol.class_name.clone(),
                    name: member.name,
                    descriptor: member.descriptor,
                    args: vec![],
                    ty,
                };
                getter_value(&strategy, value).map(Some)
            }
            SymbolKind::Method | SymbolKind::CallGenerator => Err(LinkError::WrongKind {
                symbol: symbol.name.clone(),
                expected: "field".to_string(),
                found: symbol.kind.to_string(),
            }
            .into()),
        }
    }

    /// A method with the function's signature that throws `error` when called
    fn stub(&self, function: &GimpleFunction, error: &Error) -> Result<MethodDecl> {
        let method = MethodRef::for_function(&self.class_name, function, &self.oracle)?;
        let mut ctx = MethodContext::new();
        ctx.mv
            .throw_error(&format!("{} could not be compiled: {}", function.name, error));
        Ok(MethodDecl {
            access: if function.is_public {
                PUBLIC_STATIC
            } else {
                ACC_STATIC
            },
            max_locals: method.parameter_slots(),
            name: method.name,
            descriptor: method.descriptor,
            insns: ctx.mv.into_insns(),
        })
    }
}

fn linkage_name(function: &GimpleFunction) -> String {
    function
        .mangled_name
        .clone()
        .unwrap_or_else(|| function.name.clone())
}

fn is_exported(global: &GimpleVarDecl) -> bool {
    global.is_public && !global.is_extern && !global.is_static
}

/// The value read through a getter, which has no address
fn getter_value(strategy: &TypeStrategy, value: JExpr) -> Result<GExpr> {
    match strategy {
        TypeStrategy::Primitive { ty, .. } => Ok(GExpr::primitive(value, ty.clone())),
        TypeStrategy::FatPtr(vf) => Ok(GExpr::WrappedFatPtr {
            vf: vf.clone(),
            wrapper: value,
            address: None,
        }),
        TypeStrategy::VPtr { .. } => Ok(GExpr::vptr(value)),
        TypeStrategy::FunPtr { .. } => Ok(GExpr::fun_ptr(value)),
        other => Err(Error::not_supported(format!(
            "global of type {} read through a getter",
            other.gimple_type()
        ))),
    }
}
