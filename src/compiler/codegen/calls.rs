//! Call targets: built-in generators, methods of the unit being compiled,
//! and functions linked from other units.

use super::expr::JExpr;
use super::gexpr::{ptr_class, ptr_type, GExpr};
use super::jvm::{InvokeKind, JBinOp, JConst, JType};
use super::oracle::TypeOracle;
use super::params::{ParamStrategy, ReturnStrategy};
use super::strategy::TypeStrategy;
use super::vars::MethodContext;
use crate::compiler::ir::{GimpleFunction, GimpleType};
use crate::error::LinkError;
use crate::link::{ClassResolver, LinkSymbol, SymbolKind};
use crate::{Error, Result};
use std::collections::HashMap;

/// Functions whose calls are expanded inline instead of invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Malloc,
    Calloc,
    Alloca,
    Free,
    Realloc,
    Memcpy,
    Memmove,
    Memset,
    Memcmp,
}

impl Builtin {
    /// Looks up a built-in by C name; `__builtin_` aliases are accepted
    pub fn for_name(name: &str) -> Option<Builtin> {
        let name = name.strip_prefix("__builtin_").unwrap_or(name);
        Some(match name {
            "malloc" => Builtin::Malloc,
            "calloc" => Builtin::Calloc,
            "alloca" => Builtin::Alloca,
            "free" => Builtin::Free,
            "realloc" => Builtin::Realloc,
            "memcpy" => Builtin::Memcpy,
            "memmove" => Builtin::Memmove,
            "memset" => Builtin::Memset,
            "memcmp" => Builtin::Memcmp,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Malloc => "malloc",
            Builtin::Calloc => "calloc",
            Builtin::Alloca => "alloca",
            Builtin::Free => "free",
            Builtin::Realloc => "realloc",
            Builtin::Memcpy => "memcpy",
            Builtin::Memmove => "memmove",
            Builtin::Memset => "memset",
            Builtin::Memcmp => "memcmp",
        }
    }

    fn arity(&self) -> usize {
        match self {
            Builtin::Malloc | Builtin::Alloca | Builtin::Free => 1,
            Builtin::Calloc | Builtin::Realloc => 2,
            Builtin::Memcpy | Builtin::Memmove | Builtin::Memset | Builtin::Memcmp => 3,
        }
    }

    /// Emits the call. `lhs` is the strategy of the assigned variable, if
    /// any; the returned value, when present, has that strategy's shape or is
    /// a pointer the caller casts to it.
    pub fn emit(
        &self,
        args: &[GExpr],
        lhs: Option<&TypeStrategy>,
        ctx: &mut MethodContext,
    ) -> Result<Option<GExpr>> {
        if args.len() < self.arity() {
            return Err(Error::internal(format!(
                "{} expects {} arguments, got {}",
                self.name(),
                self.arity(),
                args.len()
            )));
        }
        match self {
            Builtin::Malloc | Builtin::Alloca => match lhs {
                Some(strategy) => strategy.malloc(args[0].to_primitive(&JType::Int)?).map(Some),
                None => Ok(None),
            },
            Builtin::Calloc => match lhs {
                Some(strategy) => {
                    let count = args[0].to_primitive(&JType::Int)?;
                    let size = args[1].to_primitive(&JType::Int)?;
                    let bytes = match (&count, &size) {
                        (JExpr::Const(JConst::Int(n)), JExpr::Const(JConst::Int(s))) => {
                            JExpr::int(n * s)
                        }
                        _ => JExpr::binary(JBinOp::Mul, JType::Int, count, size),
                    };
                    strategy.malloc(bytes).map(Some)
                }
                None => Ok(None),
            },
            Builtin::Free => Ok(None),
            Builtin::Realloc => {
                let call = JExpr::interface_call(
                    args[0].to_vptr()?,
                    &ptr_class(),
                    "realloc",
                    &[JType::Int],
                    ptr_type(),
                    vec![args[1].to_primitive(&JType::Int)?],
                );
                match lhs {
                    Some(_) => Ok(Some(GExpr::vptr(ctx.spill(call)?))),
                    None => {
                        call.discard(&mut ctx.mv);
                        Ok(None)
                    }
                }
            }
            Builtin::Memcpy | Builtin::Memmove => {
                let target = ctx.spill(args[0].to_vptr()?)?;
                let call = JExpr::interface_call(
                    target.clone(),
                    &ptr_class(),
                    self.name(),
                    &[ptr_type(), JType::Int],
                    JType::Void,
                    vec![args[1].to_vptr()?, args[2].to_primitive(&JType::Int)?],
                );
                call.discard(&mut ctx.mv);
                Ok(lhs.map(|_| GExpr::vptr(target)))
            }
            Builtin::Memset => {
                let target = ctx.spill(args[0].to_vptr()?)?;
                let call = JExpr::interface_call(
                    target.clone(),
                    &ptr_class(),
                    "memset",
                    &[JType::Int, JType::Int],
                    JType::Void,
                    vec![
                        args[1].to_primitive(&JType::Int)?,
                        args[2].to_primitive(&JType::Int)?,
                    ],
                );
                call.discard(&mut ctx.mv);
                Ok(lhs.map(|_| GExpr::vptr(target)))
            }
            Builtin::Memcmp => {
                let call = JExpr::interface_call(
                    args[0].to_vptr()?,
                    &ptr_class(),
                    "memcmp",
                    &[ptr_type(), JType::Int],
                    JType::Int,
                    vec![args[1].to_vptr()?, args[2].to_primitive(&JType::Int)?],
                );
                match lhs {
                    Some(_) => Ok(Some(GExpr::primitive(call, GimpleType::int(32)))),
                    None => {
                        call.discard(&mut ctx.mv);
                        Ok(None)
                    }
                }
            }
        }
    }
}

/// A static method implementing a C function
#[derive(Debug, Clone, PartialEq)]
pub struct MethodRef {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub param_types: Vec<GimpleType>,
    pub params: Vec<ParamStrategy>,
    pub ret: ReturnStrategy,
}

impl MethodRef {
    /// The method generated for `function` in class `owner`
    pub fn for_function(owner: &str, function: &GimpleFunction, oracle: &TypeOracle) -> Result<Self> {
        let param_types: Vec<GimpleType> =
            function.parameters.iter().map(|p| p.ty.clone()).collect();
        Self::build(
            owner,
            &function.safe_mangled_name(),
            &function.return_type,
            param_types,
            oracle,
        )
    }

    /// A method with the given function signature
    pub fn for_signature(
        owner: &str,
        name: &str,
        signature: &GimpleType,
        oracle: &TypeOracle,
    ) -> Result<Self> {
        match signature {
            GimpleType::Function {
                return_type,
                params,
                ..
            } => Self::build(owner, name, return_type, params.clone(), oracle),
            other => Err(Error::internal(format!(
                "{} is not a function type",
                other
            ))),
        }
    }

    fn build(
        owner: &str,
        name: &str,
        return_type: &GimpleType,
        param_types: Vec<GimpleType>,
        oracle: &TypeOracle,
    ) -> Result<Self> {
        let params = param_types
            .iter()
            .map(|ty| oracle.param_strategy(ty))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: oracle.method_descriptor(return_type, &param_types)?,
            param_types,
            params,
            ret: oracle.return_strategy(return_type)?,
        })
    }

    /// Number of local slots taken by the parameters
    pub fn parameter_slots(&self) -> u16 {
        self.params
            .iter()
            .flat_map(ParamStrategy::parameter_types)
            .map(|ty| if ty.is_wide() { 2 } else { 1 })
            .sum()
    }

    pub fn invoke(&self, args: Vec<JExpr>) -> JExpr {
        JExpr::Call {
            kind: InvokeKind::Static,
            owner: self.owner.clone(),
            name: self.name.clone(),
            descriptor: self.descriptor.clone(),
            args,
            ty: self.ret.return_type(),
        }
    }

    /// A handle to this method, the value of a function pointer to it
    pub fn handle(&self) -> JExpr {
        JExpr::MethodHandle {
            owner: self.owner.clone(),
            name: self.name.clone(),
            descriptor: self.descriptor.clone(),
        }
    }
}

/// What a call to a named function becomes
#[derive(Debug, Clone, PartialEq)]
pub enum CallGenerator {
    Builtin(Builtin),
    Function(MethodRef),
}

/// Functions defined in the unit being compiled, by name and linkage name
#[derive(Debug, Default)]
pub struct FunctionTable {
    functions: HashMap<String, MethodRef>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        function: &GimpleFunction,
        owner: &str,
        oracle: &TypeOracle,
    ) -> Result<MethodRef> {
        let method = MethodRef::for_function(owner, function, oracle)?;
        if let Some(mangled) = &function.mangled_name {
            self.functions.insert(mangled.clone(), method.clone());
        }
        self.functions.insert(function.name.clone(), method.clone());
        Ok(method)
    }

    pub fn get(&self, name: &str) -> Option<&MethodRef> {
        self.functions.get(name)
    }

    /// Resolves a call to `name` with the callee's `signature`.
    ///
    /// Built-ins win over definitions, local definitions over linked ones.
    /// A linked method must have exactly the descriptor the call site
    /// expects.
    pub fn resolve(
        &self,
        name: &str,
        signature: &GimpleType,
        oracle: &TypeOracle,
        resolver: &dyn ClassResolver,
    ) -> Result<CallGenerator> {
        if let Some(builtin) = Builtin::for_name(name) {
            return Ok(CallGenerator::Builtin(builtin));
        }
        if let Some(method) = self.get(name) {
            return Ok(CallGenerator::Function(method.clone()));
        }
        let symbol = LinkSymbol::lookup(resolver, name)?
            .ok_or_else(|| Error::UnresolvedSymbol(name.to_string()))?;
        match symbol.kind {
            SymbolKind::Method => {
                let member = symbol.load_method(resolver)?;
                let method = MethodRef::for_signature(&symbol.class_name, &member.name, signature, oracle)?;
                if method.descriptor != member.descriptor {
                    return Err(LinkError::MissingMember {
                        symbol: symbol.name.clone(),
                        class: symbol.class_name.clone(),
                        member: member.name.clone(),
                        descriptor: method.descriptor,
                    }
                    .into());
                }
                tracing::debug!("Linked {} to {}.{}", name, symbol.class_name, member.name);
                Ok(CallGenerator::Function(method))
            }
            SymbolKind::CallGenerator => Builtin::for_name(&symbol.class_name)
                .map(CallGenerator::Builtin)
                .ok_or_else(|| Error::MalformedSymbol {
                    name: symbol.name.clone(),
                    reason: format!("unknown call generator '{}'", symbol.class_name),
                }),
            SymbolKind::Field | SymbolKind::Getter => Err(LinkError::WrongKind {
                symbol: symbol.name.clone(),
                expected: "method".to_string(),
                found: symbol.kind.to_string(),
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::codegen::params::FatPtrParamLayout;
    use crate::link::{ClassInfo, ClassPath, ACC_PUBLIC, ACC_STATIC};

    fn oracle() -> TypeOracle {
        TypeOracle::new(&[], FatPtrParamLayout::Wrapped)
    }

    fn unary_double() -> GimpleType {
        GimpleType::function(GimpleType::real(64), vec![GimpleType::real(64)])
    }

    #[test]
    fn test_builtin_aliases() {
        assert_eq!(Builtin::for_name("__builtin_memcpy"), Some(Builtin::Memcpy));
        assert_eq!(Builtin::for_name("calloc"), Some(Builtin::Calloc));
        assert_eq!(Builtin::for_name("printf"), None);
    }

    #[test]
    fn test_local_definition_wins_over_link() {
        let mut f = GimpleFunction::new(1, "sqrt", GimpleType::real(64));
        f.parameters.push(crate::compiler::ir::GimpleParameter::new(
            2,
            "x",
            GimpleType::real(64),
        ));
        let mut table = FunctionTable::new();
        table.register(&f, "org/x/Mine", &oracle()).unwrap();
        let classpath = ClassPath::new().with_math_library();
        match table
            .resolve("sqrt", &unary_double(), &oracle(), &classpath)
            .unwrap()
        {
            CallGenerator::Function(method) => assert_eq!(method.owner, "org/x/Mine"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_linked_method_descriptor_must_match() {
        let table = FunctionTable::new();
        let classpath = ClassPath::new().with_math_library();
        let linked = table
            .resolve("cos", &unary_double(), &oracle(), &classpath)
            .unwrap();
        assert!(matches!(
            linked,
            CallGenerator::Function(ref m) if m.owner == "java/lang/Math" && m.descriptor == "(D)D"
        ));

        let float_cos = GimpleType::function(GimpleType::real(32), vec![GimpleType::real(32)]);
        let err = table
            .resolve("cos", &float_cos, &oracle(), &classpath)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Link(LinkError::MissingMember { ref descriptor, .. }) if descriptor == "(F)F"
        ));
    }

    #[test]
    fn test_unresolved_and_wrong_kind() {
        let table = FunctionTable::new();
        let mut classpath = ClassPath::new();
        assert!(matches!(
            table.resolve("puts", &unary_double(), &oracle(), &classpath),
            Err(Error::UnresolvedSymbol(ref name)) if name == "puts"
        ));

        classpath.add_class(ClassInfo::new("org/x/Libc").with_field(
            "errno",
            "I",
            ACC_PUBLIC | ACC_STATIC,
        ));
        classpath.add_symbol(&LinkSymbol::for_global_variable("errno", "org/x/Libc"));
        assert!(matches!(
            table.resolve("errno", &unary_double(), &oracle(), &classpath),
            Err(Error::Link(LinkError::WrongKind { .. }))
        ));

        classpath.add_symbol(&LinkSymbol::for_call_generator("xmalloc", "malloc"));
        assert_eq!(
            table
                .resolve("xmalloc", &unary_double(), &oracle(), &classpath)
                .unwrap(),
            CallGenerator::Builtin(Builtin::Malloc)
        );
    }

    #[test]
    fn test_memcpy_returns_spilled_target() {
        let mut ctx = MethodContext::new();
        let dest = ctx.locals.reserve("d", ptr_type());
        let src = ctx.locals.reserve("s", ptr_type());
        let args = vec![
            GExpr::vptr(dest.clone()),
            GExpr::vptr(src),
            GExpr::primitive(JExpr::int(8), GimpleType::int(32)),
        ];
        let strategy = TypeStrategy::VPtr {
            base: GimpleType::Void,
        };
        let result = Builtin::Memcpy
            .emit(&args, Some(&strategy), &mut ctx)
            .unwrap();
        assert_eq!(result, Some(GExpr::vptr(dest)));
        assert!(Builtin::Free.emit(&args[..1], None, &mut ctx).unwrap().is_none());
        assert!(Builtin::Memset.emit(&args[..2], None, &mut ctx).is_err());
    }
}
