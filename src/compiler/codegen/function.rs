//! Lowering of one function body.
//!
//! Statements are lowered one at a time. Every operand becomes a [`GExpr`]
//! in the shape its type's strategy dictates, is cast to the shape of the
//! destination, and stored.

use super::calls::{CallGenerator, FunctionTable, MethodRef};
use super::expr::JExpr;
use super::gexpr::{pointer_plus, primitive_jtype, ptr_class, ptr_type, GExpr, ValueFunction};
use super::jvm::{Cond, InvokeKind, Insn, JBinOp, JConst, JType, Label, MethodDecl, PUBLIC_STATIC};
use super::oracle::TypeOracle;
use super::params::ReturnStrategy;
use super::strategy::{zero, FieldStrategy, TypeStrategy};
use super::vars::MethodContext;
use crate::compiler::ir::{
    GimpleAssignment, GimpleCall, GimpleExpr, GimpleFunction, GimpleOp, GimpleStatement,
    GimpleType,
};
use crate::link::{ClassResolver, ACC_STATIC};
use crate::runtime::runtime_class;
use crate::{Error, Result};
use std::collections::HashMap;

/// Everything a function body can refer to outside itself
#[derive(Debug)]
pub struct UnitScope {
    /// Internal name of the class being generated
    pub owner: String,
    pub oracle: TypeOracle,
    pub functions: FunctionTable,
    /// Globals defined in or linked into the unit, by declaration id
    pub globals: HashMap<i64, GExpr>,
    /// Function-level statics, by (function id, declaration id)
    pub static_locals: HashMap<(i64, i64), GExpr>,
    /// Extern globals with no definition anywhere, by id. Referencing one is
    /// an error; declaring one is not.
    pub externs: HashMap<i64, String>,
}

impl UnitScope {
    pub fn new(owner: impl Into<String>, oracle: TypeOracle) -> Self {
        Self {
            owner: owner.into(),
            oracle,
            functions: FunctionTable::new(),
            globals: HashMap::new(),
            static_locals: HashMap::new(),
            externs: HashMap::new(),
        }
    }
}

pub struct FunctionGenerator<'a> {
    scope: &'a UnitScope,
    resolver: &'a dyn ClassResolver,
    name: String,
    ctx: MethodContext,
    locals: HashMap<i64, GExpr>,
    labels: HashMap<i32, Label>,
    return_type: GimpleType,
    ret: ReturnStrategy,
}

impl<'a> FunctionGenerator<'a> {
    /// Generates the static method implementing `function`
    pub fn generate(
        scope: &'a UnitScope,
        resolver: &'a dyn ClassResolver,
        function: &GimpleFunction,
    ) -> Result<MethodDecl> {
        let method = MethodRef::for_function(&scope.owner, function, &scope.oracle)?;
        let mut gen = FunctionGenerator {
            scope,
            resolver,
            name: function.name.clone(),
            ctx: MethodContext::new(),
            locals: HashMap::new(),
            labels: HashMap::new(),
            return_type: function.return_type.clone(),
            ret: method.ret.clone(),
        };

        // Phase 1: incoming slots first, then the values the body sees
        let slots: Vec<Vec<JExpr>> = function
            .parameters
            .iter()
            .zip(&method.params)
            .map(|(param, strategy)| strategy.reserve_slots(&param.name.replace('.', "$"), &mut gen.ctx))
            .collect();
        for ((param, strategy), slots) in function.parameters.iter().zip(&method.params).zip(&slots) {
            let var = strategy.emit_initialization(
                slots,
                &param.name.replace('.', "$"),
                param.addressable,
                &mut gen.ctx,
            )?;
            gen.locals.insert(param.id, var);
        }

        // Phase 2: locals, all declared before any initializer runs
        for decl in &function.variable_declarations {
            let var = if decl.is_static {
                scope
                    .static_locals
                    .get(&(function.id, decl.id))
                    .cloned()
                    .ok_or_else(|| {
                        Error::internal(format!(
                            "Static local {} of {} was not allocated",
                            decl.safe_name(),
                            function.name
                        ))
                    })?
            } else {
                scope
                    .oracle
                    .strategy(&decl.ty)?
                    .variable(&decl.safe_name(), decl.addressable, &mut gen.ctx)?
            };
            gen.locals.insert(decl.id, var);
        }
        for decl in function.variable_declarations.iter().filter(|d| !d.is_static) {
            if let Some(value) = &decl.value {
                let target = gen.variable(decl.id)?;
                gen.initialize(&target, &decl.ty, value)?;
            }
        }

        // Phase 3: body
        for block in &function.basic_blocks {
            let label = gen.ctx.mv.new_label();
            gen.labels.insert(block.index, label);
        }
        for block in &function.basic_blocks {
            let label = gen.label(block.index)?;
            gen.ctx.mv.mark(label);
            for statement in &block.statements {
                gen.statement(statement)?;
            }
        }
        if !matches!(
            gen.ctx.mv.insns().last(),
            Some(Insn::Return { .. } | Insn::Goto { .. } | Insn::Throw)
        ) {
            gen.return_default();
        }

        tracing::debug!(
            "Generated {}{} ({} instructions)",
            method.name,
            method.descriptor,
            gen.ctx.mv.insns().len()
        );
        Ok(MethodDecl {
            name: method.name,
            descriptor: method.descriptor,
            access: if function.is_public {
                PUBLIC_STATIC
            } else {
                ACC_STATIC
            },
            max_locals: gen.ctx.locals.max_locals(),
            insns: gen.ctx.mv.into_insns(),
        })
    }

    /// A generator that lowers global initializers into `ctx`, the static
    /// initializer of the unit class.
    pub fn for_initializer(
        scope: &'a UnitScope,
        resolver: &'a dyn ClassResolver,
        ctx: MethodContext,
    ) -> Self {
        FunctionGenerator {
            scope,
            resolver,
            name: "<clinit>".to_string(),
            ctx,
            locals: HashMap::new(),
            labels: HashMap::new(),
            return_type: GimpleType::Void,
            ret: ReturnStrategy::Void,
        }
    }

    pub fn into_context(self) -> MethodContext {
        self.ctx
    }

    fn oracle(&self) -> &'a TypeOracle {
        &self.scope.oracle
    }

    fn label(&self, block: i32) -> Result<Label> {
        self.labels
            .get(&block)
            .copied()
            .ok_or_else(|| Error::internal(format!("{}: no basic block {}", self.name, block)))
    }

    fn variable(&self, id: i64) -> Result<GExpr> {
        if let Some(var) = self.locals.get(&id).or_else(|| self.scope.globals.get(&id)) {
            return Ok(var.clone());
        }
        if let Some(name) = self.scope.externs.get(&id) {
            return Err(Error::UnresolvedSymbol(name.clone()));
        }
        Err(Error::UnknownVariable {
            function: self.name.clone(),
            id,
        })
    }

    /// Stores the value of `value`, or zero-fills and then fills from a
    /// constructor, into `target` of type `ty`
    pub fn initialize(&mut self, target: &GExpr, ty: &GimpleType, value: &GimpleExpr) -> Result<()> {
        match value {
            GimpleExpr::Constructor { elements, .. } => self.construct(target, ty, elements),
            other => {
                let value = self.expr(other)?;
                let value = self.oracle().strategy(ty)?.cast(value, &mut self.ctx)?;
                target.store(&mut self.ctx, &value)
            }
        }
    }

    fn statement(&mut self, statement: &GimpleStatement) -> Result<()> {
        match statement {
            GimpleStatement::Assign(assignment) => self.assign(assignment),
            GimpleStatement::Call(call) => self.call(call),
            GimpleStatement::Return { value: Some(value) } if self.ret != ReturnStrategy::Void => {
                let ret = self.ret.clone();
                let value = self.expr(value)?;
                let value = self.oracle().strategy(&self.return_type)?.cast(value, &mut self.ctx)?;
                let returned = ret.marshal(&value, &mut self.ctx)?;
                returned.load(&mut self.ctx.mv);
                self.ctx.mv.emit(Insn::Return {
                    ty: ret.return_type(),
                });
                Ok(())
            }
            GimpleStatement::Return { .. } => {
                self.return_default();
                Ok(())
            }
            GimpleStatement::Goto { target } => {
                let label = self.label(*target)?;
                self.ctx.mv.goto(label);
                Ok(())
            }
            GimpleStatement::Conditional(conditional) => {
                let (left, right) = operand_pair(&conditional.operands)?;
                let (cond, left, right) = self.condition(conditional.op, left, right)?;
                let when_true = self.label(conditional.true_label)?;
                let when_false = self.label(conditional.false_label)?;
                left.load(&mut self.ctx.mv);
                right.load(&mut self.ctx.mv);
                self.ctx.mv.emit(Insn::IfCmp {
                    cond,
                    ty: left.ty().stack_type(),
                    target: when_true,
                });
                self.ctx.mv.goto(when_false);
                Ok(())
            }
        }
    }

    fn return_default(&mut self) {
        match self.ret.default_value() {
            Some(value) => {
                value.load(&mut self.ctx.mv);
                self.ctx.mv.emit(Insn::Return {
                    ty: self.ret.return_type(),
                });
            }
            None => self.ctx.mv.emit(Insn::Return { ty: JType::Void }),
        }
    }

    fn assign(&mut self, assignment: &GimpleAssignment) -> Result<()> {
        let ty = assignment.lhs.ty().clone();
        let target = self.expr(&assignment.lhs)?;
        if let Some(GimpleExpr::Constructor { elements, .. }) = assignment.operands.first() {
            return self.construct(&target, &ty, elements);
        }
        let strategy = self.oracle().strategy(&ty)?;
        let op = assignment.op;
        let value = if op.is_copy() || op.is_conversion() {
            let value = self.expr(operand(assignment, 0)?)?;
            strategy.cast(value, &mut self.ctx)?
        } else if op == GimpleOp::PointerPlusExpr {
            self.pointer_plus(&strategy, assignment)?
        } else {
            GExpr::primitive(self.arithmetic(assignment, &ty)?, ty.clone())
        };
        target.store(&mut self.ctx, &value)
    }

    fn pointer_plus(&mut self, strategy: &TypeStrategy, assignment: &GimpleAssignment) -> Result<GExpr> {
        let pointer = self.expr(operand(assignment, 0)?)?;
        let pointer = strategy.cast(pointer, &mut self.ctx)?;
        let offset = self.expr(operand(assignment, 1)?)?.to_primitive(&JType::Int)?;
        match strategy {
            TypeStrategy::FatPtr(vf) => {
                let delta = match offset {
                    JExpr::Const(JConst::Int(bytes)) if bytes % vf.size != 0 => {
                        return Err(Error::not_supported(format!(
                            "misaligned arithmetic of {} bytes on a pointer to {}",
                            bytes, vf.ty
                        )))
                    }
                    other => vf.bytes_to_elements(other),
                };
                let (array, start) = pointer.to_fat_ptr_pair(&mut self.ctx, vf)?;
                Ok(GExpr::FatPtrPair {
                    vf: vf.clone(),
                    array,
                    offset: start.plus(delta),
                })
            }
            TypeStrategy::VPtr { .. } => Ok(GExpr::vptr(pointer_plus(pointer.to_vptr()?, offset))),
            other => Err(Error::not_supported(format!(
                "pointer arithmetic on {}",
                other.gimple_type()
            ))),
        }
    }

    fn arithmetic(&mut self, assignment: &GimpleAssignment, ty: &GimpleType) -> Result<JExpr> {
        let op = assignment.op;
        if op.is_comparison() {
            let (cond, left, right) =
                self.condition(op, operand(assignment, 0)?, operand(assignment, 1)?)?;
            return Ok(JExpr::compare(cond, left, right));
        }
        if op == GimpleOp::PointerDiffExpr {
            return self.pointer_difference(assignment, ty);
        }

        let jtype = primitive_jtype(ty)?;
        let stack = jtype.stack_type();
        let unsigned = matches!(ty, GimpleType::Integer { unsigned: true, .. });
        let x = self.numeric_operand(operand(assignment, 0)?, &stack)?;
        let result = match op {
            GimpleOp::NegateExpr => JExpr::Neg {
                value: Box::new(x),
                ty: stack.clone(),
            },
            GimpleOp::BitNotExpr => {
                let ones = match stack {
                    JType::Long => JExpr::Const(JConst::Long(-1)),
                    _ => JExpr::int(-1),
                };
                JExpr::binary(JBinOp::Xor, stack.clone(), x, ones)
            }
            GimpleOp::TruthNotExpr => JExpr::compare(Cond::Eq, x, zero(&stack)),
            GimpleOp::AbsExpr => JExpr::static_call("java/lang/Math", "abs", stack.clone(), vec![x]),
            GimpleOp::LshiftExpr | GimpleOp::RshiftExpr => {
                let count = self.numeric_operand(operand(assignment, 1)?, &JType::Int)?;
                let shift = match (op, unsigned) {
                    (GimpleOp::LshiftExpr, _) => JBinOp::Shl,
                    (_, true) => JBinOp::Ushr,
                    _ => JBinOp::Shr,
                };
                JExpr::binary(shift, stack.clone(), x, count)
            }
            _ => {
                let y = self.numeric_operand(operand(assignment, 1)?, &stack)?;
                let wide_unsigned = unsigned && matches!(stack, JType::Int | JType::Long);
                let boxed = if stack == JType::Long {
                    "java/lang/Long"
                } else {
                    "java/lang/Integer"
                };
                match op {
                    GimpleOp::PlusExpr => JExpr::binary(JBinOp::Add, stack.clone(), x, y),
                    GimpleOp::MinusExpr => JExpr::binary(JBinOp::Sub, stack.clone(), x, y),
                    GimpleOp::MultExpr => JExpr::binary(JBinOp::Mul, stack.clone(), x, y),
                    GimpleOp::RdivExpr => JExpr::binary(JBinOp::Div, stack.clone(), x, y),
                    GimpleOp::TruncDivExpr if wide_unsigned => {
                        JExpr::static_call(boxed, "divideUnsigned", stack.clone(), vec![x, y])
                    }
                    GimpleOp::TruncDivExpr => JExpr::binary(JBinOp::Div, stack.clone(), x, y),
                    GimpleOp::TruncModExpr if wide_unsigned => {
                        JExpr::static_call(boxed, "remainderUnsigned", stack.clone(), vec![x, y])
                    }
                    GimpleOp::TruncModExpr => JExpr::binary(JBinOp::Rem, stack.clone(), x, y),
                    GimpleOp::BitAndExpr => JExpr::binary(JBinOp::And, stack.clone(), x, y),
                    GimpleOp::BitIorExpr => JExpr::binary(JBinOp::Or, stack.clone(), x, y),
                    GimpleOp::BitXorExpr => JExpr::binary(JBinOp::Xor, stack.clone(), x, y),
                    GimpleOp::MinExpr => JExpr::static_call("java/lang/Math", "min", stack.clone(), vec![x, y]),
                    GimpleOp::MaxExpr => JExpr::static_call("java/lang/Math", "max", stack.clone(), vec![x, y]),
                    other => return Err(Error::not_supported(other.name())),
                }
            }
        };
        Ok(result.convert(jtype))
    }

    /// Byte distance between two pointers
    fn pointer_difference(&mut self, assignment: &GimpleAssignment, ty: &GimpleType) -> Result<JExpr> {
        let left = self.expr(operand(assignment, 0)?)?;
        let right = self.expr(operand(assignment, 1)?)?;
        let distance = match (&left, &right) {
            (
                GExpr::FatPtrPair {
                    vf, offset: a, ..
                },
                GExpr::FatPtrPair { offset: b, .. },
            ) => JExpr::binary(
                JBinOp::Mul,
                JType::Int,
                JExpr::binary(JBinOp::Sub, JType::Int, a.clone(), b.clone()),
                JExpr::int(vf.size),
            ),
            _ => {
                let offset_of = |pointer: JExpr| {
                    JExpr::interface_call(
                        pointer,
                        &ptr_class(),
                        "getOffsetInBytes",
                        &[],
                        JType::Int,
                        vec![],
                    )
                };
                JExpr::binary(
                    JBinOp::Sub,
                    JType::Int,
                    offset_of(left.to_vptr()?),
                    offset_of(right.to_vptr()?),
                )
            }
        };
        Ok(distance.convert(primitive_jtype(ty)?))
    }

    /// An arithmetic operand widened to `stack`. Unsigned bytes are held
    /// signed, so they are masked when widened.
    fn numeric_operand(&mut self, e: &GimpleExpr, stack: &JType) -> Result<JExpr> {
        let value = self.expr(e)?.to_primitive(stack)?;
        Ok(match e.ty() {
            GimpleType::Integer {
                bits: 8,
                unsigned: true,
            } => JExpr::binary(JBinOp::And, stack.clone(), value, mask(stack, 0xFF)),
            _ => value,
        })
    }

    /// Lowers a comparison into `(cond, left, right)` operands of a branch
    fn condition(
        &mut self,
        op: GimpleOp,
        left: &GimpleExpr,
        right: &GimpleExpr,
    ) -> Result<(Cond, JExpr, JExpr)> {
        let cond = match op {
            GimpleOp::EqExpr => Cond::Eq,
            GimpleOp::NeExpr => Cond::Ne,
            GimpleOp::LtExpr => Cond::Lt,
            GimpleOp::LeExpr => Cond::Le,
            GimpleOp::GtExpr => Cond::Gt,
            GimpleOp::GeExpr => Cond::Ge,
            other => {
                return Err(Error::internal(format!(
                    "{} is not a comparison",
                    other.name()
                )))
            }
        };
        let ty = left.ty().clone();
        if ty.is_function_pointer() && matches!(cond, Cond::Eq | Cond::Ne) {
            let l = self.expr(left)?.to_fun_ptr(&mut self.ctx)?;
            let r = self.expr(right)?;
            let r = self.oracle().strategy(&ty)?.cast(r, &mut self.ctx)?.to_fun_ptr(&mut self.ctx)?;
            return Ok((cond, l, r));
        }
        if ty.is_pointer() {
            let strategy = self.oracle().strategy(&ty)?;
            let l = self.expr(left)?;
            let l = strategy.cast(l, &mut self.ctx)?.to_vptr()?;
            let r = self.expr(right)?;
            let r = strategy.cast(r, &mut self.ctx)?.to_vptr()?;
            let compared = JExpr::interface_call(
                l,
                &ptr_class(),
                "compareTo",
                &[ptr_type()],
                JType::Int,
                vec![r],
            );
            return Ok((cond, compared, JExpr::int(0)));
        }
        let stack = primitive_jtype(&ty)?.stack_type();
        let l = self.numeric_operand(left, &stack)?;
        let r = self.numeric_operand(right, &stack)?;
        Ok(match ty {
            GimpleType::Integer {
                bits: 32 | 64,
                unsigned: true,
            } => {
                let boxed = if stack == JType::Long {
                    "java/lang/Long"
                } else {
                    "java/lang/Integer"
                };
                let compared = JExpr::static_call(boxed, "compareUnsigned", JType::Int, vec![l, r]);
                (cond, compared, JExpr::int(0))
            }
            _ => (cond, l, r),
        })
    }

    /// Zero-fills `target`, then stores the constructor's elements in order
    fn construct(&mut self, target: &GExpr, ty: &GimpleType, elements: &[GimpleExpr]) -> Result<()> {
        let strategy = self.oracle().strategy(ty)?;
        self.zero_fill(target, &strategy)?;
        match ty {
            GimpleType::Array { component, .. } => {
                for (i, element) in elements.iter().enumerate() {
                    let slot = self.array_element(target.clone(), JExpr::int(i as i32), component)?;
                    self.initialize(&slot, component, element)?;
                }
                Ok(())
            }
            GimpleType::Record { name } => {
                let fields = self.oracle().record(name)?.fields.clone();
                for (field, element) in fields.iter().zip(elements) {
                    let slot = self.field(target.clone(), name, &field.name)?;
                    self.initialize(&slot, &field.ty, element)?;
                }
                Ok(())
            }
            _ if elements.is_empty() => Ok(()),
            other => Err(Error::not_supported(format!("constructor of {}", other))),
        }
    }

    fn zero_fill(&mut self, target: &GExpr, strategy: &TypeStrategy) -> Result<()> {
        match (target, strategy) {
            (
                GExpr::ArrayValue {
                    vf,
                    array,
                    offset,
                    length,
                },
                _,
            ) => {
                let fill = JExpr::Call {
                    kind: InvokeKind::Static,
                    owner: "java/util/Arrays".to_string(),
                    name: "fill".to_string(),
                    descriptor: format!(
                        "({}II{})V",
                        vf.array_type().descriptor(),
                        vf.jtype.descriptor()
                    ),
                    args: vec![
                        array.clone(),
                        offset.clone(),
                        offset.clone().plus(JExpr::int(*length)),
                        zero(&vf.jtype),
                    ],
                    ty: JType::Void,
                };
                fill.discard(&mut self.ctx.mv);
                Ok(())
            }
            (
                GExpr::Memory {
                    pointer,
                    offset,
                    field: FieldStrategy::Inline { size },
                    ..
                },
                _,
            ) => {
                let memset = JExpr::interface_call(
                    pointer_plus(pointer.clone(), offset.clone()),
                    &ptr_class(),
                    "memset",
                    &[JType::Int, JType::Int],
                    JType::Void,
                    vec![JExpr::int(0), JExpr::int(*size)],
                );
                memset.discard(&mut self.ctx.mv);
                Ok(())
            }
            (_, TypeStrategy::Primitive { ty, jtype }) => {
                target.store(&mut self.ctx, &GExpr::primitive(zero(jtype), ty.clone()))
            }
            (_, strategy) if strategy.is_pointer() => {
                let null = strategy.null_pointer()?;
                target.store(&mut self.ctx, &null)
            }
            (other, _) => Err(Error::internal(format!(
                "cannot zero-fill {}",
                other.describe()
            ))),
        }
    }

    /// Lowers an operand to its managed representation
    fn expr(&mut self, e: &GimpleExpr) -> Result<GExpr> {
        match e {
            GimpleExpr::VariableRef { id, .. } => self.variable(*id),
            GimpleExpr::IntegerConst { value, ty } if ty.is_pointer() => {
                if *value != 0 {
                    return Err(Error::not_supported(format!(
                        "integer constant {} used as {}",
                        value, ty
                    )));
                }
                self.oracle().strategy(ty)?.null_pointer()
            }
            GimpleExpr::IntegerConst { value, ty } => {
                Ok(GExpr::primitive(JExpr::Const(integer_constant(*value, ty)?), ty.clone()))
            }
            GimpleExpr::RealConst { value, ty } => {
                let constant = match primitive_jtype(ty)? {
                    JType::Float => JConst::Float(*value as f32),
                    _ => JConst::Double(*value),
                };
                Ok(GExpr::primitive(JExpr::Const(constant), ty.clone()))
            }
            GimpleExpr::StringConst { value, ty } => self.string_constant(value, ty),
            GimpleExpr::FunctionRef { name, ty } => self.function_pointer(name, ty),
            GimpleExpr::AddressOf { value, .. } => match value.as_ref() {
                GimpleExpr::FunctionRef { name, ty } => self.function_pointer(name, ty),
                other => self.expr(other)?.address_of(),
            },
            GimpleExpr::Component { value, member, .. } => {
                let record = match value.ty() {
                    GimpleType::Record { name } => name.clone(),
                    other => {
                        return Err(Error::internal(format!(
                            "member {} of non-record {}",
                            member, other
                        )))
                    }
                };
                let base = self.expr(value)?;
                self.field(base, &record, member)
            }
            GimpleExpr::MemRef {
                pointer,
                offset,
                ty,
            } => {
                let base = self.expr(pointer)?;
                self.dereference(base, *offset as i32, ty)
            }
            GimpleExpr::ArrayRef { array, index, ty } => {
                let base = self.expr(array)?;
                let index = self.expr(index)?.to_primitive(&JType::Int)?;
                self.array_element(base, index, ty)
            }
            GimpleExpr::Constructor { .. } => Err(Error::internal(
                "constructor outside of an assignment",
            )),
        }
    }

    fn string_constant(&mut self, value: &str, ty: &GimpleType) -> Result<GExpr> {
        let (component, length) = match ty {
            GimpleType::Array {
                component, length, ..
            } => ((**component).clone(), *length),
            _ => (GimpleType::int(8), None),
        };
        let vf = ValueFunction::for_type(&component)?;
        if vf.jtype != JType::Byte {
            return Err(Error::not_supported(format!(
                "string literal of {}",
                component
            )));
        }
        let array = JExpr::static_call(
            &runtime_class("BytePtr"),
            "toArray",
            vf.array_type(),
            vec![JExpr::string(value)],
        );
        Ok(GExpr::ArrayValue {
            vf,
            array: self.ctx.spill(array)?,
            offset: JExpr::int(0),
            length: length.map(|n| n as i32).unwrap_or(value.len() as i32 + 1),
        })
    }

    fn function_pointer(&mut self, name: &str, ty: &GimpleType) -> Result<GExpr> {
        let signature = signature_of(ty)?;
        match self
            .scope
            .functions
            .resolve(name, signature, self.oracle(), self.resolver)?
        {
            CallGenerator::Function(method) => Ok(GExpr::fun_ptr(method.handle())),
            CallGenerator::Builtin(builtin) => Err(Error::not_supported(format!(
                "taking the address of built-in {}",
                builtin.name()
            ))),
        }
    }

    fn field(&mut self, base: GExpr, record: &str, member: &str) -> Result<GExpr> {
        let record = self.oracle().record(record)?;
        let field = record.field(member).ok_or_else(|| {
            Error::internal(format!("Record {} has no field {}", record.name, member))
        })?;
        if field.bit_size.is_some() {
            return Err(Error::not_supported(format!(
                "bit-field {}.{}",
                record.name, member
            )));
        }
        match base {
            GExpr::Memory {
                pointer, offset, ..
            } => Ok(GExpr::Memory {
                pointer,
                offset: offset.plus(JExpr::int(field.offset)),
                ty: field.ty.clone(),
                field: self.oracle().field_strategy(&field.ty)?,
            }),
            other => Err(Error::internal(format!(
                "{} has no fields",
                other.describe()
            ))),
        }
    }

    fn array_element(&mut self, base: GExpr, index: JExpr, ty: &GimpleType) -> Result<GExpr> {
        match base {
            GExpr::ArrayValue {
                vf, array, offset, ..
            } => match ty {
                ty if ty.is_primitive() => {
                    let index = offset.plus(index);
                    Ok(GExpr::Primitive {
                        value: JExpr::element(array.clone(), index.clone())?,
                        ty: ty.clone(),
                        address: Some(Box::new(GExpr::FatPtrPair {
                            vf,
                            array,
                            offset: index,
                        })),
                    })
                }
                GimpleType::Array { .. } => {
                    let length = self.oracle().size_of(ty)? / vf.size;
                    Ok(GExpr::ArrayValue {
                        vf,
                        array,
                        offset: offset.plus(scale(index, length)),
                        length,
                    })
                }
                other => Err(Error::internal(format!(
                    "{} element in a primitive array",
                    other
                ))),
            },
            GExpr::Memory {
                pointer, offset, ..
            } => {
                let size = self.oracle().size_of(ty)?;
                Ok(GExpr::Memory {
                    pointer,
                    offset: offset.plus(scale(index, size)),
                    ty: ty.clone(),
                    field: self.oracle().field_strategy(ty)?,
                })
            }
            other => Err(Error::internal(format!(
                "cannot index {}",
                other.describe()
            ))),
        }
    }

    /// `*(base + offset)` viewed as `ty`.
    ///
    /// A fat pointer read at a whole element of its own type stays an array
    /// access; everything else goes through the runtime pointer interface.
    fn dereference(&mut self, base: GExpr, offset: i32, ty: &GimpleType) -> Result<GExpr> {
        let own = match &base {
            GExpr::FatPtrPair { vf, .. } | GExpr::WrappedFatPtr { vf, .. } => Some(vf.clone()),
            _ => None,
        };
        if let Some(vf) = own.filter(|vf| offset % vf.size == 0) {
            let viewed = match ty {
                GimpleType::Array { component, .. } if component.is_primitive() => {
                    Some(ValueFunction::for_type(component)?)
                }
                ty if ty.is_primitive() => Some(ValueFunction::for_type(ty)?),
                _ => None,
            };
            if let Some(viewed) = viewed.filter(|v| v.jtype == vf.jtype) {
                let (array, start) = base.to_fat_ptr_pair(&mut self.ctx, &vf)?;
                let index = start.plus(JExpr::int(offset / vf.size));
                return match ty {
                    GimpleType::Array { .. } => Ok(GExpr::ArrayValue {
                        length: self.oracle().size_of(ty)? / vf.size,
                        vf: viewed,
                        array,
                        offset: index,
                    }),
                    _ => Ok(GExpr::Primitive {
                        value: JExpr::element(array.clone(), index.clone())?,
                        ty: ty.clone(),
                        address: Some(Box::new(GExpr::FatPtrPair {
                            vf: viewed,
                            array,
                            offset: index,
                        })),
                    }),
                };
            }
        }
        if let GExpr::FunPtr { .. } = base {
            return Err(Error::not_supported("dereferencing a function pointer"));
        }
        let pointer = self.ctx.spill(base.to_vptr()?)?;
        Ok(GExpr::Memory {
            pointer,
            offset: JExpr::int(offset),
            ty: ty.clone(),
            field: self.oracle().field_strategy(ty)?,
        })
    }

    fn call(&mut self, call: &GimpleCall) -> Result<()> {
        let signature = signature_of(call.function.ty())?;
        let (generator, handle) = match call.callee_name() {
            Some(name) => (
                self.scope
                    .functions
                    .resolve(name, signature, self.oracle(), self.resolver)?,
                None,
            ),
            None => {
                let pointer = self.expr(&call.function)?;
                let handle = pointer.to_fun_ptr(&mut self.ctx)?;
                let method = MethodRef::for_signature(
                    "java/lang/invoke/MethodHandle",
                    "invokeExact",
                    signature,
                    self.oracle(),
                )?;
                (CallGenerator::Function(method), Some(self.ctx.spill(handle)?))
            }
        };

        match generator {
            CallGenerator::Builtin(builtin) => {
                let args = call
                    .arguments
                    .iter()
                    .map(|arg| self.expr(arg))
                    .collect::<Result<Vec<_>>>()?;
                let lhs = match &call.lhs {
                    Some(lhs) => Some((self.expr(lhs)?, self.oracle().strategy(lhs.ty())?)),
                    None => None,
                };
                let result = builtin.emit(&args, lhs.as_ref().map(|(_, s)| s), &mut self.ctx)?;
                if let (Some((target, strategy)), Some(value)) = (lhs, result) {
                    let value = strategy.cast(value, &mut self.ctx)?;
                    target.store(&mut self.ctx, &value)?;
                }
                Ok(())
            }
            CallGenerator::Function(method) => {
                let callee = call
                    .callee_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| call.function.to_string());
                if call.arguments.len() > method.params.len() {
                    return Err(Error::not_supported(format!(
                        "variadic call to {}",
                        callee
                    )));
                }
                if call.arguments.len() < method.params.len() {
                    return Err(Error::internal(format!(
                        "{} expects {} arguments, got {}",
                        callee,
                        method.params.len(),
                        call.arguments.len()
                    )));
                }

                let indirect = handle.is_some();
                let mut args: Vec<JExpr> = handle.into_iter().collect();
                for ((arg, param), ty) in call
                    .arguments
                    .iter()
                    .zip(&method.params)
                    .zip(&method.param_types)
                {
                    let value = self.expr(arg)?;
                    let value = self.oracle().strategy(ty)?.cast(value, &mut self.ctx)?;
                    args.extend(param.load_argument(&value, &mut self.ctx)?);
                }
                let invocation = if indirect {
                    JExpr::Call {
                        kind: InvokeKind::Virtual,
                        owner: method.owner.clone(),
                        name: method.name.clone(),
                        descriptor: method.descriptor.clone(),
                        args,
                        ty: method.ret.return_type(),
                    }
                } else {
                    method.invoke(args)
                };

                match &call.lhs {
                    Some(lhs) => {
                        let target = self.expr(lhs)?;
                        let value = method.ret.unmarshal(invocation, &mut self.ctx)?;
                        let value = self.oracle().strategy(lhs.ty())?.cast(value, &mut self.ctx)?;
                        target.store(&mut self.ctx, &value)
                    }
                    None => {
                        invocation.discard(&mut self.ctx.mv);
                        Ok(())
                    }
                }
            }
        }
    }
}

fn operand(assignment: &GimpleAssignment, index: usize) -> Result<&GimpleExpr> {
    assignment.operands.get(index).ok_or_else(|| {
        Error::internal(format!(
            "{} is missing operand {}",
            assignment.op.name(),
            index
        ))
    })
}

fn operand_pair(operands: &[GimpleExpr]) -> Result<(&GimpleExpr, &GimpleExpr)> {
    match operands {
        [left, right] => Ok((left, right)),
        _ => Err(Error::internal(format!(
            "conditional with {} operands",
            operands.len()
        ))),
    }
}

/// The function type called through a function or function pointer operand
fn signature_of(ty: &GimpleType) -> Result<&GimpleType> {
    match ty {
        GimpleType::Function { .. } => Ok(ty),
        GimpleType::Pointer { base } if matches!(**base, GimpleType::Function { .. }) => Ok(base),
        other => Err(Error::internal(format!("{} is not callable", other))),
    }
}

fn integer_constant(value: i64, ty: &GimpleType) -> Result<JConst> {
    Ok(match primitive_jtype(ty)? {
        JType::Long => JConst::Long(value),
        JType::Float => JConst::Float(value as f32),
        JType::Double => JConst::Double(value as f64),
        JType::Boolean => JConst::Int((value != 0) as i32),
        _ => JConst::Int(value as i32),
    })
}

fn mask(stack: &JType, bits: i64) -> JExpr {
    match stack {
        JType::Long => JExpr::Const(JConst::Long(bits)),
        _ => JExpr::int(bits as i32),
    }
}

/// `index * factor`, folded when possible
fn scale(index: JExpr, factor: i32) -> JExpr {
    match index {
        JExpr::Const(JConst::Int(n)) => JExpr::int(n * factor),
        other if factor == 1 => other,
        other => JExpr::binary(JBinOp::Mul, JType::Int, other, JExpr::int(factor)),
    }
}
