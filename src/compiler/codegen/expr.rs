//! Expression trees over the target model, and the instruction sink they are
//! emitted into.

use super::jvm::{Cond, InvokeKind, Insn, JBinOp, JConst, JType, Label};
use crate::{Error, Result};

/// Collects the instructions of one method
#[derive(Debug, Default)]
pub struct MethodGenerator {
    insns: Vec<Insn>,
    next_label: u32,
}

impl MethodGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, insn: Insn) {
        self.insns.push(insn);
    }

    pub fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    pub fn mark(&mut self, label: Label) {
        self.emit(Insn::Mark { label });
    }

    pub fn goto(&mut self, target: Label) {
        self.emit(Insn::Goto { target });
    }

    pub fn iconst(&mut self, value: i32) {
        self.emit(Insn::Push(JConst::Int(value)));
    }

    pub fn insns(&self) -> &[Insn] {
        &self.insns
    }

    pub fn into_insns(self) -> Vec<Insn> {
        self.insns
    }

    /// Emits `throw new IllegalStateException(message)`
    pub fn throw_error(&mut self, message: &str) {
        let class = "java/lang/IllegalStateException";
        self.emit(Insn::New {
            class: class.to_string(),
        });
        self.emit(Insn::Dup);
        self.emit(Insn::Push(JConst::String(message.to_string())));
        self.emit(Insn::Invoke {
            kind: InvokeKind::Special,
            owner: class.to_string(),
            name: "<init>".to_string(),
            descriptor: "(Ljava/lang/String;)V".to_string(),
        });
        self.emit(Insn::Throw);
    }
}

/// A value-producing expression, or a storage location when it is one of
/// `Local`, `Static`, `Field` or `ArrayElement`.
#[derive(Debug, Clone, PartialEq)]
pub enum JExpr {
    Local {
        index: u16,
        ty: JType,
    },
    Static {
        owner: String,
        name: String,
        ty: JType,
    },
    Field {
        object: Box<JExpr>,
        owner: String,
        name: String,
        ty: JType,
    },
    ArrayElement {
        array: Box<JExpr>,
        index: Box<JExpr>,
        ty: JType,
    },
    Const(JConst),
    Null(JType),
    Call {
        kind: InvokeKind,
        owner: String,
        name: String,
        descriptor: String,
        /// Receiver first for instance calls
        args: Vec<JExpr>,
        ty: JType,
    },
    NewArray {
        component: JType,
        length: Box<JExpr>,
    },
    Binary {
        op: JBinOp,
        ty: JType,
        left: Box<JExpr>,
        right: Box<JExpr>,
    },
    Neg {
        value: Box<JExpr>,
        ty: JType,
    },
    Convert {
        value: Box<JExpr>,
        to: JType,
    },
    CheckCast {
        value: Box<JExpr>,
        class: String,
    },
    /// 1 if `left cond right`, else 0
    Compare {
        cond: Cond,
        left: Box<JExpr>,
        right: Box<JExpr>,
    },
    MethodHandle {
        owner: String,
        name: String,
        descriptor: String,
    },
}

impl JExpr {
    pub fn int(value: i32) -> Self {
        JExpr::Const(JConst::Int(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        JExpr::Const(JConst::String(value.into()))
    }

    pub fn static_call(owner: &str, name: &str, ret: JType, args: Vec<JExpr>) -> Self {
        let params: Vec<JType> = args.iter().map(JExpr::ty).collect();
        JExpr::Call {
            kind: InvokeKind::Static,
            descriptor: JType::method_descriptor(&ret, &params),
            owner: owner.to_string(),
            name: name.to_string(),
            args,
            ty: ret,
        }
    }

    /// Calls an interface method; `params` excludes the receiver
    pub fn interface_call(
        receiver: JExpr,
        owner: &str,
        name: &str,
        params: &[JType],
        ret: JType,
        args: Vec<JExpr>,
    ) -> Self {
        let mut all = vec![receiver];
        all.extend(args);
        JExpr::Call {
            kind: InvokeKind::Interface,
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: JType::method_descriptor(&ret, params),
            args: all,
            ty: ret,
        }
    }

    pub fn binary(op: JBinOp, ty: JType, left: JExpr, right: JExpr) -> Self {
        JExpr::Binary {
            op,
            ty,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn element(array: JExpr, index: JExpr) -> Result<Self> {
        match array.ty() {
            JType::Array(component) => Ok(JExpr::ArrayElement {
                array: Box::new(array),
                index: Box::new(index),
                ty: *component,
            }),
            other => Err(Error::internal(format!(
                "Cannot index a value of type {}",
                other
            ))),
        }
    }

    pub fn field(object: JExpr, owner: &str, name: &str, ty: JType) -> Self {
        JExpr::Field {
            object: Box::new(object),
            owner: owner.to_string(),
            name: name.to_string(),
            ty,
        }
    }

    pub fn convert(self, to: JType) -> Self {
        match (&self, &to) {
            (JExpr::Const(JConst::Long(n)), JType::Int) => return JExpr::int(*n as i32),
            (JExpr::Const(JConst::Int(n)), JType::Long) => return JExpr::Const(JConst::Long(*n as i64)),
            _ => {}
        }
        if self.ty().stack_type() == to.stack_type() && !matches!(to, JType::Byte | JType::Short | JType::Char) {
            return self;
        }
        JExpr::Convert {
            value: Box::new(self),
            to,
        }
    }

    pub fn check_cast(self, class: &str) -> Self {
        if self.ty().internal_name() == Some(class) {
            return self;
        }
        JExpr::CheckCast {
            value: Box::new(self),
            class: class.to_string(),
        }
    }

    pub fn compare(cond: Cond, left: JExpr, right: JExpr) -> Self {
        JExpr::Compare {
            cond,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// `self + delta`, folding constant zero
    pub fn plus(self, delta: JExpr) -> Self {
        match (&self, &delta) {
            (_, JExpr::Const(JConst::Int(0))) => self,
            (JExpr::Const(JConst::Int(0)), _) => delta,
            (JExpr::Const(JConst::Int(a)), JExpr::Const(JConst::Int(b))) => JExpr::int(a + b),
            _ => JExpr::binary(JBinOp::Add, JType::Int, self, delta),
        }
    }

    pub fn ty(&self) -> JType {
        match self {
            JExpr::Local { ty, .. }
            | JExpr::Static { ty, .. }
            | JExpr::Field { ty, .. }
            | JExpr::ArrayElement { ty, .. }
            | JExpr::Call { ty, .. }
            | JExpr::Binary { ty, .. }
            | JExpr::Neg { ty, .. }
            | JExpr::Null(ty)
            | JExpr::Convert { to: ty, .. } => ty.clone(),
            JExpr::Const(c) => c.ty(),
            JExpr::NewArray { component, .. } => JType::array_of(component.clone()),
            JExpr::CheckCast { class, .. } => JType::object(class.clone()),
            JExpr::Compare { .. } => JType::Int,
            JExpr::MethodHandle { .. } => JType::method_handle(),
        }
    }

    pub fn is_lvalue(&self) -> bool {
        matches!(
            self,
            JExpr::Local { .. } | JExpr::Static { .. } | JExpr::Field { .. } | JExpr::ArrayElement { .. }
        )
    }

    /// Pushes the value of this expression
    pub fn load(&self, mv: &mut MethodGenerator) {
        match self {
            JExpr::Local { index, ty } => mv.emit(Insn::Load {
                ty: ty.stack_type(),
                index: *index,
            }),
            JExpr::Static { owner, name, ty } => mv.emit(Insn::GetStatic {
                owner: owner.clone(),
                name: name.clone(),
                ty: ty.clone(),
            }),
            JExpr::Field {
                object,
                owner,
                name,
                ty,
            } => {
                object.load(mv);
                mv.emit(Insn::GetField {
                    owner: owner.clone(),
                    name: name.clone(),
                    ty: ty.clone(),
                });
            }
            JExpr::ArrayElement { array, index, ty } => {
                array.load(mv);
                index.load(mv);
                mv.emit(Insn::ArrayLoad { ty: ty.clone() });
            }
            JExpr::Const(c) => mv.emit(Insn::Push(c.clone())),
            JExpr::Null(_) => mv.emit(Insn::PushNull),
            JExpr::Call {
                kind,
                owner,
                name,
                descriptor,
                args,
                ..
            } => {
                for arg in args {
                    arg.load(mv);
                }
                mv.emit(Insn::Invoke {
                    kind: *kind,
                    owner: owner.clone(),
                    name: name.clone(),
                    descriptor: descriptor.clone(),
                });
            }
            JExpr::NewArray { component, length } => {
                length.load(mv);
                mv.emit(Insn::NewArray {
                    component: component.clone(),
                });
            }
            JExpr::Binary {
                op,
                ty,
                left,
                right,
            } => {
                left.load(mv);
                right.load(mv);
                mv.emit(Insn::Binary {
                    op: *op,
                    ty: ty.stack_type(),
                });
            }
            JExpr::Neg { value, ty } => {
                value.load(mv);
                mv.emit(Insn::Neg {
                    ty: ty.stack_type(),
                });
            }
            JExpr::Convert { value, to } => {
                value.load(mv);
                mv.emit(Insn::Convert {
                    from: value.ty().stack_type(),
                    to: to.clone(),
                });
            }
            JExpr::CheckCast { value, class } => {
                value.load(mv);
                mv.emit(Insn::CheckCast {
                    class: class.clone(),
                });
            }
            JExpr::Compare { cond, left, right } => {
                let when_true = mv.new_label();
                let done = mv.new_label();
                left.load(mv);
                right.load(mv);
                mv.emit(Insn::IfCmp {
                    cond: *cond,
                    ty: left.ty().stack_type(),
                    target: when_true,
                });
                mv.iconst(0);
                mv.goto(done);
                mv.mark(when_true);
                mv.iconst(1);
                mv.mark(done);
            }
            JExpr::MethodHandle {
                owner,
                name,
                descriptor,
            } => mv.emit(Insn::PushHandle {
                owner: owner.clone(),
                name: name.clone(),
                descriptor: descriptor.clone(),
            }),
        }
    }

    /// Stores `value` into this location
    pub fn store(&self, mv: &mut MethodGenerator, value: &JExpr) -> Result<()> {
        match self {
            JExpr::Local { .. } | JExpr::Static { .. } => {
                value.load(mv);
                self.store_top(mv)
            }
            JExpr::Field {
                object,
                owner,
                name,
                ty,
            } => {
                object.load(mv);
                value.load(mv);
                mv.emit(Insn::PutField {
                    owner: owner.clone(),
                    name: name.clone(),
                    ty: ty.clone(),
                });
                Ok(())
            }
            JExpr::ArrayElement { array, index, ty } => {
                array.load(mv);
                index.load(mv);
                value.load(mv);
                mv.emit(Insn::ArrayStore { ty: ty.clone() });
                Ok(())
            }
            other => Err(Error::internal(format!("Cannot store into {:?}", other))),
        }
    }

    /// Stores the value on top of the stack into this local or static
    pub fn store_top(&self, mv: &mut MethodGenerator) -> Result<()> {
        match self {
            JExpr::Local { index, ty } => {
                mv.emit(Insn::Store {
                    ty: ty.stack_type(),
                    index: *index,
                });
                Ok(())
            }
            JExpr::Static { owner, name, ty } => {
                mv.emit(Insn::PutStatic {
                    owner: owner.clone(),
                    name: name.clone(),
                    ty: ty.clone(),
                });
                Ok(())
            }
            other => Err(Error::internal(format!(
                "Cannot store from the stack into {:?}",
                other
            ))),
        }
    }

    /// Evaluates this expression for its side effects only
    pub fn discard(&self, mv: &mut MethodGenerator) {
        self.load(mv);
        if self.ty() != JType::Void {
            mv.emit(Insn::Pop);
        }
    }
}
