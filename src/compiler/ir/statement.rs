//! GIMPLE statements

use super::expr::GimpleExpr;
use super::types::GimpleType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// GIMPLE tree codes used as statement operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GimpleOp {
    // Single-operand copies
    IntegerCst,
    RealCst,
    StringCst,
    AddrExpr,
    VarDecl,
    ParmDecl,
    ComponentRef,
    MemRef,
    ArrayRef,
    Constructor,

    // Conversions
    NopExpr,
    ConvertExpr,
    FixTruncExpr,
    FloatExpr,

    // Unary
    NegateExpr,
    BitNotExpr,
    AbsExpr,
    TruthNotExpr,

    // Binary arithmetic
    PlusExpr,
    MinusExpr,
    MultExpr,
    TruncDivExpr,
    TruncModExpr,
    RdivExpr,
    PointerPlusExpr,
    PointerDiffExpr,
    BitAndExpr,
    BitIorExpr,
    BitXorExpr,
    LshiftExpr,
    RshiftExpr,
    MinExpr,
    MaxExpr,

    // Comparisons
    EqExpr,
    NeExpr,
    LtExpr,
    LeExpr,
    GtExpr,
    GeExpr,
}

impl GimpleOp {
    /// Ops whose result is the first operand unchanged
    pub fn is_copy(&self) -> bool {
        matches!(
            self,
            GimpleOp::IntegerCst
                | GimpleOp::RealCst
                | GimpleOp::StringCst
                | GimpleOp::AddrExpr
                | GimpleOp::VarDecl
                | GimpleOp::ParmDecl
                | GimpleOp::ComponentRef
                | GimpleOp::MemRef
                | GimpleOp::ArrayRef
                | GimpleOp::Constructor
        )
    }

    pub fn is_conversion(&self) -> bool {
        matches!(
            self,
            GimpleOp::NopExpr | GimpleOp::ConvertExpr | GimpleOp::FixTruncExpr | GimpleOp::FloatExpr
        )
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            GimpleOp::EqExpr
                | GimpleOp::NeExpr
                | GimpleOp::LtExpr
                | GimpleOp::LeExpr
                | GimpleOp::GtExpr
                | GimpleOp::GeExpr
        )
    }

    /// Tree code name as written by the front end
    pub fn name(&self) -> String {
        serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| format!("{:?}", self))
    }
}

/// `lhs = op(operands...)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GimpleAssignment {
    pub op: GimpleOp,
    pub lhs: GimpleExpr,
    pub operands: Vec<GimpleExpr>,
}

impl GimpleAssignment {
    pub fn new(op: GimpleOp, lhs: GimpleExpr, operands: Vec<GimpleExpr>) -> Self {
        Self { op, lhs, operands }
    }
}

/// `lhs = function(arguments...)`, or a call for effect only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GimpleCall {
    #[serde(default)]
    pub lhs: Option<GimpleExpr>,
    pub function: GimpleExpr,
    #[serde(default)]
    pub arguments: Vec<GimpleExpr>,
}

impl GimpleCall {
    /// Name of the callee, if it is called directly
    pub fn callee_name(&self) -> Option<&str> {
        match &self.function {
            GimpleExpr::FunctionRef { name, .. } => Some(name),
            GimpleExpr::AddressOf { value, .. } => match value.as_ref() {
                GimpleExpr::FunctionRef { name, .. } => Some(name),
                _ => None,
            },
            _ => None,
        }
    }
}

/// `if (lhs op rhs) goto true_label; else goto false_label;`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GimpleConditional {
    pub op: GimpleOp,
    pub operands: Vec<GimpleExpr>,
    pub true_label: i32,
    pub false_label: i32,
}

/// A statement within a basic block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stmt", rename_all = "snake_case")]
pub enum GimpleStatement {
    Assign(GimpleAssignment),
    Call(GimpleCall),
    Return {
        #[serde(default)]
        value: Option<GimpleExpr>,
    },
    Goto {
        target: i32,
    },
    Conditional(GimpleConditional),
}

impl GimpleStatement {
    /// Every expression appearing in this statement, outermost first
    pub fn expressions(&self) -> Vec<&GimpleExpr> {
        match self {
            GimpleStatement::Assign(a) => std::iter::once(&a.lhs).chain(&a.operands).collect(),
            GimpleStatement::Call(c) => c
                .lhs
                .iter()
                .chain(std::iter::once(&c.function))
                .chain(&c.arguments)
                .collect(),
            GimpleStatement::Return { value } => value.iter().collect(),
            GimpleStatement::Goto { .. } => Vec::new(),
            GimpleStatement::Conditional(c) => c.operands.iter().collect(),
        }
    }

    pub fn references_variable(&self, id: i64) -> bool {
        self.expressions()
            .into_iter()
            .any(|e| e.references_variable(id))
    }

    pub fn as_assignment(&self) -> Option<&GimpleAssignment> {
        match self {
            GimpleStatement::Assign(a) => Some(a),
            _ => None,
        }
    }
}

impl fmt::Display for GimpleStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GimpleStatement::Assign(a) => {
                write!(f, "{} = {}(", a.lhs, a.op.name())?;
                for (i, o) in a.operands.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", o)?;
                }
                write!(f, ")")
            }
            GimpleStatement::Call(c) => {
                if let Some(lhs) = &c.lhs {
                    write!(f, "{} = ", lhs)?;
                }
                write!(f, "{}(", c.function)?;
                for (i, a) in c.arguments.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ")")
            }
            GimpleStatement::Return { value: Some(v) } => write!(f, "return {}", v),
            GimpleStatement::Return { value: None } => write!(f, "return"),
            GimpleStatement::Goto { target } => write!(f, "goto <bb {}>", target),
            GimpleStatement::Conditional(c) => write!(
                f,
                "if ({}) goto <bb {}>; else goto <bb {}>",
                c.op.name(),
                c.true_label,
                c.false_label
            ),
        }
    }
}

/// Convenience for building `lhs = (int) rhs` style conversions
pub fn conversion(lhs: GimpleExpr, operand: GimpleExpr) -> GimpleStatement {
    GimpleStatement::Assign(GimpleAssignment::new(GimpleOp::NopExpr, lhs, vec![operand]))
}

/// A 32-bit signed integer type
pub fn int32() -> GimpleType {
    GimpleType::int(32)
}
