//! GIMPLE operand expressions

use super::types::GimpleType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An operand of a GIMPLE statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "expr", rename_all = "snake_case")]
pub enum GimpleExpr {
    /// Reference to a local, parameter or global by id
    VariableRef {
        id: i64,
        #[serde(rename = "type")]
        ty: GimpleType,
    },
    /// `value.member`
    Component {
        value: Box<GimpleExpr>,
        member: String,
        #[serde(rename = "type")]
        ty: GimpleType,
    },
    /// `&value`
    AddressOf {
        value: Box<GimpleExpr>,
        #[serde(rename = "type")]
        ty: GimpleType,
    },
    /// A function, by name
    FunctionRef {
        name: String,
        #[serde(rename = "type")]
        ty: GimpleType,
    },
    IntegerConst {
        value: i64,
        #[serde(rename = "type")]
        ty: GimpleType,
    },
    RealConst {
        value: f64,
        #[serde(rename = "type")]
        ty: GimpleType,
    },
    /// String literal; the type is an array of chars including the terminator
    StringConst {
        value: String,
        #[serde(rename = "type")]
        ty: GimpleType,
    },
    /// `*(pointer + offset)`, offset in bytes
    MemRef {
        pointer: Box<GimpleExpr>,
        #[serde(default)]
        offset: i64,
        #[serde(rename = "type")]
        ty: GimpleType,
    },
    /// `array[index]`
    ArrayRef {
        array: Box<GimpleExpr>,
        index: Box<GimpleExpr>,
        #[serde(rename = "type")]
        ty: GimpleType,
    },
    /// Aggregate initializer; no elements means zero-initialization
    Constructor {
        #[serde(default)]
        elements: Vec<GimpleExpr>,
        #[serde(rename = "type")]
        ty: GimpleType,
    },
}

impl GimpleExpr {
    pub fn var(id: i64, ty: GimpleType) -> Self {
        GimpleExpr::VariableRef { id, ty }
    }

    pub fn int(value: i64, ty: GimpleType) -> Self {
        GimpleExpr::IntegerConst { value, ty }
    }

    pub fn component(value: GimpleExpr, member: impl Into<String>, ty: GimpleType) -> Self {
        GimpleExpr::Component {
            value: Box::new(value),
            member: member.into(),
            ty,
        }
    }

    pub fn address_of(value: GimpleExpr) -> Self {
        let ty = GimpleType::pointer_to(value.ty().clone());
        GimpleExpr::AddressOf {
            value: Box::new(value),
            ty,
        }
    }

    pub fn function_ref(name: impl Into<String>, ty: GimpleType) -> Self {
        GimpleExpr::FunctionRef {
            name: name.into(),
            ty,
        }
    }

    /// The type of the value this expression produces
    pub fn ty(&self) -> &GimpleType {
        match self {
            GimpleExpr::VariableRef { ty, .. }
            | GimpleExpr::Component { ty, .. }
            | GimpleExpr::AddressOf { ty, .. }
            | GimpleExpr::FunctionRef { ty, .. }
            | GimpleExpr::IntegerConst { ty, .. }
            | GimpleExpr::RealConst { ty, .. }
            | GimpleExpr::StringConst { ty, .. }
            | GimpleExpr::MemRef { ty, .. }
            | GimpleExpr::ArrayRef { ty, .. }
            | GimpleExpr::Constructor { ty, .. } => ty,
        }
    }

    pub fn set_type(&mut self, new_type: GimpleType) {
        match self {
            GimpleExpr::VariableRef { ty, .. }
            | GimpleExpr::Component { ty, .. }
            | GimpleExpr::AddressOf { ty, .. }
            | GimpleExpr::FunctionRef { ty, .. }
            | GimpleExpr::IntegerConst { ty, .. }
            | GimpleExpr::RealConst { ty, .. }
            | GimpleExpr::StringConst { ty, .. }
            | GimpleExpr::MemRef { ty, .. }
            | GimpleExpr::ArrayRef { ty, .. }
            | GimpleExpr::Constructor { ty, .. } => *ty = new_type,
        }
    }

    /// Calls `f` on this expression and every nested expression
    pub fn walk(&self, f: &mut impl FnMut(&GimpleExpr)) {
        f(self);
        match self {
            GimpleExpr::Component { value, .. } | GimpleExpr::AddressOf { value, .. } => {
                value.walk(f)
            }
            GimpleExpr::MemRef { pointer, .. } => pointer.walk(f),
            GimpleExpr::ArrayRef { array, index, .. } => {
                array.walk(f);
                index.walk(f);
            }
            GimpleExpr::Constructor { elements, .. } => {
                for e in elements {
                    e.walk(f);
                }
            }
            _ => {}
        }
    }

    /// True if this expression mentions variable `id` anywhere
    pub fn references_variable(&self, id: i64) -> bool {
        let mut found = false;
        self.walk(&mut |e| {
            if let GimpleExpr::VariableRef { id: other, .. } = e {
                found |= *other == id;
            }
        });
        found
    }
}

impl fmt::Display for GimpleExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GimpleExpr::VariableRef { id, .. } => write!(f, "T{}", id),
            GimpleExpr::Component { value, member, .. } => write!(f, "{}.{}", value, member),
            GimpleExpr::AddressOf { value, .. } => write!(f, "&{}", value),
            GimpleExpr::FunctionRef { name, .. } => write!(f, "{}", name),
            GimpleExpr::IntegerConst { value, .. } => write!(f, "{}", value),
            GimpleExpr::RealConst { value, .. } => write!(f, "{}", value),
            GimpleExpr::StringConst { value, .. } => write!(f, "{:?}", value),
            GimpleExpr::MemRef {
                pointer, offset, ..
            } => write!(f, "*({} + {})", pointer, offset),
            GimpleExpr::ArrayRef { array, index, .. } => write!(f, "{}[{}]", array, index),
            GimpleExpr::Constructor { elements, .. } => write!(f, "{{{} elements}}", elements.len()),
        }
    }
}
