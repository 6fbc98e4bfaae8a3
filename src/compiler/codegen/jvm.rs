//! Target class model: types, instructions, and class files.
//!
//! Instructions are symbolic. Encoding them into a concrete bytecode format
//! is outside this crate; the model is serialized as JSON instead.

use crate::link::{ClassInfo, MemberInfo, ACC_PUBLIC, ACC_STATIC};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A type on the managed runtime
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum JType {
    Void,
    Boolean,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
    /// Class or interface, by internal name
    Object(String),
    Array(Box<JType>),
}

impl JType {
    pub fn object(internal_name: impl Into<String>) -> Self {
        JType::Object(internal_name.into())
    }

    pub fn array_of(component: JType) -> Self {
        JType::Array(Box::new(component))
    }

    pub fn string() -> Self {
        JType::object("java/lang/String")
    }

    pub fn method_handle() -> Self {
        JType::object("java/lang/invoke/MethodHandle")
    }

    pub fn descriptor(&self) -> String {
        match self {
            JType::Void => "V".to_string(),
            JType::Boolean => "Z".to_string(),
            JType::Byte => "B".to_string(),
            JType::Short => "S".to_string(),
            JType::Char => "C".to_string(),
            JType::Int => "I".to_string(),
            JType::Long => "J".to_string(),
            JType::Float => "F".to_string(),
            JType::Double => "D".to_string(),
            JType::Object(name) => format!("L{};", name),
            JType::Array(component) => format!("[{}", component.descriptor()),
        }
    }

    /// Parses one type from the front of `descriptor`, returning the rest
    pub fn parse_prefix(descriptor: &str) -> Option<(JType, &str)> {
        let mut chars = descriptor.chars();
        let ty = match chars.next()? {
            'V' => JType::Void,
            'Z' => JType::Boolean,
            'B' => JType::Byte,
            'S' => JType::Short,
            'C' => JType::Char,
            'I' => JType::Int,
            'J' => JType::Long,
            'F' => JType::Float,
            'D' => JType::Double,
            'L' => {
                let end = descriptor.find(';')?;
                return Some((JType::object(&descriptor[1..end]), &descriptor[end + 1..]));
            }
            '[' => {
                let (component, rest) = JType::parse_prefix(&descriptor[1..])?;
                return Some((JType::array_of(component), rest));
            }
            _ => return None,
        };
        Some((ty, &descriptor[1..]))
    }

    /// Parses a complete field descriptor
    pub fn parse(descriptor: &str) -> Option<JType> {
        match JType::parse_prefix(descriptor)? {
            (ty, "") => Some(ty),
            _ => None,
        }
    }

    /// Builds a method descriptor
    pub fn method_descriptor(return_type: &JType, params: &[JType]) -> String {
        let params: String = params.iter().map(JType::descriptor).collect();
        format!("({}){}", params, return_type.descriptor())
    }

    /// Splits a method descriptor into parameter types and return type
    pub fn parse_method_descriptor(descriptor: &str) -> Option<(Vec<JType>, JType)> {
        let mut rest = descriptor.strip_prefix('(')?;
        let mut params = Vec::new();
        while !rest.starts_with(')') {
            let (ty, tail) = JType::parse_prefix(rest)?;
            params.push(ty);
            rest = tail;
        }
        Some((params, JType::parse(&rest[1..])?))
    }

    /// Internal name of a class type
    pub fn internal_name(&self) -> Option<&str> {
        match self {
            JType::Object(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, JType::Object(_) | JType::Array(_))
    }

    /// Occupies two local variable slots
    pub fn is_wide(&self) -> bool {
        matches!(self, JType::Long | JType::Double)
    }

    /// The type as held on the operand stack: sub-int types widen to int
    pub fn stack_type(&self) -> JType {
        match self {
            JType::Boolean | JType::Byte | JType::Short | JType::Char => JType::Int,
            other => other.clone(),
        }
    }
}

impl fmt::Display for JType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.descriptor())
    }
}

impl From<JType> for String {
    fn from(ty: JType) -> Self {
        ty.descriptor()
    }
}

impl TryFrom<String> for JType {
    type Error = String;

    fn try_from(descriptor: String) -> Result<Self, Self::Error> {
        JType::parse(&descriptor).ok_or_else(|| format!("invalid descriptor '{}'", descriptor))
    }
}

/// A branch target within one method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label(pub u32);

/// Constant pushed by [`Insn::Push`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JConst {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    /// A class literal, by internal name
    Class(String),
}

impl JConst {
    pub fn ty(&self) -> JType {
        match self {
            JConst::Int(_) => JType::Int,
            JConst::Long(_) => JType::Long,
            JConst::Float(_) => JType::Float,
            JConst::Double(_) => JType::Double,
            JConst::String(_) => JType::string(),
            JConst::Class(_) => JType::object("java/lang/Class"),
        }
    }
}

/// Binary arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JBinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Ushr,
}

/// Branch conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cond {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Cond {
    pub fn negate(self) -> Cond {
        match self {
            Cond::Eq => Cond::Ne,
            Cond::Ne => Cond::Eq,
            Cond::Lt => Cond::Ge,
            Cond::Le => Cond::Gt,
            Cond::Gt => Cond::Le,
            Cond::Ge => Cond::Lt,
        }
    }
}

/// How a method is invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvokeKind {
    Static,
    Interface,
    Virtual,
    Special,
}

/// A symbolic instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Insn {
    Push(JConst),
    PushNull,
    Load { ty: JType, index: u16 },
    Store { ty: JType, index: u16 },
    GetStatic { owner: String, name: String, ty: JType },
    PutStatic { owner: String, name: String, ty: JType },
    GetField { owner: String, name: String, ty: JType },
    PutField { owner: String, name: String, ty: JType },
    Invoke { kind: InvokeKind, owner: String, name: String, descriptor: String },
    /// Pushes a handle to a static method
    PushHandle { owner: String, name: String, descriptor: String },
    NewArray { component: JType },
    ArrayLoad { ty: JType },
    ArrayStore { ty: JType },
    New { class: String },
    CheckCast { class: String },
    Binary { op: JBinOp, ty: JType },
    Neg { ty: JType },
    Convert { from: JType, to: JType },
    /// Compares the two topmost values of type `ty` and branches if `cond` holds
    IfCmp { cond: Cond, ty: JType, target: Label },
    Goto { target: Label },
    Mark { label: Label },
    Dup,
    Pop,
    Return { ty: JType },
    Throw,
}

/// A static field of a generated class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub descriptor: String,
    pub access: u16,
}

/// A method of a generated class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDecl {
    pub name: String,
    pub descriptor: String,
    pub access: u16,
    pub max_locals: u16,
    pub insns: Vec<Insn>,
}

/// A generated class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassFile {
    /// Internal name
    pub name: String,
    pub super_name: String,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<MethodDecl>,
}

impl ClassFile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            super_name: "java/lang/Object".to_string(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn method(&self, name: &str) -> Option<&MethodDecl> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Link-time view of this class
    pub fn info(&self) -> ClassInfo {
        ClassInfo {
            name: self.name.clone(),
            fields: self
                .fields
                .iter()
                .map(|f| MemberInfo::new(&f.name, &f.descriptor, f.access))
                .collect(),
            methods: self
                .methods
                .iter()
                .map(|m| MemberInfo::new(&m.name, &m.descriptor, m.access))
                .collect(),
        }
    }
}

/// Access flags of generated members
pub const PUBLIC_STATIC: u16 = ACC_PUBLIC | ACC_STATIC;
