//! Local slot and static field allocation

use super::expr::{JExpr, MethodGenerator};
use super::jvm::{ClassFile, FieldDecl, JType, PUBLIC_STATIC};
use crate::link::ACC_STATIC;
use crate::Result;
use std::collections::HashSet;

/// Hands out local variable slots. Longs and doubles take two.
#[derive(Debug, Default)]
pub struct LocalVarAllocator {
    next: u16,
    names: Vec<(String, u16)>,
}

impl LocalVarAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve(&mut self, name: impl Into<String>, ty: JType) -> JExpr {
        let index = self.next;
        self.next += if ty.is_wide() { 2 } else { 1 };
        self.names.push((name.into(), index));
        JExpr::Local { index, ty }
    }

    /// Reserves a local holding a one-element array of `component`
    pub fn reserve_unit_array(&mut self, name: impl Into<String>, component: JType) -> JExpr {
        self.reserve(name, JType::array_of(component))
    }

    pub fn max_locals(&self) -> u16 {
        self.next
    }

    /// Slot of a named local, if one was reserved
    pub fn slot(&self, name: &str) -> Option<u16> {
        self.names
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, index)| *index)
    }
}

/// Instruction sink plus local slots of the method being generated
#[derive(Debug, Default)]
pub struct MethodContext {
    pub mv: MethodGenerator,
    pub locals: LocalVarAllocator,
    temps: u32,
}

impl MethodContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` in a fresh temporary unless it can be evaluated twice
    /// without side effects.
    pub fn spill(&mut self, value: JExpr) -> Result<JExpr> {
        match value {
            JExpr::Local { .. } | JExpr::Static { .. } | JExpr::Const(_) | JExpr::Null(_) => {
                Ok(value)
            }
            other => {
                self.temps += 1;
                let temp = self.locals.reserve(format!("$tmp{}", self.temps), other.ty());
                temp.store(&mut self.mv, &other)?;
                Ok(temp)
            }
        }
    }
}

/// Declares the static fields of a unit class and collects the statements
/// of its static initializer.
#[derive(Debug)]
pub struct GlobalVarAllocator {
    owner: String,
    used: HashSet<String>,
    fields: Vec<FieldDecl>,
    pub clinit: MethodContext,
}

impl GlobalVarAllocator {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            used: HashSet::new(),
            fields: Vec::new(),
            clinit: MethodContext::new(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Declares a static field. `public` fields keep their exact name so
    /// they can be linked; private ones are renamed on collision.
    pub fn reserve(&mut self, name: &str, ty: JType, public: bool) -> JExpr {
        let mut field_name = name.to_string();
        let mut suffix = 1;
        while !public && self.used.contains(&field_name) {
            field_name = format!("{}${}", name, suffix);
            suffix += 1;
        }
        self.used.insert(field_name.clone());
        self.fields.push(FieldDecl {
            name: field_name.clone(),
            descriptor: ty.descriptor(),
            access: if public { PUBLIC_STATIC } else { ACC_STATIC },
        });
        JExpr::Static {
            owner: self.owner.clone(),
            name: field_name,
            ty,
        }
    }

    pub fn has_initializer(&self) -> bool {
        !self.clinit.mv.insns().is_empty()
    }

    /// Adds the fields to `class`
    pub fn write_fields(&self, class: &mut ClassFile) {
        class.fields.extend(self.fields.iter().cloned());
    }
}
