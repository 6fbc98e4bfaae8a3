//! Representation strategies.
//!
//! Every GIMPLE type that can be stored gets one [`TypeStrategy`]. The
//! strategy decides how many managed slots a variable of that type takes,
//! what they hold, and how values are allocated, cast and passed. The set of
//! strategies is closed; adding a representation means adding a variant and
//! handling it in every match below.

use super::expr::JExpr;
use super::gexpr::{ptr_class, ptr_type, GExpr, ValueFunction};
use super::jvm::{Cond, JConst, JType};
use super::params::{ParamStrategy, ReturnStrategy};
use super::vars::{GlobalVarAllocator, MethodContext};
use crate::compiler::ir::{GimpleType, POINTER_SIZE};
use crate::link::MemberInfo;
use crate::runtime::{malloc_size, runtime_class};
use crate::{Error, Result};

/// How a value of some type is read and written inside pointer-addressed
/// memory, such as a record field or the target of a unified pointer.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldStrategy {
    /// Accessed through `get<suffix>`/`set<suffix>` at a byte offset
    Primitive {
        jtype: JType,
        suffix: &'static str,
        /// Width in bytes, for choosing the aligned accessors
        size: i32,
    },
    /// A pointer slot, accessed through `getPointer`/`setPointer`
    Pointer,
    /// A function pointer slot
    FunPtr,
    /// A record or array stored inline, copied with `memcpy`
    Inline { size: i32 },
}

/// Representation chosen for a GIMPLE type
#[derive(Debug, Clone, PartialEq)]
pub enum TypeStrategy {
    Primitive {
        ty: GimpleType,
        jtype: JType,
    },
    /// Pointer to a primitive: array plus element offset
    FatPtr(ValueFunction),
    /// Pointer to a record, void, or another pointer: one runtime pointer
    VPtr {
        base: GimpleType,
    },
    /// Pointer to a function: a method handle
    FunPtr {
        signature: GimpleType,
    },
    /// Record held in its own zeroed byte block
    Record {
        name: String,
        size: i32,
    },
    /// Fixed-length array; `vf` is set when the component is primitive
    Array {
        component: GimpleType,
        length: i32,
        vf: Option<ValueFunction>,
        size: i32,
    },
}

/// `BytePtr.NULL`, the canonical null pointer
pub fn null_vptr() -> JExpr {
    JExpr::Static {
        owner: runtime_class("BytePtr"),
        name: "NULL".to_string(),
        ty: ptr_type(),
    }
}

/// The zero constant of a primitive type
pub fn zero(jtype: &JType) -> JExpr {
    match jtype {
        JType::Long => JExpr::Const(JConst::Long(0)),
        JType::Float => JExpr::Const(JConst::Float(0.0)),
        JType::Double => JExpr::Const(JConst::Double(0.0)),
        _ => JExpr::int(0),
    }
}

fn is_zero_constant(value: &GExpr) -> bool {
    matches!(
        value,
        GExpr::Primitive {
            value: JExpr::Const(JConst::Int(0)) | JExpr::Const(JConst::Long(0)),
            ..
        }
    )
}

/// Address of a static pointer field, usable from other units
fn field_address(owner: &str, name: &str) -> GExpr {
    GExpr::vptr(JExpr::static_call(
        &runtime_class("PointerFieldPtr"),
        "addressOf",
        ptr_type(),
        vec![
            JExpr::Const(JConst::Class(owner.to_string())),
            JExpr::string(name),
        ],
    ))
}

/// `MixedPtr.malloc(size)`
fn mixed_malloc(size: JExpr) -> JExpr {
    JExpr::static_call(&runtime_class("MixedPtr"), "malloc", ptr_type(), vec![size])
}

impl TypeStrategy {
    /// The GIMPLE type this strategy represents
    pub fn gimple_type(&self) -> GimpleType {
        match self {
            TypeStrategy::Primitive { ty, .. } => ty.clone(),
            TypeStrategy::FatPtr(vf) => GimpleType::pointer_to(vf.ty.clone()),
            TypeStrategy::VPtr { base } => GimpleType::pointer_to(base.clone()),
            TypeStrategy::FunPtr { signature } => GimpleType::pointer_to(signature.clone()),
            TypeStrategy::Record { name, .. } => GimpleType::record(name.clone()),
            TypeStrategy::Array {
                component, length, ..
            } => GimpleType::array_of(component.clone(), Some(*length as i64)),
        }
    }

    pub fn is_pointer(&self) -> bool {
        matches!(
            self,
            TypeStrategy::FatPtr(_) | TypeStrategy::VPtr { .. } | TypeStrategy::FunPtr { .. }
        )
    }

    /// Memory access for values of this type
    pub fn field_strategy(&self) -> Result<FieldStrategy> {
        Ok(match self {
            TypeStrategy::Primitive { ty, jtype } => FieldStrategy::Primitive {
                jtype: jtype.clone(),
                suffix: super::gexpr::accessor_suffix(ty)?,
                size: ty.size_in_bytes(&[])?,
            },
            TypeStrategy::FatPtr(_) | TypeStrategy::VPtr { .. } => FieldStrategy::Pointer,
            TypeStrategy::FunPtr { .. } => FieldStrategy::FunPtr,
            TypeStrategy::Record { size, .. } | TypeStrategy::Array { size, .. } => {
                FieldStrategy::Inline { size: *size }
            }
        })
    }

    /// Declares a local variable and emits its initialization
    pub fn variable(&self, name: &str, addressable: bool, ctx: &mut MethodContext) -> Result<GExpr> {
        match self {
            TypeStrategy::Primitive { ty, jtype } => {
                if addressable {
                    let array = ctx.locals.reserve_unit_array(name, jtype.clone());
                    array.store(&mut ctx.mv, &new_array(jtype.clone(), JExpr::int(1)))?;
                    Ok(unit_array_element(array, ty)?)
                } else {
                    let local = ctx.locals.reserve(name, jtype.clone());
                    local.store(&mut ctx.mv, &zero(jtype))?;
                    Ok(GExpr::primitive(local, ty.clone()))
                }
            }
            TypeStrategy::FatPtr(vf) if !addressable => {
                let array = ctx.locals.reserve(format!("{}$array", name), vf.array_type());
                let offset = ctx.locals.reserve(format!("{}$offset", name), JType::Int);
                array.store(&mut ctx.mv, &JExpr::Null(vf.array_type()))?;
                offset.store(&mut ctx.mv, &JExpr::int(0))?;
                Ok(GExpr::FatPtrPair {
                    vf: vf.clone(),
                    array,
                    offset,
                })
            }
            TypeStrategy::VPtr { .. } if !addressable => {
                let local = ctx.locals.reserve(name, ptr_type());
                local.store(&mut ctx.mv, &null_vptr())?;
                Ok(GExpr::vptr(local))
            }
            TypeStrategy::FunPtr { .. } if !addressable => {
                let local = ctx.locals.reserve(name, JType::method_handle());
                local.store(&mut ctx.mv, &JExpr::Null(JType::method_handle()))?;
                Ok(GExpr::fun_ptr(local))
            }
            TypeStrategy::FatPtr(_) | TypeStrategy::VPtr { .. } | TypeStrategy::FunPtr { .. } => {
                self.pointer_cell(name, None, ctx)
            }
            TypeStrategy::Record { size, .. } => {
                let local = ctx.locals.reserve(name, ptr_type());
                local.store(&mut ctx.mv, &mixed_malloc(JExpr::int(*size)))?;
                self.memory_at(local)
            }
            TypeStrategy::Array {
                vf: Some(vf),
                length,
                ..
            } => {
                let local = ctx.locals.reserve(name, vf.array_type());
                local.store(&mut ctx.mv, &new_array(vf.jtype.clone(), JExpr::int(*length)))?;
                Ok(GExpr::ArrayValue {
                    vf: vf.clone(),
                    array: local,
                    offset: JExpr::int(0),
                    length: *length,
                })
            }
            TypeStrategy::Array { size, .. } => {
                let local = ctx.locals.reserve(name, ptr_type());
                local.store(&mut ctx.mv, &mixed_malloc(JExpr::int(*size)))?;
                self.memory_at(local)
            }
        }
    }

    /// A one-slot `PointerPtr` holding a pointer whose address is taken.
    /// `initial` is stored into the slot when given.
    pub fn pointer_cell(
        &self,
        name: &str,
        initial: Option<JExpr>,
        ctx: &mut MethodContext,
    ) -> Result<GExpr> {
        let pointer_ptr = runtime_class("PointerPtr");
        let cell = ctx
            .locals
            .reserve(format!("{}$address", name), JType::object(pointer_ptr.clone()));
        let malloc = JExpr::static_call(
            &pointer_ptr,
            "malloc",
            JType::object(pointer_ptr.clone()),
            vec![JExpr::int(POINTER_SIZE)],
        );
        cell.store(&mut ctx.mv, &malloc)?;
        let memory = self.memory_at(cell)?;
        if let Some(value) = initial {
            memory.store(ctx, &GExpr::vptr(value))?;
        }
        Ok(memory)
    }

    /// A value of this type at the start of the memory `pointer` addresses
    pub fn memory_at(&self, pointer: JExpr) -> Result<GExpr> {
        Ok(GExpr::Memory {
            pointer,
            offset: JExpr::int(0),
            ty: self.gimple_type(),
            field: self.field_strategy()?,
        })
    }

    /// Type of the static field holding a global of this type
    pub fn global_field_type(&self, addressable: bool) -> JType {
        match self {
            TypeStrategy::Primitive { jtype, .. } if addressable => JType::array_of(jtype.clone()),
            TypeStrategy::Primitive { jtype, .. } => jtype.clone(),
            TypeStrategy::FatPtr(vf) => vf.wrapper_type(),
            TypeStrategy::FunPtr { .. } => JType::method_handle(),
            TypeStrategy::Array { vf: Some(vf), .. } => vf.array_type(),
            TypeStrategy::VPtr { .. } | TypeStrategy::Record { .. } | TypeStrategy::Array { .. } => {
                ptr_type()
            }
        }
    }

    /// Declares a global as a static field and emits its allocation into the
    /// static initializer.
    pub fn global_variable(
        &self,
        globals: &mut GlobalVarAllocator,
        name: &str,
        addressable: bool,
        public: bool,
    ) -> Result<GExpr> {
        let field = globals.reserve(name, self.global_field_type(addressable), public);
        let initial = match self {
            TypeStrategy::Primitive { jtype, .. } if addressable => {
                Some(new_array(jtype.clone(), JExpr::int(1)))
            }
            TypeStrategy::Primitive { .. } | TypeStrategy::FunPtr { .. } => None,
            TypeStrategy::FatPtr(vf) => Some(vf.wrap(JExpr::Null(vf.array_type()), JExpr::int(0))),
            TypeStrategy::VPtr { .. } => Some(null_vptr()),
            TypeStrategy::Record { size, .. } => Some(mixed_malloc(JExpr::int(*size))),
            TypeStrategy::Array {
                vf: Some(vf),
                length,
                ..
            } => Some(new_array(vf.jtype.clone(), JExpr::int(*length))),
            TypeStrategy::Array { size, .. } => Some(mixed_malloc(JExpr::int(*size))),
        };
        if let Some(value) = initial {
            field.store(&mut globals.clinit.mv, &value)?;
        }
        let owner = globals.owner().to_string();
        self.bind_static(field, &owner, addressable)
    }

    /// Binds a global defined in another unit, given its linked field
    pub fn linked_global(&self, owner: &str, member: &MemberInfo) -> Result<GExpr> {
        let ty = JType::parse(&member.descriptor).ok_or_else(|| Error::MalformedSymbol {
            name: member.name.clone(),
            reason: format!("invalid field descriptor '{}'", member.descriptor),
        })?;
        let addressable = matches!(self, TypeStrategy::Primitive { .. }) && ty.is_reference();
        let expected = self.global_field_type(addressable);
        if ty != expected {
            return Err(Error::internal(format!(
                "Global {} has type {}, expected {}",
                member.name, ty, expected
            )));
        }
        let field = JExpr::Static {
            owner: owner.to_string(),
            name: member.name.clone(),
            ty,
        };
        self.bind_static(field, owner, addressable)
    }

    fn bind_static(&self, field: JExpr, owner: &str, addressable: bool) -> Result<GExpr> {
        let name = match &field {
            JExpr::Static { name, .. } => name.clone(),
            _ => return Err(Error::internal("global is not a static field")),
        };
        Ok(match self {
            TypeStrategy::Primitive { ty, .. } if addressable => unit_array_element(field, ty)?,
            TypeStrategy::Primitive { ty, .. } => GExpr::primitive(field, ty.clone()),
            TypeStrategy::FatPtr(vf) => GExpr::WrappedFatPtr {
                vf: vf.clone(),
                wrapper: field,
                address: Some(Box::new(field_address(owner, &name))),
            },
            TypeStrategy::VPtr { .. } => GExpr::VPtr {
                pointer: field,
                address: Some(Box::new(field_address(owner, &name))),
            },
            TypeStrategy::FunPtr { .. } => GExpr::FunPtr {
                handle: field,
                address: Some(Box::new(field_address(owner, &name))),
            },
            TypeStrategy::Array {
                vf: Some(vf),
                length,
                ..
            } => GExpr::ArrayValue {
                vf: vf.clone(),
                array: field,
                offset: JExpr::int(0),
                length: *length,
            },
            TypeStrategy::Record { .. } | TypeStrategy::Array { .. } => self.memory_at(field)?,
        })
    }

    /// Allocates `size` bytes and returns a pointer of this strategy's shape
    pub fn malloc(&self, size: JExpr) -> Result<GExpr> {
        match self {
            TypeStrategy::FatPtr(vf) => {
                let length = match size {
                    JExpr::Const(JConst::Int(bytes)) => JExpr::int(malloc_size(bytes, vf.size)),
                    other if vf.size == 1 => other,
                    other => JExpr::binary(
                        super::jvm::JBinOp::Div,
                        JType::Int,
                        other.plus(JExpr::int(vf.size - 1)),
                        JExpr::int(vf.size),
                    ),
                };
                Ok(GExpr::FatPtrPair {
                    vf: vf.clone(),
                    array: new_array(vf.jtype.clone(), length),
                    offset: JExpr::int(0),
                })
            }
            TypeStrategy::VPtr { base } => {
                let class = vptr_region_class(base)?;
                Ok(GExpr::vptr(JExpr::static_call(
                    &class,
                    "malloc",
                    JType::object(class.clone()),
                    vec![size],
                )))
            }
            other => Err(Error::unsupported_type("malloc", other.gimple_type())),
        }
    }

    /// The null value of a pointer strategy
    pub fn null_pointer(&self) -> Result<GExpr> {
        match self {
            TypeStrategy::FatPtr(vf) => Ok(GExpr::FatPtrPair {
                vf: vf.clone(),
                array: JExpr::Null(vf.array_type()),
                offset: JExpr::int(0),
            }),
            TypeStrategy::VPtr { .. } => Ok(GExpr::vptr(null_vptr())),
            TypeStrategy::FunPtr { .. } => Ok(GExpr::fun_ptr(JExpr::Null(JType::method_handle()))),
            other => Err(Error::unsupported_type("null pointer", other.gimple_type())),
        }
    }

    /// Converts `value` to this strategy's shape
    pub fn cast(&self, value: GExpr, ctx: &mut MethodContext) -> Result<GExpr> {
        match self {
            TypeStrategy::Primitive { ty, jtype } => {
                Ok(GExpr::primitive(cast_primitive(&value, ty, jtype)?, ty.clone()))
            }
            TypeStrategy::FatPtr(vf) => match value {
                ref v if is_zero_constant(v) => self.null_pointer(),
                GExpr::Primitive { .. } => Err(Error::not_supported(format!(
                    "conversion of an integer value to {}",
                    self.gimple_type()
                ))),
                GExpr::FunPtr { .. } => Err(Error::not_supported(
                    "conversion of a function pointer to a data pointer",
                )),
                GExpr::ArrayValue { .. } => {
                    let decayed = value.address_of()?;
                    self.cast(decayed, ctx)
                }
                other => {
                    let (array, offset) = other.to_fat_ptr_pair(ctx, vf)?;
                    Ok(GExpr::FatPtrPair {
                        vf: vf.clone(),
                        array,
                        offset,
                    })
                }
            },
            TypeStrategy::VPtr { .. } => match value {
                ref v if is_zero_constant(v) => self.null_pointer(),
                GExpr::ArrayValue { .. } => Ok(GExpr::vptr(value.to_aggregate_ptr()?)),
                other => Ok(GExpr::vptr(other.to_vptr()?)),
            },
            TypeStrategy::FunPtr { .. } => match value {
                ref v if is_zero_constant(v) => self.null_pointer(),
                GExpr::FunPtr { .. } => Ok(value),
                GExpr::Memory { .. } | GExpr::VPtr { .. } => {
                    Ok(GExpr::fun_ptr(value.to_fun_ptr(ctx)?))
                }
                other => Err(Error::not_supported(format!(
                    "conversion of {} to a function pointer",
                    other.describe()
                ))),
            },
            TypeStrategy::Record { .. } | TypeStrategy::Array { .. } => Ok(value),
        }
    }

    /// How a parameter of this type is passed
    pub fn param_strategy(&self, layout: super::params::FatPtrParamLayout) -> Result<ParamStrategy> {
        use super::params::FatPtrParamLayout;
        Ok(match self {
            TypeStrategy::Primitive { ty, jtype } => ParamStrategy::Primitive {
                ty: ty.clone(),
                jtype: jtype.clone(),
            },
            TypeStrategy::FatPtr(vf) => match layout {
                FatPtrParamLayout::Wrapped => ParamStrategy::WrappedFatPtr(vf.clone()),
                FatPtrParamLayout::Pair => ParamStrategy::FatPtrPair(vf.clone()),
            },
            TypeStrategy::VPtr { base } => ParamStrategy::VPtr { base: base.clone() },
            TypeStrategy::FunPtr { signature } => ParamStrategy::FunPtr {
                signature: signature.clone(),
            },
            TypeStrategy::Record { name, size } => ParamStrategy::Record {
                name: name.clone(),
                size: *size,
            },
            TypeStrategy::Array { .. } => {
                return Err(Error::unsupported_type("parameter", self.gimple_type()))
            }
        })
    }

    /// How a return value of this type is passed back
    pub fn return_strategy(&self) -> Result<ReturnStrategy> {
        Ok(match self {
            TypeStrategy::Primitive { ty, jtype } => ReturnStrategy::Primitive {
                ty: ty.clone(),
                jtype: jtype.clone(),
            },
            TypeStrategy::FatPtr(vf) => ReturnStrategy::FatPtr(vf.clone()),
            TypeStrategy::VPtr { .. } => ReturnStrategy::VPtr,
            TypeStrategy::FunPtr { .. } => ReturnStrategy::FunPtr,
            TypeStrategy::Record { name, size } => ReturnStrategy::Record {
                name: name.clone(),
                size: *size,
            },
            TypeStrategy::Array { .. } => {
                return Err(Error::unsupported_type("return value", self.gimple_type()))
            }
        })
    }
}

/// Runtime class allocated by `malloc` for a unified pointer to `base`
fn vptr_region_class(base: &GimpleType) -> Result<String> {
    match base {
        ty if ty.is_primitive() => Ok(ValueFunction::for_type(ty)?.wrapper),
        GimpleType::Array { component, .. } => vptr_region_class(component),
        GimpleType::Pointer { .. } => Ok(runtime_class("PointerPtr")),
        GimpleType::Record { .. } | GimpleType::Void => Ok(runtime_class("MixedPtr")),
        other => Err(Error::unsupported_type("malloc", other)),
    }
}

fn new_array(component: JType, length: JExpr) -> JExpr {
    JExpr::NewArray {
        component,
        length: Box::new(length),
    }
}

/// Element 0 of a one-element array, addressable as a fat pointer
fn unit_array_element(array: JExpr, ty: &GimpleType) -> Result<GExpr> {
    let vf = ValueFunction::for_type(ty)?;
    Ok(GExpr::Primitive {
        value: JExpr::element(array.clone(), JExpr::int(0))?,
        ty: ty.clone(),
        address: Some(Box::new(GExpr::FatPtrPair {
            vf,
            array,
            offset: JExpr::int(0),
        })),
    })
}

/// Primitive conversion following C rules: non-zero to bool is true,
/// unsigned values zero-extend, pointers convert to their integer encoding.
fn cast_primitive(value: &GExpr, to: &GimpleType, jtype: &JType) -> Result<JExpr> {
    let from = match value {
        GExpr::Primitive { ty, .. } => ty.clone(),
        GExpr::Memory { ty, .. } if ty.is_primitive() => ty.clone(),
        GExpr::FunPtr { .. } => {
            return Err(Error::not_supported(
                "conversion of a function pointer to an integer",
            ))
        }
        GExpr::ArrayValue { .. } => {
            return Err(Error::not_supported(format!(
                "conversion of {} to {}",
                value.describe(),
                to
            )))
        }
        pointer => {
            let encoded = JExpr::interface_call(
                pointer.to_vptr()?,
                &ptr_class(),
                "toInt",
                &[],
                JType::Int,
                vec![],
            );
            return Ok(encoded.convert(jtype.clone()));
        }
    };
    let from_jtype = super::gexpr::primitive_jtype(&from)?;
    let raw = value.to_primitive(&from_jtype)?;
    if *to == GimpleType::Boolean && from != GimpleType::Boolean {
        let stack = from_jtype.stack_type();
        return Ok(JExpr::compare(Cond::Ne, raw.convert(stack.clone()), zero(&stack)));
    }
    let widened = match from {
        GimpleType::Integer {
            bits: 8,
            unsigned: true,
        } if jtype_bits(jtype) > 8 => JExpr::binary(
            super::jvm::JBinOp::And,
            JType::Int,
            raw.convert(JType::Int),
            JExpr::int(0xFF),
        ),
        GimpleType::Integer {
            bits: 32,
            unsigned: true,
        } if *jtype == JType::Long => {
            JExpr::static_call("java/lang/Integer", "toUnsignedLong", JType::Long, vec![raw])
        }
        _ => raw,
    };
    Ok(widened.convert(jtype.clone()))
}

fn jtype_bits(jtype: &JType) -> u32 {
    match jtype {
        JType::Boolean | JType::Byte => 8,
        JType::Short | JType::Char => 16,
        JType::Int | JType::Float => 32,
        _ => 64,
    }
}
