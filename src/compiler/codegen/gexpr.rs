//! Values of GIMPLE expressions in their managed representation.
//!
//! A [`GExpr`] is what a GIMPLE operand turns into once a strategy has been
//! chosen for its type: a plain primitive, a fat pointer (array plus element
//! offset, either unpacked or wrapped in one object), a unified pointer
//! reference, a function handle, or a typed window into pointer-addressed
//! memory. Conversions between the shapes live here; which shape a variable
//! gets is decided in [`super::strategy`].

use super::expr::JExpr;
use super::jvm::{InvokeKind, JConst, JType};
use super::strategy::FieldStrategy;
use super::vars::MethodContext;
use crate::compiler::ir::GimpleType;
use crate::runtime::runtime_class;
use crate::{Error, Result};

/// Internal name of the pointer interface implemented by every runtime pointer
pub fn ptr_class() -> String {
    runtime_class("Ptr")
}

pub fn ptr_type() -> JType {
    JType::object(ptr_class())
}

/// Managed type used for a primitive GIMPLE type
pub fn primitive_jtype(ty: &GimpleType) -> Result<JType> {
    match ty {
        GimpleType::Boolean => Ok(JType::Boolean),
        GimpleType::Integer { bits: 8, .. } => Ok(JType::Byte),
        GimpleType::Integer {
            bits: 16,
            unsigned: true,
        } => Ok(JType::Char),
        GimpleType::Integer { bits: 16, .. } => Ok(JType::Short),
        GimpleType::Integer { bits: 32, .. } => Ok(JType::Int),
        GimpleType::Integer { bits: 64, .. } => Ok(JType::Long),
        GimpleType::Real { bits: 32 } => Ok(JType::Float),
        GimpleType::Real { .. } => Ok(JType::Double),
        other => Err(Error::unsupported_type("primitive value", other)),
    }
}

/// Suffix of the runtime accessors (`getInt`, `setAlignedDouble`, ...)
pub fn accessor_suffix(ty: &GimpleType) -> Result<&'static str> {
    Ok(match ty {
        GimpleType::Real { bits } if *bits > 64 => "Real96",
        other => match primitive_jtype(other)? {
            JType::Boolean => "Boolean",
            JType::Byte => "Byte",
            JType::Short => "Short",
            JType::Char => "Char",
            JType::Int => "Int",
            JType::Long => "Long",
            JType::Float => "Float",
            _ => "Double",
        },
    })
}

fn jtype_size(ty: &JType) -> i32 {
    match ty {
        JType::Boolean | JType::Byte => 1,
        JType::Short | JType::Char => 2,
        JType::Int | JType::Float => 4,
        _ => 8,
    }
}

/// How elements of a primitive-backed region are typed, sized and wrapped
#[derive(Debug, Clone, PartialEq)]
pub struct ValueFunction {
    pub ty: GimpleType,
    pub jtype: JType,
    /// Element stride in bytes
    pub size: i32,
    /// Internal name of the runtime pointer class wrapping an array of `jtype`
    pub wrapper: String,
}

impl ValueFunction {
    pub fn for_type(ty: &GimpleType) -> Result<Self> {
        let jtype = primitive_jtype(ty)?;
        let wrapper = match jtype {
            JType::Boolean => "BooleanPtr",
            JType::Byte => "BytePtr",
            JType::Short => "ShortPtr",
            JType::Char => "CharPtr",
            JType::Int => "IntPtr",
            JType::Long => "LongPtr",
            JType::Float => "FloatPtr",
            _ => "DoublePtr",
        };
        Ok(Self {
            ty: ty.clone(),
            size: jtype_size(&jtype),
            jtype,
            wrapper: runtime_class(wrapper),
        })
    }

    pub fn array_type(&self) -> JType {
        JType::array_of(self.jtype.clone())
    }

    pub fn wrapper_type(&self) -> JType {
        JType::object(self.wrapper.clone())
    }

    /// Converts a byte count to an element count, rounding toward zero
    pub fn bytes_to_elements(&self, bytes: JExpr) -> JExpr {
        match bytes {
            JExpr::Const(JConst::Int(n)) => JExpr::int(n / self.size),
            other if self.size == 1 => other,
            other => JExpr::binary(
                super::jvm::JBinOp::Div,
                JType::Int,
                other,
                JExpr::int(self.size),
            ),
        }
    }

    /// `Wrapper.of(array, offset)`
    pub fn wrap(&self, array: JExpr, offset: JExpr) -> JExpr {
        JExpr::static_call(&self.wrapper, "of", self.wrapper_type(), vec![array, offset])
    }
}

/// A value in its managed representation
#[derive(Debug, Clone, PartialEq)]
pub enum GExpr {
    /// A primitive; `address` is present when the storage is a unit array
    Primitive {
        value: JExpr,
        ty: GimpleType,
        address: Option<Box<GExpr>>,
    },
    /// Pointer to primitive as an array and an element offset
    FatPtrPair {
        vf: ValueFunction,
        array: JExpr,
        offset: JExpr,
    },
    /// Pointer to primitive held as a single wrapper object
    WrappedFatPtr {
        vf: ValueFunction,
        wrapper: JExpr,
        address: Option<Box<GExpr>>,
    },
    /// Pointer held as one reference implementing the runtime pointer interface
    VPtr {
        pointer: JExpr,
        address: Option<Box<GExpr>>,
    },
    /// A primitive array stored inline: `length` elements from `offset`
    ArrayValue {
        vf: ValueFunction,
        array: JExpr,
        offset: JExpr,
        length: i32,
    },
    /// A value of type `ty` at byte `offset` of pointer-addressed memory
    Memory {
        pointer: JExpr,
        offset: JExpr,
        ty: GimpleType,
        field: FieldStrategy,
    },
    /// A function pointer as a method handle
    FunPtr {
        handle: JExpr,
        address: Option<Box<GExpr>>,
    },
}

impl GExpr {
    pub fn primitive(value: JExpr, ty: GimpleType) -> Self {
        GExpr::Primitive {
            value,
            ty,
            address: None,
        }
    }

    pub fn vptr(pointer: JExpr) -> Self {
        GExpr::VPtr {
            pointer,
            address: None,
        }
    }

    pub fn fun_ptr(handle: JExpr) -> Self {
        GExpr::FunPtr {
            handle,
            address: None,
        }
    }

    /// The value as a primitive of type `jtype`
    pub fn to_primitive(&self, jtype: &JType) -> Result<JExpr> {
        let value = match self {
            GExpr::Primitive { value, .. } => value.clone(),
            GExpr::Memory {
                pointer,
                offset,
                field:
                    FieldStrategy::Primitive {
                        jtype: field_type,
                        suffix,
                        size,
                    },
                ..
            } => memory_get(pointer, offset, suffix, *size, field_type.clone()),
            GExpr::FatPtrPair { .. } | GExpr::WrappedFatPtr { .. } | GExpr::VPtr { .. } => {
                return Err(Error::internal(
                    "pointer used as a primitive without a conversion",
                ))
            }
            other => {
                return Err(Error::internal(format!(
                    "{} is not a primitive value",
                    other.describe()
                )))
            }
        };
        Ok(value.convert(jtype.clone()))
    }

    /// The value as a reference to a runtime pointer
    pub fn to_vptr(&self) -> Result<JExpr> {
        match self {
            GExpr::VPtr { pointer, .. } => Ok(pointer.clone()),
            GExpr::FatPtrPair { vf, array, offset } => Ok(vf.wrap(array.clone(), offset.clone())),
            GExpr::WrappedFatPtr { wrapper, .. } => Ok(wrapper.clone()),
            GExpr::FunPtr { handle, .. } => Ok(JExpr::static_call(
                &runtime_class("FunctionPtr"),
                "of",
                ptr_type(),
                vec![handle.clone()],
            )),
            GExpr::Memory {
                pointer,
                offset,
                field: FieldStrategy::Pointer | FieldStrategy::FunPtr,
                ..
            } => Ok(memory_get_pointer(pointer, offset)),
            GExpr::Primitive { .. } => Err(Error::not_supported(
                "conversion of an integer value to a pointer",
            )),
            other => Err(Error::internal(format!(
                "{} is not a pointer value",
                other.describe()
            ))),
        }
    }

    /// The value as an (array, element offset) pair for `vf`.
    ///
    /// Wrapped and unified pointers are cast to `vf`'s wrapper class and
    /// unpacked; the wrapper is spilled first so it is evaluated once.
    pub fn to_fat_ptr_pair(
        &self,
        ctx: &mut MethodContext,
        vf: &ValueFunction,
    ) -> Result<(JExpr, JExpr)> {
        if let GExpr::FatPtrPair {
            vf: own,
            array,
            offset,
        } = self
        {
            if own.jtype == vf.jtype {
                return Ok((array.clone(), offset.clone()));
            }
        }
        let wrapper = ctx.spill(self.to_vptr()?.check_cast(&vf.wrapper))?;
        Ok((
            JExpr::field(wrapper.clone(), &vf.wrapper, "array", vf.array_type()),
            JExpr::field(wrapper, &vf.wrapper, "offset", JType::Int),
        ))
    }

    /// The value as a method handle
    pub fn to_fun_ptr(&self, ctx: &mut MethodContext) -> Result<JExpr> {
        match self {
            GExpr::FunPtr { handle, .. } => Ok(handle.clone()),
            GExpr::Memory { .. } | GExpr::VPtr { .. } => {
                let function_ptr = runtime_class("FunctionPtr");
                let pointer = ctx.spill(self.to_vptr()?.check_cast(&function_ptr))?;
                Ok(JExpr::field(
                    pointer,
                    &function_ptr,
                    "handle",
                    JType::method_handle(),
                ))
            }
            other => Err(Error::not_supported(format!(
                "calling {} as a function",
                other.describe()
            ))),
        }
    }

    /// A runtime pointer to the first byte of an aggregate value
    pub fn to_aggregate_ptr(&self) -> Result<JExpr> {
        match self {
            GExpr::Memory {
                pointer, offset, ..
            } => Ok(pointer_plus(pointer.clone(), offset.clone())),
            GExpr::ArrayValue {
                vf, array, offset, ..
            } => Ok(vf.wrap(array.clone(), offset.clone())),
            other => Err(Error::internal(format!(
                "{} is not an aggregate",
                other.describe()
            ))),
        }
    }

    /// The address of this value
    pub fn address_of(&self) -> Result<GExpr> {
        match self {
            GExpr::Primitive {
                address: Some(address),
                ..
            }
            | GExpr::WrappedFatPtr {
                address: Some(address),
                ..
            }
            | GExpr::VPtr {
                address: Some(address),
                ..
            }
            | GExpr::FunPtr {
                address: Some(address),
                ..
            } => Ok((**address).clone()),
            GExpr::ArrayValue {
                vf, array, offset, ..
            } => Ok(GExpr::FatPtrPair {
                vf: vf.clone(),
                array: array.clone(),
                offset: offset.clone(),
            }),
            GExpr::Memory {
                ty,
                field: FieldStrategy::Primitive { .. },
                ..
            } => Err(Error::not_supported(format!(
                "taking the address of a {} stored in record memory",
                ty
            ))),
            GExpr::Memory {
                pointer, offset, ..
            } => Ok(GExpr::vptr(pointer_plus(pointer.clone(), offset.clone()))),
            other => Err(Error::not_supported(format!(
                "taking the address of non-addressable {}",
                other.describe()
            ))),
        }
    }

    /// Stores `value` into this location. `value` must already have the
    /// shape of this location's type.
    pub fn store(&self, ctx: &mut MethodContext, value: &GExpr) -> Result<()> {
        match self {
            GExpr::Primitive { value: target, .. } => {
                let v = value.to_primitive(&target.ty())?;
                target.store(&mut ctx.mv, &v)
            }
            GExpr::FatPtrPair { vf, array, offset } => {
                let (a, o) = value.to_fat_ptr_pair(ctx, vf)?;
                a.load(&mut ctx.mv);
                o.load(&mut ctx.mv);
                offset.store_top(&mut ctx.mv)?;
                array.store_top(&mut ctx.mv)
            }
            GExpr::WrappedFatPtr { vf, wrapper, .. } => {
                let (a, o) = value.to_fat_ptr_pair(ctx, vf)?;
                let wrapped = vf.wrap(a, o);
                wrapper.store(&mut ctx.mv, &wrapped)
            }
            GExpr::VPtr { pointer, .. } => {
                let v = value.to_vptr()?;
                let v = match pointer.ty().internal_name() {
                    Some(class) if class != ptr_class() => v.check_cast(class),
                    _ => v,
                };
                pointer.store(&mut ctx.mv, &v)
            }
            GExpr::FunPtr { handle, .. } => {
                let v = value.to_fun_ptr(ctx)?;
                handle.store(&mut ctx.mv, &v)
            }
            GExpr::ArrayValue {
                array,
                offset,
                length,
                ..
            } => match value {
                GExpr::ArrayValue {
                    array: src,
                    offset: src_offset,
                    length: src_length,
                    ..
                } => {
                    let copy = JExpr::Call {
                        kind: InvokeKind::Static,
                        owner: "java/lang/System".to_string(),
                        name: "arraycopy".to_string(),
                        descriptor: "(Ljava/lang/Object;ILjava/lang/Object;II)V".to_string(),
                        args: vec![
                            src.clone(),
                            src_offset.clone(),
                            array.clone(),
                            offset.clone(),
                            JExpr::int((*length).min(*src_length)),
                        ],
                        ty: JType::Void,
                    };
                    copy.discard(&mut ctx.mv);
                    Ok(())
                }
                other => Err(Error::not_supported(format!(
                    "copying {} into an inline array",
                    other.describe()
                ))),
            },
            GExpr::Memory {
                pointer,
                offset,
                field,
                ..
            } => {
                let call = match field {
                    FieldStrategy::Primitive { jtype, suffix, size } => {
                        let v = value.to_primitive(jtype)?;
                        memory_set(pointer, offset, suffix, *size, jtype.clone(), v)
                    }
                    FieldStrategy::Pointer | FieldStrategy::FunPtr => {
                        let v = value.to_vptr()?;
                        JExpr::interface_call(
                            pointer.clone(),
                            &ptr_class(),
                            "setPointer",
                            &[JType::Int, ptr_type()],
                            JType::Void,
                            vec![offset.clone(), v],
                        )
                    }
                    FieldStrategy::Inline { size } => {
                        let target = pointer_plus(pointer.clone(), offset.clone());
                        JExpr::interface_call(
                            target,
                            &ptr_class(),
                            "memcpy",
                            &[ptr_type(), JType::Int],
                            JType::Void,
                            vec![value.to_aggregate_ptr()?, JExpr::int(*size)],
                        )
                    }
                };
                call.discard(&mut ctx.mv);
                Ok(())
            }
        }
    }

    /// Short description used in diagnostics
    pub fn describe(&self) -> String {
        match self {
            GExpr::Primitive { ty, .. } => format!("primitive {}", ty),
            GExpr::FatPtrPair { vf, .. } => format!("fat pointer to {}", vf.ty),
            GExpr::WrappedFatPtr { vf, .. } => format!("wrapped pointer to {}", vf.ty),
            GExpr::VPtr { .. } => "pointer".to_string(),
            GExpr::ArrayValue { vf, length, .. } => format!("array {}[{}]", vf.ty, length),
            GExpr::Memory { ty, .. } => format!("{} in memory", ty),
            GExpr::FunPtr { .. } => "function pointer".to_string(),
        }
    }
}

/// `pointer.pointerPlus(offset)`, or `pointer` itself for offset zero
pub fn pointer_plus(pointer: JExpr, offset: JExpr) -> JExpr {
    if offset == JExpr::int(0) {
        return pointer;
    }
    JExpr::interface_call(
        pointer,
        &ptr_class(),
        "pointerPlus",
        &[JType::Int],
        ptr_type(),
        vec![offset],
    )
}

fn aligned_index(offset: &JExpr, size: i32) -> Option<i32> {
    match offset {
        JExpr::Const(JConst::Int(n)) if size > 1 && n % size == 0 => Some(n / size),
        _ => None,
    }
}

fn memory_get(pointer: &JExpr, offset: &JExpr, suffix: &str, size: i32, jtype: JType) -> JExpr {
    let (name, index) = match aligned_index(offset, size) {
        Some(index) => (format!("getAligned{}", suffix), JExpr::int(index)),
        None => (format!("get{}", suffix), offset.clone()),
    };
    JExpr::interface_call(
        pointer.clone(),
        &ptr_class(),
        &name,
        &[JType::Int],
        jtype,
        vec![index],
    )
}

fn memory_set(
    pointer: &JExpr,
    offset: &JExpr,
    suffix: &str,
    size: i32,
    jtype: JType,
    value: JExpr,
) -> JExpr {
    let (name, index) = match aligned_index(offset, size) {
        Some(index) => (format!("setAligned{}", suffix), JExpr::int(index)),
        None => (format!("set{}", suffix), offset.clone()),
    };
    JExpr::interface_call(
        pointer.clone(),
        &ptr_class(),
        &name,
        &[JType::Int, jtype],
        JType::Void,
        vec![index, value],
    )
}

fn memory_get_pointer(pointer: &JExpr, offset: &JExpr) -> JExpr {
    JExpr::interface_call(
        pointer.clone(),
        &ptr_class(),
        "getPointer",
        &[JType::Int],
        ptr_type(),
        vec![offset.clone()],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::codegen::jvm::Insn;

    fn int_vf() -> ValueFunction {
        ValueFunction::for_type(&GimpleType::int(32)).unwrap()
    }

    fn int_memory(offset: i32) -> GExpr {
        GExpr::Memory {
            pointer: JExpr::Local {
                index: 0,
                ty: ptr_type(),
            },
            offset: JExpr::int(offset),
            ty: GimpleType::int(32),
            field: FieldStrategy::Primitive {
                jtype: JType::Int,
                suffix: "Int",
                size: 4,
            },
        }
    }

    #[test]
    fn test_value_function_for_unsigned_short() {
        let vf = ValueFunction::for_type(&GimpleType::uint(16)).unwrap();
        assert_eq!(vf.jtype, JType::Char);
        assert_eq!(vf.size, 2);
        assert_eq!(vf.wrapper, "org/gccbridge/runtime/CharPtr");
        assert!(ValueFunction::for_type(&GimpleType::Void).is_err());
    }

    #[test]
    fn test_aligned_memory_access_uses_element_index() {
        let value = int_memory(8).to_primitive(&JType::Int).unwrap();
        match value {
            JExpr::Call { name, args, .. } => {
                assert_eq!(name, "getAlignedInt");
                assert_eq!(args[1], JExpr::int(2));
            }
            other => panic!("unexpected {:?}", other),
        }
        let misaligned = int_memory(6).to_primitive(&JType::Int).unwrap();
        assert!(matches!(misaligned, JExpr::Call { ref name, .. } if name == "getInt"));
    }

    #[test]
    fn test_address_of_primitive_in_memory_is_not_supported() {
        assert!(matches!(
            int_memory(4).address_of(),
            Err(Error::NotSupported(_))
        ));
    }

    #[test]
    fn test_pair_stores_both_parts() {
        let mut ctx = MethodContext::new();
        let vf = int_vf();
        let target = GExpr::FatPtrPair {
            vf: vf.clone(),
            array: ctx.locals.reserve("p$array", vf.array_type()),
            offset: ctx.locals.reserve("p$offset", JType::Int),
        };
        let source = GExpr::FatPtrPair {
            vf: vf.clone(),
            array: JExpr::NewArray {
                component: JType::Int,
                length: Box::new(JExpr::int(4)),
            },
            offset: JExpr::int(0),
        };
        target.store(&mut ctx, &source).unwrap();
        let stores = ctx
            .mv
            .insns()
            .iter()
            .filter(|i| matches!(i, Insn::Store { .. }))
            .count();
        assert_eq!(stores, 2);
    }

    #[test]
    fn test_vptr_is_cast_and_unpacked_once() {
        let mut ctx = MethodContext::new();
        let pointer = JExpr::interface_call(
            JExpr::Null(ptr_type()),
            &ptr_class(),
            "pointerPlus",
            &[JType::Int],
            ptr_type(),
            vec![JExpr::int(4)],
        );
        let (array, offset) = GExpr::vptr(pointer)
            .to_fat_ptr_pair(&mut ctx, &int_vf())
            .unwrap();
        assert_eq!(array.ty(), JType::array_of(JType::Int));
        assert_eq!(offset.ty(), JType::Int);
        let invokes = ctx
            .mv
            .insns()
            .iter()
            .filter(|i| matches!(i, Insn::Invoke { kind: InvokeKind::Interface, .. }))
            .count();
        assert_eq!(invokes, 1);
    }
}
