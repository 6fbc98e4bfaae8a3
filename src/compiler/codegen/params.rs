//! Call-boundary strategies.
//!
//! A [`ParamStrategy`] lists the managed slots one GIMPLE parameter occupies,
//! rebuilds the logical value from those slots on entry, and splits an
//! argument back into slots at a call site. [`ReturnStrategy`] is the same
//! contract for return values, which always fit one slot.

use super::expr::JExpr;
use super::gexpr::{ptr_class, ptr_type, GExpr, ValueFunction};
use super::jvm::JType;
use super::strategy::{null_vptr, zero, FieldStrategy, TypeStrategy};
use super::vars::MethodContext;
use crate::compiler::ir::GimpleType;
use crate::runtime::runtime_class;
use crate::Result;
use serde::{Deserialize, Serialize};

/// How a pointer to a primitive crosses a call boundary.
///
/// The same layout is used for every declaration and call site of one
/// compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FatPtrParamLayout {
    /// One slot holding a wrapper object
    #[default]
    Wrapped,
    /// Two slots: the array and the element offset
    Pair,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamStrategy {
    Primitive { ty: GimpleType, jtype: JType },
    WrappedFatPtr(ValueFunction),
    FatPtrPair(ValueFunction),
    VPtr { base: GimpleType },
    /// Records are passed by value: the caller passes a private copy
    Record { name: String, size: i32 },
    FunPtr { signature: GimpleType },
}

impl ParamStrategy {
    /// Managed types of the slots, in order
    pub fn parameter_types(&self) -> Vec<JType> {
        match self {
            ParamStrategy::Primitive { jtype, .. } => vec![jtype.clone()],
            ParamStrategy::WrappedFatPtr(vf) => vec![vf.wrapper_type()],
            ParamStrategy::FatPtrPair(vf) => vec![vf.array_type(), JType::Int],
            ParamStrategy::VPtr { .. } | ParamStrategy::Record { .. } => vec![ptr_type()],
            ParamStrategy::FunPtr { .. } => vec![JType::method_handle()],
        }
    }

    /// Names of the slots for a parameter called `name`
    pub fn parameter_names(&self, name: &str) -> Vec<String> {
        match self {
            ParamStrategy::FatPtrPair(_) => {
                vec![format!("{}$array", name), format!("{}$offset", name)]
            }
            _ => vec![name.to_string()],
        }
    }

    /// Reserves the incoming slots. Must run for every parameter, in order,
    /// before any other local is reserved.
    pub fn reserve_slots(&self, name: &str, ctx: &mut MethodContext) -> Vec<JExpr> {
        self.parameter_names(name)
            .into_iter()
            .zip(self.parameter_types())
            .map(|(slot_name, ty)| ctx.locals.reserve(slot_name, ty))
            .collect()
    }

    fn type_strategy(&self) -> TypeStrategy {
        match self {
            ParamStrategy::Primitive { ty, jtype } => TypeStrategy::Primitive {
                ty: ty.clone(),
                jtype: jtype.clone(),
            },
            ParamStrategy::WrappedFatPtr(vf) | ParamStrategy::FatPtrPair(vf) => {
                TypeStrategy::FatPtr(vf.clone())
            }
            ParamStrategy::VPtr { base } => TypeStrategy::VPtr { base: base.clone() },
            ParamStrategy::Record { name, size } => TypeStrategy::Record {
                name: name.clone(),
                size: *size,
            },
            ParamStrategy::FunPtr { signature } => TypeStrategy::FunPtr {
                signature: signature.clone(),
            },
        }
    }

    /// Builds the variable the body sees from the incoming `slots`.
    ///
    /// An addressable parameter is copied into storage whose address can be
    /// taken: a one-element array for primitives, a pointer cell otherwise.
    pub fn emit_initialization(
        &self,
        slots: &[JExpr],
        name: &str,
        addressable: bool,
        ctx: &mut MethodContext,
    ) -> Result<GExpr> {
        let strategy = self.type_strategy();
        match (self, slots) {
            (ParamStrategy::Primitive { ty, .. }, [slot]) if !addressable => {
                Ok(GExpr::primitive(slot.clone(), ty.clone()))
            }
            (ParamStrategy::Primitive { ty, .. }, [slot]) => {
                let var = strategy.variable(&format!("{}$address", name), true, ctx)?;
                var.store(ctx, &GExpr::primitive(slot.clone(), ty.clone()))?;
                Ok(var)
            }
            (ParamStrategy::WrappedFatPtr(vf), [wrapper]) if !addressable => {
                let array = ctx.locals.reserve(format!("{}$array", name), vf.array_type());
                let offset = ctx.locals.reserve(format!("{}$offset", name), JType::Int);
                array.store(
                    &mut ctx.mv,
                    &JExpr::field(wrapper.clone(), &vf.wrapper, "array", vf.array_type()),
                )?;
                offset.store(
                    &mut ctx.mv,
                    &JExpr::field(wrapper.clone(), &vf.wrapper, "offset", JType::Int),
                )?;
                Ok(GExpr::FatPtrPair {
                    vf: vf.clone(),
                    array,
                    offset,
                })
            }
            (ParamStrategy::WrappedFatPtr(_), [wrapper]) => {
                strategy.pointer_cell(name, Some(wrapper.clone()), ctx)
            }
            (ParamStrategy::FatPtrPair(vf), [array, offset]) if !addressable => {
                Ok(GExpr::FatPtrPair {
                    vf: vf.clone(),
                    array: array.clone(),
                    offset: offset.clone(),
                })
            }
            (ParamStrategy::FatPtrPair(vf), [array, offset]) => {
                let wrapped = vf.wrap(array.clone(), offset.clone());
                strategy.pointer_cell(name, Some(wrapped), ctx)
            }
            (ParamStrategy::VPtr { .. }, [pointer]) if !addressable => Ok(GExpr::vptr(pointer.clone())),
            (ParamStrategy::VPtr { .. }, [pointer]) => {
                strategy.pointer_cell(name, Some(pointer.clone()), ctx)
            }
            (ParamStrategy::Record { .. }, [pointer]) => strategy.memory_at(pointer.clone()),
            (ParamStrategy::FunPtr { .. }, [handle]) if !addressable => {
                Ok(GExpr::fun_ptr(handle.clone()))
            }
            (ParamStrategy::FunPtr { .. }, [handle]) => {
                let wrapped = GExpr::fun_ptr(handle.clone()).to_vptr()?;
                strategy.pointer_cell(name, Some(wrapped), ctx)
            }
            _ => Err(crate::Error::internal(format!(
                "Parameter {} expects {} slots, got {}",
                name,
                self.parameter_types().len(),
                slots.len()
            ))),
        }
    }

    /// Splits an argument, already cast to this parameter's type, into slots
    pub fn load_argument(&self, arg: &GExpr, ctx: &mut MethodContext) -> Result<Vec<JExpr>> {
        Ok(match self {
            ParamStrategy::Primitive { jtype, .. } => vec![arg.to_primitive(jtype)?],
            ParamStrategy::WrappedFatPtr(vf) => match arg {
                GExpr::WrappedFatPtr { wrapper, .. } => vec![wrapper.clone().check_cast(&vf.wrapper)],
                other => {
                    let (array, offset) = other.to_fat_ptr_pair(ctx, vf)?;
                    vec![vf.wrap(array, offset)]
                }
            },
            ParamStrategy::FatPtrPair(vf) => {
                let (array, offset) = arg.to_fat_ptr_pair(ctx, vf)?;
                vec![array, offset]
            }
            ParamStrategy::VPtr { .. } => vec![arg.to_vptr()?],
            ParamStrategy::Record { size, .. } => vec![copy_of(arg.to_aggregate_ptr()?, *size)],
            ParamStrategy::FunPtr { .. } => vec![arg.to_fun_ptr(ctx)?],
        })
    }
}

/// `pointer.copyOf(0, size)`
fn copy_of(pointer: JExpr, size: i32) -> JExpr {
    JExpr::interface_call(
        pointer,
        &ptr_class(),
        "copyOf",
        &[JType::Int, JType::Int],
        ptr_type(),
        vec![JExpr::int(0), JExpr::int(size)],
    )
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReturnStrategy {
    Void,
    Primitive { ty: GimpleType, jtype: JType },
    /// Fat pointers are always returned wrapped
    FatPtr(ValueFunction),
    VPtr,
    /// Records are returned as a copy
    Record { name: String, size: i32 },
    FunPtr,
}

impl ReturnStrategy {
    pub fn return_type(&self) -> JType {
        match self {
            ReturnStrategy::Void => JType::Void,
            ReturnStrategy::Primitive { jtype, .. } => jtype.clone(),
            ReturnStrategy::FatPtr(vf) => vf.wrapper_type(),
            ReturnStrategy::VPtr | ReturnStrategy::Record { .. } => ptr_type(),
            ReturnStrategy::FunPtr => JType::method_handle(),
        }
    }

    /// Converts a value, already cast to the return type, to the returned slot
    pub fn marshal(&self, value: &GExpr, ctx: &mut MethodContext) -> Result<JExpr> {
        match self {
            ReturnStrategy::Void => Err(crate::Error::internal("value returned from a void function")),
            ReturnStrategy::Primitive { jtype, .. } => value.to_primitive(jtype),
            ReturnStrategy::FatPtr(vf) => match value {
                GExpr::WrappedFatPtr { wrapper, .. } => Ok(wrapper.clone().check_cast(&vf.wrapper)),
                other => {
                    let (array, offset) = other.to_fat_ptr_pair(ctx, vf)?;
                    Ok(vf.wrap(array, offset))
                }
            },
            ReturnStrategy::VPtr => value.to_vptr(),
            ReturnStrategy::Record { size, .. } => Ok(copy_of(value.to_aggregate_ptr()?, *size)),
            ReturnStrategy::FunPtr => value.to_fun_ptr(ctx),
        }
    }

    /// The value produced by `call` at the call site
    pub fn unmarshal(&self, call: JExpr, ctx: &mut MethodContext) -> Result<GExpr> {
        match self {
            ReturnStrategy::Void => Err(crate::Error::internal("void call used as a value")),
            ReturnStrategy::Primitive { ty, .. } => Ok(GExpr::primitive(call, ty.clone())),
            ReturnStrategy::FatPtr(vf) => Ok(GExpr::WrappedFatPtr {
                vf: vf.clone(),
                wrapper: ctx.spill(call)?,
                address: None,
            }),
            ReturnStrategy::VPtr => Ok(GExpr::vptr(call)),
            ReturnStrategy::Record { name, size } => Ok(GExpr::Memory {
                pointer: ctx.spill(call)?,
                offset: JExpr::int(0),
                ty: GimpleType::record(name.clone()),
                field: FieldStrategy::Inline { size: *size },
            }),
            ReturnStrategy::FunPtr => Ok(GExpr::fun_ptr(call)),
        }
    }

    /// Value returned when control reaches the end of the function
    pub fn default_value(&self) -> Option<JExpr> {
        match self {
            ReturnStrategy::Void => None,
            ReturnStrategy::Primitive { jtype, .. } => Some(zero(jtype)),
            ReturnStrategy::FatPtr(vf) => Some(vf.wrap(JExpr::Null(vf.array_type()), JExpr::int(0))),
            ReturnStrategy::VPtr => Some(null_vptr()),
            ReturnStrategy::Record { size, .. } => Some(JExpr::static_call(
                &runtime_class("MixedPtr"),
                "malloc",
                ptr_type(),
                vec![JExpr::int(*size)],
            )),
            ReturnStrategy::FunPtr => Some(JExpr::Null(JType::method_handle())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::codegen::jvm::Insn;

    fn int_vf() -> ValueFunction {
        ValueFunction::for_type(&GimpleType::int(32)).unwrap()
    }

    #[test]
    fn test_pair_layout_takes_two_slots() {
        let param = ParamStrategy::FatPtrPair(int_vf());
        assert_eq!(
            param.parameter_types(),
            vec![JType::array_of(JType::Int), JType::Int]
        );
        assert_eq!(param.parameter_names("xs"), vec!["xs$array", "xs$offset"]);
        let mut ctx = MethodContext::new();
        let slots = param.reserve_slots("xs", &mut ctx);
        let var = param.emit_initialization(&slots, "xs", false, &mut ctx).unwrap();
        assert!(matches!(var, GExpr::FatPtrPair { .. }));
        assert!(ctx.mv.insns().is_empty());
    }

    #[test]
    fn test_wrapped_param_is_unpacked_on_entry() {
        let param = ParamStrategy::WrappedFatPtr(int_vf());
        let mut ctx = MethodContext::new();
        let slots = param.reserve_slots("xs", &mut ctx);
        param.emit_initialization(&slots, "xs", false, &mut ctx).unwrap();
        let fields: Vec<_> = ctx
            .mv
            .insns()
            .iter()
            .filter_map(|i| match i {
                Insn::GetField { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(fields, vec!["array", "offset"]);
        assert_eq!(ctx.locals.max_locals(), 3);
    }

    #[test]
    fn test_addressable_primitive_param_is_copied() {
        let param = ParamStrategy::Primitive {
            ty: GimpleType::int(32),
            jtype: JType::Int,
        };
        let mut ctx = MethodContext::new();
        let slots = param.reserve_slots("n", &mut ctx);
        let var = param.emit_initialization(&slots, "n", true, &mut ctx).unwrap();
        assert!(var.address_of().is_ok());
        assert_eq!(ctx.mv.insns().last(), Some(&Insn::ArrayStore { ty: JType::Int }));
    }

    #[test]
    fn test_fat_ptr_returned_wrapped() {
        let ret = ReturnStrategy::FatPtr(int_vf());
        assert_eq!(ret.return_type(), JType::object("org/gccbridge/runtime/IntPtr"));
        let mut ctx = MethodContext::new();
        let pair = GExpr::FatPtrPair {
            vf: int_vf(),
            array: JExpr::Null(JType::array_of(JType::Int)),
            offset: JExpr::int(2),
        };
        let marshalled = ret.marshal(&pair, &mut ctx).unwrap();
        assert!(matches!(marshalled, JExpr::Call { ref name, .. } if name == "of"));
    }
}
