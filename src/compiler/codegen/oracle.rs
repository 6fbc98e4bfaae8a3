//! Strategy selection for the types of one compilation unit

use super::gexpr::{primitive_jtype, ValueFunction};
use super::jvm::JType;
use super::params::{FatPtrParamLayout, ParamStrategy, ReturnStrategy};
use super::strategy::{FieldStrategy, TypeStrategy};
use crate::compiler::ir::{GimpleType, RecordTypeDef};
use crate::{Error, Result};

/// Picks a [`TypeStrategy`] for each type, knowing the unit's record layouts
#[derive(Debug, Clone)]
pub struct TypeOracle {
    records: Vec<RecordTypeDef>,
    layout: FatPtrParamLayout,
}

impl TypeOracle {
    pub fn new(records: &[RecordTypeDef], layout: FatPtrParamLayout) -> Self {
        Self {
            records: records.to_vec(),
            layout,
        }
    }

    pub fn layout(&self) -> FatPtrParamLayout {
        self.layout
    }

    pub fn record(&self, name: &str) -> Result<&RecordTypeDef> {
        self.records
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| Error::internal(format!("No such record type: {}", name)))
    }

    pub fn size_of(&self, ty: &GimpleType) -> Result<i32> {
        ty.size_in_bytes(&self.records)
    }

    pub fn strategy(&self, ty: &GimpleType) -> Result<TypeStrategy> {
        match ty {
            ty if ty.is_primitive() => Ok(TypeStrategy::Primitive {
                ty: ty.clone(),
                jtype: primitive_jtype(ty)?,
            }),
            GimpleType::Pointer { base } => self.pointer_strategy(base),
            GimpleType::Record { name } => Ok(TypeStrategy::Record {
                name: name.clone(),
                size: self.record(name)?.size,
            }),
            GimpleType::Array {
                component,
                length: Some(length),
            } => Ok(TypeStrategy::Array {
                component: (**component).clone(),
                length: *length as i32,
                vf: if component.is_primitive() {
                    Some(ValueFunction::for_type(component)?)
                } else {
                    None
                },
                size: self.size_of(ty)?,
            }),
            other => Err(Error::unsupported_type("variable", other)),
        }
    }

    /// A pointer to an array is represented like a pointer to its component
    fn pointer_strategy(&self, base: &GimpleType) -> Result<TypeStrategy> {
        match base {
            base if base.is_primitive() => Ok(TypeStrategy::FatPtr(ValueFunction::for_type(base)?)),
            GimpleType::Function { .. } => Ok(TypeStrategy::FunPtr {
                signature: base.clone(),
            }),
            GimpleType::Array { component, .. } if component.is_primitive() => {
                Ok(TypeStrategy::FatPtr(ValueFunction::for_type(component)?))
            }
            _ => Ok(TypeStrategy::VPtr { base: base.clone() }),
        }
    }

    pub fn field_strategy(&self, ty: &GimpleType) -> Result<FieldStrategy> {
        self.strategy(ty)
            .map_err(|_| Error::unsupported_type("field", ty))?
            .field_strategy()
    }

    pub fn param_strategy(&self, ty: &GimpleType) -> Result<ParamStrategy> {
        self.strategy(ty)
            .map_err(|_| Error::unsupported_type("parameter", ty))?
            .param_strategy(self.layout)
    }

    pub fn return_strategy(&self, ty: &GimpleType) -> Result<ReturnStrategy> {
        match ty {
            GimpleType::Void => Ok(ReturnStrategy::Void),
            ty => self
                .strategy(ty)
                .map_err(|_| Error::unsupported_type("return value", ty))?
                .return_strategy(),
        }
    }

    /// Method descriptor for a function with the given signature
    pub fn method_descriptor(
        &self,
        return_type: &GimpleType,
        params: &[GimpleType],
    ) -> Result<String> {
        let mut types = Vec::new();
        for param in params {
            types.extend(self.param_strategy(param)?.parameter_types());
        }
        let ret = self.return_strategy(return_type)?.return_type();
        Ok(JType::method_descriptor(&ret, &types))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ir::RecordField;

    fn oracle(layout: FatPtrParamLayout) -> TypeOracle {
        let point = RecordTypeDef::new(
            "point",
            vec![
                RecordField::new("x", GimpleType::real(64), 0),
                RecordField::new("y", GimpleType::real(64), 8),
            ],
            16,
        );
        TypeOracle::new(&[point], layout)
    }

    #[test]
    fn test_pointer_strategies_by_base() {
        let oracle = oracle(FatPtrParamLayout::Wrapped);
        assert!(matches!(
            oracle.strategy(&GimpleType::pointer_to(GimpleType::int(8))).unwrap(),
            TypeStrategy::FatPtr(_)
        ));
        assert!(matches!(
            oracle
                .strategy(&GimpleType::pointer_to(GimpleType::record("point")))
                .unwrap(),
            TypeStrategy::VPtr { .. }
        ));
        assert!(matches!(
            oracle
                .strategy(&GimpleType::pointer_to(GimpleType::function(
                    GimpleType::Void,
                    vec![]
                )))
                .unwrap(),
            TypeStrategy::FunPtr { .. }
        ));
        assert!(matches!(
            oracle
                .strategy(&GimpleType::pointer_to(GimpleType::array_of(
                    GimpleType::real(64),
                    Some(3)
                )))
                .unwrap(),
            TypeStrategy::FatPtr(_)
        ));
    }

    #[test]
    fn test_descriptor_follows_layout() {
        let params = [GimpleType::pointer_to(GimpleType::real(64)), GimpleType::int(32)];
        let ret = GimpleType::real(64);
        assert_eq!(
            oracle(FatPtrParamLayout::Wrapped)
                .method_descriptor(&ret, &params)
                .unwrap(),
            "(Lorg/gccbridge/runtime/DoublePtr;I)D"
        );
        assert_eq!(
            oracle(FatPtrParamLayout::Pair)
                .method_descriptor(&ret, &params)
                .unwrap(),
            "([DII)D"
        );
    }

    #[test]
    fn test_unsupported_field_type_is_named() {
        let err = oracle(FatPtrParamLayout::Wrapped)
            .field_strategy(&GimpleType::Void)
            .unwrap_err();
        assert_eq!(err.to_string(), "Unsupported type for field: void");
    }

    #[test]
    fn test_record_strategy_uses_declared_size() {
        assert_eq!(
            oracle(FatPtrParamLayout::Wrapped)
                .strategy(&GimpleType::record("point"))
                .unwrap(),
            TypeStrategy::Record {
                name: "point".to_string(),
                size: 16
            }
        );
    }
}
