//! GIMPLE types and record layouts

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of a pointer in the emulated memory model
pub const POINTER_SIZE: i32 = 4;

/// A GIMPLE type. The set of variants is closed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GimpleType {
    /// C99 `_Bool` / C++ `bool`
    Boolean,
    /// Sized integer
    Integer {
        /// Precision in bits (8, 16, 32 or 64)
        bits: u32,
        /// True for unsigned integers
        #[serde(default)]
        unsigned: bool,
    },
    /// Floating point
    Real {
        /// Precision in bits (32, 64, or 80/96/128 for extended reals)
        bits: u32,
    },
    /// Pointer to `base`
    Pointer {
        /// Pointed-to type
        base: Box<GimpleType>,
    },
    /// Array of `component`, with a fixed or unknown length
    Array {
        /// Element type
        component: Box<GimpleType>,
        /// Number of elements, if known
        #[serde(default)]
        length: Option<i64>,
    },
    /// Struct or union, by name of its definition in the owning unit
    Record {
        /// Name of the record definition
        name: String,
    },
    /// Function signature
    Function {
        /// Return type
        return_type: Box<GimpleType>,
        /// Parameter types
        #[serde(default)]
        params: Vec<GimpleType>,
        /// True if the function accepts trailing variadic arguments
        #[serde(default)]
        variadic: bool,
    },
    /// `void`
    Void,
}

impl GimpleType {
    /// Signed integer of the given precision
    pub fn int(bits: u32) -> Self {
        GimpleType::Integer {
            bits,
            unsigned: false,
        }
    }

    /// Unsigned integer of the given precision
    pub fn uint(bits: u32) -> Self {
        GimpleType::Integer {
            bits,
            unsigned: true,
        }
    }

    /// Floating point of the given precision
    pub fn real(bits: u32) -> Self {
        GimpleType::Real { bits }
    }

    /// Pointer to `base`
    pub fn pointer_to(base: GimpleType) -> Self {
        GimpleType::Pointer {
            base: Box::new(base),
        }
    }

    /// Array of `length` elements of `component`
    pub fn array_of(component: GimpleType, length: Option<i64>) -> Self {
        GimpleType::Array {
            component: Box::new(component),
            length,
        }
    }

    /// Record type by name
    pub fn record(name: impl Into<String>) -> Self {
        GimpleType::Record { name: name.into() }
    }

    /// Function type
    pub fn function(return_type: GimpleType, params: Vec<GimpleType>) -> Self {
        GimpleType::Function {
            return_type: Box::new(return_type),
            params,
            variadic: false,
        }
    }

    /// True for boolean, integer and real types
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            GimpleType::Boolean | GimpleType::Integer { .. } | GimpleType::Real { .. }
        )
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, GimpleType::Pointer { .. })
    }

    /// True for a pointer whose base is a function type
    pub fn is_function_pointer(&self) -> bool {
        matches!(self, GimpleType::Pointer { base } if matches!(**base, GimpleType::Function { .. }))
    }

    /// Base type of a pointer
    pub fn base_type(&self) -> Option<&GimpleType> {
        match self {
            GimpleType::Pointer { base } => Some(base),
            _ => None,
        }
    }

    /// Size of this type in bytes.
    ///
    /// Record sizes are looked up in `records`. Arrays of unknown length and
    /// function types have no size.
    pub fn size_in_bytes(&self, records: &[RecordTypeDef]) -> Result<i32> {
        match self {
            GimpleType::Boolean => Ok(1),
            GimpleType::Integer { bits, .. } => Ok((*bits / 8) as i32),
            GimpleType::Real { bits } => Ok(match bits {
                32 => 4,
                64 => 8,
                _ => crate::runtime::REAL96_BYTES,
            }),
            GimpleType::Pointer { .. } => Ok(POINTER_SIZE),
            GimpleType::Array { component, length } => match length {
                Some(n) => {
                    let element = component.size_in_bytes(records)?;
                    i32::try_from(*n)
                        .ok()
                        .and_then(|n| element.checked_mul(n))
                        .ok_or_else(|| Error::unsupported_type("32-bit size of", self))
                }
                None => Err(Error::unsupported_type("size of", self)),
            },
            GimpleType::Record { name } => records
                .iter()
                .find(|r| &r.name == name)
                .map(|r| r.size)
                .ok_or_else(|| Error::internal(format!("No such record type: {}", name))),
            GimpleType::Void => Ok(1),
            GimpleType::Function { .. } => Err(Error::unsupported_type("size of", self)),
        }
    }
}

impl fmt::Display for GimpleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GimpleType::Boolean => write!(f, "bool"),
            GimpleType::Integer { bits, unsigned } => {
                write!(f, "{}int{}", if *unsigned { "u" } else { "" }, bits)
            }
            GimpleType::Real { bits } => write!(f, "real{}", bits),
            GimpleType::Pointer { base } => write!(f, "{}*", base),
            GimpleType::Array { component, length } => match length {
                Some(n) => write!(f, "{}[{}]", component, n),
                None => write!(f, "{}[]", component),
            },
            GimpleType::Record { name } => write!(f, "struct {}", name),
            GimpleType::Function {
                return_type,
                params,
                variadic,
            } => {
                write!(f, "{} (", return_type)?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                if *variadic {
                    write!(f, ", ...")?;
                }
                write!(f, ")")
            }
            GimpleType::Void => write!(f, "void"),
        }
    }
}

/// A field of a record type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordField {
    /// Field name
    pub name: String,
    /// Field type
    #[serde(rename = "type")]
    pub ty: GimpleType,
    /// Offset from the start of the record, in bytes
    pub offset: i32,
    /// Width in bits, for bit-fields
    #[serde(default)]
    pub bit_size: Option<u32>,
}

impl RecordField {
    pub fn new(name: impl Into<String>, ty: GimpleType, offset: i32) -> Self {
        Self {
            name: name.into(),
            ty,
            offset,
            bit_size: None,
        }
    }

    /// Bytes occupied by this field. A bit-field only claims the bytes its
    /// bits touch, not the full width of its declared type.
    pub fn occupied_bytes(&self, records: &[RecordTypeDef]) -> i32 {
        match self.bit_size {
            Some(bits) => bits.div_ceil(8) as i32,
            None => self.ty.size_in_bytes(records).unwrap_or(0),
        }
    }
}

/// Struct or union layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordTypeDef {
    /// Name referenced by [`GimpleType::Record`]
    pub name: String,
    /// Fields in declaration order
    pub fields: Vec<RecordField>,
    /// Total size in bytes
    pub size: i32,
}

impl RecordTypeDef {
    pub fn new(name: impl Into<String>, fields: Vec<RecordField>, size: i32) -> Self {
        Self {
            name: name.into(),
            fields,
            size,
        }
    }

    /// Looks up a field by name
    pub fn field(&self, name: &str) -> Option<&RecordField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// True if fields overlap, as in a union. Detected from the layout, not
    /// from the declaration keyword.
    pub fn is_union(&self) -> bool {
        self.fields.len() > 1 && self.fields.iter().all(|f| f.offset == 0)
    }

    /// Appends `field` at the end of the record and grows the record by the
    /// field's size.
    pub fn append_field(&mut self, name: impl Into<String>, ty: GimpleType) -> Result<()> {
        let field_size = ty.size_in_bytes(&[])?;
        self.fields.push(RecordField::new(name, ty, self.size));
        self.size += field_size;
        Ok(())
    }

    /// Checks that field offsets never decrease and that every field lies
    /// within the declared size.
    pub fn check_layout(&self, records: &[RecordTypeDef]) -> Result<()> {
        let mut last = 0;
        for field in &self.fields {
            if field.offset < last {
                return Err(Error::internal(format!(
                    "Field {}.{} at offset {} precedes offset {}",
                    self.name, field.name, field.offset, last
                )));
            }
            let end = field.offset + field.occupied_bytes(records);
            if end > self.size {
                return Err(Error::internal(format!(
                    "Field {}.{} ends at {} beyond record size {}",
                    self.name, field.name, end, self.size
                )));
            }
            last = field.offset;
        }
        Ok(())
    }
}
