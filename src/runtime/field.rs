//! Addresses of static pointer fields

use crate::runtime::pointers::PointerPtr;
use crate::runtime::ptr::{Pointer, Ptr, RegionId, POINTER_BYTES};
use crate::Result;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

lazy_static::lazy_static! {
    static ref STATIC_FIELDS: Mutex<HashMap<(String, String), PointerPtr>> =
        Mutex::new(HashMap::new());
}

/// Address of a pointer-typed static field of a generated class.
///
/// Each field is backed by a one-slot region registered under its owner class
/// and field name, so every address taken of the same global shares storage
/// and compares equal, whichever unit took it.
#[derive(Clone)]
pub struct PointerFieldPtr {
    owner: Arc<str>,
    field: Arc<str>,
    slot: PointerPtr,
}

impl PointerFieldPtr {
    /// The address of `owner.field`, creating a null-initialized slot the
    /// first time the field is addressed
    pub fn address_of(owner: &str, field: &str) -> Pointer {
        let slot = STATIC_FIELDS
            .lock()
            .entry((owner.to_string(), field.to_string()))
            .or_insert_with(|| PointerPtr::malloc(POINTER_BYTES))
            .clone();
        Pointer::new(PointerFieldPtr {
            owner: owner.into(),
            field: field.into(),
            slot,
        })
    }

    /// Internal name of the class declaring the field
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// Current value of the field
    pub fn value(&self) -> Pointer {
        self.slot.get_pointer(0)
    }
}

impl fmt::Debug for PointerFieldPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "&{}.{}", self.owner, self.field)
    }
}

impl Ptr for PointerFieldPtr {
    fn region(&self) -> RegionId {
        self.slot.region()
    }

    fn offset_in_bytes(&self) -> i32 {
        self.slot.offset_in_bytes()
    }

    fn pointer_plus(&self, bytes: i32) -> Pointer {
        if bytes == 0 {
            return Pointer::new(self.clone());
        }
        self.slot.pointer_plus(bytes)
    }

    fn is_null(&self) -> bool {
        false
    }

    fn capacity_in_bytes(&self) -> i32 {
        self.slot.capacity_in_bytes()
    }

    fn get_byte(&self, offset: i32) -> u8 {
        self.slot.get_byte(offset)
    }

    fn set_byte(&self, offset: i32, value: u8) {
        self.slot.set_byte(offset, value)
    }

    fn get_pointer(&self, offset: i32) -> Pointer {
        self.slot.get_pointer(offset)
    }

    fn set_pointer(&self, offset: i32, value: &Pointer) -> Result<()> {
        self.slot.set_pointer(offset, value)
    }

    fn realloc(&self, new_size_in_bytes: i32) -> Pointer {
        self.slot.realloc(new_size_in_bytes)
    }

    fn copy_of(&self, offset: i32, num_bytes: i32) -> Pointer {
        self.slot.copy_of(offset, num_bytes)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn memset(&self, value: i32, n: i32) {
        self.slot.memset(value, n)
    }

    fn memcpy(&self, source: &dyn Ptr, num_bytes: i32) {
        self.slot.memcpy(source, num_bytes)
    }

    fn memmove(&self, source: &dyn Ptr, num_bytes: i32) {
        self.slot.memmove(source, num_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::array::IntPtr;

    #[test]
    fn test_same_field_shares_storage() {
        let a = PointerFieldPtr::address_of("org/example/Shared", "head");
        let b = PointerFieldPtr::address_of("org/example/Shared", "head");
        let target = Pointer::new(IntPtr::new(vec![5]));
        a.set_pointer(0, &target).unwrap();
        assert_eq!(a, b);
        assert_eq!(b.get_pointer(0).get_int(0), 5);

        let other = PointerFieldPtr::address_of("org/example/Shared", "tail");
        assert_ne!(a, other);
        assert!(other.get_pointer(0).is_null());
    }
}
