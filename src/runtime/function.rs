//! Function pointers stored as ordinary pointer values

use crate::runtime::ptr::{Pointer, Ptr, RegionId};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

lazy_static::lazy_static! {
    static ref HANDLES: Mutex<HashMap<MethodRef, Arc<MethodRef>>> = Mutex::new(HashMap::new());
}

/// The static method a function pointer calls
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    /// Internal name of the declaring class
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

impl MethodRef {
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        MethodRef {
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.owner, self.name, self.descriptor)
    }
}

/// A function pointer stored where any pointer may go, such as a pointer
/// slot or a `void *`.
///
/// Handles are interned, so two pointers to the same method share a region
/// and compare equal. There is no storage behind the pointer: reading or
/// writing through it is the emulated program's segmentation fault.
#[derive(Clone)]
pub struct FunctionPtr {
    handle: Arc<MethodRef>,
    offset: i32,
}

impl FunctionPtr {
    /// Wraps `handle` as a pointer value
    pub fn of(handle: MethodRef) -> Pointer {
        let handle = HANDLES
            .lock()
            .entry(handle.clone())
            .or_insert_with(|| Arc::new(handle))
            .clone();
        Pointer::new(FunctionPtr { handle, offset: 0 })
    }

    /// The method to invoke
    pub fn handle(&self) -> &MethodRef {
        &self.handle
    }

    fn fault(&self) -> ! {
        panic!("dereferencing function pointer {}", self.handle)
    }
}

impl fmt::Debug for FunctionPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "&{}+{}", self.handle, self.offset)
    }
}

impl Ptr for FunctionPtr {
    fn region(&self) -> RegionId {
        RegionId::of(&self.handle)
    }

    fn offset_in_bytes(&self) -> i32 {
        self.offset
    }

    fn pointer_plus(&self, bytes: i32) -> Pointer {
        Pointer::new(FunctionPtr {
            handle: self.handle.clone(),
            offset: self.offset + bytes,
        })
    }

    fn is_null(&self) -> bool {
        false
    }

    fn capacity_in_bytes(&self) -> i32 {
        0
    }

    fn get_byte(&self, _offset: i32) -> u8 {
        self.fault()
    }

    fn set_byte(&self, _offset: i32, _value: u8) {
        self.fault()
    }

    fn realloc(&self, _new_size_in_bytes: i32) -> Pointer {
        self.fault()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
