use crate::runtime::array::BytePtr;
use crate::runtime::ptr::{Pointer, Ptr, RegionId};
use crate::Result;
use std::any::Any;
use std::fmt;

/// A pointer at a byte offset that is not a multiple of the wrapped pointer's
/// element width.
///
/// All accesses are forwarded to the wrapped pointer with the extra offset
/// added. Moving the pointer back onto an element boundary yields a pointer of
/// the wrapped variant again.
#[derive(Clone)]
pub struct OffsetPtr {
    ptr: Pointer,
    offset: i32,
}

impl OffsetPtr {
    pub fn new(ptr: Pointer, offset: i32) -> Self {
        OffsetPtr { ptr, offset }
    }

    /// The wrapped, element-aligned pointer
    pub fn inner(&self) -> &Pointer {
        &self.ptr
    }
}

impl fmt::Debug for OffsetPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}+{}", self.ptr, self.offset)
    }
}

impl Ptr for OffsetPtr {
    fn region(&self) -> RegionId {
        self.ptr.region()
    }

    fn offset_in_bytes(&self) -> i32 {
        self.ptr.offset_in_bytes() + self.offset
    }

    fn pointer_plus(&self, bytes: i32) -> Pointer {
        if bytes == 0 {
            return Pointer::new(self.clone());
        }
        self.ptr.pointer_plus(self.offset + bytes)
    }

    fn is_null(&self) -> bool {
        false
    }

    fn capacity_in_bytes(&self) -> i32 {
        (self.ptr.capacity_in_bytes() - self.offset).max(0)
    }

    fn to_int(&self) -> i32 {
        self.ptr.to_int() + self.offset
    }

    fn get_byte(&self, offset: i32) -> u8 {
        self.ptr.get_byte(self.offset + offset)
    }

    fn set_byte(&self, offset: i32, value: u8) {
        self.ptr.set_byte(self.offset + offset, value)
    }

    fn read_bits(&self, offset: i32, width: i32) -> u64 {
        self.ptr.read_bits(self.offset + offset, width)
    }

    fn write_bits(&self, offset: i32, width: i32, bits: u64) {
        self.ptr.write_bits(self.offset + offset, width, bits)
    }

    fn get_pointer(&self, offset: i32) -> Pointer {
        self.ptr.get_pointer(self.offset + offset)
    }

    fn set_pointer(&self, offset: i32, value: &Pointer) -> Result<()> {
        self.ptr.set_pointer(self.offset + offset, value)
    }

    fn realloc(&self, new_size_in_bytes: i32) -> Pointer {
        let copy = BytePtr::malloc(new_size_in_bytes);
        for i in 0..new_size_in_bytes.min(self.capacity_in_bytes()) {
            copy.set_byte(i, self.get_byte(i));
        }
        Pointer::new(copy)
    }

    fn copy_of(&self, offset: i32, num_bytes: i32) -> Pointer {
        self.ptr.copy_of(self.offset + offset, num_bytes)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::array::{CharPtr, IntPtr};

    #[test]
    fn test_offset_forwards_accesses() {
        let base = IntPtr::new(vec![0x0403_0201, 0x0807_0605]);
        let p = base.pointer_plus(1);
        assert_eq!(p.get_byte(0), 0x02);
        assert_eq!(p.get_int(0), 0x0504_0302);
        p.set_short(2, 0x7f7f);
        assert_eq!(base.get(0), 0x7f03_0201);
        assert_eq!(base.get(1), 0x0807_067f);
        assert!(!p.is_null());
    }

    #[test]
    fn test_offset_to_int_adds_offset() {
        let p = CharPtr::new(vec![0; 4]).pointer_plus(4).pointer_plus(1);
        assert_eq!(p.to_int(), 5);
        assert_eq!(p.offset_in_bytes(), 5);
    }

    #[test]
    fn test_offset_realloc_copies_bytes() {
        let p = IntPtr::new(vec![0x0403_0201]).pointer_plus(1);
        let grown = p.realloc(6);
        assert_eq!(grown.capacity_in_bytes(), 6);
        assert_eq!(grown.get_byte(0), 0x02);
        assert_eq!(grown.get_byte(2), 0x04);
        assert_eq!(grown.get_byte(3), 0);
    }
}
