use crate::runtime::offset::OffsetPtr;
use crate::runtime::ptr::{malloc_size, Pointer, Ptr, RegionId, BITS_PER_BYTE, POINTER_BYTES};
use crate::{Error, Result};
use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Pointer into a region of pointer slots.
///
/// Each slot occupies [`POINTER_BYTES`] bytes of address space. Byte access
/// sees the integer encoding of the stored pointer.
#[derive(Clone)]
pub struct PointerPtr {
    array: Option<Arc<RwLock<Vec<Pointer>>>>,
    offset: i32,
}

impl PointerPtr {
    pub fn new(values: Vec<Pointer>) -> Self {
        PointerPtr {
            array: Some(Arc::new(RwLock::new(values))),
            offset: 0,
        }
    }

    /// Allocates null-filled slots covering at least `bytes` bytes
    pub fn malloc(bytes: i32) -> Self {
        let count = malloc_size(bytes, POINTER_BYTES).max(0) as usize;
        Self::new(vec![Pointer::null(); count])
    }

    fn slots(&self) -> &Arc<RwLock<Vec<Pointer>>> {
        match &self.array {
            Some(array) => array,
            None => panic!("null pointer dereference (PointerPtr + {})", self.offset),
        }
    }

    fn slot(&self, byte_offset: i32) -> usize {
        let pos = self.offset + byte_offset.div_euclid(POINTER_BYTES);
        match usize::try_from(pos) {
            Ok(pos) => pos,
            Err(_) => panic!("PointerPtr slot {} is out of bounds", pos),
        }
    }

    fn len(&self) -> i32 {
        self.array.as_ref().map_or(0, |a| a.read().len() as i32)
    }

    fn tail(&self) -> Vec<Pointer> {
        match &self.array {
            Some(array) => {
                let array = array.read();
                let start = (self.offset.max(0) as usize).min(array.len());
                array[start..].to_vec()
            }
            None => Vec::new(),
        }
    }
}

impl fmt::Debug for PointerPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PointerPtr[{}+{}]", self.len(), self.offset)
    }
}

impl Ptr for PointerPtr {
    fn region(&self) -> RegionId {
        self.array.as_ref().map_or(RegionId::NONE, RegionId::of)
    }

    fn offset_in_bytes(&self) -> i32 {
        self.offset * POINTER_BYTES
    }

    fn pointer_plus(&self, bytes: i32) -> Pointer {
        if bytes == 0 {
            return Pointer::new(self.clone());
        }
        if bytes % POINTER_BYTES == 0 {
            Pointer::new(PointerPtr {
                array: self.array.clone(),
                offset: self.offset + bytes / POINTER_BYTES,
            })
        } else {
            Pointer::new(OffsetPtr::new(Pointer::new(self.clone()), bytes))
        }
    }

    fn is_null(&self) -> bool {
        self.array.is_none() && self.offset == 0
    }

    fn capacity_in_bytes(&self) -> i32 {
        ((self.len() - self.offset) * POINTER_BYTES).max(0)
    }

    fn get_byte(&self, offset: i32) -> u8 {
        let encoded = self.slots().read()[self.slot(offset)].to_int();
        let shift = offset.rem_euclid(POINTER_BYTES) as u32 * BITS_PER_BYTE;
        (encoded >> shift) as u8
    }

    /// Splices a byte into the integer encoding of the slot. The slot keeps
    /// its provenance when it pointed into a region.
    fn set_byte(&self, offset: i32, value: u8) {
        let pos = self.slot(offset);
        let shift = offset.rem_euclid(POINTER_BYTES) as u32 * BITS_PER_BYTE;
        let mut slots = self.slots().write();
        let old = slots[pos].clone();
        let old_int = old.to_int();
        let new_int = (old_int & !(0xff << shift)) | (i32::from(value) << shift);
        if new_int != old_int {
            slots[pos] = if old.region() == RegionId::NONE {
                Pointer::null().pointer_plus(new_int)
            } else {
                old.pointer_plus(new_int - old_int)
            };
        }
    }

    fn get_pointer(&self, offset: i32) -> Pointer {
        if offset % POINTER_BYTES == 0 {
            self.slots().read()[self.slot(offset)].clone()
        } else {
            Pointer::null().pointer_plus(self.get_int(offset))
        }
    }

    fn set_pointer(&self, offset: i32, value: &Pointer) -> Result<()> {
        if offset % POINTER_BYTES != 0 {
            return Err(Error::not_supported(format!(
                "pointer store at misaligned offset {}",
                offset
            )));
        }
        let pos = self.slot(offset);
        self.slots().write()[pos] = value.clone();
        Ok(())
    }

    fn realloc(&self, new_size_in_bytes: i32) -> Pointer {
        let count = malloc_size(new_size_in_bytes, POINTER_BYTES).max(0) as usize;
        let mut values = self.tail();
        values.resize(count, Pointer::null());
        Pointer::new(Self::new(values))
    }

    fn copy_of(&self, offset: i32, num_bytes: i32) -> Pointer {
        let capacity = self.capacity_in_bytes();
        let values = (0..malloc_size(num_bytes, POINTER_BYTES).max(0))
            .map(|i| offset + i * POINTER_BYTES)
            .map(|at| {
                if at + POINTER_BYTES > capacity {
                    Pointer::null()
                } else {
                    self.get_pointer(at)
                }
            })
            .collect();
        Pointer::new(PointerPtr::new(values))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn memset(&self, value: i32, n: i32) {
        if value == 0 && n % POINTER_BYTES == 0 {
            let start = self.slot(0);
            let end = start + (n / POINTER_BYTES) as usize;
            self.slots().write()[start..end].fill(Pointer::null());
            return;
        }
        for i in 0..n {
            self.set_byte(i, value as u8);
        }
    }

    fn memcpy(&self, source: &dyn Ptr, num_bytes: i32) {
        self.memmove(source, num_bytes);
    }

    /// Copies whole slots when both sides are slot-aligned so that pointer
    /// provenance survives the copy.
    fn memmove(&self, source: &dyn Ptr, num_bytes: i32) {
        if num_bytes % POINTER_BYTES == 0 && source.offset_in_bytes() % POINTER_BYTES == 0 {
            let values: Vec<Pointer> = (0..num_bytes / POINTER_BYTES)
                .map(|i| source.get_aligned_pointer(i))
                .collect();
            let start = self.slot(0);
            let mut slots = self.slots().write();
            for (i, value) in values.into_iter().enumerate() {
                slots[start + i] = value;
            }
            return;
        }
        let buffer: Vec<u8> = (0..num_bytes).map(|i| source.get_byte(i)).collect();
        for (i, byte) in buffer.into_iter().enumerate() {
            self.set_byte(i as i32, byte);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::array::IntPtr;

    #[test]
    fn test_stores_and_loads_pointers() {
        let target = Pointer::new(IntPtr::new(vec![42, 43]));
        let slots = PointerPtr::malloc(8);
        slots.set_aligned_pointer(1, &target.pointer_plus(4)).ok();
        let loaded = slots.get_aligned_pointer(1);
        assert_eq!(loaded.get_int(0), 43);
        assert!(slots.get_aligned_pointer(0).is_null());
    }

    #[test]
    fn test_memcpy_preserves_provenance() {
        let target = Pointer::new(IntPtr::new(vec![7]));
        let from = PointerPtr::new(vec![target.clone(), Pointer::null()]);
        let to = PointerPtr::malloc(8);
        to.memcpy(&from, 8);
        assert_eq!(to.get_aligned_pointer(0), target);
        assert_eq!(to.get_aligned_pointer(0).get_int(0), 7);
    }

    #[test]
    fn test_misaligned_store_is_rejected() {
        let slots = PointerPtr::malloc(8);
        assert!(slots.set_pointer(2, &Pointer::null()).is_err());
    }
}
