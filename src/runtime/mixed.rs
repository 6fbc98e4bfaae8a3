use crate::runtime::ptr::{malloc_size, Pointer, Ptr, RegionId, POINTER_BYTES};
use crate::{Error, Result};
use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Default)]
struct MixedRegion {
    bytes: Vec<u8>,
    /// One slot per pointer-sized word; `Some` while the word holds a pointer
    refs: Vec<Option<Pointer>>,
}

impl MixedRegion {
    fn with_len(len: usize) -> Self {
        MixedRegion {
            bytes: vec![0; len],
            refs: vec![None; malloc_size(len as i32, POINTER_BYTES) as usize],
        }
    }
}

/// Pointer into a region that holds both primitives and pointers, such as a
/// record with pointer fields.
///
/// Bytes hold the primitive view of every word. A word last written with a
/// non-null pointer also remembers that pointer, so it can be loaded back with
/// its provenance. Any primitive write to the word forgets it.
#[derive(Clone)]
pub struct MixedPtr {
    region: Option<Arc<RwLock<MixedRegion>>>,
    offset: i32,
}

impl MixedPtr {
    /// Allocates a zeroed region of `bytes` bytes
    pub fn malloc(bytes: i32) -> Self {
        MixedPtr {
            region: Some(Arc::new(RwLock::new(MixedRegion::with_len(bytes.max(0) as usize)))),
            offset: 0,
        }
    }

    fn storage(&self) -> &Arc<RwLock<MixedRegion>> {
        match &self.region {
            Some(region) => region,
            None => panic!("null pointer dereference (MixedPtr + {})", self.offset),
        }
    }

    fn index(&self, offset: i32) -> usize {
        let pos = self.offset + offset;
        match usize::try_from(pos) {
            Ok(pos) => pos,
            Err(_) => panic!("MixedPtr offset {} is out of bounds", pos),
        }
    }

    fn len(&self) -> i32 {
        self.region.as_ref().map_or(0, |r| r.read().bytes.len() as i32)
    }

    /// Stores `value` in the word starting at absolute byte `pos`, which must
    /// be word-aligned
    fn store_word(&self, pos: usize, value: &Pointer) {
        let words = POINTER_BYTES as usize;
        let encoded = value.to_int().to_le_bytes();
        let slot = if value.region() == RegionId::NONE {
            None
        } else {
            Some(value.clone())
        };
        let mut region = self.storage().write();
        region.bytes[pos..pos + words].copy_from_slice(&encoded);
        region.refs[pos / words] = slot;
    }
}

impl fmt::Debug for MixedPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MixedPtr[{}+{}]", self.len(), self.offset)
    }
}

impl Ptr for MixedPtr {
    fn region(&self) -> RegionId {
        self.region.as_ref().map_or(RegionId::NONE, RegionId::of)
    }

    fn offset_in_bytes(&self) -> i32 {
        self.offset
    }

    fn pointer_plus(&self, bytes: i32) -> Pointer {
        Pointer::new(MixedPtr {
            region: self.region.clone(),
            offset: self.offset + bytes,
        })
    }

    fn is_null(&self) -> bool {
        self.region.is_none() && self.offset == 0
    }

    fn capacity_in_bytes(&self) -> i32 {
        (self.len() - self.offset).max(0)
    }

    fn get_byte(&self, offset: i32) -> u8 {
        self.storage().read().bytes[self.index(offset)]
    }

    fn set_byte(&self, offset: i32, value: u8) {
        let pos = self.index(offset);
        let mut region = self.storage().write();
        region.bytes[pos] = value;
        region.refs[pos / POINTER_BYTES as usize] = None;
    }

    fn read_bits(&self, offset: i32, width: i32) -> u64 {
        let start = self.index(offset);
        let region = self.storage().read();
        region.bytes[start..start + width as usize]
            .iter()
            .rev()
            .fold(0u64, |bits, &b| (bits << 8) | u64::from(b))
    }

    fn write_bits(&self, offset: i32, width: i32, bits: u64) {
        let start = self.index(offset);
        let end = start + width as usize;
        let mut region = self.storage().write();
        for (i, byte) in region.bytes[start..end].iter_mut().enumerate() {
            *byte = (bits >> (i * 8)) as u8;
        }
        let words = POINTER_BYTES as usize;
        for slot in start / words..(end + words - 1) / words {
            region.refs[slot] = None;
        }
    }

    fn get_pointer(&self, offset: i32) -> Pointer {
        let pos = self.index(offset);
        if pos % POINTER_BYTES as usize == 0 {
            if let Some(p) = &self.storage().read().refs[pos / POINTER_BYTES as usize] {
                return p.clone();
            }
        }
        Pointer::null().pointer_plus(self.get_int(offset))
    }

    fn set_pointer(&self, offset: i32, value: &Pointer) -> Result<()> {
        let pos = self.index(offset);
        if pos % POINTER_BYTES as usize != 0 {
            if value.is_null() {
                self.set_int(offset, 0);
                return Ok(());
            }
            return Err(Error::not_supported(format!(
                "pointer store at misaligned offset {}",
                pos
            )));
        }
        self.store_word(pos, value);
        Ok(())
    }

    fn realloc(&self, new_size_in_bytes: i32) -> Pointer {
        let copy = MixedPtr::malloc(new_size_in_bytes);
        copy.memcpy(self, new_size_in_bytes.min(self.capacity_in_bytes()));
        Pointer::new(copy)
    }

    fn copy_of(&self, offset: i32, num_bytes: i32) -> Pointer {
        let copy = MixedPtr::malloc(num_bytes);
        let source = self.pointer_plus(offset);
        copy.memcpy(&*source, num_bytes.min(source.capacity_in_bytes()));
        Pointer::new(copy)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn memcpy(&self, source: &dyn Ptr, num_bytes: i32) {
        self.memmove(source, num_bytes);
    }

    /// Copies word by word while both sides are word-aligned, so stored
    /// pointers keep their provenance.
    fn memmove(&self, source: &dyn Ptr, num_bytes: i32) {
        let aligned = self.offset % POINTER_BYTES == 0
            && source.offset_in_bytes() % POINTER_BYTES == 0;
        let words = if aligned { num_bytes / POINTER_BYTES } else { 0 };
        let pointers: Vec<Pointer> = (0..words).map(|i| source.get_aligned_pointer(i)).collect();
        let tail: Vec<u8> = (words * POINTER_BYTES..num_bytes)
            .map(|i| source.get_byte(i))
            .collect();
        for (i, p) in pointers.iter().enumerate() {
            self.store_word(self.index(i as i32 * POINTER_BYTES), p);
        }
        for (i, byte) in tail.into_iter().enumerate() {
            self.set_byte(words * POINTER_BYTES + i as i32, byte);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::array::DoublePtr;

    #[test]
    fn test_mixed_holds_pointer_and_primitive() {
        let record = MixedPtr::malloc(12);
        let target = Pointer::new(DoublePtr::new(vec![2.5]));
        record.set_int(0, 17);
        record.set_pointer(4, &target).ok();
        record.set_float(8, 1.5);
        assert_eq!(record.get_int(0), 17);
        assert_eq!(record.get_pointer(4).get_double(0), 2.5);
        assert_eq!(record.get_float(8), 1.5);
    }

    #[test]
    fn test_primitive_write_forgets_pointer() {
        let record = MixedPtr::malloc(8);
        let target = Pointer::new(DoublePtr::new(vec![2.5]));
        record.set_pointer(0, &target).ok();
        record.set_byte(1, 0);
        assert_eq!(record.get_pointer(0).region(), RegionId::NONE);
    }

    #[test]
    fn test_copy_keeps_pointers() {
        let record = MixedPtr::malloc(8);
        let target = Pointer::new(DoublePtr::new(vec![9.0]));
        record.set_pointer(4, &target).ok();
        let copy = record.copy_of(0, 8);
        assert_eq!(copy.get_pointer(4), target);
        let grown = record.realloc(16);
        assert_eq!(grown.get_pointer(4).get_double(0), 9.0);
        assert_eq!(grown.capacity_in_bytes(), 16);
    }

    #[test]
    fn test_unaligned_copy_falls_back_to_bytes() {
        let record = MixedPtr::malloc(12);
        let target = Pointer::new(DoublePtr::new(vec![4.0]));
        record.set_pointer(4, &target).ok();
        let copy = MixedPtr::malloc(12);
        copy.pointer_plus(1).memmove(&*record.pointer_plus(1), 8);
        assert_eq!(copy.get_int(4), record.get_int(4));
        assert_eq!(copy.get_pointer(4).region(), RegionId::NONE);

        let aligned = MixedPtr::malloc(12);
        aligned.memmove(&record, 12);
        assert_eq!(aligned.get_pointer(4), target);
    }
}
