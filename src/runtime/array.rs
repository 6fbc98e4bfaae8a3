//! Pointers into regions of a single primitive element type.

use crate::runtime::offset::OffsetPtr;
use crate::runtime::ptr::{malloc_size, Pointer, Ptr, RegionId, BITS_PER_BYTE};
use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A primitive element stored in a typed region
pub trait Element: Copy + Default + fmt::Debug + Send + Sync + 'static {
    /// Width of one element in bytes
    const BYTES: i32;
    /// Runtime class name of pointers over this element
    const POINTER_CLASS: &'static str;

    /// Little-endian bit pattern of this element
    fn to_bits(self) -> u64;
    /// Element from the low `BYTES` bytes of `bits`
    fn from_bits(bits: u64) -> Self;
}

impl Element for u8 {
    const BYTES: i32 = 1;
    const POINTER_CLASS: &'static str = "BytePtr";

    fn to_bits(self) -> u64 {
        u64::from(self)
    }

    fn from_bits(bits: u64) -> Self {
        bits as u8
    }
}

impl Element for bool {
    const BYTES: i32 = 1;
    const POINTER_CLASS: &'static str = "BooleanPtr";

    fn to_bits(self) -> u64 {
        u64::from(self)
    }

    /// Any non-zero byte is `true`; the original byte value is not kept
    fn from_bits(bits: u64) -> Self {
        bits & 0xff != 0
    }
}

impl Element for i16 {
    const BYTES: i32 = 2;
    const POINTER_CLASS: &'static str = "ShortPtr";

    fn to_bits(self) -> u64 {
        u64::from(self as u16)
    }

    fn from_bits(bits: u64) -> Self {
        bits as u16 as i16
    }
}

impl Element for u16 {
    const BYTES: i32 = 2;
    const POINTER_CLASS: &'static str = "CharPtr";

    fn to_bits(self) -> u64 {
        u64::from(self)
    }

    fn from_bits(bits: u64) -> Self {
        bits as u16
    }
}

impl Element for i32 {
    const BYTES: i32 = 4;
    const POINTER_CLASS: &'static str = "IntPtr";

    fn to_bits(self) -> u64 {
        u64::from(self as u32)
    }

    fn from_bits(bits: u64) -> Self {
        bits as u32 as i32
    }
}

impl Element for i64 {
    const BYTES: i32 = 8;
    const POINTER_CLASS: &'static str = "LongPtr";

    fn to_bits(self) -> u64 {
        self as u64
    }

    fn from_bits(bits: u64) -> Self {
        bits as i64
    }
}

impl Element for f32 {
    const BYTES: i32 = 4;
    const POINTER_CLASS: &'static str = "FloatPtr";

    fn to_bits(self) -> u64 {
        u64::from(f32::to_bits(self))
    }

    fn from_bits(bits: u64) -> Self {
        f32::from_bits(bits as u32)
    }
}

impl Element for f64 {
    const BYTES: i32 = 8;
    const POINTER_CLASS: &'static str = "DoublePtr";

    fn to_bits(self) -> u64 {
        f64::to_bits(self)
    }

    fn from_bits(bits: u64) -> Self {
        f64::from_bits(bits)
    }
}

/// Shared, mutable storage for a typed region
pub type Region<E> = Arc<RwLock<Vec<E>>>;

/// Pointer into a region of `E` elements, at an element-aligned offset.
///
/// Offsets that are not a multiple of the element width are represented by
/// wrapping this pointer in an [`OffsetPtr`].
pub struct ArrayPtr<E: Element> {
    array: Option<Region<E>>,
    offset: i32,
}

pub type BytePtr = ArrayPtr<u8>;
/// Region of booleans. Each element holds a single bit of information, so a
/// byte other than 0 or 1 written through [`Ptr::set_byte`] reads back as 1.
pub type BooleanPtr = ArrayPtr<bool>;
pub type ShortPtr = ArrayPtr<i16>;
pub type CharPtr = ArrayPtr<u16>;
pub type IntPtr = ArrayPtr<i32>;
pub type LongPtr = ArrayPtr<i64>;
pub type FloatPtr = ArrayPtr<f32>;
pub type DoublePtr = ArrayPtr<f64>;

impl<E: Element> Clone for ArrayPtr<E> {
    fn clone(&self) -> Self {
        ArrayPtr {
            array: self.array.clone(),
            offset: self.offset,
        }
    }
}

impl<E: Element> ArrayPtr<E> {
    /// Pointer to the first element of a new region holding `values`
    pub fn new(values: Vec<E>) -> Self {
        ArrayPtr {
            array: Some(Arc::new(RwLock::new(values))),
            offset: 0,
        }
    }

    /// Pointer to element `offset` of an existing region
    pub fn from_region(region: Region<E>, offset: i32) -> Self {
        ArrayPtr {
            array: Some(region),
            offset,
        }
    }

    /// A pointer of this element type without storage
    pub fn null() -> Self {
        ArrayPtr {
            array: None,
            offset: 0,
        }
    }

    /// Allocates zeroed storage for at least `bytes` bytes
    pub fn malloc(bytes: i32) -> Self {
        let count = malloc_size(bytes, E::BYTES).max(0) as usize;
        Self::new(vec![E::default(); count])
    }

    /// The backing region, if any
    pub fn region_handle(&self) -> Option<&Region<E>> {
        self.array.as_ref()
    }

    /// Offset in elements
    pub fn element_offset(&self) -> i32 {
        self.offset
    }

    /// Reads element `index` relative to this pointer
    pub fn get(&self, index: i32) -> E {
        let pos = self.position(index);
        self.storage().read()[pos]
    }

    /// Writes element `index` relative to this pointer
    pub fn set(&self, index: i32, value: E) {
        let pos = self.position(index);
        self.storage().write()[pos] = value;
    }

    /// Snapshot of the elements from this pointer to the end of the region
    pub fn to_vec(&self) -> Vec<E> {
        match &self.array {
            Some(array) => {
                let array = array.read();
                let start = (self.offset.max(0) as usize).min(array.len());
                array[start..].to_vec()
            }
            None => Vec::new(),
        }
    }

    fn storage(&self) -> &Region<E> {
        match &self.array {
            Some(array) => array,
            None => panic!("null pointer dereference ({} + {})", E::POINTER_CLASS, self.offset),
        }
    }

    fn position(&self, index: i32) -> usize {
        let pos = self.offset + index;
        match usize::try_from(pos) {
            Ok(pos) => pos,
            Err(_) => panic!("{} offset {} is out of bounds", E::POINTER_CLASS, pos),
        }
    }

    fn element_len(&self) -> i32 {
        self.array.as_ref().map_or(0, |a| a.read().len() as i32)
    }
}

impl BytePtr {
    /// Backing array for a string constant: its UTF-8 bytes followed by a
    /// terminating zero. Generated code initializes `char` arrays from this.
    pub fn to_array(constant: &str) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(constant.len() + 1);
        bytes.extend_from_slice(constant.as_bytes());
        bytes.push(0);
        bytes
    }

    /// A new region holding the bytes of `s` followed by a terminating zero
    pub fn from_str_nul(s: &str) -> Self {
        Self::new(Self::to_array(s))
    }

    /// Length of the zero-terminated string starting here, or `None` if the
    /// region ends before a terminator
    pub fn nul_terminated_len(&self) -> Option<usize> {
        self.to_vec().iter().position(|&b| b == 0)
    }

    /// The zero-terminated string starting here, decoded lossily as UTF-8
    pub fn nul_terminated_string(&self) -> Option<String> {
        let bytes = self.to_vec();
        let len = bytes.iter().position(|&b| b == 0)?;
        Some(String::from_utf8_lossy(&bytes[..len]).into_owned())
    }
}

impl<E: Element> fmt::Debug for ArrayPtr<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.array {
            None if self.offset == 0 => write!(f, "NULL"),
            None => write!(f, "NULL+{}", self.offset * E::BYTES),
            Some(_) => write!(f, "{}[{}+{}]", E::POINTER_CLASS, self.element_len(), self.offset),
        }
    }
}

impl<E: Element> Ptr for ArrayPtr<E> {
    fn region(&self) -> RegionId {
        self.array.as_ref().map_or(RegionId::NONE, RegionId::of)
    }

    fn offset_in_bytes(&self) -> i32 {
        self.offset * E::BYTES
    }

    fn pointer_plus(&self, bytes: i32) -> Pointer {
        if bytes == 0 {
            return Pointer::new(self.clone());
        }
        if bytes % E::BYTES == 0 {
            Pointer::new(ArrayPtr {
                array: self.array.clone(),
                offset: self.offset + bytes / E::BYTES,
            })
        } else {
            Pointer::new(OffsetPtr::new(Pointer::new(self.clone()), bytes))
        }
    }

    fn is_null(&self) -> bool {
        self.array.is_none() && self.offset == 0
    }

    fn capacity_in_bytes(&self) -> i32 {
        ((self.element_len() - self.offset) * E::BYTES).max(0)
    }

    fn get_byte(&self, offset: i32) -> u8 {
        let byte_index = self.offset * E::BYTES + offset;
        let element = byte_index.div_euclid(E::BYTES) - self.offset;
        let shift = byte_index.rem_euclid(E::BYTES) as u32 * BITS_PER_BYTE;
        (self.get(element).to_bits() >> shift) as u8
    }

    fn set_byte(&self, offset: i32, value: u8) {
        let byte_index = self.offset * E::BYTES + offset;
        let pos = self.position(byte_index.div_euclid(E::BYTES) - self.offset);
        let shift = byte_index.rem_euclid(E::BYTES) as u32 * BITS_PER_BYTE;
        let mut array = self.storage().write();
        let bits = array[pos].to_bits() & !(0xffu64 << shift);
        array[pos] = E::from_bits(bits | (u64::from(value) << shift));
    }

    fn read_bits(&self, offset: i32, width: i32) -> u64 {
        if width == E::BYTES && offset % E::BYTES == 0 {
            return self.get(offset / E::BYTES).to_bits();
        }
        let mut bits = 0u64;
        for i in (0..width).rev() {
            bits = (bits << BITS_PER_BYTE) | u64::from(self.get_byte(offset + i));
        }
        bits
    }

    fn write_bits(&self, offset: i32, width: i32, bits: u64) {
        if width == E::BYTES && offset % E::BYTES == 0 {
            self.set(offset / E::BYTES, E::from_bits(bits));
            return;
        }
        for i in 0..width {
            self.set_byte(offset + i, (bits >> (i as u32 * BITS_PER_BYTE)) as u8);
        }
    }

    fn realloc(&self, new_size_in_bytes: i32) -> Pointer {
        let count = malloc_size(new_size_in_bytes, E::BYTES).max(0) as usize;
        let mut values = self.to_vec();
        values.resize(count, E::default());
        Pointer::new(Self::new(values))
    }

    fn copy_of(&self, offset: i32, num_bytes: i32) -> Pointer {
        if offset % E::BYTES != 0 {
            let copy = BytePtr::malloc(num_bytes);
            for i in 0..num_bytes.min(self.capacity_in_bytes() - offset) {
                copy.set_byte(i, self.get_byte(offset + i));
            }
            return Pointer::new(copy);
        }
        let count = malloc_size(num_bytes, E::BYTES).max(0) as usize;
        let start = offset / E::BYTES;
        let mut values: Vec<E> = self
            .to_vec()
            .into_iter()
            .skip(start.max(0) as usize)
            .take(count)
            .collect();
        values.resize(count, E::default());
        Pointer::new(Self::new(values))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn memset(&self, value: i32, n: i32) {
        if n % E::BYTES != 0 {
            for i in 0..n {
                self.set_byte(i, value as u8);
            }
            return;
        }
        let mut bits = 0u64;
        for _ in 0..E::BYTES {
            bits = (bits << BITS_PER_BYTE) | u64::from(value as u8);
        }
        let fill = E::from_bits(bits);
        let start = self.position(0);
        let end = start + (n / E::BYTES) as usize;
        self.storage().write()[start..end].fill(fill);
    }

    fn memcpy(&self, source: &dyn Ptr, num_bytes: i32) {
        self.memmove(source, num_bytes);
    }

    fn memmove(&self, source: &dyn Ptr, num_bytes: i32) {
        if let Some(peer) = source.as_any().downcast_ref::<ArrayPtr<E>>() {
            if num_bytes % E::BYTES == 0 {
                let count = (num_bytes / E::BYTES) as usize;
                let from = peer.position(0);
                let elements: Vec<E> = peer.storage().read()[from..from + count].to_vec();
                let to = self.position(0);
                self.storage().write()[to..to + count].copy_from_slice(&elements);
                return;
            }
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

    #[test]
    fn test_int_stored_bytewise_reads_back() {
        let p = BytePtr::malloc(8);
        p.set_int(2, 0x1234_5678);
        assert_eq!(p.get_int(2), 0x1234_5678);
        assert_eq!(p.get_byte(2), 0x78);
        assert_eq!(p.get_byte(5), 0x12);
    }

    #[test]
    fn test_double_region_reads_as_bytes() {
        let p = DoublePtr::new(vec![1.0]);
        let bits = 1.0f64.to_bits();
        for i in 0..8 {
            assert_eq!(p.get_byte(i), (bits >> (i * 8)) as u8);
        }
    }

    #[test]
    fn test_set_byte_in_int_region() {
        let p = IntPtr::new(vec![0, 0]);
        p.set_byte(5, 0xab);
        assert_eq!(p.get(1), 0xab00);
        assert_eq!(p.get(0), 0);
    }

    #[test]
    fn test_misaligned_pointer_plus_is_offset_pointer() {
        let p = FloatPtr::new(vec![0.0; 4]);
        let q = p.pointer_plus(2);
        assert!(q.downcast_ref::<OffsetPtr>().is_some());
        assert_eq!(q.offset_in_bytes(), 2);
        let r = q.pointer_plus(2);
        assert!(r.downcast_ref::<FloatPtr>().is_some());
        assert_eq!(r.offset_in_bytes(), 4);
    }

    #[test]
    fn test_aligned_pointer_plus_preserves_variant() {
        let p = LongPtr::new(vec![1, 2, 3]);
        let q = p.pointer_plus(16);
        let typed = q.downcast_ref::<LongPtr>().map(|l| l.get(0));
        assert_eq!(typed, Some(3));
    }

    #[test]
    fn test_malloc_zero_is_not_null() {
        let p = IntPtr::malloc(0);
        assert!(!p.is_null());
        assert_eq!(p.capacity_in_bytes(), 0);
    }

    #[test]
    fn test_memset_fills_elements() {
        let p = IntPtr::new(vec![7; 4]);
        p.memset(0xff, 8);
        assert_eq!(p.to_vec(), vec![-1, -1, 7, 7]);
    }

    #[test]
    fn test_memmove_overlapping() {
        let p = BytePtr::new(vec![1, 2, 3, 4, 5]);
        let q = p.pointer_plus(1);
        q.memmove(&p, 4);
        assert_eq!(p.to_vec(), vec![1, 1, 2, 3, 4]);
    }

    #[test]
    fn test_realloc_preserves_prefix() {
        let p = ShortPtr::new(vec![1, 2, 3]);
        let grown = p.realloc(10);
        assert_eq!(grown.capacity_in_bytes(), 10);
        assert_eq!(grown.get_aligned_short(2), 3);
        let shrunk = p.realloc(2);
        assert_eq!(shrunk.capacity_in_bytes(), 2);
        assert_eq!(shrunk.get_aligned_short(0), 1);
    }

    #[test]
    fn test_nul_terminated_string() {
        let s = BytePtr::from_str_nul("hello");
        assert_eq!(s.nul_terminated_len(), Some(5));
        assert_eq!(s.nul_terminated_string().as_deref(), Some("hello"));
        assert_eq!(BytePtr::new(b"abc".to_vec()).nul_terminated_len(), None);
    }

    #[test]
    fn test_boolean_region_normalizes_bytes() {
        let p = BooleanPtr::malloc(2);
        p.set_byte(0, 0x7f);
        p.set_byte(1, 1);
        assert_eq!(p.get_byte(0), 1);
        assert_eq!(p.get_byte(1), 1);
        assert!(p.get_boolean(0));
    }

    #[test]
    #[should_panic(expected = "null pointer dereference")]
    fn test_null_dereference_panics() {
        IntPtr::null().get_int(0);
    }
}
