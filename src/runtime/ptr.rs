//! The byte-addressable pointer contract shared by every runtime pointer variant.
//!
//! A pointer is a backing region plus an offset. Every variant exposes the same
//! typed accessors; variants that are not backed by bytes synthesize byte access
//! from their typed elements, which is what makes all regions mutually
//! byte-compatible.

use crate::runtime::array::BytePtr;
use crate::{Error, Result};
use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Number of bits in a byte
pub const BITS_PER_BYTE: u32 = 8;

/// Size of a pointer in the emulated memory model
pub const POINTER_BYTES: i32 = 4;

/// Size of an extended-precision real. Only the low 8 bytes carry the value
/// (as a double bit pattern); the remaining 4 bytes are padding.
pub const REAL96_BYTES: i32 = 12;

/// Computes the number of elements to allocate for a request of `bytes` bytes
/// with elements of `size` bytes.
///
/// Rounds up: 9 bytes of 4-byte ints is 3 ints, not 2.
pub fn malloc_size(bytes: i32, size: i32) -> i32 {
    let mut count = bytes / size;
    if bytes % size != 0 {
        count += 1;
    }
    count
}

/// Identity of a backing region.
///
/// Stable for the lifetime of the region but arbitrary across runs: it is
/// derived from the region's address. Pointers with no storage have
/// [`RegionId::NONE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegionId(usize);

impl RegionId {
    /// Identity shared by all pointers without backing storage
    pub const NONE: RegionId = RegionId(0);

    /// Identity of a shared region
    pub fn of<T: ?Sized>(region: &Arc<T>) -> Self {
        RegionId(Arc::as_ptr(region) as *const () as usize)
    }
}

/// Operations every emulated native pointer supports.
///
/// Offsets passed to accessors are in bytes, relative to this pointer.
/// `get_aligned_*` accessors take an element index instead and should be
/// preferred whenever the stride is known.
///
/// # Panics
///
/// Like slice indexing, dereferencing a pointer without storage or outside its
/// region panics. This is the emulated program's segmentation fault.
pub trait Ptr: fmt::Debug + Send + Sync + Any {
    /// Identity of the backing storage, used for comparison only
    fn region(&self) -> RegionId;

    /// Absolute offset of this pointer within its backing storage, in bytes
    fn offset_in_bytes(&self) -> i32;

    /// Returns a new pointer `bytes` bytes further along. Never mutates `self`.
    fn pointer_plus(&self, bytes: i32) -> Pointer;

    /// True exactly when there is no backing storage and the offset is zero
    fn is_null(&self) -> bool;

    /// Number of bytes addressable from this pointer to the end of its region
    fn capacity_in_bytes(&self) -> i32;

    /// Reads one byte
    fn get_byte(&self, offset: i32) -> u8;

    /// Writes one byte
    fn set_byte(&self, offset: i32, value: u8);

    /// Grows or shrinks the region starting at this pointer, preserving the
    /// retained prefix. Bytes added by growing are unspecified.
    fn realloc(&self, new_size_in_bytes: i32) -> Pointer;

    /// Upcast used by variants to detect same-shaped peers for bulk copies
    fn as_any(&self) -> &dyn Any;

    /// Reads `width` bytes little-endian starting at `offset`
    fn read_bits(&self, offset: i32, width: i32) -> u64 {
        let mut bits = 0u64;
        for i in (0..width).rev() {
            bits = (bits << BITS_PER_BYTE) | u64::from(self.get_byte(offset + i));
        }
        bits
    }

    /// Writes the low `width` bytes of `bits` little-endian starting at `offset`
    fn write_bits(&self, offset: i32, width: i32, bits: u64) {
        for i in 0..width {
            self.set_byte(offset + i, (bits >> (i as u32 * BITS_PER_BYTE)) as u8);
        }
    }

    /// Cast this pointer to a 32-bit integer
    fn to_int(&self) -> i32 {
        self.offset_in_bytes()
    }

    /// Reads a pointer stored at `offset`.
    ///
    /// Regions that only hold primitives can only yield the integer encoding
    /// of a pointer, relative to the null pointer.
    fn get_pointer(&self, offset: i32) -> Pointer {
        Pointer::null().pointer_plus(self.get_int(offset))
    }

    /// Stores a pointer at `offset`.
    ///
    /// Primitive regions accept only the null pointer; anything else means
    /// storage of the wrong shape was selected upstream.
    fn set_pointer(&self, offset: i32, value: &Pointer) -> Result<()> {
        if value.is_null() {
            self.set_int(offset, 0);
            Ok(())
        } else {
            Err(Error::PrimitiveRegionPointerStore)
        }
    }

    /// Creates a copy of `num_bytes` bytes starting `offset` bytes from this pointer
    fn copy_of(&self, offset: i32, num_bytes: i32) -> Pointer {
        let copy = BytePtr::malloc(num_bytes);
        let available = (self.capacity_in_bytes() - offset).clamp(0, num_bytes);
        for i in 0..available {
            copy.set_byte(i, self.get_byte(offset + i));
        }
        Pointer::new(copy)
    }

    /// Returns a pointer into the same storage at the absolute byte `offset`
    fn with_offset(&self, offset: i32) -> Pointer {
        self.pointer_plus(offset - self.offset_in_bytes())
    }

    fn get_boolean(&self, offset: i32) -> bool {
        self.get_byte(offset) != 0
    }

    fn set_boolean(&self, offset: i32, value: bool) {
        self.set_byte(offset, u8::from(value));
    }

    fn get_short(&self, offset: i32) -> i16 {
        self.read_bits(offset, 2) as u16 as i16
    }

    fn set_short(&self, offset: i32, value: i16) {
        self.write_bits(offset, 2, u64::from(value as u16));
    }

    fn get_aligned_short(&self, index: i32) -> i16 {
        self.get_short(index * 2)
    }

    fn set_aligned_short(&self, index: i32, value: i16) {
        self.set_short(index * 2, value);
    }

    fn get_char(&self, offset: i32) -> u16 {
        self.read_bits(offset, 2) as u16
    }

    fn set_char(&self, offset: i32, value: u16) {
        self.write_bits(offset, 2, u64::from(value));
    }

    fn get_aligned_char(&self, index: i32) -> u16 {
        self.get_char(index * 2)
    }

    fn set_aligned_char(&self, index: i32, value: u16) {
        self.set_char(index * 2, value);
    }

    fn get_int(&self, offset: i32) -> i32 {
        self.read_bits(offset, 4) as u32 as i32
    }

    fn set_int(&self, offset: i32, value: i32) {
        self.write_bits(offset, 4, u64::from(value as u32));
    }

    fn get_aligned_int(&self, index: i32) -> i32 {
        self.get_int(index * 4)
    }

    fn set_aligned_int(&self, index: i32, value: i32) {
        self.set_int(index * 4, value);
    }

    fn get_long(&self, offset: i32) -> i64 {
        self.read_bits(offset, 8) as i64
    }

    fn set_long(&self, offset: i32, value: i64) {
        self.write_bits(offset, 8, value as u64);
    }

    fn get_aligned_long(&self, index: i32) -> i64 {
        self.get_long(index * 8)
    }

    fn set_aligned_long(&self, index: i32, value: i64) {
        self.set_long(index * 8, value);
    }

    fn get_float(&self, offset: i32) -> f32 {
        f32::from_bits(self.read_bits(offset, 4) as u32)
    }

    fn set_float(&self, offset: i32, value: f32) {
        self.write_bits(offset, 4, u64::from(value.to_bits()));
    }

    fn get_aligned_float(&self, index: i32) -> f32 {
        self.get_float(index * 4)
    }

    fn set_aligned_float(&self, index: i32, value: f32) {
        self.set_float(index * 4, value);
    }

    fn get_double(&self, offset: i32) -> f64 {
        f64::from_bits(self.read_bits(offset, 8))
    }

    fn set_double(&self, offset: i32, value: f64) {
        self.write_bits(offset, 8, value.to_bits());
    }

    fn get_aligned_double(&self, index: i32) -> f64 {
        self.get_double(index * 8)
    }

    fn set_aligned_double(&self, index: i32, value: f64) {
        self.set_double(index * 8, value);
    }

    /// Reads an extended real. Precision beyond a double is not represented.
    fn get_real96(&self, offset: i32) -> f64 {
        self.get_double(offset)
    }

    fn set_real96(&self, offset: i32, value: f64) {
        self.set_double(offset, value);
    }

    fn get_aligned_real96(&self, index: i32) -> f64 {
        self.get_real96(index * REAL96_BYTES)
    }

    fn set_aligned_real96(&self, index: i32, value: f64) {
        self.set_real96(index * REAL96_BYTES, value);
    }

    fn get_aligned_pointer(&self, index: i32) -> Pointer {
        self.get_pointer(index * POINTER_BYTES)
    }

    fn set_aligned_pointer(&self, index: i32, value: &Pointer) -> Result<()> {
        self.set_pointer(index * POINTER_BYTES, value)
    }

    /// Sets `n` bytes to the low byte of `value`
    fn memset(&self, value: i32, n: i32) {
        let byte = value as u8;
        for i in 0..n {
            self.set_byte(i, byte);
        }
    }

    /// Copies `num_bytes` bytes from `source`. Regions must not overlap.
    fn memcpy(&self, source: &dyn Ptr, num_bytes: i32) {
        for i in 0..num_bytes {
            self.set_byte(i, source.get_byte(i));
        }
    }

    /// Copies `num_bytes` bytes from `source`; regions may overlap
    fn memmove(&self, source: &dyn Ptr, num_bytes: i32) {
        let buffer: Vec<u8> = (0..num_bytes).map(|i| source.get_byte(i)).collect();
        for (i, byte) in buffer.into_iter().enumerate() {
            self.set_byte(i as i32, byte);
        }
    }

    /// Compares `num_bytes` bytes as unsigned values
    fn memcmp(&self, other: &dyn Ptr, num_bytes: i32) -> i32 {
        for i in 0..num_bytes {
            match self.get_byte(i).cmp(&other.get_byte(i)) {
                Ordering::Less => return -1,
                Ordering::Greater => return 1,
                Ordering::Equal => {}
            }
        }
        0
    }
}

lazy_static::lazy_static! {
    static ref NULL: Pointer = Pointer::new(BytePtr::null());
}

/// Shared handle to a runtime pointer value.
///
/// Equality means same backing storage and same byte offset. Ordering compares
/// storage identity first and byte offset second, which orders pointers within
/// one allocation but is arbitrary between allocations.
#[derive(Clone)]
pub struct Pointer(Arc<dyn Ptr>);

impl Pointer {
    /// Wraps a pointer variant
    pub fn new(ptr: impl Ptr + 'static) -> Self {
        Pointer(Arc::new(ptr))
    }

    /// The canonical null pointer. Always the same instance.
    pub fn null() -> Self {
        NULL.clone()
    }

    /// True if both handles refer to the very same pointer instance
    pub fn same_instance(a: &Pointer, b: &Pointer) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    /// Downcasts to a concrete variant
    pub fn downcast_ref<T: Ptr>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }
}

/// Compares two pointers: storage identity first, then byte offset
pub fn compare(x: &dyn Ptr, y: &dyn Ptr) -> Ordering {
    let (m1, m2) = (x.region(), y.region());
    if m1 != m2 {
        return m1.cmp(&m2);
    }
    if x.is_null() && y.is_null() {
        return Ordering::Equal;
    }
    x.offset_in_bytes().cmp(&y.offset_in_bytes())
}

impl Deref for Pointer {
    type Target = dyn Ptr;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl fmt::Debug for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl PartialEq for Pointer {
    fn eq(&self, other: &Self) -> bool {
        self.region() == other.region() && self.offset_in_bytes() == other.offset_in_bytes()
    }
}

impl Eq for Pointer {}

impl PartialOrd for Pointer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pointer {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(self.0.as_ref(), other.0.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::array::IntPtr;

    #[test]
    fn test_malloc_size_rounds_up() {
        assert_eq!(malloc_size(9, 4), 3);
        assert_eq!(malloc_size(8, 4), 2);
        assert_eq!(malloc_size(0, 8), 0);
        assert_eq!(malloc_size(1, 8), 1);
    }

    #[test]
    fn test_null_is_shared_instance() {
        let a = Pointer::null();
        let b = Pointer::null();
        assert!(Pointer::same_instance(&a, &b));
        assert!(a.is_null());
        assert_eq!(a.region(), RegionId::NONE);
    }

    #[test]
    fn test_null_plus_offset_is_not_null() {
        let p = Pointer::null().pointer_plus(12);
        assert!(!p.is_null());
        assert_eq!(p.to_int(), 12);
        assert!(p.pointer_plus(-12).is_null());
    }

    #[test]
    fn test_ordering_within_allocation() {
        let base = Pointer::new(IntPtr::malloc(16));
        let later = base.pointer_plus(8);
        assert!(base < later);
        assert_eq!(later.pointer_plus(-8), base);
        assert_ne!(base, Pointer::new(IntPtr::malloc(16)));
    }
}
