//! Property tests for the pointer runtime
//!
//! Every region variant must behave like the same flat byte array, whatever
//! its element type and whether accesses are aligned or not.

use gcc_bridge::runtime::{
    malloc_size, ArrayPtr, BytePtr, DoublePtr, Element, FloatPtr, FunctionPtr, IntPtr, LongPtr,
    MethodRef, MixedPtr, OffsetPtr, Pointer, PointerFieldPtr, PointerPtr, Ptr, ShortPtr,
};
use gcc_bridge::Error;
use proptest::prelude::*;

const REGION_BYTES: i32 = 64;

// =============================================================================
// STRATEGY GENERATORS
// =============================================================================

/// A fresh region of `REGION_BYTES` bytes, of any primitive-backed variant
fn any_region() -> impl Strategy<Value = Pointer> {
    prop_oneof![
        Just(()).prop_map(|_| Pointer::new(BytePtr::malloc(REGION_BYTES))),
        Just(()).prop_map(|_| Pointer::new(ShortPtr::malloc(REGION_BYTES))),
        Just(()).prop_map(|_| Pointer::new(IntPtr::malloc(REGION_BYTES))),
        Just(()).prop_map(|_| Pointer::new(LongPtr::malloc(REGION_BYTES))),
        Just(()).prop_map(|_| Pointer::new(FloatPtr::malloc(REGION_BYTES))),
        Just(()).prop_map(|_| Pointer::new(DoublePtr::malloc(REGION_BYTES))),
        Just(()).prop_map(|_| Pointer::new(MixedPtr::malloc(REGION_BYTES))),
    ]
}

/// A region viewed directly, through an aligned offset, or through a
/// misaligned offset wrapper. Returns the view and the bytes left in it.
fn any_view() -> impl Strategy<Value = (Pointer, i32)> {
    (any_region(), 0..16i32).prop_map(|(region, skip)| (region.pointer_plus(skip), REGION_BYTES - skip))
}

fn fill_with(p: &Pointer, bytes: &[u8]) {
    for (i, b) in bytes.iter().enumerate() {
        p.set_byte(i as i32, *b);
    }
}

fn bytes_of(p: &Pointer, len: i32) -> Vec<u8> {
    (0..len).map(|i| p.get_byte(i)).collect()
}

// =============================================================================
// PROPERTIES
// =============================================================================

proptest! {
    #[test]
    fn int_round_trips_at_any_offset((p, len) in any_view(), offset in 0..44i32, value: i32) {
        prop_assume!(offset + 4 <= len);
        p.set_int(offset, value);
        prop_assert_eq!(p.get_int(offset), value);
    }

    #[test]
    fn long_round_trips_at_any_offset((p, len) in any_view(), offset in 0..40i32, value: i64) {
        prop_assume!(offset + 8 <= len);
        p.set_long(offset, value);
        prop_assert_eq!(p.get_long(offset), value);
    }

    #[test]
    fn short_and_char_round_trip((p, len) in any_view(), offset in 0..46i32, value: i16) {
        prop_assume!(offset + 2 <= len);
        p.set_short(offset, value);
        prop_assert_eq!(p.get_short(offset), value);
        p.set_char(offset, value as u16);
        prop_assert_eq!(p.get_char(offset), value as u16);
    }

    #[test]
    fn floating_point_bits_round_trip((p, len) in any_view(), offset in 0..40i32, value: f64) {
        prop_assume!(offset + 8 <= len);
        p.set_double(offset, value);
        prop_assert_eq!(p.get_double(offset).to_bits(), value.to_bits());
        p.set_float(offset, value as f32);
        prop_assert_eq!(p.get_float(offset).to_bits(), (value as f32).to_bits());
    }

    #[test]
    fn pointer_plus_is_reversible((p, _len) in any_view(), n in -8..48i32) {
        let back = p.pointer_plus(n).pointer_plus(-n);
        prop_assert_eq!(back.offset_in_bytes(), p.offset_in_bytes());
        prop_assert_eq!(back, p);
    }

    #[test]
    fn pointer_plus_does_not_mutate((p, len) in any_view(), n in 1..8i32) {
        prop_assume!(len >= 8 + n);
        p.set_long(0, 0x0102_0304_0506_0708);
        let before = p.offset_in_bytes();
        let moved = p.pointer_plus(n);
        prop_assert_eq!(p.offset_in_bytes(), before);
        prop_assert_eq!(moved.offset_in_bytes(), before + n);
        prop_assert_eq!(moved.get_byte(0), p.get_byte(n));
    }

    #[test]
    fn memcpy_then_memcmp_is_zero(
        source in any_region(),
        target in any_region(),
        bytes in prop::collection::vec(any::<u8>(), REGION_BYTES as usize),
        len in 0..=REGION_BYTES,
    ) {
        fill_with(&source, &bytes);
        target.memcpy(&*source, len);
        prop_assert_eq!(target.memcmp(&*source, len), 0);
        prop_assert_eq!(bytes_of(&target, len), bytes[..len as usize].to_vec());
    }

    #[test]
    fn memmove_matches_buffered_copy(
        region in any_region(),
        bytes in prop::collection::vec(any::<u8>(), REGION_BYTES as usize),
        from in 0..24i32,
        to in 0..24i32,
        len in 0..=40i32,
    ) {
        fill_with(&region, &bytes);
        let mut expected = bytes.clone();
        expected.copy_within(from as usize..(from + len) as usize, to as usize);

        region.pointer_plus(to).memmove(&*region.pointer_plus(from), len);
        prop_assert_eq!(bytes_of(&region, REGION_BYTES), expected);
    }

    #[test]
    fn realloc_preserves_prefix(
        region in any_region(),
        bytes in prop::collection::vec(any::<u8>(), REGION_BYTES as usize),
        new_size in 0..128i32,
    ) {
        fill_with(&region, &bytes);
        let resized = region.realloc(new_size);
        let kept = new_size.min(REGION_BYTES);
        prop_assert_eq!(bytes_of(&resized, kept), bytes[..kept as usize].to_vec());
        prop_assert!(resized.capacity_in_bytes() >= new_size);
    }

    #[test]
    fn memcmp_orders_unsigned_bytes(a: u8, b: u8) {
        let x = Pointer::new(BytePtr::new(vec![a]));
        let y = Pointer::new(BytePtr::new(vec![b]));
        prop_assert_eq!(x.memcmp(&*y, 1).signum(), (a.cmp(&b) as i32).signum());
    }
}

// =============================================================================
// EXAMPLES
// =============================================================================

fn element_count<E: Element>(p: &ArrayPtr<E>) -> usize {
    p.to_vec().len()
}

#[test]
fn test_malloc_rounds_up_to_whole_elements() {
    assert_eq!(malloc_size(9, 4), 3);
    assert_eq!(element_count(&IntPtr::malloc(9)), 3);
    assert_eq!(element_count(&DoublePtr::malloc(17)), 3);
    assert_eq!(element_count(&BytePtr::malloc(0)), 0);
    assert!(!Pointer::new(BytePtr::malloc(0)).is_null());
}

#[test]
fn test_null_pointer() {
    let null = Pointer::null();
    assert!(null.is_null());
    assert!(Pointer::same_instance(&null, &Pointer::null()));

    let eight = null.pointer_plus(8);
    assert!(!eight.is_null());
    assert_eq!(eight.to_int(), 8);
}

#[test]
fn test_misaligned_view_is_offset_wrapper() {
    let p = Pointer::new(IntPtr::new(vec![0x0403_0201, 0x0807_0605]));
    let q = p.pointer_plus(1);
    assert!(q.downcast_ref::<OffsetPtr>().is_some());
    assert_eq!(q.get_int(0), 0x0504_0302);
    // back on the grid, back to the typed view
    assert!(q.pointer_plus(3).downcast_ref::<IntPtr>().is_some());
}

#[test]
fn test_cross_type_byte_view() {
    let p = Pointer::new(DoublePtr::malloc(8));
    p.set_double(0, 1.0);
    let bits = 1.0f64.to_bits();
    assert_eq!(p.get_int(4), (bits >> 32) as i32);
    assert_eq!(p.get_byte(7), (bits >> 56) as u8);
}

#[test]
fn test_pointer_store_into_primitive_region_fails() {
    let ints = Pointer::new(IntPtr::malloc(8));
    let target = Pointer::new(BytePtr::malloc(1));
    assert!(matches!(
        ints.set_pointer(0, &target),
        Err(Error::PrimitiveRegionPointerStore)
    ));
    assert!(ints.set_pointer(0, &Pointer::null()).is_ok());
}

#[test]
fn test_pointer_regions_hold_pointers() {
    let target = Pointer::new(BytePtr::from_str_nul("hi"));
    let slots = Pointer::new(PointerPtr::malloc(8));
    slots.set_pointer(4, &target).unwrap();
    assert_eq!(slots.get_pointer(4), target);
    assert!(slots.get_pointer(0).is_null());

    let record = Pointer::new(MixedPtr::malloc(16));
    record.set_int(0, 7);
    record.set_pointer(8, &target).unwrap();
    assert_eq!(record.get_int(0), 7);
    assert_eq!(record.get_pointer(8), target);
}

#[test]
fn test_ordering_within_one_allocation() {
    let base = Pointer::new(ShortPtr::malloc(16));
    let later = base.pointer_plus(6);
    assert!(base < later);
    assert_eq!(later.pointer_plus(-6), base);
}

#[test]
fn test_string_constant_array_is_nul_terminated() {
    assert_eq!(BytePtr::to_array("hi"), vec![b'h', b'i', 0]);
    assert_eq!(BytePtr::to_array("\u{e9}").len(), 3);
    let s = BytePtr::new(BytePtr::to_array("hello"));
    assert_eq!(s.nul_terminated_string().as_deref(), Some("hello"));
}

#[test]
fn test_static_field_address_is_shared() {
    let owner = "org/gccbridge/generated/Lists";
    let head = PointerFieldPtr::address_of(owner, "list_head");
    let node = Pointer::new(MixedPtr::malloc(8));
    node.set_int(0, 11);
    head.set_pointer(0, &node).unwrap();

    let again = PointerFieldPtr::address_of(owner, "list_head");
    assert_eq!(again, head);
    assert_eq!(again.get_pointer(0).get_int(0), 11);
    let field = again.downcast_ref::<PointerFieldPtr>().unwrap();
    assert_eq!((field.owner(), field.field()), (owner, "list_head"));
    assert_eq!(field.value(), node);

    // the slot can be copied like any pointer region
    let copy = Pointer::new(PointerPtr::malloc(4));
    copy.memcpy(&*head, 4);
    assert_eq!(copy.get_pointer(0), node);
    assert!(head.pointer_plus(4).downcast_ref::<PointerFieldPtr>().is_none());
}

#[test]
fn test_function_pointers_compare_by_method() {
    let norm = MethodRef::new("org/example/Vec", "vec_norm", "(I)D");
    let a = FunctionPtr::of(norm.clone());
    let b = FunctionPtr::of(norm.clone());
    let other = FunctionPtr::of(MethodRef::new("org/example/Vec", "vec_dot", "(I)D"));
    assert_eq!(a, b);
    assert_ne!(a, other);
    assert!(!a.is_null());
    assert_eq!(a.downcast_ref::<FunctionPtr>().map(|f| f.handle()), Some(&norm));

    // a function pointer can be stored in pointer slots and loaded back
    let table = Pointer::new(PointerPtr::malloc(8));
    table.set_pointer(4, &a).unwrap();
    let loaded = table.get_pointer(4);
    assert_eq!(loaded, a);
    assert_eq!(loaded.downcast_ref::<FunctionPtr>().map(|f| f.handle().name.as_str()), Some("vec_norm"));
}

#[test]
#[should_panic(expected = "dereferencing function pointer")]
fn test_reading_through_function_pointer_faults() {
    FunctionPtr::of(MethodRef::new("org/example/Vec", "vec_norm", "(I)D")).get_int(0);
}
