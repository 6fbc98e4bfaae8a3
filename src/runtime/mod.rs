//! Emulated native memory for compiled C/C++ programs.
//!
//! Every native pointer is modelled as a backing region plus an offset. Regions
//! are typed (`IntPtr`, `DoublePtr`, ...) for speed, but every variant can be
//! read and written at byte granularity, so a program may view any region
//! through a pointer of any type.
//!
//! ```
//! use gcc_bridge::runtime::{BytePtr, Pointer, Ptr};
//!
//! let p = Pointer::new(BytePtr::malloc(8));
//! p.set_int(0, 0x0102_0304);
//! assert_eq!(p.get_byte(0), 0x04);
//! assert_eq!(p.pointer_plus(1).get_byte(0), 0x03);
//! ```

pub mod array;
pub mod field;
pub mod function;
pub mod mixed;
pub mod offset;
pub mod pointers;
pub mod ptr;

pub use array::{
    ArrayPtr, BooleanPtr, BytePtr, CharPtr, DoublePtr, Element, FloatPtr, IntPtr, LongPtr,
    ShortPtr,
};
pub use field::PointerFieldPtr;
pub use function::{FunctionPtr, MethodRef};
pub use mixed::MixedPtr;
pub use offset::OffsetPtr;
pub use pointers::PointerPtr;
pub use ptr::{
    compare, malloc_size, Pointer, Ptr, RegionId, BITS_PER_BYTE, POINTER_BYTES, REAL96_BYTES,
};

/// Package of the runtime classes referenced by generated code
pub const RUNTIME_PACKAGE: &str = "org/gccbridge/runtime";

/// Internal class name of a runtime class
pub fn runtime_class(simple_name: &str) -> String {
    format!("{}/{}", RUNTIME_PACKAGE, simple_name)
}
