//! # gcc-bridge - GIMPLE on a managed runtime
//!
//! A compiler backend that lowers GCC's GIMPLE three-address IR onto a
//! garbage-collected runtime with no native pointers, no raw memory and no
//! unions. Every native pointer, array, struct, union and function pointer is
//! mapped onto managed references, primitive arrays and offsets, keeping
//! pointer arithmetic, aliasing and byte-level access intact.
//!
//! ## Features
//!
//! - **Pointer runtime** - typed regions with byte-granular views, `memcpy`,
//!   `memmove`, `realloc` and identity-based ordering
//! - **Representation strategies** - one strategy per type decides locals,
//!   fields, globals, parameters and return values
//! - **Rewrite passes** - member-function-pointer canonicalization
//! - **Linking** - flat symbol records resolved across independently
//!   compiled units
//!
//! ## Quick Start
//!
//! ```rust
//! use gcc_bridge::compiler::{CompileOptions, Compiler, GimpleParser};
//!
//! # fn main() -> gcc_bridge::Result<()> {
//! let json = r#"{
//!     "name": "answer.c",
//!     "functions": [{
//!         "id": 1,
//!         "name": "answer",
//!         "return_type": {"kind": "integer", "bits": 32},
//!         "basic_blocks": [{
//!             "index": 2,
//!             "statements": [{
//!                 "stmt": "return",
//!                 "value": {"expr": "integer_const", "value": 42,
//!                           "type": {"kind": "integer", "bits": 32}}
//!             }]
//!         }]
//!     }]
//! }"#;
//!
//! let unit = GimpleParser::new().parse_str(json)?;
//! let result = Compiler::new(CompileOptions::default()).compile(vec![unit])?;
//!
//! let class = result.class("Answer").unwrap();
//! assert_eq!(class.method("answer").unwrap().descriptor, "()I");
//! # Ok(())
//! # }
//! ```
//!
//! ## Emulated memory
//!
//! ```rust
//! use gcc_bridge::runtime::{DoublePtr, Pointer, Ptr};
//!
//! let p = Pointer::new(DoublePtr::malloc(16));
//! p.set_double(8, 2.5);
//! assert_eq!(p.pointer_plus(8).get_double(0), 2.5);
//! ```
//!
//! ## Modules
//!
//! - [`compiler`] - IR, rewrite passes and code generation
//! - [`runtime`] - the pointer runtime model
//! - [`link`] - symbol records and class resolution
//! - [`error`] - error types

#![allow(clippy::new_without_default)]
#![allow(clippy::large_enum_variant)] // GExpr and JExpr are short-lived trees

/// Version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod compiler;
pub mod error;
pub mod link;
pub mod runtime;

// Re-export main types
pub use compiler::{CompileOptions, CompileResult, Compiler};
pub use error::{Error, ErrorSeverity, LinkError, Result};
pub use link::{ClassPath, LinkSymbol, SymbolKind};
pub use runtime::{Pointer, Ptr};
