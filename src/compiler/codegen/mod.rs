//! # Code Generation
//!
//! Lowers GIMPLE units to class models for the managed runtime. The
//! representation of every value is chosen per type by a [`TypeStrategy`];
//! the generator never decides layout itself.
//!
//! ## Module Structure
//!
//! ```text
//! codegen/
//! ├── jvm.rs       # Class model: types, descriptors, instructions
//! ├── expr.rs      # JExpr trees and the instruction sink
//! ├── vars.rs      # Local slots, static fields, <clinit>
//! ├── gexpr.rs     # GExpr: values in their chosen representation
//! ├── strategy.rs  # TypeStrategy and FieldStrategy
//! ├── params.rs    # ParamStrategy / ReturnStrategy (call boundary)
//! ├── oracle.rs    # TypeOracle: type -> strategy
//! ├── calls.rs     # Built-in call generators, local and linked functions
//! ├── function.rs  # Function bodies
//! └── unit.rs      # One class per compilation unit
//! ```
//!
//! ## Representations
//!
//! | Type                  | Local                    | Parameter (default) | Field / global       |
//! |-----------------------|--------------------------|---------------------|----------------------|
//! | primitive             | local slot               | slot                | typed bytes / field  |
//! | addressable primitive | length-1 array           | copied into array   | length-1 array       |
//! | `T*`, T primitive     | array + offset           | `TPtr` wrapper      | pointer slot         |
//! | `struct*`, `void*`    | `Ptr`                    | `Ptr`               | pointer slot         |
//! | `struct`              | `MixedPtr` block         | `Ptr` to a copy     | inline bytes         |
//! | `fn*`                 | `MethodHandle`           | `MethodHandle`      | `FunctionPtr`        |

pub mod calls;
pub mod expr;
pub mod function;
pub mod gexpr;
pub mod jvm;
pub mod oracle;
pub mod params;
pub mod strategy;
pub mod unit;
pub mod vars;

pub use calls::{Builtin, CallGenerator, FunctionTable, MethodRef};
pub use function::{FunctionGenerator, UnitScope};
pub use gexpr::{GExpr, ValueFunction};
pub use jvm::{ClassFile, FieldDecl, Insn, JType, MethodDecl};
pub use oracle::TypeOracle;
pub use params::{FatPtrParamLayout, ParamStrategy, ReturnStrategy};
pub use strategy::{FieldStrategy, TypeStrategy};
pub use unit::{UnitGenerator, UnitOutput};
