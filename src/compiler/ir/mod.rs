//! # GIMPLE Intermediate Representation
//!
//! The object graph consumed by the rewrite passes and the code generator.
//! Units arrive as JSON documents from the front end and are read by
//! [`GimpleParser`].
//!
//! ## Module Structure
//!
//! ```text
//! ir/
//! ├── mod.rs        # This file - module definition and re-exports
//! ├── types.rs      # GimpleType, RecordTypeDef, RecordField
//! ├── expr.rs       # GimpleExpr operands
//! ├── statement.rs  # GimpleOp, GimpleStatement and its payloads
//! ├── program.rs    # CompilationUnit, GimpleFunction, GimpleVarDecl
//! └── parser.rs     # GimpleParser (JSON)
//! ```
//!
//! ## Ownership
//!
//! A [`CompilationUnit`] owns its functions, globals and record definitions.
//! Functions and globals point back at their unit through a [`UnitId`], an
//! index into the batch being compiled, never through a reference.

mod expr;
mod parser;
mod program;
mod statement;
mod types;

pub use expr::GimpleExpr;
pub use parser::GimpleParser;
pub use program::{
    CompilationUnit, GimpleBasicBlock, GimpleFunction, GimpleParameter, GimpleVarDecl, UnitId,
    SYNTHETIC_VAR_BASE_ID,
};
pub use statement::{
    conversion, int32, GimpleAssignment, GimpleCall, GimpleConditional, GimpleOp,
    GimpleStatement,
};
pub use types::{GimpleType, RecordField, RecordTypeDef, POINTER_SIZE};
