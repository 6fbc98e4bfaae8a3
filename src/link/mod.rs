//! # Symbol Linking
//!
//! Units are compiled independently. Each exported function or global is
//! described by a [`LinkSymbol`] record written next to the generated
//! classes; later compilations resolve references by looking those records
//! up through a [`ClassResolver`] and verifying that the named member exists
//! and is public and static.

pub mod classpath;
pub mod symbol;

pub use classpath::{
    ClassInfo, ClassPath, ClassResolver, MemberInfo, ACC_FINAL, ACC_PUBLIC, ACC_STATIC,
    CLASS_MODEL_SUFFIX,
};
pub use symbol::{LinkSymbol, SymbolKind, SYMBOL_NAMESPACE};
