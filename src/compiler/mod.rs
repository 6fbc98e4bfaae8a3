//! # GIMPLE Compiler - GIMPLE to managed class models
//!
//! This module compiles GIMPLE compilation units, as emitted by the GCC
//! front end, to class models for a garbage-collected runtime with no raw
//! memory.
//!
//! ## Architecture
//!
//! ```text
//! JSON → GIMPLE units → Rewrite passes → Strategies → Class models + symbols
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use gcc_bridge::compiler::{Compiler, CompileOptions};
//!
//! let options = CompileOptions {
//!     output_dir: Some("target/classes".into()),
//!     ..Default::default()
//! };
//! let result = Compiler::new(options).compile_files(&["vec.c.gimple.json"])?;
//! for class in &result.classes {
//!     println!("{}", class.name);
//! }
//! ```

pub mod codegen;
pub mod ir;
pub mod pmf;
pub mod rewriter;

pub use codegen::{ClassFile, FatPtrParamLayout, UnitGenerator, UnitOutput};
pub use ir::{CompilationUnit, GimpleParser};
pub use pmf::PmfStats;
pub use rewriter::PassRunner;

use crate::link::{ClassPath, LinkSymbol, CLASS_MODEL_SUFFIX};
use crate::{Error, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Compilation options
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Internal package of the generated classes
    pub package_name: String,
    /// Class name for a single unit; derived from the unit name otherwise
    pub class_name: Option<String>,
    /// Where class models and symbol records are written, if anywhere
    pub output_dir: Option<PathBuf>,
    /// Replace functions that fail to compile with throwing stubs
    pub ignore_errors: bool,
    /// Run the member-function-pointer rewrite
    pub rewrite_pmf: bool,
    /// How pointers to primitives are passed as parameters
    pub fat_ptr_params: FatPtrParamLayout,
    /// Log every generated method
    pub verbose: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            package_name: "org/gccbridge/generated".to_string(),
            class_name: None,
            output_dir: None,
            ignore_errors: false,
            rewrite_pmf: true,
            fat_ptr_params: FatPtrParamLayout::Wrapped,
            verbose: false,
        }
    }
}

/// Counts for one compilation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileStats {
    pub units: usize,
    pub functions: usize,
    /// Functions replaced by stubs under `ignore_errors`
    pub stubs: usize,
    pub pmf: PmfStats,
}

/// Compilation result with metadata
#[derive(Debug)]
pub struct CompileResult {
    /// One class per unit, in input order
    pub classes: Vec<ClassFile>,
    /// Symbols exported by the batch
    pub symbols: Vec<LinkSymbol>,
    /// Warnings generated during compilation
    pub warnings: Vec<String>,
    pub stats: CompileStats,
}

impl CompileResult {
    /// Finds a class by internal or simple name
    pub fn class(&self, name: &str) -> Option<&ClassFile> {
        self.classes
            .iter()
            .find(|c| c.name == name || c.name.rsplit('/').next() == Some(name))
    }
}

/// GIMPLE to class model compiler
pub struct Compiler {
    options: CompileOptions,
    classpath: ClassPath,
}

impl Compiler {
    /// Create a new compiler with options. The C math library is linkable
    /// by default.
    pub fn new(options: CompileOptions) -> Self {
        Self {
            options,
            classpath: ClassPath::new().with_math_library(),
        }
    }

    /// Link against `classpath` instead of the default one
    pub fn with_classpath(mut self, classpath: ClassPath) -> Self {
        self.classpath = classpath;
        self
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Parse and compile GIMPLE JSON files as one batch
    pub fn compile_files<P: AsRef<Path>>(&self, paths: &[P]) -> Result<CompileResult> {
        let mut parser = GimpleParser::new();
        let units = paths
            .iter()
            .map(|p| parser.parse_file(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        self.compile(units)
    }

    /// Compile a batch of units. Units may refer to each other's exports.
    pub fn compile(&self, mut units: Vec<CompilationUnit>) -> Result<CompileResult> {
        // Phase 1: Rewrite passes
        let pmf = PassRunner::new(self.options.rewrite_pmf).run(&mut units)?;

        // Phase 2: Class names
        let names = self.class_names(&units)?;
        let generators: Vec<UnitGenerator> = units
            .iter()
            .zip(names)
            .map(|(unit, name)| UnitGenerator::new(unit, name, self.options.fat_ptr_params))
            .collect();

        // Phase 3: Publish exports so units of the batch link to each other.
        // In-memory entries shadow anything stale in the output directories.
        let mut classpath = self.classpath.clone();
        for generator in &generators {
            let (info, symbols) = generator.exports()?;
            classpath.add_class(info);
            for symbol in &symbols {
                classpath.add_symbol(symbol);
            }
        }

        // Phase 4: Generate
        let mut result = CompileResult {
            classes: Vec::new(),
            symbols: Vec::new(),
            warnings: Vec::new(),
            stats: CompileStats {
                units: units.len(),
                functions: units.iter().map(|u| u.functions.len()).sum(),
                stubs: 0,
                pmf,
            },
        };
        for generator in &generators {
            let output = generator.generate(&classpath, self.options.ignore_errors)?;
            if self.options.verbose {
                for method in &output.class.methods {
                    tracing::info!(
                        "{}.{}{}: {} instructions",
                        output.class.name,
                        method.name,
                        method.descriptor,
                        method.insns.len()
                    );
                }
            }
            result.stats.stubs += output.warnings.len();
            result.warnings.extend(output.warnings);
            result.symbols.extend(output.symbols);
            result.classes.push(output.class);
        }

        // Phase 5: Emit
        if let Some(dir) = &self.options.output_dir {
            self.write_output(dir, &result)?;
        }

        tracing::info!(
            "Compiled {} units ({} functions, {} stubs)",
            result.stats.units,
            result.stats.functions,
            result.stats.stubs
        );
        Ok(result)
    }

    fn class_names(&self, units: &[CompilationUnit]) -> Result<Vec<String>> {
        let package = self.options.package_name.trim_end_matches('/');
        let qualify = |simple: String| {
            if package.is_empty() {
                simple
            } else {
                format!("{}/{}", package, simple)
            }
        };
        let names: Vec<String> = match (&self.options.class_name, units) {
            (Some(name), [_]) => vec![qualify(name.clone())],
            _ => units.iter().map(|u| qualify(u.class_name())).collect(),
        };
        let mut seen = HashSet::new();
        for name in &names {
            if !seen.insert(name) {
                return Err(Error::internal(format!(
                    "Two units would both be compiled to class {}",
                    name
                )));
            }
        }
        Ok(names)
    }

    fn write_output(&self, dir: &Path, result: &CompileResult) -> Result<()> {
        for class in &result.classes {
            let path = dir.join(format!("{}{}", class.name, CLASS_MODEL_SUFFIX));
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
            }
            let json = serde_json::to_string_pretty(class)?;
            std::fs::write(&path, json).map_err(|e| Error::io(&path, e))?;
        }
        for symbol in &result.symbols {
            symbol.write(dir)?;
        }
        tracing::debug!(
            "Wrote {} classes and {} symbols to {}",
            result.classes.len(),
            result.symbols.len(),
            dir.display()
        );
        Ok(())
    }
}
