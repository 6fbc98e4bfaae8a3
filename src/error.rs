//! Error types for the gcc-bridge compiler and pointer runtime

use thiserror::Error;

/// Link-time failures, one variant per unmet condition.
///
/// Every variant names the symbol being resolved so that a failed link can be
/// traced back to the unit that referenced it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// The container (class) named by the symbol record could not be resolved
    #[error("Symbol '{symbol}' references missing class {class}")]
    MissingContainer {
        /// Symbol being linked
        symbol: String,
        /// Internal name of the missing class
        class: String,
    },

    /// The container exists but has no member with the recorded name and signature
    #[error("Symbol '{symbol}' references non-existent member {class}.{member} {descriptor}")]
    MissingMember {
        /// Symbol being linked
        symbol: String,
        /// Internal name of the container
        class: String,
        /// Member name
        member: String,
        /// Expected descriptor (empty for fields)
        descriptor: String,
    },

    /// The member exists but is not public
    #[error("Symbol '{symbol}' references non-public {member}")]
    NotPublic {
        /// Symbol being linked
        symbol: String,
        /// Description of the offending member
        member: String,
    },

    /// The member exists but is not static
    #[error("Symbol '{symbol}' references non-static {member}")]
    NotStatic {
        /// Symbol being linked
        symbol: String,
        /// Description of the offending member
        member: String,
    },

    /// The symbol record is of a different kind than the one requested
    #[error("Invalid link: tried to link '{symbol}' as {expected}, found symbol of type {found}")]
    WrongKind {
        /// Symbol being linked
        symbol: String,
        /// Kind requested by the caller
        expected: String,
        /// Kind found in the record
        found: String,
    },
}

/// gcc-bridge errors
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Malformed IR or an impossible compiler state
    #[error("Internal compiler error: {0}")]
    InternalCompiler(String),

    /// A variable reference that does not resolve to any declaration
    ///
    /// **Triggered by:** IR whose statements reference an id that is neither a
    /// local, a parameter, nor a global of the owning unit.
    #[error("Function '{function}' references unknown variable id {id}")]
    UnknownVariable {
        /// Function containing the reference
        function: String,
        /// The unresolved variable id
        id: i64,
    },

    /// A type reached a strategy that cannot represent it
    #[error("Unsupported type for {context}: {ty}")]
    UnsupportedType {
        /// Operation that was requested (malloc, field, parameter, ...)
        context: String,
        /// Rendering of the offending type
        ty: String,
    },

    /// A construct that is explicitly not handled
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// A call or global with no local or linked definition
    #[error("Unresolved symbol: {0}")]
    UnresolvedSymbol(String),

    /// Link-time failure
    #[error(transparent)]
    Link(#[from] LinkError),

    /// A symbol metadata record that cannot be parsed
    #[error("Malformed symbol record '{name}': {reason}")]
    MalformedSymbol {
        /// Symbol name
        name: String,
        /// What was wrong with the record
        reason: String,
    },

    /// A non-null pointer stored into a region allocated for primitives
    #[error(
        "Unsupported pointer store to a memory region allocated for primitives; \
         storage of the wrong shape was selected during compilation"
    )]
    PrimitiveRegionPointerStore,

    /// Filesystem failure while reading input or writing output
    #[error("I/O error on {path}: {message}")]
    Io {
        /// Path that was being accessed
        path: String,
        /// Underlying error description
        message: String,
    },

    /// Malformed JSON input or output
    #[error("JSON error: {0}")]
    Json(String),
}

/// Error severity classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Aborts the run; emitted code would be incorrect
    Fatal,
    /// The caller may retry or report and continue
    Recoverable,
}

impl Error {
    /// Create an internal compiler error with a message
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::InternalCompiler(msg.into())
    }

    /// Create an unsupported-type error for the given operation
    pub fn unsupported_type(context: impl Into<String>, ty: impl std::fmt::Display) -> Self {
        Error::UnsupportedType {
            context: context.into(),
            ty: ty.to_string(),
        }
    }

    /// Create a not-supported error naming the construct
    pub fn not_supported(what: impl Into<String>) -> Self {
        Error::NotSupported(what.into())
    }

    /// Wrap an I/O error together with the path being accessed
    pub fn io(path: &std::path::Path, err: std::io::Error) -> Self {
        Error::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }

    /// Classify error severity.
    ///
    /// Recoverable errors are confined to the function that raised them; a
    /// compilation that ignores errors replaces that function with a stub.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Error::NotSupported(_)
            | Error::UnsupportedType { .. }
            | Error::UnresolvedSymbol(_)
            | Error::Io { .. } => ErrorSeverity::Recoverable,
            _ => ErrorSeverity::Fatal,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err.to_string())
    }
}

/// Result type for gcc-bridge operations
pub type Result<T> = std::result::Result<T, Error>;
