//! The compiler-wide error taxonomy.
//!
//! Every failure the middle-end can report carries a stable [`ErrorCode`]
//! plus a human-readable message. Errors propagate to the top of the
//! compilation unit; no local recovery is attempted, and compiling the
//! same input twice produces byte-identical diagnostics.

use thiserror::Error;

/// Stable error codes surfaced as user diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Unhandled invariant violation
    Internal,

    /// Primitive mismatch
    TypeIncompatiblePrimitive,
    /// Type-variable mismatch under substitution
    TypeIncompatibleTypeVar,
    /// Record UID or substitution mismatch
    TypeIncompatibleRecord,
    /// Enum UID mismatch
    TypeIncompatibleEnum,
    /// Trait conformance failure
    TypeIncompatibleTrait,
    /// Trait bound violated by a substituted type argument
    TypeTraitBound,
    /// Type-arg count != type-param count
    TypeSubstituteCountMismatch,
    /// Record literal key not declared
    TypeRecordKeyNotFound,
    /// Record literal misses declared keys
    TypeRecordNotFulfilled,
    /// Field access on a non-record or unknown field
    TypeRecordAcsIllegal,
    /// Enum variant payload misuse
    TypeEnumEleIllegal,
    /// Destructuring a variant that carries no payload
    TypeEnumDestructIllegal,
    /// Enum type not declared
    TypeEnumUndefined,
    /// Enum variant not declared
    TypeEnumEleUndefined,
    /// Match default arm missing or misplaced
    TypeEnumOtherIllegal,
    /// Trait declaration references an undeclared type variable
    TypeTraitTypeVarUndefined,
    /// Trait access on a non-conforming value
    TypeTraitAcsIllegal,
    /// Call argument count mismatch
    TypeParamCountWrong,
    /// Method receiver invalid
    TypeMethodIllegal,
    /// Duplicate name in scope
    TypeRedeclaration,
}

impl ErrorCode {
    /// Stable textual name of the code, used in diagnostics and tests.
    pub fn name(self) -> &'static str {
        match self {
            ErrorCode::Internal => "INTERNAL_ERROR",
            ErrorCode::TypeIncompatiblePrimitive => "TYPE_INCOMPATIBLE_PRIMITIVE",
            ErrorCode::TypeIncompatibleTypeVar => "TYPE_INCOMPATIBLE_TPVAR",
            ErrorCode::TypeIncompatibleRecord => "TYPE_INCOMPATIBLE_RECORD",
            ErrorCode::TypeIncompatibleEnum => "TYPE_INCOMPATIBLE_ENUM",
            ErrorCode::TypeIncompatibleTrait => "TYPE_INCOMPATIBLE_TRAIT",
            ErrorCode::TypeTraitBound => "TYPE_TRAIT_BOUND",
            ErrorCode::TypeSubstituteCountMismatch => "TYPE_SUBSTITUTE_NUM_MISMATCH",
            ErrorCode::TypeRecordKeyNotFound => "TYPE_RECORD_KEY_NOTFOUND",
            ErrorCode::TypeRecordNotFulfilled => "TYPE_RECORD_NOT_FULFILLED",
            ErrorCode::TypeRecordAcsIllegal => "TYPE_RECORD_ACS_ILLEGAL",
            ErrorCode::TypeEnumEleIllegal => "TYPE_ENUM_ELE_ILLEGAL",
            ErrorCode::TypeEnumDestructIllegal => "TYPE_ENUM_DESTRUCT_ILLEGAL",
            ErrorCode::TypeEnumUndefined => "TYPE_ENUM_UNDEFINED",
            ErrorCode::TypeEnumEleUndefined => "TYPE_ENUM_ELE_UNDEFINED",
            ErrorCode::TypeEnumOtherIllegal => "TYPE_ENUM_OTHER_ILLEGAL",
            ErrorCode::TypeTraitTypeVarUndefined => "TYPE_TRAIT_TYPE_VAR_UNDEFINED",
            ErrorCode::TypeTraitAcsIllegal => "TYPE_TRAIT_ACS_ILLEGAL",
            ErrorCode::TypeParamCountWrong => "TYPE_PARAM_COUNT_WRONG",
            ErrorCode::TypeMethodIllegal => "TYPE_METHOD_ILLEGAL",
            ErrorCode::TypeRedeclaration => "TYPE_REDECLARATION",
        }
    }
}

/// A diagnostic produced while compiling one unit.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{}: {msg}", code.name())]
pub struct CompileError {
    /// Stable code identifying the failure class
    pub code: ErrorCode,
    /// Human-readable message
    pub msg: String,
}

impl CompileError {
    pub fn new(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
        }
    }

    /// Shorthand for invariant violations.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, msg)
    }
}

/// Result type alias used across the compiler.
pub type Result<T> = std::result::Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_code_and_message() {
        let e = CompileError::new(ErrorCode::TypeRedeclaration, "re-declaration of x");
        assert_eq!(e.to_string(), "TYPE_REDECLARATION: re-declaration of x");
    }

    #[test]
    fn diagnostics_are_idempotent() {
        let a = CompileError::new(ErrorCode::TypeIncompatibleEnum, "enum mismatch").to_string();
        let b = CompileError::new(ErrorCode::TypeIncompatibleEnum, "enum mismatch").to_string();
        assert_eq!(a, b);
    }
}
