use std::fmt;

use crate::dex::error::DexError;

/// A type, superclass or interface could not be found on the class path.
///
/// Most callers recover from this by continuing with partial data and
/// clearing a completeness flag; it is only surfaced when the missing
/// class is strictly needed to answer a question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedClass {
    pub descriptor: String,
}

impl UnresolvedClass {
    pub fn new(descriptor: &str) -> Self {
        UnresolvedClass { descriptor: descriptor.to_string() }
    }
}

impl fmt::Display for UnresolvedClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Could not resolve class {}", self.descriptor)
    }
}

impl std::error::Error for UnresolvedClass {}

/// A value computed on a best-effort basis. `complete` is false when some
/// class needed to compute it could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<T> {
    pub value: T,
    pub complete: bool,
}

impl<T> Resolved<T> {
    pub fn complete(value: T) -> Self {
        Resolved { value, complete: true }
    }

    pub fn partial(value: T) -> Self {
        Resolved { value, complete: false }
    }
}

/// Fatal failure while analyzing one method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisError {
    msg: String,
    code_address: Option<u32>,
    contexts: Vec<String>,
}

impl AnalysisError {
    pub fn new(msg: impl Into<String>) -> Self {
        AnalysisError { msg: msg.into(), code_address: None, contexts: Vec::new() }
    }

    pub fn at(code_address: u32, msg: impl Into<String>) -> Self {
        AnalysisError { msg: msg.into(), code_address: Some(code_address), contexts: Vec::new() }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.contexts.push(context.into());
        self
    }

    /// Keeps the innermost address if one was already recorded.
    pub fn with_address(mut self, code_address: u32) -> Self {
        self.code_address.get_or_insert(code_address);
        self
    }

    pub fn message(&self) -> &str {
        &self.msg
    }

    pub fn code_address(&self) -> Option<u32> {
        self.code_address
    }

    pub fn contexts(&self) -> &[String] {
        &self.contexts
    }
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg)?;
        if let Some(address) = self.code_address {
            write!(f, " (code address {:#x})", address)?;
        }
        for context in &self.contexts {
            write!(f, "\n  {}", context)?;
        }
        Ok(())
    }
}

impl std::error::Error for AnalysisError {}

impl From<DexError> for AnalysisError {
    fn from(e: DexError) -> Self {
        AnalysisError { msg: e.message().to_string(), code_address: None, contexts: e.contexts().to_vec() }
    }
}

impl From<UnresolvedClass> for AnalysisError {
    fn from(e: UnresolvedClass) -> Self {
        AnalysisError::new(e.to_string())
    }
}

macro_rules! analysis_fail {
    ($msg:literal) => {
        return Err($crate::analysis::error::AnalysisError::new($msg))
    };
    ($fmtstr:literal, $($args:tt)*) => {
        return Err($crate::analysis::error::AnalysisError::new(format!($fmtstr, $($args)*)))
    };
}
