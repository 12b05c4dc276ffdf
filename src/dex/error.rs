use std::fmt;

macro_rules! err {
    ($base:ident, $msg:literal) => {
        DexError::with_context($base, $msg)
    };
    ($base:ident, $fmtstr:literal, $($args:tt)*) => {
        DexError::with_context($base, format!($fmtstr, $($args)*))
    };
    (($msg:literal), ($contextfmt:literal, $($contextargs:tt)*)) => {
        DexError::with_context(DexError::new($msg), format!($contextfmt, $($contextargs)*))
    };
    ($msg:literal) => {
        DexError::new($msg)
    };
    ($fmtstr:literal, $($args:tt)*) => {
        DexError::new(format!($fmtstr, $($args)*))
    };
}

#[macro_export]
macro_rules! fail {
    ($msg:literal) => {
        return Err($crate::dex::error::DexError::new($msg).into())
    };
    (($msg:literal), ($context:literal)) => {
        return Err($crate::dex::error::DexError::with_context($crate::dex::error::DexError::new($msg), $context).into())
    };
    ($fmtstr:literal, $($args:tt)*) => {
        return Err($crate::dex::error::DexError::new(format!($fmtstr, $($args)*)).into())
    };
    (($fmtstr:literal, $($args:tt)*), ($contextfmt:literal, $($contextargs:tt)*)) => {
        return Err($crate::dex::error::DexError::with_context(
            $crate::dex::error::DexError::new(format!($fmtstr, $($args)*)),
            format!($contextfmt, $($contextargs)*),
        ).into())
    };
}

/// Error raised while reading code units, quickening tables or while
/// partitioning a class set. Context strings accumulate from the innermost
/// caller outwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DexError
{
    msg: String,
    contexts: Vec<String>,
}

impl DexError
{
    pub fn new(msg: impl Into<String>) -> Self
    {
        DexError {
            msg: msg.into(),
            contexts: Vec::new(),
        }
    }

    pub fn with_context(base: DexError, context: impl Into<String>) -> Self
    {
        let mut contexts = base.contexts;
        contexts.push(context.into());
        DexError { msg: base.msg, contexts }
    }

    pub fn message(&self) -> &str
    {
        &self.msg
    }

    pub fn contexts(&self) -> &[String]
    {
        &self.contexts
    }
}

impl fmt::Display for DexError
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.msg)?;
        let mut connector = " for ";
        for context in &self.contexts
        {
            write!(f, "{}{}", connector, context)?;
            connector = " of ";
        }
        Ok(())
    }
}

impl std::error::Error for DexError {}
