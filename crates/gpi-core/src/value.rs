//! Values exchanged with the upper layer and the native format descriptor
//! cached on signal handles.

use serde::{Deserialize, Serialize};

/// Strength of a value assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SetAction {
    /// Scheduled like a testbench assignment; holds until the next driver
    /// update.
    Deposit,
    /// Overrides all drivers until released.
    Force,
    /// Returns control to the normal drivers.
    Release,
    /// Applied immediately, without scheduling an event.
    NoDelay,
}

impl SetAction {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Deposit),
            1 => Some(Self::Force),
            2 => Some(Self::Release),
            3 => Some(Self::NoDelay),
            _ => None,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Self::Deposit => 0,
            Self::Force => 1,
            Self::Release => 2,
            Self::NoDelay => 3,
        }
    }
}

/// A value written to a signal.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Logic vector as a binary string, MSB first.
    BinStr(String),
    Int(i64),
    Real(f64),
    /// Raw bytes for string-typed objects.
    Str(Vec<u8>),
}

impl Value {
    /// Short label for log messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::BinStr(_) => "binary string",
            Self::Int(_) => "integer",
            Self::Real(_) => "real",
            Self::Str(_) => "string",
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BinStr(s) => write!(f, "{s}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Real(v) => write!(f, "{v}"),
            Self::Str(bytes) => write!(f, "\"{}\"", String::from_utf8_lossy(bytes)),
        }
    }
}

/// Native value encoding of a signal, discovered once when its handle is
/// created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueFormat {
    /// Single multi-valued logic bit.
    Logic,
    /// Vector of multi-valued logic bits.
    LogicVec,
    /// Enumeration literal, read and written by position.
    Enum,
    /// Vector of enumeration literals.
    EnumVec,
    Int,
    Real,
    /// Character string of fixed length.
    Str,
    /// Single character.
    Char,
}

/// Fit `value` into a fixed-length string object of `len` characters:
/// longer input is truncated, shorter input is padded with spaces.
pub fn fit_string(value: &[u8], len: usize) -> Vec<u8> {
    let mut out: Vec<u8> = value.iter().copied().take(len).collect();
    out.resize(len, b' ');
    out
}

/// Native buffer for a string write: [`fit_string`] plus a terminating NUL.
pub fn terminated_string(value: &[u8], len: usize) -> Vec<u8> {
    let mut out = fit_string(value, len);
    out.push(0);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_codes() {
        for action in [
            SetAction::Deposit,
            SetAction::Force,
            SetAction::Release,
            SetAction::NoDelay,
        ] {
            assert_eq!(SetAction::from_code(action.code()), Some(action));
        }
        assert_eq!(SetAction::from_code(9), None);
    }

    #[test]
    fn string_fit() {
        assert_eq!(fit_string(b"hello world", 5), b"hello");
        assert_eq!(fit_string(b"hi", 5), b"hi   ");
        assert_eq!(terminated_string(b"hello world", 5), b"hello\0");
        assert_eq!(terminated_string(b"", 2), b"  \0");
    }

    #[test]
    fn display() {
        assert_eq!(Value::BinStr("01XZ".to_string()).to_string(), "01XZ");
        assert_eq!(Value::Str(b"ab".to_vec()).to_string(), "\"ab\"");
        assert_eq!(Value::Int(3).type_name(), "integer");
    }
}
