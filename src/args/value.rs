use std::ffi::OsStr;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};

use crate::utils::{absolute_from_os_str, NetAddress};

/// How raw command line tokens of an option are turned into [`Value`]s.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ValueType {
    /// Kept as a string.
    Str,
    /// A signed integer.
    Int,
    /// A TCP port number (1 to 65535), stored as an integer.
    Port,
    /// A floating point number.
    Float,
    /// A filesystem path, made absolute (see [`absolute_from_os_str`]).
    Path,
    /// A remote log sink address (see [`NetAddress`]).
    Address,
}

impl Default for ValueType {
    fn default() -> Self {
        ValueType::Str
    }
}

impl ValueType {
    /// Parses one raw token.
    ///
    /// The error is a human readable reason of the failure.
    pub fn parse(self, raw: &OsStr) -> Result<Value, String> {
        if self == ValueType::Path {
            return Ok(Value::Path(absolute_from_os_str(raw)));
        }
        let raw = raw
            .to_str()
            .ok_or_else(|| "Not a valid UTF-8 string".to_owned())?;
        match self {
            ValueType::Str => Ok(Value::Str(raw.to_owned())),
            ValueType::Int => raw.parse().map(Value::Int).map_err(|e| e.to_string()),
            ValueType::Float => raw.parse().map(Value::Float).map_err(|e| e.to_string()),
            ValueType::Port => match raw.parse::<u16>() {
                Ok(port) if port > 0 => Ok(Value::Int(i64::from(port))),
                _ => Err("Not a port number (1-65535)".to_owned()),
            },
            ValueType::Address => raw
                .parse()
                .map(Value::Address)
                .map_err(|e: crate::utils::AddressError| e.to_string()),
            ValueType::Path => unreachable!("Handled above"),
        }
    }

    /// Can a value of this type be a default of an option with this value type?
    pub(crate) fn admits(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::None)
                | (ValueType::Str, Value::Str(_))
                | (ValueType::Int, Value::Int(_))
                | (ValueType::Port, Value::Int(1..=65535))
                | (ValueType::Float, Value::Float(_))
                | (ValueType::Float, Value::Int(_))
                | (ValueType::Path, Value::Path(_))
                | (ValueType::Address, Value::Address(_))
        )
    }
}

/// A single resolved command line value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Nothing was provided and there's no default.
    None,
    /// State of a switch.
    Bool(bool),
    /// An integer, including the number of occurrences of a counted flag.
    Int(i64),
    /// A floating point number.
    Float(f64),
    /// A string.
    Str(String),
    /// An absolute path.
    Path(PathBuf),
    /// A remote log sink address.
    Address(NetAddress),
}

impl Default for Value {
    fn default() -> Self {
        Value::None
    }
}

impl Value {
    /// Is this the [`Value::None`]?
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The floating point value (integers are converted).
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The path (a string is taken as a path too).
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Value::Path(p) => Some(p),
            Value::Str(s) => Some(Path::new(s)),
            _ => None,
        }
    }

    pub fn as_address(&self) -> Option<&NetAddress> {
        match self {
            Value::Address(a) => Some(a),
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        match self {
            Value::None => write!(fmt, "None"),
            Value::Bool(b) => write!(fmt, "{}", b),
            Value::Int(i) => write!(fmt, "{}", i),
            Value::Float(f) => write!(fmt, "{}", f),
            Value::Str(s) => write!(fmt, "{}", s),
            Value::Path(p) => write!(fmt, "{}", p.display()),
            Value::Address(a) => write!(fmt, "{}", a),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<PathBuf> for Value {
    fn from(p: PathBuf) -> Self {
        Value::Path(p)
    }
}

impl From<NetAddress> for Value {
    fn from(a: NetAddress) -> Self {
        Value::Address(a)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_types() {
        assert_eq!(Value::Str("x".to_owned()), ValueType::Str.parse(OsStr::new("x")).unwrap());
        assert_eq!(Value::Int(-3), ValueType::Int.parse(OsStr::new("-3")).unwrap());
        assert_eq!(Value::Int(9020), ValueType::Port.parse(OsStr::new("9020")).unwrap());
        assert_eq!(Value::Float(1.5), ValueType::Float.parse(OsStr::new("1.5")).unwrap());
        assert_eq!(
            Value::Address(NetAddress::new("localhost", 9020)),
            ValueType::Address.parse(OsStr::new("localhost:9020")).unwrap()
        );
        let path = ValueType::Path.parse(OsStr::new("relative.ini")).unwrap();
        assert!(path.as_path().unwrap().is_absolute());
    }

    #[test]
    fn parse_failures() {
        assert!(ValueType::Int.parse(OsStr::new("three")).is_err());
        assert!(ValueType::Float.parse(OsStr::new("")).is_err());
        for bad in &["0", "70000", "-1", "http"] {
            assert!(ValueType::Port.parse(OsStr::new(bad)).is_err(), "{}", bad);
        }
        let reason = ValueType::Address.parse(OsStr::new("localhost")).unwrap_err();
        assert!(reason.contains("\"localhost\""));
    }

    #[test]
    fn admitted_defaults() {
        assert!(ValueType::Str.admits(&Value::None));
        assert!(ValueType::Str.admits(&"x".into()));
        assert!(ValueType::Float.admits(&Value::Int(1)));
        assert!(ValueType::Port.admits(&Value::Int(9020)));
        assert!(!ValueType::Port.admits(&Value::Int(0)));
        assert!(!ValueType::Int.admits(&"1".into()));
        assert!(!ValueType::Path.admits(&Value::Bool(true)));
    }
}
