//! Command line options.
//!
//! The options of an application are declared at runtime, into a [`Registry`]. Each invocation
//! is then resolved against it by [`resolve`], producing [`Args`].
//!
//! The resolved arguments are normalized: the value of every option is a sequence, even for
//! options that logically hold a single value. A repeatable option keeps every occurrence, so the
//! usual way to read a value is to take the last one (which is what the typed accessors like
//! [`Args::str`] do).
//!
//! ```rust
//! use ceremony::args::{self, Registry, Resolution, ValueType};
//! use ceremony::Identity;
//!
//! let mut registry = Registry::new();
//! registry.add_option("username", Some('u'), Some("John Doe".into()), "", ValueType::Str).unwrap();
//! registry.add_counted_option("awesomeness level", Some('a'), 0, "").unwrap();
//!
//! let identity = Identity::new("greeter");
//! match args::resolve(&registry, &identity, vec!["-u", "Ann", "-aaa"]).unwrap() {
//!     Resolution::Args(resolved) => {
//!         assert_eq!(Some("Ann"), resolved.args.str("username"));
//!         assert_eq!(Some(3), resolved.args.int("awesomeness_level"));
//!     }
//!     _ => unreachable!(),
//! }
//! ```

use std::collections::btree_map::{BTreeMap, Iter};
use std::iter::FromIterator;
use std::path::Path;

use crate::utils::NetAddress;

mod registry;
mod resolver;
mod value;

pub use self::registry::{
    long_flag, safe_name, Arity, Kind, OptionDescriptor, Registry, RegistryError,
};
pub use self::resolver::{expand_arg_files, resolve, ParseError, Resolution, Resolved};
pub use self::value::{Value, ValueType};

/// The resolved command line arguments.
///
/// Maps canonical option names to their values. Every declared option is present, with at least
/// one value (which may be [`Value::None`]).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Args(BTreeMap<String, Vec<Value>>);

impl Args {
    /// All the values of an option, `None` if no such option exists.
    pub fn get(&self, name: &str) -> Option<&[Value]> {
        self.0.get(name).map(Vec::as_slice)
    }

    /// All the values of an option, empty if no such option exists.
    pub fn all(&self, name: &str) -> &[Value] {
        self.get(name).unwrap_or_default()
    }

    /// The last (effective) value of an option.
    pub fn last(&self, name: &str) -> Option<&Value> {
        self.all(name).last()
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.last(name).and_then(Value::as_str)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.last(name).and_then(Value::as_int)
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        self.last(name).and_then(Value::as_float)
    }

    /// The state of a switch, `false` for unknown names.
    pub fn flag(&self, name: &str) -> bool {
        self.last(name).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn path(&self, name: &str) -> Option<&Path> {
        self.last(name).and_then(Value::as_path)
    }

    pub fn address(&self, name: &str) -> Option<&NetAddress> {
        self.last(name).and_then(Value::as_address)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Iterates through the options and their values, ordered by the name.
    pub fn iter(&self) -> Iter<'_, String, Vec<Value>> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, Vec<Value>>> for Args {
    fn from(map: BTreeMap<String, Vec<Value>>) -> Self {
        Args(map)
    }
}

impl FromIterator<(String, Vec<Value>)> for Args {
    fn from_iter<I: IntoIterator<Item = (String, Vec<Value>)>>(iter: I) -> Self {
        Args(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Args {
    type Item = (&'a String, &'a Vec<Value>);
    type IntoIter = Iter<'a, String, Vec<Value>>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
