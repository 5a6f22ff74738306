//! Configuration loading.
//!
//! The configuration of an application is a single INI file, a set of sections with string keys
//! and values:
//!
//! ```ini
//! [DEFAULT]
//! greeting = Hello
//!
//! [server]
//! port = 9020
//! ```
//!
//! The file is read through the [`config`] crate. Section names are kept as written, keys are
//! folded to lowercase (both when loading and when looking them up). The `[DEFAULT]` section
//! (matched regardless of case) is special, its keys are merged into every other section (unless
//! the section sets them itself) and it is not listed as a section of its own.
//!
//! The [`App`][crate::App] loads the store on each run, from the `--config` command line option.
//! It can be used manually too:
//!
//! ```rust
//! use ceremony::cfg_loader::ConfigStore;
//!
//! let store = ConfigStore::parse("[DEFAULT]\nuser = root\n[db]\nport = 5432\n").unwrap();
//! assert_eq!(Some("5432"), store.get("db", "port"));
//! assert_eq!(Some("root"), store.get("db", "user"));
//! assert_eq!(Some("root"), store.get("db", "USER"));
//! assert!(store.section("DEFAULT").is_none());
//! ```

use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};

use config::{Config, File, FileFormat, Value};
use err_context::prelude::*;
use log::{debug, trace};

use crate::error::AnyError;

const DEFAULT_SECTION: &str = "DEFAULT";

/// Returned if configuration path is missing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MissingFile(pub PathBuf);

impl Display for MissingFile {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        write!(fmt, "Configuration file {:?} does not exist", self.0)
    }
}

impl Error for MissingFile {}

/// An error returned whenever the user passes something that is not a file as configuration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InvalidFileType(pub PathBuf);

impl Display for InvalidFileType {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        write!(fmt, "Configuration path {:?} is not a file", self.0)
    }
}

impl Error for InvalidFileType {}

/// The configuration contains a key that doesn't belong to any section.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyOutsideSection(pub String);

impl Display for KeyOutsideSection {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        write!(fmt, "Configuration key {} is not inside any section", self.0)
    }
}

impl Error for KeyOutsideSection {}

type Section = BTreeMap<String, String>;

/// The loaded configuration.
///
/// A read-only mapping of section → key → value. A store created without any source is empty.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ConfigStore {
    path: Option<PathBuf>,
    sections: BTreeMap<String, Section>,
}

impl ConfigStore {
    /// An empty store, not backed by any file.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Loads the configuration file.
    ///
    /// With `None`, an empty store is returned without touching the file system. A path that
    /// doesn't exist, is not a file or can't be parsed is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, AnyError> {
        let path = match path {
            Some(path) => path,
            None => {
                debug!("No configuration file to load");
                return Ok(Self::empty());
            }
        };
        if !path.exists() {
            return Err(MissingFile(path.to_owned()).into());
        }
        if !path.is_file() {
            return Err(InvalidFileType(path.to_owned()).into());
        }
        debug!("Loading configuration file {:?}", path);
        let mut config = Config::new();
        config
            .merge(File::from(path).format(FileFormat::Ini))
            .with_context(|_| format!("Failed to load config file {:?}", path))?;
        let mut store = Self::from_config(config)
            .with_context(|_| format!("Failed to decode config file {:?}", path))?;
        store.path = Some(path.to_owned());
        Ok(store)
    }

    /// Parses the configuration from a string.
    ///
    /// The result is not associated with any path.
    pub fn parse(text: &str) -> Result<Self, AnyError> {
        let mut config = Config::new();
        config
            .merge(File::from_str(text, FileFormat::Ini))
            .context("Failed to parse configuration")?;
        Self::from_config(config)
    }

    fn from_config(config: Config) -> Result<Self, AnyError> {
        let root = config
            .try_into::<HashMap<String, Value>>()
            .context("Failed to decode configuration")?;
        let mut defaults = Section::new();
        let mut sections = BTreeMap::new();
        for (name, content) in root {
            let table = content
                .into_table()
                .map_err(|_| KeyOutsideSection(name.clone()))?;
            let mut section = Section::new();
            for (key, value) in table {
                let value = value
                    .into_str()
                    .with_context(|_| format!("Value of {}.{} is not a string", name, key))?;
                section.insert(key.to_lowercase(), value);
            }
            if name.eq_ignore_ascii_case(DEFAULT_SECTION) {
                defaults = section;
            } else {
                sections.insert(name, section);
            }
        }
        for (name, section) in &mut sections {
            for (key, value) in &defaults {
                trace!("Inheriting {}.{} from defaults", name, key);
                section
                    .entry(key.clone())
                    .or_insert_with(|| value.clone());
            }
        }
        Ok(Self {
            path: None,
            sections,
        })
    }

    /// The file the store was loaded from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The whole configuration, as a nested mapping.
    pub fn as_mapping(&self) -> &BTreeMap<String, BTreeMap<String, String>> {
        &self.sections
    }

    /// Names of all the sections.
    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    /// One section of the configuration.
    pub fn section(&self, name: &str) -> Option<&BTreeMap<String, String>> {
        self.sections.get(name)
    }

    /// A single value.
    ///
    /// The section name must match exactly, the key in any case.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.section(section)
            .and_then(|section| section.get(&key.to_lowercase()))
            .map(String::as_str)
    }

    /// Is there no section at all?
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

impl Display for ConfigStore {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        match &self.path {
            Some(path) => write!(fmt, "ConfigStore(\"{}\")", path.display()),
            None => write!(fmt, "ConfigStore(None)"),
        }
    }
}
