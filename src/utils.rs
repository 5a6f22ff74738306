//! Various utilities.
//!
//! All the little things that are useful through the crate's or user's code, and don't really fit
//! anywhere else.

use std::env;
use std::error::Error;
use std::ffi::OsStr;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::PathBuf;
use std::str::FromStr;

use log::warn;
use serde::{Deserialize, Serialize};
use url::{Host, Url};

/// The port used when only a host is known for a remote log sink.
///
/// This is the traditional TCP logging port.
pub const DEFAULT_TCP_LOGGING_PORT: u16 = 9020;

// Placeholder for addresses given without a scheme.
const RELATIVE_SCHEME: &str = "tcp";

/// Tries to read an absolute path from the given OS string.
///
/// This converts the path to PathBuf. Then it tries to make it absolute and canonical, so changing
/// current directory later on doesn't make it invalid.
///
/// The function never fails. However, the substeps (finding current directory to make it absolute
/// and canonization) might fail. In such case, the failing step is skipped.
///
/// This is what the [`Path`][crate::args::ValueType::Path] value type uses for command line
/// values. Users are used to passing relative paths on the command line, while the application
/// may change its current directory before the path is used.
///
/// # Examples
///
/// ```rust
/// use std::ffi::OsString;
///
/// let path = ceremony::utils::absolute_from_os_str(&OsString::from("app.ini"));
/// assert!(path.is_absolute());
/// ```
pub fn absolute_from_os_str(path: &OsStr) -> PathBuf {
    let mut current = env::current_dir().unwrap_or_else(|e| {
        warn!(
            "Some paths may not be turned to absolute. Couldn't read current dir: {}",
            e,
        );
        PathBuf::new()
    });
    current.push(path);
    if let Ok(canonicized) = current.canonicalize() {
        canonicized
    } else {
        current
    }
}

/// An error returned when a remote log sink address can't be understood.
///
/// It carries the original string, so the user can see what was wrong.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AddressError(pub String);

impl Display for AddressError {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        write!(
            fmt,
            "Cannot determine hostname/port for given netlogger string: \"{}\"",
            self.0
        )
    }
}

impl Error for AddressError {}

/// A `host:port` pair of a remote log sink.
///
/// The string is parsed as an URL, and if that doesn't yield a host and port, once more as a
/// scheme-relative one (prefixed with `//`). So `host:port`, `//host:port` and
/// `scheme://user@host:port/path` all work (only the host and port are kept), as do IPv6 hosts in
/// brackets (`[::1]:9020`). Both the host and an explicit non-zero port must be present.
///
/// # Examples
///
/// ```rust
/// use ceremony::utils::NetAddress;
///
/// let addr: NetAddress = "localhost:9020".parse().unwrap();
/// assert_eq!("localhost", addr.host);
/// assert_eq!(9020, addr.port);
///
/// assert!("localhost".parse::<NetAddress>().is_err());
/// assert!("9020".parse::<NetAddress>().is_err());
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub struct NetAddress {
    /// The host name or IP address (without the IPv6 brackets).
    pub host: String,
    /// The TCP port.
    pub port: u16,
}

impl NetAddress {
    /// Creates the address from already separated parts.
    pub fn new<H: Into<String>>(host: H, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    fn from_url(url: &Url) -> Option<Self> {
        let host = match url.host()? {
            Host::Domain(domain) => domain.to_owned(),
            Host::Ipv4(ip) => ip.to_string(),
            Host::Ipv6(ip) => ip.to_string(),
        };
        let port = url.port().filter(|port| *port != 0)?;
        if host.is_empty() {
            None
        } else {
            Some(Self::new(host, port))
        }
    }
}

impl FromStr for NetAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, AddressError> {
        let trimmed = s.trim();
        // A bare `host:port` parses as a scheme with a path, so it gets another chance as a
        // scheme-relative URL.
        let parsed = Url::parse(trimmed)
            .ok()
            .and_then(|url| Self::from_url(&url))
            .or_else(|| {
                let relative = if trimmed.starts_with("//") {
                    trimmed.to_owned()
                } else {
                    format!("//{}", trimmed)
                };
                let url = Url::parse(&format!("{}:{}", RELATIVE_SCHEME, relative)).ok()?;
                Self::from_url(&url)
            });
        parsed.ok_or_else(|| AddressError(s.to_owned()))
    }
}

impl Display for NetAddress {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        if self.host.contains(':') {
            write!(fmt, "[{}]:{}", self.host, self.port)
        } else {
            write!(fmt, "{}:{}", self.host, self.port)
        }
    }
}
