//! Who the application is.

use serde::{Deserialize, Serialize};

fn id_part(part: &str) -> String {
    part.trim().to_lowercase().replace('.', "-").replace(' ', "_")
}

/// The descriptive identity of an application.
///
/// Used for the help text, the `--version` output and to tag the log records.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub struct Identity {
    /// The program name.
    pub name: String,
    pub version: String,
    /// One-line description shown at the top of the help.
    pub description: String,
    /// Text shown at the bottom of the help.
    pub epilogue: String,
    pub organization: String,
    pub credits: Option<String>,
}

impl Identity {
    /// Creates an identity with the given name and version `0.1.0`.
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self {
            name: name.into(),
            version: "0.1.0".to_owned(),
            ..Self::default()
        }
    }

    /// Identifier of the application (not of a single instance).
    ///
    /// It is `organization.name.version`, each part lowercased and trimmed, with dots turned
    /// into dashes and spaces into underscores.
    ///
    /// ```rust
    /// use ceremony::Identity;
    ///
    /// let identity = Identity {
    ///     organization: "Acme Research".to_owned(),
    ///     version: "0.1.0".to_owned(),
    ///     ..Identity::new("Greeter")
    /// };
    /// assert_eq!("acme_research.greeter.0-1-0", identity.app_id());
    /// ```
    pub fn app_id(&self) -> String {
        format!(
            "{}.{}.{}",
            id_part(&self.organization),
            id_part(&self.name),
            id_part(&self.version)
        )
    }

    /// The name with the version, for humans.
    pub fn full_name(&self) -> String {
        format!("{}, version {}", self.name, self.version)
    }
}
