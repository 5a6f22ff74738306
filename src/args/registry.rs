use std::error::Error;
use std::ffi::OsStr;
use std::fmt::{Display, Formatter, Result as FmtResult};

use log::trace;

use super::value::{Value, ValueType};

const RESERVED: &[&str] = &["help", "version"];
const RESERVED_SHORT: char = 'h';

/// Turns a human name of an option into a token usable as a name.
///
/// Runs of whitespace are replaced by a single underscore, leading and trailing whitespace is
/// dropped.
///
/// ```rust
/// assert_eq!("awesomeness_level", ceremony::args::safe_name(" awesomeness  level"));
/// ```
pub fn safe_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join("_")
}

/// The long command line flag (without the dashes) for an option of the given safe name.
pub fn long_flag(safe_name: &str) -> String {
    safe_name.to_lowercase().replace('_', "-")
}

/// An error when declaring an option.
///
/// These are programming errors of the application, not something the end user can cause.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum RegistryError {
    /// The name is empty (or whitespace only).
    EmptyName,
    /// An option with the same canonical name already exists.
    DuplicateName(String),
    /// The short flag is already taken.
    DuplicateShort(char),
    /// The long flag is already taken.
    DuplicateLong(String),
    /// The flag or name is reserved for the built-in behaviour.
    Reserved(String),
    /// A restricted option or argument without any allowed value.
    NoChoices(String),
    /// The default of a restricted option is not one of the choices.
    DefaultNotAChoice {
        /// Canonical name of the option.
        option: String,
        /// The rejected default.
        default: String,
    },
    /// The default doesn't fit the kind or value type of the option.
    InvalidDefault {
        /// Canonical name of the option.
        option: String,
        /// What's wrong with it.
        reason: String,
    },
    /// A positional argument taking exactly 0 values.
    InvalidArity(String),
    /// The positional argument would make the command line ambiguous.
    ///
    /// Only the last positional argument may take a variable number of values and no required
    /// positional argument may come after an optional one.
    PositionalOrder(String),
    /// The kind of the option doesn't support some of the requested properties.
    Unsupported {
        /// Canonical name of the option.
        option: String,
        /// The unsupported property.
        what: &'static str,
    },
}

impl Display for RegistryError {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        match self {
            RegistryError::EmptyName => write!(fmt, "Option name must not be empty"),
            RegistryError::DuplicateName(name) => write!(fmt, "Option {} declared twice", name),
            RegistryError::DuplicateShort(short) => write!(fmt, "Flag -{} already used", short),
            RegistryError::DuplicateLong(long) => write!(fmt, "Flag --{} already used", long),
            RegistryError::Reserved(flag) => write!(fmt, "{} is reserved", flag),
            RegistryError::NoChoices(name) => write!(fmt, "No choices given for {}", name),
            RegistryError::DefaultNotAChoice { option, default } => write!(
                fmt,
                "Default {} of {} is not one of the choices",
                default, option
            ),
            RegistryError::InvalidDefault { option, reason } => {
                write!(fmt, "Invalid default of {}: {}", option, reason)
            }
            RegistryError::InvalidArity(name) => write!(fmt, "{} must take some values", name),
            RegistryError::PositionalOrder(name) => write!(
                fmt,
                "Positional argument {} can't be told apart from the previous one",
                name
            ),
            RegistryError::Unsupported { option, what } => {
                write!(fmt, "Option {} can't have {}", option, what)
            }
        }
    }
}

impl Error for RegistryError {}

/// The kind of an option, deciding how it appears on the command line.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Kind {
    /// A positional argument.
    Positional,
    /// A positional argument with a fixed set of allowed values.
    RestrictedPositional,
    /// A named option that can be given multiple times, each occurrence adding a value.
    Repeatable,
    /// A repeatable named option with a fixed set of allowed values.
    RestrictedOption,
    /// A flag whose value is the number of its occurrences (`-vvv`).
    Counted,
    /// A flag flipping its default when present.
    Switch,
}

impl Kind {
    /// Is it a positional argument (without flags)?
    pub fn is_positional(self) -> bool {
        matches!(self, Kind::Positional | Kind::RestrictedPositional)
    }

    /// Is it restricted to a set of choices?
    pub fn is_restricted(self) -> bool {
        matches!(self, Kind::RestrictedPositional | Kind::RestrictedOption)
    }

    /// Does it take values on the command line (as opposed to being a flag)?
    pub fn takes_value(self) -> bool {
        !matches!(self, Kind::Counted | Kind::Switch)
    }
}

/// How many values a positional argument takes.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Arity {
    /// Exactly one, required.
    One,
    /// Exactly this many, required.
    Exactly(usize),
    /// At least one.
    OneOrMore,
    /// Any number, including none.
    ZeroOrMore,
    /// One or none.
    Optional,
}

impl Default for Arity {
    fn default() -> Self {
        Arity::One
    }
}

impl Arity {
    /// Must the argument be present?
    pub fn is_required(self) -> bool {
        matches!(self, Arity::One | Arity::Exactly(_) | Arity::OneOrMore)
    }

    /// Can the argument take more than one value?
    pub fn is_multiple(self) -> bool {
        match self {
            Arity::Exactly(n) => n > 1,
            Arity::OneOrMore | Arity::ZeroOrMore => true,
            Arity::One | Arity::Optional => false,
        }
    }
}

/// Description of a single option.
///
/// Usually created through the convenience methods of [`Registry`], but it can be put together
/// manually and passed to [`Registry::declare`] to get to all the knobs.
///
/// # Examples
///
/// ```rust
/// use ceremony::args::{Kind, OptionDescriptor, Registry};
///
/// let mut registry = Registry::new();
/// registry
///     .declare(
///         OptionDescriptor::new("verbose", Kind::Counted)
///             .dest("verbosity")
///             .short('v')
///             .help("More output"),
///     )
///     .unwrap();
/// let verbose = registry.get("verbosity").unwrap();
/// assert_eq!("verbose", verbose.long());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct OptionDescriptor {
    name: String,
    dest: Option<String>,
    long: String,
    metavar: String,
    short: Option<char>,
    kind: Kind,
    default: Value,
    choices: Vec<String>,
    help: String,
    value_type: ValueType,
    arity: Arity,
}

impl OptionDescriptor {
    /// Creates a descriptor with the given name and kind.
    ///
    /// The rest is set to the plain defaults: no short flag, no default value, string values and
    /// a single value for positional arguments.
    pub fn new<N: Into<String>>(name: N, kind: Kind) -> Self {
        Self {
            name: name.into(),
            dest: None,
            long: String::new(),
            metavar: String::new(),
            short: None,
            kind,
            default: Value::None,
            choices: Vec::new(),
            help: String::new(),
            value_type: ValueType::Str,
            arity: Arity::One,
        }
    }

    /// Overrides the canonical name the values are stored under.
    pub fn dest<D: Into<String>>(self, dest: D) -> Self {
        Self {
            dest: Some(dest.into()),
            ..self
        }
    }

    pub fn short(self, short: char) -> Self {
        Self {
            short: Some(short),
            ..self
        }
    }

    pub fn default_value<V: Into<Value>>(self, default: V) -> Self {
        Self {
            default: default.into(),
            ..self
        }
    }

    pub fn choices<I, C>(self, choices: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        Self {
            choices: choices.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    pub fn help<H: Into<String>>(self, help: H) -> Self {
        Self {
            help: help.into(),
            ..self
        }
    }

    pub fn value_type(self, value_type: ValueType) -> Self {
        Self { value_type, ..self }
    }

    pub fn arity(self, arity: Arity) -> Self {
        Self { arity, ..self }
    }

    /// The (safe) name of the option.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The canonical name, under which the values are stored.
    pub fn canonical(&self) -> &str {
        self.dest.as_deref().unwrap_or(&self.name)
    }

    /// The long flag, without the leading dashes.
    ///
    /// Derived even for positional arguments, which don't use it.
    pub fn long(&self) -> &str {
        &self.long
    }

    /// The placeholder of the value in the help text.
    pub fn metavar(&self) -> &str {
        &self.metavar
    }

    pub fn short_flag(&self) -> Option<char> {
        self.short
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// The default value.
    ///
    /// Once declared, counted options and switches always have an integer or boolean default
    /// and a restricted option without an explicit default has its first choice.
    pub fn default(&self) -> &Value {
        &self.default
    }

    pub fn allowed(&self) -> &[String] {
        &self.choices
    }

    pub fn help_text(&self) -> &str {
        &self.help
    }

    pub fn parser(&self) -> ValueType {
        self.value_type
    }

    pub fn values(&self) -> Arity {
        self.arity
    }

    fn unsupported(&self, what: &'static str) -> RegistryError {
        RegistryError::Unsupported {
            option: self.canonical().to_owned(),
            what,
        }
    }

    fn invalid_default<R: Into<String>>(&self, reason: R) -> RegistryError {
        RegistryError::InvalidDefault {
            option: self.canonical().to_owned(),
            reason: reason.into(),
        }
    }

    // Validates the descriptor on its own and fills in the derived parts.
    fn normalize(mut self) -> Result<Self, RegistryError> {
        self.name = safe_name(&self.name);
        if self.name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if let Some(dest) = self.dest.take() {
            let dest = safe_name(&dest);
            if dest.is_empty() {
                return Err(RegistryError::EmptyName);
            }
            self.dest = Some(dest);
        }
        self.long = long_flag(&self.name);
        self.metavar = self.canonical().to_uppercase();

        if self.arity == Arity::Exactly(0) {
            return Err(RegistryError::InvalidArity(self.canonical().to_owned()));
        }
        if self.kind.is_positional() {
            if self.short.is_some() {
                return Err(self.unsupported("a short flag"));
            }
            if !self.default.is_none() {
                return Err(self.unsupported("a default"));
            }
        } else if self.arity != Arity::One {
            return Err(self.unsupported("more values per occurrence"));
        }
        if let Some(short) = self.short {
            if !short.is_ascii_alphanumeric() {
                return Err(self.unsupported("a non-alphanumeric short flag"));
            }
        }
        if self.kind.is_restricted() {
            if self.choices.is_empty() {
                return Err(RegistryError::NoChoices(self.canonical().to_owned()));
            }
            for choice in &self.choices {
                self.value_type
                    .parse(OsStr::new(choice))
                    .map_err(|reason| self.invalid_default(format!("choice {}: {}", choice, reason)))?;
            }
        } else if !self.choices.is_empty() {
            return Err(self.unsupported("choices"));
        }

        match self.kind {
            Kind::Counted => match self.default {
                Value::None => self.default = Value::Int(0),
                Value::Int(_) => (),
                _ => return Err(self.invalid_default("counted options start at an integer")),
            },
            Kind::Switch => match self.default {
                Value::None => self.default = Value::Bool(false),
                Value::Bool(_) => (),
                _ => return Err(self.invalid_default("switches default to a boolean")),
            },
            Kind::RestrictedOption if self.default.is_none() => {
                self.default = self
                    .value_type
                    .parse(OsStr::new(&self.choices[0]))
                    .map_err(|reason| self.invalid_default(reason))?;
            }
            _ => (),
        }
        if self.kind.takes_value() && !self.value_type.admits(&self.default) {
            return Err(self.invalid_default(format!("{:?} value expected", self.value_type)));
        }
        if self.kind == Kind::RestrictedOption {
            let default = self.default.to_string();
            if !self.choices.contains(&default) {
                return Err(RegistryError::DefaultNotAChoice {
                    option: self.canonical().to_owned(),
                    default,
                });
            }
        }
        Ok(self)
    }
}

/// The set of options an application accepts.
///
/// The options are accumulated during the construction of the application. Each one is validated
/// right away, so programming errors (like two options with the same flag) are caught early.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    descriptors: Vec<OptionDescriptor>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a required positional argument.
    pub fn add_argument(
        &mut self,
        name: &str,
        help: &str,
        value_type: ValueType,
        arity: Arity,
    ) -> Result<(), RegistryError> {
        self.declare(
            OptionDescriptor::new(name, Kind::Positional)
                .help(help)
                .value_type(value_type)
                .arity(arity),
        )
    }

    /// Declares a positional argument with a fixed set of allowed values.
    pub fn add_restricted_argument(
        &mut self,
        name: &str,
        choices: &[&str],
        help: &str,
        value_type: ValueType,
    ) -> Result<(), RegistryError> {
        self.declare(
            OptionDescriptor::new(name, Kind::RestrictedPositional)
                .choices(choices.iter().copied())
                .help(help)
                .value_type(value_type),
        )
    }

    /// Declares a repeatable named option.
    ///
    /// Each occurrence on the command line adds one value. If the option is not present at all,
    /// the default (or [`Value::None`]) is the only value.
    pub fn add_option(
        &mut self,
        name: &str,
        short: Option<char>,
        default: Option<Value>,
        help: &str,
        value_type: ValueType,
    ) -> Result<(), RegistryError> {
        let mut descriptor = OptionDescriptor::new(name, Kind::Repeatable)
            .default_value(default)
            .help(help)
            .value_type(value_type);
        descriptor.short = short;
        self.declare(descriptor)
    }

    /// Declares a repeatable named option with a fixed set of allowed values.
    ///
    /// Without an explicit default, the first choice is the default.
    pub fn add_restricted_option(
        &mut self,
        name: &str,
        choices: &[&str],
        short: Option<char>,
        default: Option<Value>,
        help: &str,
        value_type: ValueType,
    ) -> Result<(), RegistryError> {
        let mut descriptor = OptionDescriptor::new(name, Kind::RestrictedOption)
            .choices(choices.iter().copied())
            .default_value(default)
            .help(help)
            .value_type(value_type);
        descriptor.short = short;
        self.declare(descriptor)
    }

    /// Declares a flag counting its occurrences, starting at `default`.
    pub fn add_counted_option(
        &mut self,
        name: &str,
        short: Option<char>,
        default: i64,
        help: &str,
    ) -> Result<(), RegistryError> {
        let mut descriptor = OptionDescriptor::new(name, Kind::Counted)
            .default_value(default)
            .help(help);
        descriptor.short = short;
        self.declare(descriptor)
    }

    /// Declares a flag that negates the `default` when present.
    pub fn add_switch(
        &mut self,
        name: &str,
        short: Option<char>,
        default: bool,
        help: &str,
    ) -> Result<(), RegistryError> {
        let mut descriptor = OptionDescriptor::new(name, Kind::Switch)
            .default_value(default)
            .help(help);
        descriptor.short = short;
        self.declare(descriptor)
    }

    /// Declares a generic option.
    pub fn declare(&mut self, descriptor: OptionDescriptor) -> Result<(), RegistryError> {
        let descriptor = descriptor.normalize()?;
        self.check_conflicts(&descriptor)?;
        if descriptor.kind.is_positional() {
            self.check_order(&descriptor)?;
        }
        trace!("Declared option {:?}", descriptor);
        self.descriptors.push(descriptor);
        Ok(())
    }

    fn check_conflicts(&self, new: &OptionDescriptor) -> Result<(), RegistryError> {
        let named = !new.kind.is_positional();
        if RESERVED.contains(&new.canonical()) {
            return Err(RegistryError::Reserved(new.canonical().to_owned()));
        }
        if named && RESERVED.contains(&new.long()) {
            return Err(RegistryError::Reserved(format!("--{}", new.long())));
        }
        if new.short == Some(RESERVED_SHORT) {
            return Err(RegistryError::Reserved(format!("-{}", RESERVED_SHORT)));
        }
        for old in &self.descriptors {
            if old.canonical() == new.canonical() {
                return Err(RegistryError::DuplicateName(new.canonical().to_owned()));
            }
            if named && !old.kind.is_positional() && old.long == new.long {
                return Err(RegistryError::DuplicateLong(new.long.clone()));
            }
            if let (Some(short), Some(old_short)) = (new.short, old.short) {
                if short == old_short {
                    return Err(RegistryError::DuplicateShort(short));
                }
            }
        }
        Ok(())
    }

    fn check_order(&self, new: &OptionDescriptor) -> Result<(), RegistryError> {
        let previous = self.positionals().last();
        if let Some(previous) = previous {
            if previous.arity.is_multiple()
                || (!previous.arity.is_required() && new.arity.is_required())
            {
                return Err(RegistryError::PositionalOrder(new.canonical().to_owned()));
            }
        }
        Ok(())
    }

    /// All the declared options, in the order of declaration.
    pub fn descriptors(&self) -> &[OptionDescriptor] {
        &self.descriptors
    }

    /// The positional arguments, in their order.
    pub fn positionals(&self) -> impl Iterator<Item = &OptionDescriptor> {
        self.descriptors.iter().filter(|d| d.kind.is_positional())
    }

    /// Looks up an option by its canonical name.
    pub fn get(&self, canonical: &str) -> Option<&OptionDescriptor> {
        self.descriptors.iter().find(|d| d.canonical() == canonical)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flavors(registry: &mut Registry, default: Option<Value>) -> Result<(), RegistryError> {
        registry.add_restricted_option(
            "flavor",
            &["chocolate", "vanilla", "strawberry"],
            None,
            default,
            "your favorite flavor",
            ValueType::Str,
        )
    }

    #[test]
    fn names() {
        assert_eq!("show_intro", safe_name("show intro"));
        assert_eq!("a_b", safe_name("  a \t\n b "));
        assert_eq!("", safe_name(" \t "));
        assert_eq!("show-intro", long_flag("Show_Intro"));

        let mut registry = Registry::new();
        registry
            .add_counted_option("awesomeness level", Some('a'), 0, "")
            .unwrap();
        let descriptor = registry.get("awesomeness_level").unwrap();
        assert_eq!("awesomeness-level", descriptor.long());
        assert_eq!(Some('a'), descriptor.short_flag());
        assert_eq!(&Value::Int(0), descriptor.default());
    }

    #[test]
    fn empty_names() {
        let mut registry = Registry::new();
        assert_eq!(
            Err(RegistryError::EmptyName),
            registry.add_argument("  ", "", ValueType::Str, Arity::One)
        );
        assert_eq!(
            Err(RegistryError::EmptyName),
            registry.declare(OptionDescriptor::new("x", Kind::Switch).dest(""))
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn duplicates() {
        let mut registry = Registry::new();
        registry
            .add_option("username", Some('u'), None, "", ValueType::Str)
            .unwrap();
        assert_eq!(
            Err(RegistryError::DuplicateName("username".to_owned())),
            registry.add_switch("username", None, false, "")
        );
        assert_eq!(
            Err(RegistryError::DuplicateShort('u')),
            registry.add_switch("unicode", Some('u'), false, "")
        );
        assert_eq!(
            Err(RegistryError::DuplicateLong("username".to_owned())),
            registry.declare(OptionDescriptor::new("Username", Kind::Switch).dest("other"))
        );
        assert_eq!(1, registry.len());
    }

    #[test]
    fn reserved() {
        let mut registry = Registry::new();
        assert_eq!(
            Err(RegistryError::Reserved("-h".to_owned())),
            registry.add_switch("human", Some('h'), false, "")
        );
        assert_eq!(
            Err(RegistryError::Reserved("help".to_owned())),
            registry.add_switch("help", None, false, "")
        );
        assert_eq!(
            Err(RegistryError::Reserved("--version".to_owned())),
            registry.declare(OptionDescriptor::new("version", Kind::Switch).dest("show_version"))
        );
    }

    #[test]
    fn restricted_defaults() {
        let mut registry = Registry::new();
        flavors(&mut registry, None).unwrap();
        assert_eq!(&Value::from("chocolate"), registry.get("flavor").unwrap().default());

        let mut registry = Registry::new();
        flavors(&mut registry, Some("vanilla".into())).unwrap();
        assert_eq!(&Value::from("vanilla"), registry.get("flavor").unwrap().default());

        let mut registry = Registry::new();
        assert_eq!(
            Err(RegistryError::DefaultNotAChoice {
                option: "flavor".to_owned(),
                default: "mint".to_owned(),
            }),
            flavors(&mut registry, Some("mint".into()))
        );
        assert_eq!(
            Err(RegistryError::NoChoices("free".to_owned())),
            registry.add_restricted_argument("free", &[], "", ValueType::Str)
        );
    }

    #[test]
    fn invalid_defaults() {
        let mut registry = Registry::new();
        assert!(matches!(
            registry.add_option("port", None, Some("high".into()), "", ValueType::Int),
            Err(RegistryError::InvalidDefault { .. })
        ));
        assert!(matches!(
            registry.declare(OptionDescriptor::new("loud", Kind::Switch).default_value(3i64)),
            Err(RegistryError::InvalidDefault { .. })
        ));
        assert!(matches!(
            registry.add_restricted_argument("count", &["1", "two"], "", ValueType::Int),
            Err(RegistryError::InvalidDefault { .. })
        ));
        assert!(matches!(
            registry.declare(OptionDescriptor::new("intro", Kind::Positional).default_value("hi")),
            Err(RegistryError::Unsupported { .. })
        ));
        assert!(matches!(
            registry.declare(OptionDescriptor::new("who", Kind::Repeatable).choices(vec!["me"])),
            Err(RegistryError::Unsupported { .. })
        ));
    }

    #[test]
    fn positional_order() {
        let mut registry = Registry::new();
        assert_eq!(
            Err(RegistryError::InvalidArity("none".to_owned())),
            registry.add_argument("none", "", ValueType::Str, Arity::Exactly(0))
        );
        registry
            .add_argument("first", "", ValueType::Str, Arity::One)
            .unwrap();
        registry
            .add_argument("maybe", "", ValueType::Str, Arity::Optional)
            .unwrap();
        assert_eq!(
            Err(RegistryError::PositionalOrder("required".to_owned())),
            registry.add_argument("required", "", ValueType::Str, Arity::One)
        );
        registry
            .add_argument("rest", "", ValueType::Str, Arity::ZeroOrMore)
            .unwrap();
        assert_eq!(
            Err(RegistryError::PositionalOrder("after".to_owned())),
            registry.add_argument("after", "", ValueType::Str, Arity::Optional)
        );
        // Named options are fine anywhere.
        registry.add_switch("late", None, false, "").unwrap();
        let names = registry
            .positionals()
            .map(OptionDescriptor::canonical)
            .collect::<Vec<_>>();
        assert_eq!(vec!["first", "maybe", "rest"], names);
    }
}
