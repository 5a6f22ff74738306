use std::collections::BTreeMap;
use std::error::Error;
use std::ffi::OsString;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::fs;
use std::io;
use std::iter;
use std::path::{Path, PathBuf};

use log::trace;
use structopt::clap::{App, AppSettings, Arg, ArgMatches, ErrorKind};

use super::registry::{Arity, Kind, OptionDescriptor, Registry};
use super::value::Value;
use super::Args;
use crate::identity::Identity;

/// The canonical name of the option holding the configuration file path.
pub(crate) const CONFIG: &str = "config";

const ARG_FILE_PREFIX: char = '@';
const MAX_ARG_FILE_NESTING: usize = 16;

/// The command line was not accepted.
#[derive(Debug)]
#[non_exhaustive]
pub enum ParseError {
    /// The command line doesn't fit the declared options.
    ///
    /// Unknown flags, missing or superfluous arguments and values outside of the choices. The
    /// message comes with the usage.
    Cli(String),
    /// A value that can't be parsed as the type of the option.
    InvalidValue {
        /// Canonical name of the option.
        option: String,
        /// The raw value.
        value: String,
        /// Why it was not accepted.
        reason: String,
    },
    /// A file referenced by `@file` can't be read.
    ArgFile {
        /// The file.
        path: PathBuf,
        /// What went wrong.
        source: io::Error,
    },
}

impl Display for ParseError {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        match self {
            ParseError::Cli(message) => write!(fmt, "{}", message.trim_end()),
            ParseError::InvalidValue {
                option,
                value,
                reason,
            } => write!(fmt, "Invalid value {:?} of {}: {}", value, option, reason),
            ParseError::ArgFile { path, .. } => {
                write!(fmt, "Can't read arguments from {}", path.display())
            }
        }
    }
}

impl Error for ParseError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ParseError::ArgFile { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Successfully resolved command line.
#[derive(Clone, Debug, PartialEq)]
pub struct Resolved {
    /// The values of all the options.
    ///
    /// The `config` option, if declared, is left with a single [`Value::None`], its value is
    /// moved to the [`config`][Resolved::config] field.
    pub args: Args,
    /// The configuration file to load.
    pub config: Option<PathBuf>,
}

/// The result of resolving a command line.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    /// The arguments to run with.
    Args(Resolved),
    /// Help was requested, this is the text.
    Help(String),
    /// Version was requested, this is the `name version` line.
    Version(String),
}

fn arg_file(token: &OsString) -> Option<PathBuf> {
    let file = token.to_str()?.strip_prefix(ARG_FILE_PREFIX)?;
    if file.is_empty() {
        None
    } else {
        Some(PathBuf::from(file))
    }
}

fn expand_into<I>(tokens: I, out: &mut Vec<OsString>, depth: usize) -> Result<(), ParseError>
where
    I: IntoIterator<Item = OsString>,
{
    for token in tokens {
        let path = match arg_file(&token) {
            Some(path) => path,
            None => {
                out.push(token);
                continue;
            }
        };
        if depth >= MAX_ARG_FILE_NESTING {
            let source = io::Error::new(io::ErrorKind::Other, "Argument files nested too deep");
            return Err(ParseError::ArgFile { path, source });
        }
        trace!("Expanding arguments from {}", path.display());
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(source) => return Err(ParseError::ArgFile { path, source }),
        };
        let lines = content
            .lines()
            .filter(|line| !line.is_empty())
            .map(OsString::from)
            .collect::<Vec<_>>();
        expand_into(lines, out, depth + 1)?;
    }
    Ok(())
}

/// Replaces each `@file` token by the content of the file, one token per line.
///
/// Empty lines are skipped. The files may reference further files.
pub fn expand_arg_files<I, T>(tokens: I) -> Result<Vec<OsString>, ParseError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut out = Vec::new();
    expand_into(tokens.into_iter().map(Into::into), &mut out, 0)?;
    Ok(out)
}

fn wants_version(tokens: &[OsString]) -> bool {
    tokens
        .iter()
        .take_while(|token| token.as_os_str() != "--")
        .any(|token| token.as_os_str() == "--version")
}

fn clap_arg<'a>(descriptor: &'a OptionDescriptor, index: &mut u64) -> Arg<'a, 'a> {
    let mut arg = Arg::with_name(descriptor.canonical()).help(descriptor.help_text());
    if descriptor.kind().is_positional() {
        *index += 1;
        arg = arg.index(*index).value_name(descriptor.metavar());
        arg = match descriptor.values() {
            Arity::One | Arity::Exactly(1) => arg.required(true),
            Arity::Exactly(n) => arg
                .required(true)
                .multiple(true)
                .min_values(n as u64)
                .max_values(n as u64),
            Arity::OneOrMore => arg.required(true).multiple(true),
            Arity::ZeroOrMore => arg.multiple(true),
            Arity::Optional => arg,
        };
    } else {
        arg = arg.long(descriptor.long()).multiple(true);
        if let Some(short) = descriptor.short_flag() {
            arg = arg.short(short.to_string());
        }
        if descriptor.kind().takes_value() {
            arg = arg
                .takes_value(true)
                .number_of_values(1)
                .value_name(descriptor.metavar());
        }
    }
    if descriptor.kind().is_restricted() {
        let choices = descriptor
            .allowed()
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>();
        arg = arg.possible_values(&choices);
    }
    arg
}

fn command<'a>(registry: &'a Registry, identity: &'a Identity) -> App<'a, 'a> {
    let mut app = App::new(identity.name.as_str())
        .setting(AppSettings::DisableVersion)
        .setting(AppSettings::ColorNever)
        // Handled before clap gets to see the command line, this is only for the help.
        .arg(
            Arg::with_name("version")
                .long("version")
                .help("Prints version information"),
        );
    if !identity.description.is_empty() {
        app = app.about(identity.description.as_str());
    }
    if !identity.epilogue.is_empty() {
        app = app.after_help(identity.epilogue.as_str());
    }
    let mut index = 0;
    for descriptor in registry.descriptors() {
        app = app.arg(clap_arg(descriptor, &mut index));
    }
    app
}

fn extract(descriptor: &OptionDescriptor, matches: &ArgMatches) -> Result<Vec<Value>, ParseError> {
    let name = descriptor.canonical();
    match descriptor.kind() {
        Kind::Counted => {
            let start = descriptor.default().as_int().unwrap_or(0);
            Ok(vec![Value::Int(start + matches.occurrences_of(name) as i64)])
        }
        Kind::Switch => {
            let default = descriptor.default().as_bool().unwrap_or(false);
            Ok(vec![Value::Bool(default ^ matches.is_present(name))])
        }
        _ => match matches.values_of_os(name) {
            Some(raw) => raw
                .map(|raw| {
                    descriptor
                        .parser()
                        .parse(raw)
                        .map_err(|reason| ParseError::InvalidValue {
                            option: name.to_owned(),
                            value: raw.to_string_lossy().into_owned(),
                            reason,
                        })
                })
                .collect(),
            None => Ok(vec![descriptor.default().clone()]),
        },
    }
}

/// Resolves the command line against the declared options.
///
/// The `tokens` don't include the program name. See the [module documentation](index.html) for
/// the shape of the result.
pub fn resolve<I, T>(
    registry: &Registry,
    identity: &Identity,
    tokens: I,
) -> Result<Resolution, ParseError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let tokens = expand_arg_files(tokens)?;
    trace!("Resolving command line {:?}", tokens);
    if wants_version(&tokens) {
        let version = format!("{} {}", identity.name, identity.version);
        return Ok(Resolution::Version(version));
    }
    let program = iter::once(OsString::from(identity.name.as_str()));
    let matches = match command(registry, identity).get_matches_from_safe(program.chain(tokens)) {
        Ok(matches) => matches,
        Err(e) if e.kind == ErrorKind::HelpDisplayed => return Ok(Resolution::Help(e.message)),
        Err(e) => return Err(ParseError::Cli(e.message)),
    };
    let mut args = BTreeMap::new();
    let mut config = None;
    for descriptor in registry.descriptors() {
        let mut values = extract(descriptor, &matches)?;
        if descriptor.canonical() == CONFIG {
            config = values.last().and_then(Value::as_path).map(Path::to_owned);
            values = vec![Value::None];
        }
        args.insert(descriptor.canonical().to_owned(), values);
    }
    Ok(Resolution::Args(Resolved {
        args: Args::from(args),
        config,
    }))
}
