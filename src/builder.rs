use std::any;
use std::path::PathBuf;

use log::debug;
use uuid::Uuid;

use crate::app::App;
use crate::application::Application;
use crate::args::{Kind, OptionDescriptor, Registry, RegistryError, Value, ValueType};
use crate::identity::Identity;
use crate::logging::{FanOut, Stream};
use crate::state::{Snapshot, State};
use crate::utils::DEFAULT_TCP_LOGGING_PORT;

pub(crate) const VERBOSITY: &str = "verbosity";
pub(crate) const NETLOGGER: &str = "netlogger_url";
pub(crate) const NETLOG_HOST: &str = "netlog_host";
pub(crate) const NETLOG_PORT: &str = "netlog_port";

/// The builder of an [`App`].
///
/// Sets up the identity of the application, where its output and logs go and its initial state.
/// The [`build`][Builder::build] then registers the command line options, both the built-in ones
/// and the ones of the [`Application`].
///
/// The built-in options are:
///
/// * `-v`/`--verbose` (counted, stored as `verbosity`): how much is logged.
/// * `--config <path>`: the configuration file, only if a
///   [`default_config`][Builder::default_config] is set.
/// * `--netlogger <host:port>` (repeatable, stored as `netlogger_url`): remote log sinks.
/// * `--netlog-host <host>` and `--netlog-port <port>`: another way to specify a remote log sink.
///
/// # Examples
///
/// ```rust
/// use ceremony::{AnyError, Application, Builder, Context};
///
/// struct Hello;
///
/// impl Application for Hello {
///     type Payload = ();
///
///     fn main(&mut self, ctx: &mut Context, _: ()) -> Result<(), AnyError> {
///         writeln!(ctx.out(), "Hello")?;
///         Ok(())
///     }
/// }
///
/// let mut app = Builder::new("hello")
///     .version("1.0.0")
///     .organization("Acme")
///     .build(Hello)
///     .unwrap();
/// assert_eq!("acme.hello.1-0-0", app.app_id());
/// assert!(app.run(Vec::<String>::new(), ()).is_success());
/// ```
#[derive(Clone, Debug)]
pub struct Builder {
    identity: Identity,
    default_config: Option<PathBuf>,
    stdout: Stream,
    stderr: Option<Stream>,
    stdlog: Option<Stream>,
    state: State,
}

impl Builder {
    /// Starts building an application of the given name.
    ///
    /// The output goes to the standard output, both the errors and the diagnostic logs go to the
    /// standard error output.
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self {
            identity: Identity::new(name),
            default_config: None,
            stdout: Stream::Stdout,
            stderr: Some(Stream::Stderr),
            stdlog: Some(Stream::Stderr),
            state: State::new(),
        }
    }

    /// Starts building an application from a previously taken [`Snapshot`].
    ///
    /// The identity and state are restored, the rest needs to be set up again.
    pub fn restore(snapshot: Snapshot) -> Self {
        let identity = snapshot.identity();
        debug!("Restoring {} from a snapshot", identity.app_id());
        Self {
            identity,
            state: snapshot.state,
            ..Self::new("")
        }
    }

    pub fn version<V: Into<String>>(mut self, version: V) -> Self {
        self.identity.version = version.into();
        self
    }

    pub fn description<D: Into<String>>(mut self, description: D) -> Self {
        self.identity.description = description.into();
        self
    }

    /// Text shown at the end of the help.
    pub fn epilogue<E: Into<String>>(mut self, epilogue: E) -> Self {
        self.identity.epilogue = epilogue.into();
        self
    }

    pub fn organization<O: Into<String>>(mut self, organization: O) -> Self {
        self.identity.organization = organization.into();
        self
    }

    pub fn credits<C: Into<String>>(mut self, credits: C) -> Self {
        self.identity.credits = Some(credits.into());
        self
    }

    /// Enables the `--config` option, with this path as the default.
    pub fn default_config<P: Into<PathBuf>>(self, path: P) -> Self {
        Self {
            default_config: Some(path.into()),
            ..self
        }
    }

    /// Where the application's own output goes.
    pub fn stdout<S: Into<Stream>>(self, stdout: S) -> Self {
        Self {
            stdout: stdout.into(),
            ..self
        }
    }

    /// Where error and fatal log records go, `None` to throw them away.
    pub fn stderr(self, stderr: Option<Stream>) -> Self {
        Self { stderr, ..self }
    }

    /// Where the less severe log records go, `None` to throw them away.
    pub fn stdlog(self, stdlog: Option<Stream>) -> Self {
        Self { stdlog, ..self }
    }

    /// The initial state.
    pub fn state(self, state: State) -> Self {
        Self { state, ..self }
    }

    fn standard_options(&self, registry: &mut Registry) -> Result<(), RegistryError> {
        registry.declare(
            OptionDescriptor::new("verbose", Kind::Counted)
                .dest(VERBOSITY)
                .short('v')
                .help(
                    "output additional information to stderr \
                     (more v's mean more output, 4 is maximal)",
                ),
        )?;
        if let Some(path) = &self.default_config {
            registry.add_option(
                "config",
                None,
                Some(Value::Path(path.clone())),
                "path to the configuration file",
                ValueType::Path,
            )?;
        }
        registry.declare(
            OptionDescriptor::new("netlogger", Kind::Repeatable)
                .dest(NETLOGGER)
                .value_type(ValueType::Address)
                .help(
                    "address(es) of the socket server(s) to which log events will be sent \
                     (e.g., \"localhost:9020\")",
                ),
        )?;
        registry.add_option(
            "netlog host",
            None,
            None,
            "host of another socket server to send log events to",
            ValueType::Str,
        )?;
        registry.add_option(
            "netlog port",
            None,
            Some(Value::Int(i64::from(DEFAULT_TCP_LOGGING_PORT))),
            "port of the socket server given by --netlog-host",
            ValueType::Port,
        )?;
        Ok(())
    }

    /// Finishes the application.
    ///
    /// Fails if the application declares options that collide with each other or with the
    /// built-in ones.
    pub fn build<A: Application>(self, application: A) -> Result<App<A>, RegistryError> {
        let mut registry = Registry::new();
        self.standard_options(&mut registry)?;
        application.declare(&mut registry)?;
        let app_id = self.identity.app_id();
        let instance_id = format!("{}.{}", app_id, Uuid::new_v4());
        let debug_id = format!("{}.run", any::type_name::<A>());
        debug!("Built {} with {} options", instance_id, registry.len());
        Ok(App {
            application,
            fanout: FanOut::new(app_id, self.stdlog, self.stderr),
            identity: self.identity,
            instance_id,
            debug_id,
            registry,
            state: self.state,
            stdout: self.stdout,
        })
    }
}
