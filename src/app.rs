//! The application and its lifecycle.

use std::convert::TryFrom;
use std::error::Error;
use std::ffi::OsString;
use std::io::Write;
use std::process;

use log::{debug, warn};

use crate::application::{self, Application, Context, Hook};
use crate::args::{self, Args, ParseError, Registry, Resolution, Resolved};
use crate::builder::{NETLOGGER, NETLOG_HOST, NETLOG_PORT, VERBOSITY};
use crate::cfg_loader::ConfigStore;
use crate::error::AnyError;
use crate::identity::Identity;
use crate::logging::{self, FanOut, Severity, Stream};
use crate::state::{Snapshot, State};
use crate::utils::{NetAddress, DEFAULT_TCP_LOGGING_PORT};
use crate::{fatal, log_error};

/// How a single [`run`][App::run] ended.
#[derive(Debug)]
#[non_exhaustive]
pub enum Outcome {
    /// All the hooks succeeded.
    Success,
    /// Help or version was printed, no hooks ran.
    Exited,
    /// The command line was not accepted, no hooks ran.
    ParseFailed(ParseError),
    /// The configuration could not be loaded, no hooks ran.
    ConfigFailed(AnyError),
    /// A hook returned an error or panicked.
    ///
    /// This is the first hook that failed. A failing [`Hook::OnFailure`] doesn't replace the
    /// original failure.
    HookFailed {
        /// The failed hook.
        hook: Hook,
        /// What it failed with.
        error: AnyError,
    },
}

impl Outcome {
    /// The exit code the process should end with.
    ///
    /// | outcome        | code |
    /// |----------------|------|
    /// | `Success`      | 0    |
    /// | `Exited`       | 0    |
    /// | `HookFailed`   | 1    |
    /// | `ParseFailed`  | 2    |
    /// | `ConfigFailed` | 3    |
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Success | Outcome::Exited => 0,
            Outcome::HookFailed { .. } => 1,
            Outcome::ParseFailed(_) => 2,
            Outcome::ConfigFailed(_) => 3,
        }
    }

    /// Did the whole run succeed?
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

fn log_cause_chain(e: &(dyn Error + 'static)) {
    let mut cause = Some(e);
    while let Some(current) = cause {
        fatal!("{}", current);
        cause = current.source();
    }
}

fn remotes(args: &Args) -> Vec<NetAddress> {
    let mut remotes = args
        .all(NETLOGGER)
        .iter()
        .filter_map(|value| value.as_address())
        .cloned()
        .collect::<Vec<_>>();
    if let Some(host) = args.str(NETLOG_HOST) {
        // Range checked when parsing.
        let port = args
            .int(NETLOG_PORT)
            .and_then(|port| u16::try_from(port).ok())
            .unwrap_or(DEFAULT_TCP_LOGGING_PORT);
        remotes.push(NetAddress::new(host, port));
    }
    remotes
}

/// A built application, ready to be run.
///
/// Created by the [`Builder`][crate::Builder].
pub struct App<A> {
    pub(crate) application: A,
    pub(crate) identity: Identity,
    pub(crate) instance_id: String,
    pub(crate) debug_id: String,
    pub(crate) registry: Registry,
    pub(crate) state: State,
    pub(crate) stdout: Stream,
    pub(crate) fanout: FanOut,
}

impl<A: Application> App<A> {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Identifier of the application (see [`Identity::app_id`]).
    pub fn app_id(&self) -> String {
        self.identity.app_id()
    }

    /// Identifier of this instance.
    ///
    /// It is the [`app_id`][App::app_id] followed by a random UUID.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }

    pub fn application(&self) -> &A {
        &self.application
    }

    pub fn application_mut(&mut self) -> &mut A {
        &mut self.application
    }

    /// Number of log sinks currently attached.
    ///
    /// This is 0 whenever the application is not running.
    pub fn attached_sinks(&self) -> usize {
        self.fanout.attached()
    }

    /// Takes a persistable [`Snapshot`] of the application.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.identity, &self.state)
    }

    fn print(&self, text: &str) {
        let mut out = self.stdout.writer();
        if let Err(e) = writeln!(out, "{}", text.trim_end()) {
            warn!("Failed to print: {}", e);
        }
    }

    /// Runs the application.
    ///
    /// The `argv` are the command line arguments, without the program name. The `payload` is
    /// passed to the [`main`][Application::main] hook.
    ///
    /// This never panics because of the hooks nor exits the process. Everything that happens is
    /// logged and summarized in the returned [`Outcome`]. The log sinks are attached only for the
    /// duration of the call.
    ///
    /// The application can be run multiple times. Only the [`State`] carries over between the
    /// runs.
    pub fn run<I, T>(&mut self, argv: I, payload: A::Payload) -> Outcome
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        // Fatal only until we know the verbosity, so command line errors are reported.
        let mut attachment = self.fanout.attach(Severity::Fatal, &[]);
        let Resolved { args, config } = match args::resolve(&self.registry, &self.identity, argv)
        {
            Ok(Resolution::Args(resolved)) => resolved,
            Ok(Resolution::Help(help)) => {
                self.print(&help);
                return Outcome::Exited;
            }
            Ok(Resolution::Version(version)) => {
                self.print(&version);
                return Outcome::Exited;
            }
            Err(e) => {
                log_cause_chain(&e);
                return Outcome::ParseFailed(e);
            }
        };
        let config = match ConfigStore::load(config.as_deref()) {
            Ok(config) => config,
            Err(e) => {
                log_error!(multi Fatal, e);
                return Outcome::ConfigFailed(e);
            }
        };

        debug_assert!(args.contains(VERBOSITY), "Verbosity is always declared");
        let verbosity = args.int(VERBOSITY).unwrap_or_default();
        attachment.reconfigure(logging::threshold(verbosity), &remotes(&args));
        debug!("Preparing {} environment", self.debug_id);
        debug!("Entering {}", self.debug_id);
        debug!("config = {:?}", config.as_mapping());
        debug!("args = {:?}", args);
        debug!("log_name = \"{}\"", self.identity.app_id());

        let mut out = self.stdout.writer();
        let mut ctx = Context {
            identity: &self.identity,
            instance_id: &self.instance_id,
            args: &args,
            config: &config,
            state: &mut self.state,
            out: &mut *out,
            sinks: attachment.sinks(),
        };
        let app = &mut self.application;

        debug!("Executing initialization hook");
        let primary = match application::call(Hook::Initialize, || app.initialize(&mut ctx)) {
            Ok(()) => {
                debug!("Executing primary function");
                application::call(Hook::Main, || app.main(&mut ctx, payload))
                    .map_err(|e| (Hook::Main, e))
            }
            Err(e) => Err((Hook::Initialize, e)),
        };

        let mut outcome = match primary {
            Ok(()) => {
                debug!("Primary function exited cleanly. Executing success hook");
                match application::call(Hook::OnSuccess, || app.on_success(&mut ctx)) {
                    Ok(()) => Outcome::Success,
                    Err(error) => {
                        fatal!("The {} hook failed", Hook::OnSuccess);
                        log_error!(multi Fatal, error);
                        Outcome::HookFailed {
                            hook: Hook::OnSuccess,
                            error,
                        }
                    }
                }
            }
            Err((hook, error)) => {
                fatal!("An error occurred in the {} hook! Executing failure hook", hook);
                if let Err(e) = application::call(Hook::OnFailure, || app.on_failure(&mut ctx)) {
                    fatal!("The {} hook failed too", Hook::OnFailure);
                    log_error!(multi Fatal, e);
                }
                log_error!(multi Fatal, error);
                Outcome::HookFailed { hook, error }
            }
        };

        debug!("Executing finalization hook");
        if let Err(error) = application::call(Hook::Finalize, || app.finalize(&mut ctx)) {
            fatal!("The {} hook failed", Hook::Finalize);
            log_error!(multi Fatal, error);
            if outcome.is_success() {
                outcome = Outcome::HookFailed {
                    hook: Hook::Finalize,
                    error,
                };
            }
        }
        if let Err(e) = out.flush() {
            warn!("Failed to flush the output: {}", e);
        }
        debug!("Exiting {}", self.debug_id);
        drop(attachment);
        outcome
    }

    /// Runs the application and terminates the process if it didn't succeed.
    ///
    /// Like [`run`][App::run], but exits with the [`exit_code`][Outcome::exit_code] of the
    /// outcome if it is non-zero.
    pub fn run_term<I, T>(&mut self, argv: I, payload: A::Payload)
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let code = self.run(argv, payload).exit_code();
        if code != 0 {
            process::exit(code);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::sync::Arc;

    use parking_lot::Mutex;
    use tempfile::NamedTempFile;

    use super::*;
    use crate::args::{Arity, RegistryError, Value, ValueType};
    use crate::logging::SharedBuffer;
    use crate::Builder;

    #[derive(Default)]
    struct Recorder {
        calls: Arc<Mutex<Vec<&'static str>>>,
        fail_in: Option<Hook>,
        panic_in: Option<Hook>,
        seen: Option<Args>,
        config: Option<ConfigStore>,
    }

    impl Recorder {
        fn hook(&mut self, hook: Hook, name: &'static str) -> Result<(), AnyError> {
            self.calls.lock().push(name);
            if self.panic_in == Some(hook) {
                panic!("{} exploded", name);
            }
            if self.fail_in == Some(hook) {
                return Err(format!("{} failed", name).into());
            }
            Ok(())
        }
    }

    impl Application for Recorder {
        type Payload = &'static str;

        fn declare(&self, registry: &mut Registry) -> Result<(), RegistryError> {
            registry.add_argument("intro", "", ValueType::Str, Arity::One)?;
            registry.add_option("username", Some('u'), Some("John Doe".into()), "", ValueType::Str)?;
            registry.add_restricted_option(
                "flavor",
                &["chocolate", "vanilla"],
                None,
                None,
                "",
                ValueType::Str,
            )?;
            registry.add_counted_option("awesomeness level", Some('a'), 0, "")
        }

        fn initialize(&mut self, ctx: &mut Context) -> Result<(), AnyError> {
            let runs = ctx.state().get_as::<u32>("runs")?.unwrap_or(0);
            ctx.state_mut().set("runs", runs + 1)?;
            self.hook(Hook::Initialize, "initialize")
        }

        fn main(&mut self, ctx: &mut Context, message: &'static str) -> Result<(), AnyError> {
            self.seen = Some(ctx.args().clone());
            self.config = Some(ctx.config().clone());
            let user = ctx.args().str("username").unwrap_or_default().to_owned();
            writeln!(ctx.out(), "{}: {}", user, message)?;
            self.hook(Hook::Main, "main")
        }

        fn on_success(&mut self, _: &mut Context) -> Result<(), AnyError> {
            self.hook(Hook::OnSuccess, "on_success")
        }

        fn on_failure(&mut self, _: &mut Context) -> Result<(), AnyError> {
            self.hook(Hook::OnFailure, "on_failure")
        }

        fn finalize(&mut self, ctx: &mut Context) -> Result<(), AnyError> {
            let user = ctx.args().str("username").unwrap_or_default().to_owned();
            writeln!(ctx.out(), "Goodbye {}!", user)?;
            self.hook(Hook::Finalize, "finalize")
        }
    }

    struct Harness {
        app: App<Recorder>,
        calls: Arc<Mutex<Vec<&'static str>>>,
        stdout: SharedBuffer,
        stdlog: SharedBuffer,
        stderr: SharedBuffer,
    }

    impl Harness {
        fn new(recorder: Recorder) -> Self {
            Self::with(Builder::new("recorder"), recorder)
        }

        fn with(builder: Builder, recorder: Recorder) -> Self {
            let calls = Arc::clone(&recorder.calls);
            let stdout = SharedBuffer::new();
            let stdlog = SharedBuffer::new();
            let stderr = SharedBuffer::new();
            let app = builder
                .organization("Tests")
                .stdout(stdout.clone())
                .stdlog(Some(stdlog.clone().into()))
                .stderr(Some(stderr.clone().into()))
                .build(recorder)
                .unwrap();
            Self {
                app,
                calls,
                stdout,
                stdlog,
                stderr,
            }
        }

        fn run(&mut self, argv: &[&str]) -> Outcome {
            self.app.run(argv.iter().copied(), "Nice to meet you")
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().clone()
        }
    }

    #[test]
    fn successful_run() {
        let _serial = crate::tests::serial();
        let mut harness = Harness::new(Recorder::default());
        let outcome = harness.run(&["Hello"]);
        assert!(outcome.is_success());
        assert_eq!(0, outcome.exit_code());
        assert_eq!(
            vec!["initialize", "main", "on_success", "finalize"],
            harness.calls()
        );
        assert_eq!(
            "John Doe: Nice to meet you\nGoodbye John Doe!\n",
            harness.stdout.contents()
        );
        let seen = harness.app.application().seen.clone().unwrap();
        assert_eq!(&[Value::from("Hello")], seen.all("intro"));
        assert_eq!(&[Value::from("John Doe")], seen.all("username"));
        assert_eq!(&[Value::from("chocolate")], seen.all("flavor"));
        assert_eq!(&[Value::Int(0)], seen.all("verbosity"));
        assert_eq!(&[Value::None], seen.all("netlogger_url"));
        assert!(harness.stderr.is_empty());
        assert_eq!(0, harness.app.attached_sinks());
    }

    #[test]
    fn last_option_wins() {
        let _serial = crate::tests::serial();
        let mut harness = Harness::new(Recorder::default());
        assert!(harness.run(&["Hello", "-u", "Ann", "-aaa"]).is_success());
        let seen = harness.app.application().seen.clone().unwrap();
        assert_eq!(&[Value::from("Ann")], seen.all("username"));
        assert_eq!(Some(3), seen.int("awesomeness_level"));
        assert!(harness.stdout.contents().starts_with("Ann: "));
    }

    #[test]
    fn main_failure() {
        let _serial = crate::tests::serial();
        let mut harness = Harness::new(Recorder {
            fail_in: Some(Hook::Main),
            ..Recorder::default()
        });
        let outcome = harness.run(&["Hello"]);
        assert_eq!(1, outcome.exit_code());
        assert!(matches!(outcome, Outcome::HookFailed { hook: Hook::Main, .. }));
        assert_eq!(
            vec!["initialize", "main", "on_failure", "finalize"],
            harness.calls()
        );
        let errors = harness.stderr.contents();
        assert!(errors.contains("level: FATAL"));
        assert!(errors.contains("main failed"));
        assert_eq!(0, harness.app.attached_sinks());
    }

    #[test]
    fn initialize_failure_skips_main() {
        let _serial = crate::tests::serial();
        let mut harness = Harness::new(Recorder {
            fail_in: Some(Hook::Initialize),
            ..Recorder::default()
        });
        let outcome = harness.run(&["Hello"]);
        assert!(matches!(outcome, Outcome::HookFailed { hook: Hook::Initialize, .. }));
        assert_eq!(vec!["initialize", "on_failure", "finalize"], harness.calls());
    }

    #[test]
    fn panic_contained() {
        let _serial = crate::tests::serial();
        let mut harness = Harness::new(Recorder {
            panic_in: Some(Hook::Main),
            ..Recorder::default()
        });
        match harness.run(&["Hello"]) {
            Outcome::HookFailed { hook, error } => {
                assert_eq!(Hook::Main, hook);
                assert!(error.to_string().contains("main exploded"));
            }
            other => panic!("Unexpected outcome {:?}", other),
        }
        assert_eq!(
            vec!["initialize", "main", "on_failure", "finalize"],
            harness.calls()
        );
    }

    #[test]
    fn finalize_failure() {
        let _serial = crate::tests::serial();
        let mut harness = Harness::new(Recorder {
            fail_in: Some(Hook::Finalize),
            ..Recorder::default()
        });
        let outcome = harness.run(&["Hello"]);
        assert!(matches!(outcome, Outcome::HookFailed { hook: Hook::Finalize, .. }));
        assert!(harness.stderr.contents().contains("finalize failed"));
        assert_eq!(0, harness.app.attached_sinks());
    }

    #[test]
    fn on_failure_failure_keeps_original() {
        let _serial = crate::tests::serial();
        let mut harness = Harness::new(Recorder {
            fail_in: Some(Hook::Main),
            panic_in: Some(Hook::OnFailure),
            ..Recorder::default()
        });
        let outcome = harness.run(&["Hello"]);
        assert!(matches!(outcome, Outcome::HookFailed { hook: Hook::Main, .. }));
        assert!(harness.calls().contains(&"finalize"));
        assert!(harness.stderr.contents().contains("on_failure exploded"));
    }

    #[test]
    fn parse_failure_runs_nothing() {
        let _serial = crate::tests::serial();
        let mut harness = Harness::new(Recorder::default());
        let outcome = harness.run(&["Hello", "--flavor", "wine"]);
        assert!(matches!(outcome, Outcome::ParseFailed(_)));
        assert_eq!(2, outcome.exit_code());
        assert!(harness.calls().is_empty());
        assert!(harness.stdout.is_empty());
        assert!(harness.stderr.contents().contains("wine"));
        assert_eq!(0, harness.app.attached_sinks());
    }

    #[test]
    fn help_and_version() {
        let _serial = crate::tests::serial();
        let mut harness = Harness::with(
            Builder::new("recorder")
                .version("1.2.3")
                .description("Records hooks"),
            Recorder::default(),
        );
        let outcome = harness.run(&["--version"]);
        assert!(matches!(outcome, Outcome::Exited));
        assert_eq!(0, outcome.exit_code());
        assert_eq!("recorder 1.2.3\n", harness.stdout.contents());

        harness.stdout.clear();
        assert!(matches!(harness.run(&["-h"]), Outcome::Exited));
        let help = harness.stdout.contents();
        assert!(help.contains("Records hooks"));
        assert!(help.contains("--netlogger"));
        assert!(help.contains("--verbose"));
        assert!(harness.calls().is_empty());
    }

    #[test]
    fn config_loaded() {
        let _serial = crate::tests::serial();
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[DEFAULT]\nOwner = Acme\n[greeting]\nmessage = Hi").unwrap();
        let mut harness = Harness::with(
            Builder::new("recorder").default_config("/this/does/not/exist.ini"),
            Recorder::default(),
        );

        let outcome = harness.run(&["Hello"]);
        assert!(matches!(outcome, Outcome::ConfigFailed(_)));
        assert_eq!(3, outcome.exit_code());
        assert!(harness.calls().is_empty());
        assert!(harness.stderr.contents().contains("does not exist"));
        assert_eq!(0, harness.app.attached_sinks());

        let path = file.path().to_str().unwrap();
        assert!(harness.run(&["Hello", "--config", path]).is_success());
        let seen = harness.app.application().seen.clone().unwrap();
        assert_eq!(&[Value::None], seen.all("config"));
        let config = harness.app.application().config.clone().unwrap();
        let loaded = file.path().canonicalize().unwrap();
        assert_eq!(Some(loaded.as_path()), config.path());
        assert_eq!(Some("Hi"), config.get("greeting", "message"));
        assert_eq!(Some("Acme"), config.get("greeting", "owner"));
        assert_eq!(vec!["greeting"], config.sections().collect::<Vec<_>>());
    }

    #[test]
    fn invalid_netlog_port() {
        let _serial = crate::tests::serial();
        let mut harness = Harness::new(Recorder::default());
        for &port in &["0", "70000"] {
            harness.stderr.clear();
            let argv = ["Hello", "--netlog-host", "127.0.0.1", "--netlog-port", port];
            let outcome = harness.run(&argv);
            match outcome {
                Outcome::ParseFailed(ParseError::InvalidValue { option, value, .. }) => {
                    assert_eq!("netlog_port", option);
                    assert_eq!(port, value);
                }
                other => panic!("Unexpected outcome {:?}", other),
            }
            assert!(harness.stderr.contents().contains("netlog_port"));
            assert_eq!(0, harness.app.attached_sinks());
        }
        assert!(harness.calls().is_empty());
    }

    #[test]
    fn verbosity_routing() {
        let _serial = crate::tests::serial();
        let mut harness = Harness::new(Recorder::default());
        assert!(harness.run(&["Hello"]).is_success());
        assert!(harness.stdlog.is_empty());

        assert!(harness.run(&["Hello", "-vvvv"]).is_success());
        let diag = harness.stdlog.contents();
        assert!(diag.contains("Entering "));
        assert!(diag.contains(".run"));
        assert!(diag.contains("Executing finalization hook"));
        assert!(diag.contains("log: tests.recorder.0-1-0"));
        assert!(harness.stderr.is_empty());
    }

    #[test]
    fn teardown_across_runs() {
        let _serial = crate::tests::serial();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let remote = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());
        let mut harness = Harness::new(Recorder::default());
        for _ in 0..3 {
            let outcome = harness.run(&["Hello", "--netlogger", remote.as_str(), "-v"]);
            assert!(outcome.is_success());
            assert_eq!(0, harness.app.attached_sinks());
        }
        assert_eq!(Some(3), harness.app.state().get_as::<u32>("runs").unwrap());
    }

    #[test]
    fn sinks_visible_to_hooks() {
        let _serial = crate::tests::serial();

        struct Counter(usize);

        impl Application for Counter {
            type Payload = ();
            fn main(&mut self, ctx: &mut Context, _: ()) -> Result<(), AnyError> {
                self.0 = ctx.attached_sinks();
                assert!(ctx.instance_id().starts_with(".counter.0-1-0."));
                Ok(())
            }
        }

        let mut app = Builder::new("counter")
            .stdout(SharedBuffer::new())
            .stdlog(None)
            .stderr(Some(SharedBuffer::new().into()))
            .build(Counter(0))
            .unwrap();
        let argv = vec!["--netlog-host", "127.0.0.1", "--netlogger", "127.0.0.1:1"];
        assert!(app.run(argv, ()).is_success());
        assert_eq!(3, app.application().0);
        assert_eq!(0, app.attached_sinks());
    }
}
