//! The hooks an application plugs into the lifecycle.

use std::any::Any;
use std::error::Error;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};

use crate::args::{Args, Registry, RegistryError};
use crate::cfg_loader::ConfigStore;
use crate::error::AnyError;
use crate::identity::Identity;
use crate::state::State;

/// One of the lifecycle hooks.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Hook {
    Initialize,
    Main,
    OnSuccess,
    OnFailure,
    Finalize,
}

impl Display for Hook {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        let name = match self {
            Hook::Initialize => "initialize",
            Hook::Main => "main",
            Hook::OnSuccess => "on_success",
            Hook::OnFailure => "on_failure",
            Hook::Finalize => "finalize",
        };
        fmt.write_str(name)
    }
}

/// A hook panicked instead of returning.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HookPanicked {
    /// Which one.
    pub hook: Hook,
    /// The panic message, if it was a string.
    pub message: Option<String>,
}

impl Display for HookPanicked {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        match &self.message {
            Some(message) => write!(fmt, "The {} hook panicked: {}", self.hook, message),
            None => write!(fmt, "The {} hook panicked", self.hook),
        }
    }
}

impl Error for HookPanicked {}

fn panic_message(payload: &(dyn Any + Send)) -> Option<String> {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
}

/// Runs a hook, turning a panic into an error.
pub(crate) fn call<F>(hook: Hook, f: F) -> Result<(), AnyError>
where
    F: FnOnce() -> Result<(), AnyError>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(Box::new(HookPanicked {
            hook,
            message: panic_message(&*payload),
        })),
    }
}

/// What the hooks get to work with during a run.
pub struct Context<'a> {
    pub(crate) identity: &'a Identity,
    pub(crate) instance_id: &'a str,
    pub(crate) args: &'a Args,
    pub(crate) config: &'a ConfigStore,
    pub(crate) state: &'a mut State,
    pub(crate) out: &'a mut dyn Write,
    pub(crate) sinks: usize,
}

impl Context<'_> {
    pub fn identity(&self) -> &Identity {
        self.identity
    }

    /// The unique identifier of this application instance.
    pub fn instance_id(&self) -> &str {
        self.instance_id
    }

    /// The resolved command line.
    pub fn args(&self) -> &Args {
        self.args
    }

    /// The loaded configuration.
    ///
    /// Empty if there's no configuration file.
    pub fn config(&self) -> &ConfigStore {
        self.config
    }

    /// The state, surviving between runs.
    pub fn state(&self) -> &State {
        &*self.state
    }

    pub fn state_mut(&mut self) -> &mut State {
        &mut *self.state
    }

    /// The standard output of the application.
    ///
    /// ```rust
    /// # use ceremony::{AnyError, Context};
    /// # #[allow(dead_code)]
    /// fn greet(ctx: &mut Context) -> Result<(), AnyError> {
    ///     let name = ctx.args().str("username").unwrap_or("world").to_owned();
    ///     writeln!(ctx.out(), "Hello {}", name)?;
    ///     Ok(())
    /// }
    /// ```
    pub fn out(&mut self) -> &mut dyn Write {
        &mut *self.out
    }

    /// How many log sinks are attached for this run.
    pub fn attached_sinks(&self) -> usize {
        self.sinks
    }
}

/// The user's application.
///
/// Only [`main`][Application::main] is mandatory. The hooks are called by
/// [`App::run`][crate::App::run] in this order:
///
/// 1. [`initialize`][Application::initialize]
/// 2. [`main`][Application::main] (only if initialization succeeded)
/// 3. [`on_success`][Application::on_success] if both succeeded, or
///    [`on_failure`][Application::on_failure] if either returned an error or panicked.
/// 4. [`finalize`][Application::finalize], always.
///
/// None of the hooks run if the command line can't be parsed, the configuration can't be loaded
/// or the user asked for help or version.
pub trait Application {
    /// Additional input of [`main`][Application::main], passed to [`App::run`][crate::App::run].
    type Payload;

    /// Declares the application's command line options.
    ///
    /// Called once, when the [`App`][crate::App] is built.
    fn declare(&self, _registry: &mut Registry) -> Result<(), RegistryError> {
        Ok(())
    }

    fn initialize(&mut self, _ctx: &mut Context) -> Result<(), AnyError> {
        Ok(())
    }

    /// The primary function of the application.
    fn main(&mut self, ctx: &mut Context, payload: Self::Payload) -> Result<(), AnyError>;

    fn on_success(&mut self, _ctx: &mut Context) -> Result<(), AnyError> {
        Ok(())
    }

    fn on_failure(&mut self, _ctx: &mut Context) -> Result<(), AnyError> {
        Ok(())
    }

    fn finalize(&mut self, _ctx: &mut Context) -> Result<(), AnyError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panics_caught() {
        let err = call(Hook::Main, || panic!("Oops {}", 42)).unwrap_err();
        let panicked = err.downcast_ref::<HookPanicked>().unwrap();
        assert_eq!(Hook::Main, panicked.hook);
        assert_eq!(Some("Oops 42"), panicked.message.as_deref());
        assert_eq!("The main hook panicked: Oops 42", err.to_string());
    }

    #[test]
    fn results_passed() {
        assert!(call(Hook::Initialize, || Ok(())).is_ok());
        let err = call(Hook::Finalize, || Err("broken".into())).unwrap_err();
        assert_eq!("broken", err.to_string());
    }
}
