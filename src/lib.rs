#![doc(test(attr(deny(warnings))))]
#![forbid(unsafe_code)]
//#![warn(missing_docs)]

//! A base for command line applications.
//!
//! Most command line tools start the same way. They parse the command line, maybe read a
//! configuration file, set up logging according to some `-v` flags and only then get to do what
//! they are actually for. And at the end, they report the failure (if any), clean up and pick an
//! exit code.
//!
//! This crate does the boring part. You implement the [`Application`] trait (only the
//! [`main`][Application::main] hook is mandatory), hand it to a [`Builder`] and [`run`][App::run]
//! the resulting [`App`].
//!
//! # What happens during a run
//!
//! 1. The command line is resolved against the declared options (see the [`args`] module). Every
//!    option ends up as a list of values. Help and version are handled here.
//! 2. The configuration file is loaded, if the application has one (see [`cfg_loader`]).
//! 3. The logging is attached (see [`logging`]). How much gets logged depends on the number of
//!    `-v` flags. Log records can also be sent to remote servers with `--netlogger`.
//! 4. The hooks are called: [`initialize`][Application::initialize], [`main`][Application::main],
//!    then either [`on_success`][Application::on_success] or
//!    [`on_failure`][Application::on_failure], and [`finalize`][Application::finalize] no
//!    matter what.
//! 5. The logging is detached again.
//!
//! Nothing of this panics or exits the process. Errors (and panics) of the hooks are logged and
//! the run ends with an [`Outcome`]. The [`run_term`][App::run_term] turns it into an exit code.
//!
//! Only the [`State`] survives between runs. It can also be saved as a [`Snapshot`] and restored
//! by a later process.
//!
//! # Examples
//!
//! ```rust
//! use ceremony::prelude::*;
//! use ceremony::args::{Arity, RegistryError, ValueType};
//!
//! struct Greeter;
//!
//! impl Application for Greeter {
//!     type Payload = ();
//!
//!     fn declare(&self, registry: &mut Registry) -> Result<(), RegistryError> {
//!         registry.add_argument("intro", "what to say", ValueType::Str, Arity::One)?;
//!         registry.add_option(
//!             "username",
//!             Some('u'),
//!             Some("John Doe".into()),
//!             "who is saying it",
//!             ValueType::Str,
//!         )
//!     }
//!
//!     fn main(&mut self, ctx: &mut Context, _: ()) -> Result<(), AnyError> {
//!         let intro = ctx.args().str("intro").unwrap_or_default().to_owned();
//!         let user = ctx.args().str("username").unwrap_or_default().to_owned();
//!         writeln!(ctx.out(), "{} says {}", user, intro)?;
//!         Ok(())
//!     }
//! }
//!
//! let output = SharedBuffer::new();
//! let mut app = Builder::new("greeter")
//!     .version("1.0.0")
//!     .stdout(output.clone())
//!     .build(Greeter)
//!     .unwrap();
//!
//! assert!(app.run(vec!["Hello", "-u", "Ann"], ()).is_success());
//! assert_eq!("Ann says Hello\n", output.contents());
//!
//! let outcome = app.run(vec!["--no-such-option"], ());
//! assert_eq!(2, outcome.exit_code());
//! ```
//!
//! A more complete example lives in the `demos` directory of the repository.
//!
//! # Added command line options
//!
//! * `-v`/`--verbose`: more logging (can be repeated, up to 4 times).
//! * `--config <path>`: the configuration file, if the builder got a
//!   [default one][Builder::default_config].
//! * `--netlogger <host:port>`: send the logs to a remote server too (can be repeated).
//! * `--netlog-host <host>`, `--netlog-port <port>`: the same, in two parts.
//! * `-h`/`--help`, `--version`.
//!
//! Any argument of the form `@file` is replaced by the content of the file, one argument per line.

pub mod app;
pub mod application;
pub mod args;
mod builder;
pub mod cfg_loader;
pub mod error;
pub mod identity;
pub mod logging;
#[doc(hidden)]
pub mod macro_support;
pub mod state;
pub mod utils;

pub use crate::app::{App, Outcome};
pub use crate::application::{Application, Context, Hook, HookPanicked};
pub use crate::args::{Args, Registry};
pub use crate::builder::Builder;
pub use crate::cfg_loader::ConfigStore;
pub use crate::error::AnyError;
pub use crate::identity::Identity;
pub use crate::logging::{Severity, SharedBuffer, Stream};
pub use crate::state::{Snapshot, State};

pub mod prelude {
    pub use super::{
        AnyError, App, Application, Args, Builder, Context, Outcome, Registry, SharedBuffer,
    };
}
