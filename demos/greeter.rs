//! A greeter showing off the lifecycle.
//!
//! Try for example:
//!
//! ```sh
//! cargo run --example greeter -- "Welcome aboard!" beer -u Ann -aaa -s --flavor vanilla -vvv
//! ```

use std::env;
use std::time::{SystemTime, UNIX_EPOCH};

use ceremony::args::{Arity, RegistryError, ValueType};
use ceremony::prelude::*;
use ceremony::Snapshot;
use log::info;

const DESCRIPTION: &str = "An example application which showcases the ceremony crate.";
const EPILOGUE: &str = "See the README for more information.";
const ORGANIZATION: &str = "Ceremony Demos";
const DEFAULT_CONFIG: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/app.ini");

struct Greeter;

impl Application for Greeter {
    type Payload = &'static str;

    fn declare(&self, registry: &mut Registry) -> Result<(), RegistryError> {
        registry.add_argument(
            "intro",
            "the message to give to the user (e.g., \"Welcome aboard!\")",
            ValueType::Str,
            Arity::One,
        )?;
        registry.add_restricted_argument(
            "free",
            &["speech", "beer"],
            "choose wisely, but don't stall",
            ValueType::Str,
        )?;
        registry.add_option(
            "username",
            Some('u'),
            Some("John Doe".into()),
            "the username to use, the last one given wins",
            ValueType::Str,
        )?;
        registry.add_counted_option(
            "awesomeness level",
            Some('a'),
            0,
            "adds awesomeness (the more, the greater the awesome level)",
        )?;
        registry.add_restricted_option(
            "flavor",
            &["chocolate", "vanilla", "strawberry"],
            None,
            None,
            "your favorite flavor",
            ValueType::Str,
        )?;
        registry.add_switch(
            "show intro",
            Some('s'),
            false,
            "if set, the welcome message is shown",
        )
    }

    fn initialize(&mut self, ctx: &mut Context) -> Result<(), AnyError> {
        if let Some(previous) = ctx.state().get_as::<f64>("exec_time")? {
            writeln!(ctx.out(), "Previous execution timestamp: {}", previous)?;
        }
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs_f64();
        ctx.state_mut().set("exec_time", now)?;
        Ok(())
    }

    fn main(&mut self, ctx: &mut Context, message: &'static str) -> Result<(), AnyError> {
        let args = ctx.args().clone();
        let user = args.str("username").unwrap_or_default();
        if let Some(greeting) = ctx.config().get("greeting", "message") {
            info!("The configured greeting is {:?}", greeting);
        }
        if let Some(owner) = ctx.config().get("greeting", "owner") {
            info!("Greetings brought to you by {}", owner);
        }
        if args.flag("show_intro") {
            writeln!(ctx.out(), "{}: {}", user, args.str("intro").unwrap_or_default())?;
        }
        writeln!(ctx.out(), "{}: {}", user, message)?;
        writeln!(
            ctx.out(),
            "{}: You are awesome, {} times over!",
            user,
            args.int("awesomeness_level").unwrap_or_default(),
        )?;
        if let Some(flavor) = args.str("flavor") {
            writeln!(ctx.out(), "{}: You chose the {} flavor!", user, flavor)?;
        }
        writeln!(ctx.out(), "{}: Free as in {}.", user, args.str("free").unwrap_or_default())?;
        Ok(())
    }

    fn finalize(&mut self, ctx: &mut Context) -> Result<(), AnyError> {
        let user = ctx.args().str("username").unwrap_or_default().to_owned();
        writeln!(ctx.out(), "Goodbye {}!", user)?;
        Ok(())
    }
}

fn main() -> Result<(), AnyError> {
    let argv = env::args_os().skip(1).collect::<Vec<_>>();
    let mut app = Builder::new("greeter")
        .version(env!("CARGO_PKG_VERSION"))
        .description(DESCRIPTION)
        .epilogue(EPILOGUE)
        .organization(ORGANIZATION)
        .default_config(DEFAULT_CONFIG)
        .build(Greeter)?;

    println!("Running: {} with args: {:?}", app.app_id(), argv);
    app.run_term(argv.clone(), "It's very nice to meet you!");
    app.run_term(argv.clone(), "Hello again!");

    let saved = app.snapshot().to_json()?;
    let mut restored = Builder::restore(Snapshot::from_json(&saved)?)
        .default_config(DEFAULT_CONFIG)
        .build(Greeter)?;
    restored.run_term(argv, "I was saved, now I am back!");
    Ok(())
}
