#![warn(clippy::all)]

#[macro_use]
extern crate strum;

use anyhow::Context as _;
use lazy_static::lazy_static;
use semver::Version;
use structopt::StructOpt;

mod abs_path;
mod cmd;
mod config;
mod console;
mod macros;
mod model;
mod progress;
mod service;

use cmd::{Cmd, Run as _};
use config::Config;

pub use console::Console;

pub type Error = anyhow::Error;
pub type Result<T> = anyhow::Result<T>;

lazy_static! {
    pub static ref VERSION: Version =
        Version::parse(env!("CARGO_PKG_VERSION")).expect("Could not parse crate version");
}

#[derive(StructOpt, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Opt {
    #[structopt(flatten)]
    global_opt: GlobalOpt,
    #[structopt(subcommand)]
    cmd: Cmd,
}

#[derive(StructOpt, Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct GlobalOpt {
    #[structopt(long, global = true)]
    debug: bool,
    /// Suppresses progress output
    #[structopt(long, global = true)]
    quiet: bool,
}

impl Opt {
    pub fn run(&self) -> Result<()> {
        let mut cnsl = if self.global_opt.quiet {
            Console::sink()
        } else {
            Console::term()
        };
        let conf = Config::search(&mut cnsl).context("Could not load config")?;
        let outcome = self.cmd.run(&conf, &mut cnsl)?;
        if self.global_opt.debug {
            println!("{:#?}", outcome);
        } else {
            println!("{}", outcome);
        }
        if outcome.is_error() {
            std::process::exit(1);
        }
        Ok(())
    }
}
