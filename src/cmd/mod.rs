use std::fmt;

use structopt::StructOpt;

use crate::config::Config;
use crate::{Console, Result};

mod submit;

pub use submit::{SubmitOpt, SubmitOutcome};

pub trait Outcome: fmt::Display + fmt::Debug {
    fn is_error(&self) -> bool;
}

pub trait Run {
    fn run(&self, conf: &Config, cnsl: &mut Console) -> Result<Box<dyn Outcome>>;
}

#[derive(StructOpt, Debug, Clone, PartialEq, Eq, Hash)]
#[structopt(rename_all = "kebab")]
pub enum Cmd {
    /// Submits the solution and waits for the verdict
    Submit(SubmitOpt),
}

impl Run for Cmd {
    fn run(&self, conf: &Config, cnsl: &mut Console) -> Result<Box<dyn Outcome>> {
        match self {
            Self::Submit(opt) => opt.run(conf, cnsl),
        }
    }
}
