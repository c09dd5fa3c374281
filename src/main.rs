#![warn(clippy::all)]

use std::io::{self, Write as _};

use structopt::StructOpt;

use bojsub::{Opt, Result};

fn main() -> Result<()> {
    let opt = Opt::from_args();
    opt.run().map_err(|err| {
        io::stdout().flush().expect("Could not flush stdout");
        eprintln!();
        err
    })
}
