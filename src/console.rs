use std::io::{self, Write};

use anyhow::Context as _;
use console::Term;

use crate::model::Verdict;
use crate::progress::{ProgressEvent, Report};

#[derive(Debug)]
enum Inner {
    Term(Term),
    Buf(Vec<u8>),
    Sink(io::Sink),
}

#[derive(Debug)]
pub struct Console {
    inner: Inner,
}

impl Console {
    pub fn term() -> Self {
        Self {
            inner: Inner::Term(Term::stderr()),
        }
    }

    pub fn buf() -> Self {
        Self {
            inner: Inner::Buf(Vec::new()),
        }
    }

    pub fn sink() -> Self {
        Self {
            inner: Inner::Sink(io::sink()),
        }
    }

    pub fn take_buf(self) -> Option<Vec<u8>> {
        match self.inner {
            Inner::Buf(buf) => Some(buf),
            _ => None,
        }
    }

    pub fn take_output(self) -> crate::Result<String> {
        self.take_buf()
            .context("Could not take buf from console")
            .and_then(|buf| Ok(String::from_utf8(buf)?))
    }

    #[inline]
    fn as_mut_write(&mut self) -> &mut dyn Write {
        match self.inner {
            Inner::Term(ref mut w) => w,
            Inner::Buf(ref mut w) => w,
            Inner::Sink(ref mut w) => w,
        }
    }

    pub fn warn(&mut self, message: &str) -> io::Result<()> {
        writeln!(self, "{}", sty_y(format!("WARN: {}", message)))
    }
}

impl Write for Console {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.as_mut_write().write(buf)
    }

    #[inline]
    fn flush(&mut self) -> io::Result<()> {
        self.as_mut_write().flush()
    }
}

impl Report for Console {
    fn event(&mut self, event: ProgressEvent) -> io::Result<()> {
        match event {
            ProgressEvent::Authenticating => writeln!(self, "Authenticating ..."),
            ProgressEvent::FetchingSubmitPage => writeln!(self, "Fetching submit page ..."),
            ProgressEvent::SolvingCaptcha => writeln!(self, "Solving captcha challenge ..."),
            ProgressEvent::Submitting => writeln!(self, "Submitting source code ..."),
            ProgressEvent::AwaitingVerdict(solution_id) => {
                writeln!(self, "Watching solution {} ...", solution_id)
            }
            ProgressEvent::VerdictUpdate(message) => {
                let styled = match message.status() {
                    status if !status.is_terminal() => sty_dim(message.to_string()),
                    Verdict::Accepted => sty_g(message.to_string()),
                    _ => sty_r(message.to_string()),
                };
                writeln!(self, "{}", styled)
            }
        }
    }
}

macro_rules! def_color {
    ($name:ident, $name_upper:ident, $style:expr) => {
        ::lazy_static::lazy_static! {
            static ref $name_upper: ::console::Style = {
                use ::console::Style;
                $style
            };
        }

        pub fn $name<D>(val: D) -> ::console::StyledObject<D> {
            $name_upper.apply_to(val)
        }
    };
}

pub use color_defs::*;

mod color_defs {
    def_color!(sty_r, STY_R, Style::new().red());
    def_color!(sty_g, STY_G, Style::new().green());
    def_color!(sty_y, STY_Y, Style::new().yellow());
    def_color!(sty_dim, STY_DIM, Style::new().dim());
}
