use std::io::{self, Write};

use crate::model::{SolutionId, VerdictMessage};

/// One step of the submit workflow, emitted as it starts (or, for verdict
/// updates, as each message arrives). The workflow only emits these; how they
/// are rendered is up to the `Report` implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Authenticating,
    FetchingSubmitPage,
    SolvingCaptcha,
    Submitting,
    AwaitingVerdict(SolutionId),
    VerdictUpdate(VerdictMessage),
}

pub trait Report: Write {
    fn event(&mut self, event: ProgressEvent) -> io::Result<()>;
}

/// Discards events and request logs. Stands in for a console in tests.
#[derive(Debug)]
pub struct NullReport(io::Sink);

impl NullReport {
    pub fn new() -> Self {
        Self(io::sink())
    }
}

impl Write for NullReport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl Report for NullReport {
    fn event(&mut self, _event: ProgressEvent) -> io::Result<()> {
        Ok(())
    }
}
