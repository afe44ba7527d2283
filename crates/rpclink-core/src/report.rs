use std::fmt;

use crate::error::LinkError;

/// Which loop of a link observed a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Read => "read",
            Direction::Write => "write",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Side channel for link failures.
///
/// Must not block and cannot fail the link.
pub trait ErrorReporter: Send + Sync + 'static {
    fn report(&self, link: &str, direction: Direction, err: &LinkError);
}

impl<F> ErrorReporter for F
where
    F: Fn(&str, Direction, &LinkError) + Send + Sync + 'static,
{
    fn report(&self, link: &str, direction: Direction, err: &LinkError) {
        self(link, direction, err)
    }
}

/// Default reporter: one `tracing` error event per failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, link: &str, direction: Direction, err: &LinkError) {
        tracing::error!(link, direction = direction.as_str(), error = %err, "link failed");
    }
}
