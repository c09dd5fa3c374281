use std::error;
use std::fmt;
use std::time::Duration;

/// Failure kinds the workflow needs to tell apart. Transport failures stay as
/// the underlying client errors in the chain; these cover everything that is
/// not a plain network problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// An expected field was missing from a page. Usually means the judge's
    /// markup changed or the session is not valid for the page.
    Extract { field: &'static str },
    Auth { reason: &'static str },
    Solver { reason: String },
    Timeout { waited: Duration },
}

impl ServiceError {
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            _ => false,
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Extract { field } => write!(f, "Could not find {} in page", field),
            Self::Auth { reason } => write!(f, "Authentication failed : {}", reason),
            Self::Solver { reason } => write!(f, "Captcha solver failed : {}", reason),
            Self::Timeout { waited } => {
                write!(f, "Timed out after {}", humantime::format_duration(*waited))
            }
        }
    }
}

impl error::Error for ServiceError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            ServiceError::Extract { field: "csrf key" }.to_string(),
            "Could not find csrf key in page"
        );
        assert_eq!(
            ServiceError::Timeout {
                waited: Duration::from_secs(60)
            }
            .to_string(),
            "Timed out after 1m"
        );
    }

    #[test]
    fn test_downcast_through_context() {
        use anyhow::Context as _;

        let err: anyhow::Error = anyhow::Error::new(ServiceError::Timeout {
            waited: Duration::from_secs(1),
        });
        let err = Err::<(), _>(err).context("Verdict was not reached in time").unwrap_err();
        let found = err.downcast_ref::<ServiceError>().unwrap();
        assert!(found.is_timeout());
    }
}
