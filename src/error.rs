#![warn(missing_docs)]
//! plpower specific error structures
use std::{error::Error, fmt::Display};

/// plpower application specific Result type
pub type PlResult<T> = std::result::Result<T, PlError>;

/// Errors that can be returned by various plpower functions.
///
/// A dark spectrum or calibration pair that cannot be found is *not* an error. The resolver
/// reports it as a [`Search::NotFound`](crate::resolver::Search) value and the data model
/// continues uncorrected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlError {
    /// a file could not be interpreted at all (single bad lines are only logged)
    Parse(String),
    /// no usable start parameters could be estimated from a fit window
    InitialGuess(String),
    /// the optimizer did not converge (singular Jacobian, iteration limit, non-finite values)
    FitConvergence(String),
    /// programming or configuration mistakes: inverted windows, shape or arity mismatches
    Configuration(String),
    /// errors while reading files or directories
    Io(String),
    /// errors during console io
    Console(String),
    /// errors not falling in one of the categories above
    Other(String),
}

impl PlError {
    /// Returns `true` if the error is a candidate for a local retry (e.g. with a widened fit window).
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::InitialGuess(_) | Self::FitConvergence(_))
    }
}

impl Display for PlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(m) => {
                write!(f, "Parse:{m}")
            }
            Self::InitialGuess(m) => {
                write!(f, "InitialGuess:{m}")
            }
            Self::FitConvergence(m) => {
                write!(f, "FitConvergence:{m}")
            }
            Self::Configuration(m) => {
                write!(f, "Configuration:{m}")
            }
            Self::Io(m) => {
                write!(f, "Io:{m}")
            }
            Self::Console(m) => {
                write!(f, "Console:{m}")
            }
            Self::Other(m) => write!(f, "plpower Error:Other:{m}"),
        }
    }
}
impl Error for PlError {}

impl std::convert::From<String> for PlError {
    fn from(msg: String) -> Self {
        Self::Other(msg)
    }
}
#[cfg(test)]
mod test {
    use super::*;
    #[test]
    fn from() {
        let error = PlError::from("test".to_string());
        assert_eq!(error, PlError::Other("test".to_string()));
    }
    #[test]
    fn retryable() {
        assert!(PlError::InitialGuess("x".into()).is_retryable());
        assert!(PlError::FitConvergence("x".into()).is_retryable());
        assert!(!PlError::Configuration("x".into()).is_retryable());
        assert!(!PlError::Io("x".into()).is_retryable());
    }
    #[test]
    fn display() {
        assert_eq!(format!("{}", PlError::Parse("test".to_string())), "Parse:test");
        assert_eq!(
            format!("{}", PlError::InitialGuess("test".to_string())),
            "InitialGuess:test"
        );
        assert_eq!(
            format!("{}", PlError::FitConvergence("test".to_string())),
            "FitConvergence:test"
        );
        assert_eq!(
            format!("{}", PlError::Configuration("test".to_string())),
            "Configuration:test"
        );
        assert_eq!(format!("{}", PlError::Io("test".to_string())), "Io:test");
        assert_eq!(
            format!("{}", PlError::Console("test".to_string())),
            "Console:test"
        );
        assert_eq!(
            format!("{}", PlError::Other("test".to_string())),
            "plpower Error:Other:test"
        );
    }
    #[test]
    fn debug() {
        assert_eq!(
            format!("{:?}", PlError::Parse("test".to_string())),
            "Parse(\"test\")"
        );
    }
}
