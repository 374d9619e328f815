//! Which HTTP methods carry a request body.
//!
//! The broker uses this to decide whether to capture the inbound body into
//! the event payload, and the forwarding client uses it to decide whether to
//! attach the payload to the replayed request. Both sides should run with
//! the same policy.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Body-carrying method policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BodyPolicy {
    /// Every method except `GET` and `HEAD` carries a body.
    #[default]
    NonGet,
    /// Only `POST` carries a body.
    PostOnly,
    /// Every method carries a body when one is present.
    Always,
}

impl BodyPolicy {
    /// Whether a request with `method` carries a body under this policy.
    pub fn carries_body(self, method: &str) -> bool {
        match self {
            Self::NonGet => {
                !method.eq_ignore_ascii_case("GET") && !method.eq_ignore_ascii_case("HEAD")
            }
            Self::PostOnly => method.eq_ignore_ascii_case("POST"),
            Self::Always => true,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NonGet => "non-get",
            Self::PostOnly => "post-only",
            Self::Always => "always",
        }
    }
}

impl fmt::Display for BodyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BodyPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "non-get" => Ok(Self::NonGet),
            "post-only" => Ok(Self::PostOnly),
            "always" => Ok(Self::Always),
            other => Err(Error::UnknownBodyPolicy(other.to_string())),
        }
    }
}
