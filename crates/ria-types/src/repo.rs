use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Length of the first directory level a repository is fanned out into.
pub const PREFIX_LEN: usize = 3;

/// Identity of one dataset's object space inside a multi-tenant store.
///
/// Usually a UUID. The store splits it into a 3-character prefix and the
/// remaining suffix, used as two nested directory levels so that no single
/// directory grows with the number of hosted repositories.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepositoryId(String);

impl RepositoryId {
    /// Validate and wrap an identifier.
    pub fn parse(id: &str) -> Result<Self, TypeError> {
        if !id.is_ascii() {
            return Err(TypeError::repository(id, "must be ASCII"));
        }
        if id.len() <= PREFIX_LEN {
            return Err(TypeError::repository(
                id,
                format!("must be longer than {PREFIX_LEN} characters"),
            ));
        }
        if id.starts_with('.') {
            return Err(TypeError::repository(id, "must not start with '.'"));
        }
        if let Some(ch) = id
            .chars()
            .find(|c| *c == '/' || *c == '\\' || c.is_ascii_whitespace() || c.is_ascii_control())
        {
            return Err(TypeError::repository(
                id,
                format!("contains forbidden character: {ch:?}"),
            ));
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First fan-out level (`id[0:3]`).
    pub fn prefix(&self) -> &str {
        &self.0[..PREFIX_LEN]
    }

    /// Second fan-out level (`id[3:]`).
    pub fn suffix(&self) -> &str {
        &self.0[PREFIX_LEN..]
    }
}

impl fmt::Debug for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RepositoryId({})", self.0)
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RepositoryId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RepositoryId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RepositoryId> for String {
    fn from(id: RepositoryId) -> Self {
        id.0
    }
}
