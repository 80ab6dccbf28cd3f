use std::fmt;

use serde::{Deserialize, Serialize};

/// Version announced with `VERSION` on startup.
pub const PROTOCOL_VERSION: u32 = 1;

/// Extensions this side of the protocol understands.
pub mod extensions {
    pub const INFO: &str = "INFO";
}

/// Direction of a `TRANSFER` request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Store,
    Retrieve,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Store => "STORE",
            Self::Retrieve => "RETRIEVE",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reach of a remote, answered to `GETAVAILABILITY`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Availability {
    Local,
    Global,
}

impl Availability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "LOCAL",
            Self::Global => "GLOBAL",
        }
    }
}

/// Requests sent by the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    Extensions(Vec<String>),
    InitRemote,
    Prepare,
    Transfer {
        direction: Direction,
        key: String,
        file: String,
    },
    CheckPresent(String),
    Remove(String),
    GetCost,
    GetAvailability,
    WhereIs(String),
    ListConfigs,
    GetInfo,
    /// The host hit an error and is about to give up on us.
    Error(String),
    /// Anything this remote does not implement; carries the verb.
    Unsupported(String),
}

impl Request {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Extensions(_) => "EXTENSIONS",
            Self::InitRemote => "INITREMOTE",
            Self::Prepare => "PREPARE",
            Self::Transfer { .. } => "TRANSFER",
            Self::CheckPresent(_) => "CHECKPRESENT",
            Self::Remove(_) => "REMOVE",
            Self::GetCost => "GETCOST",
            Self::GetAvailability => "GETAVAILABILITY",
            Self::WhereIs(_) => "WHEREIS",
            Self::ListConfigs => "LISTCONFIGS",
            Self::GetInfo => "GETINFO",
            Self::Error(_) => "ERROR",
            Self::Unsupported(_) => "UNSUPPORTED",
        }
    }
}

/// Replies and remote-initiated messages sent to the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Version(u32),
    Extensions(Vec<String>),
    InitRemoteSuccess,
    InitRemoteFailure(String),
    PrepareSuccess,
    PrepareFailure(String),
    TransferSuccess {
        direction: Direction,
        key: String,
    },
    TransferFailure {
        direction: Direction,
        key: String,
        message: String,
    },
    CheckPresentSuccess(String),
    CheckPresentFailure(String),
    CheckPresentUnknown {
        key: String,
        message: String,
    },
    RemoveSuccess(String),
    RemoveFailure {
        key: String,
        message: String,
    },
    Cost(u32),
    Availability(Availability),
    WhereIsSuccess(String),
    WhereIsFailure,
    Config {
        name: String,
        description: String,
    },
    ConfigEnd,
    InfoField(String),
    InfoValue(String),
    InfoEnd,
    UnsupportedRequest,
    // Remote-initiated
    GetConfig(String),
    SetConfig {
        name: String,
        value: String,
    },
    GetUuid,
    GetGitDir,
    Info(String),
    Debug(String),
    Error(String),
}

/// A setting the remote accepts at `initremote`/`enableremote` time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSetting {
    pub name: String,
    pub description: String,
}

impl ConfigSetting {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}
