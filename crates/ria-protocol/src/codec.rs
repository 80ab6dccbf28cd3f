//! Line encoding of protocol messages.
//!
//! Every message is one line of space-separated words. The last parameter
//! of a message may itself contain spaces; it never contains a newline, so
//! free-form text is escaped before sending.

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{Direction, Reply, Request};

/// Make free-form text fit on one protocol line.
pub fn escape(text: &str) -> String {
    text.trim_end_matches('\n')
        .replace('\r', "")
        .replace('\n', "\\n")
}

/// Parse one request line, without its line terminator.
pub fn decode_request(line: &str) -> ProtocolResult<Request> {
    let (verb, rest) = match line.split_once(' ') {
        Some((verb, rest)) => (verb, rest),
        None => (line, ""),
    };
    let one_arg = |what: &str| -> ProtocolResult<String> {
        if rest.is_empty() {
            Err(ProtocolError::malformed(line, format!("missing {what}")))
        } else {
            Ok(rest.to_string())
        }
    };
    let request = match verb {
        "EXTENSIONS" => Request::Extensions(rest.split_whitespace().map(str::to_string).collect()),
        "INITREMOTE" => Request::InitRemote,
        "PREPARE" => Request::Prepare,
        "TRANSFER" => {
            let mut parts = rest.splitn(3, ' ');
            let direction = match parts.next() {
                Some("STORE") => Direction::Store,
                Some("RETRIEVE") => Direction::Retrieve,
                _ => return Err(ProtocolError::malformed(line, "unknown transfer direction")),
            };
            let (Some(key), Some(file)) = (parts.next(), parts.next()) else {
                return Err(ProtocolError::malformed(line, "expected key and file"));
            };
            if key.is_empty() || file.is_empty() {
                return Err(ProtocolError::malformed(line, "expected key and file"));
            }
            Request::Transfer {
                direction,
                key: key.to_string(),
                file: file.to_string(),
            }
        }
        "CHECKPRESENT" => Request::CheckPresent(one_arg("key")?),
        "REMOVE" => Request::Remove(one_arg("key")?),
        "GETCOST" => Request::GetCost,
        "GETAVAILABILITY" => Request::GetAvailability,
        "WHEREIS" => Request::WhereIs(one_arg("key")?),
        "LISTCONFIGS" => Request::ListConfigs,
        "GETINFO" => Request::GetInfo,
        "ERROR" => Request::Error(rest.to_string()),
        other => Request::Unsupported(other.to_string()),
    };
    Ok(request)
}

/// Render a reply as one line, without the line terminator.
pub fn encode_reply(reply: &Reply) -> String {
    match reply {
        Reply::Version(version) => format!("VERSION {version}"),
        Reply::Extensions(exts) => join("EXTENSIONS", &exts.join(" ")),
        Reply::InitRemoteSuccess => "INITREMOTE-SUCCESS".into(),
        Reply::InitRemoteFailure(msg) => join("INITREMOTE-FAILURE", &escape(msg)),
        Reply::PrepareSuccess => "PREPARE-SUCCESS".into(),
        Reply::PrepareFailure(msg) => join("PREPARE-FAILURE", &escape(msg)),
        Reply::TransferSuccess { direction, key } => format!("TRANSFER-SUCCESS {direction} {key}"),
        Reply::TransferFailure {
            direction,
            key,
            message,
        } => format!("TRANSFER-FAILURE {direction} {key} {}", escape(message)),
        Reply::CheckPresentSuccess(key) => format!("CHECKPRESENT-SUCCESS {key}"),
        Reply::CheckPresentFailure(key) => format!("CHECKPRESENT-FAILURE {key}"),
        Reply::CheckPresentUnknown { key, message } => {
            format!("CHECKPRESENT-UNKNOWN {key} {}", escape(message))
        }
        Reply::RemoveSuccess(key) => format!("REMOVE-SUCCESS {key}"),
        Reply::RemoveFailure { key, message } => format!("REMOVE-FAILURE {key} {}", escape(message)),
        Reply::Cost(cost) => format!("COST {cost}"),
        Reply::Availability(availability) => format!("AVAILABILITY {}", availability.as_str()),
        Reply::WhereIsSuccess(text) => join("WHEREIS-SUCCESS", &escape(text)),
        Reply::WhereIsFailure => "WHEREIS-FAILURE".into(),
        Reply::Config { name, description } => format!("CONFIG {name} {}", escape(description)),
        Reply::ConfigEnd => "CONFIGEND".into(),
        Reply::InfoField(field) => join("INFOFIELD", &escape(field)),
        Reply::InfoValue(value) => join("INFOVALUE", &escape(value)),
        Reply::InfoEnd => "INFOEND".into(),
        Reply::UnsupportedRequest => "UNSUPPORTED-REQUEST".into(),
        Reply::GetConfig(name) => format!("GETCONFIG {name}"),
        Reply::SetConfig { name, value } => format!("SETCONFIG {name} {}", escape(value)),
        Reply::GetUuid => "GETUUID".into(),
        Reply::GetGitDir => "GETGITDIR".into(),
        Reply::Info(msg) => join("INFO", &escape(msg)),
        Reply::Debug(msg) => join("DEBUG", &escape(msg)),
        Reply::Error(msg) => join("ERROR", &escape(msg)),
    }
}

/// Parse the host's answer to a remote-initiated query: `VALUE <text>`.
///
/// An empty value is returned as an empty string.
pub fn decode_value(line: &str) -> ProtocolResult<String> {
    if line == "VALUE" {
        return Ok(String::new());
    }
    if let Some(value) = line.strip_prefix("VALUE ") {
        return Ok(value.to_string());
    }
    if let Some(msg) = line.strip_prefix("ERROR") {
        return Err(ProtocolError::Host(msg.trim_start().to_string()));
    }
    Err(ProtocolError::Unexpected {
        expected: "VALUE",
        line: line.to_string(),
    })
}

fn join(verb: &str, arg: &str) -> String {
    if arg.is_empty() {
        verb.to_string()
    } else {
        format!("{verb} {arg}")
    }
}
