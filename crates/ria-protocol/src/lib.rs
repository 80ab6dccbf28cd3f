//! git-annex external special remote protocol.
//!
//! The host (git-annex) and the remote exchange single-line messages over
//! the remote's stdin and stdout. The remote announces `VERSION 1`, then
//! answers one request at a time; while handling a request it may query the
//! host (`GETCONFIG`, `GETUUID`, ...) and read the `VALUE` answer.
//!
//! - [`codec`]: line encoding of requests and replies
//! - [`annex`]: the host side as seen from a remote ([`Annex`])
//! - [`driver`]: the request loop ([`Driver`]) and the [`SpecialRemote`]
//!   trait it dispatches to

pub mod annex;
pub mod codec;
pub mod driver;
pub mod error;
pub mod message;

pub use annex::{Annex, AnnexConnection, StaticAnnex};
pub use codec::{decode_request, decode_value, encode_reply, escape};
pub use driver::{Driver, SpecialRemote};
pub use error::{ProtocolError, ProtocolResult};
pub use message::{
    extensions, Availability, ConfigSetting, Direction, Reply, Request, PROTOCOL_VERSION,
};
