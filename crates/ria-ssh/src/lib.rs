//! SSH access to RIA stores.
//!
//! - [`session`]: connection reuse ([`OpenSshSessions`]) and a local
//!   stand-in ([`LoopbackSessions`])
//! - [`shell`]: the sentinel-framed command protocol over one shell
//! - [`backend`]: [`SshRemoteIo`], the remote-shell implementation of
//!   [`ria_store::IoBackend`]

pub mod backend;
pub mod error;
pub mod quote;
pub mod session;
pub mod shell;

pub use backend::SshRemoteIo;
pub use error::{SshError, SshResult};
pub use quote::{quote_path, sh_quote};
pub use session::{LoopbackSessions, OpenSshSessions, Session, SessionProvider};
pub use shell::{ShellChannel, END_FAIL, END_OK, LOGIN_END};
