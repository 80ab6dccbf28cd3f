use std::fmt;
use std::io::{BufRead, Write};
use std::path::Path;

use tracing::{debug, warn};

use crate::annex::{Annex, AnnexConnection};
use crate::codec::decode_request;
use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{extensions, Availability, ConfigSetting, Direction, Reply, Request, PROTOCOL_VERSION};

/// A special remote, as driven by [`Driver`].
///
/// Every operation receives the host so it can query configuration or send
/// notices while it runs. Errors are reported to the host as the failure
/// form of the respective reply.
pub trait SpecialRemote {
    type Error: fmt::Display;

    fn init_remote(&mut self, annex: &mut dyn Annex) -> Result<(), Self::Error>;

    fn prepare(&mut self, annex: &mut dyn Annex) -> Result<(), Self::Error>;

    fn transfer_store(
        &mut self,
        annex: &mut dyn Annex,
        key: &str,
        file: &Path,
    ) -> Result<(), Self::Error>;

    fn transfer_retrieve(
        &mut self,
        annex: &mut dyn Annex,
        key: &str,
        file: &Path,
    ) -> Result<(), Self::Error>;

    fn check_present(&mut self, annex: &mut dyn Annex, key: &str) -> Result<bool, Self::Error>;

    fn remove(&mut self, annex: &mut dyn Annex, key: &str) -> Result<(), Self::Error>;

    /// Relative cost of using this remote. An error makes the host fall
    /// back to its default.
    fn cost(&mut self, annex: &mut dyn Annex) -> Result<u32, Self::Error>;

    fn availability(&mut self, annex: &mut dyn Annex) -> Result<Availability, Self::Error>;

    /// Human-readable location of `key`, if there is one to report.
    fn where_is(&mut self, annex: &mut dyn Annex, key: &str) -> Result<Option<String>, Self::Error>;

    /// Settings accepted by `initremote`/`enableremote`.
    fn list_configs(&self) -> Vec<ConfigSetting>;

    /// Field/value pairs describing the active configuration.
    fn info(&mut self, annex: &mut dyn Annex) -> Result<Vec<(String, String)>, Self::Error>;
}

/// Runs the request/reply loop between a host and a [`SpecialRemote`].
pub struct Driver<R, W> {
    conn: AnnexConnection<R, W>,
}

impl<R: BufRead, W: Write> Driver<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            conn: AnnexConnection::new(reader, writer),
        }
    }

    /// Announce the protocol version and serve requests until the host
    /// closes the stream.
    ///
    /// Returns an error if the host sends `ERROR`, or the stream breaks.
    pub fn run<S: SpecialRemote>(&mut self, remote: &mut S) -> ProtocolResult<()> {
        self.conn.send(&Reply::Version(PROTOCOL_VERSION))?;
        while let Some(line) = self.conn.read_line()? {
            if line.is_empty() {
                continue;
            }
            let request = match decode_request(&line) {
                Ok(request) => request,
                Err(err) => {
                    warn!(error = %err, "cannot parse request");
                    self.conn.send(&Reply::Error(err.to_string()))?;
                    return Err(err);
                }
            };
            debug!(request = request.type_name(), "handling request");
            if let Request::Error(msg) = request {
                return Err(ProtocolError::Host(msg));
            }
            self.handle(remote, request)?;
        }
        debug!("host closed the connection");
        Ok(())
    }

    pub fn into_inner(self) -> (R, W) {
        self.conn.into_inner()
    }

    fn handle<S: SpecialRemote>(&mut self, remote: &mut S, request: Request) -> ProtocolResult<()> {
        let annex = &mut self.conn;
        match request {
            Request::Extensions(exts) => {
                annex.set_host_extensions(exts);
                annex.send(&Reply::Extensions(vec![extensions::INFO.to_string()]))
            }
            Request::InitRemote => {
                let reply = match remote.init_remote(annex) {
                    Ok(()) => Reply::InitRemoteSuccess,
                    Err(err) => Reply::InitRemoteFailure(err.to_string()),
                };
                annex.send(&reply)
            }
            Request::Prepare => {
                let reply = match remote.prepare(annex) {
                    Ok(()) => Reply::PrepareSuccess,
                    Err(err) => Reply::PrepareFailure(err.to_string()),
                };
                annex.send(&reply)
            }
            Request::Transfer {
                direction,
                key,
                file,
            } => {
                let result = match direction {
                    Direction::Store => remote.transfer_store(annex, &key, Path::new(&file)),
                    Direction::Retrieve => remote.transfer_retrieve(annex, &key, Path::new(&file)),
                };
                let reply = match result {
                    Ok(()) => Reply::TransferSuccess { direction, key },
                    Err(err) => Reply::TransferFailure {
                        direction,
                        key,
                        message: err.to_string(),
                    },
                };
                annex.send(&reply)
            }
            Request::CheckPresent(key) => {
                let reply = match remote.check_present(annex, &key) {
                    Ok(true) => Reply::CheckPresentSuccess(key),
                    Ok(false) => Reply::CheckPresentFailure(key),
                    Err(err) => Reply::CheckPresentUnknown {
                        key,
                        message: err.to_string(),
                    },
                };
                annex.send(&reply)
            }
            Request::Remove(key) => {
                let reply = match remote.remove(annex, &key) {
                    Ok(()) => Reply::RemoveSuccess(key),
                    Err(err) => Reply::RemoveFailure {
                        key,
                        message: err.to_string(),
                    },
                };
                annex.send(&reply)
            }
            Request::GetCost => {
                let reply = match remote.cost(annex) {
                    Ok(cost) => Reply::Cost(cost),
                    Err(err) => {
                        debug!(error = %err, "no cost to report");
                        Reply::UnsupportedRequest
                    }
                };
                annex.send(&reply)
            }
            Request::GetAvailability => {
                let reply = match remote.availability(annex) {
                    Ok(availability) => Reply::Availability(availability),
                    Err(err) => {
                        debug!(error = %err, "no availability to report");
                        Reply::UnsupportedRequest
                    }
                };
                annex.send(&reply)
            }
            Request::WhereIs(key) => {
                let reply = match remote.where_is(annex, &key) {
                    Ok(Some(location)) => Reply::WhereIsSuccess(location),
                    Ok(None) => Reply::WhereIsFailure,
                    Err(err) => {
                        debug!(error = %err, "whereis failed");
                        Reply::WhereIsFailure
                    }
                };
                annex.send(&reply)
            }
            Request::ListConfigs => {
                for setting in remote.list_configs() {
                    annex.send(&Reply::Config {
                        name: setting.name,
                        description: setting.description,
                    })?;
                }
                annex.send(&Reply::ConfigEnd)
            }
            Request::GetInfo => {
                match remote.info(annex) {
                    Ok(fields) => {
                        for (field, value) in fields {
                            annex.send(&Reply::InfoField(field))?;
                            annex.send(&Reply::InfoValue(value))?;
                        }
                    }
                    Err(err) => debug!(error = %err, "no info to report"),
                }
                annex.send(&Reply::InfoEnd)
            }
            Request::Unsupported(verb) => {
                debug!(verb, "unsupported request");
                annex.send(&Reply::UnsupportedRequest)
            }
            Request::Error(msg) => Err(ProtocolError::Host(msg)),
        }
    }
}
