use std::{net::SocketAddr, sync::Arc};

use anyhow::{Result, bail};
use service::{NoImplementationAvailable, Selected, StrategyRegistry};

use crate::connector::{Protocol, Transport};

/// Built-in packet loggers, in the order they are tried.
pub const FALLBACKS: &[&str] = &["log", "null"];

/// One packet crossing a connector.
#[derive(Debug, Clone, Copy)]
pub struct PacketRecord<'a> {
    pub protocol: Protocol,
    pub local: SocketAddr,
    pub remote: SocketAddr,
    pub transport: Transport,
    pub outbound: bool,
    pub bytes: &'a [u8],
}

/// Observer of every packet a connector sends or receives.
///
/// Runs on the packet path, so implementations must return quickly and
/// cannot fail it.
pub trait PacketLogger: Send + Sync {
    fn log(&self, record: &PacketRecord<'_>);
}

/// Writes a trace line per packet through the `log` facade.
pub struct LogPacketLogger;

impl PacketLogger for LogPacketLogger {
    fn log(&self, record: &PacketRecord<'_>) {
        log::trace!(
            "{} packet: protocol={}, local={}, remote={}, transport={}, size={}",
            if record.outbound { "send" } else { "recv" },
            record.protocol.as_str(),
            record.local,
            record.remote,
            record.transport.as_str(),
            record.bytes.len(),
        );
    }
}

pub struct NullPacketLogger;

impl PacketLogger for NullPacketLogger {
    fn log(&self, _: &PacketRecord<'_>) {}
}

/// Every packet logger the binary knows about.
pub fn registry() -> StrategyRegistry<Arc<dyn PacketLogger>> {
    let mut registry = StrategyRegistry::<Arc<dyn PacketLogger>>::default();
    registry
        .register("log", || -> Result<Arc<dyn PacketLogger>> {
            if !log::log_enabled!(log::Level::Trace) {
                bail!("trace level logging is disabled");
            }

            Ok(Arc::new(LogPacketLogger))
        })
        .register("null", || -> Result<Arc<dyn PacketLogger>> {
            Ok(Arc::new(NullPacketLogger))
        });

    registry
}

/// Picks the packet logger, trying `override_name` before the built-in
/// ones.
///
/// # Test
///
/// ```
/// use rtp_transport::logger::select;
///
/// // No logger is installed, so trace output is off and "log" is skipped.
/// let selected = select(Some(" ")).unwrap();
///
/// assert_eq!(selected.name, "null");
/// assert_eq!(selected.failures.len(), 1);
/// assert_eq!(selected.failures[0].name, "log");
/// ```
pub fn select(
    override_name: Option<&str>,
) -> Result<Selected<Arc<dyn PacketLogger>>, NoImplementationAvailable> {
    registry().select(override_name, FALLBACKS)
}
