use std::{fs::read_to_string, net::SocketAddr, str::FromStr, time::Duration};

use anyhow::Result;
use clap::Parser;
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(
    tag = "transport",
    rename_all = "lowercase",
    rename_all_fields = "kebab-case"
)]
pub enum Interface {
    Udp {
        ///
        /// Local address the socket is bound to, it is used for both sending
        /// and receiving.
        ///
        listen: SocketAddr,
        ///
        /// Default destination for outgoing packets.
        ///
        #[serde(default)]
        remote: Option<SocketAddr>,
        ///
        /// Maximum Transmission Unit (MTU) size for network packets. Larger
        /// datagrams are dropped and counted, never delivered cut short.
        ///
        #[serde(default = "Interface::mtu")]
        mtu: usize,
        ///
        /// Socket receive buffer size (SO_RCVBUF), the system default is kept
        /// when absent.
        ///
        #[serde(default)]
        receive_buffer_size: Option<usize>,
    },
    Tcp {
        ///
        /// Peer the stream socket connects to.
        ///
        remote: SocketAddr,
        ///
        /// Optional local address to connect from.
        ///
        #[serde(default)]
        listen: Option<SocketAddr>,
        #[serde(default = "Interface::mtu")]
        mtu: usize,
        #[serde(default)]
        receive_buffer_size: Option<usize>,
        ///
        /// Number of packets waiting for a slow peer before the oldest ones
        /// are dropped.
        ///
        #[serde(default = "Interface::send_queue")]
        send_queue: usize,
    },
}

impl Interface {
    fn mtu() -> usize {
        1500
    }

    fn send_queue() -> usize {
        256
    }

    fn rtp() -> Self {
        Self::Udp {
            listen: SocketAddr::from(([0, 0, 0, 0], 5004)),
            remote: None,
            mtu: Self::mtu(),
            receive_buffer_size: None,
        }
    }

    fn rtcp() -> Self {
        Self::Udp {
            listen: SocketAddr::from(([0, 0, 0, 0], 5005)),
            remote: None,
            mtu: Self::mtu(),
            receive_buffer_size: None,
        }
    }

    pub fn mtu_size(&self) -> usize {
        match self {
            Self::Udp { mtu, .. } | Self::Tcp { mtu, .. } => *mtu,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct RateLimit {
    ///
    /// Minimum spacing in milliseconds between two reports of the same
    /// recurring fault (dropped packets, socket errors).
    ///
    #[serde(default = "RateLimit::min_backoff")]
    pub min_backoff: u64,
}

impl RateLimit {
    fn min_backoff() -> u64 {
        10_000
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.min_backoff)
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            min_backoff: Self::min_backoff(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Pool {
    ///
    /// Maximum number of idle receive buffers kept per connector.
    ///
    #[serde(default = "Pool::capacity")]
    pub capacity: usize,
}

impl Pool {
    fn capacity() -> usize {
        64
    }
}

impl Default for Pool {
    fn default() -> Self {
        Self {
            capacity: Self::capacity(),
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Strategy {
    ///
    /// Packet logger implementation tried before the built-in ones.
    ///
    #[serde(default)]
    pub packet_logger: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value {
            "trace" => Self::Trace,
            "debug" => Self::Debug,
            "info" => Self::Info,
            "warn" => Self::Warn,
            "error" => Self::Error,
            _ => return Err(format!("unknown log level: {value}")),
        })
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl LogLevel {
    pub fn as_level(&self) -> log::Level {
        match *self {
            Self::Error => log::Level::Error,
            Self::Debug => log::Level::Debug,
            Self::Trace => log::Level::Trace,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Log {
    ///
    /// log level
    ///
    /// An enum representing the available verbosity levels of the logger.
    ///
    #[serde(default)]
    pub level: LogLevel,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default = "Interface::rtp")]
    pub rtp: Interface,
    #[serde(default = "Interface::rtcp")]
    pub rtcp: Interface,
    #[serde(default)]
    pub rate_limit: RateLimit,
    #[serde(default)]
    pub pool: Pool,
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default)]
    pub log: Log,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rtp: Interface::rtp(),
            rtcp: Interface::rtcp(),
            rate_limit: RateLimit::default(),
            pool: Pool::default(),
            strategy: Strategy::default(),
            log: Log::default(),
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
)]
struct Cli {
    ///
    /// Specify the configuration file path
    ///
    /// Example: rtp-transport --config /etc/rtp-transport/config.json5
    ///
    #[arg(long, short)]
    config: Option<String>,
}

impl Config {
    ///
    /// Load configure from config file and command line parameters.
    ///
    /// Load command line parameters, if the configuration file path is specified,
    /// the configuration is read from the configuration file, otherwise the
    /// default configuration is used.
    ///
    pub fn load() -> Result<Self> {
        Ok(match Cli::parse().config {
            Some(path) => Self::from_str(&read_to_string(path)?)?,
            None => Self::default(),
        })
    }
}

impl FromStr for Config {
    type Err = serde_json5::Error;

    /// # Example
    ///
    /// ```
    /// use std::str::FromStr;
    /// use rtp_transport::config::{Config, Interface};
    ///
    /// let config = Config::from_str(r#"{
    ///     rtcp: { transport: "tcp", remote: "127.0.0.1:5005", "send-queue": 8 },
    ///     strategy: { "packet-logger": "null" },
    /// }"#).unwrap();
    ///
    /// assert!(matches!(config.rtp, Interface::Udp { mtu: 1500, .. }));
    /// assert!(matches!(config.rtcp, Interface::Tcp { send_queue: 8, .. }));
    /// assert_eq!(config.strategy.packet_logger.as_deref(), Some("null"));
    /// ```
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        serde_json5::from_str(value)
    }
}
