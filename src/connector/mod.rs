pub mod queue;
pub mod tcp;
pub mod udp;

use std::{
    io,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use codec::{PacketClassifier, PacketView};
use service::{BufferPool, ClassifierFilter, PooledBuffer, RateLimiter};
use tokio::sync::watch;

use crate::{
    config::{Config, Interface},
    logger::{PacketLogger, PacketRecord},
    statistics::{Counts, Statistics, Stats},
};

pub use self::{tcp::TcpSocket, udp::UdpSocket};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Udp,
    Tcp,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
        }
    }
}

/// Which half of a media session a connector carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Rtp,
    Rtcp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rtp => "rtp",
            Self::Rtcp => "rtcp",
        }
    }

    pub fn classifier(&self) -> PacketClassifier {
        match self {
            Self::Rtp => PacketClassifier::rtp(),
            Self::Rtcp => PacketClassifier::rtcp(),
        }
    }
}

#[derive(Debug)]
pub enum Error {
    InvalidArgument(codec::Error),
    /// Terminal, every later receive fails the same way.
    TransportClosed,
    /// The receive buffer size can only change before the first receive.
    AlreadyReceiving,
    /// A datagram send without a target and without a configured remote.
    NoTarget,
    Io(io::Error),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidArgument(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument(e) => write!(f, "invalid argument: {e}"),
            Self::TransportClosed => write!(f, "transport closed"),
            Self::AlreadyReceiving => write!(f, "receive already started"),
            Self::NoTarget => write!(f, "no target address"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<codec::Error> for Error {
    fn from(value: codec::Error) -> Self {
        Self::InvalidArgument(value)
    }
}

/// Where an outgoing packet went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub remote: SocketAddr,
    /// Queued packets discarded to make room for this one.
    pub dropped: usize,
}

pub trait Socket: Send + Sync + 'static {
    /// One OS level receive, returning the size and the sender.
    fn recv(
        &self,
        buffer: &mut [u8],
    ) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send;

    fn send(
        &self,
        bytes: &[u8],
        target: Option<SocketAddr>,
    ) -> impl Future<Output = Result<Delivery, Error>> + Send;

    fn local_addr(&self) -> io::Result<SocketAddr>;
    fn transport(&self) -> Transport;
    fn set_recv_buffer_size(&self, size: usize) -> io::Result<()>;
    fn recv_buffer_size(&self) -> io::Result<usize>;

    /// Whether the socket already reports its packets to a logger at a
    /// lower layer, in which case the connector does not log them again.
    fn logs_packets(&self) -> bool {
        false
    }

    fn close(&self);
}

/// Either kind of socket, as chosen by configuration.
pub enum AnySocket {
    Udp(UdpSocket),
    Tcp(TcpSocket),
}

impl AnySocket {
    pub async fn bind(interface: &Interface) -> io::Result<Self> {
        Ok(match interface {
            Interface::Udp {
                listen,
                remote,
                receive_buffer_size,
                ..
            } => Self::Udp(UdpSocket::bind(*listen, *remote, *receive_buffer_size)?),
            Interface::Tcp {
                remote,
                listen,
                receive_buffer_size,
                send_queue,
                ..
            } => Self::Tcp(
                TcpSocket::connect(*remote, *listen, *receive_buffer_size, *send_queue).await?,
            ),
        })
    }
}

impl Socket for AnySocket {
    async fn recv(&self, buffer: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        match self {
            Self::Udp(it) => it.recv(buffer).await,
            Self::Tcp(it) => it.recv(buffer).await,
        }
    }

    async fn send(&self, bytes: &[u8], target: Option<SocketAddr>) -> Result<Delivery, Error> {
        match self {
            Self::Udp(it) => it.send(bytes, target).await,
            Self::Tcp(it) => it.send(bytes, target).await,
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        match self {
            Self::Udp(it) => it.local_addr(),
            Self::Tcp(it) => it.local_addr(),
        }
    }

    fn transport(&self) -> Transport {
        match self {
            Self::Udp(it) => it.transport(),
            Self::Tcp(it) => it.transport(),
        }
    }

    fn set_recv_buffer_size(&self, size: usize) -> io::Result<()> {
        match self {
            Self::Udp(it) => it.set_recv_buffer_size(size),
            Self::Tcp(it) => it.set_recv_buffer_size(size),
        }
    }

    fn recv_buffer_size(&self) -> io::Result<usize> {
        match self {
            Self::Udp(it) => it.recv_buffer_size(),
            Self::Tcp(it) => it.recv_buffer_size(),
        }
    }

    fn logs_packets(&self) -> bool {
        match self {
            Self::Udp(it) => it.logs_packets(),
            Self::Tcp(it) => it.logs_packets(),
        }
    }

    fn close(&self) {
        match self {
            Self::Udp(it) => it.close(),
            Self::Tcp(it) => it.close(),
        }
    }
}

/// A packet handed out by [`Connector::receive`].
///
/// The view borrows a pooled buffer, give it back with
/// [`Connector::recycle`] once the packet has been consumed.
#[derive(Debug)]
pub struct Received {
    pub view: PacketView<PooledBuffer>,
    pub source: SocketAddr,
}

/// Closes a connector from any task.
#[derive(Clone)]
pub struct CloseHandle(Arc<watch::Sender<bool>>);

impl CloseHandle {
    pub fn close(&self) {
        self.0.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.0.borrow()
    }
}

async fn wait_closed(receiver: &mut watch::Receiver<bool>) {
    // An error means the sender is gone, which is a close as well.
    let _ = receiver.wait_for(|closed| *closed).await;
}

/// One direction pair of a media stream over a single socket.
pub struct Connector<S> {
    socket: S,
    protocol: Protocol,
    local_addr: SocketAddr,
    filter: Option<ClassifierFilter>,
    logger: Option<Arc<dyn PacketLogger>>,
    limiter: RateLimiter,
    pool: BufferPool,
    statistics: Statistics,
    receiving: AtomicBool,
    released: AtomicBool,
    closed: CloseHandle,
}

impl<S: Socket> Connector<S> {
    /// For datagram sockets the pool buffers must be one byte larger than
    /// the largest datagram to accept, a datagram filling a whole buffer is
    /// dropped as truncated.
    pub fn new(socket: S, protocol: Protocol, pool: BufferPool) -> Result<Self, Error> {
        Ok(Self {
            local_addr: socket.local_addr()?,
            closed: CloseHandle(Arc::new(watch::Sender::new(false))),
            limiter: RateLimiter::default(),
            statistics: Statistics::default(),
            receiving: AtomicBool::new(false),
            released: AtomicBool::new(false),
            filter: None,
            logger: None,
            protocol,
            socket,
            pool,
        })
    }

    /// Drops every packet that does not classify as this connector's
    /// protocol.
    pub fn with_filter(mut self, min_backoff: Duration) -> Self {
        self.filter = Some(ClassifierFilter::with_limiter(
            self.protocol.classifier(),
            RateLimiter::new(min_backoff),
        ));

        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn PacketLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Spacing between two reports of a receive failure.
    pub fn with_backoff(mut self, min_backoff: Duration) -> Self {
        self.limiter = RateLimiter::new(min_backoff);
        self
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn transport(&self) -> Transport {
        self.socket.transport()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn socket(&self) -> &S {
        &self.socket
    }

    pub fn filter(&self) -> Option<&ClassifierFilter> {
        self.filter.as_ref()
    }

    pub fn close_handle(&self) -> CloseHandle {
        self.closed.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_closed()
    }

    pub fn statistics(&self) -> Counts<usize> {
        self.statistics.get()
    }

    /// Changes SO_RCVBUF, only allowed before the first receive.
    pub fn set_receive_buffer_size(&self, size: usize) -> Result<(), Error> {
        if self.receiving.load(Ordering::Acquire) {
            return Err(Error::AlreadyReceiving);
        }

        Ok(self.socket.set_recv_buffer_size(size)?)
    }

    /// Waits for the next packet of this connector's protocol.
    ///
    /// Filtered packets are counted and skipped. A TCP read of zero bytes,
    /// any socket error or a close from another task ends the connector
    /// with [`Error::TransportClosed`].
    pub async fn receive(&self) -> Result<Received, Error> {
        let mut closed = self.closed.0.subscribe();
        self.receiving.store(true, Ordering::Release);

        loop {
            if *closed.borrow() {
                self.close();
                return Err(Error::TransportClosed);
            }

            let mut buffer = self.pool.acquire();
            let result = tokio::select! {
                ret = self.socket.recv(buffer.as_mut()) => Some(ret),
                _ = wait_closed(&mut closed) => None,
            };

            let (size, source) = match result {
                Some(Ok((0, source))) if self.socket.transport() == Transport::Tcp => {
                    log::info!(
                        "{} transport closed by peer: addr={source}, interface={}",
                        self.protocol.as_str(),
                        self.local_addr
                    );

                    self.pool.recycle(buffer);
                    self.close();
                    return Err(Error::TransportClosed);
                }
                Some(Ok(it)) => it,
                Some(Err(e)) => {
                    if self.limiter.should_run() {
                        log::error!(
                            "{} receive failed: interface={}, transport={}, err={e}",
                            self.protocol.as_str(),
                            self.local_addr,
                            self.socket.transport().as_str()
                        );
                    }

                    self.pool.recycle(buffer);
                    self.close();
                    return Err(Error::TransportClosed);
                }
                None => {
                    self.pool.recycle(buffer);
                    self.close();
                    return Err(Error::TransportClosed);
                }
            };

            // A datagram that fills the whole buffer may have been cut by
            // the kernel, the pool buffers are one byte larger than the
            // largest datagram accepted.
            if self.socket.transport() == Transport::Udp && size >= self.pool.buffer_size() {
                self.statistics.report(&[Stats::TruncatedPkts(1)]);
                self.pool.recycle(buffer);

                if self.limiter.should_run() {
                    log::warn!(
                        "{} datagram exceeds mtu, dropped: addr={source}, mtu={}, truncated={}",
                        self.protocol.as_str(),
                        self.pool.buffer_size().saturating_sub(1),
                        self.statistics.get().truncated_pkts
                    );
                }

                continue;
            }

            let view = PacketView::new(buffer, 0, size)?;
            if let Some(filter) = &self.filter
                && !filter.accept(&view)
            {
                self.statistics.report(&[Stats::RejectedPkts(1)]);
                self.pool.recycle(view.into_inner());
                continue;
            }

            self.statistics
                .report(&[Stats::ReceivedBytes(size), Stats::ReceivedPkts(1)]);
            self.log_packet(source, false, &view);

            return Ok(Received { view, source });
        }
    }

    /// Sends one packet. Datagram sockets go to `target`, or to the
    /// configured remote when it is `None`; streams always go to the peer.
    pub async fn send(&self, bytes: &[u8], target: Option<SocketAddr>) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::TransportClosed);
        }

        let delivery = self.socket.send(bytes, target).await?;
        self.statistics
            .report(&[Stats::SendBytes(bytes.len()), Stats::SendPkts(1)]);

        if delivery.dropped > 0 {
            self.statistics.report(&[Stats::DroppedPkts(delivery.dropped)]);

            if self.limiter.should_run() {
                log::warn!(
                    "{} send queue overflow: addr={}, dropped={}",
                    self.protocol.as_str(),
                    delivery.remote,
                    self.statistics.get().dropped_pkts
                );
            }
        }

        self.log_packet(delivery.remote, true, bytes);
        Ok(())
    }

    /// Returns a received packet's buffer to the pool.
    pub fn recycle(&self, received: Received) {
        self.pool.recycle(received.view.into_inner());
    }

    /// Closes the socket and the buffer pool, views still held by callers
    /// report themselves invalid afterwards.
    pub fn close(&self) {
        self.closed.close();

        // The handle may have been closed from elsewhere already, the
        // resources are released once either way.
        if !self.released.swap(true, Ordering::AcqRel) {
            self.socket.close();
            self.pool.close();

            log::info!(
                "{} connector closed: interface={}, transport={}",
                self.protocol.as_str(),
                self.local_addr,
                self.socket.transport().as_str()
            );
        }
    }

    fn log_packet(&self, remote: SocketAddr, outbound: bool, bytes: &[u8]) {
        if let Some(logger) = &self.logger
            && !self.socket.logs_packets()
        {
            logger.log(&PacketRecord {
                protocol: self.protocol,
                local: self.local_addr,
                transport: self.socket.transport(),
                remote,
                outbound,
                bytes,
            });
        }
    }
}

impl Connector<AnySocket> {
    /// Opens the configured socket with a filter for `protocol` and a
    /// buffer pool sized to hold one byte more than the interface MTU.
    pub async fn bind(
        protocol: Protocol,
        interface: &Interface,
        config: &Config,
        logger: Option<Arc<dyn PacketLogger>>,
    ) -> Result<Self, Error> {
        let socket = AnySocket::bind(interface).await?;
        let pool = BufferPool::new(interface.mtu_size() + 1, config.pool.capacity);
        let backoff = config.rate_limit.as_duration();

        let mut connector = Self::new(socket, protocol, pool)?
            .with_filter(backoff)
            .with_backoff(backoff);

        if let Some(logger) = logger {
            connector = connector.with_logger(logger);
        }

        log::info!(
            "{} connector ready: interface={}, transport={}, mtu={}",
            protocol.as_str(),
            connector.local_addr(),
            connector.transport().as_str(),
            interface.mtu_size()
        );

        Ok(connector)
    }
}

/// The RTP and RTCP connectors of one media session.
pub struct TransportConnector<S = AnySocket> {
    pub rtp: Connector<S>,
    pub rtcp: Connector<S>,
}

impl TransportConnector<AnySocket> {
    /// Binds both streams as configured.
    pub async fn bind(config: &Config, logger: Option<Arc<dyn PacketLogger>>) -> Result<Self, Error> {
        Ok(Self {
            rtp: Connector::bind(Protocol::Rtp, &config.rtp, config, logger.clone()).await?,
            rtcp: Connector::bind(Protocol::Rtcp, &config.rtcp, config, logger).await?,
        })
    }
}

impl<S: Socket> TransportConnector<S> {
    pub fn close(&self) {
        self.rtp.close();
        self.rtcp.close();
    }
}
