use std::{
    io,
    net::SocketAddr,
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::{Result, ensure};
use codec::FeedbackMessage;
use parking_lot::Mutex;
use rtp_transport::{
    config::Config,
    connector::{
        Connector, Delivery, Error, Protocol, Socket, TcpSocket, Transport, TransportConnector,
        UdpSocket,
    },
    logger::{PacketLogger, PacketRecord},
};
use service::BufferPool;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    time::{sleep, timeout},
};

const RTP: [u8; 16] = [
    0x80, 0x60, 0x00, 0x01, 0x00, 0x00, 0x00, 0xa0, 0x12, 0x34, 0x56, 0x78, 1, 2, 3, 4,
];

const WAIT: Duration = Duration::from_secs(5);

fn loopback() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 0))
}

fn udp(protocol: Protocol, remote: Option<SocketAddr>) -> Result<Connector<UdpSocket>> {
    Ok(Connector::new(
        UdpSocket::bind(loopback(), remote, None)?,
        protocol,
        BufferPool::new(1500, 8),
    )?)
}

#[derive(Default)]
struct Recorder(Mutex<Vec<(bool, SocketAddr, usize)>>);

impl PacketLogger for Recorder {
    fn log(&self, record: &PacketRecord<'_>) {
        self.0
            .lock()
            .push((record.outbound, record.remote, record.bytes.len()));
    }
}

/// A socket that reports its packets itself.
struct Instrumented(UdpSocket);

impl Socket for Instrumented {
    async fn recv(&self, buffer: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.0.recv(buffer).await
    }

    async fn send(&self, bytes: &[u8], target: Option<SocketAddr>) -> Result<Delivery, Error> {
        self.0.send(bytes, target).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.0.local_addr()
    }

    fn transport(&self) -> Transport {
        self.0.transport()
    }

    fn set_recv_buffer_size(&self, size: usize) -> io::Result<()> {
        self.0.set_recv_buffer_size(size)
    }

    fn recv_buffer_size(&self) -> io::Result<usize> {
        self.0.recv_buffer_size()
    }

    fn logs_packets(&self) -> bool {
        true
    }

    fn close(&self) {
        self.0.close()
    }
}

/// A socket whose every receive fails.
struct Broken {
    local: SocketAddr,
    receives: AtomicUsize,
}

impl Socket for Broken {
    async fn recv(&self, _: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.receives.fetch_add(1, Ordering::Relaxed);
        Err(io::ErrorKind::ConnectionReset.into())
    }

    async fn send(&self, _: &[u8], _: Option<SocketAddr>) -> Result<Delivery, Error> {
        Err(Error::NoTarget)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local)
    }

    fn transport(&self) -> Transport {
        Transport::Udp
    }

    fn set_recv_buffer_size(&self, _: usize) -> io::Result<()> {
        Ok(())
    }

    fn recv_buffer_size(&self) -> io::Result<usize> {
        Ok(0)
    }

    fn close(&self) {}
}

#[tokio::test]
async fn test_udp_send_and_receive() -> Result<()> {
    let receiver = udp(Protocol::Rtp, None)?;
    let sender = udp(Protocol::Rtp, Some(receiver.local_addr()))?;

    sender.send(&RTP, None).await?;

    let received = timeout(WAIT, receiver.receive()).await??;
    ensure!(&received.view[..] == &RTP[..]);
    ensure!(received.source == sender.local_addr());
    ensure!(!received.view.is_invalid());

    receiver.recycle(received);

    let counts = receiver.statistics();
    ensure!(counts.received_pkts == 1);
    ensure!(counts.received_bytes == RTP.len());
    ensure!(sender.statistics().send_pkts == 1);

    Ok(())
}

#[tokio::test]
async fn test_udp_send_without_target() -> Result<()> {
    let connector = udp(Protocol::Rtp, None)?;

    ensure!(matches!(connector.send(&RTP, None).await, Err(Error::NoTarget)));
    ensure!(connector.statistics().send_pkts == 0);

    Ok(())
}

#[tokio::test]
async fn test_close_unblocks_receive() -> Result<()> {
    let connector = Arc::new(udp(Protocol::Rtp, None)?);
    let handle = connector.close_handle();

    let pending = {
        let connector = connector.clone();
        tokio::spawn(async move { connector.receive().await.map(|it| it.source) })
    };

    sleep(Duration::from_millis(50)).await;
    handle.close();

    ensure!(matches!(timeout(WAIT, pending).await??, Err(Error::TransportClosed)));
    ensure!(matches!(connector.receive().await, Err(Error::TransportClosed)));
    ensure!(matches!(connector.send(&RTP, Some(loopback())).await, Err(Error::TransportClosed)));

    Ok(())
}

#[tokio::test]
async fn test_filter_drops_other_protocol() -> Result<()> {
    let receiver = udp(Protocol::Rtp, None)?.with_filter(Duration::from_secs(10));
    let sender = udp(Protocol::Rtcp, Some(receiver.local_addr()))?;

    sender.send(&FeedbackMessage::pli(1, 2).to_bytes(), None).await?;
    sender.send(&[0x00, 0x01], None).await?;
    sender.send(&RTP, None).await?;

    let received = timeout(WAIT, receiver.receive()).await??;
    ensure!(&received.view[..] == &RTP[..]);
    receiver.recycle(received);

    let counts = receiver.statistics();
    ensure!(counts.rejected_pkts == 2);
    ensure!(counts.received_pkts == 1);

    let stats = receiver.filter().map(|it| it.stats()).unwrap_or_default();
    ensure!(stats.mismatched == 1);
    ensure!(stats.rejected == 1);

    Ok(())
}

#[tokio::test]
async fn test_packet_logging_hook() -> Result<()> {
    let recorder = Arc::new(Recorder::default());

    let receiver = udp(Protocol::Rtp, None)?.with_logger(recorder.clone());
    let sender = udp(Protocol::Rtp, None)?.with_logger(recorder.clone());

    sender.send(&RTP, Some(receiver.local_addr())).await?;
    let received = timeout(WAIT, receiver.receive()).await??;
    receiver.recycle(received);

    ensure!(
        *recorder.0.lock()
            == vec![
                (true, receiver.local_addr(), RTP.len()),
                (false, sender.local_addr(), RTP.len()),
            ]
    );

    Ok(())
}

#[tokio::test]
async fn test_packet_logging_skipped_when_socket_logs() -> Result<()> {
    let recorder = Arc::new(Recorder::default());
    let target = udp(Protocol::Rtp, None)?;

    let connector = Connector::new(
        Instrumented(UdpSocket::bind(loopback(), Some(target.local_addr()), None)?),
        Protocol::Rtp,
        BufferPool::new(1500, 8),
    )?
    .with_logger(recorder.clone());

    connector.send(&RTP, None).await?;

    ensure!(recorder.0.lock().is_empty());
    ensure!(connector.statistics().send_pkts == 1);

    Ok(())
}

#[tokio::test]
async fn test_receive_buffer_size() -> Result<()> {
    let receiver = udp(Protocol::Rtp, None)?;
    let sender = udp(Protocol::Rtp, Some(receiver.local_addr()))?;

    receiver.set_receive_buffer_size(64 * 1024)?;
    ensure!(receiver.socket().recv_buffer_size()? > 0);

    sender.send(&RTP, None).await?;
    let received = timeout(WAIT, receiver.receive()).await??;
    receiver.recycle(received);

    ensure!(matches!(
        receiver.set_receive_buffer_size(128 * 1024),
        Err(Error::AlreadyReceiving)
    ));

    Ok(())
}

#[tokio::test]
async fn test_tcp_stream() -> Result<()> {
    let listener = TcpListener::bind(loopback()).await?;
    let (socket, accepted) = tokio::join!(
        TcpSocket::connect(listener.local_addr()?, None, None, 4),
        listener.accept()
    );

    let connector = Connector::new(socket?, Protocol::Rtp, BufferPool::new(1500, 8))?;
    let (mut peer, _) = accepted?;

    ensure!(connector.transport() == Transport::Tcp);

    peer.write_all(&RTP).await?;
    let received = timeout(WAIT, connector.receive()).await??;
    ensure!(&received.view[..] == &RTP[..]);
    connector.recycle(received);

    connector.send(&RTP, None).await?;
    let mut buffer = [0u8; RTP.len()];
    timeout(WAIT, peer.read_exact(&mut buffer)).await??;
    ensure!(buffer == RTP);

    // The peer going away is terminal.
    drop(peer);
    ensure!(matches!(timeout(WAIT, connector.receive()).await?, Err(Error::TransportClosed)));
    ensure!(matches!(connector.receive().await, Err(Error::TransportClosed)));
    ensure!(matches!(connector.send(&RTP, None).await, Err(Error::TransportClosed)));

    let counts = connector.statistics();
    ensure!(counts.received_pkts == 1);
    ensure!(counts.send_pkts == 1);

    Ok(())
}

#[tokio::test]
async fn test_transport_connector_from_config() -> Result<()> {
    let config = Config::from_str(
        r#"{
            rtp: { transport: "udp", listen: "127.0.0.1:0" },
            rtcp: { transport: "udp", listen: "127.0.0.1:0", mtu: 512 },
            "rate-limit": { "min-backoff": 1000 },
        }"#,
    )?;

    let transport = TransportConnector::bind(&config, None).await?;
    ensure!(transport.rtp.protocol() == Protocol::Rtp);
    ensure!(transport.rtcp.protocol() == Protocol::Rtcp);

    // RTCP through the RTP port is filtered out, RTP goes through.
    let rtcp = transport.rtcp.local_addr();
    let rtp = transport.rtp.local_addr();

    transport.rtcp.send(&FeedbackMessage::fir(1, 2, 3).to_bytes(), Some(rtp)).await?;
    transport.rtcp.send(&RTP, Some(rtp)).await?;
    transport.rtp.send(&FeedbackMessage::pli(1, 2).to_bytes(), Some(rtcp)).await?;

    let received = timeout(WAIT, transport.rtp.receive()).await??;
    ensure!(&received.view[..] == &RTP[..]);
    transport.rtp.recycle(received);

    let received = timeout(WAIT, transport.rtcp.receive()).await??;
    ensure!(FeedbackMessage::decode(&received.view) == Some(FeedbackMessage::pli(1, 2)));
    ensure!(received.view.capacity() == 513);
    transport.rtcp.recycle(received);

    ensure!(transport.rtp.statistics().rejected_pkts == 1);

    transport.close();
    ensure!(transport.rtp.is_closed());
    ensure!(matches!(transport.rtcp.receive().await, Err(Error::TransportClosed)));

    Ok(())
}

#[tokio::test]
async fn test_receive_error_is_terminal() -> Result<()> {
    let connector = Connector::new(
        Broken {
            local: SocketAddr::from(([127, 0, 0, 1], 5004)),
            receives: AtomicUsize::new(0),
        },
        Protocol::Rtp,
        BufferPool::new(1500, 8),
    )?;

    ensure!(matches!(timeout(WAIT, connector.receive()).await?, Err(Error::TransportClosed)));
    ensure!(connector.is_closed());

    for _ in 0..3 {
        ensure!(matches!(connector.receive().await, Err(Error::TransportClosed)));
    }

    // The socket was asked once, later calls fail without touching it.
    ensure!(connector.socket().receives.load(Ordering::Relaxed) == 1);
    ensure!(connector.statistics().received_pkts == 0);

    Ok(())
}

#[tokio::test]
async fn test_udp_close_releases_port() -> Result<()> {
    let connector = udp(Protocol::Rtp, None)?;
    let addr = connector.local_addr();

    connector.close();
    ensure!(connector.is_closed());
    ensure!(UdpSocket::bind(addr, None, None)?.local_addr()? == addr);
    ensure!(matches!(connector.send(&RTP, Some(addr)).await, Err(Error::TransportClosed)));

    // Closed from another task while a receive is pending.
    let connector = Arc::new(udp(Protocol::Rtp, None)?);
    let addr = connector.local_addr();

    let pending = {
        let connector = connector.clone();
        tokio::spawn(async move { connector.receive().await.map(|it| it.source) })
    };

    sleep(Duration::from_millis(50)).await;
    connector.close_handle().close();

    ensure!(matches!(timeout(WAIT, pending).await??, Err(Error::TransportClosed)));
    ensure!(UdpSocket::bind(addr, None, None)?.local_addr()? == addr);

    Ok(())
}

#[tokio::test]
async fn test_oversized_datagram_is_dropped() -> Result<()> {
    // Room for datagrams of up to 32 bytes.
    let receiver = Connector::new(
        UdpSocket::bind(loopback(), None, None)?,
        Protocol::Rtp,
        BufferPool::new(33, 8),
    )?;

    let sender = udp(Protocol::Rtp, Some(receiver.local_addr()))?;

    let mut oversized = RTP.to_vec();
    oversized.resize(64, 0);
    sender.send(&oversized, None).await?;

    let mut largest = RTP.to_vec();
    largest.resize(32, 0);
    sender.send(&largest, None).await?;

    let received = timeout(WAIT, receiver.receive()).await??;
    ensure!(&received.view[..] == &largest[..]);
    receiver.recycle(received);

    let counts = receiver.statistics();
    ensure!(counts.truncated_pkts == 1);
    ensure!(counts.received_pkts == 1);

    Ok(())
}
