use std::{
    io::{self, ErrorKind},
    net::SocketAddr,
    sync::Arc,
};

use parking_lot::Mutex;
use socket2::{Domain, Protocol, SockRef, Socket as RawSocket, Type};
use tokio::net::UdpSocket as TokioUdpSocket;

use super::{Delivery, Error, Socket, Transport};

/// A single bound datagram socket used for both directions.
///
/// Closing empties the slot, the port is released as soon as no receive
/// or send is in flight anymore.
pub struct UdpSocket {
    socket: Mutex<Option<Arc<TokioUdpSocket>>>,
    remote: Option<SocketAddr>,
}

impl UdpSocket {
    /// Binds the socket, applying the receive buffer size before the bind so
    /// that the kernel sizes the queue up front.
    ///
    /// Must be called inside a tokio runtime.
    pub fn bind(
        listen: SocketAddr,
        remote: Option<SocketAddr>,
        receive_buffer_size: Option<usize>,
    ) -> io::Result<Self> {
        let socket = RawSocket::new(Domain::for_address(listen), Type::DGRAM, Some(Protocol::UDP))?;

        if let Some(size) = receive_buffer_size {
            socket.set_recv_buffer_size(size)?;
        }

        socket.set_nonblocking(true)?;
        socket.bind(&listen.into())?;

        Ok(Self {
            socket: Mutex::new(Some(Arc::new(TokioUdpSocket::from_std(socket.into())?))),
            remote,
        })
    }

    pub fn remote(&self) -> Option<SocketAddr> {
        self.remote
    }

    fn socket(&self) -> io::Result<Arc<TokioUdpSocket>> {
        self.socket
            .lock()
            .clone()
            .ok_or_else(|| ErrorKind::NotConnected.into())
    }
}

impl Socket for UdpSocket {
    async fn recv(&self, buffer: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket()?.recv_from(buffer).await
    }

    async fn send(&self, bytes: &[u8], target: Option<SocketAddr>) -> Result<Delivery, Error> {
        let remote = target.or(self.remote).ok_or(Error::NoTarget)?;
        let socket = self.socket().map_err(|_| Error::TransportClosed)?;
        socket.send_to(bytes, remote).await?;

        Ok(Delivery { remote, dropped: 0 })
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket()?.local_addr()
    }

    fn transport(&self) -> Transport {
        Transport::Udp
    }

    fn set_recv_buffer_size(&self, size: usize) -> io::Result<()> {
        SockRef::from(self.socket()?.as_ref()).set_recv_buffer_size(size)
    }

    fn recv_buffer_size(&self) -> io::Result<usize> {
        SockRef::from(self.socket()?.as_ref()).recv_buffer_size()
    }

    fn close(&self) {
        drop(self.socket.lock().take());
    }
}
