use std::{
    io::{self, ErrorKind},
    net::{Shutdown, SocketAddr},
    sync::Arc,
};

use bytes::Bytes;
use socket2::SockRef;
use tokio::net::{TcpSocket as TokioTcpSocket, TcpStream};

use super::{Delivery, Error, Socket, Transport, queue::SendQueue};

/// A connected stream socket.
///
/// Reads happen on the caller's task, one `read` per receive with no
/// framing. Writes are handed to a background task through a bounded
/// [`SendQueue`], so a slow peer never stalls the producer.
pub struct TcpSocket {
    stream: Arc<TcpStream>,
    queue: Arc<SendQueue>,
    local: SocketAddr,
    peer: SocketAddr,
}

impl TcpSocket {
    pub async fn connect(
        remote: SocketAddr,
        listen: Option<SocketAddr>,
        receive_buffer_size: Option<usize>,
        send_queue: usize,
    ) -> io::Result<Self> {
        let socket = if remote.is_ipv4() {
            TokioTcpSocket::new_v4()?
        } else {
            TokioTcpSocket::new_v6()?
        };

        if let Some(size) = receive_buffer_size {
            socket.set_recv_buffer_size(u32::try_from(size).unwrap_or(u32::MAX))?;
        }

        if let Some(listen) = listen {
            socket.bind(listen)?;
        }

        Self::from_stream(socket.connect(remote).await?, send_queue)
    }

    /// Wraps an already connected stream, e.g. one returned by `accept`.
    ///
    /// Must be called inside a tokio runtime, the writer task is spawned
    /// here.
    pub fn from_stream(stream: TcpStream, send_queue: usize) -> io::Result<Self> {
        let local = stream.local_addr()?;
        let peer = stream.peer_addr()?;

        // Disable the Nagle algorithm, media packets should leave as soon
        // as they are queued.
        if let Err(e) = stream.set_nodelay(true) {
            log::error!("tcp socket set nodelay failed!: addr={peer}, err={e}");
        }

        let stream = Arc::new(stream);
        let queue = Arc::new(SendQueue::new(send_queue));

        tokio::spawn(write_loop(stream.clone(), queue.clone(), peer));

        Ok(Self {
            stream,
            queue,
            local,
            peer,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Packets waiting for the writer task.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

async fn write_loop(stream: Arc<TcpStream>, queue: Arc<SendQueue>, peer: SocketAddr) {
    while let Some(bytes) = queue.pop().await {
        if let Err(e) = write_all(&stream, &bytes).await {
            log::warn!("tcp socket write failed: addr={peer}, err={e}");

            queue.close();
            break;
        }
    }

    log::debug!("tcp socket writer stopped: addr={peer}");
}

async fn write_all(stream: &TcpStream, mut bytes: &[u8]) -> io::Result<()> {
    while !bytes.is_empty() {
        stream.writable().await?;

        match stream.try_write(bytes) {
            Ok(0) => return Err(ErrorKind::WriteZero.into()),
            Ok(size) => bytes = &bytes[size..],
            Err(e) if e.kind() == ErrorKind::WouldBlock => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(())
}

impl Socket for TcpSocket {
    async fn recv(&self, buffer: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        loop {
            self.stream.readable().await?;

            match self.stream.try_read(buffer) {
                Ok(size) => return Ok((size, self.peer)),
                Err(e) if e.kind() == ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// The target is ignored, a stream only reaches its peer.
    async fn send(&self, bytes: &[u8], _: Option<SocketAddr>) -> Result<Delivery, Error> {
        if self.queue.is_closed() {
            return Err(Error::TransportClosed);
        }

        Ok(Delivery {
            dropped: self.queue.push(Bytes::copy_from_slice(bytes)),
            remote: self.peer,
        })
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local)
    }

    fn transport(&self) -> Transport {
        Transport::Tcp
    }

    fn set_recv_buffer_size(&self, size: usize) -> io::Result<()> {
        SockRef::from(self.stream.as_ref()).set_recv_buffer_size(size)
    }

    fn recv_buffer_size(&self) -> io::Result<usize> {
        SockRef::from(self.stream.as_ref()).recv_buffer_size()
    }

    fn close(&self) {
        self.queue.close();

        // Wakes a pending read on this side and tells the peer.
        let _ = SockRef::from(self.stream.as_ref()).shutdown(Shutdown::Both);
    }
}

impl Drop for TcpSocket {
    fn drop(&mut self) {
        self.queue.close();
    }
}
