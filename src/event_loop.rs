//! Single-threaded readiness loop serving every client connection.
//!
//! The listening socket and each connected socket are polled from one task.
//! A readable connection gets exactly one read into a fixed buffer; whatever
//! that read returns is treated as one whole request. There is no framing,
//! so a request split across TCP segments is not reassembled.
//!
//! Responses are written with non-blocking writes only. Whatever the socket
//! does not take at once stays on the connection and is flushed when it
//! becomes writable, so a client that stops reading only stalls itself.

use std::{io, net::SocketAddr};

use futures::{
    future::{BoxFuture, FutureExt},
    stream::FuturesUnordered,
    StreamExt,
};
use tokio::{
    net::{TcpListener, TcpStream, ToSocketAddrs},
    sync::watch,
};
use tracing::{debug, info, warn};

pub const BUFFER_SIZE: usize = 8192;

/// Turns one raw request into one raw response.
pub trait RequestHandler {
    fn handle(&mut self, request: &str) -> String;
}

struct Channel {
    stream: TcpStream,
    peer: SocketAddr,
    /// Response bytes the socket has not taken yet, starting at `sent`.
    outgoing: Vec<u8>,
    sent: usize,
}

impl Channel {
    fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            outgoing: Vec::new(),
            sent: 0,
        }
    }

    fn has_pending_output(&self) -> bool {
        self.sent < self.outgoing.len()
    }
}

type Readiness = BoxFuture<'static, (Channel, io::Result<()>)>;

// A channel still flushing a response waits to be writable and is not read
// from until the response is out.
fn ready(channel: Channel) -> Readiness {
    async move {
        let readiness = if channel.has_pending_output() {
            channel.stream.writable().await
        } else {
            channel.stream.readable().await
        };
        (channel, readiness)
    }
    .boxed()
}

pub struct EventLoop<H> {
    listener: TcpListener,
    handler: H,
    shutdown: watch::Receiver<bool>,
}

impl<H: RequestHandler> EventLoop<H> {
    pub async fn bind(
        addr: impl ToSocketAddrs,
        handler: H,
        shutdown: watch::Receiver<bool>,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            handler,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves connections until `true` is sent on the shutdown channel or
    /// its sender is dropped. Remaining connections are closed on return.
    pub async fn run(mut self) -> io::Result<()> {
        let mut channels: FuturesUnordered<Readiness> = FuturesUnordered::new();
        let mut buffer = vec![0u8; BUFFER_SIZE];
        info!(addr = %self.listener.local_addr()?, "server listening");

        while !*self.shutdown.borrow() {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        info!(%peer, "client connected");
                        channels.push(ready(Channel::new(stream, peer)));
                    }
                    Err(err) => warn!(%err, "could not accept a client connection"),
                },
                Some((channel, readiness)) = channels.next(), if !channels.is_empty() => {
                    match readiness {
                        Ok(()) => {
                            if let Some(channel) = self.serve(channel, &mut buffer) {
                                channels.push(ready(channel));
                            }
                        }
                        Err(err) => {
                            warn!(peer = %channel.peer, %err, "connection failed, disconnecting client");
                        }
                    }
                }
            }
        }

        info!(open = channels.len(), "shutting down server");
        drop(channels);
        info!("server shutdown complete");
        Ok(())
    }

    /// Handles one readiness event without waiting on the socket. Returns
    /// the channel if it should stay registered.
    fn serve(&mut self, channel: Channel, buffer: &mut [u8]) -> Option<Channel> {
        if channel.has_pending_output() {
            flush(channel)
        } else {
            self.read_request(channel, buffer)
        }
    }

    /// One read, one handler call, then as much of the response as the
    /// socket accepts right away.
    fn read_request(&mut self, mut channel: Channel, buffer: &mut [u8]) -> Option<Channel> {
        match channel.stream.try_read(buffer) {
            Ok(0) => {
                info!(peer = %channel.peer, "client disconnected");
                None
            }
            Ok(n) => {
                debug!(peer = %channel.peer, bytes = n, "received request");
                let request = String::from_utf8_lossy(&buffer[..n]);
                channel.outgoing = self.handler.handle(&request).into_bytes();
                channel.sent = 0;
                flush(channel)
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Some(channel),
            Err(err) => {
                warn!(peer = %channel.peer, %err, "reading request failed, disconnecting client");
                None
            }
        }
    }
}

fn flush(mut channel: Channel) -> Option<Channel> {
    if !channel.has_pending_output() {
        return Some(channel);
    }
    match channel.stream.try_write(&channel.outgoing[channel.sent..]) {
        Ok(n) => {
            channel.sent += n;
            if channel.has_pending_output() {
                debug!(
                    peer = %channel.peer,
                    remaining = channel.outgoing.len() - channel.sent,
                    "response partially written"
                );
            } else {
                channel.outgoing = Vec::new();
                channel.sent = 0;
            }
            Some(channel)
        }
        Err(err) if err.kind() == io::ErrorKind::WouldBlock => Some(channel),
        Err(err) => {
            warn!(peer = %channel.peer, %err, "writing response failed, disconnecting client");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        time::{sleep, timeout},
    };

    struct Echo {
        served: usize,
    }

    impl RequestHandler for Echo {
        fn handle(&mut self, request: &str) -> String {
            self.served += 1;
            format!("{}:{}", self.served, request.to_uppercase())
        }
    }

    async fn ask(stream: &mut TcpStream, request: &str) -> String {
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut buffer = vec![0u8; BUFFER_SIZE];
        let n = stream.read(&mut buffer).await.unwrap();
        String::from_utf8_lossy(&buffer[..n]).into_owned()
    }

    #[tokio::test(flavor = "current_thread")]
    async fn serves_interleaved_connections_in_order() {
        let (stop, shutdown) = watch::channel(false);
        let event_loop = EventLoop::bind("127.0.0.1:0", Echo { served: 0 }, shutdown)
            .await
            .unwrap();
        let addr = event_loop.local_addr().unwrap();

        let clients = async move {
            let mut first = TcpStream::connect(addr).await.unwrap();
            let mut second = TcpStream::connect(addr).await.unwrap();

            assert_eq!(ask(&mut first, "a").await, "1:A");
            assert_eq!(ask(&mut second, "b").await, "2:B");
            assert_eq!(ask(&mut first, "c").await, "3:C");

            drop(second);
            assert_eq!(ask(&mut first, "d").await, "4:D");
            stop.send(true).unwrap();
        };

        let (served, ()) = tokio::join!(event_loop.run(), clients);
        served.unwrap();
    }

    #[tokio::test(flavor = "current_thread")]
    async fn stops_when_sender_is_dropped() {
        let (stop, shutdown) = watch::channel(false);
        let event_loop = EventLoop::bind("127.0.0.1:0", Echo { served: 0 }, shutdown)
            .await
            .unwrap();
        drop(stop);

        event_loop.run().await.unwrap();
    }

    #[tokio::test(flavor = "current_thread")]
    async fn closes_connections_on_shutdown() {
        let (stop, shutdown) = watch::channel(false);
        let event_loop = EventLoop::bind("127.0.0.1:0", Echo { served: 0 }, shutdown)
            .await
            .unwrap();
        let addr = event_loop.local_addr().unwrap();

        let client = async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            assert_eq!(ask(&mut stream, "ping").await, "1:PING");
            stop.send(true).unwrap();
            stream
        };

        let (served, mut stream) = tokio::join!(event_loop.run(), client);
        served.unwrap();

        let mut buffer = [0u8; 16];
        let n = stream.read(&mut buffer).await.unwrap_or(0);
        assert_eq!(n, 0);
    }

    struct Flood;

    impl RequestHandler for Flood {
        fn handle(&mut self, request: &str) -> String {
            match request {
                "big" => "x".repeat(64 * 1024 * 1024),
                other => other.to_uppercase(),
            }
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn client_that_never_reads_does_not_stall_others() {
        let (stop, shutdown) = watch::channel(false);
        let event_loop = EventLoop::bind("127.0.0.1:0", Flood, shutdown).await.unwrap();
        let addr = event_loop.local_addr().unwrap();

        let clients = async move {
            let mut stalled = TcpStream::connect(addr).await.unwrap();
            stalled.write_all(b"big").await.unwrap();
            sleep(Duration::from_millis(50)).await;

            let mut other = TcpStream::connect(addr).await.unwrap();
            let reply = timeout(Duration::from_secs(3), ask(&mut other, "hi")).await;
            stop.send(true).unwrap();
            drop(stalled);
            reply
        };

        let (served, reply) = tokio::join!(event_loop.run(), clients);
        served.unwrap();
        assert_eq!(reply.expect("second client was not served"), "HI");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn large_response_arrives_whole() {
        let (stop, shutdown) = watch::channel(false);
        let event_loop = EventLoop::bind("127.0.0.1:0", Flood, shutdown).await.unwrap();
        let addr = event_loop.local_addr().unwrap();

        let client = async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(b"big").await.unwrap();
            let mut received = vec![0u8; 64 * 1024 * 1024];
            stream.read_exact(&mut received).await.unwrap();
            assert!(received.iter().all(|b| *b == b'x'));
            assert_eq!(ask(&mut stream, "after").await, "AFTER");
            stop.send(true).unwrap();
        };

        let (served, ()) = tokio::join!(event_loop.run(), client);
        served.unwrap();
    }

    // Each read is one request, so a request written in two pieces is
    // handled as two separate requests.
    #[tokio::test(flavor = "current_thread")]
    async fn request_split_across_writes_is_handled_per_fragment() {
        let (stop, shutdown) = watch::channel(false);
        let event_loop = EventLoop::bind("127.0.0.1:0", Echo { served: 0 }, shutdown)
            .await
            .unwrap();
        let addr = event_loop.local_addr().unwrap();

        let client = async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(b"hel").await.unwrap();
            stream.flush().await.unwrap();
            sleep(Duration::from_millis(50)).await;
            let mut buffer = vec![0u8; BUFFER_SIZE];
            let n = stream.read(&mut buffer).await.unwrap();
            assert_eq!(&buffer[..n], b"1:HEL");

            assert_eq!(ask(&mut stream, "lo").await, "2:LO");
            stop.send(true).unwrap();
        };

        let (served, ()) = tokio::join!(event_loop.run(), client);
        served.unwrap();
    }
}
