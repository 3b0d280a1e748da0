use core::fmt::{self, Formatter};
use core::pin::Pin;
use core::task::{Context, Poll};

use futures_util::{Sink as FuturesSink, SinkExt, Stream as FuturesStream, StreamExt};
use libp2p::StreamProtocol;
use tokio::io::{AsyncRead, AsyncWrite, BufStream};
use tokio_util::codec::Framed;

mod codec;

use codec::LineCodec;
pub use codec::CodecError;

pub const MAX_LINE_LENGTH: usize = 64 * 1_024;

pub const LINK_VERSION: &str = "0.0.1";

pub const LINK_PEERS_PROTOCOL: StreamProtocol = StreamProtocol::new("/link/peers/0.0.1");
pub const LINK_HASH_PROTOCOL: StreamProtocol = StreamProtocol::new("/link/hash/0.0.1");
pub const LINK_ADDRESS_PROTOCOL: StreamProtocol = StreamProtocol::new("/link/address/0.0.1");

pub const LINK_PROTOCOLS: [StreamProtocol; 3] = [
    LINK_PEERS_PROTOCOL,
    LINK_HASH_PROTOCOL,
    LINK_ADDRESS_PROTOCOL,
];

/// Anything a [`Stream`] can be layered on top of.
pub trait StreamIo: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> StreamIo for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// A bidirectional stream of newline-delimited records.
pub struct Stream {
    inner: Framed<BufStream<Box<dyn StreamIo>>, LineCodec>,
}

impl Stream {
    #[must_use]
    pub fn new<T: StreamIo>(io: T) -> Self {
        let io: Box<dyn StreamIo> = Box::new(io);
        let stream = BufStream::new(io);
        let stream = Framed::new(stream, LineCodec::new(MAX_LINE_LENGTH));
        Self { inner: stream }
    }

    /// Flushes pending records and closes the write half.
    pub async fn close(&mut self) -> Result<(), CodecError> {
        SinkExt::<&str>::close(&mut self.inner).await
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream").finish_non_exhaustive()
    }
}

impl FuturesStream for Stream {
    type Item = Result<String, CodecError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl<T: AsRef<str>> FuturesSink<T> for Stream {
    type Error = CodecError;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        <Framed<_, _> as SinkExt<T>>::poll_ready_unpin(&mut self.inner, cx)
    }

    fn start_send(mut self: Pin<&mut Self>, item: T) -> Result<(), Self::Error> {
        self.inner.start_send_unpin(item)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        <Framed<_, _> as SinkExt<T>>::poll_flush_unpin(&mut self.inner, cx)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        <Framed<_, _> as SinkExt<T>>::poll_close_unpin(&mut self.inner, cx)
    }
}
