//! Response body encoding
//!
//! `EncodingWriter` decorates any async byte sink so that written bytes
//! pass through the negotiated compression transform. The writer must be
//! shut down after the last body byte or the compression frame is left
//! unterminated.

use crate::negotiate::Encoding;
use async_compression::tokio::write::{BrotliEncoder, DeflateEncoder, GzipEncoder, ZstdEncoder};
use bytes::Bytes;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// A response sink wrapped in the negotiated compression transform
pub enum EncodingWriter<W: AsyncWrite + Unpin + Send> {
    /// Passthrough
    Identity(W),
    Gzip(GzipEncoder<W>),
    Deflate(DeflateEncoder<W>),
    Brotli(BrotliEncoder<W>),
    Zstd(ZstdEncoder<W>),
}

impl<W: AsyncWrite + Unpin + Send> EncodingWriter<W> {
    /// Wrap `inner` in the transform for `encoding`
    pub fn new(encoding: Encoding, inner: W) -> Self {
        match encoding {
            Encoding::Identity => EncodingWriter::Identity(inner),
            Encoding::Gzip => EncodingWriter::Gzip(GzipEncoder::new(inner)),
            Encoding::Deflate => EncodingWriter::Deflate(DeflateEncoder::new(inner)),
            Encoding::Brotli => EncodingWriter::Brotli(BrotliEncoder::new(inner)),
            Encoding::Zstd => EncodingWriter::Zstd(ZstdEncoder::new(inner)),
        }
    }

    /// Wrap `inner` in the transform named by a raw encoding token.
    ///
    /// Fails on unrecognized tokens rather than silently passing data
    /// through uncompressed.
    pub fn from_token(token: &str, inner: W) -> io::Result<Self> {
        Encoding::from_token(token)
            .map(|encoding| Self::new(encoding, inner))
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("unknown content encoding: {}", token),
                )
            })
    }

    /// Unwrap the sink. Only meaningful after `shutdown`.
    pub fn into_inner(self) -> W {
        match self {
            EncodingWriter::Identity(w) => w,
            EncodingWriter::Gzip(w) => w.into_inner(),
            EncodingWriter::Deflate(w) => w.into_inner(),
            EncodingWriter::Brotli(w) => w.into_inner(),
            EncodingWriter::Zstd(w) => w.into_inner(),
        }
    }
}

impl<W: AsyncWrite + Unpin + Send> AsyncWrite for EncodingWriter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            EncodingWriter::Identity(w) => Pin::new(w).poll_write(cx, buf),
            EncodingWriter::Gzip(w) => Pin::new(w).poll_write(cx, buf),
            EncodingWriter::Deflate(w) => Pin::new(w).poll_write(cx, buf),
            EncodingWriter::Brotli(w) => Pin::new(w).poll_write(cx, buf),
            EncodingWriter::Zstd(w) => Pin::new(w).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            EncodingWriter::Identity(w) => Pin::new(w).poll_flush(cx),
            EncodingWriter::Gzip(w) => Pin::new(w).poll_flush(cx),
            EncodingWriter::Deflate(w) => Pin::new(w).poll_flush(cx),
            EncodingWriter::Brotli(w) => Pin::new(w).poll_flush(cx),
            EncodingWriter::Zstd(w) => Pin::new(w).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            EncodingWriter::Identity(w) => Pin::new(w).poll_shutdown(cx),
            EncodingWriter::Gzip(w) => Pin::new(w).poll_shutdown(cx),
            EncodingWriter::Deflate(w) => Pin::new(w).poll_shutdown(cx),
            EncodingWriter::Brotli(w) => Pin::new(w).poll_shutdown(cx),
            EncodingWriter::Zstd(w) => Pin::new(w).poll_shutdown(cx),
        }
    }
}

/// Run `input` through the transform for `encoding` and collect the
/// result. The writer's close path runs even when the write fails, so
/// the compression frame is always terminated.
pub(crate) async fn encode_body(encoding: Encoding, input: &[u8]) -> io::Result<Bytes> {
    let mut writer = EncodingWriter::new(encoding, Vec::with_capacity(input.len() / 2));
    let written = writer.write_all(input).await;
    let closed = writer.shutdown().await;
    written?;
    closed?;
    Ok(Bytes::from(writer.into_inner()))
}
