//! Segment byte streams and the transforms applied to them after download.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use futures::stream::{BoxStream, StreamExt};
use tokio::io::{AsyncRead, ReadBuf};
use tokio_util::sync::CancellationToken;

use crate::error::{CoreError, Result};

/// A boxed stream of segment byte chunks.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Wraps a segment stream in another stream with the same item contract.
///
/// Transforms compose: each one receives the output of the previous one.
pub trait StreamTransform: Send + Sync {
    fn apply(&self, input: ByteStream, content_type: &str) -> ByteStream;
}

impl<F> StreamTransform for F
where
    F: Fn(ByteStream, &str) -> ByteStream + Send + Sync,
{
    fn apply(&self, input: ByteStream, content_type: &str) -> ByteStream {
        self(input, content_type)
    }
}

/// Apply `transforms` left to right: `out = tN(...(t2(t1(input))))`.
pub fn apply_transforms(
    mut input: ByteStream,
    content_type: &str,
    transforms: &[Arc<dyn StreamTransform>],
) -> ByteStream {
    for transform in transforms {
        input = transform.apply(input, content_type);
    }
    input
}

/// End `input` with [`CoreError::Cancelled`] as soon as `cancel` fires.
pub fn cancellable(input: ByteStream, cancel: CancellationToken) -> ByteStream {
    futures::stream::unfold(Some((input, cancel)), |state| async move {
        let Some((mut input, cancel)) = state else {
            return None;
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Some((Err(CoreError::Cancelled), None)),
            item = input.next() => match item {
                Some(Ok(chunk)) => Some((Ok(chunk), Some((input, cancel)))),
                Some(Err(e)) => Some((Err(e), None)),
                None => None,
            },
        }
    })
    .boxed()
}

/// Exposes a [`ByteStream`] as [`AsyncRead`], serving reads of any size.
///
/// A stream error is terminal: it is returned by the read that hits it and by
/// every read after it, never followed by EOF.
pub struct StreamReader {
    stream: Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>,
    current_chunk: Option<Bytes>,
    position: usize,
    failed: Option<(std::io::ErrorKind, String)>,
}

fn io_error_kind(e: &CoreError) -> std::io::ErrorKind {
    match e {
        CoreError::Decode(_) => std::io::ErrorKind::InvalidData,
        // Not `Interrupted`: readers retry on that kind.
        CoreError::Cancelled => std::io::ErrorKind::ConnectionAborted,
        _ => std::io::ErrorKind::Other,
    }
}

impl StreamReader {
    pub fn new(stream: impl Stream<Item = Result<Bytes>> + Send + 'static) -> Self {
        Self {
            stream: Box::pin(stream),
            current_chunk: None,
            position: 0,
            failed: None,
        }
    }
}

impl AsyncRead for StreamReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        if let Some((kind, message)) = &self.failed {
            return Poll::Ready(Err(std::io::Error::new(*kind, message.clone())));
        }

        loop {
            if let Some(chunk) = &self.current_chunk {
                if self.position < chunk.len() {
                    let n = std::cmp::min(buf.remaining(), chunk.len() - self.position);
                    buf.put_slice(&chunk[self.position..self.position + n]);
                    self.position += n;
                    return Poll::Ready(Ok(()));
                }
                self.current_chunk = None;
                self.position = 0;
            }

            match self.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    self.current_chunk = Some(chunk);
                    self.position = 0;
                }
                Poll::Ready(Some(Err(e))) => {
                    let kind = io_error_kind(&e);
                    self.failed = Some((kind, e.to_string()));
                    return Poll::Ready(Err(std::io::Error::new(kind, e)));
                }
                Poll::Ready(None) => return Poll::Ready(Ok(())),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
