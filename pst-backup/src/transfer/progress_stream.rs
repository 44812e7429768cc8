//! Byte-counting stream wrapper for request bodies.

use bytes::Bytes;
use futures_util::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};

use super::bandwidth::SentCounter;

/// Piece size used when a chunk buffer is turned into a body stream. Small
/// enough for the bandwidth sampler to see steady movement within a chunk.
const BODY_PIECE: usize = 64 * 1024;

/// Stream wrapper that adds every yielded buffer to a [`SentCounter`]
pub struct ProgressStream<S> {
    inner: S,
    bytes_transferred: u64,
    counter: SentCounter,
}

impl<S> ProgressStream<S>
where
    S: Stream<Item = Result<Bytes, std::io::Error>>,
{
    pub fn new(inner: S, counter: SentCounter) -> Self {
        Self {
            inner,
            bytes_transferred: 0,
            counter,
        }
    }

    /// Bytes yielded by this stream so far
    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }
}

impl<S> Stream for ProgressStream<S>
where
    S: Stream<Item = Result<Bytes, std::io::Error>> + Unpin,
{
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let inner = Pin::new(&mut self.inner);

        match inner.poll_next(cx) {
            Poll::Ready(Some(Ok(bytes))) => {
                let piece = bytes.len() as u64;
                self.bytes_transferred += piece;
                self.counter.add(piece);
                Poll::Ready(Some(Ok(bytes)))
            }
            other => other,
        }
    }
}

/// Split an in-memory buffer into a counting body stream.
pub fn counted_body(
    data: Bytes,
    counter: SentCounter,
) -> ProgressStream<futures_util::stream::Iter<std::vec::IntoIter<Result<Bytes, std::io::Error>>>> {
    let mut pieces = Vec::with_capacity(data.len() / BODY_PIECE + 1);
    let mut offset = 0;
    while offset < data.len() {
        let end = (offset + BODY_PIECE).min(data.len());
        pieces.push(Ok(data.slice(offset..end)));
        offset = end;
    }
    ProgressStream::new(futures_util::stream::iter(pieces), counter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_counted_body_reports_every_byte() {
        let counter = SentCounter::new();
        let data = Bytes::from(vec![7u8; BODY_PIECE * 2 + 10]);

        let mut stream = counted_body(data.clone(), counter.clone());
        let mut collected = Vec::new();
        while let Some(piece) = stream.next().await {
            collected.extend_from_slice(&piece.unwrap());
        }

        assert_eq!(collected.len(), data.len());
        assert_eq!(stream.bytes_transferred(), data.len() as u64);
        assert_eq!(counter.get(), data.len() as u64);
    }

    #[tokio::test]
    async fn test_empty_body() {
        let counter = SentCounter::new();
        let mut stream = counted_body(Bytes::new(), counter.clone());
        assert!(stream.next().await.is_none());
        assert_eq!(counter.get(), 0);
    }
}
