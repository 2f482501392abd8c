use tracing::warn;

use crate::core::transport::Transport;
use crate::proto::codec::decoder::{abandon, Decoder};
use crate::proto::error::Result;
use crate::proto::frame::Frame;

/// Kind of aggregate being streamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateKind {
    /// `*` array.
    Array,
    /// `%` map; keys and values alternate.
    Map,
    /// `~` set.
    Set,
}

/// Forward-only reader over the elements of one aggregate reply.
///
/// Holds the transport exclusively. Each [`next`](FrameStream::next) reads
/// exactly one element. The stream must end in one of three ways:
/// reading every element, [`drain`](FrameStream::drain), or
/// [`close`](FrameStream::close). Dropping it with elements left unread
/// disconnects the transport so later reads cannot pick up stale bytes.
pub struct FrameStream<'a, T: Transport + ?Sized> {
    decoder: Decoder,
    transport: &'a mut T,
    kind: AggregateKind,
    remaining: usize,
}

impl<'a, T: Transport + ?Sized> FrameStream<'a, T> {
    pub(crate) fn new(
        decoder: Decoder,
        transport: &'a mut T,
        kind: AggregateKind,
        remaining: usize,
    ) -> Self {
        Self {
            decoder,
            transport,
            kind,
            remaining,
        }
    }

    /// The kind of aggregate being read.
    pub fn kind(&self) -> AggregateKind {
        self.kind
    }

    /// Number of elements not yet read. For maps this counts keys and
    /// values separately.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Reads the next element, or returns `None` once all were read.
    ///
    /// After an error the stream is finished and the transport is
    /// disconnected.
    pub async fn next(&mut self) -> Option<Result<Frame>> {
        if self.remaining == 0 {
            return None;
        }
        match self.decoder.decode_frame(&mut *self.transport).await {
            Ok(frame) => {
                self.remaining -= 1;
                Some(Ok(frame))
            }
            Err(err) => {
                self.remaining = 0;
                abandon(&mut *self.transport, &err);
                Some(Err(err))
            }
        }
    }

    /// Reads and discards the remaining elements, returning how many were
    /// skipped.
    pub async fn drain(mut self) -> Result<usize> {
        let mut skipped = 0;
        while let Some(item) = self.next().await {
            item?;
            skipped += 1;
        }
        Ok(skipped)
    }

    /// Gives up on the remaining elements by disconnecting the transport.
    pub fn close(mut self) {
        self.remaining = 0;
        self.transport.disconnect();
    }
}

impl<T: Transport + ?Sized> Drop for FrameStream<'_, T> {
    fn drop(&mut self) {
        if self.remaining > 0 {
            warn!(
                endpoint = %self.transport.endpoint(),
                remaining = self.remaining,
                "frame stream dropped before completion, disconnecting"
            );
            self.transport.disconnect();
        }
    }
}
