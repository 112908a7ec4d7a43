//! Message-level view of the transport channel.
//!
//! The pipeline never touches bytes on a socket directly. The InboundPump
//! owns a [`MessageReader`], the OutboundPump owns a [`MessageWriter`], and
//! neither half is shared.

use std::future::Future;
use std::pin::Pin;

use crate::error::Result;
use crate::protocol::WireMessage;

/// Boxed future returned by channel operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Receiving half of the channel.
pub trait MessageReader: Send {
    /// Next message in arrival order.
    ///
    /// `Ok(None)` means the peer half-closed cleanly on a message boundary.
    /// Must be cancel-safe: dropping the future loses no received message.
    fn recv(&mut self) -> BoxFuture<'_, Result<Option<WireMessage>>>;
}

/// Sending half of the channel.
pub trait MessageWriter: Send {
    /// Send one message.
    fn send(&mut self, message: WireMessage) -> BoxFuture<'_, Result<()>>;

    /// Send several messages in order.
    ///
    /// Implementations may coalesce the writes; a failure leaves an unknown
    /// prefix of `messages` on the wire.
    fn send_batch<'a>(&'a mut self, messages: &'a [WireMessage]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            for message in messages {
                self.send(message.clone()).await?;
            }
            Ok(())
        })
    }

    /// Signal end of output to the peer.
    fn half_close(&mut self) -> BoxFuture<'_, Result<()>>;
}

impl<R: MessageReader + ?Sized> MessageReader for Box<R> {
    fn recv(&mut self) -> BoxFuture<'_, Result<Option<WireMessage>>> {
        (**self).recv()
    }
}

impl<W: MessageWriter + ?Sized> MessageWriter for Box<W> {
    fn send(&mut self, message: WireMessage) -> BoxFuture<'_, Result<()>> {
        (**self).send(message)
    }

    fn send_batch<'a>(&'a mut self, messages: &'a [WireMessage]) -> BoxFuture<'a, Result<()>> {
        (**self).send_batch(messages)
    }

    fn half_close(&mut self) -> BoxFuture<'_, Result<()>> {
        (**self).half_close()
    }
}
