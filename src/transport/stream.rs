//! Channel over any tokio byte stream.
//!
//! ```text
//! OutboundPump ─► StreamWriter ─► write_vectored(header, body, ...) ─► socket
//! socket ─► read() ─► MessageBuffer ─► StreamReader ─► InboundPump
//! ```
//!
//! The writer coalesces a batch of messages into scatter/gather writes and
//! flushes once per batch. Half-close is `AsyncWrite::shutdown`.

use std::collections::VecDeque;
use std::io::IoSlice;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::channel::{BoxFuture, MessageReader, MessageWriter};
use crate::error::{FramewireError, Result};
use crate::protocol::{MessageBuffer, WireMessage, HEADER_SIZE};

/// Default size of the socket read buffer (64 KB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Reads framed messages from an `AsyncRead`.
#[derive(Debug)]
pub struct StreamReader<R> {
    reader: R,
    buffer: MessageBuffer,
    ready: VecDeque<WireMessage>,
    read_buf: Vec<u8>,
    error: Option<FramewireError>,
    eof: bool,
}

impl<R> StreamReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self::with_buffer_size(reader, DEFAULT_READ_BUFFER_SIZE)
    }

    pub fn with_buffer_size(reader: R, size: usize) -> Self {
        Self {
            reader,
            buffer: MessageBuffer::with_capacity(size),
            ready: VecDeque::new(),
            read_buf: vec![0u8; size.max(HEADER_SIZE)],
            error: None,
            eof: false,
        }
    }

    async fn next_message(&mut self) -> Result<Option<WireMessage>> {
        loop {
            if let Some(message) = self.ready.pop_front() {
                return Ok(Some(message));
            }
            // Reported only after every message parsed ahead of it.
            if let Some(err) = self.error.take() {
                self.eof = true;
                return Err(err);
            }
            if self.eof {
                return Ok(None);
            }

            let n = self.reader.read(&mut self.read_buf).await?;
            if n == 0 {
                self.eof = true;
                // Bytes left over mean the peer stopped mid-message.
                self.buffer.finish()?;
                tracing::debug!("Peer half-closed");
                return Ok(None);
            }

            self.buffer.extend(&self.read_buf[..n]);
            loop {
                match self.buffer.next_message() {
                    Ok(Some(message)) => self.ready.push_back(message),
                    Ok(None) => break,
                    Err(e) => {
                        self.error = Some(e);
                        break;
                    }
                }
            }
        }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R> MessageReader for StreamReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    fn recv(&mut self) -> BoxFuture<'_, Result<Option<WireMessage>>> {
        Box::pin(self.next_message())
    }
}

/// A message with its header already encoded.
#[derive(Debug)]
struct OutboundMessage {
    header: [u8; HEADER_SIZE],
    body: Bytes,
}

impl OutboundMessage {
    fn new(message: &WireMessage) -> Self {
        Self {
            header: message.header().encode(),
            body: message.body(),
        }
    }

    #[inline]
    fn size(&self) -> usize {
        HEADER_SIZE + self.body.len()
    }
}

/// Writes framed messages to an `AsyncWrite`.
#[derive(Debug)]
pub struct StreamWriter<W> {
    writer: W,
    closed: bool,
}

impl<W> StreamWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            closed: false,
        }
    }

    async fn write_messages(&mut self, messages: &[WireMessage]) -> Result<()> {
        if self.closed {
            return Err(FramewireError::Channel(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "write after half-close",
            )));
        }
        let batch: Vec<OutboundMessage> = messages.iter().map(OutboundMessage::new).collect();
        write_batch(&mut self.writer, &batch).await
    }

    async fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.writer.shutdown().await?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W> MessageWriter for StreamWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    fn send(&mut self, message: WireMessage) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { self.write_messages(std::slice::from_ref(&message)).await })
    }

    fn send_batch<'a>(&'a mut self, messages: &'a [WireMessage]) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.write_messages(messages))
    }

    fn half_close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.shutdown())
    }
}

/// Write a batch with `write_vectored`, resuming after partial writes.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundMessage]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total_size: usize = batch.iter().map(OutboundMessage::size).sum();
    if total_size == 0 {
        return Ok(());
    }

    let mut total_written = 0;
    while total_written < total_size {
        let slices = remaining_slices(batch, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(FramewireError::Channel(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// IoSlices covering everything after the first `skip_bytes` of the batch.
fn remaining_slices(batch: &[OutboundMessage], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len() * 2);
    let mut offset = 0;

    for message in batch {
        for part in [&message.header[..], &message.body[..]] {
            let end = offset + part.len();
            if !part.is_empty() && skip_bytes < end {
                let start = skip_bytes.saturating_sub(offset);
                slices.push(IoSlice::new(&part[start..]));
            }
            offset = end;
        }
    }

    slices
}
