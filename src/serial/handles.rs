//! Async handles over blocking port IO.
//!
//! Each connection gets one reader thread and one writer thread. The reader
//! pushes chunks into a channel the read loop awaits; the writer drains a
//! command queue, which is what keeps writes from interleaving.

use std::{
    io::{self, ErrorKind, Read, Write},
    sync::mpsc,
    thread,
};

use tokio::sync::{mpsc as async_mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::{ReadError, WriteError};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

const READ_BUFFER_LEN: usize = 256;
const CHUNK_QUEUE_DEPTH: usize = 64;

type Chunk = io::Result<Vec<u8>>;

/// Exclusive read side of a connection.
pub struct ReadHandle {
    chunks: async_mpsc::Receiver<Chunk>,
    cancel: CancellationToken,
}

/// Unblocks a pending [`ReadHandle::read`] and stops the reader thread.
pub struct ReadCanceller {
    cancel: CancellationToken,
    thread: thread::JoinHandle<()>,
}

impl ReadCanceller {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancel, then block until the reader thread has exited and dropped its
    /// port handle. The thread notices the cancel after its current read
    /// times out, so this can block for one read timeout. Returns false if
    /// the thread panicked.
    pub fn join(self) -> bool {
        self.cancel.cancel();
        self.thread.join().is_ok()
    }
}

impl ReadHandle {
    pub fn spawn(
        mut reader: Box<dyn Read + Send>,
        label: &str,
    ) -> io::Result<(Self, ReadCanceller)> {
        let (chunk_tx, chunk_rx) = async_mpsc::channel::<Chunk>(CHUNK_QUEUE_DEPTH);
        let cancel = CancellationToken::new();
        let thread_cancel = cancel.clone();
        let thread_label = label.to_string();

        let thread = thread::Builder::new()
            .name(format!("serial-read-{label}"))
            .spawn(move || {
                let mut buf = [0u8; READ_BUFFER_LEN];
                while !thread_cancel.is_cancelled() {
                    match reader.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => {
                            if chunk_tx.blocking_send(Ok(buf[..n].to_vec())).is_err() {
                                break;
                            }
                        }
                        Err(err)
                            if matches!(
                                err.kind(),
                                ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                            ) => {}
                        Err(err) => {
                            let _ = chunk_tx.blocking_send(Err(err));
                            break;
                        }
                    }
                }
                log_info!("{thread_label} reader thread exiting");
            })?;

        let canceller = ReadCanceller {
            cancel: cancel.clone(),
            thread,
        };

        Ok((
            Self {
                chunks: chunk_rx,
                cancel,
            },
            canceller,
        ))
    }

    /// Next chunk from the port. `Ok(None)` means end of stream or cancelled.
    pub async fn read(&mut self) -> Result<Option<Vec<u8>>, ReadError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Ok(None),
            chunk = self.chunks.recv() => match chunk {
                Some(Ok(bytes)) => Ok(Some(bytes)),
                Some(Err(err)) => Err(ReadError::Io(err)),
                None => Ok(None),
            },
        }
    }
}

enum WriteCommand {
    Write(Vec<u8>, oneshot::Sender<io::Result<()>>),
    Close(oneshot::Sender<io::Result<()>>),
}

/// Exclusive write side of a connection. Clones share the same writer thread.
#[derive(Clone)]
pub struct WriteHandle {
    sender: mpsc::Sender<WriteCommand>,
}

impl WriteHandle {
    pub fn spawn(writer: Box<dyn Write + Send>, label: &str) -> io::Result<Self> {
        let (command_tx, command_rx) = mpsc::channel::<WriteCommand>();
        let thread_label = label.to_string();

        thread::Builder::new()
            .name(format!("serial-write-{label}"))
            .spawn(move || {
                let mut writer = Some(writer);
                while let Ok(command) = command_rx.recv() {
                    match command {
                        WriteCommand::Write(bytes, reply) => {
                            let result = match writer.as_mut() {
                                Some(w) => w.write_all(&bytes).and_then(|_| w.flush()),
                                None => Err(io::Error::new(ErrorKind::NotConnected, "writer closed")),
                            };
                            if reply.send(result).is_err() {
                                log_error!("{thread_label} write caller dropped before reply");
                            }
                        }
                        WriteCommand::Close(reply) => {
                            let result = match writer.take() {
                                Some(mut w) => w.flush(),
                                None => Ok(()),
                            };
                            let _ = reply.send(result);
                            break;
                        }
                    }
                }
                log_info!("{thread_label} writer thread exiting");
            })?;

        Ok(Self { sender: command_tx })
    }

    pub async fn write(&self, bytes: Vec<u8>) -> Result<(), WriteError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(WriteCommand::Write(bytes, reply_tx))
            .map_err(|_| WriteError::Closed)?;

        reply_rx
            .await
            .map_err(|_| WriteError::Closed)?
            .map_err(WriteError::Io)
    }

    /// Flush pending bytes and release the writer. Later writes fail with
    /// [`WriteError::Closed`].
    pub async fn close(&self) -> io::Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.sender.send(WriteCommand::Close(reply_tx)).is_err() {
            return Ok(());
        }
        reply_rx.await.unwrap_or(Ok(()))
    }
}
