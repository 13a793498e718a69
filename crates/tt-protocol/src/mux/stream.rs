//! A single multiplexed byte stream

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, Waker};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use super::session::Shared;
use super::{INITIAL_WINDOW, MAX_DATA_CHUNK};
use crate::codec::Frame;
use crate::message::Message;
use crate::stream_id::StreamId;

#[derive(Debug)]
struct StreamState {
    /// Data received but not yet read by the application
    recv_buf: BytesMut,
    /// Bytes read by the application since the last window update
    consumed: u32,
    /// Bytes we may still send before the peer grants more
    send_credit: u32,
    remote_closed: bool,
    local_closed: bool,
    reset: bool,
    read_waker: Option<Waker>,
    write_waker: Option<Waker>,
}

/// Stream state shared between a [`MuxStream`] and the session reader task
#[derive(Debug)]
pub(crate) struct StreamSlot {
    id: StreamId,
    state: Mutex<StreamState>,
}

impl StreamSlot {
    pub(crate) fn new(id: StreamId) -> Self {
        Self {
            id,
            state: Mutex::new(StreamState {
                recv_buf: BytesMut::new(),
                consumed: 0,
                send_credit: INITIAL_WINDOW,
                remote_closed: false,
                local_closed: false,
                reset: false,
                read_waker: None,
                write_waker: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StreamState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue data from the peer.
    ///
    /// Returns false if the peer sent more than the window it was granted.
    pub(crate) fn push_data(&self, data: Bytes) -> bool {
        let waker = {
            let mut st = self.lock();
            if st.reset || st.remote_closed {
                return true;
            }
            if st.recv_buf.len() + data.len() > INITIAL_WINDOW as usize {
                return false;
            }
            st.recv_buf.extend_from_slice(&data);
            st.read_waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }

    pub(crate) fn add_credit(&self, credit: u32) {
        let waker = {
            let mut st = self.lock();
            st.send_credit = st.send_credit.saturating_add(credit);
            st.write_waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    pub(crate) fn remote_close(&self) {
        let waker = {
            let mut st = self.lock();
            st.remote_closed = true;
            st.read_waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    pub(crate) fn reset(&self) {
        let (read_waker, write_waker) = {
            let mut st = self.lock();
            st.reset = true;
            (st.read_waker.take(), st.write_waker.take())
        };
        if let Some(waker) = read_waker {
            waker.wake();
        }
        if let Some(waker) = write_waker {
            waker.wake();
        }
    }
}

fn reset_error() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionReset, "stream reset")
}

/// One logical duplex connection inside a [`Session`](super::Session).
///
/// Reads return buffered data first; once the peer has closed its side they
/// return EOF, and once the stream (or its session) has been reset they fail
/// with `ConnectionReset`. `shutdown` sends a half-close. Dropping a stream
/// that is not closed in both directions resets it.
#[derive(Debug)]
pub struct MuxStream {
    slot: Arc<StreamSlot>,
    session: Arc<Shared>,
}

impl MuxStream {
    pub(crate) fn new(slot: Arc<StreamSlot>, session: Arc<Shared>) -> Self {
        Self { slot, session }
    }

    /// Identifier of this stream within its session
    pub fn id(&self) -> StreamId {
        self.slot.id
    }
}

impl AsyncRead for MuxStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut st = self.slot.lock();

        if !st.recv_buf.is_empty() {
            let n = buf.remaining().min(st.recv_buf.len());
            buf.put_slice(&st.recv_buf.split_to(n));
            st.consumed += n as u32;

            let credit = if st.consumed >= INITIAL_WINDOW / 2 && !st.reset && !st.remote_closed {
                std::mem::take(&mut st.consumed)
            } else {
                0
            };
            drop(st);

            if credit > 0 {
                // A closed session resets this stream; the next read reports it.
                let _ = self
                    .session
                    .send_frame(Frame::new(self.slot.id, Message::WindowUpdate { credit }));
            }
            return Poll::Ready(Ok(()));
        }

        if st.remote_closed {
            return Poll::Ready(Ok(()));
        }
        if st.reset {
            return Poll::Ready(Err(reset_error()));
        }

        st.read_waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl AsyncWrite for MuxStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        let mut st = self.slot.lock();
        if st.reset {
            return Poll::Ready(Err(reset_error()));
        }
        if st.local_closed {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "stream closed for writing",
            )));
        }
        if st.send_credit == 0 {
            st.write_waker = Some(cx.waker().clone());
            return Poll::Pending;
        }

        let n = buf.len().min(st.send_credit as usize).min(MAX_DATA_CHUNK);
        st.send_credit -= n as u32;
        drop(st);

        let frame = Frame::new(
            self.slot.id,
            Message::Data(Bytes::copy_from_slice(&buf[..n])),
        );
        match self.session.send_frame(frame) {
            Ok(()) => Poll::Ready(Ok(n)),
            Err(_) => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "session closed",
            ))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let send_close = {
            let mut st = self.slot.lock();
            let send = !st.local_closed && !st.reset;
            st.local_closed = true;
            send
        };
        if send_close {
            let _ = self
                .session
                .send_frame(Frame::new(self.slot.id, Message::Close));
        }
        Poll::Ready(Ok(()))
    }
}

impl Drop for MuxStream {
    fn drop(&mut self) {
        let send_reset = {
            let mut st = self.slot.lock();
            let send = !st.reset && !(st.local_closed && st.remote_closed);
            st.reset = true;
            send
        };
        self.session.remove_stream(self.slot.id);
        if send_reset {
            let _ = self
                .session
                .send_frame(Frame::new(self.slot.id, Message::Reset));
        }
    }
}
