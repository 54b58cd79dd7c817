// src/stream.rs - The /stream response body: a bounded per-listener sink
// drained into the HTTP connection.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes};
use rocket::http::{ContentType, Header, Status};
use rocket::response::{self, Responder, Response};
use rocket::tokio::io::{AsyncRead, ReadBuf};
use rocket::Request;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::station::RadioStation;

/// Responder for `GET /stream`. Attaches a listener sink on response build
/// and streams MP3 chunks until the client goes away.
pub struct ListenerStream {
    station: Arc<RadioStation>,
}

impl ListenerStream {
    pub fn new(station: Arc<RadioStation>) -> Self {
        Self { station }
    }
}

impl<'r> Responder<'r, 'static> for ListenerStream {
    fn respond_to(self, _request: &'r Request) -> response::Result<'static> {
        let (id, rx) = self.station.attach_listener();

        Ok(Response::build()
            .header(ContentType::new("audio", "mpeg"))
            .header(Header::new("Cache-Control", "no-cache"))
            .header(Header::new("Connection", "keep-alive"))
            .status(Status::Ok)
            .streamed_body(SinkBody {
                station: self.station,
                id,
                rx,
                pending: Bytes::new(),
            })
            .finalize())
    }
}

/// The body owns the sink; dropping it (client disconnect or write failure)
/// detaches the listener, so the broadcaster never holds a reference to a
/// dead connection.
struct SinkBody {
    station: Arc<RadioStation>,
    id: Uuid,
    rx: mpsc::Receiver<Bytes>,
    pending: Bytes,
}

impl AsyncRead for SinkBody {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        loop {
            if !this.pending.is_empty() {
                let n = std::cmp::min(this.pending.len(), buf.remaining());
                buf.put_slice(&this.pending[..n]);
                this.pending.advance(n);
                return Poll::Ready(Ok(()));
            }
            match this.rx.poll_recv(cx) {
                Poll::Ready(Some(chunk)) => this.pending = chunk,
                // Broadcaster gone: end the stream cleanly.
                Poll::Ready(None) => return Poll::Ready(Ok(())),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl Drop for SinkBody {
    fn drop(&mut self) {
        self.station.detach_listener(&self.id);
    }
}
