//! Response relay back to the client.
//!
//! # Responsibilities
//! - Copy upstream status and headers, minus hop-by-hop headers
//! - Stream the body with a configurable flush cadence
//!
//! # Design Decisions
//! - Streaming responses avoid buffering the entire body
//! - Small upstream frames are coalesced; a flush happens when the buffer
//!   fills, when the body ends, or when buffered bytes have waited one
//!   flush interval

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, Response};
use bytes::{Bytes, BytesMut};
use http_body::{Frame, SizeHint};
use pin_project_lite::pin_project;
use tokio::time::Sleep;

use crate::http::request::strip_hop_by_hop;

/// Buffered bytes that force a flush regardless of the interval.
pub const FLUSH_THRESHOLD: usize = 32 * 1024;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

pin_project! {
    /// Body adapter that coalesces upstream frames and releases them on a
    /// size or time trigger.
    pub struct FlushingBody<B: http_body::Body> {
        #[pin]
        inner: B,
        buffer: BytesMut,
        interval: Option<Duration>,
        deadline: Option<Pin<Box<Sleep>>>,
        trailers: Option<HeaderMap>,
        error: Option<B::Error>,
        done: bool,
    }
}

impl<B: http_body::Body> FlushingBody<B> {
    /// `interval` of `None` flushes only on the size threshold and at the end.
    pub fn new(inner: B, interval: Option<Duration>) -> Self {
        Self {
            inner,
            buffer: BytesMut::new(),
            interval,
            deadline: None,
            trailers: None,
            error: None,
            done: false,
        }
    }
}

impl<B> http_body::Body for FlushingBody<B>
where
    B: http_body::Body<Data = Bytes>,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();
        loop {
            if *this.done {
                if !this.buffer.is_empty() {
                    return Poll::Ready(Some(Ok(Frame::data(this.buffer.split().freeze()))));
                }
                if let Some(err) = this.error.take() {
                    return Poll::Ready(Some(Err(err)));
                }
                if let Some(trailers) = this.trailers.take() {
                    return Poll::Ready(Some(Ok(Frame::trailers(trailers))));
                }
                return Poll::Ready(None);
            }

            match this.inner.as_mut().poll_frame(cx) {
                Poll::Ready(Some(Ok(frame))) => match frame.into_data() {
                    Ok(data) => {
                        this.buffer.extend_from_slice(&data);
                        if this.buffer.len() >= FLUSH_THRESHOLD {
                            *this.deadline = None;
                            return Poll::Ready(Some(Ok(Frame::data(
                                this.buffer.split().freeze(),
                            ))));
                        }
                    }
                    Err(frame) => {
                        // trailers end the body
                        if let Ok(trailers) = frame.into_trailers() {
                            *this.trailers = Some(trailers);
                        }
                        *this.done = true;
                    }
                },
                Poll::Ready(Some(Err(err))) => {
                    *this.error = Some(err);
                    *this.done = true;
                }
                Poll::Ready(None) => *this.done = true,
                Poll::Pending => {
                    let Some(interval) = *this.interval else {
                        return Poll::Pending;
                    };
                    if this.buffer.is_empty() {
                        return Poll::Pending;
                    }
                    let deadline = this
                        .deadline
                        .get_or_insert_with(|| Box::pin(tokio::time::sleep(interval)));
                    if deadline.as_mut().poll(cx).is_pending() {
                        return Poll::Pending;
                    }
                    *this.deadline = None;
                    return Poll::Ready(Some(Ok(Frame::data(this.buffer.split().freeze()))));
                }
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.buffer.is_empty()
            && self.trailers.is_none()
            && self.error.is_none()
            && (self.done || self.inner.is_end_stream())
    }

    fn size_hint(&self) -> SizeHint {
        let buffered = self.buffer.len() as u64;
        if self.done {
            return SizeHint::with_exact(buffered);
        }
        let inner = self.inner.size_hint();
        let mut hint = SizeHint::new();
        if let Some(upper) = inner.upper() {
            hint.set_upper(upper + buffered);
        }
        hint.set_lower(inner.lower() + buffered);
        hint
    }
}

/// Turn an upstream response into the response sent to the client.
pub fn relay<B>(response: Response<B>, flush_interval: Duration) -> Response<Body>
where
    B: http_body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError> + Send,
{
    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    let interval = (!flush_interval.is_zero()).then_some(flush_interval);
    Response::from_parts(parts, Body::new(FlushingBody::new(body, interval)))
}
