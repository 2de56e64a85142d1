// Connection stream guard
// Sits between the socket and hyper: request heads are checked before hyper
// sees them, and writes that stay blocked too long fail the connection.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{ready, Context, Poll, Waker};
use std::time::Duration;

use hyper::{StatusCode, Uri};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::Sleep;

use crate::http::{self, isolation};
use crate::logger;

/// Largest request head accepted before answering 431
pub const MAX_HEAD_BYTES: usize = 64 * 1024;

/// Most header fields accepted in one request head
const MAX_HEADERS: usize = 100;

const READ_CHUNK: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Waiting for the next request head
    Head,
    /// Handing over a checked head and its body, this many bytes left
    Forward(u64),
    /// Chunked request: framing is left to hyper from here on
    Passthrough,
    /// Writing our own error response, this many bytes already sent
    Reject(usize),
    /// Rejection sent, reads report end of stream
    Closed,
}

/// Outcome of looking at the bytes buffered for the next request head
#[derive(Debug, PartialEq, Eq)]
enum HeadCheck {
    /// Not a full head yet
    Partial,
    /// Complete and acceptable; the mode to continue in
    Complete(Mode),
    /// Unacceptable; the status to answer with
    Invalid(StatusCode, &'static str),
}

/// Timer for a write that cannot make progress
struct WriteStall {
    limit: Option<Duration>,
    timer: Option<Pin<Box<Sleep>>>,
}

impl WriteStall {
    const fn new(limit: Option<Duration>) -> Self {
        Self { limit, timer: None }
    }

    /// Called when a write returned `Pending`; fails once the limit is hit
    fn check(&mut self, cx: &mut Context<'_>) -> io::Result<()> {
        let Some(limit) = self.limit else {
            return Ok(());
        };
        let timer = self
            .timer
            .get_or_insert_with(|| Box::pin(tokio::time::sleep(limit)));
        if timer.as_mut().poll(cx).is_ready() {
            self.timer = None;
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("client stopped reading for {} seconds", limit.as_secs()),
            ));
        }
        Ok(())
    }

    fn progressed(&mut self) {
        self.timer = None;
    }
}

/// Stream wrapper handed to hyper in place of the raw socket.
///
/// hyper answers request heads it cannot parse on its own, without going
/// through the request handler. The guard parses each head first and answers
/// malformed ones itself with a complete error response, so those carry the
/// same headers as every other response. Accepted heads and their bodies are
/// passed through unchanged.
pub struct GuardedStream<S> {
    inner: S,
    peer_addr: SocketAddr,
    server_name: String,
    mode: Mode,
    /// Bytes read from the socket, not yet handed to hyper
    pending: Vec<u8>,
    rejection: Vec<u8>,
    stall: WriteStall,
    /// hyper has output the socket did not take yet
    write_blocked: bool,
    /// Read parked until `write_blocked` clears
    parked_reader: Option<Waker>,
}

impl<S> GuardedStream<S> {
    pub fn new(
        inner: S,
        peer_addr: SocketAddr,
        server_name: String,
        write_stall: Option<Duration>,
    ) -> Self {
        Self {
            inner,
            peer_addr,
            server_name,
            mode: Mode::Head,
            pending: Vec::new(),
            rejection: Vec::new(),
            stall: WriteStall::new(write_stall),
            write_blocked: false,
            parked_reader: None,
        }
    }

    fn reject(&mut self, status: StatusCode, message: &'static str) {
        logger::log_warning(&format!(
            "Rejected request from {}: {} ({message})",
            self.peer_addr,
            status.as_u16()
        ));
        self.rejection = rejection_bytes(status, message, &self.server_name);
        self.pending.clear();
        self.mode = Mode::Reject(0);
    }

    /// Copy buffered bytes into `dst`, at most `limit`
    fn hand_over(&mut self, dst: &mut ReadBuf<'_>, limit: u64) -> usize {
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let n = self.pending.len().min(dst.remaining()).min(limit);
        dst.put_slice(&self.pending[..n]);
        self.pending.drain(..n);
        n
    }

    fn write_done(&mut self) {
        self.stall.progressed();
        self.write_blocked = false;
        if let Some(waker) = self.parked_reader.take() {
            waker.wake();
        }
    }
}

impl<S: AsyncRead + Unpin> GuardedStream<S> {
    /// Read more from the socket into `pending`; `0` means end of stream
    fn poll_fill(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<usize>> {
        let mut chunk = [0u8; READ_CHUNK];
        let mut buf = ReadBuf::new(&mut chunk);
        ready!(Pin::new(&mut self.inner).poll_read(cx, &mut buf))?;
        self.pending.extend_from_slice(buf.filled());
        Poll::Ready(Ok(buf.filled().len()))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncRead for GuardedStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        dst: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            match this.mode {
                Mode::Head => match check_head(&this.pending) {
                    HeadCheck::Complete(next) => this.mode = next,
                    HeadCheck::Invalid(status, message) => this.reject(status, message),
                    HeadCheck::Partial if this.pending.len() > MAX_HEAD_BYTES => {
                        this.reject(
                            StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
                            "Request header too large",
                        );
                    }
                    HeadCheck::Partial => {
                        // A head cut short by the peer closing is dropped silently
                        if ready!(this.poll_fill(cx))? == 0 {
                            return Poll::Ready(Ok(()));
                        }
                    }
                },
                Mode::Forward(0) => this.mode = Mode::Head,
                Mode::Forward(remaining) => {
                    if this.pending.is_empty() && ready!(this.poll_fill(cx))? == 0 {
                        return Poll::Ready(Ok(()));
                    }
                    let n = this.hand_over(dst, remaining);
                    this.mode = Mode::Forward(remaining - n as u64);
                    return Poll::Ready(Ok(()));
                }
                Mode::Passthrough => {
                    if this.pending.is_empty() {
                        return Pin::new(&mut this.inner).poll_read(cx, dst);
                    }
                    this.hand_over(dst, u64::MAX);
                    return Poll::Ready(Ok(()));
                }
                Mode::Reject(written) => {
                    // hyper's previous response has to leave the socket first
                    if this.write_blocked {
                        this.parked_reader = Some(cx.waker().clone());
                        return Poll::Pending;
                    }
                    if written == this.rejection.len() {
                        ready!(Pin::new(&mut this.inner).poll_flush(cx))?;
                        this.mode = Mode::Closed;
                        continue;
                    }
                    match Pin::new(&mut this.inner).poll_write(cx, &this.rejection[written..]) {
                        Poll::Ready(Ok(0)) => {
                            this.mode = Mode::Closed;
                            return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
                        }
                        Poll::Ready(Ok(n)) => {
                            this.stall.progressed();
                            this.mode = Mode::Reject(written + n);
                        }
                        Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                        Poll::Pending => {
                            this.stall.check(cx)?;
                            return Poll::Pending;
                        }
                    }
                }
                Mode::Closed => return Poll::Ready(Ok(())),
            }
        }
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for GuardedStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_write(cx, buf) {
            Poll::Pending => {
                this.write_blocked = true;
                this.stall.check(cx)?;
                Poll::Pending
            }
            ready => {
                this.write_done();
                ready
            }
        }
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_write_vectored(cx, bufs) {
            Poll::Pending => {
                this.write_blocked = true;
                this.stall.check(cx)?;
                Poll::Pending
            }
            ready => {
                this.write_done();
                ready
            }
        }
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_flush(cx) {
            Poll::Pending => {
                this.write_blocked = true;
                this.stall.check(cx)?;
                Poll::Pending
            }
            ready => {
                this.write_done();
                ready
            }
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

/// Parse the request head at the start of `buf`, if it is all there
fn check_head(buf: &[u8]) -> HeadCheck {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);
    let head_len = match req.parse(buf) {
        Ok(httparse::Status::Complete(len)) => len,
        Ok(httparse::Status::Partial) => return HeadCheck::Partial,
        Err(httparse::Error::Version) => {
            return HeadCheck::Invalid(
                StatusCode::HTTP_VERSION_NOT_SUPPORTED,
                "Invalid HTTP version",
            );
        }
        Err(httparse::Error::TooManyHeaders) => {
            return HeadCheck::Invalid(
                StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
                "Too many headers",
            );
        }
        Err(_) => return HeadCheck::Invalid(StatusCode::BAD_REQUEST, "Bad request syntax"),
    };

    // Targets hyper would refuse to turn into a URI
    if !req.path.is_some_and(|target| target.parse::<Uri>().is_ok()) {
        return HeadCheck::Invalid(StatusCode::BAD_REQUEST, "Bad request target");
    }

    let mut content_length: Option<u64> = None;
    for header in req.headers.iter() {
        if header.name.eq_ignore_ascii_case("transfer-encoding") {
            return HeadCheck::Complete(Mode::Passthrough);
        }
        if header.name.eq_ignore_ascii_case("content-length") {
            let parsed = std::str::from_utf8(header.value)
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok());
            match (parsed, content_length) {
                (Some(len), None) => content_length = Some(len),
                (Some(len), Some(seen)) if len == seen => {}
                _ => {
                    return HeadCheck::Invalid(StatusCode::BAD_REQUEST, "Bad Content-Length");
                }
            }
        }
    }

    HeadCheck::Complete(Mode::Forward(
        head_len as u64 + content_length.unwrap_or_default(),
    ))
}

/// Full wire form of the error response for a rejected head
fn rejection_bytes(status: StatusCode, message: &str, server_name: &str) -> Vec<u8> {
    // Body left out here and appended below; Content-Length still counts it
    let mut response = http::build_error_response(status, message, true);
    http::apply_base_headers(&mut response, server_name, Some("close"));
    isolation::apply(&mut response);

    let mut out = format!(
        "HTTP/1.1 {} {}\r\n",
        status.as_str(),
        status.canonical_reason().unwrap_or("Error")
    )
    .into_bytes();
    for (name, value) in response.headers() {
        out.extend_from_slice(name.as_str().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(http::render_error_page(status, message).as_bytes());
    out
}
