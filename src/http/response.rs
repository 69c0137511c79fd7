//! HTTP/1.1 responses and the sink interface they are written through.
//!
//! A [`Response`] is both a builder (the fluent `header`/`body` methods) and a
//! [`ResponseSink`]: anything that can be written to with headers, a status
//! line, and body chunks. The response cache records handler output through a
//! second sink implementation and replays it onto a real `Response` through
//! the same trait.

use bytes::{BufMut, Bytes, BytesMut};

use super::{Headers, StatusCode};

/// The write side of an HTTP response.
///
/// Writers follow the wire order: headers first, then the status, then any
/// number of body chunks.
pub trait ResponseSink {
    /// Mutable access to the headers that will accompany the response.
    fn headers_mut(&mut self) -> &mut Headers;

    /// Records the response status.
    fn write_status(&mut self, status: StatusCode);

    /// Appends a chunk of body bytes.
    fn write_body(&mut self, chunk: &[u8]);
}

/// An HTTP/1.1 response, ready to be serialized and sent.
///
/// # Examples
///
/// ```
/// use pagecache::http::{Response, StatusCode};
///
/// let mut response = Response::new(StatusCode::Ok)
///     .header("Content-Type", "application/json");
/// response.write(br#"{"status":"#);
/// response.write(br#""ok"}"#);
///
/// let bytes = response.into_bytes();
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.ends_with(r#"{"status":"ok"}"#));
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Bytes,
    keep_alive: bool,
}

impl Response {
    /// Creates a new response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Bytes::new(),
            keep_alive: true,
        }
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Appends a header in-place, for middleware that decorates a downstream response.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    /// Sets the response body from a string, replacing any previous body.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Bytes::from(body.into());
        self
    }

    /// Sets the response body from raw bytes, replacing any previous body.
    /// A `Bytes` body is shared, not copied.
    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Appends `chunk` to the body. Handlers that produce output piecewise can
    /// call this any number of times.
    pub fn write(&mut self, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }
        let mut body = match std::mem::take(&mut self.body).try_into_mut() {
            Ok(unique) => unique,
            Err(shared) => BytesMut::from(&shared[..]),
        };
        body.extend_from_slice(chunk);
        self.body = body.freeze();
    }

    /// Controls whether the `Connection: keep-alive` or `Connection: close` header is written.
    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body_ref(&self) -> &[u8] {
        &self.body
    }

    /// Drains this response into `sink`: every header in order, then the
    /// status, then the body.
    pub fn write_to<S>(self, sink: &mut S)
    where
        S: ResponseSink + ?Sized,
    {
        sink.headers_mut().extend_from(&self.headers);
        sink.write_status(self.status);
        if !self.body.is_empty() {
            sink.write_body(&self.body);
        }
    }

    /// Serializes the response into a `BytesMut` buffer using HTTP/1.1 wire format.
    ///
    /// Automatically adds:
    /// - `Content-Type: text/plain; charset=utf-8` if the body is non-empty and no
    ///   `Content-Type` header was set.
    /// - `Content-Length: <n>` (always written).
    /// - `Connection: keep-alive` or `Connection: close`.
    pub fn into_bytes(mut self) -> BytesMut {
        let content_length = self.body.len();

        if !self.body.is_empty() && !self.headers.contains("content-type") {
            self.headers
                .insert("Content-Type", "text/plain; charset=utf-8");
        }

        // Framing is owned by the serializer, not by whatever a handler set.
        self.headers.remove("content-length");
        self.headers.remove("connection");
        let connection = if self.keep_alive {
            "keep-alive"
        } else {
            "close"
        };
        self.headers.insert("Connection", connection);

        let estimated_size = 128 + self.headers.len() * 64 + content_length;
        let mut buf = BytesMut::with_capacity(estimated_size);

        buf.put(
            format!(
                "HTTP/1.1 {} {}\r\n",
                self.status.as_u16(),
                self.status.canonical_reason()
            )
            .as_bytes(),
        );

        for (name, value) in self.headers.iter() {
            buf.put(format!("{name}: {value}\r\n").as_bytes());
        }
        buf.put(format!("Content-Length: {content_length}\r\n").as_bytes());
        buf.put(&b"\r\n"[..]);

        if !self.body.is_empty() {
            buf.extend_from_slice(&self.body);
        }

        buf
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}

impl ResponseSink for Response {
    fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    fn write_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    fn write_body(&mut self, chunk: &[u8]) {
        self.write(chunk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_string(bytes: BytesMut) -> String {
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn simple_ok_response() {
        let r = Response::new(StatusCode::Ok).body("Hello");
        let s = to_string(r.into_bytes());
        assert!(s.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(s.contains("Content-Length: 5\r\n"));
        assert!(s.ends_with("\r\n\r\nHello"));
    }

    #[test]
    fn no_body_no_content_type() {
        let r = Response::new(StatusCode::NoContent);
        let s = to_string(r.into_bytes());
        assert!(!s.contains("Content-Type"));
        assert!(s.contains("Content-Length: 0\r\n"));
    }

    #[test]
    fn connection_close() {
        let r = Response::new(StatusCode::Ok).keep_alive(false);
        let s = to_string(r.into_bytes());
        assert!(s.contains("Connection: close\r\n"));
        assert!(!s.contains("keep-alive"));
    }

    #[test]
    fn handler_framing_headers_are_replaced() {
        let r = Response::new(StatusCode::Ok)
            .header("Content-Length", "999")
            .body("abc");
        let s = to_string(r.into_bytes());
        assert!(!s.contains("999"));
        assert!(s.contains("Content-Length: 3\r\n"));
    }

    #[test]
    fn chunked_writes_accumulate() {
        let mut r = Response::new(StatusCode::Ok);
        r.write(b"he");
        r.write(b"");
        r.write(b"llo");
        assert_eq!(r.body_ref(), b"hello");
    }

    #[test]
    fn body_bytes_shares_the_buffer() {
        let stored = Bytes::from_static(b"cached page");
        let mut r = Response::default().body_bytes(stored.clone());
        assert_eq!(r.body_ref().as_ptr(), stored.as_ptr());

        // Appending to a shared body leaves the original untouched.
        r.write(b"!");
        assert_eq!(r.body_ref(), b"cached page!");
        assert_eq!(&stored[..], b"cached page");
    }

    #[test]
    fn write_to_copies_everything() {
        let src = Response::new(StatusCode::Created)
            .header("X-A", "1")
            .header("X-A", "2")
            .body("made");
        let mut dst = Response::default();
        src.write_to(&mut dst);
        assert_eq!(dst.status(), StatusCode::Created);
        assert_eq!(dst.headers().get_all("x-a").collect::<Vec<_>>(), vec!["1", "2"]);
        assert_eq!(dst.body_ref(), b"made");
    }
}
