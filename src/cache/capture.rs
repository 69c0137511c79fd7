use bytes::{BufMut, Bytes, BytesMut};

use super::CacheError;
use crate::http::{Headers, Response, ResponseSink, StatusCode};

/// A [`ResponseSink`] that records instead of sending.
///
/// The first status written sticks. Writing body bytes before any status
/// locks in `200 OK`, and a recorder that never saw a status reports `200`.
/// Body chunks are concatenated in order.
///
/// ```
/// use pagecache::cache::ResponseRecorder;
/// use pagecache::http::{ResponseSink, StatusCode};
///
/// let mut recorder = ResponseRecorder::new();
/// recorder.headers_mut().insert("Content-Type", "text/html");
/// recorder.write_body(b"<h1>");
/// recorder.write_body(b"hi</h1>");
/// recorder.write_status(StatusCode::NotFound); // too late, 200 already sent
///
/// let captured = recorder.finish();
/// assert_eq!(captured.status(), StatusCode::Ok);
/// assert_eq!(&captured.body()[..], b"<h1>hi</h1>");
/// ```
#[derive(Debug, Default)]
pub struct ResponseRecorder {
    status: Option<StatusCode>,
    headers: Headers,
    body: BytesMut,
}

impl ResponseRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::Ok)
    }

    pub fn finish(self) -> CapturedResponse {
        CapturedResponse {
            status: self.status(),
            headers: self.headers,
            body: self.body.freeze(),
        }
    }
}

impl ResponseSink for ResponseRecorder {
    fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    fn write_status(&mut self, status: StatusCode) {
        self.status.get_or_insert(status);
    }

    fn write_body(&mut self, chunk: &[u8]) {
        self.status.get_or_insert(StatusCode::Ok);
        self.body.extend_from_slice(chunk);
    }
}

/// Everything a handler produced for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedResponse {
    status: StatusCode,
    headers: Headers,
    body: Bytes,
}

impl CapturedResponse {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Writes this response onto `sink`: headers, then status, then body.
    pub fn replay<S>(&self, sink: &mut S)
    where
        S: ResponseSink + ?Sized,
    {
        sink.headers_mut().extend_from(&self.headers);
        sink.write_status(self.status);
        if !self.body.is_empty() {
            sink.write_body(&self.body);
        }
    }

    pub fn into_response(self) -> Response {
        let mut response = Response::default();
        self.replay(&mut response);
        response
    }

    /// Serializes status, headers, and body as an HTTP/1.1 response message.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64 + self.headers.len() * 48 + self.body.len());
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
        buf.put(&b"\r\n"[..]);
        buf.put(&self.body[..]);
        buf.freeze()
    }

    /// Parses a payload produced by [`encode`](Self::encode).
    ///
    /// # Errors
    ///
    /// - [`CacheError::MalformedPayload`]: not a valid HTTP/1.1 response head.
    /// - [`CacheError::IncompletePayload`]: the head is cut short.
    /// - [`CacheError::UnknownStatus`]: a status code [`StatusCode`] does not model.
    pub fn decode(payload: &Bytes) -> Result<Self, CacheError> {
        let mut slots = vec![httparse::EMPTY_HEADER; header_lines(payload)];
        let mut parsed = httparse::Response::new(&mut slots);

        let body_offset = match parsed.parse(payload)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(CacheError::IncompletePayload),
        };

        let code = parsed.code.ok_or(CacheError::IncompletePayload)?;
        let status = StatusCode::from_u16(code).ok_or(CacheError::UnknownStatus(code))?;

        let mut headers = Headers::with_capacity(parsed.headers.len());
        for header in parsed.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                headers.insert(header.name, value);
            }
        }

        Ok(Self {
            status,
            headers,
            body: payload.slice(body_offset..),
        })
    }
}

// Upper bound on the header count of an encoded payload: the number of line
// breaks before the blank line that ends the head.
fn header_lines(payload: &[u8]) -> usize {
    let head_end = payload
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .unwrap_or(payload.len());
    payload[..head_end]
        .windows(2)
        .filter(|w| *w == b"\r\n")
        .count()
        + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CapturedResponse {
        let mut recorder = ResponseRecorder::new();
        Response::new(StatusCode::Created)
            .header("Content-Type", "text/html")
            .header("Set-Cookie", "a=1")
            .header("Set-Cookie", "b=2")
            .body("<p>made</p>")
            .write_to(&mut recorder);
        recorder.finish()
    }

    #[test]
    fn recorder_defaults_to_200() {
        let captured = ResponseRecorder::new().finish();
        assert_eq!(captured.status(), StatusCode::Ok);
        assert!(captured.headers().is_empty());
        assert!(captured.body().is_empty());
    }

    #[test]
    fn first_status_wins() {
        let mut recorder = ResponseRecorder::new();
        recorder.write_status(StatusCode::NotFound);
        recorder.write_status(StatusCode::Ok);
        assert_eq!(recorder.status(), StatusCode::NotFound);
    }

    #[test]
    fn body_chunks_are_concatenated() {
        let mut recorder = ResponseRecorder::new();
        for chunk in [&b"a"[..], b"", b"bc", b"def"] {
            recorder.write_body(chunk);
        }
        assert_eq!(&recorder.finish().body()[..], b"abcdef");
    }

    #[test]
    fn captures_multi_value_headers_in_order() {
        let captured = sample();
        assert_eq!(captured.status(), StatusCode::Created);
        let cookies: Vec<_> = captured.headers().get_all("set-cookie").collect();
        assert_eq!(cookies, vec!["a=1", "b=2"]);
    }

    #[test]
    fn replay_onto_response() {
        let response = sample().into_response();
        assert_eq!(response.status(), StatusCode::Created);
        assert_eq!(response.headers().get("content-type"), Some("text/html"));
        assert_eq!(response.headers().get_all("set-cookie").count(), 2);
        assert_eq!(response.body_ref(), b"<p>made</p>");
    }

    #[test]
    fn encoded_payload_decodes_to_same_response() {
        let captured = sample();
        let decoded = CapturedResponse::decode(&captured.encode()).unwrap();
        assert_eq!(decoded, captured);
    }

    #[test]
    fn body_containing_blank_lines_survives() {
        let mut recorder = ResponseRecorder::new();
        recorder.write_body(b"line\r\n\r\nmore");
        let captured = recorder.finish();
        let decoded = CapturedResponse::decode(&captured.encode()).unwrap();
        assert_eq!(&decoded.body()[..], b"line\r\n\r\nmore");
    }

    #[test]
    fn decode_rejects_plain_bodies() {
        let err = CapturedResponse::decode(&Bytes::from_static(b"<html>hi</html>")).unwrap_err();
        assert!(matches!(
            err,
            CacheError::MalformedPayload(_) | CacheError::IncompletePayload
        ));
    }

    #[test]
    fn decode_rejects_unmodelled_status() {
        let payload = Bytes::from_static(b"HTTP/1.1 299 Odd\r\n\r\n");
        assert!(matches!(
            CapturedResponse::decode(&payload),
            Err(CacheError::UnknownStatus(299))
        ));
    }
}
