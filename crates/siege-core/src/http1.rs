//! HTTP/1.x message parsing over raw byte buffers.
//!
//! The framer calls these functions on reassembled stream prefixes, so every
//! parse is three-valued: the buffer holds a complete message, the buffer is
//! a valid prefix that needs more input, or the buffer is not this kind of
//! message at all. Bodies are framed by `Content-Length`, chunked coding, or
//! (responses only) read-until-close under an explicit EOF flag.

use crate::error::FrameError;

const MAX_HEADERS: usize = 64;

/// Outcome of a parse attempt over a stream prefix.
#[derive(Debug, Clone, PartialEq)]
pub enum Status<T> {
    /// A complete message occupying the first `consumed` buffer bytes.
    Complete { message: T, consumed: usize },
    /// The buffer is a valid but incomplete prefix.
    Partial,
}

/// A parsed HTTP request with its body fully read.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: String,
    pub target: String,
    pub version: u8,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// A parsed HTTP response with its body fully read.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub version: u8,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Case-insensitive single-header lookup.
pub fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        header(&self.headers, name)
    }

    /// Request path without the query string.
    pub fn path(&self) -> &str {
        match self.target.split_once('?') {
            Some((path, _)) => path,
            None => &self.target,
        }
    }
}

impl Response {
    pub fn header(&self, name: &str) -> Option<&str> {
        header(&self.headers, name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Body framing
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
enum BodyFraming {
    None,
    Length(usize),
    Chunked,
    UntilClose,
}

fn is_chunked(headers: &[(String, String)]) -> bool {
    header(headers, "transfer-encoding")
        .map(|v| v.to_ascii_lowercase().contains("chunked"))
        .unwrap_or(false)
}

fn content_length(headers: &[(String, String)]) -> Result<Option<usize>, FrameError> {
    match header(headers, "content-length") {
        None => Ok(None),
        Some(v) => v
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|_| FrameError::ContentLength),
    }
}

fn request_framing(headers: &[(String, String)]) -> Result<BodyFraming, FrameError> {
    if is_chunked(headers) {
        return Ok(BodyFraming::Chunked);
    }
    match content_length(headers)? {
        Some(0) | None => Ok(BodyFraming::None),
        Some(n) => Ok(BodyFraming::Length(n)),
    }
}

fn response_framing(
    status: u16,
    request_method: Option<&str>,
    headers: &[(String, String)],
) -> Result<BodyFraming, FrameError> {
    let head = request_method.is_some_and(|m| m.eq_ignore_ascii_case("HEAD"));
    if head || (100..200).contains(&status) || status == 204 || status == 304 {
        return Ok(BodyFraming::None);
    }
    if is_chunked(headers) {
        return Ok(BodyFraming::Chunked);
    }
    match content_length(headers)? {
        Some(0) => Ok(BodyFraming::None),
        Some(n) => Ok(BodyFraming::Length(n)),
        None => Ok(BodyFraming::UntilClose),
    }
}

/// Read a body from `buf` according to `framing`. Returns the body bytes and
/// how many buffer bytes they occupied (chunk framing included).
fn read_body(buf: &[u8], framing: BodyFraming, eof: bool) -> Result<Status<(Vec<u8>, usize)>, FrameError> {
    match framing {
        BodyFraming::None => Ok(Status::Complete {
            message: (Vec::new(), 0),
            consumed: 0,
        }),
        BodyFraming::Length(n) => {
            if buf.len() < n {
                return Ok(Status::Partial);
            }
            Ok(Status::Complete {
                message: (buf[..n].to_vec(), n),
                consumed: n,
            })
        }
        BodyFraming::Chunked => read_chunked(buf),
        BodyFraming::UntilClose => {
            if !eof {
                return Ok(Status::Partial);
            }
            Ok(Status::Complete {
                message: (buf.to_vec(), buf.len()),
                consumed: buf.len(),
            })
        }
    }
}

fn read_chunked(buf: &[u8]) -> Result<Status<(Vec<u8>, usize)>, FrameError> {
    let mut body = Vec::new();
    let mut pos = 0;

    loop {
        match httparse::parse_chunk_size(&buf[pos..]) {
            Ok(httparse::Status::Complete((consumed, size))) => {
                pos += consumed;
                if size == 0 {
                    // Trailer section: zero or more header lines, then CRLF.
                    return match skip_trailers(&buf[pos..])? {
                        Some(n) => Ok(Status::Complete {
                            message: (body, pos + n),
                            consumed: pos + n,
                        }),
                        None => Ok(Status::Partial),
                    };
                }
                let size = usize::try_from(size).map_err(|_| FrameError::Chunk)?;
                if buf.len() < pos + size + 2 {
                    return Ok(Status::Partial);
                }
                body.extend_from_slice(&buf[pos..pos + size]);
                pos += size;
                if &buf[pos..pos + 2] != b"\r\n" {
                    return Err(FrameError::Chunk);
                }
                pos += 2;
            }
            Ok(httparse::Status::Partial) => return Ok(Status::Partial),
            Err(_) => return Err(FrameError::Chunk),
        }
    }
}

/// Consume trailer lines after the last chunk. Returns the number of bytes
/// consumed including the terminating empty line, or `None` if more input is
/// needed.
fn skip_trailers(buf: &[u8]) -> Result<Option<usize>, FrameError> {
    let mut pos = 0;
    loop {
        let Some(nl) = buf[pos..].iter().position(|&b| b == b'\n') else {
            return Ok(None);
        };
        let line = &buf[pos..pos + nl];
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        pos += nl + 1;
        if line.is_empty() {
            return Ok(Some(pos));
        }
        if !line.contains(&b':') {
            return Err(FrameError::Chunk);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Message parsing
// ─────────────────────────────────────────────────────────────────────────────

fn copy_headers(parsed: &[httparse::Header<'_>]) -> Vec<(String, String)> {
    parsed
        .iter()
        .map(|h| {
            (
                h.name.to_string(),
                String::from_utf8_lossy(h.value).into_owned(),
            )
        })
        .collect()
}

/// Parse one complete request (head and body) from the front of `buf`.
pub fn parse_request(buf: &[u8]) -> Result<Status<Request>, FrameError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);

    let head_len = match req.parse(buf) {
        Ok(httparse::Status::Complete(n)) => n,
        Ok(httparse::Status::Partial) => return Ok(Status::Partial),
        Err(e) => return Err(FrameError::Head(e.to_string())),
    };

    let message = Request {
        method: req.method.unwrap_or_default().to_string(),
        target: req.path.unwrap_or_default().to_string(),
        version: req.version.unwrap_or(1),
        headers: copy_headers(req.headers),
        body: Vec::new(),
    };

    let framing = request_framing(&message.headers)?;
    match read_body(&buf[head_len..], framing, false)? {
        Status::Complete {
            message: (body, body_len),
            ..
        } => Ok(Status::Complete {
            message: Request { body, ..message },
            consumed: head_len + body_len,
        }),
        Status::Partial => Ok(Status::Partial),
    }
}

/// Parse one complete response from the front of `buf`.
///
/// `request` is the head request this response answers, when known; it
/// disambiguates framing (HEAD responses carry no body). `eof` marks that no
/// more bytes can arrive on this side, which completes read-until-close
/// bodies.
pub fn parse_response(
    buf: &[u8],
    request: Option<&Request>,
    eof: bool,
) -> Result<Status<Response>, FrameError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut res = httparse::Response::new(&mut headers);

    let head_len = match res.parse(buf) {
        Ok(httparse::Status::Complete(n)) => n,
        Ok(httparse::Status::Partial) => return Ok(Status::Partial),
        Err(e) => return Err(FrameError::Head(e.to_string())),
    };

    let message = Response {
        status: res.code.unwrap_or_default(),
        version: res.version.unwrap_or(1),
        headers: copy_headers(res.headers),
        body: Vec::new(),
    };

    let framing = response_framing(
        message.status,
        request.map(|r| r.method.as_str()),
        &message.headers,
    )?;
    match read_body(&buf[head_len..], framing, eof)? {
        Status::Complete {
            message: (body, body_len),
            ..
        } => Ok(Status::Complete {
            message: Response { body, ..message },
            consumed: head_len + body_len,
        }),
        Status::Partial => Ok(Status::Partial),
    }
}
