use std::io::{self, ErrorKind, Write};
use std::time::SystemTime;

use chrono::{DateTime, Utc};

const CRLF: &str = "\r\n";

/// Content type of every reply. There is no MIME type detection.
pub const CONTENT_TYPE: &str = "text/html";

const NOT_FOUND_BODY: &str = "<html><head><title>404 Not Found</title></head><body>\n\
    <h1>Not Found</h1>\n\
    The URL you requested was not found.\n\
    </body></html>\n";

/// A single response header line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// RFC1123 formatted date.
pub struct HttpDate(pub SystemTime);

impl std::fmt::Display for HttpDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let datetime = DateTime::<Utc>::from(self.0);
        write!(f, "{}", datetime.format("%a, %d %b %Y %H:%M:%S GMT"))
    }
}

/// An HTTP/1.0 response, ready to be framed onto the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub reason: &'static str,
    pub headers: Vec<Header>,
    pub body: Vec<u8>,
}

impl Response {
    /// A 200 reply carrying `body`.
    pub fn ok(body: Vec<u8>, now: SystemTime) -> Self {
        Self {
            status: 200,
            reason: "OK",
            headers: content_headers(body.len(), now),
            body,
        }
    }

    /// The reply for anything that can't be served. Every failure looks the same to the client.
    pub fn not_found(now: SystemTime) -> Self {
        Self {
            status: 404,
            reason: "Not Found",
            headers: content_headers(NOT_FOUND_BODY.len(), now),
            body: NOT_FOUND_BODY.as_bytes().to_vec(),
        }
    }

    /// Serialize status line, headers, blank line and body. Nothing follows the body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut head = format!("HTTP/1.0 {} {}{}", self.status, self.reason, CRLF);
        for header in &self.headers {
            head.push_str(&format!("{}: {}{}", header.name, header.value, CRLF));
        }
        head.push_str(CRLF);

        let mut message = head.into_bytes();
        message.extend_from_slice(&self.body);
        message
    }

    /// Frame the response and write all of it to `out`.
    pub fn send<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write_fully(out, &self.to_bytes())
    }
}

fn content_headers(content_length: usize, now: SystemTime) -> Vec<Header> {
    vec![
        Header::new("Content-Length", content_length.to_string()),
        Header::new("Content-Type", CONTENT_TYPE),
        Header::new("Date", HttpDate(now).to_string()),
    ]
}

/// Write `message` to `out`, resuming after short writes until every byte is sent.
///
/// A write that accepts zero bytes is reported as `WriteZero` instead of spinning forever.
pub fn write_fully<W: Write>(out: &mut W, message: &[u8]) -> io::Result<()> {
    let mut written = 0;
    while written < message.len() {
        match out.write(&message[written..]) {
            Ok(0) => {
                return Err(io::Error::new(
                    ErrorKind::WriteZero,
                    format!("peer accepted {} of {} bytes", written, message.len()),
                ))
            }
            Ok(sent) => written += sent,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    out.flush()
}
