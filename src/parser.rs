use crate::response::Header;

/// A request received from a client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub uri: String,
    pub http_version_major: u32,
    pub http_version_minor: u32,
    pub headers: Vec<Header>,
}

/// Outcome of feeding bytes to the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseResult {
    /// A complete, valid request was parsed.
    Good,
    /// The input is not a valid request.
    Bad,
    /// More input is needed.
    Indeterminate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    MethodStart,
    Method,
    Uri,
    HttpVersionH,
    HttpVersionT1,
    HttpVersionT2,
    HttpVersionP,
    HttpVersionSlash,
    HttpVersionMajorStart,
    HttpVersionMajor,
    HttpVersionMinorStart,
    HttpVersionMinor,
    ExpectingNewline1,
    HeaderLineStart,
    HeaderLws,
    HeaderName,
    SpaceBeforeHeaderValue,
    HeaderValue,
    ExpectingNewline2,
    ExpectingNewline3,
}

/// Incremental parser for the request line and headers.
///
/// State is kept between calls to `parse`, so a request may be fed in as many pieces as it arrives
/// in.
#[derive(Debug)]
pub struct RequestParser {
    state: State,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestParser {
    pub fn new() -> Self {
        Self {
            state: State::MethodStart,
        }
    }

    /// Reset to initial parser state.
    pub fn reset(&mut self) {
        self.state = State::MethodStart;
    }

    /// Parse some data. Returns the verdict and how many bytes of `input` were consumed. Parsing
    /// stops at the first byte that makes the verdict `Good` or `Bad`.
    pub fn parse(&mut self, request: &mut Request, input: &[u8]) -> (ParseResult, usize) {
        for (index, &byte) in input.iter().enumerate() {
            let result = self.consume(request, byte);
            if result != ParseResult::Indeterminate {
                return (result, index + 1);
            }
        }
        (ParseResult::Indeterminate, input.len())
    }

    fn consume(&mut self, req: &mut Request, c: u8) -> ParseResult {
        use ParseResult::{Bad, Good, Indeterminate};

        match self.state {
            State::MethodStart => {
                if !is_token(c) {
                    return Bad;
                }
                self.state = State::Method;
                req.method.push(c as char);
            }
            State::Method => {
                if c == b' ' {
                    self.state = State::Uri;
                } else if is_token(c) {
                    req.method.push(c as char);
                } else {
                    return Bad;
                }
            }
            State::Uri => {
                if c == b' ' && !req.uri.is_empty() {
                    self.state = State::HttpVersionH;
                } else if c.is_ascii() && !is_ctl(c) && c != b' ' {
                    req.uri.push(c as char);
                } else {
                    return Bad;
                }
            }
            State::HttpVersionH => return self.expect(c, b'H', State::HttpVersionT1),
            State::HttpVersionT1 => return self.expect(c, b'T', State::HttpVersionT2),
            State::HttpVersionT2 => return self.expect(c, b'T', State::HttpVersionP),
            State::HttpVersionP => return self.expect(c, b'P', State::HttpVersionSlash),
            State::HttpVersionSlash => {
                req.http_version_major = 0;
                req.http_version_minor = 0;
                return self.expect(c, b'/', State::HttpVersionMajorStart);
            }
            State::HttpVersionMajorStart => {
                if !push_digit(&mut req.http_version_major, c) {
                    return Bad;
                }
                self.state = State::HttpVersionMajor;
            }
            State::HttpVersionMajor => {
                if c == b'.' {
                    self.state = State::HttpVersionMinorStart;
                } else if !push_digit(&mut req.http_version_major, c) {
                    return Bad;
                }
            }
            State::HttpVersionMinorStart => {
                if !push_digit(&mut req.http_version_minor, c) {
                    return Bad;
                }
                self.state = State::HttpVersionMinor;
            }
            State::HttpVersionMinor => {
                if c == b'\r' {
                    self.state = State::ExpectingNewline1;
                } else if !push_digit(&mut req.http_version_minor, c) {
                    return Bad;
                }
            }
            State::ExpectingNewline1 => return self.expect(c, b'\n', State::HeaderLineStart),
            State::HeaderLineStart => {
                if c == b'\r' {
                    self.state = State::ExpectingNewline3;
                } else if !req.headers.is_empty() && (c == b' ' || c == b'\t') {
                    self.state = State::HeaderLws;
                } else if !is_token(c) {
                    return Bad;
                } else {
                    req.headers.push(Header::new((c as char).to_string(), ""));
                    self.state = State::HeaderName;
                }
            }
            State::HeaderLws => {
                if c == b'\r' {
                    self.state = State::ExpectingNewline2;
                } else if c == b' ' || c == b'\t' {
                    // folded whitespace
                } else if is_ctl(c) {
                    return Bad;
                } else {
                    self.state = State::HeaderValue;
                    push_value(req, c);
                }
            }
            State::HeaderName => {
                if c == b':' {
                    self.state = State::SpaceBeforeHeaderValue;
                } else if is_token(c) {
                    if let Some(header) = req.headers.last_mut() {
                        header.name.push(c as char);
                    }
                } else {
                    return Bad;
                }
            }
            State::SpaceBeforeHeaderValue => {
                return self.expect(c, b' ', State::HeaderValue);
            }
            State::HeaderValue => {
                if c == b'\r' {
                    self.state = State::ExpectingNewline2;
                } else if is_ctl(c) {
                    return Bad;
                } else {
                    push_value(req, c);
                }
            }
            State::ExpectingNewline2 => return self.expect(c, b'\n', State::HeaderLineStart),
            State::ExpectingNewline3 => {
                return if c == b'\n' { Good } else { Bad };
            }
        }
        Indeterminate
    }

    fn expect(&mut self, c: u8, expected: u8, next: State) -> ParseResult {
        if c == expected {
            self.state = next;
            ParseResult::Indeterminate
        } else {
            ParseResult::Bad
        }
    }
}

fn push_value(req: &mut Request, c: u8) {
    if let Some(header) = req.headers.last_mut() {
        header.value.push(c as char);
    }
}

/// Append a decimal digit to `number`. Returns false if `c` isn't a digit or the number overflows.
fn push_digit(number: &mut u32, c: u8) -> bool {
    if !c.is_ascii_digit() {
        return false;
    }
    match number
        .checked_mul(10)
        .and_then(|n| n.checked_add(u32::from(c - b'0')))
    {
        Some(n) => {
            *number = n;
            true
        }
        None => false,
    }
}

/// Is this a control character?
fn is_ctl(c: u8) -> bool {
    c <= 31 || c == 127
}

/// Is this one of the separators that can't appear in a token?
fn is_tspecial(c: u8) -> bool {
    matches!(
        c,
        b'(' | b')'
            | b'<'
            | b'>'
            | b'@'
            | b','
            | b';'
            | b':'
            | b'\\'
            | b'"'
            | b'/'
            | b'['
            | b']'
            | b'?'
            | b'='
            | b'{'
            | b'}'
            | b' '
            | b'\t'
    )
}

fn is_token(c: u8) -> bool {
    c.is_ascii() && !is_ctl(c) && !is_tspecial(c)
}

#[cfg(test)]
mod test {
    use super::*;

    use test_case::test_case;

    fn parse_all(input: &[u8]) -> (ParseResult, Request) {
        let mut request = Request::default();
        let (result, _) = RequestParser::new().parse(&mut request, input);
        (result, request)
    }

    #[test]
    fn parses_simple_get() {
        let (result, request) = parse_all(b"GET /index.html HTTP/1.0\r\n\r\n");
        assert_eq!(result, ParseResult::Good);
        assert_eq!(request.method, "GET");
        assert_eq!(request.uri, "/index.html");
        assert_eq!(request.http_version_major, 1);
        assert_eq!(request.http_version_minor, 0);
        assert!(request.headers.is_empty());
    }

    #[test]
    fn parses_headers_in_order() {
        let input = b"GET / HTTP/1.1\r\nHost: example.com\r\nUser-Agent: curl/7.79\r\n\
                      X-Folded: first\r\n  second\r\n\r\n";
        let (result, request) = parse_all(input);
        assert_eq!(result, ParseResult::Good);
        assert_eq!(
            request.headers,
            vec![
                Header::new("Host", "example.com"),
                Header::new("User-Agent", "curl/7.79"),
                Header::new("X-Folded", "firstsecond"),
            ]
        );
    }

    #[test]
    fn stops_at_end_of_headers() {
        let input = b"POST /form HTTP/1.0\r\nContent-Length: 3\r\n\r\nabc";
        let mut request = Request::default();
        let (result, consumed) = RequestParser::new().parse(&mut request, input);
        assert_eq!(result, ParseResult::Good);
        assert_eq!(consumed, input.len() - 3);
        assert_eq!(request.method, "POST");
    }

    #[test]
    fn parses_across_chunks() {
        let input = b"GET /a/b.txt HTTP/1.0\r\nHost: localhost\r\n\r\n";
        let mut parser = RequestParser::new();
        let mut request = Request::default();
        let (last, rest) = input.split_last().unwrap();
        for byte in rest.chunks(1) {
            assert_eq!(
                parser.parse(&mut request, byte),
                (ParseResult::Indeterminate, 1)
            );
        }
        assert_eq!(
            parser.parse(&mut request, &[*last]),
            (ParseResult::Good, 1)
        );
        assert_eq!(request.uri, "/a/b.txt");
        assert_eq!(request.headers, vec![Header::new("Host", "localhost")]);
    }

    #[test_case(b"GET / HTTP/1.0\r\n" ; "no blank line")]
    #[test_case(b"GET / HT" ; "partial version")]
    #[test_case(b"GET" ; "method only")]
    #[test_case(b"" ; "empty")]
    fn incomplete_is_indeterminate(input: &[u8]) {
        assert_eq!(parse_all(input).0, ParseResult::Indeterminate);
    }

    #[test_case(b" GET / HTTP/1.0\r\n\r\n" ; "leading space")]
    #[test_case(b"G(T / HTTP/1.0\r\n\r\n" ; "tspecial in method")]
    #[test_case(b"GET  HTTP/1.0\r\n\r\n" ; "empty uri")]
    #[test_case(b"GET /\x01 HTTP/1.0\r\n\r\n" ; "control in uri")]
    #[test_case(b"GET / FTP/1.0\r\n\r\n" ; "wrong protocol")]
    #[test_case(b"GET / HTTP/x.0\r\n\r\n" ; "non-digit major")]
    #[test_case(b"GET / HTTP/1.\r\n\r\n" ; "missing minor")]
    #[test_case(b"GET / HTTP/99999999999.0\r\n\r\n" ; "version overflow")]
    #[test_case(b"GET / HTTP/1.0\n\n" ; "bare newlines")]
    #[test_case(b"GET / HTTP/1.0\r\nHost example.com\r\n\r\n" ; "header without colon")]
    #[test_case(b"GET / HTTP/1.0\r\nHost:example.com\r\n\r\n" ; "header without space")]
    #[test_case(b"GET / HTTP/1.0\r\nHost: a\x00b\r\n\r\n" ; "control in value")]
    #[test_case(b"GET / HTTP/1.0\r\n folded\r\n\r\n" ; "continuation without header")]
    fn malformed_is_bad(input: &[u8]) {
        assert_eq!(parse_all(input).0, ParseResult::Bad);
    }

    #[test]
    fn reset_starts_over() {
        let mut parser = RequestParser::new();
        let mut request = Request::default();
        assert_eq!(parser.parse(&mut request, b"GE").0, ParseResult::Indeterminate);
        parser.reset();
        let mut request = Request::default();
        assert_eq!(
            parser.parse(&mut request, b"PUT / HTTP/1.0\r\n\r\n").0,
            ParseResult::Good
        );
        assert_eq!(request.method, "PUT");
    }
}
