use std::convert::TryFrom;
use std::fs::OpenOptions;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::os::unix::fs::OpenOptionsExt;
use std::time::SystemTime;

use tracing::{debug, info, warn};

use crate::parser::{ParseResult, Request, RequestParser};
use crate::response::Response;
use crate::uri::sanitize_uri;

/// Size of the per-connection read buffer, and the most request bytes accepted before a request is
/// dropped as malformed.
pub const BUF_SIZE: usize = 65535;

/// An accepted client socket. Dropping it shuts down both directions and closes the descriptor, so
/// every path out of a connection closes it exactly once.
#[derive(Debug)]
pub struct ClientSocket {
    stream: TcpStream,
    peer: SocketAddr,
}

impl ClientSocket {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self { stream, peer }
    }
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl Read for ClientSocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for ClientSocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl Drop for ClientSocket {
    fn drop(&mut self) {
        // The peer may already be gone, which is fine.
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            debug!("shutdown of {} failed: {}", self.peer, e);
        }
    }
}

/// Serve a single request on `socket`, then close it.
pub fn handle_connection(mut socket: ClientSocket, root_dir: &str) {
    let request = match read_request(&mut socket) {
        Some(request) => request,
        None => return,
    };
    info!(
        "{} \"{} {} HTTP/{}.{}\"",
        socket.peer(),
        request.method,
        request.uri,
        request.http_version_major,
        request.http_version_minor
    );
    if let Err(e) = dispatch(&mut socket, &request, root_dir) {
        warn!("failed to reply to {}: {}", socket.peer(), e);
    }
}

/// Read from the socket until the parser has a whole request. Returns None if the client went
/// away or sent something unparseable; such connections are closed without a reply.
fn read_request(socket: &mut ClientSocket) -> Option<Request> {
    let mut buffer = vec![0; BUF_SIZE];
    let mut parser = RequestParser::new();
    let mut request = Request::default();
    let mut total_read = 0;

    loop {
        let bytes_read = match socket.read(&mut buffer) {
            Ok(0) => {
                debug!("{} closed the connection before sending a request", socket.peer());
                return None;
            }
            Ok(bytes_read) => bytes_read,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!("can't read request from {}: {}", socket.peer(), e);
                return None;
            }
        };
        total_read += bytes_read;

        // The parser keeps its place, so each read only needs to hand over the new bytes.
        match parser.parse(&mut request, &buffer[..bytes_read]).0 {
            ParseResult::Good => return Some(request),
            ParseResult::Bad => {
                debug!(
                    "bad request from {}: {:?}",
                    socket.peer(),
                    String::from_utf8_lossy(&buffer[..bytes_read])
                );
                return None;
            }
            ParseResult::Indeterminate if total_read >= BUF_SIZE => {
                debug!("request from {} is too long", socket.peer());
                return None;
            }
            ParseResult::Indeterminate => {}
        }
    }
}

/// Reply to a parsed request with the file it names, or with 404.
pub fn dispatch<W: Write>(out: &mut W, request: &Request, root_dir: &str) -> io::Result<()> {
    let now = SystemTime::now();

    if request.method != "GET" {
        debug!("method {} is not supported", request.method);
        return Response::not_found(now).send(out);
    }

    let path = match sanitize_uri(&request.uri) {
        Some(path) => path,
        None => {
            debug!("can't serve URI {:?}", request.uri);
            return Response::not_found(now).send(out);
        }
    };

    let target = format!("{}{}", root_dir, path);
    match read_file(&target) {
        Ok(contents) => Response::ok(contents, now).send(out),
        Err(e) => {
            debug!("can't open file {}: {}", target, e);
            Response::not_found(now).send(out)
        }
    }
}

/// Read a whole regular file into memory.
fn read_file(path: &str) -> io::Result<Vec<u8>> {
    // Non-blocking, so that opening a FIFO doesn't wait for a writer.
    let mut file = OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)?;
    let metadata = file.metadata()?;
    if !metadata.is_file() {
        return Err(io::Error::new(io::ErrorKind::Other, "not a regular file"));
    }
    let mut contents = Vec::with_capacity(usize::try_from(metadata.len()).unwrap_or(0));
    file.read_to_end(&mut contents)?;
    Ok(contents)
}
