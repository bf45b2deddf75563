#![allow(dead_code)]

use std::collections::HashMap;
use std::fs::{create_dir, File};
use std::io;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::Path;
use std::time::Duration;

use tempfile::{tempdir, TempDir};
use tinyhttpd::{Server, ServerConfig};

pub struct TestServer {
    server: Server,
    root: TempDir,
}
impl TestServer {
    pub fn new() -> Self {
        let root = tempdir().expect("failed to create tempdir");
        let config = ServerConfig::new(
            "127.0.0.1",
            0,
            root.path().to_str().expect("path is not valid UTF-8"),
        );
        let server = Server::new(config).expect("failed to start server");
        Self { server, root }
    }
    pub fn server(&mut self) -> &mut Server {
        &mut self.server
    }
    pub fn addr(&self) -> SocketAddr {
        self.server.local_addr()
    }
    pub fn root(&self) -> &Path {
        self.root.path()
    }
    pub fn create_dir(&self, name: &str) {
        create_dir(self.root().join(name)).expect("failed to create directory");
    }
    pub fn create_file(&self, name: &str, contents: &[u8]) {
        File::create(self.root().join(name))
            .and_then(|mut file| file.write_all(contents))
            .expect("failed to create file");
    }
    pub fn stream(&self) -> TcpStream {
        let stream = TcpStream::connect(self.addr()).expect("failed to connect to server");
        // Set timeouts to prevent tests from hanging
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream
            .set_write_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream
    }
    /// Send raw request bytes and read until the server closes the connection.
    pub fn raw(&self, request: &[u8]) -> Vec<u8> {
        let mut stream = self.stream();
        stream.write_all(request).unwrap();
        let mut buf = Vec::new();
        stream
            .read_to_end(&mut buf)
            .expect("failed to read response");
        buf
    }
    pub fn get(&self, path: &str) -> Response {
        let raw = self.raw(format!("GET {} HTTP/1.0\r\n\r\n", path).as_bytes());
        Response::parse(&raw).expect("failed to parse response")
    }
}

/// HTTP Response from the server.
#[derive(Debug)]
pub struct Response {
    response_line: String,
    headers: HashMap<String, String>,
    pub body: Vec<u8>,
}
impl Response {
    pub fn parse(raw: &[u8]) -> io::Result<Self> {
        let end = raw
            .windows(4)
            .position(|window| window == b"\r\n\r\n")
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "no end of headers"))?;
        let head = std::str::from_utf8(&raw[..end]).expect("response header is not valid UTF-8");
        let mut lines = head.split("\r\n");
        let response_line = lines.next().unwrap_or_default().to_string();
        let mut headers = HashMap::new();
        for line in lines {
            let mut header = line.splitn(2, ": ");
            let key = header.next().expect("invalid header").to_string();
            let value = header.next().expect("invalid header").to_string();
            headers.insert(key, value);
        }
        Ok(Self {
            response_line,
            headers,
            body: raw[end + 4..].to_vec(),
        })
    }
    pub fn response_line(&self) -> &str {
        &self.response_line
    }
    pub fn status(&self) -> &str {
        self.response_line
            .splitn(2, ' ')
            .nth(1)
            .expect("invalid response line")
    }
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|name| name.as_str())
    }
    pub fn text(&self) -> &str {
        std::str::from_utf8(&self.body).expect("body is not valid UTF-8")
    }
}
