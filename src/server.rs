use std::net::{IpAddr, SocketAddr, TcpListener};
use std::os::unix::io::{AsRawFd, FromRawFd};
use std::str::FromStr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use nix::sys::socket::{
    bind, listen, setsockopt, shutdown, socket, sockopt, AddressFamily, InetAddr, Shutdown,
    SockAddr, SockFlag, SockType,
};
use tracing::{debug, error, info};

use crate::connection::{handle_connection, ClientSocket};
use crate::registry;

/// Where and what to serve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    bind_address: String,
    port: u16,
    root_directory: String,
}

impl ServerConfig {
    /// The root directory is normalized to end in a slash; an empty one means the current
    /// directory.
    pub fn new(bind_address: impl Into<String>, port: u16, root_directory: &str) -> Self {
        let root_directory = if root_directory.is_empty() {
            "./".to_string()
        } else if !root_directory.ends_with('/') {
            format!("{}/", root_directory)
        } else {
            root_directory.to_string()
        };
        Self {
            bind_address: bind_address.into(),
            port,
            root_directory,
        }
    }
    pub fn bind_address(&self) -> &str {
        &self.bind_address
    }
    pub fn port(&self) -> u16 {
        self.port
    }
    pub fn root_directory(&self) -> &str {
        &self.root_directory
    }
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let addr = IpAddr::from_str(&self.bind_address)
            .with_context(|| format!("malformed address {}", self.bind_address))?;
        Ok(SocketAddr::new(addr, self.port))
    }
}

/// A static file server. Connections are accepted on a background thread and each one is served
/// on a thread of its own.
///
/// Dropping the server stops accepting and waits for the accept loop to exit. Connections already
/// being served run to completion.
#[derive(Debug)]
pub struct Server {
    id: u64,
    listener: Arc<TcpListener>,
    local_addr: SocketAddr,
    acceptor: Option<JoinHandle<()>>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Result<Self> {
        let socket_addr = config.socket_addr()?;
        let listener = Arc::new(create_listener(socket_addr)?);
        let local_addr = listener
            .local_addr()
            .context("failed to get listening address")?;

        registry::install_interrupt_listener()?;
        let id = registry::register(Arc::clone(&listener));

        let acceptor = {
            let listener = Arc::clone(&listener);
            let root_dir = config.root_directory().to_string();
            thread::Builder::new()
                .name(format!("acceptor-{}", id))
                .spawn(move || accept_connections(&listener, &root_dir))
        };
        let acceptor = match acceptor {
            Ok(acceptor) => acceptor,
            Err(e) => {
                registry::deregister(id);
                shutdown_listener(&listener);
                return Err(e).context("failed to spawn acceptor thread");
            }
        };
        info!("listening on http://{}/", local_addr);

        Ok(Self {
            id,
            listener,
            local_addr,
            acceptor: Some(acceptor),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections. Safe to call any number of times.
    pub fn shutdown(&self) {
        shutdown_listener(&self.listener);
    }

    /// Block until the accept loop has exited.
    pub fn join_acceptor_thread(&mut self) {
        if let Some(acceptor) = self.acceptor.take() {
            if acceptor.join().is_err() {
                error!("acceptor thread of server {} panicked", self.id);
            }
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown();
        registry::deregister(self.id);
        self.join_acceptor_thread();
    }
}

/// Create, bind and listen on the socket that connections are accepted from.
fn create_listener(socket_addr: SocketAddr) -> Result<TcpListener> {
    let family = match socket_addr {
        SocketAddr::V4(_) => AddressFamily::Inet,
        SocketAddr::V6(_) => AddressFamily::Inet6,
    };
    let fd = socket(family, SockType::Stream, SockFlag::SOCK_CLOEXEC, None)
        .context("failed to create listening socket")?;
    // Owned from here on, so every early return closes it.
    let listener = unsafe { TcpListener::from_raw_fd(fd) };

    setsockopt(fd, sockopt::ReuseAddr, &true).context("failed to set SO_REUSEADDR")?;
    bind(fd, &SockAddr::new_inet(InetAddr::from_std(&socket_addr)))
        .with_context(|| format!("failed to bind to {}", socket_addr))?;
    listen(fd, libc::SOMAXCONN as usize)
        .with_context(|| format!("failed to listen on {}", socket_addr))?;
    Ok(listener)
}

/// Shut down a listening socket, waking up any thread blocked in accept(). Shutting down an
/// already shut down socket is harmless.
pub(crate) fn shutdown_listener(listener: &TcpListener) {
    if let Err(e) = shutdown(listener.as_raw_fd(), Shutdown::Both) {
        debug!("listening socket shutdown: {}", e);
    }
}

/// Accept connections until the listening socket is shut down, handing each one to a new thread.
fn accept_connections(listener: &TcpListener, root_dir: &str) {
    loop {
        let (stream, peer) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(e) => match e.kind() {
                std::io::ErrorKind::WouldBlock
                | std::io::ErrorKind::Interrupted
                | std::io::ErrorKind::ConnectionAborted => {
                    debug!("accept() failed, retrying: {}", e);
                    continue;
                }
                _ => {
                    debug!("accept loop stopped: {}", e);
                    break;
                }
            },
        };

        debug!("connected client {}", peer);
        let socket = ClientSocket::new(stream, peer);
        let root_dir = root_dir.to_string();
        // If spawning fails the closure is dropped, and the socket with it.
        if let Err(e) = thread::Builder::new()
            .name("connection".to_string())
            .spawn(move || handle_connection(socket, &root_dir))
        {
            error!("failed to spawn thread for {}: {}", peer, e);
        }
    }
}
