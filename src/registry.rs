//! Process-wide set of live servers, so that an interrupt can reach every one of them.
//!
//! No work happens in the signal handler itself: `signal_hook` forwards SIGINT to a dedicated
//! thread, which shuts down the listening socket of each registered server. That unblocks their
//! accept loops.

use std::collections::HashMap;
use std::net::TcpListener;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use anyhow::{Context, Result};
use once_cell::sync::{Lazy, OnceCell};
use signal_hook::consts::SIGINT;
use signal_hook::iterator::Signals;
use tracing::{debug, info};

use crate::server::shutdown_listener;

static LIVE_SERVERS: Lazy<Mutex<HashMap<u64, Arc<TcpListener>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

static INTERRUPT_LISTENER: OnceCell<()> = OnceCell::new();

fn live_servers() -> MutexGuard<'static, HashMap<u64, Arc<TcpListener>>> {
    // The map stays consistent even if a holder panicked.
    LIVE_SERVERS
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Add a server's listening socket. Returns the id to deregister it with.
pub fn register(listener: Arc<TcpListener>) -> u64 {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    live_servers().insert(id, listener);
    id
}

pub fn deregister(id: u64) {
    live_servers().remove(&id);
}

/// Number of servers currently registered.
pub fn live_count() -> usize {
    live_servers().len()
}

/// Shut down the listening socket of every live server.
pub fn shutdown_all() {
    for (id, listener) in live_servers().iter() {
        debug!("shutting down server {}", id);
        shutdown_listener(listener);
    }
}

/// Start the thread that turns SIGINT into `shutdown_all`. Only the first call does anything.
pub fn install_interrupt_listener() -> Result<()> {
    INTERRUPT_LISTENER.get_or_try_init(|| -> Result<()> {
        let mut signals = Signals::new(&[SIGINT]).context("failed to set SIGINT handler")?;
        thread::Builder::new()
            .name("interrupt".to_string())
            .spawn(move || {
                for _ in signals.forever() {
                    info!("interrupted, shutting down {} server(s)", live_count());
                    shutdown_all();
                }
            })
            .context("failed to spawn interrupt listener thread")?;
        Ok(())
    })?;
    Ok(())
}
