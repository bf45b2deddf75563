use anyhow::{anyhow, Context, Result};
use nix::unistd::{daemon, getpid};

use tinyhttpd::{Server, ServerConfig};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args_os()
        .map(|arg| {
            arg.into_string()
                .map_err(|arg| anyhow!("argument {} is not valid UTF-8", arg.to_string_lossy()))
        })
        .collect::<Result<Vec<String>>>()?
        .into_iter();
    let name = args
        .next()
        .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());
    let options = Options::from_args(args);

    let (address, port) = match (&options.address, &options.port) {
        (Some(address), Some(port)) => (address, port),
        _ => {
            usage(&name);
            std::process::exit(1);
        }
    };
    let port: u16 = port
        .parse()
        .with_context(|| format!("port number {} is invalid", port))?;

    if options.want_daemon {
        daemon(true, true).context("failed to daemonize")?;
    }

    let config = ServerConfig::new(address.as_str(), port, &options.root_directory);
    println!(
        "[{}]\naddress = {}\nport = {}\nroot directory = {}",
        getpid(),
        config.bind_address(),
        config.port(),
        config.root_directory()
    );

    let mut server = Server::new(config).context("can't construct a server")?;
    server.join_acceptor_thread();
    Ok(())
}

fn usage(argv0: &str) {
    eprint!(
        "usage:\t{} -h address -p port [-d directory] [-b]\n\n\
        flags:\t-h address\n\
        \t\tIP address to bind the listening socket to.\n\n\
        \t-p port\n\
        \t\tPort to listen on for connections.\n\n\
        \t-d directory (default: current directory)\n\
        \t\tRoot directory to serve files from.\n\n\
        \t-b\n\
        \t\tDetach from the controlling terminal and run in the background.\n\n",
        argv0
    );
}

/// Command line options, getopt style: `-p 8080` and `-p8080` both work.
#[derive(Debug, Default, PartialEq, Eq)]
struct Options {
    address: Option<String>,
    port: Option<String>,
    root_directory: String,
    want_daemon: bool,
}

impl Options {
    /// Parse arguments, not including the program name. Unknown flags and flags missing their
    /// value are warned about and ignored.
    fn from_args<I: IntoIterator<Item = String>>(args: I) -> Self {
        let mut options = Self::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let cluster = match arg.strip_prefix('-') {
                Some(cluster) if !cluster.is_empty() => cluster,
                _ => {
                    eprintln!("warning: ignoring argument `{}'", arg);
                    continue;
                }
            };
            // Flags may be bundled (`-bp8080`); a value flag takes the rest of the cluster.
            for (i, flag) in cluster.char_indices() {
                match flag {
                    'b' => options.want_daemon = true,
                    'h' | 'p' | 'd' => {
                        let attached = &cluster[i + flag.len_utf8()..];
                        let value = if attached.is_empty() {
                            args.next()
                        } else {
                            Some(attached.to_string())
                        };
                        match (flag, value) {
                            ('h', Some(value)) => options.address = Some(value),
                            ('p', Some(value)) => options.port = Some(value),
                            (_, Some(value)) => options.root_directory = value,
                            (_, None) => {
                                eprintln!("warning: option \"{}\" requires an argument", flag)
                            }
                        }
                        break;
                    }
                    _ => eprintln!("warning: unrecognized option \"{}\"", flag),
                }
            }
        }
        options
    }
}
