//! The TCP command server.
//!
//! One listener thread accepts connections and hands them to a fixed pool of
//! worker threads over a channel. Each worker services one connection at a
//! time: read a line, execute it against the file system, write the single
//! reply line. Command errors are recovered per-command and never end the
//! connection; only QUIT, EOF, or a socket error does.

use crate::protocol::{Command, parse};
use cfs_core::FsManager;
use parking_lot::Mutex;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use tracing::{debug, info, warn};

/// Default worker-pool size.
pub const DEFAULT_WORKERS: usize = 8;

/// A running-ready command server bound to a socket address.
pub struct FileServer {
    listener: TcpListener,
    fs: Arc<FsManager>,
    workers: usize,
}

impl FileServer {
    /// Bind the listener. Pass port 0 to let the OS pick (tests do).
    pub fn bind(addr: impl ToSocketAddrs, fs: Arc<FsManager>, workers: usize) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        Ok(Self {
            listener,
            fs,
            workers: workers.max(1),
        })
    }

    /// The address the listener actually bound.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the listener fails. Blocks the caller.
    pub fn run(self) -> io::Result<()> {
        info!(
            target: "cfs::server",
            event = "listening",
            addr = %self.local_addr()?,
            workers = self.workers,
            fs = self.fs.fs_name()
        );

        let (tx, rx) = mpsc::channel::<TcpStream>();
        let rx = Arc::new(Mutex::new(rx));
        let mut handles = Vec::with_capacity(self.workers);
        for id in 0..self.workers {
            let rx = Arc::clone(&rx);
            let fs = Arc::clone(&self.fs);
            handles.push(
                thread::Builder::new()
                    .name(format!("cfs-worker-{id}"))
                    .spawn(move || worker_loop(id, &rx, &fs))?,
            );
        }

        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => {
                    if tx.send(stream).is_err() {
                        break;
                    }
                }
                Err(error) => {
                    warn!(target: "cfs::server", event = "accept_failed", %error);
                }
            }
        }

        drop(tx);
        for handle in handles {
            let _ = handle.join();
        }
        Ok(())
    }
}

fn worker_loop(id: usize, rx: &Mutex<mpsc::Receiver<TcpStream>>, fs: &FsManager) {
    loop {
        // Holding the receiver lock across recv() is fine: exactly one idle
        // worker waits on the channel, the rest queue on the mutex.
        let next = rx.lock().recv();
        let Ok(stream) = next else {
            break;
        };
        if let Err(error) = handle_connection(fs, stream) {
            debug!(
                target: "cfs::server",
                event = "connection_error",
                worker = id,
                %error
            );
        }
    }
}

fn handle_connection(fs: &FsManager, stream: TcpStream) -> io::Result<()> {
    let peer = stream.peer_addr()?;
    info!(target: "cfs::server", event = "client_connected", peer = %peer);

    let reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;
    for line in reader.lines() {
        let line = line?;
        match execute(fs, &line) {
            Reply::Line(text) => {
                writer.write_all(text.as_bytes())?;
                writer.write_all(b"\n")?;
            }
            Reply::Raw(bytes) => {
                writer.write_all(&bytes)?;
                writer.write_all(b"\n")?;
            }
            Reply::Quit => {
                writer.write_all(b"SUCCESS: Disconnecting.\n")?;
                break;
            }
        }
    }

    info!(target: "cfs::server", event = "client_disconnected", peer = %peer);
    Ok(())
}

/// What a command sends back: a text line, raw file bytes, or the QUIT
/// goodbye (after which the connection closes).
enum Reply {
    Line(String),
    Raw(Vec<u8>),
    Quit,
}

fn execute(fs: &FsManager, line: &str) -> Reply {
    let command = match parse(line) {
        Ok(command) => command,
        Err(error) => return Reply::Line(error.wire_message()),
    };
    debug!(target: "cfs::server", event = "command", verb = command.verb());

    match command {
        Command::Create(name) => match fs.create(&name) {
            Ok(()) => Reply::Line(format!("SUCCESS: File '{name}' created.")),
            Err(error) => Reply::Line(error.wire_message()),
        },
        Command::Write(name, content) => match fs.write(&name, content.as_bytes()) {
            Ok(()) => Reply::Line(format!("SUCCESS: File '{name}' written.")),
            Err(error) => Reply::Line(error.wire_message()),
        },
        Command::Read(name) => match fs.read(&name) {
            Ok(bytes) => Reply::Raw(bytes),
            Err(error) => Reply::Line(error.wire_message()),
        },
        Command::Delete(name) => match fs.delete(&name) {
            Ok(()) => Reply::Line(format!("SUCCESS: File '{name}' deleted.")),
            Err(error) => Reply::Line(error.wire_message()),
        },
        Command::List => {
            let names = fs.list();
            Reply::Line(if names.is_empty() {
                "No files in filesystem.".to_owned()
            } else {
                names.join(", ")
            })
        }
        Command::Quit => Reply::Quit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfs_types::IMAGE_LEN;
    use tempfile::TempDir;

    fn test_fs(dir: &TempDir) -> FsManager {
        FsManager::open(dir.path().join("disk.img"), "testfs", IMAGE_LEN).expect("open")
    }

    fn line(fs: &FsManager, input: &str) -> String {
        match execute(fs, input) {
            Reply::Line(text) => text,
            Reply::Raw(bytes) => String::from_utf8(bytes).expect("utf8 reply"),
            Reply::Quit => "SUCCESS: Disconnecting.".to_owned(),
        }
    }

    #[test]
    fn command_replies_match_the_protocol() {
        let dir = TempDir::new().expect("tempdir");
        let fs = test_fs(&dir);

        assert_eq!(line(&fs, "LIST"), "No files in filesystem.");
        assert_eq!(line(&fs, "CREATE a"), "SUCCESS: File 'a' created.");
        assert_eq!(line(&fs, "WRITE a hello world"), "SUCCESS: File 'a' written.");
        assert_eq!(line(&fs, "READ a"), "hello world");
        assert_eq!(line(&fs, "CREATE b"), "SUCCESS: File 'b' created.");
        assert_eq!(line(&fs, "LIST"), "a, b");
        assert_eq!(line(&fs, "DELETE a"), "SUCCESS: File 'a' deleted.");
        assert_eq!(line(&fs, "READ a"), "ERROR: file a does not exist");
        assert_eq!(line(&fs, "QUIT"), "SUCCESS: Disconnecting.");
    }

    #[test]
    fn failures_surface_as_error_lines() {
        let dir = TempDir::new().expect("tempdir");
        let fs = test_fs(&dir);

        assert_eq!(line(&fs, ""), "ERROR: Empty command");
        assert_eq!(line(&fs, "FROB x"), "ERROR: Unknown command.");
        assert_eq!(line(&fs, "WRITE a"), "ERROR: WRITE requires filename and content");
        assert_eq!(
            line(&fs, "CREATE averylongfilename"),
            "ERROR: filename too long"
        );
        assert_eq!(
            line(&fs, "WRITE ghost data"),
            "ERROR: file ghost does not exist"
        );
    }
}
