#![forbid(unsafe_code)]
//! End-to-end protocol round-trips against a live server on a loopback
//! socket.

use cfs_core::FsManager;
use cfs_server::FileServer;
use cfs_types::IMAGE_LEN;
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

struct Client {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Client {
    fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).expect("connect");
        Self {
            reader: BufReader::new(stream.try_clone().expect("clone")),
            writer: stream,
        }
    }

    fn send(&mut self, command: &str) -> String {
        self.writer
            .write_all(command.as_bytes())
            .and_then(|()| self.writer.write_all(b"\n"))
            .expect("send");
        let mut reply = String::new();
        self.reader.read_line(&mut reply).expect("reply");
        reply.trim_end_matches('\n').to_owned()
    }

    /// True once the server has closed its end.
    fn at_eof(&mut self) -> bool {
        let mut rest = String::new();
        self.reader.read_line(&mut rest).expect("read") == 0
    }
}

fn start_server(dir: &TempDir, workers: usize) -> SocketAddr {
    let fs = FsManager::open(dir.path().join("disk.img"), "e2efs", IMAGE_LEN).expect("open fs");
    let server = FileServer::bind("127.0.0.1:0", Arc::new(fs), workers).expect("bind");
    let addr = server.local_addr().expect("local addr");
    thread::spawn(move || {
        let _ = server.run();
    });
    addr
}

#[test]
fn full_session_over_the_wire() {
    let dir = TempDir::new().expect("tempdir");
    let addr = start_server(&dir, 2);
    let mut client = Client::connect(addr);

    assert_eq!(client.send("LIST"), "No files in filesystem.");
    assert_eq!(client.send("CREATE notes"), "SUCCESS: File 'notes' created.");
    assert_eq!(
        client.send("WRITE notes a line with   spaces"),
        "SUCCESS: File 'notes' written."
    );
    assert_eq!(client.send("READ notes"), "a line with   spaces");
    assert_eq!(client.send("LIST"), "notes");
    assert_eq!(client.send("DELETE notes"), "SUCCESS: File 'notes' deleted.");
    assert_eq!(client.send("LIST"), "No files in filesystem.");

    assert_eq!(client.send("QUIT"), "SUCCESS: Disconnecting.");
    assert!(client.at_eof());
}

#[test]
fn command_errors_do_not_end_the_session() {
    let dir = TempDir::new().expect("tempdir");
    let addr = start_server(&dir, 2);
    let mut client = Client::connect(addr);

    assert_eq!(client.send("   "), "ERROR: Empty command");
    assert_eq!(client.send("NONSENSE"), "ERROR: Unknown command.");
    assert_eq!(client.send("READ ghost"), "ERROR: file ghost does not exist");
    assert_eq!(client.send("CREATE"), "ERROR: CREATE requires a filename");
    // The connection is still healthy after four errors.
    assert_eq!(client.send("CREATE ok"), "SUCCESS: File 'ok' created.");
}

#[test]
fn sessions_share_one_file_system() {
    let dir = TempDir::new().expect("tempdir");
    let addr = start_server(&dir, 4);

    let mut first = Client::connect(addr);
    assert_eq!(first.send("CREATE shared"), "SUCCESS: File 'shared' created.");
    assert_eq!(
        first.send("WRITE shared from-first"),
        "SUCCESS: File 'shared' written."
    );

    let mut second = Client::connect(addr);
    assert_eq!(second.send("READ shared"), "from-first");
    assert_eq!(
        second.send("WRITE shared from-second"),
        "SUCCESS: File 'shared' written."
    );
    assert_eq!(first.send("READ shared"), "from-second");
}

#[test]
fn concurrent_clients_each_get_consistent_replies() {
    let dir = TempDir::new().expect("tempdir");
    let addr = start_server(&dir, 4);

    let mut handles = Vec::new();
    for i in 0..4 {
        handles.push(thread::spawn(move || {
            let mut client = Client::connect(addr);
            let name = format!("c{i}");
            assert_eq!(
                client.send(&format!("CREATE {name}")),
                format!("SUCCESS: File '{name}' created.")
            );
            for round in 0..10 {
                let body = format!("client {i} round {round}");
                assert_eq!(
                    client.send(&format!("WRITE {name} {body}")),
                    format!("SUCCESS: File '{name}' written.")
                );
                assert_eq!(client.send(&format!("READ {name}")), body);
            }
            assert_eq!(client.send("QUIT"), "SUCCESS: Disconnecting.");
        }));
    }
    for handle in handles {
        handle.join().expect("client thread");
    }
}

#[test]
fn a_dropped_connection_frees_its_worker() {
    let dir = TempDir::new().expect("tempdir");
    // One worker: if the dropped connection wedged it, the second client
    // would hang instead of being served.
    let addr = start_server(&dir, 1);

    {
        let mut first = Client::connect(addr);
        assert_eq!(first.send("CREATE gone"), "SUCCESS: File 'gone' created.");
        // Dropped without QUIT.
    }

    let mut second = Client::connect(addr);
    assert_eq!(second.send("LIST"), "gone");
}
