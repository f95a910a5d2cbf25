use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::Config;
use crate::constants::DEFAULT_DOWNLOAD_CHUNK_SIZE;
use crate::core_fs::tests::test_dir;
use crate::server::FtpServer;

const IO_TIMEOUT: Duration = Duration::from_secs(10);

struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    async fn connect(server: &FtpServer) -> Self {
        let stream = TcpStream::connect(server.local_addr()).await.unwrap();
        let (read_half, writer) = stream.into_split();
        let mut client = Self {
            reader: BufReader::new(read_half),
            writer,
        };
        let greeting = client.read_reply().await;
        assert!(greeting.starts_with("220 "), "greeting: {}", greeting);
        client
    }

    async fn read_line(&mut self) -> String {
        let mut line = String::new();
        timeout(IO_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a reply")
            .unwrap();
        line
    }

    /// Reads one complete reply, following multi-line replies to their end.
    async fn read_reply(&mut self) -> String {
        let mut reply = self.read_line().await;
        if reply.len() >= 4 && reply.as_bytes()[3] == b'-' {
            let terminator = format!("{} ", &reply[..3]);
            loop {
                let line = self.read_line().await;
                let done = line.starts_with(&terminator) || line.is_empty();
                reply.push_str(&line);
                if done {
                    break;
                }
            }
        }
        reply
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{}\r\n", line).as_bytes())
            .await
            .unwrap();
    }

    async fn cmd(&mut self, line: &str) -> String {
        self.send(line).await;
        self.read_reply().await
    }

    async fn login(&mut self) {
        assert!(self.cmd("USER test").await.starts_with("331"));
        assert!(self.cmd("PASS secret").await.starts_with("230"));
    }

    async fn pasv_port(&mut self) -> u16 {
        let reply = self.cmd("PASV").await;
        assert!(reply.starts_with("227 "), "PASV reply: {}", reply);
        parse_pasv_port(&reply)
    }

    async fn pasv(&mut self) -> TcpStream {
        let port = self.pasv_port().await;
        TcpStream::connect(("127.0.0.1", port)).await.unwrap()
    }

    /// True once the server closed the control connection.
    async fn wait_for_close(&mut self) -> bool {
        let mut buf = Vec::new();
        matches!(
            timeout(IO_TIMEOUT, self.reader.read_to_end(&mut buf)).await,
            Ok(Ok(_))
        )
    }

    async fn stor(&mut self, name: &str, payload: &[u8]) -> String {
        let mut data = self.pasv().await;
        let reply = self.cmd(&format!("STOR {}", name)).await;
        assert!(reply.starts_with("150"), "STOR reply: {}", reply);
        data.write_all(payload).await.unwrap();
        data.shutdown().await.unwrap();
        drop(data);
        self.read_reply().await
    }

    async fn retr(&mut self, name: &str) -> (Vec<u8>, String) {
        let mut data = self.pasv().await;
        let reply = self.cmd(&format!("RETR {}", name)).await;
        assert!(reply.starts_with("150"), "RETR reply: {}", reply);
        let mut received = Vec::new();
        timeout(IO_TIMEOUT, data.read_to_end(&mut received))
            .await
            .unwrap()
            .unwrap();
        (received, self.read_reply().await)
    }

    async fn list(&mut self) -> String {
        let mut data = self.pasv().await;
        let reply = self.cmd("LIST").await;
        assert!(reply.starts_with("150"), "LIST reply: {}", reply);
        let mut listing = String::new();
        timeout(IO_TIMEOUT, data.read_to_string(&mut listing))
            .await
            .unwrap()
            .unwrap();
        assert!(self.read_reply().await.starts_with("226"));
        listing
    }
}

fn parse_pasv_port(reply: &str) -> u16 {
    let start = reply.find('(').unwrap() + 1;
    let end = reply.find(')').unwrap();
    let fields: Vec<u16> = reply[start..end]
        .split(',')
        .map(|f| f.trim().parse().unwrap())
        .collect();
    assert_eq!(fields.len(), 6);
    fields[4] * 256 + fields[5]
}

fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.server.listen_address = String::from("127.0.0.1");
    config.server.listen_port = 0;
    config.server.root_dir = root.to_string_lossy().into_owned();
    config.server.pasv_address = Some(String::from("127.0.0.1"));
    config.server.pasv_port_min = 0;
    config.server.pasv_port_max = 0;
    config.server.sweep_interval_ms = 20;
    config
}

async fn start_server(name: &str) -> (FtpServer, PathBuf) {
    let root = test_dir(name);
    let server = FtpServer::start(test_config(&root)).await.unwrap();
    (server, root)
}

async fn wait_for_client_count(server: &FtpServer, expected: usize) {
    for _ in 0..250 {
        if server.client_count() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(server.client_count(), expected);
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 256) as u8).collect()
}

#[tokio::test]
async fn test_commands_require_login() {
    let (server, _root) = start_server("auth_gate").await;
    let mut client = TestClient::connect(&server).await;

    assert!(client.cmd("PWD").await.starts_with("530"));
    assert!(client.cmd("PASV").await.starts_with("530"));
    assert!(client.cmd("SYST").await.starts_with("215"));
    assert!(client.cmd("NOOP").await.starts_with("200"));

    client.login().await;
    assert_eq!(client.cmd("PWD").await, "257 \"/\" is current directory\r\n");
    server.stop().await;
}

#[tokio::test]
async fn test_feat_and_unsupported_commands() {
    let (server, _root) = start_server("feat").await;
    let mut client = TestClient::connect(&server).await;
    client.login().await;

    assert_eq!(
        client.cmd("FEAT").await,
        "211-Extensions supported:\r\n SIZE\r\n REST STREAM\r\n UTF8\r\n211 End\r\n"
    );
    assert!(client.cmd("PORT 127,0,0,1,4,1").await.starts_with("502"));
    assert!(client.cmd("MLSD").await.starts_with("502"));
    assert!(client.cmd("SITE HELP").await.starts_with("502"));
    assert!(client.cmd("OPTS utf8 on").await.starts_with("200"));
    assert!(client.cmd("OPTS MODE Z").await.starts_with("502"));
    assert!(client.cmd("TYPE A").await.starts_with("200"));
    assert!(client.cmd("REST abc").await.starts_with("501"));
    assert!(client.cmd("RETR").await.starts_with("501"));
    server.stop().await;
}

#[tokio::test]
async fn test_cwd_round_trip() {
    let (server, root) = start_server("cwd").await;
    std::fs::create_dir(root.join("sub")).unwrap();
    let mut client = TestClient::connect(&server).await;
    client.login().await;

    assert!(client.cmd("CWD sub").await.starts_with("250"));
    assert_eq!(client.cmd("PWD").await, "257 \"/sub\" is current directory\r\n");
    assert!(client.cmd("CWD ..").await.starts_with("250"));
    assert_eq!(client.cmd("PWD").await, "257 \"/\" is current directory\r\n");

    assert!(client.cmd("CWD missing").await.starts_with("550"));
    assert!(client.cmd("CWD ..").await.starts_with("550"));
    assert!(client.cmd("CDUP").await.starts_with("250"));
    assert_eq!(client.cmd("PWD").await, "257 \"/\" is current directory\r\n");

    assert!(client.cmd("CWD /sub").await.starts_with("250"));
    assert!(client.cmd("XCUP").await.starts_with("250"));
    assert_eq!(client.cmd("XPWD").await, "257 \"/\" is current directory\r\n");
    server.stop().await;
}

#[tokio::test]
async fn test_upload_download_round_trip() {
    let (server, root) = start_server("round_trip").await;
    let mut client = TestClient::connect(&server).await;
    client.login().await;

    let chunk = DEFAULT_DOWNLOAD_CHUNK_SIZE;
    for size in [0, 1, chunk - 1, chunk, chunk + 1, 10 * chunk] {
        let name = format!("file_{}.bin", size);
        let data = payload(size);

        let reply = client.stor(&name, &data).await;
        assert!(reply.starts_with("226"), "STOR {} bytes: {}", size, reply);
        assert_eq!(std::fs::read(root.join(&name)).unwrap(), data);
        assert_eq!(client.cmd(&format!("SIZE {}", name)).await, format!("213 {}\r\n", size));

        let (received, reply) = client.retr(&name).await;
        assert!(reply.starts_with("226"), "RETR {} bytes: {}", size, reply);
        assert_eq!(received, data, "RETR {} bytes", size);
    }
    server.stop().await;
}

#[tokio::test]
async fn test_rest_resumes_download_and_upload() {
    let (server, root) = start_server("rest").await;
    std::fs::write(root.join("f.bin"), b"0123456789").unwrap();
    let mut client = TestClient::connect(&server).await;
    client.login().await;

    assert!(client.cmd("REST 4").await.starts_with("350"));
    let (received, reply) = client.retr("f.bin").await;
    assert!(reply.starts_with("226"));
    assert_eq!(received, b"456789");

    // the offset only applies once
    let (received, _) = client.retr("f.bin").await;
    assert_eq!(received, b"0123456789");

    assert!(client.cmd("REST 6").await.starts_with("350"));
    assert!(client.stor("f.bin", b"abc").await.starts_with("226"));
    assert_eq!(std::fs::read(root.join("f.bin")).unwrap(), b"012345abc");
    server.stop().await;
}

#[tokio::test]
async fn test_missing_file_and_path_escape() {
    let (server, _root) = start_server("missing").await;
    let mut client = TestClient::connect(&server).await;
    client.login().await;

    let _data = client.pasv().await;
    let mut reply = client.cmd("RETR nothing.bin").await;
    if reply.starts_with("150") {
        // the command was parked until the data connection got accepted
        reply = client.read_reply().await;
    }
    assert!(reply.starts_with("550"), "RETR reply: {}", reply);
    // the data connection was released with the failed command
    assert!(client.cmd("LIST").await.starts_with("425"));

    assert!(client.cmd("SIZE ../../etc/passwd").await.starts_with("550"));
    assert!(client.cmd("DELE nothing.bin").await.starts_with("550"));
    server.stop().await;
}

#[tokio::test]
async fn test_data_command_without_pasv() {
    let (server, _root) = start_server("no_pasv").await;
    let mut client = TestClient::connect(&server).await;
    client.login().await;

    assert!(client.cmd("LIST").await.starts_with("425"));
    assert!(client.cmd("STOR x").await.starts_with("425"));
    assert!(client.cmd("NOOP").await.starts_with("200"));
    server.stop().await;
}

const BIG_FILE_LEN: usize = 64 << 20;

/// Closes `stream` with a reset instead of an orderly shutdown.
#[allow(deprecated)]
fn reset(stream: TcpStream) {
    stream.set_linger(Some(Duration::ZERO)).unwrap();
    drop(stream);
}

#[tokio::test]
async fn test_data_reset_ends_download_only() {
    let (server, root) = start_server("reset_retr").await;
    std::fs::write(root.join("big.bin"), vec![7u8; BIG_FILE_LEN]).unwrap();
    let mut client = TestClient::connect(&server).await;
    client.login().await;

    let mut data = client.pasv().await;
    let reply = client.cmd("RETR big.bin").await;
    assert!(reply.starts_with("150"), "RETR reply: {}", reply);
    let mut head = [0u8; 4096];
    timeout(IO_TIMEOUT, data.read_exact(&mut head))
        .await
        .unwrap()
        .unwrap();
    reset(data);

    let reply = client.read_reply().await;
    assert_eq!(reply, "426 Connection closed; transfer aborted\r\n");
    assert!(client.cmd("NOOP").await.starts_with("200"));
    assert!(client.cmd("PWD").await.starts_with("257"));
    server.stop().await;
}

#[tokio::test]
async fn test_data_reset_ends_upload_only() {
    let (server, _root) = start_server("reset_stor").await;
    let mut client = TestClient::connect(&server).await;
    client.login().await;

    let mut data = client.pasv().await;
    let reply = client.cmd("STOR partial.bin").await;
    assert!(reply.starts_with("150"), "STOR reply: {}", reply);
    data.write_all(&payload(64 * 1024)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    reset(data);

    let reply = client.read_reply().await;
    assert_eq!(reply, "426 Connection closed; transfer aborted\r\n");
    assert!(client.cmd("NOOP").await.starts_with("200"));

    // the session can run the next transfer
    assert!(client.stor("after.bin", b"ok").await.starts_with("226"));
    server.stop().await;
}

#[tokio::test]
async fn test_pasv_during_download_reports_abort() {
    let (server, root) = start_server("pasv_abort").await;
    std::fs::write(root.join("big.bin"), vec![7u8; BIG_FILE_LEN]).unwrap();
    let mut client = TestClient::connect(&server).await;
    client.login().await;

    let mut data = client.pasv().await;
    let reply = client.cmd("RETR big.bin").await;
    assert!(reply.starts_with("150"), "RETR reply: {}", reply);
    let mut head = [0u8; 4096];
    timeout(IO_TIMEOUT, data.read_exact(&mut head))
        .await
        .unwrap()
        .unwrap();

    let reply = client.cmd("PASV").await;
    assert_eq!(reply, "426 Connection closed; transfer aborted\r\n");
    let reply = client.read_reply().await;
    assert!(reply.starts_with("227 "), "PASV reply: {}", reply);

    // the old data connection was closed before the whole file went out
    let mut rest = Vec::new();
    let _ = timeout(IO_TIMEOUT, data.read_to_end(&mut rest)).await.unwrap();
    assert!(head.len() + rest.len() < BIG_FILE_LEN);
    assert!(client.cmd("NOOP").await.starts_with("200"));
    server.stop().await;
}

#[tokio::test]
async fn test_rename_is_per_session() {
    let (server, root) = start_server("rename").await;
    std::fs::write(root.join("a.txt"), b"a").unwrap();
    std::fs::write(root.join("taken.txt"), b"t").unwrap();
    let mut first = TestClient::connect(&server).await;
    let mut second = TestClient::connect(&server).await;
    first.login().await;
    second.login().await;

    assert!(first.cmd("RNFR ghost.txt").await.starts_with("550"));
    assert!(first.cmd("RNTO b.txt").await.starts_with("503"));

    assert!(first.cmd("RNFR a.txt").await.starts_with("350"));
    assert!(second.cmd("RNTO stolen.txt").await.starts_with("503"));
    assert!(root.join("a.txt").exists());

    assert!(first.cmd("RNTO taken.txt").await.starts_with("550"));
    assert_eq!(std::fs::read(root.join("taken.txt")).unwrap(), b"t");
    // the failed RNTO consumed the source
    assert!(first.cmd("RNTO b.txt").await.starts_with("503"));

    assert!(first.cmd("RNFR a.txt").await.starts_with("350"));
    assert!(first.cmd("RNTO b.txt").await.starts_with("250"));
    assert!(!root.join("a.txt").exists());
    assert_eq!(std::fs::read(root.join("b.txt")).unwrap(), b"a");
    server.stop().await;
}

#[tokio::test]
async fn test_directory_commands() {
    let (server, root) = start_server("dirs").await;
    let mut client = TestClient::connect(&server).await;
    client.login().await;

    assert_eq!(client.cmd("MKD d").await, "257 \"/d\" created\r\n");
    assert!(client.cmd("MKD d").await.starts_with("550"));
    assert!(client.stor("d/inner.txt", b"x").await.starts_with("226"));

    assert!(client.cmd("RMD d").await.starts_with("550"));
    assert!(root.join("d").join("inner.txt").exists());

    assert!(client.cmd("DELE d/inner.txt").await.starts_with("250"));
    assert!(client.cmd("RMD d").await.starts_with("250"));
    assert!(!root.join("d").exists());
    server.stop().await;
}

#[tokio::test]
async fn test_listing_is_per_session() {
    let (server, root) = start_server("listing").await;
    std::fs::create_dir(root.join("one")).unwrap();
    std::fs::create_dir(root.join("two")).unwrap();
    std::fs::write(root.join("one").join("only_in_one.txt"), b"1").unwrap();
    std::fs::write(root.join("two").join("only_in_two.txt"), b"22").unwrap();

    let mut first = TestClient::connect(&server).await;
    let mut second = TestClient::connect(&server).await;
    first.login().await;
    second.login().await;
    assert!(first.cmd("CWD one").await.starts_with("250"));
    assert!(second.cmd("CWD two").await.starts_with("250"));

    let first_listing = first.list().await;
    let second_listing = second.list().await;
    assert!(first_listing.contains("only_in_one.txt"));
    assert!(!first_listing.contains("only_in_two.txt"));
    assert!(second_listing.contains("only_in_two.txt"));
    assert!(!second_listing.contains("only_in_one.txt"));
    server.stop().await;
}

#[tokio::test]
async fn test_listing_format() {
    let (server, root) = start_server("listing_format").await;
    let file = root.join("data.bin");
    std::fs::write(&file, vec![0u8; 1234]).unwrap();
    let mtime = filetime::FileTime::from_unix_time(1_700_000_000, 0);
    filetime::set_file_mtime(&file, mtime).unwrap();
    std::fs::create_dir(root.join("folder")).unwrap();

    let mut client = TestClient::connect(&server).await;
    client.login().await;
    let listing = client.list().await;
    let lines: Vec<&str> = listing.split_terminator("\r\n").collect();

    let date = chrono::DateTime::<chrono::Local>::from(
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000),
    )
    .format("%b %d %H:%M")
    .to_string();
    assert_eq!(lines[0], "drwxr-xr-x 1 ftp ftp     4096 Jan 01 2020 .");
    assert_eq!(lines[1], "drwxr-xr-x 1 ftp ftp     4096 Jan 01 2020 ..");
    assert_eq!(lines[2], format!("-rwxr-xr-x 1 ftp ftp     1234 {} data.bin", date));
    assert!(lines[3].starts_with("drwxr-xr-x 1 ftp ftp     4096 "));
    assert!(lines[3].ends_with(" folder"));
    assert_eq!(lines.len(), 4);
    server.stop().await;
}

#[tokio::test]
async fn test_list_before_data_connection() {
    let (server, root) = start_server("pending_list").await;
    std::fs::write(root.join("hello.txt"), b"hi").unwrap();
    let mut client = TestClient::connect(&server).await;
    client.login().await;

    let port = client.pasv_port().await;
    assert_eq!(client.cmd("LIST").await, "150 Waiting for data connection\r\n");

    let mut data = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let mut listing = String::new();
    timeout(IO_TIMEOUT, data.read_to_string(&mut listing))
        .await
        .unwrap()
        .unwrap();
    assert!(listing.contains("hello.txt"));
    // no second preliminary reply
    assert!(client.read_reply().await.starts_with("226"));
    server.stop().await;
}

#[tokio::test]
async fn test_new_pasv_replaces_previous_listener() {
    let (server, _root) = start_server("pasv_twice").await;
    let mut client = TestClient::connect(&server).await;
    client.login().await;

    let first_port = client.pasv_port().await;
    let _data = client.pasv().await;
    // the first listener is closed
    assert!(TcpStream::connect(("127.0.0.1", first_port)).await.is_err());
    assert!(client.cmd("LIST").await.starts_with("150"));
    assert!(client.read_reply().await.starts_with("226"));

    let reply = client.cmd("EPSV").await;
    assert!(reply.starts_with("229 Entering Extended Passive Mode (|||"), "{}", reply);
    server.stop().await;
}

#[tokio::test]
async fn test_data_timeout_keeps_session() {
    let root = test_dir("data_timeout");
    let mut config = test_config(&root);
    config.server.data_timeout_secs = 1;
    let server = FtpServer::start(config).await.unwrap();
    let mut client = TestClient::connect(&server).await;
    client.login().await;

    let _port = client.pasv_port().await;
    assert!(client.cmd("LIST").await.starts_with("150"));
    assert_eq!(client.read_reply().await, "421 Data connection timeout\r\n");

    assert!(client.cmd("NOOP").await.starts_with("200"));
    assert!(client.cmd("LIST").await.starts_with("425"));
    assert_eq!(server.client_count(), 1);
    server.stop().await;
}

#[tokio::test]
async fn test_quit_releases_sessions() {
    let (server, _root) = start_server("reclaim").await;

    for _ in 0..5 {
        let mut client = TestClient::connect(&server).await;
        client.login().await;
        let _data = client.pasv().await;
        assert_eq!(client.cmd("QUIT").await, "221 Goodbye\r\n");
        assert!(client.wait_for_close().await);
    }
    wait_for_client_count(&server, 0).await;
    server.stop().await;
}

#[tokio::test]
async fn test_client_disconnect_is_reaped() {
    let (server, _root) = start_server("disconnect").await;
    let mut client = TestClient::connect(&server).await;
    client.login().await;
    wait_for_client_count(&server, 1).await;

    drop(client);
    wait_for_client_count(&server, 0).await;
    server.stop().await;
}

#[tokio::test]
async fn test_admin_close_and_stop() {
    let (server, _root) = start_server("admin_close").await;
    let mut first = TestClient::connect(&server).await;
    let mut second = TestClient::connect(&server).await;
    first.login().await;
    second.login().await;
    wait_for_client_count(&server, 2).await;

    let ids = server.session_ids();
    assert!(server.request_close(ids[0]));
    assert!(!server.request_close(u64::MAX));
    wait_for_client_count(&server, 1).await;

    server.stop().await;
    assert!(!server.is_running());
    assert_eq!(server.client_count(), 0);
    assert!(first.wait_for_close().await);
    assert!(second.wait_for_close().await);
    server.stop().await;
}

#[tokio::test]
async fn test_end_to_end_scenario() {
    let (server, _root) = start_server("scenario").await;
    let mut client = TestClient::connect(&server).await;

    client.login().await;
    assert_eq!(client.cmd("PWD").await, "257 \"/\" is current directory\r\n");
    assert!(client.cmd("TYPE I").await.starts_with("200"));

    let listing = client.list().await;
    assert!(listing.starts_with("drwxr-xr-x 1 ftp ftp     4096 Jan 01 2020 .\r\n"));

    assert!(client.stor("f.bin", b"abc").await.starts_with("226"));
    let (received, reply) = client.retr("f.bin").await;
    assert!(reply.starts_with("226"));
    assert_eq!(received, b"abc");

    assert_eq!(client.cmd("QUIT").await, "221 Goodbye\r\n");
    assert!(client.wait_for_close().await);
    wait_for_client_count(&server, 0).await;
    server.stop().await;
}
