use std::path::PathBuf;
use std::sync::Arc;

use bytes::{Buf, Bytes};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Duration;

use minidb_protocol::Frame;
use minidb_server::{Connection, handle_connection};
use minidb_storage::{Db, load_snapshot};

/// Sobe um servidor de teste na porta dada, com snapshot em `dump`.
/// Abortar o JoinHandle derruba o listener (simula restart).
async fn start_server(port: u16, dump: PathBuf) -> tokio::task::JoinHandle<()> {
    let handle = tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{port}"))
            .await
            .unwrap();
        let db = Db::new();
        load_snapshot(&db, &dump).await.unwrap();

        let dump = Arc::new(dump);
        let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

        loop {
            let (socket, _) = listener.accept().await.unwrap();
            let db = db.clone();
            let dump = dump.clone();
            let mut shutdown_rx = shutdown_tx.subscribe();
            tokio::spawn(async move {
                let conn = Connection::new(socket);
                let _ = handle_connection(conn, db, dump, &mut shutdown_rx).await;
            });
        }
    });

    // Aguardar o listener estar pronto
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle
}

fn temp_dump(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("minidb_test_{name}_{}.rdb", std::process::id()))
}

async fn send_command(stream: &mut TcpStream, args: &[&str]) -> Frame {
    let frame = Frame::array_from_strs(args);
    let mut buf = bytes::BytesMut::new();
    frame.encode(&mut buf);
    stream.write_all(&buf).await.unwrap();
    stream.flush().await.unwrap();

    read_frame(stream).await
}

async fn read_frame(stream: &mut TcpStream) -> Frame {
    let mut response_buf = bytes::BytesMut::with_capacity(4096);
    loop {
        let n = stream.read_buf(&mut response_buf).await.unwrap();
        assert!(n > 0, "server closed connection unexpectedly");

        if let Some((frame, _)) = Frame::decode(&response_buf).unwrap() {
            return frame;
        }
    }
}

async fn connect(port: u16) -> TcpStream {
    TcpStream::connect(format!("127.0.0.1:{port}")).await.unwrap()
}

#[tokio::test]
async fn test_ping_pong() {
    let port = 16500;
    let _server = start_server(port, temp_dump("ping")).await;
    let mut stream = connect(port).await;

    let response = send_command(&mut stream, &["PING"]).await;
    assert_eq!(response, Frame::Simple("PONG".into()));

    let response = send_command(&mut stream, &["ping"]).await;
    assert_eq!(response, Frame::Simple("PONG".into()));
}

#[tokio::test]
async fn test_echo() {
    let port = 16501;
    let _server = start_server(port, temp_dump("echo")).await;
    let mut stream = connect(port).await;

    let response = send_command(&mut stream, &["ECHO", "Hello, MiniDB!"]).await;
    assert_eq!(response, Frame::Bulk(Bytes::from("Hello, MiniDB!")));
}

#[tokio::test]
async fn test_set_get_missing() {
    let port = 16502;
    let _server = start_server(port, temp_dump("setget")).await;
    let mut stream = connect(port).await;

    let response = send_command(&mut stream, &["SET", "name", "redis"]).await;
    assert_eq!(response, Frame::Simple("OK".into()));

    let response = send_command(&mut stream, &["GET", "name"]).await;
    assert_eq!(response, Frame::Bulk(Bytes::from("redis")));

    let response = send_command(&mut stream, &["GET", "missing"]).await;
    assert_eq!(response, Frame::Null);
}

#[tokio::test]
async fn test_set_get_raw_wire_bytes() {
    let port = 16503;
    let _server = start_server(port, temp_dump("raw")).await;
    let mut stream = connect(port).await;

    stream
        .write_all(b"*3\r\n$3\r\nSET\r\n$4\r\nname\r\n$5\r\nredis\r\n")
        .await
        .unwrap();
    let mut reply = [0u8; 5];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(&reply, b"+OK\r\n");

    stream
        .write_all(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n")
        .await
        .unwrap();
    let mut reply = [0u8; 11];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(&reply, b"$5\r\nredis\r\n");
}

#[tokio::test]
async fn test_pipelined_requests() {
    let port = 16504;
    let _server = start_server(port, temp_dump("pipeline")).await;
    let mut stream = connect(port).await;

    // Dois comandos num único write; respostas chegam na ordem.
    // Um buffer só para as duas: elas podem vir coladas no mesmo read.
    stream
        .write_all(b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n*2\r\n$3\r\nGET\r\n$1\r\nk\r\n")
        .await
        .unwrap();

    let mut buf = bytes::BytesMut::with_capacity(4096);
    let mut replies = Vec::new();
    while replies.len() < 2 {
        let n = stream.read_buf(&mut buf).await.unwrap();
        assert!(n > 0, "server closed connection unexpectedly");

        while let Some((frame, used)) = Frame::decode(&buf).unwrap() {
            buf.advance(used);
            replies.push(frame);
        }
    }

    assert_eq!(replies[0], Frame::Simple("OK".into()));
    assert_eq!(replies[1], Frame::Bulk(Bytes::from("v")));
}

#[tokio::test]
async fn test_list_push_range_pop() {
    let port = 16505;
    let _server = start_server(port, temp_dump("list")).await;
    let mut stream = connect(port).await;

    let response = send_command(&mut stream, &["LPUSH", "L", "a", "b", "c"]).await;
    assert_eq!(response, Frame::Integer(3));

    // LPUSH a b c → [c, b, a]
    let response = send_command(&mut stream, &["LRANGE", "L", "0", "-1"]).await;
    assert_eq!(
        response,
        Frame::Array(vec![
            Frame::Bulk(Bytes::from("c")),
            Frame::Bulk(Bytes::from("b")),
            Frame::Bulk(Bytes::from("a")),
        ])
    );

    let response = send_command(&mut stream, &["RPOP", "L"]).await;
    assert_eq!(response, Frame::Bulk(Bytes::from("a")));

    let response = send_command(&mut stream, &["LPOP", "L"]).await;
    assert_eq!(response, Frame::Bulk(Bytes::from("c")));

    let response = send_command(&mut stream, &["LPOP", "missing"]).await;
    assert_eq!(response, Frame::Null);
}

#[tokio::test]
async fn test_wrongtype_reply() {
    let port = 16506;
    let _server = start_server(port, temp_dump("wrongtype")).await;
    let mut stream = connect(port).await;

    send_command(&mut stream, &["SET", "K", "v"]).await;
    let response = send_command(&mut stream, &["LPUSH", "K", "x"]).await;
    assert_eq!(
        response,
        Frame::Error(
            "ERR WRONGTYPE Operation against a key holding the wrong kind of value".into()
        )
    );

    // A chave não foi alterada pelo erro
    let response = send_command(&mut stream, &["GET", "K"]).await;
    assert_eq!(response, Frame::Bulk(Bytes::from("v")));
}

#[tokio::test]
async fn test_expire_ttl_lifecycle() {
    let port = 16507;
    let _server = start_server(port, temp_dump("expire")).await;
    let mut stream = connect(port).await;

    send_command(&mut stream, &["SET", "S", "abc"]).await;

    let response = send_command(&mut stream, &["EXPIRE", "S", "1"]).await;
    assert_eq!(response, Frame::Integer(1));

    let response = send_command(&mut stream, &["TTL", "S"]).await;
    assert!(matches!(response, Frame::Integer(n) if (0..=1).contains(&n)));

    tokio::time::sleep(Duration::from_millis(1_100)).await;

    let response = send_command(&mut stream, &["GET", "S"]).await;
    assert_eq!(response, Frame::Null);

    let response = send_command(&mut stream, &["TTL", "S"]).await;
    assert_eq!(response, Frame::Integer(-2));

    let response = send_command(&mut stream, &["EXPIRE", "missing", "10"]).await;
    assert_eq!(response, Frame::Integer(0));
}

#[tokio::test]
async fn test_del_persist() {
    let port = 16508;
    let _server = start_server(port, temp_dump("delpersist")).await;
    let mut stream = connect(port).await;

    send_command(&mut stream, &["SET", "k", "v"]).await;
    send_command(&mut stream, &["EXPIRE", "k", "100"]).await;

    let response = send_command(&mut stream, &["PERSIST", "k"]).await;
    assert_eq!(response, Frame::Integer(1));
    let response = send_command(&mut stream, &["PERSIST", "k"]).await;
    assert_eq!(response, Frame::Integer(0));
    let response = send_command(&mut stream, &["TTL", "k"]).await;
    assert_eq!(response, Frame::Integer(-1));

    let response = send_command(&mut stream, &["DEL", "k"]).await;
    assert_eq!(response, Frame::Integer(1));
    let response = send_command(&mut stream, &["DEL", "k"]).await;
    assert_eq!(response, Frame::Integer(0));
}

#[tokio::test]
async fn test_unknown_command_and_arity() {
    let port = 16509;
    let _server = start_server(port, temp_dump("unknown")).await;
    let mut stream = connect(port).await;

    let response = send_command(&mut stream, &["FLUSHALL"]).await;
    match response {
        Frame::Error(msg) => assert!(msg.contains("unknown command")),
        _ => panic!("expected error frame"),
    }

    let response = send_command(&mut stream, &["GET"]).await;
    assert!(matches!(response, Frame::Error(msg) if msg.starts_with("ERR")));

    // A conexão continua utilizável depois dos erros
    let response = send_command(&mut stream, &["PING"]).await;
    assert_eq!(response, Frame::Simple("PONG".into()));
}

#[tokio::test]
async fn test_save_restart_reload() {
    let dump = temp_dump("save_reload");
    let _ = std::fs::remove_file(&dump);

    let port = 16510;
    let server = start_server(port, dump.clone()).await;
    let mut stream = connect(port).await;

    send_command(&mut stream, &["SET", "b", "2"]).await;
    send_command(&mut stream, &["RPUSH", "fruits", "apple", "banana", "cherry"]).await;

    let response = send_command(&mut stream, &["SAVE"]).await;
    assert_eq!(response, Frame::Simple("OK".into()));

    // "Restart": derruba o servidor e sobe outro com o mesmo dump
    drop(stream);
    server.abort();

    let port2 = 16511;
    let _server2 = start_server(port2, dump.clone()).await;
    let mut stream = connect(port2).await;

    let response = send_command(&mut stream, &["GET", "b"]).await;
    assert_eq!(response, Frame::Bulk(Bytes::from("2")));

    let response = send_command(&mut stream, &["LRANGE", "fruits", "0", "-1"]).await;
    assert_eq!(
        response,
        Frame::Array(vec![
            Frame::Bulk(Bytes::from("apple")),
            Frame::Bulk(Bytes::from("banana")),
            Frame::Bulk(Bytes::from("cherry")),
        ])
    );

    let _ = std::fs::remove_file(&dump);
}

#[tokio::test]
async fn test_expired_key_not_persisted() {
    let dump = temp_dump("expired_skip");
    let _ = std::fs::remove_file(&dump);

    let port = 16512;
    let server = start_server(port, dump.clone()).await;
    let mut stream = connect(port).await;

    send_command(&mut stream, &["SET", "a", "1"]).await;
    send_command(&mut stream, &["SET", "b", "2"]).await;
    send_command(&mut stream, &["EXPIRE", "a", "1"]).await;

    tokio::time::sleep(Duration::from_millis(1_100)).await;

    let response = send_command(&mut stream, &["SAVE"]).await;
    assert_eq!(response, Frame::Simple("OK".into()));

    drop(stream);
    server.abort();

    let port2 = 16513;
    let _server2 = start_server(port2, dump.clone()).await;
    let mut stream = connect(port2).await;

    let response = send_command(&mut stream, &["GET", "a"]).await;
    assert_eq!(response, Frame::Null);
    let response = send_command(&mut stream, &["GET", "b"]).await;
    assert_eq!(response, Frame::Bulk(Bytes::from("2")));

    let _ = std::fs::remove_file(&dump);
}

#[tokio::test]
async fn test_concurrent_clients() {
    let port = 16514;
    let _server = start_server(port, temp_dump("concurrent")).await;

    let mut handles = Vec::new();
    for t in 0..8 {
        handles.push(tokio::spawn(async move {
            let mut stream = connect(port).await;
            for i in 0..50 {
                let key = format!("key:{t}:{i}");
                let response = send_command(&mut stream, &["SET", &key, "v"]).await;
                assert_eq!(response, Frame::Simple("OK".into()));
                let response = send_command(&mut stream, &["GET", &key]).await;
                assert_eq!(response, Frame::Bulk(Bytes::from("v")));
                send_command(&mut stream, &["RPUSH", "shared", &key]).await;
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let mut stream = connect(port).await;
    let response = send_command(&mut stream, &["LRANGE", "shared", "0", "-1"]).await;
    match response {
        Frame::Array(items) => assert_eq!(items.len(), 400),
        _ => panic!("expected array"),
    }
}
