//! End-to-end connection tests against a scripted local server.

// ============================================================================
// Imports
// ============================================================================

use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use socketio_legacy::protocol::apply_mask;
use socketio_legacy::{Callback, Client, ConnectionState, Error, FrameCodec, Opcode};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

// ============================================================================
// Server Helpers
// ============================================================================

/// Reads an HTTP request head up to the blank line.
async fn read_head(reader: &mut BufReader<TcpStream>) -> String {
    let mut head = String::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await.unwrap() == 0 || line == "\r\n" {
            return head;
        }
        head.push_str(&line);
    }
}

/// Accepts one connection and answers the session handshake.
async fn answer_handshake(listener: &TcpListener, status: &str, body: &str) -> String {
    let (socket, _) = listener.accept().await.unwrap();
    let mut reader = BufReader::new(socket);
    let head = read_head(&mut reader).await;

    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    reader.write_all(response.as_bytes()).await.unwrap();
    reader.flush().await.unwrap();
    head
}

/// Unmasked server text frame.
fn server_frame(text: &str) -> Vec<u8> {
    FrameCodec::new().encode(text.as_bytes(), Opcode::Text, false)
}

/// Reads one masked client frame.
async fn read_frame(reader: &mut BufReader<TcpStream>) -> String {
    let mut header = [0u8; 2];
    reader.read_exact(&mut header).await.unwrap();
    assert_ne!(header[1] & 0x80, 0);

    let length = match header[1] & 0x7F {
        126 => usize::from(reader.read_u16().await.unwrap()),
        127 => usize::try_from(reader.read_u64().await.unwrap()).unwrap(),
        short => usize::from(short),
    };

    let mut key = [0u8; 4];
    reader.read_exact(&mut key).await.unwrap();
    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await.unwrap();
    apply_mask(&mut payload, key);
    String::from_utf8(payload).unwrap()
}

/// Transcript of a scripted chat session.
struct Transcript {
    handshake: String,
    upgrade: String,
    frames: Vec<String>,
}

/// Serves a handshake, an upgrade and a short namespaced exchange.
async fn serve_chat() -> (u16, JoinHandle<Transcript>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let handshake =
            answer_handshake(&listener, "200 OK", "abc:60:60:websocket,xhr-polling").await;

        let (socket, _) = listener.accept().await.unwrap();
        let mut stream = BufReader::new(socket);
        let upgrade = read_head(&mut stream).await;

        let mut response =
            b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\r\n"
                .to_vec();
        response.extend_from_slice(&server_frame("1::"));
        stream.write_all(&response).await.unwrap();

        let mut frames = vec![read_frame(&mut stream).await, read_frame(&mut stream).await];

        stream
            .write_all(&server_frame(
                r#"5::/chat:{"name":"greet","args":[{"message":"hi"}]}"#,
            ))
            .await
            .unwrap();

        frames.push(read_frame(&mut stream).await);

        Transcript {
            handshake,
            upgrade,
            frames,
        }
    });

    (port, handle)
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_connection_flow() -> anyhow::Result<()> {
    let (port, server) = serve_chat().await;
    let received: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));

    let mut socket = Client::new(format!("http://127.0.0.1:{port}"))
        .of("/chat")
        .query([("token", "t1")])
        .handshake_timeout(5_000)
        .connection(async |socket| {
            let handle = socket.disconnect_handle();
            let received = Arc::clone(&received);
            socket.on(
                "greet",
                Callback::new(move |data| {
                    received.lock().unwrap().push(data.clone());
                    handle.disconnect();
                    Ok(())
                }),
            );
            socket.emit("hello", vec![json!("world")]).await
        })
        .await?;

    assert_eq!(socket.state(), ConnectionState::Connected);
    assert_eq!(socket.session().unwrap().session_id, "abc");
    assert_eq!(socket.handshake_response().unwrap().status, 200);

    socket.keep_alive().await?;
    assert_eq!(socket.state(), ConnectionState::Disconnected);
    assert_eq!(*received.lock().unwrap(), vec![json!({"message": "hi"})]);

    let transcript = server.await?;
    assert!(transcript.handshake.starts_with("GET /socket.io/1?token=t1 HTTP/1.1"));
    assert!(
        transcript
            .upgrade
            .starts_with("GET /socket.io/1/websocket/abc?token=t1 HTTP/1.1\r\n")
    );
    assert!(transcript.upgrade.contains("Sec-WebSocket-Version: 13\r\n"));
    assert!(transcript.upgrade.contains(&format!("Host: 127.0.0.1:{port}\r\n")));
    assert_eq!(
        transcript.frames,
        vec![
            "1::/chat:".to_owned(),
            r#"5::/chat:{"name":"hello","args":["world"]}"#.to_owned(),
            "0::/chat:".to_owned(),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_handshake_without_websocket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(async move {
        answer_handshake(&listener, "200 OK", "abc:60:60:xhr-polling").await;
    });

    let err = Client::new(format!("http://127.0.0.1:{port}"))
        .connect()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Handshake { .. }));
    server.await.unwrap();
}

#[tokio::test]
async fn test_handshake_empty_body() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(async move {
        answer_handshake(&listener, "200 OK", "").await;
    });

    let err = Client::new(format!("http://127.0.0.1:{port}"))
        .connect()
        .await
        .unwrap_err();

    assert!(err.is_handshake_error());
    server.await.unwrap();
}

#[tokio::test]
async fn test_upgrade_rejected() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(async move {
        answer_handshake(&listener, "200 OK", "abc:60:60:websocket").await;

        let (socket, _) = listener.accept().await.unwrap();
        let mut stream = BufReader::new(socket);
        read_head(&mut stream).await;
        stream
            .write_all(b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\n\r\n")
            .await
            .unwrap();
    });

    let err = Client::new(format!("http://127.0.0.1:{port}"))
        .connect()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Handshake { .. }));
    server.await.unwrap();
}

#[tokio::test]
async fn test_connect_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let err = Client::new(format!("http://127.0.0.1:{port}"))
        .handshake_timeout(2_000)
        .connect()
        .await
        .unwrap_err();

    assert!(err.is_handshake_error());
}
