//! Server-side helpers for unit tests.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::protocol::{FrameCodec, Opcode, apply_mask};
use crate::transport::Session;

/// Response head accepting an upgrade.
pub(crate) const SWITCHING_PROTOCOLS: &str =
    "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\r\n";

/// Session with id `sid` and the given heartbeat timeout.
pub(crate) fn test_session(heartbeat: u64) -> Session {
    Session::parse(&format!("sid:{heartbeat}:60:websocket")).unwrap()
}

/// Unmasked server frame carrying `text`.
pub(crate) fn server_frame(text: &str) -> Vec<u8> {
    FrameCodec::new().encode(text.as_bytes(), Opcode::Text, false)
}

/// Reads an HTTP request head up to the blank line.
pub(crate) async fn read_request_head<R>(reader: &mut R) -> String
where
    R: AsyncBufRead + Unpin,
{
    let mut head = String::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await.unwrap() == 0 || line == "\r\n" {
            return head;
        }
        head.push_str(&line);
    }
}

/// Accepts an upgrade and optionally sends one frame right after it.
pub(crate) async fn serve_upgrade<S>(stream: S, first_frame: Option<&'static str>) -> BufReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut server = BufReader::new(stream);
    let head = read_request_head(&mut server).await;
    assert!(head.starts_with("GET "), "unexpected request: {head}");

    let mut response = SWITCHING_PROTOCOLS.as_bytes().to_vec();
    if let Some(text) = first_frame {
        response.extend_from_slice(&server_frame(text));
    }
    server.write_all(&response).await.unwrap();
    server.flush().await.unwrap();
    server
}

/// Reads one masked client frame and returns its text.
pub(crate) async fn read_client_frame<R>(reader: &mut R) -> String
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 2];
    reader.read_exact(&mut header).await.unwrap();
    assert_eq!(header[0], 0x81, "expected a final text frame");
    assert_ne!(header[1] & 0x80, 0, "client frames must be masked");

    let length = match header[1] & 0x7F {
        126 => u64::from(reader.read_u16().await.unwrap()),
        127 => reader.read_u64().await.unwrap(),
        short => u64::from(short),
    };

    let mut key = [0u8; 4];
    reader.read_exact(&mut key).await.unwrap();

    let mut payload = vec![0u8; usize::try_from(length).unwrap()];
    reader.read_exact(&mut payload).await.unwrap();
    apply_mask(&mut payload, key);
    String::from_utf8(payload).unwrap()
}
