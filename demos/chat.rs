//! Namespace chat against a socket.io 0.9 server.
//!
//! Demonstrates:
//! - Connecting and disconnecting right away
//! - Joining a namespace with a handshake query
//! - Registering callbacks and emitting before the keepalive loop
//! - Disconnecting from inside a callback
//!
//! Usage:
//!   cargo run --example chat
//!   cargo run --example chat -- --url http://localhost:3000
//!   cargo run --example chat -- --debug

// ============================================================================
// Imports
// ============================================================================

use serde_json::json;
use socketio_legacy::{Callback, Client, Result};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_URL: &str = "http://localhost:3000";

// ============================================================================
// Args
// ============================================================================

/// Command-line arguments.
#[derive(Debug, Clone)]
struct Args {
    url: String,
    debug: bool,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let url = args
            .iter()
            .position(|a| a == "--url")
            .and_then(|i| args.get(i + 1))
            .cloned()
            .unwrap_or_else(|| DEFAULT_URL.to_owned());

        Self {
            url,
            debug: args.iter().any(|a| a == "--debug"),
        }
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        "socketio_legacy=debug"
    } else {
        "socketio_legacy=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    println!("=== Chat ===\n");

    // ========================================================================
    // Connect and Disconnect
    // ========================================================================

    println!("[1] Connecting to {}...", args.url);

    let mut socket = Client::new(&args.url).debug(args.debug).connect().await?;
    println!("    ✓ Session {}", socket.session().map_or("-", |s| s.session_id.as_str()));

    socket.disconnect().await?;
    println!("    ✓ Disconnected\n");

    // ========================================================================
    // Namespace Session
    // ========================================================================

    println!("[2] Joining /active...");

    let mut socket = Client::new(&args.url)
        .debug(args.debug)
        .query([("query", "1")])
        .of("/active")
        .connection(async |socket| {
            socket.on(
                "connection",
                Callback::new(|data| {
                    println!("    <- connection: {data}");
                    Ok(())
                }),
            );

            socket.emit("sender", vec![json!("hello")]).await?;
            println!("    -> sender: [\"hello\"]");

            let handle = socket.disconnect_handle();
            socket.on(
                "message",
                Callback::new(move |data| {
                    println!("    <- message: {data}");
                    handle.disconnect();
                    Ok(())
                }),
            );
            Ok(())
        })
        .await?;

    println!("    ✓ Waiting for a message\n");
    socket.keep_alive().await?;

    println!("[3] Done ({})", socket.state());
    Ok(())
}
