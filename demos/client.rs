//! Connects to a WebSocket server, sends one message, and prints whatever
//! comes back until the connection closes.
//!
//! Usage: `cargo run --example client -- ws://127.0.0.1:9000/`

use tokio_stream::StreamExt;
use ws_core::{StreamItem, WebSocketClient};

#[tokio::main]
async fn main() {
    env_logger::init();

    let url = std::env::args().nth(1).unwrap_or_else(|| "ws://127.0.0.1:9000/".to_string());

    let mut client = WebSocketClient::connect(&url)
        .await
        .expect("failed to connect");

    client
        .send_text("hello from the demo client")
        .await
        .expect("failed to send");

    while let Some(item) = client.next().await {
        match item {
            StreamItem::Text(text) => println!("text: {text}"),
            StreamItem::Binary(data) => println!("binary: {} bytes", data.len()),
            StreamItem::TerminalError(err) => {
                eprintln!("connection failed: {err}");
                break;
            }
        }
    }
}
