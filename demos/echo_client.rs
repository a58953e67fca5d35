//! A simple echo client example demonstrating basic WebSocket usage.
//!
//! Splits the session so one task prints incoming messages while the main
//! task sends text, a fragmented binary message and a ping, then closes.
//!
//! `cargo run --example echo_client -- wss://echo.websocket.org/`

use anyhow::Result;
use monoio_ws_session::{Message, SessionConfig, WsClient};

const EXPECTED: usize = 3;

#[monoio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "wss://echo.websocket.org/".to_owned());
    println!("Connecting to {url}...");

    // Small send frames so the binary message goes out fragmented.
    let config = SessionConfig::default().with_max_send_frame_size(512);
    let client = WsClient::connect_with_config(&url, &[], config).await?;
    let (mut reader, mut writer) = client.split();

    let printer = monoio::spawn(async move {
        let mut seen = 0;
        while let Some(message) = reader.recv().await {
            match message {
                Message::Text(text) => println!("Text: {text}"),
                Message::Binary(bytes) => println!("Binary message ({} bytes)", bytes.len()),
            }
            seen += 1;
            if seen == EXPECTED {
                break;
            }
        }
        reader
    });

    writer.send("Hello from monoio-ws-session!").await;
    writer.send(vec![0xA5u8; 2000]).await;
    writer.ping(b"are you there").await?;

    let reader = printer.await;
    writer.close().await;
    println!("Closed: {:?}", reader.close_cause());
    Ok(())
}
