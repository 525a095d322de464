//! Start a payment in extended mode and poll its status

use std::time::Duration;

use sepay::{Config, DEFAULT_PORT, SessionEvent, TcpTransport, Terminal, TransactionRequest};
use tokio::time::sleep;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let ip = std::env::var("TERMINAL_IP").unwrap_or_else(|_| "192.168.0.105".to_string());

    let config = Config::default()
        .with_extended_mode(true)
        // The customer has to tap a card before the terminal answers
        .with_timeout(Duration::from_secs(90));
    let terminal = Terminal::with_transport(TcpTransport::new(ip, DEFAULT_PORT), config);

    let mut events = terminal.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let SessionEvent::Disconnected = event {
                break;
            }
            println!("! {:?}", event);
        }
    });

    terminal.connect().await?;
    println!("Connected (extended mode: {})", terminal.is_extended());

    let request = TransactionRequest::new(1234, "AAA-123").with_merchant_reference("MRCHT45");
    let reply = terminal.start_transaction(&request).await?;
    println!("Transaction reply: {}", reply);

    sleep(Duration::from_secs(2)).await;

    let status = terminal.transaction_status(&request.reference).await?;
    println!("Status: {}", status);

    terminal.close().await?;

    Ok(())
}
