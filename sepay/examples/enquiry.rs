//! Terminal status check

use sepay::{DEFAULT_PORT, Terminal};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .init();

    // Change to your terminal IP
    let ip = std::env::var("TERMINAL_IP").unwrap_or_else(|_| "192.168.0.105".to_string());
    let port = std::env::var("TERMINAL_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    println!("Connecting to {}:{}...", ip, port);

    let terminal = Terminal::new(ip, port);
    terminal.connect().await?;
    println!("✓ Connected!");

    let status = terminal.enquiry().await?;
    println!("✓ Status: {}", status);

    terminal.close().await?;
    println!("✓ Disconnected");

    Ok(())
}
