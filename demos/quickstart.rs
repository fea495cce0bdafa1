use iridium_stomp_ws::{
    AckMode, Command, Connection, ConnectionConfig, Heartbeat, StompEvent, WebSocketTransport,
};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Expects a broker with STOMP over WebSocket on localhost:15674 (e.g.
    // RabbitMQ with the web_stomp plugin). `RUST_LOG=debug` shows engine logs.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let template = WebSocketTransport::new("ws://127.0.0.1:15674/ws")?;
    let config = ConnectionConfig::default()
        .heartbeat(Heartbeat::new(4000, 4000))
        .send_leeway(Duration::from_millis(500));
    let conn = Connection::new(move || template.fresh(), config)?;
    conn.connect().await?;

    loop {
        let event = match tokio::time::timeout(Duration::from_secs(10), conn.next_event()).await {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(_) => {
                println!("timed out waiting for an event");
                break;
            }
        };
        match event {
            StompEvent::Connected => {
                conn.send_frame(conn.connect_frame("1.2")).await?;
            }
            StompEvent::Frame(frame) if frame.command == Command::Connected => {
                conn.subscribe("/queue/test", "sub-0", AckMode::Auto).await?;
                conn.send("/queue/test", "hello from iridium-stomp-ws").await?;
            }
            StompEvent::Frame(frame) if frame.command == Command::Message => {
                println!("received frame:\n{}", frame);
                break;
            }
            StompEvent::Frame(frame) => println!("received frame:\n{}", frame),
            StompEvent::Disconnected { code, reason } => {
                println!("disconnected: {} {:?}", code, reason);
                break;
            }
            StompEvent::Error(e) => println!("error: {}", e),
        }
    }

    conn.close().await;
    Ok(())
}
