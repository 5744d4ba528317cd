use clap::Parser;
use log::{info, warn};
use peercall::transport::{TokioWebSocketTransportFactory, TransportEvent, TransportFactory};
use peercall::{Envelope, PeerId};
use peercall::proto::Announce;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "relay_probe")]
#[command(about = "Signaling relay inspection tool")]
#[command(
    long_about = "Connects to a signaling relay, announces an identity and logs every envelope the relay delivers"
)]
struct Cli {
    #[arg(short, long, default_value = "ws://localhost:8086/ws")]
    url: String,

    /// Identity to announce.
    #[arg(short, long, default_value = "relay-probe")]
    id: String,

    #[arg(short, long, default_value = "Relay Probe")]
    name: String,

    /// Send a keepalive every N seconds.
    #[arg(short, long)]
    keepalive: Option<u64>,

    /// Print decoded envelopes as JSON on stdout.
    #[arg(short, long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let factory = TokioWebSocketTransportFactory::new(cli.url.clone());
    let (transport, mut events) = factory.create_transport().await?;

    let mut keepalive = cli
        .keepalive
        .map(|secs| tokio::time::interval(Duration::from_secs(secs.max(1))));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted, closing connection");
                break;
            }
            _ = next_tick(&mut keepalive) => {
                transport.send_text(Envelope::Keepalive.encode()?).await?;
            }
            event = events.recv() => match event {
                Some(TransportEvent::Connected) => {
                    info!("Connected to {}", factory.url());
                    let announce = Envelope::New(Announce {
                        name: cli.name.clone(),
                        id: PeerId::new(cli.id.clone()),
                        user_agent: format!("relay_probe/{}", env!("CARGO_PKG_VERSION")),
                    });
                    transport.send_text(announce.encode()?).await?;
                }
                Some(TransportEvent::TextReceived(text)) => match Envelope::decode(&text) {
                    Ok(envelope) if cli.json => println!("{}", envelope.encode()?),
                    Ok(envelope) => info!("<-- {}: {envelope:?}", envelope.kind()),
                    Err(e) => warn!("Undecodable frame ({e}): {text}"),
                },
                Some(TransportEvent::Disconnected) | None => {
                    info!("Relay closed the connection");
                    break;
                }
            }
        }
    }

    transport.disconnect().await;
    Ok(())
}

async fn next_tick(interval: &mut Option<tokio::time::Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
