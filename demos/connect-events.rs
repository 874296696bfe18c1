use std::sync::Arc;
use std::time::Duration;

use walletconnect_session::{
    RelayClient, SessionClient, SessionConfig, SessionEvent, StartOutcome,
    types::Metadata,
};

/// Event-driven flow: a background poller drives the session, the main
/// task reacts to lifecycle events from the channel.
#[tokio::main]
async fn main() {
    env_logger::init();

    let project_id = "35d44d49c2dee217a3eb24bb4410acc7";
    let client_seed = [123u8; 32];

    let relay = Arc::new(
        RelayClient::new(
            "https://relay.walletconnect.org/rpc",
            "https://relay.walletconnect.org",
            project_id,
            client_seed,
        )
        .expect("relay client"),
    );

    let config = SessionConfig::new(
        "https://relay.walletconnect.org/rpc".parse().unwrap(),
        Metadata {
            name: "walletconnect-session demo".to_string(),
            description: "Event-driven session demo".to_string(),
            url: "https://example.org".to_string(),
            icons: vec![],
        },
    );

    let (client, outcome) =
        SessionClient::start_or_restore(config, relay, None)
            .expect("start session");
    let mut events = client.events();

    if let StartOutcome::Pairing(request) = outcome {
        println!("pair with: {}", request.uri);
    }
    client
        .await_connection(Duration::from_secs(120))
        .await
        .expect("wallet approval");

    let poller = client.spawn_poller();

    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Connecting(_) => println!("connecting.."),
            SessionEvent::Connected(session) => {
                println!("connected: {:?}", session.accounts);
            }
            SessionEvent::Updated(session) => {
                println!("updated: {:?}", session.accounts);
            }
            SessionEvent::Disconnected(_) => {
                println!("disconnected by the wallet");
                break;
            }
        }
    }

    client.stop();
    poller.await.expect("poller task");
}
