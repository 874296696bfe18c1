use std::sync::Arc;
use std::time::Duration;

use walletconnect_session::{
    RelayClient, SessionClient, SessionConfig, StartOutcome, types::Metadata,
};

const SESSION_FILE: &str = "session.json";

/// Blocking flow: restore or pair, wait for approval, sign a message.
#[tokio::main]
async fn main() {
    env_logger::init();

    // ProjectId is required to prevent DOS on the relay. In case following
    // cause rate limits, you can create your own from https://cloud.reown.com
    let project_id = "35d44d49c2dee217a3eb24bb4410acc7";

    // Used to sign JWTs. Must be generated and stored by client. Same seed
    // should be reused for all connections.
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

    let mut config = SessionConfig::new(
        "https://relay.walletconnect.org/rpc".parse().unwrap(),
        Metadata {
            name: "walletconnect-session demo".to_string(),
            description: "Session lifecycle demo".to_string(),
            url: "https://example.org".to_string(),
            icons: vec![],
        },
    );
    config.chain_id = Some("338".to_string());

    let persisted = std::fs::read(SESSION_FILE).ok();
    let (client, outcome) =
        SessionClient::start_or_restore(config, relay, persisted.as_deref())
            .expect("start session");

    match outcome {
        StartOutcome::Restored(session) => {
            println!("restored session with {:?}", session.accounts);
        }
        StartOutcome::Pairing(request) => {
            // scan this in the wallet, then approve
            println!("pair with: {}", request.uri);
            client
                .await_connection(Duration::from_secs(120))
                .await
                .expect("wallet approval");
        }
    }

    std::fs::write(SESSION_FILE, client.save().await.expect("serialize"))
        .expect("persist session");

    let session = client.snapshot().await;
    let account = session.accounts.first().expect("approved account");
    let signature = client
        .sign_personal("hello from rust", account)
        .await
        .expect("personal sign");
    println!("signature: 0x{}", alloy::hex::encode(signature.as_bytes()));

    client.disconnect().await;
    let _ = std::fs::remove_file(SESSION_FILE);
}
