//! Interactive client with a capped session registry
//!
//! Settings come from `config/{RUN_MODE}`, `config/local` and
//! `CLAUDE_CODE_*` environment variables, e.g.
//! `CLAUDE_CODE_SESSIONS__MAX_SESSIONS=2`.

use claude_code_client::{InteractiveClient, Message, Result, SessionManager, Settings};
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let settings = Settings::new()?;
    let sessions = Arc::new(SessionManager::new(settings.sessions.clone()));
    let shutdown = CancellationToken::new();
    let cleanup = sessions.clone().spawn_cleanup(shutdown.clone());

    let client =
        InteractiveClient::new(settings.to_options()).with_session_manager(sessions.clone());
    client.connect().await?;

    for (session, prompt) in [
        ("math", "What is 7 * 6?"),
        ("rust", "Name one Rust ownership rule."),
        ("math", "Now divide that by 2."),
    ] {
        client.query(prompt, session).await?;

        let mut response = client.receive_response();
        while let Some(msg) = response.next().await {
            match msg? {
                Message::Assistant(assistant) => println!("[{session}] {}", assistant.text()),
                Message::Result(result) => {
                    println!("[{session}] turn finished: {}", result.subtype);
                },
                _ => {},
            }
        }
    }

    println!("Active sessions: {}", sessions.active_count());

    client.close().await?;
    shutdown.cancel();
    let _ = cleanup.await;
    Ok(())
}
