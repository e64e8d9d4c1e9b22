//! One-shot query example
//!
//! Run with `RUST_LOG=claude_code_client=debug` to see the CLI frames.

use claude_code_client::{ClaudeCodeOptions, Message, Result, query};
use futures::StreamExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let options = ClaudeCodeOptions::builder()
        .system_prompt("You are a concise assistant")
        .max_turns(1)
        .build();

    let mut messages = query("What is 2 + 2?", Some(options)).await?;

    while let Some(msg) = messages.next().await {
        match msg? {
            Message::Assistant(assistant) => println!("Claude: {}", assistant.text()),
            Message::System(system) if system.is_error() => {
                eprintln!("Skipped bad line: {:?}", system.data.get("error"));
            },
            Message::Result(result) => {
                println!(
                    "Done in {}ms, cost: {:?} USD",
                    result.duration_ms, result.total_cost_usd
                );
            },
            _ => {},
        }
    }

    Ok(())
}
