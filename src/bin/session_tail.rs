use authsession::SessionStore;
use std::time::Duration;
use tokio_stream::StreamExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    // Provider settings come from AUTHSESSION_* variables; without them the
    // store runs disconnected and this just prints the settled state.
    let store = SessionStore::from_env();
    let mut states = store.state_stream();

    let tail = tokio::spawn(async move {
        while let Some(state) = states.next().await {
            if state.loading {
                println!("resolving session...");
            } else {
                match &state.current_identity {
                    Some(identity) => println!(
                        "signed in as {} ({})",
                        identity.id,
                        identity.email.as_deref().unwrap_or("no email")
                    ),
                    None => println!("signed out"),
                }
            }
        }
    });

    // Wait for Ctrl-C
    tokio::signal::ctrl_c().await?;
    println!("shutdown requested, releasing subscription...");

    store.dispose();
    tail.abort();
    tokio::time::sleep(Duration::from_millis(100)).await;

    Ok(())
}
