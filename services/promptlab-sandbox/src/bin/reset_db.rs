use anyhow::Result;

/// Drops every promptlab table and recreates the empty schema.
#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(tracing::Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let _db = promptlab_clients::connect(true, true).await;

    println!("Database reset successfully");
    Ok(())
}
