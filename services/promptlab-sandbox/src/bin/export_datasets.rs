use std::path::PathBuf;

use anyhow::Result;

use promptlab_runtime::Dataset;

/// Writes every stored dataset to `<dir>/<name>.csv`, byte for byte.
///
/// Usage: `export_datasets [dir]`; defaults to `exports/<timestamp>`.
#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(tracing::Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            PathBuf::from("exports").join(chrono::Utc::now().format("%Y%m%d-%H%M%S").to_string())
        });
    tokio::fs::create_dir_all(&dir).await?;

    let db = promptlab_clients::connect(false, false).await;

    let briefs = Dataset::list_brief(db).await?;
    for brief in &briefs {
        let file = Dataset::download(db, brief.id).await?;
        let filename = file.filename.replace(['/', '\\'], "_");
        let path = dir.join(&filename);
        tokio::fs::write(&path, file.content.as_bytes()).await?;
        tracing::info!("[export_datasets] {} -> {}", brief.name, path.display());
    }

    println!("Exported {} datasets to {}", briefs.len(), dir.display());
    Ok(())
}
