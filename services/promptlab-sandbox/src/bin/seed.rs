use anyhow::Result;
use serde_json::json;

use promptlab_runtime::{
    request_node_evaluation, run_evaluation, Dataset, MetricRegistry, NodeEvaluationInput, Prompt, PromptContent,
    RuntimeError,
};

const SAMPLE_CSV: &str = "question,expected_answer\n\
What is the capital of France?,Paris\n\
\"Summarize: The cat sat on the mat.\",A cat sat on a mat.\n\
Translate 'hello' to Spanish,hola\n";

fn content(system: &str, user: &str) -> Result<PromptContent> {
    Ok(serde_json::from_value(json!({
        "system": system,
        "user": { "order": 1, "prompt": user },
    }))?)
}

/// Fills an empty database with a small demo: two nodes with a few versions,
/// one sample dataset and some evaluation results.
#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(tracing::Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let db = promptlab_clients::connect(false, true).await;
    let registry = MetricRegistry::with_builtins();

    let drafts = [
        ("summarizer", "You summarize text in one sentence.", "Summarize: {input}", "initial draft"),
        ("summarizer", "You summarize text in one short, neutral sentence.", "Summarize: {input}", "tone fix"),
        ("translator", "You translate English into Spanish.", "{input}", "initial draft"),
    ];

    let mut created = Vec::new();
    for (node_name, system, user, message) in drafts {
        let prompt = Prompt::new_version(db, node_name, content(system, user)?, Some(message.to_string())).await?;
        println!("created {} v{}", prompt.node_name, prompt.version);
        created.push(prompt);
    }

    // newest version of each node goes to production
    for prompt in [&created[1], &created[2]] {
        Prompt::promote(db, prompt.id).await?;
    }

    let dataset = match Dataset::upload(db, "demo-qa", Some("Seeded demo questions".to_string()), "text/csv", SAMPLE_CSV.as_bytes().to_vec()).await {
        Ok(dataset) => dataset,
        Err(RuntimeError::Conflict(_)) => {
            tracing::warn!("[seed] dataset 'demo-qa' already exists, reusing it");
            Dataset::search(db, "demo-qa")
                .await?
                .into_iter()
                .find(|d| d.name == "demo-qa")
                .ok_or_else(|| anyhow::anyhow!("dataset 'demo-qa' vanished"))?
        }
        Err(e) => return Err(e.into()),
    };

    for prompt in &created {
        for metric in ["accuracy", "completeness"] {
            let result = run_evaluation(db, &registry, prompt.id, dataset.id, metric).await?;
            println!("{} v{} {} = {}", prompt.node_name, prompt.version, metric, result.score);
        }
    }

    let request = request_node_evaluation(db, &registry, NodeEvaluationInput {
        node_name: "summarizer".to_string(),
        version: "production".to_string(),
        dataset_id: dataset.id,
        metrics: vec!["accuracy".to_string(), "response_time".to_string()],
        callback_url: None,
    }).await?;
    println!("queued evaluation request {}", request.id);

    println!("Database seeded successfully");
    Ok(())
}
