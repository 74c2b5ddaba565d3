//! `medchat index` — Build the vector index from the dialogue dataset.

use std::path::PathBuf;

use medchat_config::AppConfig;
use medchat_retrieval::{Embedder, IngestOptions, VectorIndex};

pub async fn run(dataset: Option<PathBuf>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let retrieval = &config.retrieval;
    let index_path = &retrieval.index_path;

    if index_path.exists() && !force {
        let existing = VectorIndex::load(index_path)?;
        println!("Index already exists at {}", index_path.display());
        println!("   Passages: {}", existing.len());
        println!("   Model:    {}", existing.manifest().embedding_model);
        println!("   Built:    {}", existing.manifest().built_at);
        println!("   Use --force to rebuild.");
        return Ok(());
    }

    let dataset = dataset
        .or_else(|| retrieval.dataset_path.clone())
        .ok_or("No dataset given; pass --dataset or set retrieval.dataset_path")?;

    let router = medchat_providers::build_from_config(&config);
    let provider = router.default().ok_or("No default provider configured")?;
    let embedder = Embedder::new(provider, &retrieval.embedding_model);

    println!("Indexing {}", dataset.display());
    println!("   Embedding model: {}", retrieval.embedding_model);

    let options = IngestOptions {
        max_records: retrieval.max_records,
        batch_size: retrieval.batch_size,
    };
    let (index, report) = medchat_retrieval::build_index(&dataset, &embedder, options).await?;
    index.save(index_path)?;

    println!("   Added:   {}", report.added);
    println!("   Skipped: {}", report.skipped);
    println!("   Saved:   {}", index_path.display());

    Ok(())
}
