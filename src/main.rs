//! `ragctl` — a thin demonstration binary over the `ragcore` library.
//!
//! Wires the CLI (`cli.rs`) to the library's config loader, registry/
//! factory, indexer, and retriever. Installs a `tracing-subscriber`
//! `EnvFilter` subscriber (`RUST_LOG`-driven); the library itself never
//! installs one, matching the teacher's library/binary split.

mod cli;

use std::sync::Arc;

use clap::Parser;
use ragcore::acquire::FileGlobInput;
use ragcore::config::{self, Config};
use ragcore::embed::DisabledEmbedder;
use ragcore::indexer::{self, IndexInput};
use ragcore::registry::{AdapterConfig, Factory, Registry};
use ragcore::retriever::{HybridSearchOptions, Retriever, SemanticSearchOptions};
use ragcore::store::StorageAdapter;

fn install_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();
}

async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn StorageAdapter>> {
    let registry = Registry::with_builtins();
    let factory = Factory::new(AdapterConfig::default());
    let partial = AdapterConfig {
        provider: config.vector_db.provider.clone(),
        path: config.vector_db.options.path.clone(),
        dimension: config.vector_db.options.dimension,
    };
    Ok(factory.create(&registry, partial).await?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    install_tracing();
    let cli = cli::Cli::parse();
    let config = config::load_config(&cli.config).unwrap_or_else(|err| {
        tracing::warn!(%err, "failed to load config file, using defaults");
        toml::from_str::<Config>("").expect("empty TOML parses to all-default Config")
    });

    let store = build_store(&config).await?;
    let embedder = Arc::new(DisabledEmbedder);

    match cli.command {
        cli::Commands::Index { root, patterns } => {
            let input = FileGlobInput { root, patterns };
            let summary = indexer::run_index(
                &store,
                embedder.as_ref(),
                vec![IndexInput {
                    acquisition: &input,
                    chunk_options: ragcore::chunk::ChunkOptions {
                        chunk_size: Some(config.indexing.chunk_size),
                        chunk_overlap: Some(config.indexing.chunk_overlap),
                        preserve_boundaries: config.indexing.preserve_boundaries,
                    },
                    batch_size: config.indexing.batch_size,
                }],
            )
            .await;
            println!(
                "indexed {} item(s), {} chunk(s), {} error(s)",
                summary.items_indexed,
                summary.chunks_created,
                summary.errors.len()
            );
            for error in &summary.errors {
                tracing::warn!(%error, "indexing error");
            }
        }
        cli::Commands::Search { query, k, source_type, hybrid } => {
            let retriever = Retriever::new(Arc::clone(&store), embedder);
            let hits = if hybrid {
                retriever
                    .hybrid_search(
                        &query,
                        HybridSearchOptions {
                            k: k.unwrap_or(config.search.default_k),
                            source_type,
                            keyword_weight: config.search.hybrid_keyword_weight,
                        },
                    )
                    .await?
            } else {
                retriever
                    .search(
                        &query,
                        SemanticSearchOptions {
                            k: k.unwrap_or(config.search.default_k),
                            source_type,
                            rerank: config.search.enable_rerank,
                            rerank_boost: config.search.rerank_boost_factor,
                        },
                    )
                    .await?
            };
            for hit in &hits {
                println!("{:.4}  {}", hit.score, hit.chunk.content.lines().next().unwrap_or(""));
            }
        }
        cli::Commands::Stats => {
            let chunks = store.list(Default::default()).await?;
            let hits: Vec<ragcore::models::Hit> =
                chunks.into_iter().map(|chunk| ragcore::models::Hit { chunk, score: 0.0 }).collect();
            let stats = ragcore::retriever::search_stats(&hits);
            println!("total chunks: {}", stats.total_results);
            for (source_type, count) in &stats.source_types {
                println!("  {source_type}: {count}");
            }
        }
    }

    store.close().await?;
    Ok(())
}
