//! `ambient search`: run the retrieval façade and print ranked hits.

use anyhow::Result;
use std::sync::Arc;

use ambient_context_core::access::Principals;
use ambient_context_core::index::CorpusIndex;
use ambient_context_core::retrieval::Retriever;

use crate::config::Config;
use crate::dataset::load_dataset;

pub struct SearchArgs {
    pub recipient: Option<String>,
    pub limit: Option<usize>,
    pub min_score: Option<f64>,
    pub no_bias: bool,
}

pub fn run_search(config: &Config, query: &str, args: &SearchArgs) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let dataset = load_dataset(&config.dataset.path)?;
    let items: Vec<_> = dataset.items.into_iter().map(Arc::new).collect();
    let index = CorpusIndex::build(&items, &config.retrieval.index_options());

    let mut options = config.retrieval.retrieval_options();
    if let Some(limit) = args.limit {
        options.top_n = limit.max(1);
    }
    if let Some(min_score) = args.min_score {
        options.min_score = min_score;
    }
    options.apply_recipient_bias = !args.no_bias;

    let retriever = Retriever::new(
        Principals::new(config.access.principals()),
        config.retrieval.scoring_params(),
    );
    let results = retriever.retrieve(&index, query, args.recipient.as_deref(), &options);

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.2}] {} / {}",
            i + 1,
            result.score,
            result.item.kind.as_str(),
            result.item.title
        );
        if !result.item.summary.is_empty() {
            println!("    summary: {}", result.item.summary.replace('\n', " ").trim());
        }
        if let Some(ref url) = result.item.url {
            println!("    url: {}", url);
        }
        if let Some(ref why) = result.why {
            let trail: Vec<String> = why
                .top_chunk_ids
                .iter()
                .zip(&why.top_chunk_scores)
                .map(|(id, score)| format!("{} ({:.2})", id, score))
                .collect();
            println!("    chunks: {}", trail.join(", "));
        }
        println!("    id: {}", result.item.id);
        println!();
    }

    Ok(())
}
