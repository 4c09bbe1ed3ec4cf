//! `ambient index`: build the index once and print its stats.

use anyhow::Result;
use std::time::Instant;

use crate::config::Config;
use crate::engine::ContextEngine;

pub fn run_index(config: &Config) -> Result<()> {
    let started = Instant::now();
    let engine = ContextEngine::from_config(config)?;
    let stats = engine.warm_up();

    println!("Index built in {} ms", started.elapsed().as_millis());
    println!("  items:      {}", stats.items);
    println!("  skipped:    {}", stats.skipped_items);
    println!("  chunks:     {}", stats.chunks);
    println!("  vocabulary: {}", stats.vocabulary);
    println!("  entities:   {}", stats.entities);
    println!("  digest:     {}", stats.digest);
    Ok(())
}
