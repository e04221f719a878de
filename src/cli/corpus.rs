use anyhow::Result;

use mneme::config::MnemeConfig;
use mneme::knowledge::memory::MemoryKnowledgeBase;

/// Display corpus statistics in the terminal.
pub fn stats(config: &MnemeConfig, json: bool) -> Result<()> {
    let path = config.resolved_corpus_path();
    let kb = MemoryKnowledgeBase::from_path(&path)?;
    let stats = kb.stats();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Corpus Statistics");
    println!("{}", "=".repeat(40));
    println!("  Path:                {}", path.display());
    println!("  Chunks:              {}", stats.chunks);
    println!("  Sources:             {}", stats.sources);
    println!();
    println!("Graph:");
    println!("  Nodes:               {}", stats.nodes);
    println!("  Edges:               {}", stats.edges);
    println!("  Groups:              {}", stats.groups);

    Ok(())
}
