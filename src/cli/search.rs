use anyhow::Result;

use ctxvault::config::CtxConfig;

/// Run a keyword search from the terminal.
pub fn search(config: &CtxConfig, query: &str, limit: Option<usize>) -> Result<()> {
    let store = super::open_store(config)?;
    let limit = limit.unwrap_or(config.search.default_limit);
    let hits = store.search(query, Some(limit))?;

    if hits.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!("Found {} result(s)\n", hits.len());

    for (i, hit) in hits.iter().enumerate() {
        let entry = store.read(hit.kind, &hit.id)?;
        let lines = entry.search_lines();
        let matched = lines
            .get(hit.line as usize)
            .map(|l| super::preview(l, 120))
            .unwrap_or_default();

        println!(
            "  {}. [{}] {} (score: {:.1}, line {})",
            i + 1,
            hit.kind,
            hit.id,
            hit.score,
            hit.line,
        );
        println!("     {}", entry.title());
        if hit.line > 0 {
            println!("     > {matched}");
        }
        println!();
    }

    Ok(())
}
