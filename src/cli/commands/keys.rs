//! API key management commands.

use std::path::Path;

use console::style;

use crate::keys::LocalKeyStore;

/// List every key in the local database.
pub fn cmd_keys_list(db_path: &Path) -> anyhow::Result<()> {
    let store = LocalKeyStore::open(db_path)?;
    let records = store.all()?;

    if records.is_empty() {
        println!("{} No API keys in {}", style("!").yellow(), db_path.display());
        return Ok(());
    }

    println!("\n{}", style("API Keys").bold());
    println!("{}", "-".repeat(70));
    println!("{:<40} {:>12} {:>12}", "Key", "Req/min", "Char limit");
    println!("{}", "-".repeat(70));

    for record in records {
        let char_limit = record
            .char_limit
            .map(|limit| limit.to_string())
            .unwrap_or_else(|| "default".to_string());
        println!(
            "{:<40} {:>12} {:>12}",
            record.api_key, record.req_limit, char_limit
        );
    }

    Ok(())
}

/// Add (or replace) a key.
pub fn cmd_keys_add(
    db_path: &Path,
    req_limit: i64,
    key: Option<String>,
    char_limit: Option<i64>,
) -> anyhow::Result<()> {
    let store = LocalKeyStore::open(db_path)?;
    let record = store.add(req_limit, key, char_limit)?;

    println!("{} Added API key", style("✓").green());
    println!("  {}", style(&record.api_key).bold());
    Ok(())
}

/// Remove a key.
pub fn cmd_keys_remove(db_path: &Path, key: &str) -> anyhow::Result<()> {
    let store = LocalKeyStore::open(db_path)?;

    if store.remove(key)? {
        println!("{} Removed API key {}", style("✓").green(), key);
        Ok(())
    } else {
        anyhow::bail!("No such API key: {}", key)
    }
}
