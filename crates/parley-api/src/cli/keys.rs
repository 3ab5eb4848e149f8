//! `parley keys` subcommands.

use crate::http::extractors::auth::create_api_key;
use crate::state::AppState;

/// Mint a key and print it once.
pub async fn create_key(state: &AppState, user: &str, name: &str) -> anyhow::Result<()> {
    let key = create_api_key(&state.db_pool, user, name).await?;

    println!();
    println!(
        "  {} API key for '{}' (save this -- it won't be shown again):",
        console::style("🔑").bold(),
        console::style(user).cyan()
    );
    println!();
    println!("  {}", console::style(&key).yellow().bold());
    println!();

    Ok(())
}
