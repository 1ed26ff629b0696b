//! Server command.

use console::style;

use crate::config::Settings;

/// Start the translation server.
pub async fn cmd_serve(settings: Settings) -> anyhow::Result<()> {
    println!(
        "{} Starting transgate at http://{}",
        style("→").cyan(),
        settings.bind_addr()
    );
    if settings.api_keys {
        println!("  {} API keys required", style("✓").green());
    }
    if settings.under_attack {
        println!(
            "  {} Under-attack mode: keyless clients must present the web UI secret",
            style("!").yellow()
        );
    }
    if settings.metrics {
        println!("  {} Prometheus metrics at /metrics", style("✓").green());
    }
    println!("  Press Ctrl+C to stop");

    crate::server::serve(settings).await
}
