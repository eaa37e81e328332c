mod cli;
mod output;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use harvest_common::{Config, ConversationDetail, ConversationSummary, Selectors};
use harvest_core::Collector;
use harvest_webdriver::{default_chain, WebDriverEnvironment};

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config; flags win over HARVEST_* env vars
    let mut config = Config::from_env()?;
    cli.run.apply(&mut config);

    // Initialize logging
    init_tracing(config.json_logs)?;

    if let Some(Command::Schema) = cli.command {
        return print_schema();
    }

    info!("Conversation harvester starting...");
    config.log_redacted();

    let selectors = match &config.selectors_path {
        Some(path) => Selectors::from_file(path)?,
        None => Selectors::default(),
    };

    // Connect to the browser
    let env =
        WebDriverEnvironment::connect(&config.webdriver_url, &config.inbox_url, selectors.clone())
            .await?;

    let reveal = default_chain(&selectors);
    let mut collector = Collector::new(env, reveal, selectors, config.harvest.clone());
    let result = collector.run().await;

    if let Err(e) = collector.into_environment().shutdown().await {
        warn!(error = %e, "Failed to close browser session");
    }

    // A fatal run writes nothing
    let outcome = result?;

    let written = output::write_outcome(&config.output_dir, &outcome, config.harvest.full_history)?;
    for path in &written {
        info!(path = %path.display(), "Wrote output");
    }

    println!("{}", outcome.stats);
    println!("Stopped: {}", outcome.stop_reason);
    Ok(())
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("harvest=info".parse()?)
        .add_directive("dm_harvest=info".parse()?);
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn print_schema() -> Result<()> {
    let schema = serde_json::json!({
        "conversations": schemars::schema_for!(Vec<ConversationSummary>),
        "messages": schemars::schema_for!(Vec<ConversationDetail>),
    });
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
