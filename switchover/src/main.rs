use anyhow::Context;
use args::Args;
use clap::Parser;
use config::Config;
use messages::{
    HistoryNormalizer, ProviderFamily, UnifiedToolDefinition,
    legacy::{self, StoredMessage},
};
use tokio::io::AsyncReadExt;

mod args;
mod encode;
mod logger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    logger::init(&args.log);

    let config = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };

    let records: Vec<StoredMessage> = serde_json::from_str(&read_input(&args).await?).context("parsing stored records")?;

    let tools: Vec<UnifiedToolDefinition> = match &args.tools {
        Some(path) => {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;

            serde_json::from_str(&content).context("parsing tool definitions")?
        }
        None => Vec::new(),
    };

    let target = ProviderFamily::from_model_name(&args.model);
    let source = args.previous_model.as_deref().map(ProviderFamily::from_model_name);

    log::info!(
        "Preparing {} stored records for {} ({target})",
        records.len(),
        args.model
    );

    let history = legacy::reconstruct_history(&records, &config.history);
    let messages = HistoryNormalizer::new(&config.history).normalize(&history, target, source);

    let payload = encode::encode(target, &messages, &tools, &config.images).await?;

    println!("{}", serde_json::to_string_pretty(&payload)?);

    Ok(())
}

async fn read_input(args: &Args) -> anyhow::Result<String> {
    match args.input_path() {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display())),
        None => {
            let mut content = String::new();
            tokio::io::stdin()
                .read_to_string(&mut content)
                .await
                .context("reading stdin")?;

            Ok(content)
        }
    }
}
