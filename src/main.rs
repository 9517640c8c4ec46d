use asg_peers::cli::{Cli, CliHandler};
use asg_peers::logging;
use asg_peers::peer::{FanOut, ReqwestTransport};
use asg_peers::provider::AwsProvider;
use clap::Parser;
use std::sync::Arc;
use tracing::error;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut cli = Cli::parse();
    let config = cli.resolve_config()?;
    logging::init(&config.logging)?;

    let provider = AwsProvider::from_env(config.region.clone()).await?;
    let transport = ReqwestTransport::new()?;
    let fan_out = FanOut::from_config(&config, Arc::new(provider), Arc::new(transport));

    let handler = CliHandler::new(fan_out);
    if let Err(e) = handler.run(&cli.command).await {
        error!("{}", e);
        return Err(e.into());
    }
    Ok(())
}
