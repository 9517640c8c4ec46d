//! CLI Handler for asg-peers
//!
//! Provides command-line access to:
//! - Listing the running peers of the local auto scaling group
//! - Sending a request to every peer
//! - Sending a request to peers until one answers with a given status

use clap::{Args, Parser, Subcommand};
use reqwest::StatusCode;
use std::path::PathBuf;
use tracing::info;
use crate::config::{FleetConfig, FleetConfigPatch};
use crate::error::PeerError;
use crate::peer::{FanOut, FanOutResults, RequestOptions, ResponseMeta};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to the usual search path)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Default)]
pub struct Overrides {
    /// Auto scaling group to use instead of looking up the local instance
    #[arg(long, global = true)]
    pub group_name: Option<String>,

    /// Local instance id, skipping the metadata lookup
    #[arg(long, global = true)]
    pub instance_id: Option<String>,

    /// Shared secret sent in the X-NODE-ASG-AUTH header
    #[arg(long, global = true)]
    pub secret: Option<String>,

    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Call peers over https; `--use-ssl=false` overrides the config file
    #[arg(long, global = true, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub use_ssl: Option<bool>,

    /// Call peers on their public address
    #[arg(long, global = true, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub use_public_ip: Option<bool>,

    #[arg(long, global = true)]
    pub region: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List running peers
    Peers,
    /// Send a GET request to every peer
    Request {
        /// Request path, e.g. /status
        path: String,
    },
    /// Send a GET request to peers until one answers with `status`
    Until {
        path: String,
        #[arg(long, default_value_t = 200)]
        status: u16,
    },
}

impl From<Overrides> for FleetConfigPatch {
    fn from(o: Overrides) -> Self {
        FleetConfigPatch {
            max_cache_age_ms: None,
            use_ssl: o.use_ssl,
            port: o.port,
            use_public_ip: o.use_public_ip,
            secret: o.secret,
            group_name: o.group_name,
            instance_id: o.instance_id,
            region: o.region,
        }
    }
}

impl Cli {
    /// Configuration file (or defaults) with command-line overrides applied.
    pub fn resolve_config(&mut self) -> Result<FleetConfig, PeerError> {
        let base = match &self.config {
            Some(path) => FleetConfig::load_from_file(path)?,
            None => FleetConfig::load()?,
        };
        base.merge(std::mem::take(&mut self.overrides).into())
    }
}

pub struct CliHandler {
    fan_out: FanOut,
}

impl CliHandler {
    pub fn new(fan_out: FanOut) -> Self {
        Self { fan_out }
    }

    pub async fn run(&self, command: &Commands) -> Result<(), PeerError> {
        match command {
            Commands::Peers => self.peers().await,
            Commands::Request { path } => {
                let results = self.fan_out.request_each_series(RequestOptions::get(path.as_str())).await?;
                print_results(&results);
                Ok(())
            }
            Commands::Until { path, status } => {
                let wanted = StatusCode::from_u16(*status)
                    .map_err(|e| PeerError::Config(format!("Invalid status {}: {}", status, e)))?;
                let results = self
                    .fan_out
                    .request_until(RequestOptions::get(path.as_str()), |meta, _| {
                        meta.map_or(false, |m| m.status == wanted)
                    })
                    .await?;
                print_results(&results);
                if !results.metadata.iter().flatten().any(|m| m.status == wanted) {
                    println!("No peer answered with {}", wanted);
                }
                Ok(())
            }
        }
    }

    async fn peers(&self) -> Result<(), PeerError> {
        let snapshot = self.fan_out.cache().get().await?;
        info!("Found {} running peers", snapshot.len());
        for peer in &snapshot.peers {
            println!(
                "{}\tprivate={}\tpublic={}",
                peer.instance_id,
                peer.private_ip.as_deref().unwrap_or("-"),
                peer.public_ip.as_deref().unwrap_or("-"),
            );
        }
        Ok(())
    }
}

fn print_results(results: &FanOutResults<ResponseMeta, String>) {
    for (i, peer) in results.peers.iter().enumerate() {
        match (&results.metadata[i], &results.errors[i]) {
            (_, Some(e)) => println!("{}\terror: {}", peer, e),
            (Some(meta), None) => {
                let body = results.bodies[i].as_deref().unwrap_or("");
                println!("{}\t{}\t{}", peer, meta.status, body.trim_end());
            }
            (None, None) => println!("{}\tno response", peer),
        }
    }
}
