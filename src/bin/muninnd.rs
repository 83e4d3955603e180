//! muninnd - the muninn inference gateway daemon.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use muninn::config::Config;
use muninn::model::{HttpModel, HttpModelConfig};
use muninn::types::Operation;
use muninn::{InferenceGateway, MuninnError, Result};

#[derive(Parser)]
#[command(name = "muninnd", about = "Adaptive inference gateway daemon", version)]
struct Args {
    /// Path to config file (default: ~/.muninn/config.toml, /etc/muninn/config.toml)
    #[arg(short, long, env = "MUNINN_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = match (args.config.as_deref(), Config::load(args.config.as_deref())) {
        (_, Ok(config)) => config,
        // An explicitly requested file must exist; fall back to defaults
        // only when no file was asked for and none was found.
        (Some(_), Err(e)) => return Err(e),
        (None, Err(e)) => {
            warn!(error = %e, "no config file, using defaults");
            Config::default()
        }
    };

    let model = HttpModel::new(model_endpoints(&config)?);
    let gateway = InferenceGateway::builder()
        .model(Arc::new(model))
        .config(config.gateway.clone())
        .rate(config.rate.clone())
        .build()?;

    info!(address = %config.server.address, "starting muninnd");
    muninn::server::serve(gateway, &config.server.address).await
}

fn model_endpoints(config: &Config) -> Result<HttpModelConfig> {
    let pairs = [
        (Operation::Ocr, config.models.ocr_url.as_ref()),
        (
            Operation::ObjectDetection,
            config.models.object_detection_url.as_ref(),
        ),
        (
            Operation::SceneCaption,
            config.models.scene_caption_url.as_ref(),
        ),
        (
            Operation::MultimodalQuery,
            config.models.multimodal_query_url.as_ref(),
        ),
    ];
    let mut endpoints = HttpModelConfig::new();
    let mut configured = 0usize;
    for (operation, url) in pairs {
        if let Some(url) = url {
            endpoints = endpoints.endpoint(operation, url);
            configured += 1;
        }
    }
    if configured == 0 {
        return Err(MuninnError::Configuration(
            "no model endpoints configured; set [models] urls in the config file".into(),
        ));
    }
    Ok(endpoints)
}
