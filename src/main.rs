use anyhow::{bail, Context};
use futures_util::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crpt_document_client::config::{Config, LogFormat};
use crpt_document_client::{Document, DocumentSubmitter};

const USAGE: &str = "usage: crpt-document-client [--signature <signature>] <document.json>...";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load Config
    let config = Config::load().context("failed to load configuration")?;

    init_tracing(&config);

    let (signature_arg, paths) = parse_args(std::env::args().skip(1))?;
    let signature = signature_arg
        .or_else(|| config.signature.clone())
        .context("no signature: pass --signature or set CRPT_SIGNATURE")?;
    if paths.is_empty() {
        bail!(USAGE);
    }

    let documents = paths
        .iter()
        .map(|path| load_document(path))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let submitter = Arc::new(DocumentSubmitter::from_config(&config)?);
    info!(
        endpoint = %config.api_url,
        request_limit = config.request_limit,
        window = ?config.time_unit,
        documents = documents.len(),
        "Submitting documents"
    );

    // All submissions share one limiter; the ones over the limit wait for the next window.
    let submissions = documents.iter().map(|document| {
        let submitter = submitter.clone();
        let signature = signature.as_str();
        async move { (document, submitter.submit(document, signature).await) }
    });

    let results = tokio::select! {
        results = join_all(submissions) => results,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, abandoning pending submissions");
            submitter.limiter().shutdown();
            bail!("interrupted");
        }
    };

    let mut failed = 0;
    for (document, result) in &results {
        if let Err(e) = result {
            failed += 1;
            error!(doc_id = %document.doc_id, "Submission failed: {}", e);
        }
    }

    submitter.stats().log_stats();
    submitter.limiter().shutdown();

    if failed > 0 {
        bail!("{} of {} documents failed", failed, results.len());
    }
    info!("All documents submitted");

    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<(Option<String>, Vec<PathBuf>)> {
    let mut signature = None;
    let mut paths = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--signature" | "-s" => {
                signature = Some(args.next().context("--signature needs a value")?);
            }
            "--help" | "-h" => bail!(USAGE),
            _ => paths.push(PathBuf::from(arg)),
        }
    }

    Ok((signature, paths))
}

fn load_document(path: &Path) -> anyhow::Result<Document> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}
