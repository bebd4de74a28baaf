//! CLI command implementations.

use anyhow::{Context, Result};
use packrat_git::{clone_repository, CloneConfig, CloneSummary, HttpTransport};
use std::path::Path;

/// Settings given on the command line; each one beats the config file.
#[derive(Debug, Default)]
pub struct ConfigOverrides {
    pub upload_pack_path: Option<String>,
    pub timeout: Option<u64>,
    pub user_agent: Option<String>,
    pub no_head: bool,
}

/// Reads the optional JSON config file and applies flag overrides.
pub fn load_config(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<CloneConfig> {
    let mut config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?
        }
        None => CloneConfig::default(),
    };

    if let Some(upload_pack_path) = &overrides.upload_pack_path {
        config.upload_pack_path.clone_from(upload_pack_path);
    }
    if let Some(timeout) = overrides.timeout {
        config.timeout_secs = Some(timeout);
    }
    if let Some(user_agent) = &overrides.user_agent {
        config.user_agent.clone_from(user_agent);
    }
    if overrides.no_head {
        config.write_head = false;
    }

    tracing::debug!(?config, "clone configuration");
    Ok(config)
}

/// Initialize a repository layout.
pub fn init(path: Option<&Path>) -> Result<()> {
    let work_dir = path.unwrap_or_else(|| Path::new("."));
    let git_dir = packrat_storage::init(work_dir)
        .with_context(|| format!("initializing {}", work_dir.display()))?;
    println!("Initialized empty Git repository in {}", git_dir.display());
    Ok(())
}

/// Clone a repository over HTTP.
pub fn clone(url: &str, dest: Option<&Path>, config: &CloneConfig) -> Result<()> {
    let transport = HttpTransport::new(config).context("building HTTP client")?;
    let summary =
        clone_repository(&transport, url, dest, config).with_context(|| format!("cloning {url}"))?;
    println!("{}", summary_line(&summary));
    Ok(())
}

fn summary_line(summary: &CloneSummary) -> String {
    let mut line = format!(
        "Cloned into {} at {}: {} objects, {} files",
        summary.destination.display(),
        summary.head.id,
        summary.objects_written,
        summary.checkout.files,
    );
    if summary.deltas.skipped > 0 || summary.checkout.missing > 0 {
        line.push_str(&format!(
            " ({} deltas unresolved, {} files missing)",
            summary.deltas.skipped, summary.checkout.missing
        ));
    }
    line
}
