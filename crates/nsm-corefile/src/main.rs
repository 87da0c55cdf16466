// # nsm-corefile - Corefile renderer
//
// Thin integration layer over nsm-core:
// 1. Reads settings from environment variables
// 2. Loads and validates the JSON configuration file
// 3. Feeds every configured DNS source into a DnsConfigManager
// 4. Writes the merged Corefile to a path or stdout
//
// Merge rules live in nsm-core; nothing here decides what the Corefile says.
//
// ## Configuration
//
// - `NSM_CONFIG_FILE`: Path to the JSON configuration (required)
// - `NSM_COREFILE_PATH`: Where to write the Corefile (stdout when unset)
// - `NSM_LOG_LEVEL`: trace, debug, info, warn or error (default info)
//
// ## Example
//
// ```bash
// cat > /etc/nsm/dns.json <<EOF
// {
//   "dns": {
//     "sources": [
//       { "key": "cluster", "search_domains": ["svc.cluster.local"], "dns_server_ips": ["10.96.0.10"] },
//       { "key": "upstream", "dns_server_ips": ["1.1.1.1", "8.8.8.8"] }
//     ]
//   }
// }
// EOF
//
// export NSM_CONFIG_FILE=/etc/nsm/dns.json
// export NSM_COREFILE_PATH=/etc/coredns/Corefile
//
// nsm-corefile
// ```

use anyhow::{Context, Result};
use nsm_core::{DnsConfigManager, NsmConfig};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::io::AsyncWriteExt;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum NsmExitCode {
    /// Corefile written
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<NsmExitCode> for ExitCode {
    fn from(code: NsmExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Settings taken from the environment
struct Settings {
    config_file: PathBuf,
    corefile_path: Option<PathBuf>,
    log_level: String,
}

impl Settings {
    /// Load settings from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            config_file: env::var("NSM_CONFIG_FILE")
                .context(
                    "NSM_CONFIG_FILE is required. \
                    Set it via: export NSM_CONFIG_FILE=/etc/nsm/dns.json",
                )?
                .into(),
            corefile_path: env::var("NSM_COREFILE_PATH")
                .ok()
                .filter(|path| !path.is_empty())
                .map(PathBuf::from),
            log_level: env::var("NSM_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the settings
    fn validate(&self) -> Result<()> {
        if self.config_file.as_os_str().is_empty() {
            anyhow::bail!("NSM_CONFIG_FILE cannot be empty");
        }

        if let Some(parent) = self.corefile_path.as_deref().and_then(|path| path.parent())
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            anyhow::bail!(
                "NSM_COREFILE_PATH parent directory does not exist: {}. \
                Create it first: mkdir -p {}",
                parent.display(),
                parent.display()
            );
        }

        self.level()?;
        Ok(())
    }

    fn level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "NSM_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }
}

fn main() -> ExitCode {
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return NsmExitCode::ConfigError.into();
        }
    };

    if let Err(e) = settings.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return NsmExitCode::ConfigError.into();
    }

    let log_level = settings.level().unwrap_or(Level::INFO);
    // Logs go to stderr so stdout carries only the Corefile.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return NsmExitCode::ConfigError.into();
    }

    let config = match NsmConfig::from_file(&settings.config_file) {
        Ok(config) => config,
        Err(e) => {
            error!(path = %settings.config_file.display(), "Failed to load configuration: {}", e);
            return NsmExitCode::ConfigError.into();
        }
    };

    info!(
        sources = config.dns.sources.len(),
        retry_delay_secs = config.refresh.retry_delay_secs,
        "Configuration loaded"
    );

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return NsmExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        match run(settings, config).await {
            Ok(()) => NsmExitCode::CleanShutdown,
            Err(e) => {
                error!("Render error: {:#}", e);
                NsmExitCode::RuntimeError
            }
        }
    })
    .into()
}

/// Merge the configured sources and write the result
async fn run(settings: Settings, config: NsmConfig) -> Result<()> {
    let manager = DnsConfigManager::new();
    for source in config.dns.sources {
        info!(contributor = %source.key, "Adding DNS source");
        manager.store(source.key, source.config);
    }

    let mut corefile = manager.render();
    corefile.push('\n');

    match settings.corefile_path {
        Some(path) => {
            tokio::fs::write(&path, corefile.as_bytes())
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), contributors = manager.len(), "Corefile written");
        }
        None => {
            let mut stdout = tokio::io::stdout();
            stdout
                .write_all(corefile.as_bytes())
                .await
                .context("Failed to write Corefile to stdout")?;
            stdout.flush().await.context("Failed to flush stdout")?;
        }
    }

    Ok(())
}
