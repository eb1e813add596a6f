mod cli;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use sr_core::config::Config;

async fn start_server(host: Option<String>, port: Option<u16>, config_path: Option<&Path>) -> Result<()> {
    let mut config = Config::load_or_default(config_path);

    // Override host/port from CLI if specified
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    tracing::info!(
        "Starting streamrelay on {}:{}",
        config.server.host,
        config.server.port
    );

    sr_server::start(config).await.context("server failed")
}

/// Log directives used when `RUST_LOG` is unset.
fn default_log_filter(verbose: bool) -> &'static str {
    if verbose {
        "streamrelay=trace,sr_server=trace,sr_hls=trace,sr_av=debug,sr_core=debug,tower_http=debug"
    } else {
        "streamrelay=info,sr_server=info,sr_hls=info,sr_av=info,sr_core=info,tower_http=info"
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_log_filter(cli.verbose).to_string());

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::CheckTools => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(check_tools(cli.config.as_deref()))
        }
        Commands::Validate { file, json } => {
            let path = file.or(cli.config);
            validate_config(path.as_deref(), json)
        }
        Commands::Version => {
            println!("streamrelay {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = Config::load_or_default(config_path);
    let registry = sr_av::ToolRegistry::discover(&config.tools);
    let mut all_ok = true;

    for tool in registry.check_all().await {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("ffmpeg is missing; /start-compat will answer 500 until it is installed.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>, json: bool) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {}", p.display());
            let config = Config::load(p)
                .with_context(|| format!("failed to load config {}", p.display()))?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!(
        "  Proxy: timeout {}s, max {} redirects, default UA '{}'",
        config.proxy.request_timeout_secs, config.proxy.max_hops, config.proxy.default_user_agent
    );
    println!(
        "  Compat: {} served at {}, idle timeout {}s",
        config.compat.output_root.display(),
        config.compat.serve_prefix,
        config.compat.idle_timeout_secs
    );

    let warnings = config.validate();
    for warning in &warnings {
        println!("  ! {warning}");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filters_cover_every_workspace_crate() {
        for verbose in [false, true] {
            let filter = default_log_filter(verbose);
            for target in ["streamrelay=", "sr_server=", "sr_hls=", "sr_av=", "sr_core="] {
                assert!(filter.contains(target), "{target} missing from {filter}");
            }
            assert!(filter.parse::<tracing_subscriber::EnvFilter>().is_ok());
        }
    }
}
