use anyhow::{Context, Result};
use clap::Parser;
use livescribe::app::run_server;
use livescribe::auth::{issue_token, unix_now};
use livescribe::cli::{Cli, Commands, ConfigAction, TokenAction};
use livescribe::config::Config;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose);

    match cli.command {
        None => {
            let config = load_config(cli.config.as_deref())?;
            run_server(config).await?;
        }
        Some(Commands::Serve {
            host,
            port,
            model,
            language,
        }) => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(model) = model {
                config.stt.model_path = model;
            }
            if let Some(language) = language {
                config.stt.language = language;
            }
            run_server(config).await?;
        }
        Some(Commands::Config { action }) => match action {
            ConfigAction::Show => {
                let config = load_config(cli.config.as_deref())?;
                let rendered =
                    toml::to_string_pretty(&redacted(config)).context("Failed to render config")?;
                print!("{rendered}");
            }
            ConfigAction::Path => {
                println!("{}", config_path(cli.config.as_deref())?.display());
            }
        },
        Some(Commands::Token { action }) => match action {
            TokenAction::Issue { subject } => {
                let config = load_config(cli.config.as_deref())?;
                let secret = config
                    .auth
                    .token_secret
                    .as_deref()
                    .filter(|s| !s.is_empty())
                    .context("auth.token_secret (or LIVESCRIBE_TOKEN_SECRET) must be set to issue tokens")?;
                println!("{}", issue_token(secret, &subject, unix_now())?);
            }
        },
    }

    Ok(())
}

/// `-q` → warn, default → info, `-v` → debug, `-vv` → trace. `RUST_LOG` wins.
fn init_tracing(quiet: bool, verbose: u8) {
    let default_filter = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "livescribe=debug,tower_http=debug,info",
        (false, _) => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(Config::default_path()?),
    }
}

fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let path = config_path(explicit)?;
    let config = Config::load_or_default(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?
        .with_env_overrides()?;
    Ok(config)
}

/// Copy of `config` safe to print.
fn redacted(mut config: Config) -> Config {
    const HIDDEN: &str = "<redacted>";
    for secret in [
        &mut config.auth.stream_token,
        &mut config.auth.token_secret,
        &mut config.auth.batch_api_key,
        &mut config.stt.api_key,
    ] {
        if secret.as_deref().is_some_and(|s| !s.is_empty()) {
            *secret = Some(HIDDEN.to_string());
        }
    }
    config
}
