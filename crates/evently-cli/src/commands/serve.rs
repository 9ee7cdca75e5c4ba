//! Serve command - run the gateway server.

use anyhow::Result;
use evently_core::Config;

use crate::ui;

/// Serve command arguments.
#[derive(Debug, Clone, Default)]
pub struct ServeArgs {
    /// Port override.
    pub port: Option<u16>,
    /// Bind address override.
    pub bind: Option<String>,
}

/// Start the gateway and block until shutdown.
pub async fn run_serve(mut config: Config, args: ServeArgs) -> Result<()> {
    if let Some(port) = args.port {
        config.gateway.port = port;
    }
    if let Some(bind) = args.bind {
        config.gateway.bind_address = bind;
    }
    config.validate()?;

    ui::header("Starting Evently Gateway");
    ui::kv(
        "Address",
        &format!("{}:{}", config.gateway.bind_address, config.gateway.port),
    );
    ui::kv("Data", &config.gateway.data_dir().display().to_string());
    ui::kv("Frontend", &config.oauth.frontend_url);

    let providers: Vec<&str> = [
        ("google", config.oauth.google.is_some()),
        ("facebook", config.oauth.facebook.is_some()),
    ]
    .into_iter()
    .filter_map(|(name, enabled)| enabled.then_some(name))
    .collect();
    ui::kv(
        "OAuth",
        &if providers.is_empty() {
            "none".to_string()
        } else {
            providers.join(", ")
        },
    );

    if config.auth.access_secret.is_none() || config.auth.refresh_secret.is_none() {
        ui::warning("Token secrets not configured; sessions will not survive a restart");
        ui::info("Run 'evently secret' to generate a pair");
    }
    println!();

    evently_gateway::start(config).await?;
    Ok(())
}
