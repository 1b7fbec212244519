use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use switchboard_dashboard::{
    cli::{self, Cli},
    config::DashboardConfig,
    dashboard::Dashboard,
    render::render_notice,
};
use switchboard_integration::ChannelNotifier;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // Load configuration from environment
    let config = match DashboardConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };
    tracing::debug!(api = %config.api_base_url, "Loaded configuration");

    let (notifier, mut notices) = ChannelNotifier::new();
    let dashboard = Dashboard::from_config(&config, Arc::new(notifier));
    dashboard.load().await;

    let result = cli::run(cli.command, &dashboard).await;

    while let Ok(notice) = notices.try_recv() {
        eprintln!("{}", render_notice(&notice));
    }

    match result {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(report) => {
            eprintln!("error: {report}");
            ExitCode::FAILURE
        }
    }
}
