//! tx-archive - Main entry point
//!
//! Exports chain transactions into an archive and replays archives against a
//! node.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tx_archive::{
    open_source, ArchiveError, ArchiveFormat, ArchiveSettings, ExportConfig, ExportService,
    HttpClient, OutputFile, ReplayService, Source,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();

    let config_path = matches.get_one::<PathBuf>("config");
    let mut settings = ArchiveSettings::load(config_path.map(PathBuf::as_path))
        .context("failed to load settings")?;

    if let Some(level) = matches.get_one::<String>("log-level") {
        settings.log_level = level.clone();
    }
    init_logging(&settings.log_level);

    info!(version = tx_archive::VERSION, "Starting tx-archive");

    if let Some(port) = matches.get_one::<u16>("metrics-port") {
        init_metrics(*port)?;
    }

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            setup_shutdown_signal().await;
            info!("Shutdown signal received, stopping...");
            cancel.cancel();
        }
    });

    let result = match matches.subcommand() {
        Some(("export", args)) => run_export(args, settings, &cancel).await,
        Some(("replay", args)) => run_replay(args, settings, &cancel).await,
        _ => anyhow::bail!("no subcommand given"),
    };

    if let Err(e) = &result {
        let category = e
            .downcast_ref::<ArchiveError>()
            .map_or("internal", ArchiveError::category);
        error!(error = %format!("{e:#}"), category, "tx-archive stopped with error");
    }

    result
}

fn cli() -> Command {
    let remote = Arg::new("remote")
        .short('r')
        .long("remote")
        .value_name("URL")
        .help("JSON-RPC URL of the chain node");

    Command::new("tx-archive")
        .version(tx_archive::VERSION)
        .about("Chain transaction backup and replay")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Settings file path")
                .value_parser(clap::value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)")
                .global(true),
        )
        .arg(
            Arg::new("metrics-port")
                .long("metrics-port")
                .value_name("PORT")
                .help("Serve Prometheus metrics on this port")
                .value_parser(clap::value_parser!(u16))
                .global(true),
        )
        .subcommand(
            Command::new("export")
                .about("Export block transactions into an archive")
                .arg(remote.clone())
                .arg(
                    Arg::new("output-path")
                        .short('o')
                        .long("output-path")
                        .value_name("FILE")
                        .help("Archive file to write")
                        .value_parser(clap::value_parser!(PathBuf))
                        .default_value(tx_archive::config::DEFAULT_OUTPUT_PATH),
                )
                .arg(
                    Arg::new("overwrite")
                        .long("overwrite")
                        .help("Replace an existing archive")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("from-block")
                        .long("from-block")
                        .value_name("HEIGHT")
                        .help("First block to export")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("1"),
                )
                .arg(
                    Arg::new("to-block")
                        .long("to-block")
                        .value_name("HEIGHT")
                        .help("Last block to export, defaults to the latest block")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    Arg::new("watch")
                        .short('w')
                        .long("watch")
                        .help("Keep exporting new blocks after the range is done")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("replay")
                .about("Replay an archive against a node")
                .arg(remote)
                .arg(
                    Arg::new("input-path")
                        .short('i')
                        .long("input-path")
                        .value_name("FILE")
                        .help("Archive file to read")
                        .value_parser(clap::value_parser!(PathBuf))
                        .required(true),
                )
                .arg(
                    Arg::new("legacy")
                        .long("legacy")
                        .help("Read a legacy archive of bare transactions")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("watch")
                        .short('w')
                        .long("watch")
                        .help("Keep reading lines appended to the archive")
                        .action(ArgAction::SetTrue),
                ),
        )
}

async fn run_export(
    args: &ArgMatches,
    settings: ArchiveSettings,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let cfg = ExportConfig {
        from_block: args.get_one::<u64>("from-block").copied().unwrap_or(1),
        to_block: args.get_one::<u64>("to-block").copied(),
        output_path: args
            .get_one::<PathBuf>("output-path")
            .cloned()
            .unwrap_or_else(|| PathBuf::from(tx_archive::config::DEFAULT_OUTPUT_PATH)),
        overwrite: args.get_flag("overwrite"),
        watch: args.get_flag("watch"),
    };

    let client = connect(args, &settings)?;
    let sink = OutputFile::new(cfg.output_path.clone(), cfg.overwrite);

    let mut service =
        ExportService::new(client, sink).with_watch_interval(settings.watch_interval());
    service
        .execute_export(cancel, &cfg)
        .await
        .with_context(|| format!("export into {} failed", cfg.output_path.display()))
}

async fn run_replay(
    args: &ArgMatches,
    settings: ArchiveSettings,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let input = args
        .get_one::<PathBuf>("input-path")
        .context("missing input path")?;
    let format = if args.get_flag("legacy") {
        ArchiveFormat::Legacy
    } else {
        ArchiveFormat::Standard
    };
    let tail = args.get_flag("watch");

    let client = connect(args, &settings)?;
    let mut source = open_source(input.as_path(), format, tail)
        .await
        .with_context(|| format!("failed to open {}", input.display()))?;

    let mut service = ReplayService::new(client).with_poll_interval(settings.tail_interval());
    let replayed = service.execute_replay(cancel, source.as_mut(), tail).await;

    close_source(source, replayed)
        .await
        .with_context(|| format!("replay of {} failed", input.display()))
}

/// Close the archive after a replay without masking the replay's own failure
async fn close_source(
    source: Box<dyn Source>,
    replayed: tx_archive::Result<()>,
) -> tx_archive::Result<()> {
    match (replayed, source.close().await) {
        (Err(e), Err(close_err)) => {
            warn!(error = %close_err, "Failed to close archive");
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
        (Ok(()), closed) => closed,
    }
}

/// Build the node client, preferring the command line remote over settings
fn connect(args: &ArgMatches, settings: &ArchiveSettings) -> anyhow::Result<HttpClient> {
    let remote = args
        .get_one::<String>("remote")
        .unwrap_or(&settings.remote);

    let client = HttpClient::new(remote).with_context(|| format!("invalid remote {remote}"))?;
    info!(remote = %client.remote(), "Connecting to node");

    Ok(client)
}

/// Initialize logging with the specified level
fn init_logging(log_level: &str) {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => {
            eprintln!("Invalid log level: {}. Using 'info'", log_level);
            tracing::Level::INFO
        }
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("tx_archive={}", level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Serve Prometheus metrics on all interfaces
fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("failed to install metrics exporter")?;

    info!(%addr, "Metrics exporter listening");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        cli().debug_assert();
    }

    #[test]
    fn test_export_defaults() {
        let matches = cli().try_get_matches_from(["tx-archive", "export"]).unwrap();
        let (_, args) = matches.subcommand().unwrap();

        assert_eq!(args.get_one::<u64>("from-block"), Some(&1));
        assert_eq!(args.get_one::<u64>("to-block"), None);
        assert_eq!(
            args.get_one::<PathBuf>("output-path"),
            Some(&PathBuf::from("./backup.jsonl"))
        );
        assert!(!args.get_flag("overwrite"));
        assert!(!args.get_flag("watch"));
    }

    #[test]
    fn test_replay_requires_input() {
        assert!(cli().try_get_matches_from(["tx-archive", "replay"]).is_err());

        let matches = cli()
            .try_get_matches_from([
                "tx-archive",
                "replay",
                "-i",
                "txs.jsonl",
                "--legacy",
                "--watch",
            ])
            .unwrap();
        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "replay");
        assert!(args.get_flag("legacy"));
        assert!(args.get_flag("watch"));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let matches = cli()
            .try_get_matches_from([
                "tx-archive",
                "export",
                "--log-level",
                "debug",
                "--metrics-port",
                "9100",
            ])
            .unwrap();

        assert_eq!(matches.get_one::<String>("log-level").map(String::as_str), Some("debug"));
        assert_eq!(matches.get_one::<u16>("metrics-port"), Some(&9100));
    }

    struct UnclosableSource;

    #[async_trait::async_trait]
    impl Source for UnclosableSource {
        fn format(&self) -> ArchiveFormat {
            ArchiveFormat::Standard
        }

        async fn next(
            &mut self,
            _cancel: &CancellationToken,
        ) -> tx_archive::Result<Option<tx_archive::TxRecord>> {
            Ok(None)
        }

        async fn close(self: Box<Self>) -> tx_archive::Result<()> {
            Err(ArchiveError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "close failed",
            )))
        }
    }

    #[tokio::test]
    async fn test_close_failure_keeps_replay_error() {
        let replayed = Err(ArchiveError::Submit(tx_archive::ClientError::invalid_response(
            "node down",
        )));

        let err = close_source(Box::new(UnclosableSource), replayed)
            .await
            .unwrap_err();
        assert_eq!(err.category(), "submit");

        let err = close_source(Box::new(UnclosableSource), Ok(()))
            .await
            .unwrap_err();
        assert_eq!(err.category(), "io");
    }
}
