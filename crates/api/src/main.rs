//! ECU Logger - Main Entry Point
//!
//! Usage: `ecu-logger [--scan] [config.toml]`
//!
//! `--scan` reports supported PIDs and one value for each as JSON, then exits.

use anyhow::Context;
use api::{init_logging, now_ms, run_server, scan, AppConfig, AppState, Pipeline};
use metrics_exporter_prometheus::PrometheusBuilder;
use obd_protocol::ObdClient;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use storage::{log_file_name, CsvLogWriter, Repository};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut scan_mode = false;
    let mut config_path = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--scan" => scan_mode = true,
            _ => config_path = Some(PathBuf::from(arg)),
        }
    }
    let mut config = AppConfig::load(config_path.as_deref()).context("Configuration error")?;

    init_logging(&config.logging);

    info!("=== ECU Logger v{} ===", env!("CARGO_PKG_VERSION"));

    let read_timeout = Duration::from_millis(config.scheduler.read_timeout_ms);
    let mut client = if config.transport.mock {
        ObdClient::mock()
    } else {
        ObdClient::new(&config.transport.device, config.transport.baud_rate).await?
    };
    client.set_timeout_within(read_timeout);

    if scan_mode {
        client
            .initialize()
            .await
            .context("Adapter initialization failed")?;
        let support = client
            .supported_pids()
            .await
            .context("Supported-PID discovery failed")?;
        let report = scan(&mut client, &support, read_timeout, now_ms()).await;
        serde_json::to_writer_pretty(std::io::stdout().lock(), &report)?;
        println!();
        client.disconnect().await;
        return Ok(());
    }

    let metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Prometheus recorder not installed: {}", e);
            None
        }
    };

    match client.initialize().await {
        Ok(()) if config.transport.skip_unsupported => match client.supported_parameters().await {
            Ok(supported) => {
                config.scheduler = config.scheduler.restricted_to(&supported);
                info!("Polling only the {} supported parameters", supported.len());
            }
            Err(e) => warn!("Supported-PID discovery failed, polling everything: {}", e),
        },
        Ok(()) => {}
        // The watchdog keeps retrying once the loop is running
        Err(e) => warn!("Adapter not ready: {}", e),
    }

    let repository = Arc::new(Repository::with_capacity(config.logging.recent_rows));
    let pipeline = Pipeline::new(&config, client, repository.clone(), now_ms())?;

    let csv_path = config.logging.csv_path.clone().unwrap_or_else(|| {
        config
            .logging
            .dir
            .join(log_file_name(chrono::Local::now().naive_local()))
    });
    let (csv, csv_path) = CsvLogWriter::create_or_rotate(&csv_path, pipeline.header())
        .with_context(|| format!("Failed to open CSV log {:?}", csv_path))?;
    info!("Logging to {:?}", csv_path);
    let mut pipeline = pipeline.with_csv_log(csv);

    if config.server.enabled {
        let state = Arc::new(AppState::new(
            repository,
            pipeline.subscribe(),
            pipeline.header().to_vec(),
            metrics,
        ));
        let addr = config.server.bind_addr.clone();
        tokio::spawn(async move {
            if let Err(e) = run_server(&addr, state).await {
                error!("API server stopped: {}", e);
            }
        });
    }

    pipeline
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    info!("ECU Logger stopped");
    Ok(())
}
