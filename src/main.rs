use tracing::{info, warn};

use review_grabber::core::config::{load_file_config, CliArgs};
use review_grabber::core::logging::init_logging;
use review_grabber::{setup, Grabber, GrabberConfig};

/// Install the Ctrl-C handler right away so a press during browser launch or
/// page load is delivered as a shutdown instead of killing the process.
fn shutdown_signal() -> impl std::future::Future<Output = ()> {
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = tx.send(());
            }
            Err(e) => {
                warn!("failed to listen for Ctrl-C: {}", e);
                // Keep the sender alive so the receiver never resolves.
                futures::future::pending::<()>().await;
                drop(tx);
            }
        }
    });
    async move {
        let _ = rx.await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliArgs::from_env();
    let (file_config, source) = load_file_config(cli.config.as_deref());
    let config = GrabberConfig::resolve(file_config).apply_cli(&cli);

    init_logging(&config.log_file);
    source.log();

    // Handle setup-only mode
    if cli.setup {
        let report = setup::check_all(&config).await;
        println!("{}", report);
        report.print_action_required_blocks();
        if report.has_failures() {
            std::process::exit(2);
        }
        return Ok(());
    }

    config.validate()?;

    let report = setup::check_all(&config).await;
    info!("{}", report.summarize_for_logs());
    if report.has_failures() {
        warn!("pre-flight checklist found failures; run with --setup for details");
    }

    info!(
        "target: {} -> {}",
        config.product_url,
        config.download_folder.display()
    );

    let shutdown = shutdown_signal();
    let grabber = Grabber::new(config).await?;
    grabber.start_monitoring(shutdown).await;

    Ok(())
}
