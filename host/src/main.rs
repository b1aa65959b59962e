use anyhow::Result;
use engine_core::config::EngineConfig;
use lunaforge::{create_backend, create_services, CliArgs, Session};
use std::path::Path;
use tracing::info;

const DEFAULT_CONFIG: &str = "lunaforge.json";

fn main() -> Result<()> {
    let cli = CliArgs::parse(std::env::args().skip(1))?;

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::load_or_default(Path::new(DEFAULT_CONFIG))?,
    };
    cli.apply(&mut config);

    tracing_subscriber::fmt()
        .with_max_level(config.tracing_level())
        .init();

    info!("Lunaforge starting...");

    let gpu = create_backend(config.backend);
    let services = create_services(&config);
    let mut session = Session::new(gpu, services)?;

    let source = std::fs::read_to_string(&config.script)
        .map_err(|e| anyhow::anyhow!("Cannot read script {}: {}", config.script.display(), e))?;
    session.load_script(&source, &config.script.display().to_string())?;

    if let Some(report) = session.run(config.frames, cli.simulate_context_loss)? {
        info!(
            "Context loss recovery: {} reloaded, {} failed",
            report.reloaded, report.failed
        );
    }
    Ok(())
}
