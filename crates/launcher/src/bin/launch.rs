//! Launcher binary entry point
//!
//! Loads settings, builds the training job and submits it.
//!
//! Usage: `launch [SETTINGS_FILE]`

use std::path::PathBuf;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use launcher::{connect, run_training_job};
use launcher_core::Settings;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "launcher=info,job_api=info,launcher_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Optional settings file as the only argument
    let settings_path = std::env::args().nth(1).map(PathBuf::from);
    let settings = Settings::load(settings_path.as_deref())?;

    tracing::info!(
        workspace = %settings.workspace,
        experiment = %settings.experiment,
        parallel_mode = %settings.parallel_mode,
        "Loaded settings"
    );

    let submitter = connect(&settings, |key| std::env::var(key).ok())?;
    let handle = run_training_job(&settings, submitter.as_ref()).await?;

    match handle.studio_url {
        Some(url) => println!("{}", url),
        None => println!("{} ({})", handle.name, handle.status),
    }

    Ok(())
}
