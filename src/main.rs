use std::sync::Arc;
use std::time::Duration;

use vigil::analysis::ocr::{OcrEngine, TesseractOcr};
use vigil::config::{self, AppConfig};
use vigil::engine::history::RuleEventLog;
use vigil::engine::orchestrator::{EngineDeps, RuleEngine};
use vigil::errors::VigilResult;
use vigil::executor::actions::ActionExecutor;
use vigil::executor::input::EnigoDriver;
use vigil::monitor;
use vigil::profile;
use vigil::vision::gemini::GeminiProvider;
use vigil::vision::provider::VisionProvider;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();

    let Some(profile_arg) = std::env::args().nth(1) else {
        eprintln!("usage: vigil <profile-name-or-path>");
        std::process::exit(2);
    };

    if let Err(e) = run(&profile_arg).await {
        tracing::error!(error = %e, "vigil terminated");
        std::process::exit(1);
    }
}

async fn run(profile_arg: &str) -> VigilResult<()> {
    let config = match config::load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!(error = %e, "no usable config.toml, continuing with defaults");
            AppConfig::default()
        }
    };

    let profile = profile::load_profile(profile_arg)?;

    let model = profile
        .settings
        .gemini_default_model_name
        .clone()
        .unwrap_or_else(|| config.vision.model.clone());
    let vision: Option<Arc<dyn VisionProvider>> = match config.vision.resolve_api_key() {
        Some(key) => Some(Arc::new(GeminiProvider::new(
            config.vision.api_base.clone(),
            key,
            model,
        ))),
        None => {
            tracing::warn!("no Gemini API key found; gemini_vision_query conditions will fail");
            None
        }
    };
    let ocr: Arc<dyn OcrEngine> = Arc::new(TesseractOcr::new(profile.settings.tesseract_cmd.clone()));

    let driver = EnigoDriver::new(&config.input)?;
    let executor = ActionExecutor::new(Box::new(driver), config.input.default_pause_before);

    let engine = RuleEngine::new(
        &profile,
        EngineDeps {
            ocr,
            vision,
            tasks: None,
        },
        executor,
    )
    .with_event_log(RuleEventLog::new());

    let interval = Duration::from_secs_f64(profile.settings.monitoring_interval_seconds);
    let handle = monitor::spawn(engine, profile.regions.clone(), interval);

    tokio::signal::ctrl_c().await?;
    tracing::info!("stop requested");
    handle.shutdown().await;
    Ok(())
}
