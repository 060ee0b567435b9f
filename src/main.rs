use flashgen::logger::{self, LoggerConfig};
use flashgen::{
    chunk_document, Config, FlashcardGenerator, FlashgenError, GenerationSlot, OllamaClient,
    Outcome, QaPair,
};
use std::env;
use std::path::Path;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dotenv_loaded = dotenv::dotenv().is_ok();
    let config = Config::from_env();

    logger::init_with_config(LoggerConfig::development().with_level(config.log_level))?;
    if !dotenv_loaded {
        log::debug!("No .env file found, using system environment variables");
    }
    logger::log_startup_info(
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        &config.ollama.base_url,
    );
    logger::log_config_info(&config);

    let path = match env::args().nth(1) {
        Some(path) => path,
        None => {
            eprintln!("Usage: flashgen <document.txt|document.csv>");
            std::process::exit(2);
        }
    };
    let document = read_document(Path::new(&path)).await?;

    let mut client = OllamaClient::new(config.ollama.clone())?;
    if !client.check_connection().await {
        return Err(FlashgenError::ConnectivityError(config.ollama.base_url.clone()).into());
    }
    if client.config().model.trim().is_empty() {
        let models = client.list_models().await?;
        let first = models.first().ok_or_else(|| {
            FlashgenError::ConfigError(
                "No models installed. Run `ollama pull <model>` first.".into(),
            )
        })?;
        log::warn!("⚠️  OLLAMA_MODEL not set, using {}", first.name);
        client = client.with_model(first.name.clone())?;
    }

    let chunks = chunk_document(&document, &config.chunking)?;
    let mut pairs = QaPair::from_chunks(chunks);
    log::info!("📄 {} split into {} rows", path, pairs.len());

    let slot = GenerationSlot::new();
    let stopper = slot.clone();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if !stopper.stop() {
                std::process::exit(130);
            }
        }
    });

    let flashcards = FlashcardGenerator::new(client.text().clone(), config.prompts.clone())
        .with_publish_interval(config.publish_interval);
    let generation = slot.begin();
    let cancel = generation.token();

    log::info!("📝 Summarizing document...");
    let summary = flashcards
        .summarize(&document, &cancel, |text| {
            log::trace!("Summary so far: {} chars", text.chars().count())
        })
        .await?;

    if summary.outcome == Outcome::Cancelled {
        log::warn!("Summary stopped, skipping Q&A generation");
    } else {
        log::info!("✅ Summary ready ({} chars)", summary.text.chars().count());
        let report = flashcards
            .generate_pairs(&mut pairs, &summary.text, &cancel, |pair| {
                log::trace!(
                    "Row {}: question {} chars, answer {} chars",
                    pair.id,
                    pair.question.chars().count(),
                    pair.answer.chars().count()
                )
            })
            .await?;
        if report.failed > 0 {
            log::warn!("⚠️  {} rows failed, see errors above", report.failed);
        }
    }
    drop(generation);

    println!("{}", serde_json::to_string_pretty(&pairs)?);
    Ok(())
}

async fn read_document(path: &Path) -> Result<String, FlashgenError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();
    if matches!(extension.as_str(), "pdf" | "docx") {
        return Err(FlashgenError::ConfigError(format!(
            "Unsupported document type: .{} (convert it to plain text first)",
            extension
        )));
    }

    let text = tokio::fs::read_to_string(path).await?;
    log::debug!("Read {} chars from {}", text.chars().count(), path.display());
    Ok(text)
}
