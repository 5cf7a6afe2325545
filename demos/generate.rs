//! Generate one story from a JSON request on stdin.
//!
//! ```text
//! echo '{"keywords": ["dragon", "lighthouse"], "genre": "fantasy", "tone": "mysterious"}' \
//!     | OPENAI_API_KEY=sk-... cargo run --example generate
//! ```
//!
//! Pass `--ready` to print the readiness report instead.

use std::io::Read;
use std::time::Duration;

use anyhow::Context;
use story_pipeline::{
    init_logging, new_correlation_id, LoggingConfig, RawGenerationRequest, ServiceConfig,
    StoryPipeline,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env().context("loading configuration")?;
    init_logging(&LoggingConfig::from_service(&config).with_target("generate"));

    let pipeline = StoryPipeline::from_config(config)?;

    if std::env::args().any(|a| a == "--ready") {
        let report = pipeline.readiness().await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        std::process::exit(if report.ready { 0 } else { 1 });
    }

    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("reading request from stdin")?;
    let request: RawGenerationRequest =
        serde_json::from_str(&input).context("request is not valid JSON")?;

    let correlation_id = new_correlation_id();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(120);

    match pipeline.handle(&request, &correlation_id, Some(deadline)).await {
        Ok(story) => {
            println!("{}", serde_json::to_string_pretty(&story)?);
            Ok(())
        }
        Err(envelope) => {
            eprintln!("status {}", envelope.status());
            println!("{}", serde_json::to_string_pretty(&envelope)?);
            std::process::exit(1);
        }
    }
}
