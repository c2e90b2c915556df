use consult::config::Config;
use consult::consult::Consultation;
use consult::dispatch::http::HttpClient;
use consult::output::write_outputs;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    // A missing .env is fine; the credential may come from the real environment.
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    tracing::debug!(?config, "configuration loaded");

    let client = HttpClient::from_config(&config)?;
    let runner = Consultation::new(client);

    let results = runner
        .run_all(&config.models, &config.prompt, &config.params)
        .await;

    // Per-model failures are already in `results`; only a write failure ends the run non-zero.
    write_outputs(
        &results,
        &config.title,
        &config.prompt,
        &config.json_path,
        &config.markdown_path,
    )
    .await?;

    tracing::info!("consultation complete");
    Ok(())
}
