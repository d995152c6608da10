use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, warn};

use geofull::config::Config;
use geofull::extractor::GeminiExtractor;
use geofull::geocoder::NominatimGeocoder;
use geofull::pipeline::EnrichmentPipeline;
use geofull::server::{self, AppState};
use geofull::storage::{AddressStore, InMemoryAddressStore};
use geofull::{logging, metrics, tasks};

#[derive(Parser)]
#[command(name = "geofull")]
#[command(about = "Address normalization and geocoding service")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve,
    /// Enrich the addresses in a CSV file and report the results
    Enrich {
        /// CSV file with a 'direccion' or 'address' column
        #[arg(long)]
        file: PathBuf,
        /// Write the enriched records to this CSV file
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn build_pipeline(
    config: &Config,
    store: Arc<dyn AddressStore>,
) -> Result<Arc<EnrichmentPipeline>, Box<dyn std::error::Error>> {
    let api_key = Config::gemini_api_key();
    if api_key.is_none() {
        warn!("GEMINI_API_KEY is not set; extraction will fail until it is configured");
        println!("⚠️  GEMINI_API_KEY is not set; extraction will fail until it is configured");
    }

    let extractor = GeminiExtractor::new(&config.extractor, api_key)?;
    let geocoder = NominatimGeocoder::new(&config.geocoder)?;

    Ok(Arc::new(EnrichmentPipeline::new(
        store,
        Arc::new(extractor),
        Arc::new(geocoder),
        config.locality.city.clone(),
        config.locality.region.clone(),
    )))
}

async fn enrich_file(
    store: Arc<dyn AddressStore>,
    pipeline: Arc<EnrichmentPipeline>,
    file: PathBuf,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let import = tasks::import_csv_file(&store, &file).await?;
    println!(
        "📄 Read {} rows from {}: {} new addresses, {} skipped",
        import.rows_found,
        file.display(),
        import.created(),
        import.skipped
    );

    let summary = pipeline.process_unverified().await?;
    println!(
        "✅ Enrichment finished: {} attempted, {} verified, {} halted",
        summary.attempted, summary.verified, summary.halted
    );

    if let Some(output) = output {
        let written = tasks::export_csv_file(&store, &output).await?;
        println!("💾 Wrote {} records to {}", written, output.display());
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Initialize logging
    logging::init_logging();
    metrics::init_metrics();

    let cli = Cli::parse();
    let config = Config::load()?;

    let store: Arc<dyn AddressStore> = Arc::new(InMemoryAddressStore::new());
    let pipeline = build_pipeline(&config, store.clone())?;

    match cli.command {
        Commands::Serve => {
            let state = AppState {
                store,
                pipeline,
            };
            if let Err(e) = server::start_server(state, &config.server.host, config.server.port).await {
                error!("Server failed: {}", e);
                return Err(e);
            }
        }
        Commands::Enrich { file, output } => {
            enrich_file(store, pipeline, file, output).await?;
        }
    }

    Ok(())
}
