use aws_config::BehaviorVersion;
use aws_sdk_s3::Client as S3Client;
use lambda_runtime::{run, service_fn, Error};
use log::info;

use crate::modules::event_fetcher::EventFetcher;
use crate::modules::storage::CsvUploader;

mod config;
mod handler;
mod modules;

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();

    // Deployment identifiers and secrets come from the environment
    let settings = match config::load_env_settings() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error loading environment settings: {}", e);
            return Err(Error::from(e.to_string()));
        }
    };

    // Non-secret tunables ship with the bundle as Config.toml
    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "Config.toml".to_string());
    let config = match config::load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration from {}: {}", config_path, e);
            return Err(Error::from(e.to_string()));
        }
    };

    // One shared AWS config; the S3 client is built once here and injected
    // into the uploader
    let shared_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let s3_client = S3Client::new(&shared_config);

    let fetcher = EventFetcher::new(config.event_fetcher, settings.clone());
    let uploader = CsvUploader::new(s3_client, settings.bucket_name.clone(), config.storage);

    info!("starting event export for project {}", settings.project_slug);

    run(service_fn(|event| {
        handler::function_handler(event, &fetcher, &uploader, &settings.project_slug)
    }))
    .await
}
