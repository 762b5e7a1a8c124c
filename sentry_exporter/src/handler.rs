use lambda_runtime::{Error, LambdaEvent};
use log::{info, warn};
use serde_json::{json, Value};

use crate::modules::csv_export;
use crate::modules::event_fetcher::EventFetcher;
use crate::modules::storage::CsvUploader;

// Orchestrates one export run: fetch -> serialize -> two object writes.
// The incoming payload is an opaque scheduler event and carries no
// parameters. Fetch failures have already been swallowed inside the fetcher
// (the run still succeeds with whatever was accumulated); CSV and storage
// failures propagate as invocation errors.
pub(crate) async fn function_handler(
    event: LambdaEvent<Value>,
    fetcher: &EventFetcher,
    uploader: &CsvUploader,
    project_slug: &str,
) -> Result<Value, Error> {
    let _ = event.payload;

    let records = fetcher.fetch_all().await;
    info!("accumulated {} events", records.len());

    if records.is_empty() {
        warn!("no events fetched, skipping upload");
    } else {
        let csv = csv_export::to_csv(&records)?;
        uploader.upload(project_slug, &csv).await?;
    }

    Ok(json!({
        "statusCode": 200,
        "body": "export completed",
    }))
}
