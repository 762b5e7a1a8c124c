use csv::WriterBuilder;

use crate::modules::error::ExportError;
use crate::modules::event_fetcher::event::FlatRecord;

// Column order is part of the export contract; downstream consumers index
// the file by position
pub const CSV_COLUMNS: [&str; 15] = [
    "issue_id",
    "event_id",
    "project_id",
    "event_type",
    "title",
    "message",
    "platform",
    "culprit",
    "created_at",
    "collect_id",
    "kind_of_material",
    "type_of_packaging",
    "hauler_cnpj",
    "receiver_cnpj",
    "sentry_url",
];

// Render the records as semicolon-delimited CSV, one header line followed by
// one line per record in input order. Missing optional fields render empty.
pub fn to_csv(records: &[FlatRecord]) -> Result<String, ExportError> {
    let mut writer = WriterBuilder::new().delimiter(b';').from_writer(Vec::new());

    writer
        .write_record(CSV_COLUMNS)
        .map_err(|e| ExportError::CsvWrite(e.to_string()))?;

    for record in records {
        writer
            .write_record([
                record.issue_id.as_str(),
                record.event_id.as_str(),
                record.project_id.as_str(),
                record.event_type.as_str(),
                record.title.as_deref().unwrap_or(""),
                record.message.as_deref().unwrap_or(""),
                record.platform.as_deref().unwrap_or(""),
                record.culprit.as_deref().unwrap_or(""),
                record.created_at.as_str(),
                record.collect_id.as_deref().unwrap_or(""),
                record.kind_of_material.as_deref().unwrap_or(""),
                record.type_of_packaging.as_deref().unwrap_or(""),
                record.hauler_cnpj.as_deref().unwrap_or(""),
                record.receiver_cnpj.as_deref().unwrap_or(""),
                record.sentry_url.as_str(),
            ])
            .map_err(|e| ExportError::CsvWrite(e.to_string()))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::CsvWrite(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| ExportError::CsvWrite(e.to_string()))
}
