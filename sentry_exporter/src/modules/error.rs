use std::fmt;

// Crate-wide error type so every fallible stage of a page fetch can be
// caught and logged at the pagination loop without boxing
#[derive(Debug, Clone)]
pub enum ExportError {
    // Non-2xx response from the events endpoint, with the response body kept
    // for debugging
    HttpStatus(u16, String),
    // Connection or protocol level failure
    Transport(String),
    // Page body did not decode as the expected array of events
    JsonDecode(String),
    // dateCreated matched neither accepted timestamp format
    TimestampParse(String),
    // Error while rendering the CSV output
    CsvWrite(String),
    // Error while writing an object to the bucket
    Storage(String),
}

// Implement Display for ExportError
impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::HttpStatus(code, body) => write!(f, "HTTP error {}: {}", code, body),
            ExportError::Transport(err) => write!(f, "Transport error: {}", err),
            ExportError::JsonDecode(err) => write!(f, "JSON decode error: {}", err),
            ExportError::TimestampParse(value) => {
                write!(f, "Unrecognized timestamp format: {}", value)
            }
            ExportError::CsvWrite(err) => write!(f, "CSV write error: {}", err),
            ExportError::Storage(err) => write!(f, "Storage error: {}", err),
        }
    }
}

impl std::error::Error for ExportError {}
