use thiserror::Error;

#[derive(Error, Debug)]
pub enum MapasError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("XML error in {file}: {message}")]
    Xml { file: String, message: String },

    #[error("{file}: missing required field {field}")]
    MissingField { file: String, field: &'static str },

    #[error("{file}: invalid number '{value}' in {field}")]
    InvalidNumber {
        file: String,
        field: &'static str,
        value: String,
    },

    #[error("Classification rules not found: {0}")]
    MissingRules(String),

    #[error("Rule table error: {0}")]
    RuleTable(String),

    #[error("Unsupported rule table format: {0}")]
    UnsupportedFormat(String),

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, MapasError>;
