use changelog::TreeError;
use quick_xml::events::attributes::AttrError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, XmlError>;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML parsing error: {0}")]
    Parse(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    ParseAttribute(#[from] AttrError),

    #[error(
        "Invalid character {character:?} found {context}. To resolve, remove the invalid character from the source data and try again"
    )]
    InvalidCharacter { character: char, context: String },

    #[error("XML writer misuse: {0}")]
    WriterState(String),

    #[error("Unsupported output encoding: {0} (only UTF-8 is written)")]
    UnsupportedEncoding(String),

    #[error(transparent)]
    Tree(#[from] TreeError),
}

impl XmlError {
    /// Whether this error comes from reading or writing bytes rather than
    /// from the content being serialized.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            XmlError::Io(_) | XmlError::Parse(_) | XmlError::ParseAttribute(_)
        )
    }
}
