pub mod error;
pub mod identifier;
pub mod time;

pub use error::{CoreError, ErrorCategory, Result};
pub use identifier::{
    NamespacedIdentifier, decode_identifier, decode_identifier_value, encode_identifier,
    is_valid_identifier,
};
pub use time::{DatePrecision, FhirDate};
