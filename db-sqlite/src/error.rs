//! Error types for database operations and conversions.

use model::database::TxError;
use std::error::Error;
use std::fmt;

/// Error raised when a stored row fails to convert into its domain model
/// (a malformed `Decimal`/`NaiveDate`/enum string, typically meaning the
/// row was written by a different schema version).
#[derive(Debug)]
pub struct ConversionError {
    field: String,
    details: String,
}

impl ConversionError {
    /// Builds a conversion error naming the offending field.
    pub fn new(field: impl Into<String>, details: impl Into<String>) -> Self {
        ConversionError {
            field: field.into(),
            details: details.into(),
        }
    }
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conversion error for field '{}': {}", self.field, self.details)
    }
}

impl Error for ConversionError {}

impl From<ConversionError> for TxError {
    fn from(value: ConversionError) -> Self {
        TxError::Db(value.to_string())
    }
}

/// Converts a Diesel row into its domain model, or a [`TxError`] on a
/// malformed column.
pub trait IntoDomainModel<T> {
    /// Performs the conversion.
    fn into_domain_model(self) -> Result<T, TxError>;
}

/// Converts a collection of Diesel rows into their domain models.
pub trait IntoDomainModels<T> {
    /// Performs the conversion over the whole collection.
    fn into_domain_models(self) -> Result<Vec<T>, TxError>;
}

impl<S, T> IntoDomainModels<T> for Vec<S>
where
    S: IntoDomainModel<T>,
{
    fn into_domain_models(self) -> Result<Vec<T>, TxError> {
        self.into_iter().map(IntoDomainModel::into_domain_model).collect()
    }
}

/// Maps a Diesel error into the store's [`TxError`] taxonomy.
pub fn map_diesel_error(error: diesel::result::Error) -> TxError {
    match error {
        diesel::result::Error::NotFound => TxError::NotFound,
        other => TxError::Db(other.to_string()),
    }
}
