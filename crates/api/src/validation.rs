use validator::Validate;

use crate::error::ApiError;

/// Runs derive-based validation and folds failures into the 400 envelope.
pub fn validate<T: Validate>(payload: &T) -> Result<(), ApiError> {
    payload
        .validate()
        .map_err(|err| ApiError::Validation(err.to_string()))
}
