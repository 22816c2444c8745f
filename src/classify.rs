//! Reconciles the raw executor signals into a single [`DataResult`].

use crate::executor::{ExecutorResponse, TransportError};
use crate::request::TransportRequest;
use crate::response::DataResponse;
use crate::ServiceError;

/// The outcome of one attempt: a response or a failure, never both.
pub type DataResult = std::result::Result<DataResponse, ServiceError>;

/// Classifies the raw outcome of executing `request`.
///
/// Precedence, most specific first:
///
/// 1. status without error: success, body defaults to empty
/// 2. status with error: transport failure carrying the response
/// 3. error without status: transport failure with no response
/// 4. neither: transport failure with [`TransportError::Unknown`]
pub fn classify(raw: ExecutorResponse, request: &TransportRequest) -> DataResult {
    let ExecutorResponse {
        body,
        status,
        headers,
        error,
    } = raw;

    match (status, error) {
        (Some(status), None) => Ok(DataResponse::new(
            body.unwrap_or_default(),
            request.clone(),
            status,
            headers,
        )),
        (Some(status), Some(error)) => Err(ServiceError::Transport {
            error,
            response: Some(Box::new(DataResponse::new(
                body.unwrap_or_default(),
                request.clone(),
                status,
                headers,
            ))),
        }),
        (None, Some(error)) => Err(ServiceError::transport(error)),
        (None, None) => Err(ServiceError::transport(TransportError::Unknown)),
    }
}
