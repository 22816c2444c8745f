//! Pluggable response parsing and typed decoding.
//!
//! A [`Parser`] turns a response body into a JSON value, or reports why it
//! could not: either the body is malformed, or it is a recognized error
//! envelope. [`decode`] then deserializes the value into the caller's type.
//! Parsers are chosen per API by a [`ParserFactory`].

use crate::api::Api;
use crate::response::DataResponse;
use crate::{Result, ServiceError};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// Why a parser did not produce a value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsingOutcome {
    /// The body could not be parsed.
    Malformed(String),
    /// The body is a well-formed error envelope.
    ApiError(Value),
}

/// Extracts the payload value from a response.
pub trait Parser: Send + Sync {
    /// Parses `response` into the value to deserialize.
    fn parse(&self, response: &DataResponse) -> std::result::Result<Value, ParsingOutcome>;
}

/// Chooses the parser for an API.
///
/// Implemented for any `Fn(&dyn Api) -> Arc<dyn Parser>`.
pub trait ParserFactory: Send + Sync {
    /// Returns the parser for `api`.
    fn make(&self, api: &dyn Api) -> Arc<dyn Parser>;
}

impl<F> ParserFactory for F
where
    F: Fn(&dyn Api) -> Arc<dyn Parser> + Send + Sync,
{
    fn make(&self, api: &dyn Api) -> Arc<dyn Parser> {
        self(api)
    }
}

/// Uses one parser for every API.
#[derive(Clone)]
pub struct SharedParser(pub Arc<dyn Parser>);

impl ParserFactory for SharedParser {
    fn make(&self, _api: &dyn Api) -> Arc<dyn Parser> {
        self.0.clone()
    }
}

impl Default for SharedParser {
    fn default() -> Self {
        SharedParser(Arc::new(JsonParser))
    }
}

/// Parses the whole body as JSON. An empty body parses as `null`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonParser;

impl Parser for JsonParser {
    fn parse(&self, response: &DataResponse) -> std::result::Result<Value, ParsingOutcome> {
        parse_json(response)
    }
}

fn parse_json(response: &DataResponse) -> std::result::Result<Value, ParsingOutcome> {
    if response.body.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&response.body).map_err(|e| ParsingOutcome::Malformed(e.to_string()))
}

/// Parses bodies of the shape `{"<data_key>": ..., "<error_key>": ...}`.
///
/// A non-null `error_key` member makes the body an API error envelope.
/// Otherwise the `data_key` member is the payload, or the whole body when no
/// data key is configured.
///
/// # Examples
///
/// ```
/// use requester::{EnvelopeParser, Parser, ParsingOutcome, DataResponse, TransportRequest};
/// use http::{HeaderMap, Method, StatusCode};
///
/// let parser = EnvelopeParser::new("error").with_data_key("data");
/// let request = TransportRequest::new(Method::GET, "https://a.example/".parse().unwrap());
/// let response = DataResponse::new(
///     r#"{"error":{"code":7}}"#.into(),
///     request,
///     StatusCode::OK,
///     HeaderMap::new(),
/// );
///
/// assert_eq!(
///     parser.parse(&response),
///     Err(ParsingOutcome::ApiError(serde_json::json!({ "code": 7 })))
/// );
/// ```
#[derive(Debug, Clone)]
pub struct EnvelopeParser {
    error_key: String,
    data_key: Option<String>,
}

impl EnvelopeParser {
    /// Creates a parser recognizing error envelopes under `error_key`.
    pub fn new(error_key: impl Into<String>) -> Self {
        Self {
            error_key: error_key.into(),
            data_key: None,
        }
    }

    /// Unwraps the payload from `data_key`.
    pub fn with_data_key(mut self, data_key: impl Into<String>) -> Self {
        self.data_key = Some(data_key.into());
        self
    }
}

impl Parser for EnvelopeParser {
    fn parse(&self, response: &DataResponse) -> std::result::Result<Value, ParsingOutcome> {
        let value = parse_json(response)?;

        let mut object = match (value, &self.data_key) {
            (Value::Object(object), _) => object,
            (other, None) => return Ok(other),
            (_, Some(key)) => {
                return Err(ParsingOutcome::Malformed(format!(
                    "expected an object with a '{}' member",
                    key
                )))
            }
        };

        match object.remove(&self.error_key) {
            Some(Value::Null) | None => {}
            Some(error) => return Err(ParsingOutcome::ApiError(error)),
        }

        match &self.data_key {
            Some(key) => object
                .remove(key)
                .ok_or_else(|| ParsingOutcome::Malformed(format!("missing '{}' member", key))),
            None => Ok(Value::Object(object)),
        }
    }
}

/// Decodes `response` into `T` with `parser`.
///
/// # Errors
///
/// * [`ServiceError::Parsing`] if the parser reports a malformed body or the
///   parsed value does not deserialize into `T`
/// * [`ServiceError::Api`] if the parser recognizes an error envelope
pub fn decode<T: DeserializeOwned>(response: &DataResponse, parser: &dyn Parser) -> Result<T> {
    let value = match parser.parse(response) {
        Ok(value) => value,
        Err(ParsingOutcome::Malformed(message)) => {
            return Err(ServiceError::Parsing {
                message,
                response: Box::new(response.clone()),
            })
        }
        Err(ParsingOutcome::ApiError(body)) => {
            return Err(ServiceError::Api {
                body,
                response: Box::new(response.clone()),
            })
        }
    };

    serde_json::from_value(value).map_err(|e| {
        tracing::error!(
            error = %e,
            raw_response = %response.text(),
            "Failed to deserialize response"
        );
        ServiceError::Parsing {
            message: e.to_string(),
            response: Box::new(response.clone()),
        }
    })
}
