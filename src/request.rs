//! Transport-level requests and their construction from resolved targets.

use crate::api::{ParameterEncoding, Parameters};
use crate::target::ApiTarget;
use crate::{Result, ServiceError};
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde_json::Value;
use url::Url;

/// Method, URL, headers and body of a request, ready for an executor.
///
/// Values are threaded through the plugin chain by value; each plugin returns
/// a new request rather than mutating shared state.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    /// The HTTP method (GET, POST, etc.).
    pub method: Method,

    /// The absolute URL, including any encoded query.
    pub url: Url,

    /// Headers to send.
    pub headers: HeaderMap,

    /// The body, if any.
    pub body: Option<Bytes>,
}

impl TransportRequest {
    /// Creates a request with no headers and no body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Adds a header to the request.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| ServiceError::Configuration(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| ServiceError::Configuration(format!("Invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Sets the body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// Builds the transport request for `target`, applying its parameter encoding.
///
/// # Errors
///
/// Returns [`ServiceError::Encoding`] when a parameter cannot be represented
/// by the target's encoding, e.g. a nested object in a query string.
pub fn build_request(target: &ApiTarget) -> Result<TransportRequest> {
    let mut request = TransportRequest::new(target.method.clone(), target.url.clone());
    request.headers = target.headers.clone();

    if target.parameters.is_empty() {
        return Ok(request);
    }

    match target.encoding {
        ParameterEncoding::None => {}
        ParameterEncoding::Query => {
            let pairs = flatten_pairs(&target.parameters)?;
            request.url.query_pairs_mut().extend_pairs(pairs);
        }
        ParameterEncoding::Json => {
            let body = serde_json::to_vec(&target.parameters)
                .map_err(|e| ServiceError::Encoding(e.to_string()))?;
            set_default_content_type(&mut request.headers, "application/json");
            request.body = Some(Bytes::from(body));
        }
        ParameterEncoding::Form => {
            let pairs = flatten_pairs(&target.parameters)?;
            let body = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs)
                .finish();
            set_default_content_type(&mut request.headers, "application/x-www-form-urlencoded");
            request.body = Some(Bytes::from(body));
        }
    }

    Ok(request)
}

fn set_default_content_type(headers: &mut HeaderMap, value: &'static str) {
    if !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(value));
    }
}

/// Flattens parameters into key/value pairs. Arrays repeat the key.
fn flatten_pairs(parameters: &Parameters) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::with_capacity(parameters.len());
    for (key, value) in parameters {
        match value {
            Value::Array(items) => {
                for item in items {
                    pairs.push((key.clone(), scalar(key, item)?));
                }
            }
            other => pairs.push((key.clone(), scalar(key, other)?)),
        }
    }
    Ok(pairs)
}

fn scalar(key: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        Value::Array(_) | Value::Object(_) => Err(ServiceError::Encoding(format!(
            "parameter '{}' is not URL-encodable: nested values are not supported",
            key
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn target(encoding: ParameterEncoding, parameters: Value) -> ApiTarget {
        let parameters = match parameters {
            Value::Object(map) => map,
            _ => panic!("parameters must be an object"),
        };
        ApiTarget {
            url: Url::parse("https://api.example.com/search").unwrap(),
            method: Method::POST,
            parameters,
            encoding,
            headers: HeaderMap::new(),
        }
    }

    #[test]
    fn test_query_encoding() {
        let request = build_request(&target(
            ParameterEncoding::Query,
            json!({ "q": "rust lang", "page": 2, "tag": ["a", "b"] }),
        ))
        .unwrap();

        assert_eq!(
            request.url.query(),
            Some("page=2&q=rust+lang&tag=a&tag=b")
        );
        assert!(request.body.is_none());
    }

    #[test]
    fn test_json_encoding() {
        let request = build_request(&target(ParameterEncoding::Json, json!({ "name": "Alice" }))).unwrap();

        assert_eq!(request.headers.get(CONTENT_TYPE).unwrap(), "application/json");
        let body: Value = serde_json::from_slice(request.body.as_ref().unwrap()).unwrap();
        assert_eq!(body, json!({ "name": "Alice" }));
    }

    #[test]
    fn test_form_encoding() {
        let request = build_request(&target(
            ParameterEncoding::Form,
            json!({ "name": "A&B", "ok": true }),
        ))
        .unwrap();

        assert_eq!(
            request.headers.get(CONTENT_TYPE).unwrap(),
            "application/x-www-form-urlencoded"
        );
        assert_eq!(request.body.as_deref(), Some(&b"name=A%26B&ok=true"[..]));
    }

    #[test]
    fn test_nested_query_value_is_encoding_error() {
        let err = build_request(&target(
            ParameterEncoding::Query,
            json!({ "filter": { "a": 1 } }),
        ))
        .unwrap_err();

        assert!(matches!(err, ServiceError::Encoding(_)), "got {:?}", err);
    }

    #[test]
    fn test_no_encoding_ignores_parameters() {
        let request = build_request(&target(ParameterEncoding::None, json!({ "q": 1 }))).unwrap();
        assert_eq!(request.url.query(), None);
        assert!(request.body.is_none());
    }
}
