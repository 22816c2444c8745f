//! Resolution of abstract API definitions into concrete targets.
//!
//! Resolution is synchronous and performs no network activity. Relation
//! endpoints go through a [`ServiceDiscovery`] implementation that answers from
//! previously loaded metadata.

use crate::api::{Api, Endpoint, ParameterEncoding, Parameters};
use crate::{Result, ServiceError};
use http::{HeaderMap, Method};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use url::Url;

/// A fully resolved API: concrete URL, method, parameters and encoding.
///
/// Resolved once per request and reused unchanged across retries.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiTarget {
    /// The absolute URL, without encoded parameters.
    pub url: Url,

    /// The HTTP method.
    pub method: Method,

    /// The parameters, not yet serialized.
    pub parameters: Parameters,

    /// How the parameters are serialized.
    pub encoding: ParameterEncoding,

    /// Requester default headers with the API's own headers merged over them.
    pub headers: HeaderMap,
}

/// Lookup of named relations against previously refreshed metadata.
///
/// # Examples
///
/// ```
/// use requester::ServiceDiscovery;
/// use std::collections::BTreeMap;
/// use url::Url;
///
/// struct Fixed(Url);
///
/// impl ServiceDiscovery for Fixed {
///     fn resolve_url(&self, relation: &str, _variables: &BTreeMap<String, String>) -> Option<Url> {
///         (relation == "status").then(|| self.0.clone())
///     }
///
///     fn has_entry(&self, relation: &str) -> bool {
///         relation == "status"
///     }
/// }
/// ```
pub trait ServiceDiscovery: Send + Sync {
    /// Produces the URL for `relation`, or `None` if it cannot be built.
    fn resolve_url(&self, relation: &str, variables: &BTreeMap<String, String>) -> Option<Url>;

    /// Returns `true` if `relation` is known.
    fn has_entry(&self, relation: &str) -> bool;
}

/// An in-memory discovery table of relation names to URL templates.
///
/// Templates use `{name}` placeholders, e.g. `https://api.example.com/users/{id}`.
/// Values are percent-encoded, so each one stays inside the component it was
/// placed in. A placeholder with no matching variable, or bound to `.` or
/// `..`, does not resolve.
#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    templates: HashMap<String, String>,
}

impl StaticDiscovery {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a relation template.
    pub fn with_relation(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
        self.templates.insert(name.into(), template.into());
        self
    }
}

impl ServiceDiscovery for StaticDiscovery {
    fn resolve_url(&self, relation: &str, variables: &BTreeMap<String, String>) -> Option<Url> {
        let template = self.templates.get(relation)?;
        let expanded = expand_template(template, variables)?;
        Url::parse(&expanded).ok()
    }

    fn has_entry(&self, relation: &str) -> bool {
        self.templates.contains_key(relation)
    }
}

/// Substitutes `{name}` placeholders; `None` if any is unbound or unterminated.
fn expand_template(template: &str, variables: &BTreeMap<String, String>) -> Option<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}')?;
        out.push_str(&encode_variable(variables.get(&after[..close])?)?);
        rest = &after[close + 1..];
    }
    out.push_str(rest);

    Some(out)
}

/// Percent-encodes a template value as a single opaque segment.
///
/// Dot segments are refused: URL parsing collapses them even when encoded.
fn encode_variable(value: &str) -> Option<String> {
    if value == "." || value == ".." {
        return None;
    }
    // byte_serialize writes spaces as '+' and escapes literal '+'.
    let encoded: String = url::form_urlencoded::byte_serialize(value.as_bytes()).collect();
    Some(encoded.replace('+', "%20"))
}

/// Maps [`Api`] definitions to [`ApiTarget`]s.
#[derive(Clone, Default)]
pub struct TargetResolver {
    base_url: Option<Url>,
    discovery: Option<Arc<dyn ServiceDiscovery>>,
    default_headers: HeaderMap,
}

impl TargetResolver {
    /// Creates a resolver.
    pub fn new(
        base_url: Option<Url>,
        discovery: Option<Arc<dyn ServiceDiscovery>>,
        default_headers: HeaderMap,
    ) -> Self {
        Self {
            base_url,
            discovery,
            default_headers,
        }
    }

    /// Resolves `api` into a target.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Resolution`] when a path endpoint has no base
    /// URL to join onto, or a relation is unknown or cannot be expanded.
    pub fn resolve(&self, api: &dyn Api) -> Result<ApiTarget> {
        let url = match api.endpoint() {
            Endpoint::Absolute(url) => url,
            Endpoint::Path(path) => {
                let mut base = self.base_url.clone().ok_or_else(|| {
                    ServiceError::Resolution(format!(
                        "path endpoint '{}' requires a base URL",
                        path
                    ))
                })?;
                if !base.path().ends_with('/') {
                    let directory = format!("{}/", base.path());
                    base.set_path(&directory);
                }
                // "./" keeps a leading "name:" segment from parsing as a scheme.
                base.join(&format!("./{}", path.trim_start_matches('/')))
                    .map_err(|e| {
                        ServiceError::Resolution(format!(
                            "path endpoint '{}' is not a valid relative URL: {}",
                            path, e
                        ))
                    })?
            }
            Endpoint::Relation { name, variables } => {
                let discovery = self.discovery.as_ref().ok_or_else(|| {
                    ServiceError::Resolution(format!(
                        "relation '{}' requires service discovery",
                        name
                    ))
                })?;
                if !discovery.has_entry(&name) {
                    return Err(ServiceError::Resolution(format!(
                        "unknown relation '{}'",
                        name
                    )));
                }
                discovery.resolve_url(&name, &variables).ok_or_else(|| {
                    ServiceError::Resolution(format!(
                        "relation '{}' could not be resolved with variables {:?}",
                        name,
                        variables.keys().collect::<Vec<_>>()
                    ))
                })?
            }
        };

        let mut headers = self.default_headers.clone();
        for (name, value) in api.headers().iter() {
            headers.insert(name.clone(), value.clone());
        }

        Ok(ApiTarget {
            url,
            method: api.method(),
            parameters: api.parameters(),
            encoding: api.encoding(),
            headers,
        })
    }
}
