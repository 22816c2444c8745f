//! Abstract API definitions.
//!
//! Callers describe each logical endpoint by implementing [`Api`], usually on an
//! enum with one variant per endpoint. The pipeline never looks at the concrete
//! type; it resolves the description into an [`ApiTarget`](crate::ApiTarget)
//! once per request.

use bytes::Bytes;
use http::{HeaderMap, Method};
use std::collections::BTreeMap;
use url::Url;

/// Parameters attached to an API call, keyed by name.
pub type Parameters = serde_json::Map<String, serde_json::Value>;

/// How the parameters of an API are serialized into the transport request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParameterEncoding {
    /// Parameters are ignored.
    #[default]
    None,
    /// Parameters are appended to the URL query string.
    Query,
    /// Parameters are sent as a JSON object body.
    Json,
    /// Parameters are sent as an `application/x-www-form-urlencoded` body.
    Form,
}

/// Where an API lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// A path joined onto the requester's base URL.
    Path(String),

    /// A named relation looked up through service discovery.
    Relation {
        /// The relation name registered with discovery.
        name: String,
        /// Values for the relation's URL template.
        variables: BTreeMap<String, String>,
    },

    /// A fully specified URL.
    Absolute(Url),
}

impl Endpoint {
    /// Shorthand for [`Endpoint::Path`].
    pub fn path(path: impl Into<String>) -> Self {
        Endpoint::Path(path.into())
    }

    /// Shorthand for a relation without template variables.
    pub fn relation(name: impl Into<String>) -> Self {
        Endpoint::Relation {
            name: name.into(),
            variables: BTreeMap::new(),
        }
    }

    /// Adds a template variable to a relation endpoint.
    ///
    /// Has no effect on other endpoint kinds.
    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let Endpoint::Relation { variables, .. } = &mut self {
            variables.insert(key.into(), value.into());
        }
        self
    }
}

/// A caller-authored description of one logical endpoint.
///
/// Only [`endpoint`](Api::endpoint) is required; the rest default to a
/// parameterless `GET`.
///
/// # Examples
///
/// ```
/// use requester::{Api, Endpoint, ParameterEncoding, Parameters};
/// use http::Method;
///
/// enum Todos {
///     List { page: u32 },
///     Create { title: String },
/// }
///
/// impl Api for Todos {
///     fn endpoint(&self) -> Endpoint {
///         Endpoint::path("/todos")
///     }
///
///     fn method(&self) -> Method {
///         match self {
///             Todos::List { .. } => Method::GET,
///             Todos::Create { .. } => Method::POST,
///         }
///     }
///
///     fn parameters(&self) -> Parameters {
///         let mut params = Parameters::new();
///         match self {
///             Todos::List { page } => {
///                 params.insert("page".into(), (*page).into());
///             }
///             Todos::Create { title } => {
///                 params.insert("title".into(), title.clone().into());
///             }
///         }
///         params
///     }
///
///     fn encoding(&self) -> ParameterEncoding {
///         match self {
///             Todos::List { .. } => ParameterEncoding::Query,
///             Todos::Create { .. } => ParameterEncoding::Json,
///         }
///     }
/// }
/// ```
pub trait Api: Send + Sync + 'static {
    /// Where the endpoint lives.
    fn endpoint(&self) -> Endpoint;

    /// The HTTP method.
    fn method(&self) -> Method {
        Method::GET
    }

    /// The parameters to encode.
    fn parameters(&self) -> Parameters {
        Parameters::new()
    }

    /// How [`parameters`](Api::parameters) are encoded.
    fn encoding(&self) -> ParameterEncoding {
        ParameterEncoding::None
    }

    /// Headers specific to this endpoint, merged over the requester defaults.
    fn headers(&self) -> HeaderMap {
        HeaderMap::new()
    }

    /// Literal response bytes that replace the network call entirely.
    fn placeholder_data(&self) -> Option<Bytes> {
        None
    }

    /// A short name used in logs.
    fn name(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}
