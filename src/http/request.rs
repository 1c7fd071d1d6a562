//! Request descriptor handed to the engine.

use crate::base::neterror::NetError;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use url::Url;

/// Request body for methods that send data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RequestBody {
    /// No body (GET, HEAD, DELETE).
    #[default]
    Empty,
    /// Body held in memory.
    Bytes(Bytes),
}

impl RequestBody {
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        match self {
            RequestBody::Empty => 0,
            RequestBody::Bytes(b) => b.len(),
        }
    }

    /// Cheap clone of the payload, empty for [`RequestBody::Empty`].
    pub fn to_bytes(&self) -> Bytes {
        match self {
            RequestBody::Empty => Bytes::new(),
            RequestBody::Bytes(b) => b.clone(),
        }
    }
}

impl From<Bytes> for RequestBody {
    fn from(b: Bytes) -> Self {
        RequestBody::Bytes(b)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(v: Vec<u8>) -> Self {
        RequestBody::Bytes(Bytes::from(v))
    }
}

impl From<String> for RequestBody {
    fn from(s: String) -> Self {
        RequestBody::Bytes(Bytes::from(s))
    }
}

impl From<&'static str> for RequestBody {
    fn from(s: &'static str) -> Self {
        RequestBody::Bytes(Bytes::from_static(s.as_bytes()))
    }
}

/// Everything an engine needs to issue one request.
///
/// Redirect callbacks receive the proposed follow-up as a `Request`, so
/// delegates can rewrite it before handing it back.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: RequestBody,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self { method, url, headers: HeaderMap::new(), body: RequestBody::Empty }
    }

    /// Parse `url` and build a GET request.
    pub fn get(url: &str) -> Result<Self, NetError> {
        let url = Url::parse(url).map_err(|_| NetError::InvalidUrl)?;
        Ok(Self::new(Method::GET, url))
    }

    /// Parse `url` and build a POST request with `body`.
    pub fn post(url: &str, body: impl Into<RequestBody>) -> Result<Self, NetError> {
        let url = Url::parse(url).map_err(|_| NetError::InvalidUrl)?;
        Ok(Self::new(Method::POST, url).with_body(body))
    }

    /// Add a header. Invalid names or values are ignored.
    pub fn with_header<K, V>(mut self, key: K, value: V) -> Self
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        if let (Ok(k), Ok(v)) = (key.try_into(), value.try_into()) {
            self.headers.insert(k, v);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a JSON body and the matching content type.
    #[cfg(feature = "json")]
    pub fn with_json<T: serde::Serialize>(mut self, json: &T) -> Result<Self, NetError> {
        let bytes = serde_json::to_vec(json).map_err(|_| NetError::JsonParseError)?;
        self.body = RequestBody::Bytes(Bytes::from(bytes));
        self.headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        Ok(self)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn set_url(&mut self, url: Url) {
        self.url = url;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<RequestBody>) {
        self.body = body.into();
    }

    /// Build the follow-up request for a redirect to `location`.
    ///
    /// 301/302/303 downgrade non-HEAD methods to GET and drop the body;
    /// 307/308 preserve both. Credentials never cross origins.
    pub fn redirected(&self, status: http::StatusCode, location: Url) -> Self {
        let mut next = self.clone();
        let downgrade = matches!(status.as_u16(), 301..=303) && self.method != Method::HEAD;
        if downgrade {
            next.method = Method::GET;
            next.body = RequestBody::Empty;
            next.headers.remove(http::header::CONTENT_TYPE);
            next.headers.remove(http::header::CONTENT_LENGTH);
        }
        if location.origin() != self.url.origin() {
            next.headers.remove(http::header::AUTHORIZATION);
            next.headers.remove(http::header::COOKIE);
        }
        next.url = location;
        next
    }
}
