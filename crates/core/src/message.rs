//! Intercepted requests and single-read responses.
//!
//! A [`Response`] body can be read exactly once. Code that needs to both
//! return a response and store it must call [`Response::duplicate`] first;
//! reading a consumed body yields [`Error::BodyUsed`].

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::Error;

/// What the requesting context intends to do with the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Document,
    Image,
    Script,
    Style,
    Font,
    Manifest,
    #[default]
    #[serde(other)]
    Other,
}

/// An intercepted network request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    method: Method,
    url: Url,
    destination: Destination,
}

impl Request {
    /// Create a request; the URL fragment is dropped since it never reaches the network.
    pub fn new(method: Method, mut url: Url, destination: Destination) -> Self {
        url.set_fragment(None);
        Self { method, url, destination }
    }

    /// Shorthand for a GET request.
    pub fn get(url: Url, destination: Destination) -> Self {
        Self::new(Method::GET, url, destination)
    }

    /// Parse the URL and build a request.
    pub fn parse(method: &str, url: &str, destination: Destination) -> Result<Self, Error> {
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|e| Error::InvalidInput(format!("invalid method {method:?}: {e}")))?;
        let url = Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{url}: {e}")))?;
        Ok(Self::new(method, url, destination))
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn destination(&self) -> Destination {
        self.destination
    }

    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }
}

/// A response whose body may be consumed only once.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl Response {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self { status, headers, body: Some(body.into()) }
    }

    /// A 200 response with the given content type.
    pub fn with_content_type(content_type: &'static str, body: impl Into<Bytes>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        Self::new(StatusCode::OK, headers, body)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// True for 2xx statuses.
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    pub fn body_used(&self) -> bool {
        self.body.is_none()
    }

    /// Consume the body.
    pub fn bytes(&mut self) -> Result<Bytes, Error> {
        self.body.take().ok_or(Error::BodyUsed)
    }

    /// Consume the body as UTF-8 text (lossy).
    pub fn text(&mut self) -> Result<String, Error> {
        let bytes = self.bytes()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Clone an unread response.
    ///
    /// Both copies share the same underlying bytes and can be consumed independently.
    pub fn try_clone(&self) -> Result<Response, Error> {
        let body = self.body.clone().ok_or(Error::BodyUsed)?;
        Ok(Self { status: self.status, headers: self.headers.clone(), body: Some(body) })
    }

    /// Split an unread response into two independently consumable handles.
    pub fn duplicate(self) -> Result<(Response, Response), Error> {
        let copy = self.try_clone()?;
        Ok((self, copy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Response {
        Response::with_content_type("text/plain", "hello")
    }

    #[test]
    fn test_body_single_read() {
        let mut response = sample();
        assert!(!response.body_used());
        assert_eq!(response.text().unwrap(), "hello");
        assert!(response.body_used());
        assert!(matches!(response.bytes(), Err(Error::BodyUsed)));
    }

    #[test]
    fn test_duplicate_independent() {
        let (mut a, mut b) = sample().duplicate().unwrap();
        assert_eq!(a.text().unwrap(), "hello");
        assert_eq!(b.text().unwrap(), "hello");
        assert_eq!(b.content_type(), Some("text/plain"));
    }

    #[test]
    fn test_duplicate_after_read_fails() {
        let mut response = sample();
        response.bytes().unwrap();
        assert!(matches!(response.try_clone(), Err(Error::BodyUsed)));
        assert!(matches!(response.duplicate(), Err(Error::BodyUsed)));
    }

    #[test]
    fn test_ok_status() {
        let response = Response::new(StatusCode::NOT_FOUND, HeaderMap::new(), "");
        assert!(!response.ok());
        assert!(sample().ok());
    }

    #[test]
    fn test_request_drops_fragment() {
        let request = Request::parse("GET", "https://example.com/page.html#top", Destination::Document).unwrap();
        assert_eq!(request.url().as_str(), "https://example.com/page.html");
        assert!(request.is_get());
    }

    #[test]
    fn test_request_parse_invalid() {
        assert!(matches!(Request::parse("GET", "not a url", Destination::Other), Err(Error::InvalidUrl(_))));
        assert!(matches!(
            Request::parse("GE T", "https://example.com/", Destination::Other),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_destination_serde() {
        let dest: Destination = serde_json::from_str("\"image\"").unwrap();
        assert_eq!(dest, Destination::Image);
        let dest: Destination = serde_json::from_str("\"audioworklet\"").unwrap();
        assert_eq!(dest, Destination::Other);
    }
}
