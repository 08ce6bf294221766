// HTTP/1.1 for the JSON facade on the shared port: one request per
// connection, Content-Length bodies only, and the connection closes after the
// response. httparse reads the head, the `http` crate carries the types.

use crate::error::{BlockchainError, Result};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode, Uri};
use serde::Serialize;
use std::collections::HashMap;
use std::io::{Read, Write};

const MAX_HEAD_SIZE: usize = 64 * 1024;
const MAX_BODY_SIZE: usize = 1024 * 1024;
const MAX_HEADERS: usize = 32;

#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    query: HashMap<String, String>,
    headers: HeaderMap,
    body: Vec<u8>,
}

fn http_error(context: &str, e: impl std::fmt::Display) -> BlockchainError {
    BlockchainError::Http(format!("{context}: {e}"))
}

impl Request {
    /// Read a whole request. `first` holds the bytes already taken off the
    /// connection while sniffing the protocol.
    pub fn read<R: Read>(reader: &mut R, first: &[u8]) -> Result<Request> {
        let mut buf = first.to_vec();
        let mut chunk = [0u8; 1024];

        let (mut request, head_len) = loop {
            let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
            let mut parsed = httparse::Request::new(&mut headers);
            match parsed.parse(&buf) {
                Ok(httparse::Status::Complete(head_len)) => {
                    break (Request::from_parsed(&parsed)?, head_len);
                }
                Ok(httparse::Status::Partial) => {}
                Err(e) => return Err(http_error("Malformed request", e)),
            }

            if buf.len() > MAX_HEAD_SIZE {
                return Err(BlockchainError::Http("Request head too large".to_string()));
            }
            let read = reader.read(&mut chunk)?;
            if read == 0 {
                return Err(BlockchainError::Http(
                    "Connection closed before the request head ended".to_string(),
                ));
            }
            buf.extend_from_slice(&chunk[..read]);
        };

        let length = match request.headers.get(header::CONTENT_LENGTH) {
            Some(raw) => raw
                .to_str()
                .map_err(|e| http_error("Invalid Content-Length", e))?
                .trim()
                .parse::<usize>()
                .map_err(|e| http_error("Invalid Content-Length", e))?,
            None => 0,
        };
        if length > MAX_BODY_SIZE {
            return Err(BlockchainError::Http(format!(
                "Request body exceeds {MAX_BODY_SIZE} bytes"
            )));
        }

        let mut body = buf.split_off(head_len);
        if body.len() < length {
            let missing = (length - body.len()) as u64;
            reader.by_ref().take(missing).read_to_end(&mut body)?;
        }
        if body.len() < length {
            return Err(BlockchainError::Http(format!(
                "Body ended after {} of {length} bytes",
                body.len()
            )));
        }
        body.truncate(length);
        request.body = body;
        Ok(request)
    }

    fn from_parsed(parsed: &httparse::Request<'_, '_>) -> Result<Request> {
        let method = parsed
            .method
            .ok_or_else(|| BlockchainError::Http("Missing method".to_string()))?;
        let method = Method::from_bytes(method.as_bytes()).map_err(|e| http_error("Bad method", e))?;
        let target = parsed
            .path
            .ok_or_else(|| BlockchainError::Http("Missing request target".to_string()))?;
        let uri = target
            .parse::<Uri>()
            .map_err(|e| http_error("Bad request target", e))?;

        let query = uri
            .query()
            .map(|raw| form_urlencoded::parse(raw.as_bytes()).into_owned().collect())
            .unwrap_or_default();

        let mut headers = HeaderMap::new();
        for h in parsed.headers.iter() {
            let name = HeaderName::from_bytes(h.name.as_bytes())
                .map_err(|e| http_error("Bad header name", e))?;
            let value =
                HeaderValue::from_bytes(h.value).map_err(|e| http_error("Bad header value", e))?;
            headers.append(name, value);
        }

        Ok(Request {
            method,
            path: uri.path().to_string(),
            query,
            headers,
            body: vec![],
        })
    }

    pub fn method(&self) -> &str {
        self.method.as_str()
    }

    pub fn path(&self) -> &str {
        self.path.as_str()
    }

    /// Path split on `/` with empty segments dropped.
    pub fn segments(&self) -> Vec<&str> {
        self.path.split('/').filter(|s| !s.is_empty()).collect()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Integer query parameter; missing or unparsable values give `default`.
    pub fn query_usize(&self, name: &str, default: usize) -> usize {
        self.query(name)
            .and_then(|raw| raw.parse::<usize>().ok())
            .unwrap_or(default)
    }

    pub fn body(&self) -> &[u8] {
        self.body.as_slice()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: StatusCode,
    body: Vec<u8>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    message: &'a str,
}

impl Response {
    pub fn json<T: Serialize>(status: StatusCode, body: &T) -> Response {
        match serde_json::to_vec(body) {
            Ok(body) => Response { status, body },
            Err(e) => Response::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Failed to encode response: {e}"),
            ),
        }
    }

    pub fn error(status: StatusCode, message: &str) -> Response {
        let body = serde_json::to_vec(&ErrorBody { message }).unwrap_or_default();
        Response { status, body }
    }

    pub fn not_found() -> Response {
        Response::error(StatusCode::NOT_FOUND, "Not found")
    }

    pub fn get_status(&self) -> u16 {
        self.status.as_u16()
    }

    pub fn get_body(&self) -> &[u8] {
        self.body.as_slice()
    }

    fn headers(&self) -> Result<HeaderMap> {
        // HTTP-date, always GMT
        let date = chrono::Utc::now()
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string();

        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        headers.insert(
            header::DATE,
            HeaderValue::from_str(&date).map_err(|e| http_error("Bad Date header", e))?,
        );
        headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(self.body.len()));
        Ok(headers)
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut head = format!("HTTP/1.1 {}\r\n", self.status).into_bytes();
        for (name, value) in self.headers()?.iter() {
            head.extend_from_slice(name.as_str().as_bytes());
            head.extend_from_slice(b": ");
            head.extend_from_slice(value.as_bytes());
            head.extend_from_slice(b"\r\n");
        }
        head.extend_from_slice(b"\r\n");

        writer.write_all(&head)?;
        writer.write_all(&self.body)?;
        writer.flush()?;
        Ok(())
    }
}
