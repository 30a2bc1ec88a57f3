/// HTTP status code.
///
/// The relay echoes whatever status the upstream produced, so this is an
/// open `u16` wrapper rather than a closed set. Constants cover the codes
/// this crate generates itself.
///
/// # Example
///
/// ```
/// # use outpost::http::response::StatusCode;
/// assert_eq!(StatusCode::OK.as_u16(), 200);
/// assert_eq!(StatusCode(418).reason_phrase(), "");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(200);
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    pub const INTERNAL_SERVER_ERROR: StatusCode = StatusCode(500);

    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Standard reason phrase, empty for codes we have no name for
    /// (the status line is still valid with an empty phrase).
    pub fn reason_phrase(&self) -> &'static str {
        match self.0 {
            200 => "OK",
            201 => "Created",
            204 => "No Content",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            429 => "Too Many Requests",
            500 => "Internal Server Error",
            502 => "Bad Gateway",
            503 => "Service Unavailable",
            504 => "Gateway Timeout",
            _ => "",
        }
    }
}

/// Ordered header pairs. A `Vec` rather than a map so the relay can copy
/// every upstream header/value pair through, duplicates included.
pub type Headers = Vec<(String, String)>;

/// Sets a header, replacing an existing value case-insensitively or
/// appending if absent.
pub fn set_header(headers: &mut Headers, key: impl Into<String>, value: impl Into<String>) {
    let key = key.into();
    let value = value.into();
    match headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&key)) {
        Some(slot) => slot.1 = value,
        None => headers.push((key, value)),
    }
}

/// Case-insensitive lookup of the first matching header value.
pub fn get_header<'a>(headers: &'a Headers, key: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.as_str())
}

/// Status line and headers of an upstream response, parsed before any body
/// bytes are consumed.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: Headers,
}

impl ResponseHead {
    pub fn header(&self, key: &str) -> Option<&str> {
        get_header(&self.headers, key)
    }
}

/// A complete buffered HTTP response, ready to be written to a client.
///
/// Used for locally generated responses (`/ping`, relay errors); streamed
/// relay responses bypass this and write a head followed by chunked frames.
#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    pub headers: Headers,
    pub body: Vec<u8>,
}

/// Builder for constructing HTTP responses in a fluent style.
///
/// # Example
///
/// ```ignore
/// let response = ResponseBuilder::new(StatusCode::OK)
///     .header("Content-Type", "text/plain")
///     .body(b"ok".to_vec())
///     .build();
/// ```
pub struct ResponseBuilder {
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
}

impl ResponseBuilder {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        set_header(&mut self.headers, key, value);
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Builds the final Response, adding Content-Length from the body size
    /// if not already present.
    pub fn build(mut self) -> Response {
        if get_header(&self.headers, "Content-Length").is_none() {
            self.headers
                .push(("Content-Length".to_string(), self.body.len().to_string()));
        }

        Response {
            status: self.status,
            headers: self.headers,
            body: self.body,
        }
    }
}

impl Response {
    /// Creates a simple 200 OK response with the given body.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        ResponseBuilder::new(StatusCode::OK).body(body.into()).build()
    }

    /// Creates a 500 response carrying the error text as a plain-text body.
    pub fn internal_error(message: &str) -> Self {
        ResponseBuilder::new(StatusCode::INTERNAL_SERVER_ERROR)
            .header("Content-Type", "text/plain")
            .body(message.as_bytes().to_vec())
            .build()
    }
}
