//! Per-request context and its pool.
//!
//! A [`RequestContext`] carries everything a handler sees: the request parts,
//! parsed GET/POST values, the raw body, and the response intent the handler
//! fills in. Contexts are checked out of a [`ContextPool`], reset on release,
//! and reused by later requests.

use std::collections::HashMap;
use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::http::request::Parts;
use axum::http::{header, Extensions, HeaderMap, Method, Uri};
use axum::response::Response;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::http::request::{client_ip, new_request_id};

/// Default upper bound for string parameter length, in characters.
const DEFAULT_MAX_CHARS: i64 = 65535;

/// Parameter lookup and validation failures. Messages are client facing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParamError {
    #[error("{0} is required")]
    Missing(String),
    #[error("{0} has an invalid format")]
    Invalid(String),
    #[error("{desc} must not be less than {min}")]
    TooSmall { desc: String, min: i64 },
    #[error("{desc} must not be greater than {max}")]
    TooLarge { desc: String, max: i64 },
    #[error("{desc} needs at least {min} characters")]
    TooShort { desc: String, min: i64 },
    #[error("{desc} allows at most {max} characters")]
    TooLong { desc: String, max: i64 },
    #[error("request body is not a JSON object: {0}")]
    Json(String),
}

/// State of one in-flight request.
pub struct RequestContext {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub peer_addr: Option<SocketAddr>,
    /// Headers merged into whatever response is finally written.
    pub response_headers: HeaderMap,
    pub start: Instant,
    pub request_id: Uuid,
    /// Qualified name of the handler serving this request.
    pub handler_name: String,
    /// Query string values merged with url-encoded form values.
    pub params: HashMap<String, Vec<String>>,
    pub body: Bytes,
    json: Option<HashMap<String, String>>,
    pub client_ip: String,
    /// Typed values attached by middleware for the handler.
    pub values: Extensions,

    /// Error message returned in the `msg` field.
    pub ret_error: String,
    /// Application code returned in the `code` field.
    pub ret_code: i64,
    /// Payload returned in the `data` field.
    pub ret_data: Option<Value>,
    custom_response: Option<Response>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            method: Method::GET,
            uri: Uri::default(),
            headers: HeaderMap::new(),
            peer_addr: None,
            response_headers: HeaderMap::new(),
            start: Instant::now(),
            request_id: Uuid::nil(),
            handler_name: String::new(),
            params: HashMap::new(),
            body: Bytes::new(),
            json: None,
            client_ip: String::new(),
            values: Extensions::new(),
            ret_error: String::new(),
            ret_code: 0,
            ret_data: None,
            custom_response: None,
        }
    }

    /// Fill in the request identity and query values.
    pub fn begin(&mut self, parts: &Parts, peer: Option<SocketAddr>, handler_name: &str) {
        self.method = parts.method.clone();
        self.uri = parts.uri.clone();
        self.headers = parts.headers.clone();
        self.peer_addr = peer;
        self.start = Instant::now();
        self.request_id = new_request_id();
        self.handler_name.push_str(handler_name);
        self.client_ip = client_ip(&parts.headers, peer);

        if let Some(query) = parts.uri.query() {
            for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
                self.params
                    .entry(key.into_owned())
                    .or_default()
                    .push(value.into_owned());
            }
        }
    }

    /// Attach the request body; url-encoded forms are merged into `params`.
    pub fn set_body(&mut self, body: Bytes) {
        if self.content_type_is("application/x-www-form-urlencoded") {
            for (key, value) in url::form_urlencoded::parse(&body) {
                self.params
                    .entry(key.into_owned())
                    .or_default()
                    .push(value.into_owned());
            }
        }
        self.body = body;
    }

    /// Clear all request specific state.
    pub fn reset(&mut self) {
        self.method = Method::GET;
        self.uri = Uri::default();
        self.headers.clear();
        self.peer_addr = None;
        self.response_headers.clear();
        self.request_id = Uuid::nil();
        self.handler_name.clear();
        self.params.clear();
        self.body = Bytes::new();
        self.json = None;
        self.client_ip.clear();
        self.values.clear();
        self.ret_error.clear();
        self.ret_code = 0;
        self.ret_data = None;
        self.custom_response = None;
    }

    /// Time since the request was received.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    fn content_type_is(&self, expected: &str) -> bool {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with(expected))
            .unwrap_or(false)
    }

    /// Body of a `POST application/json` request flattened to strings.
    ///
    /// Parsed on first use. Scalars keep their text form, arrays become a
    /// comma separated list, nested objects stay JSON text.
    pub fn json_data(&mut self) -> Result<&HashMap<String, String>, ParamError> {
        if self.json.is_none() {
            let mut flat = HashMap::new();
            if self.method == Method::POST
                && self.content_type_is("application/json")
                && !self.body.is_empty()
            {
                let object: serde_json::Map<String, Value> = serde_json::from_slice(&self.body)
                    .map_err(|e| ParamError::Json(e.to_string()))?;
                for (key, value) in object {
                    flat.insert(key, flatten(&value));
                }
            }
            self.json = Some(flat);
        }
        Ok(self.json.get_or_insert_with(HashMap::new))
    }

    /// Raw value of a parameter, JSON body first, then GET/POST values.
    pub fn param(&mut self, name: &str) -> Result<Option<String>, ParamError> {
        if let Some(value) = self.json_data()?.get(name) {
            return Ok(Some(value.clone()));
        }
        Ok(self
            .params
            .get(name)
            .and_then(|values| values.first())
            .map(|value| value.trim().to_string()))
    }

    /// String parameter with a length check in characters.
    ///
    /// `max == 0` means 65535. A missing optional parameter yields `default`.
    pub fn param_string(
        &mut self,
        name: &str,
        desc: &str,
        required: bool,
        min: i64,
        max: i64,
        default: &str,
    ) -> Result<String, ParamError> {
        let value = self.param(name)?;
        if required && value.as_deref().map_or(true, str::is_empty) {
            return Err(ParamError::Missing(desc.to_string()));
        }
        let value = value.unwrap_or_else(|| default.to_string());
        check_length(desc, &value, min, max)?;
        Ok(value)
    }

    /// Integer parameter with a range check. `max == 0` disables the upper bound.
    pub fn param_i64(
        &mut self,
        name: &str,
        desc: &str,
        required: bool,
        min: i64,
        max: i64,
        default: i64,
    ) -> Result<i64, ParamError> {
        let value = match self.param(name)? {
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| ParamError::Invalid(desc.to_string()))?,
            None if required => return Err(ParamError::Missing(desc.to_string())),
            None => default,
        };
        check_range(desc, value, min, max)?;
        Ok(value)
    }

    /// Comma separated integers, each range checked. Unparsable items count as 0.
    pub fn param_i64_list(
        &mut self,
        name: &str,
        desc: &str,
        required: bool,
        min: i64,
        max: i64,
    ) -> Result<Vec<i64>, ParamError> {
        let Some(raw) = self.param(name)? else {
            if required {
                return Err(ParamError::Missing(desc.to_string()));
            }
            return Ok(Vec::new());
        };
        raw.split(',')
            .filter(|item| !item.is_empty())
            .map(|item| {
                let value = item.trim().parse::<i64>().unwrap_or(0);
                check_range(desc, value, min, max).map(|_| value)
            })
            .collect()
    }

    /// Comma separated strings, trimmed, blanks dropped, each length checked.
    pub fn param_string_list(
        &mut self,
        name: &str,
        desc: &str,
        required: bool,
        min: i64,
        max: i64,
    ) -> Result<Vec<String>, ParamError> {
        let Some(raw) = self.param(name)? else {
            if required {
                return Err(ParamError::Missing(desc.to_string()));
            }
            return Ok(Vec::new());
        };
        raw.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| check_length(desc, item, min, max).map(|_| item.to_string()))
            .collect()
    }

    /// Append a line to the error message.
    pub fn add_error(&mut self, err: impl Display) {
        if !self.ret_error.is_empty() {
            self.ret_error.push('\n');
        }
        self.ret_error.push_str(&err.to_string());
    }

    /// Set the response payload.
    pub fn set_data<T: Serialize>(&mut self, data: T) {
        match serde_json::to_value(data) {
            Ok(value) => self.ret_data = Some(value),
            Err(e) => self.add_error(e),
        }
    }

    /// Set an application error code and message.
    pub fn fail(&mut self, code: i64, message: impl Display) {
        self.ret_code = code;
        self.add_error(message);
    }

    /// Replace the default envelope with a fully custom response.
    pub fn respond(&mut self, response: Response) {
        self.custom_response = Some(response);
    }

    pub fn has_custom_response(&self) -> bool {
        self.custom_response.is_some()
    }

    pub fn take_custom_response(&mut self) -> Option<Response> {
        self.custom_response.take()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

fn flatten(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(flatten).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

fn check_range(desc: &str, value: i64, min: i64, max: i64) -> Result<(), ParamError> {
    if value < min {
        return Err(ParamError::TooSmall {
            desc: desc.to_string(),
            min,
        });
    }
    if max > 0 && value > max {
        return Err(ParamError::TooLarge {
            desc: desc.to_string(),
            max,
        });
    }
    Ok(())
}

fn check_length(desc: &str, value: &str, min: i64, max: i64) -> Result<(), ParamError> {
    let chars = i64::try_from(value.chars().count()).unwrap_or(i64::MAX);
    let max = if max == 0 { DEFAULT_MAX_CHARS } else { max };
    if chars > 0 && min > 0 && chars < min {
        return Err(ParamError::TooShort {
            desc: desc.to_string(),
            min,
        });
    }
    if chars > max {
        return Err(ParamError::TooLong {
            desc: desc.to_string(),
            max,
        });
    }
    Ok(())
}

/// Pool of reusable request contexts.
pub struct ContextPool {
    idle: Mutex<Vec<Box<RequestContext>>>,
    max_idle: usize,
}

impl ContextPool {
    /// Pool keeping at most `max_idle` contexts around between requests.
    pub fn new(max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            max_idle,
        }
    }

    /// Take a clean context.
    pub fn checkout(&self) -> Box<RequestContext> {
        self.idle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop()
            .unwrap_or_default()
    }

    /// Reset a context and keep it for reuse.
    pub fn release(&self, mut ctx: Box<RequestContext>) {
        ctx.reset();
        let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
        if idle.len() < self.max_idle {
            idle.push(ctx);
        }
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for ContextPool {
    fn default() -> Self {
        Self::new(1024)
    }
}
