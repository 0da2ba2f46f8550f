//! Request/response shapes exchanged between flow steps and the engine.

use bytes::Bytes;
use reqwest::{Method, StatusCode};

/// One multipart field.
#[derive(Debug, Clone)]
pub enum FormField {
    Text {
        name: &'static str,
        value: String,
    },
    File {
        name: &'static str,
        file_name: String,
        mime: String,
        data: Bytes,
    },
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Multipart(Vec<FormField>),
}

/// A fully built HTTP request, produced by a step from the current context.
#[derive(Debug, Clone)]
pub struct StepRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: RequestBody,
}

impl StepRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            headers: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    /// Adds the header only when `value` is non-empty.
    pub fn header_opt(self, name: &'static str, value: &str) -> Self {
        if value.is_empty() {
            self
        } else {
            self.header(name, value)
        }
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn multipart(mut self, fields: Vec<FormField>) -> Self {
        self.body = RequestBody::Multipart(fields);
        self
    }

    pub(crate) fn into_reqwest(
        self,
        client: &reqwest::Client,
    ) -> reqwest::Result<reqwest::RequestBuilder> {
        let mut rb = client.request(self.method, &self.url);
        for (name, value) in self.headers {
            rb = rb.header(name, value);
        }
        rb = match self.body {
            RequestBody::Empty => rb,
            RequestBody::Json(v) => rb.json(&v),
            RequestBody::Multipart(fields) => {
                let mut form = reqwest::multipart::Form::new();
                for field in fields {
                    form = match field {
                        FormField::Text { name, value } => form.text(name, value),
                        FormField::File {
                            name,
                            file_name,
                            mime,
                            data,
                        } => {
                            let len = data.len() as u64;
                            let part = reqwest::multipart::Part::stream_with_length(data, len)
                                .file_name(file_name)
                                .mime_str(&mime)?;
                            form.part(name, part)
                        }
                    };
                }
                rb.multipart(form)
            }
        };
        Ok(rb)
    }
}

/// Response as seen by a step's extractor.
#[derive(Debug, Clone)]
pub struct StepResponse {
    pub status: StatusCode,
    /// Final URL after redirects.
    pub url: String,
    pub body: Bytes,
}

impl StepResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }
}
