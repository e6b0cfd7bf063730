//! HTTP control surface for a [`Registry`].
//!
//! | Route              | GET                     | POST                             |
//! |--------------------|-------------------------|----------------------------------|
//! | `/sinks`           | registered sink names   |                                  |
//! | `/sinks/active`    | active sink             | `{"log_creator": name}` switches |
//! | `/levels`          | every level name        |                                  |
//! | `/level`           | current threshold       | raw level name sets it           |
//!
//! Change requests with an unknown sink or level succeed with the old value reported as the
//! current one; callers compare `old_*` and `current_*` to see whether anything changed.

mod server;

use std::{collections::HashMap, fmt::Display, sync::Arc};

use bytes::Bytes;
use http::{header::CONTENT_TYPE, HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use serde::Serialize;

use crate::logging::{Level, Registry};

pub use server::serve;

const LOG_CREATOR: &str = "log_creator";

#[derive(Serialize)]
struct CurrentSink<'a> {
    current_log_creator: &'a str,
}

#[derive(Serialize)]
struct SinkChange<'a> {
    old_log_creator: &'a str,
    current_log_creator: &'a str,
}

#[derive(Serialize)]
struct CurrentLevel {
    log_level: Level,
}

#[derive(Serialize)]
struct LevelChange {
    old_log_level: Level,
    current_log_level: Level,
}

pub struct ControlSurface {
    registry: Arc<Registry>,
}

impl ControlSurface {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body,
        B::Error: Display,
    {
        tracing::debug!(target: "logswitch", method = %req.method(), path = %req.uri().path(), "control request");

        let path = req.uri().path().to_owned();
        let is_get = req.method() == Method::GET;

        match (path.as_str(), is_get) {
            ("/sinks", _) => self.list_sinks(),
            ("/sinks/active", true) => self.active_sink(),
            ("/sinks/active", false) => self.change_active_sink(req).await,
            ("/levels", _) => self.list_levels(),
            ("/level", true) => self.threshold(),
            ("/level", false) => self.set_threshold(req).await,
            _ => status(StatusCode::NOT_FOUND),
        }
    }

    pub fn list_sinks(&self) -> Response<Full<Bytes>> {
        json(&self.registry.sink_names())
    }

    pub fn active_sink(&self) -> Response<Full<Bytes>> {
        match self.registry.active_sink_name() {
            Some(name) => json(&CurrentSink {
                current_log_creator: name.as_str(),
            }),
            None => status(StatusCode::NOT_FOUND),
        }
    }

    pub async fn change_active_sink<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body,
        B::Error: Display,
    {
        let Some(old) = self.registry.active_sink_name() else {
            return status(StatusCode::NOT_FOUND);
        };

        if req.method() != Method::POST {
            return status(StatusCode::BAD_REQUEST);
        }

        let Some(body) = read_body(req).await else {
            return status(StatusCode::BAD_REQUEST);
        };

        let payload: HashMap<String, String> = match serde_json::from_slice(&body) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::debug!(target: "logswitch", "rejecting sink change payload: {}", err);
                return status(StatusCode::BAD_REQUEST);
            }
        };
        if payload.is_empty() {
            return status(StatusCode::BAD_REQUEST);
        }

        let current = match payload.get(LOG_CREATOR) {
            Some(requested) if self.registry.activate(requested) => requested.as_str(),
            _ => old.as_str(),
        };

        json(&SinkChange {
            old_log_creator: old.as_str(),
            current_log_creator: current,
        })
    }

    pub fn list_levels(&self) -> Response<Full<Bytes>> {
        json(&Level::ALL)
    }

    pub fn threshold(&self) -> Response<Full<Bytes>> {
        if self.registry.is_empty() {
            return status(StatusCode::NOT_FOUND);
        }

        json(&CurrentLevel {
            log_level: self.registry.threshold(),
        })
    }

    /// The body is the bare level name, e.g. `TRACE`.
    pub async fn set_threshold<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body,
        B::Error: Display,
    {
        if self.registry.is_empty() {
            return status(StatusCode::NOT_FOUND);
        }

        if req.method() != Method::POST {
            return status(StatusCode::BAD_REQUEST);
        }

        let Some(body) = read_body(req).await else {
            return status(StatusCode::BAD_REQUEST);
        };
        let Ok(requested) = std::str::from_utf8(&body) else {
            return status(StatusCode::BAD_REQUEST);
        };

        let change = match requested.parse::<Level>() {
            Ok(level) => LevelChange {
                old_log_level: self.registry.swap_threshold(level),
                current_log_level: level,
            },
            Err(err) => {
                tracing::debug!(target: "logswitch", "rejecting threshold change: {}", err);
                let old = self.registry.threshold();
                LevelChange {
                    old_log_level: old,
                    current_log_level: old,
                }
            }
        };

        json(&change)
    }
}

async fn read_body<B>(req: Request<B>) -> Option<Bytes>
where
    B: Body,
    B::Error: Display,
{
    match req.into_body().collect().await {
        Ok(collected) => Some(collected.to_bytes()),
        Err(err) => {
            tracing::debug!(target: "logswitch", "failed reading request body: {}", err);
            None
        }
    }
}

fn status(code: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = code;
    response
}

fn json<T: Serialize + ?Sized>(value: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => {
            let mut response = Response::new(Full::new(Bytes::from(body)));
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(err) => {
            tracing::warn!(target: "logswitch", "failed serializing control response: {}", err);
            status(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
