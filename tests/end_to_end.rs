use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};

use bytes::Bytes;
use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use serde_json::{json, Value};

use logswitch::control::ControlSurface;
use logswitch::logging::{
    Config, DefaultFormatter, FileSink, Level, Record, Registry, Sink, SinkName,
};

struct ScreenSink {
    name: SinkName,
    ready: AtomicBool,
    call_depth: AtomicUsize,
    lines: Mutex<Vec<String>>,
}

impl ScreenSink {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            name: SinkName::from("Console"),
            ready: AtomicBool::new(true),
            call_depth: AtomicUsize::new(2),
            lines: Mutex::new(Vec::new()),
        })
    }

    fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl Sink for ScreenSink {
    fn name(&self) -> &SinkName {
        &self.name
    }

    fn write_with_call_depth(&self, record: &Record, _call_depth: usize) -> bool {
        self.lines
            .lock()
            .unwrap()
            .push(format!("{} {}", record.level(), record.message_text()));
        true
    }

    fn set_call_depth(&self, call_depth: usize) {
        self.call_depth.store(call_depth, Ordering::SeqCst);
    }

    fn call_depth(&self) -> usize {
        self.call_depth.load(Ordering::SeqCst)
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

fn request(method: Method, path: &str, body: &str) -> Request<Full<Bytes>> {
    Request::builder()
        .method(method)
        .uri(path)
        .body(Full::new(Bytes::from(body.to_owned())))
        .unwrap()
}

async fn body_json(response: Response<Full<Bytes>>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn switches_sinks_and_levels_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");

    let screen = ScreenSink::new();
    let file = Arc::new(
        FileSink::new(&path, "File", 2, Box::new(DefaultFormatter::new(Config::plain()))).unwrap(),
    );

    let registry = Arc::new(Registry::new().with_threshold(Level::Warn));
    registry.register(vec![
        screen.clone() as Arc<dyn Sink>,
        file.clone() as Arc<dyn Sink>,
    ]);
    let surface = ControlSurface::new(registry.clone());

    assert_eq!(registry.active_sink_name().unwrap().as_str(), "Console");
    assert!(!registry.log(Level::Info, "filtered"));
    assert!(registry.log(Level::Error, "boom"));
    assert_eq!(screen.lines(), vec!["ERROR boom".to_string()]);

    let response = surface
        .handle(request(Method::POST, "/sinks/active", r#"{"log_creator":"File"}"#))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"old_log_creator": "Console", "current_log_creator": "File"})
    );

    assert!(registry.log(Level::Warn, "disk almost full"));
    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.starts_with("WARN "), "{written}");
    assert!(written.contains("end_to_end.rs:"), "{written}");
    assert!(written.trim_end().ends_with("disk almost full"), "{written}");

    let response = surface
        .handle(request(Method::POST, "/sinks/active", r#"{"log_creator":"Kafka"}"#))
        .await;
    assert_eq!(
        body_json(response).await,
        json!({"old_log_creator": "File", "current_log_creator": "File"})
    );

    let response = surface.handle(request(Method::POST, "/level", "TRACE")).await;
    assert_eq!(
        body_json(response).await,
        json!({"old_log_level": "WARN", "current_log_level": "TRACE"})
    );
    let response = surface.handle(request(Method::GET, "/level", "")).await;
    assert_eq!(body_json(response).await, json!({"log_level": "TRACE"}));

    let response = surface.handle(request(Method::GET, "/sinks", "")).await;
    assert_eq!(body_json(response).await, json!(["Console", "File"]));

    registry.shutdown_all();
    assert!(!registry.log(Level::Fatal, "after shutdown"));
}

#[tokio::test]
async fn falls_back_when_the_active_sink_is_not_ready() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fallback.log");

    let screen = ScreenSink::new();
    let file: Arc<dyn Sink> = Arc::new(
        FileSink::new(&path, "File", 0, Box::new(DefaultFormatter::new(Config::plain()))).unwrap(),
    );

    let registry = Registry::new()
        .with_threshold(Level::Trace)
        .with_fallback(file.clone());
    registry.register(vec![screen.clone() as Arc<dyn Sink>, file]);

    screen.ready.store(false, Ordering::SeqCst);
    assert!(registry.log(Level::Debug, json!({"retry": 3})));

    assert!(screen.lines().is_empty());
    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.contains(r#"{"retry":3}"#), "{written}");
    assert!(!written.contains("end_to_end.rs"), "{written}");

    registry.shutdown_all();
}

#[tokio::test]
async fn empty_registry_has_nothing_to_control() {
    let surface = ControlSurface::new(Arc::new(Registry::new()));

    for req in [
        request(Method::GET, "/sinks/active", ""),
        request(Method::POST, "/sinks/active", r#"{"log_creator":"File"}"#),
        request(Method::GET, "/level", ""),
        request(Method::POST, "/level", "INFO"),
        request(Method::GET, "/nowhere", ""),
    ] {
        assert_eq!(surface.handle(req).await.status(), StatusCode::NOT_FOUND);
    }

    let response = surface.handle(request(Method::GET, "/levels", "")).await;
    assert_eq!(
        body_json(response).await,
        json!(["NONE", "FATAL", "ERROR", "WARN", "DEBUG", "INFO", "TRACE"])
    );
}
