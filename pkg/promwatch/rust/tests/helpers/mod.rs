// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

#![allow(dead_code)]

use dd_promwatch::backoff::BackoffPolicy;
use dd_promwatch::config::ConnectionSettings;
use dd_promwatch::{
    HttpQueryClient, InstantResult, QueryToken, Sample, Subscriber, SubscriberId,
};
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::HeaderMap;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const INSTANT_PATH: &str = "/api/v1/query";
pub const RANGE_PATH: &str = "/api/v1/query_range";
pub const LABELS_PATH: &str = "/api/v1/label/__name__/values";

/// One request as seen by the mock server.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

#[derive(Default)]
struct MockState {
    /// Canned responses per path, consumed front to back; the last one sticks.
    routes: Mutex<HashMap<String, VecDeque<(u16, String)>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockState {
    fn respond(&self, req: &Request<Incoming>) -> Response<Full<Bytes>> {
        let path = req.uri().path().to_string();
        self.requests.lock().unwrap().push(RecordedRequest {
            path: path.clone(),
            query: req.uri().query().map(str::to_string),
            headers: req.headers().clone(),
        });

        let (status, body) = {
            let mut routes = self.routes.lock().unwrap();
            match routes.get_mut(&path) {
                Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
                Some(queue) => queue.front().cloned().unwrap(),
                None => (404, String::new()),
            }
        };

        Response::builder()
            .status(StatusCode::from_u16(status).unwrap())
            .header("Content-Type", "application/json")
            .body(Full::new(Bytes::from(body)))
            .unwrap()
    }
}

/// In-process stand-in for a Prometheus server.
pub struct MockPrometheus {
    addr: SocketAddr,
    state: Arc<MockState>,
    task: JoinHandle<()>,
}

impl MockPrometheus {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(MockState::default());

        let server_state = Arc::clone(&state);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = Arc::clone(&server_state);
                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        let response = state.respond(&req);
                        async move { Ok::<_, Infallible>(response) }
                    });
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Self { addr, state, task }
    }

    /// `host:port` of the listener, suitable for `ConnectionSettings::endpoint`.
    pub fn endpoint(&self) -> String {
        self.addr.to_string()
    }

    /// Always answer `path` with `status` and `body`.
    pub fn route(&self, path: &str, status: u16, body: &str) {
        self.routes(path, &[(status, body)]);
    }

    /// Answer `path` with each response in turn, repeating the last one.
    pub fn routes(&self, path: &str, responses: &[(u16, &str)]) {
        let queue = responses
            .iter()
            .map(|(status, body)| (*status, body.to_string()))
            .collect();
        self.state
            .routes
            .lock()
            .unwrap()
            .insert(path.to_string(), queue);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.path == path)
            .collect()
    }

    pub fn connection(&self) -> ConnectionSettings {
        ConnectionSettings {
            endpoint: self.endpoint(),
            ..ConnectionSettings::default()
        }
    }

    pub fn client(&self, retry: BackoffPolicy) -> HttpQueryClient {
        HttpQueryClient::new(&self.connection(), Duration::from_secs(5), retry).unwrap()
    }
}

impl Drop for MockPrometheus {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub fn fast_retry(max_attempts: u32) -> BackoffPolicy {
    BackoffPolicy {
        max_attempts,
        initial_backoff_ms: 1,
        max_backoff_ms: 5,
    }
}

pub fn instant_body(value: &str) -> String {
    format!(
        r#"{{"status":"success","data":{{"resultType":"vector","result":[{{"metric":{{}},"value":[1718000000.0,"{value}"]}}]}}}}"#
    )
}

/// Records everything delivered to it.
#[derive(Default)]
pub struct Recorder {
    pub instants: Mutex<Vec<(QueryToken, InstantResult)>>,
    pub ranges: Mutex<Vec<(QueryToken, Vec<Sample>)>>,
    pub discoveries: Mutex<Vec<Vec<String>>>,
}

impl Subscriber for Recorder {
    fn on_instant_result(&self, token: &QueryToken, result: InstantResult) {
        self.instants.lock().unwrap().push((token.clone(), result));
    }

    fn on_range_result(&self, token: &QueryToken, samples: &[Sample]) {
        self.ranges
            .lock()
            .unwrap()
            .push((token.clone(), samples.to_vec()));
    }

    fn on_metrics_discovered(&self, names: &[String]) {
        self.discoveries.lock().unwrap().push(names.to_vec());
    }
}

pub fn recorder() -> (SubscriberId, Arc<Recorder>) {
    (SubscriberId(1), Arc::new(Recorder::default()))
}
