//! In-process stand-in for the Kubernetes API server used by unit tests.

use crate::constants::CREDENTIALS_SECRET_NAME;
use crate::controller::{ControllerContext, ControllerSettings, VolumeClaims};
use crate::provider::RepositoryEnvironment;
use crate::watch::{cache_pair, CacheWriter, Cached, FieldFilter, WatchCache};
use axum::http::{Request, Response, StatusCode};
use k8s_openapi::api::core::v1::{Pod, Secret};
use kube::client::Body;
use kube::runtime::watcher::Event;
use kube::{Api, Client};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// How the fake server answers one request
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Json(StatusCode, Value),
    /// Never answer, like an idle watch
    Hang,
}

/// Requests seen by the fake server, as `METHOD uri`
#[derive(Debug, Clone, Default)]
pub(crate) struct RequestLog(Arc<Mutex<Vec<String>>>);

impl RequestLog {
    pub(crate) fn requests(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

/// Client whose requests are answered by `respond(index, method, uri)`
pub(crate) fn fake_client<F>(respond: F) -> (Client, RequestLog)
where
    F: Fn(usize, &str, &str) -> Reply + Send + Sync + 'static,
{
    let log = RequestLog::default();
    let seen = log.clone();
    let counter = Arc::new(AtomicUsize::new(0));
    let respond = Arc::new(respond);

    let service = tower::service_fn(move |request: Request<Body>| {
        let index = counter.fetch_add(1, Ordering::SeqCst);
        let method = request.method().to_string();
        let uri = request.uri().to_string();
        seen.0.lock().unwrap().push(format!("{method} {uri}"));
        let reply = respond(index, &method, &uri);

        async move {
            match reply {
                Reply::Json(status, body) => Ok::<_, Infallible>(
                    Response::builder()
                        .status(status)
                        .header("content-type", "application/json")
                        .body(Body::from(serde_json::to_vec(&body).unwrap()))
                        .unwrap(),
                ),
                Reply::Hang => std::future::pending().await,
            }
        }
    });

    (Client::new(service, "default"), log)
}

/// Empty list response of the given kind
pub(crate) fn empty_list(api_version: &str, kind: &str) -> Reply {
    list(api_version, kind, Vec::new())
}

pub(crate) fn list(api_version: &str, kind: &str, items: Vec<Value>) -> Reply {
    Reply::Json(
        StatusCode::OK,
        json!({
            "apiVersion": api_version,
            "kind": kind,
            "metadata": { "resourceVersion": "1" },
            "items": items,
        }),
    )
}

pub(crate) fn server_error() -> Reply {
    Reply::Json(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({
            "apiVersion": "v1",
            "kind": "Status",
            "metadata": {},
            "status": "Failure",
            "message": "etcdserver: request timed out",
            "reason": "InternalError",
            "code": 500,
        }),
    )
}

pub(crate) const NAMESPACE: &str = "heptio-ark";
pub(crate) const NODE: &str = "node-7";

/// Controller context over `client` with the given caches
pub(crate) fn controller_context(
    client: Client,
    pods: WatchCache<Pod>,
    credentials: WatchCache<Secret>,
    host_pods_path: &Path,
) -> ControllerContext {
    ControllerContext::new(
        NAMESPACE.to_string(),
        NODE.to_string(),
        Api::namespaced(client.clone(), NAMESPACE),
        Api::namespaced(client.clone(), NAMESPACE),
        pods,
        credentials,
        VolumeClaims::new(client),
        Arc::new(RepositoryEnvironment::default()),
        ControllerSettings {
            restic_binary: PathBuf::from("restic"),
            host_pods_path: host_pods_path.to_path_buf(),
            requeue_min_secs: 1,
            requeue_max_secs: 10,
        },
    )
}

/// Empty pod and credentials caches plus their writers
pub(crate) fn node_caches() -> (
    (WatchCache<Pod>, CacheWriter<Pod>),
    (WatchCache<Secret>, CacheWriter<Secret>),
) {
    (
        cache_pair("pods", FieldFilter::node_name(NODE)),
        cache_pair("credentials", FieldFilter::object_name(CREDENTIALS_SECRET_NAME)),
    )
}

/// Finish the initial list of a cache without adding objects
pub(crate) fn mark_synced<K: Cached>(writer: &mut CacheWriter<K>) {
    writer.apply(Event::Init);
    writer.apply(Event::InitDone);
}
