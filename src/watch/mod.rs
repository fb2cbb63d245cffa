//! # Scoped Watches
//!
//! Node-scoped watch streams with local caches and change notifications.
//!
//! - `filter`: field filters shared by the server-side selector and the local predicate
//! - `cache`: indexed caches and their single writer
//! - `stream`: synchronizer tasks feeding the caches

mod cache;
mod filter;
mod stream;

pub use cache::{cache_pair, CacheWriter, Cached, WatchCache, WatchChange};
pub use filter::{FieldFilter, FilterField, FilterTarget};
pub use stream::ScopedWatch;

use crate::constants::CREDENTIALS_SECRET_NAME;
use crate::runtime::TaskRegistry;
use k8s_openapi::api::core::v1::{Pod, Secret};
use kube::{Api, Client};
use tokio_util::sync::CancellationToken;

/// Stream name of the pod watch
pub const POD_STREAM: &str = "pods";

/// Stream name of the credentials secret watch
pub const CREDENTIALS_STREAM: &str = "credentials";

/// The two watches every node agent runs
#[derive(Debug)]
pub struct NodeWatches {
    pods: ScopedWatch<Pod>,
    credentials: ScopedWatch<Secret>,
}

impl NodeWatches {
    /// Pods on `node_name` in every namespace, plus the credentials secret in `namespace`
    pub fn new(client: Client, namespace: &str, node_name: &str) -> Self {
        Self {
            pods: ScopedWatch::new(POD_STREAM, Api::all(client.clone()), FieldFilter::node_name(node_name)),
            credentials: ScopedWatch::new(
                CREDENTIALS_STREAM,
                Api::namespaced(client, namespace),
                FieldFilter::object_name(CREDENTIALS_SECRET_NAME),
            ),
        }
    }

    /// Start both synchronizers; does not wait for either to sync
    pub fn start(self, registry: &TaskRegistry, token: &CancellationToken) -> NodeCaches {
        NodeCaches {
            pods: self.pods.start(registry, token.clone()),
            credentials: self.credentials.start(registry, token.clone()),
        }
    }
}

/// Caches shared by both reconciliation loops
#[derive(Debug, Clone)]
pub struct NodeCaches {
    pub pods: WatchCache<Pod>,
    pub credentials: WatchCache<Secret>,
}
