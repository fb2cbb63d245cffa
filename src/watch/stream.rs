//! Server-side filtered watch streams that keep a [`WatchCache`] in sync.

use crate::constants::WATCH_TIMEOUT_SECS;
use crate::observability::metrics;
use crate::runtime::TaskRegistry;
use crate::watch::cache::{cache_pair, Cached, WatchCache};
use crate::watch::filter::FieldFilter;
use futures::StreamExt;
use kube::runtime::{watcher, WatchStreamExt};
use kube::Api;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

/// One filtered watch over a single kind
#[derive(Debug)]
pub struct ScopedWatch<K: Cached> {
    stream: &'static str,
    api: Api<K>,
    filter: FieldFilter,
}

impl<K> ScopedWatch<K>
where
    K: Cached + DeserializeOwned,
{
    pub fn new(stream: &'static str, api: Api<K>, filter: FieldFilter) -> Self {
        Self {
            stream,
            api,
            filter,
        }
    }

    /// Spawn the synchronizer task and return the cache it maintains
    ///
    /// Returns immediately; the cache starts empty and becomes ready once
    /// the initial list has been applied. Transport errors are retried with
    /// the watcher's default backoff until the token is cancelled.
    pub fn start(self, registry: &TaskRegistry, token: CancellationToken) -> WatchCache<K> {
        let Self {
            stream,
            api,
            filter,
        } = self;

        let config = watcher::Config::default()
            .fields(&filter.field_selector())
            .timeout(WATCH_TIMEOUT_SECS);
        let span = info_span!("agent.watch", stream, selector = %filter);
        let (cache, mut writer) = cache_pair(stream, filter);

        registry.spawn(
            format!("watch/{stream}"),
            async move {
                info!("Starting watch stream");
                let events = watcher(api, config).default_backoff();
                tokio::pin!(events);

                loop {
                    tokio::select! {
                        () = token.cancelled() => break,
                        event = events.next() => match event {
                            Some(Ok(event)) => {
                                writer.apply(event);
                            }
                            Some(Err(e)) => {
                                metrics::increment_watch_errors(stream);
                                warn!(error = %e, "Watch stream error, retrying with backoff");
                            }
                            None => {
                                warn!("Watch stream ended unexpectedly");
                                break;
                            }
                        },
                    }
                }
                info!("Watch stream stopped");
            }
            .instrument(span),
        );

        cache
    }
}
