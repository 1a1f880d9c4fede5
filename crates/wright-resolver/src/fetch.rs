//! Concurrent metadata lookups with bounded parallelism and retry.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use wright_core::config::ResolverConfig;
use wright_core::requirement::RawRequirement;
use wright_core::version::Version;
use wright_util::errors::ResolveError;
use wright_util::retry::{retry, RetryError, RetryPolicy};

use crate::cancel::CancelSignal;
use crate::metadata::{MetadataCache, MetadataError, MetadataKey, MetadataProvider};

/// Keys for one fetch round.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Lookups the search is blocked on. A failure here ends the resolve.
    pub required: BTreeSet<MetadataKey>,
    /// Prefetched guesses. A failure leaves the key uncached; if the search
    /// later blocks on it, it comes back as required.
    pub speculative: BTreeSet<MetadataKey>,
}

impl Batch {
    pub fn required(keys: BTreeSet<MetadataKey>) -> Self {
        Self {
            required: keys,
            speculative: BTreeSet::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.required.is_empty() && self.speculative.is_empty()
    }

    pub fn len(&self) -> usize {
        self.required.len() + self.speculative.len()
    }
}

enum Fetched {
    Versions(Vec<Version>),
    Requirements(Vec<RawRequirement>),
}

/// Runs batches of lookups against a provider and stores the results.
pub struct Fetcher<P> {
    provider: Arc<P>,
    semaphore: Arc<Semaphore>,
    policy: RetryPolicy,
}

impl<P: MetadataProvider> Fetcher<P> {
    pub fn new(provider: Arc<P>, max_concurrent: usize, policy: RetryPolicy) -> Self {
        Self {
            provider,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            policy,
        }
    }

    pub fn from_config(provider: Arc<P>, config: &ResolverConfig) -> Self {
        Self::new(
            provider,
            config.max_concurrent_lookups,
            config.retry_policy(),
        )
    }

    /// Fetch every key of `batch` not already cached.
    ///
    /// Lookups run concurrently, at most `max_concurrent` at a time. The
    /// first failed required lookup aborts the rest of the batch; failed
    /// speculative lookups are returned so the caller can stop asking for
    /// them. Cancellation aborts in-flight lookups and returns `Cancelled`.
    pub async fn fetch(
        &self,
        batch: Batch,
        cache: &mut MetadataCache,
        cancel: &CancelSignal,
    ) -> Result<BTreeSet<MetadataKey>, ResolveError> {
        if cancel.is_cancelled() {
            return Err(ResolveError::Cancelled);
        }

        let Batch {
            required,
            speculative,
        } = batch;
        let speculative: Vec<MetadataKey> = speculative
            .into_iter()
            .filter(|k| !required.contains(k))
            .collect();
        let tagged = required
            .into_iter()
            .map(|k| (k, false))
            .chain(speculative.into_iter().map(|k| (k, true)));

        let mut join_set = JoinSet::new();
        for (key, speculative) in tagged.filter(|(k, _)| !cache.contains(k)) {
            let provider = Arc::clone(&self.provider);
            let sem = Arc::clone(&self.semaphore);
            let policy = self.policy;
            join_set.spawn(async move {
                let _permit = sem.acquire_owned().await;
                let result = fetch_one(provider.as_ref(), &key, policy).await;
                (key, speculative, result)
            });
        }

        let mut skipped = BTreeSet::new();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    join_set.abort_all();
                    tracing::info!("resolution cancelled, aborted in-flight lookups");
                    return Err(ResolveError::Cancelled);
                }
                next = join_set.join_next() => match next {
                    None => return Ok(skipped),
                    Some(Ok((key, speculative, result))) => {
                        let stored = result.and_then(|fetched| store(cache, key.clone(), fetched));
                        match stored {
                            Ok(()) => {}
                            Err(e) if speculative => {
                                tracing::debug!(%key, error = %e, "prefetch failed, left uncached");
                                skipped.insert(key);
                            }
                            Err(e) => {
                                join_set.abort_all();
                                return Err(e);
                            }
                        }
                    }
                    Some(Err(e)) => {
                        join_set.abort_all();
                        return Err(ResolveError::Internal {
                            message: format!("metadata lookup task failed: {e}"),
                        });
                    }
                },
            }
        }
    }
}

async fn fetch_one<P: MetadataProvider>(
    provider: &P,
    key: &MetadataKey,
    policy: RetryPolicy,
) -> Result<Fetched, ResolveError> {
    let label = key.to_string();
    match key {
        MetadataKey::Versions(name) => {
            let result = retry(policy, &label, MetadataError::is_transient, move || {
                provider.versions(name)
            })
            .await;
            match result {
                Ok(versions) => Ok(Fetched::Versions(versions)),
                // An unknown package simply has nothing to offer.
                Err(RetryError::Fatal(MetadataError::NotFound)) => {
                    tracing::debug!(package = %name, "package not found in index");
                    Ok(Fetched::Versions(Vec::new()))
                }
                Err(e) => Err(lookup_failed(key, e)),
            }
        }
        MetadataKey::Requirements(name, version) => {
            let result = retry(policy, &label, MetadataError::is_transient, move || {
                provider.lookup(name, version)
            })
            .await;
            result
                .map(Fetched::Requirements)
                .map_err(|e| lookup_failed(key, e))
        }
    }
}

fn lookup_failed(key: &MetadataKey, err: RetryError<MetadataError>) -> ResolveError {
    let version = match key {
        MetadataKey::Versions(_) => "(versions)".to_string(),
        MetadataKey::Requirements(_, version) => version.to_string(),
    };
    match err {
        RetryError::Exhausted { attempts, last } => ResolveError::FetchExhausted {
            name: key.name().to_string(),
            version,
            attempts,
            message: last.to_string(),
        },
        RetryError::Fatal(MetadataError::NotFound) => ResolveError::MetadataNotFound {
            name: key.name().to_string(),
            version,
        },
        // Transient errors never come back as fatal.
        RetryError::Fatal(MetadataError::Transient(message)) => ResolveError::FetchExhausted {
            name: key.name().to_string(),
            version,
            attempts: 1,
            message,
        },
    }
}

fn store(cache: &mut MetadataCache, key: MetadataKey, fetched: Fetched) -> Result<(), ResolveError> {
    match (key, fetched) {
        (MetadataKey::Versions(name), Fetched::Versions(versions)) => {
            tracing::debug!(package = %name, count = versions.len(), "fetched version list");
            cache.insert_versions(name, versions);
            Ok(())
        }
        (MetadataKey::Requirements(name, version), Fetched::Requirements(raw)) => {
            tracing::debug!(package = %name, %version, count = raw.len(), "fetched requirements");
            cache
                .insert_requirements(name, version, &raw)
                .map_err(|errors| ResolveError::Invalid { errors })
        }
        (key, _) => Err(ResolveError::Planning {
            message: format!("lookup for {key} returned the wrong kind of metadata"),
        }),
    }
}
