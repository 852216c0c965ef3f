// SPDX-License-Identifier: MIT

//! Process registry: the agent-wide slug → supervisor map. Mutates only
//! the map itself; a descriptor's `state`/`last_error` are owned
//! exclusively by its supervisor.

use std::collections::BTreeMap;
use std::sync::Arc;

use outpost_core::{Clock, InvalidComponent, ProcessSnapshot, ProcessSpec, Slug};
use parking_lot::Mutex;

use crate::archive::ArchiveFetcher;
use crate::log_hub::LogHandle;
use crate::supervisor::{spawn_supervisor, SupervisorConfig, SupervisorHandle};

/// Request to create a process, already shaped by the caller (typically
/// after the request surface has validated the wire document). Kept free
/// of any wire-format dependency so the engine does not need to know
/// about `outpost-wire`.
#[derive(Debug, Clone)]
pub struct CreateSpec {
    pub app: String,
    pub node: String,
    pub process_type: String,
    pub source_url: String,
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("invalid-request: {0}")]
    InvalidRequest(String),
    #[error("slug-in-use")]
    SlugInUse,
    #[error("not-found")]
    NotFound,
}

impl From<InvalidComponent> for RegistryError {
    fn from(e: InvalidComponent) -> Self {
        RegistryError::InvalidRequest(e.to_string())
    }
}

struct Inner<C: Clock> {
    clock: C,
    fetcher: Arc<dyn ArchiveFetcher>,
    config: SupervisorConfig,
    tail_capacity: usize,
    queue_capacity: usize,
    supervisors: Mutex<BTreeMap<String, Arc<SupervisorHandle<C>>>>,
}

/// Agent-wide registry. Cheap to clone (reference-counted); every clone
/// shares the same underlying map.
pub struct Registry<C: Clock>(Arc<Inner<C>>);

impl<C: Clock> Clone for Registry<C> {
    fn clone(&self) -> Self {
        Registry(self.0.clone())
    }
}

impl<C: Clock> Registry<C> {
    pub fn new(
        clock: C,
        fetcher: Arc<dyn ArchiveFetcher>,
        config: SupervisorConfig,
        tail_capacity: usize,
        queue_capacity: usize,
    ) -> Self {
        Registry(Arc::new(Inner {
            clock,
            fetcher,
            config,
            tail_capacity,
            queue_capacity,
            supervisors: Mutex::new(BTreeMap::new()),
        }))
    }

    /// Validate, check uniqueness, and insert in one critical section so
    /// two concurrent creates for the same slug can't both succeed.
    pub fn create(&self, request: CreateSpec) -> Result<ProcessSnapshot, RegistryError> {
        let slug = Slug::derive(&request.app, &request.node)?;

        let mut supervisors = self.0.supervisors.lock();
        if supervisors.contains_key(slug.as_str()) {
            return Err(RegistryError::SlugInUse);
        }

        let spec = ProcessSpec {
            slug: slug.clone(),
            app: request.app,
            node: request.node,
            process_type: request.process_type,
            source_url: request.source_url,
            env: request.env,
        };

        let handle = Arc::new(spawn_supervisor(
            spec,
            self.0.clock.clone(),
            self.0.fetcher.clone(),
            self.0.config.clone(),
            self.0.tail_capacity,
            self.0.queue_capacity,
        ));
        let snapshot = handle.snapshot();
        supervisors.insert(slug.as_str().to_string(), handle.clone());
        drop(supervisors);

        self.spawn_reaper(slug.as_str().to_string(), handle);
        Ok(snapshot)
    }

    /// Point-in-time snapshot of every live descriptor. Order is
    /// unspecified.
    pub fn list(&self) -> Vec<ProcessSnapshot> {
        self.0.supervisors.lock().values().map(|h| h.snapshot()).collect()
    }

    pub fn get(&self, slug: &str) -> Option<ProcessSnapshot> {
        self.0.supervisors.lock().get(slug).map(|h| h.snapshot())
    }

    /// Signal the owning supervisor to terminate. Idempotent: a slug that
    /// is already `terminating`/`deleted` (or has already been reaped)
    /// returns ok rather than not-found.
    pub async fn delete(&self, slug: &str) -> Result<(), RegistryError> {
        let handle = self.0.supervisors.lock().get(slug).cloned();
        match handle {
            Some(handle) => {
                handle.request_delete().await;
                Ok(())
            }
            None => Err(RegistryError::NotFound),
        }
    }

    /// A new subscriber handle for `slug`'s live output.
    pub fn subscribe(&self, slug: &str) -> Result<LogHandle, RegistryError> {
        let handle = self.0.supervisors.lock().get(slug).cloned().ok_or(RegistryError::NotFound)?;
        Ok(handle.log_hub().subscribe())
    }

    fn spawn_reaper(&self, slug: String, handle: Arc<SupervisorHandle<C>>) {
        let inner = self.0.clone();
        tokio::spawn(async move {
            handle.await_deleted().await;
            inner.supervisors.lock().remove(&slug);
        });
    }

    /// Signal every live supervisor to delete and wait for all of them to
    /// finish. Used by the agent binary on SIGINT.
    pub async fn shutdown(&self) {
        let handles: Vec<_> = self.0.supervisors.lock().values().cloned().collect();
        for handle in &handles {
            handle.request_delete().await;
        }
        for handle in &handles {
            handle.await_deleted().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{FetchError, FetchErrorCategory};
    use crate::supervisor::SupervisorConfig;
    use async_trait::async_trait;
    use outpost_core::SystemClock;
    use std::path::Path;
    use std::time::Duration;

    struct NeverFetcher;

    #[async_trait]
    impl ArchiveFetcher for NeverFetcher {
        async fn fetch(&self, _url: &str, _dest_dir: &Path) -> Result<(), FetchError> {
            Err(FetchError::new(FetchErrorCategory::Network, "unreachable in test"))
        }
    }

    fn test_registry(scratch: &Path) -> Registry<SystemClock> {
        Registry::new(
            SystemClock,
            Arc::new(NeverFetcher),
            SupervisorConfig { scratch_root: scratch.to_path_buf(), ..SupervisorConfig::default() },
            64,
            16,
        )
    }

    fn create_spec(app: &str, node: &str) -> CreateSpec {
        CreateSpec {
            app: app.to_string(),
            node: node.to_string(),
            process_type: "web".to_string(),
            source_url: "http://example.invalid/a.zip".to_string(),
            env: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn create_rejects_invalid_charset() {
        let scratch = tempfile::tempdir().unwrap();
        let registry = test_registry(scratch.path());
        let err = registry.create(create_spec("bad app", "n")).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn create_rejects_duplicate_slug() {
        let scratch = tempfile::tempdir().unwrap();
        let registry = test_registry(scratch.path());
        registry.create(create_spec("a", "w")).unwrap();
        let err = registry.create(create_spec("a", "w")).unwrap_err();
        assert_eq!(err, RegistryError::SlugInUse);
    }

    #[tokio::test]
    async fn get_and_list_reflect_created_descriptor() {
        let scratch = tempfile::tempdir().unwrap();
        let registry = test_registry(scratch.path());
        let snap = registry.create(create_spec("a", "w")).unwrap();
        assert_eq!(registry.get(snap.slug().as_str()).unwrap().spec.app, "a");
        assert_eq!(registry.list().len(), 1);
    }

    #[tokio::test]
    async fn delete_unknown_slug_is_not_found() {
        let scratch = tempfile::tempdir().unwrap();
        let registry = test_registry(scratch.path());
        assert_eq!(registry.delete("missing.slug").await, Err(RegistryError::NotFound));
    }

    #[tokio::test]
    async fn delete_then_get_eventually_not_found() {
        let scratch = tempfile::tempdir().unwrap();
        let registry = test_registry(scratch.path());
        let snap = registry.create(create_spec("a", "w")).unwrap();
        registry.delete(snap.slug().as_str()).await.unwrap();

        // The reaper task removes the entry asynchronously once the
        // supervisor reaches `deleted`; give it a moment.
        for _ in 0..50 {
            if registry.get("a.w").is_none() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("descriptor was never reaped");
    }

    #[tokio::test]
    async fn create_after_delete_of_same_slug_is_accepted() {
        let scratch = tempfile::tempdir().unwrap();
        let registry = test_registry(scratch.path());
        registry.create(create_spec("a", "w")).unwrap();
        registry.delete("a.w").await.unwrap();

        for _ in 0..50 {
            if registry.get("a.w").is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        registry.create(create_spec("a", "w")).unwrap();
    }

    #[tokio::test]
    async fn subscribe_unknown_slug_is_not_found() {
        let scratch = tempfile::tempdir().unwrap();
        let registry = test_registry(scratch.path());
        assert!(matches!(registry.subscribe("missing.slug"), Err(RegistryError::NotFound)));
    }
}
