//! # Node Contracts
//!
//! What a node produces (`NodeData`), what it receives (`Dependencies`) and
//! how it is started and stopped (`NodeLifecycle`).

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};

/// Opaque value produced by a node's init, shared read-only with dependents.
pub type NodeData = Arc<dyn Any + Send + Sync>;

/// Wrap a value as node data.
pub fn node_data<T: Any + Send + Sync>(value: T) -> NodeData {
    Arc::new(value)
}

/// Data of a node's dependencies, keyed by node name.
///
/// Only Ready dependencies ever appear here.
#[derive(Clone, Default)]
pub struct Dependencies {
    data: HashMap<String, NodeData>,
}

impl Dependencies {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, data: NodeData) {
        self.data.insert(name.into(), data);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&NodeData> {
        self.data.get(name)
    }

    /// Get a dependency's data downcast to a concrete type.
    ///
    /// Returns `None` if the dependency is absent or holds another type.
    #[must_use]
    pub fn get_as<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.data.get(name).cloned()?.downcast::<T>().ok()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.data.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("Dependencies").field("nodes", &names).finish()
    }
}

/// Start/stop callbacks of a node.
#[async_trait]
pub trait NodeLifecycle: Send + Sync {
    /// Produce the node's data.
    ///
    /// To hand partially built data to `deinit` on failure, return a
    /// [`PartialInit`] error.
    async fn init(&self, dependencies: Dependencies) -> anyhow::Result<NodeData>;

    /// Release whatever `init` produced. Called after every dependent stopped.
    async fn deinit(&self, data: NodeData) -> anyhow::Result<()> {
        let _ = data;
        Ok(())
    }
}

type InitFn = Box<dyn Fn(Dependencies) -> BoxFuture<'static, anyhow::Result<NodeData>> + Send + Sync>;
type DeinitFn = Box<dyn Fn(NodeData) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// `NodeLifecycle` built from closures.
pub struct FnLifecycle {
    init: InitFn,
    deinit: Option<DeinitFn>,
}

impl FnLifecycle {
    pub fn new<F, Fut>(init: F) -> Self
    where
        F: Fn(Dependencies) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<NodeData>> + Send + 'static,
    {
        Self {
            init: Box::new(move |deps| init(deps).boxed()),
            deinit: None,
        }
    }

    #[must_use]
    pub fn on_deinit<F, Fut>(mut self, deinit: F) -> Self
    where
        F: Fn(NodeData) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.deinit = Some(Box::new(move |data| deinit(data).boxed()));
        self
    }
}

#[async_trait]
impl NodeLifecycle for FnLifecycle {
    async fn init(&self, dependencies: Dependencies) -> anyhow::Result<NodeData> {
        (self.init)(dependencies).await
    }

    async fn deinit(&self, data: NodeData) -> anyhow::Result<()> {
        match &self.deinit {
            Some(deinit) => deinit(data).await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for FnLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnLifecycle")
            .field("has_deinit", &self.deinit.is_some())
            .finish()
    }
}

/// Init failure that still produced data needing teardown.
pub struct PartialInit {
    data: NodeData,
    error: anyhow::Error,
}

impl PartialInit {
    pub fn new(data: NodeData, error: impl Into<anyhow::Error>) -> Self {
        Self {
            data,
            error: error.into(),
        }
    }

    #[must_use]
    pub fn into_parts(self) -> (NodeData, anyhow::Error) {
        (self.data, self.error)
    }
}

impl fmt::Debug for PartialInit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartialInit")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for PartialInit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.error)
    }
}

impl std::error::Error for PartialInit {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependencies_typed_access() {
        let mut deps = Dependencies::new();
        deps.insert("bridge", node_data(42u32));

        assert_eq!(deps.get_as::<u32>("bridge").as_deref(), Some(&42));
        assert!(deps.get_as::<String>("bridge").is_none());
        assert!(deps.get_as::<u32>("module:cache").is_none());
        assert_eq!(deps.len(), 1);
    }

    #[test]
    fn test_partial_init_roundtrips_through_anyhow() {
        let err: anyhow::Error = PartialInit::new(node_data("half"), anyhow::anyhow!("boom")).into();
        assert_eq!(err.to_string(), "boom");

        let partial = err.downcast::<PartialInit>().unwrap();
        let (data, error) = partial.into_parts();
        assert_eq!(data.downcast_ref::<&str>(), Some(&"half"));
        assert_eq!(error.to_string(), "boom");
    }

    #[tokio::test]
    async fn test_fn_lifecycle() {
        let lifecycle = FnLifecycle::new(|deps: Dependencies| async move {
            anyhow::Ok(node_data(deps.len()))
        })
        .on_deinit(|_| async { Err::<(), _>(anyhow::anyhow!("refused")) });

        let data = lifecycle.init(Dependencies::new()).await.unwrap();
        assert_eq!(data.downcast_ref::<usize>(), Some(&0));
        assert!(lifecycle.deinit(data).await.is_err());
    }
}
