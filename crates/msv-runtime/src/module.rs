//! # Modules
//!
//! Modules are in-process building blocks (clients, caches, clocks) that
//! services and other modules depend on. They never talk to the bridge.
//!
//! Dependencies are declared by reference:
//!
//! | Reference       | Graph node      | Visible to the dependent as |
//! |-----------------|-----------------|-----------------------------|
//! | `"db"`          | `module:db`     | `"db"`                      |
//! | `"store:db"`    | `module:db`     | `"store"`                   |

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use msv_config::Config;
use msv_graph::Dependencies;
use msv_telemetry::Logger;

/// Node name prefix of modules.
pub const MODULE_PREFIX: &str = "module:";

/// Lifecycle hooks of a module.
#[async_trait]
pub trait Module: Send + Sync + 'static {
    async fn init(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn deinit(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// What a module factory receives.
#[derive(Debug, Clone)]
pub struct ModuleContext {
    pub name: String,
    /// `common` merged with `module.<name>`.
    pub config: Config,
    pub logger: Logger,
    /// Modules this one declared in `uses`, by local name.
    pub modules: ModuleMap,
}

/// A constructed module, kept both as its trait object and as `Any` for
/// typed lookups.
#[derive(Clone)]
pub(crate) struct ModuleInstance {
    pub module: Arc<dyn Module>,
    any: Arc<dyn Any + Send + Sync>,
}

impl ModuleInstance {
    pub fn new<M: Module>(module: M) -> Self {
        let module = Arc::new(module);
        Self {
            module: module.clone(),
            any: module,
        }
    }

    pub fn downcast<M: Module>(&self) -> Option<Arc<M>> {
        self.any.clone().downcast::<M>().ok()
    }
}

type ModuleFactory = Arc<dyn Fn(ModuleContext) -> anyhow::Result<ModuleInstance> + Send + Sync>;

/// How to build a module, and which modules it needs.
#[derive(Clone)]
pub struct ModuleDescription {
    pub(crate) uses: Vec<String>,
    pub(crate) factory: ModuleFactory,
}

impl ModuleDescription {
    pub fn new<M, F>(factory: F) -> Self
    where
        M: Module,
        F: Fn(ModuleContext) -> anyhow::Result<M> + Send + Sync + 'static,
    {
        Self {
            uses: Vec::new(),
            factory: Arc::new(move |ctx| factory(ctx).map(ModuleInstance::new)),
        }
    }

    /// Declare module dependencies (`"name"` or `"local:name"`).
    #[must_use]
    pub fn uses<I, T>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.uses.extend(modules.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        &self.uses
    }
}

impl fmt::Debug for ModuleDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDescription")
            .field("uses", &self.uses)
            .finish_non_exhaustive()
    }
}

/// A parsed module reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRef {
    /// Name the dependent sees the module under.
    pub local: String,
    /// Registered module name.
    pub module: String,
}

impl ModuleRef {
    pub fn parse(reference: &str) -> Self {
        match reference.split_once(':') {
            Some((local, module)) if !module.is_empty() => Self {
                local: local.to_string(),
                module: module.to_string(),
            },
            Some((local, _)) => Self {
                local: local.to_string(),
                module: local.to_string(),
            },
            None => Self {
                local: reference.to_string(),
                module: reference.to_string(),
            },
        }
    }

    /// Graph node of the referenced module.
    pub fn node(&self) -> String {
        format!("{MODULE_PREFIX}{}", self.module)
    }
}

/// Modules visible to a service or module, by local name.
#[derive(Clone, Default)]
pub struct ModuleMap {
    modules: HashMap<String, ModuleInstance>,
}

impl ModuleMap {
    /// Collect the Ready dependencies named by `references`.
    ///
    /// Only Ready nodes reach `dependencies`, so references to modules that
    /// are absent there are simply skipped.
    pub(crate) fn resolve(references: &[ModuleRef], dependencies: &Dependencies) -> Self {
        let modules = references
            .iter()
            .filter_map(|reference| {
                let instance = dependencies.get_as::<ModuleInstance>(&reference.node())?;
                Some((reference.local.clone(), ModuleInstance::clone(&instance)))
            })
            .collect();
        Self { modules }
    }

    /// Typed access to a module by its local name.
    pub fn get<M: Module>(&self, name: &str) -> Option<Arc<M>> {
        self.modules.get(name)?.downcast::<M>()
    }

    pub fn get_dyn(&self, name: &str) -> Option<Arc<dyn Module>> {
        self.modules.get(name).map(|instance| instance.module.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl fmt::Debug for ModuleMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("ModuleMap").field("modules", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msv_graph::node_data;

    struct Counter(u32);

    impl Module for Counter {}

    #[test]
    fn test_parse_references() {
        assert_eq!(
            ModuleRef::parse("db"),
            ModuleRef {
                local: "db".into(),
                module: "db".into()
            }
        );

        let aliased = ModuleRef::parse("store:db");
        assert_eq!(aliased.local, "store");
        assert_eq!(aliased.module, "db");
        assert_eq!(aliased.node(), "module:db");

        assert_eq!(ModuleRef::parse("db:").module, "db");
    }

    #[test]
    fn test_resolve_uses_local_names() {
        let mut deps = Dependencies::new();
        deps.insert("module:counter", node_data(ModuleInstance::new(Counter(7))));

        let refs = vec![ModuleRef::parse("tally:counter"), ModuleRef::parse("missing")];
        let map = ModuleMap::resolve(&refs, &deps);

        assert_eq!(map.len(), 1);
        assert!(map.contains("tally"));
        assert!(!map.contains("counter"));
        assert_eq!(map.get::<Counter>("tally").map(|c| c.0), Some(7));
    }
}
