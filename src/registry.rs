//! Registry & Factory (C6): name→factory map, scoped lifetimes, custom
//! adapter loading.
//!
//! The register/lookup shape is grounded on the teacher's
//! `ConnectorRegistry` (`traits.rs`): a `Vec`/`HashMap` of trait objects
//! built up via `register`, looked up by name, never a process-wide
//! singleton. Custom adapter loading generalizes the teacher's dynamic
//! script-loading intent (`registry.rs`'s Lua extension resolution) into
//! the Rust idiom of `libloading` over a `cdylib`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::store::StorageAdapter;
use crate::store_memory::MemoryAdapter;
use crate::store_sqlite::SqliteAdapter;

/// Resolved configuration handed to a [`Factory`] when constructing an
/// adapter, mirroring the `vectorDB.options` keys in spec §6.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub provider: String,
    pub path: String,
    pub dimension: usize,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            provider: "sqlite".to_string(),
            path: "./ragcore.db".to_string(),
            dimension: 768,
        }
    }
}

impl AdapterConfig {
    /// Deep-merges `self` (the partial) over `defaults`: an empty
    /// string / zero dimension in `self` means "not set, use default".
    pub fn merged_over(self, defaults: AdapterConfig) -> AdapterConfig {
        AdapterConfig {
            provider: if self.provider.is_empty() { defaults.provider } else { self.provider },
            path: if self.path.is_empty() { defaults.path } else { self.path },
            dimension: if self.dimension == 0 { defaults.dimension } else { self.dimension },
        }
    }
}

pub type BuiltinFactory = Arc<dyn Fn(&AdapterConfig) -> Arc<dyn StorageAdapter> + Send + Sync>;

/// Maps provider name → factory. Never a process-wide singleton: each
/// caller constructs and owns its own registry, per spec §9's explicit
/// move away from default-export singletons.
pub struct Registry {
    factories: HashMap<String, BuiltinFactory>,
}

impl Registry {
    /// An empty registry with no built-ins registered yet.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// A registry pre-loaded with the built-in `memory` and `sqlite`
    /// providers (plus `sqlite`'s documented aliases).
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_builtins();
        registry
    }

    fn register_builtins(&mut self) {
        self.factories.insert(
            "memory".to_string(),
            Arc::new(|config: &AdapterConfig| -> Arc<dyn StorageAdapter> {
                Arc::new(MemoryAdapter::new(config.dimension))
            }),
        );
        let sqlite_factory: BuiltinFactory = Arc::new(|config: &AdapterConfig| -> Arc<dyn StorageAdapter> {
            Arc::new(SqliteAdapter::new(config.path.clone(), config.dimension))
        });
        for name in ["sqlite", "sqlite3", "sql"] {
            self.factories.insert(name.to_string(), sqlite_factory.clone());
        }
    }

    /// Registers a factory under `name`. Errors with [`Error::AlreadyRegistered`]
    /// if `name` is already taken.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> Result<()>
    where
        F: Fn(&AdapterConfig) -> Arc<dyn StorageAdapter> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(Error::AlreadyRegistered(name));
        }
        self.factories.insert(name, Arc::new(factory));
        Ok(())
    }

    /// Loads a custom adapter factory from a dynamic library at `path`,
    /// searching in order for exported symbols named `create_adapter` or
    /// `create_<provider>_adapter`; any other shape is rejected with
    /// [`Error::InvalidAdapterModule`] naming the accepted patterns. On
    /// success, `provider` resolves to a factory that calls the loaded
    /// symbol to construct a fresh adapter on every [`Factory::create`].
    ///
    /// # Safety contract
    /// The library is expected to export an `unsafe extern "C" fn() ->
    /// *mut Box<dyn StorageAdapter>` symbol — a thin pointer to a boxed
    /// trait object, since a bare `*mut dyn StorageAdapter` fat pointer
    /// has no stable FFI representation. Callers providing a custom
    /// adapter are trusted to uphold that ABI, the same way the teacher's
    /// own script loading trusts caller-configured file paths.
    pub fn register_custom(&mut self, provider: &str, path: &str) -> Result<()> {
        let library = unsafe {
            libloading::Library::new(path).map_err(|e| Error::AdapterLoad {
                path: path.to_string(),
                source: e,
            })?
        };

        // Leaked for the process lifetime: the returned factory closure
        // holds a `Symbol` borrowed from this library, so the backing code
        // must stay mapped for as long as the factory might be called.
        let library: &'static libloading::Library = Box::leak(Box::new(library));

        type Constructor = unsafe extern "C" fn() -> *mut Box<dyn StorageAdapter>;
        let provider_specific = format!("create_{provider}_adapter\0");
        let constructor: libloading::Symbol<'static, Constructor> = unsafe {
            library
                .get(b"create_adapter\0")
                .or_else(|_| library.get(provider_specific.as_bytes()))
                .map_err(|_| {
                    Error::InvalidAdapterModule(format!(
                        "{path:?} exposes neither `create_adapter` nor `create_{provider}_adapter`"
                    ))
                })?
        };

        let factory: BuiltinFactory = Arc::new(move |_config: &AdapterConfig| -> Arc<dyn StorageAdapter> {
            let boxed = unsafe { Box::from_raw(constructor()) };
            Arc::from(*boxed)
        });

        self.factories.insert(provider.to_string(), factory);
        Ok(())
    }

    /// Unregisters `name`, if present.
    pub fn unregister(&mut self, name: &str) {
        self.factories.remove(name);
    }

    /// Removes every registered factory.
    pub fn clear(&mut self) {
        self.factories.clear();
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    fn factory(&self, name: &str) -> Result<&BuiltinFactory> {
        self.factories
            .get(name)
            .ok_or_else(|| Error::ProviderMissing(name.to_string()))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Owns a default configuration and builds initialized adapters from a
/// [`Registry`].
pub struct Factory {
    default_config: AdapterConfig,
}

impl Factory {
    pub fn new(default_config: AdapterConfig) -> Self {
        Self { default_config }
    }

    /// Deep-merges `partial` over the factory's default, looks up the
    /// provider in `registry`, constructs the adapter, and initializes it
    /// before returning.
    pub async fn create(
        &self,
        registry: &Registry,
        partial: AdapterConfig,
    ) -> Result<Arc<dyn StorageAdapter>> {
        let merged = partial.merged_over(self.default_config.clone());
        let factory = registry.factory(&merged.provider)?;
        let adapter = factory(&merged);
        adapter.initialize().await?;
        Ok(adapter)
    }

    /// Reads `VECTOR_DB_PROVIDER`, `SQLITE_DB_PATH`, and
    /// `EMBEDDING_DIMENSION` from the environment (spec §6), builds a
    /// partial config from whichever are set, and delegates to
    /// [`Factory::create`].
    pub async fn create_from_env(&self, registry: &Registry) -> Result<Arc<dyn StorageAdapter>> {
        let mut partial = AdapterConfig {
            provider: String::new(),
            path: String::new(),
            dimension: 0,
        };
        if let Ok(provider) = std::env::var("VECTOR_DB_PROVIDER") {
            partial.provider = provider;
        }
        if let Ok(path) = std::env::var("SQLITE_DB_PATH") {
            partial.path = path;
        }
        if let Ok(dim) = std::env::var("EMBEDDING_DIMENSION") {
            if let Ok(dim) = dim.parse() {
                partial.dimension = dim;
            }
        }
        self.create(registry, partial).await
    }
}

impl Default for Factory {
    fn default() -> Self {
        Self::new(AdapterConfig::default())
    }
}

/// Runs `op` against a fresh, built-in-preloaded registry, guaranteeing
/// that registration side-effects do not leak across calls.
pub async fn with_registry<F, Fut, T>(op: F) -> T
where
    F: FnOnce(Registry) -> Fut,
    Fut: std::future::Future<Output = T>,
{
    op(Registry::with_builtins()).await
}

/// Like [`with_registry`], but additionally registers `extra_factories`
/// (name, factory closure pairs) before invoking `op`.
pub async fn with_custom_registry<F, Fut, T>(
    extra_factories: Vec<(String, BuiltinFactory)>,
    op: F,
) -> T
where
    F: FnOnce(Registry) -> Fut,
    Fut: std::future::Future<Output = T>,
{
    let mut registry = Registry::with_builtins();
    for (name, factory) in extra_factories {
        registry.factories.insert(name, factory);
    }
    op(registry).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builtin_memory_provider_resolves() {
        let registry = Registry::with_builtins();
        let factory = Factory::default();
        let adapter = factory
            .create(&registry, AdapterConfig { provider: "memory".to_string(), path: String::new(), dimension: 3 })
            .await
            .unwrap();
        let info = adapter.info().await.unwrap();
        assert_eq!(info.provider, "memory");
    }

    #[tokio::test]
    async fn unregistered_provider_is_an_error() {
        let registry = Registry::with_builtins();
        let factory = Factory::default();
        let err = factory
            .create(&registry, AdapterConfig { provider: "nonexistent".to_string(), path: String::new(), dimension: 0 })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProviderMissing(_)));
    }

    #[test]
    fn registering_existing_name_twice_is_an_error() {
        let mut registry = Registry::with_builtins();
        let err = registry
            .register("memory", |config: &AdapterConfig| -> Arc<dyn StorageAdapter> {
                Arc::new(MemoryAdapter::new(config.dimension))
            })
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyRegistered(_)));
    }

    #[test]
    fn unregister_then_register_succeeds() {
        let mut registry = Registry::with_builtins();
        registry.unregister("memory");
        assert!(!registry.is_registered("memory"));
        registry
            .register("memory", |config: &AdapterConfig| -> Arc<dyn StorageAdapter> {
                Arc::new(MemoryAdapter::new(config.dimension))
            })
            .unwrap();
        assert!(registry.is_registered("memory"));
    }

    #[tokio::test]
    async fn with_registry_does_not_leak_registrations() {
        with_registry(|mut registry| async move {
            registry
                .register("ephemeral", |config: &AdapterConfig| -> Arc<dyn StorageAdapter> {
                    Arc::new(MemoryAdapter::new(config.dimension))
                })
                .unwrap();
            assert!(registry.is_registered("ephemeral"));
        })
        .await;

        let fresh = Registry::with_builtins();
        assert!(!fresh.is_registered("ephemeral"));
    }
}
