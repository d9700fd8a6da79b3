//! Collector registry.
//!
//! A stateless table from collector kind to constructor. Each cycle resolves
//! the policy paths against it and builds fresh instances.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::component::{BufferHandle, Collector, PassiveCollector};
use super::path::{CollectorKind, CollectorPath};
use crate::error::CollectorError;

pub type CollectorFactory = Arc<dyn Fn(BufferHandle) -> Box<dyn Collector> + Send + Sync>;

#[derive(Clone, Default)]
pub struct CollectorRegistry {
    factories: BTreeMap<CollectorKind, CollectorFactory>,
}

impl CollectorRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every known kind backed by a [`PassiveCollector`].
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        for kind in CollectorKind::ALL {
            registry.register(kind, move |_buffer| Box::new(PassiveCollector::new(kind)));
        }
        registry
    }

    /// Register or replace the constructor for `kind`.
    pub fn register<F>(&mut self, kind: CollectorKind, factory: F)
    where
        F: Fn(BufferHandle) -> Box<dyn Collector> + Send + Sync + 'static,
    {
        self.factories.insert(kind, Arc::new(factory));
    }

    pub fn is_registered(&self, kind: CollectorKind) -> bool {
        self.factories.contains_key(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = CollectorKind> + '_ {
        self.factories.keys().copied()
    }

    pub fn create(
        &self,
        kind: CollectorKind,
        buffer: BufferHandle,
    ) -> Result<Box<dyn Collector>, CollectorError> {
        let factory = self
            .factories
            .get(&kind)
            .ok_or(CollectorError::NotRegistered(kind))?;
        Ok(factory(buffer))
    }

    /// Parse a policy path and check a constructor exists for it.
    pub fn resolve(&self, raw: &str) -> Result<CollectorPath, CollectorError> {
        let path: CollectorPath = raw.parse()?;
        if !self.is_registered(path.kind) {
            return Err(CollectorError::NotRegistered(path.kind));
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_all_kinds() {
        let registry = CollectorRegistry::with_defaults();
        assert_eq!(registry.kinds().count(), CollectorKind::ALL.len());
    }

    #[test]
    fn test_resolve() {
        let mut registry = CollectorRegistry::empty();
        registry.register(CollectorKind::SelfLog, |_b| {
            Box::new(PassiveCollector::new(CollectorKind::SelfLog))
        });

        assert!(registry.resolve("android://self-log").is_ok());
        assert_eq!(
            registry.resolve("android://location"),
            Err(CollectorError::NotRegistered(CollectorKind::Location))
        );
        assert!(matches!(
            registry.resolve("ios://location"),
            Err(CollectorError::UnknownPath(_))
        ));
    }
}
