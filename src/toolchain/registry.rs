use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

use super::{Lister, Resolver, Scanner};
use crate::dep::TargetType;
use crate::error::ConfigurationError;
use crate::unit::UnitKind;

/// Maps unit kinds to listers and target types to resolvers.
///
/// Populated before a run and only read afterwards, so lookups take `&self`
/// and need no locking. Re-registering the same implementation (by name) for
/// the same key is a no-op; a different implementation is a conflict.
#[derive(Default)]
pub struct ToolchainRegistry {
    scanners: BTreeMap<String, Arc<dyn Scanner>>,
    listers: HashMap<UnitKind, Arc<dyn Lister>>,
    resolvers: HashMap<TargetType, Arc<dyn Resolver>>,
}

impl ToolchainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in toolchain.
    pub fn with_defaults(
        config: &crate::config::UnitgraphConfig,
    ) -> Result<Self, ConfigurationError> {
        let mut registry = Self::new();
        super::golang::register(&mut registry, super::golang::GoToolchain::from_config(config)?)?;
        Ok(registry)
    }

    pub fn register_scanner(&mut self, scanner: Arc<dyn Scanner>) -> Result<(), ConfigurationError> {
        let name = scanner.name().to_string();
        if self.scanners.contains_key(&name) {
            return Err(ConfigurationError::ScannerConflict(name));
        }
        debug!(scanner = %name, "registered scanner");
        self.scanners.insert(name, scanner);
        Ok(())
    }

    pub fn register_lister(
        &mut self,
        kind: UnitKind,
        lister: Arc<dyn Lister>,
    ) -> Result<(), ConfigurationError> {
        if let Some(existing) = self.listers.get(&kind) {
            if existing.name() == lister.name() {
                return Ok(());
            }
            return Err(ConfigurationError::ListerConflict {
                kind,
                existing: existing.name().to_string(),
                new: lister.name().to_string(),
            });
        }
        debug!(kind = %kind, lister = lister.name(), "registered lister");
        self.listers.insert(kind, lister);
        Ok(())
    }

    pub fn register_resolver(
        &mut self,
        target_type: TargetType,
        resolver: Arc<dyn Resolver>,
    ) -> Result<(), ConfigurationError> {
        if let Some(existing) = self.resolvers.get(&target_type) {
            if existing.name() == resolver.name() {
                return Ok(());
            }
            return Err(ConfigurationError::ResolverConflict {
                target_type,
                existing: existing.name().to_string(),
                new: resolver.name().to_string(),
            });
        }
        debug!(target_type = %target_type, resolver = resolver.name(), "registered resolver");
        self.resolvers.insert(target_type, resolver);
        Ok(())
    }

    pub fn lister(&self, kind: &UnitKind) -> Result<Arc<dyn Lister>, ConfigurationError> {
        self.listers
            .get(kind)
            .cloned()
            .ok_or_else(|| ConfigurationError::NoLister(kind.clone()))
    }

    pub fn resolver(&self, target_type: &TargetType) -> Result<Arc<dyn Resolver>, ConfigurationError> {
        self.resolvers
            .get(target_type)
            .cloned()
            .ok_or_else(|| ConfigurationError::NoResolver(target_type.clone()))
    }

    pub fn scanners(&self) -> impl Iterator<Item = &Arc<dyn Scanner>> {
        self.scanners.values()
    }

    pub fn unit_kinds(&self) -> Vec<UnitKind> {
        let mut kinds: Vec<UnitKind> = self.listers.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Verifies that everything a scanner or lister can emit has a handler.
    pub fn check(&self) -> Result<(), ConfigurationError> {
        for scanner in self.scanners.values() {
            for kind in scanner.unit_kinds() {
                self.lister(&kind)?;
            }
        }

        let mut kinds: Vec<&UnitKind> = self.listers.keys().collect();
        kinds.sort();
        for kind in kinds {
            for target_type in self.listers[kind].target_types() {
                self.resolver(&target_type)?;
            }
        }
        Ok(())
    }
}
