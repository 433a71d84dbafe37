//! Registry — the process-wide, concurrency-safe set of log types.
//!
//! Two partitions:
//! - `native`: merged once at construction, immutable, lock-free reads.
//! - `dynamic`: registered at run time behind a reader/writer lock.
//!
//! Removal only ever touches the dynamic partition, so native entries
//! cannot be deleted.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::entry::{Entry, LogParser};
use crate::error::RegistryError;
use crate::group::{merge, Finder, Group, LogTypes};

#[derive(Debug, Default)]
pub struct Registry {
    native: Group,
    dynamic: RwLock<Group>,
}

impl Registry {
    /// Build a registry whose native partition is the union of `groups`.
    pub fn build(groups: &[&dyn LogTypes]) -> Result<Self, RegistryError> {
        let native = merge(groups)?;
        debug!(count = native.len(), "Built native log type partition");
        Ok(Self {
            native,
            dynamic: RwLock::new(Group::default()),
        })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_native(&self, name: &str) -> bool {
        self.native.contains(name)
    }

    /// Add a group's entries to the dynamic partition.
    ///
    /// Names are checked against both partitions before anything is inserted,
    /// so a failed registration leaves the registry unchanged and readers never
    /// see part of a group.
    pub fn register(&self, group: &dyn LogTypes) -> Result<(), RegistryError> {
        let incoming = group.entries();
        let mut dynamic = self.dynamic.write();

        for entry in &incoming {
            let name = entry.name();
            if self.native.contains(name) || dynamic.contains(name) {
                return Err(RegistryError::DuplicateEntry(name.to_string()));
            }
        }
        for entry in incoming {
            dynamic.insert(entry)?;
        }

        info!(total = self.native.len() + dynamic.len(), "Registered log types");
        Ok(())
    }

    /// Remove a dynamically registered entry. Returns whether it existed.
    ///
    /// Native entries are never removed; asking for one returns `false`.
    pub fn del(&self, name: &str) -> bool {
        if self.native.contains(name) {
            warn!(log_type = name, "Refusing to remove native log type");
            return false;
        }
        let removed = self.dynamic.write().remove(name).is_some();
        if removed {
            info!(log_type = name, "Removed log type");
        }
        removed
    }

    /// A default-options parser for every entry.
    ///
    /// Used at startup to validate that every factory accepts empty options.
    pub fn available_parsers(&self) -> Result<BTreeMap<String, LogParser>, RegistryError> {
        self.entries()
            .into_iter()
            .map(|entry| {
                let parser = entry.new_parser(None).map_err(|source| RegistryError::DefaultParser {
                    name: entry.name().to_string(),
                    source,
                })?;
                Ok((entry.name().to_string(), parser))
            })
            .collect()
    }
}

impl Finder for Registry {
    fn find(&self, name: &str) -> Option<Arc<Entry>> {
        self.native
            .find(name)
            .or_else(|| self.dynamic.read().find(name))
    }
}

impl LogTypes for Registry {
    fn entries(&self) -> Vec<Arc<Entry>> {
        let mut entries = self.native.entries();
        entries.extend(self.dynamic.read().entries());
        entries.sort_by(|a, b| a.name().cmp(b.name()));
        entries
    }

    fn len(&self) -> usize {
        self.native.len() + self.dynamic.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::tests::group_of;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    fn registry() -> Registry {
        let foo = group_of(&["A.Foo"]);
        let bar = group_of(&["A.Bar"]);
        Registry::build(&[&foo, &bar]).unwrap()
    }

    #[test]
    fn test_build_and_find() {
        let reg = registry();
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.find("A.Foo").unwrap().name(), "A.Foo");
        assert!(reg.find("A.Baz").is_none());
        assert!(reg.is_native("A.Bar"));
    }

    #[test]
    fn test_build_rejects_duplicates() {
        let g1 = group_of(&["A.Foo"]);
        let g2 = group_of(&["A.Foo"]);
        assert!(matches!(
            Registry::build(&[&g1, &g2]),
            Err(RegistryError::DuplicateEntry(_))
        ));
    }

    #[test]
    fn test_register_and_del() {
        let reg = registry();
        reg.register(&group_of(&["Custom.One", "Custom.Two"])).unwrap();
        assert_eq!(reg.len(), 4);
        assert!(reg.find("Custom.One").is_some());
        assert!(!reg.is_native("Custom.One"));

        assert!(reg.del("Custom.One"));
        assert!(!reg.del("Custom.One"), "second delete finds nothing");
        assert!(reg.find("Custom.One").is_none());
        assert_eq!(reg.len(), 3);
    }

    #[test]
    fn test_register_duplicate_leaves_registry_unchanged() {
        let reg = registry();
        reg.register(&group_of(&["Custom.One"])).unwrap();

        // Collides with the dynamic partition
        let err = reg.register(&group_of(&["Custom.Alpha", "Custom.One"])).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateEntry(ref n) if n == "Custom.One"));
        assert!(reg.find("Custom.Alpha").is_none(), "no partial registration");

        // Collides with the native partition
        let err = reg.register(&group_of(&["A.Foo", "Custom.Beta"])).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateEntry(ref n) if n == "A.Foo"));
        assert!(reg.find("Custom.Beta").is_none());
        assert_eq!(reg.len(), 3);
    }

    #[test]
    fn test_del_native_is_refused() {
        let reg = registry();
        assert!(!reg.del("A.Foo"));
        assert!(reg.find("A.Foo").is_some());
    }

    #[test]
    fn test_entries_sorted_across_partitions() {
        let reg = registry();
        reg.register(&group_of(&["A.Baz"])).unwrap();
        assert_eq!(reg.log_types(), vec!["A.Bar", "A.Baz", "A.Foo"]);
    }

    #[test]
    fn test_available_parsers() {
        let reg = registry();
        let parsers = reg.available_parsers().unwrap();
        assert_eq!(parsers.len(), 2);
        assert_eq!(parsers["A.Foo"].log_type(), "A.Foo");
    }

    #[test]
    fn test_readers_never_observe_partial_group() {
        let reg = Arc::new(registry());
        let names: Vec<String> = (0..64).map(|i| format!("Dyn.Type{}", i)).collect();
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let group = group_of(&name_refs);
        let done = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let reg = Arc::clone(&reg);
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    while !done.load(Ordering::Acquire) {
                        let dynamic = reg
                            .entries()
                            .iter()
                            .filter(|e| e.name().starts_with("Dyn."))
                            .count();
                        assert!(dynamic == 0 || dynamic == 64, "observed {} of 64", dynamic);
                    }
                })
            })
            .collect();

        reg.register(&group).unwrap();
        done.store(true, Ordering::Release);
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(reg.len(), 66);
    }
}
