//! Groups — deduplicated collections of entries, and how they combine.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::entry::{Entry, EntryBuilder};
use crate::error::RegistryError;

pub trait Finder {
    fn find(&self, name: &str) -> Option<Arc<Entry>>;
}

pub trait LogTypes: Finder {
    /// All entries, ordered by name.
    fn entries(&self) -> Vec<Arc<Entry>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn log_types(&self) -> Vec<String> {
        self.entries().iter().map(|e| e.name().to_string()).collect()
    }
}

/// An immutable set of entries keyed by name.
#[derive(Debug, Clone, Default)]
pub struct Group {
    entries: BTreeMap<String, Arc<Entry>>,
}

impl Group {
    pub(crate) fn insert(&mut self, entry: Arc<Entry>) -> Result<(), RegistryError> {
        let name = entry.name().to_string();
        if self.entries.contains_key(&name) {
            return Err(RegistryError::DuplicateEntry(name));
        }
        self.entries.insert(name, entry);
        Ok(())
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<Arc<Entry>> {
        self.entries.remove(name)
    }
}

impl Finder for Group {
    fn find(&self, name: &str) -> Option<Arc<Entry>> {
        self.entries.get(name).cloned()
    }
}

impl LogTypes for Group {
    fn entries(&self) -> Vec<Arc<Entry>> {
        self.entries.values().cloned().collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Build a group from entry builders.
///
/// Fails on the first builder error or on two builders resolving to the same name.
pub fn build_group(builders: &[&dyn EntryBuilder]) -> Result<Group, RegistryError> {
    let mut group = Group::default();
    for builder in builders {
        let entry = builder.build_entry()?;
        group.insert(Arc::new(entry))?;
    }
    Ok(group)
}

/// Union of several groups. Any name collision fails the whole merge;
/// groups are visited in the given order, entries by name.
pub fn merge(groups: &[&dyn LogTypes]) -> Result<Group, RegistryError> {
    let mut merged = Group::default();
    for group in groups {
        for entry in group.entries() {
            merged.insert(entry)?;
        }
    }
    Ok(merged)
}

/// Append the entries found under `names`, skipping unknown ones.
pub fn append_find(entries: &mut Vec<Arc<Entry>>, finder: &dyn Finder, names: &[&str]) {
    entries.extend(names.iter().filter_map(|name| finder.find(name)));
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::entry::{ConfigParser, Desc, EventParser, ParserConfig, RawEvent};
    use crate::error::{ConfigError, ParseError};
    use crate::schema::Schema;

    struct Noop;

    impl EventParser for Noop {
        fn parse_events(&mut self, _line: &str) -> Result<Vec<RawEvent>, ParseError> {
            Ok(Vec::new())
        }
    }

    pub(crate) fn builder(name: &str) -> ConfigParser {
        let factory = |_: Option<&ParserConfig>| -> Result<Box<dyn EventParser>, ConfigError> {
            Ok(Box::new(Noop))
        };
        ConfigParser {
            desc: Desc::new(name, format!("{} logs", name), "https://example.com/docs"),
            schema: Schema::new(),
            factory: Arc::new(factory),
        }
    }

    pub(crate) fn group_of(names: &[&str]) -> Group {
        let builders: Vec<ConfigParser> = names.iter().map(|n| builder(n)).collect();
        let refs: Vec<&dyn EntryBuilder> = builders.iter().map(|b| b as &dyn EntryBuilder).collect();
        build_group(&refs).unwrap()
    }

    #[test]
    fn test_build_group() {
        let group = group_of(&["A.Foo", "A.Bar"]);
        assert_eq!(group.len(), 2);
        assert_eq!(group.log_types(), vec!["A.Bar", "A.Foo"]);
        assert!(group.find("A.Foo").is_some());
        assert!(group.find("A.Baz").is_none());
    }

    #[test]
    fn test_build_group_duplicate() {
        let a = builder("A.Foo");
        let b = builder("A.Foo");
        let err = build_group(&[&a, &b]).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateEntry(ref n) if n == "A.Foo"));
    }

    #[test]
    fn test_build_group_propagates_builder_error() {
        let bad = builder("Invalid");
        let err = build_group(&[&bad]).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidEntry { .. }));
    }

    #[test]
    fn test_merge_disjoint_groups() {
        let foo = group_of(&["A.Foo"]);
        let bar = group_of(&["A.Bar"]);
        let merged = merge(&[&foo, &bar]).unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.find("A.Foo").unwrap().name(), "A.Foo");
        assert_eq!(merged.find("A.Bar").unwrap().name(), "A.Bar");
        assert!(merged.find("A.Baz").is_none());
    }

    #[test]
    fn test_merge_collision_reports_first_in_order() {
        let g1 = group_of(&["A.Foo", "B.Two"]);
        let g2 = group_of(&["A.Bar", "B.Two", "C.Three"]);
        let g3 = group_of(&["A.Foo"]);
        let err = merge(&[&g1, &g2, &g3]).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateEntry(ref n) if n == "B.Two"));
    }

    #[test]
    fn test_append_find_skips_unknown() {
        let group = group_of(&["A.Foo", "A.Bar"]);
        let mut entries = Vec::new();
        append_find(&mut entries, &group, &["A.Foo", "A.Missing", "A.Bar"]);
        let names: Vec<_> = entries.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["A.Foo", "A.Bar"]);
    }
}
