//! Write-through proxies addressing slots inside a durable unit.
//!
//! A [`Proxy`] is a path into one top-level unit: descend with
//! [`Proxy::child`] and [`Proxy::at`], read with [`Proxy::value`], and
//! mutate with the `set_*`/`push`/`remove_*` operations. Every mutation
//! rewrites the whole owning unit durably before returning, so sub-tree
//! writes are never persisted alone.
//!
//! Proxies carry no data and no identity: two proxies over the same path
//! are interchangeable, and comparing what they address is value
//! equality on snapshots.

use std::fmt::Write as _;

use midway_types::{Value, ValueMap};

use crate::error::StoreError;
use crate::store::Store;

/// One step of a proxy path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Descend into a map by key.
    Key(String),
    /// Descend into a list by position.
    Index(usize),
}

/// A write-through handle bound to a slot inside one durable unit.
#[derive(Debug, Clone)]
pub struct Proxy {
    store: Store,
    root: String,
    path: Vec<Segment>,
}

impl Proxy {
    pub(crate) fn new(store: Store, root: &str) -> Self {
        Self {
            store,
            root: root.to_owned(),
            path: Vec::new(),
        }
    }

    /// The top-level key this proxy's unit lives under.
    pub fn root_key(&self) -> &str {
        &self.root
    }

    /// The path from the unit root to the addressed slot.
    pub fn path(&self) -> &[Segment] {
        &self.path
    }

    /// Descend into a map entry.
    #[must_use]
    pub fn child(mut self, name: impl Into<String>) -> Self {
        self.path.push(Segment::Key(name.into()));
        self
    }

    /// Descend into a list element.
    #[must_use]
    pub fn at(mut self, index: usize) -> Self {
        self.path.push(Segment::Index(index));
        self
    }

    /// Snapshot of the addressed slot, or `None` when the unit or any
    /// step of the path is absent.
    pub fn value(&self) -> Option<Value> {
        let unit = self.store.read_unit(&self.root)?;
        descend(&self.root, &unit, &self.path).ok().cloned()
    }

    /// True when the addressed slot currently exists.
    pub fn exists(&self) -> bool {
        self.value().is_some()
    }

    /// Length of the addressed list or map, or `None` for other shapes.
    pub fn len(&self) -> Option<usize> {
        match self.value()? {
            Value::List(items) => Some(items.len()),
            Value::Map(map) => Some(map.len()),
            _ => None,
        }
    }

    /// True when the addressed container exists and is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Replace the addressed slot with `value`.
    ///
    /// With an empty path this replaces the whole unit, creating it if
    /// absent.
    ///
    /// # Errors
    ///
    /// Path navigation errors, [`StoreError::NonFinite`] for invalid
    /// numbers, [`StoreError::Io`] for failed persists. On error the
    /// store is unchanged.
    pub fn set(&self, value: Value) -> Result<(), StoreError> {
        let (root, path) = (self.root.clone(), self.path.clone());
        self.store.mutate(&self.root, Value::Null, move |unit| {
            let slot = descend_mut(&root, unit, &path)?;
            *slot = value;
            Ok(())
        })
    }

    /// Insert or replace `name` in the addressed map.
    ///
    /// An absent unit materializes as an empty map first (root path
    /// only); anywhere else the addressed slot must already be a map.
    ///
    /// # Errors
    ///
    /// As for [`Proxy::set`], plus [`StoreError::TypeMismatch`] when
    /// the slot is not a map.
    pub fn set_key(&self, name: &str, value: Value) -> Result<(), StoreError> {
        let (root, path) = (self.root.clone(), self.path.clone());
        let name = name.to_owned();
        self.store.mutate(&self.root, seed_map(), move |unit| {
            let map = require_map(&root, unit, &path)?;
            map.insert(name, value);
            Ok(())
        })
    }

    /// Remove `name` from the addressed map, returning the removed
    /// value if it was present.
    ///
    /// # Errors
    ///
    /// As for [`Proxy::set_key`].
    pub fn remove_key(&self, name: &str) -> Result<Option<Value>, StoreError> {
        let (root, path) = (self.root.clone(), self.path.clone());
        let name = name.to_owned();
        self.store.mutate(&self.root, seed_map(), move |unit| {
            let map = require_map(&root, unit, &path)?;
            Ok(map.remove(&name))
        })
    }

    /// Append `value` to the addressed list.
    ///
    /// An absent unit materializes as an empty list first (root path
    /// only).
    ///
    /// # Errors
    ///
    /// As for [`Proxy::set`], plus [`StoreError::TypeMismatch`] when
    /// the slot is not a list.
    pub fn push(&self, value: Value) -> Result<(), StoreError> {
        let (root, path) = (self.root.clone(), self.path.clone());
        self.store.mutate(&self.root, seed_list(), move |unit| {
            let list = require_list(&root, unit, &path)?;
            list.push(value);
            Ok(())
        })
    }

    /// Replace the element at `index` in the addressed list.
    ///
    /// # Errors
    ///
    /// As for [`Proxy::push`], plus [`StoreError::IndexOutOfBounds`]
    /// when `index` is past the end.
    pub fn set_index(&self, index: usize, value: Value) -> Result<(), StoreError> {
        let (root, path) = (self.root.clone(), self.path.clone());
        self.store.mutate(&self.root, seed_list(), move |unit| {
            let list = require_list(&root, unit, &path)?;
            let len = list.len();
            let Some(slot) = list.get_mut(index) else {
                return Err(StoreError::IndexOutOfBounds {
                    key: root,
                    path: describe(&path),
                    index,
                    len,
                });
            };
            *slot = value;
            Ok(())
        })
    }

    /// Remove and return the element at `index` in the addressed list.
    ///
    /// # Errors
    ///
    /// As for [`Proxy::set_index`].
    pub fn remove_index(&self, index: usize) -> Result<Value, StoreError> {
        let (root, path) = (self.root.clone(), self.path.clone());
        self.store.mutate(&self.root, seed_list(), move |unit| {
            let list = require_list(&root, unit, &path)?;
            if index >= list.len() {
                return Err(StoreError::IndexOutOfBounds {
                    key: root,
                    path: describe(&path),
                    index,
                    len: list.len(),
                });
            }
            Ok(list.remove(index))
        })
    }
}

fn seed_map() -> Value {
    Value::Map(ValueMap::new())
}

fn seed_list() -> Value {
    Value::List(Vec::new())
}

/// Dotted-and-bracketed rendering of a path for error messages.
fn describe(path: &[Segment]) -> String {
    if path.is_empty() {
        return "(root)".to_owned();
    }
    let mut out = String::new();
    for segment in path {
        match segment {
            Segment::Key(key) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(key);
            }
            Segment::Index(index) => {
                let _ = write!(out, "[{index}]");
            }
        }
    }
    out
}

fn describe_prefix(path: &[Segment], depth: usize) -> String {
    path.get(..=depth).map_or_else(|| describe(path), describe)
}

fn descend<'a>(root: &str, unit: &'a Value, path: &[Segment]) -> Result<&'a Value, StoreError> {
    let mut node = unit;
    for (depth, segment) in path.iter().enumerate() {
        node = match segment {
            Segment::Key(key) => {
                let map = node.as_map().ok_or_else(|| StoreError::TypeMismatch {
                    key: root.to_owned(),
                    path: describe_prefix(path, depth),
                    expected: "map",
                    found: node.type_name(),
                })?;
                map.get(key).ok_or_else(|| StoreError::PathUnavailable {
                    key: root.to_owned(),
                    path: describe_prefix(path, depth),
                })?
            }
            Segment::Index(index) => {
                let list = node.as_list().ok_or_else(|| StoreError::TypeMismatch {
                    key: root.to_owned(),
                    path: describe_prefix(path, depth),
                    expected: "list",
                    found: node.type_name(),
                })?;
                list.get(*index)
                    .ok_or_else(|| StoreError::IndexOutOfBounds {
                        key: root.to_owned(),
                        path: describe_prefix(path, depth),
                        index: *index,
                        len: list.len(),
                    })?
            }
        };
    }
    Ok(node)
}

fn descend_mut<'a>(
    root: &str,
    unit: &'a mut Value,
    path: &[Segment],
) -> Result<&'a mut Value, StoreError> {
    let mut node = unit;
    for (depth, segment) in path.iter().enumerate() {
        let found = node.type_name();
        node = match segment {
            Segment::Key(key) => {
                let map = node.as_map_mut().ok_or_else(|| StoreError::TypeMismatch {
                    key: root.to_owned(),
                    path: describe_prefix(path, depth),
                    expected: "map",
                    found,
                })?;
                map.get_mut(key).ok_or_else(|| StoreError::PathUnavailable {
                    key: root.to_owned(),
                    path: describe_prefix(path, depth),
                })?
            }
            Segment::Index(index) => {
                let list = node.as_list_mut().ok_or_else(|| StoreError::TypeMismatch {
                    key: root.to_owned(),
                    path: describe_prefix(path, depth),
                    expected: "list",
                    found,
                })?;
                let len = list.len();
                list.get_mut(*index)
                    .ok_or_else(|| StoreError::IndexOutOfBounds {
                        key: root.to_owned(),
                        path: describe_prefix(path, depth),
                        index: *index,
                        len,
                    })?
            }
        };
    }
    Ok(node)
}

fn require_map<'a>(
    root: &str,
    unit: &'a mut Value,
    path: &[Segment],
) -> Result<&'a mut ValueMap, StoreError> {
    let node = descend_mut(root, unit, path)?;
    let found = node.type_name();
    node.as_map_mut().ok_or_else(|| StoreError::TypeMismatch {
        key: root.to_owned(),
        path: describe(path),
        expected: "map",
        found,
    })
}

fn require_list<'a>(
    root: &str,
    unit: &'a mut Value,
    path: &[Segment],
) -> Result<&'a mut Vec<Value>, StoreError> {
    let node = descend_mut(root, unit, path)?;
    let found = node.type_name();
    node.as_list_mut().ok_or_else(|| StoreError::TypeMismatch {
        key: root.to_owned(),
        path: describe(path),
        expected: "list",
        found,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;

    fn temp_dir(prefix: &str) -> PathBuf {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("duration")
            .as_nanos();
        std::env::temp_dir().join(format!("midway-proxy-tests-{prefix}-{unique}"))
    }

    fn open_store(prefix: &str) -> (Store, PathBuf) {
        let dir = temp_dir(prefix);
        (Store::open(&dir).unwrap(), dir)
    }

    #[test]
    fn first_key_write_materializes_the_unit() {
        let (store, dir) = open_store("materialize");
        store
            .proxy("profile")
            .set_key("name", Value::from("ada"))
            .unwrap();

        let mut expected = ValueMap::new();
        expected.insert("name".to_owned(), Value::from("ada"));
        assert_eq!(store.get("profile"), Some(Value::Map(expected)));
        assert!(dir.join("profile.json").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn nested_mutation_rewrites_the_owning_unit() {
        let (store, dir) = open_store("nested");
        let proxy = store.proxy("hunt");
        proxy.set_key("steps", Value::List(Vec::new())).unwrap();
        let steps = proxy.clone().child("steps");
        steps.push(Value::from("find the organ")).unwrap();
        steps.push(Value::from("count the mirrors")).unwrap();

        let on_disk = std::fs::read_to_string(dir.join("hunt.json")).unwrap();
        let parsed: Value = serde_json::from_str(&on_disk).unwrap();
        let steps_on_disk = parsed
            .as_map()
            .and_then(|m| m.get("steps"))
            .and_then(Value::as_list)
            .unwrap();
        assert_eq!(steps_on_disk.len(), 2);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn value_is_a_snapshot_not_a_live_view() {
        let (store, dir) = open_store("snapshot");
        let proxy = store.proxy("counts");
        proxy.set_key("n", Value::Int(1)).unwrap();

        let before = proxy.value().unwrap();
        proxy.set_key("n", Value::Int(2)).unwrap();
        assert_eq!(
            before.as_map().and_then(|m| m.get("n")),
            Some(&Value::Int(1))
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_path_segment_is_reported() {
        let (store, dir) = open_store("missing");
        store.proxy("unit").set_key("a", Value::Int(1)).unwrap();

        let err = store
            .proxy("unit")
            .child("absent")
            .set_key("x", Value::Int(1))
            .unwrap_err();
        assert!(matches!(err, StoreError::PathUnavailable { .. }));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn wrong_container_shape_is_reported() {
        let (store, dir) = open_store("shape");
        store.proxy("unit").set_key("n", Value::Int(3)).unwrap();

        let err = store
            .proxy("unit")
            .child("n")
            .push(Value::Int(1))
            .unwrap_err();
        match err {
            StoreError::TypeMismatch {
                expected, found, ..
            } => {
                assert_eq!(expected, "list");
                assert_eq!(found, "int");
            }
            other => panic!("unexpected error: {other}"),
        }

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn list_edits_honor_bounds() {
        let (store, dir) = open_store("bounds");
        let items = store.proxy("items");
        items.push(Value::Int(10)).unwrap();
        items.push(Value::Int(20)).unwrap();

        items.set_index(1, Value::Int(25)).unwrap();
        assert_eq!(items.len(), Some(2));

        let err = items.set_index(5, Value::Int(0)).unwrap_err();
        assert!(matches!(
            err,
            StoreError::IndexOutOfBounds { index: 5, len: 2, .. }
        ));

        let removed = items.remove_index(0).unwrap();
        assert_eq!(removed, Value::Int(10));
        assert_eq!(items.value(), Some(Value::List(vec![Value::Int(25)])));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn failed_path_write_leaves_the_unit_unchanged() {
        let (store, dir) = open_store("unchanged");
        let proxy = store.proxy("unit");
        proxy.set_key("a", Value::Int(1)).unwrap();
        let before = store.get("unit");

        let err = proxy
            .clone()
            .child("a")
            .set_key("x", Value::Int(2))
            .unwrap_err();
        assert!(matches!(err, StoreError::TypeMismatch { .. }));
        assert_eq!(store.get("unit"), before);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn paths_render_readably_in_errors() {
        let (store, dir) = open_store("render");
        let proxy = store.proxy("unit");
        proxy.set_key("steps", Value::List(vec![Value::Int(1)])).unwrap();

        let err = proxy
            .clone()
            .child("steps")
            .at(0)
            .child("deep")
            .set(Value::Int(9))
            .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("steps[0]"), "error text: {text}");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
