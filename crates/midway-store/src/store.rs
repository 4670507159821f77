//! The durable store: one JSON file per top-level key.
//!
//! The store keeps an authoritative in-memory image of every unit and
//! rewrites the owning unit's file before any mutating call returns.
//! Mutations operate on a working copy, so a failed write (invalid value,
//! I/O error) leaves both memory and disk untouched.
//!
//! Unit files are written atomically: serialize to `<key>.json.tmp`, then
//! rename over `<key>.json`. The write lock is held across the file write
//! on purpose -- it is what makes [`Store::update`] a lost-update-free
//! read-modify-write.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use midway_types::Value;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::proxy::Proxy;

/// File suffix of a durable unit.
const UNIT_SUFFIX: &str = ".json";

/// File suffix of the scratch file a unit is staged in before rename.
const TMP_SUFFIX: &str = ".json.tmp";

#[derive(Debug)]
struct Inner {
    dir: PathBuf,
    units: RwLock<BTreeMap<String, Value>>,
}

/// Handle to the durable store. Cheap to clone; all clones share the
/// same in-memory image and data directory.
#[derive(Debug, Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

impl Store {
    /// Open the store rooted at `dir`, creating the directory if needed
    /// and loading every durable unit found there.
    ///
    /// A unit that cannot be read or parsed is logged and skipped; its
    /// file is left on disk untouched so nothing is destroyed by a bad
    /// deploy. A later write to the same key replaces it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the directory cannot be created
    /// or listed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut units = BTreeMap::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let Some(key) = unit_key_of(&path) else {
                continue;
            };
            if validate_key(&key).is_err() {
                warn!(unit = %path.display(), "Skipping unit with unusable key");
                continue;
            }
            match fs::read_to_string(&path) {
                Ok(text) => match serde_json::from_str::<Value>(&text) {
                    Ok(value) => {
                        units.insert(key, value);
                    }
                    Err(error) => {
                        warn!(unit = %path.display(), %error, "Skipping corrupt unit");
                    }
                },
                Err(error) => {
                    warn!(unit = %path.display(), %error, "Skipping unreadable unit");
                }
            }
        }

        debug!(dir = %dir.display(), units = units.len(), "Store opened");
        Ok(Self {
            inner: Arc::new(Inner {
                dir,
                units: RwLock::new(units),
            }),
        })
    }

    /// The data directory this store persists into.
    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    /// All top-level keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.read_units().keys().cloned().collect()
    }

    /// Number of durable units.
    pub fn len(&self) -> usize {
        self.read_units().len()
    }

    /// True when the store holds no units.
    pub fn is_empty(&self) -> bool {
        self.read_units().is_empty()
    }

    /// Snapshot of the value under `key`, or `None` when absent.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.read_units().get(key).cloned()
    }

    /// Replace the value under `key` and persist it.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidKey`] for unusable keys,
    /// [`StoreError::NonFinite`] when the value carries `NaN` or an
    /// infinity, [`StoreError::Io`] when the unit cannot be written. On
    /// any error neither memory nor disk changes.
    pub fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.mutate(key, Value::Null, move |slot| {
            *slot = value;
            Ok(())
        })
    }

    /// Atomic read-modify-write of one unit.
    ///
    /// The closure receives the current value (inserted as
    /// [`Value::Null`] when the key is new), and the mutated tree is
    /// validated and persisted before the store lock is released.
    /// Concurrent `update` calls to the same key serialize; none of
    /// their effects are lost.
    ///
    /// # Errors
    ///
    /// As for [`Store::set`].
    pub fn update<T>(
        &self,
        key: &str,
        mutate: impl FnOnce(&mut Value) -> T,
    ) -> Result<T, StoreError> {
        self.mutate(key, Value::Null, move |slot| Ok(mutate(slot)))
    }

    /// Remove the unit under `key`, deleting its file.
    ///
    /// Returns the removed value, or `None` when the key was absent.
    ///
    /// # Errors
    ///
    /// [`StoreError::Io`] when the unit file exists but cannot be
    /// removed.
    pub fn remove(&self, key: &str) -> Result<Option<Value>, StoreError> {
        validate_key(key)?;
        let mut units = self.write_units();
        let removed = units.remove(key);
        if removed.is_some() {
            remove_unit_file(&self.inner.dir, key)?;
        }
        Ok(removed)
    }

    /// Deserialize the unit under `key` into a typed value.
    ///
    /// # Errors
    ///
    /// [`StoreError::Serialization`] when the stored tree does not match
    /// the expected shape.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => {
                let decoded = serde_json::from_value(serde_json::Value::from(value))?;
                Ok(Some(decoded))
            }
        }
    }

    /// Serialize a typed value into the unit under `key` and persist it.
    ///
    /// # Errors
    ///
    /// As for [`Store::set`], plus [`StoreError::Serialization`] when
    /// the value cannot be represented as JSON.
    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let encoded = Value::from(serde_json::to_value(value)?);
        self.set(key, encoded)
    }

    /// Write-through handle rooted at `key`.
    pub fn proxy(&self, key: &str) -> Proxy {
        Proxy::new(self.clone(), key)
    }

    /// Snapshot every unit into `dir` (created if needed), one file per
    /// unit, written atomically. Returns the number of units exported.
    ///
    /// # Errors
    ///
    /// [`StoreError::Io`] when the target directory or a unit file
    /// cannot be written.
    pub fn export(&self, dir: impl AsRef<Path>) -> Result<usize, StoreError> {
        let snapshot = self.read_units().clone();
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        for (key, value) in &snapshot {
            persist_unit(dir, key, value)?;
        }
        debug!(dir = %dir.display(), units = snapshot.len(), "Store exported");
        Ok(snapshot.len())
    }

    /// Administrative reset: drop every unit and delete its file.
    ///
    /// # Errors
    ///
    /// [`StoreError::Io`] when a unit file cannot be removed; units
    /// already dropped stay dropped.
    pub fn clear(&self) -> Result<(), StoreError> {
        let mut units = self.write_units();
        let keys: Vec<String> = units.keys().cloned().collect();
        for key in &keys {
            remove_unit_file(&self.inner.dir, key)?;
            units.remove(key);
        }
        Ok(())
    }

    /// Clone-mutate-validate-persist-commit under the write lock.
    ///
    /// `seed` is the working value used when the key does not exist yet.
    pub(crate) fn mutate<T>(
        &self,
        key: &str,
        seed: Value,
        op: impl FnOnce(&mut Value) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        validate_key(key)?;
        let mut units = self.write_units();
        let mut working = units.get(key).cloned().unwrap_or(seed);
        let out = op(&mut working)?;
        if !working.is_finite() {
            return Err(StoreError::NonFinite {
                key: key.to_owned(),
            });
        }
        persist_unit(&self.inner.dir, key, &working)?;
        units.insert(key.to_owned(), working);
        Ok(out)
    }

    /// Read a unit without taking the write lock.
    pub(crate) fn read_unit(&self, key: &str) -> Option<Value> {
        self.read_units().get(key).cloned()
    }

    fn read_units(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, Value>> {
        self.inner
            .units
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_units(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, Value>> {
        self.inner
            .units
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Extract the unit key from a directory entry, ignoring anything that
/// is not a `*.json` file (notably `*.json.tmp` staging leftovers).
fn unit_key_of(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let key = name.strip_suffix(UNIT_SUFFIX)?;
    if key.is_empty() {
        return None;
    }
    Some(key.to_owned())
}

/// Keys double as file names, so the alphabet is restricted and the
/// first character may not be a dot (which also rules out `.` and
/// `..` path escapes).
fn validate_key(key: &str) -> Result<(), StoreError> {
    let valid_start = key
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
    let valid_rest = key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if valid_start && valid_rest {
        Ok(())
    } else {
        Err(StoreError::InvalidKey {
            key: key.to_owned(),
        })
    }
}

/// Serialize `value` to `<dir>/<key>.json.tmp`, then rename it over
/// `<dir>/<key>.json` so readers never observe a half-written unit.
fn persist_unit(dir: &Path, key: &str, value: &Value) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = dir.join(format!("{key}{TMP_SUFFIX}"));
    let path = dir.join(format!("{key}{UNIT_SUFFIX}"));
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, &path)?;
    Ok(())
}

fn remove_unit_file(dir: &Path, key: &str) -> Result<(), StoreError> {
    let path = dir.join(format!("{key}{UNIT_SUFFIX}"));
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(StoreError::Io(error)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use midway_types::ValueMap;
    use serde::Deserialize;

    use super::*;

    fn temp_dir(prefix: &str) -> PathBuf {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("duration")
            .as_nanos();
        std::env::temp_dir().join(format!("midway-store-tests-{prefix}-{unique}"))
    }

    fn sample_map() -> Value {
        let mut map = ValueMap::new();
        map.insert("pot".to_owned(), Value::Int(250));
        map.insert("open".to_owned(), Value::Bool(true));
        Value::Map(map)
    }

    #[test]
    fn set_persists_before_returning() {
        let dir = temp_dir("set");
        let store = Store::open(&dir).unwrap();
        store.set("raffle", sample_map()).unwrap();

        let on_disk = fs::read_to_string(dir.join("raffle.json")).unwrap();
        let parsed: Value = serde_json::from_str(&on_disk).unwrap();
        assert_eq!(parsed, sample_map());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn reopen_loads_existing_units() {
        let dir = temp_dir("reopen");
        {
            let store = Store::open(&dir).unwrap();
            store.set("balances", sample_map()).unwrap();
        }
        let store = Store::open(&dir).unwrap();
        assert_eq!(store.get("balances"), Some(sample_map()));
        assert_eq!(store.keys(), vec!["balances".to_owned()]);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn absent_key_reads_none() {
        let dir = temp_dir("absent");
        let store = Store::open(&dir).unwrap();
        assert!(store.get("missing").is_none());
        assert!(store.is_empty());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn non_finite_write_leaves_memory_and_disk_untouched() {
        let dir = temp_dir("nonfinite");
        let store = Store::open(&dir).unwrap();
        store.set("stats", sample_map()).unwrap();

        let mut bad = ValueMap::new();
        bad.insert(
            "nested".to_owned(),
            Value::List(vec![Value::Float(f64::NAN)]),
        );
        let err = store.set("stats", Value::Map(bad)).unwrap_err();
        assert!(matches!(err, StoreError::NonFinite { .. }));

        assert_eq!(store.get("stats"), Some(sample_map()));
        let on_disk = fs::read_to_string(dir.join("stats.json")).unwrap();
        let parsed: Value = serde_json::from_str(&on_disk).unwrap();
        assert_eq!(parsed, sample_map());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn update_seeds_new_keys_with_null() {
        let dir = temp_dir("update");
        let store = Store::open(&dir).unwrap();

        let seen = store
            .update("counter", |value| {
                let next = value.as_int().unwrap_or(0).saturating_add(1);
                *value = Value::Int(next);
                next
            })
            .unwrap();
        assert_eq!(seen, 1);

        let seen = store
            .update("counter", |value| {
                let next = value.as_int().unwrap_or(0).saturating_add(1);
                *value = Value::Int(next);
                next
            })
            .unwrap();
        assert_eq!(seen, 2);
        assert_eq!(store.get("counter"), Some(Value::Int(2)));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn remove_deletes_the_unit_file() {
        let dir = temp_dir("remove");
        let store = Store::open(&dir).unwrap();
        store.set("gone", Value::Int(1)).unwrap();
        assert!(dir.join("gone.json").exists());

        let removed = store.remove("gone").unwrap();
        assert_eq!(removed, Some(Value::Int(1)));
        assert!(!dir.join("gone.json").exists());
        assert!(store.get("gone").is_none());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn invalid_keys_are_rejected() {
        let dir = temp_dir("invalid");
        let store = Store::open(&dir).unwrap();
        for key in ["", "..", "../escape", "has space", ".hidden"] {
            let err = store.set(key, Value::Int(1)).unwrap_err();
            assert!(matches!(err, StoreError::InvalidKey { .. }), "key {key:?}");
        }

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn open_skips_corrupt_units_without_deleting_them() {
        let dir = temp_dir("corrupt");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("bad.json"), b"{not json").unwrap();
        fs::write(dir.join("good.json"), b"{\"a\": 1}").unwrap();

        let store = Store::open(&dir).unwrap();
        assert_eq!(store.keys(), vec!["good".to_owned()]);
        assert!(dir.join("bad.json").exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn export_snapshots_every_unit() {
        let dir = temp_dir("export-src");
        let out = temp_dir("export-dst");
        let store = Store::open(&dir).unwrap();
        store.set("a", Value::Int(1)).unwrap();
        store.set("b", sample_map()).unwrap();

        let count = store.export(&out).unwrap();
        assert_eq!(count, 2);
        let copied: Value =
            serde_json::from_str(&fs::read_to_string(out.join("b.json")).unwrap()).unwrap();
        assert_eq!(copied, sample_map());

        let _ = fs::remove_dir_all(&dir);
        let _ = fs::remove_dir_all(&out);
    }

    #[test]
    fn clear_removes_units_and_files() {
        let dir = temp_dir("clear");
        let store = Store::open(&dir).unwrap();
        store.set("a", Value::Int(1)).unwrap();
        store.set("b", Value::Int(2)).unwrap();

        store.clear().unwrap();
        assert!(store.is_empty());
        assert!(!dir.join("a.json").exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn typed_load_and_save_round_trip() {
        #[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
        struct Settings {
            volume: i64,
            label: String,
        }

        let dir = temp_dir("typed");
        let store = Store::open(&dir).unwrap();
        let settings = Settings {
            volume: 7,
            label: "fair".to_owned(),
        };
        store.save("settings", &settings).unwrap();

        let back: Settings = store.load("settings").unwrap().unwrap();
        assert_eq!(back, settings);
        let missing: Option<Settings> = store.load("absent").unwrap();
        assert!(missing.is_none());

        let _ = fs::remove_dir_all(&dir);
    }
}
