//! Plain-file record store.
//!
//! Layout under `<workdir>/store/`:
//!
//! ```text
//! opbot.todo.Todo/2026-10-14/09:31:07.120034567
//! opbot.todo.Todo/2026-10-14/09:31:07.120034568
//! opbot.todo.Todo/2026-10-14/09:31:07.120034568-1   (another process won the name)
//! ```
//!
//! The first segment is the record kind, the rest the creation instant with
//! nanosecond precision, so paths sort by time within a kind. Stamps handed out
//! by one store are strictly increasing. Files are written to a temp file in
//! the target directory and renamed into place.

use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use tracing::{debug, info};

use crate::codec;
use crate::error::StoreError;
use crate::object::{Object, Value};
use crate::registry::Registry;

const STAMP_FORMAT: &str = "%Y-%m-%d/%H:%M:%S%.9f";
const STAMP_PARSE: &str = "%Y-%m-%d/%H:%M:%S%.f";

/// Where [`Store::load`] reads encoded text from.
#[derive(Debug, Clone, Copy)]
pub enum Source<'a> {
    /// Path relative to the store root, as returned by `save`.
    Path(&'a str),
    /// Encoded text held in memory, decoded as the target's kind.
    Payload(&'a str),
}

/// Half-open `[since, until)` filter on creation time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn since(t: DateTime<Utc>) -> Self {
        Self { since: Some(t), until: None }
    }

    pub fn until(t: DateTime<Utc>) -> Self {
        Self { since: None, until: Some(t) }
    }

    pub fn between(since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        Self { since: Some(since), until: Some(until) }
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.since.map_or(true, |s| t >= s) && self.until.map_or(true, |u| t < u)
    }
}

pub struct Store {
    root: PathBuf,
    registry: Arc<Registry>,
    last_stamp: Mutex<Option<DateTime<Utc>>>,
}

impl Store {
    /// Store rooted at `<workdir>/store`. Nothing is created until the first save.
    pub fn new(workdir: &Path, registry: Arc<Registry>) -> Self {
        Self {
            root: workdir.join("store"),
            registry,
            last_stamp: Mutex::new(None),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Allocate a fresh relative path for `obj`. Every call yields a new path.
    pub fn path_for(&self, obj: &Object) -> String {
        format!("{}/{}", obj.kind(), self.next_stamp().format(STAMP_FORMAT))
    }

    fn next_stamp(&self) -> DateTime<Utc> {
        let mut last = self.last_stamp.lock().unwrap_or_else(PoisonError::into_inner);
        let mut now = Utc::now();
        if let Some(prev) = *last {
            if now <= prev {
                now = prev + Duration::nanoseconds(1);
            }
        }
        *last = Some(now);
        now
    }

    /// Persist `obj`. A record that already has an origin path is rewritten in
    /// place; otherwise a new path is allocated and recorded on the record.
    pub fn save(&self, obj: &mut Object) -> Result<String, StoreError> {
        if obj.kind().is_empty() || obj.kind().contains('/') {
            return Err(StoreError::BadPath(obj.kind().to_string()));
        }
        let text = codec::encode(obj)?;
        let path = match obj.origin() {
            Some(existing) => {
                let existing = existing.to_string();
                self.write(&existing, &text)?;
                existing
            }
            None => {
                let base = self.path_for(obj);
                self.write_new(&base, &text)?
            }
        };
        info!(kind = %obj.kind(), path = %path, "saved record");
        obj.set_origin(&path);
        Ok(path)
    }

    /// Set a field and persist the record.
    pub fn register(
        &self,
        obj: &mut Object,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<String, StoreError> {
        obj.set(key, value);
        self.save(obj)
    }

    /// Decode stored or in-memory text and copy its fields into `target`.
    pub fn load(&self, target: &mut Object, source: Source<'_>) -> Result<(), StoreError> {
        match source {
            Source::Path(path) => {
                let obj = self.read(path)?;
                target.update(&obj);
                target.set_origin(path);
            }
            Source::Payload(text) => {
                let obj = codec::decode(&self.registry, target.kind(), text).map_err(|source| {
                    StoreError::Decode {
                        path: "<payload>".to_string(),
                        source,
                    }
                })?;
                target.update(&obj);
            }
        }
        Ok(())
    }

    /// Decode the file at `path` into a fresh record of the path's kind.
    pub fn read(&self, path: &str) -> Result<Object, StoreError> {
        read_record(&self.root, &self.registry, path)
    }

    /// Stored records whose kind matches `name`, oldest first.
    ///
    /// `name` matches a kind exactly, as a prefix of it, or as its last
    /// dotted segment ignoring case (`todo` matches `opbot.todo.Todo`). The
    /// result is a snapshot of the directory at call time; records are decoded
    /// lazily while iterating.
    pub fn find(&self, name: &str, range: Option<TimeRange>) -> Result<Query, StoreError> {
        let mut hits = Vec::new();
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(name = %name, "store is empty");
                return Ok(Query::new(self, hits));
            }
            Err(e) => return Err(StoreError::io(self.root.display().to_string(), e)),
        };

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(self.root.display().to_string(), e))?;
            let kind = entry.file_name().to_string_lossy().into_owned();
            if kind.starts_with('.') || !entry.path().is_dir() || !matches_kind(&kind, name) {
                continue;
            }
            collect(&entry.path(), &kind, &mut paths)?;
        }

        for path in paths {
            let Some(stamp) = fntime(&path) else {
                continue;
            };
            if range.map_or(true, |r| r.contains(stamp)) {
                hits.push(Hit { path, stamp });
            }
        }
        hits.sort_by(|a, b| a.stamp.cmp(&b.stamp).then_with(|| a.path.cmp(&b.path)));
        debug!(name = %name, count = hits.len(), "find");
        Ok(Query::new(self, hits))
    }

    /// Most recently created record matching `name`.
    pub fn last(&self, name: &str) -> Result<Option<Object>, StoreError> {
        let query = self.find(name, None)?;
        match query.hits.last() {
            Some(hit) => self.read(&hit.path).map(Some),
            None => Ok(None),
        }
    }

    fn write(&self, rel: &str, text: &str) -> Result<(), StoreError> {
        let tmp = self.stage(rel, text)?;
        tmp.persist(self.root.join(rel))
            .map_err(|e| StoreError::io(rel, e.error))?;
        Ok(())
    }

    /// Write under `base`, adding `-N` while the name is taken.
    fn write_new(&self, base: &str, text: &str) -> Result<String, StoreError> {
        let mut tmp = self.stage(base, text)?;
        let mut candidate = base.to_string();
        for n in 1u32.. {
            match tmp.persist_noclobber(self.root.join(&candidate)) {
                Ok(_) => return Ok(candidate),
                Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                    tmp = e.file;
                    candidate = format!("{}-{}", base, n);
                }
                Err(e) => return Err(StoreError::io(candidate, e.error)),
            }
        }
        Err(StoreError::BadPath(base.to_string()))
    }

    fn stage(&self, rel: &str, text: &str) -> Result<tempfile::NamedTempFile, StoreError> {
        check_relative(rel)?;
        let full = self.root.join(rel);
        let dir = full
            .parent()
            .ok_or_else(|| StoreError::BadPath(rel.to_string()))?;
        fs::create_dir_all(dir).map_err(|e| StoreError::io(rel, e))?;
        let mut tmp = tempfile::Builder::new()
            .prefix(".tmp")
            .tempfile_in(dir)
            .map_err(|e| StoreError::io(rel, e))?;
        tmp.write_all(text.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| StoreError::io(rel, e))?;
        Ok(tmp)
    }
}

#[derive(Debug, Clone)]
struct Hit {
    path: String,
    stamp: DateTime<Utc>,
}

/// Snapshot result of [`Store::find`]. Iterate as often as needed.
pub struct Query {
    root: PathBuf,
    registry: Arc<Registry>,
    hits: Vec<Hit>,
}

impl Query {
    fn new(store: &Store, hits: Vec<Hit>) -> Self {
        Self {
            root: store.root.clone(),
            registry: Arc::clone(&store.registry),
            hits,
        }
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.hits.iter().map(|h| h.path.as_str())
    }

    pub fn iter(&self) -> QueryIter<'_> {
        QueryIter { query: self, next: 0 }
    }
}

impl<'a> IntoIterator for &'a Query {
    type Item = Result<Object, StoreError>;
    type IntoIter = QueryIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct QueryIter<'a> {
    query: &'a Query,
    next: usize,
}

impl Iterator for QueryIter<'_> {
    type Item = Result<Object, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        let hit = self.query.hits.get(self.next)?;
        self.next += 1;
        Some(read_record(&self.query.root, &self.query.registry, &hit.path))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.query.hits.len() - self.next;
        (left, Some(left))
    }
}

fn read_record(root: &Path, registry: &Registry, path: &str) -> Result<Object, StoreError> {
    check_relative(path)?;
    let kind = path
        .split('/')
        .next()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| StoreError::BadPath(path.to_string()))?;
    let text = fs::read_to_string(root.join(path)).map_err(|e| StoreError::io(path, e))?;
    let mut obj = codec::decode(registry, kind, &text).map_err(|source| StoreError::Decode {
        path: path.to_string(),
        source,
    })?;
    obj.set_origin(path);
    debug!(kind = %kind, path = %path, "loaded record");
    Ok(obj)
}

fn check_relative(path: &str) -> Result<(), StoreError> {
    let ok = !path.is_empty()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if ok {
        Ok(())
    } else {
        Err(StoreError::BadPath(path.to_string()))
    }
}

fn collect(dir: &Path, prefix: &str, out: &mut Vec<String>) -> Result<(), StoreError> {
    let entries = fs::read_dir(dir).map_err(|e| StoreError::io(prefix, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io(prefix, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let rel = format!("{}/{}", prefix, name);
        if entry.path().is_dir() {
            collect(&entry.path(), &rel, out)?;
        } else {
            out.push(rel);
        }
    }
    Ok(())
}

fn matches_kind(kind: &str, name: &str) -> bool {
    kind.starts_with(name)
        || kind
            .rsplit('.')
            .next()
            .map_or(false, |short| short.eq_ignore_ascii_case(name))
}

/// Creation instant encoded in a store path.
pub fn fntime(path: &str) -> Option<DateTime<Utc>> {
    let mut parts = path.rsplitn(3, '/');
    let time = parts.next()?;
    let date = parts.next()?;
    parts.next()?;
    let time = time.split('-').next()?;
    let naive = NaiveDateTime::parse_from_str(&format!("{}/{}", date, time), STAMP_PARSE).ok()?;
    Some(Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::tempdir;

    fn store_in(dir: &Path) -> Store {
        let registry = Arc::new(Registry::new());
        registry.add(|| {
            let mut obj = Object::with_kind("test.Todo");
            obj.set("txt", "");
            obj
        });
        Store::new(dir, registry)
    }

    fn todo(txt: &str) -> Object {
        let mut obj = Object::with_kind("test.Todo");
        obj.set("txt", txt);
        obj
    }

    #[test]
    fn test_save_creates_file() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let mut obj = Object::new();
        let path = store.save(&mut obj).unwrap();
        assert!(dir.path().join("store").join(&path).exists());
        assert_eq!(obj.origin(), Some(path.as_str()));
        assert!(path.starts_with("opbot.object.Object/"));
    }

    #[test]
    fn test_resave_reuses_path() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let mut obj = todo("first");
        let p1 = store.save(&mut obj).unwrap();
        obj.set("txt", "second");
        let p2 = store.save(&mut obj).unwrap();
        assert_eq!(p1, p2);
        assert_eq!(store.find("test.Todo", None).unwrap().len(), 1);
        assert_eq!(store.read(&p1).unwrap().text("txt"), Some("second"));
    }

    #[test]
    fn test_path_for_unique_and_sorted() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let obj = Object::new();
        let paths: Vec<String> = (0..500).map(|_| store.path_for(&obj)).collect();
        let unique: HashSet<&String> = paths.iter().collect();
        assert_eq!(unique.len(), paths.len());
        let mut sorted = paths.clone();
        sorted.sort();
        assert_eq!(sorted, paths);
    }

    #[test]
    fn test_save_distinct_records_never_collide() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let mut seen = HashSet::new();
        for i in 0..50 {
            let mut obj = todo(&i.to_string());
            assert!(seen.insert(store.save(&mut obj).unwrap()));
        }
        assert_eq!(store.find("test.Todo", None).unwrap().len(), 50);
    }

    #[test]
    fn test_write_new_disambiguates_taken_name() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let base = "test.Todo/2026-10-14/09:00:00.000000000";
        let first = store.write_new(base, r#"{"txt": "a"}"#).unwrap();
        let second = store.write_new(base, r#"{"txt": "b"}"#).unwrap();
        assert_eq!(first, base);
        assert_eq!(second, format!("{}-1", base));
        assert_eq!(fntime(&first), fntime(&second));
    }

    #[test]
    fn test_load_from_path() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let mut obj = Object::new();
        obj.set("key", "value");
        let path = store.save(&mut obj).unwrap();

        let mut other = Object::new();
        store.load(&mut other, Source::Path(&path)).unwrap();
        assert_eq!(other.text("key"), Some("value"));
        assert_eq!(other.origin(), Some(path.as_str()));
    }

    #[test]
    fn test_load_from_payload() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let mut obj = Object::new();
        store.load(&mut obj, Source::Payload(r#"{"test": "bla"}"#)).unwrap();
        assert_eq!(obj.text("test"), Some("bla"));
        assert!(obj.origin().is_none());
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let mut obj = Object::new();
        let err = store
            .load(&mut obj, Source::Path("opbot.object.Object/2026-01-01/00:00:00.000000000"))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn test_load_unregistered_kind_fails() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let path = "test.Ghost/2026-01-01/00:00:00.000000000";
        store.write_new(path, r#"{"x": 1}"#).unwrap();
        let err = store.read(path).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Decode { source: crate::error::DecodeError::UnknownKind(_), .. }
        ));
    }

    #[test]
    fn test_rejects_escaping_paths() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        assert!(matches!(store.read("../etc/passwd"), Err(StoreError::BadPath(_))));
        assert!(matches!(store.read("/etc/passwd"), Err(StoreError::BadPath(_))));
    }

    #[test]
    fn test_find_empty_workdir() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let query = store.find("todo", None).unwrap();
        assert!(query.is_empty());
        assert!(query.iter().next().is_none());
    }

    #[test]
    fn test_find_matches_short_name_in_order() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        for txt in ["one", "two", "three"] {
            store.save(&mut todo(txt)).unwrap();
        }
        store.save(&mut Object::new()).unwrap();

        let query = store.find("todo", None).unwrap();
        let txts: Vec<String> = query
            .iter()
            .map(|r| r.unwrap().text("txt").unwrap().to_string())
            .collect();
        assert_eq!(txts, vec!["one", "two", "three"]);

        // restartable
        assert_eq!(query.iter().count(), 3);
        assert_eq!(store.find("test.", None).unwrap().len(), 3);
        assert_eq!(store.find("", None).unwrap().len(), 4);
    }

    #[test]
    fn test_find_is_a_snapshot() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        store.save(&mut todo("before")).unwrap();
        let query = store.find("todo", None).unwrap();
        store.save(&mut todo("after")).unwrap();
        assert_eq!(query.iter().count(), 1);
    }

    #[test]
    fn test_find_time_range() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let p1 = store.save(&mut todo("old")).unwrap();
        let p2 = store.save(&mut todo("new")).unwrap();
        let cut = fntime(&p2).unwrap();

        let newer = store.find("todo", Some(TimeRange::since(cut))).unwrap();
        assert_eq!(newer.paths().collect::<Vec<_>>(), vec![p2.as_str()]);

        let older = store.find("todo", Some(TimeRange::until(cut))).unwrap();
        assert_eq!(older.paths().collect::<Vec<_>>(), vec![p1.as_str()]);
    }

    #[test]
    fn test_last_picks_latest() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        assert!(store.last("todo").unwrap().is_none());
        store.save(&mut todo("a")).unwrap();
        store.save(&mut todo("b")).unwrap();
        let last = store.last("todo").unwrap().unwrap();
        assert_eq!(last.text("txt"), Some("b"));
    }

    #[test]
    fn test_register_sets_and_saves() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let mut obj = Object::new();
        let path = store.register(&mut obj, "key", "value").unwrap();
        assert_eq!(obj.text("key"), Some("value"));
        assert_eq!(store.read(&path).unwrap().text("key"), Some("value"));
    }

    #[test]
    fn test_fntime_parses_paths() {
        let t = fntime("opbot.todo.Todo/2026-10-14/09:31:07.120034567").unwrap();
        assert_eq!(t.format("%Y-%m-%d %H:%M:%S%.9f").to_string(), "2026-10-14 09:31:07.120034567");
        assert!(fntime("opbot.todo.Todo/2026-10-14/09:31:07.120034567-3").is_some());
        assert!(fntime("garbage").is_none());
        assert!(fntime("kind/not-a-date/x").is_none());
    }

    #[test]
    fn test_time_range_contains() {
        let a = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let r = TimeRange::between(a, b);
        assert!(r.contains(a));
        assert!(!r.contains(b));
        assert!(TimeRange::default().contains(b));
    }
}
