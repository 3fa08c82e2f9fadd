/*!
A disk-backed queue of envelopes with bounded retention.

Each [`Envelope`] is persisted as its own file in a dedicated directory. Writes are atomic: envelopes are written to a temporary file that's renamed into place once complete, so readers never observe a partially written envelope.

# File naming

Envelope files are named using the following scheme:

```text
{nanos}-{sequence}-{id}.envelope
```

where:

- `nanos`: The number of nanoseconds since the Unix epoch when the envelope was stored.
- `sequence`: A counter that increases with each envelope stored, continuing from the highest sequence already in the directory.
- `id`: A random identifier for the file.

Envelopes are ordered oldest first by their `sequence`, compared numerically. The `nanos` only break ties, so a wall clock that steps backwards can't reorder the store.

# Retention

After each write, if the directory holds more than [`EnvelopeStoreBuilder::max_envelopes`] envelopes, the oldest ones are evicted until it doesn't. Every item in an evicted envelope is reported to [`EnvelopeStoreBuilder::on_item_deleted`] along with its [`DataCategory`], so rate-limit bookkeeping can account for the loss. Items are reported after the write completes and the store is unlocked, so the callback may use the store.

A session update that starts a session carries `"init": true`. Losing it would orphan the later updates for the same session, so before an envelope is evicted its initial session updates are migrated: the oldest remaining envelope carrying an update for the same session has `"init": true` set on it. Envelopes that are corrupt aren't considered, since rewriting them would lose what couldn't be parsed. A migrated session item isn't reported as deleted, because its session survives. Other items in the same envelope still are.

# Handling IO failures

The store is best-effort. Envelopes that can't be read during eviction are still deleted; whatever items could be recovered from them are reported. A failed delete leaves the store over capacity until the next write retries the eviction.
*/

mod envelope;
mod internal_metrics;

use std::{
    fmt,
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use satchel_core::{Clock, SystemClock};

use internal_metrics::InternalMetrics;

pub use self::envelope::*;

pub const DEFAULT_MAX_ENVELOPES: usize = 100;

const ENVELOPE_EXT: &str = "envelope";
const TMP_EXT: &str = "tmp";

/**
An error interacting with an [`EnvelopeStore`].
*/
pub struct Error {
    kind: ErrorKind,
    inner: Box<dyn std::error::Error + Send + Sync>,
}

/**
The general category of an [`Error`].
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /**
    A filesystem operation failed.
    */
    Io,
    /**
    An envelope couldn't be read or written in its on-disk format.
    */
    Parse,
}

impl Error {
    fn new(kind: ErrorKind, err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error {
            kind,
            inner: err.into(),
        }
    }

    pub(crate) fn io(err: io::Error) -> Self {
        Error::new(ErrorKind::Io, err)
    }

    pub(crate) fn parse(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::new(ErrorKind::Parse, err)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.inner)
    }
}

/**
A receiver for items lost to eviction.
*/
pub trait OnItemDeleted {
    fn on_item_deleted(&self, item: &EnvelopeItem, category: DataCategory);
}

impl<F: Fn(&EnvelopeItem, DataCategory)> OnItemDeleted for F {
    fn on_item_deleted(&self, item: &EnvelopeItem, category: DataCategory) {
        self(item, category)
    }
}

/**
A builder for an [`EnvelopeStore`].
*/
#[must_use = "call `.open()` to complete the builder"]
pub struct EnvelopeStoreBuilder {
    dir: PathBuf,
    max_envelopes: usize,
    clock: Box<dyn Clock + Send + Sync>,
    on_item_deleted: Option<Box<dyn OnItemDeleted + Send + Sync>>,
}

impl EnvelopeStoreBuilder {
    /**
    Create a builder for a store in `dir`.

    The directory will be created if it doesn't exist.
    */
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        EnvelopeStoreBuilder {
            dir: dir.into(),
            max_envelopes: DEFAULT_MAX_ENVELOPES,
            clock: Box::new(SystemClock::new()),
            on_item_deleted: None,
        }
    }

    /**
    The maximum number of envelopes to keep.

    Envelopes are evicted from oldest first whenever a write takes the store over this number.
    */
    pub fn max_envelopes(mut self, max_envelopes: usize) -> Self {
        self.max_envelopes = max_envelopes;
        self
    }

    /**
    The clock used to timestamp envelope files.
    */
    pub fn clock(mut self, clock: impl Clock + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /**
    A callback for each item lost to eviction.

    The callback runs after the store is unlocked, so it may call back into the store.
    */
    pub fn on_item_deleted(
        mut self,
        on_item_deleted: impl OnItemDeleted + Send + Sync + 'static,
    ) -> Self {
        self.on_item_deleted = Some(Box::new(on_item_deleted));
        self
    }

    /**
    Complete the builder, preparing the store's directory.

    Any temporary files left behind by an interrupted write are removed.
    */
    pub fn open(self) -> Result<EnvelopeStore, Error> {
        fs::create_dir_all(&self.dir).map_err(|err| {
            emit::warn!(
                rt: emit::runtime::internal(),
                "failed to create envelope directory {path}: {err}",
                #[emit::as_debug]
                path: &self.dir,
                err,
            );

            Error::io(err)
        })?;

        let mut next_seq = 0;

        for entry in fs::read_dir(&self.dir).map_err(Error::io)? {
            let Ok(entry) = entry else {
                continue;
            };

            let path = entry.path();

            if path.extension().and_then(|ext| ext.to_str()) == Some(TMP_EXT) {
                let _ = fs::remove_file(&path);
                continue;
            }

            if let Some(file) = EnvelopeFile::from_path(path) {
                next_seq = next_seq.max(file.seq + 1);
            }
        }

        Ok(EnvelopeStore {
            dir: self.dir,
            max_envelopes: self.max_envelopes,
            clock: self.clock,
            on_item_deleted: self.on_item_deleted,
            metrics: InternalMetrics::default(),
            state: Mutex::new(State { next_seq }),
        })
    }
}

/**
A directory of persisted envelopes.
*/
pub struct EnvelopeStore {
    dir: PathBuf,
    max_envelopes: usize,
    clock: Box<dyn Clock + Send + Sync>,
    on_item_deleted: Option<Box<dyn OnItemDeleted + Send + Sync>>,
    metrics: InternalMetrics,
    state: Mutex<State>,
}

struct State {
    next_seq: u64,
}

/**
An envelope read back from an [`EnvelopeStore`].
*/
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEnvelope {
    pub path: PathBuf,
    pub envelope: Envelope,
    /**
    Whether the file was corrupt, so only some of its items could be read.
    */
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct EnvelopeFile {
    path: PathBuf,
    nanos: u128,
    seq: u64,
}

impl EnvelopeFile {
    fn from_path(path: PathBuf) -> Option<Self> {
        if path.extension()?.to_str()? != ENVELOPE_EXT {
            return None;
        }

        let (nanos, seq) = read_file_name_order(path.file_stem()?.to_str()?)?;

        Some(EnvelopeFile { path, nanos, seq })
    }
}

impl EnvelopeStore {
    /**
    Start building a store in `dir`.
    */
    pub fn builder(dir: impl Into<PathBuf>) -> EnvelopeStoreBuilder {
        EnvelopeStoreBuilder::new(dir)
    }

    /**
    The directory envelopes are stored in.
    */
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /**
    Persist an envelope, then evict the oldest envelopes if the store is over capacity.

    Returns the path of the written file. If the store's capacity is zero then the envelope is evicted immediately.
    */
    pub fn store_envelope(&self, envelope: &Envelope) -> Result<PathBuf, Error> {
        let bytes = envelope.to_bytes()?;

        let mut state = self.lock();

        let seq = state.next_seq;
        state.next_seq += 1;

        let nanos = self.clock.now().to_unix().as_nanos();

        let mut path = self.dir.clone();
        path.push(file_name(nanos, seq, rand::random()));

        if let Err(err) = write_atomic(&path, &bytes) {
            self.metrics.envelope_write_failed.increment();

            emit::warn!(
                rt: emit::runtime::internal(),
                "failed to write envelope {path}: {err}",
                #[emit::as_debug]
                path,
                err,
            );

            return Err(Error::io(err));
        }

        self.metrics.envelope_write.increment();

        let deleted = self.apply_retention(&mut state);

        // Callbacks may call back into the store
        drop(state);

        if let Some(ref on_item_deleted) = self.on_item_deleted {
            for item in &deleted {
                on_item_deleted.on_item_deleted(item, item.data_category());
            }
        }

        Ok(path)
    }

    /**
    Read the oldest readable envelope without removing it.
    */
    pub fn get_oldest_envelope(&self) -> Result<Option<StoredEnvelope>, Error> {
        let _state = self.lock();

        for file in self.read_envelope_files().map_err(Error::io)? {
            if let Some(stored) = self.try_read(file) {
                return Ok(Some(stored));
            }
        }

        Ok(None)
    }

    /**
    Read all readable envelopes, oldest first, without removing them.
    */
    pub fn get_all_envelopes(&self) -> Result<Vec<StoredEnvelope>, Error> {
        let _state = self.lock();

        Ok(self
            .read_envelope_files()
            .map_err(Error::io)?
            .into_iter()
            .filter_map(|file| self.try_read(file))
            .collect())
    }

    /**
    Remove a single envelope.

    Removing an envelope that doesn't exist isn't an error.
    */
    pub fn delete_envelope(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let _state = self.lock();

        remove_file(path.as_ref()).map_err(Error::io)
    }

    /**
    Remove all envelopes.

    Items removed this way aren't reported to [`EnvelopeStoreBuilder::on_item_deleted`].
    */
    pub fn delete_all(&self) -> Result<(), Error> {
        let _state = self.lock();

        let mut result = Ok(());

        for file in self.read_envelope_files().map_err(Error::io)? {
            if let Err(err) = remove_file(&file.path) {
                self.metrics.envelope_delete_failed.increment();

                emit::warn!(
                    rt: emit::runtime::internal(),
                    "failed to delete {path}: {err}",
                    #[emit::as_debug]
                    path: &file.path,
                    err,
                );

                result = Err(Error::io(err));
            }
        }

        result
    }

    /**
    The number of envelopes currently stored.
    */
    pub fn envelope_count(&self) -> Result<usize, Error> {
        let _state = self.lock();

        Ok(self.read_envelope_files().map_err(Error::io)?.len())
    }

    /**
    Sample the store's internal counters.
    */
    pub fn sample_metrics(&self) -> impl Iterator<Item = (&'static str, usize)> + 'static {
        self.metrics.sample()
    }

    fn lock(&self) -> MutexGuard<State> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn read_envelope_files(&self) -> io::Result<Vec<EnvelopeFile>> {
        let mut files = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let Ok(entry) = entry else {
                continue;
            };

            if let Ok(file_type) = entry.file_type() {
                if !file_type.is_file() {
                    continue;
                }
            }

            if let Some(file) = EnvelopeFile::from_path(entry.path()) {
                files.push(file);
            }
        }

        files.sort_by(|a, b| (a.seq, a.nanos, &a.path).cmp(&(b.seq, b.nanos, &b.path)));

        Ok(files)
    }

    fn try_read(&self, file: EnvelopeFile) -> Option<StoredEnvelope> {
        match read_envelope(&file.path) {
            Ok(parsed) => Some(StoredEnvelope {
                path: file.path,
                envelope: parsed.envelope,
                truncated: parsed.truncated,
            }),
            Err(err) => {
                self.metrics.envelope_read_failed.increment();

                emit::warn!(
                    rt: emit::runtime::internal(),
                    "failed to read envelope {path}: {err}",
                    #[emit::as_debug]
                    path: &file.path,
                    err,
                );

                None
            }
        }
    }

    /**
    Evict the oldest envelopes over capacity.

    Returns the items that should be reported as deleted.
    */
    fn apply_retention(&self, _: &mut State) -> Vec<EnvelopeItem> {
        let files = match self.read_envelope_files() {
            Ok(files) => files,
            Err(err) => {
                emit::warn!(
                    rt: emit::runtime::internal(),
                    "failed to read envelopes in {path}: {err}",
                    #[emit::as_debug]
                    path: &self.dir,
                    err,
                );

                return Vec::new();
            }
        };

        if files.len() <= self.max_envelopes {
            return Vec::new();
        }

        let excess = files.len() - self.max_envelopes;
        let (evicted, remaining) = files.split_at(excess);

        emit::debug!(
            rt: emit::runtime::internal(),
            "evicting {excess} envelopes from {path}",
            excess,
            #[emit::as_debug]
            path: &self.dir,
        );

        let mut deleted = Vec::new();

        for file in evicted {
            self.evict(file, remaining, &mut deleted);
        }

        deleted
    }

    fn evict(
        &self,
        file: &EnvelopeFile,
        remaining: &[EnvelopeFile],
        deleted: &mut Vec<EnvelopeItem>,
    ) {
        if let Some(stored) = self.try_read(file.clone()) {
            if stored.truncated {
                emit::warn!(
                    rt: emit::runtime::internal(),
                    "envelope {path} is corrupt; only {count} items could be recovered",
                    #[emit::as_debug]
                    path: &file.path,
                    count: stored.envelope.items.len(),
                );
            }

            let migrated = self.migrate_session_init(&stored.envelope, remaining);

            deleted.extend(
                stored
                    .envelope
                    .items
                    .into_iter()
                    .enumerate()
                    // The session lives on in another envelope
                    .filter(|(i, _)| !migrated.contains(i))
                    .map(|(_, item)| item),
            );
        }

        match remove_file(&file.path) {
            Ok(()) => {
                self.metrics.envelope_evicted.increment();

                emit::debug!(
                    rt: emit::runtime::internal(),
                    "evicted {path}",
                    #[emit::as_debug]
                    path: &file.path,
                );
            }
            Err(err) => {
                self.metrics.envelope_delete_failed.increment();

                emit::warn!(
                    rt: emit::runtime::internal(),
                    "failed to delete {path}: {err}",
                    #[emit::as_debug]
                    path: &file.path,
                    err,
                );
            }
        }
    }

    /**
    Move `"init": true` from each initial session update in `envelope` onto the oldest update for the same session in `remaining`.

    Returns the indexes of the items that were migrated.
    */
    fn migrate_session_init(&self, envelope: &Envelope, remaining: &[EnvelopeFile]) -> Vec<usize> {
        let mut migrated = Vec::new();

        for (i, item) in envelope.items.iter().enumerate() {
            let Some(session) = item.as_session() else {
                continue;
            };

            if !session.init {
                continue;
            }

            for candidate in remaining {
                if self.set_session_init(&candidate.path, &session.sid) {
                    self.metrics.session_init_migrated.increment();

                    emit::debug!(
                        rt: emit::runtime::internal(),
                        "migrated session init for {sid} to {path}",
                        #[emit::as_display]
                        sid: &session.sid,
                        #[emit::as_debug]
                        path: &candidate.path,
                    );

                    migrated.push(i);
                    break;
                }
            }
        }

        migrated
    }

    fn set_session_init(&self, path: &Path, sid: &str) -> bool {
        // Envelopes that can't be fully read aren't candidates
        let Ok(parsed) = read_envelope(path) else {
            return false;
        };

        // Rewriting would lose the unparsed tail
        if parsed.truncated {
            return false;
        }

        let mut envelope = parsed.envelope;

        let Some((item, session)) = envelope.items.iter_mut().find_map(|item| {
            let session = item.as_session()?;

            (session.sid == sid).then_some((item, session))
        }) else {
            return false;
        };

        let Ok(payload) = serde_json::to_vec(&session.with_init(true)) else {
            return false;
        };

        item.payload = payload;

        let written = envelope
            .to_bytes()
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))
            .and_then(|bytes| write_atomic(path, &bytes));

        if let Err(err) = written {
            self.metrics.envelope_write_failed.increment();

            emit::warn!(
                rt: emit::runtime::internal(),
                "failed to migrate session init to {path}: {err}",
                #[emit::as_debug]
                path: &path,
                err,
            );

            return false;
        }

        true
    }
}

fn read_envelope(path: &Path) -> Result<ParsedEnvelope, Error> {
    let bytes = fs::read(path).map_err(Error::io)?;

    Envelope::parse(&bytes)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension(TMP_EXT);

    let written = File::create(&tmp).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });

    if let Err(err) = written.and_then(|_| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);

        return Err(err);
    }

    Ok(())
}

fn remove_file(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        result => result,
    }
}

fn file_name(nanos: u128, seq: u64, id: u32) -> String {
    format!("{:020}-{:010}-{:08x}.{}", nanos, seq, id, ENVELOPE_EXT)
}

fn read_file_name_order(file_stem: &str) -> Option<(u128, u64)> {
    let mut parts = file_stem.split('-');

    let nanos = parts.next()?.parse().ok()?;
    let seq = parts.next()?.parse().ok()?;

    // The random id only disambiguates
    let _ = u32::from_str_radix(parts.next()?, 16).ok()?;

    if parts.next().is_some() {
        return None;
    }

    Some((nanos, seq))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::{
        sync::{Arc, Mutex, OnceLock, Weak},
        time::Duration,
    };

    use satchel_core::{clock::ManualClock, Timestamp};

    #[derive(Clone, Default)]
    struct Deleted(Arc<Mutex<Vec<(String, DataCategory)>>>);

    impl Deleted {
        fn on_item_deleted(&self) -> impl OnItemDeleted + Send + Sync + 'static {
            let deleted = self.clone();

            move |item: &EnvelopeItem, category: DataCategory| {
                deleted
                    .0
                    .lock()
                    .unwrap()
                    .push((item.ty().to_owned(), category))
            }
        }

        fn take(&self) -> Vec<(String, DataCategory)> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    fn event(id: &str) -> Envelope {
        Envelope::new()
            .with_event_id(id)
            .with_item(EnvelopeItem::new("event", format!("{{\"id\":\"{id}\"}}")))
    }

    fn session(sid: &str, init: bool) -> EnvelopeItem {
        EnvelopeItem::session(&Session::new(sid).with_init(init)).unwrap()
    }

    fn event_ids(store: &EnvelopeStore) -> Vec<String> {
        store
            .get_all_envelopes()
            .unwrap()
            .into_iter()
            .map(|stored| stored.envelope.header.event_id.unwrap())
            .collect()
    }

    #[test]
    fn file_name_order() {
        let name = file_name(1_700_000_000_000_000_000, 42, 0xdeadbeef);

        assert_eq!("01700000000000000000-0000000042-deadbeef.envelope", name);

        let stem = name.strip_suffix(".envelope").unwrap();
        assert_eq!(
            Some((1_700_000_000_000_000_000, 42)),
            read_file_name_order(stem)
        );

        assert_eq!(None, read_file_name_order("not-an-envelope"));
        assert_eq!(None, read_file_name_order("1-2-zz"));
        assert_eq!(None, read_file_name_order("1-2-3-4"));
    }

    #[test]
    fn store_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = EnvelopeStore::builder(dir.path()).open().unwrap();

        let path = store.store_envelope(&event("a")).unwrap();
        assert!(path.starts_with(dir.path()));

        store.store_envelope(&event("b")).unwrap();

        assert_eq!(2, store.envelope_count().unwrap());

        let oldest = store.get_oldest_envelope().unwrap().unwrap();
        assert_eq!(path, oldest.path);
        assert_eq!(event("a"), oldest.envelope);
        assert!(!oldest.truncated);

        // Reading doesn't remove anything
        assert_eq!(vec!["a", "b"], event_ids(&store));
        assert_eq!(2, store.envelope_count().unwrap());
    }

    #[test]
    fn orders_by_sequence_within_same_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let store = EnvelopeStore::builder(dir.path())
            .clock(ManualClock::new(Timestamp::from_unix(Duration::from_secs(1))))
            .open()
            .unwrap();

        for i in 0..12 {
            store.store_envelope(&event(&i.to_string())).unwrap();
        }

        let expected: Vec<String> = (0..12).map(|i| i.to_string()).collect();
        assert_eq!(expected, event_ids(&store));
    }

    #[test]
    fn orders_by_sequence_when_clock_goes_backwards() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(Timestamp::from_unix(Duration::from_secs(
            100,
        ))));

        let store = EnvelopeStore::builder(dir.path())
            .max_envelopes(2)
            .clock(clock.clone())
            .open()
            .unwrap();

        store.store_envelope(&event("a")).unwrap();
        store.store_envelope(&event("b")).unwrap();

        clock.set(Timestamp::from_unix(Duration::from_secs(50)));
        let c = store.store_envelope(&event("c")).unwrap();

        assert!(c.exists());
        assert_eq!(vec!["b", "c"], event_ids(&store));
    }

    #[test]
    fn sequence_continues_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Timestamp::from_unix(Duration::from_secs(1));

        {
            let store = EnvelopeStore::builder(dir.path())
                .clock(ManualClock::new(clock))
                .open()
                .unwrap();

            store.store_envelope(&event("a")).unwrap();
            store.store_envelope(&event("b")).unwrap();
        }

        let store = EnvelopeStore::builder(dir.path())
            .clock(ManualClock::new(clock))
            .open()
            .unwrap();

        store.store_envelope(&event("c")).unwrap();

        assert_eq!(vec!["a", "b", "c"], event_ids(&store));
    }

    #[test]
    fn evicts_oldest_over_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let deleted = Deleted::default();

        let store = EnvelopeStore::builder(dir.path())
            .max_envelopes(3)
            .on_item_deleted(deleted.on_item_deleted())
            .open()
            .unwrap();

        for i in 0..5 {
            store.store_envelope(&event(&i.to_string())).unwrap();
            assert!(store.envelope_count().unwrap() <= 3);
        }

        assert_eq!(vec!["2", "3", "4"], event_ids(&store));
        assert_eq!(
            vec![
                (String::from("event"), DataCategory::Error),
                (String::from("event"), DataCategory::Error),
            ],
            deleted.take()
        );
        assert!(store
            .sample_metrics()
            .any(|(name, value)| name == "envelope_evicted" && value == 2));
    }

    #[test]
    fn evicts_excess_in_one_pass() {
        let dir = tempfile::tempdir().unwrap();

        {
            let store = EnvelopeStore::builder(dir.path()).open().unwrap();

            for i in 0..6 {
                store.store_envelope(&event(&i.to_string())).unwrap();
            }
        }

        let store = EnvelopeStore::builder(dir.path())
            .max_envelopes(2)
            .open()
            .unwrap();

        store.store_envelope(&event("6")).unwrap();

        assert_eq!(vec!["5", "6"], event_ids(&store));
    }

    #[test]
    fn zero_capacity_evicts_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let deleted = Deleted::default();

        let store = EnvelopeStore::builder(dir.path())
            .max_envelopes(0)
            .on_item_deleted(deleted.on_item_deleted())
            .open()
            .unwrap();

        store.store_envelope(&event("a")).unwrap();

        assert_eq!(0, store.envelope_count().unwrap());
        assert_eq!(1, deleted.take().len());
    }

    #[test]
    fn migrated_session_skips_only_session_callback() {
        let dir = tempfile::tempdir().unwrap();
        let deleted = Deleted::default();

        let store = EnvelopeStore::builder(dir.path())
            .max_envelopes(2)
            .on_item_deleted(deleted.on_item_deleted())
            .open()
            .unwrap();

        store
            .store_envelope(
                &event("a")
                    .with_item(session("s1", true))
                    .with_item(EnvelopeItem::new("attachment", b"data".to_vec())),
            )
            .unwrap();
        store
            .store_envelope(&Envelope::new().with_event_id("b").with_item(session("s1", false)))
            .unwrap();
        store.store_envelope(&event("c")).unwrap();

        assert_eq!(
            vec![
                (String::from("event"), DataCategory::Error),
                (String::from("attachment"), DataCategory::Attachment),
            ],
            deleted.take()
        );

        let remaining = store.get_oldest_envelope().unwrap().unwrap();
        assert_eq!(Some(String::from("b")), remaining.envelope.header.event_id);

        let migrated = remaining.envelope.items[0].as_session().unwrap();
        assert_eq!("s1", migrated.sid);
        assert!(migrated.init);
    }

    #[test]
    fn unmigrated_session_fires_callback() {
        let dir = tempfile::tempdir().unwrap();
        let deleted = Deleted::default();

        let store = EnvelopeStore::builder(dir.path())
            .max_envelopes(1)
            .on_item_deleted(deleted.on_item_deleted())
            .open()
            .unwrap();

        store
            .store_envelope(&Envelope::new().with_item(session("s1", true)))
            .unwrap();
        store
            .store_envelope(&Envelope::new().with_item(session("s2", false)))
            .unwrap();

        assert_eq!(
            vec![(String::from("session"), DataCategory::Session)],
            deleted.take()
        );

        let remaining = store.get_oldest_envelope().unwrap().unwrap();
        assert!(!remaining.envelope.items[0].as_session().unwrap().init);
    }

    #[test]
    fn migration_skips_unreadable_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let deleted = Deleted::default();

        let store = EnvelopeStore::builder(dir.path())
            .max_envelopes(2)
            .on_item_deleted(deleted.on_item_deleted())
            .open()
            .unwrap();

        store
            .store_envelope(&Envelope::new().with_item(session("s1", true)))
            .unwrap();
        let corrupt = store.store_envelope(&event("b")).unwrap();
        fs::write(&corrupt, b"\x00garbage").unwrap();

        store
            .store_envelope(&Envelope::new().with_event_id("c").with_item(session("s1", false)))
            .unwrap();

        assert!(deleted.take().is_empty());

        let all = store.get_all_envelopes().unwrap();
        assert_eq!(1, all.len());
        assert!(all[0].envelope.items[0].as_session().unwrap().init);
        assert_eq!(2, store.envelope_count().unwrap());
    }

    #[test]
    fn migration_skips_truncated_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let deleted = Deleted::default();

        let store = EnvelopeStore::builder(dir.path())
            .max_envelopes(2)
            .on_item_deleted(deleted.on_item_deleted())
            .open()
            .unwrap();

        store
            .store_envelope(&Envelope::new().with_item(session("s1", true)))
            .unwrap();
        let truncated = store
            .store_envelope(
                &Envelope::new()
                    .with_event_id("b")
                    .with_item(session("s1", false))
                    .with_item(EnvelopeItem::new("attachment", b"0123456789".to_vec())),
            )
            .unwrap();

        let mut bytes = fs::read(&truncated).unwrap();
        bytes.truncate(bytes.len() - 5);
        fs::write(&truncated, &bytes).unwrap();

        store.store_envelope(&event("c")).unwrap();

        // The session couldn't be re-homed, so it's reported
        assert_eq!(
            vec![(String::from("session"), DataCategory::Session)],
            deleted.take()
        );

        assert_eq!(bytes, fs::read(&truncated).unwrap());

        let oldest = store.get_oldest_envelope().unwrap().unwrap();
        assert_eq!(truncated, oldest.path);
        assert!(oldest.truncated);
        assert!(!oldest.envelope.items[0].as_session().unwrap().init);
        assert!(store
            .sample_metrics()
            .any(|(name, value)| name == "session_init_migrated" && value == 0));
    }

    #[test]
    fn on_item_deleted_can_use_the_store() {
        let dir = tempfile::tempdir().unwrap();

        let slot = Arc::new(OnceLock::<Weak<EnvelopeStore>>::new());
        let counts = Arc::new(Mutex::new(Vec::new()));

        let store = Arc::new(
            EnvelopeStore::builder(dir.path())
                .max_envelopes(1)
                .on_item_deleted({
                    let slot = slot.clone();
                    let counts = counts.clone();

                    move |_: &EnvelopeItem, _: DataCategory| {
                        if let Some(store) = slot.get().and_then(Weak::upgrade) {
                            counts.lock().unwrap().push(store.envelope_count().unwrap());
                        }
                    }
                })
                .open()
                .unwrap(),
        );

        slot.set(Arc::downgrade(&store)).unwrap();

        store.store_envelope(&event("a")).unwrap();
        store.store_envelope(&event("b")).unwrap();

        assert_eq!(vec![1], *counts.lock().unwrap());
    }

    #[test]
    fn corrupt_envelopes_are_still_evicted() {
        let dir = tempfile::tempdir().unwrap();
        let deleted = Deleted::default();

        let store = EnvelopeStore::builder(dir.path())
            .max_envelopes(1)
            .on_item_deleted(deleted.on_item_deleted())
            .open()
            .unwrap();

        let corrupt = store.store_envelope(&event("a")).unwrap();
        fs::write(&corrupt, b"not an envelope").unwrap();

        store.store_envelope(&event("b")).unwrap();

        assert!(!corrupt.exists());
        assert!(deleted.take().is_empty());
        assert_eq!(vec!["b"], event_ids(&store));
        assert!(store
            .sample_metrics()
            .any(|(name, value)| name == "envelope_read_failed" && value == 1));
    }

    #[test]
    fn truncated_envelopes_report_recovered_items() {
        let dir = tempfile::tempdir().unwrap();
        let deleted = Deleted::default();

        let store = EnvelopeStore::builder(dir.path())
            .max_envelopes(1)
            .on_item_deleted(deleted.on_item_deleted())
            .open()
            .unwrap();

        let path = store
            .store_envelope(
                &event("a").with_item(EnvelopeItem::new("attachment", b"0123456789".to_vec())),
            )
            .unwrap();

        let mut bytes = fs::read(&path).unwrap();
        bytes.truncate(bytes.len() - 5);
        fs::write(&path, bytes).unwrap();

        let stored = store.get_oldest_envelope().unwrap().unwrap();
        assert!(stored.truncated);

        store.store_envelope(&event("b")).unwrap();

        assert_eq!(
            vec![(String::from("event"), DataCategory::Error)],
            deleted.take()
        );
    }

    #[test]
    fn delete_envelope_and_delete_all() {
        let dir = tempfile::tempdir().unwrap();
        let deleted = Deleted::default();

        let store = EnvelopeStore::builder(dir.path())
            .on_item_deleted(deleted.on_item_deleted())
            .open()
            .unwrap();

        let a = store.store_envelope(&event("a")).unwrap();
        store.store_envelope(&event("b")).unwrap();
        store.store_envelope(&event("c")).unwrap();

        store.delete_envelope(&a).unwrap();
        store.delete_envelope(&a).unwrap();
        assert_eq!(vec!["b", "c"], event_ids(&store));

        store.delete_all().unwrap();
        assert_eq!(0, store.envelope_count().unwrap());
        assert!(store.get_oldest_envelope().unwrap().is_none());

        assert!(deleted.take().is_empty());
    }

    #[test]
    fn open_ignores_and_cleans_foreign_files() {
        let dir = tempfile::tempdir().unwrap();

        fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
        fs::write(dir.path().join("00000000000000000001-0000000000-00000000.tmp"), b"partial").unwrap();
        fs::create_dir(dir.path().join("nested.envelope")).unwrap();

        let store = EnvelopeStore::builder(dir.path()).open().unwrap();

        assert_eq!(0, store.envelope_count().unwrap());
        assert!(dir.path().join("notes.txt").exists());
        assert!(!dir
            .path()
            .join("00000000000000000001-0000000000-00000000.tmp")
            .exists());
    }
}
