/*!
A stable anonymous identifier for this installation.
*/

use std::{
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
    sync::OnceLock,
};

const INSTALLATION_FILE: &str = "INSTALLATION";

/**
A lazily initialized installation id.

The id is read from an `INSTALLATION` file in the cache directory the first time it's needed. If there's no such file then a random UUID is generated and written there, so later runs of the application see the same id. Failing to read or write the file isn't fatal; the id just won't be stable across runs.
*/
#[derive(Debug, Default)]
pub struct InstallationId {
    cache_dir: Option<PathBuf>,
    value: OnceLock<String>,
}

impl InstallationId {
    /**
    Create an id cached in the given directory.

    If no directory is given the id lives only as long as this value.
    */
    pub fn new(cache_dir: Option<PathBuf>) -> Self {
        InstallationId {
            cache_dir,
            value: OnceLock::new(),
        }
    }

    /**
    Get the id, reading or generating it if this is the first call.
    */
    pub fn get(&self) -> &str {
        self.value.get_or_init(|| match self.cache_dir {
            Some(ref cache_dir) => read_or_create(cache_dir),
            None => random_uuid(),
        })
    }

    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }
}

fn read_or_create(cache_dir: &Path) -> String {
    let path = cache_dir.join(INSTALLATION_FILE);

    match fs::read_to_string(&path) {
        Ok(id) if !id.trim().is_empty() => return id.trim().to_owned(),
        Ok(_) => (),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => (),
        Err(err) => {
            emit::warn!(
                rt: emit::runtime::internal(),
                "failed to read installation id from {path}: {err}",
                #[emit::as_debug]
                path: &path,
                err,
            );
        }
    }

    let id = random_uuid();

    if let Err(err) = fs::create_dir_all(cache_dir).and_then(|_| fs::write(&path, &id)) {
        emit::warn!(
            rt: emit::runtime::internal(),
            "failed to write installation id to {path}: {err}",
            #[emit::as_debug]
            path: &path,
            err,
        );
    }

    id
}

/**
Generate a random version 4 UUID in its hyphenated form.
*/
fn random_uuid() -> String {
    let mut bytes: [u8; 16] = rand::random();

    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    let mut uuid = String::with_capacity(36);

    for (i, b) in bytes.iter().enumerate() {
        if matches!(i, 4 | 6 | 8 | 10) {
            uuid.push('-');
        }

        let _ = write!(uuid, "{:02x}", b);
    }

    uuid
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_format() {
        let uuid = random_uuid();

        assert_eq!(36, uuid.len());

        let groups: Vec<&str> = uuid.split('-').collect();
        assert_eq!(vec![8, 4, 4, 4, 12], groups.iter().map(|g| g.len()).collect::<Vec<_>>());

        assert!(groups[2].starts_with('4'));
        assert!(matches!(&groups[3][..1], "8" | "9" | "a" | "b"));
        assert!(uuid.chars().all(|c| c == '-' || c.is_ascii_hexdigit()));
    }

    #[test]
    fn persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();

        let first = InstallationId::new(Some(dir.path().to_owned()));
        let id = first.get().to_owned();

        assert_eq!(id, first.get());
        assert_eq!(
            id,
            fs::read_to_string(dir.path().join(INSTALLATION_FILE)).unwrap()
        );

        let second = InstallationId::new(Some(dir.path().to_owned()));
        assert_eq!(id, second.get());
    }

    #[test]
    fn reads_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(INSTALLATION_FILE), "existing-id\n").unwrap();

        let id = InstallationId::new(Some(dir.path().to_owned()));

        assert_eq!("existing-id", id.get());
    }

    #[test]
    fn creates_missing_cache_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("nested").join("cache");

        let id = InstallationId::new(Some(cache_dir.clone()));
        id.get();

        assert!(cache_dir.join(INSTALLATION_FILE).exists());
    }

    #[test]
    fn without_cache_dir_is_stable_per_instance() {
        let id = InstallationId::new(None);

        assert_eq!(id.get().to_owned(), id.get());
        assert_ne!(id.get(), InstallationId::new(None).get());
    }
}
