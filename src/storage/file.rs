//! Filesystem adapters.
//!
//! Layout under the data directory:
//!
//! ```text
//! <root>/<table>/<partition name>/record.json   {"version": .., "record": {..}}
//! <root>/<table>/<partition name>/.guard
//! <root>/<container>/<blob file name>
//! ```
//!
//! Names are escaped per character. Escaped names longer than
//! [`MAX_PLAIN_NAME`] are cut to a head and suffixed with `~` and the SHA-256
//! of the full name, so every file name stays within filesystem limits.
//! Blobs stored under such a name start with a header line carrying their
//! escaped full name.
//!
//! Record writes use temp file + rename. Every compare-and-swap on a record
//! holds an exclusive advisory lock on the partition's guard file, so that
//! processes sharing the directory serialize their updates. The lock dies with
//! its process. Blobs are published with a hard link from a fully written temp
//! file, which makes `put` create-only and never exposes a partial blob.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::StorageConfig;
use crate::core::key::{escape_component, unescape_component};
use crate::core::{SessionKey, SessionRecord, Version, Versioned};
use crate::error::{Result, StoreError};
use crate::storage::{BlobStore, MetadataStore};

/// File name of the record inside a partition directory.
const RECORD_FILE: &str = "record.json";

/// File name of the compare-and-swap guard inside a partition directory.
const GUARD_FILE: &str = ".guard";

/// Longest escaped name used as a file name verbatim.
pub const MAX_PLAIN_NAME: usize = 200;

/// Length of the escaped head kept in front of a digest.
const HASHED_HEAD: usize = 120;

/// Separates head and digest. Never produced by [`escape_component`].
const DIGEST_MARK: char = '~';

fn fresh_version() -> Version {
    Version(uuid::Uuid::new_v4().as_u64_pair().0)
}

/// Bounded file name for an already escaped name. `source` feeds the digest.
fn bounded_file_name(escaped: String, source: &str) -> String {
    if escaped.len() <= MAX_PLAIN_NAME {
        return escaped;
    }
    // Escaped names are ASCII, any byte index is a char boundary
    format!(
        "{}{}{:x}",
        &escaped[..HASHED_HEAD],
        DIGEST_MARK,
        Sha256::digest(source.as_bytes())
    )
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(true)
}

/// Write `bytes` to `path` atomically using temp file + rename.
fn atomic_write(path: &Path, temp_path: &Path, bytes: &[u8]) -> Result<()> {
    {
        let mut file = File::create(temp_path).map_err(|e| StoreError::storage(temp_path, e))?;
        file.write_all(bytes)
            .map_err(|e| StoreError::storage(temp_path, e))?;
        file.sync_all()
            .map_err(|e| StoreError::storage(temp_path, e))?;
    }
    fs::rename(temp_path, path).map_err(|e| StoreError::storage(path, e))?;
    Ok(())
}

/// Whether `path` still names the file behind `file`.
#[cfg(unix)]
fn still_linked(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (file.metadata(), fs::metadata(path)) {
        (Ok(held), Ok(current)) => held.dev() == current.dev() && held.ino() == current.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn still_linked(_file: &File, path: &Path) -> bool {
    path.exists()
}

/// Exclusive advisory lock on one partition's guard file. Released on drop.
#[derive(Debug)]
struct PartitionGuard {
    _file: File,
}

impl PartitionGuard {
    /// Lock the partition without waiting; a held lock is a transient error.
    fn acquire(partition: &Path) -> Result<Self> {
        let path = partition.join(GUARD_FILE);
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| Self::busy(&path, e))?;
        Self::lock(file, &path)
    }

    fn lock(file: File, path: &Path) -> Result<Self> {
        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                return Err(StoreError::unavailable(format!(
                    "record guarded by {} is being updated by another writer",
                    path.display()
                )));
            }
            Err(e) => return Err(Self::busy(path, e)),
        }
        // A deleter may have unlinked the guard while we waited on its inode
        if !still_linked(&file, path) {
            return Err(StoreError::unavailable(format!(
                "guard {} was removed during acquisition",
                path.display()
            )));
        }
        Ok(Self { _file: file })
    }

    /// Guard failures are races with a concurrent delete or another writer,
    /// hence transient.
    fn busy(path: &Path, err: io::Error) -> StoreError {
        StoreError::unavailable(format!("cannot guard {}: {}", path.display(), err))
    }
}

/// File-based metadata store.
#[derive(Debug, Clone)]
pub struct FileMetadataStore {
    /// Directory holding one subdirectory per session key.
    table_dir: PathBuf,
}

impl FileMetadataStore {
    /// Create a store for `table_name` under `root`.
    ///
    /// Nothing is created on disk until [`MetadataStore::ensure_exists`].
    pub fn new(root: impl Into<PathBuf>, table_name: &str) -> Self {
        Self {
            table_dir: root.into().join(table_name),
        }
    }

    /// Create a store from the storage section of the configuration.
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        Ok(Self::new(config.resolve_root()?, &config.table_name))
    }

    pub fn table_dir(&self) -> &Path {
        &self.table_dir
    }

    /// Directory of a single session key: `<app>+<id>`, each escaped once.
    fn partition_dir(&self, key: &SessionKey) -> PathBuf {
        let escaped = format!(
            "{}+{}",
            escape_component(key.application_name()),
            escape_component(key.session_id())
        );
        self.table_dir
            .join(bounded_file_name(escaped, &key.to_string()))
    }

    fn read_row(path: &Path) -> Result<Versioned<SessionRecord>> {
        let content = fs::read_to_string(path).map_err(|e| StoreError::storage(path, e))?;
        serde_json::from_str(&content)
            .map_err(|e| StoreError::serde(format!("{}: {}", path.display(), e)))
    }

    fn write_row(partition: &Path, row: &Versioned<SessionRecord>) -> Result<()> {
        let json = serde_json::to_string_pretty(row)?;
        let path = partition.join(RECORD_FILE);
        let temp_path = partition.join(format!(".{}.tmp", RECORD_FILE));
        atomic_write(&path, &temp_path, json.as_bytes())
    }

    /// Rows of a partition, requiring exactly one at `expected`.
    fn check_current(&self, key: &SessionKey, partition: &Path, expected: Version) -> Result<()> {
        let rows = self.read_partition(key, partition)?;
        match rows.as_slice() {
            [] => Err(StoreError::not_found(key.to_string())),
            [row] if row.version == expected => Ok(()),
            [_] => Err(StoreError::version_conflict(key.to_string())),
            _ => Err(StoreError::integrity(format!(
                "{} records stored under session key {}",
                rows.len(),
                key
            ))),
        }
    }

    fn read_partition(
        &self,
        key: &SessionKey,
        partition: &Path,
    ) -> Result<Vec<Versioned<SessionRecord>>> {
        let entries = match fs::read_dir(partition) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::storage(partition, e)),
        };

        let mut rows = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::storage(partition, e))?;
            let path = entry.path();

            // Skip guard and temp files
            if is_hidden(&path) {
                continue;
            }
            if path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }

            match Self::read_row(&path) {
                Ok(row) => rows.push(row),
                // Deleted between listing and reading
                Err(StoreError::Storage { source, .. })
                    if source.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }

        if let Some(row) = rows.iter().find(|row| row.value.key() != *key) {
            return Err(StoreError::integrity(format!(
                "partition of {} holds a record for {}",
                key,
                row.value.key()
            )));
        }
        Ok(rows)
    }
}

impl MetadataStore for FileMetadataStore {
    fn ensure_exists(&self) -> Result<()> {
        if !self.table_dir.exists() {
            debug!(path = %self.table_dir.display(), "creating session table");
            fs::create_dir_all(&self.table_dir)
                .map_err(|e| StoreError::storage(&self.table_dir, e))?;
        }
        Ok(())
    }

    fn query(&self, key: &SessionKey) -> Result<Vec<Versioned<SessionRecord>>> {
        self.read_partition(key, &self.partition_dir(key))
    }

    fn insert(&self, record: &SessionRecord) -> Result<Version> {
        let key = record.key();
        let partition = self.partition_dir(&key);
        fs::create_dir_all(&partition).map_err(|e| StoreError::storage(&partition, e))?;

        let _guard = PartitionGuard::acquire(&partition)?;
        if !self.read_partition(&key, &partition)?.is_empty() {
            return Err(StoreError::already_exists(key.to_string()));
        }
        let row = Versioned::new(fresh_version(), record.clone());
        Self::write_row(&partition, &row)?;
        Ok(row.version)
    }

    fn conditional_put(&self, record: &SessionRecord, expected: Version) -> Result<Version> {
        let key = record.key();
        let partition = self.partition_dir(&key);
        if !partition.is_dir() {
            return Err(StoreError::not_found(key.to_string()));
        }

        let _guard = PartitionGuard::acquire(&partition)?;
        self.check_current(&key, &partition, expected)?;
        let row = Versioned::new(fresh_version(), record.clone());
        Self::write_row(&partition, &row)?;
        Ok(row.version)
    }

    fn delete(&self, key: &SessionKey, expected: Version) -> Result<()> {
        let partition = self.partition_dir(key);
        if !partition.is_dir() {
            return Err(StoreError::not_found(key.to_string()));
        }

        let _guard = PartitionGuard::acquire(&partition)?;
        self.check_current(key, &partition, expected)?;
        let path = partition.join(RECORD_FILE);
        fs::remove_file(&path).map_err(|e| StoreError::storage(&path, e))?;

        // Unlink the guard while still holding it; writers queued on the old
        // inode notice and retry against a fresh directory
        let _ = fs::remove_file(partition.join(GUARD_FILE));
        let _ = fs::remove_dir(&partition);
        Ok(())
    }
}

/// File-based blob store.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    /// Directory holding one file per blob.
    container_dir: PathBuf,
}

impl FileBlobStore {
    /// Create a store for `container_name` under `root`.
    ///
    /// Nothing is created on disk until [`BlobStore::ensure_exists`].
    pub fn new(root: impl Into<PathBuf>, container_name: &str) -> Self {
        Self {
            container_dir: root.into().join(container_name),
        }
    }

    /// Create a store from the storage section of the configuration.
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        Ok(Self::new(config.resolve_root()?, &config.container_name))
    }

    pub fn container_dir(&self) -> &Path {
        &self.container_dir
    }

    fn file_name(name: &str) -> String {
        bounded_file_name(escape_component(name), name)
    }

    fn is_digest_name(file_name: &str) -> bool {
        file_name.contains(DIGEST_MARK)
    }

    fn blob_path(&self, name: &str) -> PathBuf {
        self.container_dir.join(Self::file_name(name))
    }

    fn temp_path(&self, name: &str) -> PathBuf {
        self.container_dir.join(format!(
            ".{}.{}.tmp",
            Self::file_name(name),
            uuid::Uuid::new_v4().simple()
        ))
    }

    /// Full blob name recorded in the header of a digest-named file.
    fn read_header(path: &Path) -> Result<Option<String>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::storage(path, e)),
        };
        let mut line = String::new();
        BufReader::new(file)
            .read_line(&mut line)
            .map_err(|e| StoreError::storage(path, e))?;
        unescape_component(line.trim_end_matches('\n'))
            .map(Some)
            .ok_or_else(|| StoreError::integrity(format!("bad blob header in {}", path.display())))
    }

    /// Strip and check the header of a digest-named blob.
    fn split_header(name: &str, path: &Path, mut bytes: Vec<u8>) -> Result<Vec<u8>> {
        let expected = escape_component(name);
        let newline = bytes.iter().position(|b| *b == b'\n');
        match newline {
            Some(end) if bytes[..end] == *expected.as_bytes() => Ok(bytes.split_off(end + 1)),
            _ => Err(StoreError::integrity(format!(
                "{} does not hold blob {}",
                path.display(),
                name
            ))),
        }
    }
}

impl BlobStore for FileBlobStore {
    fn ensure_exists(&self) -> Result<()> {
        if !self.container_dir.exists() {
            debug!(path = %self.container_dir.display(), "creating blob container");
            fs::create_dir_all(&self.container_dir)
                .map_err(|e| StoreError::storage(&self.container_dir, e))?;
        }
        Ok(())
    }

    fn put(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let file_name = Self::file_name(name);
        let path = self.container_dir.join(&file_name);
        if path.exists() {
            return Err(StoreError::already_exists(name));
        }

        let temp_path = self.temp_path(name);
        let written = (|| -> Result<()> {
            let mut file =
                File::create(&temp_path).map_err(|e| StoreError::storage(&temp_path, e))?;
            if Self::is_digest_name(&file_name) {
                writeln!(file, "{}", escape_component(name))
                    .map_err(|e| StoreError::storage(&temp_path, e))?;
            }
            file.write_all(bytes)
                .map_err(|e| StoreError::storage(&temp_path, e))?;
            file.sync_all()
                .map_err(|e| StoreError::storage(&temp_path, e))?;
            Ok(())
        })();

        // Publish create-only: hard_link refuses to replace an existing name
        let published = written.and_then(|()| {
            fs::hard_link(&temp_path, &path).map_err(|e| {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    StoreError::already_exists(name)
                } else {
                    StoreError::storage(&path, e)
                }
            })
        });

        let _ = fs::remove_file(&temp_path);
        published
    }

    fn get(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let file_name = Self::file_name(name);
        let path = self.container_dir.join(&file_name);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::storage(&path, e)),
        };
        if Self::is_digest_name(&file_name) {
            return Self::split_header(name, &path, bytes).map(Some);
        }
        Ok(Some(bytes))
    }

    fn delete(&self, name: &str) -> Result<bool> {
        let path = self.blob_path(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::storage(&path, e)),
        }
    }

    fn list_by_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.container_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::storage(&self.container_dir, e)),
        };

        // Escaping is per character, so prefixes survive it
        let escaped_prefix = escape_component(prefix);
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::storage(&self.container_dir, e))?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if file_name.starts_with('.') {
                continue;
            }

            match file_name.split_once(DIGEST_MARK) {
                None => {
                    if !file_name.starts_with(&escaped_prefix) {
                        continue;
                    }
                    if let Some(name) = unescape_component(&file_name) {
                        names.push(name);
                    }
                }
                Some((head, _)) => {
                    if !head.starts_with(&escaped_prefix) && !escaped_prefix.starts_with(head) {
                        continue;
                    }
                    if let Some(name) = Self::read_header(&entry.path())? {
                        if name.starts_with(prefix) {
                            names.push(name);
                        }
                    }
                }
            }
        }
        Ok(names)
    }
}
