//! The vault file: import and atomic export.
//!
//! On disk the vault is a UTF-8 JSON array. Each element is an object with
//! seven string fields (`space`, `key`, `value`, `hmac`, `hmac_salt`,
//! `salt`, `iv`), each holding the base64 encoding of the raw bytes.
//! Unknown fields are permitted and ignored; a missing field, a non-string
//! field, a non-array top level or malformed base64 is a schema error.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec;
use crate::crypto::WorkFactor;
use crate::entry::Entry;
use crate::Error;

/// The JSON shape of one entry. The binary fields travel base64-encoded.
#[derive(Serialize, Deserialize)]
struct RawEntry {
    space: String,
    key: String,
    value: String,
    hmac: String,
    hmac_salt: String,
    salt: String,
    iv: String,
}

impl RawEntry {
    fn from_entry(entry: &Entry) -> RawEntry {
        RawEntry {
            space: codec::encode(&entry.space),
            key: codec::encode(&entry.key),
            value: codec::encode(&entry.value),
            hmac: codec::encode(&entry.hmac),
            hmac_salt: codec::encode(&entry.hmac_salt),
            salt: codec::encode(&entry.salt),
            iv: codec::encode(&entry.iv),
        }
    }

    fn into_entry(self) -> Result<Entry, Error> {
        Ok(Entry {
            space: codec::decode(&self.space)?,
            key: codec::decode(&self.key)?,
            value: codec::decode(&self.value)?,
            hmac: codec::decode(&self.hmac)?,
            hmac_salt: codec::decode(&self.hmac_salt)?,
            salt: codec::decode(&self.salt)?,
            iv: codec::decode(&self.iv)?,
            // the file does not persist a work factor; callers overwrite
            // this from their configuration
            work_factor: WorkFactor::default(),
        })
    }
}

/// Read every entry from the vault file, in file order.
pub fn import(path: &Path) -> Result<Vec<Entry>, Error> {
    let file = File::open(path)?;
    // SAFETY: the mapping is read-only and private; a concurrent writer is
    // excluded by the advisory lock callers hold for the command duration.
    let map = unsafe { Mmap::map(&file)? };

    let raw: Vec<RawEntry> = serde_json::from_slice(&map).map_err(|_| Error::BadSchema)?;
    let entries = raw
        .into_iter()
        .map(RawEntry::into_entry)
        .collect::<Result<Vec<_>, _>>()?;

    debug!(count = entries.len(), path = %path.display(), "imported entries");
    Ok(entries)
}

/// Serialise `entries` and atomically replace the vault file.
///
/// The content is written to a sibling `"{path}~"` with mode 0600 and
/// renamed over `path` only once the write has fully succeeded; a failed
/// write removes the temporary file and leaves the original untouched.
/// `path` is resolved through any symbolic links first so the rename never
/// crosses a filesystem.
pub fn export(path: &Path, entries: &[Entry]) -> Result<(), Error> {
    let raw: Vec<RawEntry> = entries.iter().map(RawEntry::from_entry).collect();
    let json = serde_json::to_string(&raw).map_err(|_| Error::BadSchema)?;

    let target = resolve_symlinks(path)?;
    let mut name = OsString::from(target.as_os_str());
    name.push("~");
    let staging = PathBuf::from(name);

    if let Err(error) = write_private(&staging, json.as_bytes()) {
        let _ = fs::remove_file(&staging);
        return Err(error);
    }
    if let Err(error) = fs::rename(&staging, &target) {
        let _ = fs::remove_file(&staging);
        return Err(error.into());
    }

    debug!(count = entries.len(), path = %target.display(), "exported entries");
    Ok(())
}

fn write_private(path: &Path, content: &[u8]) -> Result<(), Error> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(content)?;
    Ok(())
}

/// Resolve `path` through any symlinks, tolerating the file not existing
/// yet (in which case the parent directory is resolved instead).
fn resolve_symlinks(path: &Path) -> Result<PathBuf, Error> {
    match fs::canonicalize(path) {
        Ok(resolved) => Ok(resolved),
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            let name = path
                .file_name()
                .ok_or_else(|| Error::Io(io::Error::other("path has no file name")))?;
            let parent = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            Ok(fs::canonicalize(parent)?.join(name))
        }
        Err(error) => Err(error.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fast() -> WorkFactor {
        WorkFactor::new(10).unwrap()
    }

    fn sample_entry(main: &crate::secure::Passphrase) -> Entry {
        let mut entry = Entry::new(main, b"foo.com", b"username", b"bob", fast()).unwrap();
        entry.set_mac(main).unwrap();
        entry
    }

    #[test]
    fn empty_export_is_the_empty_array() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vault.json");
        export(&path, &[]).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"[]");
    }

    #[test]
    fn export_import_round_trip_preserves_order() {
        let main = crate::secure::Passphrase::new("hello world").unwrap();
        let first = sample_entry(&main);
        let second = sample_entry(&main);

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vault.json");
        export(&path, &[first.clone(), second.clone()]).unwrap();

        let imported = import(&path).unwrap();
        assert_eq!(imported.len(), 2);
        assert_eq!(imported[0].space, first.space);
        assert_eq!(imported[0].hmac, first.hmac);
        assert_eq!(imported[1].space, second.space);
    }

    #[test]
    fn export_leaves_no_staging_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vault.json");
        export(&path, &[]).unwrap();
        let staging = dir.path().join("vault.json~");
        assert!(!staging.exists());
    }

    #[cfg(unix)]
    #[test]
    fn exported_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vault.json");
        export(&path, &[]).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn export_follows_symlinks() {
        let dir = TempDir::new().unwrap();
        let real = dir.path().join("real.json");
        export(&real, &[]).unwrap();

        let link = dir.path().join("link.json");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let main = crate::secure::Passphrase::new("hello world").unwrap();
        export(&link, &[sample_entry(&main)]).unwrap();

        // the link still points at the real file, which now has one entry
        assert!(link.symlink_metadata().unwrap().file_type().is_symlink());
        assert_eq!(import(&real).unwrap().len(), 1);
    }

    #[test]
    fn failed_export_leaves_the_original_untouched() {
        let main = crate::secure::Passphrase::new("hello world").unwrap();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vault.json");
        export(&path, &[sample_entry(&main)]).unwrap();
        let before = fs::read(&path).unwrap();

        // occupy the staging name with a directory so the write cannot start
        fs::create_dir(dir.path().join("vault.json~")).unwrap();
        assert!(export(&path, &[]).is_err());

        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn import_rejects_non_array_top_level() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vault.json");
        fs::write(&path, b"{\"space\": \"AA==\"}").unwrap();
        assert!(matches!(import(&path), Err(Error::BadSchema)));
    }

    #[test]
    fn import_rejects_missing_field() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vault.json");
        fs::write(&path, br#"[{"space":"","key":"","value":"","hmac":"","hmac_salt":"","salt":""}]"#)
            .unwrap();
        assert!(matches!(import(&path), Err(Error::BadSchema)));
    }

    #[test]
    fn import_rejects_non_string_field() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vault.json");
        fs::write(
            &path,
            br#"[{"space":3,"key":"","value":"","hmac":"","hmac_salt":"","salt":"","iv":""}]"#,
        )
        .unwrap();
        assert!(matches!(import(&path), Err(Error::BadSchema)));
    }

    #[test]
    fn import_rejects_malformed_base64() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vault.json");
        fs::write(
            &path,
            br#"[{"space":"!!!","key":"","value":"","hmac":"","hmac_salt":"","salt":"","iv":""}]"#,
        )
        .unwrap();
        assert!(matches!(import(&path), Err(Error::BadSchema)));
    }

    #[test]
    fn import_ignores_unknown_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vault.json");
        fs::write(
            &path,
            br#"[{"space":"","key":"","value":"","hmac":"","hmac_salt":"","salt":"","iv":"","comment":"hi"}]"#,
        )
        .unwrap();
        assert_eq!(import(&path).unwrap().len(), 1);
    }

    #[test]
    fn import_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nope.json");
        assert!(matches!(import(&path), Err(Error::Io(_))));
    }
}
