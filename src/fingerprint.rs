//! Project fingerprinting for content-addressed lookups
//!
//! A fingerprint is the cache key for one invocation: the digest of every
//! tracked file under the project root, the platform tag and the literal
//! argument string. Modification times, ownership and traversal order never
//! influence it.

use crate::error::{CrosbyError, CrosbyResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::{Component, Path};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// Version-control metadata directories that are not dot-prefixed
const VCS_DIRS: &[&str] = &["CVS", "_darcs"];

/// Digest length in bytes (128 bits)
const DIGEST_LEN: usize = 16;

/// Cache key for one invocation in one project state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Sanitized relative path -> hex content digest
    pub files: BTreeMap<String, String>,
    /// `<os>-<arch>` tag
    pub platform: String,
    /// Command line after `crosby`, space-joined in order
    pub invocation: String,
}

impl Fingerprint {
    /// Walk `root` and build the fingerprint for `args` on `platform`.
    pub fn compute(root: &Path, args: &[String], platform: &str) -> CrosbyResult<Self> {
        let snapshot = Snapshot::capture(root)?;
        Ok(Self::from_snapshot(&snapshot, args, platform))
    }

    /// Build a fingerprint from an already captured tree snapshot
    pub fn from_snapshot(snapshot: &Snapshot, args: &[String], platform: &str) -> Self {
        let files = snapshot
            .files
            .iter()
            .map(|(path, digest)| (sanitize_key(path), digest.clone()))
            .collect();

        Self {
            files,
            platform: platform.to_string(),
            invocation: args.join(" "),
        }
    }

    /// Exact match: same platform, same invocation, same file count and
    /// every path mapping to the same digest.
    pub fn matches(&self, other: &Fingerprint) -> bool {
        self.platform == other.platform
            && self.invocation == other.invocation
            && self.files.len() == other.files.len()
            && self.files == other.files
    }

    /// Query semantics of the index: every file of `query` is present here
    /// with the same digest. Extra files on this side are allowed, so the
    /// caller still has to confirm with [`Fingerprint::matches`].
    pub fn covers(&self, query: &Fingerprint) -> bool {
        self.platform == query.platform
            && self.invocation == query.invocation
            && query
                .files
                .iter()
                .all(|(path, digest)| self.files.get(path) == Some(digest))
    }
}

/// Raw walk of a project tree: relative path -> content digest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    files: BTreeMap<String, String>,
}

impl Snapshot {
    /// Hash every tracked file under `root`.
    ///
    /// Any unreadable entry aborts the walk; a partial snapshot is never
    /// returned.
    pub fn capture(root: &Path) -> CrosbyResult<Self> {
        let mut files = BTreeMap::new();

        let walker = WalkDir::new(root)
            .min_depth(1)
            .into_iter()
            .filter_entry(|entry| !is_excluded(entry));

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(root).to_path_buf();
                CrosbyError::FingerprintIo {
                    path,
                    source: io::Error::from(e),
                }
            })?;

            if entry.file_type().is_dir() || !entry.path().is_file() {
                continue;
            }

            let relative = relative_key(root, entry.path());
            let digest = hash_file(entry.path())?;
            files.insert(relative, digest);
        }

        debug!("Fingerprinted {} files under {}", files.len(), root.display());
        Ok(Self { files })
    }

    /// Number of tracked files
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether no file is tracked
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Paths that are new in `self` or whose digest differs from `before`,
    /// in sorted order.
    pub fn changed_since(&self, before: &Snapshot) -> Vec<String> {
        self.files
            .iter()
            .filter(|(path, digest)| before.files.get(*path) != Some(*digest))
            .map(|(path, _)| path.clone())
            .collect()
    }
}

/// Platform tag combining OS and CPU architecture, e.g. `linux-amd64`
pub fn platform_tag() -> String {
    let os = match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    };
    let arch = match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        other => other,
    };
    format!("{}-{}", os, arch)
}

/// Escape characters that would clash with document-field syntax.
///
/// `_` is the escape character, so it is escaped first and distinct paths
/// never share a key.
pub fn sanitize_key(relative: &str) -> String {
    relative.replace('_', "_5F").replace('.', "_2E")
}

/// Hidden segments and VCS metadata are never tracked
fn is_excluded(entry: &DirEntry) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || (entry.file_type().is_dir() && VCS_DIRS.contains(&&*name))
}

/// Relative path with `/` separators regardless of platform
fn relative_key(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Hash a file's contents, returning the first 128 bits as hex
fn hash_file(path: &Path) -> CrosbyResult<String> {
    let io_err = |source| CrosbyError::FingerprintIo {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(io_err)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(io_err)?;
    let result = hasher.finalize();

    Ok(hex::encode(&result[..DIGEST_LEN]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn args(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.c"), "int main() { return util(); }").unwrap();
        fs::write(dir.path().join("util.c"), "int util() { return 0; }").unwrap();
        dir
    }

    #[test]
    fn deterministic() {
        let dir = project();
        let a = Fingerprint::compute(dir.path(), &args("gcc main.c"), "linux-amd64").unwrap();
        let b = Fingerprint::compute(dir.path(), &args("gcc main.c"), "linux-amd64").unwrap();

        assert_eq!(a, b);
        assert!(a.matches(&b));
        assert_eq!(a.files.len(), 2);
        assert_eq!(a.files["main_2Ec"].len(), 32);
    }

    #[test]
    fn content_change_changes_fingerprint() {
        let dir = project();
        let before = Fingerprint::compute(dir.path(), &args("make"), "linux-amd64").unwrap();
        fs::write(dir.path().join("util.c"), "int util() { return 1; }").unwrap();
        let after = Fingerprint::compute(dir.path(), &args("make"), "linux-amd64").unwrap();

        assert!(!before.matches(&after));
    }

    #[test]
    fn args_and_platform_are_part_of_the_key() {
        let dir = project();
        let base = Fingerprint::compute(dir.path(), &args("make all"), "linux-amd64").unwrap();
        let other_args = Fingerprint::compute(dir.path(), &args("make test"), "linux-amd64").unwrap();
        let other_arch = Fingerprint::compute(dir.path(), &args("make all"), "darwin-arm64").unwrap();

        assert_eq!(base.invocation, "make all");
        assert!(!base.matches(&other_args));
        assert!(!base.matches(&other_arch));
    }

    #[test]
    fn mtime_does_not_matter() {
        let dir = project();
        let before = Fingerprint::compute(dir.path(), &args("make"), "linux-amd64").unwrap();
        let content = fs::read(dir.path().join("main.c")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        fs::write(dir.path().join("main.c"), content).unwrap();
        let after = Fingerprint::compute(dir.path(), &args("make"), "linux-amd64").unwrap();

        assert!(before.matches(&after));
    }

    #[test]
    fn hidden_and_vcs_paths_are_skipped() {
        let dir = project();
        fs::create_dir_all(dir.path().join(".git/objects")).unwrap();
        fs::write(dir.path().join(".git/objects/ab"), "blob").unwrap();
        fs::write(dir.path().join(".env"), "SECRET=1").unwrap();
        fs::create_dir_all(dir.path().join("src/.cache")).unwrap();
        fs::write(dir.path().join("src/.cache/x"), "x").unwrap();
        fs::create_dir_all(dir.path().join("CVS")).unwrap();
        fs::write(dir.path().join("CVS/Entries"), "e").unwrap();
        fs::write(dir.path().join("src/lib.c"), "x").unwrap();

        let fp = Fingerprint::compute(dir.path(), &[], "linux-amd64").unwrap();
        let keys: Vec<_> = fp.files.keys().cloned().collect();
        assert_eq!(keys, vec!["main_2Ec", "src/lib_2Ec", "util_2Ec"]);
    }

    #[test]
    fn directories_are_not_hashed() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("empty/nested")).unwrap();
        let snapshot = Snapshot::capture(dir.path()).unwrap();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn count_mismatch_never_matches() {
        let dir = project();
        let small = Fingerprint::compute(dir.path(), &args("make"), "linux-amd64").unwrap();
        fs::write(dir.path().join("extra.h"), "#define X").unwrap();
        let large = Fingerprint::compute(dir.path(), &args("make"), "linux-amd64").unwrap();

        // Every file of the smaller tree is present in the larger one...
        assert!(large.covers(&small));
        // ...but the stored entry is not an exact match.
        assert!(!large.matches(&small));
        assert!(!small.matches(&large));
    }

    #[test]
    fn changed_since_reports_new_and_rewritten_files() {
        let dir = project();
        let before = Snapshot::capture(dir.path()).unwrap();
        fs::write(dir.path().join("app"), "ELF").unwrap();
        fs::write(dir.path().join("util.c"), "rewritten").unwrap();
        let after = Snapshot::capture(dir.path()).unwrap();

        assert_eq!(after.changed_since(&before), vec!["app", "util.c"]);
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_file_aborts() {
        use std::os::unix::fs::PermissionsExt;

        let dir = project();
        let locked = dir.path().join("locked.c");
        fs::write(&locked, "secret").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Root can read anything; only assert when permissions are enforced.
        if fs::read(&locked).is_err() {
            let err = Snapshot::capture(dir.path()).unwrap_err();
            assert!(matches!(err, CrosbyError::FingerprintIo { .. }));
        }
    }

    #[test]
    fn sanitize_escapes_dots() {
        assert_eq!(sanitize_key("src/main.c"), "src/main_2Ec");
        assert!(!sanitize_key("build/v1.2/out").contains('.'));
    }

    #[test]
    fn dot_and_underscore_paths_stay_distinct() {
        assert_ne!(sanitize_key("a.c"), sanitize_key("a_c"));
        assert_ne!(sanitize_key("a_2Ec"), sanitize_key("a.c"));

        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.c"), "one").unwrap();
        fs::write(dir.path().join("a_c"), "two").unwrap();
        let before = Fingerprint::compute(dir.path(), &args("make"), "linux-amd64").unwrap();
        assert_eq!(before.files.len(), 2);

        fs::write(dir.path().join("a.c"), "changed").unwrap();
        let after = Fingerprint::compute(dir.path(), &args("make"), "linux-amd64").unwrap();
        assert!(!before.matches(&after));
    }

    #[test]
    fn platform_tag_has_os_and_arch() {
        let tag = platform_tag();
        assert!(tag.contains('-'));
        assert!(!tag.contains("x86_64"));
    }
}
