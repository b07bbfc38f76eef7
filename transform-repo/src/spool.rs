//! Deterministic on-disk layout for spooled blob content.
//!
//! A three-level, zero-padded directory split keyed by an allocation sequence number,
//! rather than a random collision-retry name: the path for a given blob is deterministic
//! from the order it was spooled in, and `Drop`-based cleanup removes the whole tree.

use std::fs;
use std::io;
use std::path::PathBuf;

/// Owns a repository's blob-spool directory and hands out deterministic paths within it.
#[derive(Debug)]
pub struct Spool {
    root: PathBuf,
    next_seq: u64,
}

impl Spool {
    /// Creates (but does not yet populate) the spool directory
    /// `<basedir>/.rs<pid>-<reponame>/blobs`.
    pub fn create(base_dir: &std::path::Path, repo_name: &str, pid: u32) -> io::Result<Spool> {
        let root = base_dir.join(format!(".rs{pid}-{repo_name}")).join("blobs");
        fs::create_dir_all(&root)?;
        Ok(Spool { root, next_seq: 0 })
    }

    /// Allocates the next deterministic blob path, creating its parent directories.
    pub fn allocate(&mut self) -> io::Result<PathBuf> {
        let seq = self.next_seq;
        self.next_seq += 1;
        let padded = format!("{seq:09}");
        let (a, rest) = padded.split_at(3);
        let (b, c) = rest.split_at(3);
        let dir = self.root.join(a).join(b);
        fs::create_dir_all(&dir)?;
        Ok(dir.join(c))
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// Releases the spool directory and everything under it.
    pub fn cleanup(&self) -> io::Result<()> {
        if self.root.exists() {
            // The spool directory is `<basedir>/.rs<pid>-<reponame>/blobs`; remove the
            // parent too so no empty `.rs<pid>-<reponame>` directory is left behind.
            if let Some(parent) = self.root.parent() {
                return fs::remove_dir_all(parent);
            }
            fs::remove_dir_all(&self.root)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_deterministic_nested_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut spool = Spool::create(dir.path(), "myrepo", 1234).unwrap();
        let p0 = spool.allocate().unwrap();
        let p1 = spool.allocate().unwrap();
        assert!(p0.ends_with("000/000/000"));
        assert!(p1.ends_with("000/000/001"));
        assert!(p0.parent().unwrap().exists());
    }

    #[test]
    fn cleanup_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let spool = Spool::create(dir.path(), "myrepo", 1234).unwrap();
        let marker = spool.root().join("a").join("b");
        fs::create_dir_all(&marker).unwrap();
        spool.cleanup().unwrap();
        assert!(!dir.path().join(format!(".rs1234-myrepo")).exists());
    }
}
