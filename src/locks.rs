//! In-memory lock table: exclusive write locks, at most one per path.
//!
//! All operations run under a single table-wide mutex that is only held
//! for the map mutation itself, never across filesystem I/O. Expiry is
//! lazy: every operation treats an expired lock as absent. A periodic
//! [`purge_expired`](LockTable::purge_expired) sweep is optional and only
//! reclaims memory, it is not needed for correctness.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use log::trace;
use parking_lot::Mutex;
use uuid::Uuid;
use xmltree::Element;

use crate::davpath::DavPath;

/// An active exclusive write lock.
#[derive(Debug, Clone)]
pub struct DavLock {
    /// Opaque token, a urn:uuid URN.
    pub token: String,
    /// The locked path.
    pub path: DavPath,
    /// Owner element from the LOCK request body, echoed back verbatim.
    pub owner: Option<Element>,
    /// Granted timeout (relative, as reported to the client).
    pub timeout: Duration,
    /// Absolute expiry instant.
    pub expires_at: SystemTime,
    /// Depth: false = the resource itself, true = resource and descendants.
    pub deep: bool,
}

impl DavLock {
    fn expired(&self, now: SystemTime) -> bool {
        self.expires_at <= now
    }
}

/// The lock table. Cheap to clone; clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct LockTable(Arc<Mutex<HashMap<String, DavLock>>>);

// canonical map key: decoded path, no trailing slash ("/" for the root).
fn key(path: &DavPath) -> String {
    let mut b = path.as_bytes();
    if b.len() > 1 && b.ends_with(b"/") {
        b = &b[..b.len() - 1];
    }
    String::from_utf8_lossy(b).to_string()
}

// "/a/b/c" -> ["/a/b", "/a", "/"]
fn ancestors(key: &str) -> impl Iterator<Item = &str> {
    std::iter::successors(Some(key), |k| match k.rfind('/') {
        Some(0) if *k != "/" => Some("/"),
        Some(i) if i > 0 => Some(&k[..i]),
        _ => None,
    })
    .skip(1)
}

fn is_descendant(k: &str, of: &str) -> bool {
    if of == "/" {
        return k != "/";
    }
    k.len() > of.len() && k.starts_with(of) && k.as_bytes()[of.len()] == b'/'
}

impl LockTable {
    pub fn new() -> LockTable {
        LockTable::default()
    }

    /// Take an exclusive lock. Fails with the conflicting lock if the path
    /// is already locked, covered by a deep lock on an ancestor, or (for a
    /// deep request) has locked descendants.
    pub fn acquire(
        &self,
        path: &DavPath,
        deep: bool,
        owner: Option<Element>,
        timeout: Duration,
    ) -> Result<DavLock, DavLock> {
        let now = SystemTime::now();
        let mut table = self.0.lock();
        let k = key(path);

        if let Some(l) = find_covering(&table, &k, now) {
            return Err(l.clone());
        }
        if deep {
            if let Some(l) = table
                .values()
                .find(|l| !l.expired(now) && is_descendant(&key(&l.path), &k))
            {
                return Err(l.clone());
            }
        }

        let lock = DavLock {
            token: Uuid::new_v4().urn().to_string(),
            path: path.clone(),
            owner,
            timeout,
            expires_at: now + timeout,
            deep,
        };
        trace!("lock {} created on {}", lock.token, k);
        table.insert(k, lock.clone());
        Ok(lock)
    }

    /// Refresh the lock holding `token`, extending its expiry. An expired
    /// or unknown token is an error; expired locks are not refreshable.
    pub fn refresh(&self, token: &str, timeout: Duration) -> Result<DavLock, ()> {
        let now = SystemTime::now();
        let mut table = self.0.lock();
        let lock = table
            .values_mut()
            .find(|l| l.token == token && !l.expired(now))
            .ok_or(())?;
        lock.timeout = timeout;
        lock.expires_at = now + timeout;
        trace!("lock {} refreshed", token);
        Ok(lock.clone())
    }

    /// Release the lock on `path`. Succeeds only if an unexpired lock is
    /// held there and `token` matches it; releasing an absent lock is an
    /// error, to surface client bugs.
    pub fn release(&self, path: &DavPath, token: &str) -> Result<(), ()> {
        let now = SystemTime::now();
        let mut table = self.0.lock();
        let k = key(path);
        match table.get(&k) {
            Some(l) if l.token == token && !l.expired(now) => {
                table.remove(&k);
                Ok(())
            }
            _ => Err(()),
        }
    }

    /// Check whether a write to `path` may proceed: it may if the path is
    /// not covered by any lock, or if one of `tokens` matches the covering
    /// lock. On conflict the covering lock is returned.
    pub fn check(&self, path: &DavPath, tokens: &[&str]) -> Result<(), DavLock> {
        let now = SystemTime::now();
        let table = self.0.lock();
        match find_covering(&table, &key(path), now) {
            Some(l) if !tokens.contains(&l.token.as_str()) => Err(l.clone()),
            _ => Ok(()),
        }
    }

    /// The lock covering `path`, if any (for lockdiscovery).
    pub fn discover(&self, path: &DavPath) -> Option<DavLock> {
        let now = SystemTime::now();
        let table = self.0.lock();
        find_covering(&table, &key(path), now).cloned()
    }

    /// Discard the locks held on `path` and everything below it. Used
    /// after DELETE, and for the source (and overwritten destination) of
    /// a MOVE.
    pub fn discard_below(&self, path: &DavPath) {
        let mut table = self.0.lock();
        let k = key(path);
        table.retain(|tk, _| tk != &k && !is_descendant(tk, &k));
    }

    /// Drop expired entries. Purely a memory optimization.
    pub fn purge_expired(&self) {
        let now = SystemTime::now();
        self.0.lock().retain(|_, l| !l.expired(now));
    }
}

// the lock covering a path: one on the path itself, or a deep lock on
// an ancestor collection.
fn find_covering<'a>(
    table: &'a HashMap<String, DavLock>,
    k: &str,
    now: SystemTime,
) -> Option<&'a DavLock> {
    if let Some(l) = table.get(k) {
        if !l.expired(now) {
            return Some(l);
        }
    }
    for anc in ancestors(k) {
        if let Some(l) = table.get(anc) {
            if l.deep && !l.expired(now) {
                return Some(l);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> DavPath {
        DavPath::from_str(s, "").unwrap()
    }

    const T: Duration = Duration::from_secs(600);

    #[test]
    fn ancestors_walk() {
        let v: Vec<&str> = ancestors("/a/b/c").collect();
        assert_eq!(v, vec!["/a/b", "/a", "/"]);
        let v: Vec<&str> = ancestors("/a").collect();
        assert_eq!(v, vec!["/"]);
        let v: Vec<&str> = ancestors("/").collect();
        assert!(v.is_empty());
    }

    #[test]
    fn exclusive_per_path() {
        let ls = LockTable::new();
        let l = ls.acquire(&path("/f.txt"), false, None, T).unwrap();
        assert!(l.token.starts_with("urn:uuid:"));
        assert!(ls.acquire(&path("/f.txt"), false, None, T).is_err());
        // trailing slash doesn't make it a different resource
        assert!(ls.acquire(&path("/f.txt/"), false, None, T).is_err());
        // a sibling is fine
        assert!(ls.acquire(&path("/g.txt"), false, None, T).is_ok());
    }

    #[test]
    fn deep_ancestor_blocks_descendant() {
        let ls = LockTable::new();
        ls.acquire(&path("/dir/"), true, None, T).unwrap();
        assert!(ls.acquire(&path("/dir/f.txt"), false, None, T).is_err());
        assert!(ls.acquire(&path("/other"), false, None, T).is_ok());
    }

    #[test]
    fn descendant_blocks_deep_ancestor() {
        let ls = LockTable::new();
        ls.acquire(&path("/dir/f.txt"), false, None, T).unwrap();
        assert!(ls.acquire(&path("/dir/"), true, None, T).is_err());
        // a shallow lock on the collection itself is no conflict
        assert!(ls.acquire(&path("/dir/"), false, None, T).is_ok());
    }

    #[test]
    fn release_requires_matching_token() {
        let ls = LockTable::new();
        let l = ls.acquire(&path("/f"), false, None, T).unwrap();
        assert!(ls.release(&path("/f"), "urn:uuid:bogus").is_err());
        assert!(ls.release(&path("/g"), &l.token).is_err());
        assert!(ls.release(&path("/f"), &l.token).is_ok());
        // the lock is gone now, releasing again is an error
        assert!(ls.release(&path("/f"), &l.token).is_err());
    }

    #[test]
    fn check_with_tokens() {
        let ls = LockTable::new();
        let l = ls.acquire(&path("/dir/"), true, None, T).unwrap();
        assert!(ls.check(&path("/dir/f.txt"), &[]).is_err());
        assert!(ls.check(&path("/dir/f.txt"), &[l.token.as_str()]).is_ok());
        assert!(ls.check(&path("/unrelated"), &[]).is_ok());
    }

    #[test]
    fn refresh_extends_and_validates() {
        let ls = LockTable::new();
        let l = ls.acquire(&path("/f"), false, None, T).unwrap();
        let r = ls.refresh(&l.token, Duration::from_secs(60)).unwrap();
        assert_eq!(r.timeout, Duration::from_secs(60));
        assert!(ls.refresh("urn:uuid:bogus", T).is_err());
    }

    #[test]
    fn expired_locks_are_absent() {
        let ls = LockTable::new();
        let l = ls
            .acquire(&path("/f"), false, None, Duration::ZERO)
            .unwrap();
        std::thread::sleep(Duration::from_millis(5));
        // absent for check and release, not refreshable, re-acquirable
        assert!(ls.check(&path("/f"), &[]).is_ok());
        assert!(ls.refresh(&l.token, T).is_err());
        assert!(ls.release(&path("/f"), &l.token).is_err());
        assert!(ls.acquire(&path("/f"), false, None, T).is_ok());
    }

    #[test]
    fn discard_below_clears_subtree() {
        let ls = LockTable::new();
        ls.acquire(&path("/dir/a"), false, None, T).unwrap();
        ls.acquire(&path("/dir/sub/b"), false, None, T).unwrap();
        ls.acquire(&path("/elsewhere"), false, None, T).unwrap();
        ls.discard_below(&path("/dir/"));
        assert!(ls.acquire(&path("/dir/a"), false, None, T).is_ok());
        assert!(ls.acquire(&path("/dir/sub/b"), false, None, T).is_ok());
        assert!(ls.acquire(&path("/elsewhere"), false, None, T).is_err());
    }
}
