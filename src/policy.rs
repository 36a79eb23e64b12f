//! Which names are operable at all: the extension allow-list and the
//! hidden-item rule. Configured once at handler construction, read-only
//! afterwards.
use crate::davpath::DavPath;

#[derive(Debug, Clone, Default)]
pub(crate) struct Policy {
    // lowercased extensions; None means everything goes.
    allowed_extensions: Option<Vec<String>>,
    allow_hidden: bool,
}

impl Policy {
    pub fn new(allowed_extensions: Option<Vec<String>>, allow_hidden: bool) -> Policy {
        let allowed_extensions =
            allowed_extensions.map(|v| v.iter().map(|e| e.to_lowercase()).collect());
        Policy {
            allowed_extensions,
            allow_hidden,
        }
    }

    // check a single name (one path segment).
    pub fn name_allowed(&self, name: &[u8], is_collection: bool) -> bool {
        if !self.allow_hidden && name.starts_with(b".") {
            return false;
        }
        // the extension rule applies to files only.
        if is_collection {
            return true;
        }
        match self.allowed_extensions {
            None => true,
            Some(ref exts) => match name.rsplitn(2, |&c| c == b'.').collect::<Vec<_>>()[..] {
                [ext, _] => match std::str::from_utf8(ext) {
                    Ok(e) => exts.iter().any(|a| a == &e.to_lowercase()),
                    Err(_) => false,
                },
                // no extension at all fails a configured list.
                _ => false,
            },
        }
    }

    // check a whole path: every segment must pass the hidden rule,
    // the final segment also passes the extension rule for files.
    pub fn path_allowed(&self, path: &DavPath, is_collection: bool) -> bool {
        let segs: Vec<&[u8]> = path.segments().collect();
        for (i, seg) in segs.iter().enumerate() {
            let last = i == segs.len() - 1;
            if !self.name_allowed(seg, !last || is_collection) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> DavPath {
        DavPath::from_str(s, "").unwrap()
    }

    #[test]
    fn unrestricted_by_default() {
        let p = Policy::new(None, false);
        assert!(p.path_allowed(&path("/a/b.bin"), false));
        assert!(p.path_allowed(&path("/a/noext"), false));
    }

    #[test]
    fn extension_allow_list() {
        let p = Policy::new(Some(vec!["txt".to_string(), "PNG".to_string()]), false);
        assert!(p.path_allowed(&path("/a/b.txt"), false));
        assert!(p.path_allowed(&path("/a/B.TXT"), false));
        assert!(p.path_allowed(&path("/a/c.png"), false));
        assert!(!p.path_allowed(&path("/a/b.pdf"), false));
        assert!(!p.path_allowed(&path("/a/noext"), false));
        // collections are exempt from the extension rule
        assert!(p.path_allowed(&path("/a/dir/"), true));
    }

    #[test]
    fn hidden_items() {
        let deny = Policy::new(None, false);
        assert!(!deny.path_allowed(&path("/.secret"), false));
        assert!(!deny.path_allowed(&path("/.git/config"), false));
        assert!(!deny.name_allowed(b".DS_Store", false));

        let allow = Policy::new(None, true);
        assert!(allow.path_allowed(&path("/.secret"), false));
    }
}
