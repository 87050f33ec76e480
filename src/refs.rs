//! named pointers into the commit graph
//!
//! refs are the only mutable state in a repository. a direct ref maps a
//! name to an object id; a symbolic ref points at another ref by name
//! (`HEAD` -> `refs/heads/main`). each ref is a single file, updated
//! atomically by temp-write-and-rename.

use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

use crate::error::{Error, IoResultExt, Result};
use crate::id::ObjectId;
use crate::repo::Repository;

pub const HEAD: &str = "HEAD";
/// tree id of the current working snapshot
pub const WORK_HEAD: &str = "WORK_HEAD";
/// tree id of the current staging snapshot
pub const STAGE_HEAD: &str = "STAGE_HEAD";
pub const HEADS_PREFIX: &str = "refs/heads/";
pub const TAGS_PREFIX: &str = "refs/tags/";
pub const DEFAULT_BRANCH: &str = "refs/heads/main";

/// a named pointer: direct to an object id, or symbolic to another ref
///
/// a symbolic ref carries the resolved id of its target alongside the
/// target name, matching the wire text format
/// `"<name> <target> <objectId>"`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Ref {
    Direct {
        name: String,
        id: ObjectId,
    },
    Symbolic {
        name: String,
        target: String,
        id: ObjectId,
    },
}

impl Ref {
    pub fn direct(name: impl Into<String>, id: ObjectId) -> Self {
        Ref::Direct {
            name: name.into(),
            id,
        }
    }

    pub fn symbolic(name: impl Into<String>, target: impl Into<String>, id: ObjectId) -> Self {
        Ref::Symbolic {
            name: name.into(),
            target: target.into(),
            id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Ref::Direct { name, .. } => name,
            Ref::Symbolic { name, .. } => name,
        }
    }

    pub fn id(&self) -> ObjectId {
        match self {
            Ref::Direct { id, .. } => *id,
            Ref::Symbolic { id, .. } => *id,
        }
    }

    /// target ref name for symbolic refs
    pub fn target(&self) -> Option<&str> {
        match self {
            Ref::Direct { .. } => None,
            Ref::Symbolic { target, .. } => Some(target),
        }
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(self, Ref::Symbolic { .. })
    }

    /// parse the wire text format:
    /// `"<name> <objectId>"` or `"<name> <target> <objectId>"`
    pub fn parse(line: &str) -> Result<Ref> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            [name, id] => Ok(Ref::direct(*name, ObjectId::from_hex(id)?)),
            [name, target, id] => Ok(Ref::symbolic(*name, *target, ObjectId::from_hex(id)?)),
            _ => Err(Error::InvalidRef(line.to_string())),
        }
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ref::Direct { name, id } => write!(f, "{} {}", name, id),
            Ref::Symbolic { name, target, id } => write!(f, "{} {} {}", name, target, id),
        }
    }
}

/// write a direct ref (create or update)
pub fn write_ref(repo: &Repository, ref_name: &str, id: &ObjectId) -> Result<()> {
    write_ref_content(repo, ref_name, &id.to_hex())
}

/// write a symbolic ref pointing at another ref name
pub fn write_symref(repo: &Repository, ref_name: &str, target: &str) -> Result<()> {
    validate_ref_name(target)?;
    write_ref_content(repo, ref_name, &format!("ref: {}", target))
}

fn write_ref_content(repo: &Repository, ref_name: &str, content: &str) -> Result<()> {
    validate_ref_name(ref_name)?;

    let ref_path = ref_path(repo, ref_name);
    if let Some(parent) = ref_path.parent() {
        fs::create_dir_all(parent).with_path(parent)?;
    }

    // atomic write: temp -> fsync -> rename
    let tmp_path = repo.tmp_path().join(uuid::Uuid::new_v4().to_string());
    {
        let mut tmp_file = File::create(&tmp_path).with_path(&tmp_path)?;
        writeln!(tmp_file, "{}", content).with_path(&tmp_path)?;
        tmp_file.sync_all().with_path(&tmp_path)?;
    }
    fs::rename(&tmp_path, &ref_path).with_path(&ref_path)?;

    if let Some(parent) = ref_path.parent() {
        let dir = File::open(parent).with_path(parent)?;
        dir.sync_all().with_path(parent)?;
    }

    Ok(())
}

/// read a ref; symbolic refs resolve their target's id (NULL when the
/// target does not exist yet)
pub fn read_ref(repo: &Repository, ref_name: &str) -> Result<Ref> {
    let ref_path = ref_path(repo, ref_name);

    let content = fs::read_to_string(&ref_path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::RefNotFound(ref_name.to_string())
        } else {
            Error::Io {
                path: ref_path.clone(),
                source: e,
            }
        }
    })?;
    let content = content.trim();

    if let Some(target) = content.strip_prefix("ref: ") {
        let id = match read_ref(repo, target) {
            Ok(r) => r.id(),
            Err(Error::RefNotFound(_)) => ObjectId::NULL,
            Err(e) => return Err(e),
        };
        return Ok(Ref::symbolic(ref_name, target, id));
    }

    Ok(Ref::direct(ref_name, ObjectId::from_hex(content)?))
}

/// resolve a ref name to an object id
pub fn resolve(repo: &Repository, ref_name: &str) -> Result<ObjectId> {
    Ok(read_ref(repo, ref_name)?.id())
}

/// the repository HEAD ref
pub fn head_ref(repo: &Repository) -> Result<Ref> {
    read_ref(repo, HEAD)
}

/// delete a ref
pub fn delete_ref(repo: &Repository, ref_name: &str) -> Result<()> {
    let ref_path = ref_path(repo, ref_name);

    fs::remove_file(&ref_path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::RefNotFound(ref_name.to_string())
        } else {
            Error::Io {
                path: ref_path,
                source: e,
            }
        }
    })
}

/// check if a ref exists
pub fn ref_exists(repo: &Repository, ref_name: &str) -> bool {
    ref_path(repo, ref_name).exists()
}

/// list refs in the heads and/or tags namespaces
pub fn list_refs(repo: &Repository, heads: bool, tags: bool) -> Result<Vec<Ref>> {
    let mut names = Vec::new();
    if heads {
        collect_ref_names(repo, HEADS_PREFIX, &mut names)?;
    }
    if tags {
        collect_ref_names(repo, TAGS_PREFIX, &mut names)?;
    }
    names.sort();

    names
        .into_iter()
        .map(|name| read_ref(repo, &name))
        .collect()
}

/// list refs whose names match a glob pattern
pub fn list_refs_matching(repo: &Repository, pattern: &str) -> Result<Vec<Ref>> {
    let glob = glob::Pattern::new(pattern).map_err(|e| Error::InvalidRef(e.to_string()))?;
    Ok(list_refs(repo, true, true)?
        .into_iter()
        .filter(|r| glob.matches(r.name()))
        .collect())
}

/// update a direct ref and return its new value
pub fn update_ref(repo: &Repository, ref_name: &str, id: ObjectId) -> Result<Ref> {
    write_ref(repo, ref_name, &id)?;
    Ok(Ref::direct(ref_name, id))
}

/// get filesystem path for a ref
fn ref_path(repo: &Repository, ref_name: &str) -> PathBuf {
    repo.path().join(ref_name)
}

fn collect_ref_names(repo: &Repository, prefix: &str, names: &mut Vec<String>) -> Result<()> {
    let base = repo.path().join(prefix);
    if !base.exists() {
        return Ok(());
    }
    collect_dir(repo.path().to_path_buf(), &base, names)
}

/// recursively collect ref names relative to the repository root
fn collect_dir(root: PathBuf, dir: &PathBuf, names: &mut Vec<String>) -> Result<()> {
    for entry in fs::read_dir(dir).with_path(dir)? {
        let entry = entry.with_path(dir)?;
        let path = entry.path();

        if path.is_dir() {
            collect_dir(root.clone(), &path, names)?;
        } else if path.is_file() {
            if let Ok(rel) = path.strip_prefix(&root) {
                names.push(rel.to_string_lossy().replace('\\', "/"));
            }
        }
    }
    Ok(())
}

/// validate ref name
fn validate_ref_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidRef("empty ref name".to_string()));
    }

    let reserved = matches!(name, HEAD | WORK_HEAD | STAGE_HEAD);
    if !reserved && !name.starts_with("refs/") {
        return Err(Error::InvalidRef(format!(
            "ref name must live under refs/: {}",
            name
        )));
    }

    if name.ends_with('/') || name.contains("//") {
        return Err(Error::InvalidRef(format!("malformed ref name: {}", name)));
    }

    if name.contains('\0') || name.contains(char::is_whitespace) {
        return Err(Error::InvalidRef(format!(
            "ref name contains illegal characters: {}",
            name
        )));
    }

    // check for path traversal
    for component in name.split('/') {
        if component == "." || component == ".." {
            return Err(Error::InvalidRef(format!(
                "ref name cannot contain '.' or '..': {}",
                name
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_repo() -> (tempfile::TempDir, Repository) {
        let dir = tempdir().unwrap();
        let repo_path = dir.path().join("repo");
        let repo = Repository::init(&repo_path).unwrap();
        (dir, repo)
    }

    fn some_id() -> ObjectId {
        ObjectId::hash_of(b"commit")
    }

    #[test]
    fn test_write_and_read_ref() {
        let (_dir, repo) = test_repo();

        write_ref(&repo, "refs/heads/main", &some_id()).unwrap();
        let r = read_ref(&repo, "refs/heads/main").unwrap();

        assert_eq!(r.id(), some_id());
        assert!(!r.is_symbolic());
    }

    #[test]
    fn test_head_is_symbolic() {
        let (_dir, repo) = test_repo();

        // before the default branch exists, HEAD resolves to NULL
        let head = head_ref(&repo).unwrap();
        assert!(head.is_symbolic());
        assert_eq!(head.target(), Some(DEFAULT_BRANCH));
        assert!(head.id().is_null());

        // once the branch exists, HEAD resolves through it
        write_ref(&repo, DEFAULT_BRANCH, &some_id()).unwrap();
        let head = head_ref(&repo).unwrap();
        assert_eq!(head.id(), some_id());
    }

    #[test]
    fn test_delete_ref() {
        let (_dir, repo) = test_repo();

        write_ref(&repo, "refs/heads/topic", &some_id()).unwrap();
        assert!(ref_exists(&repo, "refs/heads/topic"));

        delete_ref(&repo, "refs/heads/topic").unwrap();
        assert!(!ref_exists(&repo, "refs/heads/topic"));
    }

    #[test]
    fn test_delete_nonexistent_ref() {
        let (_dir, repo) = test_repo();

        let result = delete_ref(&repo, "refs/heads/nonexistent");
        assert!(matches!(result, Err(Error::RefNotFound(_))));
    }

    #[test]
    fn test_read_nonexistent_ref() {
        let (_dir, repo) = test_repo();

        let result = read_ref(&repo, "refs/heads/nonexistent");
        assert!(matches!(result, Err(Error::RefNotFound(_))));
    }

    #[test]
    fn test_list_refs() {
        let (_dir, repo) = test_repo();

        write_ref(&repo, "refs/heads/main", &some_id()).unwrap();
        write_ref(&repo, "refs/heads/topic", &some_id()).unwrap();
        write_ref(&repo, "refs/tags/v1", &some_id()).unwrap();

        let heads = list_refs(&repo, true, false).unwrap();
        assert_eq!(heads.len(), 2);

        let tags = list_refs(&repo, false, true).unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name(), "refs/tags/v1");

        let all = list_refs(&repo, true, true).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_list_refs_matching() {
        let (_dir, repo) = test_repo();

        write_ref(&repo, "refs/heads/main", &some_id()).unwrap();
        write_ref(&repo, "refs/heads/feature/a", &some_id()).unwrap();
        write_ref(&repo, "refs/heads/feature/b", &some_id()).unwrap();

        let matching = list_refs_matching(&repo, "refs/heads/feature/*").unwrap();
        assert_eq!(matching.len(), 2);
    }

    #[test]
    fn test_ref_text_format_roundtrip() {
        let direct = Ref::direct("refs/heads/main", some_id());
        let parsed = Ref::parse(&direct.to_string()).unwrap();
        assert_eq!(direct, parsed);

        let symbolic = Ref::symbolic("HEAD", "refs/heads/main", some_id());
        let parsed = Ref::parse(&symbolic.to_string()).unwrap();
        assert_eq!(symbolic, parsed);
        assert_eq!(parsed.target(), Some("refs/heads/main"));
    }

    #[test]
    fn test_ref_parse_rejects_garbage() {
        assert!(Ref::parse("").is_err());
        assert!(Ref::parse("only-a-name").is_err());
        assert!(Ref::parse("name target id extra-token").is_err());
        assert!(Ref::parse("name not-hex").is_err());
    }

    #[test]
    fn test_invalid_ref_names() {
        let (_dir, repo) = test_repo();
        let id = some_id();

        assert!(write_ref(&repo, "", &id).is_err());
        assert!(write_ref(&repo, "outside", &id).is_err());
        assert!(write_ref(&repo, "refs/heads/end/", &id).is_err());
        assert!(write_ref(&repo, "refs//double", &id).is_err());
        assert!(write_ref(&repo, "refs/heads/../escape", &id).is_err());
        assert!(write_ref(&repo, "refs/heads/with space", &id).is_err());

        // reserved top-level names are allowed
        assert!(write_ref(&repo, WORK_HEAD, &id).is_ok());
        assert!(write_ref(&repo, STAGE_HEAD, &id).is_ok());
    }

    #[test]
    fn test_overwrite_ref() {
        let (_dir, repo) = test_repo();

        let id1 = ObjectId::hash_of(b"one");
        let id2 = ObjectId::hash_of(b"two");

        write_ref(&repo, "refs/heads/main", &id1).unwrap();
        write_ref(&repo, "refs/heads/main", &id2).unwrap();

        assert_eq!(resolve(&repo, "refs/heads/main").unwrap(), id2);
    }

    #[test]
    fn test_update_ref_returns_new_value() {
        let (_dir, repo) = test_repo();
        let updated = update_ref(&repo, "refs/heads/main", some_id()).unwrap();
        assert_eq!(updated, Ref::direct("refs/heads/main", some_id()));
    }
}
