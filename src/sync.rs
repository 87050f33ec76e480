//! fetch / push / clone orchestration
//!
//! resolves a remote by configured name or raw location, connects the
//! right transport and drives the per-ref transfers. the heavy lifting
//! (traversal, copying, safety checks) lives in the remote layer.

use std::path::Path;

use tracing::info;

use crate::error::{Error, Result};
use crate::progress::ProgressListener;
use crate::refs::{self, Ref};
use crate::remote::{self, RemoteRepo};
use crate::repo::Repository;

/// fetch options
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// glob pattern selecting which remote refs to fetch; all heads and
    /// tags when absent
    pub refspec: Option<String>,
    /// bound the fetched history to this many generations
    pub depth: Option<u64>,
}

/// result of a fetch operation
#[derive(Debug)]
pub struct FetchResult {
    /// refs updated locally, with their new values
    pub updated: Vec<Ref>,
}

/// fetch new history from a remote
///
/// `remote_name_or_url` is looked up among the configured remotes first;
/// anything else is treated as a raw location (path or url). a
/// depth-bounded fetch into a previously complete repository records the
/// depth, turning it into a shallow clone.
pub fn fetch(
    repo: &mut Repository,
    remote_name_or_url: &str,
    options: &FetchOptions,
    progress: &mut ProgressListener,
) -> Result<FetchResult> {
    let location = resolve_location(repo, remote_name_or_url);
    let mut remote = remote::connect(&location)?;
    remote.open()?;

    let result = fetch_from(repo, remote.as_mut(), options, progress);
    remote.close()?;
    let updated = result?;

    if options.depth.is_some() && repo.depth().is_none() {
        repo.set_depth(options.depth)?;
    }

    info!(
        remote = remote_name_or_url,
        refs = updated.len(),
        "fetch finished"
    );
    Ok(FetchResult { updated })
}

fn fetch_from(
    repo: &Repository,
    remote: &mut dyn RemoteRepo,
    options: &FetchOptions,
    progress: &mut ProgressListener,
) -> Result<Vec<Ref>> {
    let candidates = remote.list_refs(true, true)?;
    let selected = match &options.refspec {
        Some(pattern) => {
            let glob =
                glob::Pattern::new(pattern).map_err(|e| Error::InvalidRef(e.to_string()))?;
            candidates
                .into_iter()
                .filter(|r| glob.matches(r.name()))
                .collect()
        }
        None => candidates,
    };

    let mut updated = Vec::new();
    for reference in selected {
        if reference.id().is_null() {
            continue;
        }
        remote.fetch_new_data(repo, &reference, options.depth, progress)?;
        updated.push(Ref::direct(reference.name(), reference.id()));
    }
    Ok(updated)
}

/// push options
#[derive(Debug, Clone, Default)]
pub struct PushOptions {
    /// remote ref to update; the local ref's own name when absent
    pub refspec: Option<String>,
}

/// push a local ref to a remote
///
/// the remote rejects the update unless it is a fast-forward; see the
/// push safety check in the remote layer for the exact ladder.
pub fn push(
    repo: &Repository,
    remote_name_or_url: &str,
    ref_name: &str,
    options: &PushOptions,
    progress: &mut ProgressListener,
) -> Result<Ref> {
    let reference = refs::read_ref(repo, ref_name)?;
    if reference.id().is_null() {
        return Err(Error::RefNotFound(ref_name.to_string()));
    }
    // a symbolic ref pushes the branch it points at
    let source_name = reference.target().unwrap_or(reference.name()).to_string();
    let reference = Ref::direct(source_name.clone(), reference.id());

    let refspec = options.refspec.as_deref().unwrap_or(&source_name);

    let location = resolve_location(repo, remote_name_or_url);
    let mut remote = remote::connect(&location)?;
    remote.open()?;

    let result = remote.push_new_data(repo, &reference, refspec, progress);
    remote.close()?;
    result?;

    info!(remote = remote_name_or_url, refspec, "push finished");
    Ok(Ref::direct(refspec, reference.id()))
}

/// clone a remote repository into a new directory
///
/// fetches every head and tag, points the local `HEAD` at the same branch
/// as the remote's, and records the origin remote in the configuration.
/// with `depth` the clone is shallow and stays shallow: the depth is
/// persisted so later fetches keep using the shallow policy.
pub fn clone_repository(
    url: &str,
    path: &Path,
    depth: Option<u64>,
    progress: &mut ProgressListener,
) -> Result<Repository> {
    let mut repo = Repository::init(path)?;
    repo.config_mut().add_remote("origin", url)?;
    repo.save_config()?;

    let mut remote = remote::connect(url)?;
    remote.open()?;

    let options = FetchOptions {
        refspec: None,
        depth,
    };
    let fetched = fetch_from(&repo, remote.as_mut(), &options, progress);

    // match the remote's checked-out branch when it has one
    let head = remote.head_ref();
    remote.close()?;
    if let Err(e) = fetched {
        // a failed clone leaves nothing behind
        let _ = std::fs::remove_dir_all(path);
        return Err(e);
    }

    if let Ok(head) = head {
        if let Some(target) = head.target() {
            refs::write_symref(&repo, refs::HEAD, target)?;
        }
    }

    if depth.is_some() {
        repo.set_depth(depth)?;
    }

    info!(url, path = %path.display(), "clone finished");
    Ok(repo)
}

/// configured remote url for a name, or the name itself as a raw location
fn resolve_location(repo: &Repository, name_or_url: &str) -> String {
    match repo.config().get_remote(name_or_url) {
        Some(remote) => remote.url.clone(),
        None => name_or_url.to_string(),
    }
}
