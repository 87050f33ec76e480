//! HTTP remote repository
//!
//! drives the same traversals as the same-machine transport over a
//! request/response wire: object existence checks, parent lookups and ref
//! resolution are round trips, and pushed objects travel as pack streams.
//! calls block for the duration of each round trip; retry and timeout
//! policy belong to the caller. credentials in the url pass through
//! untouched.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::graph;
use crate::id::ObjectId;
use crate::object::{BinaryCodec, ObjectStore, RevObject};
use crate::progress::ProgressListener;
use crate::refs::{self, Ref};
use crate::remote::pack;
use crate::remote::{check_push, RemoteRepo, TransferGuard};
use crate::repo::Repository;
use crate::traverse::{self, FullPolicy, GraphSource, ShallowPolicy, ShallowToFullPolicy};

/// a remote repository behind the HTTP object/ref protocol
pub struct HttpRemote {
    base: String,
    client: reqwest::blocking::Client,
}

impl HttpRemote {
    pub fn new(url: &str) -> Self {
        Self {
            base: url.trim_end_matches('/').to_string(),
            client: reqwest::blocking::Client::new(),
        }
    }

    fn url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base, path_and_query)
    }

    fn get_text(&self, path_and_query: &str) -> Result<String> {
        let response = self
            .client
            .get(self.url(path_and_query))
            .send()?
            .error_for_status()?;
        Ok(response.text()?)
    }

    fn get_bytes(&self, path_and_query: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(self.url(path_and_query))
            .send()?
            .error_for_status()?;
        Ok(response.bytes()?.to_vec())
    }

    /// `GET /repo/manifest`: one ref per line in the wire text format
    fn manifest(&self) -> Result<Vec<String>> {
        let body = self.get_text("/repo/manifest")?;
        Ok(body.lines().map(|l| l.to_string()).collect())
    }

    /// `GET /repo/exists`: does the remote hold this object
    pub fn object_exists(&self, id: &ObjectId) -> Result<bool> {
        let body = self.get_text(&format!(
            "/repo/exists?oid={}&internalIp={}",
            id,
            internal_ip()
        ))?;
        Ok(body.starts_with('1'))
    }

    /// `GET /repo/getparents`: newline-separated parent ids
    pub fn parents_of(&self, id: &ObjectId) -> Result<Vec<ObjectId>> {
        let body = self.get_text(&format!("/repo/getparents?commitId={}", id))?;
        body.lines()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .map(ObjectId::from_hex)
            .collect()
    }

    /// `GET /repo/getdepth`: the remote's shallow depth, or the stored
    /// history depth below a commit; empty body means "not shallow"
    pub fn depth_of(&self, commit: Option<&ObjectId>) -> Result<Option<u64>> {
        let path = match commit {
            Some(id) => format!("/repo/getdepth?commitId={}", id),
            None => "/repo/getdepth".to_string(),
        };
        let body = self.get_text(&path)?;
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        trimmed
            .parse::<u64>()
            .map(Some)
            .map_err(|_| Error::Format(format!("invalid depth response: {}", trimmed)))
    }

    /// `GET /repo/affectedfeatures`: feature ids touched by a commit
    pub fn affected_features(&self, id: &ObjectId) -> Result<Vec<ObjectId>> {
        let body = self.get_text(&format!("/repo/affectedfeatures?commitId={}", id))?;
        body.lines()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .map(ObjectId::from_hex)
            .collect()
    }

    /// `GET /refparse`: resolve a refspec, None when the ref is absent
    pub fn ref_parse(&self, refspec: &str) -> Result<Option<Ref>> {
        let response = self
            .client
            .get(self.url(&format!("/refparse?name={}", refspec)))
            .send()?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = response.error_for_status()?.text()?;
        parse_ref_xml(&body)
    }

    /// `GET /updateref`: point a remote ref at a new value or delete it
    pub fn update_remote_ref(
        &self,
        refspec: &str,
        new_value: Option<&ObjectId>,
        delete: bool,
    ) -> Result<Option<Ref>> {
        let path = if delete {
            format!("/updateref?name={}&delete=true", refspec)
        } else {
            let id = new_value.ok_or_else(|| {
                Error::InvalidRef("updateref requires a new value or delete".to_string())
            })?;
            format!("/updateref?name={}&newValue={}", refspec, id)
        };
        let body = self.get_text(&path)?;
        parse_ref_xml(&body)
    }

    /// `GET /repo/objects/{id}`: raw serialized object bytes
    fn get_object(&self, id: &ObjectId) -> Result<Vec<u8>> {
        self.get_bytes(&format!("/repo/objects/{}", id))
    }

    fn begin_push(&self) -> Result<()> {
        self.get_text(&format!("/repo/beginpush?internalIp={}", internal_ip()))?;
        Ok(())
    }

    /// the server refuses the ref update when its live value no longer
    /// equals `original`
    fn end_push(&self, refspec: &str, new_id: &ObjectId, original: &ObjectId) -> Result<()> {
        self.get_text(&format!(
            "/repo/endpush?refspec={}&objectId={}&internalIp={}&originalRefValue={}",
            refspec,
            new_id,
            internal_ip(),
            original
        ))?;
        Ok(())
    }

    fn send_pack(&self, pack: &[u8]) -> Result<()> {
        self.client
            .post(self.url("/repo/sendobject"))
            .body(pack.to_vec())
            .send()?
            .error_for_status()?;
        Ok(())
    }

    /// download a commit and its whole tree into the local store
    fn fetch_commit(
        &self,
        store: &dyn ObjectStore,
        guard: &mut TransferGuard,
        commit_id: &ObjectId,
    ) -> Result<()> {
        if !store.exists(commit_id) {
            let bytes = self.get_object(commit_id)?;
            store.put_raw(commit_id, &bytes)?;
            guard.record(*commit_id);
        }

        let tree_id = store
            .get(commit_id)?
            .as_commit()
            .map(|c| c.tree_id)
            .ok_or_else(|| Error::Format(format!("expected commit at {}", commit_id)))?;
        self.fetch_tree(store, guard, &tree_id)
    }

    /// a tree already present locally short-circuits its whole subtree
    fn fetch_tree(
        &self,
        store: &dyn ObjectStore,
        guard: &mut TransferGuard,
        tree_id: &ObjectId,
    ) -> Result<()> {
        if store.exists(tree_id) {
            return Ok(());
        }

        let bytes = self.get_object(tree_id)?;
        store.put_raw(tree_id, &bytes)?;
        guard.record(*tree_id);

        let object = store.get(tree_id)?;
        let tree = object
            .as_tree()
            .ok_or_else(|| Error::Format(format!("expected tree at {}", tree_id)))?;

        if !tree.is_leaf() {
            for bucket in tree.buckets().values() {
                self.fetch_tree(store, guard, &bucket.id)?;
            }
        } else {
            for node in tree.trees() {
                self.fetch_tree(store, guard, &node.object_id)?;
                if let Some(metadata_id) = node.metadata() {
                    self.fetch_object(store, guard, &metadata_id)?;
                }
            }
            for node in tree.features() {
                self.fetch_object(store, guard, &node.object_id)?;
                if let Some(metadata_id) = node.metadata() {
                    self.fetch_object(store, guard, &metadata_id)?;
                }
            }
        }
        Ok(())
    }

    fn fetch_object(
        &self,
        store: &dyn ObjectStore,
        guard: &mut TransferGuard,
        id: &ObjectId,
    ) -> Result<()> {
        if store.exists(id) {
            return Ok(());
        }
        let bytes = self.get_object(id)?;
        store.put_raw(id, &bytes)?;
        guard.record(*id);

        if let RevObject::Tree(tree) = store.get(id)? {
            if !tree.is_leaf() {
                for bucket in tree.buckets().values() {
                    self.fetch_tree(store, guard, &bucket.id)?;
                }
            }
        }
        Ok(())
    }
}

/// graph accessors for a fetch: parents come from the remote, existence
/// checks hit the local destination store
struct HttpFetchGraph<'a> {
    remote: &'a HttpRemote,
    destination: &'a dyn ObjectStore,
}

impl GraphSource for HttpFetchGraph<'_> {
    fn parents(&mut self, id: &ObjectId) -> Result<Vec<ObjectId>> {
        self.remote.parents_of(id)
    }

    fn exists_in_destination(&mut self, id: &ObjectId) -> Result<bool> {
        Ok(self.destination.exists(id))
    }
}

/// graph accessors for a push: parents come from the local store,
/// existence checks are remote round trips
struct HttpPushGraph<'a> {
    remote: &'a HttpRemote,
    source: &'a dyn ObjectStore,
}

impl GraphSource for HttpPushGraph<'_> {
    fn parents(&mut self, id: &ObjectId) -> Result<Vec<ObjectId>> {
        graph::parents(self.source, id)
    }

    fn exists_in_destination(&mut self, id: &ObjectId) -> Result<bool> {
        self.remote.object_exists(id)
    }
}

impl RemoteRepo for HttpRemote {
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn head_ref(&mut self) -> Result<Ref> {
        for line in self.manifest()? {
            if line.starts_with("HEAD") {
                return Ref::parse(&line);
            }
        }
        Err(Error::RefNotFound("HEAD".to_string()))
    }

    fn list_refs(&mut self, heads: bool, tags: bool) -> Result<Vec<Ref>> {
        let mut result = Vec::new();
        for line in self.manifest()? {
            let keep = (heads && line.starts_with(refs::HEADS_PREFIX))
                || (tags && line.starts_with(refs::TAGS_PREFIX));
            if keep {
                result.push(Ref::parse(&line)?);
            }
        }
        Ok(result)
    }

    fn ref_by_name(&mut self, refspec: &str) -> Result<Option<Ref>> {
        self.ref_parse(refspec)
    }

    fn fetch_new_data(
        &mut self,
        local: &Repository,
        reference: &Ref,
        depth_limit: Option<u64>,
        progress: &mut ProgressListener,
    ) -> Result<()> {
        let this: &HttpRemote = self;
        let destination = local.store();

        let into_shallow = local.depth().is_some() || depth_limit.is_some();
        let from_shallow = this.depth_of(None)?.is_some();

        let traversal = if into_shallow && from_shallow {
            return Err(Error::ShallowUnsupported);
        } else if into_shallow {
            let mut policy = ShallowPolicy::new(
                depth_limit,
                |id: &ObjectId| this.object_exists(id),
                |id: &ObjectId| Ok(destination.exists(id)),
                |id: &ObjectId| graph::history_depth(&destination, id),
            );
            let mut graph = HttpFetchGraph {
                remote: this,
                destination: &destination,
            };
            traverse::traverse(reference.id(), &mut policy, &mut graph)?
        } else if from_shallow {
            let mut policy = ShallowToFullPolicy::new(
                |id: &ObjectId| this.object_exists(id),
                |id: &ObjectId| Ok(destination.exists(id)),
            );
            let mut graph = HttpFetchGraph {
                remote: this,
                destination: &destination,
            };
            traverse::traverse(reference.id(), &mut policy, &mut graph)?
        } else {
            let mut policy = FullPolicy::new(|id: &ObjectId| Ok(destination.exists(id)));
            let mut graph = HttpFetchGraph {
                remote: this,
                destination: &destination,
            };
            traverse::traverse(reference.id(), &mut policy, &mut graph)?
        };

        debug!(
            reference = reference.name(),
            commits = traversal.commits.len(),
            "fetching over http"
        );

        let mut guard = TransferGuard::new(&destination);
        let total = traversal.commits.len();
        for (index, commit_id) in traversal.apply_order().enumerate() {
            this.fetch_commit(&destination, &mut guard, commit_id)?;
            if total > 0 {
                progress.progress((index + 1) as f32 / total as f32 * 100.0);
            }
        }
        guard.commit();

        refs::update_ref(local, reference.name(), reference.id())?;
        progress.complete();
        info!(
            reference = reference.name(),
            commits = total,
            "http fetch complete"
        );
        Ok(())
    }

    fn push_new_data(
        &mut self,
        local: &Repository,
        reference: &Ref,
        refspec: &str,
        progress: &mut ProgressListener,
    ) -> Result<()> {
        let this: &HttpRemote = self;
        let source = local.store();

        let remote_ref = this.ref_parse(refspec)?;
        check_push(&source, reference, remote_ref.as_ref())?;

        let from_shallow = local.depth().is_some();
        let into_shallow = this.depth_of(None)?.is_some();

        let traversal = if from_shallow && into_shallow {
            return Err(Error::ShallowUnsupported);
        } else if from_shallow || into_shallow {
            let mut policy = ShallowToFullPolicy::new(
                |id: &ObjectId| Ok(source.exists(id)),
                |id: &ObjectId| this.object_exists(id),
            );
            let mut graph = HttpPushGraph {
                remote: this,
                source: &source,
            };
            traverse::traverse(reference.id(), &mut policy, &mut graph)?
        } else {
            let mut policy = FullPolicy::new(|id: &ObjectId| this.object_exists(id));
            let mut graph = HttpPushGraph {
                remote: this,
                source: &source,
            };
            traverse::traverse(reference.id(), &mut policy, &mut graph)?
        };

        debug!(refspec, commits = traversal.commits.len(), "pushing over http");

        this.begin_push()?;

        // ship the traversal's commit set in size-bounded packs
        let ordered: Vec<ObjectId> = traversal.apply_order().copied().collect();
        let total = ordered.len();
        let mut sent = HashSet::new();
        let mut commits_sent = 0;
        loop {
            let mut buffer = Vec::new();
            let stats = pack::write_pack_opts(
                &source,
                &mut buffer,
                &ordered,
                &traversal.have,
                &mut sent,
                &BinaryCodec,
                pack::COMMIT_CAP,
                false,
            )?;
            if stats.objects > 0 {
                this.send_pack(&buffer)?;
            }
            commits_sent += stats.commits;
            if total > 0 {
                progress.progress(commits_sent as f32 / total as f32 * 100.0);
            }
            if stats.complete {
                break;
            }
        }

        let original = remote_ref.map(|r| r.id()).unwrap_or(ObjectId::NULL);
        this.end_push(refspec, &reference.id(), &original)?;
        progress.complete();
        info!(refspec, commits = total, "http push complete");
        Ok(())
    }

    fn delete_ref(&mut self, refspec: &str) -> Result<()> {
        self.update_remote_ref(refspec, None, true)?;
        Ok(())
    }

    fn depth(&mut self) -> Result<Option<u64>> {
        self.depth_of(None)
    }
}

/// parse an XML ref payload: `name`, `objectId`, optional `target`
fn parse_ref_xml(body: &str) -> Result<Option<Ref>> {
    use quick_xml::events::Event;

    if body.trim().is_empty() {
        return Ok(None);
    }

    let mut reader = quick_xml::Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut current = String::new();
    let mut name: Option<String> = None;
    let mut object_id: Option<String> = None;
    let mut target: Option<String> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                current = String::from_utf8_lossy(e.name().as_ref()).to_string();
            }
            Event::Text(t) => {
                let text = t.unescape()?.to_string();
                match current.as_str() {
                    "name" => name = Some(text),
                    "objectId" => object_id = Some(text),
                    "target" => target = Some(text),
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let (name, object_id) = match (name, object_id) {
        (Some(n), Some(o)) => (n, o),
        _ => return Ok(None),
    };
    let id = ObjectId::from_hex(&object_id)?;

    Ok(Some(match target {
        Some(target) => Ref::symbolic(name, target, id),
        None => Ref::direct(name, id),
    }))
}

/// identifies this client to the server's push-session tracking
fn internal_ip() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}
