//! In-memory version control with a shared fake remote.
//!
//! Commits are content-addressed snapshots of the tracked working tree. The
//! working tree itself stays on disk so the store behaves exactly as it does over
//! git. Several [`MemoryVcs`] instances pointed at one [`SharedRemote`] model
//! teammates' clones; the remote can be told to fail or reject upcoming
//! operations.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use sha2::{Digest, Sha256};

use super::{merge, CommitRef, TextMerge, VcsError, VcsResult, VersionControl};
use crate::store::paths;

type Tree = BTreeMap<String, Vec<u8>>;

#[derive(Debug, Clone)]
struct Commit {
    parents: Vec<CommitRef>,
    tree: Tree,
}

#[derive(Debug, Default)]
struct RemoteState {
    objects: HashMap<CommitRef, Commit>,
    head: Option<CommitRef>,
    reject_next_pushes: u32,
    fail_next_network: u32,
    accepted_pushes: u32,
}

/// A remote shared by several in-memory clones.
#[derive(Debug, Clone, Default)]
pub struct SharedRemote(Arc<Mutex<RemoteState>>);

impl SharedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn head(&self) -> Option<CommitRef> {
        lock(&self.0).head.clone()
    }

    /// Make the next `n` pushes fail with a non-fast-forward rejection.
    pub fn reject_next_pushes(&self, n: u32) {
        lock(&self.0).reject_next_pushes = n;
    }

    /// Make the next `n` pulls or pushes fail with a network error.
    pub fn fail_next_network(&self, n: u32) {
        lock(&self.0).fail_next_network = n;
    }

    /// Pushes that changed the remote head.
    pub fn accepted_pushes(&self) -> u32 {
        lock(&self.0).accepted_pushes
    }

    /// File contents at the remote head.
    pub fn read_head(&self, path: &str) -> Option<Vec<u8>> {
        let state = lock(&self.0);
        let head = state.head.as_ref()?;
        state.objects.get(head)?.tree.get(path).cloned()
    }

    fn network_fault(state: &mut RemoteState) -> VcsResult<()> {
        if state.fail_next_network > 0 {
            state.fail_next_network -= 1;
            return Err(VcsError::Network("simulated network failure".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct LocalState {
    objects: HashMap<CommitRef, Commit>,
    head: Option<CommitRef>,
}

/// In-memory history over an on-disk working tree.
#[derive(Debug)]
pub struct MemoryVcs {
    root: PathBuf,
    remote: Option<SharedRemote>,
    local: Mutex<LocalState>,
}

impl MemoryVcs {
    pub fn new(root: impl Into<PathBuf>, remote: Option<SharedRemote>) -> Self {
        Self {
            root: root.into(),
            remote,
            local: Mutex::new(LocalState::default()),
        }
    }

    fn tree_at(state: &LocalState, rev: Option<&CommitRef>) -> VcsResult<Tree> {
        match rev {
            None => Ok(Tree::new()),
            Some(rev) => state
                .objects
                .get(rev)
                .map(|c| c.tree.clone())
                .ok_or_else(|| VcsError::UnknownRevision(rev.to_string())),
        }
    }

    /// Head tree with `paths` replaced by their current working-tree contents.
    fn snapshot(&self, state: &LocalState, paths: &[String]) -> VcsResult<Tree> {
        let mut tree = Self::tree_at(state, state.head.as_ref())?;
        for path in paths {
            let prefix = format!("{path}/");
            tree.retain(|p, _| p != path && !p.starts_with(&prefix));
            collect_files(&self.root, path, &mut tree)?;
        }
        Ok(tree)
    }

    fn store_commit(state: &mut LocalState, parents: Vec<CommitRef>, tree: Tree, message: &str) -> CommitRef {
        let id = commit_id(&parents, &tree, message);
        state.objects.insert(id.clone(), Commit { parents, tree });
        state.head = Some(id.clone());
        id
    }

    fn ancestors(objects: &HashMap<CommitRef, Commit>, start: &CommitRef) -> Vec<CommitRef> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::from([start.clone()]);
        while let Some(rev) = queue.pop_front() {
            if !seen.insert(rev.clone()) {
                continue;
            }
            if let Some(commit) = objects.get(&rev) {
                queue.extend(commit.parents.iter().cloned());
            }
            order.push(rev);
        }
        order
    }
}

impl VersionControl for MemoryVcs {
    fn head(&self) -> VcsResult<Option<CommitRef>> {
        Ok(lock(&self.local).head.clone())
    }

    fn commit(&self, paths: &[String], message: &str) -> VcsResult<Option<CommitRef>> {
        let mut state = lock(&self.local);
        let tree = self.snapshot(&state, paths)?;
        if tree == Self::tree_at(&state, state.head.as_ref())? {
            return Ok(None);
        }
        let parents = state.head.iter().cloned().collect();
        Ok(Some(Self::store_commit(&mut state, parents, tree, message)))
    }

    fn merge_base(&self, a: &CommitRef, b: &CommitRef) -> VcsResult<Option<CommitRef>> {
        let state = lock(&self.local);
        let of_a: HashSet<CommitRef> = Self::ancestors(&state.objects, a).into_iter().collect();
        Ok(Self::ancestors(&state.objects, b)
            .into_iter()
            .find(|rev| of_a.contains(rev)))
    }

    fn diff_paths(&self, from: Option<&CommitRef>, to: &CommitRef) -> VcsResult<BTreeSet<String>> {
        let state = lock(&self.local);
        let old = Self::tree_at(&state, from)?;
        let new = Self::tree_at(&state, Some(to))?;
        Ok(old
            .keys()
            .chain(new.keys())
            .filter(|p| old.get(*p) != new.get(*p))
            .cloned()
            .collect())
    }

    fn read_at(&self, rev: &CommitRef, path: &str) -> VcsResult<Option<Vec<u8>>> {
        let state = lock(&self.local);
        Ok(Self::tree_at(&state, Some(rev))?.remove(path))
    }

    fn merge_text(&self, base: &str, ours: &str, theirs: &str) -> VcsResult<TextMerge> {
        Ok(merge::merge_lines(base, ours, theirs))
    }

    fn fast_forward(&self, to: &CommitRef) -> VcsResult<()> {
        let mut state = lock(&self.local);
        let old = Self::tree_at(&state, state.head.as_ref())?;
        let new = Self::tree_at(&state, Some(to))?;

        for path in old.keys().filter(|p| !new.contains_key(*p)) {
            let full = self.root.join(path);
            match fs::remove_file(&full) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            if let Some(parent) = full.parent() {
                crate::fsio::remove_empty_dir(parent);
            }
        }
        for (path, bytes) in &new {
            if old.get(path) != Some(bytes) {
                let full = self.root.join(path);
                if let Some(parent) = full.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&full, bytes)?;
            }
        }

        state.head = Some(to.clone());
        Ok(())
    }

    fn commit_merge(
        &self,
        paths: &[String],
        message: &str,
        other_parent: &CommitRef,
    ) -> VcsResult<CommitRef> {
        let mut state = lock(&self.local);
        if !state.objects.contains_key(other_parent) {
            return Err(VcsError::UnknownRevision(other_parent.to_string()));
        }
        let tree = self.snapshot(&state, paths)?;
        let mut parents: Vec<CommitRef> = state.head.iter().cloned().collect();
        parents.push(other_parent.clone());
        Ok(Self::store_commit(&mut state, parents, tree, message))
    }

    fn pull(&self) -> VcsResult<Option<CommitRef>> {
        let remote = self.remote.as_ref().ok_or(VcsError::NoRemote)?;
        let mut remote = lock(&remote.0);
        SharedRemote::network_fault(&mut remote)?;

        let mut local = lock(&self.local);
        for (id, commit) in &remote.objects {
            local.objects.entry(id.clone()).or_insert_with(|| commit.clone());
        }
        Ok(remote.head.clone())
    }

    fn push(&self) -> VcsResult<()> {
        let remote = self.remote.as_ref().ok_or(VcsError::NoRemote)?;
        let mut remote = lock(&remote.0);
        SharedRemote::network_fault(&mut remote)?;
        if remote.reject_next_pushes > 0 {
            remote.reject_next_pushes -= 1;
            return Err(VcsError::RemoteRejected("simulated rejection".into()));
        }

        let local = lock(&self.local);
        let Some(head) = local.head.clone() else {
            return Ok(());
        };
        let reachable = Self::ancestors(&local.objects, &head);
        if let Some(remote_head) = &remote.head {
            if !reachable.contains(remote_head) {
                return Err(VcsError::RemoteRejected(
                    "non-fast-forward: fetch first".into(),
                ));
            }
            if *remote_head == head {
                return Ok(());
            }
        }

        for id in reachable {
            if let Some(commit) = local.objects.get(&id) {
                remote.objects.entry(id).or_insert_with(|| commit.clone());
            }
        }
        remote.head = Some(head);
        remote.accepted_pushes += 1;
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Add every non-ignored file under `rel` (a file or directory) to `tree`.
fn collect_files(root: &Path, rel: &str, tree: &mut Tree) -> VcsResult<()> {
    if paths::is_ignored(rel) {
        return Ok(());
    }
    let full = root.join(rel);
    let meta = match fs::metadata(&full) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    if meta.is_file() {
        tree.insert(rel.to_string(), fs::read(&full)?);
    } else if meta.is_dir() {
        for dir_entry in fs::read_dir(&full)? {
            let name = dir_entry?.file_name().to_string_lossy().into_owned();
            collect_files(root, &format!("{rel}/{name}"), tree)?;
        }
    }
    Ok(())
}

fn commit_id(parents: &[CommitRef], tree: &Tree, message: &str) -> CommitRef {
    let mut hasher = Sha256::new();
    for parent in parents {
        hasher.update(b"parent ");
        hasher.update(parent.as_str().as_bytes());
        hasher.update(b"\n");
    }
    for (path, bytes) in tree {
        hasher.update(path.as_bytes());
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    }
    hasher.update(message.as_bytes());
    CommitRef(format!("{:x}", hasher.finalize()))
}
