//! [`VersionControl`] over the `git` binary.
//!
//! The store root is its own repository whose only branch is the context branch,
//! so context commits never mix with product history. Network operations run
//! under a timeout; timeouts and transport failures map to [`VcsError::Network`].

use std::collections::BTreeSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use super::{CommitRef, TextMerge, VcsError, VcsResult, VersionControl};
use crate::store::paths::STATE_DIR;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

static MERGE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Git-backed history for one store root.
#[derive(Debug, Clone)]
pub struct GitCli {
    root: PathBuf,
    branch: String,
    remote: String,
    timeout: Duration,
    author: Option<(String, String)>,
}

impl GitCli {
    pub fn new(root: impl Into<PathBuf>, branch: &str, remote: &str) -> Self {
        Self {
            root: root.into(),
            branch: branch.to_string(),
            remote: remote.to_string(),
            timeout: DEFAULT_TIMEOUT,
            author: None,
        }
    }

    /// Timeout applied to fetch and push.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Commit identity. Without it, git's own configuration applies.
    pub fn with_author(mut self, name: &str, email: &str) -> Self {
        self.author = Some((name.to_string(), email.to_string()));
        self
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Whether a usable `git` binary is on the PATH.
    pub fn is_available() -> bool {
        Command::new("git")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Create the repository if needed and point HEAD at the context branch.
    pub fn init(&self) -> VcsResult<()> {
        if !self.root.join(".git").exists() {
            self.run(&["init", "-q"])?;
            tracing::info!(root = %self.root.display(), "initialized context repository");
        }
        let target = format!("refs/heads/{}", self.branch);
        self.run(&["symbolic-ref", "HEAD", &target])?;
        Ok(())
    }

    /// URL of the configured remote, if any.
    pub fn remote_url(&self) -> VcsResult<Option<String>> {
        let out = self.run_unchecked(&["remote", "get-url", &self.remote])?;
        if !out.status.success() {
            return Ok(None);
        }
        Ok(Some(stdout_line(&out)))
    }

    /// Add or repoint the remote.
    pub fn set_remote_url(&self, url: &str) -> VcsResult<()> {
        if self.remote_url()?.is_some() {
            self.run(&["remote", "set-url", &self.remote, url])?;
        } else {
            self.run(&["remote", "add", &self.remote, url])?;
        }
        Ok(())
    }

    fn tracking_ref(&self) -> String {
        format!("refs/remotes/{}/{}", self.remote, self.branch)
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("-C").arg(&self.root);
        cmd.args(["-c", "commit.gpgsign=false", "-c", "core.quotepath=false"]);
        if let Some((name, email)) = &self.author {
            cmd.arg("-c").arg(format!("user.name={name}"));
            cmd.arg("-c").arg(format!("user.email={email}"));
        }
        // Never fall through to an enclosing project repository.
        if let Some(parent) = std::path::absolute(&self.root)
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf))
        {
            cmd.env("GIT_CEILING_DIRECTORIES", parent);
        }
        cmd.args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("LC_ALL", "C")
            .stdin(Stdio::null());
        cmd
    }

    fn run_unchecked(&self, args: &[&str]) -> VcsResult<Output> {
        tracing::trace!(args = ?args, "git");
        Ok(self.command(args).output()?)
    }

    /// Run and fail with [`VcsError::Command`] on a non-zero exit.
    fn run(&self, args: &[&str]) -> VcsResult<Output> {
        let out = self.run_unchecked(args)?;
        if !out.status.success() {
            return Err(command_error(args, &out));
        }
        Ok(out)
    }

    /// Run with the network timeout. Output pipes are drained on helper threads
    /// so a chatty child cannot block on a full pipe.
    fn run_with_timeout(&self, args: &[&str]) -> VcsResult<Output> {
        tracing::trace!(args = ?args, timeout_secs = self.timeout.as_secs(), "git (network)");
        let mut child = self
            .command(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let out_reader = std::thread::spawn(move || drain(stdout));
        let err_reader = std::thread::spawn(move || drain(stderr));

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(VcsError::Network(format!(
                    "git {} timed out after {}s",
                    args.first().copied().unwrap_or_default(),
                    self.timeout.as_secs()
                )));
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        Ok(Output {
            status,
            stdout: out_reader.join().unwrap_or_default(),
            stderr: err_reader.join().unwrap_or_default(),
        })
    }

    fn is_tracked(&self, path: &str) -> VcsResult<bool> {
        let out = self.run(&["ls-files", "--", path])?;
        Ok(!out.stdout.is_empty())
    }

    /// Stage `paths`, skipping ones that exist neither on disk nor in the index.
    fn stage(&self, paths: &[String]) -> VcsResult<()> {
        let mut present = Vec::new();
        for path in paths {
            if self.root.join(path).exists() || self.is_tracked(path)? {
                present.push(path.as_str());
            }
        }
        if present.is_empty() {
            return Ok(());
        }
        let mut args = vec!["add", "-A", "--"];
        args.extend(present);
        self.run(&args)?;
        Ok(())
    }

    fn has_staged_changes(&self) -> VcsResult<bool> {
        let out = self.run_unchecked(&["diff", "--cached", "--quiet"])?;
        match out.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(command_error(&["diff", "--cached", "--quiet"], &out)),
        }
    }

    fn verify_commit(&self, rev: &CommitRef) -> VcsResult<()> {
        let spec = format!("{}^{{commit}}", rev.as_str());
        let out = self.run_unchecked(&["rev-parse", "--verify", "-q", &spec])?;
        if !out.status.success() {
            return Err(VcsError::UnknownRevision(rev.to_string()));
        }
        Ok(())
    }
}

impl VersionControl for GitCli {
    fn head(&self) -> VcsResult<Option<CommitRef>> {
        let out = self.run_unchecked(&["rev-parse", "--verify", "-q", "HEAD"])?;
        if !out.status.success() {
            return Ok(None);
        }
        Ok(Some(CommitRef(stdout_line(&out))))
    }

    fn commit(&self, paths: &[String], message: &str) -> VcsResult<Option<CommitRef>> {
        self.stage(paths)?;
        if !self.has_staged_changes()? {
            return Ok(None);
        }
        self.run(&["commit", "-q", "--no-verify", "-m", message])?;
        self.head()
    }

    fn merge_base(&self, a: &CommitRef, b: &CommitRef) -> VcsResult<Option<CommitRef>> {
        let out = self.run_unchecked(&["merge-base", a.as_str(), b.as_str()])?;
        match out.status.code() {
            Some(0) => Ok(Some(CommitRef(stdout_line(&out)))),
            Some(1) => Ok(None),
            _ => Err(command_error(&["merge-base"], &out)),
        }
    }

    fn diff_paths(&self, from: Option<&CommitRef>, to: &CommitRef) -> VcsResult<BTreeSet<String>> {
        self.verify_commit(to)?;
        let out = match from {
            Some(from) => {
                self.verify_commit(from)?;
                self.run(&["diff", "--name-only", "--no-renames", "-z", from.as_str(), to.as_str()])?
            }
            None => self.run(&["ls-tree", "-r", "--name-only", "-z", to.as_str()])?,
        };
        Ok(out
            .stdout
            .split(|b| *b == 0)
            .filter(|p| !p.is_empty())
            .map(|p| String::from_utf8_lossy(p).into_owned())
            .collect())
    }

    fn read_at(&self, rev: &CommitRef, path: &str) -> VcsResult<Option<Vec<u8>>> {
        self.verify_commit(rev)?;
        let listing = self.run(&["ls-tree", rev.as_str(), "--", path])?;
        if listing.stdout.is_empty() {
            return Ok(None);
        }
        let object = format!("{}:{path}", rev.as_str());
        Ok(Some(self.run(&["cat-file", "blob", &object])?.stdout))
    }

    fn merge_text(&self, base: &str, ours: &str, theirs: &str) -> VcsResult<TextMerge> {
        let seq = MERGE_SEQ.fetch_add(1, Ordering::Relaxed);
        let dir = self
            .root
            .join(STATE_DIR)
            .join(format!("merge-{}-{seq}", std::process::id()));
        std::fs::create_dir_all(&dir)?;

        let result = (|| -> VcsResult<TextMerge> {
            let files = [("ours", ours), ("base", base), ("theirs", theirs)];
            let mut args: Vec<String> = vec!["merge-file".into(), "-p".into()];
            for (name, text) in files {
                let path = dir.join(name);
                std::fs::write(&path, text)?;
                args.push(path.to_string_lossy().into_owned());
            }
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            let out = self.run_unchecked(&args)?;
            match out.status.code() {
                Some(0) => Ok(TextMerge::Clean(String::from_utf8_lossy(&out.stdout).into_owned())),
                Some(n) if (1..=127).contains(&n) => Ok(TextMerge::Conflicted),
                _ => Err(command_error(&["merge-file"], &out)),
            }
        })();

        let _ = std::fs::remove_dir_all(&dir);
        result
    }

    fn fast_forward(&self, to: &CommitRef) -> VcsResult<()> {
        self.verify_commit(to)?;
        if self.head()?.is_none() {
            self.run(&["reset", "-q", "--hard", to.as_str()])?;
        } else {
            self.run(&["merge", "-q", "--ff-only", to.as_str()])?;
        }
        Ok(())
    }

    fn commit_merge(
        &self,
        paths: &[String],
        message: &str,
        other_parent: &CommitRef,
    ) -> VcsResult<CommitRef> {
        self.verify_commit(other_parent)?;
        self.stage(paths)?;
        let tree = stdout_line(&self.run(&["write-tree"])?);
        let head = self.head()?;

        let mut args = vec!["commit-tree", tree.as_str()];
        if let Some(head) = &head {
            args.extend(["-p", head.as_str()]);
        }
        args.extend(["-p", other_parent.as_str(), "-m", message]);
        let commit = CommitRef(stdout_line(&self.run(&args)?));

        self.run(&["update-ref", "HEAD", commit.as_str()])?;
        Ok(commit)
    }

    fn pull(&self) -> VcsResult<Option<CommitRef>> {
        if self.remote_url()?.is_none() {
            return Err(VcsError::NoRemote);
        }
        let refspec = format!("+refs/heads/{}:{}", self.branch, self.tracking_ref());
        let out = self.run_with_timeout(&["fetch", "-q", "--no-tags", &self.remote, &refspec])?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            if stderr.contains("couldn't find remote ref") {
                return Ok(None);
            }
            return Err(VcsError::Network(stderr.trim().to_string()));
        }

        let out = self.run(&["rev-parse", "--verify", &self.tracking_ref()])?;
        Ok(Some(CommitRef(stdout_line(&out))))
    }

    fn push(&self) -> VcsResult<()> {
        if self.remote_url()?.is_none() {
            return Err(VcsError::NoRemote);
        }
        let refspec = format!("HEAD:refs/heads/{}", self.branch);
        let out = self.run_with_timeout(&["push", "-q", "--no-verify", &self.remote, &refspec])?;
        if out.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
        if ["rejected", "non-fast-forward", "fetch first"]
            .iter()
            .any(|needle| stderr.contains(needle))
        {
            Err(VcsError::RemoteRejected(stderr))
        } else {
            Err(VcsError::Network(stderr))
        }
    }
}

/// URL of `origin` in an enclosing project repository, if there is one.
pub fn project_origin_url(project_dir: &Path) -> Option<String> {
    let out = Command::new("git")
        .arg("-C")
        .arg(project_dir)
        .args(["remote", "get-url", "origin"])
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .output()
        .ok()?;
    out.status.success().then(|| stdout_line(&out))
}

fn stdout_line(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

fn command_error(args: &[&str], out: &Output) -> VcsError {
    VcsError::Command {
        command: format!("git {}", args.join(" ")),
        stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
    }
}

fn drain(pipe: Option<impl Read>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf);
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn repo(dir: &Path) -> GitCli {
        let git = GitCli::new(dir, "ctx/context", "origin").with_author("Test", "test@example.com");
        git.init().unwrap();
        git
    }

    #[test]
    fn commit_and_read_back() {
        if !GitCli::is_available() {
            return;
        }
        let tmp = TempDir::new().unwrap();
        let git = repo(tmp.path());
        assert!(git.head().unwrap().is_none());

        std::fs::create_dir_all(tmp.path().join("knowledge")).unwrap();
        std::fs::write(tmp.path().join("knowledge/a.md"), "hello\n").unwrap();
        let paths = vec!["knowledge".to_string(), "skills".to_string()];
        let head = git.commit(&paths, "add a").unwrap().unwrap();

        assert_eq!(
            git.read_at(&head, "knowledge/a.md").unwrap().as_deref(),
            Some(&b"hello\n"[..])
        );
        assert!(git.read_at(&head, "knowledge/b.md").unwrap().is_none());
        assert!(git.commit(&paths, "noop").unwrap().is_none());
    }

    #[test]
    fn pull_without_remote_is_no_remote() {
        if !GitCli::is_available() {
            return;
        }
        let tmp = TempDir::new().unwrap();
        let git = repo(tmp.path());
        assert!(matches!(git.pull(), Err(VcsError::NoRemote)));
    }

    #[test]
    fn merge_text_reports_conflicts() {
        if !GitCli::is_available() {
            return;
        }
        let tmp = TempDir::new().unwrap();
        let git = repo(tmp.path());
        let base = "a\nb\nc\nd\ne\n";
        assert_eq!(
            git.merge_text(base, "A\nb\nc\nd\ne\n", "a\nb\nc\nd\nE\n").unwrap(),
            TextMerge::Clean("A\nb\nc\nd\nE\n".into())
        );
        assert_eq!(
            git.merge_text(base, "a\nB\nc\nd\ne\n", "a\nX\nc\nd\ne\n").unwrap(),
            TextMerge::Conflicted
        );
    }
}
