//! Test-only fixtures: git repositories and artefact directory trees.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Initialize a git repository with one commit on `main`.
pub fn init_git_repo(root: &Path) {
    run_git(root, &["init", "-b", "main"]);
    run_git(root, &["config", "user.email", "test@example.com"]);
    run_git(root, &["config", "user.name", "test"]);

    fs::write(root.join("README.md"), "hi\n").expect("write README");
    run_git(root, &["add", "README.md"]);
    run_git(root, &["commit", "-m", "chore: init"]);
}

fn run_git(root: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(root)
        .status()
        .expect("run git");
    assert!(status.success(), "git {args:?} failed");
}

/// Declarative artefact file: id, status, and optional frontmatter fields.
#[derive(Debug, Clone)]
pub struct ArtefactSpec {
    pub id: String,
    pub status: String,
    pub parent: Option<String>,
    pub title: Option<String>,
}

/// Start an artefact spec with the given id (as written, padding included)
/// and status.
pub fn artefact(id: &str, status: &str) -> ArtefactSpec {
    ArtefactSpec {
        id: id.to_string(),
        status: status.to_string(),
        parent: None,
        title: None,
    }
}

impl ArtefactSpec {
    pub fn parent(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    fn render(&self) -> String {
        let mut buf = String::from("---\n");
        buf.push_str(&format!("status: {}\n", self.status));
        if let Some(parent) = &self.parent {
            buf.push_str(&format!("parent: {parent}\n"));
        }
        if let Some(title) = &self.title {
            buf.push_str(&format!("title: {title}\n"));
        }
        buf.push_str("---\n\n");
        buf.push_str(&format!("# {}\n", self.id));
        buf
    }
}

/// A temporary `prds/` tree for resolver and orchestration tests.
pub struct ArtefactTree {
    temp: tempfile::TempDir,
}

impl ArtefactTree {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            temp: tempfile::tempdir().expect("tempdir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn prds_dir(&self) -> PathBuf {
        self.root().join("prds")
    }

    /// Memory root matching the default config layout; created on demand.
    pub fn memory_root(&self) -> PathBuf {
        let dir = self.root().join(".foreman").join("memory");
        fs::create_dir_all(&dir).expect("create memory root");
        dir
    }

    /// Builder for one `prds/PRD-0NN/` directory; repeated calls reuse it.
    pub fn prd(&self, number: u32) -> PrdDir {
        let dir = self.prds_dir().join(format!("PRD-{number:03}"));
        fs::create_dir_all(&dir).expect("create prd dir");
        PrdDir { dir }
    }
}

/// One PRD directory inside an [`ArtefactTree`].
pub struct PrdDir {
    dir: PathBuf,
}

impl PrdDir {
    pub fn task(&self, spec: &ArtefactSpec) -> PathBuf {
        self.write("tasks", spec)
    }

    pub fn epic(&self, spec: &ArtefactSpec) -> PathBuf {
        self.write("epics", spec)
    }

    fn write(&self, subdir: &str, spec: &ArtefactSpec) -> PathBuf {
        let dir = self.dir.join(subdir);
        fs::create_dir_all(&dir).expect("create artefact dir");
        let path = dir.join(format!("{}.md", spec.id));
        fs::write(&path, spec.render()).expect("write artefact");
        path
    }
}
