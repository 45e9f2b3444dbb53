//! On-disk monitoring workspace.
//!
//! ```text
//! <root>/<project-id>/project.json
//! <root>/<project-id>/snapshots/<report-id>.json
//! ```
//!
//! Project directories are published with a single rename from a hidden
//! staging directory, so a project directory is never visible without
//! its metadata.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WorkspaceError;
use crate::report::Report;

const PROJECT_FILE: &str = "project.json";
const SNAPSHOTS_DIR: &str = "snapshots";
const STAGING_PREFIX: &str = ".staging-";

/// Namespace for project ids derived from project names.
const PROJECT_NAMESPACE: Uuid = Uuid::from_u128(0x6b1f_0c7e_52a4_4c1e_9d3b_2f8e_a1c4_7d90);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

type Result<T> = std::result::Result<T, WorkspaceError>;

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> WorkspaceError + '_ {
    move |source| WorkspaceError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn json_error(path: &Path) -> impl FnOnce(serde_json::Error) -> WorkspaceError + '_ {
    move |source| WorkspaceError::Json {
        path: path.display().to_string(),
        source,
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(io_error(path))?;
    serde_json::from_str(&content).map_err(json_error(path))
}

/// Write through a temporary sibling so readers never see a partial file.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value).map_err(json_error(path))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content).map_err(io_error(&tmp))?;
    fs::rename(&tmp, path).map_err(io_error(path))
}

impl Workspace {
    /// Open the workspace at `path`, creating the directory if missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(io_error(&root))?;
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    fn project_dir(&self, id: Uuid) -> PathBuf {
        self.root.join(id.to_string())
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let mut projects = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(io_error(&self.root))? {
            let entry = entry.map_err(io_error(&self.root))?;
            let path = entry.path();
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if hidden || !path.is_dir() {
                continue;
            }
            let meta = path.join(PROJECT_FILE);
            if meta.is_file() {
                projects.push(read_json::<Project>(&meta)?);
            }
        }
        projects.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        Ok(projects)
    }

    pub fn project(&self, id: Uuid) -> Result<Project> {
        let meta = self.project_dir(id).join(PROJECT_FILE);
        if !meta.is_file() {
            return Err(WorkspaceError::ProjectNotFound(id));
        }
        read_json(&meta)
    }

    /// Linear scan for a project with exactly this name.
    pub fn find_project(&self, name: &str) -> Result<Option<Project>> {
        Ok(self.list_projects()?.into_iter().find(|p| p.name == name))
    }

    pub fn create_project(&self, name: &str, description: &str) -> Result<Project> {
        let project = Project {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.to_string(),
            created_at: Utc::now(),
        };
        match self.publish(&project)? {
            true => Ok(project),
            // a random v4 id colliding means the directory was created by hand
            false => Err(WorkspaceError::Io {
                path: self.project_dir(project.id).display().to_string(),
                source: io::Error::from(io::ErrorKind::AlreadyExists),
            }),
        }
    }

    /// Return the project named `name`, creating it if none exists.
    ///
    /// Projects created here get an id derived from the name, so writers
    /// racing on the same name all target one directory and only the first
    /// rename succeeds.
    pub fn get_or_create_project(&self, name: &str, description: &str) -> Result<Project> {
        if let Some(project) = self.find_project(name)? {
            return Ok(project);
        }

        let project = Project {
            id: Uuid::new_v5(&PROJECT_NAMESPACE, name.as_bytes()),
            name: name.to_string(),
            description: description.to_string(),
            created_at: Utc::now(),
        };
        if self.publish(&project)? {
            tracing::info!(project = name, id = %project.id, "created project");
            Ok(project)
        } else {
            tracing::debug!(project = name, "project created concurrently, reusing it");
            self.project(project.id)
        }
    }

    /// Stage the project directory and rename it into place.
    ///
    /// Returns `false` when a directory with the same id already exists.
    fn publish(&self, project: &Project) -> Result<bool> {
        let target = self.project_dir(project.id);
        if target.exists() {
            return Ok(false);
        }

        let staging = self
            .root
            .join(format!("{STAGING_PREFIX}{}", Uuid::new_v4()));
        fs::create_dir_all(staging.join(SNAPSHOTS_DIR)).map_err(io_error(&staging))?;
        write_json(&staging.join(PROJECT_FILE), project)?;

        match fs::rename(&staging, &target) {
            Ok(()) => Ok(true),
            Err(err) => {
                let _ = fs::remove_dir_all(&staging);
                if target.join(PROJECT_FILE).is_file() {
                    Ok(false)
                } else {
                    Err(io_error(&target)(err))
                }
            }
        }
    }

    /// Store `report` as a snapshot of the project.
    pub fn add_report(&self, project_id: Uuid, report: &Report) -> Result<PathBuf> {
        let dir = self.project_dir(project_id);
        if !dir.join(PROJECT_FILE).is_file() {
            return Err(WorkspaceError::ProjectNotFound(project_id));
        }
        let snapshots = dir.join(SNAPSHOTS_DIR);
        fs::create_dir_all(&snapshots).map_err(io_error(&snapshots))?;

        let path = snapshots.join(format!("{}.json", report.id()));
        write_json(&path, report)?;
        Ok(path)
    }

    /// Snapshots of the project, oldest first.
    pub fn list_reports(&self, project_id: Uuid) -> Result<Vec<Report>> {
        let dir = self.project_dir(project_id);
        if !dir.join(PROJECT_FILE).is_file() {
            return Err(WorkspaceError::ProjectNotFound(project_id));
        }
        let snapshots = dir.join(SNAPSHOTS_DIR);
        if !snapshots.is_dir() {
            return Ok(Vec::new());
        }

        let mut reports = Vec::new();
        for entry in fs::read_dir(&snapshots).map_err(io_error(&snapshots))? {
            let path = entry.map_err(io_error(&snapshots))?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                reports.push(read_json::<Report>(&path)?);
            }
        }
        reports.sort_by_key(|r| r.created_at());
        Ok(reports)
    }
}

/// Attach `report` to the project named `project_name`, creating the project on first use.
pub fn add_report_to_workspace(
    workspace: &Workspace,
    project_name: &str,
    project_description: &str,
    report: &Report,
) -> Result<Project> {
    let project = workspace.get_or_create_project(project_name, project_description)?;
    workspace.add_report(project.id, report)?;
    tracing::info!(
        project = project_name,
        project_id = %project.id,
        report_id = %report.id(),
        "report added to project"
    );
    Ok(project)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{ColumnMapping, Preset};
    use polars::prelude::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Workspace) {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::open(dir.path().join("ws")).unwrap();
        (dir, ws)
    }

    fn sample_report(name: &str) -> Report {
        let target: Vec<f64> = (0..40).map(f64::from).collect();
        let prediction: Vec<f64> = target.iter().map(|t| t * 1.1).collect();
        let frame = df!("target" => target, "prediction" => prediction).unwrap();
        let mapping = ColumnMapping {
            target: Some("target".into()),
            prediction: Some("prediction".into()),
            ..Default::default()
        };
        Report::run(name, Preset::Regression, None, &frame, &mapping).unwrap()
    }

    #[test]
    fn open_creates_the_directory() {
        let (_dir, ws) = setup();
        assert!(ws.path().is_dir());
        assert!(ws.list_projects().unwrap().is_empty());
    }

    #[test]
    fn create_and_list_projects() {
        let (_dir, ws) = setup();
        let a = ws.create_project("alpha", "first").unwrap();
        let b = ws.create_project("beta", "second").unwrap();
        let projects = ws.list_projects().unwrap();
        assert_eq!(projects.len(), 2);
        assert!(projects.contains(&a) && projects.contains(&b));
        assert_eq!(ws.project(a.id).unwrap().description, "first");
    }

    #[test]
    fn upsert_twice_keeps_one_project() {
        let (_dir, ws) = setup();
        let first = add_report_to_workspace(&ws, "bike_week1", "week 1", &sample_report("w1")).unwrap();
        let second =
            add_report_to_workspace(&ws, "bike_week1", "ignored", &sample_report("w1")).unwrap();

        assert_eq!(first.id, second.id);
        let named: Vec<Project> = ws
            .list_projects()
            .unwrap()
            .into_iter()
            .filter(|p| p.name == "bike_week1")
            .collect();
        assert_eq!(named.len(), 1);
        assert_eq!(named[0].description, "week 1");
        assert_eq!(ws.list_reports(first.id).unwrap().len(), 2);
    }

    #[test]
    fn upsert_finds_projects_created_directly() {
        let (_dir, ws) = setup();
        let existing = ws.create_project("bike_validation", "manual").unwrap();
        let found = ws.get_or_create_project("bike_validation", "other").unwrap();
        assert_eq!(found.id, existing.id);
        assert_eq!(ws.list_projects().unwrap().len(), 1);
    }

    #[test]
    fn concurrent_upserts_create_a_single_project() {
        let (_dir, ws) = setup();
        let ids: Vec<Uuid> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| ws.get_or_create_project("shared", "race").unwrap().id))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(ids.iter().all(|id| *id == ids[0]));
        assert_eq!(ws.list_projects().unwrap().len(), 1);
        let leftovers = fs::read_dir(ws.path())
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .starts_with(STAGING_PREFIX)
            })
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn reports_round_trip() {
        let (_dir, ws) = setup();
        let project = ws.create_project("p", "d").unwrap();
        let report = sample_report("validation");
        let path = ws.add_report(project.id, &report).unwrap();
        assert!(path.is_file());

        let stored = ws.list_reports(project.id).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id(), report.id());
        assert_eq!(stored[0].name(), "validation");
    }

    #[test]
    fn unknown_project_is_an_error() {
        let (_dir, ws) = setup();
        let id = Uuid::new_v4();
        assert!(matches!(
            ws.add_report(id, &sample_report("x")),
            Err(WorkspaceError::ProjectNotFound(missing)) if missing == id
        ));
        assert!(matches!(ws.project(id), Err(WorkspaceError::ProjectNotFound(_))));
        assert!(matches!(ws.list_reports(id), Err(WorkspaceError::ProjectNotFound(_))));
    }

    #[test]
    fn ignores_stray_files() {
        let (_dir, ws) = setup();
        fs::write(ws.path().join("report_week1.json"), "{}").unwrap();
        fs::create_dir(ws.path().join("not-a-project")).unwrap();
        ws.create_project("real", "").unwrap();
        assert_eq!(ws.list_projects().unwrap().len(), 1);
    }
}
