use anyhow::{anyhow, Context, Result};
use script_host::scene::Scene;
use script_host::ScriptingConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const DEFAULT_MANIFEST_NAME: &str = "project.scriptproj";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProjectManifest {
    pub name: Option<String>,
    pub id: Option<String>,
    /// Scripting host configuration (JSON), relative to the project root.
    pub scripting: PathBuf,
    /// Game project handed to the build; replaces `build.project` from the scripting config.
    pub game_project: Option<PathBuf>,
    pub entities: Vec<ProjectEntity>,
}

/// An entity seeded into the editor scene when the project opens.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ProjectEntity {
    pub tag: String,
    pub script: Option<String>,
    pub translation: [f32; 3],
}

impl Default for ProjectManifest {
    fn default() -> Self {
        Self {
            name: None,
            id: None,
            scripting: PathBuf::from("config/scripting.json"),
            game_project: None,
            entities: Vec::new(),
        }
    }
}

/// Resolved project with absolute paths.
#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
    manifest_path: Option<PathBuf>,
    manifest: ProjectManifest,
    scripting: PathBuf,
}

impl Project {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let manifest_path = Self::resolve_manifest_path(path.as_ref());
        let root = manifest_path.parent().map(|p| p.to_path_buf()).unwrap_or_else(|| PathBuf::from("."));
        let contents = fs::read_to_string(&manifest_path)
            .with_context(|| format!("Failed to read project manifest {}", manifest_path.display()))?;
        let manifest: ProjectManifest = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse project manifest {}", manifest_path.display()))?;
        let mut project = Self::from_manifest(root, manifest);
        project.manifest_path = Some(manifest_path);
        Ok(project)
    }

    /// Construct a project from defaults rooted at the current directory.
    pub fn default() -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to read current directory")?;
        Ok(Self::from_manifest(cwd, ProjectManifest::default()))
    }

    /// Create a new project rooted at `path` with a manifest and a default scripting config.
    pub fn create_new(path: impl AsRef<Path>, name: Option<String>) -> Result<Self> {
        let root = path.as_ref();
        if root.exists() {
            let mut entries = fs::read_dir(root)
                .with_context(|| format!("Failed to inspect project directory {}", root.display()))?;
            if entries.next().is_some() {
                return Err(anyhow!(
                    "Project directory '{}' is not empty; choose an empty path or remove existing files first.",
                    root.display()
                ));
            }
        }
        fs::create_dir_all(root).with_context(|| format!("Failed to create project dir {}", root.display()))?;
        let mut manifest = ProjectManifest::default();
        if let Some(name) = name {
            manifest.id = Some(normalize_id(&name));
            manifest.name = Some(name);
        }
        let manifest_path = root.join(DEFAULT_MANIFEST_NAME);
        Self::save_manifest(&manifest, &manifest_path)?;

        let scripting = root.join(&manifest.scripting);
        if let Some(parent) = scripting.parent() {
            fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&scripting, "{}\n").with_context(|| format!("Failed to write {}", scripting.display()))?;

        let mut project = Self::from_manifest(root.to_path_buf(), manifest);
        project.manifest_path = Some(manifest_path);
        Ok(project)
    }

    pub fn save_manifest(manifest: &ProjectManifest, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(manifest)?;
        fs::write(path.as_ref(), format!("{json}\n"))
            .with_context(|| format!("Failed to write project manifest {}", path.as_ref().display()))
    }

    /// Directories resolve to the `project.scriptproj` inside them.
    fn resolve_manifest_path(path: &Path) -> PathBuf {
        if path.is_dir() {
            return path.join(DEFAULT_MANIFEST_NAME);
        }
        path.to_path_buf()
    }

    fn from_manifest(root: PathBuf, manifest: ProjectManifest) -> Self {
        let scripting =
            if manifest.scripting.is_absolute() { manifest.scripting.clone() } else { root.join(&manifest.scripting) };
        Self { root, manifest_path: None, manifest, scripting }
    }

    pub fn name(&self) -> Option<&str> {
        self.manifest.name.as_deref()
    }

    pub fn id(&self) -> Option<&str> {
        self.manifest.id.as_deref()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> &ProjectManifest {
        &self.manifest
    }

    pub fn manifest_path(&self) -> Option<&Path> {
        self.manifest_path.as_deref()
    }

    pub fn scripting_config_path(&self) -> &Path {
        &self.scripting
    }

    /// Scripting config rooted at the project. A missing file means defaults.
    pub fn scripting_config(&self) -> Result<ScriptingConfig> {
        let mut config = if self.scripting.is_file() {
            ScriptingConfig::load(&self.scripting)?
        } else {
            info!(path = %self.scripting.display(), "no scripting config; using defaults");
            ScriptingConfig::default()
        };
        config.base_dir = Some(match config.base_dir.take() {
            Some(dir) if dir.is_absolute() => dir,
            Some(dir) => self.root.join(dir),
            None => self.root.clone(),
        });
        if let Some(game_project) = &self.manifest.game_project {
            config.build.project = game_project.clone();
        }
        Ok(config)
    }

    /// Editor scene populated with the manifest's entities.
    pub fn build_scene(&self) -> Scene {
        let mut scene = Scene::new(self.name().unwrap_or("Untitled"));
        for seed in &self.manifest.entities {
            let entity = scene.create_entity(&seed.tag);
            scene.set_translation(entity, glam::Vec3::from_array(seed.translation));
            if let Some(class_name) = &seed.script {
                scene.add_script(entity, class_name);
            }
        }
        scene
    }

    pub fn describe(&self) -> String {
        let name = self.name().map(|n| n.to_string()).unwrap_or_else(|| "<unnamed>".to_string());
        let id = self.id().map(|i| format!(" ({i})")).unwrap_or_default();
        format!("{name}{id} @ {}", self.root.display())
    }
}

fn normalize_id(name: &str) -> String {
    name.chars().map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { '_' }).collect()
}
