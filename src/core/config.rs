use anyhow::{Context, Result, bail};
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::builders::editor::HgrcEditor;
use crate::core::document::SettingsDocument;
use crate::core::parser::{Parser, expand_path, parse_file};

/// Environment variable that replaces the system and user config search.
pub const HGRCPATH: &str = "HGRCPATH";

/// The bundled settings document, written by `init`.
pub const DEFAULT_HGRC: &str = include_str!("../../hgrc");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    /// Listed in `HGRCPATH`, or passed explicitly.
    Path,
    System,
    User,
    Repository,
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerKind::Path => write!(f, "path"),
            LayerKind::System => write!(f, "system"),
            LayerKind::User => write!(f, "user"),
            LayerKind::Repository => write!(f, "repository"),
        }
    }
}

/// One config file in the precedence chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLayer {
    pub kind: LayerKind,
    pub path: PathBuf,
}

/// A `--config section.key=value` override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Override {
    pub section: String,
    pub key: String,
    pub value: String,
}

impl Override {
    pub fn parse(raw: &str) -> Result<Self> {
        let parsed = raw.split_once('=').and_then(|(name, value)| {
            let (section, key) = SettingsDocument::split_name(name.trim())?;
            Some(Self {
                section: section.to_string(),
                key: key.to_string(),
                value: value.trim().to_string(),
            })
        });
        match parsed {
            Some(o) => Ok(o),
            None => bail!("malformed --config option: '{raw}' (use --config section.name=value)"),
        }
    }
}

/// Per-layer information for reports.
#[derive(Debug)]
pub struct LayerStatus {
    pub layer: ConfigLayer,
    pub exists: bool,
    pub entries: usize,
}

/// Discovers the config layers, loads them in precedence order and routes
/// writes to the right file.
pub struct ConfigManager {
    layers: Vec<ConfigLayer>,
    overrides: Vec<Override>,
    repo_root: Option<PathBuf>,
    user_config_path: Option<PathBuf>,
    target: Option<PathBuf>,
    local: bool,
}

impl ConfigManager {
    /// Builds the layer list for the current working directory.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to read current directory")?;
        Self::discover(&cwd)
    }

    /// Builds the layer list for a repository search starting at `start`.
    pub fn discover(start: &Path) -> Result<Self> {
        Self::discover_with(start, std::env::var_os(HGRCPATH))
    }

    /// Like `discover`, with the value of `HGRCPATH` passed in.
    fn discover_with(start: &Path, hgrcpath: Option<OsString>) -> Result<Self> {
        let repo_root = find_hg_root(start);
        let user_config_path = user_config_path();
        let mut layers = Vec::new();

        match hgrcpath {
            Some(value) => {
                debug!(value = ?value, "using HGRCPATH");
                for entry in std::env::split_paths(&value) {
                    if entry.as_os_str().is_empty() {
                        continue;
                    }
                    let entry = expand_path(&entry.to_string_lossy());
                    for path in expand_layer_entry(&entry)? {
                        layers.push(ConfigLayer {
                            kind: LayerKind::Path,
                            path,
                        });
                    }
                }
            }
            None => {
                for path in system_config_paths()? {
                    layers.push(ConfigLayer {
                        kind: LayerKind::System,
                        path,
                    });
                }
                for path in user_config_candidates() {
                    layers.push(ConfigLayer {
                        kind: LayerKind::User,
                        path,
                    });
                }
            }
        }

        if let Some(root) = &repo_root {
            layers.push(ConfigLayer {
                kind: LayerKind::Repository,
                path: root.join(".hg").join("hgrc"),
            });
        }

        Ok(Self {
            layers,
            overrides: Vec::new(),
            repo_root,
            user_config_path,
            target: None,
            local: false,
        })
    }

    /// A manager over exactly `paths`, lowest precedence first. Writes go to
    /// the last path.
    pub fn new_at(paths: Vec<PathBuf>) -> Self {
        let target = paths.last().cloned();
        Self {
            layers: paths
                .into_iter()
                .map(|path| ConfigLayer {
                    kind: LayerKind::Path,
                    path,
                })
                .collect(),
            overrides: Vec::new(),
            repo_root: None,
            user_config_path: None,
            target,
            local: false,
        }
    }

    pub fn add_overrides(&mut self, raw: &[String]) -> Result<()> {
        for item in raw {
            self.overrides.push(Override::parse(item)?);
        }
        Ok(())
    }

    /// Sends writes to `path` instead of the user or repository config.
    pub fn set_target(&mut self, path: PathBuf) {
        self.target = Some(path);
    }

    /// Sends writes to the repository's `.hg/hgrc`.
    pub fn set_local(&mut self, local: bool) {
        self.local = local;
    }

    pub fn layers(&self) -> &[ConfigLayer] {
        &self.layers
    }

    pub fn overrides(&self) -> &[Override] {
        &self.overrides
    }

    pub fn get_repo_root(&self) -> Option<&Path> {
        self.repo_root.as_deref()
    }

    pub fn layer_statuses(&self) -> Result<Vec<LayerStatus>> {
        self.layers
            .iter()
            .map(|layer| {
                let exists = layer.path.is_file();
                let entries = if exists {
                    parse_file(&layer.path)
                        .with_context(|| format!("Failed to parse {}", layer.path.display()))?
                        .len()
                } else {
                    0
                };
                Ok(LayerStatus {
                    layer: layer.clone(),
                    exists,
                    entries,
                })
            })
            .collect()
    }

    /// Writes the bundled hgrc to the write target unless the file already
    /// exists. Returns whether a file was written.
    pub fn initialize(&self, username: Option<&str>) -> Result<bool> {
        let path = self.get_config_path()?;
        if path.exists() {
            return Ok(false);
        }
        let mut editor = HgrcEditor::from_text(&path, DEFAULT_HGRC);
        if let Some(username) = username {
            editor.set("ui", "username", username)?;
        }
        editor.save()?;
        info!(path = %path.display(), "initialized config");
        Ok(true)
    }

    /// Sets `section.key` in the write target, keeping the rest of the file
    /// intact. Returns the file that was written.
    pub fn set_value(&self, name: &str, value: &str) -> Result<PathBuf> {
        let (section, key) = parse_setting_name(name)?;
        let path = self.get_config_path()?;
        let mut editor = HgrcEditor::load(&path)?;
        editor.set(section, key, value)?;
        editor.save()?;
        Ok(path)
    }

    /// Removes `section.key` from the write target. Returns whether anything
    /// was removed.
    pub fn unset_value(&self, name: &str) -> Result<bool> {
        let (section, key) = parse_setting_name(name)?;
        let path = self.get_config_path()?;
        if !path.exists() {
            return Ok(false);
        }
        let mut editor = HgrcEditor::load(&path)?;
        let removed = editor.unset(section, key);
        if removed {
            editor.save()?;
        }
        Ok(removed)
    }

    /// Merges every entry of `doc` into the write target. Returns the number
    /// of entries written. Nothing is written if any name is refused.
    pub fn import_document(&self, doc: &SettingsDocument) -> Result<usize> {
        let path = self.get_config_path()?;
        let mut editor = HgrcEditor::load(&path)?;
        for section in doc.sections() {
            for (key, entry) in section.iter() {
                editor
                    .set(section.name(), key, &entry.value)
                    .with_context(|| format!("Cannot import into {}", path.display()))?;
            }
        }
        editor.save()?;
        Ok(doc.len())
    }
}

pub trait ConfigProvider {
    /// Loads every layer plus overrides into one document.
    fn load_config(&self) -> Result<SettingsDocument>;
    /// Replaces the write target with `config`. Comments are not preserved.
    fn save_config(&self, config: &SettingsDocument) -> Result<()>;
    /// The file writes go to.
    fn get_config_path(&self) -> Result<PathBuf>;
}

impl ConfigProvider for ConfigManager {
    fn load_config(&self) -> Result<SettingsDocument> {
        let mut doc = SettingsDocument::new();
        let mut parser = Parser::new();
        for layer in &self.layers {
            if !layer.path.is_file() {
                debug!(path = %layer.path.display(), kind = %layer.kind, "config layer not present");
                continue;
            }
            debug!(path = %layer.path.display(), kind = %layer.kind, "reading config layer");
            parser
                .parse_file_into(&mut doc, &layer.path)
                .with_context(|| format!("Failed to load {}", layer.path.display()))?;
        }
        for o in &self.overrides {
            doc.set(&o.section, o.key.clone(), o.value.clone(), None);
        }
        Ok(doc)
    }

    fn save_config(&self, config: &SettingsDocument) -> Result<()> {
        let path = self.get_config_path()?;
        HgrcEditor::from_text(&path, &config.to_hgrc_string()).save()
    }

    fn get_config_path(&self) -> Result<PathBuf> {
        if let Some(target) = &self.target {
            return Ok(target.clone());
        }
        if self.local {
            return match &self.repo_root {
                Some(root) => Ok(root.join(".hg").join("hgrc")),
                None => bail!("There is no Mercurial repository here (.hg not found)"),
            };
        }
        match &self.user_config_path {
            Some(path) => Ok(path.clone()),
            None => bail!("Could not determine the user's home directory"),
        }
    }
}

fn parse_setting_name(name: &str) -> Result<(&str, &str)> {
    match SettingsDocument::split_name(name) {
        Some(parts) => Ok(parts),
        None => bail!("Setting names have the form 'section.key', got '{name}'"),
    }
}

/// Walks up from `start` to the first directory containing `.hg`.
pub fn find_hg_root(start: &Path) -> Option<PathBuf> {
    let mut dir = start;
    loop {
        if dir.join(".hg").is_dir() {
            return Some(dir.to_path_buf());
        }
        dir = dir.parent()?;
    }
}

/// A file stands for itself; a directory stands for its `*.rc` files in
/// sorted order.
fn expand_layer_entry(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files: Vec<PathBuf> = fs::read_dir(path)
        .with_context(|| format!("Failed to list {}", path.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "rc"))
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(unix)]
fn system_config_paths() -> Result<Vec<PathBuf>> {
    let mut paths = vec![PathBuf::from("/etc/mercurial/hgrc")];
    let dir = Path::new("/etc/mercurial/hgrc.d");
    if dir.is_dir() {
        paths.extend(expand_layer_entry(dir)?);
    }
    Ok(paths)
}

#[cfg(not(unix))]
fn system_config_paths() -> Result<Vec<PathBuf>> {
    Ok(Vec::new())
}

/// User config files, lowest precedence first.
fn user_config_candidates() -> Vec<PathBuf> {
    match directories::BaseDirs::new() {
        Some(dirs) => user_config_candidates_in(dirs.home_dir(), std::env::var_os("XDG_CONFIG_HOME")),
        None => Vec::new(),
    }
}

/// `~/.hgrc`, then the XDG file, which therefore wins. macOS only reads
/// `~/.hgrc`. A relative `XDG_CONFIG_HOME` is ignored.
fn user_config_candidates_in(home: &Path, xdg_config_home: Option<OsString>) -> Vec<PathBuf> {
    let mut candidates = vec![home.join(".hgrc")];
    if cfg!(target_os = "macos") {
        return candidates;
    }
    let config_home = xdg_config_home
        .map(PathBuf::from)
        .filter(|dir| dir.is_absolute())
        .unwrap_or_else(|| home.join(".config"));
    candidates.push(config_home.join("hg").join("hgrc"));
    candidates
}

/// The user file `set` writes to: the first candidate that exists, or
/// `~/.hgrc`.
fn user_config_path() -> Option<PathBuf> {
    pick_user_config_path(&user_config_candidates())
}

fn pick_user_config_path(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates
        .iter()
        .find(|path| path.exists())
        .or_else(|| candidates.first())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_parsing() {
        let o = Override::parse("ui.username = Jane <jane@example.com>").unwrap();
        assert_eq!(o.section, "ui");
        assert_eq!(o.key, "username");
        assert_eq!(o.value, "Jane <jane@example.com>");

        let dotted = Override::parse("color.diff.deleted=red bold").unwrap();
        assert_eq!(dotted.key, "diff.deleted");

        assert!(Override::parse("ui.verbose").is_err());
        assert!(Override::parse("verbose=1").is_err());
    }

    #[test]
    fn test_find_hg_root_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".hg")).unwrap();
        let nested = dir.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_hg_root(&nested), Some(dir.path().to_path_buf()));
    }

    #[test]
    fn test_directory_layer_reads_rc_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("20-b.rc"), "").unwrap();
        fs::write(dir.path().join("10-a.rc"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();

        let files = expand_layer_entry(dir.path()).unwrap();
        let names: Vec<_> = files.iter().map(|p| p.file_name().unwrap().to_string_lossy().to_string()).collect();
        assert_eq!(names, vec!["10-a.rc", "20-b.rc"]);
    }

    #[test]
    fn test_later_layers_and_overrides_win() {
        let dir = tempfile::tempdir().unwrap();
        let system = dir.path().join("system.rc");
        let user = dir.path().join("user.rc");
        fs::write(&system, "[ui]\nverbose = False\nusername = System <sys@example.com>\n").unwrap();
        fs::write(&user, "[ui]\nverbose = True\n").unwrap();

        let mut manager = ConfigManager::new_at(vec![system.clone(), dir.path().join("absent.rc"), user.clone()]);
        manager.add_overrides(&["pager.pager=more".to_string()]).unwrap();
        let doc = manager.load_config().unwrap();

        assert_eq!(doc.get("ui", "verbose"), Some("True"));
        assert_eq!(doc.entry("ui", "verbose").unwrap().source.as_ref().unwrap().path, user);
        assert_eq!(doc.get("ui", "username"), Some("System <sys@example.com>"));
        assert_eq!(doc.get("pager", "pager"), Some("more"));
        assert_eq!(doc.entry("pager", "pager").unwrap().source, None);
        assert_eq!(manager.get_config_path().unwrap(), user);
    }

    #[test]
    fn test_hgrcpath_entries_and_repository_layer() {
        let dir = tempfile::tempdir().unwrap();
        let shared = dir.path().join("hgrc.d");
        fs::create_dir_all(&shared).unwrap();
        fs::write(shared.join("20-diff.rc"), "[diff]\ngit = True\n[ui]\nverbose = True\n").unwrap();
        fs::write(shared.join("10-ui.rc"), "[ui]\nusername = Shared <shared@example.com>\n").unwrap();
        let personal = dir.path().join("personal.rc");
        fs::write(&personal, "[ui]\nusername = Jane <jane@example.com>\n").unwrap();

        let repo = dir.path().join("repo");
        fs::create_dir_all(repo.join(".hg")).unwrap();
        fs::write(repo.join(".hg").join("hgrc"), "[ui]\nverbose = False\n").unwrap();
        let nested = repo.join("src");
        fs::create_dir_all(&nested).unwrap();

        let hgrcpath = std::env::join_paths([shared.clone(), PathBuf::new(), personal.clone()]).unwrap();
        let mut manager = ConfigManager::discover_with(&nested, Some(hgrcpath)).unwrap();

        let layers: Vec<(LayerKind, PathBuf)> = manager.layers().iter().map(|l| (l.kind, l.path.clone())).collect();
        assert_eq!(
            layers,
            vec![
                (LayerKind::Path, shared.join("10-ui.rc")),
                (LayerKind::Path, shared.join("20-diff.rc")),
                (LayerKind::Path, personal.clone()),
                (LayerKind::Repository, repo.join(".hg").join("hgrc")),
            ]
        );
        assert_eq!(manager.get_repo_root(), Some(repo.as_path()));

        let doc = manager.load_config().unwrap();
        assert_eq!(doc.get("ui", "username"), Some("Jane <jane@example.com>"));
        assert_eq!(doc.get("ui", "verbose"), Some("False"));
        assert_eq!(doc.get("diff", "git"), Some("True"));

        manager.set_local(true);
        let written = manager.set_value("ui.username", "Repo <repo@example.com>").unwrap();
        assert_eq!(written, repo.join(".hg").join("hgrc"));
        assert_eq!(
            fs::read_to_string(&written).unwrap(),
            "[ui]\nverbose = False\nusername = Repo <repo@example.com>\n"
        );
        assert_eq!(
            manager.load_config().unwrap().get("ui", "username"),
            Some("Repo <repo@example.com>")
        );
    }

    #[test]
    fn test_empty_hgrcpath_skips_system_and_user_files() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::discover_with(dir.path(), Some(OsString::new())).unwrap();
        assert!(manager.layers().is_empty());
        assert_eq!(manager.get_repo_root(), None);
    }

    #[test]
    fn test_user_candidates_put_xdg_last() {
        let home = Path::new("/home/jane");
        let candidates = user_config_candidates_in(home, Some(OsString::from("/xdg")));
        if cfg!(target_os = "macos") {
            assert_eq!(candidates, vec![home.join(".hgrc")]);
            return;
        }
        assert_eq!(candidates, vec![home.join(".hgrc"), PathBuf::from("/xdg/hg/hgrc")]);

        let fallback = user_config_candidates_in(home, Some(OsString::from("relative")));
        assert_eq!(fallback[1], home.join(".config").join("hg").join("hgrc"));
        assert_eq!(user_config_candidates_in(home, None), fallback);
    }

    #[test]
    fn test_user_write_path_prefers_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let home_rc = dir.path().join(".hgrc");
        let xdg_rc = dir.path().join("hg").join("hgrc");
        let candidates = vec![home_rc.clone(), xdg_rc.clone()];

        assert_eq!(pick_user_config_path(&candidates), Some(home_rc.clone()));

        fs::create_dir_all(xdg_rc.parent().unwrap()).unwrap();
        fs::write(&xdg_rc, "").unwrap();
        assert_eq!(pick_user_config_path(&candidates), Some(xdg_rc));

        fs::write(&home_rc, "").unwrap();
        assert_eq!(pick_user_config_path(&candidates), Some(home_rc));
        assert_eq!(pick_user_config_path(&[]), None);
    }

    #[test]
    fn test_local_target_requires_repository() {
        let mut manager = ConfigManager::new_at(Vec::new());
        manager.target = None;
        manager.set_local(true);
        assert!(manager.get_config_path().is_err());
    }
}
