//! Artifact collection into the package staging layout
//!
//! Headers keep their path relative to the rule's source directory so consumer
//! include statements stay valid. Static libraries are flattened into a single
//! directory. File contents are copied unchanged, and an expected artifact that
//! is missing is not reported here.

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use walkdir::WalkDir;

use crate::{Error, Result};

/// Role of a staged file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Header,
    StaticLibrary,
}

/// Selection rule for one kind of artifact
#[derive(Debug, Clone)]
pub struct ArtifactRule {
    pub kind: ArtifactKind,
    /// File extensions matched, without the leading dot
    pub extensions: Vec<String>,
    /// Directory below the install tree searched by this rule
    pub source_subdir: Utf8PathBuf,
    /// Directory below the staging root receiving matches
    pub destination: Utf8PathBuf,
    /// Keep the path relative to `source_subdir`; otherwise flatten
    pub keep_path: bool,
}

impl ArtifactRule {
    fn matches(&self, path: &Utf8Path) -> bool {
        path.extension()
            .is_some_and(|ext| self.extensions.iter().any(|e| e == ext))
    }
}

/// One file selected for staging
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactEntry {
    pub kind: ArtifactKind,
    /// Absolute path inside the install tree
    pub source: Utf8PathBuf,
    /// Path relative to the staging root
    pub destination: Utf8PathBuf,
}

/// Files staged by one collection run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArtifactManifest {
    pub entries: Vec<ArtifactEntry>,
}

impl ArtifactManifest {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn of_kind(&self, kind: ArtifactKind) -> impl Iterator<Item = &ArtifactEntry> {
        self.entries.iter().filter(move |e| e.kind == kind)
    }

    /// Destinations in manifest order
    pub fn destinations(&self) -> Vec<&Utf8Path> {
        self.entries.iter().map(|e| e.destination.as_path()).collect()
    }
}

/// Selects installable files from an install tree
#[derive(Debug, Clone)]
pub struct ArtifactCollector {
    rules: Vec<ArtifactRule>,
}

impl Default for ArtifactCollector {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

/// Headers under `include/` keep their layout; static archives anywhere go flat into `lib/`
pub fn default_rules() -> Vec<ArtifactRule> {
    vec![
        ArtifactRule {
            kind: ArtifactKind::Header,
            extensions: vec!["h".to_string(), "hpp".to_string()],
            source_subdir: Utf8PathBuf::from("include"),
            destination: Utf8PathBuf::from("include"),
            keep_path: true,
        },
        ArtifactRule {
            kind: ArtifactKind::StaticLibrary,
            extensions: vec!["a".to_string(), "lib".to_string()],
            source_subdir: Utf8PathBuf::new(),
            destination: Utf8PathBuf::from("lib"),
            keep_path: false,
        },
    ]
}

impl ArtifactCollector {
    pub fn new(rules: Vec<ArtifactRule>) -> Self {
        Self { rules }
    }

    /// Select artifacts without copying anything
    pub fn plan(&self, install_tree: &Utf8Path) -> Result<ArtifactManifest> {
        self.plan_excluding(install_tree, None)
    }

    /// Select artifacts from `install_tree` and copy them below `staging_dir`
    pub fn collect(&self, install_tree: &Utf8Path, staging_dir: &Utf8Path) -> Result<ArtifactManifest> {
        let manifest = self.plan_excluding(install_tree, Some(staging_dir))?;

        for entry in &manifest.entries {
            let dst_path = staging_dir.join(&entry.destination);
            if let Some(parent) = dst_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::artifact_collection(parent, format!("cannot create directory: {}", e))
                })?;
            }
            std::fs::copy(&entry.source, &dst_path).map_err(|e| {
                Error::artifact_collection(
                    &entry.source,
                    format!("cannot copy to {}: {}", dst_path, e),
                )
            })?;
            tracing::debug!("Staged {} -> {}", entry.source, dst_path);
        }

        tracing::info!(
            headers = manifest.of_kind(ArtifactKind::Header).count(),
            libraries = manifest.of_kind(ArtifactKind::StaticLibrary).count(),
            "Collected artifacts into {}",
            staging_dir
        );
        Ok(manifest)
    }

    fn plan_excluding(
        &self,
        install_tree: &Utf8Path,
        excluded: Option<&Utf8Path>,
    ) -> Result<ArtifactManifest> {
        if !install_tree.is_dir() {
            return Err(Error::artifact_collection(
                install_tree,
                "install tree does not exist or is not a directory",
            ));
        }

        let mut manifest = ArtifactManifest::default();
        for rule in &self.rules {
            let root = install_tree.join(&rule.source_subdir);
            if !root.is_dir() {
                tracing::debug!("No {} directory for {:?} artifacts", root, rule.kind);
                continue;
            }
            self.collect_rule(rule, &root, excluded, &mut manifest)?;
        }

        Ok(manifest)
    }

    fn collect_rule(
        &self,
        rule: &ArtifactRule,
        root: &Utf8Path,
        excluded: Option<&Utf8Path>,
        manifest: &mut ArtifactManifest,
    ) -> Result<()> {
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| excluded.is_none_or(|ex| e.path() != ex.as_std_path()));

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e
                    .path()
                    .and_then(Utf8Path::from_path)
                    .unwrap_or(root)
                    .to_path_buf();
                Error::artifact_collection(path, e.to_string())
            })?;

            if entry.file_type().is_symlink() {
                if entry.path().is_file() {
                    tracing::debug!("Following symlink {}", entry.path().display());
                } else {
                    tracing::debug!("Skipping symlink {}", entry.path().display());
                    continue;
                }
            } else if !entry.file_type().is_file() {
                continue;
            }

            let src_path = Utf8Path::from_path(entry.path()).ok_or_else(|| {
                Error::artifact_collection(
                    root,
                    format!("path is not valid UTF-8: {:?}", entry.path()),
                )
            })?;

            if !rule.matches(src_path) {
                continue;
            }

            let relative = if rule.keep_path {
                src_path.strip_prefix(root).map_err(|_| {
                    Error::artifact_collection(src_path, "file is outside the rule directory")
                })?
            } else {
                // Flattened: only the file name survives
                match src_path.file_name() {
                    Some(name) => Utf8Path::new(name),
                    None => continue,
                }
            };

            let destination = rule.destination.join(relative);
            if let Some(previous) = manifest
                .entries
                .iter()
                .find(|e| e.destination == destination)
            {
                tracing::warn!(
                    "{} and {} both stage to {}; the later file wins",
                    previous.source,
                    src_path,
                    destination
                );
            }

            manifest.entries.push(ArtifactEntry {
                kind: rule.kind,
                source: src_path.to_path_buf(),
                destination,
            });
        }

        Ok(())
    }
}
