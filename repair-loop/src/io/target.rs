//! Reading and writing the artifact under repair.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::core::language::LanguageProfile;
use crate::error::RepairError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    File,
    Directory,
}

/// The file or directory under repair, resolved to an absolute path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    path: PathBuf,
    kind: TargetKind,
}

impl Target {
    /// Resolve `path`; a missing path is a configuration error.
    pub fn resolve(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RepairError::TargetNotFound(path.to_path_buf()).into());
        }
        let path = path
            .canonicalize()
            .with_context(|| format!("canonicalize {}", path.display()))?;
        let kind = if path.is_dir() {
            TargetKind::Directory
        } else {
            TargetKind::File
        };
        Ok(Self { path, kind })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    /// Current content of the target, best effort.
    ///
    /// A file that cannot be read yields an empty string. A directory yields
    /// its top-level source files (by `language.extension`), sorted by name,
    /// each preceded by a `// FILE: <path>` marker line.
    pub fn read(&self, language: &LanguageProfile) -> String {
        match self.kind {
            TargetKind::File => fs::read_to_string(&self.path).unwrap_or_else(|err| {
                warn!(path = %self.path.display(), err = %err, "target unreadable, using empty content");
                String::new()
            }),
            TargetKind::Directory => self.read_directory(language),
        }
    }

    fn read_directory(&self, language: &LanguageProfile) -> String {
        let entries = match fs::read_dir(&self.path) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(path = %self.path.display(), err = %err, "target directory unreadable");
                return String::new();
            }
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file())
            .filter(|path| {
                path.extension()
                    .is_some_and(|ext| ext == language.extension.as_str())
            })
            .collect();
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        let mut buf = String::new();
        for file in &files {
            let Ok(content) = fs::read_to_string(file) else {
                debug!(path = %file.display(), "skipping unreadable member file");
                continue;
            };
            buf.push_str(&language.file_marker(&file.display().to_string()));
            buf.push('\n');
            buf.push_str(&content);
            buf.push_str("\n\n");
        }
        buf
    }

    /// Replace the target's content.
    ///
    /// Directory targets always fail with [`RepairError::UnsupportedWrite`]:
    /// a concatenated blob is never split back into member files.
    pub fn write(&self, content: &str) -> Result<()> {
        match self.kind {
            TargetKind::File => fs::write(&self.path, content)
                .with_context(|| format!("write {}", self.path.display())),
            TargetKind::Directory => Err(RepairError::UnsupportedWrite(self.path.clone()).into()),
        }
    }
}
