//! Shader source lookup with `#include` resolution.
//!
//! Each renderer has a shader folder. Files are looked up in that folder first
//! and in the shared `common` folder second. `#include "file"` lines are
//! replaced recursively by the included source; a file is included at most
//! once per program stage.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use thiserror::Error;

use crate::device::{ProgramDesc, SamplerSlot, ShaderStage, StorageAccess};

pub const COMMON_FOLDER: &str = "common";

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ShaderError {
    #[error("shader '{file}' not found in '{folder}' or 'common'")]
    NotFound { folder: String, file: String },
    #[error("{file}:{line}: malformed #include directive")]
    MalformedInclude { file: String, line: usize },
    #[error("{file}:{line}: included file '{include}' not found")]
    IncludeNotFound { file: String, line: usize, include: String },
    #[error("failed to read shader '{file}': {message}")]
    Io { file: String, message: String },
}

/// The programs a renderer can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    /// `vertex.wgsl` + `fragment.wgsl`.
    Main,
    /// `shadow_vertex.wgsl` + `shadow_fragment.wgsl`.
    Shadow,
    /// `compute.wgsl`.
    Compute,
    /// `feedback.wgsl`, a kernel that writes into a second buffer.
    Feedback,
}

impl ProgramKind {
    pub fn files(&self) -> &'static [(ShaderStage, &'static str)] {
        match self {
            ProgramKind::Main => &[
                (ShaderStage::Vertex, "vertex.wgsl"),
                (ShaderStage::Fragment, "fragment.wgsl"),
            ],
            ProgramKind::Shadow => &[
                (ShaderStage::Vertex, "shadow_vertex.wgsl"),
                (ShaderStage::Fragment, "shadow_fragment.wgsl"),
            ],
            ProgramKind::Compute => &[(ShaderStage::Compute, "compute.wgsl")],
            ProgramKind::Feedback => &[(ShaderStage::Compute, "feedback.wgsl")],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProgramKind::Main => "main",
            ProgramKind::Shadow => "shadow",
            ProgramKind::Compute => "compute",
            ProgramKind::Feedback => "feedback",
        }
    }
}

enum Source {
    Disk(PathBuf),
    Memory(HashMap<String, String>),
}

/// Shader source provider rooted at a directory or an in-memory map.
///
/// In-memory keys are `folder/file`, e.g. `"surface/vertex.wgsl"`.
pub struct ShaderLibrary {
    source: Source,
}

impl ShaderLibrary {
    pub fn from_dir(root: impl Into<PathBuf>) -> Self {
        Self {
            source: Source::Disk(root.into()),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            source: Source::Memory(HashMap::new()),
        }
    }

    /// Add or replace an in-memory file. Ignored for disk-backed libraries.
    pub fn insert(&mut self, path: impl Into<String>, source: impl Into<String>) {
        if let Source::Memory(files) = &mut self.source {
            files.insert(path.into(), source.into());
        }
    }

    pub fn with_file(mut self, path: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(path, source);
        self
    }

    fn read(&self, folder: &str, file: &str) -> Result<Option<String>, ShaderError> {
        match &self.source {
            Source::Memory(files) => Ok(files.get(&format!("{folder}/{file}")).cloned()),
            Source::Disk(root) => {
                let path = root.join(folder).join(file);
                if !path.is_file() {
                    return Ok(None);
                }
                std::fs::read_to_string(&path).map(Some).map_err(|e| ShaderError::Io {
                    file: path.display().to_string(),
                    message: e.to_string(),
                })
            }
        }
    }

    /// Look a file up in `folder`, then in the common folder.
    fn lookup(&self, folder: &str, file: &str) -> Result<Option<(String, String)>, ShaderError> {
        if let Some(src) = self.read(folder, file)? {
            return Ok(Some((format!("{folder}/{file}"), src)));
        }
        if let Some(src) = self.read(COMMON_FOLDER, file)? {
            return Ok(Some((format!("{COMMON_FOLDER}/{file}"), src)));
        }
        Ok(None)
    }

    /// Load `file` from `folder` with every include resolved.
    pub fn load(&self, folder: &str, file: &str) -> Result<String, ShaderError> {
        let (path, source) = self.lookup(folder, file)?.ok_or_else(|| ShaderError::NotFound {
            folder: folder.to_string(),
            file: file.to_string(),
        })?;
        let mut included = HashSet::new();
        included.insert(path.clone());
        let mut out = String::with_capacity(source.len());
        self.expand(folder, &path, &source, &mut included, &mut out)?;
        Ok(out)
    }

    fn expand(
        &self,
        folder: &str,
        path: &str,
        source: &str,
        included: &mut HashSet<String>,
        out: &mut String,
    ) -> Result<(), ShaderError> {
        for (index, line) in source.lines().enumerate() {
            let trimmed = line.trim_start();
            let Some(rest) = trimmed.strip_prefix("#include") else {
                out.push_str(line);
                out.push('\n');
                continue;
            };
            let line_number = index + 1;
            let include = parse_include(rest).ok_or_else(|| ShaderError::MalformedInclude {
                file: path.to_string(),
                line: line_number,
            })?;
            let (include_path, include_source) =
                self.lookup(folder, include)?.ok_or_else(|| ShaderError::IncludeNotFound {
                    file: path.to_string(),
                    line: line_number,
                    include: include.to_string(),
                })?;
            if included.insert(include_path.clone()) {
                self.expand(folder, &include_path, &include_source, included, out)?;
            }
        }
        Ok(())
    }

    /// Resolve every stage of `kind` from `folder` into a program description.
    pub fn program(
        &self,
        folder: &str,
        kind: ProgramKind,
        samplers: Vec<SamplerSlot>,
        storage: Vec<StorageAccess>,
    ) -> Result<ProgramDesc, ShaderError> {
        let stages = kind
            .files()
            .iter()
            .map(|(stage, file)| Ok((*stage, self.load(folder, file)?)))
            .collect::<Result<Vec<_>, ShaderError>>()?;
        Ok(ProgramDesc {
            label: format!("{folder}/{}", kind.name()),
            stages,
            samplers,
            storage,
        })
    }
}

/// `"file"` after the directive, nothing else but whitespace.
fn parse_include(rest: &str) -> Option<&str> {
    let rest = rest.trim();
    let inner = rest.strip_prefix('"')?.strip_suffix('"')?;
    if inner.is_empty() || inner.contains('"') {
        return None;
    }
    Some(inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library() -> ShaderLibrary {
        ShaderLibrary::in_memory()
            .with_file("common/lighting.wgsl", "#include \"uniforms.wgsl\"\nfn lighting() {}")
            .with_file("common/uniforms.wgsl", "struct Uniforms {}")
            .with_file("surface/uniforms.wgsl", "struct SurfaceUniforms {}")
            .with_file(
                "surface/vertex.wgsl",
                "#include \"uniforms.wgsl\"\n#include \"lighting.wgsl\"\nfn vs_main() {}",
            )
            .with_file("surface/fragment.wgsl", "fn fs_main() {}")
    }

    #[test]
    fn shader_folder_wins_over_common() {
        let src = library().load("surface", "vertex.wgsl").unwrap();
        assert!(src.contains("SurfaceUniforms"));
        assert!(!src.contains("struct Uniforms {}"));
    }

    #[test]
    fn includes_are_expanded_once() {
        let src = library()
            .with_file("skybox/vertex.wgsl", "#include \"lighting.wgsl\"\n#include \"lighting.wgsl\"\nfn vs_main() {}")
            .load("skybox", "vertex.wgsl")
            .unwrap();
        assert_eq!(src.matches("fn lighting()").count(), 1);
        assert_eq!(src.matches("struct Uniforms {}").count(), 1);
        assert!(!src.contains("#include"));
    }

    #[test]
    fn malformed_include_names_file_and_line() {
        let err = library()
            .with_file("model/vertex.wgsl", "fn a() {}\n#include uniforms.wgsl")
            .load("model", "vertex.wgsl")
            .unwrap_err();
        assert_eq!(
            err,
            ShaderError::MalformedInclude {
                file: "model/vertex.wgsl".into(),
                line: 2
            }
        );
    }

    #[test]
    fn missing_include_is_reported() {
        let err = library()
            .with_file("model/vertex.wgsl", "#include \"missing.wgsl\"")
            .load("model", "vertex.wgsl")
            .unwrap_err();
        assert!(matches!(err, ShaderError::IncludeNotFound { line: 1, .. }));
    }

    #[test]
    fn program_collects_stages() {
        let desc = library().program("surface", ProgramKind::Main, Vec::new(), Vec::new()).unwrap();
        assert_eq!(desc.label, "surface/main");
        assert!(desc.stage(ShaderStage::Vertex).is_some());
        assert!(desc.stage(ShaderStage::Fragment).unwrap().contains("fs_main"));
        let err = library().program("surface", ProgramKind::Shadow, Vec::new(), Vec::new()).unwrap_err();
        assert!(matches!(err, ShaderError::NotFound { .. }));
    }
}
