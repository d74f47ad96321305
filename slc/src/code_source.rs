use std::cell::OnceCell;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::error::CompilerError;

#[derive(Clone)]
enum Backing {
    File(PathBuf),
    Bytes(Rc<[u8]>),
}

/// A named unit of source text, backed by a file or by bytes in memory
///
/// The name is for diagnostics only. Content is loaded on first use and
/// cached, so repeated loads return the same buffer.
pub struct CodeSource {
    name: String,
    backing: Backing,
    content: OnceCell<Rc<[u8]>>,
}

impl CodeSource {
    /// Create a source that reads `path` when loaded
    #[must_use]
    pub fn for_file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        Self {
            name,
            backing: Backing::File(path),
            content: OnceCell::new(),
        }
    }

    /// Create a source over an in-memory buffer
    #[must_use]
    pub fn for_bytes(name: impl Into<String>, bytes: impl Into<Rc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            backing: Backing::Bytes(bytes.into()),
            content: OnceCell::new(),
        }
    }

    /// Display name used in diagnostics
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backing file, if this source is file-backed
    #[must_use]
    pub fn file(&self) -> Option<&Path> {
        match &self.backing {
            Backing::File(path) => Some(path),
            Backing::Bytes(_) => None,
        }
    }

    /// Resolve `relative` against the directory containing this source
    ///
    /// Returns `None` for in-memory sources, which have no directory.
    #[must_use]
    pub fn resolve_relative(&self, relative: &str) -> Option<PathBuf> {
        let file = self.file()?;
        let parent = file.parent().unwrap_or_else(|| Path::new(""));
        Some(parent.join(relative))
    }

    /// Load the content, reading the file on first call
    ///
    /// # Errors
    /// Returns `CompilerError::Io` if the backing file cannot be read.
    pub fn load(&self) -> Result<Rc<[u8]>, CompilerError> {
        if let Some(content) = self.content.get() {
            return Ok(Rc::clone(content));
        }
        let loaded: Rc<[u8]> = match &self.backing {
            Backing::File(path) => {
                tracing::trace!(path = %path.display(), "loading source");
                std::fs::read(path)?.into()
            }
            Backing::Bytes(bytes) => Rc::clone(bytes),
        };
        Ok(Rc::clone(self.content.get_or_init(|| loaded)))
    }

    /// Whether the content has already been loaded
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.content.get().is_some()
    }
}

impl fmt::Debug for CodeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("CodeSource");
        s.field("name", &self.name);
        match &self.backing {
            Backing::File(path) => s.field("file", path),
            Backing::Bytes(bytes) => s.field("bytes", &bytes.len()),
        };
        s.field("loaded", &self.is_loaded()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_source_has_no_file() {
        let source = CodeSource::for_bytes("<program>", b"void main() {}".as_slice());
        assert_eq!(source.name(), "<program>");
        assert!(source.file().is_none());
        assert!(source.resolve_relative("a.glsl").is_none());
        assert_eq!(&*source.load().unwrap(), b"void main() {}");
    }

    #[test]
    fn file_source_uses_base_name_and_caches() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("shader.glsl");
        std::fs::write(&path, "float x;").expect("write shader");

        let source = CodeSource::for_file(&path);
        assert_eq!(source.name(), "shader.glsl");
        assert!(!source.is_loaded());
        let first = source.load().unwrap();
        assert!(source.is_loaded());

        std::fs::write(&path, "changed").expect("rewrite shader");
        let second = source.load().unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(&*second, b"float x;");
    }

    #[test]
    fn resolve_relative_uses_parent_directory() {
        let source = CodeSource::for_file("/shaders/main.glsl");
        assert_eq!(
            source.resolve_relative("lib/common.glsl"),
            Some(PathBuf::from("/shaders/lib/common.glsl"))
        );
    }

    #[test]
    fn missing_file_fails_to_load() {
        let dir = tempfile::tempdir().expect("temp dir");
        let source = CodeSource::for_file(dir.path().join("missing.glsl"));
        assert!(matches!(source.load(), Err(CompilerError::Io(_))));
        assert!(!source.is_loaded());
    }
}
