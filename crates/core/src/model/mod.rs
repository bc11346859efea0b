//! Function identity model: source functions, decompiled functions, and their uids.
//!
//! Records in this module can only be built through their constructors
//! (`SourceFunction::from_source`, `DecompiledFunction::from_json`), which
//! derive the uid from the rest of the identity so the two never disagree.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

mod edit;

pub use edit::splice_span;

/// Error type for in-place source rewrites.
#[derive(Debug, Error)]
pub enum FunctionError {
    #[error("Failed to access source file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Byte range {start}..{end} is outside {} ({len} bytes)", .path.display())]
    SpanOutOfBounds { path: PathBuf, start: usize, end: usize, len: usize },

    /// The file changed since the function was extracted. Re-extract before editing it again.
    #[error(
        "Byte range {start}..{end} of {} no longer holds the extracted definition; re-extract the file",
        .path.display()
    )]
    StaleSpan { path: PathBuf, start: usize, end: usize },
}

/// Identity shared by every function record.
pub trait Function {
    fn uid(&self) -> &str;
    fn path(&self) -> &Path;
    fn name(&self) -> &str;
}

/// Derive the uid of a source function.
///
/// `"{path}:{name}"` for free functions, `"{path}:{class}.{name}"` for methods.
pub fn source_uid(path: &Path, class_name: Option<&str>, name: &str) -> String {
    match class_name {
        Some(class) => format!("{}:{}.{}", path.display(), class, name),
        None => format!("{}:{}", path.display(), name),
    }
}

/// A function as found in a source file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SourceFunction {
    uid: String,
    path: PathBuf,
    language: String,
    definition: String,
    name: String,
    start_byte: usize,
    end_byte: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    class_name: Option<String>,
}

impl SourceFunction {
    /// Build a record from extractor output. `start_byte..end_byte` is the
    /// half-open span of `definition` in the file at extraction time.
    pub fn from_source(
        path: impl Into<PathBuf>,
        language: impl Into<String>,
        definition: impl Into<String>,
        name: impl Into<String>,
        start_byte: usize,
        end_byte: usize,
        class_name: Option<String>,
    ) -> Self {
        let path = path.into();
        let name = name.into();
        let uid = source_uid(&path, class_name.as_deref(), &name);
        Self {
            uid,
            path,
            language: language.into(),
            definition: definition.into(),
            name,
            start_byte,
            end_byte,
            class_name,
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn definition(&self) -> &str {
        &self.definition
    }

    pub fn start_byte(&self) -> usize {
        self.start_byte
    }

    pub fn end_byte(&self) -> usize {
        self.end_byte
    }

    pub fn class_name(&self) -> Option<&str> {
        self.class_name.as_deref()
    }

    pub fn is_method(&self) -> bool {
        self.class_name.is_some()
    }

    /// Derive a replacement function carrying `definition` (and optionally a new name).
    ///
    /// The replacement starts at the same byte and spans the new definition.
    /// With `write_back`, the owning file is rewritten once: the bytes at this
    /// function's span are swapped for the new definition and everything else
    /// is left untouched.
    ///
    /// After a write-back, every other `SourceFunction` extracted from the same
    /// file holds offsets that may no longer be valid. Keeping them in sync is
    /// the caller's job: rewrite a file's functions from the last one to the
    /// first, or re-extract between edits. An edit whose span no longer holds
    /// the extracted definition fails with [`FunctionError::StaleSpan`] instead
    /// of corrupting the file.
    pub fn with_definition(
        &self,
        definition: impl Into<String>,
        name: Option<&str>,
        write_back: bool,
    ) -> Result<SourceFunction, FunctionError> {
        let definition = definition.into();
        let end_byte = self.start_byte + definition.len();
        let replacement = SourceFunction::from_source(
            self.path.clone(),
            self.language.clone(),
            definition,
            name.unwrap_or(&self.name),
            self.start_byte,
            end_byte,
            self.class_name.clone(),
        );

        if write_back {
            let io_err = |source| FunctionError::Io { path: self.path.clone(), source };
            let content = fs::read(&self.path).map_err(io_err)?;
            let updated = splice_span(
                &self.path,
                &content,
                self.start_byte..self.end_byte,
                self.definition.as_bytes(),
                replacement.definition.as_bytes(),
            )?;
            fs::write(&self.path, updated).map_err(io_err)?;
        }

        Ok(replacement)
    }

    /// The same function with its span moved by `delta` bytes, or `None` if
    /// the span would leave the `usize` range.
    pub fn shifted(&self, delta: isize) -> Option<SourceFunction> {
        Some(SourceFunction {
            start_byte: self.start_byte.checked_add_signed(delta)?,
            end_byte: self.end_byte.checked_add_signed(delta)?,
            ..self.clone()
        })
    }
}

impl Function for SourceFunction {
    fn uid(&self) -> &str {
        &self.uid
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Flat, string-only form of a [`DecompiledFunction`].
///
/// This is the shape decompiler tools emit and the shape used for export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecompiledFunctionRecord {
    pub uid: String,
    pub path: String,
    pub definition: String,
    pub name: String,
    pub assembly: String,
    pub architecture: String,
}

/// A function recovered from a binary by a decompiler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "DecompiledFunctionRecord", from = "DecompiledFunctionRecord")]
pub struct DecompiledFunction {
    uid: String,
    path: PathBuf,
    definition: String,
    name: String,
    assembly: String,
    architecture: String,
}

impl DecompiledFunction {
    pub fn from_json(record: DecompiledFunctionRecord) -> Self {
        Self {
            uid: record.uid,
            path: PathBuf::from(record.path),
            definition: record.definition,
            name: record.name,
            assembly: record.assembly,
            architecture: record.architecture,
        }
    }

    pub fn to_json(&self) -> DecompiledFunctionRecord {
        DecompiledFunctionRecord {
            uid: self.uid.clone(),
            path: self.path.to_string_lossy().to_string(),
            definition: self.definition.clone(),
            name: self.name.clone(),
            assembly: self.assembly.clone(),
            architecture: self.architecture.clone(),
        }
    }

    pub fn definition(&self) -> &str {
        &self.definition
    }

    pub fn assembly(&self) -> &str {
        &self.assembly
    }

    pub fn architecture(&self) -> &str {
        &self.architecture
    }

    /// Stripped-symbol variant, as if the binary had been built without symbols.
    ///
    /// The uid, path, and architecture are kept so the function can still be
    /// correlated; the name becomes `sub_<hash>` and every whole-identifier
    /// occurrence of the old name in the pseudo-code and assembly is replaced.
    pub fn to_stripped(&self) -> Self {
        let digest = Sha256::digest(self.uid.as_bytes());
        let stripped_name =
            format!("sub_{:02x}{:02x}{:02x}{:02x}", digest[0], digest[1], digest[2], digest[3]);
        Self {
            uid: self.uid.clone(),
            path: self.path.clone(),
            definition: replace_identifier(&self.definition, &self.name, &stripped_name),
            assembly: replace_identifier(&self.assembly, &self.name, &stripped_name),
            architecture: self.architecture.clone(),
            name: stripped_name,
        }
    }
}

impl Function for DecompiledFunction {
    fn uid(&self) -> &str {
        &self.uid
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl From<DecompiledFunctionRecord> for DecompiledFunction {
    fn from(record: DecompiledFunctionRecord) -> Self {
        Self::from_json(record)
    }
}

impl From<DecompiledFunction> for DecompiledFunctionRecord {
    fn from(function: DecompiledFunction) -> Self {
        function.to_json()
    }
}

fn replace_identifier(text: &str, from: &str, to: &str) -> String {
    if from.is_empty() {
        return text.to_string();
    }
    let is_ident = |c: char| c.is_alphanumeric() || c == '_';
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (idx, _) in text.match_indices(from) {
        let before = text[..idx].chars().next_back();
        let after = text[idx + from.len()..].chars().next();
        if before.is_some_and(is_ident) || after.is_some_and(is_ident) {
            continue;
        }
        out.push_str(&text[last..idx]);
        out.push_str(to);
        last = idx + from.len();
    }
    out.push_str(&text[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decompiled(uid: &str, name: &str, definition: &str) -> DecompiledFunction {
        DecompiledFunction::from_json(DecompiledFunctionRecord {
            uid: uid.into(),
            path: "/bins/app".into(),
            definition: definition.into(),
            name: name.into(),
            assembly: format!("call {name}\ncall {name}_helper"),
            architecture: "x86_64".into(),
        })
    }

    #[test]
    fn replace_identifier_respects_word_boundaries() {
        let out = replace_identifier("foo(foo_bar, xfoo); foo;", "foo", "sub_1");
        assert_eq!(out, "sub_1(foo_bar, xfoo); sub_1;");
    }

    #[test]
    fn stripped_variant_renames_symbol_but_keeps_identity() {
        let f = decompiled("/bins/app:parse", "parse", "int parse(void) { return parse(); }");
        let stripped = f.to_stripped();
        assert_eq!(stripped.uid(), f.uid());
        assert!(stripped.name().starts_with("sub_"));
        assert_eq!(stripped.name().len(), "sub_".len() + 8);
        assert!(!stripped.definition().contains("parse"));
        assert!(stripped.assembly().contains("parse_helper"));
        assert_eq!(stripped, f.to_stripped());
    }

    #[test]
    fn method_uid_includes_class() {
        let f = SourceFunction::from_source(
            "src/a.cpp",
            "cpp",
            "void run() {}",
            "run",
            0,
            13,
            Some("Task".into()),
        );
        assert!(f.is_method());
        assert_eq!(f.uid(), "src/a.cpp:Task.run");
    }

    #[test]
    fn shifted_moves_the_span_and_keeps_identity() {
        let f = SourceFunction::from_source("a.c", "c", "int f(void) {}", "f", 10, 24, None);
        let later = f.shifted(6).unwrap();
        assert_eq!((later.start_byte(), later.end_byte()), (16, 30));
        assert_eq!(later.uid(), f.uid());
        let earlier = f.shifted(-10).unwrap();
        assert_eq!((earlier.start_byte(), earlier.end_byte()), (0, 14));
        assert!(f.shifted(-11).is_none());
    }
}
