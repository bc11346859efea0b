use std::fs;
use std::path::{Path, PathBuf};

use tree_sitter::{Node, Parser};
use walkdir::WalkDir;

use crate::model::SourceFunction;
use crate::services::extractor::{ExtractError, Extractor};

const EXTENSIONS: [&str; 2] = ["c", "h"];

/// C extractor backed by tree-sitter-c. Every `function_definition` becomes
/// a free function.
///
/// Directory walks follow symlinks; a linked source is reported under the
/// link's path.
#[derive(Debug, Clone, Copy, Default)]
pub struct CExtractor;

impl Extractor for CExtractor {
    fn language(&self) -> &str {
        "c"
    }

    fn get_extractable_files(&self, root: &Path) -> Result<Vec<PathBuf>, ExtractError> {
        if root.is_file() {
            return Ok(if has_c_extension(root) { vec![root.to_path_buf()] } else { vec![] });
        }
        let mut files = Vec::new();
        for entry in WalkDir::new(root).follow_links(true) {
            let entry = entry.map_err(|e| ExtractError::Io {
                path: e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf()),
                source: e.into(),
            })?;
            if entry.file_type().is_file() && has_c_extension(entry.path()) {
                files.push(entry.into_path());
            }
        }
        files.sort();
        Ok(files)
    }

    fn extract_file(&self, file: &Path) -> Result<Vec<SourceFunction>, ExtractError> {
        let source = fs::read_to_string(file)
            .map_err(|source| ExtractError::Io { path: file.to_path_buf(), source })?;
        let mut parser = Parser::new();
        parser.set_language(&tree_sitter_c::LANGUAGE.into()).map_err(|e| ExtractError::Parse {
            path: file.to_path_buf(),
            reason: e.to_string(),
        })?;
        let tree = parser.parse(&source, None).ok_or_else(|| ExtractError::Parse {
            path: file.to_path_buf(),
            reason: "parser returned no tree".into(),
        })?;

        let mut definitions = Vec::new();
        collect_definitions(tree.root_node(), &mut definitions);

        Ok(definitions
            .into_iter()
            .filter_map(|node| {
                let name = node
                    .child_by_field_name("declarator")
                    .and_then(|d| declarator_name(d, &source))?;
                let definition = &source[node.start_byte()..node.end_byte()];
                Some(SourceFunction::from_source(
                    file,
                    "c",
                    definition,
                    name,
                    node.start_byte(),
                    node.end_byte(),
                    None,
                ))
            })
            .collect())
    }
}

fn has_c_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

// Definitions can sit inside preprocessor blocks or linkage specs, so walk
// everything except function bodies.
fn collect_definitions<'t>(node: Node<'t>, out: &mut Vec<Node<'t>>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "function_definition" {
            out.push(child);
        } else {
            collect_definitions(child, out);
        }
    }
}

fn declarator_name(node: Node<'_>, source: &str) -> Option<String> {
    match node.kind() {
        "identifier" => node.utf8_text(source.as_bytes()).ok().map(str::to_string),
        "function_declarator" | "pointer_declarator" | "attributed_declarator" => {
            node.child_by_field_name("declarator").and_then(|d| declarator_name(d, source))
        }
        "parenthesized_declarator" => node.named_child(0).and_then(|d| declarator_name(d, source)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Function;

    #[test]
    fn extracts_functions_with_exact_spans() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("math.c");
        let body = "#include <stdio.h>\n\nint add(int a, int b) { return a + b; }\n\nstatic char *name(void) {\n    return \"x\";\n}\n";
        fs::write(&file, body).unwrap();

        let functions = CExtractor.extract_file(&file).unwrap();
        let names: Vec<&str> = functions.iter().map(|f| f.name()).collect();
        assert_eq!(names, ["add", "name"]);
        for f in &functions {
            assert_eq!(&body[f.start_byte()..f.end_byte()], f.definition());
            assert_eq!(f.uid(), format!("{}:{}", file.display(), f.name()));
        }
    }

    #[test]
    fn lists_only_c_sources() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        fs::write(dir.path().join("src/a.c"), "").unwrap();
        fs::write(dir.path().join("src/nested/b.h"), "").unwrap();
        fs::write(dir.path().join("README.md"), "").unwrap();

        let files = CExtractor.get_extractable_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| has_c_extension(f)));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_sources_are_listed_under_the_link() {
        let shared = tempfile::tempdir().unwrap();
        let target = shared.path().join("lib.c");
        fs::write(&target, "int lib(void) { return 3; }\n").unwrap();
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("link.c");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let files = CExtractor.get_extractable_files(dir.path()).unwrap();
        assert_eq!(files, [link.clone()]);
        let functions = CExtractor.extract(dir.path()).unwrap();
        assert_eq!(functions.len(), 1);
        assert_eq!(functions[0].path(), link.as_path());
    }
}
