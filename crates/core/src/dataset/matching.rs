//! Best-effort name correlation between decompiled and source functions.
//!
//! A decompiled function is attached to every source function whose match
//! key (bare function or method name) equals its own. Several source
//! functions sharing a key (overloads, same-named methods in different
//! classes) stay together as one group; telling them apart is left to the
//! consumer. A decompiled function with no matching key is dropped, which is
//! the expected outcome for library and compiler-generated code.
//!
//! Keys are cut at the last `:` and then the last `.` of the uid, with no
//! escaping. Names that themselves contain those characters match wrongly.

use std::collections::HashMap;

use tracing::debug;

use crate::dataset::{DecompiledCodeDataset, SourceCodeDataset};
use crate::model::{DecompiledFunction, Function, SourceFunction};

/// Bare name of a function: its uid without the path and class qualifiers.
pub fn match_key(uid: &str) -> &str {
    let qualified = uid.rsplit_once(':').map_or(uid, |(_, rest)| rest);
    qualified.rsplit_once('.').map_or(qualified, |(_, name)| name)
}

/// Group source functions by match key, in dataset order.
pub fn group_by_match_key(source: &SourceCodeDataset) -> HashMap<&str, Vec<&SourceFunction>> {
    let mut groups: HashMap<&str, Vec<&SourceFunction>> = HashMap::new();
    for function in source.values() {
        groups.entry(match_key(function.uid())).or_default().push(function);
    }
    groups
}

/// Pair each decompiled function with its candidate source group.
///
/// With `stripped`, the stored decompiled functions are their stripped
/// variants; matching still uses the original uid.
pub fn match_functions(
    source: &SourceCodeDataset,
    decompiled: impl IntoIterator<Item = DecompiledFunction>,
    stripped: bool,
) -> DecompiledCodeDataset {
    let groups = group_by_match_key(source);
    let mut dropped = 0usize;
    let matched: Vec<_> = decompiled
        .into_iter()
        .filter_map(|function| {
            let Some(candidates) = groups.get(match_key(function.uid())) else {
                dropped += 1;
                return None;
            };
            let group = SourceCodeDataset::new(candidates.iter().map(|f| (*f).clone()));
            let function = if stripped { function.to_stripped() } else { function };
            Some((function, group))
        })
        .collect();
    debug!(matched = matched.len(), dropped, "matched decompiled functions");
    DecompiledCodeDataset::new(matched)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_key_strips_path_and_class() {
        assert_eq!(match_key("src/a.c:Foo.bar"), "bar");
        assert_eq!(match_key("src/a.c:baz"), "baz");
        assert_eq!(match_key("C:\\bins\\app.exe:main"), "main");
        assert_eq!(match_key("plain"), "plain");
    }
}
