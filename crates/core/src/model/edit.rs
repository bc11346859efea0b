use std::ops::Range;
use std::path::Path;

use super::FunctionError;

/// Replace `span` of `content` with `replacement`, checking that the span
/// still holds `expected` first.
///
/// `content` is a snapshot of the whole file; `path` is only used for errors.
pub fn splice_span(
    path: &Path,
    content: &[u8],
    span: Range<usize>,
    expected: &[u8],
    replacement: &[u8],
) -> Result<Vec<u8>, FunctionError> {
    if span.start > span.end || span.end > content.len() {
        return Err(FunctionError::SpanOutOfBounds {
            path: path.to_path_buf(),
            start: span.start,
            end: span.end,
            len: content.len(),
        });
    }
    if &content[span.clone()] != expected {
        return Err(FunctionError::StaleSpan {
            path: path.to_path_buf(),
            start: span.start,
            end: span.end,
        });
    }

    let mut out = Vec::with_capacity(content.len() - span.len() + replacement.len());
    out.extend_from_slice(&content[..span.start]);
    out.extend_from_slice(replacement);
    out.extend_from_slice(&content[span.end..]);
    Ok(out)
}
