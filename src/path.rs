//! Slash-delimited paths into a document.
//!
//! A path like `"/users//alice/"` addresses the node `users -> alice`. Empty segments
//! are dropped, so leading, trailing and doubled slashes are tolerated, and the empty
//! path addresses the root of the database.

/// Separator between path segments.
pub const SEPARATOR: char = '/';

/// Splits a path into its non-empty segments.
pub fn to_segments(path: &str) -> Vec<String> {
    path.split(SEPARATOR)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Joins segments back into a normalised path (no leading or trailing slash).
pub fn join<S: AsRef<str>>(segments: &[S]) -> String {
    let mut out = String::new();
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            out.push(SEPARATOR);
        }
        out.push_str(segment.as_ref());
    }
    out
}
