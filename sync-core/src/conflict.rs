//! Naming of conflict copies.

use chrono::{DateTime, Utc};

/// Sibling path that preserves the remote version of a conflicted file.
///
/// The timestamp goes before the extension so the copy keeps its file type:
/// `notes/a.md` becomes `notes/a.conflict-20261017-101530.md`. Dotfile-style
/// names and names without an extension get the suffix appended.
pub fn conflict_copy_path(path: &str, at: DateTime<Utc>) -> String {
    let stamp = at.format("%Y%m%d-%H%M%S");
    let (dir, name) = match path.rfind('/') {
        Some(idx) => (&path[..=idx], &path[idx + 1..]),
        None => ("", path),
    };

    match name.rfind('.') {
        Some(dot) if dot > 0 => {
            let (stem, ext) = name.split_at(dot);
            format!("{dir}{stem}.conflict-{stamp}{ext}")
        }
        _ => format!("{dir}{name}.conflict-{stamp}"),
    }
}
