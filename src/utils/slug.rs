//! Directory and file name sanitising for generated output.

use crate::store::PostId;

/// Turn a post slug into a safe directory and block name.
///
/// Non-ASCII text is transliterated and lowercased. Whitespace, `_` and `.`
/// become `-`, anything else outside `[a-z0-9-]` (path separators included)
/// is dropped. A slug that sanitises to nothing falls back to `post-{id}`.
pub fn sanitize_slug(slug: &str, id: PostId) -> String {
    let ascii = deunicode::deunicode(slug.trim());
    let mut out = String::with_capacity(ascii.len());

    for c in ascii.chars() {
        let c = match c {
            c if c.is_ascii_alphanumeric() => c.to_ascii_lowercase(),
            c if c.is_whitespace() => '-',
            '-' | '_' | '.' => '-',
            _ => continue,
        };
        // Collapse runs of dashes
        if c == '-' && out.ends_with('-') {
            continue;
        }
        out.push(c);
    }

    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        format!("post-{id}")
    } else {
        trimmed.to_owned()
    }
}
