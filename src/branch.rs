//! Branch naming and sanitization.
//!
//! Branch names are derived deterministically from the triggering issue and
//! the workflow id so that a resumed workflow regenerates the identical name.

use crate::state::IssueClass;

const MAX_SLUG_LEN: usize = 50;

/// Convert a title to a slug limited to `max_len` characters, cutting on a
/// char boundary and trimming any trailing hyphen left by the cut.
pub fn slugify(title: &str, max_len: usize) -> String {
    let slug = sanitize_branch_name(title);
    if slug.len() > max_len {
        let mut end = max_len;
        while end > 0 && !slug.is_char_boundary(end) {
            end -= 1;
        }
        slug[..end].trim_end_matches('-').to_string()
    } else {
        slug
    }
}

/// Lowercase, replace anything outside `[a-z0-9-_]` with `-` (slashes
/// included, so category prefixes in titles flatten out), collapse repeated
/// hyphens, trim leading/trailing hyphens.
pub fn sanitize_branch_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_hyphen = false;
    for c in raw.to_lowercase().chars() {
        let mapped = match c {
            'a'..='z' | '0'..='9' | '_' => c,
            _ => '-',
        };
        if mapped == '-' {
            if !last_was_hyphen {
                out.push('-');
            }
            last_was_hyphen = true;
        } else {
            out.push(mapped);
            last_was_hyphen = false;
        }
    }
    out.trim_matches('-').to_string()
}

/// Generate the workflow branch name:
/// `<feat|fix|chore>-<issue_number>-<adw_id>-<slug(title, 50)>`.
///
/// Deterministic given identical inputs, which resumability depends on.
pub fn generate_branch_name(
    issue_number: u64,
    adw_id: &str,
    title: &str,
    issue_class: IssueClass,
) -> String {
    let prefix = match issue_class {
        IssueClass::Feature => "feat",
        IssueClass::Bug => "fix",
        IssueClass::Chore => "chore",
    };
    format!(
        "{}-{}-{}-{}",
        prefix,
        issue_number,
        adw_id,
        slugify(title, MAX_SLUG_LEN)
    )
}
