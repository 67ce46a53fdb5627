//! Slug derivation: lowercase-kebab form of a resource name, unique
//! within `{kind, org}`.

/// Derive the slug for a resource name.
///
/// Alphanumerics are lowercased; every run of other characters collapses
/// to a single `-`; leading and trailing separators are trimmed.
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_separator = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases() {
        assert_eq!(slugify("Reviewer"), "reviewer");
        assert_eq!(slugify("reviewer"), "reviewer");
    }

    #[test]
    fn collapses_separator_runs() {
        assert_eq!(slugify("PR   Review Bot"), "pr-review-bot");
        assert_eq!(slugify("a__b--c"), "a-b-c");
    }

    #[test]
    fn trims_edges() {
        assert_eq!(slugify("  padded  "), "padded");
        assert_eq!(slugify("--x--"), "x");
    }

    #[test]
    fn empty_and_symbol_only_names() {
        assert_eq!(slugify(""), "");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn case_variants_collide() {
        assert_eq!(slugify("Reviewer"), slugify("reviewer"));
    }
}
