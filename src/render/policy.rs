//! Which structure elements may nest inside which.
//!
//! Pure data: parents with an allow-list accept only the listed children,
//! parents with a deny-list accept anything except the listed children, every
//! other parent accepts anything.

const HEADINGS: &[&str] = &["H", "H1", "H2", "H3", "H4", "H5", "H6"];

const ALLOWED_CHILDREN: &[(&str, &[&str])] = &[
    ("TR", &["TH", "TD"]),
    ("Table", &["TR", "THead", "TBody", "TFoot", "Caption"]),
    ("THead", &["TR"]),
    ("TBody", &["TR"]),
    ("TFoot", &["TR"]),
    ("L", &["LI"]),
    ("LI", &["Lbl", "LBody"]),
    ("TOC", &["TOCI", "TOC"]),
];

const DENIED_CHILDREN: &[(&str, &[&str])] = &[
    ("H", HEADINGS),
    ("H1", HEADINGS),
    ("H2", HEADINGS),
    ("H3", HEADINGS),
    ("H4", HEADINGS),
    ("H5", HEADINGS),
    ("H6", HEADINGS),
    ("TH", HEADINGS),
    ("TD", HEADINGS),
    ("Lbl", HEADINGS),
    ("LBody", HEADINGS),
];

/// Whether `child` may be opened directly under `parent`.
pub fn is_allowed(parent: &str, child: &str) -> bool {
    if let Some((_, allowed)) = ALLOWED_CHILDREN.iter().find(|(p, _)| *p == parent) {
        return allowed.contains(&child);
    }
    if let Some((_, denied)) = DENIED_CHILDREN.iter().find(|(p, _)| *p == parent) {
        return !denied.contains(&child);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_lists_are_closed() {
        assert!(is_allowed("TR", "TD"));
        assert!(is_allowed("TR", "TH"));
        assert!(!is_allowed("TR", "P"));
        assert!(!is_allowed("L", "P"));
        assert!(is_allowed("TOC", "TOC"));
    }

    #[test]
    fn headings_never_nest_in_headings_or_cells() {
        assert!(!is_allowed("H2", "H3"));
        assert!(!is_allowed("TD", "H1"));
        assert!(!is_allowed("LBody", "H"));
        assert!(is_allowed("TD", "P"));
    }

    #[test]
    fn unlisted_parents_accept_anything() {
        assert!(is_allowed("Document", "H1"));
        assert!(is_allowed("Sect", "Table"));
    }
}
