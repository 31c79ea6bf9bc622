//! Path string utilities. These know nothing about any image.

/// Collapse every run of `/` into one.
///
/// With `trailing_slash` the result ends in exactly one `/`; without it any
/// trailing `/` is dropped. The root `"/"` is left alone either way, and an
/// empty input with `trailing_slash` becomes `"/"`.
///
/// ```
/// use rucfs_core::path::normalize;
/// assert_eq!(normalize("//fff//dd////d39.bb/", false), "/fff/dd/d39.bb");
/// assert_eq!(normalize("a//b", true), "a/b/");
/// ```
#[must_use]
pub fn normalize(path: &str, trailing_slash: bool) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    let mut prev_sep = false;
    for ch in path.chars() {
        let is_sep = ch == '/';
        if !(is_sep && prev_sep) {
            out.push(ch);
        }
        prev_sep = is_sep;
    }

    if trailing_slash {
        if !out.ends_with('/') {
            out.push('/');
        }
    } else if out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn collapses_runs_and_strips_trailing() {
        assert_eq!(normalize("//fff//dd////d39.bb/", false), "/fff/dd/d39.bb");
        assert_eq!(normalize("/a/b", false), "/a/b");
        assert_eq!(normalize("a///b//", false), "a/b");
    }

    #[test]
    fn adds_exactly_one_trailing_separator() {
        assert_eq!(normalize("/a//b", true), "/a/b/");
        assert_eq!(normalize("/a/b///", true), "/a/b/");
    }

    #[test]
    fn root_is_preserved() {
        assert_eq!(normalize("/", false), "/");
        assert_eq!(normalize("/", true), "/");
        assert_eq!(normalize("////", false), "/");
        assert_eq!(normalize("////", true), "/");
    }

    #[test]
    fn empty_input() {
        assert_eq!(normalize("", false), "");
        assert_eq!(normalize("", true), "/");
    }

    #[test]
    fn non_separator_bytes_are_kept_verbatim() {
        assert_eq!(normalize("/ü//ñ. x/", false), "/ü/ñ. x");
        assert_eq!(normalize("\\\\a", false), "\\\\a");
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(s in "[a-c/.]{0,24}", trailing in any::<bool>()) {
            let once = normalize(&s, trailing);
            prop_assert_eq!(normalize(&once, trailing), once.clone());
        }

        #[test]
        fn output_never_has_repeated_separators(s in "[a/]{0,32}", trailing in any::<bool>()) {
            let out = normalize(&s, trailing);
            prop_assert!(!out.contains("//"));
            prop_assert!(out.len() <= s.len() + 1);
        }

        #[test]
        fn trailing_flag_controls_final_separator(s in "/[a-z/]{0,16}[a-z]") {
            prop_assert!(normalize(&s, true).ends_with('/'));
            prop_assert!(!normalize(&s, false).ends_with('/'));
        }
    }
}
