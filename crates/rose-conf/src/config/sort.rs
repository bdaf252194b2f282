use regex::Regex;
use std::cmp::Ordering;
use std::sync::LazyLock;

static REC_SETTING_ELEMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)\(([^)]+)\)$").expect("valid regex"));

fn is_digits(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_digit())
}

/// Compare two digit strings by numeric value without parsing
fn cmp_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Compare pieces of text, numerically if possible
///
/// Numbers sort before text.
pub fn sort_element(a: &str, b: &str) -> Ordering {
    match (is_digits(a), is_digits(b)) {
        (true, true) => cmp_numeric(a, b),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.cmp(b),
    }
}

/// Compare section or option names, by their duplicate index if possible
///
/// ```
/// use rose_conf::config::sort_settings;
///
/// let mut names = vec!["foo(10)", "foo(2)", "bar", "foo(1)"];
/// names.sort_by(|a, b| sort_settings(a, b));
/// assert_eq!(names, vec!["bar", "foo(1)", "foo(2)", "foo(10)"]);
/// ```
pub fn sort_settings(a: &str, b: &str) -> Ordering {
    if let (Some(captures_a), Some(captures_b)) = (
        REC_SETTING_ELEMENT.captures(a),
        REC_SETTING_ELEMENT.captures(b),
    ) {
        if captures_a[1] == captures_b[1] {
            return sort_element(&captures_a[2], &captures_b[2]);
        }
    }
    a.cmp(b)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn elements() {
        assert_eq!(sort_element("2", "10"), Ordering::Less);
        assert_eq!(sort_element("007", "7"), Ordering::Equal);
        assert_eq!(sort_element("1", "a"), Ordering::Less);
        assert_eq!(sort_element("b", "a"), Ordering::Greater);
    }

    #[test]
    fn settings() {
        assert_eq!(sort_settings("foo(2)", "foo(10)"), Ordering::Less);
        assert_eq!(sort_settings("foo(:)", "foo(1)"), Ordering::Greater);
        assert_eq!(sort_settings("bar(10)", "foo(2)"), Ordering::Less);
        assert_eq!(sort_settings("namelist:a", "env"), Ordering::Greater);
    }
}
