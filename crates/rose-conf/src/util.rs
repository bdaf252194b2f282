//! text helpers shared by report messages
use std::fmt::Write;

/// Quote `text` the way report messages show literal values: `'a'`, `"it's"`
pub fn quote_value(text: &str) -> String {
    let quote = if text.contains('\'') && !text.contains('"') {
        '"'
    } else {
        '\''
    };

    let mut out = String::with_capacity(text.len() + 2);
    out.push(quote);
    for c in text.chars() {
        match c {
            '\\' => out.push_str(r"\\"),
            '\n' => out.push_str(r"\n"),
            '\r' => out.push_str(r"\r"),
            '\t' => out.push_str(r"\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// `['a', 'b']`
pub fn quote_list<S: AsRef<str>>(items: &[S]) -> String {
    let items: Vec<String> = items.iter().map(|item| quote_value(item.as_ref())).collect();
    format!("[{}]", items.join(", "))
}

/// `None` for missing values
pub fn or_none(value: Option<&str>) -> &str {
    value.unwrap_or("None")
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn repr() {
        assert_eq!(quote_value("abc"), "'abc'");
        assert_eq!(quote_value("it's"), "\"it's\"");
        assert_eq!(quote_value("'\""), r#"'\'"'"#);
        assert_eq!(quote_value("a\\b\n"), r"'a\\b\n'");
        assert_eq!(quote_list(&["1", "2"]), "['1', '2']");
        assert_eq!(quote_list::<&str>(&[]), "[]");
    }
}
