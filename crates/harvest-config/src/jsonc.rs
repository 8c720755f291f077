//! Comment-tolerant JSON. Config and account files may carry `//` line
//! comments, `/* */` block comments, and trailing commas; everything else
//! is strict JSON. Comment markers inside string literals are data, not
//! comments, and must survive untouched.

use crate::error::Result;
use serde::de::DeserializeOwned;

/// Strip `//` and `/* */` comments, respecting string literals and
/// escape sequences. Comment bytes are replaced by spaces (newlines kept)
/// so error positions still roughly line up with the source.
pub fn strip_comments(input: &str) -> String {
    let bytes: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    let mut in_string = false;
    let mut escaped = false;

    while i < bytes.len() {
        let c = bytes[i];

        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
                i += 1;
            }
            '/' if i + 1 < bytes.len() && bytes[i + 1] == '/' => {
                while i < bytes.len() && bytes[i] != '\n' {
                    out.push(' ');
                    i += 1;
                }
            }
            '/' if i + 1 < bytes.len() && bytes[i + 1] == '*' => {
                out.push_str("  ");
                i += 2;
                while i < bytes.len() {
                    if bytes[i] == '*' && i + 1 < bytes.len() && bytes[i + 1] == '/' {
                        out.push_str("  ");
                        i += 2;
                        break;
                    }
                    out.push(if bytes[i] == '\n' { '\n' } else { ' ' });
                    i += 1;
                }
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// Remove commas that directly precede a closing `}` or `]`, outside
/// string literals.
pub fn strip_trailing_commas(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
                if matches!(next, Some('}') | Some(']')) {
                    // drop it
                } else {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Strip comments and trailing commas, then parse as strict JSON.
pub fn parse<T: DeserializeOwned>(input: &str) -> Result<T> {
    let cleaned = strip_trailing_commas(&strip_comments(input));
    Ok(serde_json::from_str(&cleaned)?)
}

/// Same, but into a dynamic value.
pub fn parse_value(input: &str) -> Result<serde_json::Value> {
    parse(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn strips_line_and_block_comments() {
        let src = r#"{
            // a line comment
            "a": 1, /* block */ "b": 2
        }"#;
        let v: Value = parse(src).unwrap();
        assert_eq!(v["a"], 1);
        assert_eq!(v["b"], 2);
    }

    #[test]
    fn comment_markers_inside_strings_survive() {
        let src = r#"{"url": "https://example.com/path", "note": "a /* not a comment */ b"}"#;
        let v: Value = parse(src).unwrap();
        assert_eq!(v["url"], "https://example.com/path");
        assert_eq!(v["note"], "a /* not a comment */ b");
    }

    #[test]
    fn escaped_quote_does_not_end_string() {
        let src = r#"{"s": "he said \"hi\" // still data"}"#;
        let v: Value = parse(src).unwrap();
        assert_eq!(v["s"], "he said \"hi\" // still data");
    }

    #[test]
    fn trailing_commas_removed_outside_strings() {
        let src = r#"{"list": [1, 2, 3,], "tail": "a,}", }"#;
        let v: Value = parse(src).unwrap();
        assert_eq!(v["list"].as_array().unwrap().len(), 3);
        assert_eq!(v["tail"], "a,}");
    }

    #[test]
    fn jsonc_equals_normalised_json() {
        let jsonc = r#"{
            // accounts below
            "accounts": [
                {"email": "a@x", "password": "p",},
            ],
        }"#;
        let normal = r#"{"accounts": [{"email": "a@x", "password": "p"}]}"#;
        let a: Value = parse(jsonc).unwrap();
        let b: Value = serde_json::from_str(normal).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unterminated_block_comment_consumes_rest() {
        let stripped = strip_comments("{\"a\":1} /* open");
        let v: Value = serde_json::from_str(stripped.trim()).unwrap();
        assert_eq!(v["a"], 1);
    }
}
