//! In-place account disabling. A hard-banned account must be switched off
//! durably without destroying the operator's hand-written comments, so
//! this edits the raw file text instead of round-tripping through serde.

use chrono::Local;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::info;

use crate::error::{ConfigError, Result};

static ENABLED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""enabled"\s*:\s*(true|false)"#).unwrap());

/// Rewrite the account file so the entry for `email` carries
/// `"enabled": false` and a `// BANNED YYYY-MM-DD: <reason>` line above
/// it. Comments elsewhere in the file are untouched. Idempotent: running
/// twice produces identical file contents.
pub fn disable_account(path: &Path, email: &str, reason: &str) -> Result<()> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let span = find_account_object(&text, email)
        .ok_or_else(|| ConfigError::AccountNotFound(email.to_string()))?;

    let edited = apply_edit(&text, span, reason);
    if edited == text {
        return Ok(());
    }

    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, &edited).map_err(|source| ConfigError::Io {
        path: tmp.display().to_string(),
        source,
    })?;
    std::fs::rename(&tmp, path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;

    info!(account = %mask(email), "account disabled in accounts file");
    Ok(())
}

#[derive(Debug, Clone, Copy)]
struct ObjectSpan {
    open: usize,
    close: usize,
}

/// Byte span of the innermost `{ ... }` containing the string value
/// `email`, found with a scanner that understands strings, escapes and
/// both comment styles.
fn find_account_object(text: &str, email: &str) -> Option<ObjectSpan> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mode {
        Normal,
        Str { start: usize, escaped: bool },
        Line,
        Block,
    }

    let bytes = text.as_bytes();
    let mut mode = Mode::Normal;
    let mut stack: Vec<usize> = Vec::new();
    let mut found_at_depth: Option<usize> = None;

    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        match mode {
            Mode::Normal => match c {
                '"' => mode = Mode::Str { start: i + 1, escaped: false },
                '{' => stack.push(i),
                '}' => {
                    let this_open = stack.pop();
                    if let (Some(depth), Some(this_open)) = (found_at_depth, this_open) {
                        if stack.len() == depth {
                            return Some(ObjectSpan { open: this_open, close: i });
                        }
                    }
                }
                '/' if bytes.get(i + 1) == Some(&b'/') => mode = Mode::Line,
                '/' if bytes.get(i + 1) == Some(&b'*') => {
                    mode = Mode::Block;
                    i += 1;
                }
                _ => {}
            },
            Mode::Str { start, escaped } => {
                if escaped {
                    mode = Mode::Str { start, escaped: false };
                } else if c == '\\' {
                    mode = Mode::Str { start, escaped: true };
                } else if c == '"' {
                    if &text[start..i] == email && found_at_depth.is_none() && !stack.is_empty() {
                        // Innermost open object at this point is the account.
                        found_at_depth = Some(stack.len() - 1);
                    }
                    mode = Mode::Normal;
                }
            }
            Mode::Line => {
                if c == '\n' {
                    mode = Mode::Normal;
                }
            }
            Mode::Block => {
                if c == '*' && bytes.get(i + 1) == Some(&b'/') {
                    mode = Mode::Normal;
                    i += 1;
                }
            }
        }
        i += 1;
    }
    None
}

fn apply_edit(text: &str, span: ObjectSpan, reason: &str) -> String {
    let object = &text[span.open..=span.close];

    // 1. Force enabled=false inside the object span only.
    let new_object = if ENABLED_RE.is_match(object) {
        ENABLED_RE.replace(object, "\"enabled\": false").into_owned()
    } else {
        insert_enabled_false(object)
    };

    let mut edited = String::with_capacity(text.len() + new_object.len());
    edited.push_str(&text[..span.open]);
    edited.push_str(&new_object);
    edited.push_str(&text[span.close + 1..]);

    // 2. Ban comment on its own line above the object, unless one exists.
    let line_start = edited[..span.open].rfind('\n').map(|p| p + 1).unwrap_or(0);
    let prior = &edited[..line_start];
    let prev_line = prior.trim_end_matches('\n').rsplit('\n').next().unwrap_or("");
    if prev_line.trim_start().starts_with("// BANNED") {
        return edited;
    }

    let indent: String = edited[line_start..]
        .chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .collect();
    let stamp = Local::now().date_naive().format("%Y-%m-%d");
    let comment = format!("{indent}// BANNED {stamp}: {reason}\n");

    let mut out = String::with_capacity(edited.len() + comment.len());
    out.push_str(&edited[..line_start]);
    out.push_str(&comment);
    out.push_str(&edited[line_start..]);
    out
}

fn insert_enabled_false(object: &str) -> String {
    // Put the key on its own line right after the opening brace when the
    // object is multi-line, inline otherwise.
    match object.find('\n') {
        Some(nl) => {
            let next_line = &object[nl + 1..];
            let indent: String =
                next_line.chars().take_while(|c| *c == ' ' || *c == '\t').collect();
            format!(
                "{}\n{}\"enabled\": false,{}",
                &object[..nl],
                indent,
                &object[nl..]
            )
        }
        None => object.replacen('{', "{ \"enabled\": false,", 1),
    }
}

fn mask(email: &str) -> String {
    harvest_types::account::mask_email(email)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    const FILE: &str = r#"{
    "accounts": [
        // primary account, do not touch
        {
            "email": "a@x.com",
            "password": "pw1",
            "enabled": true
        },
        {
            "email": "b@y.com",
            "password": "pw2"
        }
    ]
}"#;

    #[test]
    fn disables_and_comments_target_account_only() {
        let f = write_temp(FILE);
        disable_account(f.path(), "b@y.com", "order blocked").unwrap();
        let after = std::fs::read_to_string(f.path()).unwrap();

        assert!(after.contains("// primary account, do not touch"));
        assert!(after.contains("// BANNED"));
        assert!(after.contains("order blocked"));

        // Still parseable, and only b@y.com is disabled.
        let accounts = crate::accounts::load_accounts(f.path()).unwrap();
        assert!(accounts.iter().find(|a| a.email == "a@x.com").unwrap().enabled);
        assert!(!accounts.iter().find(|a| a.email == "b@y.com").unwrap().enabled);
    }

    #[test]
    fn rewrites_existing_enabled_flag() {
        let f = write_temp(FILE);
        disable_account(f.path(), "a@x.com", "suspended").unwrap();
        let accounts = crate::accounts::load_accounts(f.path()).unwrap();
        assert!(!accounts.iter().find(|a| a.email == "a@x.com").unwrap().enabled);
    }

    #[test]
    fn disabling_twice_is_idempotent() {
        let f = write_temp(FILE);
        disable_account(f.path(), "b@y.com", "suspended").unwrap();
        let once = std::fs::read_to_string(f.path()).unwrap();
        disable_account(f.path(), "b@y.com", "suspended").unwrap();
        let twice = std::fs::read_to_string(f.path()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn email_inside_comment_is_not_matched() {
        let src = r#"[
    // replaced c@z.com with d@z.com
    {"email": "d@z.com", "password": "p"}
]"#;
        let f = write_temp(src);
        let err = disable_account(f.path(), "c@z.com", "gone").unwrap_err();
        assert!(matches!(err, ConfigError::AccountNotFound(_)));
    }

    #[test]
    fn unknown_account_errors() {
        let f = write_temp(FILE);
        assert!(disable_account(f.path(), "nobody@nowhere", "x").is_err());
    }
}
