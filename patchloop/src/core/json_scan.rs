//! Recovery helpers for JSON embedded in free text.

/// Replace typographic quotes and exotic whitespace, drop zero-width characters.
pub fn normalize(text: &str) -> String {
    text.chars()
        .filter_map(|c| match c {
            '\u{00A0}' | '\u{1680}' | '\u{2000}'..='\u{200A}' | '\u{202F}' | '\u{205F}'
            | '\u{3000}' => Some(' '),
            '\u{200B}'..='\u{200D}' | '\u{FEFF}' => None,
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' => Some('"'),
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' => Some('\''),
            other => Some(other),
        })
        .collect()
}

/// Drop markdown fence lines (```` ``` ````, ```` ```json ````, ...).
pub fn strip_code_fences(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Return the first bracketed value (`[...]` or `{...}`) in `text`.
///
/// Brackets inside string literals and escaped quotes do not count toward the
/// balance. Returns `None` when the opening bracket is never closed or a
/// closer does not match its opener.
pub fn extract_balanced(text: &str) -> Option<&str> {
    let start = text.find(['[', '{'])?;
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
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
            '"' => in_string = true,
            '[' | '{' => stack.push(c),
            ']' | '}' => {
                let open = stack.pop()?;
                if (open == '[' && c != ']') || (open == '{' && c != '}') {
                    return None;
                }
                if stack.is_empty() {
                    return Some(&text[start..start + offset + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Normalize, strip fences, extract the first balanced value and parse it.
pub fn recover_json(text: &str) -> Option<serde_json::Value> {
    let cleaned = strip_code_fences(&normalize(text));
    let candidate = extract_balanced(&cleaned)?;
    serde_json::from_str(candidate).ok()
}
