//! Line-oriented syntax highlighter for fenced code blocks.
//!
//! Deliberately approximate: each line is tokenized on its own with a single
//! alternation regex, so there is no cross-line state (no multi-line strings,
//! no block comments). Unrecognized languages pass through untouched apart
//! from HTML escaping.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Output of [`highlight`]: per-line 1-based number labels plus the tokenized
/// code, HTML-escaped and joined with newlines.
#[derive(Debug, Clone)]
pub struct Highlighted {
    pub line_numbers: Vec<String>,
    pub code: String,
}

/// Tokenize `code` for `language` (exact tag match; `js` is an alias for
/// `javascript`). Lines are escaped before tokenizing, so the only markup in
/// the output is the classification spans themselves.
pub fn highlight(code: &str, language: &str) -> Highlighted {
    let mut line_numbers = Vec::new();
    let mut lines = Vec::new();

    for (idx, line) in code.split('\n').enumerate() {
        line_numbers.push((idx + 1).to_string());
        let escaped = escape_line(line);
        let tokenized = match language {
            "python" => PYTHON.replace_all(&escaped, classify).into_owned(),
            "javascript" | "js" => JAVASCRIPT.replace_all(&escaped, classify).into_owned(),
            // Recognized but not tokenized, same as any unknown tag.
            "html" | "css" => escaped,
            _ => escaped,
        };
        lines.push(tokenized);
    }

    Highlighted {
        line_numbers,
        code: lines.join("\n"),
    }
}

// `&apos;` rather than `&#039;` here: the tokenizer patterns run over the
// escaped text, and `&#039;` would feed its digits and hash to the number and
// comment patterns.
fn escape_line(line: &str) -> String {
    line.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn span(class: &str, text: &str) -> String {
    format!("<span class=\"token {}\">{}</span>", class, text)
}

// Alternation order is precedence: a comment claims the rest of the line
// before the string pattern can, a string claims its body before keywords.
static PYTHON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?P<comment>#.*)|(?P<string>&quot;.*?&quot;|&apos;.*?&apos;)|(?P<number>\b\d+(?:\.\d+)?\b)|(?P<import>\b(?:import|from|as)\b)|(?P<keyword>\b(?:def|class|if|elif|else|for|while|return|in|not|and|or|True|False|None)\b)|(?P<function>[A-Za-z_]\w*)\("#,
    )
    .unwrap()
});

static JAVASCRIPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?P<comment>//.*)|(?P<string>&quot;.*?&quot;|&apos;.*?&apos;)|(?P<number>\b\d+(?:\.\d+)?\b)|(?P<keyword>\b(?:var|let|const|function|return|if|else|for|while|switch|case|break|continue|new|this|class)\b)|(?P<function>[A-Za-z_]\w*)\("#,
    )
    .unwrap()
});

fn classify(caps: &Captures) -> String {
    for class in ["comment", "string", "number", "import", "keyword"] {
        if let Some(m) = caps.name(class) {
            return span(class, m.as_str());
        }
    }
    if let Some(m) = caps.name("function") {
        // The pattern consumes the opening paren; re-emit it outside the span.
        return format!("{}(", span("function", m.as_str()));
    }
    caps[0].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_lines_from_one() {
        let hl = highlight("a\nb\nc", "python");
        assert_eq!(hl.line_numbers, ["1", "2", "3"]);
    }

    #[test]
    fn preserves_trailing_empty_line() {
        let hl = highlight("a\n", "");
        assert_eq!(hl.line_numbers, ["1", "2"]);
        assert_eq!(hl.code, "a\n");
    }

    #[test]
    fn python_print_is_a_function_not_a_keyword() {
        let hl = highlight("print(1)", "python");
        assert!(hl.code.contains("<span class=\"token function\">print</span>("));
        assert!(hl.code.contains("<span class=\"token number\">1</span>"));
        assert!(!hl.code.contains("token keyword"));
    }

    #[test]
    fn python_keywords_and_imports() {
        let hl = highlight("from os import path\ndef go():\n    return True", "python");
        assert!(hl.code.contains("<span class=\"token import\">from</span>"));
        assert!(hl.code.contains("<span class=\"token import\">import</span>"));
        assert!(hl.code.contains("<span class=\"token keyword\">def</span>"));
        assert!(hl.code.contains("<span class=\"token keyword\">return</span>"));
        assert!(hl.code.contains("<span class=\"token keyword\">True</span>"));
    }

    #[test]
    fn python_comment_claims_rest_of_line() {
        let hl = highlight("x = 1  # if True", "python");
        assert!(hl.code.contains("<span class=\"token comment\"># if True</span>"));
        // The `if` inside the comment must not get its own keyword span.
        assert_eq!(hl.code.matches("<span").count(), 2); // number + comment
    }

    #[test]
    fn python_strings_are_escaped_and_tokenized() {
        let hl = highlight("s = \"hi\"", "python");
        assert!(hl
            .code
            .contains("<span class=\"token string\">&quot;hi&quot;</span>"));
    }

    #[test]
    fn javascript_alias_and_keywords() {
        for tag in ["javascript", "js"] {
            let hl = highlight("const x = 2; // two", tag);
            assert!(hl.code.contains("<span class=\"token keyword\">const</span>"));
            assert!(hl.code.contains("<span class=\"token number\">2</span>"));
            assert!(hl.code.contains("<span class=\"token comment\">// two</span>"));
        }
    }

    #[test]
    fn unknown_language_is_a_no_op() {
        let hl = highlight("def go(): pass", "ruby");
        assert_eq!(hl.code, "def go(): pass");
    }

    #[test]
    fn language_tag_match_is_case_sensitive() {
        let hl = highlight("print(1)", "Python");
        assert!(!hl.code.contains("<span"));
    }

    #[test]
    fn html_and_css_pass_through_escaped() {
        let hl = highlight("<div class=\"x\">", "html");
        assert_eq!(hl.code, "&lt;div class=&quot;x&quot;&gt;");
    }

    #[test]
    fn no_cross_line_string_state() {
        // An unterminated string on one line must not bleed into the next.
        let hl = highlight("s = \"open\nprint(1)", "python");
        assert!(hl
            .code
            .lines()
            .nth(1)
            .unwrap()
            .contains("<span class=\"token function\">print</span>"));
    }
}
