use std::sync::LazyLock;

use anyhow::{bail, Result};
use regex::{Captures, Regex};

/// One fenced code block encountered during a formatting pass.
///
/// Ids are unique within the rendered message (and in practice per process),
/// but are not stable across re-renders of the same text.
#[derive(Debug, Clone)]
pub struct CodeBlockDescriptor {
    pub id: String,
    pub language: String,
    /// Raw code body, exactly as the user would expect to copy it.
    pub content: String,
    /// Body as emitted inside the `<code>` element, used when the highlight
    /// stage swaps the plain body for the highlighted one.
    pub escaped: String,
}

/// Result of running the transform pipeline over one message.
#[derive(Debug, Clone)]
pub struct FormattedMessage {
    pub html: String,
    pub code_blocks: Vec<CodeBlockDescriptor>,
}

struct PassContext {
    blocks: Vec<CodeBlockDescriptor>,
    /// Rendered code-block markup, parked behind placeholders so the later
    /// passes never touch markup emitted by an earlier pass.
    stash: Vec<String>,
}

type Pass = fn(String, &mut PassContext) -> String;

/// The pipeline, in the order it runs. Ordering is load-bearing: bold before
/// italic, longer heading markers before shorter ones, line breaks last.
const PASSES: &[(&str, Pass)] = &[
    ("escape-html", pass_escape),
    ("code-fences", pass_code_fences),
    ("inline-code", pass_inline_code),
    ("bold", pass_bold),
    ("italic", pass_italic),
    ("heading-3", pass_heading3),
    ("heading-2", pass_heading2),
    ("heading-1", pass_heading1),
    ("list-items", pass_list_items),
    ("line-breaks", pass_line_breaks),
];

/// Convert Markdown-flavored assistant text to HTML markup.
///
/// Pure apart from generating fresh code-block ids. Empty input yields an
/// empty string. An unterminated fence is left as literal (escaped) text.
pub fn format(text: &str) -> Result<FormattedMessage> {
    if text.is_empty() {
        return Ok(FormattedMessage {
            html: String::new(),
            code_blocks: Vec::new(),
        });
    }

    let mut ctx = PassContext {
        blocks: Vec::new(),
        stash: Vec::new(),
    };

    let mut out = text.to_string();
    for (_name, pass) in PASSES {
        out = pass(out, &mut ctx);
    }

    // Unpark the code blocks. A missing placeholder means a pass chewed on
    // text it should not have seen; surface that instead of emitting garbage.
    for (idx, block_html) in ctx.stash.iter().enumerate() {
        let placeholder = block_placeholder(idx);
        if !out.contains(&placeholder) {
            bail!("lost code block {} while formatting", idx);
        }
        out = out.replace(&placeholder, block_html);
    }

    Ok(FormattedMessage {
        html: out,
        code_blocks: ctx.blocks,
    })
}

fn block_placeholder(idx: usize) -> String {
    format!("\u{0}smitty-block-{}\u{0}", idx)
}

// Matches `&` unless it already starts one of the entities we emit, so that
// formatting already-escaped text is a no-op rather than a double escape.
static AMP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(amp;|lt;|gt;|quot;|apos;|#039;)?").unwrap());

/// Escape `&`, `<` and `>`. Idempotent on its own output.
pub fn escape_html(text: &str) -> String {
    let escaped = AMP.replace_all(text, |caps: &Captures| {
        if caps.get(1).is_some() {
            caps[0].to_string()
        } else {
            "&amp;".to_string()
        }
    });
    escaped.replace('<', "&lt;").replace('>', "&gt;")
}

/// Escape for text re-emitted verbatim inside attribute-adjacent markup:
/// everything `escape_html` does, plus both quote characters.
pub fn escape_code(text: &str) -> String {
    escape_html(text)
        .replace('"', "&quot;")
        .replace('\'', "&#039;")
}

fn unescape_html(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#039;", "'")
        .replace("&amp;", "&")
}

fn pass_escape(text: String, _ctx: &mut PassContext) -> String {
    escape_html(&text)
}

static FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)```(.*?)```").unwrap());

fn pass_code_fences(text: String, ctx: &mut PassContext) -> String {
    FENCE
        .replace_all(&text, |caps: &Captures| {
            let code = caps[1].trim();

            // Optional language tag: first line, single token, under 20 chars.
            let mut language = String::new();
            let mut body = code;
            if let Some(first) = code.lines().next() {
                if !first.is_empty() && !first.contains(' ') && first.len() < 20 {
                    language = first.to_string();
                    body = code[first.len()..].trim();
                }
            }

            let id = fresh_block_id(ctx.blocks.len());
            // The body arrives here already `&<>`-escaped by the first pass;
            // escape_code is idempotent on that and adds the quote entities.
            let escaped = escape_code(body);
            let block_html = render_code_block(&id, &language, &escaped);

            ctx.blocks.push(CodeBlockDescriptor {
                id,
                language,
                content: unescape_html(body),
                escaped,
            });
            ctx.stash.push(block_html);
            block_placeholder(ctx.stash.len() - 1)
        })
        .into_owned()
}

fn fresh_block_id(seq: usize) -> String {
    format!("code-{:06x}-{}", rand::random::<u32>() & 0x00ff_ffff, seq)
}

fn render_code_block(id: &str, language: &str, escaped_body: &str) -> String {
    let label = if language.is_empty() { "text" } else { language };
    format!(
        concat!(
            "<div class=\"code-block\">",
            "<div class=\"code-header\">",
            "<span class=\"code-language\">{label}</span>",
            "<button class=\"copy-button\" data-code-id=\"{id}\">copy</button>",
            "</div>",
            "<div class=\"code-container\">",
            "<div class=\"line-numbers\" id=\"line-numbers-{id}\"></div>",
            "<pre class=\"language-{lang}\">",
            "<code id=\"{id}\" class=\"language-{lang}\">{body}</code>",
            "</pre></div></div>"
        ),
        label = label,
        id = id,
        lang = language,
        body = escaped_body,
    )
}

static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`]+)`").unwrap());

fn pass_inline_code(text: String, _ctx: &mut PassContext) -> String {
    INLINE_CODE
        .replace_all(&text, "<code class=\"inline-code\">$1</code>")
        .into_owned()
}

// Bold must run before italic so `**a*b*c**` is claimed whole by bold and the
// inner single asterisks are left for the italic pass.
static BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\*\*(.+?)\*\*").unwrap());
static ITALIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\*([^*]+)\*").unwrap());

fn pass_bold(text: String, _ctx: &mut PassContext) -> String {
    BOLD.replace_all(&text, "<strong>$1</strong>").into_owned()
}

fn pass_italic(text: String, _ctx: &mut PassContext) -> String {
    ITALIC.replace_all(&text, "<em>$1</em>").into_owned()
}

// Three hashes checked before two before one, so a longer marker is never
// swallowed by a shorter pattern matching its prefix. The mandatory space
// after the hashes keeps `## x` out of reach of the `# ` pattern either way.
static H3: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^### (.*)$").unwrap());
static H2: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^## (.*)$").unwrap());
static H1: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^# (.*)$").unwrap());

fn pass_heading3(text: String, _ctx: &mut PassContext) -> String {
    H3.replace_all(&text, "<h3>$1</h3>").into_owned()
}

fn pass_heading2(text: String, _ctx: &mut PassContext) -> String {
    H2.replace_all(&text, "<h2>$1</h2>").into_owned()
}

fn pass_heading1(text: String, _ctx: &mut PassContext) -> String {
    H1.replace_all(&text, "<h1>$1</h1>").into_owned()
}

static LIST_ITEM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^- (.*)$").unwrap());

fn pass_list_items(text: String, _ctx: &mut PassContext) -> String {
    LIST_ITEM.replace_all(&text, "<li>$1</li>").into_owned()
}

fn pass_line_breaks(text: String, _ctx: &mut PassContext) -> String {
    text.replace('\n', "<br>")
}
