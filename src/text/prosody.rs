//! Text cleanup applied before synthesis.
//!
//! Language-model output is markdown-flavoured. Read verbatim, asterisks,
//! bullet dashes and raw URLs sound terrible, so each segment is rewritten into
//! something a voice can pronounce with natural pauses.

use regex::Regex;
use std::sync::LazyLock;

static MARKDOWN_LINK: LazyLock<Regex> = LazyLock::new(|| compile(r"\[([^\]]+)\]\([^)]*\)"));
static HEADING: LazyLock<Regex> = LazyLock::new(|| compile(r"(?m)^[ \t]*#{1,6}[ \t]+"));
static STAR_BULLET: LazyLock<Regex> = LazyLock::new(|| compile(r"(?m)^[ \t]*[*+][ \t]+"));
static DASH_BULLET: LazyLock<Regex> = LazyLock::new(|| compile(r"(?m)^[ \t]*-[ \t]+"));
static BOLD_STARS: LazyLock<Regex> = LazyLock::new(|| compile(r"\*\*([^*]+)\*\*"));
static BOLD_UNDERSCORES: LazyLock<Regex> = LazyLock::new(|| compile(r"__([^_]+)__"));
static ITALIC_STARS: LazyLock<Regex> = LazyLock::new(|| compile(r"\*([^*\s][^*]*)\*"));
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| compile(r"`([^`]+)`"));
static SPACE_BEFORE_COMMA: LazyLock<Regex> = LazyLock::new(|| compile(r"\s+,"));
static REPEATED_COMMA: LazyLock<Regex> = LazyLock::new(|| compile(r",(\s*,)+"));
static COMMA_BEFORE_STOP: LazyLock<Regex> = LazyLock::new(|| compile(r",\s*([.!?;:])"));

#[allow(clippy::expect_used)]
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("pattern is a valid literal")
}

/// Spoken forms for link-like prefixes.
const SPELLED_PREFIXES: [(&str, &str); 3] = [
    ("https://", " h t t p s colon slash slash "),
    ("http://", " h t t p colon slash slash "),
    ("www.", " w w w dot "),
];

/// Rewrites a segment into speakable text.
///
/// Pure and deterministic: the same input always yields the same output.
pub fn normalize_for_speech(text: &str) -> String {
    let text = MARKDOWN_LINK.replace_all(text, "$1");
    let text = HEADING.replace_all(&text, "");
    let text = STAR_BULLET.replace_all(&text, ", bullet: ");
    let text = DASH_BULLET.replace_all(&text, ", dash: ");

    let text = BOLD_STARS.replace_all(&text, "$1");
    let text = BOLD_UNDERSCORES.replace_all(&text, "$1");
    let text = ITALIC_STARS.replace_all(&text, "$1");
    let text = INLINE_CODE.replace_all(&text, "$1");

    let mut text = text.replace('*', "");
    for (prefix, spoken) in SPELLED_PREFIXES {
        text = text.replace(prefix, spoken);
    }
    let text = text.replace(['(', ')'], ", ");

    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let text = SPACE_BEFORE_COMMA.replace_all(&text, ",");
    let text = REPEATED_COMMA.replace_all(&text, ",");
    let text = COMMA_BEFORE_STOP.replace_all(&text, "$1");

    text.trim_start_matches([',', ' '])
        .trim_end_matches([',', ' '])
        .to_string()
}
