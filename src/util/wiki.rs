use std::sync::LazyLock;

use regex::Regex;

/// Trac's explicit line break macro.
pub const LINE_BREAK: &str = "[[br]]";

static BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*(.*?)\*\*").unwrap());
static ITALIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_(.*?)_").unwrap());

/// Convert Trello-flavoured markdown into Trac wiki markup.
///
/// The rewrite rules run in a fixed order: line endings are normalised, `**bold**`
/// becomes `'''bold'''`, `_italic_` becomes `''italic''`, and every newline turns
/// into ` [[br]]` so the result is a single line with explicit breaks.
///
/// Italic substitution runs on the output of the bold pass, so `**_z_**` ends up
/// as `'''''z'''''`. Wiki syntax already present in the input is passed through
/// unescaped.
pub fn markdown_to_wiki(text: &str) -> String {
    let text = text.replace("\r\n", "\n");
    let text = BOLD.replace_all(&text, "'''${1}'''");
    let text = ITALIC.replace_all(&text, "''${1}''");
    text.replace('\n', &format!(" {LINE_BREAK}"))
}
