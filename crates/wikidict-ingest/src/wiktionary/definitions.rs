//! Definition extraction from wikitext
//!
//! Only what a word game needs: the numbered definition lines inside the
//! edition's own language section, with markup flattened to plain text.

use super::LanguageSpec;

/// Definitions of the entry, in page order
pub fn extract_definitions(wikitext: &str, language: &LanguageSpec) -> Vec<String> {
    let mut definitions = Vec::new();
    let mut in_section = false;

    for line in wikitext.lines() {
        let line = line.trim_end();
        if let Some((level, title)) = heading(line) {
            if level == 2 {
                in_section = title == language.section;
            }
            continue;
        }
        if !in_section {
            continue;
        }
        let Some(body) = line.strip_prefix('#') else {
            continue;
        };
        // `#:` examples, `#*` quotations and `##` sub-senses are not definitions
        if body.starts_with([':', '*', '#']) {
            continue;
        }
        let text = flatten(body);
        if !text.is_empty() {
            definitions.push(text);
        }
    }
    definitions
}

/// Level and trimmed title of a `== Title ==` line
fn heading(line: &str) -> Option<(usize, &str)> {
    let line = line.trim();
    let level = line.chars().take_while(|&c| c == '=').count();
    if level < 2 || !line.ends_with('=') || line.len() <= level * 2 {
        return None;
    }
    let closing = line.chars().rev().take_while(|&c| c == '=').count();
    let level = level.min(closing);
    Some((level, line[level..line.len() - level].trim()))
}

/// Reduce wiki markup to display text
///
/// `[[target|label]]` keeps the label, `[[target]]` the target, and a
/// template `{{name|...}}` becomes `(name)`. Quote markup and comments are
/// dropped.
pub fn flatten(markup: &str) -> String {
    let mut out = String::with_capacity(markup.len());
    let mut rest = markup;

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("[[") {
            if let Some(end) = after.find("]]") {
                let inner = &after[..end];
                let label = inner.rsplit('|').next().unwrap_or(inner);
                out.push_str(label);
                rest = &after[end + 2..];
                continue;
            }
        }
        if rest.starts_with("{{") {
            if let Some(end) = matching_braces(rest) {
                let inner = &rest[2..end];
                let name = inner.split('|').next().unwrap_or(inner).trim();
                if !name.is_empty() {
                    out.push('(');
                    out.push_str(name);
                    out.push(')');
                }
                rest = &rest[end + 2..];
                continue;
            }
        }
        if let Some(after) = rest.strip_prefix("<!--") {
            rest = after.find("-->").map_or("", |end| &after[end + 3..]);
            continue;
        }
        if let Some(after) = rest.strip_prefix("''") {
            rest = after.trim_start_matches('\'');
            continue;
        }

        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(c);
        }
        rest = chars.as_str();
    }

    collapse_spaces(&out)
}

/// Byte offset of the `}}` closing the template that opens `text`
fn matching_braces(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i + 1 < bytes.len() {
        match &bytes[i..i + 2] {
            b"{{" => {
                depth += 1;
                i += 2;
            },
            b"}}" => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
                i += 2;
            },
            _ => i += 1,
        }
    }
    None
}

fn collapse_spaces(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::wiktionary::find_language;

    #[test]
    fn test_french_section() {
        let fr = find_language("fr").unwrap();
        let text = "\
{{voir|Chat}}
== {{langue|fr}} ==
=== {{S|nom|fr}} ===
'''chat''' {{pron|ʃa|fr}} {{m}}
# {{zoologie|fr}} [[mammifère|Mammifère]] carnivore domestique.
#* ''Le chat dort.''
#: Exemple.
# [[discussion]] en ligne.
## sous-sens

== {{langue|en}} ==
=== {{S|nom|en}} ===
# [[chat]] (conversation)
";
        assert_eq!(
            extract_definitions(text, fr),
            vec![
                "(zoologie) Mammifère carnivore domestique.".to_string(),
                "discussion en ligne.".to_string(),
            ]
        );
    }

    #[test]
    fn test_english_section() {
        let en = find_language("en").unwrap();
        let text = "==English==\n===Noun===\n{{en-noun}}\n# A small [[domestic]] [[feline|cat]].\n\n==French==\n# chat\n";
        assert_eq!(extract_definitions(text, en), vec!["A small domestic cat.".to_string()]);
    }

    #[test]
    fn test_no_section_no_definitions() {
        let en = find_language("en").unwrap();
        assert!(extract_definitions("# orphan line\n", en).is_empty());
    }

    #[test]
    fn test_flatten() {
        assert_eq!(flatten("[[link|1]]"), "1");
        assert_eq!(flatten("{{2|template}}"), "(2)");
        assert_eq!(flatten("{{outer|{{inner}}}} after"), "(outer) after");
        assert_eq!(flatten("'''bold''' and ''italic''"), "bold and italic");
        assert_eq!(flatten("a <!-- hidden --> b"), "a b");
        assert_eq!(flatten("unclosed [[link"), "unclosed [[link");
    }

    #[test]
    fn test_heading_levels() {
        assert_eq!(heading("== {{langue|fr}} =="), Some((2, "{{langue|fr}}")));
        assert_eq!(heading("===Noun==="), Some((3, "Noun")));
        assert_eq!(heading("= Top ="), None);
        assert_eq!(heading("# item"), None);
    }
}
