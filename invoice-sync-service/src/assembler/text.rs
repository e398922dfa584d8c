//! Small text helpers for item names and descriptions.

/// Strip markup and decode the common HTML entities.
pub fn plain_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for c in input.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    decode_entities(&out)
}

fn decode_entities(input: &str) -> String {
    const ENTITIES: [(&str, &str); 8] = [
        ("&nbsp;", " "),
        ("&lt;", "<"),
        ("&gt;", ">"),
        ("&quot;", "\""),
        ("&#039;", "'"),
        ("&#39;", "'"),
        ("&euro;", "€"),
        ("&amp;", "&"),
    ];
    ENTITIES
        .iter()
        .fold(input.to_string(), |acc, (entity, plain)| {
            acc.replace(entity, plain)
        })
}

/// Replace every `[TOKEN]` in one left-to-right pass. Substituted text is
/// never scanned again.
pub fn substitute(template: &str, tokens: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    'scan: while !rest.is_empty() {
        for (token, value) in tokens {
            if let Some(after) = rest.strip_prefix(token) {
                out.push_str(value);
                rest = after;
                continue 'scan;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(c);
        }
        rest = chars.as_str();
    }
    out
}

/// Resolve `[ATTRIBUTE:name]` placeholders through `lookup`.
///
/// A known attribute renders as `name: value`, an unknown one disappears.
pub fn replace_attribute_tags(text: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    const OPEN: &str = "[ATTRIBUTE:";
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(']') else {
            break;
        };
        out.push_str(&rest[..start]);
        let name = &after_open[..end];
        if let Some(value) = lookup(name).filter(|v| !v.is_empty()) {
            out.push_str(&format!("{}: {}", name, value));
        }
        rest = &after_open[end + 1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_strips_tags_and_entities() {
        assert_eq!(plain_text("<p>Soft &amp; <b>light</b></p>"), "Soft & light");
        assert_eq!(plain_text("&lt;none&gt;"), "<none>");
    }

    #[test]
    fn substitute_is_single_pass() {
        let out = substitute(
            "[SKU] / [WEIGHT]",
            &[("[SKU]", "[WEIGHT]".to_string()), ("[WEIGHT]", "2kg".to_string())],
        );
        assert_eq!(out, "[WEIGHT] / 2kg");
    }

    #[test]
    fn attribute_tags_render_or_vanish() {
        let out = replace_attribute_tags("A [ATTRIBUTE:Color] B [ATTRIBUTE:Size]", |name| {
            (name == "Color").then(|| "Blue".to_string())
        });
        assert_eq!(out, "A Color: Blue B ");
    }
}
