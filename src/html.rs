use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Recovers plain text from rich-content field values.
pub trait HtmlDecoder {
    fn decode(&self, input: &str) -> String;
}

static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->|</?[A-Za-z][^>]*>").expect("valid tag pattern"));

static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(?:#(\d{1,7})|#[xX]([0-9A-Fa-f]{1,6})|([A-Za-z][A-Za-z0-9]{1,31}));")
        .expect("valid entity pattern")
});

/// Text content of an HTML fragment: tags dropped, character references
/// resolved. Unknown named references are left as written.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextContent;

impl HtmlDecoder for TextContent {
    fn decode(&self, input: &str) -> String {
        if !input.contains(['<', '&']) {
            return input.to_string();
        }
        let stripped = TAG.replace_all(input, "");
        ENTITY
            .replace_all(&stripped, |caps: &Captures<'_>| {
                let decoded = if let Some(decimal) = caps.get(1) {
                    decimal.as_str().parse::<u32>().ok().and_then(char::from_u32)
                } else if let Some(hex) = caps.get(2) {
                    u32::from_str_radix(hex.as_str(), 16)
                        .ok()
                        .and_then(char::from_u32)
                } else {
                    caps.get(3).and_then(|name| named_entity(name.as_str()))
                };
                decoded
                    .map(String::from)
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

fn named_entity(name: &str) -> Option<char> {
    let ch = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "shy" => '\u{ad}',
        "copy" => '©',
        "reg" => '®',
        "trade" => '™',
        "hellip" => '…',
        "mdash" => '—',
        "ndash" => '–',
        "lsquo" => '‘',
        "rsquo" => '’',
        "ldquo" => '“',
        "rdquo" => '”',
        "laquo" => '«',
        "raquo" => '»',
        "euro" => '€',
        "pound" => '£',
        "deg" => '°',
        "auml" => 'ä',
        "ouml" => 'ö',
        "uuml" => 'ü',
        "Auml" => 'Ä',
        "Ouml" => 'Ö',
        "Uuml" => 'Ü',
        "szlig" => 'ß',
        "eacute" => 'é',
        "egrave" => 'è',
        "agrave" => 'à',
        "ccedil" => 'ç',
        _ => return None,
    };
    Some(ch)
}
