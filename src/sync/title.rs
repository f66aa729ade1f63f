use crate::html::HtmlDecoder;

/// The field values a panel's display title is derived from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PanelFields {
    pub metadata_title: Option<String>,
    pub alt: Option<String>,
    pub entries: Vec<String>,
}

/// Localized placeholders and the decoder for rich-text entries.
pub struct TitleContext<'a> {
    /// "Untitled Image": the title an image gets before anyone names it.
    pub untitled_image: String,
    /// Fallback when nothing else yields a title.
    pub untitled_panel: String,
    pub decoder: &'a dyn HtmlDecoder,
}

/// Display title of a panel. First non-empty candidate wins:
///
/// 1. the image's metadata title, unless it is the untitled-image placeholder;
/// 2. the image's alt text;
/// 3. the first non-empty entry, HTML-decoded;
/// 4. the untitled-panel placeholder.
///
/// Whitespace-only values count as empty and fall through to the next
/// candidate.
pub fn derive_title(fields: &PanelFields, ctx: &TitleContext<'_>) -> String {
    if let Some(title) = non_empty(fields.metadata_title.as_deref())
        && title != ctx.untitled_image
    {
        return title.to_string();
    }

    if let Some(alt) = non_empty(fields.alt.as_deref()) {
        return alt.to_string();
    }

    fields
        .entries
        .iter()
        .map(|entry| ctx.decoder.decode(entry))
        .find(|text| !text.trim().is_empty())
        .unwrap_or_else(|| ctx.untitled_panel.clone())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|text| !text.trim().is_empty())
}
