//! Bio rendering
//!
//! Rendered bios depend on the owner's trust level: links in bios of users
//! below Regular carry `rel="nofollow ugc"`.

use crate::trust::TrustLevel;

pub trait BioRenderer: Send + Sync {
    fn cook(&self, raw: &str, trust_level: TrustLevel) -> String;
}

#[derive(Debug, Clone, Default)]
pub struct HtmlBioRenderer;

impl BioRenderer for HtmlBioRenderer {
    fn cook(&self, raw: &str, trust_level: TrustLevel) -> String {
        let follow = trust_level >= TrustLevel::Regular;

        raw.split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|paragraph| {
                let body = paragraph
                    .split_whitespace()
                    .map(|word| render_word(word, follow))
                    .collect::<Vec<_>>()
                    .join(" ");
                format!("<p>{}</p>", body)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn render_word(word: &str, follow: bool) -> String {
    let escaped = escape_html(word);
    if !(word.starts_with("https://") || word.starts_with("http://")) {
        return escaped;
    }
    if follow {
        format!("<a href=\"{0}\">{0}</a>", escaped)
    } else {
        format!("<a href=\"{0}\" rel=\"nofollow ugc\">{0}</a>", escaped)
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
