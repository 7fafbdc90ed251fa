//! Cleanup applied to model output before it is published.

use regex::RegexBuilder;
use scraper::{Html, Selector};

/// Remove a surrounding Markdown code fence (```html ... ```), if present.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }

    let mut lines: Vec<&str> = trimmed.lines().collect();
    lines.remove(0);
    if lines.last().is_some_and(|l| l.trim().starts_with("```")) {
        lines.pop();
    }
    lines.join("\n").trim().to_string()
}

/// Render the anchor element used for backlinks.
pub fn link_html(url: &str, text: &str) -> String {
    format!(
        r#"<a href="{}" target="_blank" rel="noopener noreferrer">{}</a>"#,
        escape_html(url),
        text
    )
}

/// Make sure the article links `anchor` to `target_url`.
///
/// Content that already links to the target is returned unchanged. Otherwise
/// every case-insensitive occurrence of the anchor text outside of tags and
/// existing links is wrapped in a link. If the anchor text never appears, a
/// closing paragraph carrying the link is appended.
pub fn ensure_link(html: &str, anchor: &str, target_url: &str) -> String {
    if has_link_to(html, target_url) {
        return html.to_string();
    }

    let anchor = anchor.trim();
    if anchor.is_empty() {
        return append_link_paragraph(html, target_url, target_url);
    }

    let Ok(pattern) = RegexBuilder::new(&regex::escape(anchor))
        .case_insensitive(true)
        .build()
    else {
        return append_link_paragraph(html, anchor, target_url);
    };

    let mut out = String::with_capacity(html.len() + 128);
    let mut linked = 0usize;
    let mut link_depth = 0usize;
    let mut rest = html;

    while !rest.is_empty() {
        if rest.starts_with('<') {
            let end = rest.find('>').map(|i| i + 1).unwrap_or(rest.len());
            let tag = &rest[..end];
            match tag_name(tag) {
                Some((false, name)) if name.eq_ignore_ascii_case("a") => link_depth += 1,
                Some((true, name)) if name.eq_ignore_ascii_case("a") => {
                    link_depth = link_depth.saturating_sub(1);
                }
                _ => {}
            }
            out.push_str(tag);
            rest = &rest[end..];
        } else {
            let end = rest.find('<').unwrap_or(rest.len());
            let text = &rest[..end];
            if link_depth == 0 {
                let replaced = pattern.replace_all(text, |caps: &regex::Captures<'_>| {
                    linked += 1;
                    link_html(target_url, &caps[0])
                });
                out.push_str(&replaced);
            } else {
                out.push_str(text);
            }
            rest = &rest[end..];
        }
    }

    if linked == 0 {
        return append_link_paragraph(html, anchor, target_url);
    }
    out
}

/// Element name of a tag and whether it is a closing tag. Comments,
/// doctypes and stray `<` characters yield `None`.
fn tag_name(tag: &str) -> Option<(bool, &str)> {
    let inner = tag.strip_prefix('<')?;
    let (closing, inner) = match inner.strip_prefix('/') {
        Some(rest) => (true, rest),
        None => (false, inner),
    };
    let end = inner
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(inner.len());
    let name = &inner[..end];
    let next = inner[end..].chars().next();
    let terminated =
        matches!(next, None | Some('>' | '/')) || next.is_some_and(char::is_whitespace);
    (!name.is_empty() && terminated).then_some((closing, name))
}

fn has_link_to(html: &str, target_url: &str) -> bool {
    let double = format!(r#"href="{target_url}""#);
    let single = format!("href='{target_url}'");
    html.contains(&double) || html.contains(&single)
}

fn append_link_paragraph(html: &str, anchor: &str, target_url: &str) -> String {
    format!(
        "{}\n<p>For more information, see {}.</p>",
        html.trim_end(),
        link_html(target_url, &escape_html(anchor))
    )
}

/// Text of the first `<h1>`, whitespace-collapsed.
pub fn extract_title(html: &str) -> Option<String> {
    let selector = Selector::parse("h1").ok()?;
    let fragment = Html::parse_fragment(html);
    let h1 = fragment.select(&selector).next()?;
    let title = h1.text().collect::<Vec<_>>().join(" ");
    let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
    if title.is_empty() { None } else { Some(title) }
}

/// Minimal escaping for text and attribute values.
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
