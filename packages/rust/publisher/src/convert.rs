//! HTML conversion for platforms that do not accept raw HTML.
//!
//! Telegraph takes a JSON tree of nodes restricted to a small tag set;
//! Write.as takes Markdown.

use std::collections::BTreeMap;

use backlinkoo_shared::{BacklinkooError, Result};
use scraper::{ElementRef, Html};
use serde::Serialize;

/// A Telegraph content node: plain text or an element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TelegraphNode {
    Text(String),
    Element(TelegraphElement),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TelegraphElement {
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attrs: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TelegraphNode>,
}

impl TelegraphNode {
    fn element(tag: &str, children: Vec<TelegraphNode>) -> Self {
        Self::Element(TelegraphElement {
            tag: tag.to_string(),
            attrs: None,
            children,
        })
    }

    fn is_inline(&self) -> bool {
        match self {
            Self::Text(_) => true,
            Self::Element(el) => INLINE_TAGS.contains(&el.tag.as_str()),
        }
    }
}

const INLINE_TAGS: &[&str] = &["a", "b", "i", "u", "s", "code", "br"];

/// Elements whose content is dropped entirely.
const SKIPPED_TAGS: &[&str] = &["script", "style", "head", "title", "noscript", "svg", "iframe"];

/// Containers where whitespace-only text is layout noise.
const BLOCK_CONTAINERS: &[&str] = &["ul", "ol", "blockquote"];

/// Map an HTML tag onto the Telegraph tag set. `None` means "flatten".
fn telegraph_tag(name: &str) -> Option<&'static str> {
    Some(match name {
        "h1" => "h3",
        "h2" | "h3" | "h4" | "h5" | "h6" => "h4",
        "strong" | "b" => "b",
        "em" | "i" => "i",
        "p" => "p",
        "a" => "a",
        "u" => "u",
        "s" | "strike" | "del" => "s",
        "ul" => "ul",
        "ol" => "ol",
        "li" => "li",
        "blockquote" => "blockquote",
        "pre" => "pre",
        "code" => "code",
        "br" => "br",
        "hr" => "hr",
        _ => return None,
    })
}

/// Convert an HTML fragment into Telegraph content nodes.
///
/// Top-level runs of inline content are wrapped in paragraphs.
pub fn html_to_telegraph_nodes(html: &str) -> Vec<TelegraphNode> {
    let fragment = Html::parse_fragment(html);
    let nodes = convert_children(fragment.root_element(), true);

    let mut out = Vec::with_capacity(nodes.len());
    let mut run: Vec<TelegraphNode> = Vec::new();
    for node in nodes {
        if node.is_inline() {
            run.push(node);
        } else {
            if !run.is_empty() {
                out.push(TelegraphNode::element("p", std::mem::take(&mut run)));
            }
            out.push(node);
        }
    }
    if !run.is_empty() {
        out.push(TelegraphNode::element("p", run));
    }
    out
}

fn convert_children(el: ElementRef<'_>, drop_whitespace: bool) -> Vec<TelegraphNode> {
    let mut out = Vec::new();
    for child in el.children() {
        match child.value() {
            scraper::Node::Text(text) => {
                let text: &str = text;
                if text.trim().is_empty() && (drop_whitespace || text.contains('\n')) {
                    continue;
                }
                out.push(TelegraphNode::Text(text.to_string()));
            }
            scraper::Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    out.extend(convert_element(child_el));
                }
            }
            _ => {}
        }
    }
    out
}

fn convert_element(el: ElementRef<'_>) -> Vec<TelegraphNode> {
    let name = el.value().name();
    if SKIPPED_TAGS.contains(&name) {
        return Vec::new();
    }

    let Some(tag) = telegraph_tag(name) else {
        // Unknown wrapper (div, span, section, ...): keep its content.
        return convert_children(el, true);
    };

    let children = match tag {
        "br" | "hr" => Vec::new(),
        _ => convert_children(el, BLOCK_CONTAINERS.contains(&tag)),
    };

    let attrs = if tag == "a" {
        el.value().attr("href").map(|href| {
            let mut attrs = BTreeMap::new();
            attrs.insert("href".to_string(), href.to_string());
            attrs
        })
    } else {
        None
    };

    vec![TelegraphNode::Element(TelegraphElement {
        tag: tag.to_string(),
        attrs,
        children,
    })]
}

/// Convert HTML to Markdown for Markdown-native platforms.
pub fn html_to_markdown(html: &str) -> Result<String> {
    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "iframe", "noscript", "svg"])
        .build();

    let markdown = converter
        .convert(html)
        .map_err(|e| BacklinkooError::parse(format!("htmd conversion failed: {e}")))?;
    Ok(markdown.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn maps_headings_and_emphasis() {
        let nodes = html_to_telegraph_nodes(
            "<h1>Title</h1><h2>Sub</h2><h5>Deep</h5><p><strong>bold</strong> and <em>it</em></p>",
        );
        let value = serde_json::to_value(&nodes).unwrap();
        assert_eq!(
            value,
            json!([
                { "tag": "h3", "children": ["Title"] },
                { "tag": "h4", "children": ["Sub"] },
                { "tag": "h4", "children": ["Deep"] },
                { "tag": "p", "children": [
                    { "tag": "b", "children": ["bold"] },
                    " and ",
                    { "tag": "i", "children": ["it"] }
                ]}
            ])
        );
    }

    #[test]
    fn links_keep_only_href() {
        let nodes = html_to_telegraph_nodes(
            r#"<p><a href="https://example.com" target="_blank" rel="noopener">go</a></p>"#,
        );
        let value = serde_json::to_value(&nodes).unwrap();
        assert_eq!(
            value,
            json!([{ "tag": "p", "children": [
                { "tag": "a", "attrs": { "href": "https://example.com" }, "children": ["go"] }
            ]}])
        );
    }

    #[test]
    fn flattens_unknown_tags_and_drops_scripts() {
        let nodes = html_to_telegraph_nodes(
            "<div><section><p>inside</p></section></div><script>alert(1)</script>",
        );
        let value = serde_json::to_value(&nodes).unwrap();
        assert_eq!(value, json!([{ "tag": "p", "children": ["inside"] }]));
    }

    #[test]
    fn wraps_top_level_inline_content() {
        let nodes = html_to_telegraph_nodes("loose <b>text</b>\n<p>para</p>\ntrailing");
        let value = serde_json::to_value(&nodes).unwrap();
        assert_eq!(
            value,
            json!([
                { "tag": "p", "children": ["loose ", { "tag": "b", "children": ["text"] }] },
                { "tag": "p", "children": ["para"] },
                { "tag": "p", "children": ["\ntrailing"] }
            ])
        );
    }

    #[test]
    fn lists_drop_layout_whitespace() {
        let nodes = html_to_telegraph_nodes("<ul>\n  <li>one</li>\n  <li>two</li>\n</ul><hr>");
        let value = serde_json::to_value(&nodes).unwrap();
        assert_eq!(
            value,
            json!([
                { "tag": "ul", "children": [
                    { "tag": "li", "children": ["one"] },
                    { "tag": "li", "children": ["two"] }
                ]},
                { "tag": "hr" }
            ])
        );
    }

    #[test]
    fn markdown_conversion() {
        let md = html_to_markdown(
            r#"<h1>Guide</h1><p>Visit <a href="https://example.com">our site</a>.</p>"#,
        )
        .unwrap();
        assert!(md.starts_with("# Guide"));
        assert!(md.contains("[our site](https://example.com)"));
    }
}
