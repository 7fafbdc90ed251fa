//! Prompt templates for article generation.
//!
//! Several phrasings of the same request are kept and one is picked at random
//! per call, so that published articles do not share an obvious footprint.

use rand::Rng;

use crate::GenerateRequest;

/// System message sent with every generation request.
pub const SYSTEM_PROMPT: &str = "You are a professional content writer. Create high-quality, \
     informative blog posts with natural link placement. Format the output as HTML with proper \
     headings, paragraphs, and hyperlinks.";

/// Built-in request phrasings. `{keyword}`, `{anchor}` and `{url}` are substituted.
const DEFAULT_VARIANTS: [&str; 3] = [
    "Generate a blog post on {keyword} including the {anchor} hyperlinked to {url}",
    "Write a article about {keyword} with a hyperlinked {anchor} linked to {url}",
    "Produce a write up on {keyword} that links {anchor} to {url}",
];

/// A set of interchangeable prompt phrasings.
#[derive(Debug, Clone)]
pub struct PromptSet {
    variants: Vec<String>,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            variants: DEFAULT_VARIANTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl PromptSet {
    /// Build a set from custom phrasings. Falls back to the built-ins when empty.
    pub fn new(variants: Vec<String>) -> Self {
        if variants.is_empty() {
            Self::default()
        } else {
            Self { variants }
        }
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Pick a random 1-based variant index.
    pub fn pick(&self) -> u32 {
        let n = self.variants.len().max(1);
        rand::thread_rng().gen_range(0..n) as u32 + 1
    }

    /// Render the variant at 1-based `index` (wrapping) for `req`.
    pub fn render(&self, index: u32, req: &GenerateRequest) -> String {
        let slot = (index.saturating_sub(1) as usize) % self.variants.len().max(1);
        let template = self
            .variants
            .get(slot)
            .map(String::as_str)
            .unwrap_or(DEFAULT_VARIANTS[0]);
        template
            .replace("{keyword}", &req.keyword)
            .replace("{anchor}", &req.anchor_text)
            .replace("{url}", &req.target_url)
    }

    /// Full user message: the rendered variant plus length, tone and format
    /// instructions.
    pub fn user_message(&self, index: u32, req: &GenerateRequest, default_words: u32) -> String {
        let words = req.word_count.unwrap_or(default_words);
        let mut msg = format!(
            "{}. Make the article at least {words} words, well-structured with headings, \
             and naturally incorporate the hyperlink.",
            self.render(index, req)
        );
        if let Some(tone) = req.tone.as_deref().filter(|t| !t.trim().is_empty()) {
            msg.push_str(&format!(" Write in a {} tone.", tone.trim()));
        }
        msg.push_str(" Format as HTML.");
        msg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req() -> GenerateRequest {
        GenerateRequest::new("coffee grinders", "best burr grinder", "https://example.com/g")
    }

    #[test]
    fn render_substitutes_placeholders() {
        let prompts = PromptSet::default();
        assert_eq!(
            prompts.render(1, &req()),
            "Generate a blog post on coffee grinders including the best burr grinder \
             hyperlinked to https://example.com/g"
        );
        assert!(prompts.render(3, &req()).starts_with("Produce a write up on coffee grinders"));
    }

    #[test]
    fn render_wraps_out_of_range_indexes() {
        let prompts = PromptSet::default();
        assert_eq!(prompts.render(4, &req()), prompts.render(1, &req()));
        assert_eq!(prompts.render(0, &req()), prompts.render(1, &req()));
    }

    #[test]
    fn pick_stays_in_range() {
        let prompts = PromptSet::default();
        for _ in 0..50 {
            let i = prompts.pick();
            assert!((1..=3).contains(&i));
        }
    }

    #[test]
    fn user_message_includes_length_and_tone() {
        let prompts = PromptSet::default();
        let mut r = req();
        let msg = prompts.user_message(2, &r, 500);
        assert!(msg.contains("at least 500 words"));
        assert!(msg.ends_with("Format as HTML."));
        assert!(!msg.contains("tone"));

        r.word_count = Some(800);
        r.tone = Some("friendly".into());
        let msg = prompts.user_message(2, &r, 500);
        assert!(msg.contains("at least 800 words"));
        assert!(msg.contains("Write in a friendly tone."));
    }

    #[test]
    fn empty_custom_set_uses_builtins() {
        assert_eq!(PromptSet::new(Vec::new()).len(), 3);
        let custom = PromptSet::new(vec!["About {keyword}".into()]);
        assert_eq!(custom.render(2, &req()), "About coffee grinders");
    }
}
