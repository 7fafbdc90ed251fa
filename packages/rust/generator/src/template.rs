//! Built-in article templates, used when no text-generation API is available.

use async_trait::async_trait;
use backlinkoo_shared::Result;

use crate::postprocess::{escape_html, link_html};
use crate::{ContentGenerator, GenerateRequest, GeneratedPost, GenerationSource};

/// Number of built-in templates.
pub const TEMPLATE_COUNT: u32 = 3;

/// Generates articles from fixed HTML templates.
#[derive(Debug, Clone, Default)]
pub struct TemplateGenerator;

impl TemplateGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Render the template at 1-based `index` (wrapping). Returns `(title, html)`.
    pub fn render(&self, index: u32, req: &GenerateRequest) -> (String, String) {
        let k = escape_html(&req.keyword);
        let link = link_html(&req.target_url, &escape_html(&req.anchor_text));

        match index.saturating_sub(1) % TEMPLATE_COUNT {
            0 => {
                let title = format!("Understanding {}: A Comprehensive Guide", req.keyword);
                let html = format!(
                    "<h1>Understanding {k}: A Comprehensive Guide</h1>\n\
                     <p>{k} has become a core concern for businesses and individuals alike. \
                     This guide walks through what it is, why it matters, and how to get \
                     real results from it.</p>\n\
                     <h2>What is {k}?</h2>\n\
                     <p>At its heart, {k} is about applying proven methods consistently. \
                     Those who succeed treat it as an ongoing practice rather than a one-off \
                     project.</p>\n\
                     <h2>Key Benefits of {k}</h2>\n\
                     <ul>\n<li>Better outcomes through focused effort</li>\n\
                     <li>Lower costs over time</li>\n\
                     <li>A clear edge over competitors</li>\n</ul>\n\
                     <h2>Putting {k} into Practice</h2>\n\
                     <p>Start with a short list of goals, measure progress, and adjust. \
                     For expert help along the way, {link} offers practical resources.</p>\n\
                     <h2>Conclusion</h2>\n\
                     <p>With steady attention and the right tools, {k} pays off for \
                     years to come.</p>"
                );
                (title, html)
            }
            1 => {
                let title = format!("{}: Essential Strategies for Success", req.keyword);
                let html = format!(
                    "<h1>{k}: Essential Strategies for Success</h1>\n\
                     <p>Getting {k} right takes more than good intentions. The strategies \
                     below are the ones practitioners return to again and again.</p>\n\
                     <h2>Build a Strategic Framework</h2>\n\
                     <p>Define what success in {k} looks like for you before choosing \
                     tactics. A framework keeps decisions consistent.</p>\n\
                     <h2>Core Components</h2>\n\
                     <ol>\n<li>Research and planning</li>\n\
                     <li>Execution with clear ownership</li>\n\
                     <li>Review and iteration</li>\n</ol>\n\
                     <h2>Expert Guidance</h2>\n\
                     <p>Learning from specialists shortens the path considerably. \
                     {link} is a good place to start.</p>\n\
                     <h2>Measuring Results</h2>\n\
                     <p>Track a few meaningful numbers and revisit them regularly so \
                     your {k} work stays on course.</p>"
                );
                (title, html)
            }
            _ => {
                let title = format!("Mastering {}: A Professional's Handbook", req.keyword);
                let html = format!(
                    "<h1>Mastering {k}: A Professional's Handbook</h1>\n\
                     <p>Professionals who master {k} share a handful of habits. This \
                     handbook collects them in one place.</p>\n\
                     <h2>Professional Foundations</h2>\n\
                     <p>Solid fundamentals make advanced work possible. Invest in them \
                     early and revisit them often.</p>\n\
                     <h2>Advanced Techniques</h2>\n\
                     <p>Once the basics are in place, refine your approach to {k} with \
                     careful experimentation and peer review.</p>\n\
                     <h2>Resources for Growth</h2>\n\
                     <p>Keep learning from trusted sources such as {link}.</p>\n\
                     <h2>Final Thoughts</h2>\n\
                     <p>Mastery of {k} is a long game. Patience and consistency carry \
                     the day.</p>"
                );
                (title, html)
            }
        }
    }
}

#[async_trait]
impl ContentGenerator for TemplateGenerator {
    async fn generate(&self, req: &GenerateRequest) -> Result<GeneratedPost> {
        let index = req
            .prompt_index
            .unwrap_or_else(|| crate::prompts::PromptSet::default().pick());
        let (title, html) = self.render(index, req);
        tracing::debug!(index, keyword = %req.keyword, "rendered template article");

        Ok(GeneratedPost {
            title,
            html,
            prompt: format!("template #{index}"),
            prompt_index: index,
            model: "template".into(),
            tokens_in: 0,
            tokens_out: 0,
            source: GenerationSource::Template,
        })
    }

    fn name(&self) -> &str {
        "template"
    }
}
