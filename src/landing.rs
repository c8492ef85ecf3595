//! Landing-page generation.
//!
//! Two completion steps: draft marketing copy in markdown, then map the copy
//! onto a closed set of section kinds returned as JSON. Sections are a tagged
//! enum resolved by exhaustive matching — there is no lookup of component
//! names at render time, and an unknown tag is rejected during parsing.

use serde::{Deserialize, Serialize};

use crate::completion::{ChatMessage, Completer};
use crate::result::{ActionError, ActionResult};

/// The closed set of renderable sections, tagged the way the mapping step is
/// asked to emit them: `{"component": "Hero", "props": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "component", content = "props")]
pub enum Section {
    Hero(HeroProps),
    ValueProposition(ValuePropositionProps),
    Features(FeaturesProps),
    Testimonials(TestimonialsProps),
    CallToAction(CallToActionProps),
    Pricing(PricingProps),
    #[serde(rename = "FAQ")]
    Faq(FaqProps),
    Footer(FooterProps),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeroProps {
    pub headline: String,
    #[serde(default)]
    pub subheadline: Option<String>,
    #[serde(default)]
    pub primary_button_text: Option<String>,
    #[serde(default)]
    pub primary_button_link: Option<String>,
    #[serde(default)]
    pub secondary_button_text: Option<String>,
    #[serde(default)]
    pub secondary_button_link: Option<String>,
    #[serde(default)]
    pub background_image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValuePropositionProps {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeaturesProps {
    pub title: String,
    #[serde(default)]
    pub features: Vec<FeatureItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureItem {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestimonialsProps {
    pub title: String,
    #[serde(default)]
    pub testimonials: Vec<TestimonialItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestimonialItem {
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
    pub quote: String,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToActionProps {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub button_text: Option<String>,
    #[serde(default)]
    pub button_link: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingProps {
    pub title: String,
    #[serde(default)]
    pub plans: Vec<PricingPlan>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingPlan {
    pub name: String,
    pub price: String,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub button_text: Option<String>,
    #[serde(default)]
    pub button_link: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaqProps {
    pub title: String,
    #[serde(default)]
    pub questions: Vec<FaqItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaqItem {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FooterProps {
    #[serde(default)]
    pub links: Vec<FooterLink>,
    #[serde(default)]
    pub social_media: Vec<SocialLink>,
    #[serde(default)]
    pub copyright_text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FooterLink {
    pub text: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialLink {
    pub platform: String,
    pub url: String,
}

/// Ordered sections plus the rendered page.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedLandingPage {
    pub components: Vec<Section>,
    pub html: String,
}

#[derive(Deserialize)]
struct MappedPage {
    components: Vec<Section>,
}

const AVAILABLE_COMPONENTS: &str = "Components and Props:\n\
- Hero: { headline, subheadline, primaryButtonText, primaryButtonLink, secondaryButtonText, secondaryButtonLink, backgroundImage }\n\
- ValueProposition: { title, description, features, icon }\n\
- Features: { title, features: [{ title, description, icon }] }\n\
- Testimonials: { title, testimonials: [{ name, role, quote, image }] }\n\
- CallToAction: { title, description, buttonText, buttonLink }\n\
- Pricing: { title, plans: [{ name, price, features, buttonText, buttonLink }] }\n\
- FAQ: { title, questions: [{ question, answer }] }\n\
- Footer: { links: [{ text, url }], socialMedia: [{ platform, url }], copyrightText }";

/// Generate a landing page for a business description.
pub async fn generate_landing_page(
    completer: &dyn Completer,
    description: &str,
) -> ActionResult<GeneratedLandingPage> {
    if description.trim().is_empty() {
        return Err(ActionError::validation("Business description is required"));
    }

    // Step 1: draft the copy
    let copy_prompt = vec![
        ChatMessage::system(
            "You are a landing page expert that generates optimized landing page content in \
             markdown format. Focus on compelling copy that converts.",
        ),
        ChatMessage::user(format!(
            "Generate optimized landing page content for the following business description: {}. \
             Include sections for headline, subheadline, value proposition, features, \
             testimonials, and call-to-action. The content should be conversion-focused and \
             persuasive.",
            description
        )),
    ];
    let markdown = completer
        .complete(&copy_prompt)
        .await
        .map_err(|e| ActionError::collaborator(format!("content generation failed: {}", e)))?;
    if markdown.trim().is_empty() {
        return Err(ActionError::collaborator("No content generated"));
    }

    // Step 2: map the copy onto the section registry
    let mapping_prompt = vec![
        ChatMessage::system(
            "You are a landing page generator. Your task is to map markdown content to page \
             sections and their props, returning a structured JSON output. Respond with JSON \
             only, no prose.",
        ),
        ChatMessage::user(format!(
            "Based on the following markdown content, generate a landing page by mapping it to \
             the provided list of sections and their props.\n\nContent:\n{}\n\n{}\n\n\
             Output Format:\n{{\n  \"components\": [\n    {{\n      \"component\": \
             \"ComponentName\",\n      \"props\": {{ ... }}\n    }}\n  ]\n}}",
            markdown, AVAILABLE_COMPONENTS
        )),
    ];
    let mapped = completer
        .complete(&mapping_prompt)
        .await
        .map_err(|e| ActionError::collaborator(format!("section mapping failed: {}", e)))?;

    let components = parse_sections(&mapped)?;
    let html = render_html(&components);

    Ok(GeneratedLandingPage { components, html })
}

/// Parse the mapping step's JSON. Tolerates a markdown code fence around the
/// payload. An unknown component tag is a validation failure; anything else
/// malformed is the collaborator's.
pub fn parse_sections(raw: &str) -> ActionResult<Vec<Section>> {
    let json = strip_code_fence(raw);
    match serde_json::from_str::<MappedPage>(json) {
        Ok(page) => Ok(page.components),
        Err(e) if e.to_string().contains("unknown variant") => Err(ActionError::validation(
            format!("unknown landing page component: {}", e),
        )),
        Err(e) => Err(ActionError::collaborator(format!(
            "landing page mapping was not valid JSON: {}",
            e
        ))),
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim_start_matches('\n')
        .strip_suffix("```")
        .unwrap_or(rest)
        .trim()
}

/// Render the page. Every section kind is matched exhaustively — adding a
/// variant without a renderer is a compile error.
pub fn render_html(sections: &[Section]) -> String {
    let mut out = String::from("<main>\n");
    for section in sections {
        match section {
            Section::Hero(p) => render_hero(&mut out, p),
            Section::ValueProposition(p) => render_value_proposition(&mut out, p),
            Section::Features(p) => render_features(&mut out, p),
            Section::Testimonials(p) => render_testimonials(&mut out, p),
            Section::CallToAction(p) => render_call_to_action(&mut out, p),
            Section::Pricing(p) => render_pricing(&mut out, p),
            Section::Faq(p) => render_faq(&mut out, p),
            Section::Footer(p) => render_footer(&mut out, p),
        }
    }
    out.push_str("</main>\n");
    out
}

fn esc(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn render_hero(out: &mut String, p: &HeroProps) {
    out.push_str("<section class=\"hero\">\n");
    out.push_str(&format!("  <h1>{}</h1>\n", esc(&p.headline)));
    if let Some(sub) = &p.subheadline {
        out.push_str(&format!("  <p>{}</p>\n", esc(sub)));
    }
    if let (Some(text), Some(link)) = (&p.primary_button_text, &p.primary_button_link) {
        out.push_str(&format!(
            "  <a class=\"button primary\" href=\"{}\">{}</a>\n",
            esc(link),
            esc(text)
        ));
    }
    if let (Some(text), Some(link)) = (&p.secondary_button_text, &p.secondary_button_link) {
        out.push_str(&format!(
            "  <a class=\"button secondary\" href=\"{}\">{}</a>\n",
            esc(link),
            esc(text)
        ));
    }
    out.push_str("</section>\n");
}

fn render_value_proposition(out: &mut String, p: &ValuePropositionProps) {
    out.push_str("<section class=\"value-proposition\">\n");
    out.push_str(&format!("  <h2>{}</h2>\n", esc(&p.title)));
    if let Some(desc) = &p.description {
        out.push_str(&format!("  <p>{}</p>\n", esc(desc)));
    }
    if !p.features.is_empty() {
        out.push_str("  <ul>\n");
        for feature in &p.features {
            out.push_str(&format!("    <li>{}</li>\n", esc(feature)));
        }
        out.push_str("  </ul>\n");
    }
    out.push_str("</section>\n");
}

fn render_features(out: &mut String, p: &FeaturesProps) {
    out.push_str("<section class=\"features\">\n");
    out.push_str(&format!("  <h2>{}</h2>\n", esc(&p.title)));
    for feature in &p.features {
        out.push_str("  <article>\n");
        out.push_str(&format!("    <h3>{}</h3>\n", esc(&feature.title)));
        if let Some(desc) = &feature.description {
            out.push_str(&format!("    <p>{}</p>\n", esc(desc)));
        }
        out.push_str("  </article>\n");
    }
    out.push_str("</section>\n");
}

fn render_testimonials(out: &mut String, p: &TestimonialsProps) {
    out.push_str("<section class=\"testimonials\">\n");
    out.push_str(&format!("  <h2>{}</h2>\n", esc(&p.title)));
    for t in &p.testimonials {
        out.push_str("  <blockquote>\n");
        out.push_str(&format!("    <p>{}</p>\n", esc(&t.quote)));
        let attribution = match &t.role {
            Some(role) => format!("{}, {}", t.name, role),
            None => t.name.clone(),
        };
        out.push_str(&format!("    <cite>{}</cite>\n", esc(&attribution)));
        out.push_str("  </blockquote>\n");
    }
    out.push_str("</section>\n");
}

fn render_call_to_action(out: &mut String, p: &CallToActionProps) {
    out.push_str("<section class=\"call-to-action\">\n");
    out.push_str(&format!("  <h2>{}</h2>\n", esc(&p.title)));
    if let Some(desc) = &p.description {
        out.push_str(&format!("  <p>{}</p>\n", esc(desc)));
    }
    if let (Some(text), Some(link)) = (&p.button_text, &p.button_link) {
        out.push_str(&format!(
            "  <a class=\"button primary\" href=\"{}\">{}</a>\n",
            esc(link),
            esc(text)
        ));
    }
    out.push_str("</section>\n");
}

fn render_pricing(out: &mut String, p: &PricingProps) {
    out.push_str("<section class=\"pricing\">\n");
    out.push_str(&format!("  <h2>{}</h2>\n", esc(&p.title)));
    for plan in &p.plans {
        out.push_str("  <article>\n");
        out.push_str(&format!("    <h3>{}</h3>\n", esc(&plan.name)));
        out.push_str(&format!("    <p class=\"price\">{}</p>\n", esc(&plan.price)));
        if !plan.features.is_empty() {
            out.push_str("    <ul>\n");
            for feature in &plan.features {
                out.push_str(&format!("      <li>{}</li>\n", esc(feature)));
            }
            out.push_str("    </ul>\n");
        }
        out.push_str("  </article>\n");
    }
    out.push_str("</section>\n");
}

fn render_faq(out: &mut String, p: &FaqProps) {
    out.push_str("<section class=\"faq\">\n");
    out.push_str(&format!("  <h2>{}</h2>\n", esc(&p.title)));
    for q in &p.questions {
        out.push_str("  <details>\n");
        out.push_str(&format!("    <summary>{}</summary>\n", esc(&q.question)));
        out.push_str(&format!("    <p>{}</p>\n", esc(&q.answer)));
        out.push_str("  </details>\n");
    }
    out.push_str("</section>\n");
}

fn render_footer(out: &mut String, p: &FooterProps) {
    out.push_str("<footer>\n");
    if !p.links.is_empty() {
        out.push_str("  <nav>\n");
        for link in &p.links {
            out.push_str(&format!(
                "    <a href=\"{}\">{}</a>\n",
                esc(&link.url),
                esc(&link.text)
            ));
        }
        out.push_str("  </nav>\n");
    }
    for social in &p.social_media {
        out.push_str(&format!(
            "  <a rel=\"me\" href=\"{}\">{}</a>\n",
            esc(&social.url),
            esc(&social.platform)
        ));
    }
    if let Some(copyright) = &p.copyright_text {
        out.push_str(&format!("  <small>{}</small>\n", esc(copyright)));
    }
    out.push_str("</footer>\n");
}
