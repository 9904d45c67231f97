use ego_tree::NodeRef;
use harvest_logging::harvest_debug;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use url::Url;

pub const DEFAULT_MAX_SECTION_IMAGES: usize = 16;
const MAX_CONTEXT_CHARS: usize = 160;

/// Component-section headings, in matching priority:
/// English, French, German, Spanish, Italian.
pub const COMPONENT_HEADINGS: &[&str] = &[
    "components",
    "game components",
    "component list",
    "box contents",
    "what's in the box",
    "in the box",
    "contents",
    "matériel",
    "materiel",
    "composants",
    "contenu de la boîte",
    "contenu",
    "spielmaterial",
    "spielinhalt",
    "material",
    "inhalt",
    "componentes",
    "contenido",
    "componenti",
    "materiali",
    "contenuto",
];

/// An image found under a component heading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionImage {
    pub url: String,
    pub alt_text: Option<String>,
    /// Figcaption or enclosing block text.
    pub context: Option<String>,
    /// Ordinal of the sibling block after the heading (first block = 0).
    pub section_distance: u32,
    pub width_hint: Option<u32>,
    pub height_hint: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct SectionLocator {
    synonyms: Vec<String>,
}

impl Default for SectionLocator {
    fn default() -> Self {
        Self::with_synonyms(COMPONENT_HEADINGS.iter().copied())
    }
}

impl SectionLocator {
    pub fn with_synonyms<I, S>(synonyms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            synonyms: synonyms
                .into_iter()
                .map(|s| s.as_ref().trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// The component heading: first synonym with any match wins, then the
    /// first such heading in document order.
    pub fn locate<'a>(&self, document: &'a Html) -> Option<ElementRef<'a>> {
        let selector = Selector::parse("h1, h2, h3, h4, h5, h6").ok()?;
        let headings: Vec<(ElementRef<'a>, String)> = document
            .select(&selector)
            .filter(|heading| !in_table_of_contents(*heading))
            .map(|heading| {
                let text = heading_text(heading);
                (heading, text)
            })
            .collect();
        self.synonyms.iter().find_map(|synonym| {
            headings
                .iter()
                .find(|(_, text)| matches_synonym(text, synonym))
                .map(|(heading, _)| *heading)
        })
    }

    /// Images between `heading` and the next heading of equal or higher rank.
    pub fn collect(
        &self,
        heading: ElementRef<'_>,
        max_count: usize,
        base_url: Option<&Url>,
    ) -> Vec<SectionImage> {
        let Some(level) = heading_level(heading) else {
            return Vec::new();
        };
        let mut walk = Walk {
            level,
            max_count,
            base_url,
            images: Vec::new(),
            stopped: false,
        };

        let anchor = section_anchor(heading);
        for (distance, sibling) in anchor
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .enumerate()
        {
            walk.visit(*sibling, distance as u32);
            if walk.finished() {
                break;
            }
        }
        walk.images
    }
}

/// Parses `html`, locates the component heading and collects its images.
/// A page without such a heading contributes nothing.
pub fn extract_section_images(
    locator: &SectionLocator,
    html: &str,
    page_url: &str,
    max_count: usize,
) -> Vec<SectionImage> {
    let document = Html::parse_document(html);
    let base_url = Url::parse(page_url).ok();
    match locator.locate(&document) {
        Some(heading) => locator.collect(heading, max_count, base_url.as_ref()),
        None => {
            harvest_debug!("no component heading on {}", page_url);
            Vec::new()
        }
    }
}

pub fn heading_level(element: ElementRef<'_>) -> Option<u8> {
    match element.value().name() {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

fn heading_text(heading: ElementRef<'_>) -> String {
    let text = collapse_whitespace(&heading.text().collect::<String>()).to_lowercase();
    text.trim_end_matches(':').trim_end().to_string()
}

/// Exact match, or the synonym followed by a non-word character
/// ("components (2nd edition)", but not "inhaltsverzeichnis").
fn matches_synonym(text: &str, synonym: &str) -> bool {
    match text.strip_prefix(synonym) {
        Some(rest) => rest.chars().next().map_or(true, |c| !c.is_alphanumeric()),
        None => false,
    }
}

fn in_table_of_contents(heading: ElementRef<'_>) -> bool {
    let is_toc = |element: &scraper::node::Element| {
        let toc_name =
            |name: &str| name == "toc" || name.starts_with("mw-toc") || name.ends_with("-toc");
        element.id().is_some_and(toc_name) || element.classes().any(toc_name)
    };
    is_toc(heading.value())
        || heading
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|ancestor| is_toc(ancestor.value()))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Headings wrapped alone in a container (`<div class="heading"><h2>`) are
/// walked from the container.
fn section_anchor(heading: ElementRef<'_>) -> ElementRef<'_> {
    let mut anchor = heading;
    for _ in 0..3 {
        let Some(parent) = anchor.parent().and_then(ElementRef::wrap) else {
            break;
        };
        if matches!(parent.value().name(), "body" | "html" | "main" | "article" | "section") {
            break;
        }
        if parent.children().filter_map(ElementRef::wrap).count() != 1 {
            break;
        }
        anchor = parent;
    }
    anchor
}

struct Walk<'u> {
    level: u8,
    max_count: usize,
    base_url: Option<&'u Url>,
    images: Vec<SectionImage>,
    stopped: bool,
}

impl Walk<'_> {
    fn finished(&self) -> bool {
        self.stopped || self.images.len() >= self.max_count
    }

    fn visit(&mut self, node: NodeRef<'_, Node>, distance: u32) {
        if self.finished() {
            return;
        }
        let Some(element) = ElementRef::wrap(node) else {
            return;
        };
        let name = element.value().name();
        if matches!(name, "script" | "style" | "template" | "noscript") {
            return;
        }
        if heading_level(element).is_some_and(|l| l <= self.level) {
            self.stopped = true;
            return;
        }
        if name == "img" {
            if let Some(image) = self.image(element, distance) {
                self.images.push(image);
            }
            return;
        }
        for child in element.children() {
            self.visit(child, distance);
        }
    }

    fn image(&self, img: ElementRef<'_>, distance: u32) -> Option<SectionImage> {
        let attrs = img.value();
        let raw = attrs
            .attr("src")
            .filter(|src| !src.trim().is_empty() && !src.trim_start().starts_with("data:"))
            .or_else(|| attrs.attr("data-src"))
            .or_else(|| attrs.attr("data-lazy-src"))
            .or_else(|| {
                attrs
                    .attr("srcset")
                    .and_then(|set| set.split(',').next())
                    .and_then(|entry| entry.split_whitespace().next())
            })?;
        let url = resolve_url(raw, self.base_url)?;
        let alt_text = attrs
            .attr("alt")
            .or_else(|| attrs.attr("title"))
            .map(collapse_whitespace)
            .filter(|alt| !alt.is_empty());
        Some(SectionImage {
            url: url.into(),
            alt_text,
            context: context_for(img),
            section_distance: distance,
            width_hint: attrs.attr("width").and_then(parse_dimension),
            height_hint: attrs.attr("height").and_then(parse_dimension),
        })
    }
}

fn parse_dimension(raw: &str) -> Option<u32> {
    raw.trim().trim_end_matches("px").parse().ok()
}

/// Caption of the enclosing figure, or the text of the nearest block around the image.
fn context_for(img: ElementRef<'_>) -> Option<String> {
    for ancestor in img.ancestors().filter_map(ElementRef::wrap).take(4) {
        let name = ancestor.value().name();
        if name == "figure" {
            let caption = ancestor
                .children()
                .filter_map(ElementRef::wrap)
                .find(|child| child.value().name() == "figcaption")
                .map(|caption| collapse_whitespace(&caption.text().collect::<String>()));
            if let Some(caption) = caption.filter(|c| !c.is_empty()) {
                return Some(truncate(caption));
            }
        }
        if matches!(name, "li" | "p" | "td" | "dd" | "figure" | "div" | "a") {
            let text = collapse_whitespace(&ancestor.text().collect::<String>());
            if !text.is_empty() {
                return Some(truncate(text));
            }
        }
    }
    None
}

fn truncate(mut text: String) -> String {
    if let Some((cut, _)) = text.char_indices().nth(MAX_CONTEXT_CHARS) {
        text.truncate(cut);
    }
    text
}

fn resolve_url(reference: &str, base: Option<&Url>) -> Option<Url> {
    let trimmed = reference.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with('#') || lower.starts_with("javascript:") || lower.starts_with("data:") {
        return None;
    }
    if let Ok(url) = Url::parse(trimmed) {
        return Some(url);
    }
    base.and_then(|base| base.join(trimmed).ok())
}
