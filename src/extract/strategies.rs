use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

/// Raw output of one strategy, before the acceptance threshold is applied.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Candidate {
    pub text: String,
    pub title: String,
}

const HIDDEN_TAGS: &[&str] = &["script", "style", "noscript", "template", "svg", "iframe"];

// Wayback Machine toolbar containers.
const HIDDEN_IDS: &[&str] = &["wm-ipp-base", "wm-ipp", "wm-ipp-print", "donato"];

const CONTENT_SELECTORS: &[&str] = &[
    "article",
    "main",
    ".content",
    "#content",
    ".post",
    ".article",
    ".story",
    ".entry-content",
];

const MIN_PARAGRAPH_CHARS: usize = 25;

fn boilerplate_hint() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)comment|footer|foot|nav|sidebar|menu|share|social|related|promo|advert|cookie|banner|masthead|breadcrumb|subscribe|newsletter",
        )
        .expect("boilerplate pattern is valid")
    })
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn compact_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(el: ElementRef<'_>) -> String {
    compact_ws(&el.text().collect::<String>())
}

fn is_hidden(el: &ElementRef<'_>) -> bool {
    let value = el.value();
    HIDDEN_TAGS.contains(&value.name()) || value.id().is_some_and(|id| HIDDEN_IDS.contains(&id))
}

fn is_boilerplate(el: &ElementRef<'_>) -> bool {
    let value = el.value();
    if matches!(value.name(), "nav" | "footer" | "header" | "aside" | "form") {
        return true;
    }
    let hint = boilerplate_hint();
    value.id().is_some_and(|id| hint.is_match(id))
        || value.classes().any(|class| hint.is_match(class))
}

/// Visible text under `root`, one line per text node, skipping scripts,
/// styles and archive toolbars.
pub(crate) fn visible_text(root: ElementRef<'_>) -> String {
    let mut lines = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|el| is_hidden(&el));
        if hidden {
            continue;
        }
        let line = compact_ws(text);
        if !line.is_empty() {
            lines.push(line);
        }
    }
    lines.join("\n")
}

pub(crate) fn document_title(document: &Html) -> String {
    selector("title")
        .and_then(|sel| document.select(&sel).next())
        .map(element_text)
        .unwrap_or_default()
}

fn meta_content(document: &Html, css: &str) -> Option<String> {
    let sel = selector(css)?;
    document
        .select(&sel)
        .filter_map(|el| el.value().attr("content"))
        .map(compact_ws)
        .find(|s| !s.is_empty())
}

fn headline(document: &Html) -> String {
    meta_content(document, r#"meta[property="og:title"]"#)
        .or_else(|| {
            selector("h1")
                .and_then(|sel| document.select(&sel).next())
                .map(element_text)
                .filter(|s| !s.is_empty())
        })
        .unwrap_or_else(|| document_title(document))
}

fn find_article_body(value: &Value) -> Option<(String, String)> {
    match value {
        Value::Array(items) => items.iter().find_map(find_article_body),
        Value::Object(map) => {
            if let Some(body) = map.get("articleBody").and_then(Value::as_str) {
                let title = map
                    .get("headline")
                    .or_else(|| map.get("name"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                return Some((body.to_string(), title.to_string()));
            }
            map.get("@graph").and_then(find_article_body)
        }
        _ => None,
    }
}

/// Structured-article parser: JSON-LD `articleBody` first, then the
/// paragraphs of the first `<article>` element.
pub(crate) fn structured_article(document: &Html) -> Option<Candidate> {
    if let Some(sel) = selector(r#"script[type="application/ld+json"]"#) {
        for script in document.select(&sel) {
            let raw = script.text().collect::<String>();
            let Ok(json) = serde_json::from_str::<Value>(&raw) else {
                continue;
            };
            if let Some((body, title)) = find_article_body(&json) {
                let title = if title.trim().is_empty() {
                    headline(document)
                } else {
                    compact_ws(&title)
                };
                return Some(Candidate { text: body, title });
            }
        }
    }

    let article = document.select(&selector("article")?).next()?;
    let block_sel = selector("p, h2, h3, li, blockquote, pre")?;
    let blocks: Vec<String> = article
        .select(&block_sel)
        .filter(|el| !el.ancestors().filter_map(ElementRef::wrap).any(|a| is_boilerplate(&a)))
        .map(element_text)
        .filter(|t| !t.is_empty())
        .collect();

    if blocks.is_empty() {
        return None;
    }

    Some(Candidate {
        text: blocks.join("\n\n"),
        title: headline(document),
    })
}

/// Boilerplate stripper: picks the container whose direct paragraphs carry
/// the most text, ignoring navigation, comments and similar chrome.
pub(crate) fn readability(document: &Html) -> Option<Candidate> {
    let containers = selector("article, main, section, div, td")?;
    let mut best: Option<(f64, ElementRef<'_>)> = None;

    for el in document.select(&containers) {
        if is_boilerplate(&el) || el.ancestors().filter_map(ElementRef::wrap).any(|a| is_boilerplate(&a)) {
            continue;
        }

        let mut score = 0.0;
        for child in el.children().filter_map(ElementRef::wrap) {
            if child.value().name() != "p" {
                continue;
            }
            let text = element_text(child);
            let len = text.chars().count();
            if len < MIN_PARAGRAPH_CHARS {
                continue;
            }
            score += 1.0 + text.matches(',').count() as f64 + (len as f64 / 100.0).min(3.0);
        }

        if score > 0.0 && best.as_ref().map_or(true, |(s, _)| score > *s) {
            best = Some((score, el));
        }
    }

    let (_, root) = best?;
    let paragraph = selector("p")?;
    let root_id = root.id();
    let paragraphs: Vec<String> = root
        .select(&paragraph)
        .filter(|p| {
            !p.ancestors()
                .take_while(|n| n.id() != root_id)
                .filter_map(ElementRef::wrap)
                .any(|a| is_boilerplate(&a))
        })
        .map(element_text)
        .filter(|t| !t.is_empty())
        .collect();

    Some(Candidate {
        text: paragraphs.join("\n\n"),
        title: document_title(document),
    })
}

/// Generic scraping: first element matching a known content selector,
/// else the whole body.
pub(crate) fn content_selectors(document: &Html) -> Option<Candidate> {
    let root = CONTENT_SELECTORS
        .iter()
        .filter_map(|css| selector(css))
        .find_map(|sel| document.select(&sel).next())
        .or_else(|| selector("body").and_then(|sel| document.select(&sel).next()))
        .unwrap_or_else(|| document.root_element());

    Some(Candidate {
        text: visible_text(root),
        title: document_title(document),
    })
}

/// Whole page rendered to text.
pub(crate) fn full_page(document: &Html, html: &str) -> Option<Candidate> {
    let text = match html2text::from_read(html.as_bytes(), 80) {
        Ok(t) => t,
        Err(e) => {
            tracing::debug!("Failed to convert HTML to text: {}", e);
            return None;
        }
    };

    // Clean up the text - remove excessive whitespace
    let cleaned: String = text
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    Some(Candidate {
        text: cleaned,
        title: document_title(document),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILLER: &str = "Lorem ipsum dolor sit amet, consectetur adipiscing elit, sed do eiusmod tempor.";

    #[test]
    fn json_ld_article_body_is_preferred() {
        let html = format!(
            r#"<html><head>
                <script type="application/ld+json">
                {{"@context":"https://schema.org","@graph":[{{"@type":"WebSite"}},
                  {{"@type":"NewsArticle","headline":"Structured Headline","articleBody":"{}"}}]}}
                </script></head>
                <body><article><p>Different visible text.</p></article></body></html>"#,
            FILLER
        );
        let document = Html::parse_document(&html);

        let candidate = structured_article(&document).unwrap();
        assert_eq!(candidate.title, "Structured Headline");
        assert_eq!(candidate.text, FILLER);
    }

    #[test]
    fn article_without_element_yields_nothing() {
        let document = Html::parse_document("<html><body><div><p>text</p></div></body></html>");
        assert!(structured_article(&document).is_none());
    }

    #[test]
    fn readability_prefers_dense_container_over_chrome() {
        let html = format!(
            r#"<html><head><title>Dense</title></head><body>
                <div class="sidebar"><p>{0}</p><p>{0}</p><p>{0}</p><p>{0}</p></div>
                <div id="story"><p>{0}</p><p>{0}</p><div class="share"><p>Share this on every network you know</p></div></div>
                <div><p>short</p></div>
            </body></html>"#,
            FILLER
        );
        let document = Html::parse_document(&html);

        let candidate = readability(&document).unwrap();
        assert_eq!(candidate.title, "Dense");
        assert_eq!(candidate.text, format!("{0}\n\n{0}", FILLER));
    }

    #[test]
    fn selector_strategy_skips_scripts_and_wayback_toolbar() {
        let html = r#"<html><head><title>Snap</title></head><body>
            <div id="wm-ipp-base"><div>Wayback toolbar</div></div>
            <script>var tracking = 1;</script>
            <div class="entry-content"><h2>Heading</h2><p>Body text</p></div>
        </body></html>"#;
        let document = Html::parse_document(html);

        let candidate = content_selectors(&document).unwrap();
        assert_eq!(candidate.text, "Heading\nBody text");
        assert_eq!(candidate.title, "Snap");
    }

    #[test]
    fn selector_strategy_falls_back_to_body() {
        let html = r#"<html><body><p>One</p><script>ignored()</script><p>Two</p></body></html>"#;
        let document = Html::parse_document(html);

        let candidate = content_selectors(&document).unwrap();
        assert_eq!(candidate.text, "One\nTwo");
        assert_eq!(candidate.title, "");
    }

    #[test]
    fn full_page_drops_blank_lines() {
        let html = "<html><head><title>Whole</title></head><body><p>First</p><p></p><p>Second</p></body></html>";
        let document = Html::parse_document(html);

        let candidate = full_page(&document, html).unwrap();
        assert!(candidate.text.contains("First"));
        assert!(candidate.text.contains("Second"));
        assert!(!candidate.text.contains("\n\n"));
        assert_eq!(candidate.title, "Whole");
    }
}
