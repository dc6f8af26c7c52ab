use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;
use url::Url;

use crate::domain::models::{ImageInfo, PageContent};

/// Internal/external anchor tallies for one page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkCounts {
    pub internal: u32,
    pub external: u32,
}

fn cached(cell: &'static OnceLock<Selector>, css: &str) -> &'static Selector {
    cell.get_or_init(|| Selector::parse(css).expect("static selector must parse"))
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Pulls SEO signals out of a parsed document. Works the same on raw
/// server HTML and on a serialized post-JavaScript DOM.
pub struct PageExtractor;

impl PageExtractor {
    pub fn extract(html: &Html, page_url: &Url) -> PageContent {
        let links = Self::count_links(html, page_url);
        PageContent {
            title: Self::extract_title(html),
            meta_description: Self::extract_meta_description(html),
            h1_tags: Self::extract_h1(html),
            h2_tags: Self::extract_h2(html),
            images: Self::extract_images(html),
            internal_links: links.internal,
            external_links: links.external,
        }
    }

    pub fn extract_title(html: &Html) -> Option<String> {
        static SELECTOR: OnceLock<Selector> = OnceLock::new();
        html.select(cached(&SELECTOR, "title"))
            .next()
            .map(element_text)
            .filter(|s| !s.is_empty())
    }

    pub fn extract_meta_description(html: &Html) -> Option<String> {
        static SELECTOR: OnceLock<Selector> = OnceLock::new();
        html.select(cached(&SELECTOR, "meta[name='description']"))
            .next()
            .and_then(|el| el.value().attr("content"))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    pub fn extract_h1(html: &Html) -> Vec<String> {
        static SELECTOR: OnceLock<Selector> = OnceLock::new();
        Self::heading_texts(html, cached(&SELECTOR, "h1"))
    }

    pub fn extract_h2(html: &Html) -> Vec<String> {
        static SELECTOR: OnceLock<Selector> = OnceLock::new();
        Self::heading_texts(html, cached(&SELECTOR, "h2"))
    }

    fn heading_texts(html: &Html, selector: &Selector) -> Vec<String> {
        html.select(selector)
            .map(element_text)
            .filter(|text| !text.is_empty())
            .collect()
    }

    /// Images with a non-empty `src`. `src` is kept as written in the page.
    pub fn extract_images(html: &Html) -> Vec<ImageInfo> {
        static SELECTOR: OnceLock<Selector> = OnceLock::new();

        html.select(cached(&SELECTOR, "img"))
            .filter_map(|element| {
                let src = element.value().attr("src")?;
                if src.is_empty() {
                    return None;
                }
                let alt = element
                    .value()
                    .attr("alt")
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty());

                Some(ImageInfo {
                    src: src.to_string(),
                    alt,
                })
            })
            .collect()
    }

    /// Anchors whose href fails to resolve count as internal (relative).
    pub fn count_links(html: &Html, page_url: &Url) -> LinkCounts {
        static SELECTOR: OnceLock<Selector> = OnceLock::new();
        let base_host = page_url.host_str();
        let mut counts = LinkCounts::default();

        for element in html.select(cached(&SELECTOR, "a[href]")) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            if href.is_empty() {
                continue;
            }

            let is_internal = match page_url.join(href) {
                Ok(resolved) => resolved.host_str() == base_host,
                Err(_) => true,
            };

            if is_internal {
                counts.internal += 1;
            } else {
                counts.external += 1;
            }
        }

        counts
    }
}
