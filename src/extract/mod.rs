//! Turning fetched HTML into [`RankingEntry`] records.
//!
//! # Markup
//!
//! ```text
//! div.cc-cd                      group
//! ├── div.cc-cd-lb               platform label
//! ├── span.cc-cd-sb-st           sub-list label (optional)
//! ├── div.i-h                    recorded time ("5分钟前" / "2024-05-01")
//! └── a[target=_blank][href]     one per entry
//!     ├── span.t | div.tt        title
//!     └── span.e | div.ss        hot count
//! ```
//!
//! Each page fragment is parsed on its own and the entry lists are
//! concatenated in fragment order. Within a fragment, entries follow
//! document order. Nothing here fails: an absent field becomes an empty
//! string and an unparseable recorded time becomes an empty `rectime`.

pub mod timeparse;

use crate::fetcher::DocumentBlob;
use crate::models::{RECTIME_FORMAT, RankingEntry};
use chrono::{Local, NaiveDateTime};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use timeparse::parse_recorded_time;
use tracing::{debug, info, instrument, warn};
use url::Url;

static GROUP: Lazy<Selector> = Lazy::new(|| Selector::parse("div.cc-cd").unwrap());
static PLATFORM: Lazy<Selector> = Lazy::new(|| Selector::parse("div.cc-cd-lb").unwrap());
static SUBLIST: Lazy<Selector> = Lazy::new(|| Selector::parse("span.cc-cd-sb-st").unwrap());
static RECORDED: Lazy<Selector> = Lazy::new(|| Selector::parse("div.i-h").unwrap());
static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse(r#"a[target="_blank"]"#).unwrap());
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("span.t").unwrap());
static TITLE_ALT: Lazy<Selector> = Lazy::new(|| Selector::parse("div.tt").unwrap());
static HOTCOUNT: Lazy<Selector> = Lazy::new(|| Selector::parse("span.e").unwrap());
static HOTCOUNT_ALT: Lazy<Selector> = Lazy::new(|| Selector::parse("div.ss").unwrap());

/// Entries extracted from a blob, plus how many groups had a bad time.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtractOutput {
    pub entries: Vec<RankingEntry>,
    pub time_failures: usize,
}

impl ExtractOutput {
    fn append(&mut self, other: ExtractOutput) {
        self.entries.extend(other.entries);
        self.time_failures += other.time_failures;
    }
}

#[derive(Debug, Clone)]
pub struct Extractor {
    origin: Url,
}

impl Extractor {
    /// `origin` is what relative hrefs are resolved against.
    pub fn new(origin: Url) -> Self {
        Self { origin }
    }

    /// Extract entries, resolving relative times against the local clock.
    pub fn extract(&self, blob: &DocumentBlob) -> ExtractOutput {
        self.extract_at(blob, Local::now().naive_local())
    }

    /// Extract entries from every fragment of `blob`, in fragment order.
    ///
    /// # Arguments
    ///
    /// * `blob` - Fetch result; diagnostic fragments parse to nothing
    /// * `now` - Reference time for relative stamps like `5分钟前`
    ///
    /// # Returns
    ///
    /// All entries plus the number of groups whose time could not be parsed.
    /// Malformed markup never fails; missing fields come back empty.
    #[instrument(level = "info", skip_all, fields(fragments = blob.len()))]
    pub fn extract_at(&self, blob: &DocumentBlob, now: NaiveDateTime) -> ExtractOutput {
        let mut out = ExtractOutput::default();
        for fragment in blob.fragments() {
            out.append(self.extract_html(fragment.text(), now));
        }
        info!(
            entries = out.entries.len(),
            time_failures = out.time_failures,
            "Extracted ranking entries"
        );
        out
    }

    /// Parse `html` as a single document, however many documents it holds.
    pub fn extract_html(&self, html: &str, now: NaiveDateTime) -> ExtractOutput {
        let document = Html::parse_document(html);
        let mut out = ExtractOutput::default();

        for group in document.select(&GROUP) {
            let platform = find_text(group, &PLATFORM);
            let slist = find_text(group, &SUBLIST);
            let rectime = match find_text(group, &RECORDED) {
                None => None,
                Some(text) => match parse_recorded_time(&text, now) {
                    Ok(t) => Some(t),
                    Err(e) => {
                        warn!(platform = ?platform, error = %e, "Unparseable recorded time; leaving rectime empty");
                        out.time_failures += 1;
                        None
                    }
                },
            };
            let rectime = rectime
                .map(|t| t.format(RECTIME_FORMAT).to_string())
                .unwrap_or_default();

            for anchor in group.select(&ANCHOR) {
                let title = find_text(anchor, &TITLE).or_else(|| find_text(anchor, &TITLE_ALT));
                let hotcount =
                    find_text(anchor, &HOTCOUNT).or_else(|| find_text(anchor, &HOTCOUNT_ALT));
                let link = anchor
                    .value()
                    .attr("href")
                    .filter(|href| !href.is_empty())
                    .map(|href| self.resolve(href));

                out.entries.push(RankingEntry {
                    title: title.unwrap_or_default(),
                    link: link.unwrap_or_default(),
                    hotcount: hotcount.unwrap_or_default(),
                    platform: platform.clone().unwrap_or_default(),
                    slist: slist.clone().unwrap_or_default(),
                    rectime: rectime.clone(),
                });
            }
        }

        debug!(entries = out.entries.len(), "Parsed fragment");
        out
    }

    /// Absolute hrefs come back verbatim; anything else gets the origin
    /// prefixed as plain text, without re-encoding.
    fn resolve(&self, href: &str) -> String {
        if Url::parse(href).is_ok() {
            return href.to_string();
        }
        let origin = self.origin.as_str().trim_end_matches('/');
        if href.starts_with('/') {
            format!("{origin}{href}")
        } else {
            format!("{origin}/{href}")
        }
    }
}

/// Trimmed text of the first descendant matching `selector`; `None` when
/// there is no match or the text is blank.
fn find_text(parent: ElementRef<'_>, selector: &Selector) -> Option<String> {
    parent
        .select(selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::Fragment;

    const GROUP_HTML: &str = r#"
    <div class="cc-cd">
        <div class="cc-cd-lb">Platform</div>
        <span class="cc-cd-sb-st">List</span>
        <div class="i-h">5分钟前</div>
        <a target="_blank" href="/link1">
            <span class="t">Title 1</span>
            <span class="e">100</span>
        </a>
        <a target="_blank" href="/link2">
            <span class="t">Title 2</span>
            <span class="e">200</span>
        </a>
    </div>
    "#;

    fn extractor() -> Extractor {
        Extractor::new(Url::parse("https://tophub.today").unwrap())
    }

    fn now() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2024-05-20 12:00:30", RECTIME_FORMAT).unwrap()
    }

    #[test]
    fn test_extracts_group_entries_in_order() {
        let out = extractor().extract_html(GROUP_HTML, now());
        assert_eq!(out.time_failures, 0);
        assert_eq!(
            out.entries,
            vec![
                RankingEntry {
                    title: "Title 1".to_string(),
                    link: "https://tophub.today/link1".to_string(),
                    hotcount: "100".to_string(),
                    platform: "Platform".to_string(),
                    slist: "List".to_string(),
                    rectime: "2024-05-20 11:55:30".to_string(),
                },
                RankingEntry {
                    title: "Title 2".to_string(),
                    link: "https://tophub.today/link2".to_string(),
                    hotcount: "200".to_string(),
                    platform: "Platform".to_string(),
                    slist: "List".to_string(),
                    rectime: "2024-05-20 11:55:30".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_fallback_fields_and_missing_values() {
        let html = r#"
        <div class="cc-cd">
            <div class="cc-cd-lb">微博</div>
            <a target="_blank" href="https://s.weibo.com/x">
                <div class="tt">Alt title</div>
                <div class="ss">9万</div>
            </a>
            <a target="_blank"></a>
        </div>"#;
        let out = extractor().extract_html(html, now());
        assert_eq!(out.entries.len(), 2);

        let first = &out.entries[0];
        assert_eq!(first.title, "Alt title");
        assert_eq!(first.hotcount, "9万");
        assert_eq!(first.link, "https://s.weibo.com/x");
        assert_eq!(first.slist, "");
        assert_eq!(first.rectime, "");

        let second = &out.entries[1];
        assert_eq!(second.title, "");
        assert_eq!(second.link, "");
        assert_eq!(second.hotcount, "");
        assert_eq!(second.platform, "微博");
    }

    #[test]
    fn test_links_are_not_reencoded() {
        let html = r#"
        <div class="cc-cd">
            <div class="cc-cd-lb">微博</div>
            <a target="_blank" href="https://s.weibo.com/weibo?q=#热搜#"><span class="t">a</span></a>
            <a target="_blank" href="https://WWW.Zhihu.com"><span class="t">b</span></a>
            <a target="_blank" href="/n/KqndgxeLl9?x=中文 y"><span class="t">c</span></a>
            <a target="_blank" href="n/rel"><span class="t">d</span></a>
        </div>"#;
        let out = extractor().extract_html(html, now());
        let links: Vec<&str> = out.entries.iter().map(|e| e.link.as_str()).collect();
        assert_eq!(
            links,
            [
                "https://s.weibo.com/weibo?q=#热搜#",
                "https://WWW.Zhihu.com",
                "https://tophub.today/n/KqndgxeLl9?x=中文 y",
                "https://tophub.today/n/rel",
            ]
        );
    }

    #[test]
    fn test_bad_time_keeps_entries() {
        let html = GROUP_HTML.replace("5分钟前", "刚刚前");
        let out = extractor().extract_html(&html, now());
        assert_eq!(out.time_failures, 1);
        assert_eq!(out.entries.len(), 2);
        assert!(out.entries.iter().all(|e| e.rectime.is_empty()));
        assert_eq!(out.entries[0].title, "Title 1");
    }

    #[test]
    fn test_group_labels_stay_with_their_anchors() {
        let html = format!(
            "{}{}",
            GROUP_HTML,
            r#"<div class="cc-cd"><div class="cc-cd-lb">Other</div>
               <div class="i-h">2024-05-01</div>
               <a target="_blank" href="/o"><span class="t">O</span></a></div>"#
        );
        let out = extractor().extract_html(&html, now());
        assert_eq!(out.entries.len(), 3);
        assert_eq!(out.entries[2].platform, "Other");
        assert_eq!(out.entries[2].slist, "");
        assert_eq!(out.entries[2].rectime, "2024-05-01 00:00:00");
        assert!(out.entries[..2].iter().all(|e| e.platform == "Platform"));
    }

    #[test]
    fn test_concatenated_documents_parse_as_one() {
        let doc = format!("<html><body>{GROUP_HTML}</body></html>");
        let blob_text = format!("{doc}{doc}\nPage 3 generated an exception: boom");
        let out = extractor().extract_html(&blob_text, now());
        assert_eq!(out.entries.len(), 4);
    }

    #[test]
    fn test_blob_fragments_and_diagnostics() {
        let blob = DocumentBlob::from(vec![
            Fragment::Page {
                category: "news".to_string(),
                page: 0,
                body: GROUP_HTML.to_string(),
            },
            Fragment::Diagnostic("\nPage 1 generated an exception: boom".to_string()),
            Fragment::Page {
                category: "news".to_string(),
                page: 2,
                body: GROUP_HTML.replace("Title 1", "Title 3"),
            },
        ]);
        let out = extractor().extract_at(&blob, now());
        let titles: Vec<&str> = out.entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, ["Title 1", "Title 2", "Title 3", "Title 2"]);
    }

    #[test]
    fn test_garbage_never_panics() {
        for input in ["", "<<<>>>", "<div class=\"cc-cd\">", "\u{0}\u{1}", "<a target=_blank>"] {
            let out = extractor().extract_html(input, now());
            assert!(out.entries.iter().all(|e| e.title.is_empty()));
        }
    }
}
