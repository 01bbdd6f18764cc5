use regex::Regex;
use reqwest::Url;
use std::collections::HashSet;
use std::sync::LazyLock;

use super::{task_id_from_path, TaskEntry};

static TASK_ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*?\bhref\s*=\s*["']([^"']*/v2/task/[^"']*)["'][^>]*>(.*?)</a\s*>"#)
        .unwrap()
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Scrape task links out of a listing page.
///
/// Keeps document order and duplicates; drops links with an empty or blocked
/// title, links that cannot be resolved against `base`, and finished tasks.
pub fn parse_task_list(
    html: &str,
    base: &Url,
    finished: &HashSet<String>,
    blocked_titles: &[String],
) -> Vec<TaskEntry> {
    let blocked: Vec<String> = blocked_titles
        .iter()
        .map(|b| b.trim().to_lowercase())
        .filter(|b| !b.is_empty())
        .collect();

    TASK_ANCHOR_RE
        .captures_iter(html)
        .filter_map(|caps| {
            let raw_href = decode_entities(caps.get(1)?.as_str());
            let title = normalize_title(caps.get(2)?.as_str());
            if is_blocked(&title, &blocked) {
                return None;
            }
            let href = normalize_href(base, &raw_href)?;
            if task_id_from_path(&href).is_some_and(|id| finished.contains(id)) {
                return None;
            }
            Some(TaskEntry { href, title })
        })
        .collect()
}

/// Resolve `href` to an absolute URL string.
pub fn normalize_href(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    base.join(href).ok().map(String::from)
}

fn normalize_title(inner_html: &str) -> String {
    let text = TAG_RE.replace_all(inner_html, " ");
    let text = decode_entities(&text);
    SPACE_RE.replace_all(&text, " ").trim().to_string()
}

fn is_blocked(title: &str, blocked: &[String]) -> bool {
    if title.is_empty() {
        return true;
    }
    let lower = title.to_lowercase();
    blocked.iter().any(|b| lower.contains(b.as_str()))
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <ul>
            <li><a class="task" href="/v2/task/101/queue/">  Cats
                 <span class="count">(12)</span></a></li>
            <li><a href='/v2/task/102/queue/'>Dogs &amp; wolves</a></li>
            <li><a href="/v2/task/103/queue/"></a></li>
            <li><a href="/v2/tasks/">All tasks</a></li>
            <li><a href="https://other.example/v2/task/104/queue/">Remote</a></li>
            <li><a href="/v2/task/101/queue/">Cats again</a></li>
            <li><A HREF="/v2/task/105/queue/">Promo 299</A></li>
          </ul>
        </body></html>
    "#;

    fn base() -> Url {
        Url::parse("https://annotate.example/v2/tasks/list/").unwrap()
    }

    #[test]
    fn scrapes_links_in_order() {
        let tasks = parse_task_list(PAGE, &base(), &HashSet::new(), &[]);
        let titles: Vec<&str> = tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Cats (12)", "Dogs & wolves", "Remote", "Cats again", "Promo 299"]
        );
        assert_eq!(tasks[0].href, "https://annotate.example/v2/task/101/queue/");
        assert_eq!(tasks[2].href, "https://other.example/v2/task/104/queue/");
    }

    #[test]
    fn skips_finished_and_blocked() {
        let finished: HashSet<String> = ["101".to_string()].into_iter().collect();
        let blocked = vec!["299".to_string()];
        let tasks = parse_task_list(PAGE, &base(), &finished, &blocked);
        let ids: Vec<_> = tasks.iter().filter_map(|t| t.task_id()).collect();
        assert_eq!(ids, vec!["102", "104"]);
    }

    #[test]
    fn blocked_match_ignores_case() {
        let blocked = vec!["  PROMO ".to_string()];
        let tasks = parse_task_list(PAGE, &base(), &HashSet::new(), &blocked);
        assert!(tasks.iter().all(|t| !t.title.contains("Promo")));
    }

    #[test]
    fn empty_page_yields_nothing() {
        assert!(parse_task_list("<html></html>", &base(), &HashSet::new(), &[]).is_empty());
    }

    #[test]
    fn normalize_href_resolves_relative() {
        assert_eq!(
            normalize_href(&base(), "../../task/5/").as_deref(),
            Some("https://annotate.example/v2/task/5/")
        );
        assert_eq!(normalize_href(&base(), "   "), None);
    }
}
