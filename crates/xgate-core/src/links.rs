//! Target link extraction and context measurement.
//!
//! Both functions are pure: no state, no I/O.

use lazy_regex::lazy_regex;

/// Hosts whose links are moderated. An optional `www.` prefix is accepted.
pub const TARGET_HOSTS: &[&str] = &[
    "x.com",
    "twitter.com",
    "vxtwitter.com",
    "fxtwitter.com",
    "fixupx.com",
];

/// Characters never kept at the end of a matched link.
const TRAILING_PUNCTUATION: &[char] = &['.', ',', '?', '!', ':', ';'];

static RE_TARGET_LINK: lazy_regex::Lazy<regex::Regex> = lazy_regex!(
    r"(?i)https?://(?:www\.)?(?:x|twitter|vxtwitter|fxtwitter|fixupx)\.com/(\S+)"
);

static RE_ANY_URL: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"[A-Za-z][A-Za-z0-9+]*://\S+");

/// Extract target links in order of appearance.
///
/// Trailing punctuation glued to a link is not part of it. A candidate
/// whose path is empty once that punctuation is removed is dropped.
///
/// # Examples
///
/// ```
/// use xgate_core::links::extract;
///
/// let links = extract("see https://x.com/a/status/1, and HTTPS://www.Twitter.COM/b!");
/// assert_eq!(links, vec!["https://x.com/a/status/1", "HTTPS://www.Twitter.COM/b"]);
/// ```
#[must_use]
pub fn extract(text: &str) -> Vec<String> {
    RE_TARGET_LINK
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let path = caps.get(1)?;
            let link = whole.as_str().trim_end_matches(TRAILING_PUNCTUATION);
            let prefix_len = path.start() - whole.start();
            (link.len() > prefix_len).then(|| link.to_string())
        })
        .collect()
}

/// Remove every URL (any scheme), collapse whitespace runs and trim.
///
/// # Examples
///
/// ```
/// use xgate_core::links::strip_links;
///
/// assert_eq!(strip_links("  look   ftp://a/b at\tthis https://x.com/c  "), "look at this");
/// ```
#[must_use]
pub fn strip_links(text: &str) -> String {
    let without_urls = RE_ANY_URL.replace_all(text, "");
    without_urls.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Number of characters left once links are stripped.
#[must_use]
pub fn context_length(text: &str) -> usize {
    strip_links(text).chars().count()
}
