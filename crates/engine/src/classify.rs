//! Url → [`Classification`] heuristics.

use tabhive_core::agent::Classification;
use url::Url;

/// Host suffixes per category. First match wins, so more specific hosts
/// (e.g. `mail.google.com`) are listed before their parents.
const HOST_RULES: &[(&str, Classification)] = &[
    ("mail.google.com", Classification::Email),
    ("outlook.live.com", Classification::Email),
    ("outlook.office.com", Classification::Email),
    ("mail.yahoo.com", Classification::Email),
    ("proton.me", Classification::Email),
    ("docs.google.com", Classification::Docs),
    ("drive.google.com", Classification::Docs),
    ("notion.so", Classification::Docs),
    ("notion.site", Classification::Docs),
    ("confluence.com", Classification::Docs),
    ("maps.google.com", Classification::Maps),
    ("openstreetmap.org", Classification::Maps),
    ("maps.apple.com", Classification::Maps),
    ("youtube.com", Classification::Video),
    ("youtu.be", Classification::Video),
    ("vimeo.com", Classification::Video),
    ("twitch.tv", Classification::Video),
    ("netflix.com", Classification::Video),
    ("twitter.com", Classification::Social),
    ("x.com", Classification::Social),
    ("facebook.com", Classification::Social),
    ("instagram.com", Classification::Social),
    ("linkedin.com", Classification::Social),
    ("reddit.com", Classification::Social),
    ("mastodon.social", Classification::Social),
    ("amazon.com", Classification::Shopping),
    ("ebay.com", Classification::Shopping),
    ("etsy.com", Classification::Shopping),
    ("aliexpress.com", Classification::Shopping),
    ("mercadolibre.com", Classification::Shopping),
    ("news.ycombinator.com", Classification::News),
    ("news.google.com", Classification::News),
    ("bbc.com", Classification::News),
    ("bbc.co.uk", Classification::News),
    ("nytimes.com", Classification::News),
    ("theguardian.com", Classification::News),
    ("elpais.com", Classification::News),
    ("github.com", Classification::Code),
    ("gitlab.com", Classification::Code),
    ("bitbucket.org", Classification::Code),
    ("stackoverflow.com", Classification::Code),
    ("docs.rs", Classification::Code),
    ("crates.io", Classification::Code),
    ("google.com", Classification::Search),
    ("bing.com", Classification::Search),
    ("duckduckgo.com", Classification::Search),
    ("search.brave.com", Classification::Search),
];

/// Classify an agent by the url it is showing.
///
/// Non-web schemes (`about:`, `chrome:`, `file:` and friends) are
/// [`Classification::Internal`]; unknown web hosts are
/// [`Classification::Other`].
pub fn classify_url(url: &str) -> Classification {
    let Ok(parsed) = Url::parse(url.trim()) else {
        return Classification::Other;
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return Classification::Internal;
    }
    let Some(host) = parsed.host_str() else {
        return Classification::Other;
    };
    let host = host.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);

    if host.starts_with("maps.google.")
        || (host.starts_with("google.") && parsed.path().starts_with("/maps"))
    {
        return Classification::Maps;
    }

    HOST_RULES
        .iter()
        .find(|(suffix, _)| host_has_suffix(host, suffix))
        .map(|(_, class)| *class)
        .or_else(|| search_by_path(host, &parsed))
        .unwrap_or(Classification::Other)
}

fn host_has_suffix(host: &str, suffix: &str) -> bool {
    host == suffix
        || host
            .strip_suffix(suffix)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Regional search frontends (`google.es`, `bing.co.uk`) keyed on their path.
fn search_by_path(host: &str, parsed: &Url) -> Option<Classification> {
    let engine = ["google.", "bing.", "duckduckgo."]
        .iter()
        .any(|prefix| host.starts_with(prefix));
    (engine && parsed.path().starts_with("/search")).then_some(Classification::Search)
}
