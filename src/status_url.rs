/// A tweet addressed by its status URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRef {
    pub author: String,
    pub tweet_id: String,
}

/// Parse `https://x.com/<author>/status/<id>` and its twitter.com, `www.`
/// and plain-http variants. Trailing path segments, query and fragment are
/// ignored; the id must be all digits.
pub fn parse_status_url(url: &str) -> Option<StatusRef> {
    let url = url.trim();
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    let rest = rest.strip_prefix("www.").unwrap_or(rest);
    let rest = rest
        .strip_prefix("twitter.com/")
        .or_else(|| rest.strip_prefix("x.com/"))?;

    let rest = rest.split(['?', '#']).next().unwrap_or_default();
    let mut segments = rest.split('/');
    let author = segments.next().filter(|name| !name.is_empty())?;
    if segments.next() != Some("status") {
        return None;
    }
    let tweet_id = segments
        .next()
        .filter(|id| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()))?;

    Some(StatusRef {
        author: author.to_string(),
        tweet_id: tweet_id.to_string(),
    })
}

/// A bare numeric id passes through; anything else must be a status URL.
pub fn resolve_tweet_id(input: &str) -> Option<String> {
    let input = input.trim();
    if !input.is_empty() && input.bytes().all(|b| b.is_ascii_digit()) {
        return Some(input.to_string());
    }
    parse_status_url(input).map(|status| status.tweet_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status_url_variants() {
        for url in [
            "https://x.com/jack/status/20",
            "http://twitter.com/jack/status/20",
            "https://www.twitter.com/jack/status/20/photo/1",
            "x.com/jack/status/20?s=46#m",
        ] {
            let status = parse_status_url(url).unwrap();
            assert_eq!(status.author, "jack", "{}", url);
            assert_eq!(status.tweet_id, "20", "{}", url);
        }
    }

    #[test]
    fn test_rejects_non_status_urls() {
        assert_eq!(parse_status_url("https://x.com/jack"), None);
        assert_eq!(parse_status_url("https://x.com/jack/status/"), None);
        assert_eq!(parse_status_url("https://x.com/jack/status/12ab"), None);
        assert_eq!(parse_status_url("https://example.com/jack/status/1"), None);
        assert_eq!(parse_status_url("https://x.com//status/1"), None);
    }

    #[test]
    fn test_resolve_tweet_id() {
        assert_eq!(resolve_tweet_id(" 1234 ").as_deref(), Some("1234"));
        assert_eq!(resolve_tweet_id("https://x.com/a/status/55").as_deref(), Some("55"));
        assert_eq!(resolve_tweet_id("nope"), None);
    }
}
