//! Page context supplied by the host

/// Where the observed application is running, as reported on every flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContext {
    /// Scheme and host, e.g. `https://app.example.com`
    pub origin: String,
    /// Full current URL
    pub href: String,
    pub user_agent: String,
}

impl Default for PageContext {
    fn default() -> Self {
        Self {
            origin: String::new(),
            href: String::new(),
            user_agent: concat!("mirrorwatch/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl PageContext {
    /// Build a context from an absolute URL, deriving the origin from it
    pub fn from_href(href: impl Into<String>, user_agent: impl Into<String>) -> Self {
        let href = href.into();
        Self {
            origin: origin_of(&href).to_string(),
            href,
            user_agent: user_agent.into(),
        }
    }

    /// Host part of the URL (no scheme)
    pub fn host(&self) -> &str {
        self.origin
            .split_once("://")
            .map(|(_, host)| host)
            .unwrap_or(&self.origin)
    }

    /// Path part of the URL, without query or fragment
    pub fn path(&self) -> &str {
        let rest = self.href.strip_prefix(self.origin.as_str()).unwrap_or(&self.href);
        let end = rest.find(|c: char| c == '?' || c == '#').unwrap_or(rest.len());
        match &rest[..end] {
            "" => "/",
            path => path,
        }
    }

    /// Follow a history navigation to `url`.
    ///
    /// Absolute URLs replace the page; root-relative paths stay on the current
    /// origin. Anything else is left alone.
    pub fn navigate(&mut self, url: &str) {
        if url.starts_with("http://") || url.starts_with("https://") {
            self.href = url.to_string();
            self.origin = origin_of(url).to_string();
        } else if url.starts_with('/') && !self.origin.is_empty() {
            self.href = format!("{}{}", self.origin, url);
        }
    }
}

fn origin_of(href: &str) -> &str {
    let Some(scheme_end) = href.find("://") else {
        return "";
    };
    let authority_start = scheme_end + 3;
    let end = href[authority_start..]
        .find(|c: char| c == '/' || c == '?' || c == '#')
        .map(|i| authority_start + i)
        .unwrap_or(href.len());
    &href[..end]
}

/// Page visibility as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Look up a query parameter in both the search part and the hash route of a URL.
///
/// `https://a.com/path/?ticket=ST-1#/sub?type=todo` yields `ST-1` for
/// `ticket` and `todo` for `type`. Names match case-insensitively; a later
/// match wins. Returns an empty string when absent.
pub fn url_param(href: &str, name: &str) -> String {
    let (before_hash, hash) = match href.split_once('#') {
        Some((before, hash)) => (before, Some(hash)),
        None => (href, None),
    };

    let mut queries = Vec::new();
    if let Some((_, search)) = before_hash.split_once('?') {
        queries.push(search);
    }
    if let Some((_, hash_query)) = hash.and_then(|h| h.split_once('?')) {
        queries.push(hash_query);
    }

    let mut found = String::new();
    for query in queries {
        for pair in query.split('&') {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            if key.eq_ignore_ascii_case(name) {
                found = urlencoding::decode(value)
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| value.to_string());
            }
        }
    }
    found
}
