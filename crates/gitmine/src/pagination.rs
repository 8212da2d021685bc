//! Link header parsing for paginated API responses.
//!
//! GitHub Link headers look like:
//! `<https://api.github.com/repositories/1/commits?page=2>; rel="next", <...?page=9>; rel="last"`

/// Page references extracted from a `Link` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageLinks {
    /// URL of the next page (from rel="next").
    pub next: Option<String>,
    /// URL of the previous page (from rel="prev").
    pub prev: Option<String>,
    /// Page number of the last page (from the `page` parameter of rel="last").
    pub last_page: Option<u32>,
}

impl PageLinks {
    /// Returns true if there is another page to fetch.
    #[inline]
    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }

    /// The first page of a listing carries no rel="prev" link.
    #[inline]
    pub fn is_first_page(&self) -> bool {
        self.prev.is_none()
    }
}

/// Parse an optional `Link` header value.
///
/// A missing header yields empty links, which ends pagination.
pub fn parse_link_header(link_header: Option<&str>) -> PageLinks {
    let mut links = PageLinks::default();
    let Some(link_header) = link_header else {
        return links;
    };

    for part in link_header.split(',') {
        let part = part.trim();

        let mut url = None;
        let mut rel = None;

        for segment in part.split(';') {
            let segment = segment.trim();
            if segment.starts_with('<') && segment.ends_with('>') {
                url = Some(&segment[1..segment.len() - 1]);
            } else if let Some(rel_value) = segment.strip_prefix("rel=") {
                rel = Some(rel_value.trim_matches('"'));
            }
        }

        let (Some(url), Some(rel)) = (url, rel) else {
            continue;
        };

        // A single element may carry several space-separated relations.
        for rel_type in rel.split_whitespace() {
            match rel_type {
                "next" => links.next = Some(url.to_string()),
                "prev" => links.prev = Some(url.to_string()),
                "last" => links.last_page = page_number(url),
                _ => {}
            }
        }
    }

    links
}

/// Extract the `page` query parameter from a URL.
pub fn page_number(url: &str) -> Option<u32> {
    let query_start = url.find('?')?;
    let query = &url[query_start + 1..];
    let query = query.split('#').next().unwrap_or(query);

    query
        .split('&')
        .find_map(|param| param.strip_prefix("page="))
        .and_then(|value| value.parse().ok())
}
