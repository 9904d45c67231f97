use url::Url;

/// Query keys that only track the visitor.
const TRACKING_KEYS: &[&str] = &[
    "fbclid", "gclid", "dclid", "msclkid", "mc_cid", "mc_eid", "igshid", "ref", "ref_src",
    "_ga", "_gl", "spm", "cb", "cachebuster",
];

/// Query keys that only ask a CDN for another rendition of the same image.
const RENDITION_KEYS: &[&str] = &[
    "w", "h", "width", "height", "size", "resize", "fit", "crop", "quality", "q_auto", "dpr",
    "scale", "format", "auto",
];

fn is_tracking_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_KEYS.contains(&key.as_str())
}

fn is_noise_key(key: &str) -> bool {
    is_tracking_key(key) || RENDITION_KEYS.contains(&key.to_ascii_lowercase().as_str())
}

/// Canonical form used for every URL equality check in the pipeline.
///
/// Drops the fragment and tracking/rendition query parameters, sorts what is
/// left, and relies on `url` for scheme/host case and default-port folding.
/// Returns `None` for anything that is not an absolute http(s) URL.
pub fn canonicalize_url(raw: &str) -> Option<String> {
    normalize(raw, is_noise_key)
}

/// Like [`canonicalize_url`] but keeps rendition parameters, so `?w=800` and
/// `?w=1600` stay distinct. Identifies response bodies rather than images.
pub fn strip_tracking(raw: &str) -> Option<String> {
    normalize(raw, is_tracking_key)
}

fn normalize(raw: &str, is_dropped: fn(&str) -> bool) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }
    url.set_fragment(None);

    let mut kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_dropped(key))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    kept.sort();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept.iter());
    }
    Some(url.into())
}

/// Host part of a canonical URL, lower-cased.
pub fn host_of(raw: &str) -> Option<String> {
    Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
}
