use url::Url;

/// Schemes that never reach the network; requests for them are ignored.
const LOCAL_SCHEMES: &[&str] = &["data", "about", "blob", "javascript", "chrome", "chrome-extension"];

/// Network authority (`host[:port]`) of a request target.
///
/// Returns `None` for local schemes and for anything without a parseable host.
pub fn request_authority(target: &str) -> Option<String> {
    let target = target.trim();
    if target.is_empty() {
        return None;
    }

    let parsed = Url::parse(target).ok()?;
    if LOCAL_SCHEMES.contains(&parsed.scheme()) {
        return None;
    }

    let host = parsed.host_str().filter(|h| !h.is_empty())?;
    Some(match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// Whether `authority` belongs to the audited site.
///
/// Matching is by containment, so `www.example.test`, `static.www.example.test`
/// and `www.example.test:8443` all belong to the site `www.example.test`.
pub fn authority_matches(site_domain: &str, authority: &str) -> bool {
    authority
        .to_ascii_lowercase()
        .contains(&site_domain.trim().to_ascii_lowercase())
}

/// Decide whether a request leaves the audited site.
///
/// Targets without a parseable authority are treated as first-party, so a
/// strange request can only ever be left out of the audit, never abort it.
pub fn is_third_party(site_domain: &str, request_target: &str) -> bool {
    third_party_authority(site_domain, request_target).is_some()
}

/// Authority to file a request under, if it is third-party.
pub fn third_party_authority(site_domain: &str, request_target: &str) -> Option<String> {
    request_authority(request_target).filter(|authority| !authority_matches(site_domain, authority))
}
