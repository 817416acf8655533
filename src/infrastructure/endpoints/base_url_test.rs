use super::resolve_base_url;

#[test]
fn it_prefers_the_explicit_url() {
    assert_eq!(
        resolve_base_url("http://10.0.0.2:4000/", "192.168.1.10:8081"),
        Some("http://10.0.0.2:4000".to_string())
    );
}

#[test]
fn it_strips_trailing_slashes_and_repeated_schemes() {
    assert_eq!(
        resolve_base_url("  https://http://example.com///  ", ""),
        Some("https://example.com".to_string())
    );
    assert_eq!(
        resolve_base_url("HTTP://Example.com/api/", ""),
        Some("http://Example.com/api".to_string())
    );
}

#[test]
fn it_adds_a_missing_scheme() {
    assert_eq!(
        resolve_base_url("192.168.1.10:3333", ""),
        Some("http://192.168.1.10:3333".to_string())
    );
}

#[test]
fn it_infers_from_the_dev_host() {
    assert_eq!(
        resolve_base_url("", "192.168.1.10:8081"),
        Some("http://192.168.1.10:3333".to_string())
    );
    assert_eq!(
        resolve_base_url("   ", "http://192.168.1.10:8081/"),
        Some("http://192.168.1.10:3333".to_string())
    );
    assert_eq!(
        resolve_base_url("", "devbox.local/index.bundle"),
        Some("http://devbox.local:3333".to_string())
    );
}

#[test]
fn it_is_unresolved_without_inputs() {
    assert_eq!(resolve_base_url("", ""), None);
    assert_eq!(resolve_base_url("", " :8081"), None);
    assert_eq!(resolve_base_url("http:///", ""), None);
}
