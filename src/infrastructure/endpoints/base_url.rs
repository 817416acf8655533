#[cfg(test)]
#[path = "base_url_test.rs"]
mod tests;

use crate::configuration::Config;
use crate::configuration::ConfigKey;

/// Port the companion model server listens on.
pub const DEFAULT_SERVER_PORT: u16 = 3333;

/// Picks the model server address. An explicit URL wins, otherwise the
/// development host's address is reused with the well known port.
pub fn resolve_base_url(server_url: &str, dev_host: &str) -> Option<String> {
    if !server_url.trim().is_empty() {
        return normalize_url(server_url);
    }

    let hostname = extract_hostname(dev_host)?;
    return Some(format!("http://{hostname}:{DEFAULT_SERVER_PORT}"));
}

pub fn resolve_from_config() -> Option<String> {
    return resolve_base_url(
        &Config::get(ConfigKey::ServerURL),
        &Config::get(ConfigKey::DevHost),
    );
}

/// Splits off every leading scheme, keeping the first one seen.
fn split_schemes(url: &str) -> (Option<&'static str>, &str) {
    let mut scheme = None;
    let mut rest = url.trim();

    'strip: loop {
        for prefix in ["https://", "http://"] {
            let matches = rest
                .get(..prefix.len())
                .map_or(false, |head| return head.eq_ignore_ascii_case(prefix));
            if matches {
                scheme = scheme.or(Some(prefix));
                rest = &rest[prefix.len()..];
                continue 'strip;
            }
        }

        return (scheme, rest);
    }
}

fn normalize_url(url: &str) -> Option<String> {
    let (scheme, rest) = split_schemes(url);
    let rest = rest.trim_end_matches('/');
    if rest.is_empty() {
        return None;
    }

    return Some(format!("{}{rest}", scheme.unwrap_or("http://")));
}

/// "192.168.1.10:8081/" becomes "192.168.1.10".
fn extract_hostname(host_uri: &str) -> Option<String> {
    let (_, rest) = split_schemes(host_uri);
    let host = rest.split('/').next()?;
    let hostname = host.split(':').next()?.trim();
    if hostname.is_empty() {
        return None;
    }

    return Some(hostname.to_string());
}
