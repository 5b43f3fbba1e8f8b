//! Pagination and cache-window metadata from ESI response headers.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, EXPIRES};

use crate::error::{EsiError, Result};

/// Returned when the `expires` header is absent, malformed, or already in
/// the past. Short enough to re-poll promptly, long enough not to hammer.
const EXPIRED_FLOOR: Duration = Duration::from_secs(10);

/// Added to every live window so the next poll lands after ESI has
/// published a fresh page set.
const WINDOW_SLACK: Duration = Duration::from_secs(15);

/// Parse the `x-pages` header.
pub fn pages(headers: &HeaderMap) -> Result<i32> {
    headers
        .get("x-pages")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<i32>().ok())
        .filter(|p| *p >= 1)
        .ok_or(EsiError::MissingPages)
}

/// Parse the `x-pages` header, treating absence as a single page.
///
/// The public-contract endpoints omit the header on single-page responses.
pub fn pages_or_single(headers: &HeaderMap) -> i32 {
    pages(headers).unwrap_or(1)
}

/// Time until the response's cache window closes, per the `expires` header.
pub fn time_until_cache_expires(headers: &HeaderMap) -> Duration {
    let expires = headers
        .get(EXPIRES)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| DateTime::parse_from_rfc2822(s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    let Some(expires) = expires else {
        return EXPIRED_FLOOR;
    };

    let until = expires - Utc::now();
    if until < chrono::Duration::seconds(1) {
        EXPIRED_FLOOR
    } else {
        until.to_std().unwrap_or(Duration::ZERO) + WINDOW_SLACK
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn header_map(pairs: &[(&str, String)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(
                reqwest::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        headers
    }

    #[test]
    fn pages_parses_the_header() {
        let headers = header_map(&[("x-pages", "17".to_string())]);
        assert_eq!(pages(&headers).unwrap(), 17);
    }

    #[test]
    fn pages_rejects_missing_or_malformed() {
        assert!(matches!(
            pages(&HeaderMap::new()),
            Err(EsiError::MissingPages)
        ));
        let garbage = header_map(&[("x-pages", "many".to_string())]);
        assert!(matches!(pages(&garbage), Err(EsiError::MissingPages)));
        let zero = header_map(&[("x-pages", "0".to_string())]);
        assert!(matches!(pages(&zero), Err(EsiError::MissingPages)));
    }

    #[test]
    fn pages_or_single_defaults_to_one() {
        assert_eq!(pages_or_single(&HeaderMap::new()), 1);
        let headers = header_map(&[("x-pages", "3".to_string())]);
        assert_eq!(pages_or_single(&headers), 3);
    }

    #[test]
    fn live_window_gets_slack() {
        let expires = (Utc::now() + chrono::Duration::seconds(60)).to_rfc2822();
        let headers = header_map(&[("expires", expires)]);
        let window = time_until_cache_expires(&headers);
        // 60s remaining + 15s slack, with a little tolerance for test runtime.
        assert!(window > Duration::from_secs(70) && window <= Duration::from_secs(76));
    }

    #[test]
    fn expired_window_floors_to_ten_seconds() {
        let expires = (Utc::now() - chrono::Duration::seconds(30)).to_rfc2822();
        let headers = header_map(&[("expires", expires)]);
        assert_eq!(time_until_cache_expires(&headers), EXPIRED_FLOOR);
    }

    #[test]
    fn missing_expires_floors_to_ten_seconds() {
        assert_eq!(time_until_cache_expires(&HeaderMap::new()), EXPIRED_FLOOR);
    }
}
