//! Paths of the forum pages and the redirect helper.
//!
//! Every path built here is percent-encoded, so it can go straight into a
//! `Location` header even when a topic name is not ASCII.

use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use percent_encoding::{AsciiSet, CONTROLS, NON_ALPHANUMERIC, utf8_percent_encode};

/// Characters escaped inside a path.
const PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Characters escaped inside a single path segment.
const SEGMENT: &AsciiSet = &PATH.add(b'/').add(b'%');

pub fn forum_index(lang: &str) -> String {
    format!("/{lang}/forum/")
}

pub fn forum(lang: &str, topic_name: &str) -> String {
    format!("/{lang}/forum/{}/", utf8_percent_encode(topic_name, SEGMENT))
}

pub fn login(lang: &str, next: Option<&str>) -> String {
    match next {
        Some(next) => format!(
            "/{lang}/accounts/login/?next={}",
            utf8_percent_encode(next, NON_ALPHANUMERIC)
        ),
        None => format!("/{lang}/accounts/login/"),
    }
}

pub fn signup(lang: &str) -> String {
    format!("/{lang}/accounts/signup/")
}

pub fn logout(lang: &str) -> String {
    format!("/{lang}/accounts/logout/")
}

pub fn media(relative: &str) -> String {
    format!("/media/{}", utf8_percent_encode(relative, PATH))
}

/// Accepts a post-login target only if it stays on this site.
pub fn safe_next(next: Option<&str>) -> Option<String> {
    next.filter(|n| n.starts_with('/') && !n.starts_with("//") && !n.contains('\\'))
        .map(|n| utf8_percent_encode(n, PATH).to_string())
}

/// 302 Found to `location`.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_names_are_encoded_as_one_segment() {
        assert_eq!(forum("ja", "TestTopic"), "/ja/forum/TestTopic/");
        assert_eq!(forum("ja", "a/b c"), "/ja/forum/a%2Fb%20c/");
        assert_eq!(forum("ja", "雑談"), "/ja/forum/%E9%9B%91%E8%AB%87/");
    }

    #[test]
    fn login_carries_next() {
        assert_eq!(
            login("ja", Some("/ja/forum/TestTopic/")),
            "/ja/accounts/login/?next=%2Fja%2Fforum%2FTestTopic%2F"
        );
        assert_eq!(login("en", None), "/en/accounts/login/");
    }

    #[test]
    fn next_must_be_local() {
        assert_eq!(safe_next(Some("/ja/forum/")).as_deref(), Some("/ja/forum/"));
        assert_eq!(safe_next(Some("//evil.example/")), None);
        assert_eq!(safe_next(Some("https://evil.example/")), None);
        assert_eq!(safe_next(Some("/\\evil")), None);
        assert_eq!(safe_next(None), None);
    }

    #[test]
    fn found_is_302() {
        let res = found("/ja/forum/");
        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(res.headers()[header::LOCATION], "/ja/forum/");
    }
}
