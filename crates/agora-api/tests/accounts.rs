mod common;

use axum::http::{StatusCode, header};

use agora_types::api::SESSION_COOKIE;
use common::{PASSWORD, TestApp, USERNAME, body_text, location};

fn session_cookie(res: &axum::http::Response<axum::body::Body>) -> Option<String> {
    res.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&format!("{SESSION_COOKIE}=")))
        .map(|v| v.split(';').next().unwrap_or_default().to_string())
}

#[tokio::test]
async fn pages_render() {
    let t = TestApp::new().await;
    assert_eq!(t.get("/ja/accounts/login/").await.status(), StatusCode::OK);
    assert_eq!(t.get("/ja/accounts/signup/").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn login_sets_session_and_follows_next() {
    let t = TestApp::new().await;
    let body = format!(
        "username={USERNAME}&password={PASSWORD}&next=%2Fja%2Fforum%2FTestTopic%2F"
    );
    let res = t.post_form("/ja/accounts/login/", &body, None).await;
    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(location(&res), "/ja/forum/TestTopic/");

    let cookie = session_cookie(&res).unwrap();
    let res = t
        .post_form("/ja/forum/TestTopic/", "message=post&content=LoggedIn", Some(cookie.as_str()))
        .await;
    assert_eq!(location(&res), "/ja/forum/TestTopic/");
    assert_eq!(t.message_count(), 2);
}

#[tokio::test]
async fn login_ignores_offsite_next() {
    let t = TestApp::new().await;
    let body = format!("username={USERNAME}&password={PASSWORD}&next=https%3A%2F%2Fevil.example%2F");
    let res = t.post_form("/ja/accounts/login/", &body, None).await;
    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(location(&res), "/ja/forum/");
}

#[tokio::test]
async fn wrong_password_rerenders_form() {
    let t = TestApp::new().await;
    let body = format!("username={USERNAME}&password=wrong-password");
    let res = t.post_form("/ja/accounts/login/", &body, None).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(session_cookie(&res).is_none());
    assert!(body_text(res).await.contains("Please enter a correct username and password."));
}

#[tokio::test]
async fn signup_creates_account_and_logs_in() {
    let t = TestApp::new().await;
    let body = "username=NewUser&email=new%40test.com&password=newpassword&password_confirm=newpassword";
    let res = t.post_form("/ja/accounts/signup/", body, None).await;
    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(location(&res), "/ja/forum/");
    assert!(session_cookie(&res).is_some());
    assert!(t.state.db.get_user_by_username("NewUser").unwrap().is_some());
}

#[tokio::test]
async fn signup_refuses_taken_username() {
    let t = TestApp::new().await;
    let body = format!(
        "username={USERNAME}&email=other%40test.com&password=newpassword&password_confirm=newpassword"
    );
    let res = t.post_form("/ja/accounts/signup/", &body, None).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(body_text(res).await.contains("already exists"));
}

#[tokio::test]
async fn signup_reports_mismatched_passwords() {
    let t = TestApp::new().await;
    let body = "username=NewUser&email=new%40test.com&password=newpassword&password_confirm=different1";
    let res = t.post_form("/ja/accounts/signup/", body, None).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(t.state.db.get_user_by_username("NewUser").unwrap().is_none());
}

#[tokio::test]
async fn logout_clears_session() {
    let t = TestApp::new().await;
    let cookie = t.cookie();
    let res = t.post_form("/ja/accounts/logout/", "", Some(cookie.as_str())).await;
    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(location(&res), "/ja/forum/");

    let cleared = res
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.starts_with(&format!("{SESSION_COOKIE}=;")) || v.contains("Max-Age=0"));
    assert!(cleared);
}
