use std::sync::Arc;
use upid_auth::auth::AuthRejection;
use upid_auth::{AuthLevel, AuthMiddleware};

mod common;
use common::{manager, password, PASSWORD};

async fn middleware_with_session(username: &str) -> (AuthMiddleware, String) {
    let manager = Arc::new(manager().await);
    let session = manager
        .authenticate("local", &password(username, PASSWORD), None)
        .await
        .unwrap();
    (AuthMiddleware::new(manager), session.session_id)
}

#[tokio::test]
async fn test_authorize_admin() {
    let (middleware, session_id) = middleware_with_session("alice").await;
    let header = format!("Bearer {session_id}");

    let session = middleware
        .authorize(Some(&header), AuthLevel::MultiFactor, &["admin"])
        .await
        .unwrap();
    assert_eq!(session.user_id(), "alice");

    let lowercase = format!("bearer {session_id}");
    assert!(middleware.authenticate_request(Some(&lowercase)).await.is_some());
}

#[tokio::test]
async fn test_rejections() {
    let (middleware, session_id) = middleware_with_session("bob").await;
    let header = format!("Bearer {session_id}");

    let missing = middleware
        .authorize(None, AuthLevel::SingleFactor, &[])
        .await
        .unwrap_err();
    assert_eq!(missing.status_code(), 401);

    let basic = middleware
        .authorize(Some("Basic Ym9iOnB3"), AuthLevel::SingleFactor, &[])
        .await
        .unwrap_err();
    assert!(matches!(basic, AuthRejection::Unauthorized { .. }));

    let stale = middleware
        .authorize(Some("Bearer not-a-session"), AuthLevel::SingleFactor, &[])
        .await
        .unwrap_err();
    assert_eq!(stale.status_code(), 401);

    let too_weak = middleware
        .authorize(Some(&header), AuthLevel::StepUp, &[])
        .await
        .unwrap_err();
    assert_eq!(too_weak.status_code(), 403);

    let wrong_role = middleware
        .authorize(Some(&header), AuthLevel::SingleFactor, &["admin"])
        .await
        .unwrap_err();
    assert!(matches!(wrong_role, AuthRejection::Forbidden { .. }));

    middleware
        .authorize(Some(&header), AuthLevel::SingleFactor, &["viewer"])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_logged_out_session_is_unauthorized() {
    let (middleware, session_id) = middleware_with_session("bob").await;
    assert!(middleware.manager().logout(&session_id).await);

    let err = middleware
        .authorize(
            Some(&format!("Bearer {session_id}")),
            AuthLevel::None,
            &[],
        )
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 401);
}
