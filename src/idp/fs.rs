//! Filesystem instance-data provider.
//!
//! Serves a static tree of metadata files. Requests can never escape the
//! configured root; unknown paths get a 404. Directory listings are
//! disabled: a directory without an index file is a 404 as well.

use std::path::Path;

use axum::Router;
use tower_http::services::ServeDir;

/// Build a provider serving static files rooted at `dir`.
pub fn router(dir: &Path) -> Router {
    Router::new().fallback_service(ServeDir::new(dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn get(router: Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn should_serve_files_under_the_root() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("meta-data")).unwrap();
        std::fs::write(root.path().join("meta-data/instance-id"), "i-123456").unwrap();

        let (status, body) = get(router(root.path()), "/meta-data/instance-id").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"i-123456");
    }

    #[tokio::test]
    async fn should_return_not_found_for_unknown_paths() {
        let root = tempfile::tempdir().unwrap();

        let (status, _) = get(router(root.path()), "/missing").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn should_not_serve_content_outside_the_root() {
        let outer = tempfile::tempdir().unwrap();
        let root = outer.path().join("served");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(outer.path().join("secret.txt"), "top secret").unwrap();

        let (status, body) = get(router(&root), "/../secret.txt").await;

        assert_ne!(status, StatusCode::OK);
        assert_ne!(body, b"top secret");
    }

    #[tokio::test]
    async fn should_not_list_directories() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("meta-data")).unwrap();
        std::fs::write(root.path().join("meta-data/hostname"), "host").unwrap();

        let (status, _) = get(router(root.path()), "/meta-data/").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
