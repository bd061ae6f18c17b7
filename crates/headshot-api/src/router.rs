use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};
use headshot_batch::HeadshotSys;
use tower_http::trace::TraceLayer;

use crate::handlers;

/// Largest accepted `PUT /image` body. Phone photos run to several MiB.
pub const MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

pub fn headshot_router(sys: Arc<HeadshotSys>) -> Router {
    Router::new()
        .route("/health/live", get(handlers::health::health_live))
        .route(
            "/image",
            put(handlers::session::upload_image).layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES)),
        )
        .route(
            "/session",
            axum::routing::delete(handlers::session::reset_session),
        )
        .route(
            "/batch",
            get(handlers::batch::get_batch).post(handlers::batch::start_batch),
        )
        .route("/jobs/{index}", get(handlers::jobs::get_job))
        .route("/jobs/{index}/retry", post(handlers::jobs::retry_job))
        .route("/jobs/{index}/export", post(handlers::export::export_job))
        .route("/export", post(handlers::export::export_all))
        .layer(TraceLayer::new_for_http())
        .with_state(sys)
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use async_trait::async_trait;
    use axum::{
        Router,
        body::Body,
        http::{Method, Request, StatusCode, header::CONTENT_TYPE},
        response::Response,
    };
    use headshot_batch::{ExportConfig, ExportTarget, HeadshotConfig, HeadshotSys, PromptSet, RemoteGenerator};
    use headshot_common::{HeadshotError, Result, ResultLocator, SourceImage};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::{MAX_IMAGE_BYTES, headshot_router};

    struct EchoGenerator {
        latency: Duration,
    }

    #[async_trait]
    impl RemoteGenerator for EchoGenerator {
        async fn generate(&self, _image: &SourceImage, prompt: &str) -> Result<ResultLocator> {
            tokio::time::sleep(self.latency).await;
            if prompt == "broken" {
                return Err(HeadshotError::Generation("model refused".to_string()));
            }
            Ok(ResultLocator::new(format!("mem://{prompt}")))
        }
    }

    #[derive(Default)]
    struct MemoryTarget {
        saved: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ExportTarget for MemoryTarget {
        async fn save(&self, _locator: &ResultLocator, filename: &str) -> Result<()> {
            self.saved.lock().unwrap().push(filename.to_string());
            Ok(())
        }
    }

    fn app(latency: Duration, target: Arc<MemoryTarget>) -> Router {
        let prompts = PromptSet::new(vec![
            "studio".to_string(),
            "broken".to_string(),
            "outdoor".to_string(),
        ])
        .unwrap();
        let config = HeadshotConfig {
            export: ExportConfig {
                interval: Duration::ZERO,
                ..ExportConfig::default()
            },
            ..HeadshotConfig::default()
        };
        let sys = HeadshotSys::new(Arc::new(EchoGenerator { latency }), target, prompts, config).unwrap();
        headshot_router(Arc::new(sys))
    }

    async fn send(app: &Router, method: Method, uri: &str) -> Response {
        let request = Request::builder().method(method).uri(uri).body(Body::empty()).unwrap();
        app.clone().oneshot(request).await.unwrap()
    }

    async fn upload(app: &Router, mime: &str) -> Response {
        upload_bytes(app, mime, vec![0x89, b'P', b'N', b'G']).await
    }

    async fn upload_bytes(app: &Router, mime: &str, body: Vec<u8>) -> Response {
        let request = Request::builder()
            .method(Method::PUT)
            .uri("/image")
            .header(CONTENT_TYPE, mime)
            .body(Body::from(body))
            .unwrap();
        app.clone().oneshot(request).await.unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn wait_until_settled(app: &Router) -> Value {
        for _ in 0..200 {
            let snapshot = body_json(send(app, Method::GET, "/batch").await).await;
            if snapshot["running"] == false {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("batch never settled");
    }

    #[tokio::test]
    async fn health_live_is_ok() {
        let app = app(Duration::ZERO, Arc::default());
        assert_eq!(send(&app, Method::GET, "/health/live").await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn batch_requires_an_uploaded_image() {
        let app = app(Duration::ZERO, Arc::default());
        let response = send(&app, Method::POST, "/batch").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "NoSourceImage");

        let response = upload(&app, "image/gif").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "UnsupportedImage");
    }

    #[tokio::test]
    async fn upload_accepts_photos_up_to_the_limit() {
        let app = app(Duration::ZERO, Arc::default());

        let response = upload_bytes(&app, "image/jpeg", vec![0xff; 3 * 1024 * 1024]).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = upload_bytes(&app, "image/jpeg", vec![0xff; MAX_IMAGE_BYTES]).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = upload_bytes(&app, "image/jpeg", vec![0xff; MAX_IMAGE_BYTES + 1]).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn batch_lifecycle_over_http() {
        let target = Arc::new(MemoryTarget::default());
        let app = app(Duration::from_millis(5), Arc::clone(&target));

        let response = upload(&app, "image/png").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["phase"], "image_uploaded");

        let response = send(&app, Method::POST, "/batch").await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(body_json(response).await["total"], 3);

        let snapshot = wait_until_settled(&app).await;
        assert_eq!(snapshot["phase"], "results_shown");
        assert_eq!(snapshot["progress"]["percent"], 100);
        assert_eq!(snapshot["done_count"], 2);
        assert_eq!(snapshot["error_count"], 1);

        let job = body_json(send(&app, Method::GET, "/jobs/1").await).await;
        assert_eq!(job["status"], "error");
        assert_eq!(job["message"], "model refused");

        let response = send(&app, Method::GET, "/jobs/7").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["code"], "NoSuchJob");

        let response = send(&app, Method::POST, "/jobs/2/retry").await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(body_json(response).await["decision"], "accepted");

        let exported = body_json(send(&app, Method::POST, "/jobs/0/export").await).await;
        assert_eq!(exported["exported"], true);
        let exported = body_json(send(&app, Method::POST, "/jobs/1/export").await).await;
        assert_eq!(exported["exported"], false);

        let response = send(&app, Method::DELETE, "/session").await;
        assert_eq!(body_json(response).await["phase"], "idle");
        let snapshot = body_json(send(&app, Method::GET, "/batch").await).await;
        assert_eq!(snapshot["jobs"].as_array().map(Vec::len), Some(0));

        assert_eq!(target.saved.lock().unwrap().as_slice(), ["ai-headshot-1.jpg"]);
    }

    #[tokio::test]
    async fn export_all_schedules_finished_jobs() {
        let target = Arc::new(MemoryTarget::default());
        let app = app(Duration::ZERO, Arc::clone(&target));
        upload(&app, "image/png").await;
        send(&app, Method::POST, "/batch").await;
        wait_until_settled(&app).await;

        let response = send(&app, Method::POST, "/export").await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let scheduled = body_json(response).await;
        assert_eq!(scheduled["scheduled"], serde_json::json!([0, 2]));
    }

    #[tokio::test]
    async fn second_batch_conflicts_while_running() {
        let app = app(Duration::from_secs(60), Arc::default());
        upload(&app, "image/png").await;
        assert_eq!(send(&app, Method::POST, "/batch").await.status(), StatusCode::ACCEPTED);

        let response = send(&app, Method::POST, "/batch").await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(response).await["code"], "BatchInProgress");

        let response = send(&app, Method::POST, "/jobs/0/retry").await;
        let decision = body_json(response).await;
        assert_eq!(decision["decision"], "ignored");
        assert_eq!(decision["reason"], "batch_running");
    }
}
