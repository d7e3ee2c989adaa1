//! Endpoint tests driving the real router against a temporary database and a
//! stub identity provider listening on a local port. All tests share one
//! runtime so the stub server and the verification client outlive every test.

use std::sync::OnceLock;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tokio::runtime::Runtime;
use tower::ServiceExt;

use mensa_feedback_rs::constants::{DB_FILENAME, UPLOAD_DIR, VERIFY_URL};
use mensa_feedback_rs::db_operations::check_or_create_db_tables;
use mensa_feedback_rs::shared_main::build_router;

static RT: OnceLock<Runtime> = OnceLock::new();
static ENV: OnceLock<tempfile::TempDir> = OnceLock::new();

fn rt() -> &'static Runtime {
    RT.get_or_init(|| Runtime::new().unwrap())
}

async fn verify_stub(Json(body): Json<Value>) -> axum::response::Response {
    let identity = |user_id: &str, admin: bool| {
        Json(json!({ "userId": user_id, "claims": { "admin": admin } })).into_response()
    };

    match body["token"].as_str() {
        Some("user-token") => identity("user-1", false),
        Some("second-user-token") => identity("user-2", false),
        Some("admin-token") => identity("admin-1", true),
        _ => StatusCode::UNAUTHORIZED.into_response(),
    }
}

fn setup() {
    ENV.get_or_init(|| {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("api-test.sqlite");
        let uploads = dir.path().join("uploads");
        std::fs::create_dir_all(&uploads).unwrap();

        DB_FILENAME.get_or_init(|| db.to_str().unwrap().to_string());
        UPLOAD_DIR.get_or_init(|| uploads.to_str().unwrap().to_string());
        check_or_create_db_tables(DB_FILENAME.get().unwrap()).unwrap();

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();
        rt().spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            let provider = Router::new().route("/verify", post(verify_stub));
            axum::serve(listener, provider).await.unwrap();
        });
        VERIFY_URL.get_or_init(|| format!("http://{addr}/verify"));

        dir
    });
}

async fn send(request: Request<Body>) -> (StatusCode, Value) {
    let response = build_router().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn bare_request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn multipart_meal_request(token: &str, meal_data: &str, image_part: &str) -> Request<Body> {
    let boundary = "mensa-test-boundary";
    let body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"mealData\"\r\n\r\n\
         {meal_data}\r\n\
         --{boundary}\r\n\
         {image_part}\r\n\
         --{boundary}--\r\n"
    );

    Request::builder()
        .method("POST")
        .uri("/meals")
        .header("host", "api.test")
        .header("authorization", format!("Bearer {token}"))
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn png_part(content: &str) -> String {
    format!(
        "Content-Disposition: form-data; name=\"image\"; filename=\"photo.png\"\r\n\
         Content-Type: image/png\r\n\r\n\
         {content}"
    )
}

#[test]
fn health_reports_ok() {
    setup();
    rt().block_on(async {
        let (status, body) = send(bare_request("GET", "/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    });
}

#[test]
fn mutating_endpoints_require_a_token() {
    setup();
    rt().block_on(async {
        let (status, _) =
            send(json_request("POST", "/reviews", None, json!({"comment": "x"}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(json_request(
            "POST",
            "/reviews",
            Some("wrong-token"),
            json!({"comment": "x"}),
        ))
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    });
}

#[test]
fn unknown_meal_is_404() {
    setup();
    rt().block_on(async {
        let (status, _) = send(bare_request("GET", "/meals/does-not-exist", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(bare_request("GET", "/meals/does-not-exist/comments", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(bare_request(
            "POST",
            "/meals/does-not-exist/like",
            Some("user-token"),
        ))
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    });
}

#[test]
fn review_flow_with_likes() {
    setup();
    rt().block_on(async {
        let (status, body) = send(json_request(
            "POST",
            "/reviews",
            Some("user-token"),
            json!({"comment": "great curry"}),
        ))
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let review_id = body["reviewId"].as_str().unwrap().to_string();

        let like_uri = format!("/reviews/{review_id}/like");
        let (status, body) =
            send(bare_request("POST", &like_uri, Some("second-user-token"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["liked"], true);
        assert_eq!(body["likeCount"], 1);

        // second toggle by the same user reverts the like
        let (status, body) =
            send(bare_request("POST", &like_uri, Some("second-user-token"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["liked"], false);
        assert_eq!(body["likeCount"], 0);

        let (status, body) = send(bare_request("GET", "/reviews", None)).await;
        assert_eq!(status, StatusCode::OK);
        let reviews = body.as_array().unwrap().clone();
        let review = reviews
            .iter()
            .find(|r| r["id"] == review_id.as_str())
            .unwrap();
        assert_eq!(review["comment"], "great curry");
        assert_eq!(review["userId"], "user-1");
        assert_eq!(review["likeCount"], 0);
        assert_eq!(review["likedBy"], json!([]));
    });
}

#[test]
fn empty_review_comment_is_rejected() {
    setup();
    rt().block_on(async {
        let (status, _) = send(json_request(
            "POST",
            "/reviews",
            Some("user-token"),
            json!({"comment": "   "}),
        ))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(json_request("POST", "/reviews", Some("user-token"), json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    });
}

#[test]
fn review_deletion_needs_the_admin_claim() {
    setup();
    rt().block_on(async {
        let (_, body) = send(json_request(
            "POST",
            "/reviews",
            Some("user-token"),
            json!({"comment": "to be deleted"}),
        ))
        .await;
        let review_id = body["reviewId"].as_str().unwrap().to_string();
        let uri = format!("/reviews/{review_id}");

        let (status, _) = send(bare_request("DELETE", &uri, Some("user-token"))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // still there
        let (_, body) = send(bare_request("GET", "/reviews", None)).await;
        assert!(body
            .as_array()
            .unwrap()
            .iter()
            .any(|r| r["id"] == review_id.as_str()));

        let (status, _) = send(bare_request("DELETE", &uri, Some("admin-token"))).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(bare_request("GET", "/reviews", None)).await;
        assert!(!body
            .as_array()
            .unwrap()
            .iter()
            .any(|r| r["id"] == review_id.as_str()));

        let (status, _) = send(bare_request("DELETE", &uri, Some("admin-token"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    });
}

#[test]
fn evaluation_validation_and_submission() {
    setup();
    rt().block_on(async {
        let (status, _) = send(json_request(
            "POST",
            "/evaluations",
            Some("user-token"),
            json!({"mealId": "m-1"}),
        ))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(json_request(
            "POST",
            "/evaluations",
            Some("user-token"),
            json!({"foodAmounts": {"rice": 100}}),
        ))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(json_request(
            "POST",
            "/evaluations",
            Some("user-token"),
            json!({"foodAmounts": {"rice": 300}, "mealId": "m-1"}),
        ))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(json_request(
            "POST",
            "/evaluations",
            Some("user-token"),
            json!({"foodAmounts": {"rice": 100, "soup": 0}, "mealId": "m-1"}),
        ))
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["evaluationId"].as_str().is_some());
    });
}

#[test]
fn meal_upload_comment_flow() {
    setup();
    rt().block_on(async {
        let (status, body) = send(multipart_meal_request(
            "user-token",
            r#"{"menu": "Ramen"}"#,
            &png_part("not-really-a-png"),
        ))
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let meal_id = body["mealId"].as_str().unwrap().to_string();

        let (status, body) = send(bare_request("GET", &format!("/meals/{meal_id}"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["menu"], "Ramen");
        assert_eq!(body["createdBy"], "user-1");
        assert_eq!(body["likeCount"], 0);
        assert_eq!(body["isArchived"], false);
        let image_url = body["imageUrl"].as_str().unwrap().to_string();
        assert!(image_url.starts_with("http://api.test/uploads/"));

        // the upload landed on disk under the random name from the URL
        let filename = image_url.rsplit('/').next().unwrap();
        assert!(filename.ends_with(".png"));
        let stored = std::path::Path::new(UPLOAD_DIR.get().unwrap()).join(filename);
        assert_eq!(std::fs::read(stored).unwrap(), b"not-really-a-png");

        let (status, body) = send(json_request(
            "POST",
            &format!("/meals/{meal_id}/comments"),
            Some("second-user-token"),
            json!({"text": "looks tasty"}),
        ))
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let comment_id = body["commentId"].as_str().unwrap().to_string();

        let (status, body) = send(bare_request(
            "POST",
            &format!("/meals/{meal_id}/comments/{comment_id}/like"),
            Some("user-token"),
        ))
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["likeCount"], 1);

        let (status, body) = send(bare_request(
            "GET",
            &format!("/meals/{meal_id}/comments"),
            None,
        ))
        .await;
        assert_eq!(status, StatusCode::OK);
        let comments = body.as_array().unwrap().clone();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0]["text"], "looks tasty");
        assert_eq!(comments[0]["userId"], "user-2");
        assert_eq!(comments[0]["likedBy"], json!(["user-1"]));
    });
}

#[test]
fn meal_upload_rejects_bad_input() {
    setup();
    rt().block_on(async {
        // mealData must be a JSON object
        let (status, _) = send(multipart_meal_request(
            "user-token",
            "not json",
            &png_part("x"),
        ))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // disallowed content type
        let html_part = "Content-Disposition: form-data; name=\"image\"; filename=\"evil.html\"\r\n\
             Content-Type: text/html\r\n\r\n\
             <html></html>";
        let (status, _) = send(multipart_meal_request("user-token", "{}", html_part)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    });
}
