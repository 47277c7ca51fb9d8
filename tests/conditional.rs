use arbor::prelude::*;
use hyper::{header::ETAG, Method, StatusCode};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn modified() -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(1_697_123_113)
}

fn app() -> arbor::test::Client {
    let doc = Declaration::new().content(|_| {
        "document"
            .into_content()
            .with_entity_tag(EntityTag::strong("v2").unwrap())
            .with_modification_date(modified())
    });

    let upload = Declaration::new()
        .methods([Method::PUT])
        .body(BodyDescriptor::bytes().limit(1024))
        .validator(Validator {
            entity_tag: EntityTag::strong("v2"),
            last_modified: Some(modified()),
        })
        .content(|_| StatusCode::NO_CONTENT);

    let root = RouteNode::new()
        .group("doc", RouteNode::new().respond(doc).respond(upload))
        .on_incident(|i| match i {
            Incident::UnsatisfiablePrecondition => {
                Some("stale".with_status(StatusCode::PRECONDITION_FAILED))
            }
            _ => None,
        });

    App::new(root).test_client()
}

#[tokio::test]
async fn test_if_none_match() {
    let app = app();

    let r = app.get("/doc").dispatch().await;
    assert_eq!(r.status(), StatusCode::OK);
    assert_eq!(r.headers()[ETAG], "\"v2\"");

    let r = app.get("/doc").header("if-none-match", "\"v2\"").dispatch().await;
    assert_eq!(r.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(r.headers()[ETAG], "\"v2\"");
    assert!(r.headers().get("content-type").is_none());
    assert_eq!("", r.body());

    let r = app.get("/doc").header("if-none-match", "\"v1\", W/\"v2\"").dispatch().await;
    assert_eq!(r.status(), StatusCode::NOT_MODIFIED);

    let r = app.get("/doc").header("if-none-match", "\"v1\"").dispatch().await;
    assert_eq!(r.status(), StatusCode::OK);
    assert_eq!("document", r.body());
}

#[tokio::test]
async fn test_if_modified_since() {
    let app = app();
    let exact = httpdate::fmt_http_date(modified());
    let earlier = httpdate::fmt_http_date(modified() - Duration::from_secs(1));

    let r = app.get("/doc").header("if-modified-since", &exact).dispatch().await;
    assert_eq!(r.status(), StatusCode::NOT_MODIFIED);

    let r = app.get("/doc").header("if-modified-since", &earlier).dispatch().await;
    assert_eq!(r.status(), StatusCode::OK);

    let r = app.get("/doc").header("if-modified-since", "yesterday").dispatch().await;
    assert_eq!(r.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_if_match_on_upload() {
    let app = app();

    let r = app.put("/doc").header("if-match", "\"v2\"").body("new").dispatch().await;
    assert_eq!(r.status(), StatusCode::NO_CONTENT);

    let r = app.put("/doc").header("if-match", "*").body("new").dispatch().await;
    assert_eq!(r.status(), StatusCode::NO_CONTENT);

    let r = app.put("/doc").header("if-match", "W/\"v2\"").body("new").dispatch().await;
    assert_eq!(r.status(), StatusCode::PRECONDITION_FAILED);
    assert_eq!("stale", r.body());

    // malformed, therefore ignored
    let r = app.put("/doc").header("if-match", "v1").body("new").dispatch().await;
    assert_eq!(r.status(), StatusCode::NO_CONTENT);

    let earlier = httpdate::fmt_http_date(modified() - Duration::from_secs(60));
    let r = app.put("/doc").header("if-unmodified-since", &earlier).dispatch().await;
    assert_eq!(r.status(), StatusCode::PRECONDITION_FAILED);

    let r = app.put("/doc").header("if-none-match", "*").dispatch().await;
    assert_eq!(r.status(), StatusCode::PRECONDITION_FAILED);
}
