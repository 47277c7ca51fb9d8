use arbor::prelude::*;
use hyper::{header::CONNECTION, Method, StatusCode};

fn hello() -> RouteNode {
    RouteNode::new().respond(Declaration::new().content(|_| "Hello!"))
}

#[tokio::test]
async fn test_root_declaration() {
    let app = App::new(hello()).test_client();

    let r = app.get("/").dispatch().await;
    assert_eq!(r.status(), StatusCode::OK);
    assert_eq!("Hello!", r.body());

    let r = app.get("/missing").dispatch().await;
    assert_eq!(r.status(), StatusCode::NOT_FOUND);
    assert_eq!("", r.body());
}

#[tokio::test]
async fn test_nearest_incident_override() {
    let root = hello()
        .on_incident(|i| match i {
            Incident::NoResponse => Some("root 404".with_status(StatusCode::NOT_FOUND)),
            _ => None,
        })
        .group(
            "a",
            RouteNode::new()
                .on_incident(|i| match i {
                    Incident::NoResponse => Some("a 404".with_status(StatusCode::NOT_FOUND)),
                    _ => None,
                })
                .group("b", RouteNode::new().respond(Declaration::new().content(|_| "b"))),
        );

    let app = App::new(root).test_client();

    let r = app.get("/missing").dispatch().await;
    assert_eq!(r.status(), StatusCode::NOT_FOUND);
    assert_eq!("root 404", r.body());

    let r = app.get("/a").dispatch().await;
    assert_eq!("a 404", r.body());

    let r = app.get("/a/b/c").dispatch().await;
    assert_eq!("a 404", r.body());

    let r = app.get("/a/b").dispatch().await;
    assert_eq!("b", r.body());
}

#[tokio::test]
async fn test_method_mismatch_is_not_found() {
    let root = hello().group(
        "items",
        RouteNode::new()
            .methods([Method::POST, Method::DELETE])
            .respond(Declaration::new().content(|input| format!("{}", input.method())))
            .respond(
                Declaration::new()
                    .methods([Method::DELETE])
                    .query(QuerySpec::new().required("id"))
                    .content(|input| format!("deleted {}", input.query().get("id").unwrap())),
            ),
    );
    let app = App::new(root).test_client();

    assert_eq!(app.post("/").dispatch().await.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.get("/items").dispatch().await.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.post("/items").dispatch().await.body(), "POST");
    assert_eq!(app.delete("/items").dispatch().await.body(), "DELETE");
    assert_eq!(app.delete("/items?id=7").dispatch().await.body(), "deleted 7");
    assert_eq!(app.put("/items").dispatch().await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_head_follows_get() {
    let app = App::new(hello()).test_client();

    let r = app.head("/").dispatch().await;
    assert_eq!(r.status(), StatusCode::OK);
    assert_eq!(r.headers()["content-length"], "6");
    assert_eq!("", r.body());
}

#[tokio::test]
async fn test_equivalent_paths_route_alike() {
    let root = RouteNode::new().group(
        "a/b",
        RouteNode::new().respond(Declaration::new().content(|_| "ab")),
    );
    let app = App::new(root).test_client();

    for path in ["/a/b", "//a//b/", "/a/./b", "/a/c/../b", "/../a/b", "/a%2Fb/../a/b"] {
        let r = app.get(path).dispatch().await;
        assert_eq!("ab", r.body(), "{}", path);
    }
}

#[tokio::test]
async fn test_query_overloads() {
    let root = RouteNode::new()
        .respond(
            Declaration::new()
                .query(QuerySpec::new().required("a").required("b"))
                .content(|_| "ab"),
        )
        .respond(
            Declaration::new()
                .query(QuerySpec::new().required("a").required("c"))
                .content(|_| "ac"),
        )
        .respond(Declaration::new().content(|_| "void"));
    let app = App::new(root).test_client();

    assert_eq!("void", app.get("/").dispatch().await.body());
    assert_eq!("ab", app.get("/?a=1&b=2").dispatch().await.body());
    assert_eq!("ac", app.get("/?c=3&a=1").dispatch().await.body());
    assert_eq!(
        app.get("/?a=1").dispatch().await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        app.get("/?a=1&b=2&c=3").dispatch().await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_ambiguous_declarations() {
    let root = RouteNode::new()
        .respond(Declaration::new().content(|_| "one"))
        .respond(Declaration::new().content(|_| "two"));
    let app = App::new(root).test_client();

    let r = app.get("/").dispatch().await;
    assert_eq!(r.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_header_matchers_outrank_unconstrained() {
    let root = RouteNode::new()
        .respond(Declaration::new().content(|_| "plain"))
        .respond(
            Declaration::new()
                .header(HeaderMatcher::equals(
                    hyper::header::ACCEPT,
                    hyper::header::HeaderValue::from_static("application/json"),
                ))
                .content(|_| reply::json(&["json"])),
        );
    let app = App::new(root).test_client();

    assert_eq!("plain", app.get("/").dispatch().await.body());
    assert_eq!(
        r#"["json"]"#,
        app.get("/").header("accept", "application/json").dispatch().await.body()
    );
}

#[tokio::test]
async fn test_handler_errors_close_the_connection() {
    let root = RouteNode::new()
        .respond(
            Declaration::new().handle(|_| async { Err::<Option<&'static str>, _>("database down") }),
        )
        .group(
            "none",
            RouteNode::new().respond(Declaration::new().optional_content(|_| None::<String>)),
        );
    let app = App::new(root).test_client();

    let r = app.get("/").dispatch().await;
    assert_eq!(r.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(r.headers()[CONNECTION], "close");

    let r = app.get("/none").dispatch().await;
    assert_eq!(r.status(), StatusCode::NOT_FOUND);
    assert!(r.headers().get(CONNECTION).is_none());
}

#[tokio::test]
async fn test_completion_tokens() {
    let root = RouteNode::new()
        .respond(Declaration::new().complete_with(|input, c: Completion| {
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                c.complete(format!("done {}", input.uri().path()));
            });
        }))
        .group(
            "dropped",
            RouteNode::new().respond(Declaration::new().complete_with(|_, c: Completion| drop(c))),
        );
    let app = App::new(root).test_client();

    assert_eq!("done /", app.get("/").dispatch().await.body());
    assert_eq!(
        app.get("/dropped").dispatch().await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_subpath_capture() {
    let root = RouteNode::new()
        .group(
            "files",
            RouteNode::new()
                .respond(
                    Declaration::new()
                        .subpath(|p| Filter::from((p.len() == 2).then(|| p.clone())))
                        .content(|input| format!("two: {}", input.subpath())),
                )
                .group("exact", RouteNode::new().respond(Declaration::new().content(|_| "exact"))),
        );
    let app = App::new(root).test_client();

    assert_eq!("exact", app.get("/files/exact").dispatch().await.body());
    assert_eq!("two: x/y", app.get("/files/x/y").dispatch().await.body());
    assert_eq!("two: exact/y", app.get("/files/exact/y").dispatch().await.body());
    assert_eq!(
        app.get("/files/x").dispatch().await.status(),
        StatusCode::NOT_FOUND
    );
}
