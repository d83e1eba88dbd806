use insta_client::{
    ClientOptions, InstaClient, InstaClientError, MediaType, SortDirection, SortField, TableQuery,
};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn table_body() -> serde_json::Value {
    json!({
        "posts": [
            {
                "id": "1",
                "caption": "sunset",
                "media_type": "VIDEO",
                "published_at": "2026-05-01T12:00:00Z",
                "metrics_updated_at": "2026-05-03T08:00:00Z",
                "category_id": "c1",
                "subcategory_id": null,
                "views": 100,
                "likes": 7
            },
            {
                "id": "2",
                "caption": null,
                "media_type": "CAROUSEL_ALBUM",
                "published_at": "2026-04-20T09:30:00Z",
                "category_id": null
            }
        ],
        "categories": [{ "id": "c1", "name": "Travel", "color_index": 3 }],
        "subcategories": [{ "id": "s1", "name": "Beach", "category_id": "c1" }],
        "pagination": { "page": 2, "totalPages": 5, "total": 42 }
    })
}

#[tokio::test]
async fn fetch_table_sends_filter_params_and_maps_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/posts/table"))
        .and(query_param("username", "acme"))
        .and(query_param("types", "IMAGE,VIDEO"))
        .and(query_param("categories", "c1"))
        .and(query_param_is_missing("subcategories"))
        .and(query_param("days", "30"))
        .and(query_param("page", "2"))
        .and(query_param("sortField", "views"))
        .and(query_param("sortDirection", "asc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(table_body()))
        .expect(1)
        .mount(&server)
        .await;

    let client = InstaClient::new(server.uri()).expect("client");
    let query = TableQuery {
        media_types: vec![MediaType::Image, MediaType::Video],
        categories: vec!["c1".to_string()],
        subcategories: vec![],
        days: 30,
        page: 2,
        sort_field: SortField::Views,
        sort_direction: SortDirection::Asc,
    };

    let table = client
        .fetch_table("acme", &query)
        .await
        .expect("fetch_table must succeed");

    assert_eq!(table.posts.len(), 2);
    assert_eq!(table.posts[0].views, 100);
    assert_eq!(table.posts[0].category_id.as_deref(), Some("c1"));
    assert_eq!(table.posts[1].media_type, MediaType::CarouselAlbum);
    assert_eq!(table.posts[1].likes, 0);
    assert_eq!(table.categories[0].color_index, 3);
    assert_eq!(table.subcategories[0].category_id, "c1");
    assert_eq!(table.pagination.page, 2);
    assert_eq!(table.pagination.total_pages, 5);
    assert_eq!(table.pagination.total, 42);
}

#[tokio::test]
async fn blank_username_never_reaches_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(table_body()))
        .expect(0)
        .mount(&server)
        .await;

    let client = InstaClient::new(server.uri()).expect("client");
    let err = client
        .fetch_table("  ", &TableQuery::default())
        .await
        .expect_err("must fail");
    assert!(matches!(err, InstaClientError::AuthRequired));

    let err = client.fetch_dashboard("").await.expect_err("must fail");
    assert!(matches!(err, InstaClientError::AuthRequired));
}

#[tokio::test]
async fn error_message_is_taken_from_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/posts/sync"))
        .and(body_json(json!({ "username": "acme" })))
        .respond_with(
            ResponseTemplate::new(502).set_body_json(json!({ "error": "instagram rate limited" })),
        )
        .mount(&server)
        .await;

    let client = InstaClient::new(server.uri()).expect("client");
    let err = client.sync_posts("acme").await.expect_err("must fail");
    match err {
        InstaClientError::Fetch { status, message } => {
            assert_eq!(status, 502);
            assert_eq!(message, "instagram rate limited");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn plain_text_error_body_is_used_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/posts/dashboard"))
        .respond_with(ResponseTemplate::new(500).set_body_string("database unavailable"))
        .mount(&server)
        .await;

    let client = InstaClient::new(server.uri()).expect("client");
    let err = client.fetch_dashboard("acme").await.expect_err("must fail");
    assert_eq!(err.status(), Some(500));
    assert!(err.to_string().contains("database unavailable"));
}

#[tokio::test]
async fn assign_category_uses_null_segment_to_unassign() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/categories/c2/posts/17"))
        .and(query_param("username", "acme"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/categories/null/posts/17"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = InstaClient::new(server.uri()).expect("client");
    client
        .assign_category("acme", "17", Some("c2"))
        .await
        .expect("assign must succeed");
    client
        .assign_category("acme", "17", None)
        .await
        .expect("unassign must succeed");
}

#[tokio::test]
async fn create_category_validates_before_sending() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/categories"))
        .and(body_json(json!({ "name": "Food" })))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({ "id": "c9", "name": "Food", "color_index": 9 })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = InstaClient::new(server.uri()).expect("client");
    let err = client
        .create_category("acme", "   ")
        .await
        .expect_err("blank name must fail");
    assert!(matches!(err, InstaClientError::Validation(_)));

    let created = client
        .create_category("acme", "  Food ")
        .await
        .expect("create must succeed");
    assert_eq!(created.id, "c9");
    assert_eq!(created.color_slot(), 9);
}

#[tokio::test]
async fn list_subcategories_scopes_by_category() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/subcategories"))
        .and(query_param("categoryId", "c1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "s1", "name": "Beach", "category_id": "c1" }
        ])))
        .mount(&server)
        .await;

    let client = InstaClient::new(server.uri()).expect("client");
    let subcategories = client
        .list_subcategories("acme", Some("c1"))
        .await
        .expect("list must succeed");
    assert_eq!(subcategories.len(), 1);
    assert_eq!(subcategories[0].name, "Beach");
}

#[tokio::test]
async fn session_cookie_is_sent_with_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/status"))
        .and(header("cookie", "connect.sid=abc"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "authenticated": true, "username": "acme" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut options = ClientOptions::new(server.uri());
    options.session_cookie = Some("connect.sid=abc".to_string());
    let client = InstaClient::with_options(options).expect("client");

    let status = client.auth_status().await.expect("status must succeed");
    assert!(status.authenticated);
    assert_eq!(status.username.as_deref(), Some("acme"));
}

#[tokio::test]
async fn unauthenticated_status_has_no_username() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "authenticated": false })))
        .mount(&server)
        .await;

    let client = InstaClient::new(server.uri()).expect("client");
    let status = client.auth_status().await.expect("status must succeed");
    assert!(!status.authenticated);
    assert!(status.username.is_none());
    assert_eq!(
        client.login_url().expect("url"),
        format!("{}/auth/facebook", server.uri())
    );
}
