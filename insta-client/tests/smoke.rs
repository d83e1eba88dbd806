use insta_client::{InstaClient, TableQuery};

fn live_client() -> (InstaClient, String) {
    let base_url =
        std::env::var("INSTA_API_URL").unwrap_or_else(|_| "http://127.0.0.1:3000".to_string());
    let username = std::env::var("INSTA_USERNAME").expect("INSTA_USERNAME must be set");
    let client = InstaClient::new(base_url).expect("base url must be valid");
    (client, username)
}

#[tokio::test]
#[ignore = "requires running backend with an authenticated account"]
async fn live_table_and_dashboard_flow() {
    let (client, username) = live_client();

    let table = client
        .fetch_table(&username, &TableQuery::default())
        .await
        .expect("fetch_table must succeed");
    assert!(table.pagination.page >= 1);
    assert!(table.posts.len() as u64 <= table.pagination.total);

    let dashboard = client
        .fetch_dashboard(&username)
        .await
        .expect("fetch_dashboard must succeed");
    assert!(dashboard.posts.len() >= table.posts.len());

    let categories = client
        .list_categories(&username)
        .await
        .expect("list_categories must succeed");
    assert!(categories.iter().all(|c| !c.id.is_empty()));
}

#[tokio::test]
#[ignore = "requires running backend with an authenticated account"]
async fn live_sync_flow() {
    let (client, username) = live_client();
    client
        .sync_posts(&username)
        .await
        .expect("sync_posts must succeed");
}
