use async_trait::async_trait;
use insta_client::{DashboardData, InstaClient, InstaClientResult, PostsTable, TableQuery};

/// Операции backend API, которые использует ядро дашборда.
///
/// Реализован для [`InstaClient`]; в тестах подменяется фейком.
#[async_trait]
pub trait DashboardApi: Send + Sync + 'static {
    /// Страница таблицы постов под фильтр.
    async fn fetch_table(&self, username: &str, query: &TableQuery) -> InstaClientResult<PostsTable>;

    /// Все посты для аналитических страниц.
    async fn fetch_dashboard(&self, username: &str) -> InstaClientResult<DashboardData>;

    /// Запуск обновления метрик на сервере.
    async fn sync_posts(&self, username: &str) -> InstaClientResult<()>;

    /// Назначение категории посту.
    async fn assign_category(
        &self,
        username: &str,
        post_id: &str,
        category_id: Option<&str>,
    ) -> InstaClientResult<()>;

    /// Назначение подкатегории посту.
    async fn assign_subcategory(
        &self,
        username: &str,
        post_id: &str,
        subcategory_id: Option<&str>,
    ) -> InstaClientResult<()>;
}

#[async_trait]
impl DashboardApi for InstaClient {
    async fn fetch_table(&self, username: &str, query: &TableQuery) -> InstaClientResult<PostsTable> {
        InstaClient::fetch_table(self, username, query).await
    }

    async fn fetch_dashboard(&self, username: &str) -> InstaClientResult<DashboardData> {
        InstaClient::fetch_dashboard(self, username).await
    }

    async fn sync_posts(&self, username: &str) -> InstaClientResult<()> {
        InstaClient::sync_posts(self, username).await
    }

    async fn assign_category(
        &self,
        username: &str,
        post_id: &str,
        category_id: Option<&str>,
    ) -> InstaClientResult<()> {
        InstaClient::assign_category(self, username, post_id, category_id).await
    }

    async fn assign_subcategory(
        &self,
        username: &str,
        post_id: &str,
        subcategory_id: Option<&str>,
    ) -> InstaClientResult<()> {
        InstaClient::assign_subcategory(self, username, post_id, subcategory_id).await
    }
}
