//! Коллекция постов текущего фильтра.
//!
//! Состояние живёт в `watch`-канале: каждая загрузка заменяет посты,
//! справочники и пагинацию одной операцией, поэтому читатель не увидит
//! посты одного фильтра вместе с пагинацией другого.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use insta_client::{
    Category, DashboardData, InstaClientResult, Pagination, Post, PostsTable, Subcategory,
};
use tokio::sync::watch;

use crate::api::DashboardApi;
use crate::filter::FilterSelection;

#[derive(Debug, Clone, PartialEq, Default)]
/// Содержимое коллекции, видимое читателям.
pub struct CollectionState {
    /// Посты.
    pub posts: Vec<Post>,
    /// Категории аккаунта.
    pub categories: Vec<Category>,
    /// Подкатегории аккаунта.
    pub subcategories: Vec<Subcategory>,
    /// Пагинация последней применённой загрузки.
    pub pagination: Pagination,
    /// Идёт загрузка.
    pub loading: bool,
    /// Ошибка последней загрузки.
    pub error: Option<String>,
    /// Растёт при любом изменении постов или справочников.
    pub revision: u64,
    /// Растёт только при полной замене коллекции (загрузка, broadcast, очистка).
    pub generation: u64,
}

impl CollectionState {
    /// Подкатегория по идентификатору.
    pub fn subcategory(&self, id: &str) -> Option<&Subcategory> {
        self.subcategories.iter().find(|s| s.id == id)
    }

    /// Пост по идентификатору.
    pub fn post(&self, id: &str) -> Option<&Post> {
        self.posts.iter().find(|p| p.id == id)
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Полный набор данных для замены коллекции.
pub struct CollectionPayload {
    /// Посты.
    pub posts: Vec<Post>,
    /// Категории.
    pub categories: Vec<Category>,
    /// Подкатегории.
    pub subcategories: Vec<Subcategory>,
    /// Пагинация; `None` сохраняет текущую.
    pub pagination: Option<Pagination>,
}

impl From<PostsTable> for CollectionPayload {
    fn from(value: PostsTable) -> Self {
        Self {
            posts: value.posts,
            categories: value.categories,
            subcategories: value.subcategories,
            pagination: Some(value.pagination),
        }
    }
}

impl From<DashboardData> for CollectionPayload {
    fn from(value: DashboardData) -> Self {
        let total = value.posts.len() as u64;
        Self {
            posts: value.posts,
            categories: value.categories,
            subcategories: value.subcategories,
            pagination: Some(Pagination {
                page: 1,
                total_pages: u32::from(total > 0),
                total,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Чем закончилась загрузка.
pub enum LoadOutcome {
    /// Ответ применён к коллекции.
    Applied,
    /// Нет авторизованного аккаунта: запрос не отправлялся, коллекция очищена.
    Skipped,
    /// Пока запрос выполнялся, был запущен более новый; ответ отброшен.
    Superseded,
}

/// Хранилище постов, категорий и пагинации для одного представления.
pub struct PostCollectionStore<A> {
    api: Arc<A>,
    state: watch::Sender<CollectionState>,
    sequence: AtomicU64,
}

impl<A: DashboardApi> PostCollectionStore<A> {
    /// Создаёт пустое хранилище поверх API.
    pub fn new(api: Arc<A>) -> Self {
        Self {
            api,
            state: watch::channel(CollectionState::default()).0,
            sequence: AtomicU64::new(0),
        }
    }

    /// API, через которое хранилище загружает данные.
    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    /// Копия текущего состояния.
    pub fn snapshot(&self) -> CollectionState {
        self.state.borrow().clone()
    }

    /// Читает состояние без копирования.
    pub fn read<R>(&self, f: impl FnOnce(&CollectionState) -> R) -> R {
        f(&self.state.borrow())
    }

    /// Подписка на изменения коллекции.
    pub fn subscribe(&self) -> watch::Receiver<CollectionState> {
        self.state.subscribe()
    }

    /// Загружает страницу таблицы для фильтра `filter`.
    ///
    /// Без имени аккаунта запрос не отправляется, а коллекция очищается.
    /// Если за время запроса был запущен другой, ответ отбрасывается.
    pub async fn load(
        &self,
        username: Option<&str>,
        filter: &FilterSelection,
    ) -> InstaClientResult<LoadOutcome> {
        let Some(username) = username.map(str::trim).filter(|u| !u.is_empty()) else {
            tracing::debug!("no authenticated account, clearing posts table");
            self.clear();
            return Ok(LoadOutcome::Skipped);
        };

        let query = filter.to_query();
        let seq = self.begin();
        tracing::debug!(seq, page = query.page, "loading posts table");

        let result = self.api.fetch_table(username, &query).await;
        self.finish(seq, result.map(CollectionPayload::from))
    }

    /// Загружает все посты аккаунта без пагинации (аналитические страницы).
    pub async fn load_dashboard(&self, username: Option<&str>) -> InstaClientResult<LoadOutcome> {
        let Some(username) = username.map(str::trim).filter(|u| !u.is_empty()) else {
            self.clear();
            return Ok(LoadOutcome::Skipped);
        };

        let seq = self.begin();
        tracing::debug!(seq, "loading dashboard posts");

        let result = self.api.fetch_dashboard(username).await;
        self.finish(seq, result.map(CollectionPayload::from))
    }

    /// Заменяет коллекцию готовыми данными без сетевого запроса.
    pub fn apply_payload(&self, payload: CollectionPayload) {
        self.state.send_modify(|state| {
            state.posts = payload.posts;
            state.categories = payload.categories;
            state.subcategories = payload.subcategories;
            if let Some(pagination) = payload.pagination {
                state.pagination = pagination;
            }
            state.error = None;
            state.revision += 1;
            state.generation += 1;
        });
    }

    /// Очищает коллекцию и отбрасывает ответы незавершённых загрузок.
    pub fn clear(&self) {
        self.sequence.fetch_add(1, Ordering::SeqCst);
        self.state.send_modify(|state| {
            state.posts.clear();
            state.categories.clear();
            state.subcategories.clear();
            state.pagination = Pagination::default();
            state.loading = false;
            state.error = None;
            state.revision += 1;
            state.generation += 1;
        });
    }

    /// Применяет локальную правку постов и возвращает `(revision, generation)` после неё.
    pub(crate) fn modify_posts(&self, mutate: impl FnOnce(&mut Vec<Post>)) -> (u64, u64) {
        let mut marks = (0, 0);
        self.state.send_modify(|state| {
            mutate(&mut state.posts);
            state.revision += 1;
            marks = (state.revision, state.generation);
        });
        marks
    }

    /// Восстанавливает снимок постов, если коллекцию с тех пор не заменили целиком.
    pub(crate) fn restore_posts(&self, generation: u64, snapshot: Vec<Post>) -> bool {
        self.state.send_if_modified(|state| {
            if state.generation != generation {
                return false;
            }
            state.posts = snapshot;
            state.revision += 1;
            true
        })
    }

    fn begin(&self) -> u64 {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_modify(|state| {
            state.loading = true;
            state.error = None;
        });
        seq
    }

    fn finish(
        &self,
        seq: u64,
        result: InstaClientResult<CollectionPayload>,
    ) -> InstaClientResult<LoadOutcome> {
        if self.sequence.load(Ordering::SeqCst) != seq {
            tracing::debug!(seq, "discarding stale response");
            return Ok(LoadOutcome::Superseded);
        }

        match result {
            Ok(payload) => {
                self.state.send_modify(|state| {
                    state.posts = payload.posts;
                    state.categories = payload.categories;
                    state.subcategories = payload.subcategories;
                    if let Some(pagination) = payload.pagination {
                        state.pagination = pagination;
                    }
                    state.loading = false;
                    state.error = None;
                    state.revision += 1;
                    state.generation += 1;
                });
                tracing::debug!(seq, "posts loaded");
                Ok(LoadOutcome::Applied)
            }
            Err(err) => {
                tracing::warn!(seq, error = %err, "failed to load posts");
                self.state.send_modify(|state| {
                    state.loading = false;
                    state.error = Some(err.to_string());
                });
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterState;
    use crate::testing::{FakeApi, fetch_error, post, table};
    use insta_client::InstaClientError;

    fn store() -> (Arc<FakeApi>, Arc<PostCollectionStore<FakeApi>>) {
        let api = Arc::new(FakeApi::default());
        let store = Arc::new(PostCollectionStore::new(api.clone()));
        (api, store)
    }

    #[tokio::test]
    async fn load_replaces_posts_and_pagination() {
        let (api, store) = store();
        api.push_table(Ok(table(vec![post("1"), post("2")], 2, 3)));

        let mut filter = FilterState::new();
        filter.set_page(2);
        let outcome = store
            .load(Some("acme"), filter.selection())
            .await
            .expect("load must succeed");

        assert_eq!(outcome, LoadOutcome::Applied);
        let state = store.snapshot();
        assert_eq!(state.posts.len(), 2);
        assert_eq!(state.categories.len(), 2);
        assert_eq!(state.pagination.page, 2);
        assert_eq!(state.pagination.total_pages, 3);
        assert!(!state.loading);
        assert_eq!(api.queries()[0].page, 2);
    }

    #[tokio::test]
    async fn missing_username_clears_without_request() {
        let (api, store) = store();
        store.apply_payload(table(vec![post("1")], 1, 1).into());

        let outcome = store
            .load(None, &FilterSelection::default())
            .await
            .expect("skip is not an error");
        assert_eq!(outcome, LoadOutcome::Skipped);
        assert!(store.snapshot().posts.is_empty());

        let outcome = store
            .load(Some("  "), &FilterSelection::default())
            .await
            .expect("skip is not an error");
        assert_eq!(outcome, LoadOutcome::Skipped);
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_load_keeps_previous_posts_and_records_error() {
        let (api, store) = store();
        store.apply_payload(table(vec![post("1")], 1, 1).into());
        api.push_table(Err(fetch_error("backend down")));

        let err = store
            .load(Some("acme"), &FilterSelection::default())
            .await
            .expect_err("must fail");
        assert!(matches!(err, InstaClientError::Fetch { .. }));

        let state = store.snapshot();
        assert_eq!(state.posts.len(), 1);
        assert!(!state.loading);
        assert!(state.error.as_deref().is_some_and(|e| e.contains("backend down")));
    }

    #[tokio::test]
    async fn stale_response_does_not_overwrite_newer_one() {
        let (api, store) = store();
        let release_first = api.push_gated_table(Ok(table(vec![post("old")], 1, 1)));
        api.push_table(Ok(table(vec![post("new")], 1, 1)));

        let slow = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .load(Some("acme"), &FilterSelection::default())
                    .await
            })
        };
        while api.calls().is_empty() {
            tokio::task::yield_now().await;
        }
        assert!(store.snapshot().loading);

        let fast = store
            .load(Some("acme"), &FilterSelection::default())
            .await
            .expect("second load must succeed");
        assert_eq!(fast, LoadOutcome::Applied);

        release_first.send(()).expect("first load waiting");
        let slow = slow.await.expect("task").expect("stale load is not an error");
        assert_eq!(slow, LoadOutcome::Superseded);
        assert_eq!(store.snapshot().posts[0].id, "new");
    }

    #[tokio::test]
    async fn readers_never_see_mixed_state() {
        let (api, store) = store();
        api.push_table(Ok(table(vec![post("1"), post("2")], 3, 5)));
        let mut rx = store.subscribe();

        store
            .load(Some("acme"), &FilterSelection::default())
            .await
            .expect("load must succeed");

        rx.changed().await.expect("store alive");
        let state = rx.borrow_and_update().clone();
        assert_eq!(state.posts.len(), 2);
        assert_eq!(state.pagination.page, 3);
    }

    #[tokio::test]
    async fn dashboard_load_uses_single_page() {
        let (api, store) = store();
        api.push_dashboard(Ok(DashboardData {
            posts: vec![post("1"), post("2"), post("3")],
            categories: Vec::new(),
            subcategories: Vec::new(),
        }));

        let outcome = store
            .load_dashboard(Some("acme"))
            .await
            .expect("load must succeed");
        assert_eq!(outcome, LoadOutcome::Applied);
        let state = store.snapshot();
        assert_eq!(state.pagination.total, 3);
        assert_eq!(state.pagination.total_pages, 1);
        assert_eq!(api.calls(), vec!["dashboard:acme".to_string()]);
    }

    #[test]
    fn restore_is_skipped_after_full_replacement() {
        let store = PostCollectionStore::new(Arc::new(FakeApi::default()));
        store.apply_payload(table(vec![post("1")], 1, 1).into());

        let snapshot = store.snapshot().posts;
        let (_, generation) = store.modify_posts(|posts| posts.clear());
        store.apply_payload(table(vec![post("2")], 1, 1).into());

        assert!(!store.restore_posts(generation, snapshot));
        assert_eq!(store.snapshot().posts[0].id, "2");
    }
}
