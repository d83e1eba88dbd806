//! Контроллер страницы «таблица постов».
//!
//! Связывает фильтр с хранилищем: каждое изменение фильтра загружает ту
//! страницу, которую оно запросило, а после применённой загрузки локальная
//! страница согласуется с пагинацией сервера. Если запрошенной страницы у
//! сервера нет, один раз догружается последняя существующая.

use std::sync::Arc;

use insta_client::{InstaClientResult, MediaType, SortDirection, SortField};
use tokio::sync::Mutex;

use crate::api::DashboardApi;
use crate::filter::{FilterSelection, FilterState, Refetch};
use crate::optimistic::{self, MutationOutcome, SubcategoryPolicy};
use crate::state::AppState;
use crate::store::{LoadOutcome, PostCollectionStore};

/// Владелец фильтра и коллекции одной таблицы.
pub struct TableController<A> {
    filter: Mutex<FilterState>,
    store: Arc<PostCollectionStore<A>>,
    app: AppState,
    policy: SubcategoryPolicy,
}

impl<A: DashboardApi> TableController<A> {
    /// Создаёт контроллер с фильтром по умолчанию.
    pub fn new(store: Arc<PostCollectionStore<A>>, app: AppState) -> Self {
        Self::with_filter(store, app, FilterState::new())
    }

    /// Создаёт контроллер с заранее собранным фильтром; загрузки не выполняет.
    pub fn with_filter(store: Arc<PostCollectionStore<A>>, app: AppState, filter: FilterState) -> Self {
        Self {
            filter: Mutex::new(filter),
            store,
            app,
            policy: SubcategoryPolicy::default(),
        }
    }

    /// Задаёт проверку подкатегорий при назначении.
    pub fn with_policy(mut self, policy: SubcategoryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Хранилище таблицы.
    pub fn store(&self) -> &Arc<PostCollectionStore<A>> {
        &self.store
    }

    /// Снимок текущего фильтра.
    pub async fn selection(&self) -> FilterSelection {
        self.filter.lock().await.selection().clone()
    }

    /// Перезагружает текущую страницу с текущим фильтром.
    pub async fn reload(&self) -> InstaClientResult<LoadOutcome> {
        let selection = self.selection().await;
        self.load(selection).await
    }

    /// Заменяет типы публикаций.
    pub async fn set_media_types(
        &self,
        types: impl IntoIterator<Item = MediaType>,
    ) -> InstaClientResult<LoadOutcome> {
        self.change(|filter| filter.set_media_types(types)).await
    }

    /// Включает или выключает тип публикации.
    pub async fn toggle_media_type(&self, media_type: MediaType) -> InstaClientResult<LoadOutcome> {
        self.change(|filter| filter.toggle_media_type(media_type)).await
    }

    /// Заменяет категории.
    pub async fn set_categories(
        &self,
        categories: impl IntoIterator<Item = String>,
    ) -> InstaClientResult<LoadOutcome> {
        self.change(|filter| filter.set_categories(categories)).await
    }

    /// Включает или выключает категорию.
    pub async fn toggle_category(&self, category_id: &str) -> InstaClientResult<LoadOutcome> {
        self.change(|filter| filter.toggle_category(category_id)).await
    }

    /// Заменяет подкатегории.
    pub async fn set_subcategories(
        &self,
        subcategories: impl IntoIterator<Item = String>,
    ) -> InstaClientResult<LoadOutcome> {
        self.change(|filter| filter.set_subcategories(subcategories)).await
    }

    /// Включает или выключает подкатегорию.
    ///
    /// `None`: категории не выбраны, фильтр не изменился и запроса не было.
    pub async fn toggle_subcategory(
        &self,
        subcategory_id: &str,
    ) -> InstaClientResult<Option<LoadOutcome>> {
        let selection = {
            let mut filter = self.filter.lock().await;
            match filter.toggle_subcategory(subcategory_id) {
                Some(refetch) => Self::requested(&filter, refetch),
                None => return Ok(None),
            }
        };
        self.load(selection).await.map(Some)
    }

    /// Устанавливает окно в днях.
    pub async fn set_days(&self, days: u32) -> InstaClientResult<LoadOutcome> {
        self.change(|filter| filter.set_days(days)).await
    }

    /// Меняет сортировку; `page = None` загружает первую страницу.
    pub async fn set_sort(
        &self,
        field: SortField,
        direction: SortDirection,
        page: Option<u32>,
    ) -> InstaClientResult<LoadOutcome> {
        self.change(|filter| filter.set_sort(field, direction, page)).await
    }

    /// Переходит на страницу `page`.
    pub async fn go_to_page(&self, page: u32) -> InstaClientResult<LoadOutcome> {
        self.change(|filter| filter.set_page(page)).await
    }

    /// Сбрасывает фильтр и загружает первую страницу.
    pub async fn reset(&self) -> InstaClientResult<LoadOutcome> {
        self.change(FilterState::reset).await
    }

    /// Назначает посту категорию оптимистично.
    pub async fn assign_category(
        &self,
        post_id: &str,
        category_id: Option<&str>,
    ) -> InstaClientResult<MutationOutcome<()>> {
        let username = self.app.username();
        optimistic::assign_category(&self.store, username.as_deref(), post_id, category_id).await
    }

    /// Назначает посту подкатегорию оптимистично.
    pub async fn assign_subcategory(
        &self,
        post_id: &str,
        subcategory_id: Option<&str>,
    ) -> InstaClientResult<MutationOutcome<()>> {
        let username = self.app.username();
        optimistic::assign_subcategory(
            &self.store,
            username.as_deref(),
            post_id,
            subcategory_id,
            self.policy,
        )
        .await
    }

    async fn change(
        &self,
        mutate: impl FnOnce(&mut FilterState) -> Refetch,
    ) -> InstaClientResult<LoadOutcome> {
        let selection = {
            let mut filter = self.filter.lock().await;
            let refetch = mutate(&mut filter);
            Self::requested(&filter, refetch)
        };
        self.load(selection).await
    }

    fn requested(filter: &FilterState, refetch: Refetch) -> FilterSelection {
        debug_assert_eq!(filter.selection().page(), refetch.page);
        filter.selection().clone()
    }

    async fn load(&self, selection: FilterSelection) -> InstaClientResult<LoadOutcome> {
        let (outcome, clamped) = self.load_once(&selection).await?;
        match clamped {
            Some(clamped) => {
                tracing::debug!(page = clamped.page(), "loading page clamped by backend");
                self.load_once(&clamped).await.map(|(outcome, _)| outcome)
            }
            None => Ok(outcome),
        }
    }

    /// Загружает `selection`; второе значение задано, если сервер сузил
    /// диапазон страниц и в хранилище лежит не та страница, что в фильтре.
    async fn load_once(
        &self,
        selection: &FilterSelection,
    ) -> InstaClientResult<(LoadOutcome, Option<FilterSelection>)> {
        let username = self.app.username();
        let outcome = self.store.load(username.as_deref(), selection).await?;
        if outcome != LoadOutcome::Applied {
            return Ok((outcome, None));
        }

        let pagination = self.store.read(|state| state.pagination);
        let clamped = {
            let mut filter = self.filter.lock().await;
            // фильтр успели поменять: его загрузка сама согласует страницу
            let reconciled = *filter.selection() == *selection && filter.reconcile(&pagination);
            (reconciled && filter.selection().page() != pagination.page)
                .then(|| filter.selection().clone())
        };

        self.store
            .read(|state| self.app.record_metrics_update(&state.posts));
        Ok((outcome, clamped))
    }
}
