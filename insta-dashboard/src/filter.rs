//! Активный фильтр таблицы постов.
//!
//! Предикаты независимы и комбинируются через логическое И; пустое множество
//! означает «без ограничения». Любое изменение предиката сбрасывает страницу
//! на первую и сообщает вызывающему, какую страницу нужно загрузить.

use std::collections::BTreeSet;

use chrono::{DateTime, TimeDelta, Utc};
use insta_client::{MediaType, Pagination, Post, SortDirection, SortField, TableQuery};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// Снимок выбранных предикатов, сортировки и страницы.
pub struct FilterSelection {
    media_types: BTreeSet<MediaType>,
    categories: BTreeSet<String>,
    subcategories: BTreeSet<String>,
    days: u32,
    sort_field: SortField,
    sort_direction: SortDirection,
    page: u32,
}

impl Default for FilterSelection {
    fn default() -> Self {
        Self {
            media_types: BTreeSet::new(),
            categories: BTreeSet::new(),
            subcategories: BTreeSet::new(),
            days: 0,
            sort_field: SortField::default(),
            sort_direction: SortDirection::default(),
            page: 1,
        }
    }
}

impl FilterSelection {
    /// Выбранные типы публикаций (`Reel` хранится как `Video`).
    pub fn media_types(&self) -> &BTreeSet<MediaType> {
        &self.media_types
    }

    /// Выбранные категории.
    pub fn categories(&self) -> &BTreeSet<String> {
        &self.categories
    }

    /// Выбранные подкатегории; всегда пусто, если категории не выбраны.
    pub fn subcategories(&self) -> &BTreeSet<String> {
        &self.subcategories
    }

    /// Окно в днях, `0` означает всё время.
    pub fn days(&self) -> u32 {
        self.days
    }

    /// Поле сортировки.
    pub fn sort_field(&self) -> SortField {
        self.sort_field
    }

    /// Направление сортировки.
    pub fn sort_direction(&self) -> SortDirection {
        self.sort_direction
    }

    /// Текущая страница (с единицы).
    pub fn page(&self) -> u32 {
        self.page
    }

    /// Нижняя граница даты публикации для окна `days`.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        (self.days > 0).then(|| days_before(now, self.days))
    }

    /// Проверяет тип публикации.
    pub fn matches_media_type(&self, post: &Post) -> bool {
        self.media_types.is_empty() || self.media_types.contains(&post.media_type.normalized())
    }

    /// Проверяет категорию.
    pub fn matches_category(&self, post: &Post) -> bool {
        self.categories.is_empty()
            || post
                .category_id
                .as_ref()
                .is_some_and(|id| self.categories.contains(id))
    }

    /// Проверяет подкатегорию.
    pub fn matches_subcategory(&self, post: &Post) -> bool {
        self.subcategories.is_empty()
            || post
                .subcategory_id
                .as_ref()
                .is_some_and(|id| self.subcategories.contains(id))
    }

    /// Проверяет окно по дате публикации.
    pub fn matches_window(&self, post: &Post, now: DateTime<Utc>) -> bool {
        self.cutoff(now).is_none_or(|cutoff| post.published_at >= cutoff)
    }

    /// Конъюнкция всех предикатов.
    pub fn matches(&self, post: &Post, now: DateTime<Utc>) -> bool {
        self.matches_media_type(post)
            && self.matches_category(post)
            && self.matches_subcategory(post)
            && self.matches_window(post, now)
    }

    /// `true`, если не задан ни один предикат.
    pub fn is_unfiltered(&self) -> bool {
        self.media_types.is_empty()
            && self.categories.is_empty()
            && self.subcategories.is_empty()
            && self.days == 0
    }

    /// Параметры запроса таблицы для текущей страницы.
    pub fn to_query(&self) -> TableQuery {
        TableQuery {
            media_types: self.media_types.iter().copied().collect(),
            categories: self.categories.iter().cloned().collect(),
            subcategories: self.subcategories.iter().cloned().collect(),
            days: self.days,
            page: self.page,
            sort_field: self.sort_field,
            sort_direction: self.sort_direction,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Требование перезагрузить таблицу с указанной страницы.
pub struct Refetch {
    /// Страница, которую нужно загрузить.
    pub page: u32,
}

#[derive(Debug, Clone, Default)]
/// Владелец [`FilterSelection`]: единственное место, где фильтр меняется.
pub struct FilterState {
    selection: FilterSelection,
}

impl FilterState {
    /// Фильтр по умолчанию: всё время, `published_at desc`, страница 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Текущий снимок фильтра.
    pub fn selection(&self) -> &FilterSelection {
        &self.selection
    }

    fn changed(&mut self) -> Refetch {
        self.selection.page = 1;
        Refetch { page: 1 }
    }

    /// Заменяет множество типов публикаций.
    pub fn set_media_types(&mut self, types: impl IntoIterator<Item = MediaType>) -> Refetch {
        self.selection.media_types = types.into_iter().map(MediaType::normalized).collect();
        self.changed()
    }

    /// Включает или выключает тип публикации.
    pub fn toggle_media_type(&mut self, media_type: MediaType) -> Refetch {
        let media_type = media_type.normalized();
        if !self.selection.media_types.remove(&media_type) {
            self.selection.media_types.insert(media_type);
        }
        self.changed()
    }

    /// Заменяет множество категорий.
    ///
    /// Пустой набор категорий очищает и подкатегории.
    pub fn set_categories(&mut self, categories: impl IntoIterator<Item = String>) -> Refetch {
        self.selection.categories = categories.into_iter().collect();
        self.enforce_subcategory_scope();
        self.changed()
    }

    /// Включает или выключает категорию.
    pub fn toggle_category(&mut self, category_id: &str) -> Refetch {
        if !self.selection.categories.remove(category_id) {
            self.selection.categories.insert(category_id.to_string());
        }
        self.enforce_subcategory_scope();
        self.changed()
    }

    /// Заменяет множество подкатегорий; без выбранных категорий набор остаётся пустым.
    pub fn set_subcategories(&mut self, subcategories: impl IntoIterator<Item = String>) -> Refetch {
        self.selection.subcategories = subcategories.into_iter().collect();
        self.enforce_subcategory_scope();
        self.changed()
    }

    /// Включает или выключает подкатегорию.
    ///
    /// Возвращает `None`, если категории не выбраны: фильтр не меняется.
    pub fn toggle_subcategory(&mut self, subcategory_id: &str) -> Option<Refetch> {
        if self.selection.categories.is_empty() {
            return None;
        }
        if !self.selection.subcategories.remove(subcategory_id) {
            self.selection.subcategories.insert(subcategory_id.to_string());
        }
        Some(self.changed())
    }

    /// Устанавливает окно в днях (`0` означает всё время).
    pub fn set_days(&mut self, days: u32) -> Refetch {
        self.selection.days = days;
        self.changed()
    }

    /// Меняет сортировку. По умолчанию загружается первая страница,
    /// но вызывающий может сохранить текущую, передав `page`.
    pub fn set_sort(
        &mut self,
        field: SortField,
        direction: SortDirection,
        page: Option<u32>,
    ) -> Refetch {
        self.selection.sort_field = field;
        self.selection.sort_direction = direction;
        let page = page.unwrap_or(1).max(1);
        self.selection.page = page;
        Refetch { page }
    }

    /// Переходит на страницу `page`.
    pub fn set_page(&mut self, page: u32) -> Refetch {
        let page = page.max(1);
        self.selection.page = page;
        Refetch { page }
    }

    /// Сбрасывает все предикаты и сортировку к значениям по умолчанию.
    pub fn reset(&mut self) -> Refetch {
        self.selection = FilterSelection::default();
        Refetch { page: 1 }
    }

    /// Согласует локальную страницу с пагинацией, которую вернул сервер.
    ///
    /// Возвращает `true`, если страница изменилась.
    pub fn reconcile(&mut self, pagination: &Pagination) -> bool {
        let mut page = pagination.page.max(1);
        if pagination.total_pages > 0 {
            page = page.min(pagination.total_pages);
        }
        let changed = self.selection.page != page;
        self.selection.page = page;
        changed
    }

    fn enforce_subcategory_scope(&mut self) {
        if self.selection.categories.is_empty() {
            self.selection.subcategories.clear();
        }
    }
}

/// `now` минус `days` суток; окно за пределами календаря chrono начинается с самой ранней даты.
pub(crate) fn days_before(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    TimeDelta::try_days(i64::from(days))
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
