//! Производные представления над коллекцией постов.
//!
//! Все функции чистые: принимают срез постов (`&[Post]` или `&[&Post]`) и
//! ничего не меняют. [`DerivedViews`] кэширует результаты и пересчитывает их
//! только при смене ревизии коллекции или фильтра.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use insta_client::{Category, InstaClientError, InstaClientResult, Metric, Pagination, Post, SortDirection, SortField};
use serde::Serialize;

use crate::filter::{FilterSelection, days_before};
use crate::store::CollectionState;

/// Подпись группы постов без категории.
pub const UNCATEGORIZED_LABEL: &str = "Uncategorized";

fn iter_posts<P: Borrow<Post>>(posts: &[P]) -> impl Iterator<Item = &Post> {
    posts.iter().map(|p| p.borrow())
}

/// Посты, прошедшие все предикаты фильтра.
pub fn filtered_posts<'a>(posts: &'a [Post], filter: &FilterSelection, now: DateTime<Utc>) -> Vec<&'a Post> {
    posts.iter().filter(|post| filter.matches(post, now)).collect()
}

fn compare_by(a: &Post, b: &Post, field: SortField) -> Ordering {
    if let Some(metric) = field.metric() {
        return a.metric(metric).cmp(&b.metric(metric));
    }
    match field {
        SortField::PublishedAt => a.published_at.cmp(&b.published_at),
        SortField::MetricsUpdatedAt => a.metrics_updated_at.cmp(&b.metrics_updated_at),
        SortField::MediaType => a.media_type.as_str().cmp(b.media_type.as_str()),
        SortField::Caption => {
            let a = a.caption.as_deref().unwrap_or_default().to_lowercase();
            let b = b.caption.as_deref().unwrap_or_default().to_lowercase();
            a.cmp(&b)
        }
        _ => Ordering::Equal,
    }
}

/// Стабильная сортировка постов по полю таблицы.
pub fn sort_posts<P: Borrow<Post>>(posts: &mut [P], field: SortField, direction: SortDirection) {
    posts.sort_by(|a, b| {
        let ordering = compare_by(a.borrow(), b.borrow(), field);
        match direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
}

#[derive(Debug, Clone, PartialEq)]
/// Страница локальной пагинации.
pub struct Page<'a, T> {
    /// Элементы страницы.
    pub items: &'a [T],
    /// Пагинация с номером, приведённым к допустимому диапазону.
    pub pagination: Pagination,
}

/// Режет срез на страницы размера `page_size` и возвращает страницу `page`.
///
/// Номер страницы приводится к диапазону `1..=total_pages`.
pub fn paginate<T>(items: &[T], page: u32, page_size: u32) -> Page<'_, T> {
    let page_size = page_size.max(1) as usize;
    let total = items.len();
    let total_pages = total.div_ceil(page_size);
    let page = (page.max(1) as usize).min(total_pages.max(1));

    let start = ((page - 1) * page_size).min(total);
    let end = (start + page_size).min(total);

    Page {
        items: &items[start..end],
        pagination: Pagination {
            page: page as u32,
            total_pages: total_pages as u32,
            total: total as u64,
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
/// Группа, в которую попадает пост.
pub enum GroupKey {
    /// Известная категория.
    Category(String),
    /// Без категории или с категорией, отсутствующей в справочнике.
    Uncategorized,
}

fn group_of(post: &Post, known: &HashMap<&str, usize>) -> GroupKey {
    match post.category_id.as_deref() {
        Some(id) if known.contains_key(id) => GroupKey::Category(id.to_string()),
        _ => GroupKey::Uncategorized,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// Точка графика.
pub struct ChartPoint {
    /// Время публикации.
    pub at: DateTime<Utc>,
    /// Значение метрики.
    pub value: u64,
    /// Пост, из которого взята точка.
    pub post_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// Ряд графика для одной категории.
pub struct ChartSeries {
    /// Группа ряда.
    pub key: GroupKey,
    /// Подпись ряда.
    pub label: String,
    /// Слот палитры; `None` для постов без категории.
    pub color_slot: Option<u32>,
    /// Точки по возрастанию времени.
    pub points: Vec<ChartPoint>,
}

/// Ряды графика метрики `metric`, сгруппированные по категориям.
///
/// Учитываются только посты с ненулевой вовлечённостью. Для просмотров
/// берутся только видео с положительным числом просмотров. Ряды идут в
/// порядке справочника категорий, группа без категории последней; пустые
/// ряды не возвращаются.
pub fn chart_series<P: Borrow<Post>>(posts: &[P], categories: &[Category], metric: Metric) -> Vec<ChartSeries> {
    let known: HashMap<&str, usize> = categories
        .iter()
        .enumerate()
        .map(|(idx, c)| (c.id.as_str(), idx))
        .collect();

    let mut buckets: Vec<Vec<ChartPoint>> = vec![Vec::new(); categories.len() + 1];
    for post in iter_posts(posts) {
        if !post.has_any_metric() {
            continue;
        }
        if metric == Metric::Views && !(post.media_type.is_video() && post.views > 0) {
            continue;
        }

        let slot = match group_of(post, &known) {
            GroupKey::Category(id) => known[id.as_str()],
            GroupKey::Uncategorized => categories.len(),
        };
        buckets[slot].push(ChartPoint {
            at: post.published_at,
            value: post.metric(metric),
            post_id: post.id.clone(),
        });
    }

    buckets
        .into_iter()
        .enumerate()
        .filter(|(_, points)| !points.is_empty())
        .map(|(slot, mut points)| {
            points.sort_by_key(|p| p.at);
            match categories.get(slot) {
                Some(category) => ChartSeries {
                    key: GroupKey::Category(category.id.clone()),
                    label: category.name.clone(),
                    color_slot: Some(category.color_slot()),
                    points,
                },
                None => ChartSeries {
                    key: GroupKey::Uncategorized,
                    label: UNCATEGORIZED_LABEL.to_string(),
                    color_slot: None,
                    points,
                },
            }
        })
        .collect()
}

/// Среднее метрики по постам с ненулевой вовлечённостью.
pub fn average_metric<P: Borrow<Post>>(posts: &[P], metric: Metric) -> f64 {
    average_metric_where(posts, metric, |_| true)
}

/// Среднее метрики по постам, прошедшим `extra`.
///
/// Учитываются посты, у которых есть хотя бы одна ненулевая метрика и сама
/// `metric` больше нуля. Для пустой выборки возвращается `0.0`.
pub fn average_metric_where<P: Borrow<Post>>(
    posts: &[P],
    metric: Metric,
    extra: impl Fn(&Post) -> bool,
) -> f64 {
    let (sum, count) = iter_posts(posts)
        .filter(|&post| post.has_any_metric() && extra(post))
        .map(|post| post.metric(metric))
        .filter(|value| *value > 0)
        .fold((0u64, 0u64), |(sum, count), value| (sum.saturating_add(value), count + 1));

    if count == 0 {
        return 0.0;
    }
    sum as f64 / count as f64
}

/// Первые `n` постов по убыванию просмотров; посты без просмотров не участвуют.
pub fn top_content<P: Borrow<Post>>(posts: &[P], n: usize) -> Vec<&Post> {
    let mut ranked: Vec<&Post> = iter_posts(posts)
        .filter(|post| post.views > 0)
        .collect();
    ranked.sort_by(|a, b| b.views.cmp(&a.views));
    ranked.truncate(n);
    ranked
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// Корзина распределения по категориям.
pub struct DistributionBucket {
    /// Группа.
    pub key: GroupKey,
    /// Подпись.
    pub label: String,
    /// Количество постов.
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// Количество постов в каждой категории плюс корзина «без категории».
pub struct CategoryDistribution {
    /// Корзины в порядке справочника; «без категории» последней.
    pub buckets: Vec<DistributionBucket>,
    /// Всего постов.
    pub total: usize,
}

impl CategoryDistribution {
    /// Доля `count` от общего числа постов в процентах (`0.0` для пустой выборки).
    pub fn percentage(&self, count: usize) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        count as f64 / self.total as f64 * 100.0
    }

    /// Количество постов в группе.
    pub fn count(&self, key: &GroupKey) -> usize {
        self.buckets
            .iter()
            .find(|b| &b.key == key)
            .map_or(0, |b| b.count)
    }
}

/// Распределение постов по категориям.
pub fn category_distribution<P: Borrow<Post>>(posts: &[P], categories: &[Category]) -> CategoryDistribution {
    let known: HashMap<&str, usize> = categories
        .iter()
        .enumerate()
        .map(|(idx, c)| (c.id.as_str(), idx))
        .collect();

    let mut counts = vec![0usize; categories.len() + 1];
    for post in iter_posts(posts) {
        let slot = match group_of(post, &known) {
            GroupKey::Category(id) => known[id.as_str()],
            GroupKey::Uncategorized => categories.len(),
        };
        counts[slot] += 1;
    }

    let mut buckets: Vec<DistributionBucket> = categories
        .iter()
        .zip(&counts)
        .map(|(category, count)| DistributionBucket {
            key: GroupKey::Category(category.id.clone()),
            label: category.name.clone(),
            count: *count,
        })
        .collect();
    buckets.push(DistributionBucket {
        key: GroupKey::Uncategorized,
        label: UNCATEGORIZED_LABEL.to_string(),
        count: counts[categories.len()],
    });

    CategoryDistribution {
        buckets,
        total: posts.len(),
    }
}

/// Изменение в процентах: `(current - previous) / previous * 100`.
///
/// Если `previous` отсутствует или равно нулю, возвращается `0.0`.
pub fn calculate_diff(current: f64, previous: Option<f64>) -> f64 {
    match previous {
        Some(previous) if previous != 0.0 && previous.is_finite() => {
            (current - previous) / previous * 100.0
        }
        _ => 0.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
/// Сравнение среднего значения метрики за два соседних окна.
pub struct PeriodComparison {
    /// Среднее за последние `days` дней.
    pub current: f64,
    /// Среднее за `days` дней до этого.
    pub previous: f64,
    /// Изменение в процентах.
    pub diff_percent: f64,
}

/// Сравнивает среднее `metric` за окно `[now - days, now]` с предыдущим окном той же длины.
pub fn compare_periods<P: Borrow<Post>>(
    posts: &[P],
    metric: Metric,
    days: u32,
    now: DateTime<Utc>,
) -> PeriodComparison {
    let days = days.max(1);
    let current_from = days_before(now, days);
    let previous_from = days_before(current_from, days);

    let current = average_metric_where(posts, metric, |p| {
        p.published_at >= current_from && p.published_at <= now
    });
    let previous = average_metric_where(posts, metric, |p| {
        p.published_at >= previous_from && p.published_at < current_from
    });

    PeriodComparison {
        current,
        previous,
        diff_percent: calculate_diff(current, Some(previous)),
    }
}

/// Проверяет, что постов достаточно для генерации инсайтов.
pub fn ensure_min_posts(available: usize, required: usize) -> InstaClientResult<()> {
    if available < required {
        return Err(InstaClientError::Validation(format!(
            "at least {required} posts are required for insights, got {available}"
        )));
    }
    Ok(())
}

#[derive(Debug)]
/// Кэш одного значения, пересчитываемого при смене ключа.
pub struct Memo<K, V> {
    cached: Option<(K, V)>,
}

impl<K, V> Default for Memo<K, V> {
    fn default() -> Self {
        Self { cached: None }
    }
}

impl<K: PartialEq, V> Memo<K, V> {
    /// Возвращает значение для `key`, вызывая `compute` только при смене ключа.
    pub fn get_or_compute(&mut self, key: K, compute: impl FnOnce() -> V) -> &V {
        if matches!(&self.cached, Some((cached, _)) if *cached != key) {
            self.cached = None;
        }
        &self.cached.get_or_insert_with(|| (key, compute())).1
    }

    /// `true`, если значение посчитано для `key`.
    pub fn is_cached_for(&self, key: &K) -> bool {
        matches!(&self.cached, Some((cached, _)) if cached == key)
    }

    /// Сбрасывает кэш.
    pub fn invalidate(&mut self) {
        self.cached = None;
    }
}

type FilterKey = (u64, FilterSelection, Option<DateTime<Utc>>);

#[derive(Debug, Default)]
/// Кэш производных представлений одной страницы.
pub struct DerivedViews {
    filtered: Memo<FilterKey, Vec<Post>>,
    chart: Memo<(FilterKey, Metric), Vec<ChartSeries>>,
    distribution: Memo<FilterKey, CategoryDistribution>,
}

impl DerivedViews {
    /// Создаёт пустой кэш.
    pub fn new() -> Self {
        Self::default()
    }

    fn key(state: &CollectionState, filter: &FilterSelection, now: DateTime<Utc>) -> FilterKey {
        (state.revision, filter.clone(), filter.cutoff(now))
    }

    /// Отфильтрованные посты.
    pub fn filtered(&mut self, state: &CollectionState, filter: &FilterSelection, now: DateTime<Utc>) -> &[Post] {
        let key = Self::key(state, filter, now);
        self.filtered.get_or_compute(key, || {
            filtered_posts(&state.posts, filter, now)
                .into_iter()
                .cloned()
                .collect()
        })
    }

    /// Ряды графика по отфильтрованным постам.
    pub fn chart(
        &mut self,
        state: &CollectionState,
        filter: &FilterSelection,
        metric: Metric,
        now: DateTime<Utc>,
    ) -> &[ChartSeries] {
        let key = (Self::key(state, filter, now), metric);
        self.chart.get_or_compute(key, || {
            let posts = filtered_posts(&state.posts, filter, now);
            chart_series(&posts, &state.categories, metric)
        })
    }

    /// Распределение отфильтрованных постов по категориям.
    pub fn distribution(
        &mut self,
        state: &CollectionState,
        filter: &FilterSelection,
        now: DateTime<Utc>,
    ) -> &CategoryDistribution {
        let key = Self::key(state, filter, now);
        self.distribution.get_or_compute(key, || {
            let posts = filtered_posts(&state.posts, filter, now);
            category_distribution(&posts, &state.categories)
        })
    }
}
