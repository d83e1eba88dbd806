use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use insta_client::{Category, Metric, Post, Subcategory};
use insta_dashboard::CollectionState;
use insta_dashboard::views::{CategoryDistribution, ChartSeries, PeriodComparison};
use serde::Serialize;

const CAPTION_PREVIEW_CHARS: usize = 40;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("не удалось сериализовать ответ")?;
    println!("{rendered}");
    Ok(())
}

pub fn print_posts(state: &CollectionState, last_update: Option<DateTime<Utc>>) {
    let pagination = state.pagination;
    println!(
        "Постов: {} (страница {}/{}, всего {})",
        state.posts.len(),
        pagination.page,
        pagination.total_pages,
        pagination.total
    );
    if let Some(at) = last_update {
        println!("Метрики обновлены: {}", at.to_rfc3339());
    }

    for post in &state.posts {
        let category = post
            .category_id
            .as_deref()
            .map(|id| category_name(&state.categories, id))
            .unwrap_or("-");
        let subcategory = post
            .subcategory_id
            .as_deref()
            .and_then(|id| state.subcategory(id))
            .map_or("-", |s| s.name.as_str());

        println!(
            "- [{}] {} {} views={} likes={} comments={} saves={} shares={} категория={} подкатегория={} {}",
            post.id,
            post.published_at.format("%Y-%m-%d"),
            post.media_type.as_str(),
            post.views,
            post.likes,
            post.comments,
            post.saves,
            post.shares,
            category,
            subcategory,
            caption_preview(post),
        );
    }
}

pub fn print_categories(categories: &[Category]) {
    println!("Категорий: {}", categories.len());
    for category in categories {
        println!(
            "- [{}] {} (цвет {})",
            category.id,
            category.name,
            category.color_slot()
        );
    }
}

pub fn print_subcategories(subcategories: &[Subcategory]) {
    println!("Подкатегорий: {}", subcategories.len());
    for subcategory in subcategories {
        println!(
            "- [{}] {} (категория {})",
            subcategory.id, subcategory.name, subcategory.category_id
        );
    }
}

#[derive(Debug, Serialize)]
pub struct MetricAverage {
    pub metric: Metric,
    pub value: f64,
}

#[derive(Debug, Serialize)]
pub struct StatsReport {
    pub days: u32,
    pub posts: usize,
    pub last_update: Option<DateTime<Utc>>,
    pub averages: Vec<MetricAverage>,
    pub top: Vec<Post>,
    pub distribution: CategoryDistribution,
    pub metric: Metric,
    pub chart: Vec<ChartSeries>,
    pub comparison: PeriodComparison,
}

impl StatsReport {
    pub fn print(&self) {
        println!("Постов за {} дн.: {}", self.days, self.posts);
        if let Some(at) = self.last_update {
            println!("Метрики обновлены: {}", at.to_rfc3339());
        }

        println!("Средние значения:");
        for average in &self.averages {
            println!("  {}: {:.1}", average.metric.as_str(), average.value);
        }

        println!("Топ по просмотрам:");
        for post in &self.top {
            println!("  [{}] views={} {}", post.id, post.views, caption_preview(post));
        }

        println!("Распределение по категориям:");
        for bucket in &self.distribution.buckets {
            println!(
                "  {}: {} ({:.1}%)",
                bucket.label,
                bucket.count,
                self.distribution.percentage(bucket.count)
            );
        }

        println!("График {}:", self.metric.as_str());
        for series in &self.chart {
            let total: u64 = series.points.iter().map(|p| p.value).sum();
            println!(
                "  {}: точек {}, сумма {}",
                series.label,
                series.points.len(),
                total
            );
        }

        println!(
            "{}: {:.1} против {:.1} за предыдущие {} дн. ({:+.1}%)",
            self.metric.as_str(),
            self.comparison.current,
            self.comparison.previous,
            self.days,
            self.comparison.diff_percent
        );
    }
}

fn category_name<'a>(categories: &'a [Category], id: &'a str) -> &'a str {
    categories
        .iter()
        .find(|c| c.id == id)
        .map_or(id, |c| c.name.as_str())
}

fn caption_preview(post: &Post) -> String {
    let caption = post.caption.as_deref().unwrap_or("").trim();
    let mut preview: String = caption.chars().take(CAPTION_PREVIEW_CHARS).collect();
    if caption.chars().count() > CAPTION_PREVIEW_CHARS {
        preview.push('…');
    }
    preview
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caption_preview_truncates_by_chars() {
        let mut post: Post = serde_json::from_value(serde_json::json!({
            "id": "1",
            "caption": null,
            "media_type": "IMAGE",
            "published_at": "2024-01-01T00:00:00Z",
            "metrics_updated_at": null,
            "category_id": null,
            "subcategory_id": null,
            "views": 0, "likes": 0, "comments": 0, "saves": 0, "shares": 0
        }))
        .expect("valid post");
        assert_eq!(caption_preview(&post), "");

        post.caption = Some("щ".repeat(50));
        let preview = caption_preview(&post);
        assert_eq!(preview.chars().count(), CAPTION_PREVIEW_CHARS + 1);
        assert!(preview.ends_with('…'));
    }

    #[test]
    fn unknown_category_falls_back_to_id() {
        let categories = vec![Category {
            id: "c1".to_string(),
            name: "Food".to_string(),
            color_index: 3,
        }];
        assert_eq!(category_name(&categories, "c1"), "Food");
        assert_eq!(category_name(&categories, "c9"), "c9");
    }
}
