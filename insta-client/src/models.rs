use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Количество цветов палитры категорий.
pub const CATEGORY_PALETTE_SIZE: u32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
/// Тип публикации Instagram.
pub enum MediaType {
    /// Одиночное изображение.
    Image,
    /// Видео.
    Video,
    /// Карусель из нескольких медиа.
    CarouselAlbum,
    /// Reels; при фильтрации считается видео.
    Reel,
    /// Тип, неизвестный клиенту.
    #[serde(other)]
    Unknown,
}

impl MediaType {
    /// Приводит тип к виду, в котором он участвует в фильтрах (`Reel` → `Video`).
    pub fn normalized(self) -> Self {
        match self {
            Self::Reel => Self::Video,
            other => other,
        }
    }

    /// `true` для видео и reels.
    pub fn is_video(self) -> bool {
        self.normalized() == Self::Video
    }

    /// Имя типа в API.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "IMAGE",
            Self::Video => "VIDEO",
            Self::CarouselAlbum => "CAROUSEL_ALBUM",
            Self::Reel => "REEL",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::str::FromStr for MediaType {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "IMAGE" => Ok(Self::Image),
            "VIDEO" => Ok(Self::Video),
            "CAROUSEL_ALBUM" | "CAROUSEL" => Ok(Self::CarouselAlbum),
            "REEL" | "REELS" => Ok(Self::Reel),
            other => Err(format!("unknown media type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Числовая метрика вовлечённости поста.
pub enum Metric {
    /// Просмотры.
    Views,
    /// Лайки.
    Likes,
    /// Комментарии.
    Comments,
    /// Сохранения.
    Saves,
    /// Репосты.
    Shares,
}

impl Metric {
    /// Все метрики в порядке отображения.
    pub const ALL: [Metric; 5] = [
        Metric::Views,
        Metric::Likes,
        Metric::Comments,
        Metric::Saves,
        Metric::Shares,
    ];

    /// Имя метрики в API.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Views => "views",
            Self::Likes => "likes",
            Self::Comments => "comments",
            Self::Saves => "saves",
            Self::Shares => "shares",
        }
    }
}

impl std::str::FromStr for Metric {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(raw.trim()))
            .ok_or_else(|| format!("unknown metric: {raw}"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Публичная модель поста с метриками.
///
/// Отсутствующие в ответе сервера метрики приводятся к нулю.
pub struct Post {
    /// Идентификатор поста.
    pub id: String,
    /// Подпись к посту.
    pub caption: Option<String>,
    /// Тип публикации.
    pub media_type: MediaType,
    /// Время публикации (UTC).
    pub published_at: DateTime<Utc>,
    /// Время последнего обновления метрик (UTC).
    pub metrics_updated_at: Option<DateTime<Utc>>,
    /// Назначенная категория.
    pub category_id: Option<String>,
    /// Назначенная подкатегория.
    pub subcategory_id: Option<String>,
    /// Просмотры.
    pub views: u64,
    /// Лайки.
    pub likes: u64,
    /// Комментарии.
    pub comments: u64,
    /// Сохранения.
    pub saves: u64,
    /// Репосты.
    pub shares: u64,
}

impl Post {
    /// Значение указанной метрики.
    pub fn metric(&self, metric: Metric) -> u64 {
        match metric {
            Metric::Views => self.views,
            Metric::Likes => self.likes,
            Metric::Comments => self.comments,
            Metric::Saves => self.saves,
            Metric::Shares => self.shares,
        }
    }

    /// `true`, если хотя бы одна метрика больше нуля.
    pub fn has_any_metric(&self) -> bool {
        Metric::ALL.into_iter().any(|m| self.metric(m) > 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Пользовательская категория постов.
pub struct Category {
    /// Идентификатор категории.
    pub id: String,
    /// Название.
    pub name: String,
    /// Индекс цвета в палитре.
    pub color_index: u32,
}

impl Category {
    /// Слот палитры, в котором рисуется категория.
    pub fn color_slot(&self) -> u32 {
        self.color_index % CATEGORY_PALETTE_SIZE
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Подкатегория внутри категории; цвет наследуется от родителя.
pub struct Subcategory {
    /// Идентификатор подкатегории.
    pub id: String,
    /// Название.
    pub name: String,
    /// Родительская категория.
    pub category_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Метаданные пагинации, которые возвращает сервер.
pub struct Pagination {
    /// Текущая страница (с единицы).
    pub page: u32,
    /// Общее количество страниц.
    pub total_pages: u32,
    /// Общее количество постов под текущим фильтром.
    pub total: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            total_pages: 0,
            total: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Ответ `GET /api/posts/table`: страница постов и справочники.
pub struct PostsTable {
    /// Посты текущей страницы.
    pub posts: Vec<Post>,
    /// Все категории пользователя.
    pub categories: Vec<Category>,
    /// Все подкатегории пользователя.
    pub subcategories: Vec<Subcategory>,
    /// Пагинация для текущего фильтра.
    pub pagination: Pagination,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Ответ `GET /api/posts/dashboard`: все посты без пагинации.
pub struct DashboardData {
    /// Посты.
    pub posts: Vec<Post>,
    /// Категории.
    pub categories: Vec<Category>,
    /// Подкатегории.
    pub subcategories: Vec<Subcategory>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Поле сортировки таблицы постов.
pub enum SortField {
    /// Дата публикации.
    #[default]
    PublishedAt,
    /// Дата обновления метрик.
    MetricsUpdatedAt,
    /// Просмотры.
    Views,
    /// Лайки.
    Likes,
    /// Комментарии.
    Comments,
    /// Сохранения.
    Saves,
    /// Репосты.
    Shares,
    /// Тип публикации.
    MediaType,
    /// Подпись.
    Caption,
}

impl SortField {
    /// Имя поля в API.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PublishedAt => "published_at",
            Self::MetricsUpdatedAt => "metrics_updated_at",
            Self::Views => "views",
            Self::Likes => "likes",
            Self::Comments => "comments",
            Self::Saves => "saves",
            Self::Shares => "shares",
            Self::MediaType => "media_type",
            Self::Caption => "caption",
        }
    }

    /// Метрика, по которой сортирует поле, если это метрика.
    pub fn metric(self) -> Option<Metric> {
        match self {
            Self::Views => Some(Metric::Views),
            Self::Likes => Some(Metric::Likes),
            Self::Comments => Some(Metric::Comments),
            Self::Saves => Some(Metric::Saves),
            Self::Shares => Some(Metric::Shares),
            _ => None,
        }
    }
}

impl std::str::FromStr for SortField {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let all = [
            Self::PublishedAt,
            Self::MetricsUpdatedAt,
            Self::Views,
            Self::Likes,
            Self::Comments,
            Self::Saves,
            Self::Shares,
            Self::MediaType,
            Self::Caption,
        ];
        all.into_iter()
            .find(|f| f.as_str() == raw.trim())
            .ok_or_else(|| format!("unknown sort field: {raw}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Направление сортировки.
pub enum SortDirection {
    /// По возрастанию.
    Asc,
    /// По убыванию.
    #[default]
    Desc,
}

impl SortDirection {
    /// Имя направления в API.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl std::str::FromStr for SortDirection {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(format!("unknown sort direction: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
/// Параметры запроса таблицы постов.
pub struct TableQuery {
    /// Выбранные типы публикаций; пустой список означает все.
    pub media_types: Vec<MediaType>,
    /// Выбранные категории; пустой список означает все.
    pub categories: Vec<String>,
    /// Выбранные подкатегории; пустой список означает все.
    pub subcategories: Vec<String>,
    /// Окно в днях; `0` означает всё время.
    pub days: u32,
    /// Запрашиваемая страница.
    pub page: u32,
    /// Поле сортировки.
    pub sort_field: SortField,
    /// Направление сортировки.
    pub sort_direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Ответ `GET /auth/status`.
pub struct AuthStatus {
    /// Есть ли активная сессия.
    pub authenticated: bool,
    /// Имя аккаунта Instagram, если сессия активна.
    pub username: Option<String>,
}
