use reqwest::header::{COOKIE, HeaderMap, HeaderValue};
use reqwest::{Client, Method, Url};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::Duration;
use validator::Validate;

use crate::error::{InstaClientError, InstaClientResult};
use crate::models::{
    AuthStatus, Category, DashboardData, MediaType, Pagination, Post, PostsTable, Subcategory,
    TableQuery,
};

/// Сегмент пути, которым сервер обозначает снятие категории/подкатегории.
const UNASSIGNED_SEGMENT: &str = "null";

#[derive(Debug, Serialize)]
struct UsernameQuery<'a> {
    username: &'a str,
}

#[derive(Debug, Serialize)]
struct SubcategoriesQuery<'a> {
    username: &'a str,
    #[serde(rename = "categoryId", skip_serializing_if = "Option::is_none")]
    category_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TableQueryDto<'a> {
    username: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    types: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    categories: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subcategories: Option<String>,
    days: u32,
    page: u32,
    sort_field: &'static str,
    sort_direction: &'static str,
}

#[derive(Debug, Serialize)]
struct SyncRequestDto<'a> {
    username: &'a str,
}

#[derive(Debug, Serialize, Validate)]
struct CreateCategoryRequestDto {
    #[validate(length(min = 1, max = 100))]
    name: String,
}

#[derive(Debug, Serialize, Validate)]
struct CreateSubcategoryRequestDto {
    #[validate(length(min = 1, max = 100))]
    name: String,
    #[validate(length(min = 1))]
    category_id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponseDto {
    error: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostDto {
    id: String,
    caption: Option<String>,
    media_type: MediaType,
    #[serde(alias = "timestamp")]
    published_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    metrics_updated_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    category_id: Option<String>,
    #[serde(default)]
    subcategory_id: Option<String>,
    #[serde(default)]
    views: Option<u64>,
    #[serde(default)]
    likes: Option<u64>,
    #[serde(default)]
    comments: Option<u64>,
    #[serde(default)]
    saves: Option<u64>,
    #[serde(default)]
    shares: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct CategoryDto {
    id: String,
    name: String,
    #[serde(default)]
    color_index: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct SubcategoryDto {
    id: String,
    name: String,
    category_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaginationDto {
    page: u32,
    total_pages: u32,
    total: i64,
}

#[derive(Debug, Deserialize)]
struct PostsTableDto {
    posts: Vec<PostDto>,
    #[serde(default)]
    categories: Vec<CategoryDto>,
    #[serde(default)]
    subcategories: Vec<SubcategoryDto>,
    pagination: PaginationDto,
}

#[derive(Debug, Deserialize)]
struct DashboardDto {
    posts: Vec<PostDto>,
    #[serde(default)]
    categories: Vec<CategoryDto>,
    #[serde(default)]
    subcategories: Vec<SubcategoryDto>,
}

#[derive(Debug, Deserialize)]
struct AuthStatusDto {
    #[serde(default)]
    authenticated: bool,
    #[serde(default)]
    username: Option<String>,
}

impl From<PostDto> for Post {
    fn from(value: PostDto) -> Self {
        Self {
            id: value.id,
            caption: value.caption,
            media_type: value.media_type,
            published_at: value.published_at,
            metrics_updated_at: value.metrics_updated_at,
            category_id: value.category_id,
            subcategory_id: value.subcategory_id,
            views: value.views.unwrap_or(0),
            likes: value.likes.unwrap_or(0),
            comments: value.comments.unwrap_or(0),
            saves: value.saves.unwrap_or(0),
            shares: value.shares.unwrap_or(0),
        }
    }
}

impl From<CategoryDto> for Category {
    fn from(value: CategoryDto) -> Self {
        Self {
            id: value.id,
            name: value.name,
            color_index: value.color_index.unwrap_or(0),
        }
    }
}

impl From<SubcategoryDto> for Subcategory {
    fn from(value: SubcategoryDto) -> Self {
        Self {
            id: value.id,
            name: value.name,
            category_id: value.category_id,
        }
    }
}

impl From<PaginationDto> for Pagination {
    fn from(value: PaginationDto) -> Self {
        Self {
            page: value.page.max(1),
            total_pages: value.total_pages,
            total: value.total.max(0) as u64,
        }
    }
}

impl From<PostsTableDto> for PostsTable {
    fn from(value: PostsTableDto) -> Self {
        Self {
            posts: value.posts.into_iter().map(Post::from).collect(),
            categories: value.categories.into_iter().map(Category::from).collect(),
            subcategories: value.subcategories.into_iter().map(Subcategory::from).collect(),
            pagination: value.pagination.into(),
        }
    }
}

impl From<DashboardDto> for DashboardData {
    fn from(value: DashboardDto) -> Self {
        Self {
            posts: value.posts.into_iter().map(Post::from).collect(),
            categories: value.categories.into_iter().map(Category::from).collect(),
            subcategories: value.subcategories.into_iter().map(Subcategory::from).collect(),
        }
    }
}

impl<'a> TableQueryDto<'a> {
    fn new(username: &'a str, query: &TableQuery) -> Self {
        Self {
            username,
            types: join_non_empty(query.media_types.iter().map(|t| t.as_str())),
            categories: join_non_empty(query.categories.iter().map(String::as_str)),
            subcategories: join_non_empty(query.subcategories.iter().map(String::as_str)),
            days: query.days,
            page: query.page.max(1),
            sort_field: query.sort_field.as_str(),
            sort_direction: query.sort_direction.as_str(),
        }
    }
}

fn join_non_empty<'a>(values: impl Iterator<Item = &'a str>) -> Option<String> {
    let joined = values.collect::<Vec<_>>().join(",");
    if joined.is_empty() { None } else { Some(joined) }
}

fn require_username(username: &str) -> InstaClientResult<&str> {
    let username = username.trim();
    if username.is_empty() {
        return Err(InstaClientError::AuthRequired);
    }
    Ok(username)
}

#[derive(Debug, Clone)]
/// Параметры подключения к backend API.
pub struct ClientOptions {
    /// Базовый URL API, например `http://127.0.0.1:3000`.
    pub base_url: String,
    /// Значение заголовка `Cookie` с сессией, если она получена вне клиента.
    pub session_cookie: Option<String>,
    /// Таймаут установки соединения.
    pub connect_timeout: Duration,
    /// Таймаут всего запроса.
    pub request_timeout: Duration,
}

impl ClientOptions {
    /// Параметры по умолчанию для указанного URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            session_cookie: None,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone)]
/// HTTP-клиент для REST API аналитики Instagram.
///
/// Все запросы отправляются с cookie сессии: либо явной из `ClientOptions`,
/// либо накопленной во встроенном cookie store. Операции с данными принимают
/// имя аккаунта явно и не отправляют запрос, если оно пустое.
pub struct InstaClient {
    base_url: Url,
    client: Client,
}

impl InstaClient {
    /// Создаёт клиент с параметрами по умолчанию.
    pub fn new(base_url: impl Into<String>) -> InstaClientResult<Self> {
        Self::with_options(ClientOptions::new(base_url))
    }

    /// Создаёт клиент с явными параметрами подключения.
    pub fn with_options(options: ClientOptions) -> InstaClientResult<Self> {
        let base_url = Url::parse(options.base_url.trim()).map_err(|err| {
            InstaClientError::InvalidConfig(format!("invalid base url '{}': {err}", options.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(InstaClientError::InvalidConfig(format!(
                "base url '{base_url}' cannot have paths"
            )));
        }

        let mut headers = HeaderMap::new();
        if let Some(cookie) = options.session_cookie.as_deref().map(str::trim) {
            if !cookie.is_empty() {
                let value = HeaderValue::from_str(cookie).map_err(|_| {
                    InstaClientError::InvalidConfig("session cookie is not a valid header".to_string())
                })?;
                headers.insert(COOKIE, value);
            }
        }

        // явная cookie сессии не должна перетираться cookie store
        let client = Client::builder()
            .cookie_store(headers.is_empty())
            .default_headers(headers)
            .connect_timeout(options.connect_timeout)
            .timeout(options.request_timeout)
            .build()
            .map_err(InstaClientError::Http)?;

        Ok(Self { base_url, client })
    }

    fn endpoint(&self, segments: &[&str]) -> InstaClientResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| InstaClientError::InvalidConfig("base url cannot have paths".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn decode_error(response: reqwest::Response) -> InstaClientError {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        let message = match serde_json::from_str::<ErrorResponseDto>(&text) {
            Ok(body) => body.error.or(body.message),
            Err(_) => Some(text),
        };
        InstaClientError::from_http_status(status, message)
    }

    /// универсальный helper: отправка, проверка статуса, декодирование json
    async fn execute<TRes>(&self, request: reqwest::RequestBuilder) -> InstaClientResult<TRes>
    where
        TRes: DeserializeOwned,
    {
        let response = request
            .send()
            .await
            .map_err(InstaClientError::from_reqwest)?;
        if !response.status().is_success() {
            return Err(Self::decode_error(response).await);
        }

        response
            .json::<TRes>()
            .await
            .map_err(InstaClientError::from_reqwest)
    }

    async fn execute_empty(&self, request: reqwest::RequestBuilder) -> InstaClientResult<()> {
        let response = request
            .send()
            .await
            .map_err(InstaClientError::from_reqwest)?;
        if !response.status().is_success() {
            return Err(Self::decode_error(response).await);
        }
        Ok(())
    }

    fn request<Q: Serialize>(
        &self,
        method: Method,
        segments: &[&str],
        query: &Q,
    ) -> InstaClientResult<reqwest::RequestBuilder> {
        let url = self.endpoint(segments)?;
        Ok(self.client.request(method, url).query(query))
    }

    /// Возвращает страницу таблицы постов под фильтр `query`.
    pub async fn fetch_table(&self, username: &str, query: &TableQuery) -> InstaClientResult<PostsTable> {
        let username = require_username(username)?;
        let params = TableQueryDto::new(username, query);
        tracing::debug!(username, page = params.page, "fetching posts table");

        let request = self.request(Method::GET, &["api", "posts", "table"], &params)?;
        let dto: PostsTableDto = self.execute(request).await?;
        Ok(dto.into())
    }

    /// Возвращает все посты аккаунта для аналитических страниц.
    pub async fn fetch_dashboard(&self, username: &str) -> InstaClientResult<DashboardData> {
        let username = require_username(username)?;
        let request = self.request(
            Method::GET,
            &["api", "posts", "dashboard"],
            &UsernameQuery { username },
        )?;
        let dto: DashboardDto = self.execute(request).await?;
        Ok(dto.into())
    }

    /// Запускает обновление метрик на стороне сервера.
    pub async fn sync_posts(&self, username: &str) -> InstaClientResult<()> {
        let username = require_username(username)?;
        let request = self
            .request(Method::POST, &["api", "posts", "sync"], &UsernameQuery { username })?
            .json(&SyncRequestDto { username });
        self.execute_empty(request).await
    }

    /// Возвращает категории аккаунта.
    pub async fn list_categories(&self, username: &str) -> InstaClientResult<Vec<Category>> {
        let username = require_username(username)?;
        let request = self.request(Method::GET, &["api", "categories"], &UsernameQuery { username })?;
        let dto: Vec<CategoryDto> = self.execute(request).await?;
        Ok(dto.into_iter().map(Category::from).collect())
    }

    /// Создаёт категорию.
    ///
    /// Имя проверяется локально: после обрезки пробелов 1..=100 символов.
    pub async fn create_category(&self, username: &str, name: &str) -> InstaClientResult<Category> {
        let username = require_username(username)?;
        let payload = CreateCategoryRequestDto {
            name: name.trim().to_string(),
        };
        payload
            .validate()
            .map_err(|err| InstaClientError::Validation(err.to_string()))?;

        let request = self
            .request(Method::POST, &["api", "categories"], &UsernameQuery { username })?
            .json(&payload);
        let dto: CategoryDto = self.execute(request).await?;
        Ok(dto.into())
    }

    /// Назначает посту категорию (`None` снимает категорию).
    pub async fn assign_category(
        &self,
        username: &str,
        post_id: &str,
        category_id: Option<&str>,
    ) -> InstaClientResult<()> {
        let username = require_username(username)?;
        let category = category_id.unwrap_or(UNASSIGNED_SEGMENT);
        let request = self.request(
            Method::PUT,
            &["api", "categories", category, "posts", post_id],
            &UsernameQuery { username },
        )?;
        self.execute_empty(request).await
    }

    /// Возвращает подкатегории, опционально только одной категории.
    pub async fn list_subcategories(
        &self,
        username: &str,
        category_id: Option<&str>,
    ) -> InstaClientResult<Vec<Subcategory>> {
        let username = require_username(username)?;
        let request = self.request(
            Method::GET,
            &["api", "subcategories"],
            &SubcategoriesQuery {
                username,
                category_id,
            },
        )?;
        let dto: Vec<SubcategoryDto> = self.execute(request).await?;
        Ok(dto.into_iter().map(Subcategory::from).collect())
    }

    /// Создаёт подкатегорию внутри категории `category_id`.
    pub async fn create_subcategory(
        &self,
        username: &str,
        category_id: &str,
        name: &str,
    ) -> InstaClientResult<Subcategory> {
        let username = require_username(username)?;
        let payload = CreateSubcategoryRequestDto {
            name: name.trim().to_string(),
            category_id: category_id.trim().to_string(),
        };
        payload
            .validate()
            .map_err(|err| InstaClientError::Validation(err.to_string()))?;

        let request = self
            .request(Method::POST, &["api", "subcategories"], &UsernameQuery { username })?
            .json(&payload);
        let dto: SubcategoryDto = self.execute(request).await?;
        Ok(dto.into())
    }

    /// Назначает посту подкатегорию (`None` снимает подкатегорию).
    pub async fn assign_subcategory(
        &self,
        username: &str,
        post_id: &str,
        subcategory_id: Option<&str>,
    ) -> InstaClientResult<()> {
        let username = require_username(username)?;
        let subcategory = subcategory_id.unwrap_or(UNASSIGNED_SEGMENT);
        let request = self.request(
            Method::PUT,
            &["api", "subcategories", subcategory, "posts", post_id],
            &UsernameQuery { username },
        )?;
        self.execute_empty(request).await
    }

    /// Возвращает состояние сессии.
    pub async fn auth_status(&self) -> InstaClientResult<AuthStatus> {
        let url = self.endpoint(&["auth", "status"])?;
        let dto: AuthStatusDto = self.execute(self.client.get(url)).await?;
        let username = dto
            .username
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());

        Ok(AuthStatus {
            authenticated: dto.authenticated && username.is_some(),
            username,
        })
    }

    /// URL, на который нужно отправить пользователя для входа через Facebook.
    pub fn login_url(&self) -> InstaClientResult<String> {
        Ok(self.endpoint(&["auth", "facebook"])?.to_string())
    }

    /// Завершает сессию на сервере.
    pub async fn logout(&self) -> InstaClientResult<()> {
        let url = self.endpoint(&["auth", "logout"])?;
        self.execute_empty(self.client.get(url)).await
    }
}
