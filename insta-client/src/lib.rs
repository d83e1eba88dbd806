//! Клиентская библиотека для REST API аналитики Instagram.
//!
//! Предоставляет типизированные модели (`Post`, `Category`, `Subcategory`,
//! пагинация, параметры фильтра) и HTTP-клиент (`InstaClient`) поверх `reqwest`.
//!
//! Сессия хранится в cookie; каждый запрос к данным дополнительно несёт имя
//! аккаунта и не отправляется, если имя не задано (`InstaClientError::AuthRequired`).
#![warn(missing_docs)]

mod error;
mod http_client;
mod models;

pub use error::{InstaClientError, InstaClientResult};
pub use http_client::{ClientOptions, InstaClient};
pub use models::{
    AuthStatus, CATEGORY_PALETTE_SIZE, Category, DashboardData, MediaType, Metric, Pagination,
    Post, PostsTable, SortDirection, SortField, Subcategory, TableQuery,
};
