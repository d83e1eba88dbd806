//! Ядро дашборда аналитики Instagram.
//!
//! Состоит из фильтра таблицы постов ([`filter`]), хранилища коллекции
//! ([`store`]), оптимистичных правок ([`optimistic`]), производных
//! представлений для графиков и статистики ([`views`]) и координатора
//! синхронизации метрик ([`sync`]). Общее состояние сессии передаётся явно
//! через [`AppState`].
//!
//! Сетевой слой подключается через трейт [`DashboardApi`]; для реального
//! backend он реализован на `insta_client::InstaClient`.
#![warn(missing_docs)]

pub mod api;
pub mod filter;
pub mod jobs;
pub mod optimistic;
pub mod state;
pub mod store;
pub mod sync;
pub mod table;
pub mod views;

#[cfg(test)]
mod testing;

pub use api::DashboardApi;
pub use filter::{FilterSelection, FilterState, Refetch};
pub use jobs::{CancelHandle, JobOutcome, JobPoller, JobStatus, PollConfig};
pub use optimistic::{MutationOutcome, SubcategoryPolicy};
pub use state::{AppState, SyncStatus};
pub use store::{CollectionPayload, CollectionState, LoadOutcome, PostCollectionStore};
pub use sync::{SyncCoordinator, SyncEvent};
pub use table::TableController;
pub use views::DerivedViews;
