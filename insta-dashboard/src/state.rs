//! Состояние сессии, общее для всех представлений.
//!
//! Одно значение [`AppState`] создаётся при старте приложения и передаётся
//! представлениям явно (клонирование дешёвое, внутри `Arc`). Каждое поле
//! хранится в своём `watch`-канале, поэтому подписчик видит только последнее
//! значение и никогда не читает его частично.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use insta_client::Post;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
/// Состояние синхронизации метрик.
pub enum SyncStatus {
    /// Синхронизация не выполняется.
    #[default]
    Idle,
    /// Идёт синхронизация.
    Syncing,
    /// Последняя синхронизация завершилась ошибкой.
    Failed(String),
}

#[derive(Debug)]
struct AppStateInner {
    username: watch::Sender<Option<String>>,
    sync_status: watch::Sender<SyncStatus>,
    last_update: watch::Sender<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone)]
/// Контейнер состояния сессии с типизированными геттерами/сеттерами и подписками.
pub struct AppState {
    inner: Arc<AppStateInner>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    /// Создаёт пустое состояние: без пользователя, без синхронизации.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                username: watch::channel(None).0,
                sync_status: watch::channel(SyncStatus::Idle).0,
                last_update: watch::channel(None).0,
            }),
        }
    }

    /// Имя авторизованного аккаунта.
    pub fn username(&self) -> Option<String> {
        self.inner.username.borrow().clone()
    }

    /// Устанавливает имя аккаунта; пустая строка считается отсутствием сессии.
    pub fn set_username(&self, username: Option<String>) {
        let username = username
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());
        self.inner.username.send_if_modified(|current| {
            if *current == username {
                return false;
            }
            *current = username;
            true
        });
    }

    /// Сбрасывает сессию.
    pub fn clear_session(&self) {
        self.set_username(None);
    }

    /// `true`, если известен авторизованный аккаунт.
    pub fn is_authenticated(&self) -> bool {
        self.inner.username.borrow().is_some()
    }

    /// Подписка на смену аккаунта.
    pub fn subscribe_username(&self) -> watch::Receiver<Option<String>> {
        self.inner.username.subscribe()
    }

    /// Текущее состояние синхронизации.
    pub fn sync_status(&self) -> SyncStatus {
        self.inner.sync_status.borrow().clone()
    }

    /// Устанавливает состояние синхронизации.
    pub fn set_sync_status(&self, status: SyncStatus) {
        self.inner.sync_status.send_replace(status);
    }

    /// Подписка на состояние синхронизации.
    pub fn subscribe_sync_status(&self) -> watch::Receiver<SyncStatus> {
        self.inner.sync_status.subscribe()
    }

    /// Время последнего обновления метрик.
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        *self.inner.last_update.borrow()
    }

    /// Устанавливает время последнего обновления метрик.
    pub fn set_last_update(&self, at: Option<DateTime<Utc>>) {
        self.inner.last_update.send_replace(at);
    }

    /// Подписка на время последнего обновления.
    pub fn subscribe_last_update(&self) -> watch::Receiver<Option<DateTime<Utc>>> {
        self.inner.last_update.subscribe()
    }

    /// Записывает максимальный `metrics_updated_at` среди постов.
    ///
    /// Если ни у одного поста нет отметки, значение не меняется.
    pub fn record_metrics_update(&self, posts: &[Post]) -> Option<DateTime<Utc>> {
        let latest = latest_metrics_update(posts)?;
        self.set_last_update(Some(latest));
        Some(latest)
    }
}

/// Максимальный `metrics_updated_at` среди постов.
pub fn latest_metrics_update(posts: &[Post]) -> Option<DateTime<Utc>> {
    posts.iter().filter_map(|p| p.metrics_updated_at).max()
}
