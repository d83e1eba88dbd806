//! Синхронизация метрик и рассылка результата всем представлениям.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use insta_client::{InstaClientError, InstaClientResult};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::api::DashboardApi;
use crate::filter::FilterSelection;
use crate::jobs::{JobOutcome, JobPoller, JobStatus};
use crate::state::{AppState, SyncStatus, latest_metrics_update};
use crate::store::{CollectionPayload, LoadOutcome, PostCollectionStore};

/// Ёмкость канала событий синхронизации по умолчанию.
pub const DEFAULT_EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
/// Событие, которое получают все подписанные представления.
pub enum SyncEvent {
    /// Метрики обновлены; внутри свежие данные для замены коллекции.
    MetricsSynced(Arc<CollectionPayload>),
}

/// Координатор синхронизации: `sync → load → broadcast`.
pub struct SyncCoordinator<A> {
    api: Arc<A>,
    app: AppState,
    events: broadcast::Sender<SyncEvent>,
}

impl<A: DashboardApi> SyncCoordinator<A> {
    /// Создаёт координатор с каналом событий ёмкостью `capacity`.
    pub fn new(api: Arc<A>, app: AppState, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self { api, app, events }
    }

    /// Подписка на события синхронизации.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Рассылает готовые данные без сетевого запроса.
    pub fn publish(&self, payload: CollectionPayload) {
        let receivers = self
            .events
            .send(SyncEvent::MetricsSynced(Arc::new(payload)))
            .unwrap_or(0);
        tracing::debug!(receivers, "metrics synced event published");
    }

    /// Запускает обновление метрик на сервере, затем перезагружает `store`
    /// с активным фильтром и рассылает результат.
    ///
    /// Ошибка любого шага возвращается вызывающему и отражается в
    /// [`SyncStatus::Failed`].
    pub async fn sync_and_reload(
        &self,
        store: &PostCollectionStore<A>,
        filter: &FilterSelection,
    ) -> InstaClientResult<LoadOutcome> {
        let username = self.app.username().ok_or(InstaClientError::AuthRequired)?;
        self.app.set_sync_status(SyncStatus::Syncing);
        tracing::info!(username = %username, "syncing metrics");

        let result = self.sync_then_load(&username, store, filter).await;
        match &result {
            Ok(outcome) => {
                self.app.set_sync_status(SyncStatus::Idle);
                tracing::info!(?outcome, "metrics sync finished");
            }
            Err(err) => {
                self.app.set_sync_status(SyncStatus::Failed(err.to_string()));
                tracing::warn!(error = %err, "metrics sync failed");
            }
        }
        result
    }

    async fn sync_then_load(
        &self,
        username: &str,
        store: &PostCollectionStore<A>,
        filter: &FilterSelection,
    ) -> InstaClientResult<LoadOutcome> {
        self.api.sync_posts(username).await?;

        let outcome = store.load(Some(username), filter).await?;
        if outcome == LoadOutcome::Applied {
            let payload = store.read(|state| CollectionPayload {
                posts: state.posts.clone(),
                categories: state.categories.clone(),
                subcategories: state.subcategories.clone(),
                pagination: Some(state.pagination),
            });
            self.app.record_metrics_update(&payload.posts);
            self.publish(payload);
        }
        Ok(outcome)
    }

    /// Применяет событие к хранилищу без сетевого запроса.
    pub fn apply_event(&self, store: &PostCollectionStore<A>, event: &SyncEvent) {
        match event {
            SyncEvent::MetricsSynced(payload) => {
                store.apply_payload(payload.as_ref().clone());
                self.app.record_metrics_update(&payload.posts);
            }
        }
    }

    /// Подписывает `store` на события: каждое событие заменяет его коллекцию.
    ///
    /// Задача завершается, когда координатор уничтожен.
    pub fn listen(self: &Arc<Self>, store: Arc<PostCollectionStore<A>>) -> JoinHandle<()> {
        let mut rx = self.subscribe();
        let coordinator = Arc::downgrade(self);

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let Some(coordinator) = coordinator.upgrade() else {
                            break;
                        };
                        coordinator.apply_event(&store, &event);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "sync listener lagged behind");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Ждёт, пока сервер отдаст метрики новее `since`.
    ///
    /// Нужен, когда backend обновляет метрики асинхронно после `sync`.
    pub async fn wait_for_fresh_metrics(
        &self,
        poller: &mut JobPoller,
        since: Option<DateTime<Utc>>,
    ) -> InstaClientResult<JobOutcome<DateTime<Utc>>> {
        let username = self.app.username().ok_or(InstaClientError::AuthRequired)?;
        let api = self.api.clone();

        let outcome = poller
            .run(|| {
                let api = api.clone();
                let username = username.clone();
                async move {
                    let data = api.fetch_dashboard(&username).await?;
                    let status = match latest_metrics_update(&data.posts) {
                        Some(latest) if since.is_none_or(|since| latest > since) => {
                            JobStatus::Complete(latest)
                        }
                        _ => JobStatus::Pending,
                    };
                    Ok(status)
                }
            })
            .await?;

        if let JobOutcome::Complete(latest) = &outcome {
            self.app.set_last_update(Some(*latest));
        }
        Ok(outcome)
    }
}
