//! Опрос долгих фоновых операций backend.
//!
//! Операция проходит `Pending → Complete | Failed`. Опрос ограничен интервалом
//! и числом попыток и прерывается, как только владелец [`CancelHandle`]
//! отменяет его или просто уходит со страницы (handle уничтожен).

use std::future::Future;
use std::time::Duration;

use insta_client::InstaClientResult;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Состояние операции, которое сообщает backend.
pub enum JobStatus<T> {
    /// Ещё выполняется.
    Pending,
    /// Завершена с результатом.
    Complete(T),
    /// Завершена ошибкой.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Итог опроса.
pub enum JobOutcome<T> {
    /// Операция завершена.
    Complete(T),
    /// Backend сообщил об ошибке операции.
    Failed(String),
    /// Опрос отменён владельцем.
    Cancelled,
    /// Попытки закончились, а операция всё ещё выполняется.
    TimedOut {
        /// Сколько раз спросили статус.
        attempts: u32,
    },
}

#[derive(Debug, Clone, Copy)]
/// Границы опроса.
pub struct PollConfig {
    /// Пауза между запросами статуса.
    pub interval: Duration,
    /// Максимум запросов статуса.
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 60,
        }
    }
}

#[derive(Debug)]
/// Отменяет опрос явно или при уничтожении.
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Отменяет опрос.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl Drop for CancelHandle {
    fn drop(&mut self) {
        self.tx.send_replace(true);
    }
}

#[derive(Debug)]
/// Опрашивает статус операции до завершения, отмены или исчерпания попыток.
pub struct JobPoller {
    config: PollConfig,
    cancelled: watch::Receiver<bool>,
}

impl JobPoller {
    /// Создаёт опросчик и связанный с ним handle отмены.
    pub fn new(config: PollConfig) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                config,
                cancelled: rx,
            },
            CancelHandle { tx },
        )
    }

    fn is_cancelled(&self) -> bool {
        // закрытый канал = handle уничтожен
        *self.cancelled.borrow() || self.cancelled.has_changed().is_err()
    }

    /// Запускает опрос. Ошибка `check` прерывает опрос без повторов.
    pub async fn run<T, F, Fut>(&mut self, mut check: F) -> InstaClientResult<JobOutcome<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = InstaClientResult<JobStatus<T>>>,
    {
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            if self.is_cancelled() {
                return Ok(JobOutcome::Cancelled);
            }

            match check().await? {
                JobStatus::Complete(value) => return Ok(JobOutcome::Complete(value)),
                JobStatus::Failed(message) => return Ok(JobOutcome::Failed(message)),
                JobStatus::Pending => {
                    tracing::debug!(attempt, max_attempts, "job still pending");
                }
            }

            if attempt == max_attempts {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                _ = self.cancelled.changed() => return Ok(JobOutcome::Cancelled),
            }
        }

        Ok(JobOutcome::TimedOut {
            attempts: max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fetch_error;
    use insta_client::InstaClientError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(1),
            max_attempts,
        }
    }

    #[tokio::test]
    async fn completes_after_pending_rounds() {
        let (mut poller, _handle) = JobPoller::new(fast(10));
        let calls = Arc::new(AtomicU32::new(0));

        let outcome = poller
            .run(|| {
                let calls = calls.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    Ok(if n < 3 { JobStatus::Pending } else { JobStatus::Complete("script") })
                }
            })
            .await
            .expect("poll must succeed");

        assert_eq!(outcome, JobOutcome::Complete("script"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_after_attempt_budget() {
        let (mut poller, _handle) = JobPoller::new(fast(4));
        let calls = Arc::new(AtomicU32::new(0));

        let outcome: JobOutcome<()> = poller
            .run(|| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(JobStatus::Pending)
                }
            })
            .await
            .expect("poll must succeed");

        assert_eq!(outcome, JobOutcome::TimedOut { attempts: 4 });
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn backend_failure_is_terminal() {
        let (mut poller, _handle) = JobPoller::new(fast(10));
        let outcome: JobOutcome<()> = poller
            .run(|| async { Ok(JobStatus::Failed("generation failed".to_string())) })
            .await
            .expect("poll must succeed");
        assert_eq!(outcome, JobOutcome::Failed("generation failed".to_string()));
    }

    #[tokio::test]
    async fn fetch_error_is_not_retried() {
        let (mut poller, _handle) = JobPoller::new(fast(10));
        let calls = Arc::new(AtomicU32::new(0));

        let err = poller
            .run(|| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<JobStatus<()>, _>(fetch_error("gone"))
                }
            })
            .await
            .expect_err("must fail");

        assert!(matches!(err, InstaClientError::Fetch { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropping_handle_cancels() {
        let (mut poller, handle) = JobPoller::new(fast(10));
        drop(handle);

        let outcome: JobOutcome<()> = poller
            .run(|| async { Ok(JobStatus::Pending) })
            .await
            .expect("poll must succeed");
        assert_eq!(outcome, JobOutcome::Cancelled);
    }

    #[tokio::test]
    async fn cancel_interrupts_wait() {
        let (mut poller, handle) = JobPoller::new(PollConfig {
            interval: Duration::from_secs(3600),
            max_attempts: 5,
        });

        let task = tokio::spawn(async move {
            poller
                .run(|| async { Ok::<_, InstaClientError>(JobStatus::<()>::Pending) })
                .await
        });
        tokio::task::yield_now().await;
        handle.cancel();

        let outcome = task.await.expect("task").expect("poll must succeed");
        assert_eq!(outcome, JobOutcome::Cancelled);
    }
}
