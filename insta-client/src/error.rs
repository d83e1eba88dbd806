use thiserror::Error;

#[derive(Debug, Error)]
/// Ошибки клиентской библиотеки `insta-client`.
pub enum InstaClientError {
    /// Ошибка HTTP-транспорта (`reqwest`): сеть, таймаут, декодирование тела.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Нет авторизованного пользователя; запрос не отправлялся.
    #[error("authentication required")]
    AuthRequired,

    /// Сервер ответил неуспешным статусом.
    #[error("request failed ({status}): {message}")]
    Fetch {
        /// HTTP-статус ответа.
        status: u16,
        /// Сообщение из тела ответа или описание статуса.
        message: String,
    },

    /// Локальная проверка входных данных не прошла.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Некорректная конфигурация клиента (URL, cookie).
    #[error("invalid client config: {0}")]
    InvalidConfig(String),
}

/// Результат операций `insta-client`.
pub type InstaClientResult<T> = Result<T, InstaClientError>;

impl InstaClientError {
    pub(crate) fn from_http_status(status: reqwest::StatusCode, message: Option<String>) -> Self {
        let message = message
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| format!("http status {status}"));

        Self::Fetch {
            status: status.as_u16(),
            message,
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_http_status(status, None);
        }
        Self::Http(err)
    }

    /// `true` для сетевых ошибок и неуспешных HTTP-ответов (класс `FetchError`).
    pub fn is_fetch(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Fetch { .. })
    }

    /// HTTP-статус, если ошибка пришла от сервера.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Fetch { status, .. } => Some(*status),
            Self::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
