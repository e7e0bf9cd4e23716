use thiserror::Error;

#[derive(Debug, Error)]
/// Ошибки клиентской библиотеки `biblionet-client`.
pub enum BiblioClientError {
    /// Данные формы отклонены до отправки запроса.
    #[error("validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    /// Операция требует вошедшего пользователя, а сессия пуста.
    #[error("login required")]
    NotAuthenticated,

    /// Сервер вернул статус вне диапазона 2xx.
    ///
    /// `message` берётся из поля `detail` тела ошибки, иначе `HTTP <status>`.
    #[error("{message}")]
    Remote {
        /// HTTP-статус ответа.
        status: u16,
        /// Сообщение сервера.
        message: String,
    },

    /// Запрос не завершился: ответа от сервера нет.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Успешный ответ не удалось разобрать в ожидаемую структуру.
    #[error("decode error: {0}")]
    Decode(String),

    /// Тело запроса не удалось сериализовать в JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Результат операций `biblionet-client`.
pub type BiblioClientResult<T> = Result<T, BiblioClientError>;

impl BiblioClientError {
    pub(crate) fn remote(status: reqwest::StatusCode, message: Option<String>) -> Self {
        let message = message.unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
        Self::Remote {
            status: status.as_u16(),
            message,
        }
    }

    /// HTTP-статус, если ошибка пришла от сервера.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// `true` для 401/403 от сервера и для пустой сессии.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::NotAuthenticated)
            || matches!(self.status(), Some(401) | Some(403))
    }
}
