//! Долговременное key/value-хранилище сессии (аналог `localStorage`).

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

use crate::models::User;

/// Ключ сериализованного текущего пользователя.
pub const USER_KEY: &str = "currentUser";
/// Ключ bearer-токена.
pub const TOKEN_KEY: &str = "authToken";

#[derive(Debug, Error)]
/// Ошибки доступа к хранилищу.
pub enum StorageError {
    /// Ошибка файловой системы.
    #[error("storage io error: {0}")]
    Io(#[from] io::Error),

    /// Хранилище недоступно в текущем окружении.
    #[error("storage is not available: {0}")]
    Unavailable(String),
}

/// Хранилище строковых значений по ключу, переживающее перезапуск.
///
/// Запись заменяет значение целиком; удаление отсутствующего ключа не ошибка.
pub trait DurableStorage: Send + Sync {
    /// Читает значение по ключу.
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;
    /// Записывает значение по ключу.
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
    /// Удаляет значение по ключу.
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Clone, Default)]
/// Хранилище в памяти. Клоны разделяют одни и те же данные, поэтому новый
/// `SessionStore` поверх клона видит то же, что видел бы после перезагрузки.
pub struct MemoryStorage {
    items: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    /// Создаёт пустое хранилище.
    pub fn new() -> Self {
        Self::default()
    }

    /// Количество сохранённых ключей.
    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// `true`, если ключей нет.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DurableStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone)]
/// Хранилище в каталоге на диске: один файл на ключ.
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Создаёт хранилище в каталоге `dir`. Каталог создаётся при первой записи.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Каталог хранилища.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StorageError::Unavailable(format!("invalid key '{key}'")));
        }
        Ok(self.dir.join(key))
    }
}

impl DurableStorage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir)?;
        fs::write(path, value)?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

pub(crate) fn parse_token(raw: &str) -> Option<String> {
    let token = raw.trim().to_string();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

pub(crate) fn parse_user(raw: &str) -> Result<User, serde_json::Error> {
    serde_json::from_str::<User>(raw)
}
