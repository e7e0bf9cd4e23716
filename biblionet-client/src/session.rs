//! Хранилище сессии: кто вошёл в систему.
//!
//! `SessionStore` единственный владелец [`Session`]: только он пишет в
//! память и в долговременное хранилище. Остальные компоненты читают сессию
//! и подписываются на [`SessionEvent`]. Подписчики вызываются синхронно, в
//! порядке регистрации, уже после применения изменения.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, warn};

use crate::models::{User, UserPatch};
use crate::storage::{DurableStorage, StorageError, TOKEN_KEY, USER_KEY, parse_token, parse_user};

#[derive(Debug, Clone, Default, PartialEq)]
/// Текущая сессия: пользователь и его токен.
pub struct Session {
    /// Кешированная копия пользователя.
    pub user: Option<User>,
    /// Bearer-токен.
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
/// Уведомление об изменении сессии.
pub enum SessionEvent {
    /// Сессия установлена или пользователь обновлён.
    Changed(User),
    /// Сессия очищена.
    Cleared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Идентификатор подписки, нужен для отписки.
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Источник истины о вошедшем пользователе.
pub struct SessionStore {
    storage: Arc<dyn DurableStorage>,
    session: RwLock<Session>,
    listeners: Mutex<Vec<(SubscriptionId, Listener)>>,
    next_subscription: AtomicU64,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("session", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Создаёт хранилище сессии и сразу восстанавливает её из `storage`.
    pub fn new(storage: Arc<dyn DurableStorage>) -> Self {
        let store = Self {
            storage,
            session: RwLock::new(Session::default()),
            listeners: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        };
        store.hydrate();
        store
    }

    /// Перечитывает сессию из долговременного хранилища.
    ///
    /// Ошибка чтения или разбора не выходит наружу: сессия очищается, и
    /// клиент продолжает работу без входа.
    pub fn hydrate(&self) {
        match self.read_persisted() {
            Ok(session) => {
                debug!(logged_in = session.user.is_some(), "session hydrated");
                *self.write_session() = session;
            }
            Err(reason) => {
                warn!(%reason, "persisted session is unreadable, starting logged out");
                self.clear_session();
            }
        }
    }

    fn read_persisted(&self) -> Result<Session, String> {
        let raw_user = self
            .storage
            .get_item(USER_KEY)
            .map_err(|err| err.to_string())?;
        let raw_token = self
            .storage
            .get_item(TOKEN_KEY)
            .map_err(|err| err.to_string())?;

        let user = match raw_user {
            Some(raw) => Some(parse_user(&raw).map_err(|err| format!("invalid user json: {err}"))?),
            None => None,
        };
        let token = raw_token.as_deref().and_then(parse_token);

        Ok(Session { user, token })
    }

    /// Устанавливает сессию после входа, регистрации или правки профиля.
    pub fn set_session(&self, user: User, token: impl Into<String>) {
        let token = token.into();
        {
            let mut session = self.write_session();
            session.user = Some(user.clone());
            session.token = Some(token.clone());
        }

        self.persist_user(&user);
        log_write_error("token", self.storage.set_item(TOKEN_KEY, &token));

        debug!(user_id = user.id, "session set");
        self.notify(&SessionEvent::Changed(user));
    }

    /// Очищает сессию в памяти и в хранилище. Повторный вызов безопасен,
    /// уведомление `Cleared` отправляется каждый раз.
    pub fn clear_session(&self) {
        *self.write_session() = Session::default();

        log_write_error("user", self.storage.remove_item(USER_KEY));
        log_write_error("token", self.storage.remove_item(TOKEN_KEY));

        debug!("session cleared");
        self.notify(&SessionEvent::Cleared);
    }

    /// Сливает `patch` с кешированным пользователем, сохраняет и уведомляет.
    ///
    /// Без вошедшего пользователя ничего не делает и возвращает `None`.
    pub fn update_user_info(&self, patch: &UserPatch) -> Option<User> {
        let updated = {
            let mut session = self.write_session();
            let user = session.user.as_mut()?;
            patch.apply_to(user);
            user.clone()
        };

        self.persist_user(&updated);
        self.notify(&SessionEvent::Changed(updated.clone()));
        Some(updated)
    }

    /// Текущий токен.
    pub fn token(&self) -> Option<String> {
        self.read_session().token.clone()
    }

    /// Текущий пользователь.
    pub fn current_user(&self) -> Option<User> {
        self.read_session().user.clone()
    }

    /// Идентификатор текущего пользователя.
    pub fn current_user_id(&self) -> Option<i64> {
        self.read_session().user.as_ref().map(|user| user.id)
    }

    /// `true`, если пользователь закеширован.
    pub fn is_logged_in(&self) -> bool {
        self.read_session().user.is_some()
    }

    /// Копия всей сессии.
    pub fn snapshot(&self) -> Session {
        self.read_session().clone()
    }

    /// Регистрирует подписчика на изменения сессии.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.lock_listeners().push((id, Arc::new(listener)));
        id
    }

    /// Снимает подписку. Возвращает `false`, если такой подписки нет.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.lock_listeners();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    fn notify(&self, event: &SessionEvent) {
        // Снимок списка: подписчик может сам (от)писываться.
        let listeners: Vec<Listener> = self
            .lock_listeners()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            listener(event);
        }
    }

    fn persist_user(&self, user: &User) {
        match serde_json::to_string(user) {
            Ok(raw) => log_write_error("user", self.storage.set_item(USER_KEY, &raw)),
            Err(err) => warn!(error = %err, "failed to serialize user for storage"),
        }
    }

    fn read_session(&self) -> std::sync::RwLockReadGuard<'_, Session> {
        self.session.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_session(&self) -> std::sync::RwLockWriteGuard<'_, Session> {
        self.session.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_listeners(&self) -> std::sync::MutexGuard<'_, Vec<(SubscriptionId, Listener)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn log_write_error(what: &str, result: Result<(), StorageError>) {
    if let Err(err) = result {
        warn!(error = %err, "failed to persist session {what}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn sample_user() -> User {
        User {
            id: 42,
            username: "reader".to_string(),
            email: "reader@example.com".to_string(),
            bio: None,
            avatar_url: None,
            created_at: None,
        }
    }

    fn store_over(storage: &MemoryStorage) -> SessionStore {
        SessionStore::new(Arc::new(storage.clone()))
    }

    fn recorder(store: &SessionStore) -> Arc<Mutex<Vec<SessionEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        store.subscribe(move |event| {
            sink.lock().expect("events mutex poisoned").push(event.clone());
        });
        events
    }

    struct FailingStorage;

    impl DurableStorage for FailingStorage {
        fn get_item(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Unavailable("disk on fire".to_string()))
        }

        fn set_item(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("disk on fire".to_string()))
        }

        fn remove_item(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("disk on fire".to_string()))
        }
    }

    #[test]
    fn starts_logged_out_on_empty_storage() {
        let store = store_over(&MemoryStorage::new());
        assert!(!store.is_logged_in());
        assert_eq!(store.token(), None);
        assert_eq!(store.current_user_id(), None);
    }

    #[test]
    fn session_survives_reload() {
        let storage = MemoryStorage::new();
        let store = store_over(&storage);
        store.set_session(sample_user(), "token-1");

        let reloaded = store_over(&storage);

        assert_eq!(reloaded.current_user(), Some(sample_user()));
        assert_eq!(reloaded.token().as_deref(), Some("token-1"));
        assert!(reloaded.is_logged_in());
        assert_eq!(reloaded.current_user_id(), Some(42));
    }

    #[test]
    fn clear_session_twice_leaves_nothing_behind() {
        let storage = MemoryStorage::new();
        let store = store_over(&storage);
        let events = recorder(&store);
        store.set_session(sample_user(), "token-1");

        store.clear_session();
        store.clear_session();

        assert_eq!(store.snapshot(), Session::default());
        assert!(storage.is_empty());
        let events = events.lock().expect("events mutex poisoned");
        assert_eq!(
            *events,
            vec![
                SessionEvent::Changed(sample_user()),
                SessionEvent::Cleared,
                SessionEvent::Cleared,
            ]
        );
    }

    #[test]
    fn corrupt_user_json_degrades_to_logged_out() {
        let storage = MemoryStorage::new();
        storage.set_item(USER_KEY, "definitely not json").expect("set");
        storage.set_item(TOKEN_KEY, "stale-token").expect("set");

        let store = store_over(&storage);

        assert!(!store.is_logged_in());
        assert_eq!(store.token(), None);
        assert!(storage.is_empty());
    }

    #[test]
    fn blank_token_is_treated_as_absent() {
        let storage = MemoryStorage::new();
        storage
            .set_item(USER_KEY, &serde_json::to_string(&sample_user()).expect("json"))
            .expect("set");
        storage.set_item(TOKEN_KEY, "   ").expect("set");

        let store = store_over(&storage);

        assert!(store.is_logged_in());
        assert_eq!(store.token(), None);
    }

    #[test]
    fn storage_failures_are_swallowed() {
        let store = SessionStore::new(Arc::new(FailingStorage));
        assert!(!store.is_logged_in());

        store.set_session(sample_user(), "token-1");
        assert_eq!(store.current_user_id(), Some(42));
        assert_eq!(store.token().as_deref(), Some("token-1"));

        store.clear_session();
        assert!(!store.is_logged_in());
    }

    #[test]
    fn update_user_info_merges_persists_and_notifies() {
        let storage = MemoryStorage::new();
        let store = store_over(&storage);
        store.set_session(sample_user(), "token-1");
        let events = recorder(&store);

        let patch = UserPatch {
            bio: Some("likes long books".to_string()),
            ..UserPatch::default()
        };
        let updated = store.update_user_info(&patch).expect("user is logged in");

        assert_eq!(updated.bio.as_deref(), Some("likes long books"));
        assert_eq!(updated.username, "reader");
        assert_eq!(store_over(&storage).current_user(), Some(updated.clone()));
        assert_eq!(store.token().as_deref(), Some("token-1"));
        assert_eq!(
            *events.lock().expect("events mutex poisoned"),
            vec![SessionEvent::Changed(updated)]
        );
    }

    #[test]
    fn update_user_info_without_user_is_noop() {
        let storage = MemoryStorage::new();
        let store = store_over(&storage);
        let events = recorder(&store);

        assert!(store.update_user_info(&UserPatch::default()).is_none());
        assert!(storage.is_empty());
        assert!(events.lock().expect("events mutex poisoned").is_empty());
    }

    #[test]
    fn unsubscribed_listener_gets_no_events() {
        let store = store_over(&MemoryStorage::new());
        let events = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&events);
        let id = store.subscribe(move |_| {
            *sink.lock().expect("counter mutex poisoned") += 1;
        });

        store.clear_session();
        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.clear_session();

        assert_eq!(*events.lock().expect("counter mutex poisoned"), 1);
    }

    #[test]
    fn listeners_see_applied_state() {
        let store = Arc::new(store_over(&MemoryStorage::new()));
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let observed = Arc::clone(&store);
        store.subscribe(move |_| {
            *sink.lock().expect("seen mutex poisoned") = observed.current_user_id();
        });

        store.set_session(sample_user(), "token-1");

        assert_eq!(*seen.lock().expect("seen mutex poisoned"), Some(42));
    }
}
