//! Клиентская библиотека BiblioNet: каталог фильмов и книг с рецензиями,
//! подписками и лентой активности.
//!
//! Состав:
//! - [`SessionStore`]: кто вошёл, с сохранением в [`DurableStorage`] и
//!   подпиской на изменения;
//! - [`ApiGateway`]: JSON-запросы к backend с bearer-токеном из сессии,
//!   включая лайки, комментарии, библиотеку и собственные списки;
//! - [`FeedPager`]: постраничная загрузка ленты без дублирующих запросов;
//! - [`BiblioClient`]: фасад, который связывает всё вместе и проверяет
//!   формы до отправки.

mod activity;
mod error;
mod http_client;
mod library;
mod models;
mod pager;
mod session;
mod settings;
mod storage;
mod validation;

pub use activity::{Activity, ActivityKind, Engagement, ItemRef, ReviewRef};
pub use error::{BiblioClientError, BiblioClientResult};
pub use http_client::{ApiGateway, ApiMethod};
pub use library::{
    CreatedList, CustomList, LibraryAction, LibraryChange, LibraryEntry, LibraryStatus,
    ListPrivacy, NewCustomList,
};
pub use models::{
    AuthResponse, Comment, FollowStats, Item, ItemUpdate, LikeAction, LikeSummary, LikeToggle,
    Liker, NewReview, Review, User, UserPatch,
};
pub use pager::{
    DEFAULT_PAGE_SIZE, DEFAULT_SCROLL_THRESHOLD_PX, FeedPager, FeedSource, LoadOutcome, PageRequest,
    PagerPhase, ScrollMetrics,
};
pub use session::{Session, SessionEvent, SessionStore, SubscriptionId};
pub use settings::{ClientSettings, DEFAULT_API_BASE_URL};
pub use storage::{
    DurableStorage, FileStorage, MemoryStorage, StorageError, TOKEN_KEY, USER_KEY,
};
pub use validation::{
    CommentForm, CustomListForm, ForgotPasswordForm, LoginForm, PasswordChangeForm,
    PasswordResetForm, RegisterForm, ReviewForm,
};

use std::sync::Arc;

use serde_json::Value;
use tracing::info;
use validator::Validate;

/// Код сброса, с которым backend принимает смену пароля из настроек профиля.
const SETTINGS_RESET_TOKEN: &str = "settings_update";

#[derive(Debug, Clone)]
/// Фасад над сессией и шлюзом: операции уровня «страницы».
pub struct BiblioClient {
    settings: ClientSettings,
    session: Arc<SessionStore>,
    gateway: ApiGateway,
}

impl BiblioClient {
    /// Создаёт клиент; сессия сразу восстанавливается из `storage`.
    pub fn new(
        settings: ClientSettings,
        storage: Arc<dyn DurableStorage>,
    ) -> BiblioClientResult<Self> {
        let session = Arc::new(SessionStore::new(storage));
        let gateway = ApiGateway::new(&settings, Arc::clone(&session))?;
        Ok(Self {
            settings,
            session,
            gateway,
        })
    }

    /// Хранилище сессии.
    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// Шлюз для запросов, у которых нет отдельной операции фасада.
    pub fn gateway(&self) -> &ApiGateway {
        &self.gateway
    }

    /// Настройки клиента.
    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Входит в систему и сохраняет сессию.
    ///
    /// При ошибке прежняя сессия не меняется.
    pub async fn login(&self, form: LoginForm) -> BiblioClientResult<AuthResponse> {
        form.validate()?;
        let auth = self.gateway.login(&form.email, &form.password).await?;
        self.session.set_session(auth.user.clone(), auth.token.clone());
        info!(user_id = auth.user.id, "logged in");
        Ok(auth)
    }

    /// Регистрирует пользователя и сохраняет сессию.
    pub async fn register(&self, form: RegisterForm) -> BiblioClientResult<AuthResponse> {
        form.validate()?;
        let auth = self
            .gateway
            .register(&form.username, &form.email, &form.password)
            .await?;
        self.session.set_session(auth.user.clone(), auth.token.clone());
        info!(user_id = auth.user.id, "registered");
        Ok(auth)
    }

    /// Выходит из системы.
    pub fn logout(&self) {
        self.session.clear_session();
        info!("logged out");
    }

    /// Перезапрашивает текущего пользователя и обновляет кеш сессии.
    pub async fn refresh_current_user(&self) -> BiblioClientResult<User> {
        let token = self
            .session
            .token()
            .ok_or(BiblioClientError::NotAuthenticated)?;
        let user = self.gateway.current_user().await?;
        self.session.set_session(user.clone(), token);
        Ok(user)
    }

    /// Сохраняет правку профиля на сервере и сливает её в кеш сессии.
    pub async fn update_profile(&self, patch: &UserPatch) -> BiblioClientResult<User> {
        let user_id = self
            .session
            .current_user_id()
            .ok_or(BiblioClientError::NotAuthenticated)?;
        let saved = self.gateway.update_user(user_id, patch).await?;

        let merged = UserPatch {
            username: Some(saved.username),
            email: Some(saved.email),
            bio: saved.bio.or_else(|| patch.bio.clone()),
            avatar_url: saved.avatar_url.or_else(|| patch.avatar_url.clone()),
        };
        self.session
            .update_user_info(&merged)
            .ok_or(BiblioClientError::NotAuthenticated)
    }

    /// Пейджер ленты пользователя `user_id` с настройками клиента.
    pub fn feed_pager(&self, user_id: i64) -> FeedPager {
        FeedPager::with_options(
            Arc::new(self.gateway.clone()),
            user_id,
            self.settings.feed_page_size,
            self.settings.scroll_threshold_px,
        )
    }

    /// Пейджер ленты текущего пользователя.
    pub fn my_feed_pager(&self) -> BiblioClientResult<FeedPager> {
        let user_id = self
            .session
            .current_user_id()
            .ok_or(BiblioClientError::NotAuthenticated)?;
        Ok(self.feed_pager(user_id))
    }

    /// Подписывается на пользователя.
    pub async fn follow(&self, user_id: i64) -> BiblioClientResult<Value> {
        self.gateway.follow(user_id).await
    }

    /// Отписывается от пользователя.
    pub async fn unfollow(&self, user_id: i64) -> BiblioClientResult<Value> {
        self.gateway.unfollow(user_id).await
    }

    /// Публикует рецензию от имени текущего пользователя.
    pub async fn post_review(&self, form: ReviewForm) -> BiblioClientResult<Review> {
        form.validate()?;
        let user_id = self
            .session
            .current_user_id()
            .ok_or(BiblioClientError::NotAuthenticated)?;
        let review = NewReview {
            user_id,
            item_id: form.item_id,
            review_text: form.review_text,
            rating: form.rating,
        };
        self.gateway.create_review(&review).await
    }

    /// Комментирует рецензию.
    pub async fn comment_on_review(&self, form: CommentForm) -> BiblioClientResult<Comment> {
        form.validate()?;
        self.gateway
            .add_comment(form.review_id, &form.comment_text)
            .await
    }

    /// Создаёт собственный список текущего пользователя.
    pub async fn create_custom_list(
        &self,
        form: CustomListForm,
    ) -> BiblioClientResult<CreatedList> {
        form.validate()?;
        let user_id = self
            .session
            .current_user_id()
            .ok_or(BiblioClientError::NotAuthenticated)?;
        let list = NewCustomList::new(user_id, &form.name, &form.description, form.privacy);
        self.gateway.create_custom_list(&list).await
    }

    /// Переносит элемент с полки «в планах» на полку «готово».
    pub async fn mark_completed(
        &self,
        item_id: i64,
        current: LibraryStatus,
    ) -> BiblioClientResult<LibraryChange> {
        self.gateway
            .update_library(item_id, current.completed(), LibraryAction::Add)
            .await
    }

    /// Просит backend выслать ссылку для сброса пароля.
    pub async fn forgot_password(&self, form: ForgotPasswordForm) -> BiblioClientResult<()> {
        form.validate()?;
        self.gateway.forgot_password(&form.email).await?;
        info!("password reset requested");
        Ok(())
    }

    /// Задаёт новый пароль по коду из письма.
    pub async fn reset_password(&self, form: PasswordResetForm) -> BiblioClientResult<()> {
        form.validate()?;
        self.gateway
            .reset_password(&form.email, &form.token, &form.new_password)
            .await?;
        info!("password reset");
        Ok(())
    }

    /// Меняет пароль вошедшего пользователя.
    ///
    /// Текущий пароль сначала проверяется входом; сессия при этом не
    /// меняется.
    pub async fn change_password(&self, form: PasswordChangeForm) -> BiblioClientResult<()> {
        form.validate()?;
        let user = self
            .session
            .current_user()
            .ok_or(BiblioClientError::NotAuthenticated)?;

        self.gateway
            .login(&user.email, &form.current_password)
            .await
            .map_err(|err| match err {
                BiblioClientError::Remote { status, .. } => BiblioClientError::Remote {
                    status,
                    message: "current password is incorrect".to_string(),
                },
                other => other,
            })?;
        self.gateway
            .reset_password(&user.email, SETTINGS_RESET_TOKEN, &form.new_password)
            .await?;
        info!(user_id = user.id, "password changed");
        Ok(())
    }
}
