use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::activity::Activity;
use crate::error::{BiblioClientError, BiblioClientResult};
use crate::library::{
    CreatedList, CustomList, CustomListPageDto, LibraryAction, LibraryChange, LibraryChangeDto,
    LibraryEntry, LibraryPageDto, LibraryStatus, NewCustomList,
};
use crate::models::{
    AuthResponse, Comment, FollowStats, Item, ItemUpdate, LikeSummary, LikeToggle, NewReview,
    Review, User, UserPatch,
};
use crate::pager::{FeedSource, PageRequest};
use crate::session::SessionStore;
use crate::settings::ClientSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// HTTP-методы, которые использует backend.
pub enum ApiMethod {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `DELETE`
    Delete,
}

impl ApiMethod {
    fn as_reqwest(self) -> Method {
        match self {
            Self::Get => Method::GET,
            Self::Post => Method::POST,
            Self::Put => Method::PUT,
            Self::Delete => Method::DELETE,
        }
    }

    fn carries_body(self) -> bool {
        matches!(self, Self::Post | Self::Put)
    }
}

impl std::fmt::Display for ApiMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_reqwest().as_str())
    }
}

#[derive(Debug, Serialize)]
struct LoginRequestDto<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RegisterRequestDto<'a> {
    username: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct ForgotPasswordDto<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct ResetPasswordDto<'a> {
    email: &'a str,
    token: &'a str,
    new_password: &'a str,
}

#[derive(Debug, Serialize)]
struct ActorDto {
    user_id: i64,
}

#[derive(Debug, Serialize)]
struct NewCommentDto<'a> {
    user_id: i64,
    comment_text: &'a str,
}

#[derive(Debug, Deserialize)]
struct CommentPageDto {
    #[serde(default)]
    comments: Vec<Comment>,
}

#[derive(Debug, Deserialize)]
struct IsFollowingDto {
    is_following: bool,
}

#[derive(Debug, Deserialize)]
struct IsLikedDto {
    is_liked: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorResponseDto {
    detail: Option<Value>,
}

#[derive(Debug)]
struct ApiRequest<'a> {
    method: ApiMethod,
    path: &'a str,
    query: Vec<(&'static str, String)>,
    body: Option<Value>,
}

impl<'a> ApiRequest<'a> {
    fn new(method: ApiMethod, path: &'a str) -> Self {
        Self {
            method,
            path,
            query: Vec::new(),
            body: None,
        }
    }

    fn query(mut self, key: &'static str, value: impl ToString) -> Self {
        self.query.push((key, value.to_string()));
        self
    }

    fn json<B: Serialize + ?Sized>(mut self, body: &B) -> BiblioClientResult<Self> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }
}

#[derive(Debug, Clone)]
/// Клиентский шлюз к REST API BiblioNet.
///
/// Каждый запрос идёт с `Content-Type: application/json` и, если в сессии
/// есть токен, с `Authorization: Bearer <token>`.
pub struct ApiGateway {
    base_url: String,
    client: Client,
    session: Arc<SessionStore>,
}

impl ApiGateway {
    /// Создаёт шлюз с адресом и таймаутами из `settings`.
    pub fn new(settings: &ClientSettings, session: Arc<SessionStore>) -> BiblioClientResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;

        Ok(Self {
            base_url: settings.api_base_url.clone(),
            client,
            session,
        })
    }

    /// Базовый URL backend.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Хранилище сессии, из которого берётся токен.
    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Выполняет запрос и декодирует JSON-ответ в `T`.
    ///
    /// Тело прикрепляется только к `POST`/`PUT`. Пустой успешный ответ
    /// декодируется как JSON `null`.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: ApiMethod,
        path: &str,
        body: Option<Value>,
    ) -> BiblioClientResult<T> {
        let mut request = ApiRequest::new(method, path);
        request.body = body;
        self.send(request).await
    }

    /// `GET path`.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> BiblioClientResult<T> {
        self.send(ApiRequest::new(ApiMethod::Get, path)).await
    }

    /// `POST path` с JSON-телом.
    pub async fn post<B, T>(&self, path: &str, body: &B) -> BiblioClientResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(ApiRequest::new(ApiMethod::Post, path).json(body)?)
            .await
    }

    /// `PUT path` с JSON-телом.
    pub async fn put<B, T>(&self, path: &str, body: &B) -> BiblioClientResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(ApiRequest::new(ApiMethod::Put, path).json(body)?)
            .await
    }

    /// `DELETE path`.
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> BiblioClientResult<T> {
        self.send(ApiRequest::new(ApiMethod::Delete, path)).await
    }

    async fn send<T: DeserializeOwned>(&self, request: ApiRequest<'_>) -> BiblioClientResult<T> {
        let ApiRequest {
            method,
            path,
            query,
            body,
        } = request;
        let url = self.endpoint(path);

        let mut builder = self
            .client
            .request(method.as_reqwest(), url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if !query.is_empty() {
            builder = builder.query(&query);
        }
        if let Some(token) = self.session.token() {
            builder = builder.bearer_auth(token);
        }
        match body {
            Some(body) if method.carries_body() => {
                builder = builder.body(serde_json::to_vec(&body)?);
            }
            Some(_) => debug!(%method, path, "ignoring body for a request without payload"),
            None => {}
        }

        debug!(%method, path, "sending request");
        let response = builder.send().await.map_err(|err| {
            warn!(%method, path, error = %err, "request did not complete");
            BiblioClientError::Transport(err)
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|err| {
            warn!(%method, path, error = %err, "failed to read response body");
            BiblioClientError::Transport(err)
        })?;

        if !status.is_success() {
            let err = BiblioClientError::remote(status, error_detail(&text));
            warn!(%method, path, status = status.as_u16(), error = %err, "request failed");
            return Err(err);
        }

        info!(%method, path, status = status.as_u16(), "request succeeded");
        decode_body(status, &text)
    }

    /// `POST /auth/login`.
    pub async fn login(&self, email: &str, password: &str) -> BiblioClientResult<AuthResponse> {
        let payload = LoginRequestDto { email, password };
        self.post("/auth/login", &payload).await
    }

    /// `POST /auth/register`.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> BiblioClientResult<AuthResponse> {
        let payload = RegisterRequestDto {
            username,
            email,
            password,
        };
        self.post("/auth/register", &payload).await
    }

    /// `GET /auth/current-user`.
    pub async fn current_user(&self) -> BiblioClientResult<User> {
        self.get("/auth/current-user").await
    }

    /// `GET /feed?user_id=&skip=&limit=`.
    pub async fn feed_page(&self, request: PageRequest) -> BiblioClientResult<Vec<Activity>> {
        self.send(
            ApiRequest::new(ApiMethod::Get, "/feed")
                .query("user_id", request.user_id)
                .query("skip", request.skip)
                .query("limit", request.limit),
        )
        .await
    }

    /// `GET /users/{id}/activities`.
    pub async fn user_activities(&self, user_id: i64) -> BiblioClientResult<Vec<Activity>> {
        self.get(&format!("/users/{user_id}/activities")).await
    }

    /// Подписка текущего пользователя на `user_id`.
    pub async fn follow(&self, user_id: i64) -> BiblioClientResult<Value> {
        let follower_id = self.require_user_id()?;
        let path = format!("/follows/{user_id}/follow");
        self.send(
            ApiRequest::new(ApiMethod::Post, &path)
                .query("follower_id", follower_id)
                .json(&serde_json::json!({}))?,
        )
        .await
    }

    /// Отписка текущего пользователя от `user_id`.
    pub async fn unfollow(&self, user_id: i64) -> BiblioClientResult<Value> {
        let follower_id = self.require_user_id()?;
        let path = format!("/follows/{user_id}/unfollow");
        self.send(ApiRequest::new(ApiMethod::Delete, &path).query("follower_id", follower_id))
            .await
    }

    /// На кого подписан `user_id`.
    pub async fn following(&self, user_id: i64) -> BiblioClientResult<Vec<User>> {
        self.get(&format!("/follows/{user_id}/following")).await
    }

    /// Кто подписан на `user_id`.
    pub async fn followers(&self, user_id: i64) -> BiblioClientResult<Vec<User>> {
        self.get(&format!("/follows/{user_id}/followers")).await
    }

    /// `GET /items`.
    pub async fn list_items(&self) -> BiblioClientResult<Vec<Item>> {
        self.get("/items").await
    }

    /// `GET /items/{id}`.
    pub async fn get_item(&self, item_id: i64) -> BiblioClientResult<Item> {
        self.get(&format!("/items/{item_id}")).await
    }

    /// `GET /items/search?q=&item_type=`.
    pub async fn search_items(
        &self,
        query: &str,
        item_type: Option<&str>,
    ) -> BiblioClientResult<Vec<Item>> {
        let mut request = ApiRequest::new(ApiMethod::Get, "/items/search").query("q", query);
        if let Some(item_type) = item_type {
            request = request.query("item_type", item_type);
        }
        self.send(request).await
    }

    /// `PUT /items/{id}`.
    pub async fn update_item(&self, item_id: i64, update: &ItemUpdate) -> BiblioClientResult<Item> {
        self.put(&format!("/items/{item_id}"), update).await
    }

    /// `DELETE /items/{id}`.
    pub async fn delete_item(&self, item_id: i64) -> BiblioClientResult<Value> {
        self.delete(&format!("/items/{item_id}")).await
    }

    /// `GET /reviews`.
    pub async fn list_reviews(&self) -> BiblioClientResult<Vec<Review>> {
        self.get("/reviews").await
    }

    /// `GET /reviews/item/{id}`.
    pub async fn reviews_for_item(&self, item_id: i64) -> BiblioClientResult<Vec<Review>> {
        self.get(&format!("/reviews/item/{item_id}")).await
    }

    /// `POST /reviews`.
    pub async fn create_review(&self, review: &NewReview) -> BiblioClientResult<Review> {
        self.post("/reviews", review).await
    }

    /// `PUT /reviews/{id}?review_text=&rating=`.
    ///
    /// Backend принимает изменения рецензии в строке запроса, тело пустое.
    pub async fn update_review(
        &self,
        review_id: i64,
        review_text: &str,
        rating: Option<i32>,
    ) -> BiblioClientResult<Value> {
        let path = format!("/reviews/{review_id}");
        let mut request = ApiRequest::new(ApiMethod::Put, &path)
            .query("review_text", review_text)
            .json(&serde_json::json!({}))?;
        if let Some(rating) = rating {
            request = request.query("rating", rating);
        }
        self.send(request).await
    }

    /// `DELETE /reviews/{id}`.
    pub async fn delete_review(&self, review_id: i64) -> BiblioClientResult<Value> {
        self.delete(&format!("/reviews/{review_id}")).await
    }

    /// `GET /users/{id}`.
    pub async fn get_user(&self, user_id: i64) -> BiblioClientResult<User> {
        self.get(&format!("/users/{user_id}")).await
    }

    /// `PUT /users/{id}`.
    pub async fn update_user(&self, user_id: i64, patch: &UserPatch) -> BiblioClientResult<User> {
        self.put(&format!("/users/{user_id}"), patch).await
    }

    /// `GET /users/{id}/reviews`.
    pub async fn user_reviews(&self, user_id: i64) -> BiblioClientResult<Vec<Review>> {
        self.get(&format!("/users/{user_id}/reviews")).await
    }

    /// `POST /auth/forgot-password`: письмо со ссылкой для сброса.
    pub async fn forgot_password(&self, email: &str) -> BiblioClientResult<Value> {
        self.post("/auth/forgot-password", &ForgotPasswordDto { email })
            .await
    }

    /// `POST /auth/reset-password`.
    pub async fn reset_password(
        &self,
        email: &str,
        token: &str,
        new_password: &str,
    ) -> BiblioClientResult<Value> {
        let payload = ResetPasswordDto {
            email,
            token,
            new_password,
        };
        self.post("/auth/reset-password", &payload).await
    }

    /// `GET /follows/{id}/follow-stats`.
    pub async fn follow_stats(&self, user_id: i64) -> BiblioClientResult<FollowStats> {
        self.get(&format!("/follows/{user_id}/follow-stats")).await
    }

    /// Подписан ли `user_id` на `target_user_id`.
    pub async fn is_following(
        &self,
        user_id: i64,
        target_user_id: i64,
    ) -> BiblioClientResult<bool> {
        let response: IsFollowingDto = self
            .get(&format!("/follows/{user_id}/is-following/{target_user_id}"))
            .await?;
        Ok(response.is_following)
    }

    /// Ставит или снимает лайк текущего пользователя на рецензии.
    pub async fn like_review(&self, review_id: i64) -> BiblioClientResult<LikeToggle> {
        let user_id = self.require_user_id()?;
        self.post(&format!("/likes/review/{review_id}/like"), &ActorDto { user_id })
            .await
    }

    /// `GET /likes/review/{id}/likes`.
    pub async fn review_likes(&self, review_id: i64) -> BiblioClientResult<LikeSummary> {
        self.get(&format!("/likes/review/{review_id}/likes")).await
    }

    /// Лайкнул ли `user_id` рецензию.
    pub async fn is_review_liked_by(
        &self,
        review_id: i64,
        user_id: i64,
    ) -> BiblioClientResult<bool> {
        let response: IsLikedDto = self
            .get(&format!("/likes/review/{review_id}/liked-by-user/{user_id}"))
            .await?;
        Ok(response.is_liked)
    }

    /// Ставит или снимает лайк текущего пользователя на элементе каталога.
    pub async fn like_item(&self, item_id: i64) -> BiblioClientResult<LikeToggle> {
        let user_id = self.require_user_id()?;
        self.post(&format!("/likes/item/{item_id}/like"), &ActorDto { user_id })
            .await
    }

    /// `GET /likes/item/{id}/likes`.
    pub async fn item_likes(&self, item_id: i64) -> BiblioClientResult<LikeSummary> {
        self.get(&format!("/likes/item/{item_id}/likes")).await
    }

    /// Комментарии к рецензии, новые первыми.
    pub async fn review_comments(&self, review_id: i64) -> BiblioClientResult<Vec<Comment>> {
        let page: CommentPageDto = self
            .get(&format!("/likes/review/{review_id}/comments"))
            .await?;
        Ok(page.comments)
    }

    /// Комментирует рецензию от имени текущего пользователя.
    pub async fn add_comment(
        &self,
        review_id: i64,
        comment_text: &str,
    ) -> BiblioClientResult<Comment> {
        let user_id = self.require_user_id()?;
        let payload = NewCommentDto {
            user_id,
            comment_text,
        };
        self.post(&format!("/likes/review/{review_id}/comments"), &payload)
            .await
    }

    /// Удаляет свой комментарий.
    ///
    /// У `DELETE` нет тела, поэтому автор передаётся в строке запроса.
    pub async fn delete_comment(&self, comment_id: i64) -> BiblioClientResult<Value> {
        let user_id = self.require_user_id()?;
        let path = format!("/likes/review-comments/{comment_id}");
        self.send(ApiRequest::new(ApiMethod::Delete, &path).query("user_id", user_id))
            .await
    }

    /// Библиотека пользователя, при `status` только одна полка.
    pub async fn library(
        &self,
        user_id: i64,
        status: Option<LibraryStatus>,
    ) -> BiblioClientResult<Vec<LibraryEntry>> {
        let path = format!("/items/library/{user_id}");
        let mut request = ApiRequest::new(ApiMethod::Get, &path);
        if let Some(status) = status {
            request = request.query("status", status);
        }
        let page: LibraryPageDto = self.send(request).await?;
        Ok(page.items)
    }

    /// Кладёт элемент на полку текущего пользователя или снимает с неё.
    pub async fn update_library(
        &self,
        item_id: i64,
        status: LibraryStatus,
        action: LibraryAction,
    ) -> BiblioClientResult<LibraryChange> {
        let user_id = self.require_user_id()?;
        let payload = LibraryChangeDto {
            user_id,
            status,
            action,
        };
        self.post(&format!("/items/{item_id}/library"), &payload)
            .await
    }

    /// `GET /items/custom-lists/{user_id}`.
    pub async fn custom_lists(&self, user_id: i64) -> BiblioClientResult<Vec<CustomList>> {
        let page: CustomListPageDto = self
            .get(&format!("/items/custom-lists/{user_id}"))
            .await?;
        Ok(page.lists)
    }

    /// `POST /items/custom-lists`.
    pub async fn create_custom_list(
        &self,
        list: &NewCustomList,
    ) -> BiblioClientResult<CreatedList> {
        self.post("/items/custom-lists", list).await
    }

    /// `DELETE /items/custom-lists/{id}`.
    pub async fn delete_custom_list(&self, list_id: i64) -> BiblioClientResult<Value> {
        self.delete(&format!("/items/custom-lists/{list_id}")).await
    }

    /// Добавляет элемент в избранное текущего пользователя.
    pub async fn favorite_item(&self, item_id: i64) -> BiblioClientResult<Value> {
        let user_id = self.require_user_id()?;
        self.post(&format!("/items/{item_id}/favorite"), &ActorDto { user_id })
            .await
    }

    /// Добавляет элемент в список «моё» текущего пользователя.
    pub async fn add_item_to_list(&self, item_id: i64) -> BiblioClientResult<Value> {
        let user_id = self.require_user_id()?;
        self.post(&format!("/items/{item_id}/add-to-list"), &ActorDto { user_id })
            .await
    }

    fn require_user_id(&self) -> BiblioClientResult<i64> {
        self.session
            .current_user_id()
            .ok_or(BiblioClientError::NotAuthenticated)
    }
}

#[async_trait]
impl FeedSource for ApiGateway {
    async fn fetch_page(&self, request: PageRequest) -> BiblioClientResult<Vec<Activity>> {
        self.feed_page(request).await
    }
}

/// Сообщение из тела ошибки: строковый `detail` как есть, нестроковый как
/// JSON-текст. `None`, если тело не JSON, а `detail` нет или он пустой.
fn error_detail(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<ErrorResponseDto>(body).ok()?;
    match parsed.detail? {
        Value::Null => None,
        Value::String(detail) if detail.trim().is_empty() => None,
        Value::String(detail) => Some(detail),
        other => Some(other.to_string()),
    }
}

fn decode_body<T: DeserializeOwned>(status: StatusCode, text: &str) -> BiblioClientResult<T> {
    let text = if text.trim().is_empty() { "null" } else { text };
    serde_json::from_str::<T>(text).map_err(|err| {
        BiblioClientError::Decode(format!("unexpected response body (HTTP {status}): {err}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn gateway(base_url: &str) -> ApiGateway {
        let session = Arc::new(SessionStore::new(Arc::new(MemoryStorage::new())));
        let settings = ClientSettings::default().with_base_url(base_url);
        ApiGateway::new(&settings, session).expect("client should build")
    }

    #[test]
    fn endpoint_normalizes_slashes() {
        let gateway = gateway("https://rea-view.example/");
        assert_eq!(
            gateway.endpoint("/auth/login"),
            "https://rea-view.example/auth/login"
        );
        assert_eq!(gateway.endpoint("feed"), "https://rea-view.example/feed");
    }

    #[test]
    fn error_detail_prefers_string_detail() {
        assert_eq!(
            error_detail(r#"{"detail":"unauthorized"}"#).as_deref(),
            Some("unauthorized")
        );
    }

    #[test]
    fn error_detail_renders_structured_detail_as_json() {
        let detail = error_detail(r#"{"detail":[{"loc":["body","email"],"msg":"field required"}]}"#)
            .expect("detail");
        assert!(detail.contains("field required"));
    }

    #[test]
    fn error_detail_is_none_for_non_json_or_missing_detail() {
        assert!(error_detail("<html>Bad Gateway</html>").is_none());
        assert!(error_detail(r#"{"error":"nope"}"#).is_none());
        assert!(error_detail(r#"{"detail":null}"#).is_none());
    }

    #[test]
    fn blank_detail_falls_back_to_status() {
        assert!(error_detail(r#"{"detail":""}"#).is_none());
        assert!(error_detail(r#"{"detail":"   "}"#).is_none());

        let detail = error_detail(r#"{"detail":""}"#);
        let err = BiblioClientError::remote(StatusCode::UNAUTHORIZED, detail);
        assert_eq!(err.to_string(), "HTTP 401");
    }

    #[test]
    fn empty_success_body_decodes_as_null() {
        decode_body::<()>(StatusCode::NO_CONTENT, "").expect("unit");
        let value: Value = decode_body(StatusCode::OK, "  ").expect("value");
        assert_eq!(value, Value::Null);
    }

    #[test]
    fn mismatched_success_body_is_a_decode_error() {
        let err = decode_body::<User>(StatusCode::OK, r#"{"id":"x"}"#).expect_err("must fail");
        assert!(matches!(err, BiblioClientError::Decode(_)));
    }

    #[tokio::test]
    async fn follow_requires_login_before_any_request() {
        // Порт 9 (discard): запрос сюда не должен уходить вовсе.
        let gateway = gateway("http://127.0.0.1:9");
        let err = gateway.follow(5).await.expect_err("must fail");
        assert!(matches!(err, BiblioClientError::NotAuthenticated));
    }

    #[tokio::test]
    async fn acting_endpoints_require_login_before_any_request() {
        let gateway = gateway("http://127.0.0.1:9");

        let errors = [
            gateway.like_review(1).await.expect_err("like review"),
            gateway.like_item(1).await.expect_err("like item"),
            gateway.add_comment(1, "hi").await.map(|_| ()).expect_err("comment"),
            gateway.delete_comment(1).await.map(|_| ()).expect_err("delete comment"),
            gateway
                .update_library(1, LibraryStatus::Read, LibraryAction::Add)
                .await
                .map(|_| ())
                .expect_err("library"),
        ];
        for err in errors {
            assert!(matches!(err, BiblioClientError::NotAuthenticated));
        }
    }

    #[test]
    fn method_display_matches_http_verbs() {
        assert_eq!(ApiMethod::Delete.to_string(), "DELETE");
        assert!(ApiMethod::Put.carries_body());
        assert!(!ApiMethod::Get.carries_body());
    }
}
