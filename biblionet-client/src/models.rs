use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Публичная модель пользователя (кешированная копия серверной записи).
pub struct User {
    /// Идентификатор пользователя. Сервер также называет его `user_id`.
    #[serde(alias = "user_id")]
    pub id: i64,
    /// Логин.
    pub username: String,
    /// Email.
    pub email: String,
    /// Короткое описание профиля.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    /// Ссылка на аватар.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Дата и время регистрации (UTC).
    #[serde(default, with = "lenient_datetime")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// Частичное обновление профиля. Заданные поля перекрывают кешированные.
pub struct UserPatch {
    /// Новый логин.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Новый email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Новое описание профиля.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    /// Новая ссылка на аватар.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl UserPatch {
    /// Накладывает патч на пользователя (поверхностное слияние).
    pub fn apply_to(&self, user: &mut User) {
        if let Some(username) = &self.username {
            user.username = username.clone();
        }
        if let Some(email) = &self.email {
            user.email = email.clone();
        }
        if let Some(bio) = &self.bio {
            user.bio = Some(bio.clone());
        }
        if let Some(avatar_url) = &self.avatar_url {
            user.avatar_url = Some(avatar_url.clone());
        }
    }

    /// `true`, если патч ничего не меняет.
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.email.is_none()
            && self.bio.is_none()
            && self.avatar_url.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Ответ после успешной регистрации или входа.
pub struct AuthResponse {
    /// Bearer-токен.
    #[serde(alias = "access_token")]
    pub token: String,
    /// Данные пользователя.
    pub user: User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Фильм или книга из каталога.
pub struct Item {
    /// Идентификатор. Сервер также называет его `item_id`.
    #[serde(alias = "item_id")]
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// `book` или `movie`.
    #[serde(default)]
    pub item_type: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub poster_url: Option<String>,
    #[serde(default)]
    pub genres: Option<String>,
    #[serde(default)]
    pub authors: Option<String>,
    #[serde(default)]
    pub director: Option<String>,
    #[serde(default)]
    pub actors: Option<String>,
    /// Рейтинг из внешнего каталога (0-10).
    #[serde(default)]
    pub external_rating: Option<i32>,
    /// Средняя оценка пользователей BiblioNet.
    #[serde(default)]
    pub user_rating: Option<f64>,
    #[serde(default, with = "lenient_datetime")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
/// Изменения карточки каталога для `PUT /items/{id}`.
pub struct ItemUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poster_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genres: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Рецензия пользователя на элемент каталога.
pub struct Review {
    /// Идентификатор. Сервер также называет его `review_id`.
    #[serde(alias = "review_id")]
    pub id: i64,
    pub user_id: i64,
    #[serde(default)]
    pub item_id: Option<i64>,
    pub review_text: String,
    /// Оценка 0-10.
    #[serde(default)]
    pub rating: Option<i32>,
    #[serde(default, with = "lenient_datetime")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// Тело `POST /reviews`.
pub struct NewReview {
    pub user_id: i64,
    pub item_id: i64,
    pub review_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Что сделал переключатель лайка.
pub enum LikeAction {
    Liked,
    Unliked,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
/// Ответ на `POST /likes/{review|item}/{id}/like`.
///
/// Повторный лайк снимает первый, поэтому `action` говорит, что получилось.
pub struct LikeToggle {
    pub action: LikeAction,
    #[serde(default)]
    pub like_id: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

impl LikeToggle {
    /// `true`, если лайк теперь стоит.
    pub fn is_liked(&self) -> bool {
        self.action == LikeAction::Liked
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
/// Кто лайкнул рецензию.
pub struct Liker {
    #[serde(default)]
    pub like_id: Option<i64>,
    pub user_id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, with = "lenient_datetime")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
/// Число лайков рецензии или элемента; для рецензии ещё и список лайкнувших.
pub struct LikeSummary {
    pub total_likes: u32,
    #[serde(default)]
    pub likes: Vec<Liker>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
/// Комментарий к рецензии.
pub struct Comment {
    #[serde(alias = "comment_id")]
    pub id: i64,
    #[serde(default)]
    pub review_id: Option<i64>,
    pub user_id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub comment_text: String,
    #[serde(default, with = "lenient_datetime")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
/// Счётчики подписок пользователя.
pub struct FollowStats {
    pub user_id: i64,
    pub following_count: u32,
    pub followers_count: u32,
}

/// Сервер отдаёт время то в RFC 3339, то без часового пояса.
/// Второе трактуется как UTC.
pub(crate) mod lenient_datetime {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

    pub(crate) fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
            .map(|naive| naive.and_utc())
    }

    pub(crate) fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(value) => serializer.serialize_str(&value.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(raw) => parse(&raw)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}"))),
        }
    }
}
