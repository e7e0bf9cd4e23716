//! Личная библиотека пользователя (прочитано, посмотрено, в планах) и его
//! собственные списки.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::lenient_datetime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Полка библиотеки. Книги: `read`/`toread`, фильмы: `watched`/`towatch`.
pub enum LibraryStatus {
    Read,
    ToRead,
    Watched,
    ToWatch,
}

impl LibraryStatus {
    /// Значение, которое понимает backend.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::ToRead => "toread",
            Self::Watched => "watched",
            Self::ToWatch => "towatch",
        }
    }

    /// Полка «готово» для полки «в планах»; готовые полки не меняются.
    pub fn completed(self) -> Self {
        match self {
            Self::ToRead => Self::Read,
            Self::ToWatch => Self::Watched,
            done => done,
        }
    }
}

impl fmt::Display for LibraryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LibraryStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "read" => Ok(Self::Read),
            "toread" => Ok(Self::ToRead),
            "watched" => Ok(Self::Watched),
            "towatch" => Ok(Self::ToWatch),
            other => Err(format!(
                "unknown library status `{other}` (expected read, toread, watched or towatch)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Добавить элемент на полку или снять с неё.
pub enum LibraryAction {
    Add,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
/// Элемент на полке библиотеки.
pub struct LibraryEntry {
    #[serde(default)]
    pub library_id: Option<i64>,
    pub item_id: i64,
    pub status: LibraryStatus,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub item_type: Option<String>,
    #[serde(default)]
    pub poster_url: Option<String>,
    #[serde(default, with = "lenient_datetime")]
    pub added_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
/// Ответ на `POST /items/{id}/library`.
pub struct LibraryChange {
    pub item_id: i64,
    pub status: LibraryStatus,
    #[serde(default)]
    pub action: Option<LibraryAction>,
    #[serde(default)]
    pub library_id: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct LibraryChangeDto {
    pub(crate) user_id: i64,
    pub(crate) status: LibraryStatus,
    pub(crate) action: LibraryAction,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LibraryPageDto {
    #[serde(default)]
    pub(crate) items: Vec<LibraryEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Кто видит список.
pub enum ListPrivacy {
    /// Только владелец.
    #[default]
    Private,
    /// Подписчики владельца.
    Followers,
    /// Все.
    Public,
}

impl ListPrivacy {
    fn level(self) -> u8 {
        match self {
            Self::Private => 0,
            Self::Followers => 1,
            Self::Public => 2,
        }
    }
}

impl FromStr for ListPrivacy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "private" | "0" => Ok(Self::Private),
            "followers" | "1" => Ok(Self::Followers),
            "public" | "2" => Ok(Self::Public),
            other => Err(format!(
                "unknown privacy `{other}` (expected private, followers or public)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// Тело `POST /items/custom-lists`.
pub struct NewCustomList {
    pub user_id: i64,
    pub name: String,
    pub description: String,
    /// 1 только для публичных списков.
    pub is_public: u8,
    /// 0 (личный), 1 (для подписчиков), 2 (публичный).
    pub privacy_level: u8,
}

impl NewCustomList {
    /// Список владельца `user_id`; имя и описание обрезаются по краям.
    pub fn new(user_id: i64, name: &str, description: &str, privacy: ListPrivacy) -> Self {
        Self {
            user_id,
            name: name.trim().to_string(),
            description: description.trim().to_string(),
            is_public: u8::from(privacy == ListPrivacy::Public),
            privacy_level: privacy.level(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
/// Собственный список пользователя.
pub struct CustomList {
    #[serde(alias = "list_id")]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Backend отдаёт флаг то числом, то булевым значением.
    #[serde(default, deserialize_with = "flag")]
    pub is_public: bool,
    #[serde(default)]
    pub item_count: u32,
    #[serde(default, with = "lenient_datetime")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, with = "lenient_datetime")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
/// Ответ на создание списка.
pub struct CreatedList {
    #[serde(alias = "list_id")]
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CustomListPageDto {
    #[serde(default)]
    pub(crate) lists: Vec<CustomList>,
}

fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Int(i64),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Bool(value)) => value,
        Some(Raw::Int(value)) => value != 0,
        None => false,
    })
}
