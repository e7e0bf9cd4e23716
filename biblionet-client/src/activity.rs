//! Записи ленты активности.
//!
//! Сервер присылает одну плоскую запись с набором необязательных полей,
//! смысл которых зависит от `activity_type`. Здесь она раскладывается в
//! [`ActivityKind`], где у каждого варианта только свои поля. Неизвестные
//! типы не ломают разбор и попадают в [`ActivityKind::Other`].

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::models::lenient_datetime;

const EXCERPT_LIMIT: usize = 150;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "ActivityDto")]
/// Одно событие ленты.
pub struct Activity {
    /// Идентификатор события (0, если сервер его не прислал).
    pub id: i64,
    /// Автор события.
    pub user_id: Option<i64>,
    /// Логин автора.
    pub username: Option<String>,
    /// Время события (UTC).
    pub created_at: Option<DateTime<Utc>>,
    /// Тип события с его полезной нагрузкой.
    pub kind: ActivityKind,
}

#[derive(Debug, Clone, PartialEq)]
/// Тип события ленты.
pub enum ActivityKind {
    /// Пользователь поставил оценку.
    Rating {
        /// Оценённый элемент.
        item: ItemRef,
        /// Оценка.
        score: Option<f64>,
    },
    /// Пользователь написал рецензию.
    Review {
        /// Рецензируемый элемент.
        item: ItemRef,
        /// Рецензия.
        review: ReviewRef,
        /// Оценка в рецензии.
        score: Option<f64>,
        /// Лайки и комментарии рецензии.
        engagement: Engagement,
    },
    /// Пользователь лайкнул чужую рецензию.
    LikeReview {
        /// Рецензия.
        review: ReviewRef,
        /// Лайки и комментарии рецензии.
        engagement: Engagement,
    },
    /// Пользователь лайкнул элемент каталога.
    LikeItem {
        /// Элемент.
        item: ItemRef,
        /// Лайки элемента.
        engagement: Engagement,
    },
    /// Пользователь на кого-то подписался.
    Follow {
        /// На кого подписались.
        target_user_id: Option<i64>,
        /// Логин того, на кого подписались.
        target_username: Option<String>,
    },
    /// Пользователь прокомментировал рецензию.
    CommentReview {
        /// Комментируемая рецензия.
        review: ReviewRef,
        /// Текст комментария.
        comment: Option<String>,
    },
    /// Пользователь добавил элемент в список.
    ListAdd {
        /// Добавленный элемент.
        item: ItemRef,
        /// Название списка.
        list_name: Option<String>,
    },
    /// Тип, которого клиент не знает.
    Other {
        /// Исходное значение `activity_type`.
        activity_type: String,
        /// Элемент, если сервер его указал.
        item: ItemRef,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
/// Ссылка на элемент каталога внутри события.
pub struct ItemRef {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub item_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
/// Ссылка на рецензию внутри события.
pub struct ReviewRef {
    pub id: Option<i64>,
    /// Автор рецензии.
    pub owner_username: Option<String>,
    /// Текст рецензии (полный, как прислал сервер).
    pub text: Option<String>,
    /// Элемент, к которому относится рецензия.
    pub item: ItemRef,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// Счётчики реакций и отметка «лайкнуто мной».
pub struct Engagement {
    pub like_count: u32,
    pub comment_count: u32,
    pub liked_by_me: bool,
}

impl Activity {
    /// Строковый тип события в терминах сервера.
    pub fn activity_type(&self) -> &str {
        self.kind.activity_type()
    }

    /// Имя автора для отображения: логин или `User #<id>`.
    pub fn actor_label(&self) -> String {
        match (&self.username, self.user_id) {
            (Some(username), _) if !username.trim().is_empty() => username.clone(),
            (_, Some(id)) => format!("User #{id}"),
            _ => "Someone".to_string(),
        }
    }

    /// Однострочное описание события: `<автор> <действие>[ - <название>]`.
    pub fn summary(&self) -> String {
        let mut line = format!("{} {}", self.actor_label(), self.kind.action_text());
        if let Some(title) = self.kind.item().and_then(|item| item.title.as_deref()) {
            if !title.trim().is_empty() {
                line.push_str(" - ");
                line.push_str(title);
            }
        }
        line
    }
}

impl ActivityKind {
    /// Строковый тип события в терминах сервера.
    pub fn activity_type(&self) -> &str {
        match self {
            Self::Rating { .. } => "rating",
            Self::Review { .. } => "review",
            Self::LikeReview { .. } => "like_review",
            Self::LikeItem { .. } => "like_item",
            Self::Follow { .. } => "follow",
            Self::CommentReview { .. } => "comment_review",
            Self::ListAdd { .. } => "list_add",
            Self::Other { activity_type, .. } => activity_type,
        }
    }

    /// Глагольная часть описания; для неизвестных типов общий вариант.
    pub fn action_text(&self) -> String {
        match self {
            Self::Rating { score: Some(score), .. } => format!("rated {score}/10"),
            Self::Rating { .. } => "rated".to_string(),
            Self::Review { .. } => "reviewed".to_string(),
            Self::LikeReview { review, .. } => match &review.owner_username {
                Some(owner) => format!("liked {owner}'s review"),
                None => "liked a review".to_string(),
            },
            Self::LikeItem { .. } => "liked".to_string(),
            Self::Follow {
                target_username: Some(target),
                ..
            } => format!("started following {target}"),
            Self::Follow { .. } => "started following someone".to_string(),
            Self::CommentReview { review, .. } => match &review.owner_username {
                Some(owner) => format!("commented on {owner}'s review"),
                None => "commented on a review".to_string(),
            },
            Self::ListAdd {
                list_name: Some(list),
                ..
            } => format!("added to {list}"),
            Self::ListAdd { .. } => "added to a list".to_string(),
            Self::Other { .. } => "did something".to_string(),
        }
    }

    /// Элемент каталога, к которому относится событие.
    pub fn item(&self) -> Option<&ItemRef> {
        match self {
            Self::Rating { item, .. }
            | Self::Review { item, .. }
            | Self::LikeItem { item, .. }
            | Self::ListAdd { item, .. }
            | Self::Other { item, .. } => Some(item),
            Self::LikeReview { review, .. } | Self::CommentReview { review, .. } => {
                Some(&review.item)
            }
            Self::Follow { .. } => None,
        }
    }
}

impl ReviewRef {
    /// Текст рецензии, обрезанный до 150 символов с многоточием.
    pub fn excerpt(&self) -> Option<String> {
        self.text.as_deref().map(|text| truncate(text, EXCERPT_LIMIT))
    }
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(limit).collect();
    cut.push_str("...");
    cut
}

#[derive(Debug, Deserialize)]
struct ActivityDto {
    #[serde(default, alias = "id")]
    activity_id: Option<i64>,
    #[serde(default)]
    activity_type: String,
    #[serde(default)]
    user_id: Option<i64>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default, with = "lenient_datetime")]
    created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    item_id: Option<i64>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    item_type: Option<String>,

    #[serde(default)]
    review_id: Option<i64>,
    #[serde(default)]
    review_text: Option<String>,
    #[serde(default)]
    referenced_review_text: Option<String>,
    #[serde(default)]
    review_owner_username: Option<String>,
    #[serde(default)]
    comment_text: Option<String>,

    #[serde(default, alias = "score")]
    rating: Option<f64>,

    #[serde(default)]
    like_count: Option<u32>,
    #[serde(default)]
    comment_count: Option<u32>,
    #[serde(default, alias = "liked_by_user", alias = "is_liked")]
    liked_by_me: Option<bool>,

    #[serde(default, alias = "followee_id")]
    target_user_id: Option<i64>,
    #[serde(default, alias = "followee_username")]
    target_username: Option<String>,

    #[serde(default)]
    list_name: Option<String>,
}

impl From<ActivityDto> for Activity {
    fn from(value: ActivityDto) -> Self {
        let item = ItemRef {
            id: value.item_id,
            title: value.title,
            item_type: value.item_type,
        };
        let engagement = Engagement {
            like_count: value.like_count.unwrap_or(0),
            comment_count: value.comment_count.unwrap_or(0),
            liked_by_me: value.liked_by_me.unwrap_or(false),
        };
        let review = |item: ItemRef, text: Option<String>| ReviewRef {
            id: value.review_id,
            owner_username: value.review_owner_username.clone(),
            text,
            item,
        };

        let kind = match value.activity_type.as_str() {
            "rating" | "rated" => ActivityKind::Rating {
                item,
                score: value.rating,
            },
            "review" => ActivityKind::Review {
                review: review(item.clone(), value.review_text.clone()),
                item,
                score: value.rating,
                engagement,
            },
            "like_review" => ActivityKind::LikeReview {
                review: review(
                    item,
                    value.review_text.clone().or(value.referenced_review_text.clone()),
                ),
                engagement,
            },
            "like_item" => ActivityKind::LikeItem { item, engagement },
            "follow" => ActivityKind::Follow {
                target_user_id: value.target_user_id,
                target_username: value.target_username.clone(),
            },
            "comment_review" => ActivityKind::CommentReview {
                review: review(
                    item,
                    value.referenced_review_text.clone().or(value.review_text.clone()),
                ),
                comment: value.comment_text.clone(),
            },
            "list_add" | "added_to_list" => ActivityKind::ListAdd {
                item,
                list_name: value.list_name.clone(),
            },
            other => ActivityKind::Other {
                activity_type: other.to_string(),
                item,
            },
        };

        Self {
            id: value.activity_id.unwrap_or(0),
            user_id: value.user_id,
            username: value.username,
            created_at: value.created_at,
            kind,
        }
    }
}
