//! Проверка форм до отправки запроса.

use validator::Validate;

use crate::library::ListPrivacy;

#[derive(Debug, Clone, Validate)]
/// Форма входа.
pub struct LoginForm {
    #[validate(email(message = "enter a valid email address"))]
    pub email: String,
    #[validate(length(min = 6, message = "password must be at least 6 characters"))]
    pub password: String,
}

#[derive(Debug, Clone, Validate)]
/// Форма регистрации.
pub struct RegisterForm {
    #[validate(length(min = 3, message = "username must be at least 3 characters"))]
    pub username: String,
    #[validate(email(message = "enter a valid email address"))]
    pub email: String,
    #[validate(length(min = 6, message = "password must be at least 6 characters"))]
    pub password: String,
}

#[derive(Debug, Clone, Validate)]
/// Форма рецензии.
pub struct ReviewForm {
    pub item_id: i64,
    #[validate(length(min = 1, max = 2000, message = "review must be 1-2000 characters"))]
    pub review_text: String,
    #[validate(range(min = 0, max = 10, message = "rating must be between 0 and 10"))]
    pub rating: Option<i32>,
}

#[derive(Debug, Clone, Validate)]
/// Запрос ссылки для сброса пароля.
pub struct ForgotPasswordForm {
    #[validate(email(message = "enter a valid email address"))]
    pub email: String,
}

#[derive(Debug, Clone, Validate)]
/// Новый пароль по коду из письма.
pub struct PasswordResetForm {
    #[validate(email(message = "enter a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "reset token is required"))]
    pub token: String,
    #[validate(length(min = 6, message = "password must be at least 6 characters"))]
    pub new_password: String,
    #[validate(must_match(other = "new_password", message = "passwords do not match"))]
    pub confirm_password: String,
}

#[derive(Debug, Clone, Validate)]
/// Смена пароля вошедшим пользователем.
pub struct PasswordChangeForm {
    #[validate(length(min = 1, message = "current password is required"))]
    pub current_password: String,
    #[validate(length(min = 6, message = "new password must be at least 6 characters"))]
    pub new_password: String,
    #[validate(must_match(other = "new_password", message = "passwords do not match"))]
    pub confirm_password: String,
}

#[derive(Debug, Clone, Validate)]
/// Комментарий к рецензии.
pub struct CommentForm {
    pub review_id: i64,
    #[validate(length(min = 1, max = 1000, message = "comment must be 1-1000 characters"))]
    pub comment_text: String,
}

#[derive(Debug, Clone, Validate)]
/// Новый собственный список.
pub struct CustomListForm {
    #[validate(length(min = 1, max = 100, message = "list name must be 1-100 characters"))]
    pub name: String,
    #[validate(length(max = 500, message = "description must be at most 500 characters"))]
    pub description: String,
    pub privacy: ListPrivacy,
}

impl LoginForm {
    pub fn new(email: &str, password: &str) -> Self {
        Self {
            email: email.trim().to_string(),
            password: password.to_string(),
        }
    }
}

impl RegisterForm {
    pub fn new(username: &str, email: &str, password: &str) -> Self {
        Self {
            username: username.trim().to_string(),
            email: email.trim().to_string(),
            password: password.to_string(),
        }
    }
}

impl ReviewForm {
    pub fn new(item_id: i64, review_text: &str, rating: Option<i32>) -> Self {
        Self {
            item_id,
            review_text: review_text.trim().to_string(),
            rating,
        }
    }
}

impl ForgotPasswordForm {
    pub fn new(email: &str) -> Self {
        Self {
            email: email.trim().to_string(),
        }
    }
}

impl PasswordResetForm {
    pub fn new(email: &str, token: &str, new_password: &str, confirm_password: &str) -> Self {
        Self {
            email: email.trim().to_string(),
            token: token.trim().to_string(),
            new_password: new_password.to_string(),
            confirm_password: confirm_password.to_string(),
        }
    }
}

impl PasswordChangeForm {
    pub fn new(current_password: &str, new_password: &str, confirm_password: &str) -> Self {
        Self {
            current_password: current_password.to_string(),
            new_password: new_password.to_string(),
            confirm_password: confirm_password.to_string(),
        }
    }
}

impl CommentForm {
    pub fn new(review_id: i64, comment_text: &str) -> Self {
        Self {
            review_id,
            comment_text: comment_text.trim().to_string(),
        }
    }
}

impl CustomListForm {
    pub fn new(name: &str, description: &str, privacy: ListPrivacy) -> Self {
        Self {
            name: name.trim().to_string(),
            description: description.trim().to_string(),
            privacy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_form_accepts_valid_input() {
        assert!(LoginForm::new(" ada@example.com ", "secret1").validate().is_ok());
    }

    #[test]
    fn login_form_reports_each_bad_field() {
        let errors = LoginForm::new("not-an-email", "123")
            .validate()
            .expect_err("must fail");
        let fields = errors.field_errors();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
    }

    #[test]
    fn register_form_trims_username_before_length_check() {
        let errors = RegisterForm::new("  ab  ", "ab@example.com", "secret1")
            .validate()
            .expect_err("must fail");
        assert!(errors.field_errors().contains_key("username"));
    }

    #[test]
    fn review_form_bounds() {
        assert!(ReviewForm::new(1, "fine", Some(10)).validate().is_ok());
        assert!(ReviewForm::new(1, "fine", None).validate().is_ok());
        assert!(ReviewForm::new(1, "   ", Some(5)).validate().is_err());
        assert!(ReviewForm::new(1, "fine", Some(11)).validate().is_err());
        assert!(ReviewForm::new(1, &"x".repeat(2001), None).validate().is_err());
    }

    #[test]
    fn password_forms_require_matching_confirmation() {
        assert!(PasswordChangeForm::new("old-pass", "new-pass1", "new-pass1").validate().is_ok());

        let errors = PasswordChangeForm::new("old-pass", "new-pass1", "new-pass2")
            .validate()
            .expect_err("must fail");
        assert!(errors.field_errors().contains_key("confirm_password"));

        let errors = PasswordResetForm::new("ada@example.com", " ", "short", "short")
            .validate()
            .expect_err("must fail");
        let fields = errors.field_errors();
        assert!(fields.contains_key("token"));
        assert!(fields.contains_key("new_password"));
    }

    #[test]
    fn forgot_password_needs_an_email() {
        assert!(ForgotPasswordForm::new(" ada@example.com ").validate().is_ok());
        assert!(ForgotPasswordForm::new("ada").validate().is_err());
    }

    #[test]
    fn comment_and_list_forms_reject_blank_text() {
        assert!(CommentForm::new(1, "  ").validate().is_err());
        assert!(CommentForm::new(1, "agreed").validate().is_ok());
        assert!(CustomListForm::new(" ", "", ListPrivacy::Public).validate().is_err());
        assert!(CustomListForm::new("Favs", "", ListPrivacy::Private).validate().is_ok());
    }
}
