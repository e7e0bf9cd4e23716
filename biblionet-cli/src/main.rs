use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use biblionet_client::{
    Activity, ActivityKind, AuthResponse, BiblioClient, BiblioClientError, ClientSettings,
    Comment, CommentForm, CustomList, CustomListForm, FileStorage, ForgotPasswordForm, Item,
    LibraryAction, LibraryEntry, LibraryStatus, ListPrivacy, LoadOutcome, LoginForm,
    PasswordChangeForm, PasswordResetForm, RegisterForm, Review, ReviewForm, User, UserPatch,
};
use clap::{Parser, Subcommand};
use tracing::debug;

mod logging;

const DEFAULT_STATE_DIR: &str = ".biblionet";

#[derive(Debug, Parser)]
#[command(name = "biblionet-cli", version, about = "CLI client for the BiblioNet backend")]
struct Cli {
    /// Backend address (overrides BIBLIONET_API_URL).
    #[arg(long, global = true)]
    server: Option<String>,

    /// Directory holding the saved session (overrides BIBLIONET_STATE_DIR).
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create an account and log in.
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Log in.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Forget the saved session.
    Logout,
    /// Show the logged-in user.
    Whoami {
        /// Re-fetch the user from the backend instead of the saved copy.
        #[arg(long)]
        remote: bool,
    },
    /// Show the activity feed page by page.
    Feed {
        /// Whose feed (defaults to the logged-in user).
        #[arg(long)]
        user_id: Option<i64>,
        /// How many pages to load at most.
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        pages: u32,
    },
    /// Show a user's own activities.
    Activities {
        #[arg(long)]
        user_id: i64,
    },
    /// Follow a user (requires login).
    Follow {
        #[arg(long)]
        id: i64,
    },
    /// Unfollow a user (requires login).
    Unfollow {
        #[arg(long)]
        id: i64,
    },
    /// List whom a user follows.
    Following {
        #[arg(long)]
        user_id: i64,
    },
    /// List a user's followers.
    Followers {
        #[arg(long)]
        user_id: i64,
    },
    /// Show a catalogue item.
    Item {
        #[arg(long)]
        id: i64,
    },
    /// Search the catalogue.
    Search {
        #[arg(long)]
        query: String,
        /// `book` or `movie`.
        #[arg(long)]
        item_type: Option<String>,
    },
    /// List reviews of an item.
    Reviews {
        #[arg(long)]
        item_id: i64,
    },
    /// Post a review (requires login).
    Review {
        #[arg(long)]
        item_id: i64,
        #[arg(long)]
        text: String,
        /// 0-10.
        #[arg(long)]
        rating: Option<i32>,
    },
    /// Delete a review (requires login).
    DeleteReview {
        #[arg(long)]
        id: i64,
    },
    /// Edit the logged-in user's profile.
    Profile {
        #[arg(long)]
        bio: Option<String>,
        #[arg(long)]
        avatar_url: Option<String>,
    },
    /// List a user's reviews (defaults to the logged-in user).
    UserReviews {
        #[arg(long)]
        user_id: Option<i64>,
    },
    /// Show follower/following counts (defaults to the logged-in user).
    FollowStats {
        #[arg(long)]
        user_id: Option<i64>,
        /// Also tell whether the user follows this one.
        #[arg(long)]
        target: Option<i64>,
    },
    /// Like a review, or take the like back (requires login).
    LikeReview {
        #[arg(long)]
        id: i64,
    },
    /// Like a catalogue item, or take the like back (requires login).
    LikeItem {
        #[arg(long)]
        id: i64,
    },
    /// List comments on a review.
    Comments {
        #[arg(long)]
        review_id: i64,
    },
    /// Comment on a review (requires login).
    Comment {
        #[arg(long)]
        review_id: i64,
        #[arg(long)]
        text: String,
    },
    /// Delete your comment (requires login).
    DeleteComment {
        #[arg(long)]
        id: i64,
    },
    /// Show a user's library (defaults to the logged-in user).
    Library {
        #[arg(long)]
        user_id: Option<i64>,
        /// Only one shelf: read, toread, watched or towatch.
        #[arg(long)]
        status: Option<LibraryStatus>,
    },
    /// Put an item on a library shelf or take it off (requires login).
    Shelve {
        #[arg(long)]
        item_id: i64,
        /// read, toread, watched or towatch.
        #[arg(long)]
        status: LibraryStatus,
        #[arg(long)]
        remove: bool,
    },
    /// Move an item from a "to read"/"to watch" shelf to done (requires login).
    Complete {
        #[arg(long)]
        item_id: i64,
        /// The shelf the item is on now.
        #[arg(long)]
        status: LibraryStatus,
    },
    /// Add an item to favorites (requires login).
    Favorite {
        #[arg(long)]
        item_id: i64,
    },
    /// Show a user's own lists (defaults to the logged-in user).
    Lists {
        #[arg(long)]
        user_id: Option<i64>,
    },
    /// Create a list (requires login).
    CreateList {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        /// private, followers or public.
        #[arg(long, default_value = "private")]
        privacy: ListPrivacy,
    },
    /// Delete a list.
    DeleteList {
        #[arg(long)]
        id: i64,
    },
    /// Change the logged-in user's password.
    ChangePassword {
        #[arg(long)]
        current: String,
        #[arg(long)]
        new: String,
        #[arg(long)]
        confirm: String,
    },
    /// Ask for a password reset email.
    ForgotPassword {
        #[arg(long)]
        email: String,
    },
    /// Set a new password with the code from the reset email.
    ResetPassword {
        #[arg(long)]
        email: String,
        #[arg(long)]
        token: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        confirm: String,
    },
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {err:#}");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "warn".to_string());
    logging::init_logging(&log_level)?;

    let mut settings = ClientSettings::from_env().context("invalid client settings")?;
    if let Some(server) = cli.server {
        settings = settings.with_base_url(normalize_server(server));
    }
    let storage = Arc::new(FileStorage::new(resolve_state_dir(cli.state_dir)));
    let state_dir = storage.dir().to_path_buf();
    let client = BiblioClient::new(settings, storage).context("failed to build HTTP client")?;
    debug!(
        state_dir = %state_dir.display(),
        api = client.gateway().base_url(),
        "starting"
    );

    match cli.command {
        Command::Register {
            username,
            email,
            password,
        } => {
            let auth = client
                .register(RegisterForm::new(&username, &email, &password))
                .await
                .map_err(map_credentials_error)?;
            print_auth("Registered", &auth);
        }
        Command::Login { email, password } => {
            let auth = client
                .login(LoginForm::new(&email, &password))
                .await
                .map_err(map_credentials_error)?;
            print_auth("Logged in", &auth);
        }
        Command::Logout => {
            client.logout();
            println!("Logged out");
        }
        Command::Whoami { remote } => {
            let user = if remote {
                Some(
                    client
                        .refresh_current_user()
                        .await
                        .map_err(map_client_error)?,
                )
            } else {
                client.session().current_user()
            };
            match user {
                Some(user) => print_user(&user),
                None => println!("Not logged in"),
            }
        }
        Command::Feed { user_id, pages } => {
            let pager = match user_id {
                Some(user_id) => client.feed_pager(user_id),
                None => client.my_feed_pager().map_err(map_client_error)?,
            };
            let mut outcome = pager.load_first().await.map_err(map_client_error)?;
            for _ in 1..pages {
                if !matches!(outcome, LoadOutcome::Loaded { has_more: true, .. }) {
                    break;
                }
                outcome = pager.load_more().await.map_err(map_client_error)?;
            }
            print_activities(&pager.items());
            if pager.has_more() {
                println!("(more available, next offset {})", pager.offset());
            }
        }
        Command::Activities { user_id } => {
            let activities = client
                .gateway()
                .user_activities(user_id)
                .await
                .map_err(map_client_error)?;
            print_activities(&activities);
        }
        Command::Follow { id } => {
            client.follow(id).await.map_err(map_client_error)?;
            println!("Following user {id}");
        }
        Command::Unfollow { id } => {
            client.unfollow(id).await.map_err(map_client_error)?;
            println!("Unfollowed user {id}");
        }
        Command::Following { user_id } => {
            let users = client
                .gateway()
                .following(user_id)
                .await
                .map_err(map_client_error)?;
            print_users(&users);
        }
        Command::Followers { user_id } => {
            let users = client
                .gateway()
                .followers(user_id)
                .await
                .map_err(map_client_error)?;
            print_users(&users);
        }
        Command::Item { id } => {
            let item = client.gateway().get_item(id).await.map_err(map_client_error)?;
            print_item(&item);
        }
        Command::Search { query, item_type } => {
            let items = client
                .gateway()
                .search_items(&query, item_type.as_deref())
                .await
                .map_err(map_client_error)?;
            println!("Found: {}", items.len());
            for item in &items {
                println!("- [{}] {}", item.id, item.title);
            }
        }
        Command::Reviews { item_id } => {
            let reviews = client
                .gateway()
                .reviews_for_item(item_id)
                .await
                .map_err(map_client_error)?;
            print_reviews(&reviews);
        }
        Command::Review {
            item_id,
            text,
            rating,
        } => {
            let review = client
                .post_review(ReviewForm::new(item_id, &text, rating))
                .await
                .map_err(map_client_error)?;
            println!("Review posted: id={}", review.id);
        }
        Command::DeleteReview { id } => {
            if !client.session().is_logged_in() {
                return Err(map_client_error(BiblioClientError::NotAuthenticated));
            }
            client
                .gateway()
                .delete_review(id)
                .await
                .map_err(map_client_error)?;
            println!("Review deleted: id={id}");
        }
        Command::Profile { bio, avatar_url } => {
            let patch = UserPatch {
                bio,
                avatar_url,
                ..UserPatch::default()
            };
            if patch.is_empty() {
                anyhow::bail!("nothing to update: pass --bio and/or --avatar-url");
            }
            let user = client
                .update_profile(&patch)
                .await
                .map_err(map_client_error)?;
            print_user(&user);
        }
        Command::UserReviews { user_id } => {
            let user_id = resolve_user_id(&client, user_id)?;
            let reviews = client
                .gateway()
                .user_reviews(user_id)
                .await
                .map_err(map_client_error)?;
            print_reviews(&reviews);
        }
        Command::FollowStats { user_id, target } => {
            let user_id = resolve_user_id(&client, user_id)?;
            let stats = client
                .gateway()
                .follow_stats(user_id)
                .await
                .map_err(map_client_error)?;
            println!(
                "user {}: following {}, followers {}",
                stats.user_id, stats.following_count, stats.followers_count
            );
            if let Some(target) = target {
                let follows = client
                    .gateway()
                    .is_following(user_id, target)
                    .await
                    .map_err(map_client_error)?;
                let verb = if follows { "follows" } else { "does not follow" };
                println!("user {user_id} {verb} user {target}");
            }
        }
        Command::LikeReview { id } => {
            let toggle = client
                .gateway()
                .like_review(id)
                .await
                .map_err(map_client_error)?;
            let state = if toggle.is_liked() { "Liked" } else { "Unliked" };
            println!("{state} review {id}");
        }
        Command::LikeItem { id } => {
            let toggle = client
                .gateway()
                .like_item(id)
                .await
                .map_err(map_client_error)?;
            let state = if toggle.is_liked() { "Liked" } else { "Unliked" };
            let likes = client
                .gateway()
                .item_likes(id)
                .await
                .map_err(map_client_error)?;
            println!("{state} item {id} ({} likes)", likes.total_likes);
        }
        Command::Comments { review_id } => {
            let comments = client
                .gateway()
                .review_comments(review_id)
                .await
                .map_err(map_client_error)?;
            print_comments(&comments);
        }
        Command::Comment { review_id, text } => {
            let comment = client
                .comment_on_review(CommentForm::new(review_id, &text))
                .await
                .map_err(map_client_error)?;
            println!("Comment posted: id={}", comment.id);
        }
        Command::DeleteComment { id } => {
            client
                .gateway()
                .delete_comment(id)
                .await
                .map_err(map_client_error)?;
            println!("Comment deleted: id={id}");
        }
        Command::Library { user_id, status } => {
            let user_id = resolve_user_id(&client, user_id)?;
            let entries = client
                .gateway()
                .library(user_id, status)
                .await
                .map_err(map_client_error)?;
            print_library(&entries);
        }
        Command::Shelve {
            item_id,
            status,
            remove,
        } => {
            let action = if remove {
                LibraryAction::Remove
            } else {
                LibraryAction::Add
            };
            let change = client
                .gateway()
                .update_library(item_id, status, action)
                .await
                .map_err(map_client_error)?;
            let verb = if remove { "removed from" } else { "on" };
            println!("Item {} {verb} shelf {}", change.item_id, change.status);
        }
        Command::Complete { item_id, status } => {
            let change = client
                .mark_completed(item_id, status)
                .await
                .map_err(map_client_error)?;
            println!("Item {} moved to {}", change.item_id, change.status);
        }
        Command::Favorite { item_id } => {
            client
                .gateway()
                .favorite_item(item_id)
                .await
                .map_err(map_client_error)?;
            println!("Item {item_id} added to favorites");
        }
        Command::Lists { user_id } => {
            let user_id = resolve_user_id(&client, user_id)?;
            let lists = client
                .gateway()
                .custom_lists(user_id)
                .await
                .map_err(map_client_error)?;
            print_lists(&lists);
        }
        Command::CreateList {
            name,
            description,
            privacy,
        } => {
            let created = client
                .create_custom_list(CustomListForm::new(&name, &description, privacy))
                .await
                .map_err(map_client_error)?;
            println!("List created: [{}] {}", created.id, created.name);
        }
        Command::DeleteList { id } => {
            client
                .gateway()
                .delete_custom_list(id)
                .await
                .map_err(map_client_error)?;
            println!("List deleted: id={id}");
        }
        Command::ChangePassword {
            current,
            new,
            confirm,
        } => {
            client
                .change_password(PasswordChangeForm::new(&current, &new, &confirm))
                .await
                .map_err(map_credentials_error)?;
            println!("Password changed");
        }
        Command::ForgotPassword { email } => {
            client
                .forgot_password(ForgotPasswordForm::new(&email))
                .await
                .map_err(map_credentials_error)?;
            println!("If the account exists, a reset link is on its way to {email}");
        }
        Command::ResetPassword {
            email,
            token,
            password,
            confirm,
        } => {
            client
                .reset_password(PasswordResetForm::new(&email, &token, &password, &confirm))
                .await
                .map_err(map_credentials_error)?;
            println!("Password updated, log in with the new one");
        }
    }

    Ok(())
}

fn normalize_server(server: String) -> String {
    if server.starts_with("http://") || server.starts_with("https://") {
        return server;
    }

    format!("http://{server}")
}

fn resolve_state_dir(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| {
        std::env::var("BIBLIONET_STATE_DIR")
            .ok()
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .map(PathBuf::from)
    })
    .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR))
}

fn resolve_user_id(client: &BiblioClient, flag: Option<i64>) -> Result<i64> {
    match flag {
        Some(user_id) => Ok(user_id),
        None => client
            .session()
            .current_user_id()
            .ok_or_else(|| map_client_error(BiblioClientError::NotAuthenticated)),
    }
}

/// Ошибка команды, которой нужна действующая сессия.
fn map_client_error(err: BiblioClientError) -> anyhow::Error {
    describe_client_error(err, true)
}

/// Ошибка входа, регистрации и сброса пароля: 401 здесь значит неверные
/// данные, а не протухшую сессию.
fn map_credentials_error(err: BiblioClientError) -> anyhow::Error {
    describe_client_error(err, false)
}

fn describe_client_error(err: BiblioClientError, session_hint: bool) -> anyhow::Error {
    let relogin = session_hint && err.is_unauthorized();
    let message = match err {
        BiblioClientError::NotAuthenticated => {
            "login required: run `biblionet-cli login ...` or `biblionet-cli register ...`"
                .to_string()
        }
        BiblioClientError::Validation(errors) => format!("invalid input: {errors}"),
        BiblioClientError::Remote { status, message } if relogin => {
            format!("server error ({status}): {message}; log in again")
        }
        BiblioClientError::Remote { status, message } => {
            format!("server error ({status}): {message}")
        }
        BiblioClientError::Transport(err) => format!("cannot reach the server: {err}"),
        BiblioClientError::Decode(message) => format!("unexpected server response: {message}"),
        BiblioClientError::Serialization(err) => format!("cannot encode request: {err}"),
    };
    anyhow::anyhow!(message)
}

fn print_auth(title: &str, auth: &AuthResponse) {
    println!("{title}");
    println!("token: {}", auth.token);
    print_user(&auth.user);
}

fn print_user(user: &User) {
    println!("user:");
    println!("  id: {}", user.id);
    println!("  username: {}", user.username);
    println!("  email: {}", user.email);
    if let Some(bio) = &user.bio {
        println!("  bio: {bio}");
    }
    if let Some(avatar_url) = &user.avatar_url {
        println!("  avatar_url: {avatar_url}");
    }
    if let Some(created_at) = user.created_at {
        println!("  created_at: {created_at}");
    }
}

fn print_users(users: &[User]) {
    println!("Users: {}", users.len());
    for user in users {
        println!("- [{}] {}", user.id, user.username);
    }
}

fn print_item(item: &Item) {
    println!("id: {}", item.id);
    println!("title: {}", item.title);
    if let Some(item_type) = &item.item_type {
        println!("type: {item_type}");
    }
    if let Some(year) = item.year {
        println!("year: {year}");
    }
    if let Some(description) = &item.description {
        println!("description: {description}");
    }
    if let Some(rating) = item.user_rating {
        println!("user rating: {rating:.1}");
    }
}

fn print_reviews(reviews: &[Review]) {
    println!("Reviews: {}", reviews.len());
    for review in reviews {
        let author = review
            .username
            .clone()
            .unwrap_or_else(|| format!("User #{}", review.user_id));
        let rating = review
            .rating
            .map(|rating| format!(" ({rating}/10)"))
            .unwrap_or_default();
        println!("- [{}] {author}{rating}: {}", review.id, review.review_text);
    }
}

fn print_activities(activities: &[Activity]) {
    if activities.is_empty() {
        println!("No activity yet. Follow someone to fill your feed.");
        return;
    }
    for activity in activities {
        let when = activity
            .created_at
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("[{when}] {}", activity.summary());
        let review = match &activity.kind {
            ActivityKind::Review { review, .. }
            | ActivityKind::LikeReview { review, .. }
            | ActivityKind::CommentReview { review, .. } => Some(review),
            _ => None,
        };
        if let Some(excerpt) = review.and_then(|review| review.excerpt()) {
            println!("    \"{excerpt}\"");
        }
    }
}

fn print_comments(comments: &[Comment]) {
    println!("Comments: {}", comments.len());
    for comment in comments {
        let author = comment
            .username
            .clone()
            .unwrap_or_else(|| format!("User #{}", comment.user_id));
        println!("- [{}] {author}: {}", comment.id, comment.comment_text);
    }
}

fn print_library(entries: &[LibraryEntry]) {
    println!("Library: {}", entries.len());
    for entry in entries {
        let title = entry.title.as_deref().unwrap_or("(untitled)");
        println!("- [{}] {title} ({})", entry.item_id, entry.status);
    }
}

fn print_lists(lists: &[CustomList]) {
    println!("Lists: {}", lists.len());
    for list in lists {
        let visibility = if list.is_public { "public" } else { "private" };
        println!(
            "- [{}] {} ({} items, {visibility})",
            list.id, list.name, list.item_count
        );
    }
}
