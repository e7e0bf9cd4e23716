use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use biblionet_client::{
    BiblioClient, ClientSettings, LoadOutcome, LoginForm, MemoryStorage, RegisterForm, ReviewForm,
};

fn unique_suffix() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock must be after unix epoch")
        .as_nanos();
    format!("{nanos}")
}

#[tokio::test]
#[ignore = "requires running BiblioNet backend and database"]
async fn http_smoke_flow() {
    let base_url = std::env::var("BIBLIONET_API_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:8000".to_string());
    let settings = ClientSettings::default().with_base_url(base_url);
    let storage = MemoryStorage::new();
    let client = BiblioClient::new(settings.clone(), Arc::new(storage.clone())).expect("client");

    let suffix = unique_suffix();
    let username = format!("smoke_{suffix}");
    let email = format!("smoke_{suffix}@example.com");
    let password = "password123";

    let registered = client
        .register(RegisterForm::new(&username, &email, password))
        .await
        .expect("register must succeed");
    assert_eq!(registered.user.username, username);
    assert!(client.session().is_logged_in());

    client.logout();
    assert!(!client.session().is_logged_in());

    let login = client
        .login(LoginForm::new(&email, password))
        .await
        .expect("login must succeed");
    assert!(!login.token.is_empty());

    let reloaded = BiblioClient::new(settings, Arc::new(storage)).expect("client");
    assert_eq!(reloaded.session().current_user_id(), Some(login.user.id));

    let items = client.gateway().list_items().await.expect("list items");
    if let Some(item) = items.first() {
        let review = client
            .post_review(ReviewForm::new(item.id, "smoke review", Some(7)))
            .await
            .expect("post review");
        let reviews = client
            .gateway()
            .reviews_for_item(item.id)
            .await
            .expect("reviews for item");
        assert!(reviews.iter().any(|existing| existing.id == review.id));
        client
            .gateway()
            .delete_review(review.id)
            .await
            .expect("delete review");
    }

    let pager = client.my_feed_pager().expect("logged in");
    let outcome = pager.load_first().await.expect("feed");
    assert!(matches!(outcome, LoadOutcome::Loaded { .. }));
}
