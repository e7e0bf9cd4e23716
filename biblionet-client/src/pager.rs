//! Постраничная загрузка ленты активности.
//!
//! Пейджер движется только вперёд по смещению `skip`. Состояния:
//! `Idle -> Loading -> Idle | Exhausted`. Из `Exhausted` выводит только
//! полный сброс. Пока идёт запрос, повторные вызовы `load_more` ничего не
//! делают, поэтому быстрые события прокрутки и двойные клики дают не больше
//! одного запроса.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::activity::Activity;
use crate::error::BiblioClientResult;

/// Размер страницы ленты по умолчанию.
pub const DEFAULT_PAGE_SIZE: u32 = 15;
/// Порог близости к концу документа для автодогрузки, px.
pub const DEFAULT_SCROLL_THRESHOLD_PX: f64 = 300.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Параметры запроса одной страницы ленты.
pub struct PageRequest {
    /// Чья лента.
    pub user_id: i64,
    /// Смещение от начала.
    pub skip: u32,
    /// Размер страницы.
    pub limit: u32,
}

/// Источник страниц ленты.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Загружает одну страницу.
    async fn fetch_page(&self, request: PageRequest) -> BiblioClientResult<Vec<Activity>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Фаза пейджера.
pub enum PagerPhase {
    /// Готов к следующему запросу.
    Idle,
    /// Запрос в полёте.
    Loading,
    /// Последняя страница получена.
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Итог вызова `load_first`/`load_more`.
pub enum LoadOutcome {
    /// Страница получена и добавлена.
    Loaded {
        /// Сколько записей добавлено.
        appended: usize,
        /// Есть ли следующие страницы.
        has_more: bool,
    },
    /// Запрос не отправлялся: пейджер занят или лента закончилась.
    Skipped,
    /// Ответ пришёл после сброса и отброшен.
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq)]
/// Геометрия прокрутки документа.
pub struct ScrollMetrics {
    /// Прокручено от начала.
    pub scroll_top: f64,
    /// Высота видимой области.
    pub viewport_height: f64,
    /// Полная высота документа.
    pub document_height: f64,
}

impl ScrollMetrics {
    /// Сколько осталось прокрутить до конца документа.
    pub fn remaining(&self) -> f64 {
        self.document_height - (self.scroll_top + self.viewport_height)
    }

    /// `true`, если до конца меньше `threshold` пикселей.
    pub fn near_bottom(&self, threshold: f64) -> bool {
        self.remaining() < threshold
    }
}

#[derive(Debug, Clone, Copy)]
struct Ticket {
    generation: u64,
    request: PageRequest,
}

#[derive(Debug)]
struct PagerState {
    user_id: i64,
    page_size: u32,
    offset: u32,
    has_more: bool,
    phase: PagerPhase,
    generation: u64,
    items: Vec<Activity>,
}

impl PagerState {
    fn new(user_id: i64, page_size: u32) -> Self {
        Self {
            user_id,
            page_size,
            offset: 0,
            has_more: true,
            phase: PagerPhase::Idle,
            generation: 0,
            items: Vec::new(),
        }
    }

    fn reset(&mut self, user_id: i64) {
        self.user_id = user_id;
        self.offset = 0;
        self.has_more = true;
        self.phase = PagerPhase::Idle;
        self.generation += 1;
        self.items.clear();
    }

    fn begin_first(&mut self) -> Ticket {
        let user_id = self.user_id;
        self.reset(user_id);
        self.phase = PagerPhase::Loading;
        self.ticket()
    }

    fn begin_more(&mut self) -> Option<Ticket> {
        if self.phase != PagerPhase::Idle || !self.has_more {
            return None;
        }
        self.phase = PagerPhase::Loading;
        Some(self.ticket())
    }

    fn ticket(&self) -> Ticket {
        Ticket {
            generation: self.generation,
            request: PageRequest {
                user_id: self.user_id,
                skip: self.offset,
                limit: self.page_size,
            },
        }
    }

    fn complete(
        &mut self,
        ticket: Ticket,
        result: BiblioClientResult<Vec<Activity>>,
    ) -> BiblioClientResult<LoadOutcome> {
        if ticket.generation != self.generation {
            debug!(skip = ticket.request.skip, "dropping feed page from a previous generation");
            return Ok(LoadOutcome::Discarded);
        }

        match result {
            Ok(page) => {
                let appended = page.len();
                let full = appended >= self.page_size as usize;
                self.items.extend(page);
                self.offset = self.offset.saturating_add(self.page_size);
                self.has_more = full;
                self.phase = if full {
                    PagerPhase::Idle
                } else {
                    PagerPhase::Exhausted
                };
                Ok(LoadOutcome::Loaded {
                    appended,
                    has_more: full,
                })
            }
            Err(err) => {
                self.phase = PagerPhase::Idle;
                Err(err)
            }
        }
    }
}

/// Пейджер ленты одного пользователя.
pub struct FeedPager {
    source: Arc<dyn FeedSource>,
    scroll_threshold: f64,
    state: Mutex<PagerState>,
}

impl std::fmt::Debug for FeedPager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedPager")
            .field("scroll_threshold", &self.scroll_threshold)
            .field("state", &*self.lock())
            .finish_non_exhaustive()
    }
}

impl FeedPager {
    /// Пейджер с размером страницы 15 и порогом прокрутки 300 px.
    pub fn new(source: Arc<dyn FeedSource>, user_id: i64) -> Self {
        Self::with_options(source, user_id, DEFAULT_PAGE_SIZE, DEFAULT_SCROLL_THRESHOLD_PX)
    }

    /// Пейджер с заданным размером страницы (минимум 1) и порогом прокрутки.
    pub fn with_options(
        source: Arc<dyn FeedSource>,
        user_id: i64,
        page_size: u32,
        scroll_threshold: f64,
    ) -> Self {
        Self {
            source,
            scroll_threshold,
            state: Mutex::new(PagerState::new(user_id, page_size.max(1))),
        }
    }

    /// Сбрасывает ленту и загружает первую страницу.
    ///
    /// Запрос, который был в полёте, будет проигнорирован.
    pub async fn load_first(&self) -> BiblioClientResult<LoadOutcome> {
        let ticket = self.lock().begin_first();
        self.run(ticket).await
    }

    /// Загружает следующую страницу, если пейджер свободен и лента не
    /// закончилась. Иначе возвращает [`LoadOutcome::Skipped`] без запроса.
    ///
    /// При ошибке смещение и накопленные записи не меняются, следующий вызов
    /// повторит ту же страницу.
    pub async fn load_more(&self) -> BiblioClientResult<LoadOutcome> {
        let Some(ticket) = self.lock().begin_more() else {
            return Ok(LoadOutcome::Skipped);
        };
        self.run(ticket).await
    }

    /// Реакция на прокрутку: догружает ленту у конца документа.
    pub async fn on_scroll(&self, metrics: ScrollMetrics) -> BiblioClientResult<LoadOutcome> {
        if !metrics.near_bottom(self.scroll_threshold) {
            return Ok(LoadOutcome::Skipped);
        }
        self.load_more().await
    }

    /// Полный сброс на ленту `user_id` без загрузки.
    pub fn reset(&self, user_id: i64) {
        self.lock().reset(user_id);
    }

    async fn run(&self, ticket: Ticket) -> BiblioClientResult<LoadOutcome> {
        debug!(
            user_id = ticket.request.user_id,
            skip = ticket.request.skip,
            limit = ticket.request.limit,
            "loading feed page"
        );
        let result = self.source.fetch_page(ticket.request).await;
        let outcome = self.lock().complete(ticket, result);
        if let Err(err) = &outcome {
            warn!(skip = ticket.request.skip, error = %err, "feed page failed");
        }
        outcome
    }

    /// Накопленные записи.
    pub fn items(&self) -> Vec<Activity> {
        self.lock().items.clone()
    }

    /// Сколько записей накоплено.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// `true`, если записей нет.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Текущая фаза.
    pub fn phase(&self) -> PagerPhase {
        self.lock().phase
    }

    /// Смещение следующей страницы.
    pub fn offset(&self) -> u32 {
        self.lock().offset
    }

    /// Есть ли ещё страницы.
    pub fn has_more(&self) -> bool {
        self.lock().has_more
    }

    /// Идёт ли загрузка.
    pub fn is_loading(&self) -> bool {
        self.lock().phase == PagerPhase::Loading
    }

    /// Размер страницы.
    pub fn page_size(&self) -> u32 {
        self.lock().page_size
    }

    /// Чья лента.
    pub fn user_id(&self) -> i64 {
        self.lock().user_id
    }

    fn lock(&self) -> MutexGuard<'_, PagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use tokio::sync::Notify;

    use super::*;
    use crate::activity::{ActivityKind, ItemRef};
    use crate::error::BiblioClientError;

    #[derive(Clone, Default)]
    struct FakeFeed {
        calls: Arc<Mutex<Vec<PageRequest>>>,
        responses: Arc<Mutex<VecDeque<BiblioClientResult<Vec<Activity>>>>>,
        gate: Option<Arc<Notify>>,
    }

    impl FakeFeed {
        fn with_pages(pages: Vec<BiblioClientResult<Vec<Activity>>>) -> Self {
            Self {
                responses: Arc::new(Mutex::new(pages.into())),
                ..Self::default()
            }
        }

        fn gated(mut self, gate: Arc<Notify>) -> Self {
            self.gate = Some(gate);
            self
        }

        fn calls(&self) -> Vec<PageRequest> {
            self.calls.lock().expect("calls mutex poisoned").clone()
        }
    }

    #[async_trait]
    impl FeedSource for FakeFeed {
        async fn fetch_page(&self, request: PageRequest) -> BiblioClientResult<Vec<Activity>> {
            self.calls.lock().expect("calls mutex poisoned").push(request);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.responses
                .lock()
                .expect("responses mutex poisoned")
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn page(start: i64, len: usize) -> BiblioClientResult<Vec<Activity>> {
        Ok((0..len as i64)
            .map(|i| Activity {
                id: start + i,
                user_id: Some(1),
                username: None,
                created_at: None,
                kind: ActivityKind::Other {
                    activity_type: "rating".to_string(),
                    item: ItemRef::default(),
                },
            })
            .collect())
    }

    fn failure() -> BiblioClientResult<Vec<Activity>> {
        Err(BiblioClientError::Remote {
            status: 500,
            message: "boom".to_string(),
        })
    }

    fn pager_over(feed: &FakeFeed) -> FeedPager {
        FeedPager::new(Arc::new(feed.clone()), 7)
    }

    #[tokio::test]
    async fn first_page_requests_offset_zero() {
        let feed = FakeFeed::with_pages(vec![page(0, 15)]);
        let pager = pager_over(&feed);

        let outcome = pager.load_first().await.expect("load_first");

        assert_eq!(
            outcome,
            LoadOutcome::Loaded {
                appended: 15,
                has_more: true
            }
        );
        assert_eq!(
            feed.calls(),
            vec![PageRequest {
                user_id: 7,
                skip: 0,
                limit: 15
            }]
        );
        assert_eq!(pager.offset(), 15);
        assert_eq!(pager.phase(), PagerPhase::Idle);
    }

    #[tokio::test]
    async fn short_page_exhausts_the_feed() {
        let feed = FakeFeed::with_pages(vec![page(0, 15), page(15, 7)]);
        let pager = pager_over(&feed);

        pager.load_first().await.expect("page 0");
        assert!(pager.has_more());

        let outcome = pager.load_more().await.expect("page 1");
        assert_eq!(
            outcome,
            LoadOutcome::Loaded {
                appended: 7,
                has_more: false
            }
        );
        assert_eq!(pager.phase(), PagerPhase::Exhausted);
        assert!(!pager.has_more());

        assert_eq!(pager.load_more().await.expect("no-op"), LoadOutcome::Skipped);
        assert_eq!(feed.calls().len(), 2);
        assert_eq!(pager.len(), 22);
    }

    #[tokio::test]
    async fn empty_first_page_exhausts_immediately() {
        let feed = FakeFeed::with_pages(vec![page(0, 0)]);
        let pager = pager_over(&feed);

        pager.load_first().await.expect("load_first");

        assert_eq!(pager.phase(), PagerPhase::Exhausted);
        assert!(pager.is_empty());
    }

    #[tokio::test]
    async fn failed_page_keeps_offset_and_items() {
        let feed = FakeFeed::with_pages(vec![page(0, 15), failure(), page(15, 15)]);
        let pager = pager_over(&feed);

        pager.load_first().await.expect("page 0");
        let err = pager.load_more().await.expect_err("page 1 fails");

        assert_eq!(err.to_string(), "boom");
        assert_eq!(pager.offset(), 15);
        assert_eq!(pager.len(), 15);
        assert_eq!(pager.phase(), PagerPhase::Idle);

        pager.load_more().await.expect("retry");
        let skips: Vec<u32> = feed.calls().iter().map(|call| call.skip).collect();
        assert_eq!(skips, vec![0, 15, 15]);
        assert_eq!(pager.len(), 30);
        assert_eq!(pager.offset(), 30);
    }

    #[tokio::test]
    async fn concurrent_load_more_issues_one_request() {
        let gate = Arc::new(Notify::new());
        let feed = FakeFeed::with_pages(vec![page(0, 15)]).gated(Arc::clone(&gate));
        let pager = pager_over(&feed);

        let release = async {
            tokio::task::yield_now().await;
            assert!(pager.is_loading());
            gate.notify_one();
        };
        let (first, second, third, fourth, fifth, ()) = tokio::join!(
            pager.load_more(),
            pager.load_more(),
            pager.load_more(),
            pager.load_more(),
            pager.load_more(),
            release,
        );

        assert_eq!(feed.calls().len(), 1);
        assert!(matches!(first, Ok(LoadOutcome::Loaded { appended: 15, .. })));
        for skipped in [second, third, fourth, fifth] {
            assert!(matches!(skipped, Ok(LoadOutcome::Skipped)));
        }
        assert_eq!(pager.len(), 15);
    }

    #[tokio::test]
    async fn reset_discards_in_flight_page() {
        let gate = Arc::new(Notify::new());
        let feed = FakeFeed::with_pages(vec![page(0, 15)]).gated(Arc::clone(&gate));
        let pager = pager_over(&feed);

        let navigate = async {
            tokio::task::yield_now().await;
            pager.reset(99);
            gate.notify_one();
        };
        let (outcome, ()) = tokio::join!(pager.load_first(), navigate);

        assert_eq!(outcome.expect("stale result is not an error"), LoadOutcome::Discarded);
        assert!(pager.is_empty());
        assert_eq!(pager.user_id(), 99);
        assert_eq!(pager.phase(), PagerPhase::Idle);
        assert_eq!(pager.offset(), 0);
    }

    #[tokio::test]
    async fn load_first_after_exhaustion_starts_over() {
        let feed = FakeFeed::with_pages(vec![page(0, 3), page(100, 15)]);
        let pager = pager_over(&feed);

        pager.load_first().await.expect("first");
        assert_eq!(pager.phase(), PagerPhase::Exhausted);

        pager.load_first().await.expect("reload");

        assert_eq!(pager.len(), 15);
        assert_eq!(pager.items()[0].id, 100);
        assert_eq!(pager.phase(), PagerPhase::Idle);
        let skips: Vec<u32> = feed.calls().iter().map(|call| call.skip).collect();
        assert_eq!(skips, vec![0, 0]);
    }

    #[tokio::test]
    async fn scroll_far_from_bottom_does_nothing() {
        let feed = FakeFeed::with_pages(vec![page(0, 15)]);
        let pager = pager_over(&feed);
        let far = ScrollMetrics {
            scroll_top: 0.0,
            viewport_height: 800.0,
            document_height: 2000.0,
        };

        assert_eq!(pager.on_scroll(far).await.expect("scroll"), LoadOutcome::Skipped);
        assert!(feed.calls().is_empty());
    }

    #[tokio::test]
    async fn scroll_near_bottom_loads_next_page() {
        let feed = FakeFeed::with_pages(vec![page(0, 15)]);
        let pager = pager_over(&feed);
        let near = ScrollMetrics {
            scroll_top: 1000.0,
            viewport_height: 800.0,
            document_height: 2000.0,
        };

        assert!(near.near_bottom(DEFAULT_SCROLL_THRESHOLD_PX));
        let outcome = pager.on_scroll(near).await.expect("scroll");

        assert!(matches!(outcome, LoadOutcome::Loaded { .. }));
        assert_eq!(feed.calls().len(), 1);
    }

    #[test]
    fn scroll_threshold_is_strict() {
        let metrics = ScrollMetrics {
            scroll_top: 900.0,
            viewport_height: 800.0,
            document_height: 2000.0,
        };
        assert_eq!(metrics.remaining(), 300.0);
        assert!(!metrics.near_bottom(300.0));
        assert!(metrics.near_bottom(300.5));
    }
}
