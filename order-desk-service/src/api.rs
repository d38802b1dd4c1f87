use axum::{
    Extension, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    middleware::{from_fn, from_fn_with_state},
    response::Json,
    routing::{get, post},
};
use order_flow::{
    ChatTransport, ContentAdmin, ContentStore, Customer, EngineSettings, Event, FileView,
    FlowError, InMemoryContentStore, InMemoryOrderRepository, InMemorySessionStorage,
    NotificationRelay, OperatorDesk, OrderRepository, OrderView, PostgresContentStore,
    PostgresOrderRepository, Prompt, SessionStorage, WizardEngine, content::keys, deliver_all,
    postgres, repository::OrderStats,
};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::{collections::BTreeMap, sync::Arc};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::{
    auth::{AuthConfig, Claims, require_admin},
    config::Settings,
    telegram::{TelegramTransport, Update},
    telemetry::correlation_id_middleware,
};

/// Header Telegram echoes back when the webhook was registered with a `secret_token`.
pub const WEBHOOK_SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

type ApiResult<T> = Result<Json<T>, ApiError>;
pub type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, detail: &str) -> ApiError {
    (status, Json(json!({ "detail": detail })))
}

fn flow_error(err: FlowError) -> ApiError {
    match err {
        FlowError::OrderNotFound(_) => api_error(StatusCode::NOT_FOUND, "Заявка не найдена"),
        FlowError::InvalidStatus(_) => api_error(StatusCode::BAD_REQUEST, "Недопустимый статус"),
        FlowError::Rejected(detail) => api_error(StatusCode::BAD_REQUEST, &detail),
        FlowError::InvalidAction(detail) => api_error(StatusCode::BAD_REQUEST, &detail),
        FlowError::StorageError(_) | FlowError::DeliveryError(_) => {
            error!(error = %err, "request failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Внутренняя ошибка сервера")
        }
    }
}

fn message(text: &str) -> Json<Value> {
    Json(json!({ "message": text }))
}

#[derive(Clone)]
pub struct AppState {
    pub engine: WizardEngine,
    pub desk: OperatorDesk,
    pub content: ContentAdmin,
    pub transport: Arc<dyn ChatTransport>,
    /// Set when the transport is Telegram itself, for callback acknowledgements.
    pub telegram: Option<TelegramTransport>,
    /// Updates without this value in the secret header are refused.
    pub webhook_secret: Option<String>,
    pub auth: Arc<AuthConfig>,
}

impl AppState {
    pub fn new(
        sessions: Arc<dyn SessionStorage>,
        orders: Arc<dyn OrderRepository>,
        content: Arc<dyn ContentStore>,
        transport: Arc<dyn ChatTransport>,
        engine_settings: EngineSettings,
        auth: AuthConfig,
    ) -> Self {
        let engine = WizardEngine::new(
            sessions,
            orders.clone(),
            content.clone(),
            NotificationRelay::new(transport.clone()),
            engine_settings,
        );
        Self {
            engine,
            desk: OperatorDesk::new(orders, transport.clone()),
            content: ContentAdmin::new(content),
            transport,
            telegram: None,
            webhook_secret: None,
            auth: Arc::new(auth),
        }
    }
}

async fn create_storage(settings: &Settings) -> (Arc<dyn OrderRepository>, Arc<dyn ContentStore>) {
    if let Some(database_url) = &settings.database_url {
        info!("Using PostgreSQL storage");
        match postgres::connect(database_url).await {
            Ok(pool) => {
                return (
                    Arc::new(PostgresOrderRepository::new(pool.clone())),
                    Arc::new(PostgresContentStore::new(pool)),
                );
            }
            Err(e) => error!(
                "Failed to connect to PostgreSQL: {}. Falling back to in-memory storage.",
                e
            ),
        }
    } else {
        info!("Using in-memory storage (set DATABASE_URL to use PostgreSQL)");
    }
    (
        Arc::new(InMemoryOrderRepository::new()),
        Arc::new(InMemoryContentStore::new()),
    )
}

/// The manager contact from the environment is shown in the admin panel until staff edit it.
async fn seed_content(content: &dyn ContentStore, settings: &Settings) {
    let Some(manager) = settings.manager_username.clone() else {
        return;
    };
    match content.load().await {
        Ok(values) if values.get(keys::MANAGER_USERNAME).is_none_or(|v| v.is_empty()) => {
            if let Err(e) = content
                .save_many(vec![(keys::MANAGER_USERNAME.to_string(), manager)])
                .await
            {
                warn!(error = %e, "failed to seed manager username");
            }
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "content store unavailable at start-up"),
    }
}

pub async fn create_app(settings: &Settings) -> Router {
    let (orders, content) = create_storage(settings).await;
    seed_content(content.as_ref(), settings).await;

    let telegram = TelegramTransport::new(&settings.telegram_api_url, &settings.bot_token);
    let mut state = AppState::new(
        Arc::new(InMemorySessionStorage::new()),
        orders,
        content,
        Arc::new(telegram.clone()),
        settings.engine(),
        AuthConfig::new(&settings.admin_panel_password, &settings.secret_key),
    );
    state.telegram = Some(telegram);
    state.webhook_secret = settings.webhook_secret.clone();
    if state.webhook_secret.is_none() {
        warn!("WEBHOOK_SECRET not set, Telegram updates are accepted from any caller");
    }
    build_router(state)
}

pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/auth/verify", get(verify_token))
        .route("/chat/{user_id}/events", post(chat_event))
        .route("/api/orders", get(list_orders))
        .route("/api/orders/stats", get(order_stats))
        .route("/api/orders/{id}", get(get_order).put(update_order))
        .route("/api/orders/{id}/files", get(order_files))
        .route(
            "/api/orders/{id}/messages",
            get(order_messages).post(send_message),
        )
        .route("/api/bot-config", get(get_config).put(put_config))
        .route("/api/bot-config/texts", get(get_texts).put(put_texts))
        .route(
            "/api/bot-config/settings",
            get(get_settings).put(put_settings),
        )
        .route_layer(from_fn_with_state(state.auth.clone(), require_admin));

    Router::new()
        .route("/health", get(health_check))
        .route("/api/auth/login", post(login))
        .route("/telegram/webhook", post(telegram_webhook))
        .merge(protected)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(correlation_id_middleware))
        .with_state(state)
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

// Authentication

#[derive(Debug, Deserialize)]
struct LoginRequest {
    password: String,
}

async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Value> {
    if !state.auth.check_password(&request.password) {
        warn!("admin login with wrong password");
        return Err(api_error(StatusCode::UNAUTHORIZED, "Неверный пароль"));
    }
    let token = state.auth.issue("admin").map_err(|e| {
        error!(error = %e, "failed to issue token");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "Не удалось выдать токен")
    })?;
    info!("admin logged in");
    Ok(Json(json!({ "token": token, "token_type": "bearer" })))
}

async fn verify_token(Extension(claims): Extension<Claims>) -> Json<Value> {
    Json(json!({ "valid": true, "user": claims.sub }))
}

// Orders

#[derive(Debug, Deserialize)]
struct OrdersQuery {
    #[serde(default = "first_page")]
    page: i64,
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    status_filter: Option<String>,
}

fn first_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    200
}

async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrdersQuery>,
) -> ApiResult<Vec<OrderView>> {
    state
        .desk
        .list_orders(query.status_filter.as_deref(), query.page, query.limit)
        .await
        .map(Json)
        .map_err(flow_error)
}

async fn order_stats(State(state): State<AppState>) -> Json<OrderStats> {
    Json(state.desk.stats().await.unwrap_or_else(|e| {
        error!(error = %e, "failed to compute order stats");
        OrderStats::default()
    }))
}

async fn get_order(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<OrderView> {
    state.desk.get_order(id).await.map(Json).map_err(flow_error)
}

#[derive(Debug, Deserialize)]
struct OrderUpdate {
    #[serde(default)]
    status: Option<String>,
}

async fn update_order(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(update): Json<OrderUpdate>,
) -> ApiResult<Value> {
    state.desk.get_order(id).await.map_err(flow_error)?;
    if let Some(status) = update.status.as_deref().filter(|s| !s.is_empty()) {
        state
            .desk
            .update_status(id, status)
            .await
            .map_err(flow_error)?;
    }
    Ok(message("Заявка обновлена"))
}

async fn order_files(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Value> {
    let files: Vec<FileView> = state.desk.order_files(id).await.map_err(flow_error)?;
    Ok(Json(json!({ "files": files })))
}

async fn order_messages(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Value> {
    let messages = state.desk.order_messages(id).await.map_err(flow_error)?;
    Ok(Json(json!({ "messages": messages })))
}

#[derive(Debug, Deserialize)]
struct MessageCreate {
    #[serde(default)]
    text: String,
}

async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<MessageCreate>,
) -> ApiResult<Value> {
    state
        .desk
        .send_message(id, &body.text)
        .await
        .map_err(flow_error)?;
    Ok(message("Сообщение отправлено"))
}

// Bot content

fn save_failed(what: &'static str) -> impl Fn(FlowError) -> ApiError {
    move |e| {
        error!(error = %e, "failed to save {}", what);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "Не удалось сохранить настройки")
    }
}

async fn get_config(State(state): State<AppState>) -> ApiResult<BTreeMap<String, String>> {
    state.content.all().await.map(Json).map_err(flow_error)
}

async fn put_config(
    State(state): State<AppState>,
    Json(data): Json<Map<String, Value>>,
) -> ApiResult<Value> {
    state
        .content
        .put_all(data)
        .await
        .map_err(save_failed("bot config"))?;
    Ok(message("Настройки сохранены"))
}

async fn get_texts(State(state): State<AppState>) -> ApiResult<BTreeMap<String, String>> {
    state.content.texts().await.map(Json).map_err(flow_error)
}

async fn put_texts(
    State(state): State<AppState>,
    Json(data): Json<Map<String, Value>>,
) -> ApiResult<Value> {
    state
        .content
        .put_texts(data)
        .await
        .map_err(save_failed("bot texts"))?;
    Ok(message("Тексты сохранены"))
}

async fn get_settings(State(state): State<AppState>) -> ApiResult<BTreeMap<String, Value>> {
    state.content.settings().await.map(Json).map_err(flow_error)
}

async fn put_settings(
    State(state): State<AppState>,
    Json(data): Json<Map<String, Value>>,
) -> ApiResult<Value> {
    state
        .content
        .put_settings(data)
        .await
        .map_err(save_failed("bot settings"))?;
    Ok(message("Настройки сохранены"))
}

// Conversation intake

fn webhook_authorized(expected: Option<&str>, headers: &HeaderMap) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        == Some(expected)
}

/// Answers 200 for every authorized update, usable or not, so Telegram does not redeliver it.
async fn telegram_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    if !webhook_authorized(state.webhook_secret.as_deref(), &headers) {
        warn!("rejected webhook call with a missing or wrong secret");
        return StatusCode::UNAUTHORIZED;
    }
    let update: Update = match serde_json::from_value(body) {
        Ok(update) => update,
        Err(e) => {
            warn!(error = %e, "unreadable Telegram update");
            return StatusCode::OK;
        }
    };
    let update_id = update.update_id;
    let Some(inbound) = update.into_inbound() else {
        return StatusCode::OK;
    };

    if let Some(event) = inbound.event {
        match state.engine.handle(&inbound.customer, event).await {
            Ok(prompts) => deliver_all(state.transport.as_ref(), &inbound.chat, &prompts).await,
            Err(e) => error!(update_id, user_id = inbound.customer.user_id, error = %e, "event failed"),
        }
    }
    if let (Some(telegram), Some(callback_id)) = (&state.telegram, &inbound.callback_id) {
        telegram.answer_callback(callback_id).await;
    }
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
struct ChatEventRequest {
    event: Event,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    full_name: String,
}

/// Staff-only JSON intake: applies the event and returns the prompts instead of sending them.
async fn chat_event(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(request): Json<ChatEventRequest>,
) -> ApiResult<Vec<Prompt>> {
    let customer = Customer::new(user_id, request.username, request.full_name);
    state
        .engine
        .handle(&customer, request.event)
        .await
        .map(Json)
        .map_err(flow_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, header},
    };
    use http_body_util::BodyExt;
    use order_flow::{ChatId, prompt::Button};
    use std::sync::Mutex;
    use tower::ServiceExt;

    #[derive(Default)]
    struct CapturingTransport {
        texts: Mutex<Vec<(ChatId, String)>>,
    }

    #[async_trait]
    impl ChatTransport for CapturingTransport {
        async fn send_text(&self, chat: &ChatId, text: &str, _: &[Vec<Button>]) -> order_flow::Result<()> {
            self.texts.lock().unwrap().push((chat.clone(), text.to_string()));
            Ok(())
        }

        async fn send_photo(&self, _: &ChatId, _: &str, _: &str, _: &[Vec<Button>]) -> order_flow::Result<()> {
            Err(FlowError::DeliveryError("no photos in tests".to_string()))
        }

        async fn send_document(&self, _: &ChatId, _: &str, _: &str) -> order_flow::Result<()> {
            Ok(())
        }

        async fn file_url(&self, _: &str) -> order_flow::Result<Option<String>> {
            Ok(None)
        }
    }

    struct TestApp {
        router: Router,
        transport: Arc<CapturingTransport>,
        orders: Arc<InMemoryOrderRepository>,
    }

    fn test_app() -> TestApp {
        test_app_with_secret(None)
    }

    fn test_app_with_secret(secret: Option<&str>) -> TestApp {
        let transport = Arc::new(CapturingTransport::default());
        let orders = Arc::new(InMemoryOrderRepository::new());
        let state = AppState::new(
            Arc::new(InMemorySessionStorage::new()),
            orders.clone(),
            Arc::new(InMemoryContentStore::new()),
            transport.clone(),
            EngineSettings::default(),
            AuthConfig::new("admin123", "test-secret"),
        );
        let state = AppState {
            webhook_secret: secret.map(str::to_string),
            ..state
        };
        TestApp {
            router: build_router(state),
            transport,
            orders,
        }
    }

    async fn call(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn login(router: &Router) -> String {
        let (status, body) = call(
            router,
            json_request("POST", "/api/auth/login", None, json!({"password": "admin123"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token_type"], "bearer");
        body["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn admin_routes_require_a_token() {
        let app = test_app();
        let (status, _) = call(&app.router, get_request("/api/orders", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = call(
            &app.router,
            json_request("POST", "/api/auth/login", None, json!({"password": "nope"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["detail"], "Неверный пароль");

        let token = login(&app.router).await;
        let (status, body) = call(&app.router, get_request("/api/auth/verify", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"valid": true, "user": "admin"}));
    }

    #[tokio::test]
    async fn chat_intake_drives_the_wizard() {
        let app = test_app();
        let start = json!({"event": {"type": "start", "branch": "scan"}, "full_name": "Иван"});
        let (status, _) = call(
            &app.router,
            json_request("POST", "/chat/42/events", None, start.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let token = login(&app.router).await;
        let (status, body) = call(
            &app.router,
            json_request("POST", "/chat/42/events", Some(&token), start),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["text"], "📡 Выберите тип объекта для 3D-сканирования:");

        let (status, body) = call(&app.router, get_request("/api/orders", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["status"], "draft");
        assert_eq!(body[0]["status_label"], "Черновик");
        assert_eq!(body[0]["payload"], json!({"branch": "scan"}));
    }

    #[tokio::test]
    async fn status_updates_and_messages() {
        let app = test_app();
        let order_id = app
            .orders
            .create_order(&Customer::new(9, None, "Anna"), order_flow::Branch::Print)
            .await
            .unwrap();
        let token = login(&app.router).await;
        let uri = format!("/api/orders/{}", order_id);

        let (status, body) = call(
            &app.router,
            json_request("PUT", &uri, Some(&token), json!({"status": "archived"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Недопустимый статус");

        let (status, _) = call(
            &app.router,
            json_request("PUT", "/api/orders/999", Some(&token), json!({"status": "done"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let messages_uri = format!("{}/messages", uri);
        let (status, _) = call(
            &app.router,
            json_request("POST", &messages_uri, Some(&token), json!({"text": "Здравствуйте"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            app.transport.texts.lock().unwrap().as_slice(),
            &[(ChatId::Id(9), "Здравствуйте".to_string())]
        );

        call(
            &app.router,
            json_request("PUT", &uri, Some(&token), json!({"status": "canceled"})),
        )
        .await;
        let (status, body) = call(
            &app.router,
            json_request("POST", &messages_uri, Some(&token), json!({"text": "ещё"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Нельзя отправить сообщение для отменённой заявки");

        let (_, body) = call(&app.router, get_request(&messages_uri, Some(&token))).await;
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["direction"], "out");
    }

    #[tokio::test]
    async fn webhook_replies_through_the_transport() {
        let app = test_app();
        let (status, _) = call(
            &app.router,
            json_request(
                "POST",
                "/telegram/webhook",
                None,
                json!({
                    "update_id": 10,
                    "message": {"chat": {"id": 5}, "from": {"id": 5, "first_name": "Oleg"}, "text": "/start"}
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let texts = app.transport.texts.lock().unwrap().clone();
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0].0, ChatId::Id(5));
        assert!(texts[0].1.starts_with("Привет! 👋"));

        let (status, _) = call(
            &app.router,
            json_request("POST", "/telegram/webhook", None, json!({"nonsense": true})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn settings_expose_toggles_as_booleans() {
        let app = test_app();
        let token = login(&app.router).await;
        call(
            &app.router,
            json_request(
                "PUT",
                "/api/bot-config/settings",
                Some(&token),
                json!({"enabled_menu_print": false}),
            ),
        )
        .await;
        let (_, body) = call(&app.router, get_request("/api/bot-config/settings", Some(&token))).await;
        assert_eq!(body["enabled_menu_print"], false);
        assert_eq!(body["enabled_menu_scan"], true);

        let (_, body) = call(&app.router, get_request("/api/bot-config", Some(&token))).await;
        assert_eq!(body["enabled_menu_print"], "false");
    }

    #[tokio::test]
    async fn webhook_secret_is_enforced() {
        let app = test_app_with_secret(Some("s3cret"));
        let update = json!({
            "update_id": 11,
            "message": {"chat": {"id": 6}, "from": {"id": 6, "first_name": "Spoof"}, "text": "/start"}
        });

        let (status, _) = call(
            &app.router,
            json_request("POST", "/telegram/webhook", None, update.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let mut wrong = json_request("POST", "/telegram/webhook", None, update.clone());
        wrong
            .headers_mut()
            .insert(WEBHOOK_SECRET_HEADER, "guess".parse().unwrap());
        let (status, _) = call(&app.router, wrong).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(app.transport.texts.lock().unwrap().is_empty());

        let mut signed = json_request("POST", "/telegram/webhook", None, update);
        signed
            .headers_mut()
            .insert(WEBHOOK_SECRET_HEADER, "s3cret".parse().unwrap());
        let (status, _) = call(&app.router, signed).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(app.transport.texts.lock().unwrap().len(), 1);
    }
}
