//! Route table: one HTTP route per controller operation
//!
//! Every mutating route records an activity-log entry before replying with
//! the operation's `{success, message}` result. Malformed bodies are answered
//! with the same shape instead of warp's plain-text rejections.

use super::activity::{ActivityKind, ActivityLog};
use crate::agent::{ActionResult, Activity, AgentController};
use crate::observability::metrics::metrics;
use crate::session::ConnectionTarget;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use warp::filters::body::BodyDeserializeError;
use warp::filters::BoxedFilter;
use warp::http::StatusCode;
use warp::reply::Json;
use warp::{Filter, Rejection, Reply};

const MAX_BODY_BYTES: u64 = 16 * 1024;

/// Shared state behind every route
pub struct ApiState {
    controller: AgentController,
    activity: Arc<ActivityLog>,
}

impl ApiState {
    pub fn new(controller: AgentController) -> Self {
        Self::with_activity_log(controller, Arc::new(ActivityLog::new()))
    }

    pub fn with_activity_log(controller: AgentController, activity: Arc<ActivityLog>) -> Self {
        Self {
            controller,
            activity,
        }
    }

    pub fn controller(&self) -> &AgentController {
        &self.controller
    }

    pub fn activity(&self) -> &Arc<ActivityLog> {
        &self.activity
    }

    /// Log the outcome of a mutating call and turn it into the reply
    async fn logged(&self, kind: ActivityKind, message: String, result: &ActionResult) -> Json {
        self.activity.record(kind, message).await;
        warp::reply::json(result)
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    message: &'static str,
}

/// Coordinates, all null while offline
#[derive(Debug, Serialize)]
struct LocationResponse {
    x: Option<f64>,
    y: Option<f64>,
    z: Option<f64>,
}

/// Vitals, all null while offline
#[derive(Debug, Serialize)]
struct VitalsResponse {
    health: Option<f32>,
    food: Option<f32>,
    oxygen: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ActivityResponse {
    action: Activity,
}

#[derive(Debug, Deserialize)]
pub struct StartBody {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherBody {
    pub weather_type: String,
}

/// `timeValue` may be a name or a tick count, quoted or not
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TimeValue {
    Ticks(i64),
    Text(String),
}

impl fmt::Display for TimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeValue::Ticks(ticks) => write!(f, "{ticks}"),
            TimeValue::Text(text) => f.write_str(text),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeBody {
    pub time_value: TimeValue,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeepWeatherBody {
    pub enabled: bool,
    #[serde(default)]
    pub weather_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeepTimeBody {
    pub enabled: bool,
    #[serde(default)]
    pub time_value: Option<TimeValue>,
}

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct CommandBody {
    pub command: String,
}

#[derive(Debug, Deserialize)]
pub struct TeleportBody {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

fn with_state(state: Arc<ApiState>) -> impl Filter<Extract = (Arc<ApiState>,), Error = Infallible> + Clone {
    warp::any().map(move || Arc::clone(&state))
}

fn get_route<F, Fut>(name: &'static str, state: &Arc<ApiState>, handler: F) -> BoxedFilter<(Json,)>
where
    F: Fn(Arc<ApiState>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<Json, Infallible>> + Send + 'static,
{
    warp::path(name)
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(Arc::clone(state)))
        .and_then(handler)
        .boxed()
}

fn post_route<F, Fut>(name: &'static str, state: &Arc<ApiState>, handler: F) -> BoxedFilter<(Json,)>
where
    F: Fn(Arc<ApiState>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<Json, Infallible>> + Send + 'static,
{
    warp::path(name)
        .and(warp::path::end())
        .and(warp::post())
        .and(with_state(Arc::clone(state)))
        .and_then(handler)
        .boxed()
}

fn post_json_route<B, F, Fut>(name: &'static str, state: &Arc<ApiState>, handler: F) -> BoxedFilter<(Json,)>
where
    B: DeserializeOwned + Send + 'static,
    F: Fn(Arc<ApiState>, B) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<Json, Infallible>> + Send + 'static,
{
    warp::path(name)
        .and(warp::path::end())
        .and(warp::post())
        .and(with_state(Arc::clone(state)))
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and_then(handler)
        .boxed()
}

/// All API routes with CORS open to any origin
pub fn routes(state: Arc<ApiState>) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let queries = get_route("health", &state, health)
        .or(get_route("metrics", &state, metrics_snapshot))
        .unify()
        .or(get_route("bot-status", &state, bot_status))
        .unify()
        .or(get_route("connection-status", &state, connection_status))
        .unify()
        .or(get_route("bot-location", &state, bot_location))
        .unify()
        .or(get_route("bot-health", &state, bot_health))
        .unify()
        .or(get_route("bot-action", &state, bot_action))
        .unify()
        .or(get_route("log-history", &state, log_history))
        .unify()
        .boxed();

    let lifecycle = post_json_route("start-bot", &state, start_bot)
        .or(post_route("stop-bot", &state, stop_bot))
        .unify()
        .or(post_route("restart-bot", &state, restart_bot))
        .unify()
        .boxed();

    let actions = post_route("kill-bot", &state, kill_bot)
        .or(post_route("heal-bot", &state, heal_bot))
        .unify()
        .or(post_route("respawn-bot", &state, respawn_bot))
        .unify()
        .or(post_route("feed-bot", &state, feed_bot))
        .unify()
        .or(post_route("feed-bot-food", &state, feed_bot_food))
        .unify()
        .or(post_route("starve-bot", &state, starve_bot))
        .unify()
        .or(post_route("collect-items", &state, collect_items))
        .unify()
        .or(post_json_route("send-chat", &state, send_chat))
        .unify()
        .or(post_json_route("execute-command", &state, execute_command))
        .unify()
        .or(post_json_route("teleport", &state, teleport))
        .unify()
        .boxed();

    let environment = post_json_route("set-weather", &state, set_weather)
        .or(post_json_route("set-time", &state, set_time))
        .unify()
        .or(post_json_route("set-keep-weather", &state, set_keep_weather))
        .unify()
        .or(post_json_route("set-keep-time", &state, set_keep_time))
        .unify()
        .or(post_route("toggle-auto-movement", &state, toggle_auto_movement))
        .unify()
        .boxed();

    queries
        .or(lifecycle)
        .unify()
        .or(actions)
        .unify()
        .or(environment)
        .unify()
        .recover(handle_rejection)
        .with(
            warp::cors()
                .allow_any_origin()
                .allow_methods(vec!["GET", "POST", "OPTIONS"])
                .allow_headers(vec!["content-type"]),
        )
}

async fn health(_state: Arc<ApiState>) -> Result<Json, Infallible> {
    Ok(warp::reply::json(&HealthResponse {
        message: "Backend is up and running!",
    }))
}

async fn metrics_snapshot(_state: Arc<ApiState>) -> Result<Json, Infallible> {
    Ok(warp::reply::json(&metrics().snapshot()))
}

async fn bot_status(state: Arc<ApiState>) -> Result<Json, Infallible> {
    Ok(warp::reply::json(&state.controller.get_status().await))
}

async fn bot_location(state: Arc<ApiState>) -> Result<Json, Infallible> {
    let position = state
        .controller
        .get_status()
        .await
        .live
        .and_then(|live| live.position);
    Ok(warp::reply::json(&LocationResponse {
        x: position.map(|p| p.x),
        y: position.map(|p| p.y),
        z: position.map(|p| p.z),
    }))
}

async fn bot_health(state: Arc<ApiState>) -> Result<Json, Infallible> {
    let live = state.controller.get_status().await.live;
    Ok(warp::reply::json(&VitalsResponse {
        health: live.as_ref().map(|l| l.health),
        food: live.as_ref().map(|l| l.food),
        oxygen: live.as_ref().map(|l| l.oxygen),
    }))
}

async fn bot_action(state: Arc<ApiState>) -> Result<Json, Infallible> {
    let action = state
        .controller
        .get_status()
        .await
        .live
        .map_or(Activity::Offline, |live| live.activity);
    Ok(warp::reply::json(&ActivityResponse { action }))
}

async fn connection_status(state: Arc<ApiState>) -> Result<Json, Infallible> {
    let reply = match state.controller.get_connection_state().await {
        Ok(status) => warp::reply::json(&status),
        Err(e) => warp::reply::json(&e.to_action_result()),
    };
    Ok(reply)
}

async fn log_history(state: Arc<ApiState>) -> Result<Json, Infallible> {
    Ok(warp::reply::json(&state.activity.history().await))
}

async fn start_bot(state: Arc<ApiState>, body: StartBody) -> Result<Json, Infallible> {
    let result = state
        .controller
        .start(ConnectionTarget::new(body.host, body.port))
        .await;
    let message = format!("Attempted to start bot: {}", result.message);
    Ok(state.logged(ActivityKind::System, message, &result).await)
}

async fn stop_bot(state: Arc<ApiState>) -> Result<Json, Infallible> {
    let result = state.controller.stop().await;
    let message = format!("Attempted to stop bot: {}", result.message);
    Ok(state.logged(ActivityKind::System, message, &result).await)
}

async fn restart_bot(state: Arc<ApiState>) -> Result<Json, Infallible> {
    let result = state.controller.restart().await;
    let message = format!("Attempted to restart bot: {}", result.message);
    Ok(state.logged(ActivityKind::System, message, &result).await)
}

async fn kill_bot(state: Arc<ApiState>) -> Result<Json, Infallible> {
    let result = state.controller.kill().await;
    let message = format!("Attempted to kill bot: {}", result.message);
    Ok(state.logged(ActivityKind::Action, message, &result).await)
}

async fn heal_bot(state: Arc<ApiState>) -> Result<Json, Infallible> {
    let result = state.controller.heal().await;
    let message = format!("Attempted to heal bot: {}", result.message);
    Ok(state.logged(ActivityKind::Action, message, &result).await)
}

async fn respawn_bot(state: Arc<ApiState>) -> Result<Json, Infallible> {
    let result = state.controller.respawn().await;
    let message = format!("Attempted to respawn bot: {}", result.message);
    Ok(state.logged(ActivityKind::Action, message, &result).await)
}

async fn feed_bot(state: Arc<ApiState>) -> Result<Json, Infallible> {
    let result = state.controller.feed().await;
    let message = format!("Attempted to feed bot: {}", result.message);
    Ok(state.logged(ActivityKind::Action, message, &result).await)
}

async fn feed_bot_food(state: Arc<ApiState>) -> Result<Json, Infallible> {
    let result = state.controller.feed_food().await;
    let message = format!("Attempted to feed bot: {}", result.message);
    Ok(state.logged(ActivityKind::Action, message, &result).await)
}

async fn starve_bot(state: Arc<ApiState>) -> Result<Json, Infallible> {
    let result = state.controller.starve().await;
    let message = format!("Attempted to starve bot: {}", result.message);
    Ok(state.logged(ActivityKind::Action, message, &result).await)
}

async fn collect_items(state: Arc<ApiState>) -> Result<Json, Infallible> {
    state
        .activity
        .record(ActivityKind::Action, "Attempting to collect nearby items")
        .await;
    let result = state.controller.collect_nearby_items().await;
    if result.success {
        state
            .activity
            .record(ActivityKind::Movement, result.message.clone())
            .await;
    }
    Ok(warp::reply::json(&result))
}

async fn send_chat(state: Arc<ApiState>, body: ChatBody) -> Result<Json, Infallible> {
    let message = format!("Bot: {}", body.message);
    let result = state.controller.send_chat(body.message).await;
    Ok(state.logged(ActivityKind::Chat, message, &result).await)
}

async fn execute_command(state: Arc<ApiState>, body: CommandBody) -> Result<Json, Infallible> {
    let message = format!("/{}", body.command.trim_start_matches('/'));
    let result = state.controller.execute_command(body.command).await;
    Ok(state.logged(ActivityKind::Command, message, &result).await)
}

async fn teleport(state: Arc<ApiState>, body: TeleportBody) -> Result<Json, Infallible> {
    let result = state.controller.teleport(body.x, body.y, body.z).await;
    let message = format!("Teleporting to {}, {}, {}", body.x, body.y, body.z);
    Ok(state.logged(ActivityKind::Movement, message, &result).await)
}

async fn set_weather(state: Arc<ApiState>, body: WeatherBody) -> Result<Json, Infallible> {
    let result = state.controller.set_weather(&body.weather_type).await;
    let message = format!("Setting weather to {}: {}", body.weather_type, result.message);
    Ok(state.logged(ActivityKind::Command, message, &result).await)
}

async fn set_time(state: Arc<ApiState>, body: TimeBody) -> Result<Json, Infallible> {
    let value = body.time_value.to_string();
    let result = state.controller.set_time(&value).await;
    let message = format!("Setting time to {value}: {}", result.message);
    Ok(state.logged(ActivityKind::Command, message, &result).await)
}

async fn set_keep_weather(state: Arc<ApiState>, body: KeepWeatherBody) -> Result<Json, Infallible> {
    let result = state
        .controller
        .set_keep_weather(body.enabled, body.weather_type.as_deref())
        .await;
    let message = result.message.clone();
    Ok(state.logged(ActivityKind::Command, message, &result).await)
}

async fn set_keep_time(state: Arc<ApiState>, body: KeepTimeBody) -> Result<Json, Infallible> {
    let value = body.time_value.map(|v| v.to_string());
    let result = state
        .controller
        .set_keep_time(body.enabled, value.as_deref())
        .await;
    let message = result.message.clone();
    Ok(state.logged(ActivityKind::Command, message, &result).await)
}

async fn toggle_auto_movement(state: Arc<ApiState>) -> Result<Json, Infallible> {
    let result = state.controller.toggle_auto_movement().await;
    let message = result.message.clone();
    Ok(state.logged(ActivityKind::Movement, message, &result).await)
}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if let Some(e) = err.find::<BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("Invalid request body: {e}"))
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large".to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, format!("Unhandled rejection: {err:?}"))
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&ActionResult::failure(message)),
        status,
    ))
}
