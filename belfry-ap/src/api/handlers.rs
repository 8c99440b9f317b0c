//! HTTP request handlers
//!
//! Thin adapters from HTTP to the application container. Blocking audio
//! calls (bells and announcements play to completion) are pushed onto the
//! blocking pool so the async workers stay free.

use crate::api::server::AppContext;
use crate::audio::engine::EngineStatus;
use crate::player::{MusicFile, PlayerStatus};
use crate::scheduler::{SchedulerStatus, TimelineEntry};
use crate::services::birthdays::BirthdayStatus;
use crate::services::holidays::HolidayStatus;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use belfry_common::events::ChannelId;
use belfry_common::schedule::{Activity, DaySchedule, WeekSchedule};
use belfry_common::time::TimeOfDay;
use belfry_common::Error;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

#[derive(Debug, Serialize)]
pub struct FullStatusResponse {
    scheduler: SchedulerStatus,
    audio: EngineStatus,
    player: PlayerStatus,
}

#[derive(Debug, Deserialize)]
pub struct VolumeRequest {
    volume: u8,
}

#[derive(Debug, Serialize)]
pub struct VolumeResponse {
    channel: String,
    volume: u8,
}

#[derive(Debug, Deserialize)]
pub struct SoundRequest {
    sound_id: String,
}

#[derive(Debug, Deserialize)]
pub struct TtsRequest {
    text: String,
}

#[derive(Debug, Deserialize)]
pub struct PlayFileRequest {
    path: String,
}

#[derive(Debug, Deserialize)]
pub struct PlayRadioRequest {
    url: String,
}

#[derive(Debug, Deserialize)]
pub struct PlaylistRequest {
    files: Vec<String>,
    #[serde(default)]
    shuffle: bool,
}

#[derive(Debug, Deserialize)]
pub struct SeekRequest {
    position: f64,
}

#[derive(Debug, Deserialize)]
pub struct AddBirthdayRequest {
    name: String,
    date: String,
}

#[derive(Debug, Deserialize)]
pub struct BirthdaySettingsRequest {
    enabled: Option<bool>,
    announcement_times: Option<Vec<TimeOfDay>>,
    template: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddHolidayRequest {
    /// "DD.MM.YYYY"
    date: String,
    name: String,
}

#[derive(Debug, Deserialize)]
pub struct MuteHolidayRequest {
    date: String,
    muted: bool,
}

#[derive(Debug, Deserialize)]
pub struct HolidaySettingsRequest {
    enabled: Option<bool>,
    skip_on_holidays: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    imported: usize,
}

type ApiError = (StatusCode, Json<StatusResponse>);

fn api_error(err: Error) -> ApiError {
    let status = match &err {
        Error::NotFound(_) | Error::MissingSource(_) => StatusCode::NOT_FOUND,
        Error::ScheduleConflict(_) => StatusCode::CONFLICT,
        Error::BadRequest(_) | Error::InvalidTimeOfDay(_) | Error::Schedule(_) => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("request failed: {}", err);
    }
    (
        status,
        Json(StatusResponse {
            status: format!("error: {}", err),
        }),
    )
}

fn ok() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".to_string(),
    })
}

/// Run a blocking audio call on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> belfry_common::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| api_error(Error::Internal(format!("blocking task failed: {}", e))))?
        .map_err(api_error)
}

fn parse_channel(channel: &str) -> Result<ChannelId, ApiError> {
    match channel {
        "bell" => Ok(ChannelId::Bell),
        "announcement" => Ok(ChannelId::Announcement),
        "music" => Ok(ChannelId::Music),
        other => Err(api_error(Error::BadRequest(format!(
            "unknown channel: {}",
            other
        )))),
    }
}

fn parse_date(date: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(date, "%d.%m.%Y")
        .map_err(|_| api_error(Error::BadRequest(format!("bad date: {}", date))))
}

// ============================================================================
// Health and status
// ============================================================================

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "belfry-ap".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /api/status - combined scheduler, audio and player snapshot
pub async fn get_status(State(ctx): State<AppContext>) -> Json<FullStatusResponse> {
    Json(FullStatusResponse {
        scheduler: ctx.app.scheduler.status(),
        audio: ctx.app.engine.status(),
        player: ctx.app.player.status(),
    })
}

// ============================================================================
// Schedule
// ============================================================================

/// GET /api/schedule
pub async fn get_schedule(State(ctx): State<AppContext>) -> Json<WeekSchedule> {
    Json(ctx.app.scheduler.get_schedule())
}

/// POST /api/schedule - replace the whole week
pub async fn update_schedule(
    State(ctx): State<AppContext>,
    Json(days): Json<Vec<DaySchedule>>,
) -> Result<Json<StatusResponse>, ApiError> {
    ctx.app.scheduler.update_schedule(days).map_err(api_error)?;
    info!("schedule replaced");
    Ok(ok())
}

/// POST /api/schedule/day - replace one day
pub async fn update_day(
    State(ctx): State<AppContext>,
    Json(day): Json<DaySchedule>,
) -> Result<Json<StatusResponse>, ApiError> {
    ctx.app.scheduler.update_day(day).map_err(api_error)?;
    Ok(ok())
}

/// POST /api/schedule/:day/activities
pub async fn add_activity(
    State(ctx): State<AppContext>,
    Path(day): Path<u8>,
    Json(activity): Json<Activity>,
) -> Result<Json<StatusResponse>, ApiError> {
    ctx.app
        .scheduler
        .add_activity(day, activity)
        .map_err(api_error)?;
    Ok(ok())
}

/// DELETE /api/schedule/:day/activities/:activity_id
pub async fn remove_activity(
    State(ctx): State<AppContext>,
    Path((day, activity_id)): Path<(u8, String)>,
) -> Result<Json<StatusResponse>, ApiError> {
    ctx.app
        .scheduler
        .remove_activity(day, &activity_id)
        .map_err(api_error)?;
    Ok(ok())
}

/// GET /api/timeline - today's boundaries in order
pub async fn get_timeline(State(ctx): State<AppContext>) -> Json<Vec<TimelineEntry>> {
    Json(ctx.app.scheduler.daily_timeline())
}

// ============================================================================
// Scheduler control
// ============================================================================

/// POST /api/scheduler/start
pub async fn start_scheduler(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    ctx.app.scheduler.start();
    ok()
}

/// POST /api/scheduler/stop
pub async fn stop_scheduler(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    let scheduler = ctx.app.scheduler.clone();
    // stop() joins the tick thread; keep it off the async workers
    let _ = tokio::task::spawn_blocking(move || scheduler.stop()).await;
    ok()
}

// ============================================================================
// Audio
// ============================================================================

/// GET /api/audio/status
pub async fn get_audio_status(State(ctx): State<AppContext>) -> Json<EngineStatus> {
    Json(ctx.app.engine.status())
}

/// GET /api/audio/volume/:channel
pub async fn get_volume(
    State(ctx): State<AppContext>,
    Path(channel): Path<String>,
) -> Result<Json<VolumeResponse>, ApiError> {
    let volume = if channel == "manual" {
        ctx.app.player.volume()
    } else {
        ctx.app.engine.get_volume(parse_channel(&channel)?)
    };
    Ok(Json(VolumeResponse { channel, volume }))
}

/// POST /api/audio/volume/:channel
pub async fn set_volume(
    State(ctx): State<AppContext>,
    Path(channel): Path<String>,
    Json(req): Json<VolumeRequest>,
) -> Result<Json<VolumeResponse>, ApiError> {
    if channel == "manual" {
        ctx.app.player.set_volume(req.volume);
    } else {
        ctx.app.engine.set_volume(parse_channel(&channel)?, req.volume);
    }
    Ok(Json(VolumeResponse {
        channel,
        volume: req.volume.min(100),
    }))
}

/// POST /api/audio/bell - play a bell to completion
pub async fn trigger_bell(
    State(ctx): State<AppContext>,
    Json(req): Json<SoundRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let engine = ctx.app.engine.clone();
    blocking(move || engine.play_bell(&req.sound_id, true)).await?;
    Ok(ok())
}

/// POST /api/audio/announcement - play an announcement to completion
pub async fn trigger_announcement(
    State(ctx): State<AppContext>,
    Json(req): Json<SoundRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let engine = ctx.app.engine.clone();
    blocking(move || engine.play_announcement(&req.sound_id, true)).await?;
    Ok(ok())
}

/// POST /api/audio/tts - synthesize text and speak it
pub async fn trigger_tts(
    State(ctx): State<AppContext>,
    Json(req): Json<TtsRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let synth = ctx.app.synth.clone();
    let engine = ctx.app.engine.clone();
    blocking(move || {
        let path = synth.generate(&req.text, "")?;
        engine.play_announcement(&path.to_string_lossy(), true)
    })
    .await?;
    Ok(ok())
}

/// POST /api/audio/stop-all
pub async fn stop_all(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    ctx.app.engine.stop_all();
    ok()
}

// ============================================================================
// Manual player
// ============================================================================

/// GET /api/player/status
pub async fn player_status(State(ctx): State<AppContext>) -> Json<PlayerStatus> {
    Json(ctx.app.player.status())
}

/// GET /api/player/files - browsable music library
pub async fn player_files(State(ctx): State<AppContext>) -> Json<Vec<MusicFile>> {
    Json(ctx.app.player.list_music_files())
}

/// POST /api/player/play-file
pub async fn player_play_file(
    State(ctx): State<AppContext>,
    Json(req): Json<PlayFileRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    ctx.app.player.play_file(&req.path).map_err(api_error)?;
    Ok(ok())
}

/// POST /api/player/play-radio
pub async fn player_play_radio(
    State(ctx): State<AppContext>,
    Json(req): Json<PlayRadioRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    ctx.app.player.play_radio(&req.url).map_err(api_error)?;
    Ok(ok())
}

/// POST /api/player/playlist
pub async fn player_playlist(
    State(ctx): State<AppContext>,
    Json(req): Json<PlaylistRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    ctx.app
        .player
        .play_playlist(req.files, req.shuffle)
        .map_err(api_error)?;
    Ok(ok())
}

/// POST /api/player/next
pub async fn player_next(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    ctx.app.player.next_track();
    ok()
}

/// POST /api/player/previous
pub async fn player_previous(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    ctx.app.player.previous_track();
    ok()
}

/// POST /api/player/toggle
pub async fn player_toggle(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    ctx.app.player.toggle_play_pause();
    ok()
}

/// POST /api/player/stop
pub async fn player_stop(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    ctx.app.player.stop();
    ok()
}

/// POST /api/player/seek
pub async fn player_seek(
    State(ctx): State<AppContext>,
    Json(req): Json<SeekRequest>,
) -> Json<StatusResponse> {
    ctx.app.player.seek(req.position);
    ok()
}

/// POST /api/player/volume
pub async fn player_volume(
    State(ctx): State<AppContext>,
    Json(req): Json<VolumeRequest>,
) -> Json<VolumeResponse> {
    ctx.app.player.set_volume(req.volume);
    Json(VolumeResponse {
        channel: "manual".to_string(),
        volume: req.volume.min(100),
    })
}

// ============================================================================
// Birthdays
// ============================================================================

/// GET /api/birthdays
pub async fn birthday_status(State(ctx): State<AppContext>) -> Json<BirthdayStatus> {
    Json(ctx.app.birthdays.status())
}

/// POST /api/birthdays
pub async fn add_birthday(
    State(ctx): State<AppContext>,
    Json(req): Json<AddBirthdayRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    ctx.app
        .birthdays
        .add_person(&req.name, &req.date)
        .map_err(api_error)?;
    Ok(ok())
}

/// DELETE /api/birthdays/:name
pub async fn remove_birthday(
    State(ctx): State<AppContext>,
    Path(name): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    if ctx.app.birthdays.remove_person(&name) {
        Ok(ok())
    } else {
        Err(api_error(Error::NotFound(format!("person {}", name))))
    }
}

/// POST /api/birthdays/import - CSV body, "name,date" per line
pub async fn import_birthdays(
    State(ctx): State<AppContext>,
    body: String,
) -> Json<ImportResponse> {
    let imported = ctx.app.birthdays.import_csv(&body);
    info!("imported {} birthday record(s)", imported);
    Json(ImportResponse { imported })
}

/// POST /api/birthdays/settings
pub async fn birthday_settings(
    State(ctx): State<AppContext>,
    Json(req): Json<BirthdaySettingsRequest>,
) -> Json<StatusResponse> {
    if let Some(enabled) = req.enabled {
        ctx.app.birthdays.set_enabled(enabled);
    }
    if let Some(times) = req.announcement_times {
        ctx.app.birthdays.set_announcement_times(times);
    }
    if let Some(template) = req.template {
        ctx.app.birthdays.set_template(template);
    }
    ok()
}

// ============================================================================
// Holidays
// ============================================================================

/// GET /api/holidays
pub async fn holiday_status(State(ctx): State<AppContext>) -> Json<HolidayStatus> {
    Json(ctx.app.holidays.status())
}

/// POST /api/holidays
pub async fn add_holiday(
    State(ctx): State<AppContext>,
    Json(req): Json<AddHolidayRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let date = parse_date(&req.date)?;
    ctx.app.holidays.set_holiday(date, &req.name);
    Ok(ok())
}

/// DELETE /api/holidays/:date
pub async fn remove_holiday(
    State(ctx): State<AppContext>,
    Path(date): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let date = parse_date(&date)?;
    if ctx.app.holidays.remove_holiday(date) {
        Ok(ok())
    } else {
        Err(api_error(Error::NotFound("no such holiday".to_string())))
    }
}

/// POST /api/holidays/mute
pub async fn mute_holiday(
    State(ctx): State<AppContext>,
    Json(req): Json<MuteHolidayRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    parse_date(&req.date)?;
    ctx.app.holidays.set_holiday_muted(&req.date, req.muted);
    Ok(ok())
}

/// POST /api/holidays/settings
pub async fn holiday_settings(
    State(ctx): State<AppContext>,
    Json(req): Json<HolidaySettingsRequest>,
) -> Json<StatusResponse> {
    if let Some(enabled) = req.enabled {
        ctx.app.holidays.set_enabled(enabled);
    }
    if let Some(skip) = req.skip_on_holidays {
        ctx.app.holidays.set_skip_on_holidays(skip);
    }
    ok()
}
