// src/handlers.rs - The HTTP surface: public listener endpoints, the
// Icecast compatibility endpoints and the admin control surface.

use std::sync::Arc;

use rocket::http::{ContentType, Status};
use rocket::request::{FromRequest, Outcome, Request};
use rocket::serde::json::Json;
use rocket::{catch, catchers, get, post, routes, Catcher, Route, State};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::catalog::MediaKind;
use crate::scheduler::PlaybackMode;
use crate::services::ingest::parse_basic_auth;
use crate::station::RadioStation;
use crate::stream::ListenerStream;

pub fn routes() -> Vec<Route> {
    routes![
        stream,
        status,
        now_playing,
        metadata,
        listclients,
        admin_status,
        library,
        control_playback,
        playback_settings,
        general_settings,
        live_credentials,
        admin_credentials,
        reorder,
        rescan,
    ]
}

pub fn catchers() -> Vec<Catcher> {
    catchers![not_found, unauthorized, server_error]
}

/// Request guard for the admin control surface: HTTP Basic against the
/// admin credential pair, compared in constant time.
pub struct AdminUser;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminUser {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(station) = request.rocket().state::<Arc<RadioStation>>() else {
            return Outcome::Error((Status::InternalServerError, ()));
        };
        let authorized = request
            .headers()
            .get_one("Authorization")
            .and_then(parse_basic_auth)
            .map(|(user, password)| station.verify_admin_credentials(&user, &password))
            .unwrap_or(false);
        if authorized {
            Outcome::Success(AdminUser)
        } else {
            Outcome::Error((Status::Unauthorized, ()))
        }
    }
}

// ---- public endpoints ------------------------------------------------------

#[get("/stream")]
pub fn stream(station: &State<Arc<RadioStation>>) -> ListenerStream {
    ListenerStream::new(station.inner().clone())
}

#[get("/status")]
pub fn status(station: &State<Arc<RadioStation>>) -> Json<Value> {
    Json(station.status())
}

#[get("/now_playing")]
pub fn now_playing(station: &State<Arc<RadioStation>>) -> String {
    station.now_playing_display()
}

// ---- Icecast compatibility -------------------------------------------------

/// Metadata callback used by source client software while broadcasting.
/// `+` means space in this convention; percent decoding already happened.
#[get("/admin/metadata?<mode>&<mount>&<song>")]
pub fn metadata(
    station: &State<Arc<RadioStation>>,
    mode: &str,
    mount: &str,
    song: &str,
) -> (Status, &'static str) {
    if mode != "updinfo" || mount != "/live" {
        return (Status::BadRequest, "unsupported metadata request");
    }
    if station.update_live_metadata(song) {
        (Status::Ok, "Metadata update successful")
    } else {
        // Auto DJ on air; nothing to update but the client is not at fault.
        (Status::Ok, "Metadata ignored, no live source")
    }
}

/// Minimal icestats stub so source clients polling listener counts keep
/// working.
#[get("/admin/listclients")]
pub fn listclients(station: &State<Arc<RadioStation>>) -> (ContentType, String) {
    let body = format!(
        "<?xml version=\"1.0\"?>\n<icestats><source mount=\"/live\"><Listeners>{}</Listeners></source></icestats>\n",
        station.listener_count()
    );
    (ContentType::XML, body)
}

// ---- admin control surface -------------------------------------------------

#[get("/admin/status")]
pub fn admin_status(_admin: AdminUser, station: &State<Arc<RadioStation>>) -> Json<Value> {
    Json(station.admin_status())
}

#[get("/admin/library")]
pub fn library(_admin: AdminUser, station: &State<Arc<RadioStation>>) -> Json<Value> {
    let catalog = station.catalog_snapshot();
    Json(json!({
        "songs": catalog.songs,
        "jingles": catalog.jingles,
        "ads": catalog.ads,
    }))
}

#[derive(Deserialize)]
pub struct PlaybackCommand {
    action: String,
}

#[post("/admin/playback", data = "<command>")]
pub fn control_playback(
    _admin: AdminUser,
    station: &State<Arc<RadioStation>>,
    command: Json<PlaybackCommand>,
) -> Result<Json<Value>, Status> {
    match command.action.as_str() {
        "start" => station.start_playback(),
        "stop" => station.stop_playback(),
        _ => return Err(Status::BadRequest),
    }
    Ok(Json(json!({ "status": "success" })))
}

#[derive(Deserialize)]
pub struct PlaybackSettings {
    playback_mode: String,
    jingle_interval: u32,
    ad_interval: u32,
}

#[post("/admin/settings/playback", data = "<settings>")]
pub fn playback_settings(
    _admin: AdminUser,
    station: &State<Arc<RadioStation>>,
    settings: Json<PlaybackSettings>,
) -> Result<Json<Value>, Status> {
    let Some(mode) = PlaybackMode::parse(&settings.playback_mode) else {
        return Err(Status::BadRequest);
    };
    station.set_playback_mode(mode);
    station.set_intervals(settings.jingle_interval, settings.ad_interval);
    Ok(Json(json!({ "status": "success" })))
}

#[derive(Deserialize)]
pub struct GeneralSettings {
    radio_name: String,
}

#[post("/admin/settings/general", data = "<settings>")]
pub fn general_settings(
    _admin: AdminUser,
    station: &State<Arc<RadioStation>>,
    settings: Json<GeneralSettings>,
) -> Result<Json<Value>, Status> {
    let name = settings.radio_name.trim();
    if name.is_empty() {
        return Err(Status::BadRequest);
    }
    station.set_radio_name(name).map_err(|e| {
        log::error!("Failed to persist settings: {}", e);
        Status::InternalServerError
    })?;
    Ok(Json(json!({ "status": "success" })))
}

/// Credential updates: empty fields keep the current value so a username
/// can change without re-entering the password.
#[derive(Deserialize)]
pub struct CredentialUpdate {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[post("/admin/settings/live", data = "<update>")]
pub fn live_credentials(
    _admin: AdminUser,
    station: &State<Arc<RadioStation>>,
    update: Json<CredentialUpdate>,
) -> Result<Json<Value>, Status> {
    station
        .set_live_credentials(&update.username, &update.password)
        .map_err(|e| {
            log::error!("Failed to persist settings: {}", e);
            Status::InternalServerError
        })?;
    Ok(Json(json!({ "status": "success" })))
}

#[post("/admin/settings/admin", data = "<update>")]
pub fn admin_credentials(
    _admin: AdminUser,
    station: &State<Arc<RadioStation>>,
    update: Json<CredentialUpdate>,
) -> Result<Json<Value>, Status> {
    station
        .set_admin_credentials(&update.username, &update.password)
        .map_err(|e| {
            log::error!("Failed to persist settings: {}", e);
            Status::InternalServerError
        })?;
    Ok(Json(json!({ "status": "success" })))
}

#[derive(Deserialize)]
pub struct ReorderRequest {
    #[serde(rename = "type")]
    list: String,
    order: Vec<String>,
}

#[post("/admin/reorder", data = "<request>")]
pub fn reorder(
    _admin: AdminUser,
    station: &State<Arc<RadioStation>>,
    request: Json<ReorderRequest>,
) -> Result<Json<Value>, Status> {
    let Some(kind) = MediaKind::from_list_name(&request.list) else {
        return Err(Status::BadRequest);
    };
    station.save_order(kind, &request.order).map_err(|e| {
        log::error!("Failed to persist {} order: {}", kind.label(), e);
        Status::InternalServerError
    })?;
    Ok(Json(json!({ "status": "success" })))
}

#[post("/admin/rescan")]
pub fn rescan(_admin: AdminUser, station: &State<Arc<RadioStation>>) -> Json<Value> {
    station.rescan_all();
    Json(json!({ "status": "success" }))
}

// ---- error catchers --------------------------------------------------------

#[catch(404)]
pub fn not_found() -> Json<Value> {
    Json(json!({ "error": "not found" }))
}

#[catch(401)]
pub fn unauthorized() -> Json<Value> {
    Json(json!({ "error": "authorization required" }))
}

#[catch(500)]
pub fn server_error() -> Json<Value> {
    Json(json!({ "error": "internal server error" }))
}
