use actix_web::{web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{staff_validator, AuthUser},
    availability::compute_available_dates,
    booking::{self, AppointmentInput, AppointmentUpdateInput, UpdateOutcome},
    catalog::load_slot_context,
    db,
    error::BookingError,
    models::ServiceRequest,
    state::AppState,
};

const DEFAULT_WINDOW_DAYS: i64 = 30;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AvailabilityQuery {
    #[serde(default)]
    service_ids: Vec<String>,
    from_date: String,
    #[serde(default)]
    window_days: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SlotsQuery {
    date: String,
    #[serde(default)]
    services: Vec<ServiceRequest>,
    #[serde(default)]
    exclude_appointment_id: Option<String>,
}

#[derive(Deserialize)]
struct AppointmentId {
    id: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/appointments")
            .wrap(HttpAuthentication::basic(staff_validator))
            .service(web::resource("/availability").route(web::post().to(available_dates)))
            .service(web::resource("/availability/slots").route(web::post().to(available_slots)))
            .service(web::resource("/create").route(web::post().to(create)))
            .service(web::resource("/get-all").route(web::get().to(get_all)))
            .service(web::resource("/get-by-id").route(web::get().to(get_by_id)))
            .service(web::resource("/update").route(web::put().to(update)))
            .service(web::resource("/delete").route(web::delete().to(delete))),
    );
}

async fn available_dates(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    body: web::Json<AvailabilityQuery>,
) -> Result<HttpResponse, BookingError> {
    let body = body.into_inner();
    let window_days = body.window_days.unwrap_or(DEFAULT_WINDOW_DAYS);
    let dates = compute_available_dates(
        &state.db,
        &auth.business_id,
        &body.service_ids,
        &body.from_date,
        window_days,
    )
    .await?;
    Ok(HttpResponse::Ok().json(json!({ "dates": dates })))
}

async fn available_slots(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    body: web::Json<SlotsQuery>,
) -> Result<HttpResponse, BookingError> {
    let body = body.into_inner();
    let ctx = load_slot_context(
        &state.db,
        &auth.business_id,
        &body.date,
        &body.services,
        body.exclude_appointment_id.as_deref(),
    )
    .await?;

    // A closed day is an empty result, not an error.
    let slots = ctx.map(|ctx| ctx.compute_slots()).unwrap_or_default();
    Ok(HttpResponse::Ok().json(json!({ "slots": slots })))
}

async fn create(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    body: web::Json<AppointmentInput>,
) -> Result<HttpResponse, BookingError> {
    let appointment =
        booking::create_appointment(&state, &auth.business_id, &body.into_inner()).await?;
    Ok(HttpResponse::Created().json(json!({
        "msg": "Appointment created successfully",
        "appointment": appointment
    })))
}

async fn get_all(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse, BookingError> {
    let appointments = db::fetch_appointments(&state.db, &auth.business_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "appointments": appointments })))
}

async fn get_by_id(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    query: web::Query<AppointmentId>,
) -> Result<HttpResponse, BookingError> {
    let appointment = db::fetch_appointment(&state.db, &auth.business_id, &query.id)
        .await?
        .ok_or(BookingError::AppointmentNotFound)?;
    Ok(HttpResponse::Ok().json(json!({ "appointment": appointment })))
}

async fn update(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    body: web::Json<AppointmentUpdateInput>,
) -> Result<HttpResponse, BookingError> {
    match booking::update_appointment(&state, &auth.business_id, &body.into_inner()).await? {
        UpdateOutcome::Updated(appointment) => {
            Ok(HttpResponse::Created().json(json!({ "appointment": appointment })))
        }
        UpdateOutcome::Unchanged(notice) => Ok(HttpResponse::Ok().json(notice)),
    }
}

async fn delete(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    body: web::Json<AppointmentId>,
) -> Result<HttpResponse, BookingError> {
    let notice = booking::cancel_appointment(&state, &auth.business_id, &body.id).await?;
    Ok(HttpResponse::Ok().json(notice))
}
