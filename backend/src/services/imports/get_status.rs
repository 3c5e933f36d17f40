use crate::controller::ImportController;
use actix_web::{web, HttpResponse, Responder, ResponseError};

pub(crate) async fn process(
    run_id: web::Path<String>,
    controller: web::Data<ImportController>,
) -> impl Responder {
    match controller.status(&run_id.into_inner()) {
        Ok(report) => HttpResponse::Ok().json(report),
        Err(e) => e.error_response(),
    }
}
