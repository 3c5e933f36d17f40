use crate::controller::ImportController;
use actix_web::{web, HttpResponse, Responder, ResponseError};

pub async fn process(controller: web::Data<ImportController>) -> impl Responder {
    match controller.mapping() {
        Ok(mapping) => HttpResponse::Ok().json(mapping),
        Err(e) => e.error_response(),
    }
}
