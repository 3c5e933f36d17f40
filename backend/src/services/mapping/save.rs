use crate::controller::ImportController;
use actix_web::{web, HttpResponse, Responder, ResponseError};
use common::requests::SaveMappingRequest;

pub async fn process(
    payload: web::Json<SaveMappingRequest>,
    controller: web::Data<ImportController>,
) -> impl Responder {
    match controller.save_mapping(payload.into_inner().mapping) {
        Ok(mapping) => HttpResponse::Ok().json(mapping),
        Err(e) => e.error_response(),
    }
}

pub async fn reset(controller: web::Data<ImportController>) -> impl Responder {
    match controller.reset_mapping() {
        Ok(mapping) => HttpResponse::Ok().json(mapping),
        Err(e) => e.error_response(),
    }
}
