//! OpenAPI documentation, served at `/api/openapi.json` and browsable at `/docs`.

use utoipa::OpenApi;

use crate::error;
use crate::handlers;
use weave_core::models;

pub fn openapi_spec() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "StyleWeave API",
        version = "0.1.0",
        description = "Upload model photos and fabric swatches, generate body-region masks, render fast texture previews and queue diffusion-based HD renders. Domain endpoints live under /v1/."
    ),
    paths(
        handlers::health::liveness,
        handlers::health::readiness,
        handlers::upload::upload_image,
        handlers::mask::generate_masks,
        handlers::outfit::apply_preview,
        handlers::outfit::generate_hd,
        handlers::jobs::get_job,
        handlers::jobs::list_jobs,
    ),
    components(schemas(
        error::ErrorResponse,
        models::Upload,
        models::UploadType,
        models::StoredImage,
        models::Job,
        models::JobType,
        models::JobStatus,
        models::PreviewParams,
        models::HdRenderParams,
        handlers::upload::UploadResponse,
        handlers::mask::MaskGenerateRequest,
        handlers::mask::MaskGenerateResponse,
        handlers::mask::GeneratedMask,
        handlers::outfit::HdJobAccepted,
        handlers::jobs::JobListResponse,
    )),
    tags(
        (name = "health", description = "Liveness and readiness probes"),
        (name = "uploads", description = "Input images"),
        (name = "masks", description = "Region mask generation"),
        (name = "outfit", description = "Preview and HD compositing"),
        (name = "jobs", description = "Job status and history")
    )
)]
pub struct ApiDoc;
