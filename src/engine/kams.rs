//! Kams upload flow: bearer token from localStorage, upload, then details.

use super::http::{FormField, StepRequest, StepResponse};
use super::{ensure_logged_in, extract_nothing, first_value, Flow, ReplayContext, ReplayError, Step};
use crate::model::Platform;
use crate::session::AuthState;
use serde_json::json;

const UPLOAD_TIMEZONE: &str = "America/Bogota";

pub(super) fn flow() -> Flow {
    Flow {
        platform: Platform::Kams,
        seed,
        steps: vec![
            Step {
                name: "open_page",
                build: open_page,
                extract: check_page,
            },
            Step {
                name: "upload_video",
                build: upload_video,
                extract: extract_video_id,
            },
            Step {
                name: "upload_details",
                build: upload_details,
                extract: extract_nothing,
            },
        ],
        outputs: &["video_id"],
    }
}

fn seed(auth: &AuthState, ctx: &mut ReplayContext) -> Result<(), ReplayError> {
    let domain = Platform::Kams.domain();
    let token = auth
        .find_storage_value(domain, &["token", "auth"])
        .filter(|t| !t.is_empty())
        .ok_or(ReplayError::MissingCredential("authorization token in localStorage"))?;
    ctx.set("auth_token", token);
    ctx.set("cookie", auth.cookie_header(domain));
    Ok(())
}

fn open_page(ctx: &ReplayContext) -> Result<StepRequest, ReplayError> {
    Ok(StepRequest::get(format!("{}/upload", ctx.endpoints.web))
        .header_opt("cookie", ctx.get_or_empty("cookie")))
}

fn check_page(resp: &StepResponse, _: &mut ReplayContext) -> Result<(), ReplayError> {
    ensure_logged_in(resp)
}

fn upload_video(ctx: &ReplayContext) -> Result<StepRequest, ReplayError> {
    let video = ctx.video()?;
    Ok(StepRequest::post(format!("{}/v1/videos/upload", ctx.endpoints.api))
        .header("accept", "application/json, text/plain, */*")
        .header("authorization", format!("Bearer {}", ctx.get("auth_token")?))
        .multipart(vec![FormField::File {
            name: "video",
            file_name: video.file_name.clone(),
            mime: video.mime.clone(),
            data: video.data.clone(),
        }]))
}

fn extract_video_id(resp: &StepResponse, ctx: &mut ReplayContext) -> Result<(), ReplayError> {
    let body = resp.json().unwrap_or_default();
    let id = first_value(&body, &["id", "videoId", "data.id"])
        .ok_or_else(|| ReplayError::missing_field("videoId", resp))?;
    ctx.set_value("video_id", id);
    Ok(())
}

fn upload_details(ctx: &ReplayContext) -> Result<StepRequest, ReplayError> {
    let payload = json!({
        "videoId": ctx.value("video_id")?,
        "title": ctx.job.title,
        "tags": ctx.job.tags,
        "is_nsfw": true,
        "uploadDate": "",
        "uploadDateTimezone": UPLOAD_TIMEZONE,
    });
    Ok(
        StepRequest::post(format!("{}/v1/videos/upload-details", ctx.endpoints.api))
            .header("accept", "application/json")
            .header("authorization", format!("Bearer {}", ctx.get("auth_token")?))
            .json(payload),
    )
}
