//! XxxFollow upload flow.
//!
//! The media upload and the post are separate resources: the video is pushed
//! to the upload host with a short-lived upload token, an empty post is
//! created, and the uploaded media is then attached to that post.

use super::http::{FormField, StepRequest, StepResponse};
use super::{ensure_logged_in, first_id, Flow, ReplayContext, ReplayError, Step};
use crate::model::Platform;
use crate::session::AuthState;
use serde_json::json;

pub(super) fn flow() -> Flow {
    Flow {
        platform: Platform::XxxFollow,
        seed,
        steps: vec![
            Step {
                name: "open_page",
                build: open_page,
                extract: check_page,
            },
            Step {
                name: "upload_token",
                build: upload_token,
                extract: extract_upload_token,
            },
            Step {
                name: "upload_media",
                build: upload_media,
                extract: extract_media_ticket,
            },
            Step {
                name: "create_post",
                build: create_post,
                extract: extract_post_id,
            },
            Step {
                name: "attach_media",
                build: attach_media,
                extract: extract_media_id,
            },
        ],
        outputs: &["post_id", "media_id"],
    }
}

fn seed(auth: &AuthState, ctx: &mut ReplayContext) -> Result<(), ReplayError> {
    let domain = Platform::XxxFollow.domain();
    let auth_id = auth
        .cookie(domain, "x-auth-id")
        .ok_or(ReplayError::MissingCredential("x-auth-id cookie"))?;
    let csrf = auth
        .cookie(domain, "XSRF-TOKEN")
        .or_else(|| auth.cookie(domain, "x-csrf-token"))
        .ok_or(ReplayError::MissingCredential("XSRF-TOKEN cookie"))?;
    let user_id = auth
        .find_storage_json_id(domain, "user")
        .ok_or(ReplayError::MissingCredential("user id in localStorage"))?;

    ctx.set("auth_id", auth_id);
    ctx.set("csrf_token", csrf);
    ctx.set_value("user_id", user_id);
    ctx.set("cookie", auth.cookie_header(domain));
    Ok(())
}

fn open_page(ctx: &ReplayContext) -> Result<StepRequest, ReplayError> {
    Ok(StepRequest::get(format!("{}/post", ctx.endpoints.web))
        .header_opt("cookie", ctx.get_or_empty("cookie")))
}

fn check_page(resp: &StepResponse, _: &mut ReplayContext) -> Result<(), ReplayError> {
    ensure_logged_in(resp)
}

fn upload_token(ctx: &ReplayContext) -> Result<StepRequest, ReplayError> {
    let web = &ctx.endpoints.web;
    Ok(StepRequest::get(format!("{web}/api/v1/upload-token"))
        .header("referer", format!("{web}/post"))
        .header_opt("cookie", ctx.get_or_empty("cookie")))
}

fn extract_upload_token(resp: &StepResponse, ctx: &mut ReplayContext) -> Result<(), ReplayError> {
    let body = resp.json().unwrap_or_default();
    let token = first_id(&body, &["token"]).ok_or_else(|| ReplayError::missing_field("token", resp))?;
    ctx.set("upload_token", token);
    Ok(())
}

fn upload_media(ctx: &ReplayContext) -> Result<StepRequest, ReplayError> {
    let video = ctx.video()?;
    let size = video.size();
    let web = &ctx.endpoints.web;
    Ok(
        StepRequest::post(format!("{}/api/v1/video/fans-media", ctx.endpoints.upload))
            .header("upload-token", ctx.get("upload_token")?)
            .header(
                "content-range",
                format!("bytes 0-{}/{}", size.saturating_sub(1), size),
            )
            .header("origin", web.clone())
            .header("referer", format!("{web}/"))
            .multipart(vec![FormField::File {
                name: "file",
                file_name: video.file_name.clone(),
                mime: video.mime.clone(),
                data: video.data.clone(),
            }]),
    )
}

fn extract_media_ticket(resp: &StepResponse, ctx: &mut ReplayContext) -> Result<(), ReplayError> {
    let body = resp.json().unwrap_or_default();
    let tkn = first_id(&body, &["token"]).ok_or_else(|| ReplayError::missing_field("token", resp))?;
    let srv = first_id(&body, &["server"]).ok_or_else(|| ReplayError::missing_field("server", resp))?;
    ctx.set("tkn", tkn);
    ctx.set("srv_id", srv);
    Ok(())
}

fn create_post(ctx: &ReplayContext) -> Result<StepRequest, ReplayError> {
    let payload = json!({
        "access": "free",
        "gender": "f",
        "scheduled_at": null,
        "tags": ctx.job.tag_list(),
        "text": ctx.job.title,
        "type": "public",
        "user_id": ctx.value("user_id")?,
    });
    Ok(StepRequest::post(format!("{}/api/v1/post", ctx.endpoints.web))
        .header("x-auth-id", ctx.get("auth_id")?)
        .header("x-csrf-token", ctx.get("csrf_token")?)
        .header_opt("cookie", ctx.get_or_empty("cookie"))
        .json(payload))
}

fn extract_post_id(resp: &StepResponse, ctx: &mut ReplayContext) -> Result<(), ReplayError> {
    let body = resp.json().unwrap_or_default();
    let id = first_id(&body, &["id"]).ok_or_else(|| ReplayError::missing_field("id", resp))?;
    ctx.set("post_id", id);
    Ok(())
}

fn attach_media(ctx: &ReplayContext) -> Result<StepRequest, ReplayError> {
    let url = format!(
        "{}/api/v1/post/{}/media/upload",
        ctx.endpoints.web,
        ctx.get("post_id")?
    );
    Ok(StepRequest::post(url)
        .header("x-auth-id", ctx.get("auth_id")?)
        .header("x-csrf-token", ctx.get("csrf_token")?)
        .header_opt("cookie", ctx.get_or_empty("cookie"))
        .multipart(vec![
            FormField::Text {
                name: "tkn",
                value: ctx.get("tkn")?.to_string(),
            },
            FormField::Text {
                name: "srv_id",
                value: ctx.get("srv_id")?.to_string(),
            },
            FormField::Text {
                name: "video_volume",
                value: "1".to_string(),
            },
        ]))
}

fn extract_media_id(resp: &StepResponse, ctx: &mut ReplayContext) -> Result<(), ReplayError> {
    // Some responses omit the media id; the attach itself already succeeded.
    if let Some(id) = resp.json().and_then(|b| first_id(&b, &["media_id", "id"])) {
        ctx.set("media_id", id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::tests::{endpoints_for, job};
    use super::super::http::RequestBody;
    use super::super::{ReplayEngine, VideoFile};
    use super::*;
    use bytes::Bytes;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session() -> AuthState {
        serde_json::from_value(json!({
            "cookies": [
                {"name": "x-auth-id", "value": "auth-1", "domain": ".xxxfollow.com", "path": "/", "expires": -1},
                {"name": "XSRF-TOKEN", "value": "csrf-1", "domain": ".xxxfollow.com", "path": "/", "expires": -1}
            ],
            "origins": [{"origin": "https://www.xxxfollow.com", "localStorage": [
                {"name": "user", "value": "{\"id\": 77}"}
            ]}]
        }))
        .unwrap()
    }

    fn context(server: &MockServer) -> ReplayContext {
        ReplayContext::new(endpoints_for(server), job(Platform::XxxFollow))
            .with_video(VideoFile::new("clip.mp4", Bytes::from_static(b"0123456789")))
    }

    async fn mount_until_post(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/post"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/upload-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "up-1"})))
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/video/fans-media"))
            .and(header("upload-token", "up-1"))
            .and(header("content-range", "bytes 0-9/10"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"token": "tkn-1", "server": 3})),
            )
            .expect(1)
            .mount(server)
            .await;
    }

    #[test]
    fn seed_falls_back_to_csrf_cookie() {
        let mut auth = session();
        auth.cookies[1].name = "x-csrf-token".into();
        let mut ctx = ReplayContext::new(
            Platform::XxxFollow.default_endpoints(),
            job(Platform::XxxFollow),
        );
        seed(&auth, &mut ctx).unwrap();
        assert_eq!(ctx.get("csrf_token").unwrap(), "csrf-1");
        assert_eq!(ctx.value("user_id").unwrap(), &json!(77));
    }

    #[test]
    fn post_body_keeps_user_id_type() {
        let mut auth = session();
        auth.origins[0].local_storage[0].value = r#"{"id": "u-77"}"#.into();
        let mut ctx = ReplayContext::new(
            Platform::XxxFollow.default_endpoints(),
            job(Platform::XxxFollow),
        );
        seed(&auth, &mut ctx).unwrap();
        let req = create_post(&ctx).unwrap();
        match req.body {
            RequestBody::Json(body) => assert_eq!(body["user_id"], json!("u-77")),
            _ => panic!("create_post should send JSON"),
        }

        seed(&session(), &mut ctx).unwrap();
        match create_post(&ctx).unwrap().body {
            RequestBody::Json(body) => assert_eq!(body["user_id"], json!(77)),
            _ => panic!("create_post should send JSON"),
        }
    }

    #[test]
    fn seed_requires_user_id() {
        let mut auth = session();
        auth.origins.clear();
        let mut ctx = ReplayContext::new(
            Platform::XxxFollow.default_endpoints(),
            job(Platform::XxxFollow),
        );
        let err = seed(&auth, &mut ctx).unwrap_err();
        assert!(matches!(err, ReplayError::MissingCredential(_)));
    }

    #[tokio::test]
    async fn full_flow_reports_post_and_media_ids() {
        let server = MockServer::start().await;
        mount_until_post(&server).await;
        Mock::given(method("POST"))
            .and(path("/api/v1/post"))
            .and(header("x-auth-id", "auth-1"))
            .and(header("x-csrf-token", "csrf-1"))
            .and(body_json(json!({
                "access": "free",
                "gender": "f",
                "scheduled_at": null,
                "tags": ["a", "b"],
                "text": "Hello",
                "type": "public",
                "user_id": 77
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 5001})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/post/5001/media/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"media_id": "m-9"})))
            .expect(1)
            .mount(&server)
            .await;

        let flow = flow();
        let mut ctx = context(&server);
        (flow.seed)(&session(), &mut ctx).unwrap();
        ReplayEngine::new("test")
            .unwrap()
            .run(&flow.steps, &mut ctx)
            .await
            .unwrap();

        let ids = flow.collect_ids(&ctx);
        assert_eq!(ids.get("post_id").map(String::as_str), Some("5001"));
        assert_eq!(ids.get("media_id").map(String::as_str), Some("m-9"));
        assert_eq!(ctx.get("srv_id").unwrap(), "3");
    }

    #[tokio::test]
    async fn failed_post_creation_skips_attach() {
        let server = MockServer::start().await;
        mount_until_post(&server).await;
        Mock::given(method("POST"))
            .and(path("/api/v1/post"))
            .respond_with(ResponseTemplate::new(403).set_body_string("{\"error\":\"csrf\"}"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/post/5001/media/upload"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let flow = flow();
        let mut ctx = context(&server);
        (flow.seed)(&session(), &mut ctx).unwrap();
        let err = ReplayEngine::new("test")
            .unwrap()
            .run(&flow.steps, &mut ctx)
            .await
            .unwrap_err();
        assert_eq!(err.step, "create_post");
        assert!(matches!(err.error, ReplayError::Status { status: 403, .. }));
        // the uploaded media ticket stays in the context; nothing is rolled back
        assert_eq!(ctx.get("tkn").unwrap(), "tkn-1");
        assert!(flow.collect_ids(&ctx).is_empty());
    }
}
