//! Share-target endpoint.
//!
//! The OS "share to this app" action POSTs `title`, `text` and `url` fields.
//! The handler extracts them and redirects to the shell with `?shared=true`.

use bytes::Bytes;
use datacrypt_net::{Request, Response};
use http::StatusCode;
use mime::Mime;
use serde::{Deserialize, Serialize};

use crate::error::{CacheControllerError, Result};

/// Where the page is sent after a successful share.
pub const SHARED_REDIRECT: &str = "/?shared=true";

/// Where the page is sent when the share could not be read.
pub const FAILED_REDIRECT: &str = "/";

/// Fields of a share action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedPayload {
    pub title: Option<String>,
    pub text: Option<String>,
    pub url: Option<String>,
}

impl SharedPayload {
    fn assign(&mut self, name: &str, value: String) {
        let value = Some(value).filter(|v| !v.trim().is_empty());
        match name {
            "title" => self.title = value,
            "text" => self.text = value,
            "url" => self.url = value,
            _ => {}
        }
    }
}

/// Parse the form body of a share-target POST.
pub async fn parse_share_request(request: &Request) -> Result<SharedPayload> {
    let content_type: Mime = request
        .header_str("content-type")
        .ok_or_else(|| CacheControllerError::Share("missing content type".to_string()))?
        .parse()
        .map_err(|e: mime::FromStrError| CacheControllerError::Share(e.to_string()))?;

    let body = request.body.clone().unwrap_or_default();

    let (kind, subtype) = (content_type.type_(), content_type.subtype());
    if kind == mime::MULTIPART && subtype == mime::FORM_DATA {
        parse_multipart(&content_type, body).await
    } else if kind == mime::APPLICATION && subtype == mime::WWW_FORM_URLENCODED {
        Ok(parse_urlencoded(&body))
    } else {
        Err(CacheControllerError::Share(format!(
            "unsupported content type {}",
            content_type
        )))
    }
}

/// Redirect answering a share-target POST.
pub fn share_redirect(request: &Request, location: &str) -> Result<Response> {
    Ok(Response::redirect(
        request.url.clone(),
        location,
        StatusCode::SEE_OTHER,
    )?)
}

async fn parse_multipart(content_type: &Mime, body: Bytes) -> Result<SharedPayload> {
    let boundary = multer::parse_boundary(content_type.as_ref()).map_err(share_error)?;
    let stream = futures::stream::once(async move { Ok::<Bytes, std::io::Error>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    let mut payload = SharedPayload::default();
    while let Some(field) = multipart.next_field().await.map_err(share_error)? {
        // Shared files are left for the page to request separately.
        if field.file_name().is_some() {
            continue;
        }
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let value = field.text().await.map_err(share_error)?;
        payload.assign(&name, value);
    }
    Ok(payload)
}

fn parse_urlencoded(body: &[u8]) -> SharedPayload {
    let mut payload = SharedPayload::default();
    for (name, value) in url::form_urlencoded::parse(body) {
        payload.assign(&name, value.into_owned());
    }
    payload
}

fn share_error(e: multer::Error) -> CacheControllerError {
    CacheControllerError::Share(e.to_string())
}
