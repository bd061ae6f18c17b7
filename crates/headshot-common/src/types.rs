use std::{fmt, path::Path};

use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{HeadshotError, Result};

pub const SUPPORTED_IMAGE_TYPES: [&str; 3] = ["image/png", "image/jpeg", "image/webp"];

/// The uploaded photo every job of a session is generated from.
///
/// Cloning is cheap: the payload is reference counted and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    mime_type: String,
    data: Bytes,
}

impl SourceImage {
    pub fn from_bytes(mime_type: &str, data: impl Into<Bytes>) -> Result<Self> {
        let mime_type = normalize_mime(mime_type)?;
        let data = data.into();
        if data.is_empty() {
            return Err(HeadshotError::UnsupportedImage(
                "image payload is empty".to_string(),
            ));
        }
        Ok(Self { mime_type, data })
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let mime_type = match extension.as_str() {
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "webp" => "image/webp",
            other => {
                return Err(HeadshotError::UnsupportedImage(format!(
                    "unrecognised image extension {other:?} for {}",
                    path.display()
                )));
            }
        };
        let data = tokio::fs::read(path).await?;
        Self::from_bytes(mime_type, data)
    }

    pub fn from_data_url(url: &str) -> Result<Self> {
        let (mime_type, data) = parse_data_url(url)?;
        Self::from_bytes(mime_type, data)
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn base64_data(&self) -> String {
        STANDARD.encode(&self.data)
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64_data())
    }
}

/// Where a generated image can be retrieved from: a `data:` URL or an
/// `http(s)` URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultLocator(String);

impl ResultLocator {
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    pub fn from_inline(mime_type: &str, base64_data: &str) -> Self {
        Self(format!("data:{mime_type};base64,{base64_data}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_data_url(&self) -> bool {
        self.0.starts_with("data:")
    }

    pub fn is_remote(&self) -> bool {
        self.0.starts_with("http://") || self.0.starts_with("https://")
    }

    pub fn decode_inline(&self) -> Result<(String, Vec<u8>)> {
        let (mime_type, data) = parse_data_url(&self.0)?;
        Ok((mime_type.to_string(), data))
    }
}

impl fmt::Display for ResultLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_data_url() {
            // Inline payloads are megabytes of base64.
            let header = self.0.split_once(',').map_or(self.0.as_str(), |(head, _)| head);
            write!(f, "{header},…")
        } else {
            f.write_str(&self.0)
        }
    }
}

fn parse_data_url(url: &str) -> Result<(&str, Vec<u8>)> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| HeadshotError::InvalidArgument("not a data URL".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| HeadshotError::InvalidArgument("data URL has no payload".to_string()))?;
    let mime_type = header.strip_suffix(";base64").ok_or_else(|| {
        HeadshotError::InvalidArgument("only base64 data URLs are supported".to_string())
    })?;
    let data = STANDARD.decode(payload.trim()).map_err(|err| {
        HeadshotError::InvalidArgument(format!("data URL payload is not valid base64: {err}"))
    })?;
    Ok((mime_type, data))
}

fn normalize_mime(mime_type: &str) -> Result<String> {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    let essence = if essence == "image/jpg" {
        "image/jpeg".to_string()
    } else {
        essence
    };

    if SUPPORTED_IMAGE_TYPES.contains(&essence.as_str()) {
        Ok(essence)
    } else {
        Err(HeadshotError::UnsupportedImage(format!(
            "content type {mime_type:?} is not one of {}",
            SUPPORTED_IMAGE_TYPES.join(", ")
        )))
    }
}
