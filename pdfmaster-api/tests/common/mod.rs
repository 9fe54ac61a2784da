//! Shared helpers for API integration tests

#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, Response};
use axum::Router;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use pdfmaster::{images_to_pdf, ArtifactStore, MemorySink, RasterImage, SequentialIds};
use pdfmaster_api::{app, AppState};

pub const BOUNDARY: &str = "----WebKitFormBoundary7MA4YWxkTrZu0gW";

/// One part of a multipart form
pub enum Part {
    File {
        name: &'static str,
        filename: String,
        content_type: &'static str,
        bytes: Vec<u8>,
    },
    Text {
        name: &'static str,
        value: String,
    },
}

impl Part {
    pub fn pdf(name: &'static str, filename: &str, bytes: Vec<u8>) -> Self {
        Part::File {
            name,
            filename: filename.to_string(),
            content_type: "application/pdf",
            bytes,
        }
    }

    pub fn file(
        name: &'static str,
        filename: &str,
        content_type: &'static str,
        bytes: Vec<u8>,
    ) -> Self {
        Part::File {
            name,
            filename: filename.to_string(),
            content_type,
            bytes,
        }
    }

    pub fn text(name: &'static str, value: &str) -> Self {
        Part::Text {
            name,
            value: value.to_string(),
        }
    }
}

/// Router over an in-memory sink, returned so tests can check cleanup
pub fn test_app() -> (Router, Arc<MemorySink>) {
    test_app_with(|state| state)
}

pub fn test_app_with(configure: impl FnOnce(AppState) -> AppState) -> (Router, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let store = ArtifactStore::new(sink.clone(), Arc::new(SequentialIds::default()));
    (app(configure(AppState::new(store))), sink)
}

/// Build a multipart POST request to `uri`
pub fn multipart_request(uri: &str, parts: Vec<Part>) -> Request<Body> {
    let mut body = Vec::new();

    for part in parts {
        write!(body, "--{}\r\n", BOUNDARY).unwrap();
        match part {
            Part::File {
                name,
                filename,
                content_type,
                bytes,
            } => {
                write!(
                    body,
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n"
                )
                .unwrap();
                write!(body, "Content-Type: {content_type}\r\n\r\n").unwrap();
                body.extend_from_slice(&bytes);
            }
            Part::Text { name, value } => {
                write!(body, "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").unwrap();
                body.extend_from_slice(value.as_bytes());
            }
        }
        write!(body, "\r\n").unwrap();
    }
    write!(body, "--{}--\r\n", BOUNDARY).unwrap();

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

/// A PDF with one page per width; page `i` is `widths[i] * 0.72` points wide.
pub fn test_pdf(widths: &[u32]) -> Vec<u8> {
    let images: Vec<RasterImage> = widths
        .iter()
        .map(|&w| RasterImage::new(DynamicImage::new_rgb8(w, 100), None))
        .collect();
    images_to_pdf(&images).unwrap().into_bytes().unwrap()
}

/// Encoded `width` x `height` image filled with `color`
pub fn test_image(width: u32, height: u32, color: [u8; 4], format: ImageFormat) -> Vec<u8> {
    let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba(color)));
    let image = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8()),
        _ => image,
    };
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
    bytes
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub fn header<'a>(response: &'a Response<Body>, name: &str) -> &'a str {
    response
        .headers()
        .get(name)
        .unwrap_or_else(|| panic!("missing header {name}"))
        .to_str()
        .unwrap()
}
