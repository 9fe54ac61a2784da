use axum::{
    extract::{rejection::QueryRejection, DefaultBodyLimit, Json, Multipart, Query, State},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
        HeaderName, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use pdfmaster::{
    assemble::MIN_MERGE_INPUTS,
    compress, compress_only, convert, export_pages, images_to_pdf, merge, package,
    parse_dimension, parse_page_selection,
    raster::DEFAULT_DPI,
    resize, split,
    word::DOCX_MEDIA_TYPE,
    ConversionArtifact, Diagnostics, Document, DocumentInfo, ImageKind, PageImageFormat, Quality,
    RasterImage, ResizeRequest, SplitMode, PDF_MEDIA_TYPE,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info};

use crate::error::AppError;
use crate::state::AppState;
use crate::upload::{parse_bool, UploadForm};

/// Quality used when re-encoding resized and converted images
const REENCODE_QUALITY: i64 = 95;

/// Query parameters of the PDF compression endpoint
#[derive(Debug, Default, Deserialize)]
pub struct PdfCompressParams {
    /// Accepted for compatibility; compression is lossless
    pub quality: Option<i64>,
}

/// Query parameters of the image compression endpoint
#[derive(Debug, Default, Deserialize)]
pub struct ImageCompressParams {
    pub quality: Option<i64>,
    pub format: Option<String>,
}

/// Query parameters of the image conversion endpoint
#[derive(Debug, Default, Deserialize)]
pub struct ConvertParams {
    pub target_format: Option<String>,
}

/// Response for the PDF info endpoint
#[derive(Debug, Serialize)]
pub struct PdfInfoResponse {
    pub filename: String,
    pub pages: usize,
    pub file_size: u64,
    pub metadata: DocumentInfo,
}

/// Build the application router with all routes configured
pub fn app(state: AppState) -> Router {
    let body_limit = state.limits.max_upload_bytes;

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        // PDF operations
        .route("/api/v1/pdf/merge", post(merge_pdfs))
        .route("/api/v1/pdf/split", post(split_pdf))
        .route("/api/v1/pdf/compress", post(compress_pdf))
        .route("/api/v1/pdf/info", post(pdf_info))
        .route("/api/v1/pdf/to-jpg", post(pdf_to_images))
        .route("/api/v1/pdf/from-jpg", post(images_to_pdf_handler))
        .route("/api/v1/pdf/to-word", post(pdf_to_word))
        // Image operations
        .route("/api/v1/image/compress", post(compress_image))
        .route("/api/v1/image/resize", post(resize_image))
        .route("/api/v1/image/convert", post(convert_image))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Service description with the endpoint map
pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "PDF Master API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "pdf": {
                "merge": "/api/v1/pdf/merge",
                "split": "/api/v1/pdf/split",
                "compress": "/api/v1/pdf/compress",
                "info": "/api/v1/pdf/info",
                "to_jpg": "/api/v1/pdf/to-jpg",
                "from_jpg": "/api/v1/pdf/from-jpg",
                "to_word": "/api/v1/pdf/to-word",
            },
            "image": {
                "compress": "/api/v1/image/compress",
                "resize": "/api/v1/image/resize",
                "convert": "/api/v1/image/convert",
            },
        },
    }))
}

/// Health check endpoint for monitoring and load balancing
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Merge 2 to `max_merge_files` PDFs, in upload order
pub async fn merge_pdfs(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let mut form = UploadForm::read(multipart).await?;
    let uploads = form.take_files("files");
    info!("Merging {} PDF files", uploads.len());

    if uploads.len() < MIN_MERGE_INPUTS {
        return Err(AppError::bad_request(format!(
            "At least {MIN_MERGE_INPUTS} PDF files are required"
        )));
    }
    let max_files = state.limits.max_merge_files;
    if uploads.len() > max_files {
        return Err(AppError::bad_request(format!(
            "Maximum {max_files} PDF files allowed"
        )));
    }
    for upload in &uploads {
        upload.require_pdf()?;
    }

    let artifact = blocking(move || {
        let documents = uploads
            .iter()
            .map(|upload| {
                let document = Document::from_bytes(&upload.filename, &upload.bytes)?;
                debug!("Added {} pages from {}", document.page_count(), upload.filename);
                Ok(document)
            })
            .collect::<pdfmaster::Result<Vec<_>>>()?;

        let merged = merge(&documents)?;
        let total_pages = merged.page_count();
        let bytes = merged.into_bytes()?;
        Ok(
            ConversionArtifact::new("merged.pdf", PDF_MEDIA_TYPE, bytes).with_diagnostics(
                Diagnostics {
                    total_pages: Some(total_pages),
                    ..Diagnostics::default()
                },
            ),
        )
    })
    .await?;

    deliver(&state, "merged", artifact).await
}

/// Split a PDF into single pages or extract a page range
pub async fn split_pdf(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let mut form = UploadForm::read(multipart).await?;
    let upload = form.take_file("file")?;
    let pages = form.text("pages").map(str::to_string);
    let mode_name = form.text("split_mode").unwrap_or_default();
    info!(
        "Splitting PDF: {}, mode: {mode_name}, pages: {pages:?}",
        upload.filename
    );

    upload.require_pdf()?;
    let mode: SplitMode = mode_name.parse()?;

    let packaged = blocking(move || {
        let document = Document::from_bytes(&upload.filename, &upload.bytes)?;
        let selection = match (mode, pages.as_deref()) {
            (SplitMode::Range, Some(spec)) => Some(
                parse_page_selection(spec, document.page_count()).map_err(pdfmaster::Error::from)?,
            ),
            _ => None,
        };

        let artifacts = split(&document, mode, selection.as_ref())?
            .into_iter()
            .map(|(name, part)| {
                let filename = match mode {
                    SplitMode::All => format!("{name}.pdf"),
                    SplitMode::Range => format!("{name}_{}.pdf", pages.as_deref().unwrap_or("")),
                };
                Ok(ConversionArtifact::new(filename, PDF_MEDIA_TYPE, part.into_bytes()?))
            })
            .collect::<pdfmaster::Result<Vec<_>>>()?;

        Ok(package(artifacts, "split_pages.zip")?)
    })
    .await?;

    deliver(&state, "split", packaged.into_artifact()).await
}

/// Losslessly recompress a PDF's content streams
pub async fn compress_pdf(
    State(state): State<AppState>,
    params: Result<Query<PdfCompressParams>, QueryRejection>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let Query(params) = params?;
    let mut form = UploadForm::read(multipart).await?;
    let upload = form.take_file("file")?;
    info!(
        "Compressing PDF: {}, quality: {}",
        upload.filename,
        params.quality.unwrap_or(50)
    );
    upload.require_pdf()?;

    let artifact = blocking(move || {
        let document = Document::from_bytes(&upload.filename, &upload.bytes)?;
        let outcome = compress(&document)?;
        let diagnostics = Diagnostics {
            original_size: Some(outcome.original_size),
            new_size: Some(outcome.compressed_size),
            reduction_percent: Some(outcome.reduction_percent()),
            ..Diagnostics::default()
        };
        Ok(ConversionArtifact::new(
            format!("compressed_{}", upload.filename),
            PDF_MEDIA_TYPE,
            outcome.bytes,
        )
        .with_diagnostics(diagnostics))
    })
    .await?;

    deliver(&state, "compressed", artifact).await
}

/// Page count, size and document information of a PDF
pub async fn pdf_info(multipart: Multipart) -> Result<Response, AppError> {
    let mut form = UploadForm::read(multipart).await?;
    let upload = form.take_file("file")?;

    let response = blocking(move || {
        let document = Document::from_bytes(&upload.filename, &upload.bytes)?;
        Ok(PdfInfoResponse {
            pages: document.page_count(),
            file_size: document.byte_len(),
            metadata: document.info(),
            filename: upload.filename,
        })
    })
    .await?;

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Render every page of a PDF to JPEG or PNG
pub async fn pdf_to_images(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let mut form = UploadForm::read(multipart).await?;
    let upload = form.take_file("file")?;
    let dpi = match form.text("dpi") {
        Some(raw) => raw
            .parse::<u32>()
            .map_err(|_| AppError::bad_request(format!("Invalid dpi '{raw}'")))?,
        None => DEFAULT_DPI,
    };
    let format = PageImageFormat::from_name(form.text("format").unwrap_or("jpg"));
    info!("Converting PDF to images: {}, DPI: {dpi}", upload.filename);
    upload.require_pdf()?;

    let rasterizer = state.rasterizer.clone();
    let artifact = blocking(move || {
        let document = Document::from_bytes(&upload.filename, &upload.bytes)?;
        let pages = export_pages(rasterizer.as_ref(), &document, dpi, format)?;
        let total_pages = pages.len();
        let mut artifact = package(pages, "pdf_images.zip")?.into_artifact();
        artifact.diagnostics.total_pages = Some(total_pages);
        Ok(artifact)
    })
    .await?;

    deliver(&state, "pdf_images", artifact).await
}

/// Build a PDF with one page per uploaded image
pub async fn images_to_pdf_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let mut form = UploadForm::read(multipart).await?;
    let uploads = form.take_files("files");
    info!("Converting {} images to PDF", uploads.len());
    if uploads.is_empty() {
        return Err(AppError::bad_request("At least 1 image required"));
    }

    let artifact = blocking(move || {
        let images = uploads
            .iter()
            .map(|upload| RasterImage::decode(&upload.filename, &upload.bytes))
            .collect::<pdfmaster::Result<Vec<_>>>()?;
        let document = images_to_pdf(&images)?;
        let total_pages = document.page_count();
        Ok(
            ConversionArtifact::new("converted.pdf", PDF_MEDIA_TYPE, document.into_bytes()?)
                .with_diagnostics(Diagnostics {
                    total_pages: Some(total_pages),
                    ..Diagnostics::default()
                }),
        )
    })
    .await?;

    deliver(&state, "images", artifact).await
}

/// Export the text of a PDF as a Word document
pub async fn pdf_to_word(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let mut form = UploadForm::read(multipart).await?;
    let upload = form.take_file("file")?;
    info!("Converting PDF to Word: {}", upload.filename);
    upload.require_pdf()?;

    let exporter = state.word.clone();
    if !exporter.available() {
        return Err(pdfmaster::Error::ConversionUnavailable {
            capability: "PDF to Word conversion",
            hint: "No Word exporter is configured for this deployment.".to_string(),
        }
        .into());
    }

    let artifact = blocking(move || {
        let document = Document::from_bytes(&upload.filename, &upload.bytes)?;
        let bytes = exporter.export(&document)?;
        Ok(ConversionArtifact::new(
            format!("{}.docx", upload.stem()),
            DOCX_MEDIA_TYPE,
            bytes,
        ))
    })
    .await?;

    deliver(&state, "output", artifact).await
}

/// Re-encode an image for size
pub async fn compress_image(
    State(state): State<AppState>,
    params: Result<Query<ImageCompressParams>, QueryRejection>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let Query(params) = params?;
    let mut form = UploadForm::read(multipart).await?;
    let upload = form.take_file("file")?;
    let quality = params.quality.map(Quality::new).unwrap_or_default();
    let target = params
        .format
        .as_deref()
        .filter(|name| !name.trim().is_empty())
        .map(ImageKind::parse)
        .transpose()?;
    info!(
        "Compressing image: {}, quality: {}",
        upload.filename,
        quality.value()
    );

    let artifact = blocking(move || {
        let image = RasterImage::decode(&upload.filename, &upload.bytes)?;
        let encoded = compress_only(&image, quality, target)?;

        let original_size = upload.len() as u64;
        let compressed_size = encoded.bytes.len() as u64;
        let reduction = pdfmaster::reduction_percent(original_size, compressed_size);
        info!(
            "Image compressed: {original_size} -> {compressed_size} bytes ({reduction:.1}% reduction)"
        );

        let filename = format!(
            "compressed_{}.{}",
            upload.stem(),
            encoded.format.extension()
        );
        Ok(
            ConversionArtifact::new(filename, encoded.format.media_type(), encoded.bytes)
                .with_diagnostics(Diagnostics {
                    original_size: Some(original_size),
                    new_size: Some(compressed_size),
                    reduction_percent: Some(reduction),
                    ..Diagnostics::default()
                }),
        )
    })
    .await?;

    deliver(&state, "compressed", artifact).await
}

/// Resize an image, keeping its format
pub async fn resize_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let mut form = UploadForm::read(multipart).await?;
    let upload = form.take_file("file")?;
    let request = ResizeRequest {
        width: parse_dimension("width", form.text("width"))?,
        height: parse_dimension("height", form.text("height"))?,
        maintain_aspect: match form.text("maintain_aspect") {
            Some(raw) => parse_bool("maintain_aspect", raw)?,
            None => true,
        },
    };
    info!(
        "Resizing image: {}, width={:?}, height={:?}",
        upload.filename, request.width, request.height
    );
    if request.width.is_none() && request.height.is_none() {
        return Err(AppError::bad_request("Must specify width or height"));
    }

    let artifact = blocking(move || {
        let image = RasterImage::decode(&upload.filename, &upload.bytes)?;
        let original = image.dimensions();
        let resized = resize(&image, &request)?;
        let (width, height) = resized.dimensions();

        let kind = image.source_format().unwrap_or(ImageKind::Jpeg);
        let encoded = convert(&resized, kind, Quality::new(REENCODE_QUALITY))?;
        Ok(ConversionArtifact::new(
            format!("resized_{width}x{height}_{}", upload.filename),
            kind.media_type(),
            encoded.bytes,
        )
        .with_diagnostics(Diagnostics {
            original_dimensions: Some(original),
            new_dimensions: Some((width, height)),
            ..Diagnostics::default()
        }))
    })
    .await?;

    deliver(&state, "resized", artifact).await
}

/// Convert an image to another raster format
pub async fn convert_image(
    State(state): State<AppState>,
    params: Result<Query<ConvertParams>, QueryRejection>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let Query(params) = params?;
    let target = ImageKind::parse(params.target_format.as_deref().unwrap_or("png"))?;
    let mut form = UploadForm::read(multipart).await?;
    let upload = form.take_file("file")?;
    info!("Converting image: {} to {target}", upload.filename);

    let artifact = blocking(move || {
        let image = RasterImage::decode(&upload.filename, &upload.bytes)?;
        let encoded = convert(&image, target, Quality::new(REENCODE_QUALITY))?;
        Ok(ConversionArtifact::new(
            format!("converted_{}.{}", upload.stem(), target.extension()),
            target.media_type(),
            encoded.bytes,
        ))
    })
    .await?;

    deliver(&state, "converted", artifact).await
}

/// Run CPU-bound work off the async workers.
async fn blocking<T, F>(work: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await?
}

/// Stage the artifact for the lifetime of this call and answer with its bytes.
async fn deliver(
    state: &AppState,
    label: &'static str,
    artifact: ConversionArtifact,
) -> Result<Response, AppError> {
    let ConversionArtifact {
        filename,
        bytes,
        media_type,
        mut diagnostics,
    } = artifact;

    let store = state.store.clone();
    let extension = staging_extension(&filename);
    let body = blocking(move || {
        let staged = store.stage(label, &extension, &bytes)?;
        Ok(staged.read()?)
    })
    .await?;

    diagnostics.file_size.get_or_insert(body.len() as u64);

    let mut response = (StatusCode::OK, body).into_response();
    let headers = response.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_str(&media_type)
            .map_err(|e| AppError::Internal(format!("invalid media type {media_type}: {e}")))?,
    );
    headers.insert(CONTENT_DISPOSITION, attachment_disposition(&filename));
    for (name, value) in diagnostic_headers(&diagnostics) {
        headers.insert(name, value);
    }
    Ok(response)
}

/// Lowercase alphanumeric extension of `filename`, or `bin`.
pub(crate) fn staging_extension(filename: &str) -> String {
    std::path::Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "bin".to_string())
}

/// `attachment; filename="..."` with quotes, backslashes and non-ASCII replaced.
pub fn attachment_disposition(filename: &str) -> HeaderValue {
    let safe: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            ' ' => ' ',
            c if c.is_ascii_graphic() => c,
            _ => '_',
        })
        .collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{safe}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// `X-*` headers for every measurement present.
pub fn diagnostic_headers(diagnostics: &Diagnostics) -> Vec<(HeaderName, HeaderValue)> {
    let mut headers = Vec::new();
    let mut push = |name: &'static str, value: HeaderValue| {
        headers.push((HeaderName::from_static(name), value));
    };

    if let Some(pages) = diagnostics.total_pages {
        push("x-total-pages", HeaderValue::from(pages));
    }
    if let Some(files) = diagnostics.total_files {
        push("x-total-files", HeaderValue::from(files));
    }
    match (diagnostics.original_size, diagnostics.new_size) {
        (Some(original), Some(compressed)) => {
            push("x-original-size", HeaderValue::from(original));
            push("x-compressed-size", HeaderValue::from(compressed));
        }
        _ => {
            if let Some(size) = diagnostics.file_size {
                push("x-file-size", HeaderValue::from(size));
            }
        }
    }
    if let Some(reduction) = diagnostics.reduction_percent {
        if let Ok(value) = HeaderValue::from_str(&format!("{reduction:.1}")) {
            push("x-reduction-percent", value);
        }
    }
    if let Some((width, height)) = diagnostics.original_dimensions {
        push("x-original-width", HeaderValue::from(width));
        push("x-original-height", HeaderValue::from(height));
    }
    if let Some((width, height)) = diagnostics.new_dimensions {
        push("x-new-width", HeaderValue::from(width));
        push("x-new-height", HeaderValue::from(height));
    }
    headers
}
