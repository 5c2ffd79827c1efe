//! Evidence gallery: browse the screenshots and logs an attempt produced.

use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use teeline::artifact::{ArtifactFolder, ArtifactRef, ArtifactStore};
use teeline::reservation::{ReservationKey, parse_clock_time};

use crate::AppState;
use crate::errors::{Error, Result};

#[derive(Debug, Deserialize)]
pub struct GalleryQuery {
    pub date: Option<String>,
    pub time: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GalleryResponse {
    pub status: &'static str,
    pub folder: String,
    pub attempts: Vec<AttemptGroup>,
}

#[derive(Debug, Serialize)]
pub struct AttemptGroup {
    pub attempt: u32,
    pub artifacts: Vec<GalleryArtifact>,
}

#[derive(Debug, Serialize)]
pub struct GalleryArtifact {
    pub name: String,
    pub content_type: String,
    pub size_bytes: usize,
    pub url: String,
}

// GET /gallery?date&time - artifacts for one reservation, grouped by attempt
pub async fn gallery(
    State(state): State<AppState>,
    Query(query): Query<GalleryQuery>,
) -> Result<Json<GalleryResponse>> {
    let (Some(date), Some(time)) = (
        query.date.as_deref().map(str::trim).filter(|s| !s.is_empty()),
        query.time.as_deref().map(str::trim).filter(|s| !s.is_empty()),
    ) else {
        return Err(Error::BadRequest {
            message: "date and time query parameters are required".to_string(),
        });
    };

    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| Error::BadRequest {
        message: format!("unparseable date {date:?}, expected YYYY-MM-DD"),
    })?;
    let time = parse_clock_time(time)?;

    let key = ReservationKey::derive(date, time);
    let folder = ArtifactFolder::for_reservation(&key);

    let mut grouped: BTreeMap<u32, Vec<GalleryArtifact>> = BTreeMap::new();
    for artifact in state.artifacts.list(&folder).await? {
        let url = format!(
            "/artifacts/{}/{}/{}",
            folder.as_str(),
            artifact.attempt,
            artifact.name
        );
        grouped.entry(artifact.attempt).or_default().push(GalleryArtifact {
            name: artifact.name,
            content_type: artifact.content_type,
            size_bytes: artifact.size_bytes,
            url,
        });
    }

    Ok(Json(GalleryResponse {
        status: "success",
        folder: folder.as_str().to_string(),
        attempts: grouped
            .into_iter()
            .map(|(attempt, artifacts)| AttemptGroup { attempt, artifacts })
            .collect(),
    }))
}

// GET /artifacts/{folder}/{attempt}/{name} - proxy one artifact's bytes.
// Artifacts are immutable once written, so clients may cache aggressively.
pub async fn fetch_artifact(
    State(state): State<AppState>,
    Path((folder, attempt, name)): Path<(String, u32, String)>,
) -> Result<Response> {
    let reference = ArtifactRef {
        folder: ArtifactFolder::from_raw(folder),
        attempt,
        name,
    };

    match state.artifacts.fetch(&reference).await? {
        Some((content_type, bytes)) => Ok((
            [
                (header::CONTENT_TYPE, content_type),
                (
                    header::CACHE_CONTROL,
                    "public, max-age=31536000, immutable".to_string(),
                ),
            ],
            bytes,
        )
            .into_response()),
        None => Err(Error::NotFound {
            resource: "artifact".to_string(),
            id: reference.path(),
        }),
    }
}
