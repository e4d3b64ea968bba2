// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Remote version resolution from tag APIs
//!
//! Each service's tag list is fetched in its own task. Tags are split into a
//! stable and a dev track and the newest tag of each track is folded into the
//! service record. Slots only ever move forward.

use crate::downloader::Downloader;
use crate::error::{Result, UpdaterError};
use crate::registry::{Registry, Service};
use crate::version::{VersionSlot, parse_version};
use semver::Version;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Substrings marking a pre-release tag
pub const DEV_MARKERS: [&str; 2] = ["-dev", "-rc"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Track {
    Stable,
    Dev,
}

pub fn classify_tag(raw: &str) -> Track {
    if DEV_MARKERS.iter().any(|marker| raw.contains(marker)) {
        Track::Dev
    } else {
        Track::Stable
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTag {
    pub name: String,
    pub track: Track,
}

impl RemoteTag {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let track = classify_tag(&name);
        Self { name, track }
    }
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

/// Parse a tag API body: a JSON array of objects with a `name` field.
pub fn parse_tag_list(url: &str, body: &str) -> Result<Vec<RemoteTag>> {
    let entries: Vec<TagEntry> =
        serde_json::from_str(body).map_err(|e| UpdaterError::MalformedResponse {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
    Ok(entries.into_iter().map(|e| RemoteTag::new(e.name)).collect())
}

pub async fn fetch_tags(downloader: &Downloader, url: &str) -> Result<Vec<RemoteTag>> {
    let body = downloader.fetch_text(url).await?;
    parse_tag_list(url, &body)
}

/// What a fold changed in a service record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FoldSummary {
    pub latest_updated: bool,
    pub dev_updated: bool,
    /// Tags that did not parse as versions
    pub skipped: Vec<String>,
}

/// Fold tags into the `latest`/`dev` slots of `service`.
///
/// Per track only the newest parsed tag counts, and it replaces the slot
/// only when strictly newer than what the slot already holds.
pub fn fold_tags(service: &mut Service, tags: &[RemoteTag]) -> FoldSummary {
    let mut summary = FoldSummary::default();
    let mut newest_stable: Option<Version> = None;
    let mut newest_dev: Option<Version> = None;

    for tag in tags {
        let version = match parse_version(&tag.name) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(service = %service.bin_name, "Skipping tag {}: {e}", tag.name);
                summary.skipped.push(tag.name.clone());
                continue;
            }
        };

        let newest = match tag.track {
            Track::Stable => &mut newest_stable,
            Track::Dev => &mut newest_dev,
        };
        if newest.as_ref().is_none_or(|current| version > *current) {
            *newest = Some(version);
        }
    }

    if let Some(candidate) = newest_stable.map(VersionSlot::Known)
        && candidate.is_newer_than(&service.version.latest)
    {
        tracing::debug!(service = %service.bin_name, "latest: {} -> {candidate}", service.version.latest);
        service.version.latest = candidate;
        summary.latest_updated = true;
    }

    if let Some(candidate) = newest_dev.map(VersionSlot::Known)
        && candidate.is_newer_than(&service.version.dev)
    {
        tracing::debug!(service = %service.bin_name, "dev: {} -> {candidate}", service.version.dev);
        service.version.dev = candidate;
        summary.dev_updated = true;
    }

    summary
}

/// Fetch and fold the tags of one service
pub async fn resolve_service(downloader: &Downloader, service: &mut Service) -> Result<FoldSummary> {
    let tags = fetch_tags(downloader, &service.urls.api).await?;
    tracing::debug!(service = %service.bin_name, "Fetched {} tags", tags.len());
    Ok(fold_tags(service, &tags))
}

/// Resolve every registered service concurrently.
///
/// Returns once every task has finished. A failing or panicking task only
/// affects its own service; its error is logged and returned in the map.
pub async fn resolve_all(
    registry: &Registry,
    downloader: &Downloader,
) -> BTreeMap<String, Result<FoldSummary>> {
    let mut handles = Vec::new();

    for name in registry.list() {
        let Some(mut service) = registry.get(&name) else {
            continue;
        };
        let registry = registry.clone();
        let downloader = downloader.clone();
        let task_name = name.clone();
        let handle = tokio::spawn(async move {
            let summary = resolve_service(&downloader, &mut service).await?;
            registry.upsert(&task_name, service);
            Ok(summary)
        });
        handles.push((name, handle));
    }

    let mut results = BTreeMap::new();
    for (name, handle) in handles {
        let result = handle.await.unwrap_or_else(|e| {
            Err(UpdaterError::TaskFailed {
                service: name.clone(),
                reason: e.to_string(),
            })
        });

        match &result {
            Ok(summary) => tracing::debug!(
                service = %name,
                "Resolved (latest updated: {}, dev updated: {}, skipped: {})",
                summary.latest_updated,
                summary.dev_updated,
                summary.skipped.len()
            ),
            Err(e) => tracing::error!(service = %name, "Error fetching version information: {e}"),
        }
        results.insert(name, result);
    }

    results
}
