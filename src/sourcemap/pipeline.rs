//! End-to-end source-map pipeline: discover → fetch → parse → extract.
//!
//! The pipeline is best-effort per bundle: every failure is accumulated
//! into the bundle's report and the next bundle proceeds untouched.

use tokio_util::sync::CancellationToken;

use super::discovery::{self, Discovered};
use super::extract::{SourceFilters, extract_sources};
use super::fetch::{FetchLimits, fetch_map_text};
use super::parse::parse_source_map;
use super::types::{BundleReport, MapLocation};
use crate::error::SourceMapError;

/// Drives the source-map pipeline for one capture session
pub struct SourceMapPipeline {
    client: reqwest::Client,
    limits: FetchLimits,
    filters: SourceFilters,
}

impl SourceMapPipeline {
    #[must_use]
    pub fn new(client: reqwest::Client, limits: FetchLimits, filters: SourceFilters) -> Self {
        Self {
            client,
            limits,
            filters,
        }
    }

    /// Run the full pipeline for one bundle URL.
    ///
    /// Never returns an error: everything that goes wrong lands in
    /// `report.errors` so the caller can process all bundles and report
    /// failures together.
    pub async fn process_bundle(&self, bundle_url: &str, cancel: &CancellationToken) -> BundleReport {
        let mut report = BundleReport::new(bundle_url);
        let is_css = bundle_is_css(bundle_url);

        // Fetch the bundle itself: headers drive discovery step 1, the
        // body drives steps 2-3.
        let (headers, body) = match self.fetch_bundle(bundle_url, cancel).await {
            Ok(pair) => pair,
            Err(e) => {
                report.errors.push(e);
                return report;
            }
        };

        let discovered = discovery::from_headers(&headers, bundle_url)
            .or_else(|| discovery::from_content(&body, bundle_url, is_css))
            .or_else(|| {
                let url = discovery::probe_url(bundle_url);
                Some(Discovered::Remote {
                    url: url.clone(),
                    location: MapLocation::Probe { url },
                })
            });

        let map_text = match discovered {
            Some(Discovered::Inline { json }) => {
                report.map_location = Some(MapLocation::DataUri);
                json
            }
            Some(Discovered::Remote { url, location }) => {
                match fetch_map_text(&self.client, &url, self.limits, cancel).await {
                    Ok(text) => {
                        report.map_location = Some(location);
                        text
                    }
                    Err(e) => {
                        // A failed probe means the bundle simply has no
                        // map; anything else is a real pipeline error.
                        if matches!(location, MapLocation::Probe { .. })
                            && matches!(e, SourceMapError::HttpStatus { status: 404, .. })
                        {
                            report.errors.push(SourceMapError::NotFound {
                                bundle_url: bundle_url.to_string(),
                            });
                        } else {
                            report.errors.push(e);
                        }
                        return report;
                    }
                }
            }
            None => {
                report.errors.push(SourceMapError::NotFound {
                    bundle_url: bundle_url.to_string(),
                });
                return report;
            }
        };

        let (map, warnings) = match parse_source_map(&map_text) {
            Ok(parsed) => parsed,
            Err(e) => {
                report.errors.push(e);
                return report;
            }
        };
        report.warnings = warnings;

        let (sources, stats) = extract_sources(&map, &self.filters);
        tracing::debug!(
            bundle = bundle_url,
            extracted = stats.extracted_count,
            null_content = stats.null_content_count,
            skipped = stats.skipped_count,
            "Source extraction finished"
        );

        report.sources = sources;
        report.stats = stats;
        report
    }

    async fn fetch_bundle(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<(reqwest::header::HeaderMap, String), SourceMapError> {
        let fetch = async {
            let response = self.client.get(url).send().await.map_err(|e| {
                SourceMapError::Fetch {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            })?;

            let status = response.status();
            if !status.is_success() {
                return Err(SourceMapError::HttpStatus {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            let headers = response.headers().clone();
            let body = response.text().await.map_err(|e| SourceMapError::Fetch {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
            Ok((headers, body))
        };

        tokio::select! {
            () = cancel.cancelled() => Err(SourceMapError::Cancelled),
            result = tokio::time::timeout(self.limits.timeout, fetch) => match result {
                Ok(inner) => inner,
                Err(_) => Err(SourceMapError::Timeout(self.limits.timeout.as_millis() as u64)),
            },
        }
    }
}

fn bundle_is_css(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.ends_with(".css")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn css_detection_ignores_query() {
        assert!(bundle_is_css("https://x.test/app.css?v=1"));
        assert!(!bundle_is_css("https://x.test/app.js"));
    }
}
