//! Conversion pipeline
//!
//! Admission, format resolution, dispatch under the deadline. One pipeline
//! per conversion domain; the HTTP layer is a thin shell around [`ConversionPipeline::run`].

use std::sync::Arc;

use super::deadline::TimeoutGuard;
use super::dispatch::Dispatcher;
use super::types::{ConversionOutcome, ConversionRequest, Converted};
use crate::admission::Admission;
use crate::artifacts::ArtifactStore;
use crate::error::ConvertResult;
use crate::formats::{self, ConversionDomain};

/// Request handling for one conversion domain
#[derive(Clone)]
pub struct ConversionPipeline {
    inner: Arc<PipelineInner>,
}

struct PipelineInner {
    domain: ConversionDomain,
    admission: Admission,
    dispatcher: Dispatcher,
    guard: TimeoutGuard,
    store: ArtifactStore,
}

impl ConversionPipeline {
    pub fn new(
        domain: ConversionDomain,
        admission: Admission,
        dispatcher: Dispatcher,
        guard: TimeoutGuard,
        store: ArtifactStore,
    ) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                domain,
                admission,
                dispatcher,
                guard,
                store,
            }),
        }
    }

    pub fn domain(&self) -> ConversionDomain {
        self.inner.domain
    }

    pub fn admission(&self) -> &Admission {
        &self.inner.admission
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.inner.store
    }

    /// Handle one request end to end
    ///
    /// Validation happens before any conversion work; on success the
    /// artifact is on disk and verified.
    pub async fn run(&self, client_key: &str, request: ConversionRequest) -> ConvertResult<Converted> {
        let result = self.convert(client_key, &request).await;

        let outcome = ConversionOutcome::of(&result);
        match &outcome {
            ConversionOutcome::Success(converted) => tracing::info!(
                domain = self.inner.domain.as_str(),
                client = client_key,
                filename = %request.declared_filename,
                target = %converted.format,
                artifact = converted.artifact.file_name(),
                outcome = outcome.label(),
                "Conversion request finished"
            ),
            ConversionOutcome::ValidationError(e) | ConversionOutcome::ConversionError(e) => {
                tracing::warn!(
                    domain = self.inner.domain.as_str(),
                    client = client_key,
                    filename = %request.declared_filename,
                    error = %e,
                    outcome = outcome.label(),
                    "Conversion request finished"
                )
            }
            ConversionOutcome::Timeout => tracing::warn!(
                domain = self.inner.domain.as_str(),
                client = client_key,
                filename = %request.declared_filename,
                outcome = outcome.label(),
                "Conversion request finished"
            ),
        }

        result
    }

    async fn convert(&self, client_key: &str, request: &ConversionRequest) -> ConvertResult<Converted> {
        let inner = &self.inner;

        inner.admission.admit(client_key, request.payload_size())?;
        let format = formats::resolve_in(inner.domain, &request.target_format_token)?;

        tracing::debug!(
            filename = %request.declared_filename,
            size = request.payload_size(),
            target = %format,
            "Conversion admitted"
        );

        let slot = inner
            .store
            .reserve(&request.declared_filename, format.extension());
        let artifact = inner
            .guard
            .guard(
                &slot,
                inner.dispatcher.dispatch(
                    request.raw_bytes.clone(),
                    &request.declared_filename,
                    format,
                    Arc::clone(&slot),
                ),
            )
            .await?;

        Ok(Converted { artifact, format })
    }
}
