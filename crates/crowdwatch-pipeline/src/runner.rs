//! Drives one source through a session until end of stream.

use crowdwatch_media::{DetectionSidecar, VideoSource};
use crowdwatch_models::StreamSummary;
use tracing::Instrument;

use crate::error::PipelineResult;
use crate::session::StreamSession;
use crate::telemetry::TelemetrySink;

/// Process every frame of `source` in order.
///
/// Frames that fail to decode are counted and skipped. A missing sidecar
/// record, or an unreadable sidecar, means zero detections for that frame.
/// Only source failures that end the stream and telemetry write failures
/// are returned as errors.
pub async fn run_stream(
    session: &mut StreamSession,
    source: &mut dyn VideoSource,
    mut sidecar: Option<&mut DetectionSidecar>,
    sink: &mut dyn TelemetrySink,
) -> PipelineResult<StreamSummary> {
    let span = session.logger().create_span();

    async move {
        loop {
            let frame = match source.next_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) if e.is_frame_level() => {
                    session.record_decode_failure();
                    session.logger().log_warning(&format!("skipping frame: {e}"));
                    continue;
                }
                Err(e) => {
                    session.logger().log_error(&e.to_string());
                    return Err(e.into());
                }
            };

            let detections = match sidecar.as_deref_mut() {
                Some(sidecar) => sidecar.detections_for(frame.index).await.unwrap_or_else(|e| {
                    session
                        .logger()
                        .log_warning(&format!("detections unavailable for frame {}: {e}", frame.index));
                    Vec::new()
                }),
                None => Vec::new(),
            };

            let outcome = session.process_frame(&frame, &detections).await;
            sink.record_frame(&outcome.telemetry).await?;
            if let Some(alert) = &outcome.alert {
                sink.record_alert(alert).await?;
            }
        }

        if let Some(sidecar) = sidecar.as_deref() {
            if sidecar.malformed_lines() > 0 {
                session.logger().log_warning(&format!(
                    "{} malformed detection records were skipped",
                    sidecar.malformed_lines()
                ));
            }
        }

        let summary = session.finish().await;
        sink.finish(&summary).await?;
        Ok(summary)
    }
    .instrument(span)
    .await
}
