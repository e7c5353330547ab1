//! Subcommand implementations.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use leaddocs_api_client::ApiClient;
use leaddocs_protocol::DocumentAsset;
use leaddocs_transfer::BinaryReader;
use leaddocs_upload::{
    BatchOrchestrator, Collaborators, DocumentOutcome, PendingDocuments, StaticConnectivity,
    UploadEvent,
};
use tracing::{info, warn};

use crate::config::UploaderConfig;

fn build_orchestrator(
    client: Arc<ApiClient>,
    config: &UploaderConfig,
    online: bool,
) -> anyhow::Result<BatchOrchestrator> {
    let transport = config
        .pipeline
        .http_transport()
        .context("failed to build upload transport")?;
    Ok(BatchOrchestrator::new(
        Collaborators {
            tokens: client.clone(),
            registry: client,
            connectivity: Arc::new(StaticConnectivity::new(online)),
            transport: Arc::new(transport),
            reader: BinaryReader::new(),
        },
        config.pipeline.clone(),
    ))
}

/// Uploads `files` to `lead`. Returns whether every file was uploaded.
pub async fn upload(
    client: Arc<ApiClient>,
    config: &UploaderConfig,
    online: bool,
    lead: &str,
    files: &[PathBuf],
) -> anyhow::Result<bool> {
    let mut pending = PendingDocuments::new();
    for path in files {
        let doc = DocumentAsset::from_path(path)
            .with_context(|| format!("cannot use {}", path.display()))?;
        pending.add(doc);
    }

    let mut orchestrator = build_orchestrator(client, config, online)?;
    let mut events = orchestrator
        .take_events()
        .context("event stream already taken")?;
    let orchestrator = Arc::new(orchestrator);

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let Some(line) = render_event(&event) {
                println!("{line}");
            }
        }
    });

    let interrupt = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, cancelling upload");
                orchestrator.cancel_current();
            }
        })
    };

    let result = orchestrator.upload_batch(lead, &mut pending).await;

    interrupt.abort();
    let _ = interrupt.await;
    drop(orchestrator);
    let _ = printer.await;

    let report = result.map_err(|e| anyhow::anyhow!("{}", e.user_message()))?;
    for r in &report.results {
        let status = match &r.outcome {
            DocumentOutcome::Uploaded => "uploaded".to_string(),
            DocumentOutcome::Cancelled => "cancelled".to_string(),
            DocumentOutcome::Failed(e) => format!("failed: {}", e.user_message()),
            DocumentOutcome::NotAttempted => "not attempted".to_string(),
        };
        println!("{}\t{status}", r.file_name);
    }
    if let Some(warning) = &report.warning {
        warn!(lead = %lead, "{warning}");
        println!("warning: {warning}");
    }
    if !pending.is_empty() {
        println!("{} document(s) still pending", pending.len());
    }
    Ok(report.is_complete())
}

/// Prints the documents attached to `lead`.
pub async fn list(client: &ApiClient, lead: &str) -> anyhow::Result<()> {
    let docs = client
        .list_documents(lead)
        .await
        .with_context(|| format!("failed to list documents for lead {lead}"))?;
    for doc in &docs {
        println!(
            "{}\t{}\t{}\t{}\t{:?}",
            doc.doc_id,
            doc.file_name,
            doc.mime_type,
            format_bytes(doc.file_size),
            doc.status
        );
    }
    println!("{} document(s)", docs.len());
    Ok(())
}

/// Prints a signed read URL for `doc`.
pub async fn view(
    client: Arc<ApiClient>,
    config: &UploaderConfig,
    online: bool,
    doc: &str,
) -> anyhow::Result<()> {
    let orchestrator = build_orchestrator(client, config, online)?;
    let url = orchestrator
        .view_url(doc)
        .await
        .map_err(|e| anyhow::anyhow!("{}", e.user_message()))?;
    println!("{url}");
    Ok(())
}

/// Formats one event for the terminal; `None` for events not worth a line.
pub fn render_event(event: &UploadEvent) -> Option<String> {
    let line = match event {
        UploadEvent::Started { file_name, .. } => format!("uploading {file_name}"),
        UploadEvent::Progress {
            document_id,
            progress,
        } => format!(
            "  {document_id}: {:>3}% ({} of {}, {}/s)",
            progress.percent,
            format_bytes(progress.loaded),
            format_bytes(progress.total),
            format_bytes(progress.speed as u64)
        ),
        UploadEvent::Completed { document_id } => format!("  {document_id}: done"),
        UploadEvent::Cancelled { document_id } => format!("  {document_id}: cancelled"),
        UploadEvent::Failed {
            document_id, error, ..
        } => format!("  {document_id}: {error}"),
        UploadEvent::Reconciled { lead_id, count } => {
            format!("lead {lead_id} now has {count} document(s)")
        }
        UploadEvent::ReconcileFailed { .. } => return None,
    };
    Some(line)
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leaddocs_protocol::UploadProgress;
    use leaddocs_upload::ErrorKind;

    #[test]
    fn bytes_formatting() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
    }

    #[test]
    fn renders_progress() {
        let line = render_event(&UploadEvent::Progress {
            document_id: "d1".into(),
            progress: UploadProgress::from_bytes(1024, 2048, 512.0),
        })
        .unwrap();
        assert_eq!(line, "  d1:  50% (1.0 KiB of 2.0 KiB, 512 B/s)");
    }

    #[test]
    fn renders_failure_message() {
        let line = render_event(&UploadEvent::Failed {
            document_id: "d1".into(),
            kind: ErrorKind::Timeout,
            error: "The upload timed out.".into(),
        })
        .unwrap();
        assert!(line.ends_with("The upload timed out."));
        assert!(
            render_event(&UploadEvent::ReconcileFailed {
                lead_id: "L1".into(),
                error: "x".into()
            })
            .is_none()
        );
    }
}
