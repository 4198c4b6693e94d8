//! Download a single invoice command.

use console::style;

use mfk_invoices::config::Settings;
use mfk_invoices::services::DownloadService;

use crate::cli::helpers::prepare_output_dir;

/// Download one invoice PDF by ID.
pub async fn cmd_download_invoice(
    settings: &Settings,
    invoice_id: &str,
    output_dir: &str,
) -> anyhow::Result<()> {
    let client = settings.create_client()?;
    let output_dir = prepare_output_dir(output_dir)?;

    println!(
        "{} Downloading invoice {} into {}",
        style("→").cyan(),
        invoice_id,
        output_dir.display()
    );
    tracing::info!(
        "Searching billings from the last {} months",
        settings.lookup_window_months
    );

    let service = DownloadService::new(client);
    let saved = service.download_one(invoice_id, &output_dir).await?;

    println!(
        "{} Saved {} ({} bytes)",
        style("✓").green(),
        saved.path.display(),
        saved.bytes
    );

    Ok(())
}
