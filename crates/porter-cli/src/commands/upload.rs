use anyhow::Result;
use std::path::Path;

use porter_core::{TransferEvent, Upload};

pub async fn run(
    file: &Path,
    remote: &str,
    base_dir: &Path,
    key_hex: &Option<String>,
) -> Result<()> {
    let config = super::load_config(base_dir)?;
    let backend = super::backend_from_config(&config).await?;
    let key = super::load_key(&config, key_hex)?;

    let payload = std::fs::read(file)?;
    println!(
        "Uploading {} ({} bytes) to {remote}",
        file.display(),
        payload.len()
    );

    let mut upload = Upload::new(backend, remote, Some(payload), key)?;
    let Some(mut events) = upload.start() else {
        anyhow::bail!("upload already started");
    };

    let pb = super::transfer_bar();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                pb.set_message("cancelling");
                upload.cancel();
            }
            event = events.recv() => match event {
                Some(TransferEvent::Progress(p)) => {
                    if let Some(total) = p.total {
                        pb.set_length(total);
                    }
                    pb.set_position(p.completed);
                }
                Some(TransferEvent::Finished(Ok(()))) => {
                    pb.finish_with_message("done");
                    println!("Uploaded {remote}");
                    return Ok(());
                }
                Some(TransferEvent::Finished(Err(e))) => {
                    pb.abandon_with_message("failed");
                    return Err(e.into());
                }
                None => anyhow::bail!("event stream closed without an outcome"),
            }
        }
    }
}
