use anyhow::Result;
use std::path::Path;

use porter_core::{Download, TransferEvent};

pub async fn run(
    remote: &str,
    dest: &Path,
    base_dir: &Path,
    key_hex: &Option<String>,
) -> Result<()> {
    let config = super::load_config(base_dir)?;
    let backend = super::backend_from_config(&config).await?;
    let key = super::load_key(&config, key_hex)?;

    println!("Downloading {remote} to {}", dest.display());

    let mut download = Download::new(backend, remote, dest, key)?;
    let Some(mut events) = download.start() else {
        anyhow::bail!("download already started");
    };

    let pb = super::transfer_bar();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                pb.set_message("cancelling");
                download.cancel();
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
                    println!("Downloaded to {}", dest.display());
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
