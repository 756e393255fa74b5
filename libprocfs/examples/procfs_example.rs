// Example binary exposing a read-only clock and a writable knob.
//
//   cargo run --example procfs_example -- --mountpoint /tmp/procfs
//   cat /tmp/procfs/datetime
//   echo hello > /tmp/procfs/readwrite && cat /tmp/procfs/readwrite

use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use clap::Parser;
use libprocfs::{MountConfig, ProcFs};
use tokio::signal;

#[derive(Parser, Debug)]
#[command(author, version, about = "Callback backed procfs example")]
struct Args {
    /// Mount point path
    #[arg(long)]
    mountpoint: String,
    /// Optional YAML mount configuration
    #[arg(long)]
    config: Option<String>,
    /// Allow other users to access the mount
    #[arg(long, default_value_t = false)]
    allow_other: bool,
    /// Use privileged mount instead of fusermount3
    #[arg(long, default_value_t = false)]
    privileged: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    libprocfs::init_logging();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => MountConfig::from_yaml_file(path)
            .with_context(|| format!("failed to load mount config {path}"))?,
        None => MountConfig::default(),
    };
    config.allow_other |= args.allow_other;
    config.unprivileged &= !args.privileged;

    let fs = Arc::new(ProcFs::new());
    fs.register_read_only("datetime", 0o444, || {
        log::info!("datetime file OnRead");
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        format!("{}.{:09}\n", now.as_secs(), now.subsec_nanos()).into_bytes()
    })?;

    let data = Arc::new(Mutex::new(String::from("Default")));
    let reader = data.clone();
    fs.register_read_write(
        "readwrite",
        0o666,
        move || {
            log::info!("readwrite file OnRead");
            reader.lock().map(|d| d.clone()).unwrap_or_default().into_bytes()
        },
        move |buf| {
            log::info!("readwrite file OnWrite: {buf:?}");
            if let Ok(mut d) = data.lock() {
                *d = String::from_utf8_lossy(buf).into_owned();
            }
        },
    )?;

    let server = fs
        .prepare_mount(&args.mountpoint, &config)
        .await
        .with_context(|| format!("failed to mount at {}", args.mountpoint))?;
    println!("Serving at {}. Press Ctrl+C to unmount.", args.mountpoint);
    server
        .serve_until(async {
            let _ = signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
