use anyhow::Context;

use mail_scan::ScanConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the JSON records.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = ScanConfig::from_env().context("invalid configuration")?;

    eprintln!("📬 mail-scan v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Server: {}:{}", config.imap.host, config.imap.port);
    eprintln!("   Folder: {}", config.folder);
    eprintln!("   Window: last {} emails", config.max_scan);

    let emails = mail_scan::run(&config)
        .await
        .with_context(|| format!("scan of {} failed", config.folder))?;

    let json = serde_json::to_string_pretty(&emails).context("serializing results")?;
    println!("{json}");
    Ok(())
}
