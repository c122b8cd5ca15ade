use clap::Parser;

/// Skywatch CLI arguments
#[derive(Debug, Parser)]
#[command(
    name = "skywatch",
    version,
    about = "Weather and hazard-alert notifications for chat subscribers"
)]
pub struct Cli {
    /// Database URL (e.g. sqlite://skywatch.db)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Recurring weather update interval in seconds
    #[arg(long)]
    pub weather_interval: Option<u64>,

    /// Hazard feed polling interval in seconds
    #[arg(long)]
    pub hazard_poll_interval: Option<u64>,
}
