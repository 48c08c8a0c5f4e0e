// Swipe station - capture loop on a card-reader terminal
// Only compile the terminal source when the station feature is enabled
#[cfg(feature = "station")]
mod terminal;

use anyhow::Result;

#[cfg(feature = "station")]
fn main() -> Result<()> {
    use std::sync::Arc;
    use swipe_attendance::schedule::{SendDays, SystemClock};
    use swipe_attendance::{
        telemetry, AppConfig, CsvSink, HttpEmailNotifier, RecorderClient, Scheduler,
        StationSettings, SwipeStation,
    };
    use tracing::info;

    println!("🎫 Swipe Attendance - Station v{}", swipe_attendance::VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // Configuration problems stop the station before it touches anything
    let config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("❌ Configuration error: {}", e);
        std::process::exit(1);
    });
    let window = config.require_window().unwrap_or_else(|e| {
        eprintln!("❌ Configuration error: {}", e);
        std::process::exit(1);
    });

    let log_path = telemetry::init_tracing(Some(&config.log_dir()), "station")?;
    if let Some(path) = &log_path {
        println!("✓ Logging to {}", path.display());
    }

    let sink = CsvSink::open(config.batch_path())?;
    println!("✓ Batch file: {}", config.batch_path().display());

    let send_days = if config.send_on_weekends {
        SendDays::Every
    } else {
        SendDays::Weekdays
    };
    let scheduler = Scheduler::new(window, SystemClock, send_days);

    let source = terminal::TerminalSource::new("Swipe badge: ").unwrap_or_else(|e| {
        eprintln!("❌ A terminal is required for swipe input: {}", e);
        std::process::exit(1);
    });

    let notifier = Arc::new(HttpEmailNotifier::new(&config.email));
    let mut station = SwipeStation::new(
        scheduler,
        source,
        Box::new(sink),
        notifier,
        StationSettings::from_config(&config),
    );

    if let Some(url) = &config.server_url {
        let client = RecorderClient::new(url)?;
        println!("✓ Forwarding swipes to {}", client.swipe_url());
        station = station.with_forwarder(Box::new(client));
    }

    println!(
        "\n🚀 Accepting swipes {} - {}\n",
        window.open_time.format("%H:%M"),
        window.close_time.format("%H:%M")
    );
    info!(
        location = ?config.location,
        server = ?config.server_url,
        "station configured"
    );

    station.run()
}

#[cfg(not(feature = "station"))]
fn main() -> Result<()> {
    eprintln!("❌ Station mode not available!");
    eprintln!("   Rebuild with: cargo build --features station");
    eprintln!("   Or run the recorder: cargo run --bin swipe-recorder --features server");
    std::process::exit(1);
}
