//! Statistics display and formatting

use simplelink_protocol::EngineStats;
use std::time::Duration;

/// Format bytes in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format duration in human-readable form
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Share of originated messages that were acknowledged
pub fn delivery_ratio(stats: &EngineStats) -> Option<f64> {
    let settled = stats.acked + stats.expired;
    if settled == 0 {
        None
    } else {
        Some(stats.acked as f64 / settled as f64)
    }
}

/// Render the full statistics table
pub fn render_stats(stats: &EngineStats, uptime: Duration) -> String {
    let ratio = match delivery_ratio(stats) {
        Some(r) => format!("{:.1}%", r * 100.0),
        None => "N/A".to_string(),
    };

    let rows = [
        ("Uptime", format_duration(uptime)),
        (
            "Frames",
            format!("{} sent / {} received", stats.frames_out, stats.frames_in),
        ),
        (
            "Bytes",
            format!(
                "{} sent / {} received",
                format_bytes(stats.bytes_out),
                format_bytes(stats.bytes_in)
            ),
        ),
        (
            "Delivered",
            format!(
                "{} ({} duplicates)",
                stats.delivered, stats.duplicates
            ),
        ),
        ("Observed", stats.observed.to_string()),
        (
            "Relayed",
            format!("{} ({} dropped)", stats.relayed, stats.tx_dropped),
        ),
        (
            "Acked",
            format!("{} / {} expired ({})", stats.acked, stats.expired, ratio),
        ),
        (
            "Retries",
            format!("{} ({} deferrals)", stats.retries, stats.deferrals),
        ),
        (
            "Rejected",
            format!("{} CRC / {} malformed", stats.crc_failures, stats.malformed),
        ),
        ("I/O errors", stats.transport_errors.to_string()),
    ];

    let mut out = String::new();
    out.push_str("┌──────────────────────────────────────────────────┐\n");
    out.push_str("│ LINK STATISTICS                                  │\n");
    out.push_str("├──────────────────────────────────────────────────┤\n");
    for (label, value) in rows.iter() {
        out.push_str(&format!("│ {:<10} {:<37} │\n", label, value));
    }
    out.push_str("└──────────────────────────────────────────────────┘");
    out
}

/// Display the full statistics table
pub fn display_stats(stats: &EngineStats, uptime: Duration) {
    println!("\n{}", render_stats(stats, uptime));
}

/// One-line summary
pub fn compact_stats(stats: &EngineStats, outstanding: usize) -> String {
    format!(
        "tx {} rx {} | acked {} expired {} retries {} | outstanding {}",
        stats.frames_out, stats.frames_in, stats.acked, stats.expired, stats.retries, outstanding
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(2 * 1024 * 1024), "2.00 MB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h 01m 01s");
    }

    #[test]
    fn test_delivery_ratio() {
        let mut stats = EngineStats::default();
        assert_eq!(delivery_ratio(&stats), None);

        stats.acked = 3;
        stats.expired = 1;
        assert_eq!(delivery_ratio(&stats), Some(0.75));
    }

    #[test]
    fn test_render_stats() {
        let stats = EngineStats {
            frames_out: 7,
            acked: 2,
            crc_failures: 1,
            ..EngineStats::default()
        };
        let table = render_stats(&stats, Duration::from_secs(65));

        assert!(table.contains("1m 05s"));
        assert!(table.contains("7 sent / 0 received"));
        assert!(table.contains("1 CRC / 0 malformed"));
        assert!(table.contains("0 (0 dropped)"));
        assert!(table.contains("100.0%"));
        assert_eq!(
            compact_stats(&stats, 4),
            "tx 7 rx 0 | acked 2 expired 0 retries 0 | outstanding 4"
        );
    }
}
