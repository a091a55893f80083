use crate::metrics::SwingStats;
use crate::models::SessionSummary;

/// Skriver øktrapporten til stdout.
pub fn print_session_report(summary: &SessionSummary, stats: Option<&SwingStats>) {
    println!("--- Session Report ---");
    println!("Started: {}", summary.timestamp_iso);
    println!("Duration: {}", format_duration(summary.duration_sec));
    println!(
        "Shots: {} (forehand {}, backhand {}, unclassified {})",
        summary.shot_count, summary.forehand_count, summary.backhand_count, summary.unclassified_count
    );
    println!("Fastest swing: {:.1} mph", summary.fastest_swing);
    match (summary.heart_rate, summary.avg_heart_rate) {
        (Some(hr), Some(avg)) => println!("Heart rate: {:.0} bpm (avg {:.0})", hr, avg),
        (Some(hr), None) => println!("Heart rate: {:.0} bpm", hr),
        _ => println!("Heart rate: n/a"),
    }
    if let Some(s) = stats {
        print_swing_stats(s);
    }
}

pub fn print_swing_stats(stats: &SwingStats) {
    println!("--- Swing Stats ---");
    println!("Swings: {}", stats.count);
    println!(
        "Peak acceleration: avg {:.2} g, max {:.2} g",
        stats.avg_peak_acceleration, stats.max_peak_acceleration
    );
    println!(
        "Angular velocity: avg {:.2} rad/s, max {:.2} rad/s",
        stats.avg_angular_velocity, stats.max_angular_velocity
    );
    println!("Racket-head speed: avg {:.1} mph, max {:.1} mph", stats.avg_speed_mph, stats.max_speed_mph);
}

/// mm:ss
pub fn format_duration(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 { seconds.round() as u64 } else { 0 };
    format!("{:02}:{:02}", total / 60, total % 60)
}
