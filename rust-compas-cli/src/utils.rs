//! Utility functions for the COMPAS CLI

use log::debug;
use rust_compas_common::{metrics::RelayMetrics, ndn::Data};
use std::time::{Duration, Instant};

/// Format a duration as a human-readable string
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();

    if total_secs < 60 {
        format!("{}.{:03}s", total_secs, duration.subsec_millis())
    } else if total_secs < 3600 {
        format!("{}m {}s", total_secs / 60, total_secs % 60)
    } else {
        format!("{}h {}m {}s", total_secs / 3600, (total_secs % 3600) / 60, total_secs % 60)
    }
}

/// Measures how long an operation took
pub struct Timer {
    start: Instant,
    operation: String,
}

impl Timer {
    pub fn new(operation: &str) -> Self {
        debug!("Starting operation: {}", operation);
        Self {
            start: Instant::now(),
            operation: operation.to_string(),
        }
    }

    pub fn elapsed_str(&self) -> String {
        format_duration(self.start.elapsed())
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        debug!("Operation '{}' took {}", self.operation, self.elapsed_str());
    }
}

/// Print a Data packet, as text when its content is UTF-8
pub fn print_data(data: &Data) {
    println!("  Name: {}", data.name);
    if let Some(ms) = data.freshness_ms {
        println!("  Freshness Period: {} ms", ms);
    }

    let content = &data.content;
    match std::str::from_utf8(content) {
        Ok(text) if content.len() <= 100 => println!("  Content: {}", text),
        _ if content.len() <= 100 => println!("  Content: {:?}", content),
        _ => println!("  Content: {} bytes", content.len()),
    }
}

/// Print a section header in the CLI output
pub fn print_header(title: &str) {
    println!("\n{}", title);
    println!("{}", "=".repeat(title.len()));
}

/// Print the counters of a relay that has stopped
pub fn print_metrics(metrics: &RelayMetrics) {
    print_header("Relay statistics");
    println!("  Interests received:  {}", metrics.interests_received.value());
    println!("  Interests forwarded: {}", metrics.interests_forwarded.value());
    println!("  Data received:       {}", metrics.data_received.value());
    println!("  Data forwarded:      {}", metrics.data_forwarded.value());
    println!("  Cache hits:          {}", metrics.cs_hits.value());
    println!("  PAM received:        {}", metrics.pam_received.value());
    println!("  NAM sent:            {}", metrics.nam_sent.value());
    println!("  Parent timeouts:     {}", metrics.parent_timeouts.value());
    println!("  Faces aged out:      {}", metrics.faces_aged_out.value());
    let latency = &metrics.satisfaction_latency_ms;
    if latency.count() > 0 {
        println!("  Mean latency:        {:.1} ms", latency.average());
        for (bound, count) in latency.counts().into_iter().filter(|(_, c)| *c > 0) {
            println!("    <= {:>5} ms:       {}", bound, count);
        }
    }
}
