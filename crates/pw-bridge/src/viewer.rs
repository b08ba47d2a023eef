const INDEX_TEMPLATE: &str = include_str!("../assets/index.html");

/// The viewer page with the client poll period (milliseconds) filled in.
pub fn render_index(poll_interval_secs: u64) -> String {
    INDEX_TEMPLATE.replace(
        "__POLL_MS__",
        &poll_interval_secs.saturating_mul(1000).to_string(),
    )
}
