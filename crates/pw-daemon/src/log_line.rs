//! Worker log line grammar.
//!
//! ```text
//! [<timestamp>] task="<label>" provider=<token> model=<token> duration=<int>s exit=<int> output=<path>
//! ```
//!
//! Fields appear in exactly this order separated by whitespace; anything
//! after the output path is ignored. Lines that do not match are skipped.

use std::path::Path;
use std::sync::LazyLock;

use pw_core::types::ActivityEvent;
use regex::Regex;

static LOG_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^\[([^\]]+)\]\s+task="([^"]+)"\s+provider=(\S+)\s+model=(\S+)\s+duration=(\d+)s\s+exit=(\d+)\s+output=(\S+)"#,
    )
    .expect("log line pattern is valid")
});

/// Parse one line into an invocation event.
///
/// `output` is reported relative to `project_root` when it lies inside it,
/// otherwise as its bare file name.
pub fn parse_log_line(line: &str, project_root: &Path) -> Option<ActivityEvent> {
    let caps = LOG_LINE.captures(line.trim())?;
    let duration = caps[5].parse().ok()?;
    let exit = caps[6].parse().ok()?;
    Some(ActivityEvent::Invocation {
        time: caps[1].to_string(),
        task: caps[2].to_string(),
        provider: caps[3].to_string(),
        model: caps[4].to_string(),
        duration,
        exit,
        output: display_output(&caps[7], project_root),
    })
}

fn display_output(raw: &str, project_root: &Path) -> String {
    let path = Path::new(raw);
    match path.strip_prefix(project_root) {
        Ok(rel) if !rel.as_os_str().is_empty() => rel.to_string_lossy().into_owned(),
        _ => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| raw.to_string()),
    }
}
