use anyhow::Result;
use eqperf::StreamCheck;
use serde::Serialize;
use serde_json::Value;

pub struct CliLogger {
    json: bool,
    no_color: bool,
}

impl CliLogger {
    pub fn new(json: bool, no_color: bool) -> Self {
        Self { json, no_color }
    }

    /// Prints a flat record as `key: value` lines, or one JSON line.
    pub fn print_serialized<T: Serialize>(&self, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        if self.json {
            println!("{value}");
        } else {
            println!("{}", self.render_fields(&value));
        }
        Ok(())
    }

    /// Prints a text report under a one-line heading.
    pub fn print_report(&self, heading: &str, body: &str) {
        println!("{}", self.style(heading, "36;1"));
        println!("{}", body.trim_end());
    }

    pub fn print_checks(&self, session: &str, checks: &[StreamCheck]) -> Result<()> {
        if self.json {
            let out = serde_json::json!({
                "session": session,
                "balanced": checks.iter().all(StreamCheck::is_balanced),
                "streams": checks,
            });
            println!("{out}");
            return Ok(());
        }

        let mut out = String::new();
        out.push_str(&format!("{} {}\n", self.style("session", "90"), session));
        for check in checks {
            let status = if check.is_balanced() {
                self.style("OK", "32;1")
            } else {
                self.style("UNBALANCED", "31;1")
            };
            out.push_str(&format!(
                "{} {} unmatched_finishes={} open_at_end={} clears_while_open={}\n",
                status,
                check.stream,
                check.unmatched_finishes,
                check.open_at_end,
                check.clears_while_open
            ));
        }
        println!("{}", out.trim_end());
        Ok(())
    }

    pub fn print_error(&self, msg: &str) {
        self.notice("error", "31;1", msg);
    }

    pub fn print_warning(&self, msg: &str) {
        self.notice("warn", "33;1", msg);
    }

    // Diagnostics always go to stderr so report output stays parseable.
    fn notice(&self, level: &str, ansi: &str, msg: &str) {
        if self.json {
            eprintln!("{}", serde_json::json!({ "level": level, "message": msg }));
        } else {
            eprintln!("{} {msg}", self.style(level, ansi));
        }
    }

    fn render_fields(&self, value: &Value) -> String {
        let Value::Object(fields) = value else {
            return scalar(value);
        };
        fields
            .iter()
            .map(|(key, field)| {
                format!("{} {}", self.style(&format!("{key}:"), "90"), scalar(field))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn style(&self, text: &str, ansi: &str) -> String {
        if self.no_color {
            text.to_string()
        } else {
            format!("\x1b[{ansi}m{text}\x1b[0m")
        }
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_render_one_per_line() {
        let logger = CliLogger::new(false, true);
        let value = serde_json::json!({ "indent": 2, "unit": "ns", "format": "pretty" });
        let text = logger.render_fields(&value);
        let mut lines = text.lines().collect::<Vec<_>>();
        lines.sort();
        assert_eq!(lines, vec!["format: pretty", "indent: 2", "unit: ns"]);
    }

    #[test]
    fn scalars_render_without_quotes() {
        let logger = CliLogger::new(false, true);
        assert_eq!(logger.render_fields(&serde_json::json!("ns")), "ns");
        assert_eq!(logger.render_fields(&serde_json::json!(null)), "null");
    }
}
