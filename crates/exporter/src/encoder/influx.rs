use core::fmt::Write;

use super::escape_tag_value;
use super::FieldValue;
use super::MetricsEncoder;

/// InfluxDB line protocol encoder
#[derive(Debug, Default, Clone, Copy)]
pub struct InfluxEncoder;

impl InfluxEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl MetricsEncoder for InfluxEncoder {
    fn encode_metrics(
        &self,
        measurement: &str,
        tags: &[(&str, &str)],
        fields: &[(&str, FieldValue)],
        timestamp: i64,
    ) -> String {
        let mut line = String::from(measurement);

        for (key, value) in tags.iter().filter(|(_, value)| !value.is_empty()) {
            // writing into a String cannot fail
            let _ = write!(line, ",{key}={}", escape_tag_value(value));
        }

        for (index, (key, value)) in fields.iter().enumerate() {
            let separator = if index == 0 { ' ' } else { ',' };
            let _ = write!(line, "{separator}{key}={value}");
        }

        let _ = writeln!(line, " {timestamp}");
        line
    }
}
