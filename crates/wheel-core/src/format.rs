use crate::reading::TickRecord;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// How RPM values are rendered. Both modes truncate toward zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    #[default]
    Integer,
    OneDecimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Time,
    FrontCount,
    FrontRpm,
    RearCount,
    RearRpm,
    DeltaRpm,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::Time,
        Field::FrontCount,
        Field::FrontRpm,
        Field::RearCount,
        Field::RearRpm,
        Field::DeltaRpm,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Time => "TIME",
            Self::FrontCount => "F.CT",
            Self::FrontRpm => "F.RPM",
            Self::RearCount => "R.CT",
            Self::RearRpm => "R.RPM",
            Self::DeltaRpm => "D.RPM",
        }
    }
}

pub fn format_rpm(rpm: f64, precision: Precision) -> String {
    if rpm.is_nan() {
        return "NaN".to_string();
    }
    if rpm.is_infinite() {
        return if rpm > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    match precision {
        Precision::Integer => format!("{:.0}", rpm.trunc()),
        Precision::OneDecimal => format!("{:.1}", (rpm * 10.0).trunc() / 10.0),
    }
}

/// `HH:MM:SS.mmm` in local time.
pub fn format_clock(time: &DateTime<Local>) -> String {
    time.format("%H:%M:%S%.3f").to_string()
}

/// Comma-separated line layout shared by the header and every data line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineFormat {
    /// Leading column written verbatim on every line, header included.
    pub tag: Option<String>,
    pub fields: Vec<Field>,
    pub precision: Precision,
}

impl Default for LineFormat {
    fn default() -> Self {
        Self {
            tag: Some("data".to_string()),
            fields: Field::ALL.to_vec(),
            precision: Precision::Integer,
        }
    }
}

impl LineFormat {
    pub fn header(&self) -> String {
        self.join(self.fields.iter().map(|f| f.label().to_string()))
    }

    pub fn line(&self, record: &TickRecord) -> String {
        self.join(self.fields.iter().map(|f| self.render(*f, record)))
    }

    fn render(&self, field: Field, record: &TickRecord) -> String {
        let count = |c: Option<u64>| c.map(|c| c.to_string()).unwrap_or_default();
        match field {
            Field::Time => format_clock(&record.wall_time),
            Field::FrontCount => count(record.front.count),
            Field::FrontRpm => format_rpm(record.front.rpm, self.precision),
            Field::RearCount => count(record.rear.count),
            Field::RearRpm => format_rpm(record.rear.rpm, self.precision),
            Field::DeltaRpm => format_rpm(record.reading.delta(), self.precision),
        }
    }

    fn join(&self, columns: impl Iterator<Item = String>) -> String {
        self.tag
            .iter()
            .cloned()
            .chain(columns)
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::WheelSample;
    use chrono::TimeZone;

    fn record(front: WheelSample, rear: WheelSample) -> TickRecord {
        let wall = Local.with_ymd_and_hms(2024, 5, 12, 14, 3, 9).unwrap()
            + chrono::Duration::milliseconds(42);
        TickRecord::new(wall, 1000, front, rear)
    }

    #[test]
    fn integer_precision_drops_the_fraction() {
        assert_eq!(format_rpm(600.0, Precision::Integer), "600");
        assert_eq!(format_rpm(599.99, Precision::Integer), "599");
        assert_eq!(format_rpm(-12.7, Precision::Integer), "-12");
    }

    #[test]
    fn one_decimal_keeps_first_digit_only() {
        assert_eq!(format_rpm(600.0, Precision::OneDecimal), "600.0");
        assert_eq!(format_rpm(5.99, Precision::OneDecimal), "5.9");
        assert_eq!(format_rpm(-3.47, Precision::OneDecimal), "-3.4");
    }

    #[test]
    fn non_finite_values_are_spelled_out() {
        assert_eq!(format_rpm(f64::INFINITY, Precision::Integer), "Infinity");
        assert_eq!(format_rpm(f64::NEG_INFINITY, Precision::OneDecimal), "-Infinity");
        assert_eq!(format_rpm(f64::NAN, Precision::Integer), "NaN");
    }

    #[test]
    fn default_header_matches_column_layout() {
        assert_eq!(
            LineFormat::default().header(),
            "data,TIME,F.CT,F.RPM,R.CT,R.RPM,D.RPM"
        );
    }

    #[test]
    fn default_line_renders_every_field() {
        let line = LineFormat::default().line(&record(
            WheelSample {
                count: Some(10),
                rpm: 600.0,
            },
            WheelSample {
                count: Some(8),
                rpm: 480.0,
            },
        ));
        assert_eq!(line, "data,14:03:09.042,10,600,8,480,120");
    }

    #[test]
    fn frequency_sources_leave_count_columns_empty() {
        let format = LineFormat {
            tag: None,
            fields: vec![Field::FrontCount, Field::FrontRpm, Field::DeltaRpm],
            precision: Precision::OneDecimal,
        };
        let line = format.line(&record(
            WheelSample {
                count: None,
                rpm: 612.34,
            },
            WheelSample {
                count: None,
                rpm: 600.0,
            },
        ));
        assert_eq!(format.header(), "F.CT,F.RPM,D.RPM");
        assert_eq!(line, ",612.3,12.3");
    }
}
