//! Formatters available to every template.
//!
//! These give the primitive value types a `value("format")` shape: dates
//! take standard shortcuts or a `time` format description, numbers take
//! a letter plus optional precision (`F2`, `N0`, `X8`, ...).

use std::sync::LazyLock;

use time::format_description::{self, well_known::Rfc3339};
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

use super::{FormatterDescriptor, FormatterRegistry, Param, TypeSpec};
use crate::error::BoxError;
use crate::value::{format_datetime, Value};

static GLOBAL: LazyLock<FormatterRegistry> = LazyLock::new(|| {
    FormatterRegistry::new()
        .with(
            FormatterDescriptor::new(
                "datetime.format",
                TypeSpec::DateTime,
                TypeSpec::String,
                datetime_formatter,
            )
            .param(Param::source("value"))
            .param(Param::new("format", TypeSpec::String)),
        )
        .with(
            FormatterDescriptor::new(
                "number.format",
                TypeSpec::Number,
                TypeSpec::String,
                number_formatter,
            )
            .param(Param::source("value"))
            .param(Param::new("format", TypeSpec::String)),
        )
});

/// The process-wide fallback registry.
pub fn global() -> &'static FormatterRegistry {
    &GLOBAL
}

fn datetime_formatter(args: Vec<Value>) -> Result<Value, BoxError> {
    match args.as_slice() {
        [Value::DateTime(dt), Value::Str(spec)] => Ok(Value::Str(format_date(dt, spec)?)),
        [Value::DateTime(dt), Value::Null] => Ok(Value::Str(format_datetime(dt))),
        _ => Err("datetime formatter expects a date and a format string".into()),
    }
}

fn number_formatter(args: Vec<Value>) -> Result<Value, BoxError> {
    match args.as_slice() {
        [v @ (Value::Int(_) | Value::Float(_)), Value::Str(spec)] => {
            Ok(Value::Str(format_number(v, spec)?))
        }
        [v, Value::Null] => Ok(Value::Str(v.to_string())),
        _ => Err("number formatter expects a number and a format string".into()),
    }
}

/// Format a date with a single-letter shortcut or a `time` format
/// description such as `[year]-[month]`.
pub fn format_date(dt: &OffsetDateTime, spec: &str) -> Result<String, BoxError> {
    let description = match spec {
        "d" => "[month]/[day]/[year]",
        "D" => "[weekday], [month repr:long] [day padding:none], [year]",
        "t" => "[hour]:[minute]",
        "T" => "[hour]:[minute]:[second]",
        "g" => "[month]/[day]/[year] [hour]:[minute]",
        "G" => "[month]/[day]/[year] [hour]:[minute]:[second]",
        "s" => "[year]-[month]-[day]T[hour]:[minute]:[second]",
        "u" => {
            let items = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]Z");
            return Ok(dt.to_offset(UtcOffset::UTC).format(items)?);
        }
        "o" | "O" => return Ok(dt.format(&Rfc3339)?),
        custom => custom,
    };
    let items = format_description::parse_borrowed::<2>(description)?;
    Ok(dt.format(&items)?)
}

/// Format a number. The first letter picks the style, the remaining digits
/// the precision (or minimum width for `D` and `X`).
pub fn format_number(value: &Value, spec: &str) -> Result<String, BoxError> {
    let mut chars = spec.chars();
    let kind = chars.next().ok_or("empty numeric format")?;
    let precision = match chars.as_str() {
        "" => None,
        digits => Some(
            digits
                .parse::<usize>()
                .map_err(|_| format!("invalid precision in numeric format '{}'", spec))?,
        ),
    };
    let float = match value {
        Value::Int(i) => *i as f64,
        Value::Float(f) => *f,
        other => return Err(format!("cannot apply numeric format to {}", other.type_name()).into()),
    };

    match kind {
        'F' | 'f' => Ok(format!("{:.*}", precision.unwrap_or(2), float)),
        'N' | 'n' => Ok(group_thousands(&format!("{:.*}", precision.unwrap_or(2), float))),
        'P' | 'p' => Ok(format!("{:.*}%", precision.unwrap_or(2), float * 100.0)),
        'E' => Ok(format!("{:.*e}", precision.unwrap_or(6), float).to_uppercase()),
        'e' => Ok(format!("{:.*e}", precision.unwrap_or(6), float)),
        'D' | 'd' | 'X' | 'x' => {
            let Value::Int(i) = value else {
                return Err(format!("numeric format '{}' requires an integer", spec).into());
            };
            let width = precision.unwrap_or(0);
            Ok(match kind {
                'X' => format!("{:0width$X}", i, width = width),
                'x' => format!("{:0width$x}", i, width = width),
                _ if *i < 0 => format!("-{:0width$}", i.unsigned_abs(), width = width),
                _ => format!("{:0width$}", i, width = width),
            })
        }
        _ => Err(format!("unsupported numeric format '{}'", spec).into()),
    }
}

fn group_thousands(text: &str) -> String {
    let (sign, unsigned) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text),
    };
    let (int_part, fraction) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };
    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    match fraction {
        Some(f) => format!("{}{}.{}", sign, grouped, f),
        None => format!("{}{}", sign, grouped),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn date_shortcuts() {
        let dt = datetime!(2024-03-05 14:07:09 UTC);
        assert_eq!(format_date(&dt, "d").unwrap(), "03/05/2024");
        assert_eq!(format_date(&dt, "D").unwrap(), "Tuesday, March 5, 2024");
        assert_eq!(format_date(&dt, "T").unwrap(), "14:07:09");
        assert_eq!(format_date(&dt, "s").unwrap(), "2024-03-05T14:07:09");
        assert_eq!(format_date(&dt, "u").unwrap(), "2024-03-05 14:07:09Z");
        assert_eq!(format_date(&dt, "o").unwrap(), "2024-03-05T14:07:09Z");
    }

    #[test]
    fn date_custom_description() {
        let dt = datetime!(2024-03-05 14:07:09 UTC);
        assert_eq!(format_date(&dt, "[year]/[month]").unwrap(), "2024/03");
        assert!(format_date(&dt, "[nonsense]").is_err());
        // version 2 descriptions escape brackets with a backslash
        assert_eq!(format_date(&dt, r"\[[year]\]").unwrap(), "[2024]");
    }

    #[test]
    fn universal_shortcut_converts_to_utc() {
        let dt = datetime!(2024-03-05 14:07:09 +02:00);
        assert_eq!(format_date(&dt, "u").unwrap(), "2024-03-05 12:07:09Z");
    }

    #[test]
    fn numeric_formats() {
        assert_eq!(format_number(&Value::Float(3.14159), "F2").unwrap(), "3.14");
        assert_eq!(format_number(&Value::Int(3), "F").unwrap(), "3.00");
        assert_eq!(
            format_number(&Value::Float(-1234567.891), "N1").unwrap(),
            "-1,234,567.9"
        );
        assert_eq!(format_number(&Value::Float(0.256), "P1").unwrap(), "25.6%");
        assert_eq!(format_number(&Value::Int(42), "D5").unwrap(), "00042");
        assert_eq!(format_number(&Value::Int(-42), "D4").unwrap(), "-0042");
        assert_eq!(format_number(&Value::Int(255), "X4").unwrap(), "00FF");
        assert_eq!(format_number(&Value::Int(255), "x").unwrap(), "ff");
        assert_eq!(format_number(&Value::Float(1500.0), "E2").unwrap(), "1.50E3");
    }

    #[test]
    fn numeric_format_errors() {
        assert!(format_number(&Value::Float(1.5), "D").is_err());
        assert!(format_number(&Value::Int(1), "Q").is_err());
        assert!(format_number(&Value::Int(1), "Fx").is_err());
    }

    #[test]
    fn global_registry_covers_dates_and_numbers() {
        let registry = global();
        assert_eq!(registry.accepting(&TypeSpec::DateTime).count(), 1);
        assert_eq!(registry.accepting(&TypeSpec::Int).count(), 1);
        assert_eq!(registry.accepting(&TypeSpec::String).count(), 0);
    }
}
