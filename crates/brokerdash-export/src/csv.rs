//! CSV writer and reader.
//!
//! Output is UTF-8 with a leading BOM (so spreadsheet tools pick the right
//! encoding for Arabic titles) and CRLF record separators. A field is quoted
//! when it contains a comma, a quote, CR or LF; inner quotes are doubled.

use brokerdash_analytics::{EngagementSnapshot, Trend};

use crate::error::{Error, Result};

const BOM: char = '\u{feff}';
const CRLF: &str = "\r\n";

pub const HEADER: [&str; 16] = [
  "title",
  "location",
  "views",
  "clicks",
  "whatsappMessages",
  "phoneCalls",
  "bookings",
  "shares",
  "engagementScore",
  "trend",
  "percentageChange",
  "conversionRate",
  "currentViewers",
  "topSource",
  "topDevice",
  "topLocation",
];

// ─── Writing ─────────────────────────────────────────────────────────────────

/// Render `snapshots` as a CSV document, one row per snapshot in order.
pub fn export_csv(snapshots: &[EngagementSnapshot]) -> String {
  let mut out = String::new();
  out.push(BOM);
  push_record(&mut out, HEADER.iter().map(|h| (*h).to_owned()));
  for snapshot in snapshots {
    push_record(&mut out, row(snapshot));
  }
  out
}

fn row(s: &EngagementSnapshot) -> [String; 16] {
  let c = &s.counts;
  [
    s.title.clone(),
    s.location.label(),
    c.views.to_string(),
    c.clicks.to_string(),
    c.whatsapp_messages.to_string(),
    c.phone_calls.to_string(),
    c.bookings.to_string(),
    c.shares.to_string(),
    format_number(s.score),
    trend_label(s.trend).to_owned(),
    format!("{:.1}", s.percentage_change),
    format!("{:.1}", s.conversion_rate),
    s.current_viewer_count.to_string(),
    s.top_source.map(|t| t.to_string()).unwrap_or_default(),
    s.top_device.map(|t| t.to_string()).unwrap_or_default(),
    s.top_location.clone().unwrap_or_default(),
  ]
}

fn trend_label(trend: Trend) -> &'static str {
  match trend {
    Trend::Up => "up",
    Trend::Down => "down",
    Trend::Stable => "stable",
  }
}

/// Whole numbers without a fractional part, anything else as-is.
fn format_number(x: f64) -> String {
  if x.fract() == 0.0 && x.abs() < 1e15 {
    format!("{}", x as i64)
  } else {
    x.to_string()
  }
}

fn push_record(out: &mut String, fields: impl IntoIterator<Item = String>) {
  for (i, field) in fields.into_iter().enumerate() {
    if i > 0 {
      out.push(',');
    }
    out.push_str(&escape_field(&field));
  }
  out.push_str(CRLF);
}

fn escape_field(s: &str) -> String {
  if s.contains([',', '"', '\r', '\n']) {
    format!("\"{}\"", s.replace('"', "\"\""))
  } else {
    s.to_owned()
  }
}

// ─── Reading ─────────────────────────────────────────────────────────────────

/// Parse a CSV document back into records of fields.
///
/// Accepts CRLF or bare LF separators and an optional leading BOM. Quoted
/// fields may span lines. A final empty line does not produce a record.
pub fn parse_csv(text: &str) -> Result<Vec<Vec<String>>> {
  let text = text.strip_prefix(BOM).unwrap_or(text);
  let mut records = Vec::new();
  let mut record: Vec<String> = Vec::new();
  let mut field = String::new();
  let mut chars = text.chars().peekable();
  let mut line = 1;
  // Whether anything has been read for the current record.
  let mut started = false;

  while let Some(ch) = chars.next() {
    match ch {
      '"' if field.is_empty() => {
        started = true;
        let opened_on = line;
        loop {
          match chars.next() {
            Some('"') if chars.peek() == Some(&'"') => {
              chars.next();
              field.push('"');
            }
            Some('"') => break,
            Some(c) => {
              if c == '\n' {
                line += 1;
              }
              field.push(c);
            }
            None => return Err(Error::UnterminatedQuote { line: opened_on }),
          }
        }
        if !matches!(chars.peek(), None | Some(',' | '\r' | '\n')) {
          return Err(Error::TrailingAfterQuote { line });
        }
      }
      ',' => {
        started = true;
        record.push(std::mem::take(&mut field));
      }
      '\r' if chars.peek() == Some(&'\n') => {}
      '\n' => {
        line += 1;
        if started {
          record.push(std::mem::take(&mut field));
          records.push(std::mem::take(&mut record));
          started = false;
        }
      }
      c => {
        started = true;
        field.push(c);
      }
    }
  }

  if started {
    record.push(field);
    records.push(record);
  }
  Ok(records)
}

#[cfg(test)]
mod tests {
  use brokerdash_analytics::{AnalyticsConfig, snapshot::aggregate};
  use brokerdash_core::{
    listing::Listing,
    sample::{DeviceType, ListingActivity, TrafficSource, ViewerSample},
  };
  use chrono::Utc;

  use super::*;

  fn snapshot(title: &str, city: Option<&str>, district: Option<&str>) -> EngagementSnapshot {
    let now = Utc::now();
    let mut listing = Listing::new("1", now);
    listing.title = title.into();
    listing.location.city = city.map(str::to_owned);
    listing.location.district = district.map(str::to_owned);

    let mut activity = ListingActivity::empty("1");
    activity.current.views = 110;
    activity.current.clicks = 4;
    activity.current.bookings = 11;
    activity.previous.views = 100;
    activity.samples.push(ViewerSample::new(
      "1",
      now,
      DeviceType::Mobile,
      TrafficSource::WhatsappLink,
      Some("Riyadh".into()),
    ));
    aggregate(&listing, &activity, &AnalyticsConfig::default(), now)
  }

  #[test]
  fn header_plus_one_row_per_snapshot() {
    let snaps = vec![
      snapshot("A", Some("Riyadh"), None),
      snapshot("B", None, None),
      snapshot("C", None, Some("Olaya")),
    ];
    let csv = export_csv(&snaps);

    assert!(csv.starts_with('\u{feff}'));
    assert!(csv.ends_with("\r\n"));
    let records = parse_csv(&csv).unwrap();
    assert_eq!(records.len(), 4);
    assert_eq!(records[0], HEADER.map(str::to_owned).to_vec());
    assert!(records.iter().all(|r| r.len() == 16));
  }

  #[test]
  fn row_values() {
    let csv = export_csv(&[snapshot("Villa", Some("Riyadh"), Some("Olaya"))]);
    let records = parse_csv(&csv).unwrap();
    assert_eq!(records[1], vec![
      "Villa",
      "Riyadh - Olaya",
      "110",
      "4",
      "0",
      "0",
      "11",
      "0",
      "173",
      "up",
      "10.0",
      "10.0",
      "1",
      "whatsapp_link",
      "mobile",
      "Riyadh",
    ]);
  }

  #[test]
  fn awkward_titles_survive_a_round_trip() {
    let titles = [
      "Villa, sea view",
      "The \"best\" flat",
      "two\r\nlines",
      "شقة، حي النرجس",
      "",
    ];
    let snaps: Vec<EngagementSnapshot> =
      titles.iter().map(|t| snapshot(t, None, None)).collect();

    let records = parse_csv(&export_csv(&snaps)).unwrap();
    let parsed: Vec<&str> = records[1..].iter().map(|r| r[0].as_str()).collect();
    assert_eq!(parsed, titles);
  }

  #[test]
  fn quoting_only_when_needed() {
    assert_eq!(escape_field("plain"), "plain");
    assert_eq!(escape_field("a,b"), "\"a,b\"");
    assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    assert_eq!(escape_field("cr\r"), "\"cr\r\"");
  }

  #[test]
  fn empty_export_is_just_the_header() {
    let records = parse_csv(&export_csv(&[])).unwrap();
    assert_eq!(records.len(), 1);
  }

  #[test]
  fn unterminated_quote_is_an_error() {
    assert!(matches!(
      parse_csv("a,\"b\r\nc"),
      Err(Error::UnterminatedQuote { line: 1 })
    ));
    assert!(matches!(
      parse_csv("\"a\"b"),
      Err(Error::TrailingAfterQuote { line: 1 })
    ));
  }
}
