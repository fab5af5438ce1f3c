//! Clustering listings by city for grouped dashboard views.

use std::collections::BTreeMap;

use brokerdash_core::listing::Listing;
use serde::Serialize;

/// Bucket for listings without a city.
pub const UNSPECIFIED_CITY: &str = "unspecified";

#[derive(Debug, Clone, Serialize)]
pub struct CityGroup {
  pub city:     String,
  pub listings: Vec<Listing>,
}

/// Group listings by `location.city`.
///
/// Groups are ordered by city name with [`UNSPECIFIED_CITY`] last. Inside a
/// group, pinned listings come first, then newest `created_at` first, then
/// canonical ID.
pub fn group_by_city(listings: impl IntoIterator<Item = Listing>) -> Vec<CityGroup> {
  let mut named: BTreeMap<String, Vec<Listing>> = BTreeMap::new();
  let mut unspecified = Vec::new();

  for listing in listings {
    match city_key(&listing) {
      Some(city) => named.entry(city).or_default().push(listing),
      None => unspecified.push(listing),
    }
  }

  let mut groups: Vec<CityGroup> = named
    .into_iter()
    .map(|(city, listings)| CityGroup { city, listings })
    .collect();
  if !unspecified.is_empty() {
    groups.push(CityGroup {
      city:     UNSPECIFIED_CITY.to_owned(),
      listings: unspecified,
    });
  }

  for group in &mut groups {
    group.listings.sort_by(|a, b| {
      b.pinned
        .cmp(&a.pinned)
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| a.canonical_id.cmp(&b.canonical_id))
    });
  }
  groups
}

fn city_key(listing: &Listing) -> Option<String> {
  listing
    .location
    .city
    .as_deref()
    .map(str::trim)
    .filter(|c| !c.is_empty())
    .map(str::to_owned)
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone, Utc};

  use super::*;

  fn listing(id: &str, city: Option<&str>, age_days: i64, pinned: bool) -> Listing {
    let base = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let mut l = Listing::new(id, base - Duration::days(age_days));
    l.location.city = city.map(str::to_owned);
    l.pinned = pinned;
    l
  }

  #[test]
  fn missing_or_blank_city_goes_to_unspecified_last() {
    let groups = group_by_city(vec![
      listing("1", None, 0, false),
      listing("2", Some("Riyadh"), 0, false),
      listing("3", Some("  "), 0, false),
      listing("4", Some("Abha"), 0, false),
    ]);
    let cities: Vec<&str> = groups.iter().map(|g| g.city.as_str()).collect();
    assert_eq!(cities, vec!["Abha", "Riyadh", UNSPECIFIED_CITY]);
    assert_eq!(groups[2].listings.len(), 2);
  }

  #[test]
  fn pinned_first_then_newest() {
    let groups = group_by_city(vec![
      listing("old", Some("Jeddah"), 10, false),
      listing("new", Some("Jeddah"), 1, false),
      listing("pinned-old", Some("Jeddah"), 30, true),
    ]);
    let ids: Vec<&str> = groups[0]
      .listings
      .iter()
      .map(|l| l.canonical_id.as_str())
      .collect();
    assert_eq!(ids, vec!["pinned-old", "new", "old"]);
  }

  #[test]
  fn equal_timestamps_fall_back_to_id() {
    let groups = group_by_city(vec![
      listing("b", Some("Taif"), 0, false),
      listing("a", Some("Taif"), 0, false),
    ]);
    assert_eq!(groups[0].listings[0].canonical_id, "a");
  }

  #[test]
  fn empty_input_has_no_groups() {
    assert!(group_by_city(Vec::new()).is_empty());
  }
}
