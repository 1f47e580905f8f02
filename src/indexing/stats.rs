//! Global statistics ledger.
//!
//! Counts are kept per (category name, country, language) with either side
//! of the categorical key optional: "brands" is counted globally with no
//! country at all, "publishers" per country only, "issues" per country and
//! language. All mutation goes through signed deltas.

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Statistic category names.
pub const STAT_PUBLISHERS: &str = "publishers";
pub const STAT_INDICIA_PUBLISHERS: &str = "indicia publishers";
pub const STAT_BRANDS: &str = "brands";
pub const STAT_BRAND_GROUPS: &str = "brand groups";
pub const STAT_SERIES: &str = "series";
pub const STAT_ISSUES: &str = "issues";
pub const STAT_VARIANT_ISSUES: &str = "variant issues";
pub const STAT_ISSUE_INDEXES: &str = "issue indexes";
pub const STAT_STORIES: &str = "stories";
pub const STAT_COVERS: &str = "covers";

/// What one entity contributes to the statistics tables, as a named-integer
/// map. Empty maps mean "counts nothing".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CountMap(BTreeMap<&'static str, i64>);

impl CountMap {
    pub fn new() -> Self {
        CountMap(BTreeMap::new())
    }

    pub fn of(category: &'static str, count: i64) -> Self {
        let mut map = BTreeMap::new();
        map.insert(category, count);
        CountMap(map)
    }

    pub fn set(&mut self, category: &'static str, count: i64) {
        self.0.insert(category, count);
    }

    pub fn get(&self, category: &str) -> i64 {
        self.0.get(category).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, i64)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Per-category `new - old` over the union of both key sets, missing
    /// keys defaulting to 0.
    pub fn deltas(old: &CountMap, new: &CountMap) -> CountMap {
        let mut result = BTreeMap::new();
        for key in old.0.keys().chain(new.0.keys()) {
            result.insert(*key, new.get(key) - old.get(key));
        }
        CountMap(result)
    }

    pub fn is_zero(&self) -> bool {
        self.0.values().all(|v| *v == 0)
    }
}

/// The categorical key of a global statistics bucket.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatsBucket {
    pub country: Option<String>,
    pub language: Option<String>,
}

impl StatsBucket {
    pub fn country_only(country: &str) -> Self {
        StatsBucket {
            country: Some(country.to_string()),
            language: None,
        }
    }

    pub fn country_language(country: &str, language: &str) -> Self {
        StatsBucket {
            country: Some(country.to_string()),
            language: Some(language.to_string()),
        }
    }

    pub fn uncategorized() -> Self {
        StatsBucket::default()
    }
}

/// Decide whether an adjustment needs a full retract+reapply instead of an
/// in-place delta. A delta would land in the wrong bucket whenever the
/// categorical key itself changed, and is insufficient whenever the totals
/// differ.
pub fn needs_retract_reapply(
    old_counts: &CountMap,
    new_counts: &CountMap,
    old_bucket: &Option<StatsBucket>,
    new_bucket: &Option<StatsBucket>,
) -> bool {
    old_counts != new_counts || old_bucket != new_bucket
}

#[derive(Clone)]
pub struct StatsLedger {
    conn: Arc<Mutex<Connection>>,
}

impl StatsLedger {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        StatsLedger { conn }
    }

    /// Apply one signed delta to a statistics bucket, creating the row on
    /// first touch.
    pub fn update_count(
        &self,
        name: &str,
        delta: i64,
        country: Option<&str>,
        language: Option<&str>,
    ) -> Result<()> {
        if delta == 0 {
            return Ok(());
        }
        debug!(
            "update_count {} {:+} (country {:?}, language {:?})",
            name, delta, country, language
        );
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE oi_count_stats SET count = count + ?2
             WHERE name = ?1 AND country IS ?3 AND language IS ?4",
            params![name, delta, country, language],
        )?;
        if updated == 0 {
            conn.execute(
                "INSERT INTO oi_count_stats (name, country, language, count)
                 VALUES (?1, ?2, ?3, ?4)",
                params![name, country, language, delta],
            )?;
        }
        Ok(())
    }

    pub fn get_count(
        &self,
        name: &str,
        country: Option<&str>,
        language: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count: Option<i64> = conn
            .query_row(
                "SELECT count FROM oi_count_stats
                 WHERE name = ?1 AND country IS ?2 AND language IS ?3",
                params![name, country, language],
                |r| r.get(0),
            )
            .optional()?;
        Ok(count.unwrap_or(0))
    }

    /// Apply every category of `counts`, multiplied by `sign`, to `bucket`.
    pub fn apply(&self, bucket: &StatsBucket, counts: &CountMap, sign: i64) -> Result<()> {
        for (category, count) in counts.iter() {
            self.update_count(
                category,
                count * sign,
                bucket.country.as_deref(),
                bucket.language.as_deref(),
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    #[test]
    fn count_map_deltas_cover_union_of_keys() {
        let mut old = CountMap::new();
        old.set(STAT_ISSUES, 2);
        old.set(STAT_STORIES, 5);
        let mut new = CountMap::new();
        new.set(STAT_ISSUES, 3);
        new.set(STAT_COVERS, 1);

        let deltas = CountMap::deltas(&old, &new);
        assert_eq!(deltas.get(STAT_ISSUES), 1);
        assert_eq!(deltas.get(STAT_STORIES), -5);
        assert_eq!(deltas.get(STAT_COVERS), 1);
        assert!(!deltas.is_zero());
    }

    #[test]
    fn equal_maps_produce_zero_deltas() {
        let map = CountMap::of(STAT_ISSUES, 4);
        assert!(CountMap::deltas(&map, &map.clone()).is_zero());
    }

    #[test]
    fn retract_reapply_on_bucket_change_only() {
        let counts = CountMap::of(STAT_ISSUES, 1);
        let us = Some(StatsBucket::country_language("us", "en"));
        let de = Some(StatsBucket::country_language("de", "de"));
        assert!(needs_retract_reapply(&counts, &counts, &us, &de));
        assert!(!needs_retract_reapply(&counts, &counts, &us, &us.clone()));
        assert!(needs_retract_reapply(
            &counts,
            &CountMap::of(STAT_ISSUES, 2),
            &us,
            &us.clone()
        ));
    }

    #[test]
    fn ledger_accumulates_and_splits_buckets() {
        let db = open_in_memory().unwrap();
        let ledger = db.stats();

        ledger
            .update_count(STAT_ISSUES, 2, Some("us"), Some("en"))
            .unwrap();
        ledger
            .update_count(STAT_ISSUES, 1, Some("de"), Some("de"))
            .unwrap();
        ledger
            .update_count(STAT_ISSUES, -1, Some("us"), Some("en"))
            .unwrap();
        ledger.update_count(STAT_BRANDS, 1, None, None).unwrap();

        assert_eq!(
            ledger.get_count(STAT_ISSUES, Some("us"), Some("en")).unwrap(),
            1
        );
        assert_eq!(
            ledger.get_count(STAT_ISSUES, Some("de"), Some("de")).unwrap(),
            1
        );
        assert_eq!(ledger.get_count(STAT_BRANDS, None, None).unwrap(), 1);
        assert_eq!(ledger.get_count(STAT_COVERS, None, None).unwrap(), 0);
    }

    #[test]
    fn apply_multiplies_by_sign() {
        let db = open_in_memory().unwrap();
        let ledger = db.stats();
        let mut counts = CountMap::new();
        counts.set(STAT_ISSUES, 2);
        counts.set(STAT_STORIES, 3);
        let bucket = StatsBucket::country_language("us", "en");

        ledger.apply(&bucket, &counts, 1).unwrap();
        ledger.apply(&bucket, &counts, -1).unwrap();

        assert_eq!(
            ledger.get_count(STAT_ISSUES, Some("us"), Some("en")).unwrap(),
            0
        );
        assert_eq!(
            ledger
                .get_count(STAT_STORIES, Some("us"), Some("en"))
                .unwrap(),
            0
        );
    }
}
