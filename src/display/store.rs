//! SQLite-backed store for the display (published) catalog.
//!
//! All stores in the process share one write connection behind a mutex.
//! Methods lock, do their work, and release; nothing here holds the lock
//! across calls into other stores.

use super::models::*;
use anyhow::{bail, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Clone)]
pub struct DisplayStore {
    conn: Arc<Mutex<Connection>>,
}

impl DisplayStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        DisplayStore { conn }
    }

    // =========================================================================
    // Publishers
    // =========================================================================

    fn parse_publisher(row: &rusqlite::Row) -> rusqlite::Result<Publisher> {
        Ok(Publisher {
            id: row.get("id")?,
            name: row.get("name")?,
            year_began: row.get("year_began")?,
            year_ended: row.get("year_ended")?,
            year_began_uncertain: row.get("year_began_uncertain")?,
            year_ended_uncertain: row.get("year_ended_uncertain")?,
            url: row.get("url")?,
            notes: row.get("notes")?,
            country: row.get("country")?,
            series_count: row.get("series_count")?,
            issue_count: row.get("issue_count")?,
            brand_count: row.get("brand_count")?,
            indicia_publisher_count: row.get("indicia_publisher_count")?,
            reserved: row.get("reserved")?,
        })
    }

    pub fn get_publisher(&self, id: i64) -> Result<Option<Publisher>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT * FROM publishers WHERE id = ?1")?;
        Ok(stmt
            .query_row(params![id], Self::parse_publisher)
            .optional()?)
    }

    pub fn save_publisher(&self, publisher: &mut Publisher) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        if publisher.id == 0 {
            conn.execute(
                "INSERT INTO publishers (name, year_began, year_ended, year_began_uncertain,
                    year_ended_uncertain, url, notes, country, series_count, issue_count,
                    brand_count, indicia_publisher_count, reserved)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    publisher.name,
                    publisher.year_began,
                    publisher.year_ended,
                    publisher.year_began_uncertain,
                    publisher.year_ended_uncertain,
                    publisher.url,
                    publisher.notes,
                    publisher.country,
                    publisher.series_count,
                    publisher.issue_count,
                    publisher.brand_count,
                    publisher.indicia_publisher_count,
                    publisher.reserved,
                ],
            )?;
            publisher.id = conn.last_insert_rowid();
        } else {
            conn.execute(
                "UPDATE publishers SET name = ?2, year_began = ?3, year_ended = ?4,
                    year_began_uncertain = ?5, year_ended_uncertain = ?6, url = ?7, notes = ?8,
                    country = ?9, series_count = ?10, issue_count = ?11, brand_count = ?12,
                    indicia_publisher_count = ?13, reserved = ?14
                 WHERE id = ?1",
                params![
                    publisher.id,
                    publisher.name,
                    publisher.year_began,
                    publisher.year_ended,
                    publisher.year_began_uncertain,
                    publisher.year_ended_uncertain,
                    publisher.url,
                    publisher.notes,
                    publisher.country,
                    publisher.series_count,
                    publisher.issue_count,
                    publisher.brand_count,
                    publisher.indicia_publisher_count,
                    publisher.reserved,
                ],
            )?;
        }
        Ok(())
    }

    pub fn delete_publisher(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM publishers WHERE id = ?1", params![id])?;
        Ok(())
    }

    // =========================================================================
    // Indicia publishers
    // =========================================================================

    fn parse_indicia_publisher(row: &rusqlite::Row) -> rusqlite::Result<IndiciaPublisher> {
        Ok(IndiciaPublisher {
            id: row.get("id")?,
            name: row.get("name")?,
            year_began: row.get("year_began")?,
            year_ended: row.get("year_ended")?,
            year_began_uncertain: row.get("year_began_uncertain")?,
            year_ended_uncertain: row.get("year_ended_uncertain")?,
            url: row.get("url")?,
            notes: row.get("notes")?,
            is_surrogate: row.get("is_surrogate")?,
            country: row.get("country")?,
            parent: row.get("parent")?,
            issue_count: row.get("issue_count")?,
            reserved: row.get("reserved")?,
        })
    }

    pub fn get_indicia_publisher(&self, id: i64) -> Result<Option<IndiciaPublisher>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT * FROM indicia_publishers WHERE id = ?1")?;
        Ok(stmt
            .query_row(params![id], Self::parse_indicia_publisher)
            .optional()?)
    }

    pub fn save_indicia_publisher(&self, ipub: &mut IndiciaPublisher) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        if ipub.id == 0 {
            conn.execute(
                "INSERT INTO indicia_publishers (name, year_began, year_ended,
                    year_began_uncertain, year_ended_uncertain, url, notes, is_surrogate,
                    country, parent, issue_count, reserved)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    ipub.name,
                    ipub.year_began,
                    ipub.year_ended,
                    ipub.year_began_uncertain,
                    ipub.year_ended_uncertain,
                    ipub.url,
                    ipub.notes,
                    ipub.is_surrogate,
                    ipub.country,
                    ipub.parent,
                    ipub.issue_count,
                    ipub.reserved,
                ],
            )?;
            ipub.id = conn.last_insert_rowid();
        } else {
            conn.execute(
                "UPDATE indicia_publishers SET name = ?2, year_began = ?3, year_ended = ?4,
                    year_began_uncertain = ?5, year_ended_uncertain = ?6, url = ?7, notes = ?8,
                    is_surrogate = ?9, country = ?10, parent = ?11, issue_count = ?12,
                    reserved = ?13
                 WHERE id = ?1",
                params![
                    ipub.id,
                    ipub.name,
                    ipub.year_began,
                    ipub.year_ended,
                    ipub.year_began_uncertain,
                    ipub.year_ended_uncertain,
                    ipub.url,
                    ipub.notes,
                    ipub.is_surrogate,
                    ipub.country,
                    ipub.parent,
                    ipub.issue_count,
                    ipub.reserved,
                ],
            )?;
        }
        Ok(())
    }

    pub fn delete_indicia_publisher(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM indicia_publishers WHERE id = ?1", params![id])?;
        Ok(())
    }

    // =========================================================================
    // Brand groups
    // =========================================================================

    fn parse_brand_group(row: &rusqlite::Row) -> rusqlite::Result<BrandGroup> {
        Ok(BrandGroup {
            id: row.get("id")?,
            name: row.get("name")?,
            year_began: row.get("year_began")?,
            year_ended: row.get("year_ended")?,
            year_began_uncertain: row.get("year_began_uncertain")?,
            year_ended_uncertain: row.get("year_ended_uncertain")?,
            url: row.get("url")?,
            notes: row.get("notes")?,
            parent: row.get("parent")?,
            issue_count: row.get("issue_count")?,
            reserved: row.get("reserved")?,
        })
    }

    pub fn get_brand_group(&self, id: i64) -> Result<Option<BrandGroup>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT * FROM brand_groups WHERE id = ?1")?;
        Ok(stmt
            .query_row(params![id], Self::parse_brand_group)
            .optional()?)
    }

    pub fn save_brand_group(&self, group: &mut BrandGroup) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        if group.id == 0 {
            conn.execute(
                "INSERT INTO brand_groups (name, year_began, year_ended, year_began_uncertain,
                    year_ended_uncertain, url, notes, parent, issue_count, reserved)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    group.name,
                    group.year_began,
                    group.year_ended,
                    group.year_began_uncertain,
                    group.year_ended_uncertain,
                    group.url,
                    group.notes,
                    group.parent,
                    group.issue_count,
                    group.reserved,
                ],
            )?;
            group.id = conn.last_insert_rowid();
        } else {
            conn.execute(
                "UPDATE brand_groups SET name = ?2, year_began = ?3, year_ended = ?4,
                    year_began_uncertain = ?5, year_ended_uncertain = ?6, url = ?7, notes = ?8,
                    parent = ?9, issue_count = ?10, reserved = ?11
                 WHERE id = ?1",
                params![
                    group.id,
                    group.name,
                    group.year_began,
                    group.year_ended,
                    group.year_began_uncertain,
                    group.year_ended_uncertain,
                    group.url,
                    group.notes,
                    group.parent,
                    group.issue_count,
                    group.reserved,
                ],
            )?;
        }
        Ok(())
    }

    pub fn delete_brand_group(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM brand_groups WHERE id = ?1", params![id])?;
        Ok(())
    }

    // =========================================================================
    // Brands
    // =========================================================================

    fn parse_brand(row: &rusqlite::Row) -> rusqlite::Result<Brand> {
        Ok(Brand {
            id: row.get("id")?,
            name: row.get("name")?,
            year_began: row.get("year_began")?,
            year_ended: row.get("year_ended")?,
            year_began_uncertain: row.get("year_began_uncertain")?,
            year_ended_uncertain: row.get("year_ended_uncertain")?,
            url: row.get("url")?,
            notes: row.get("notes")?,
            issue_count: row.get("issue_count")?,
            reserved: row.get("reserved")?,
        })
    }

    pub fn get_brand(&self, id: i64) -> Result<Option<Brand>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT * FROM brands WHERE id = ?1")?;
        Ok(stmt.query_row(params![id], Self::parse_brand).optional()?)
    }

    pub fn save_brand(&self, brand: &mut Brand) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        if brand.id == 0 {
            conn.execute(
                "INSERT INTO brands (name, year_began, year_ended, year_began_uncertain,
                    year_ended_uncertain, url, notes, issue_count, reserved)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    brand.name,
                    brand.year_began,
                    brand.year_ended,
                    brand.year_began_uncertain,
                    brand.year_ended_uncertain,
                    brand.url,
                    brand.notes,
                    brand.issue_count,
                    brand.reserved,
                ],
            )?;
            brand.id = conn.last_insert_rowid();
        } else {
            conn.execute(
                "UPDATE brands SET name = ?2, year_began = ?3, year_ended = ?4,
                    year_began_uncertain = ?5, year_ended_uncertain = ?6, url = ?7, notes = ?8,
                    issue_count = ?9, reserved = ?10
                 WHERE id = ?1",
                params![
                    brand.id,
                    brand.name,
                    brand.year_began,
                    brand.year_ended,
                    brand.year_began_uncertain,
                    brand.year_ended_uncertain,
                    brand.url,
                    brand.notes,
                    brand.issue_count,
                    brand.reserved,
                ],
            )?;
        }
        Ok(())
    }

    pub fn delete_brand(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM brand_group_members WHERE brand_id = ?1",
            params![id],
        )?;
        conn.execute("DELETE FROM brands WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Group ids a brand belongs to, ordered for deterministic comparison.
    pub fn brand_groups_of(&self, brand_id: i64) -> Result<Vec<i64>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT group_id FROM brand_group_members WHERE brand_id = ?1 ORDER BY group_id",
        )?;
        let ids = stmt
            .query_map(params![brand_id], |r| r.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    pub fn set_brand_groups(&self, brand_id: i64, group_ids: &[i64]) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM brand_group_members WHERE brand_id = ?1",
            params![brand_id],
        )?;
        for group_id in group_ids {
            conn.execute(
                "INSERT INTO brand_group_members (brand_id, group_id) VALUES (?1, ?2)",
                params![brand_id, group_id],
            )?;
        }
        Ok(())
    }

    // =========================================================================
    // Brand uses
    // =========================================================================

    fn parse_brand_use(row: &rusqlite::Row) -> rusqlite::Result<BrandUse> {
        Ok(BrandUse {
            id: row.get("id")?,
            emblem: row.get("emblem")?,
            publisher: row.get("publisher")?,
            year_began: row.get("year_began")?,
            year_ended: row.get("year_ended")?,
            year_began_uncertain: row.get("year_began_uncertain")?,
            year_ended_uncertain: row.get("year_ended_uncertain")?,
            notes: row.get("notes")?,
            reserved: row.get("reserved")?,
        })
    }

    pub fn get_brand_use(&self, id: i64) -> Result<Option<BrandUse>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT * FROM brand_uses WHERE id = ?1")?;
        Ok(stmt
            .query_row(params![id], Self::parse_brand_use)
            .optional()?)
    }

    pub fn save_brand_use(&self, brand_use: &mut BrandUse) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        if brand_use.id == 0 {
            conn.execute(
                "INSERT INTO brand_uses (emblem, publisher, year_began, year_ended,
                    year_began_uncertain, year_ended_uncertain, notes, reserved)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    brand_use.emblem,
                    brand_use.publisher,
                    brand_use.year_began,
                    brand_use.year_ended,
                    brand_use.year_began_uncertain,
                    brand_use.year_ended_uncertain,
                    brand_use.notes,
                    brand_use.reserved,
                ],
            )?;
            brand_use.id = conn.last_insert_rowid();
        } else {
            conn.execute(
                "UPDATE brand_uses SET emblem = ?2, publisher = ?3, year_began = ?4,
                    year_ended = ?5, year_began_uncertain = ?6, year_ended_uncertain = ?7,
                    notes = ?8, reserved = ?9
                 WHERE id = ?1",
                params![
                    brand_use.id,
                    brand_use.emblem,
                    brand_use.publisher,
                    brand_use.year_began,
                    brand_use.year_ended,
                    brand_use.year_began_uncertain,
                    brand_use.year_ended_uncertain,
                    brand_use.notes,
                    brand_use.reserved,
                ],
            )?;
        }
        Ok(())
    }

    pub fn delete_brand_use(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM brand_uses WHERE id = ?1", params![id])?;
        Ok(())
    }

    // =========================================================================
    // Series
    // =========================================================================

    fn parse_series(row: &rusqlite::Row) -> rusqlite::Result<Series> {
        Ok(Series {
            id: row.get("id")?,
            name: row.get("name")?,
            sort_name: row.get("sort_name")?,
            format: row.get("format")?,
            color: row.get("color")?,
            dimensions: row.get("dimensions")?,
            paper_stock: row.get("paper_stock")?,
            binding: row.get("binding")?,
            publishing_format: row.get("publishing_format")?,
            publication_type: row
                .get::<_, Option<String>>("publication_type")?
                .as_deref()
                .and_then(PublicationType::from_db_str),
            notes: row.get("notes")?,
            year_began: row.get("year_began")?,
            year_ended: row.get("year_ended")?,
            year_began_uncertain: row.get("year_began_uncertain")?,
            year_ended_uncertain: row.get("year_ended_uncertain")?,
            is_current: row.get("is_current")?,
            is_singleton: row.get("is_singleton")?,
            is_comics_publication: row.get("is_comics_publication")?,
            publication_notes: row.get("publication_notes")?,
            tracking_notes: row.get("tracking_notes")?,
            has_barcode: row.get("has_barcode")?,
            has_indicia_frequency: row.get("has_indicia_frequency")?,
            has_isbn: row.get("has_isbn")?,
            has_issue_title: row.get("has_issue_title")?,
            has_volume: row.get("has_volume")?,
            has_rating: row.get("has_rating")?,
            has_gallery: row.get("has_gallery")?,
            country: row.get("country")?,
            language: row.get("language")?,
            publisher: row.get("publisher")?,
            issue_count: row.get("issue_count")?,
            first_issue: row.get("first_issue")?,
            last_issue: row.get("last_issue")?,
            reserved: row.get("reserved")?,
        })
    }

    pub fn get_series(&self, id: i64) -> Result<Option<Series>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT * FROM series WHERE id = ?1")?;
        Ok(stmt.query_row(params![id], Self::parse_series).optional()?)
    }

    pub fn save_series(&self, series: &mut Series) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let publication_type = series.publication_type.map(PublicationType::to_db_str);
        if series.id == 0 {
            conn.execute(
                "INSERT INTO series (name, sort_name, format, color, dimensions, paper_stock,
                    binding, publishing_format, publication_type, notes, year_began, year_ended,
                    year_began_uncertain, year_ended_uncertain, is_current, is_singleton,
                    is_comics_publication, publication_notes, tracking_notes, has_barcode,
                    has_indicia_frequency, has_isbn, has_issue_title, has_volume, has_rating,
                    has_gallery, country, language, publisher, issue_count, first_issue,
                    last_issue, reserved)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                    ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30, ?31,
                    ?32, ?33)",
                params![
                    series.name,
                    series.sort_name,
                    series.format,
                    series.color,
                    series.dimensions,
                    series.paper_stock,
                    series.binding,
                    series.publishing_format,
                    publication_type,
                    series.notes,
                    series.year_began,
                    series.year_ended,
                    series.year_began_uncertain,
                    series.year_ended_uncertain,
                    series.is_current,
                    series.is_singleton,
                    series.is_comics_publication,
                    series.publication_notes,
                    series.tracking_notes,
                    series.has_barcode,
                    series.has_indicia_frequency,
                    series.has_isbn,
                    series.has_issue_title,
                    series.has_volume,
                    series.has_rating,
                    series.has_gallery,
                    series.country,
                    series.language,
                    series.publisher,
                    series.issue_count,
                    series.first_issue,
                    series.last_issue,
                    series.reserved,
                ],
            )?;
            series.id = conn.last_insert_rowid();
        } else {
            conn.execute(
                "UPDATE series SET name = ?2, sort_name = ?3, format = ?4, color = ?5,
                    dimensions = ?6, paper_stock = ?7, binding = ?8, publishing_format = ?9,
                    publication_type = ?10, notes = ?11, year_began = ?12, year_ended = ?13,
                    year_began_uncertain = ?14, year_ended_uncertain = ?15, is_current = ?16,
                    is_singleton = ?17, is_comics_publication = ?18, publication_notes = ?19,
                    tracking_notes = ?20, has_barcode = ?21, has_indicia_frequency = ?22,
                    has_isbn = ?23, has_issue_title = ?24, has_volume = ?25, has_rating = ?26,
                    has_gallery = ?27, country = ?28, language = ?29, publisher = ?30,
                    issue_count = ?31, first_issue = ?32, last_issue = ?33, reserved = ?34
                 WHERE id = ?1",
                params![
                    series.id,
                    series.name,
                    series.sort_name,
                    series.format,
                    series.color,
                    series.dimensions,
                    series.paper_stock,
                    series.binding,
                    series.publishing_format,
                    publication_type,
                    series.notes,
                    series.year_began,
                    series.year_ended,
                    series.year_began_uncertain,
                    series.year_ended_uncertain,
                    series.is_current,
                    series.is_singleton,
                    series.is_comics_publication,
                    series.publication_notes,
                    series.tracking_notes,
                    series.has_barcode,
                    series.has_indicia_frequency,
                    series.has_isbn,
                    series.has_issue_title,
                    series.has_volume,
                    series.has_rating,
                    series.has_gallery,
                    series.country,
                    series.language,
                    series.publisher,
                    series.issue_count,
                    series.first_issue,
                    series.last_issue,
                    series.reserved,
                ],
            )?;
        }
        Ok(())
    }

    pub fn delete_series(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM series WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Recompute the first/last issue pointers from non-variant issues.
    pub fn set_series_first_last(&self, series_id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let first: Option<i64> = conn
            .query_row(
                "SELECT id FROM issues WHERE series = ?1 AND variant_of IS NULL
                 ORDER BY sort_code ASC LIMIT 1",
                params![series_id],
                |r| r.get(0),
            )
            .optional()?;
        let last: Option<i64> = conn
            .query_row(
                "SELECT id FROM issues WHERE series = ?1 AND variant_of IS NULL
                 ORDER BY sort_code DESC LIMIT 1",
                params![series_id],
                |r| r.get(0),
            )
            .optional()?;
        conn.execute(
            "UPDATE series SET first_issue = ?2, last_issue = ?3 WHERE id = ?1",
            params![series_id, first, last],
        )?;
        Ok(())
    }

    // =========================================================================
    // Series bonds
    // =========================================================================

    fn parse_series_bond(row: &rusqlite::Row) -> rusqlite::Result<SeriesBond> {
        Ok(SeriesBond {
            id: row.get("id")?,
            origin: row.get("origin")?,
            origin_issue: row.get("origin_issue")?,
            target: row.get("target")?,
            target_issue: row.get("target_issue")?,
            bond_type: BondType::from_db_str(&row.get::<_, String>("bond_type")?),
            notes: row.get("notes")?,
            reserved: row.get("reserved")?,
        })
    }

    pub fn get_series_bond(&self, id: i64) -> Result<Option<SeriesBond>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT * FROM series_bonds WHERE id = ?1")?;
        Ok(stmt
            .query_row(params![id], Self::parse_series_bond)
            .optional()?)
    }

    pub fn save_series_bond(&self, bond: &mut SeriesBond) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        if bond.id == 0 {
            conn.execute(
                "INSERT INTO series_bonds (origin, origin_issue, target, target_issue,
                    bond_type, notes, reserved)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    bond.origin,
                    bond.origin_issue,
                    bond.target,
                    bond.target_issue,
                    bond.bond_type.to_db_str(),
                    bond.notes,
                    bond.reserved,
                ],
            )?;
            bond.id = conn.last_insert_rowid();
        } else {
            conn.execute(
                "UPDATE series_bonds SET origin = ?2, origin_issue = ?3, target = ?4,
                    target_issue = ?5, bond_type = ?6, notes = ?7, reserved = ?8
                 WHERE id = ?1",
                params![
                    bond.id,
                    bond.origin,
                    bond.origin_issue,
                    bond.target,
                    bond.target_issue,
                    bond.bond_type.to_db_str(),
                    bond.notes,
                    bond.reserved,
                ],
            )?;
        }
        Ok(())
    }

    pub fn delete_series_bond(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM series_bonds WHERE id = ?1", params![id])?;
        Ok(())
    }

    // =========================================================================
    // Issues
    // =========================================================================

    fn parse_issue(row: &rusqlite::Row) -> rusqlite::Result<Issue> {
        Ok(Issue {
            id: row.get("id")?,
            number: row.get("number")?,
            title: row.get("title")?,
            no_title: row.get("no_title")?,
            volume: row.get("volume")?,
            no_volume: row.get("no_volume")?,
            display_volume_with_number: row.get("display_volume_with_number")?,
            variant_of: row.get("variant_of")?,
            variant_name: row.get("variant_name")?,
            publication_date: row.get("publication_date")?,
            key_date: row.get("key_date")?,
            on_sale_date: row.get("on_sale_date")?,
            on_sale_date_uncertain: row.get("on_sale_date_uncertain")?,
            indicia_frequency: row.get("indicia_frequency")?,
            no_indicia_frequency: row.get("no_indicia_frequency")?,
            price: row.get("price")?,
            page_count: row.get("page_count")?,
            page_count_uncertain: row.get("page_count_uncertain")?,
            editing: row.get("editing")?,
            no_editing: row.get("no_editing")?,
            isbn: row.get("isbn")?,
            no_isbn: row.get("no_isbn")?,
            valid_isbn: row.get("valid_isbn")?,
            barcode: row.get("barcode")?,
            no_barcode: row.get("no_barcode")?,
            rating: row.get("rating")?,
            no_rating: row.get("no_rating")?,
            notes: row.get("notes")?,
            series: row.get("series")?,
            indicia_publisher: row.get("indicia_publisher")?,
            indicia_pub_not_printed: row.get("indicia_pub_not_printed")?,
            brand: row.get("brand")?,
            no_brand: row.get("no_brand")?,
            sort_code: row.get("sort_code")?,
            is_indexed: IndexedStatus::from_db(row.get("is_indexed")?),
            reserved: row.get("reserved")?,
        })
    }

    pub fn get_issue(&self, id: i64) -> Result<Option<Issue>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT * FROM issues WHERE id = ?1")?;
        Ok(stmt.query_row(params![id], Self::parse_issue).optional()?)
    }

    pub fn save_issue(&self, issue: &mut Issue) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        if issue.id == 0 {
            conn.execute(
                "INSERT INTO issues (number, title, no_title, volume, no_volume,
                    display_volume_with_number, variant_of, variant_name, publication_date,
                    key_date, on_sale_date, on_sale_date_uncertain, indicia_frequency,
                    no_indicia_frequency, price, page_count, page_count_uncertain, editing,
                    no_editing, isbn, no_isbn, valid_isbn, barcode, no_barcode, rating,
                    no_rating, notes, series, indicia_publisher, indicia_pub_not_printed,
                    brand, no_brand, sort_code, is_indexed, reserved)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                    ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29,
                    ?30, ?31, ?32, ?33, ?34, ?35)",
                params![
                    issue.number,
                    issue.title,
                    issue.no_title,
                    issue.volume,
                    issue.no_volume,
                    issue.display_volume_with_number,
                    issue.variant_of,
                    issue.variant_name,
                    issue.publication_date,
                    issue.key_date,
                    issue.on_sale_date,
                    issue.on_sale_date_uncertain,
                    issue.indicia_frequency,
                    issue.no_indicia_frequency,
                    issue.price,
                    issue.page_count,
                    issue.page_count_uncertain,
                    issue.editing,
                    issue.no_editing,
                    issue.isbn,
                    issue.no_isbn,
                    issue.valid_isbn,
                    issue.barcode,
                    issue.no_barcode,
                    issue.rating,
                    issue.no_rating,
                    issue.notes,
                    issue.series,
                    issue.indicia_publisher,
                    issue.indicia_pub_not_printed,
                    issue.brand,
                    issue.no_brand,
                    issue.sort_code,
                    issue.is_indexed.to_db(),
                    issue.reserved,
                ],
            )?;
            issue.id = conn.last_insert_rowid();
        } else {
            conn.execute(
                "UPDATE issues SET number = ?2, title = ?3, no_title = ?4, volume = ?5,
                    no_volume = ?6, display_volume_with_number = ?7, variant_of = ?8,
                    variant_name = ?9, publication_date = ?10, key_date = ?11,
                    on_sale_date = ?12, on_sale_date_uncertain = ?13, indicia_frequency = ?14,
                    no_indicia_frequency = ?15, price = ?16, page_count = ?17,
                    page_count_uncertain = ?18, editing = ?19, no_editing = ?20, isbn = ?21,
                    no_isbn = ?22, valid_isbn = ?23, barcode = ?24, no_barcode = ?25,
                    rating = ?26, no_rating = ?27, notes = ?28, series = ?29,
                    indicia_publisher = ?30, indicia_pub_not_printed = ?31, brand = ?32,
                    no_brand = ?33, sort_code = ?34, is_indexed = ?35, reserved = ?36
                 WHERE id = ?1",
                params![
                    issue.id,
                    issue.number,
                    issue.title,
                    issue.no_title,
                    issue.volume,
                    issue.no_volume,
                    issue.display_volume_with_number,
                    issue.variant_of,
                    issue.variant_name,
                    issue.publication_date,
                    issue.key_date,
                    issue.on_sale_date,
                    issue.on_sale_date_uncertain,
                    issue.indicia_frequency,
                    issue.no_indicia_frequency,
                    issue.price,
                    issue.page_count,
                    issue.page_count_uncertain,
                    issue.editing,
                    issue.no_editing,
                    issue.isbn,
                    issue.no_isbn,
                    issue.valid_isbn,
                    issue.barcode,
                    issue.no_barcode,
                    issue.rating,
                    issue.no_rating,
                    issue.notes,
                    issue.series,
                    issue.indicia_publisher,
                    issue.indicia_pub_not_printed,
                    issue.brand,
                    issue.no_brand,
                    issue.sort_code,
                    issue.is_indexed.to_db(),
                    issue.reserved,
                ],
            )?;
        }
        Ok(())
    }

    pub fn delete_issue(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM entity_keywords WHERE entity_kind = 'issue' AND entity_id = ?1",
            params![id],
        )?;
        conn.execute("DELETE FROM issues WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// All issues of a series ordered by sort code.
    pub fn issues_in_series(&self, series_id: i64) -> Result<Vec<Issue>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare_cached("SELECT * FROM issues WHERE series = ?1 ORDER BY sort_code ASC")?;
        let issues = stmt
            .query_map(params![series_id], Self::parse_issue)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(issues)
    }

    /// Issues with a sort code strictly greater than `sort_code`, ordered
    /// highest first so that shifting them never collides.
    pub fn issues_later_than(&self, series_id: i64, sort_code: i64) -> Result<Vec<Issue>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT * FROM issues WHERE series = ?1 AND sort_code > ?2 ORDER BY sort_code DESC",
        )?;
        let issues = stmt
            .query_map(params![series_id, sort_code], Self::parse_issue)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(issues)
    }

    pub fn max_sort_code(&self, series_id: i64) -> Result<Option<i64>> {
        let conn = self.conn.lock().unwrap();
        let max: Option<i64> = conn.query_row(
            "SELECT MAX(sort_code) FROM issues WHERE series = ?1",
            params![series_id],
            |r| r.get(0),
        )?;
        Ok(max)
    }

    pub fn issue_count_in_series(&self, series_id: i64, include_variants: bool) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let sql = if include_variants {
            "SELECT COUNT(*) FROM issues WHERE series = ?1"
        } else {
            "SELECT COUNT(*) FROM issues WHERE series = ?1 AND variant_of IS NULL"
        };
        let count: i64 = conn.query_row(sql, params![series_id], |r| r.get(0))?;
        Ok(count)
    }

    pub fn variant_count_in_series(&self, series_id: i64) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM issues WHERE series = ?1 AND variant_of IS NOT NULL",
            params![series_id],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    pub fn indexed_count_in_series(&self, series_id: i64) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM issues WHERE series = ?1 AND is_indexed != 0",
            params![series_id],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    // =========================================================================
    // Stories
    // =========================================================================

    fn parse_story(row: &rusqlite::Row) -> rusqlite::Result<Story> {
        Ok(Story {
            id: row.get("id")?,
            title: row.get("title")?,
            title_inferred: row.get("title_inferred")?,
            feature: row.get("feature")?,
            kind: StoryKind::from_db_str(&row.get::<_, String>("kind")?),
            sequence_number: row.get("sequence_number")?,
            page_count: row.get("page_count")?,
            page_count_uncertain: row.get("page_count_uncertain")?,
            script: row.get("script")?,
            pencils: row.get("pencils")?,
            inks: row.get("inks")?,
            colors: row.get("colors")?,
            letters: row.get("letters")?,
            editing: row.get("editing")?,
            no_script: row.get("no_script")?,
            no_pencils: row.get("no_pencils")?,
            no_inks: row.get("no_inks")?,
            no_colors: row.get("no_colors")?,
            no_letters: row.get("no_letters")?,
            no_editing: row.get("no_editing")?,
            job_number: row.get("job_number")?,
            genre: row.get("genre")?,
            characters: row.get("characters")?,
            synopsis: row.get("synopsis")?,
            reprint_notes: row.get("reprint_notes")?,
            notes: row.get("notes")?,
            issue: row.get("issue")?,
            reserved: row.get("reserved")?,
        })
    }

    pub fn get_story(&self, id: i64) -> Result<Option<Story>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT * FROM stories WHERE id = ?1")?;
        Ok(stmt.query_row(params![id], Self::parse_story).optional()?)
    }

    pub fn save_story(&self, story: &mut Story) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        if story.id == 0 {
            conn.execute(
                "INSERT INTO stories (title, title_inferred, feature, kind, sequence_number,
                    page_count, page_count_uncertain, script, pencils, inks, colors, letters,
                    editing, no_script, no_pencils, no_inks, no_colors, no_letters, no_editing,
                    job_number, genre, characters, synopsis, reprint_notes, notes, issue,
                    reserved)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                    ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27)",
                params![
                    story.title,
                    story.title_inferred,
                    story.feature,
                    story.kind.to_db_str(),
                    story.sequence_number,
                    story.page_count,
                    story.page_count_uncertain,
                    story.script,
                    story.pencils,
                    story.inks,
                    story.colors,
                    story.letters,
                    story.editing,
                    story.no_script,
                    story.no_pencils,
                    story.no_inks,
                    story.no_colors,
                    story.no_letters,
                    story.no_editing,
                    story.job_number,
                    story.genre,
                    story.characters,
                    story.synopsis,
                    story.reprint_notes,
                    story.notes,
                    story.issue,
                    story.reserved,
                ],
            )?;
            story.id = conn.last_insert_rowid();
        } else {
            conn.execute(
                "UPDATE stories SET title = ?2, title_inferred = ?3, feature = ?4, kind = ?5,
                    sequence_number = ?6, page_count = ?7, page_count_uncertain = ?8,
                    script = ?9, pencils = ?10, inks = ?11, colors = ?12, letters = ?13,
                    editing = ?14, no_script = ?15, no_pencils = ?16, no_inks = ?17,
                    no_colors = ?18, no_letters = ?19, no_editing = ?20, job_number = ?21,
                    genre = ?22, characters = ?23, synopsis = ?24, reprint_notes = ?25,
                    notes = ?26, issue = ?27, reserved = ?28
                 WHERE id = ?1",
                params![
                    story.id,
                    story.title,
                    story.title_inferred,
                    story.feature,
                    story.kind.to_db_str(),
                    story.sequence_number,
                    story.page_count,
                    story.page_count_uncertain,
                    story.script,
                    story.pencils,
                    story.inks,
                    story.colors,
                    story.letters,
                    story.editing,
                    story.no_script,
                    story.no_pencils,
                    story.no_inks,
                    story.no_colors,
                    story.no_letters,
                    story.no_editing,
                    story.job_number,
                    story.genre,
                    story.characters,
                    story.synopsis,
                    story.reprint_notes,
                    story.notes,
                    story.issue,
                    story.reserved,
                ],
            )?;
        }
        Ok(())
    }

    pub fn delete_story(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM entity_keywords WHERE entity_kind = 'story' AND entity_id = ?1",
            params![id],
        )?;
        conn.execute("DELETE FROM stories WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn stories_of_issue(&self, issue_id: i64) -> Result<Vec<Story>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT * FROM stories WHERE issue = ?1 ORDER BY sequence_number ASC",
        )?;
        let stories = stmt
            .query_map(params![issue_id], Self::parse_story)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(stories)
    }

    pub fn story_count_of_issue(&self, issue_id: i64) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM stories WHERE issue = ?1",
            params![issue_id],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    pub fn story_count_of_series(&self, series_id: i64) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM stories s JOIN issues i ON i.id = s.issue WHERE i.series = ?1",
            params![series_id],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    // =========================================================================
    // Covers
    // =========================================================================

    fn parse_cover(row: &rusqlite::Row) -> rusqlite::Result<Cover> {
        Ok(Cover {
            id: row.get("id")?,
            issue: row.get("issue")?,
            marked: row.get("marked")?,
            is_wraparound: row.get("is_wraparound")?,
            front_left: row.get("front_left")?,
            front_right: row.get("front_right")?,
            front_top: row.get("front_top")?,
            front_bottom: row.get("front_bottom")?,
            last_upload: row.get("last_upload")?,
            file_source: row.get("file_source")?,
            reserved: row.get("reserved")?,
        })
    }

    pub fn get_cover(&self, id: i64) -> Result<Option<Cover>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT * FROM covers WHERE id = ?1")?;
        Ok(stmt.query_row(params![id], Self::parse_cover).optional()?)
    }

    pub fn save_cover(&self, cover: &mut Cover) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        if cover.id == 0 {
            conn.execute(
                "INSERT INTO covers (issue, marked, is_wraparound, front_left, front_right,
                    front_top, front_bottom, last_upload, file_source, reserved)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    cover.issue,
                    cover.marked,
                    cover.is_wraparound,
                    cover.front_left,
                    cover.front_right,
                    cover.front_top,
                    cover.front_bottom,
                    cover.last_upload,
                    cover.file_source,
                    cover.reserved,
                ],
            )?;
            cover.id = conn.last_insert_rowid();
        } else {
            conn.execute(
                "UPDATE covers SET issue = ?2, marked = ?3, is_wraparound = ?4,
                    front_left = ?5, front_right = ?6, front_top = ?7, front_bottom = ?8,
                    last_upload = ?9, file_source = ?10, reserved = ?11
                 WHERE id = ?1",
                params![
                    cover.id,
                    cover.issue,
                    cover.marked,
                    cover.is_wraparound,
                    cover.front_left,
                    cover.front_right,
                    cover.front_top,
                    cover.front_bottom,
                    cover.last_upload,
                    cover.file_source,
                    cover.reserved,
                ],
            )?;
        }
        Ok(())
    }

    pub fn delete_cover(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM covers WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn covers_of_issue(&self, issue_id: i64) -> Result<Vec<Cover>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT * FROM covers WHERE issue = ?1")?;
        let covers = stmt
            .query_map(params![issue_id], Self::parse_cover)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(covers)
    }

    /// Number of cover scans across a whole series.
    pub fn scan_count(&self, series_id: i64) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM covers c JOIN issues i ON i.id = c.issue WHERE i.series = ?1",
            params![series_id],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    // =========================================================================
    // Images
    // =========================================================================

    fn parse_image(row: &rusqlite::Row) -> rusqlite::Result<Image> {
        Ok(Image {
            id: row.get("id")?,
            owner_kind: EntityKind::from_db_str(&row.get::<_, String>("owner_kind")?),
            owner_id: row.get("owner_id")?,
            image_type: ImageType::from_db_str(&row.get::<_, String>("image_type")?),
            image_file: row.get("image_file")?,
            marked: row.get("marked")?,
            reserved: row.get("reserved")?,
        })
    }

    pub fn get_image(&self, id: i64) -> Result<Option<Image>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT * FROM images WHERE id = ?1")?;
        Ok(stmt.query_row(params![id], Self::parse_image).optional()?)
    }

    pub fn save_image(&self, image: &mut Image) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        if image.id == 0 {
            conn.execute(
                "INSERT INTO images (owner_kind, owner_id, image_type, image_file, marked,
                    reserved)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    image.owner_kind.to_db_str(),
                    image.owner_id,
                    image.image_type.to_db_str(),
                    image.image_file,
                    image.marked,
                    image.reserved,
                ],
            )?;
            image.id = conn.last_insert_rowid();
        } else {
            conn.execute(
                "UPDATE images SET owner_kind = ?2, owner_id = ?3, image_type = ?4,
                    image_file = ?5, marked = ?6, reserved = ?7
                 WHERE id = ?1",
                params![
                    image.id,
                    image.owner_kind.to_db_str(),
                    image.owner_id,
                    image.image_type.to_db_str(),
                    image.image_file,
                    image.marked,
                    image.reserved,
                ],
            )?;
        }
        Ok(())
    }

    pub fn delete_image(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM images WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn image_count_for_owner(
        &self,
        owner_kind: EntityKind,
        owner_id: i64,
        image_type: ImageType,
    ) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM images WHERE owner_kind = ?1 AND owner_id = ?2
             AND image_type = ?3",
            params![owner_kind.to_db_str(), owner_id, image_type.to_db_str()],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    // =========================================================================
    // Reprint links
    // =========================================================================

    fn parse_reprint_link(row: &rusqlite::Row) -> rusqlite::Result<ReprintLink> {
        Ok(ReprintLink {
            id: row.get("id")?,
            kind: ReprintKind::from_db_str(&row.get::<_, String>("kind")?),
            origin: row.get("origin")?,
            target: row.get("target")?,
            notes: row.get("notes")?,
            reserved: row.get("reserved")?,
        })
    }

    pub fn get_reprint_link(&self, id: i64) -> Result<Option<ReprintLink>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT * FROM reprint_links WHERE id = ?1")?;
        Ok(stmt
            .query_row(params![id], Self::parse_reprint_link)
            .optional()?)
    }

    pub fn save_reprint_link(&self, link: &mut ReprintLink) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        if link.id == 0 {
            conn.execute(
                "INSERT INTO reprint_links (kind, origin, target, notes, reserved)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    link.kind.to_db_str(),
                    link.origin,
                    link.target,
                    link.notes,
                    link.reserved,
                ],
            )?;
            link.id = conn.last_insert_rowid();
        } else {
            conn.execute(
                "UPDATE reprint_links SET kind = ?2, origin = ?3, target = ?4, notes = ?5,
                    reserved = ?6
                 WHERE id = ?1",
                params![
                    link.id,
                    link.kind.to_db_str(),
                    link.origin,
                    link.target,
                    link.notes,
                    link.reserved,
                ],
            )?;
        }
        Ok(())
    }

    pub fn delete_reprint_link(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM reprint_links WHERE id = ?1", params![id])?;
        Ok(())
    }

    // =========================================================================
    // Keywords
    // =========================================================================

    /// Keywords of a display row as the canonical "; " joined string.
    pub fn get_keywords(&self, kind: EntityKind, id: i64) -> Result<String> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT keyword FROM entity_keywords WHERE entity_kind = ?1 AND entity_id = ?2
             ORDER BY keyword ASC",
        )?;
        let keywords = stmt
            .query_map(params![kind.to_db_str(), id], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keywords.join("; "))
    }

    /// Replace a display row's keyword tags from a "; " delimited string and
    /// return the canonical joined form.
    pub fn set_keywords(&self, kind: EntityKind, id: i64, joined: &str) -> Result<String> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM entity_keywords WHERE entity_kind = ?1 AND entity_id = ?2",
            params![kind.to_db_str(), id],
        )?;
        let mut tags: Vec<String> = joined
            .split(';')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        tags.sort();
        tags.dedup();
        for tag in &tags {
            conn.execute(
                "INSERT INTO entity_keywords (entity_kind, entity_id, keyword)
                 VALUES (?1, ?2, ?3)",
                params![kind.to_db_str(), id, tag],
            )?;
        }
        Ok(tags.join("; "))
    }

    // =========================================================================
    // Cached counts
    // =========================================================================

    /// Apply a signed delta for one statistic category to an entity's cached
    /// count column. Categories an entity does not cache are ignored.
    pub fn adjust_cached_count(
        &self,
        kind: EntityKind,
        id: i64,
        category: &str,
        delta: i64,
    ) -> Result<()> {
        if delta == 0 {
            return Ok(());
        }
        let column = match (kind, category) {
            (EntityKind::Publisher, "series") => Some(("publishers", "series_count")),
            (EntityKind::Publisher, "issues") => Some(("publishers", "issue_count")),
            (EntityKind::Publisher, "brand groups") => Some(("publishers", "brand_count")),
            (EntityKind::Publisher, "indicia publishers") => {
                Some(("publishers", "indicia_publisher_count"))
            }
            (EntityKind::IndiciaPublisher, "issues") => {
                Some(("indicia_publishers", "issue_count"))
            }
            (EntityKind::BrandGroup, "issues") => Some(("brand_groups", "issue_count")),
            (EntityKind::Brand, "issues") => Some(("brands", "issue_count")),
            (EntityKind::Series, "issues") => Some(("series", "issue_count")),
            _ => None,
        };
        let (table, column) = match column {
            Some(pair) => pair,
            None => return Ok(()),
        };
        debug!(
            "Adjusting {}.{} by {} for id {}",
            table, column, delta, id
        );
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "UPDATE {} SET {} = {} + ?2 WHERE id = ?1",
                table, column, column
            ),
            params![id, delta],
        )?;
        Ok(())
    }

    /// Verify cached counts against true child counts. Used by tests and the
    /// CLI validate command; skipped entirely with the `no_checks` feature.
    pub fn verify_cached_counts(&self) -> Result<()> {
        if cfg!(feature = "no_checks") {
            return Ok(());
        }
        let conn = self.conn.lock().unwrap();
        let mismatches: i64 = conn.query_row(
            "SELECT COUNT(*) FROM series s WHERE s.issue_count !=
               (SELECT COUNT(*) FROM issues i
                WHERE i.series = s.id AND i.variant_of IS NULL)",
            [],
            |r| r.get(0),
        )?;
        if mismatches > 0 {
            bail!("{} series rows have a stale issue_count", mismatches);
        }
        let mismatches: i64 = conn.query_row(
            "SELECT COUNT(*) FROM publishers p WHERE p.issue_count !=
               (SELECT COUNT(*) FROM issues i JOIN series s ON s.id = i.series
                WHERE s.publisher = p.id AND i.variant_of IS NULL)",
            [],
            |r| r.get(0),
        )?;
        if mismatches > 0 {
            bail!("{} publisher rows have a stale issue_count", mismatches);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    #[test]
    fn publisher_roundtrip() {
        let db = open_in_memory().unwrap();
        let store = db.display();
        let mut publisher = Publisher {
            name: "Eclipse House".to_string(),
            country: "us".to_string(),
            ..Default::default()
        };
        store.save_publisher(&mut publisher).unwrap();
        assert!(publisher.id > 0);

        let loaded = store.get_publisher(publisher.id).unwrap().unwrap();
        assert_eq!(loaded.name, "Eclipse House");
        assert_eq!(loaded.series_count, 0);

        store.delete_publisher(publisher.id).unwrap();
        assert!(store.get_publisher(publisher.id).unwrap().is_none());
    }

    #[test]
    fn issue_sort_ordering_queries() {
        let db = open_in_memory().unwrap();
        let store = db.display();
        let mut series = Series {
            name: "Test Comics".to_string(),
            sort_name: "Test Comics".to_string(),
            year_began: 1990,
            country: "us".to_string(),
            language: "en".to_string(),
            publisher: 1,
            ..Default::default()
        };
        store.save_series(&mut series).unwrap();

        for (number, sort_code) in [("1", 0), ("2", 1), ("3", 2)] {
            let mut issue = Issue {
                number: number.to_string(),
                series: series.id,
                sort_code,
                ..Default::default()
            };
            store.save_issue(&mut issue).unwrap();
        }

        let later = store.issues_later_than(series.id, 0).unwrap();
        assert_eq!(later.len(), 2);
        assert_eq!(later[0].sort_code, 2);
        assert_eq!(later[1].sort_code, 1);
        assert_eq!(store.max_sort_code(series.id).unwrap(), Some(2));
    }

    #[test]
    fn keywords_roundtrip_canonicalizes() {
        let db = open_in_memory().unwrap();
        let store = db.display();
        let joined = store
            .set_keywords(EntityKind::Issue, 7, "zebra;  alpha ; alpha")
            .unwrap();
        assert_eq!(joined, "alpha; zebra");
        assert_eq!(store.get_keywords(EntityKind::Issue, 7).unwrap(), "alpha; zebra");
    }

    #[test]
    fn cached_count_adjustment_ignores_unknown_categories() {
        let db = open_in_memory().unwrap();
        let store = db.display();
        let mut publisher = Publisher {
            name: "Counting Comics".to_string(),
            country: "us".to_string(),
            ..Default::default()
        };
        store.save_publisher(&mut publisher).unwrap();

        store
            .adjust_cached_count(EntityKind::Publisher, publisher.id, "issues", 3)
            .unwrap();
        store
            .adjust_cached_count(EntityKind::Publisher, publisher.id, "variant issues", 5)
            .unwrap();

        let loaded = store.get_publisher(publisher.id).unwrap().unwrap();
        assert_eq!(loaded.issue_count, 3);
    }

    #[test]
    fn first_last_pointers_skip_variants() {
        let db = open_in_memory().unwrap();
        let store = db.display();
        let mut series = Series {
            name: "Pointer Comics".to_string(),
            sort_name: "Pointer Comics".to_string(),
            year_began: 2000,
            country: "us".to_string(),
            language: "en".to_string(),
            publisher: 1,
            ..Default::default()
        };
        store.save_series(&mut series).unwrap();

        let mut first = Issue {
            number: "1".to_string(),
            series: series.id,
            sort_code: 0,
            ..Default::default()
        };
        store.save_issue(&mut first).unwrap();
        let mut last = Issue {
            number: "2".to_string(),
            series: series.id,
            sort_code: 1,
            ..Default::default()
        };
        store.save_issue(&mut last).unwrap();
        let mut variant = Issue {
            number: "2".to_string(),
            series: series.id,
            sort_code: 2,
            variant_of: Some(last.id),
            ..Default::default()
        };
        store.save_issue(&mut variant).unwrap();

        store.set_series_first_last(series.id).unwrap();
        let loaded = store.get_series(series.id).unwrap().unwrap();
        assert_eq!(loaded.first_issue, Some(first.id));
        assert_eq!(loaded.last_issue, Some(last.id));
    }
}
