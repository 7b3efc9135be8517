use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use rayon::prelude::*;
use rusqlite::Connection;
use tracing::info;

use crate::clean::{clean_row, normalize_text};
use crate::clean::gazetteer::Gazetteer;
use crate::dedup::{Deduplicator, IdentityKey, Identified};
use crate::model::OutputRow;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS doctors (
            id          INTEGER PRIMARY KEY,
            name        TEXT NOT NULL DEFAULT '',
            category    TEXT NOT NULL DEFAULT '',
            degree      TEXT NOT NULL DEFAULT '',
            experience  TEXT NOT NULL DEFAULT '',
            location    TEXT NOT NULL DEFAULT '',
            region      TEXT NOT NULL DEFAULT '',
            rating      TEXT NOT NULL DEFAULT '',
            vote_count  TEXT NOT NULL DEFAULT '',
            fee         TEXT NOT NULL DEFAULT '',
            profile_url TEXT UNIQUE NOT NULL,
            map_link    TEXT NOT NULL DEFAULT '',
            scraped_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_doctors_region ON doctors(region, category);
        ",
    )?;
    Ok(())
}

fn column_list() -> String {
    OutputRow::COLUMNS.join(", ")
}

/// Upsert by profile URL. Returns the number of rows written.
pub fn save_rows(conn: &Connection, rows: &[OutputRow]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(&format!(
            "INSERT OR REPLACE INTO doctors ({})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            column_list()
        ))?;
        for r in rows {
            count += stmt.execute(rusqlite::params_from_iter(r.fields()))?;
        }
    }
    tx.commit()?;
    Ok(count)
}

/// Every stored row, oldest first, with its row id.
pub fn fetch_rows(conn: &Connection) -> Result<Vec<(i64, OutputRow)>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, {} FROM doctors ORDER BY id",
        column_list()
    ))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get(0)?,
                OutputRow {
                    name: row.get(1)?,
                    category: row.get(2)?,
                    credentials: row.get(3)?,
                    experience: row.get(4)?,
                    location: row.get(5)?,
                    region: row.get(6)?,
                    rating: row.get(7)?,
                    vote_count: row.get(8)?,
                    fee: row.get(9)?,
                    profile_url: row.get(10)?,
                    map_link: row.get(11)?,
                    scraped_at: row.get(12)?,
                },
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CleanStats {
    pub total: usize,
    pub changed: usize,
    pub locations_cleared: usize,
    pub locations_resolved: usize,
    pub duplicates_removed: usize,
}

struct StoredRow {
    id: i64,
    row: OutputRow,
}

impl Identified for StoredRow {
    fn identity(&self) -> IdentityKey {
        self.row.identity()
    }

    fn filled_fields(&self) -> usize {
        self.row.filled_fields()
    }
}

/// Re-run the cleaning policy over persisted rows, then collapse rows that
/// describe the same person into the most complete one (lowest id on a tie).
/// Changed rows are written back and the rest of each group is deleted. A
/// second pass reports zero changes and zero removals.
pub fn apply_clean(conn: &Connection, gazetteer: &Gazetteer) -> Result<CleanStats> {
    let rows = fetch_rows(conn)?;
    let cleaned: Vec<(i64, OutputRow, &OutputRow)> = rows
        .par_iter()
        .map(|(id, row)| (*id, clean_row(row, gazetteer), row))
        .collect();

    // Nameless rows have no meaningful identity and are left alone.
    let mut dedup: Deduplicator<StoredRow> = Deduplicator::new();
    for (id, new, _) in cleaned.iter().filter(|(_, new, _)| !new.name.is_empty()) {
        dedup.insert(StoredRow {
            id: *id,
            row: new.clone(),
        });
    }
    let kept: HashSet<i64> = dedup.into_records().into_iter().map(|r| r.id).collect();
    let removed: HashSet<i64> = cleaned
        .iter()
        .filter(|(id, new, _)| !new.name.is_empty() && !kept.contains(id))
        .map(|(id, _, _)| *id)
        .collect();

    let mut stats = CleanStats {
        total: rows.len(),
        duplicates_removed: removed.len(),
        ..CleanStats::default()
    };

    let tx = conn.unchecked_transaction()?;
    {
        let mut update = tx.prepare(
            "UPDATE doctors SET name = ?1, category = ?2, degree = ?3, experience = ?4,
             location = ?5 WHERE id = ?6",
        )?;
        for (id, new, old) in cleaned
            .iter()
            .filter(|(id, new, old)| new != *old && !removed.contains(id))
        {
            stats.changed += 1;
            if new.location != normalize_text(&old.location) {
                if new.location.is_empty() {
                    stats.locations_cleared += 1;
                } else {
                    stats.locations_resolved += 1;
                }
            }
            update.execute(rusqlite::params![
                new.name,
                new.category,
                new.credentials,
                new.experience,
                new.location,
                id
            ])?;
        }

        let mut delete = tx.prepare("DELETE FROM doctors WHERE id = ?1")?;
        for id in &removed {
            delete.execute([id])?;
        }
    }
    tx.commit()?;

    if stats.duplicates_removed > 0 {
        info!(
            "Removed {} duplicate rows of {}",
            stats.duplicates_removed, stats.total
        );
    }
    Ok(stats)
}

pub struct Stats {
    pub total: usize,
    /// Non-empty count per output column, in column order.
    pub filled: Vec<(&'static str, usize)>,
}

impl Stats {
    pub fn fill_rate(&self, column: &str) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        self.filled
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, n)| *n as f64 * 100.0 / self.total as f64)
    }
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let sums = OutputRow::COLUMNS
        .iter()
        .map(|c| format!("COALESCE(SUM(TRIM({c}) <> ''), 0)"))
        .collect::<Vec<_>>()
        .join(", ");
    let (total, counts) = conn.query_row(
        &format!("SELECT COUNT(*), {sums} FROM doctors"),
        [],
        |row| {
            let total: i64 = row.get(0)?;
            let counts = (0..OutputRow::COLUMNS.len())
                .map(|i| row.get::<_, i64>(i + 1))
                .collect::<Result<Vec<_>, _>>()?;
            Ok((total, counts))
        },
    )?;

    Ok(Stats {
        total: total as usize,
        filled: OutputRow::COLUMNS
            .iter()
            .zip(counts)
            .map(|(c, n)| (*c, n as usize))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn row(url: &str, location: &str, fee: &str) -> OutputRow {
        OutputRow {
            name: "Dr. Asha Rao".into(),
            category: "Dentist".into(),
            location: location.into(),
            region: "Bangalore".into(),
            fee: fee.into(),
            profile_url: url.into(),
            scraped_at: "2024-05-01T10:00:00+00:00".into(),
            ..OutputRow::default()
        }
    }

    #[test]
    fn save_is_an_upsert_by_profile_url() {
        let conn = db();
        save_rows(&conn, &[row("https://x/1", "HSR Layout", ""), row("https://x/2", "", "")]).unwrap();
        save_rows(&conn, &[row("https://x/1", "HSR Layout", "600")]).unwrap();

        let rows = fetch_rows(&conn).unwrap();
        assert_eq!(rows.len(), 2);
        let first = rows.iter().find(|(_, r)| r.profile_url == "https://x/1").unwrap();
        assert_eq!(first.1.fee, "600");
    }

    #[test]
    fn batch_clean_is_idempotent() {
        let conn = db();
        let resolvable = OutputRow {
            name: "Dr. Meera Iyer".into(),
            map_link: "https://www.google.com/maps/place/12.9352,77.6146".into(),
            ..row("https://x/3", "", "")
        };
        let garbage = OutputRow {
            name: "Dr. Ravi Kumar".into(),
            ..row("https://x/1", "a,abbr,acronym,address,applet", "")
        };
        save_rows(
            &conn,
            &[garbage, row("https://x/2", "Koramangala, Bangalore", "500"), resolvable],
        )
        .unwrap();

        let gazetteer = Gazetteer::builtin(5.0);
        let first = apply_clean(&conn, &gazetteer).unwrap();
        assert_eq!(first.total, 3);
        assert_eq!(first.changed, 2);
        assert_eq!(first.locations_cleared, 1);
        assert_eq!(first.locations_resolved, 1);
        assert_eq!(first.duplicates_removed, 0);
        let after_first = fetch_rows(&conn).unwrap();

        let second = apply_clean(&conn, &gazetteer).unwrap();
        assert_eq!(second.changed, 0);
        assert_eq!(fetch_rows(&conn).unwrap(), after_first);

        let locations: Vec<_> = after_first.iter().map(|(_, r)| r.location.as_str()).collect();
        assert_eq!(locations, vec!["", "Koramangala, Bangalore", "Koramangala"]);
    }

    #[test]
    fn clean_collapses_duplicates_across_runs() {
        let conn = db();
        save_rows(&conn, &[row("https://x/run1", "HSR Layout", "")]).unwrap();
        save_rows(&conn, &[row("https://x/run2", "HSR Layout", "500")]).unwrap();
        let other_region = OutputRow {
            region: "Delhi".into(),
            ..row("https://x/run3", "Saket", "")
        };
        save_rows(&conn, &[other_region]).unwrap();

        let gazetteer = Gazetteer::builtin(5.0);
        let first = apply_clean(&conn, &gazetteer).unwrap();
        assert_eq!(first.total, 3);
        assert_eq!(first.duplicates_removed, 1);

        let rows = fetch_rows(&conn).unwrap();
        let urls: Vec<_> = rows.iter().map(|(_, r)| r.profile_url.as_str()).collect();
        assert_eq!(urls, vec!["https://x/run2", "https://x/run3"]);

        let second = apply_clean(&conn, &gazetteer).unwrap();
        assert_eq!(second.duplicates_removed, 0);
        assert_eq!(second.changed, 0);
        assert_eq!(fetch_rows(&conn).unwrap(), rows);
    }

    #[test]
    fn clean_keeps_lowest_id_on_tie_and_ignores_nameless_rows() {
        let conn = db();
        let nameless = |url: &str| OutputRow {
            name: String::new(),
            ..row(url, "", "")
        };
        save_rows(
            &conn,
            &[
                row("https://x/a", "HSR Layout", ""),
                row("https://x/b", "  HSR   Layout ", ""),
                nameless("https://x/c"),
                nameless("https://x/d"),
            ],
        )
        .unwrap();

        let stats = apply_clean(&conn, &Gazetteer::builtin(5.0)).unwrap();
        assert_eq!(stats.duplicates_removed, 1);
        let urls: Vec<_> = fetch_rows(&conn)
            .unwrap()
            .into_iter()
            .map(|(_, r)| r.profile_url)
            .collect();
        assert_eq!(urls, vec!["https://x/a", "https://x/c", "https://x/d"]);
    }

    #[test]
    fn stats_report_fill_rates() {
        let conn = db();
        save_rows(
            &conn,
            &[
                row("https://x/1", "HSR Layout", "500"),
                row("https://x/2", "", "700"),
                row("https://x/3", " ", ""),
                row("https://x/4", "", ""),
            ],
        )
        .unwrap();
        let s = get_stats(&conn).unwrap();
        assert_eq!(s.total, 4);
        assert_eq!(s.fill_rate("name"), Some(100.0));
        assert_eq!(s.fill_rate("fee"), Some(50.0));
        assert_eq!(s.fill_rate("location"), Some(25.0));
        assert_eq!(s.fill_rate("degree"), Some(0.0));
        assert_eq!(s.fill_rate("nope"), None);
    }

    #[test]
    fn empty_database_has_no_rates() {
        let s = get_stats(&db()).unwrap();
        assert_eq!(s.total, 0);
        assert_eq!(s.fill_rate("name"), None);
    }
}
