use crate::db;
use crate::ipc::error::ApiError;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TermWindow {
    pub academic_year: String,
    pub term: i64,
    pub start_date: String,
    pub end_date: String,
}

/// Resolves which term a date falls in for a school. Dates are stored as
/// ISO text, so plain string comparison orders correctly.
pub fn resolve_term(
    conn: &Connection,
    school_id: &str,
    date: NaiveDate,
) -> Result<Option<TermWindow>, ApiError> {
    let key = date.format("%Y-%m-%d").to_string();
    let row = conn
        .query_row(
            "SELECT academic_year, term, start_date, end_date
             FROM academic_terms
             WHERE school_id = ? AND start_date <= ? AND end_date >= ?
             ORDER BY start_date DESC
             LIMIT 1",
            [school_id, &key, &key],
            |r| {
                Ok(TermWindow {
                    academic_year: r.get(0)?,
                    term: r.get(1)?,
                    start_date: r.get(2)?,
                    end_date: r.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

pub fn term_window(
    conn: &Connection,
    school_id: &str,
    academic_year: &str,
    term: i64,
) -> Result<Option<TermWindow>, ApiError> {
    let row = conn
        .query_row(
            "SELECT academic_year, term, start_date, end_date
             FROM academic_terms
             WHERE school_id = ? AND academic_year = ? AND term = ?",
            (school_id, academic_year, term),
            |r| {
                Ok(TermWindow {
                    academic_year: r.get(0)?,
                    term: r.get(1)?,
                    start_date: r.get(2)?,
                    end_date: r.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

pub fn set_term(
    conn: &Connection,
    school_id: &str,
    academic_year: &str,
    term: i64,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<(), ApiError> {
    conn.execute(
        "INSERT INTO academic_terms(id, school_id, academic_year, term, start_date, end_date)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(school_id, academic_year, term)
         DO UPDATE SET start_date = excluded.start_date, end_date = excluded.end_date",
        (
            db::new_id(),
            school_id,
            academic_year,
            term,
            start_date.format("%Y-%m-%d").to_string(),
            end_date.format("%Y-%m-%d").to_string(),
        ),
    )?;
    Ok(())
}

pub fn list_terms(conn: &Connection, school_id: &str) -> Result<Vec<TermWindow>, ApiError> {
    let mut stmt = conn.prepare(
        "SELECT academic_year, term, start_date, end_date
         FROM academic_terms
         WHERE school_id = ?
         ORDER BY start_date",
    )?;
    let rows = stmt
        .query_map([school_id], |r| {
            Ok(TermWindow {
                academic_year: r.get(0)?,
                term: r.get(1)?,
                start_date: r.get(2)?,
                end_date: r.get(3)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(rows)
}
