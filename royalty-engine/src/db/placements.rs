//! Placement registry persistence (authoritative writer/split data)

use chrono::Utc;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};
use std::collections::HashMap;

use super::{decimal_col, format_ts, uuid_col};
use crate::error::EngineResult;
use crate::models::{normalize_title, Placement, PlacementCredit};

/// Insert a placement with its credits
pub async fn insert_placement(conn: &mut SqliteConnection, placement: &Placement) -> EngineResult<()> {
    sqlx::query(
        r#"
        INSERT INTO placements (id, work_title, normalized_title, publisher_ipi, dsp_name, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(placement.id.to_string())
    .bind(&placement.work_title)
    .bind(normalize_title(&placement.work_title))
    .bind(&placement.publisher_ipi)
    .bind(&placement.dsp_name)
    .bind(format_ts(Utc::now()))
    .execute(&mut *conn)
    .await?;

    for credit in &placement.credits {
        sqlx::query(
            r#"
            INSERT INTO placement_credits (placement_id, writer_id, split_percentage, writer_ipi)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(placement.id.to_string())
        .bind(credit.writer_id.to_string())
        .bind(credit.split_percentage.to_string())
        .bind(&credit.writer_ipi)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Titles bound per lookup query
const TITLE_CHUNK: usize = 500;

/// All placements registered under a title (normalized comparison)
pub async fn find_by_title(conn: &mut SqliteConnection, work_title: &str) -> EngineResult<Vec<Placement>> {
    let title = normalize_title(work_title);
    let mut by_title = find_by_titles(conn, std::slice::from_ref(&title)).await?;
    Ok(by_title.remove(&title).unwrap_or_default())
}

/// Placements for many normalized titles, keyed by normalized title
///
/// One joined query per chunk of titles. Placements without credits are
/// left out since they cannot assign anything.
pub async fn find_by_titles(
    conn: &mut SqliteConnection,
    normalized_titles: &[String],
) -> EngineResult<HashMap<String, Vec<Placement>>> {
    let mut by_title: HashMap<String, Vec<Placement>> = HashMap::new();

    for chunk in normalized_titles.chunks(TITLE_CHUNK) {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"
            SELECT p.id, p.work_title, p.normalized_title, p.publisher_ipi, p.dsp_name,
                   c.writer_id, c.split_percentage, c.writer_ipi
            FROM placements p
            JOIN placement_credits c ON c.placement_id = p.id
            WHERE p.normalized_title IN ("#,
        );
        {
            let mut titles = builder.separated(", ");
            for title in chunk {
                titles.push_bind(title.clone());
            }
        }
        builder.push(") ORDER BY p.created_at, p.id, c.writer_id");

        let rows = builder.build().fetch_all(&mut *conn).await?;
        for row in &rows {
            let id = uuid_col(row, "id")?;
            let placements = by_title.entry(row.try_get("normalized_title")?).or_default();
            if placements.last().map(|p| p.id) != Some(id) {
                placements.push(Placement {
                    id,
                    work_title: row.try_get("work_title")?,
                    publisher_ipi: row.try_get("publisher_ipi")?,
                    dsp_name: row.try_get("dsp_name")?,
                    credits: Vec::new(),
                });
            }
            if let Some(placement) = placements.last_mut() {
                placement.credits.push(PlacementCredit {
                    writer_id: uuid_col(row, "writer_id")?,
                    split_percentage: decimal_col(row, "split_percentage")?,
                    writer_ipi: row.try_get("writer_ipi")?,
                });
            }
        }
    }

    Ok(by_title)
}
