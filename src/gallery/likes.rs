use rusqlite::{params, Connection};

use crate::error::{AppError, AppResult};

/// Result of a like toggle, reported back to the client verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeOutcome {
    Liked,
    Disliked,
}

impl LikeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            LikeOutcome::Liked => "liked",
            LikeOutcome::Disliked => "disliked",
        }
    }
}

/// Toggle the acting user's like on an image: delete when present, insert
/// when absent. The UNIQUE (user_id, image_id) index plus INSERT OR IGNORE
/// collapses a concurrent double-toggle into a no-op instead of a
/// duplicate row.
pub fn toggle_like(conn: &Connection, image_id: i64, acting_user_id: i64) -> AppResult<LikeOutcome> {
    let image_exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM images WHERE id = ?1",
        params![image_id],
        |r| r.get(0),
    )?;
    if !image_exists {
        return Err(AppError::NotFound);
    }

    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM likes WHERE image_id = ?1 AND user_id = ?2",
            params![image_id, acting_user_id],
            |r| r.get(0),
        )
        .ok();

    if existing.is_some() {
        conn.execute(
            "DELETE FROM likes WHERE image_id = ?1 AND user_id = ?2",
            params![image_id, acting_user_id],
        )?;
        Ok(LikeOutcome::Disliked)
    } else {
        conn.execute(
            "INSERT OR IGNORE INTO likes (user_id, image_id) VALUES (?1, ?2)",
            params![acting_user_id, image_id],
        )?;
        Ok(LikeOutcome::Liked)
    }
}
