//! User-owned collections. Visibility and mutation are restricted to the
//! owner; a collection someone else owns behaves as if it did not exist.

use rusqlite::{params, Connection};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct CollectionSummary {
    pub id: i64,
    pub title: String,
    pub item_count: i64,
}

#[derive(Debug, Clone)]
pub struct CollectionImage {
    pub id: i64,
    pub title: String,
    pub image_url: String,
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CollectionDetail {
    pub id: i64,
    pub title: String,
    pub user_id: i64,
    pub images: Vec<CollectionImage>,
}

pub fn create_collection(conn: &Connection, title: &str, acting_user_id: i64) -> AppResult<i64> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::BadRequest("Collection title is required".into()));
    }
    if title.len() > 255 {
        return Err(AppError::BadRequest(
            "Collection title must be 255 characters or less".into(),
        ));
    }

    conn.execute(
        "INSERT INTO collections (user_id, title) VALUES (?1, ?2)",
        params![acting_user_id, title],
    )?;
    Ok(conn.last_insert_rowid())
}

/// The acting user's collections with per-collection item counts.
pub fn list_collections(conn: &Connection, acting_user_id: i64) -> AppResult<Vec<CollectionSummary>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.title,
                (SELECT COUNT(*) FROM collection_images ci WHERE ci.collection_id = c.id)
         FROM collections c
         WHERE c.user_id = ?1
         ORDER BY c.created_at DESC, c.id DESC",
    )?;
    let collections = stmt
        .query_map(params![acting_user_id], |row| {
            Ok(CollectionSummary {
                id: row.get(0)?,
                title: row.get(1)?,
                item_count: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(collections)
}

/// One collection with its images, in membership insertion order.
/// Not-owned collections read as NotFound.
pub fn get_collection_with_images(
    conn: &Connection,
    collection_id: i64,
    acting_user_id: i64,
) -> AppResult<CollectionDetail> {
    let (id, title, user_id): (i64, String, i64) = conn
        .query_row(
            "SELECT id, title, user_id FROM collections WHERE id = ?1",
            params![collection_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .map_err(|_| AppError::NotFound)?;

    if user_id != acting_user_id {
        return Err(AppError::NotFound);
    }

    let mut stmt = conn.prepare(
        "SELECT i.id, i.title, i.image_url, i.thumbnail_url
         FROM collection_images ci
         JOIN images i ON i.id = ci.image_id
         WHERE ci.collection_id = ?1
         ORDER BY ci.id ASC",
    )?;
    let images = stmt
        .query_map(params![collection_id], |row| {
            Ok(CollectionImage {
                id: row.get(0)?,
                title: row.get(1)?,
                image_url: row.get(2)?,
                thumbnail_url: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CollectionDetail {
        id,
        title,
        user_id,
        images,
    })
}

pub fn add_image_to_collection(
    conn: &Connection,
    collection_id: i64,
    image_id: i64,
    acting_user_id: i64,
) -> AppResult<()> {
    let owner_id: i64 = conn
        .query_row(
            "SELECT user_id FROM collections WHERE id = ?1",
            params![collection_id],
            |r| r.get(0),
        )
        .map_err(|_| AppError::NotFound)?;
    if owner_id != acting_user_id {
        return Err(AppError::NotFound);
    }

    let image_exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM images WHERE id = ?1",
        params![image_id],
        |r| r.get(0),
    )?;
    if !image_exists {
        return Err(AppError::NotFound);
    }

    let already: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM collection_images WHERE collection_id = ?1 AND image_id = ?2",
        params![collection_id, image_id],
        |r| r.get(0),
    )?;
    if already {
        return Err(AppError::BadRequest(
            "Image already exists in this collection".into(),
        ));
    }

    conn.execute(
        "INSERT INTO collection_images (collection_id, image_id) VALUES (?1, ?2)",
        params![collection_id, image_id],
    )?;
    Ok(())
}

pub fn remove_image_from_collection(
    conn: &Connection,
    collection_id: i64,
    image_id: i64,
    acting_user_id: i64,
) -> AppResult<()> {
    let owner_id: i64 = conn
        .query_row(
            "SELECT user_id FROM collections WHERE id = ?1",
            params![collection_id],
            |r| r.get(0),
        )
        .map_err(|_| AppError::NotFound)?;
    if owner_id != acting_user_id {
        return Err(AppError::NotFound);
    }

    conn.execute(
        "DELETE FROM collection_images WHERE collection_id = ?1 AND image_id = ?2",
        params![collection_id, image_id],
    )?;
    Ok(())
}

/// Delete a collection and its memberships (FK cascade). Images remain.
pub fn delete_collection(
    conn: &Connection,
    collection_id: i64,
    acting_user_id: i64,
) -> AppResult<()> {
    let owner_id: i64 = conn
        .query_row(
            "SELECT user_id FROM collections WHERE id = ?1",
            params![collection_id],
            |r| r.get(0),
        )
        .map_err(|_| AppError::NotFound)?;
    if owner_id != acting_user_id {
        return Err(AppError::NotFound);
    }

    conn.execute(
        "DELETE FROM collections WHERE id = ?1",
        params![collection_id],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn seed(conn: &Connection) -> (i64, i64, i64) {
        conn.execute(
            "INSERT INTO users (email, password_hash) VALUES ('owner@x.y', 'h')",
            [],
        )
        .unwrap();
        let owner = conn.last_insert_rowid();
        conn.execute(
            "INSERT INTO users (email, password_hash) VALUES ('other@x.y', 'h')",
            [],
        )
        .unwrap();
        let other = conn.last_insert_rowid();
        conn.execute(
            "INSERT INTO images (title, image_url, uploaded_by_id) VALUES ('pic', 'u', ?1)",
            params![owner],
        )
        .unwrap();
        let image = conn.last_insert_rowid();
        (owner, other, image)
    }

    #[test]
    fn create_and_list_with_item_counts() {
        let pool = db::test_pool();
        let conn = pool.get().unwrap();
        let (owner, _other, image) = seed(&conn);

        let c = create_collection(&conn, "Favorites", owner).unwrap();
        add_image_to_collection(&conn, c, image, owner).unwrap();

        let list = list_collections(&conn, owner).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].title, "Favorites");
        assert_eq!(list[0].item_count, 1);
    }

    #[test]
    fn create_rejects_blank_title() {
        let pool = db::test_pool();
        let conn = pool.get().unwrap();
        let (owner, _, _) = seed(&conn);
        assert!(create_collection(&conn, "  ", owner).is_err());
    }

    #[test]
    fn duplicate_membership_rejected() {
        let pool = db::test_pool();
        let conn = pool.get().unwrap();
        let (owner, _other, image) = seed(&conn);
        let c = create_collection(&conn, "Favorites", owner).unwrap();
        add_image_to_collection(&conn, c, image, owner).unwrap();
        let err = add_image_to_collection(&conn, c, image, owner).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn foreign_collection_reads_as_not_found() {
        let pool = db::test_pool();
        let conn = pool.get().unwrap();
        let (owner, other, image) = seed(&conn);
        let c = create_collection(&conn, "Private", owner).unwrap();

        assert!(matches!(
            get_collection_with_images(&conn, c, other).unwrap_err(),
            AppError::NotFound
        ));
        assert!(matches!(
            add_image_to_collection(&conn, c, image, other).unwrap_err(),
            AppError::NotFound
        ));
        assert!(matches!(
            delete_collection(&conn, c, other).unwrap_err(),
            AppError::NotFound
        ));
        // Owner still sees it untouched.
        let detail = get_collection_with_images(&conn, c, owner).unwrap();
        assert!(detail.images.is_empty());
    }

    #[test]
    fn membership_preserves_insertion_order() {
        let pool = db::test_pool();
        let conn = pool.get().unwrap();
        let (owner, _other, first) = seed(&conn);
        conn.execute(
            "INSERT INTO images (title, image_url, uploaded_by_id) VALUES ('pic2', 'u', ?1)",
            params![owner],
        )
        .unwrap();
        let second = conn.last_insert_rowid();

        let c = create_collection(&conn, "Ordered", owner).unwrap();
        add_image_to_collection(&conn, c, second, owner).unwrap();
        add_image_to_collection(&conn, c, first, owner).unwrap();

        let detail = get_collection_with_images(&conn, c, owner).unwrap();
        let ids: Vec<i64> = detail.images.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![second, first]);
    }

    #[test]
    fn delete_collection_keeps_images() {
        let pool = db::test_pool();
        let conn = pool.get().unwrap();
        let (owner, _other, image) = seed(&conn);
        let c = create_collection(&conn, "Doomed", owner).unwrap();
        add_image_to_collection(&conn, c, image, owner).unwrap();

        delete_collection(&conn, c, owner).unwrap();

        let memberships: i64 = conn
            .query_row("SELECT COUNT(*) FROM collection_images", [], |r| r.get(0))
            .unwrap();
        let images: i64 = conn
            .query_row("SELECT COUNT(*) FROM images", [], |r| r.get(0))
            .unwrap();
        assert_eq!(memberships, 0);
        assert_eq!(images, 1);
    }
}
