//! The paginated, filterable image listing and the single-image detail
//! query. Aggregate columns are deserialized into explicit record types at
//! this boundary so nothing downstream handles untyped rows.

use rusqlite::{params, Connection};

use crate::error::AppResult;

/// One image summary on the feed.
#[derive(Debug, Clone)]
pub struct FeedImage {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub image_url: String,
    pub thumbnail_url: Option<String>,
    pub uploader_email: String,
    pub uploader_name: Option<String>,
    pub created_at: String,
    pub like_count: i64,
    /// Ids of users who liked this image.
    pub liked_by: Vec<i64>,
    pub tags: Vec<String>,
}

/// One page of the feed plus pagination metadata.
#[derive(Debug, Default)]
pub struct FeedPage {
    pub images: Vec<FeedImage>,
    pub page: u32,
    pub per_page: u32,
    pub total_records: i64,
    pub total_pages: i64,
    /// Heuristic: true when the returned page is full. Off by one when the
    /// final page is exactly full; kept to avoid a second boundary query.
    pub has_more: bool,
    pub error: Option<String>,
}

/// Filter predicate shared by the page query and the count query so
/// `total_records` stays consistent with the returned page's scope.
/// `?1` is the lowercased needle; an empty needle matches everything.
const FEED_FILTER: &str = "(?1 = ''
        OR instr(lower(i.title), ?1) > 0
        OR instr(lower(COALESCE(i.description, '')), ?1) > 0
        OR instr(lower(u.email), ?1) > 0
        OR i.id IN (SELECT it2.image_id
                    FROM image_tags it2
                    JOIN tags t2 ON t2.id = it2.tag_id
                    WHERE instr(lower(t2.name), ?1) > 0))";

/// Fetch one page of the feed. Fails soft: a storage error yields an empty
/// page with `error` set so the page renders a message instead of crashing.
pub fn fetch_image_feed(conn: &Connection, page: u32, limit: u32, query: Option<&str>) -> FeedPage {
    let page = page.max(1);
    let limit = limit.max(1);

    match query_feed(conn, page, limit, query) {
        Ok(feed) => feed,
        Err(e) => {
            tracing::error!("Failed to fetch image feed: {}", e);
            FeedPage {
                page: 1,
                per_page: limit,
                total_pages: 1,
                error: Some("Internal server error".into()),
                ..FeedPage::default()
            }
        }
    }
}

fn query_feed(conn: &Connection, page: u32, limit: u32, query: Option<&str>) -> AppResult<FeedPage> {
    let needle = query.unwrap_or("").trim().to_lowercase();
    let offset = (page as i64 - 1) * limit as i64;

    let sql = format!(
        "SELECT i.id, i.title, i.description, i.image_url, i.thumbnail_url,
                u.email, u.name, i.created_at,
                COUNT(DISTINCT l.id) AS like_count,
                COALESCE(group_concat(DISTINCT l.user_id), '') AS liker_ids,
                COALESCE(group_concat(DISTINCT t.name), '') AS tag_names
         FROM images i
         JOIN users u ON u.id = i.uploaded_by_id
         LEFT JOIN likes l ON l.image_id = i.id
         LEFT JOIN image_tags it ON it.image_id = i.id
         LEFT JOIN tags t ON t.id = it.tag_id
         WHERE {FEED_FILTER}
         GROUP BY i.id
         ORDER BY i.created_at DESC, i.id DESC
         LIMIT ?2 OFFSET ?3"
    );

    let mut stmt = conn.prepare(&sql)?;
    let images = stmt
        .query_map(params![needle, limit, offset], |row| {
            let liker_ids: String = row.get(9)?;
            let tag_names: String = row.get(10)?;
            Ok(FeedImage {
                id: row.get(0)?,
                title: row.get(1)?,
                description: row.get(2)?,
                image_url: row.get(3)?,
                thumbnail_url: row.get(4)?,
                uploader_email: row.get(5)?,
                uploader_name: row.get(6)?,
                created_at: row.get(7)?,
                like_count: row.get(8)?,
                liked_by: split_ids(&liker_ids),
                tags: split_names(&tag_names),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    // Independent count over the identical predicate.
    let count_sql = format!(
        "SELECT COUNT(*)
         FROM images i
         JOIN users u ON u.id = i.uploaded_by_id
         WHERE {FEED_FILTER}"
    );
    let total_records: i64 = conn.query_row(&count_sql, params![needle], |r| r.get(0))?;
    let total_pages = ((total_records + limit as i64 - 1) / limit as i64).max(1);

    let has_more = images.len() as u32 >= limit;

    Ok(FeedPage {
        images,
        page,
        per_page: limit,
        total_records,
        total_pages,
        has_more,
        error: None,
    })
}

fn split_ids(joined: &str) -> Vec<i64> {
    joined
        .split(',')
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect()
}

fn split_names(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

// -- Single image detail --

#[derive(Debug, Clone)]
pub struct TagRef {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Liker {
    pub id: i64,
    pub email: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ImageDetail {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub image_url: String,
    pub thumbnail_url: Option<String>,
    pub public_id: Option<String>,
    pub uploaded_by_id: i64,
    pub uploader_email: String,
    pub uploader_name: Option<String>,
    pub created_at: String,
    pub like_count: i64,
    pub liked_by: Vec<Liker>,
    pub tags: Vec<TagRef>,
}

/// Fetch a single image with its uploader, like list, and tags.
pub fn get_image_detail(conn: &Connection, image_id: i64) -> AppResult<Option<ImageDetail>> {
    let base = conn.query_row(
        "SELECT i.id, i.title, i.description, i.image_url, i.thumbnail_url,
                i.public_id, i.uploaded_by_id, u.email, u.name, i.created_at
         FROM images i
         JOIN users u ON u.id = i.uploaded_by_id
         WHERE i.id = ?1",
        params![image_id],
        |row| {
            Ok(ImageDetail {
                id: row.get(0)?,
                title: row.get(1)?,
                description: row.get(2)?,
                image_url: row.get(3)?,
                thumbnail_url: row.get(4)?,
                public_id: row.get(5)?,
                uploaded_by_id: row.get(6)?,
                uploader_email: row.get(7)?,
                uploader_name: row.get(8)?,
                created_at: row.get(9)?,
                like_count: 0,
                liked_by: Vec::new(),
                tags: Vec::new(),
            })
        },
    );

    let mut detail = match base {
        Ok(d) => d,
        Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut stmt = conn.prepare(
        "SELECT u.id, u.email, u.name
         FROM likes l JOIN users u ON u.id = l.user_id
         WHERE l.image_id = ?1
         ORDER BY l.created_at ASC",
    )?;
    detail.liked_by = stmt
        .query_map(params![image_id], |row| {
            Ok(Liker {
                id: row.get(0)?,
                email: row.get(1)?,
                name: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    detail.like_count = detail.liked_by.len() as i64;

    let mut stmt = conn.prepare(
        "SELECT t.id, t.name
         FROM image_tags it JOIN tags t ON t.id = it.tag_id
         WHERE it.image_id = ?1
         ORDER BY t.name ASC",
    )?;
    detail.tags = stmt
        .query_map(params![image_id], |row| {
            Ok(TagRef {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(detail))
}

/// All tags, ordered by name.
pub fn get_all_tags(conn: &Connection) -> AppResult<Vec<TagRef>> {
    let mut stmt = conn.prepare("SELECT id, name FROM tags ORDER BY name ASC")?;
    let tags = stmt
        .query_map([], |row| {
            Ok(TagRef {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tags)
}

/// Create a tag if it does not exist and attach it to an image.
/// Tag names are normalized to lowercase; commas are rejected since the
/// feed aggregates tag lists with a comma separator.
pub fn tag_image(conn: &Connection, image_id: i64, name: &str) -> AppResult<i64> {
    let name = name.trim().to_lowercase();
    if name.is_empty() || name.len() > 50 || name.contains(',') {
        return Err(crate::error::AppError::BadRequest("Invalid tag name".into()));
    }

    conn.execute(
        "INSERT OR IGNORE INTO tags (name) VALUES (?1)",
        params![name],
    )?;
    let tag_id: i64 = conn.query_row(
        "SELECT id FROM tags WHERE name = ?1",
        params![name],
        |r| r.get(0),
    )?;

    let already: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM image_tags WHERE image_id = ?1 AND tag_id = ?2",
        params![image_id, tag_id],
        |r| r.get(0),
    )?;
    if !already {
        conn.execute(
            "INSERT INTO image_tags (image_id, tag_id) VALUES (?1, ?2)",
            params![image_id, tag_id],
        )?;
    }

    Ok(tag_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn seed_user(conn: &Connection, email: &str) -> i64 {
        conn.execute(
            "INSERT INTO users (email, password_hash) VALUES (?1, 'h')",
            params![email],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    fn seed_image(conn: &Connection, title: &str, user_id: i64, created_at: &str) -> i64 {
        conn.execute(
            "INSERT INTO images (title, image_url, uploaded_by_id, created_at)
             VALUES (?1, 'http://x/i.png', ?2, ?3)",
            params![title, user_id, created_at],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    #[test]
    fn feed_orders_newest_first_with_id_tiebreak() {
        let pool = db::test_pool();
        let conn = pool.get().unwrap();
        let u = seed_user(&conn, "a@b.c");
        seed_image(&conn, "old", u, "2025-01-01 00:00:00");
        seed_image(&conn, "tied-a", u, "2025-01-02 00:00:00");
        seed_image(&conn, "tied-b", u, "2025-01-02 00:00:00");

        let feed = fetch_image_feed(&conn, 1, 10, None);
        let titles: Vec<&str> = feed.images.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["tied-b", "tied-a", "old"]);
    }

    #[test]
    fn feed_is_deterministic() {
        let pool = db::test_pool();
        let conn = pool.get().unwrap();
        let u = seed_user(&conn, "a@b.c");
        for n in 0..7 {
            seed_image(&conn, &format!("img{}", n), u, "2025-01-01 00:00:00");
        }
        let a = fetch_image_feed(&conn, 1, 5, None);
        let b = fetch_image_feed(&conn, 1, 5, None);
        let ids_a: Vec<i64> = a.images.iter().map(|i| i.id).collect();
        let ids_b: Vec<i64> = b.images.iter().map(|i| i.id).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn pagination_boundary_matches_contract() {
        // 15 images, page 2 of limit 10: 5 rows, has_more false, 2 pages.
        let pool = db::test_pool();
        let conn = pool.get().unwrap();
        let u = seed_user(&conn, "a@b.c");
        for n in 0..15 {
            seed_image(&conn, &format!("img{}", n), u, "2025-01-01 00:00:00");
        }

        let feed = fetch_image_feed(&conn, 2, 10, None);
        assert_eq!(feed.images.len(), 5);
        assert!(!feed.has_more);
        assert_eq!(feed.total_records, 15);
        assert_eq!(feed.total_pages, 2);
    }

    #[test]
    fn has_more_is_true_on_a_full_page() {
        let pool = db::test_pool();
        let conn = pool.get().unwrap();
        let u = seed_user(&conn, "a@b.c");
        for n in 0..10 {
            seed_image(&conn, &format!("img{}", n), u, "2025-01-01 00:00:00");
        }
        // Known heuristic: the only page is exactly full, so has_more
        // reports true even though no further page exists.
        let feed = fetch_image_feed(&conn, 1, 10, None);
        assert!(feed.has_more);
        assert_eq!(feed.total_pages, 1);
    }

    #[test]
    fn filter_matches_title_description_email_and_tag() {
        let pool = db::test_pool();
        let conn = pool.get().unwrap();
        let u1 = seed_user(&conn, "alice@example.com");
        let u2 = seed_user(&conn, "bob@example.com");

        let by_title = seed_image(&conn, "Sunset over water", u1, "2025-01-01 00:00:01");
        let by_desc = seed_image(&conn, "plain", u2, "2025-01-01 00:00:02");
        conn.execute(
            "UPDATE images SET description = 'a SUNSET story' WHERE id = ?1",
            params![by_desc],
        )
        .unwrap();
        let by_tag = seed_image(&conn, "tagged", u2, "2025-01-01 00:00:03");
        tag_image(&conn, by_tag, "sunsets").unwrap();
        let _unmatched = seed_image(&conn, "mountain", u2, "2025-01-01 00:00:04");

        let feed = fetch_image_feed(&conn, 1, 10, Some("sunset"));
        let mut ids: Vec<i64> = feed.images.iter().map(|i| i.id).collect();
        ids.sort();
        assert_eq!(ids, vec![by_title, by_desc, by_tag]);
        assert_eq!(feed.total_records, 3);

        // Uploader email match pulls in everything alice uploaded.
        let feed = fetch_image_feed(&conn, 1, 10, Some("alice"));
        assert_eq!(feed.total_records, 1);
        assert_eq!(feed.images[0].id, by_title);
    }

    #[test]
    fn filter_and_count_agree_across_pages() {
        let pool = db::test_pool();
        let conn = pool.get().unwrap();
        let u = seed_user(&conn, "a@b.c");
        for n in 0..7 {
            seed_image(&conn, &format!("forest {}", n), u, "2025-01-01 00:00:00");
        }
        for n in 0..4 {
            seed_image(&conn, &format!("beach {}", n), u, "2025-01-01 00:00:00");
        }

        let total = fetch_image_feed(&conn, 1, 3, Some("forest")).total_records;
        let mut seen = 0;
        let mut page = 1;
        loop {
            let feed = fetch_image_feed(&conn, page, 3, Some("forest"));
            if feed.images.is_empty() {
                break;
            }
            seen += feed.images.len() as i64;
            page += 1;
        }
        assert_eq!(seen, total);
        assert_eq!(total, 7);
    }

    #[test]
    fn feed_aggregates_likes_and_tags() {
        let pool = db::test_pool();
        let conn = pool.get().unwrap();
        let u1 = seed_user(&conn, "a@b.c");
        let u2 = seed_user(&conn, "b@b.c");
        let img = seed_image(&conn, "popular", u1, "2025-01-01 00:00:00");
        conn.execute(
            "INSERT INTO likes (user_id, image_id) VALUES (?1, ?2)",
            params![u1, img],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO likes (user_id, image_id) VALUES (?1, ?2)",
            params![u2, img],
        )
        .unwrap();
        tag_image(&conn, img, "alpha").unwrap();
        tag_image(&conn, img, "beta").unwrap();

        let feed = fetch_image_feed(&conn, 1, 10, None);
        assert_eq!(feed.images.len(), 1);
        let card = &feed.images[0];
        assert_eq!(card.like_count, 2);
        let mut likers = card.liked_by.clone();
        likers.sort();
        assert_eq!(likers, vec![u1, u2]);
        let mut tags = card.tags.clone();
        tags.sort();
        assert_eq!(tags, vec!["alpha", "beta"]);
    }

    #[test]
    fn empty_feed_has_one_empty_page() {
        let pool = db::test_pool();
        let conn = pool.get().unwrap();
        let feed = fetch_image_feed(&conn, 1, 10, None);
        assert!(feed.images.is_empty());
        assert_eq!(feed.total_records, 0);
        assert_eq!(feed.total_pages, 1);
        assert!(!feed.has_more);
        assert!(feed.error.is_none());
    }

    #[test]
    fn feed_fails_soft_on_storage_error() {
        let pool = db::test_pool();
        let conn = pool.get().unwrap();
        // Simulate a broken backing store.
        conn.execute_batch("DROP TABLE images").unwrap();
        let feed = fetch_image_feed(&conn, 1, 10, None);
        assert!(feed.images.is_empty());
        assert!(feed.error.is_some());
    }

    #[test]
    fn detail_returns_none_for_missing_image() {
        let pool = db::test_pool();
        let conn = pool.get().unwrap();
        assert!(get_image_detail(&conn, 42).unwrap().is_none());
    }

    #[test]
    fn detail_carries_likers_and_tags() {
        let pool = db::test_pool();
        let conn = pool.get().unwrap();
        let u1 = seed_user(&conn, "a@b.c");
        let u2 = seed_user(&conn, "b@b.c");
        let img = seed_image(&conn, "pic", u1, "2025-01-01 00:00:00");
        conn.execute(
            "INSERT INTO likes (user_id, image_id) VALUES (?1, ?2)",
            params![u2, img],
        )
        .unwrap();
        tag_image(&conn, img, "macro").unwrap();

        let detail = get_image_detail(&conn, img).unwrap().unwrap();
        assert_eq!(detail.like_count, 1);
        assert_eq!(detail.liked_by[0].email, "b@b.c");
        assert_eq!(detail.tags[0].name, "macro");
        assert_eq!(detail.uploader_email, "a@b.c");
    }

    #[test]
    fn tag_image_rejects_bad_names() {
        let pool = db::test_pool();
        let conn = pool.get().unwrap();
        let u = seed_user(&conn, "a@b.c");
        let img = seed_image(&conn, "pic", u, "2025-01-01 00:00:00");
        assert!(tag_image(&conn, img, "").is_err());
        assert!(tag_image(&conn, img, "a,b").is_err());
    }

    #[test]
    fn all_tags_sorted_by_name() {
        let pool = db::test_pool();
        let conn = pool.get().unwrap();
        let u = seed_user(&conn, "a@b.c");
        let img = seed_image(&conn, "pic", u, "2025-01-01 00:00:00");
        tag_image(&conn, img, "zebra").unwrap();
        tag_image(&conn, img, "alpha").unwrap();

        let names: Vec<String> = get_all_tags(&conn).unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["alpha", "zebra"]);
    }

    #[test]
    fn tag_image_is_idempotent() {
        let pool = db::test_pool();
        let conn = pool.get().unwrap();
        let u = seed_user(&conn, "a@b.c");
        let img = seed_image(&conn, "pic", u, "2025-01-01 00:00:00");
        let t1 = tag_image(&conn, img, "Macro").unwrap();
        let t2 = tag_image(&conn, img, "macro").unwrap();
        assert_eq!(t1, t2);
        let links: i64 = conn
            .query_row("SELECT COUNT(*) FROM image_tags", [], |r| r.get(0))
            .unwrap();
        assert_eq!(links, 1);
    }
}
