use atelier::db;
use atelier::error::AppError;
use atelier::gallery::{collections, comments, feed, likes};
use atelier::state::DbPool;
use rusqlite::params;
use tempfile::TempDir;

fn setup_pool() -> (TempDir, DbPool) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let pool = db::create_pool(&db_path).expect("Failed to create test database");
    db::run_migrations(&pool).expect("Failed to run migrations");
    (temp_dir, pool)
}

fn seed_user(conn: &rusqlite::Connection, email: &str) -> i64 {
    conn.execute(
        "INSERT INTO users (email, password_hash) VALUES (?1, 'x')",
        params![email],
    )
    .unwrap();
    conn.last_insert_rowid()
}

fn seed_image(conn: &rusqlite::Connection, user_id: i64, title: &str) -> i64 {
    conn.execute(
        "INSERT INTO images (uploaded_by_id, title, image_url) VALUES (?1, ?2, '/uploads/x.png')",
        params![user_id, title],
    )
    .unwrap();
    conn.last_insert_rowid()
}

#[test]
fn comment_thread_survives_file_backed_reopen() {
    let (_dir, pool) = setup_pool();
    let user;
    let image;
    let root;
    {
        let conn = pool.get().unwrap();
        user = seed_user(&conn, "ada@example.com");
        image = seed_image(&conn, user, "Skyline");
        root = comments::add_comment(&conn, image, "First!", None, user).unwrap();
        comments::add_comment(&conn, image, "A reply", Some(root), user).unwrap();
    }

    // A fresh connection from the same pool sees the committed thread.
    let conn = pool.get().unwrap();
    let forest = comments::fetch_comment_tree(&conn, image);
    assert!(forest.fetch_error.is_none());
    assert_eq!(forest.len(), 2);
    assert_eq!(forest.roots.len(), 1);
    assert_eq!(forest.roots[0].replies.len(), 1);
}

#[test]
fn cascade_delete_removes_whole_subtree_and_nothing_else() {
    let (_dir, pool) = setup_pool();
    let mut conn = pool.get().unwrap();
    let author = seed_user(&conn, "ada@example.com");
    let other = seed_user(&conn, "bob@example.com");
    let image = seed_image(&conn, author, "Skyline");

    let a = comments::add_comment(&conn, image, "A", None, author).unwrap();
    let b = comments::add_comment(&conn, image, "B", Some(a), other).unwrap();
    let _c = comments::add_comment(&conn, image, "C", Some(b), author).unwrap();
    let standalone = comments::add_comment(&conn, image, "unrelated", None, other).unwrap();

    // Someone who did not write A cannot delete its thread.
    let err = comments::delete_comment_subtree(&mut conn, a, other).unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    // The author removes A, taking B and C (written by `other`) with it.
    let deleted = comments::delete_comment_subtree(&mut conn, a, author).unwrap();
    assert_eq!(deleted, 3);

    let forest = comments::fetch_comment_tree(&conn, image);
    assert_eq!(forest.len(), 1);
    assert_eq!(forest.roots[0].comment.id, standalone);
}

#[test]
fn feed_pagination_and_filter_agree_with_counts() {
    let (_dir, pool) = setup_pool();
    let conn = pool.get().unwrap();
    let user = seed_user(&conn, "ada@example.com");
    for i in 0..15 {
        let title = if i % 3 == 0 {
            format!("Sunset {}", i)
        } else {
            format!("Portrait {}", i)
        };
        seed_image(&conn, user, &title);
    }

    let page1 = feed::fetch_image_feed(&conn, 1, 10, None);
    assert_eq!(page1.images.len(), 10);
    assert_eq!(page1.total_records, 15);
    assert_eq!(page1.total_pages, 2);
    assert!(page1.has_more);

    let page2 = feed::fetch_image_feed(&conn, 2, 10, None);
    assert_eq!(page2.images.len(), 5);
    assert!(!page2.has_more);

    // No overlap between consecutive pages.
    let ids1: Vec<i64> = page1.images.iter().map(|i| i.id).collect();
    for img in &page2.images {
        assert!(!ids1.contains(&img.id));
    }

    // Filter narrows both the rows and the count.
    let filtered = feed::fetch_image_feed(&conn, 1, 10, Some("sunset"));
    assert_eq!(filtered.total_records, 5);
    assert_eq!(filtered.images.len(), 5);
    for img in &filtered.images {
        assert!(img.title.to_lowercase().contains("sunset"));
    }
}

#[test]
fn like_toggle_is_visible_in_the_feed() {
    let (_dir, pool) = setup_pool();
    let conn = pool.get().unwrap();
    let ada = seed_user(&conn, "ada@example.com");
    let bob = seed_user(&conn, "bob@example.com");
    let image = seed_image(&conn, ada, "Skyline");

    assert_eq!(
        likes::toggle_like(&conn, image, ada).unwrap(),
        likes::LikeOutcome::Liked
    );
    assert_eq!(
        likes::toggle_like(&conn, image, bob).unwrap(),
        likes::LikeOutcome::Liked
    );

    let page = feed::fetch_image_feed(&conn, 1, 10, None);
    assert_eq!(page.images[0].like_count, 2);
    assert!(page.images[0].liked_by.contains(&ada));
    assert!(page.images[0].liked_by.contains(&bob));

    assert_eq!(
        likes::toggle_like(&conn, image, bob).unwrap(),
        likes::LikeOutcome::Disliked
    );
    let page = feed::fetch_image_feed(&conn, 1, 10, None);
    assert_eq!(page.images[0].like_count, 1);
}

#[test]
fn collection_lifecycle() {
    let (_dir, pool) = setup_pool();
    let conn = pool.get().unwrap();
    let ada = seed_user(&conn, "ada@example.com");
    let image = seed_image(&conn, ada, "Skyline");

    let coll = collections::create_collection(&conn, "Favorites", ada).unwrap();
    collections::add_image_to_collection(&conn, coll, image, ada).unwrap();

    let detail = collections::get_collection_with_images(&conn, coll, ada)
        .unwrap();
    assert_eq!(detail.images.len(), 1);
    assert_eq!(detail.images[0].title, "Skyline");

    collections::remove_image_from_collection(&conn, coll, image, ada).unwrap();
    let detail = collections::get_collection_with_images(&conn, coll, ada).unwrap();
    assert!(detail.images.is_empty());

    collections::delete_collection(&conn, coll, ada).unwrap();
    assert!(collections::list_collections(&conn, ada).unwrap().is_empty());
}

#[test]
fn deleting_an_image_removes_comments_likes_and_tags() {
    let (_dir, pool) = setup_pool();
    let conn = pool.get().unwrap();
    let ada = seed_user(&conn, "ada@example.com");
    let image = seed_image(&conn, ada, "Skyline");

    comments::add_comment(&conn, image, "Nice", None, ada).unwrap();
    likes::toggle_like(&conn, image, ada).unwrap();
    feed::tag_image(&conn, image, "city").unwrap();

    conn.execute("DELETE FROM images WHERE id = ?1", params![image])
        .unwrap();

    let count: i64 = conn
        .query_row(
            "SELECT (SELECT COUNT(*) FROM comments)
                  + (SELECT COUNT(*) FROM likes)
                  + (SELECT COUNT(*) FROM image_tags)",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(count, 0);
}
