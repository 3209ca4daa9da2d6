//! Comment threads: flat-table fetch, in-memory tree assembly, and
//! subtree removal.
//!
//! Comments live in a flat table with a nullable `reply_to_id` self
//! reference. The tree is rebuilt from scratch on every read; the returned
//! forest is a plain value snapshot, so callers re-fetch after any mutation.

use std::collections::{HashMap, HashSet};

use rusqlite::{params, Connection};

use crate::error::{AppError, AppResult};

/// One comment row joined with its author, as fetched for an image.
#[derive(Debug, Clone)]
pub struct CommentRecord {
    pub id: i64,
    pub image_id: i64,
    pub user_id: i64,
    pub author_email: String,
    pub author_name: Option<String>,
    pub content: String,
    pub reply_to_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

/// A comment with its ordered replies.
#[derive(Debug, Clone)]
pub struct CommentNode {
    pub comment: CommentRecord,
    pub replies: Vec<CommentNode>,
}

// The default destructor recurses reply-by-reply, so a deep chain would
// blow the stack on drop just as a recursive builder would on build.
impl Drop for CommentNode {
    fn drop(&mut self) {
        let mut stack = std::mem::take(&mut self.replies);
        while let Some(mut node) = stack.pop() {
            stack.append(&mut node.replies);
        }
    }
}

/// The threaded view of one image's comments.
///
/// `fetch_error` is set when the backing fetch failed; the forest is then
/// empty so the page renders "0 comments" instead of crashing, but the
/// failure stays observable.
#[derive(Debug, Default)]
pub struct CommentForest {
    pub roots: Vec<CommentNode>,
    pub fetch_error: Option<String>,
}

impl CommentForest {
    /// Total number of comments across the whole forest.
    pub fn len(&self) -> usize {
        let mut count = 0;
        let mut stack: Vec<&CommentNode> = self.roots.iter().collect();
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.replies.iter());
        }
        count
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Pre-order walk of the forest as (depth, node) pairs, replies after
    /// their parent, sibling order preserved. Used to render the thread as
    /// an indented flat list.
    pub fn walk(&self) -> Vec<(usize, &CommentNode)> {
        let mut out = Vec::new();
        let mut stack: Vec<(usize, &CommentNode)> =
            self.roots.iter().rev().map(|n| (0, n)).collect();
        while let Some((depth, node)) = stack.pop() {
            out.push((depth, node));
            for reply in node.replies.iter().rev() {
                stack.push((depth + 1, reply));
            }
        }
        out
    }
}

/// Build an ordered forest from a flat set of comments for one image.
///
/// Two passes over the input: the first indexes every id and groups each
/// comment under its resolved parent (or the root list) in original order,
/// the second materializes nodes. A comment whose declared parent is not in
/// the set is promoted to root rather than dropped. Input order is the
/// sibling order, so callers sort by creation time before calling.
pub fn build_comment_tree(records: Vec<CommentRecord>) -> Vec<CommentNode> {
    let known: HashSet<i64> = records.iter().map(|r| r.id).collect();

    let mut by_parent: HashMap<i64, Vec<CommentRecord>> = HashMap::new();
    let mut roots: Vec<CommentRecord> = Vec::new();

    for rec in records {
        match rec.reply_to_id {
            // Self-replies are nonsense rows; treat them as roots too.
            Some(parent) if parent != rec.id && known.contains(&parent) => {
                by_parent.entry(parent).or_default().push(rec);
            }
            _ => roots.push(rec),
        }
    }

    roots
        .into_iter()
        .map(|rec| attach_replies(rec, &mut by_parent))
        .collect()
}

struct BuildFrame {
    comment: CommentRecord,
    replies: Vec<CommentNode>,
    pending: std::vec::IntoIter<CommentRecord>,
}

// Explicit-stack materialization; thread depth is user-controlled, so the
// call stack must not grow with it.
fn attach_replies(
    rec: CommentRecord,
    by_parent: &mut HashMap<i64, Vec<CommentRecord>>,
) -> CommentNode {
    let pending = by_parent.remove(&rec.id).unwrap_or_default().into_iter();
    let mut stack = vec![BuildFrame {
        comment: rec,
        replies: Vec::new(),
        pending,
    }];

    loop {
        let frame = stack.last_mut().unwrap();
        match frame.pending.next() {
            Some(child) => {
                let pending = by_parent.remove(&child.id).unwrap_or_default().into_iter();
                stack.push(BuildFrame {
                    comment: child,
                    replies: Vec::new(),
                    pending,
                });
            }
            None => {
                let done = stack.pop().unwrap();
                let node = CommentNode {
                    comment: done.comment,
                    replies: done.replies,
                };
                match stack.last_mut() {
                    Some(parent) => parent.replies.push(node),
                    None => return node,
                }
            }
        }
    }
}

/// Fetch and assemble the comment tree for an image.
///
/// Fails soft: a storage error yields an empty forest with `fetch_error`
/// set, and is logged here.
pub fn fetch_comment_tree(conn: &Connection, image_id: i64) -> CommentForest {
    match load_comment_records(conn, image_id) {
        Ok(records) => CommentForest {
            roots: build_comment_tree(records),
            fetch_error: None,
        },
        Err(e) => {
            tracing::error!("Failed to fetch comments for image {}: {}", image_id, e);
            CommentForest {
                roots: Vec::new(),
                fetch_error: Some(e.to_string()),
            }
        }
    }
}

/// Flat fetch of an image's comments, oldest first. Ties on the second-
/// resolution timestamp break by id so sibling order is stable.
fn load_comment_records(conn: &Connection, image_id: i64) -> AppResult<Vec<CommentRecord>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.image_id, c.user_id, u.email, u.name, c.content,
                c.reply_to_id, c.created_at, c.updated_at
         FROM comments c
         JOIN users u ON u.id = c.user_id
         WHERE c.image_id = ?1
         ORDER BY c.created_at ASC, c.id ASC",
    )?;

    let records = stmt
        .query_map(params![image_id], |row| {
            Ok(CommentRecord {
                id: row.get(0)?,
                image_id: row.get(1)?,
                user_id: row.get(2)?,
                author_email: row.get(3)?,
                author_name: row.get(4)?,
                content: row.get(5)?,
                reply_to_id: row.get(6)?,
                created_at: row.get(7)?,
                updated_at: row.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(records)
}

pub const MAX_COMMENT_LEN: usize = 500;

/// Add a comment (or a reply when `reply_to_id` is given). The parent must
/// be an existing comment on the same image.
pub fn add_comment(
    conn: &Connection,
    image_id: i64,
    content: &str,
    reply_to_id: Option<i64>,
    acting_user_id: i64,
) -> AppResult<i64> {
    let content = content.trim();
    if content.is_empty() {
        return Err(AppError::BadRequest("Comment cannot be empty".into()));
    }
    if content.len() > MAX_COMMENT_LEN {
        return Err(AppError::BadRequest(format!(
            "Comment must be {} characters or less",
            MAX_COMMENT_LEN
        )));
    }

    let image_exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM images WHERE id = ?1",
        params![image_id],
        |r| r.get(0),
    )?;
    if !image_exists {
        return Err(AppError::NotFound);
    }

    if let Some(parent_id) = reply_to_id {
        let parent_image: Option<i64> = conn
            .query_row(
                "SELECT image_id FROM comments WHERE id = ?1",
                params![parent_id],
                |r| r.get(0),
            )
            .ok();
        match parent_image {
            Some(pid) if pid == image_id => {}
            Some(_) => {
                return Err(AppError::BadRequest(
                    "Reply target belongs to a different image".into(),
                ))
            }
            None => return Err(AppError::BadRequest("Reply target does not exist".into())),
        }
    }

    conn.execute(
        "INSERT INTO comments (user_id, image_id, content, reply_to_id) VALUES (?1, ?2, ?3, ?4)",
        params![acting_user_id, image_id, content, reply_to_id],
    )?;

    Ok(conn.last_insert_rowid())
}

/// Edit a comment's content. Only the author may edit.
pub fn edit_comment(
    conn: &Connection,
    comment_id: i64,
    content: &str,
    acting_user_id: i64,
) -> AppResult<()> {
    let content = content.trim();
    if content.is_empty() {
        return Err(AppError::BadRequest("Comment cannot be empty".into()));
    }
    if content.len() > MAX_COMMENT_LEN {
        return Err(AppError::BadRequest(format!(
            "Comment must be {} characters or less",
            MAX_COMMENT_LEN
        )));
    }

    let author_id: i64 = conn
        .query_row(
            "SELECT user_id FROM comments WHERE id = ?1",
            params![comment_id],
            |r| r.get(0),
        )
        .map_err(|_| AppError::NotFound)?;

    if author_id != acting_user_id {
        return Err(AppError::Forbidden);
    }

    conn.execute(
        "UPDATE comments SET content = ?1, updated_at = datetime('now') WHERE id = ?2",
        params![content, comment_id],
    )?;

    Ok(())
}

/// Delete a comment and its entire reply subtree.
///
/// Only the target's author may delete; descendants are removed regardless
/// of who wrote them. The closure over `reply_to_id` is evaluated by the
/// store inside the same transaction that deletes, so a reply inserted
/// concurrently cannot escape. Returns the number of comments removed.
pub fn delete_comment_subtree(
    conn: &mut Connection,
    comment_id: i64,
    acting_user_id: i64,
) -> AppResult<usize> {
    let author_id: i64 = conn
        .query_row(
            "SELECT user_id FROM comments WHERE id = ?1",
            params![comment_id],
            |r| r.get(0),
        )
        .map_err(|_| AppError::NotFound)?;

    if author_id != acting_user_id {
        return Err(AppError::Forbidden);
    }

    let tx = conn.transaction()?;
    let deleted = tx.execute(
        "WITH RECURSIVE subtree(id) AS (
             SELECT id FROM comments WHERE id = ?1
             UNION ALL
             SELECT c.id FROM comments c JOIN subtree s ON c.reply_to_id = s.id
         )
         DELETE FROM comments WHERE id IN (SELECT id FROM subtree)",
        params![comment_id],
    )?;
    tx.commit()?;

    Ok(deleted)
}
