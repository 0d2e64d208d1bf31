//! User, bookmark, reading history and back-office queries.

use sqlx::PgPool;
use uuid::Uuid;

use super::models::{BookmarkEntry, HistoryEntry, NewUser, Role, SiteStats, Story, User};

const USER_COLUMNS: &str = "id, username, email, password_hash, role, avatar, created_at, updated_at";

pub async fn list(pool: &PgPool) -> Result<Vec<User>, sqlx::Error> {
    let sql = format!("SELECT {} FROM users ORDER BY created_at DESC", USER_COLUMNS);
    sqlx::query_as::<_, User>(&sql).fetch_all(pool).await
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<User>, sqlx::Error> {
    let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
    sqlx::query_as::<_, User>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
    let sql = format!("SELECT {} FROM users WHERE lower(email) = lower($1)", USER_COLUMNS);
    sqlx::query_as::<_, User>(&sql)
        .bind(email)
        .fetch_optional(pool)
        .await
}

/// Which of `username` / `email` is already used by someone other than
/// `excluding`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Taken {
    pub username: bool,
    pub email: bool,
}

pub async fn taken(
    pool: &PgPool,
    username: Option<&str>,
    email: Option<&str>,
    excluding: Option<Uuid>,
) -> Result<Taken, sqlx::Error> {
    let (username, email): (bool, bool) = sqlx::query_as(
        r#"
        SELECT
            EXISTS(SELECT 1 FROM users WHERE username = $1 AND ($3::uuid IS NULL OR id <> $3)),
            EXISTS(SELECT 1 FROM users WHERE lower(email) = lower($2) AND ($3::uuid IS NULL OR id <> $3))
        "#,
    )
    .bind(username)
    .bind(email)
    .bind(excluding)
    .fetch_one(pool)
    .await?;
    Ok(Taken { username, email })
}

pub async fn create(pool: &PgPool, user: &NewUser) -> Result<User, sqlx::Error> {
    let sql = format!(
        "INSERT INTO users (username, email, password_hash, role) VALUES ($1, $2, $3, $4) RETURNING {}",
        USER_COLUMNS
    );
    sqlx::query_as::<_, User>(&sql)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .fetch_one(pool)
        .await
}

/// Insert or, when the email already exists, replace credentials and role.
pub async fn upsert(pool: &PgPool, user: &NewUser) -> Result<User, sqlx::Error> {
    let sql = format!(
        "INSERT INTO users (username, email, password_hash, role) VALUES ($1, $2, $3, $4) \
         ON CONFLICT (email) DO UPDATE SET \
            username = EXCLUDED.username, \
            password_hash = EXCLUDED.password_hash, \
            role = EXCLUDED.role, \
            updated_at = now() \
         RETURNING {}",
        USER_COLUMNS
    );
    sqlx::query_as::<_, User>(&sql)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .fetch_one(pool)
        .await
}

pub async fn update(
    pool: &PgPool,
    id: Uuid,
    username: Option<&str>,
    email: Option<&str>,
    role: Option<Role>,
) -> Result<Option<User>, sqlx::Error> {
    let sql = format!(
        "UPDATE users SET \
            username = COALESCE($2, username), \
            email = COALESCE($3, email), \
            role = COALESCE($4, role), \
            updated_at = now() \
         WHERE id = $1 RETURNING {}",
        USER_COLUMNS
    );
    sqlx::query_as::<_, User>(&sql)
        .bind(id)
        .bind(username)
        .bind(email)
        .bind(role.map(|r| r.as_str()))
        .fetch_optional(pool)
        .await
}

pub async fn set_password(pool: &PgPool, id: Uuid, password_hash: &str) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(pool)
            .await?;
    Ok(result.rows_affected() > 0)
}

/// Delete a user. Their ratings go with them, so the aggregates of every
/// story they rated are recomputed in the same transaction.
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let rated: Vec<(Uuid,)> = sqlx::query_as("SELECT story_id FROM story_ratings WHERE user_id = $1")
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Ok(false);
    }

    if !rated.is_empty() {
        let story_ids: Vec<Uuid> = rated.into_iter().map(|(id,)| id).collect();
        sqlx::query(
            r#"
            UPDATE stories s SET
                rating_total = agg.total,
                rating_count = agg.count,
                rating_average = CASE WHEN agg.count = 0 THEN 0
                                      ELSE agg.total::double precision / agg.count END
            FROM (
                SELECT st.id,
                       COALESCE(SUM(r.value), 0)::bigint AS total,
                       COUNT(r.value)::int AS count
                FROM stories st
                LEFT JOIN story_ratings r ON r.story_id = st.id
                WHERE st.id = ANY($1)
                GROUP BY st.id
            ) agg
            WHERE s.id = agg.id
            "#,
        )
        .bind(&story_ids)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(true)
}

// ============================================================================
// Bookmarks
// ============================================================================

pub async fn bookmarks(pool: &PgPool, user_id: Uuid) -> Result<Vec<BookmarkEntry>, sqlx::Error> {
    sqlx::query_as::<_, BookmarkEntry>(
        r#"
        SELECT b.story_id, s.title, s.slug, s.description, s.cover_image, b.added_at
        FROM bookmarks b
        JOIN stories s ON s.id = b.story_id
        WHERE b.user_id = $1
        ORDER BY b.added_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

pub async fn is_bookmarked(pool: &PgPool, user_id: Uuid, story_id: Uuid) -> Result<bool, sqlx::Error> {
    let (exists,): (bool,) = sqlx::query_as(
        "SELECT EXISTS(SELECT 1 FROM bookmarks WHERE user_id = $1 AND story_id = $2)",
    )
    .bind(user_id)
    .bind(story_id)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

/// Returns `false` if the bookmark already existed.
pub async fn add_bookmark(pool: &PgPool, user_id: Uuid, story_id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO bookmarks (user_id, story_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(user_id)
    .bind(story_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn remove_bookmark(pool: &PgPool, user_id: Uuid, story_id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM bookmarks WHERE user_id = $1 AND story_id = $2")
        .bind(user_id)
        .bind(story_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ============================================================================
// Reading history
// ============================================================================

/// Record that `user_id` read `chapter_id`. One entry per story: re-reading
/// moves the entry to the new chapter and bumps `last_read`.
pub async fn record_reading(
    pool: &PgPool,
    user_id: Uuid,
    story_id: Uuid,
    chapter_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO reading_history (user_id, story_id, chapter_id)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id, story_id)
        DO UPDATE SET chapter_id = EXCLUDED.chapter_id, last_read = now()
        "#,
    )
    .bind(user_id)
    .bind(story_id)
    .bind(chapter_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn reading_history(pool: &PgPool, user_id: Uuid) -> Result<Vec<HistoryEntry>, sqlx::Error> {
    sqlx::query_as::<_, HistoryEntry>(
        r#"
        SELECT h.id, h.story_id, s.title AS story_title, s.slug AS story_slug,
               h.chapter_id, c.title AS chapter_title, c.chapter_number, h.last_read
        FROM reading_history h
        JOIN stories s ON s.id = h.story_id
        JOIN chapters c ON c.id = h.chapter_id
        WHERE h.user_id = $1
        ORDER BY h.last_read DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

pub async fn clear_history(pool: &PgPool, user_id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM reading_history WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn remove_history_entry(
    pool: &PgPool,
    user_id: Uuid,
    entry_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM reading_history WHERE id = $1 AND user_id = $2")
        .bind(entry_id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ============================================================================
// Back-office
// ============================================================================

pub async fn stats(pool: &PgPool) -> Result<SiteStats, sqlx::Error> {
    let (total_stories, total_users, total_chapters, total_views): (i64, i64, i64, i64) =
        sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM stories),
                (SELECT COUNT(*) FROM users),
                (SELECT COUNT(*) FROM chapters),
                (SELECT COALESCE(SUM(views), 0)::bigint FROM stories)
            "#,
        )
        .fetch_one(pool)
        .await?;
    Ok(SiteStats {
        total_stories,
        total_users,
        total_chapters,
        total_views,
    })
}

pub async fn recent_stories(pool: &PgPool, limit: i64) -> Result<Vec<Story>, sqlx::Error> {
    sqlx::query_as::<_, Story>(
        r#"
        SELECT id, title, slug, author_id, description, cover_image, status, views,
               total_chapters, rating_total, rating_count, rating_average, created_at, updated_at
        FROM stories ORDER BY created_at DESC LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn recent_users(pool: &PgPool, limit: i64) -> Result<Vec<User>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM users ORDER BY created_at DESC LIMIT $1",
        USER_COLUMNS
    );
    sqlx::query_as::<_, User>(&sql).bind(limit).fetch_all(pool).await
}
